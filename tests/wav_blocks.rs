//! Drives a WAV player through the public callback contract without a device.

use std::path::Path;

use audiostream::audio::TimeInfo;
use audiostream::{CallbackContext, SamplesMut, StreamCallback, StreamStatus, WavPlayer};

fn write_stereo_wav(path: &Path, frames: u32) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample(i as i16).unwrap();
        writer.write_sample(-(i as i16)).unwrap();
    }
    writer.finalize().unwrap();
}

/// Run the player block by block, returning statuses and the audio played
fn drain(player: &mut WavPlayer, frames_per_buffer: usize) -> (Vec<StreamStatus>, Vec<i16>) {
    let mut statuses = Vec::new();
    let mut played = Vec::new();
    let mut block = vec![0i16; frames_per_buffer * 2];

    loop {
        block.fill(0);
        let status = {
            let mut ctx = CallbackContext {
                input: None,
                output: SamplesMut::I16(&mut block),
                time: TimeInfo::default(),
                frames: frames_per_buffer,
            };
            player.process(&mut ctx).unwrap()
        };
        statuses.push(status);
        if status != StreamStatus::Continue {
            break;
        }
        played.extend_from_slice(&block);
        assert!(statuses.len() < 1000, "player never completed");
    }
    (statuses, played)
}

#[test]
fn whole_blocks_play_then_complete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blocks.wav");
    write_stereo_wav(&path, 5 * 64);

    let mut player = WavPlayer::open(&path).unwrap();
    assert_eq!(player.info().channels, 2);
    assert_eq!(player.info().sample_width, 2);
    assert_eq!(player.info().frame_rate, 22050);

    let (statuses, played) = drain(&mut player, 64);
    assert_eq!(statuses.len(), 6);
    assert!(statuses[..5].iter().all(|s| *s == StreamStatus::Continue));
    assert_eq!(statuses[5], StreamStatus::Complete);

    let expected: Vec<i16> = (0..5 * 64).flat_map(|i| [i as i16, -(i as i16)]).collect();
    assert_eq!(played, expected);
    assert_eq!(player.remaining_frames(), 0);
}

#[test]
fn partial_tail_block_is_not_played() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tail.wav");
    write_stereo_wav(&path, 3 * 64 + 10);

    let mut player = WavPlayer::open(&path).unwrap();
    let (statuses, played) = drain(&mut player, 64);
    assert_eq!(statuses.len(), 4);
    assert_eq!(statuses[3], StreamStatus::Complete);
    assert_eq!(played.len(), 3 * 64 * 2);
    assert_eq!(player.remaining_frames(), 10);
}

#[test]
fn stream_parameters_follow_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.wav");
    write_stereo_wav(&path, 16);

    let player = WavPlayer::open(&path).unwrap();
    let params = player.stream_parameters(1024);
    assert_eq!(params.output_channels, 2);
    assert_eq!(params.input_channels, 0);
    assert_eq!(params.sample_rate, 22050);
    assert_eq!(params.frames_per_buffer, 1024);
    assert_eq!(params.sample_format, audiostream::SampleFormat::I16);
}
