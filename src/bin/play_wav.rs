//! play_wav - play a PCM WAV file on the default output device
//!
//! The stream is opened in the file's native format; playback ends when
//! the file runs out of full blocks.

use std::path::PathBuf;
use std::process::ExitCode;

use audiostream::audio::{sleep, version_text};
use audiostream::{AudioEngine, Settings, WavPlayer};
use clap::Parser;

/// How often the main thread checks whether playback has finished
const POLL_INTERVAL_MS: u64 = 1000;

#[derive(Parser, Debug)]
#[command(name = "play_wav", version, about = "Play an 8- or 16-bit PCM WAV file")]
struct Args {
    /// WAV file to play
    path: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("play_wav: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> audiostream::Result<()> {
    let settings = Settings::load();

    let player = WavPlayer::open(&args.path)?;
    let params = player.stream_parameters(settings.wav.frames_per_buffer);
    let info = player.info().clone();

    let engine = AudioEngine::initialize()?;
    log::info!("{} on {}", version_text(), engine.host_name());
    let mut stream = engine.open_stream(settings.device.as_deref(), params, player)?;
    stream.start()?;
    log::info!(
        "Playing {} ({} frames at {} Hz)",
        args.path.display(),
        info.frame_count,
        info.frame_rate
    );

    while stream.is_active() {
        sleep(POLL_INTERVAL_MS);
    }

    let error = stream.take_error();
    log::info!(
        "Playback finished after {} frames in {:.1}s",
        stream.frames_processed(),
        stream.time()
    );
    stream.close()?;
    engine.terminate();

    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
