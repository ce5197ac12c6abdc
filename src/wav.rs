//! WAV playback source
//!
//! Decodes a PCM WAV file block by block straight into a stream's output
//! buffer. No resampling, remixing, or format conversion is done: the
//! stream must be opened with [`WavPlayer::stream_parameters`] so it
//! matches the file's native format.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::audio::{
    CallbackContext, SampleFormat, SamplesMut, StreamCallback, StreamParameters, StreamStatus,
};
use crate::error::{Error, Result};

/// Header fields of an opened WAV file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
    /// Frames per second
    pub frame_rate: u32,
    /// Total frames in the data chunk
    pub frame_count: u32,
    /// Compression type; always "NONE" for the PCM files accepted here
    pub compression: &'static str,
}

/// Sample widths this player can deliver
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SampleWidth {
    /// 8-bit, delivered as unsigned bytes
    Unsigned8,
    /// 16-bit, delivered as signed little-endian integers
    Signed16,
}

impl SampleWidth {
    fn stream_format(&self) -> SampleFormat {
        match self {
            SampleWidth::Unsigned8 => SampleFormat::U8,
            SampleWidth::Signed16 => SampleFormat::I16,
        }
    }
}

/// A WAV file played one callback block at a time
pub struct WavPlayer {
    reader: hound::WavReader<BufReader<File>>,
    info: WavInfo,
    width: SampleWidth,
    path: PathBuf,
    frames_read: u32,
}

impl WavPlayer {
    /// Open and validate a WAV file
    ///
    /// Fails with [`Error::File`] for missing or malformed files and with
    /// [`Error::UnsupportedFormat`] for anything but 8- or 16-bit integer PCM.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path).map_err(|e| Error::file(path, e))?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int {
            return Err(Error::UnsupportedFormat(format!(
                "{}: floating-point samples",
                path.display()
            )));
        }
        let width = match spec.bits_per_sample {
            8 => SampleWidth::Unsigned8,
            16 => SampleWidth::Signed16,
            bits => {
                return Err(Error::UnsupportedFormat(format!(
                    "{}: {}-bit samples (only 8 and 16 are supported)",
                    path.display(),
                    bits
                )))
            }
        };
        if spec.channels == 0 {
            return Err(Error::UnsupportedFormat(format!(
                "{}: zero channels",
                path.display()
            )));
        }

        let info = WavInfo {
            channels: spec.channels,
            sample_width: spec.bits_per_sample / 8,
            frame_rate: spec.sample_rate,
            frame_count: reader.duration(),
            compression: "NONE",
        };

        log::info!(
            "Opened {}: {} channel(s), {}-bit, {} Hz, {} frames",
            path.display(),
            info.channels,
            spec.bits_per_sample,
            info.frame_rate,
            info.frame_count
        );

        Ok(Self {
            reader,
            info,
            width,
            path: path.to_path_buf(),
            frames_read: 0,
        })
    }

    pub fn info(&self) -> &WavInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames not yet delivered
    pub fn remaining_frames(&self) -> u32 {
        self.info.frame_count - self.frames_read
    }

    /// Output-only stream parameters matching the file's native format
    pub fn stream_parameters(&self, frames_per_buffer: u32) -> StreamParameters {
        StreamParameters::output(
            self.info.channels,
            self.width.stream_format(),
            self.info.frame_rate,
            frames_per_buffer,
        )
    }

    /// Decode exactly `out.len() / channels` frames into `out`
    ///
    /// When fewer frames remain than requested, returns
    /// [`StreamStatus::Complete`] and leaves `out` untouched; a short,
    /// partially filled block is never produced.
    pub fn read_block(&mut self, out: &mut SamplesMut<'_>) -> Result<StreamStatus> {
        let channels = self.info.channels as usize;
        let frames = out.len() / channels;
        if frames == 0 || (self.remaining_frames() as usize) < frames {
            return Ok(StreamStatus::Complete);
        }
        let len = frames * channels;

        match (self.width, out) {
            (SampleWidth::Unsigned8, SamplesMut::U8(buf)) => {
                // hound recenters 8-bit data around zero; shift it back to unsigned
                self.decode::<i8, u8>(&mut buf[..len], |s| (s as i16 + 128) as u8)?
            }
            (SampleWidth::Signed16, SamplesMut::I16(buf)) => {
                self.decode::<i16, i16>(&mut buf[..len], |s| s)?
            }
            (_, out) => {
                return Err(Error::UnsupportedFormat(format!(
                    "{}-byte WAV samples cannot fill a {} stream",
                    self.info.sample_width,
                    out.format().name()
                )))
            }
        }

        self.frames_read += frames as u32;
        Ok(StreamStatus::Continue)
    }

    fn decode<S, T>(&mut self, buf: &mut [T], convert: impl Fn(S) -> T) -> Result<()>
    where
        S: hound::Sample,
    {
        let path = &self.path;
        let mut samples = self.reader.samples::<S>();
        for slot in buf.iter_mut() {
            let sample = samples
                .next()
                .unwrap_or_else(|| {
                    Err(hound::Error::IoError(std::io::Error::from(
                        std::io::ErrorKind::UnexpectedEof,
                    )))
                })
                .map_err(|e| Error::file(path, e))?;
            *slot = convert(sample);
        }
        Ok(())
    }
}

impl StreamCallback for WavPlayer {
    fn process(&mut self, ctx: &mut CallbackContext<'_>) -> Result<StreamStatus> {
        self.read_block(&mut ctx.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav<S: hound::Sample + Copy>(
        dir: &Path,
        name: &str,
        spec: hound::WavSpec,
        samples: &[S],
    ) -> PathBuf {
        let path = dir.join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn int_spec(channels: u16, bits: u16, rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn test_info_reports_header() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (0..20).collect();
        let path = write_wav(dir.path(), "stereo.wav", int_spec(2, 16, 22050), &samples);

        let player = WavPlayer::open(&path).unwrap();
        assert_eq!(
            player.info(),
            &WavInfo {
                channels: 2,
                sample_width: 2,
                frame_rate: 22050,
                frame_count: 10,
                compression: "NONE",
            }
        );
        let params = player.stream_parameters(1024);
        assert_eq!(params.output_channels, 2);
        assert_eq!(params.sample_format, SampleFormat::I16);
        assert_eq!(params.sample_rate, 22050);
    }

    #[test]
    fn test_short_tail_completes_without_touching_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (1..=100).collect();
        let path = write_wav(dir.path(), "mono.wav", int_spec(1, 16, 8000), &samples);
        let mut player = WavPlayer::open(&path).unwrap();

        let mut buf = [0i16; 32];
        for block in 0..3 {
            let status = player.read_block(&mut SamplesMut::I16(&mut buf)).unwrap();
            assert_eq!(status, StreamStatus::Continue);
            assert_eq!(buf[0], block * 32 + 1);
            assert_eq!(buf[31], block * 32 + 32);
        }
        assert_eq!(player.remaining_frames(), 4);

        buf.fill(-7);
        let status = player.read_block(&mut SamplesMut::I16(&mut buf)).unwrap();
        assert_eq!(status, StreamStatus::Complete);
        assert!(buf.iter().all(|&s| s == -7));
    }

    #[test]
    fn test_eight_bit_delivered_unsigned() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i8> = vec![-128, 0, 127, -1];
        let path = write_wav(dir.path(), "u8.wav", int_spec(2, 8, 8000), &samples);
        let mut player = WavPlayer::open(&path).unwrap();
        assert_eq!(player.stream_parameters(2).sample_format, SampleFormat::U8);

        let mut buf = [0u8; 4];
        let status = player.read_block(&mut SamplesMut::U8(&mut buf)).unwrap();
        assert_eq!(status, StreamStatus::Continue);
        assert_eq!(buf, [0, 128, 255, 127]);
    }

    #[test]
    fn test_unsupported_widths_rejected_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "24.wav", int_spec(1, 24, 8000), &[1i32, 2, 3]);
        assert!(matches!(WavPlayer::open(&path), Err(Error::UnsupportedFormat(_))));

        let float_spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = write_wav(dir.path(), "float.wav", float_spec, &[0.5f32, -0.5]);
        assert!(matches!(WavPlayer::open(&path), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_mismatched_stream_format_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "i16.wav", int_spec(1, 16, 8000), &[1i16; 8]);
        let mut player = WavPlayer::open(&path).unwrap();

        let mut buf = [0.0f32; 4];
        let result = player.read_block(&mut SamplesMut::F32(&mut buf));
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = WavPlayer::open(dir.path().join("nope.wav"));
        assert!(matches!(result, Err(Error::File { .. })));
    }

    #[test]
    fn test_truncated_data_is_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (0..64).collect();
        let path = write_wav(dir.path(), "cut.wav", int_spec(1, 16, 8000), &samples);

        // Chop the data chunk in half while its header still claims 64 samples
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let full = file.metadata().unwrap().len();
        file.set_len(full - 64).unwrap();

        let result = WavPlayer::open(&path).and_then(|mut player| {
            let mut buf = [0i16; 16];
            loop {
                if player.read_block(&mut SamplesMut::I16(&mut buf))? == StreamStatus::Complete {
                    return Ok(());
                }
            }
        });
        assert!(matches!(result, Err(Error::File { .. })));
    }
}
