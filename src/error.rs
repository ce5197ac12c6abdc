//! Error types shared by the binding layer and the playback sources

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the engine, streams, and sample sources
#[derive(Error, Debug)]
pub enum Error {
    /// No suitable device, or the device rejected the stream parameters
    #[error("Audio device error: {0}")]
    Device(String),

    /// A sample width or format the caller cannot handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// WAV file missing, truncated, or with a malformed header
    #[error("Failed to read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// Invalid stream state transition or backend play/pause failure
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Self {
        Error::Device(err.to_string())
    }
}

impl From<cpal::DevicesError> for Error {
    fn from(err: cpal::DevicesError) -> Self {
        Error::Device(err.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        Error::Device(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Self {
        Error::Stream(err.to_string())
    }
}

impl From<cpal::PauseStreamError> for Error {
    fn from(err: cpal::PauseStreamError) -> Self {
        Error::Stream(err.to_string())
    }
}

impl Error {
    /// Wrap a hound error with the path it came from
    pub fn file(path: impl Into<PathBuf>, source: hound::Error) -> Self {
        match source {
            hound::Error::Unsupported => Error::UnsupportedFormat(format!(
                "{}: unsupported WAV encoding",
                path.into().display()
            )),
            source => Error::File {
                path: path.into(),
                source,
            },
        }
    }
}
