//! audiostream - callback-driven audio streaming over cpal
//!
//! The library exposes a small streaming contract: initialize an
//! [`AudioEngine`], open a stream with a fixed sample format and block
//! size, and supply a [`StreamCallback`] that fills one block per call and
//! answers with a [`StreamStatus`]. Two sources are included: WAV file
//! playback and a waveform synthesizer.

pub mod audio;
pub mod error;
pub mod settings;
pub mod synth;
pub mod wav;

pub use audio::{
    AudioEngine, CallbackContext, SampleFormat, Samples, SamplesMut, Stream, StreamCallback,
    StreamParameters, StreamStatus,
};
pub use error::{Error, Result};
pub use settings::Settings;
pub use synth::{SynthConfig, Waveform, WaveformSynth};
pub use wav::{WavInfo, WavPlayer};
