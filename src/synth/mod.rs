//! Synth module - algorithmic sample generation
//!
//! This module provides:
//! - `Waveform` generators: sawtooth, sine, square, white noise
//! - `PhaseAccumulator`, the state carried between callbacks
//! - `WaveformSynth`, a stream callback switching waveform by accumulator band

mod generator;
mod waveform;

pub use generator::{render_block, PhaseAccumulator, SynthConfig, WaveformSynth};
pub use waveform::Waveform;
