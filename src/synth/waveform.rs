//! Waveform generators
//!
//! Each generator maps the phase accumulator value `x` to a sample in
//! -1.0..=1.0. One period spans two units of `x`.

use rand::Rng;
use std::f64::consts::PI;

/// Waveform shapes
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Waveform {
    /// Rising sawtooth
    Sawtooth,
    /// Smooth sine wave
    Sine,
    /// Abrupt square wave
    Square,
    /// Uniform white noise
    WhiteNoise,
}

impl Waveform {
    /// Get all waveform types, in band order
    pub fn all() -> &'static [Waveform] {
        &[
            Waveform::Sawtooth,
            Waveform::Sine,
            Waveform::Square,
            Waveform::WhiteNoise,
        ]
    }

    /// Get the name of this waveform
    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sawtooth => "Sawtooth",
            Waveform::Sine => "Sine",
            Waveform::Square => "Square",
            Waveform::WhiteNoise => "White noise",
        }
    }

    /// Pick the generator for an accumulator value
    ///
    /// Bands are multiples of the note frequency: below 1x sawtooth,
    /// then sine, then square, and noise from 3x on.
    pub fn for_phase(phase: f64, note_frequency: f64) -> Waveform {
        if phase < note_frequency {
            Waveform::Sawtooth
        } else if phase < note_frequency * 2.0 {
            Waveform::Sine
        } else if phase < note_frequency * 3.0 {
            Waveform::Square
        } else {
            Waveform::WhiteNoise
        }
    }

    /// Sample the waveform at accumulator value `x`
    ///
    /// `rng` is only drawn from for [`Waveform::WhiteNoise`].
    pub fn sample<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> f32 {
        match self {
            Waveform::Sawtooth => (x.rem_euclid(2.0) - 1.0) as f32,

            Waveform::Sine => (x * PI).sin() as f32,

            Waveform::Square => {
                if x.rem_euclid(2.0) < 1.0 { -1.0 } else { 1.0 }
            }

            Waveform::WhiteNoise => rng.gen_range(-1.0..1.0),
        }
    }
}
