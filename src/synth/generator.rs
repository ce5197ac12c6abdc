//! Stateful waveform synthesis
//!
//! The only state carried from one callback to the next is the phase
//! accumulator. It is an explicit value passed into [`render_block`], so the
//! synthesis can be exercised without an audio device.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::waveform::Waveform;
use crate::audio::{
    CallbackContext, SampleFormat, SamplesMut, StreamCallback, StreamParameters, StreamStatus,
};
use crate::error::{Error, Result};

/// Synthesis configuration
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SynthConfig {
    /// Note frequency in Hz
    pub note_frequency: f64,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Output channels; every channel gets the same value
    pub channels: u16,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            note_frequency: 440.0,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl SynthConfig {
    /// Accumulator increment per frame
    pub fn phase_step(&self) -> f64 {
        self.note_frequency / self.sample_rate as f64
    }

    /// Output-only float stream matching this configuration
    pub fn stream_parameters(&self, frames_per_buffer: u32) -> StreamParameters {
        StreamParameters::output(
            self.channels,
            SampleFormat::F32,
            self.sample_rate,
            frames_per_buffer,
        )
    }
}

/// Running phase/time accumulator
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseAccumulator {
    value: f64,
}

impl PhaseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Advance by `step` and return the new value
    pub fn advance(&mut self, step: f64) -> f64 {
        self.value += step;
        self.value
    }
}

/// Render one interleaved block
///
/// The waveform is chosen once from the accumulator value at block start.
/// For each frame the accumulator advances by one step and the generated
/// value is written to every channel of the frame. Returns the waveform used.
pub fn render_block<R: Rng + ?Sized>(
    phase: &mut PhaseAccumulator,
    config: &SynthConfig,
    rng: &mut R,
    out: &mut [f32],
    channels: usize,
) -> Waveform {
    let waveform = Waveform::for_phase(phase.value(), config.note_frequency);
    let step = config.phase_step();

    for frame in out.chunks_exact_mut(channels.max(1)) {
        let x = phase.advance(step);
        frame.fill(waveform.sample(x, rng));
    }

    waveform
}

/// Stream callback producing the band-switching waveform demo
pub struct WaveformSynth {
    config: SynthConfig,
    phase: PhaseAccumulator,
    rng: StdRng,
    frames_rendered: u64,
}

impl WaveformSynth {
    /// Create a synth with entropy-seeded noise
    pub fn new(config: SynthConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a synth with reproducible noise
    pub fn seeded(config: SynthConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SynthConfig, rng: StdRng) -> Self {
        Self {
            config,
            phase: PhaseAccumulator::new(),
            rng,
            frames_rendered: 0,
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn phase(&self) -> PhaseAccumulator {
        self.phase
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Fill one float block; returns the waveform used
    pub fn render(&mut self, out: &mut [f32]) -> Waveform {
        let channels = self.config.channels as usize;
        self.frames_rendered += (out.len() / channels.max(1)) as u64;
        render_block(&mut self.phase, &self.config, &mut self.rng, out, channels)
    }
}

impl StreamCallback for WaveformSynth {
    fn process(&mut self, ctx: &mut CallbackContext<'_>) -> Result<StreamStatus> {
        match &mut ctx.output {
            SamplesMut::F32(out) => {
                self.render(out);
                Ok(StreamStatus::Continue)
            }
            other => Err(Error::UnsupportedFormat(format!(
                "waveform synthesis needs an f32 stream, got {}",
                other.format().name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TimeInfo;

    #[test]
    fn test_accumulator_tracks_frames() {
        let config = SynthConfig::default();
        let mut synth = WaveformSynth::seeded(config, 7);
        let mut block = vec![0.0f32; 256 * 2];

        // Long enough to cross every band
        for _ in 0..2_000 {
            synth.render(&mut block);
        }

        let frames = 2_000.0 * 256.0;
        let expected = frames * config.note_frequency / config.sample_rate as f64;
        let actual = synth.phase().value();
        assert!((actual - expected).abs() < 1e-6 * expected);
        assert_eq!(synth.frames_rendered(), 2_000 * 256);
    }

    #[test]
    fn test_channels_carry_same_value() {
        let config = SynthConfig::default();
        let mut phase = PhaseAccumulator::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut block = vec![0.0f32; 64 * 2];

        let waveform = render_block(&mut phase, &config, &mut rng, &mut block, 2);
        assert_eq!(waveform, Waveform::Sawtooth);
        for frame in block.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_block_uses_band_at_block_start() {
        let config = SynthConfig {
            note_frequency: 1.0,
            sample_rate: 4,
            channels: 1,
        };
        let mut phase = PhaseAccumulator::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut block = [0.0f32; 6];

        // Starts in the sawtooth band and runs past 1.0 without switching
        assert_eq!(render_block(&mut phase, &config, &mut rng, &mut block, 1), Waveform::Sawtooth);
        assert!((phase.value() - 1.5).abs() < 1e-12);
        assert_eq!(render_block(&mut phase, &config, &mut rng, &mut block[..2], 1), Waveform::Sine);
        assert_eq!(render_block(&mut phase, &config, &mut rng, &mut block[..4], 1), Waveform::Square);
        assert!((phase.value() - 3.0).abs() < 1e-12);
        assert_eq!(render_block(&mut phase, &config, &mut rng, &mut block, 1), Waveform::WhiteNoise);
        assert!(block.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_rejects_integer_stream() {
        let mut synth = WaveformSynth::seeded(SynthConfig::default(), 1);
        let mut buf = [0i16; 8];
        let mut ctx = CallbackContext {
            input: None,
            output: SamplesMut::I16(&mut buf),
            time: TimeInfo::default(),
            frames: 4,
        };
        assert!(matches!(synth.process(&mut ctx), Err(Error::UnsupportedFormat(_))));
    }
}
