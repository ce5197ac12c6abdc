//! Stream callback contract
//!
//! The engine invokes a [`StreamCallback`] on the audio thread once per
//! block of `frames_per_buffer` frames. The callback fills the output
//! block (or consumes the input block) and reports whether the stream
//! should keep going.

use std::time::Duration;

use super::format::{Samples, SamplesMut};
use crate::error::Result;

/// What the engine should do after a callback returns
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StreamStatus {
    /// Keep invoking the callback
    Continue,
    /// Play the block just produced, then stop invoking the callback
    Complete,
    /// Stop immediately, discarding the block just produced
    Abort,
}

/// Timing for one callback invocation, in seconds on the stream clock
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeInfo {
    /// When the callback was invoked
    pub current_time: f64,
    /// When the first input sample of the block was captured (0.0 without input)
    pub input_buffer_adc_time: f64,
    /// When the first output sample of the block will reach the DAC (0.0 without output)
    pub output_buffer_dac_time: f64,
    /// Device-reported output latency estimate
    pub output_latency: Duration,
}

/// Per-invocation view handed to the callback
///
/// Buffers are borrowed for the duration of the call only.
pub struct CallbackContext<'a> {
    /// Input block, `None` for output-only streams
    pub input: Option<Samples<'a>>,
    /// Output block, empty for input-only streams
    pub output: SamplesMut<'a>,
    pub time: TimeInfo,
    /// Frames in this block
    pub frames: usize,
}

/// Real-time callback driven by the engine's audio thread
///
/// Implementations must not block or allocate; the deadline per call is
/// `frames_per_buffer / sample_rate` seconds. State the callback needs
/// across invocations lives in the implementing type.
pub trait StreamCallback: Send {
    /// Fill `ctx.output` (and/or read `ctx.input`)
    ///
    /// Returning `Err` stops the stream as if [`StreamStatus::Abort`] had
    /// been returned; the error is queued for the main thread.
    fn process(&mut self, ctx: &mut CallbackContext<'_>) -> Result<StreamStatus>;
}

impl<F> StreamCallback for F
where
    F: FnMut(&mut CallbackContext<'_>) -> Result<StreamStatus> + Send,
{
    fn process(&mut self, ctx: &mut CallbackContext<'_>) -> Result<StreamStatus> {
        self(ctx)
    }
}

/// A boxed callback for dynamic dispatch
pub type BoxedCallback = Box<dyn StreamCallback>;
