//! Stream handle and the state it shares with the audio thread

use cpal::traits::StreamTrait;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::buffer::ErrorReceiver;
use super::engine::AudioEngine;
use super::format::StreamParameters;
use crate::error::{Error, Result};

/// How often `stop()` checks whether the pending block has drained
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Lifecycle of a stream
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum StreamState {
    /// Opened, never started
    Ready = 0,
    /// The callback is being invoked
    Active = 1,
    /// The callback returned Complete or Abort and the stream went quiet
    Completed = 2,
    /// Stopped or aborted from the main thread
    Stopped = 3,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Ready,
            1 => StreamState::Active,
            2 => StreamState::Completed,
            _ => StreamState::Stopped,
        }
    }
}

/// Latency and rate reported for an open stream
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamInfo {
    /// 0 for output-only streams
    pub input_latency: Duration,
    /// 0 for input-only streams
    pub output_latency: Duration,
    pub sample_rate: f64,
}

/// State shared between a [`Stream`] handle and its audio-thread adapter
///
/// Every field is atomic; neither side ever waits on the other.
pub(crate) struct StreamShared {
    state: AtomicU8,
    /// Bumped on every start so the adapter can reset itself
    generation: AtomicU64,
    stop_requested: AtomicBool,
    abort_requested: AtomicBool,
    /// Set by the device error callback; the device stopped calling back
    device_lost: AtomicBool,
    input_latency_nanos: AtomicU64,
    output_latency_nanos: AtomicU64,
    cpu_load_bits: AtomicU32,
    frames_processed: AtomicU64,
    opened_at: Instant,
}

impl StreamShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Ready as u8),
            generation: AtomicU64::new(0),
            stop_requested: AtomicBool::new(false),
            abort_requested: AtomicBool::new(false),
            device_lost: AtomicBool::new(false),
            input_latency_nanos: AtomicU64::new(0),
            output_latency_nanos: AtomicU64::new(0),
            cpu_load_bits: AtomicU32::new(0.0f32.to_bits()),
            frames_processed: AtomicU64::new(0),
            opened_at: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Enter the active state and invalidate the adapter's previous run
    ///
    /// The state is Active before the new generation is visible, so a run
    /// the adapter finishes right after resetting can always complete it.
    pub(crate) fn begin(&self) {
        self.stop_requested.store(false, Ordering::Release);
        self.abort_requested.store(false, Ordering::Release);
        self.state.store(StreamState::Active as u8, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }

    /// Called by the adapter once the callback has finished and drained
    ///
    /// Only moves Active -> Completed so a concurrent stop/abort wins.
    pub(crate) fn mark_completed(&self) {
        let _ = self.state.compare_exchange(
            StreamState::Active as u8,
            StreamState::Completed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// The device went away and will not call back again
    pub(crate) fn mark_device_lost(&self) {
        self.device_lost.store(true, Ordering::Release);
        self.mark_completed();
    }

    pub(crate) fn device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.state.store(StreamState::Stopped as u8, Ordering::Release);
    }

    /// Seconds since the stream was opened
    pub(crate) fn elapsed_secs(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    pub(crate) fn set_output_latency(&self, latency: Duration) {
        self.output_latency_nanos
            .store(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn output_latency(&self) -> Duration {
        Duration::from_nanos(self.output_latency_nanos.load(Ordering::Relaxed))
    }

    pub(crate) fn set_input_latency(&self, latency: Duration) {
        self.input_latency_nanos
            .store(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn input_latency(&self) -> Duration {
        Duration::from_nanos(self.input_latency_nanos.load(Ordering::Relaxed))
    }

    /// Record one callback invocation: frames produced and time spent
    pub(crate) fn record_block(&self, frames: usize, spent: Duration, period: f64) {
        self.frames_processed
            .fetch_add(frames as u64, Ordering::Relaxed);
        let load = if period > 0.0 {
            (spent.as_secs_f64() / period) as f32
        } else {
            0.0
        };
        self.cpu_load_bits.store(load.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn cpu_load(&self) -> f32 {
        f32::from_bits(self.cpu_load_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }
}

/// One open audio stream
///
/// Borrows the engine that opened it, so it is always closed before the
/// engine terminates. Dropping an active stream aborts it.
pub struct Stream<'engine> {
    input: Option<cpal::Stream>,
    output: Option<cpal::Stream>,
    shared: Arc<StreamShared>,
    /// Callback errors first, then one queue per device stream
    errors: Vec<ErrorReceiver>,
    params: StreamParameters,
    _engine: PhantomData<&'engine AudioEngine>,
}

impl<'engine> Stream<'engine> {
    pub(crate) fn new(
        input: Option<cpal::Stream>,
        output: Option<cpal::Stream>,
        shared: Arc<StreamShared>,
        errors: Vec<ErrorReceiver>,
        params: StreamParameters,
    ) -> Self {
        Self {
            input,
            output,
            shared,
            errors,
            params,
            _engine: PhantomData,
        }
    }

    pub fn parameters(&self) -> &StreamParameters {
        &self.params
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Commence audio processing
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::Stream("stream is already active".to_string()));
        }
        if self.shared.device_lost() {
            return Err(Error::Device("device is no longer available".to_string()));
        }

        // A completed stream is still running on the device; quiet it
        // before the adapter is reset
        if self.shared.state() == StreamState::Completed {
            self.pause_all()?;
        }
        self.shared.begin();
        for stream in self.input.iter().chain(self.output.iter()) {
            if let Err(e) = stream.play() {
                self.shared.mark_stopped();
                log::error!("Failed to start stream: {}", e);
                return Err(e.into());
            }
        }

        log::info!(
            "Stream started: {} in / {} out, {} Hz, {} frames per buffer",
            self.params.input_channels,
            self.params.output_channels,
            self.params.sample_rate,
            self.params.frames_per_buffer
        );
        Ok(())
    }

    /// Stop invoking the callback, let the pending block play out, then pause
    pub fn stop(&mut self) -> Result<()> {
        if self.shared.state() == StreamState::Active {
            self.shared.request_stop();

            // One block still has to reach the device, plus the device's own buffer
            let budget = Duration::from_secs_f64(self.params.block_period() * 4.0)
                + self.shared.output_latency()
                + Duration::from_millis(200);
            let deadline = Instant::now() + budget;
            while self.shared.state() == StreamState::Active {
                if Instant::now() >= deadline {
                    log::warn!("Stream did not drain within {:?}, pausing anyway", budget);
                    break;
                }
                std::thread::sleep(DRAIN_POLL_INTERVAL);
            }
        }

        self.pause_all()?;
        self.shared.mark_stopped();
        log::info!("Stream stopped");
        Ok(())
    }

    /// Stop immediately, discarding anything not yet played
    pub fn abort(&mut self) -> Result<()> {
        self.shared.request_abort();
        self.pause_all()?;
        self.shared.mark_stopped();
        log::info!("Stream aborted");
        Ok(())
    }

    /// Close the stream, aborting it first if it is still active
    pub fn close(mut self) -> Result<()> {
        if self.is_active() {
            self.abort()?;
        }
        self.input = None;
        self.output = None;
        Ok(())
    }

    /// Whether the engine is still invoking the callback
    pub fn is_active(&self) -> bool {
        self.shared.state() == StreamState::Active
    }

    /// Whether the stream is not running (never started, completed, stopped or aborted)
    pub fn is_stopped(&self) -> bool {
        !self.is_active()
    }

    /// Monotonic stream clock in seconds, starting when the stream was opened
    pub fn time(&self) -> f64 {
        self.shared.elapsed_secs()
    }

    /// Fraction of the block period the last callback invocation consumed
    pub fn cpu_load(&self) -> f32 {
        self.shared.cpu_load()
    }

    /// Frames handed to or taken from the callback since opening
    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed()
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            input_latency: self.shared.input_latency(),
            output_latency: self.shared.output_latency(),
            sample_rate: self.params.sample_rate as f64,
        }
    }

    /// Take the oldest error raised by the callback or the device, if any
    pub fn take_error(&mut self) -> Option<Error> {
        self.errors.iter_mut().find_map(|errors| errors.take())
    }

    fn pause_all(&self) -> Result<()> {
        for stream in self.output.iter().chain(self.input.iter()) {
            stream.pause()?;
        }
        Ok(())
    }
}

impl Drop for Stream<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.abort() {
                log::warn!("Failed to abort stream on close: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::{ErrorQueue, ErrorSender};
    use crate::audio::format::SampleFormat;

    #[test]
    fn test_completion_only_from_active() {
        let shared = StreamShared::new();
        assert_eq!(shared.state(), StreamState::Ready);

        shared.mark_completed();
        assert_eq!(shared.state(), StreamState::Ready);

        shared.begin();
        assert_eq!(shared.state(), StreamState::Active);
        shared.mark_completed();
        assert_eq!(shared.state(), StreamState::Completed);
    }

    #[test]
    fn test_stop_wins_over_late_completion() {
        let shared = StreamShared::new();
        shared.begin();
        shared.mark_stopped();
        shared.mark_completed();
        assert_eq!(shared.state(), StreamState::Stopped);
    }

    #[test]
    fn test_begin_clears_requests_and_bumps_generation() {
        let shared = StreamShared::new();
        shared.request_stop();
        shared.request_abort();
        let before = shared.generation();

        shared.begin();
        assert!(!shared.stop_requested());
        assert!(!shared.abort_requested());
        assert_eq!(shared.generation(), before + 1);
    }

    fn detached_stream(shared: &Arc<StreamShared>) -> (Stream<'static>, ErrorSender) {
        let (sender, receiver) = ErrorQueue::new();
        let params = StreamParameters::output(2, SampleFormat::F32, 48000, 128);
        let stream = Stream::new(None, None, Arc::clone(shared), vec![receiver], params);
        (stream, sender)
    }

    #[test]
    fn test_device_loss_ends_active_stream() {
        let shared = StreamShared::new();
        shared.begin();
        shared.mark_device_lost();
        assert_eq!(shared.state(), StreamState::Completed);
        assert!(shared.device_lost());

        // Survives a restart attempt on the shared state
        shared.begin();
        assert!(shared.device_lost());
    }

    #[test]
    fn test_device_error_reaches_take_error() {
        let shared = Arc::new(StreamShared::new());
        let (mut stream, mut device_errors) = detached_stream(&shared);
        stream.start().unwrap();
        assert!(stream.is_active());

        device_errors.send(Error::Device("device unplugged".to_string()));
        shared.mark_device_lost();

        assert!(stream.is_stopped());
        assert!(matches!(stream.take_error(), Some(Error::Device(_))));
        assert!(stream.take_error().is_none());
        assert!(matches!(stream.start(), Err(Error::Device(_))));
    }

    #[test]
    fn test_restart_after_completion() {
        let shared = Arc::new(StreamShared::new());
        let (mut stream, _errors) = detached_stream(&shared);
        assert!(stream.is_stopped());

        stream.start().unwrap();
        assert!(matches!(stream.start(), Err(Error::Stream(_))));
        let generation = shared.generation();
        shared.mark_completed();
        assert!(stream.is_stopped());

        stream.start().unwrap();
        assert!(stream.is_active());
        assert_eq!(shared.generation(), generation + 1);
        stream.close().unwrap();
    }

    #[test]
    fn test_time_is_monotonic() {
        let shared = Arc::new(StreamShared::new());
        let (stream, _errors) = detached_stream(&shared);
        let first = stream.time();
        std::thread::sleep(Duration::from_millis(5));
        let second = stream.time();
        assert!(first >= 0.0);
        assert!(second > first);
        assert_eq!(stream.info().sample_rate, 48000.0);
    }

    #[test]
    fn test_unwinding_aborts_active_stream() {
        let shared = Arc::new(StreamShared::new());
        let (mut stream, _errors) = detached_stream(&shared);
        stream.start().unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _stream = stream;
            panic!("playback failed");
        }));
        assert!(result.is_err());
        assert!(shared.abort_requested());
        assert_eq!(shared.state(), StreamState::Stopped);
    }

    #[test]
    fn test_cpu_load_is_fraction_of_period() {
        let shared = StreamShared::new();
        shared.record_block(256, Duration::from_millis(1), 0.004);
        assert!((shared.cpu_load() - 0.25).abs() < 1e-6);
        assert_eq!(shared.frames_processed(), 256);
    }
}
