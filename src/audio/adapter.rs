//! Block adapter - turns device-sized cpal callbacks into fixed-size blocks
//!
//! cpal hands the audio thread buffers of whatever size the backend picks.
//! The adapter stages exactly `frames_per_buffer` frames at a time: when the
//! staged output block runs out it invokes the user callback for the next
//! one, so the callback always sees full blocks. All staging memory is
//! allocated when the stream is opened.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::buffer::{ErrorSender, InputConsumer};
use super::callback::{BoxedCallback, CallbackContext, StreamStatus, TimeInfo};
use super::format::{StreamParameters, StreamSample};
use super::stream::StreamShared;

/// Device timing for one cpal callback, on the stream clock
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DeviceTiming {
    /// Stream clock when the device callback fired
    pub current_time: f64,
    /// Capture-to-callback latency (input side)
    pub input_latency: Duration,
    /// Callback-to-playback latency (output side)
    pub output_latency: Duration,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    /// Invoking the callback for every block
    Running,
    /// Callback returned Complete; the last block is still playing
    Draining,
    /// Nothing left to play
    Finished,
}

pub(crate) struct BlockAdapter<T: StreamSample> {
    callback: BoxedCallback,
    params: StreamParameters,
    /// Staged output, `frames_per_buffer × output_channels`
    output_block: Vec<T>,
    /// Staged input, `frames_per_buffer × input_channels`
    input_block: Vec<T>,
    /// Next output sample to hand to the device
    cursor: usize,
    /// Input samples collected toward the next block (input-only streams)
    input_fill: usize,
    phase: Phase,
    generation: u64,
    shared: Arc<StreamShared>,
    errors: ErrorSender,
    /// Captured samples from the input device of a full-duplex stream
    bridge: Option<InputConsumer<T>>,
}

impl<T: StreamSample> BlockAdapter<T> {
    pub(crate) fn new(
        callback: BoxedCallback,
        params: StreamParameters,
        shared: Arc<StreamShared>,
        errors: ErrorSender,
    ) -> Self {
        let output_len = params.output_block_len();
        Self {
            callback,
            params,
            output_block: vec![T::EQUILIBRIUM; output_len],
            input_block: vec![T::EQUILIBRIUM; params.input_block_len()],
            cursor: output_len,
            input_fill: 0,
            phase: Phase::Running,
            generation: shared.generation(),
            shared,
            errors,
            bridge: None,
        }
    }

    /// Feed the input block from a duplex bridge instead of `push_input`
    pub(crate) fn with_input_bridge(mut self, bridge: InputConsumer<T>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Fill a device output buffer, invoking the callback as blocks run out
    pub(crate) fn fill_output(&mut self, data: &mut [T], timing: DeviceTiming) {
        self.sync_generation();
        self.shared.set_output_latency(timing.output_latency);

        if self.shared.abort_requested() || self.output_block.is_empty() {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let mut written = 0;
        while written < data.len() {
            if self.cursor >= self.output_block.len() {
                let offset_frames = written / self.params.output_channels as usize;
                if !self.next_output_block(timing, offset_frames) {
                    data[written..].fill(T::EQUILIBRIUM);
                    return;
                }
            }

            let n = (self.output_block.len() - self.cursor).min(data.len() - written);
            data[written..written + n]
                .copy_from_slice(&self.output_block[self.cursor..self.cursor + n]);
            self.cursor += n;
            written += n;
        }
    }

    /// Fill a device output buffer in the device's own format and layout
    ///
    /// When the device matches the stream this is [`Self::fill_output`].
    /// Otherwise each staged frame is converted to the device format and
    /// its channels repeated across the device frame, so a mono stream
    /// plays on every speaker.
    pub(crate) fn fill_device<D: StreamSample>(
        &mut self,
        data: &mut [D],
        device_channels: usize,
        timing: DeviceTiming,
    ) {
        let channels = self.params.output_channels as usize;
        if device_channels == channels {
            if let Some(native) = T::unwrap_mut(D::wrap_mut(data)) {
                self.fill_output(native, timing);
                return;
            }
        }

        self.sync_generation();
        self.shared.set_output_latency(timing.output_latency);

        if self.shared.abort_requested() || self.output_block.is_empty() || device_channels == 0 {
            data.fill(D::EQUILIBRIUM);
            return;
        }

        let frames = data.len() / device_channels;
        for index in 0..frames {
            if self.cursor >= self.output_block.len() && !self.next_output_block(timing, index) {
                data[index * device_channels..].fill(D::EQUILIBRIUM);
                return;
            }

            let staged = &self.output_block[self.cursor..self.cursor + channels];
            let frame = &mut data[index * device_channels..(index + 1) * device_channels];
            for (channel, slot) in frame.iter_mut().enumerate() {
                *slot = staged[channel % channels].convert();
            }
            self.cursor += channels;
        }
        data[frames * device_channels..].fill(D::EQUILIBRIUM);
    }

    /// Consume a device input buffer in the device's own format and layout
    ///
    /// Samples are converted to the stream format and only the first
    /// `input_channels` of each device frame are kept.
    pub(crate) fn push_device<D: StreamSample>(
        &mut self,
        data: &[D],
        device_channels: usize,
        timing: DeviceTiming,
    ) {
        let channels = self.params.input_channels as usize;
        if device_channels == channels {
            if let Some(native) = T::unwrap(D::wrap(data)) {
                self.push_input(native, timing);
                return;
            }
        }

        self.sync_generation();
        self.shared.set_input_latency(timing.input_latency);

        if self.shared.abort_requested() || self.input_block.is_empty() || device_channels < channels {
            return;
        }

        for frame in data.chunks_exact(device_channels) {
            if self.phase != Phase::Running {
                return;
            }
            let slots = &mut self.input_block[self.input_fill..self.input_fill + channels];
            for (slot, sample) in slots.iter_mut().zip(frame) {
                *slot = sample.convert();
            }
            self.input_fill += channels;
            if self.input_fill == self.input_block.len() {
                self.input_block_ready(timing);
            }
        }
    }

    /// Consume a device input buffer of an input-only stream
    pub(crate) fn push_input(&mut self, data: &[T], timing: DeviceTiming) {
        self.sync_generation();
        self.shared.set_input_latency(timing.input_latency);

        if self.shared.abort_requested() || self.input_block.is_empty() {
            return;
        }

        let mut read = 0;
        while read < data.len() && self.phase == Phase::Running {
            let n = (self.input_block.len() - self.input_fill).min(data.len() - read);
            self.input_block[self.input_fill..self.input_fill + n]
                .copy_from_slice(&data[read..read + n]);
            self.input_fill += n;
            read += n;

            if self.input_fill == self.input_block.len() {
                self.input_block_ready(timing);
            }
        }
    }

    /// Hand a full input block to the callback
    fn input_block_ready(&mut self, timing: DeviceTiming) {
        self.input_fill = 0;
        if self.shared.stop_requested() || self.invoke(timing, 0) != StreamStatus::Continue {
            self.finish();
        }
    }

    /// Reset after the stream was (re)started from the main thread
    fn sync_generation(&mut self) {
        let generation = self.shared.generation();
        if generation != self.generation {
            self.generation = generation;
            self.phase = Phase::Running;
            self.cursor = self.output_block.len();
            self.input_fill = 0;
        }
    }

    /// Stage the next output block; `false` once there is nothing left to play
    fn next_output_block(&mut self, timing: DeviceTiming, offset_frames: usize) -> bool {
        match self.phase {
            Phase::Finished => return false,
            Phase::Draining => {
                self.finish();
                return false;
            }
            Phase::Running => {}
        }

        if self.shared.stop_requested() {
            self.finish();
            return false;
        }

        match self.invoke(timing, offset_frames) {
            StreamStatus::Continue => {}
            StreamStatus::Complete => self.phase = Phase::Draining,
            StreamStatus::Abort => {
                self.finish();
                return false;
            }
        }
        self.cursor = 0;
        true
    }

    /// Run the user callback for one block
    fn invoke(&mut self, timing: DeviceTiming, offset_frames: usize) -> StreamStatus {
        let started = Instant::now();
        let frames = self.params.frames_per_buffer as usize;
        let rate = self.params.sample_rate as f64;

        self.output_block.fill(T::EQUILIBRIUM);
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.pop_block(&mut self.input_block);
        }

        let offset = offset_frames as f64 / rate;
        let time = TimeInfo {
            current_time: timing.current_time,
            input_buffer_adc_time: if self.input_block.is_empty() {
                0.0
            } else {
                timing.current_time - timing.input_latency.as_secs_f64()
            },
            output_buffer_dac_time: if self.output_block.is_empty() {
                0.0
            } else {
                timing.current_time + timing.output_latency.as_secs_f64() + offset
            },
            output_latency: timing.output_latency,
        };

        let input = if self.input_block.is_empty() {
            None
        } else {
            Some(T::wrap(&self.input_block))
        };
        let mut ctx = CallbackContext {
            input,
            output: T::wrap_mut(&mut self.output_block),
            time,
            frames,
        };

        let status = match self.callback.process(&mut ctx) {
            Ok(status) => status,
            Err(err) => {
                log::error!("Stream callback failed: {}", err);
                if !self.errors.send(err) {
                    log::error!("Stream error queue full, dropping error");
                }
                StreamStatus::Abort
            }
        };

        self.shared
            .record_block(frames, started.elapsed(), self.params.block_period());
        status
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.shared.mark_completed();
    }
}
