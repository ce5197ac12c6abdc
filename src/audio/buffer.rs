//! Lock-free queues between the audio threads and the main thread
//!
//! Two single-producer/single-consumer rings are used:
//! - [`InputBridge`] carries captured samples from the input device's
//!   thread to the output callback of a full-duplex stream
//! - [`ErrorQueue`] carries callback failures from the audio thread to
//!   the stream handle
//!
//! Both sides only use `try_*` operations, so the audio thread never waits.

use ringbuf::{traits::*, HeapRb};

use super::format::StreamSample;
use crate::error::Error;

/// How many callback errors are kept before new ones are dropped
const ERROR_QUEUE_CAPACITY: usize = 8;

/// Split ring carrying captured input samples to the output side
pub struct InputBridge;

impl InputBridge {
    /// Create a producer/consumer pair holding `capacity` samples
    pub fn new<T: StreamSample>(capacity: usize) -> (InputProducer<T>, InputConsumer<T>) {
        let (producer, consumer) = HeapRb::new(capacity.max(1)).split();
        (InputProducer { inner: producer }, InputConsumer { inner: consumer })
    }
}

/// Producer side - used by the input device callback
pub struct InputProducer<T: StreamSample> {
    inner: ringbuf::HeapProd<T>,
}

impl<T: StreamSample> InputProducer<T> {
    /// Push captured samples, returns how many fit
    ///
    /// Samples that don't fit are dropped; the consumer pads the gap.
    pub fn push_slice(&mut self, samples: &[T]) -> usize {
        self.inner.push_slice(samples)
    }

    /// Push captured device frames, converting to the stream format
    ///
    /// Keeps the first `channels` samples of each `device_channels` frame.
    /// Stops at the first frame that doesn't fit whole, so the ring stays
    /// frame-aligned. Returns how many samples were pushed.
    pub fn push_frames<D: StreamSample>(
        &mut self,
        data: &[D],
        device_channels: usize,
        channels: usize,
    ) -> usize {
        if device_channels == channels {
            if let Some(native) = T::unwrap(D::wrap(data)) {
                return self.push_slice(native);
            }
        }
        if device_channels < channels {
            return 0;
        }

        let mut pushed = 0;
        for frame in data.chunks_exact(device_channels) {
            if self.inner.vacant_len() < channels {
                break;
            }
            for sample in &frame[..channels] {
                let _ = self.inner.try_push(sample.convert());
            }
            pushed += channels;
        }
        pushed
    }

    pub fn available(&self) -> usize {
        self.inner.vacant_len()
    }
}

/// Consumer side - used by the output block adapter
pub struct InputConsumer<T: StreamSample> {
    inner: ringbuf::HeapCons<T>,
}

impl<T: StreamSample> InputConsumer<T> {
    /// Fill `block` from the ring, padding with silence on underflow
    ///
    /// Returns the number of real samples copied.
    pub fn pop_block(&mut self, block: &mut [T]) -> usize {
        let copied = self.inner.pop_slice(block);
        block[copied..].fill(T::EQUILIBRIUM);
        copied
    }

    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

/// Split ring carrying callback errors to the main thread
pub struct ErrorQueue;

impl ErrorQueue {
    pub fn new() -> (ErrorSender, ErrorReceiver) {
        let (producer, consumer) = HeapRb::new(ERROR_QUEUE_CAPACITY).split();
        (ErrorSender { inner: producer }, ErrorReceiver { inner: consumer })
    }
}

/// Audio-thread side of the error queue
pub struct ErrorSender {
    inner: ringbuf::HeapProd<Error>,
}

impl ErrorSender {
    /// Queue an error, returns `false` if the queue was full
    pub fn send(&mut self, err: Error) -> bool {
        self.inner.try_push(err).is_ok()
    }
}

/// Main-thread side of the error queue
pub struct ErrorReceiver {
    inner: ringbuf::HeapCons<Error>,
}

impl ErrorReceiver {
    /// Take the oldest queued error, if any
    pub fn take(&mut self) -> Option<Error> {
        self.inner.try_pop()
    }
}
