//! Audio module - the callback-streaming binding over cpal
//!
//! This module provides:
//! - Engine initialization and host/device queries
//! - Streams with a fixed format and a fixed block size per callback
//! - The block adapter that keeps callback blocks exact on any device
//! - Lock-free queues between the audio thread and the main thread

mod adapter;
mod buffer;
mod callback;
mod engine;
mod format;
mod stream;

// Re-export public types
pub use callback::{BoxedCallback, CallbackContext, StreamCallback, StreamStatus, TimeInfo};
pub use engine::{
    host_api_count, host_api_info, sleep, version, version_text, AudioEngine, DeviceInfo,
    HostApiInfo,
};
pub use format::{SampleFormat, Samples, SamplesMut, StreamParameters, StreamSample};
pub use stream::{Stream, StreamInfo, StreamState};
