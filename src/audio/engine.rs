//! Audio engine - process-wide cpal host and stream construction
//!
//! This module provides the entry point of the binding: initialize the
//! engine, open streams against the default or a named device, and query
//! host APIs and devices.

use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Arc;
use std::time::Duration;

use super::adapter::{BlockAdapter, DeviceTiming};
use super::buffer::{ErrorQueue, ErrorReceiver, ErrorSender, InputBridge, InputProducer};
use super::callback::{BoxedCallback, StreamCallback};
use super::format::{SampleFormat, StreamParameters, StreamSample};
use super::stream::{Stream, StreamShared};
use crate::error::{Error, Result};

/// Input blocks the duplex bridge can hold before dropping samples
const BRIDGE_BLOCKS: usize = 4;

/// Call `$build::<T, D>(args)` with `D` the sample type of a device format
macro_rules! with_device_sample {
    ($format:expr, $build:ident, $t:ty, ($($arg:expr),* $(,)?)) => {
        match $format {
            SampleFormat::U8 => $build::<$t, u8>($($arg),*),
            SampleFormat::I8 => $build::<$t, i8>($($arg),*),
            SampleFormat::I16 => $build::<$t, i16>($($arg),*),
            SampleFormat::I32 => $build::<$t, i32>($($arg),*),
            SampleFormat::F32 => $build::<$t, f32>($($arg),*),
        }
    };
}

/// Description of one host API (ALSA, CoreAudio, WASAPI, ...)
#[derive(Clone, Debug)]
pub struct HostApiInfo {
    pub name: String,
    pub device_count: usize,
    pub default_input_device: Option<String>,
    pub default_output_device: Option<String>,
}

/// An output device of the engine's host
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Process-wide audio subsystem
///
/// Initialize once; every [`Stream`] borrows the engine, so all streams are
/// closed before it terminates. Dropping the engine terminates it.
pub struct AudioEngine {
    host: cpal::Host,
}

impl AudioEngine {
    /// Set up the audio subsystem using the platform's default host
    pub fn initialize() -> Result<Self> {
        if cpal::available_hosts().is_empty() {
            return Err(Error::Device("No audio host available".to_string()));
        }
        let host = cpal::default_host();
        log::info!("Audio engine initialized (host: {})", host.id().name());
        Ok(Self { host })
    }

    /// Tear down the audio subsystem
    pub fn terminate(self) {
        drop(self);
    }

    /// Name of the host API in use
    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    /// List the output devices of this engine's host
    pub fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());

        let mut result = Vec::new();
        for device in self.host.output_devices()? {
            if let Ok(name) = device.name() {
                result.push(DeviceInfo {
                    is_default: Some(&name) == default_name.as_ref(),
                    name,
                });
            }
        }
        Ok(result)
    }

    /// Open a stream on the default input and/or output device
    pub fn open_default_stream<C>(&self, params: StreamParameters, callback: C) -> Result<Stream<'_>>
    where
        C: StreamCallback + 'static,
    {
        self.open_stream(None, params, callback)
    }

    /// Open a stream on the named device, or the default one when `None`
    pub fn open_stream<C>(
        &self,
        device_name: Option<&str>,
        params: StreamParameters,
        callback: C,
    ) -> Result<Stream<'_>>
    where
        C: StreamCallback + 'static,
    {
        params.validate()?;

        let output_device = match params.output_channels {
            0 => None,
            _ => Some(self.find_device(device_name, Direction::Output)?),
        };
        let input_device = match params.input_channels {
            0 => None,
            _ => Some(self.find_device(device_name, Direction::Input)?),
        };

        if let Some(device) = &output_device {
            log::info!(
                "Using output device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );
        }
        if let Some(device) = &input_device {
            log::info!(
                "Using input device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );
        }

        let shared = Arc::new(StreamShared::new());
        let (sender, receiver) = ErrorQueue::new();
        let callback: BoxedCallback = Box::new(callback);
        let devices = (input_device.as_ref(), output_device.as_ref());

        let streams = match params.sample_format {
            SampleFormat::U8 => build_streams::<u8>(devices, params, callback, &shared, sender)?,
            SampleFormat::I8 => build_streams::<i8>(devices, params, callback, &shared, sender)?,
            SampleFormat::I16 => build_streams::<i16>(devices, params, callback, &shared, sender)?,
            SampleFormat::I32 => build_streams::<i32>(devices, params, callback, &shared, sender)?,
            SampleFormat::F32 => build_streams::<f32>(devices, params, callback, &shared, sender)?,
        };

        log::info!(
            "Stream opened: {} format, {} Hz, {} frames per buffer",
            params.sample_format.name(),
            params.sample_rate,
            params.frames_per_buffer
        );
        let mut errors = vec![receiver];
        errors.extend(streams.errors);
        Ok(Stream::new(streams.input, streams.output, shared, errors, params))
    }

    fn find_device(&self, name: Option<&str>, direction: Direction) -> Result<cpal::Device> {
        let Some(name) = name else {
            let device = match direction {
                Direction::Output => self.host.default_output_device(),
                Direction::Input => self.host.default_input_device(),
            };
            return device.ok_or_else(|| {
                Error::Device(format!("No default {} device found", direction.name()))
            });
        };

        let named = |d: &cpal::Device| d.name().map(|n| n == name).unwrap_or(false);
        let found = match direction {
            Direction::Output => self.host.output_devices()?.find(|d| named(d)),
            Direction::Input => self.host.input_devices()?.find(|d| named(d)),
        };
        found.ok_or_else(|| Error::Device(format!("Device '{}' not found", name)))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        log::info!("Audio engine terminated");
    }
}

/// Number of host APIs compiled into this build
pub fn host_api_count() -> usize {
    cpal::available_hosts().len()
}

/// Describe the host API at `index` (see [`host_api_count`])
pub fn host_api_info(index: usize) -> Result<HostApiInfo> {
    let id = cpal::available_hosts()
        .get(index)
        .copied()
        .ok_or_else(|| Error::Device(format!("No host API at index {}", index)))?;
    let host = cpal::host_from_id(id).map_err(|e| Error::Device(e.to_string()))?;

    Ok(HostApiInfo {
        name: id.name().to_string(),
        device_count: host.devices()?.count(),
        default_input_device: host.default_input_device().and_then(|d| d.name().ok()),
        default_output_device: host.default_output_device().and_then(|d| d.name().ok()),
    })
}

/// Release number of this crate, e.g. 100 for 0.1.0
pub fn version() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Human-readable build description
pub fn version_text() -> &'static str {
    concat!("audiostream ", env!("CARGO_PKG_VERSION"))
}

/// Sleep the calling thread for at least `msec` milliseconds
///
/// Not accurate enough for musical timing.
pub fn sleep(msec: u64) {
    std::thread::sleep(Duration::from_millis(msec));
}

/// The cpal streams behind one [`Stream`], with their device error queues
struct DeviceStreams {
    input: Option<cpal::Stream>,
    output: Option<cpal::Stream>,
    errors: Vec<ErrorReceiver>,
}

/// Build the cpal stream(s) for one sample type
fn build_streams<T: StreamSample>(
    (input_device, output_device): (Option<&cpal::Device>, Option<&cpal::Device>),
    params: StreamParameters,
    callback: BoxedCallback,
    shared: &Arc<StreamShared>,
    errors: ErrorSender,
) -> Result<DeviceStreams> {
    let adapter = BlockAdapter::<T>::new(callback, params, Arc::clone(shared), errors);
    let mut streams = DeviceStreams {
        input: None,
        output: None,
        errors: Vec::new(),
    };

    match (input_device, output_device) {
        (None, Some(output)) => {
            let stream = build_output(output, &params, adapter, shared, &mut streams.errors)?;
            streams.output = Some(stream);
        }
        (Some(input), None) => {
            let stream = build_input(input, &params, adapter, shared, &mut streams.errors)?;
            streams.input = Some(stream);
        }
        (Some(input), Some(output)) => {
            let (producer, consumer) =
                InputBridge::new::<T>(params.input_block_len() * BRIDGE_BLOCKS);
            let input =
                build_bridged_input(input, &params, producer, shared, &mut streams.errors)?;
            let output = build_output(
                output,
                &params,
                adapter.with_input_bridge(consumer),
                shared,
                &mut streams.errors,
            )?;
            streams.input = Some(input);
            streams.output = Some(output);
        }
        (None, None) => {
            return Err(Error::Device(
                "stream needs at least one input or output channel".to_string(),
            ))
        }
    }
    Ok(streams)
}

/// A device configuration picked for a stream
struct DeviceConfig {
    config: cpal::StreamConfig,
    /// Sample format the device callback runs in
    format: SampleFormat,
}

/// Pick the device configuration a stream runs on
///
/// An exact match on channels and format wins. Otherwise the adapter
/// converts: any format streams can carry with at least the requested
/// channels, f32 first, then the fewest channels.
fn choose_config(
    configs: &[cpal::SupportedStreamConfigRange],
    channels: u16,
    format: SampleFormat,
    sample_rate: u32,
) -> Option<(&cpal::SupportedStreamConfigRange, SampleFormat)> {
    let device_format: cpal::SampleFormat = format.into();
    let rate_ok = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0
    };

    let exact = configs
        .iter()
        .find(|c| rate_ok(*c) && c.channels() == channels && c.sample_format() == device_format);
    if let Some(config) = exact {
        return Some((config, format));
    }

    configs
        .iter()
        .filter(|c| rate_ok(*c) && c.channels() >= channels)
        .filter_map(|c| SampleFormat::from_cpal(c.sample_format()).map(|f| (c, f)))
        .min_by_key(|(c, f)| (*f != SampleFormat::F32, c.channels()))
}

/// Pick a device configuration for the parameters
///
/// The fixed buffer size is only requested when the device advertises it;
/// the block adapter keeps callback blocks exact either way.
fn stream_config(
    device: &cpal::Device,
    params: &StreamParameters,
    direction: Direction,
) -> Result<DeviceConfig> {
    let channels = match direction {
        Direction::Output => params.output_channels,
        Direction::Input => params.input_channels,
    };
    let configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Output => device.supported_output_configs()?.collect(),
        Direction::Input => device.supported_input_configs()?.collect(),
    };

    let (supported, format) =
        choose_config(&configs, channels, params.sample_format, params.sample_rate).ok_or_else(
            || {
                Error::Device(format!(
                    "Device has no {} config with {}+ channel(s) at {} Hz",
                    direction.name(),
                    channels,
                    params.sample_rate
                ))
            },
        )?;

    if supported.channels() != channels || format != params.sample_format {
        log::warn!(
            "No {}-channel {} {} config, converting to {}-channel {}",
            channels,
            params.sample_format.name(),
            direction.name(),
            supported.channels(),
            format.name()
        );
    }

    let buffer_size = match supported.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max }
            if (*min..=*max).contains(&params.frames_per_buffer) =>
        {
            cpal::BufferSize::Fixed(params.frames_per_buffer)
        }
        _ => {
            log::warn!(
                "Device cannot fix its buffer at {} frames, using its default",
                params.frames_per_buffer
            );
            cpal::BufferSize::Default
        }
    };

    Ok(DeviceConfig {
        config: cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size,
        },
        format,
    })
}

/// Error callback for one device stream
///
/// Every error is queued for [`Stream::take_error`]. A device that went
/// away never calls back again, so losing it also ends the stream.
fn error_callback(
    shared: &Arc<StreamShared>,
    direction: Direction,
    receivers: &mut Vec<ErrorReceiver>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let (mut sender, receiver) = ErrorQueue::new();
    receivers.push(receiver);
    let shared = Arc::clone(shared);

    move |err| {
        log::error!("Audio {} stream error: {}", direction.name(), err);
        let lost = matches!(err, cpal::StreamError::DeviceNotAvailable);
        if !sender.send(Error::Device(format!("{} device: {}", direction.name(), err))) {
            log::warn!("Device error queue full, dropping error");
        }
        if lost {
            shared.mark_device_lost();
        }
    }
}

fn build_output<T: StreamSample>(
    device: &cpal::Device,
    params: &StreamParameters,
    adapter: BlockAdapter<T>,
    shared: &Arc<StreamShared>,
    errors: &mut Vec<ErrorReceiver>,
) -> Result<cpal::Stream> {
    let device_config = stream_config(device, params, Direction::Output)?;
    log::info!(
        "Output config: {:?} ({})",
        device_config.config,
        device_config.format.name()
    );
    with_device_sample!(
        device_config.format,
        build_output_as,
        T,
        (device, device_config.config, adapter, shared, errors)
    )
}

fn build_output_as<T: StreamSample, D: StreamSample>(
    device: &cpal::Device,
    config: cpal::StreamConfig,
    mut adapter: BlockAdapter<T>,
    shared: &Arc<StreamShared>,
    errors: &mut Vec<ErrorReceiver>,
) -> Result<cpal::Stream> {
    let device_channels = config.channels as usize;
    let on_error = error_callback(shared, Direction::Output, errors);

    let shared = Arc::clone(shared);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [D], info: &cpal::OutputCallbackInfo| {
            let ts = info.timestamp();
            let timing = DeviceTiming {
                current_time: shared.elapsed_secs(),
                input_latency: shared.input_latency(),
                output_latency: ts.playback.duration_since(&ts.callback).unwrap_or_default(),
            };
            adapter.fill_device(data, device_channels, timing);
        },
        on_error,
        None,
    )?;
    Ok(stream)
}

fn build_input<T: StreamSample>(
    device: &cpal::Device,
    params: &StreamParameters,
    adapter: BlockAdapter<T>,
    shared: &Arc<StreamShared>,
    errors: &mut Vec<ErrorReceiver>,
) -> Result<cpal::Stream> {
    let device_config = stream_config(device, params, Direction::Input)?;
    log::info!(
        "Input config: {:?} ({})",
        device_config.config,
        device_config.format.name()
    );
    with_device_sample!(
        device_config.format,
        build_input_as,
        T,
        (device, device_config.config, adapter, shared, errors)
    )
}

fn build_input_as<T: StreamSample, D: StreamSample>(
    device: &cpal::Device,
    config: cpal::StreamConfig,
    mut adapter: BlockAdapter<T>,
    shared: &Arc<StreamShared>,
    errors: &mut Vec<ErrorReceiver>,
) -> Result<cpal::Stream> {
    let device_channels = config.channels as usize;
    let on_error = error_callback(shared, Direction::Input, errors);

    let shared = Arc::clone(shared);
    let stream = device.build_input_stream(
        &config,
        move |data: &[D], info: &cpal::InputCallbackInfo| {
            let ts = info.timestamp();
            let timing = DeviceTiming {
                current_time: shared.elapsed_secs(),
                input_latency: ts.callback.duration_since(&ts.capture).unwrap_or_default(),
                output_latency: Duration::ZERO,
            };
            adapter.push_device(data, device_channels, timing);
        },
        on_error,
        None,
    )?;
    Ok(stream)
}

/// Input half of a duplex stream: captured samples go straight into the bridge
fn build_bridged_input<T: StreamSample>(
    device: &cpal::Device,
    params: &StreamParameters,
    producer: InputProducer<T>,
    shared: &Arc<StreamShared>,
    errors: &mut Vec<ErrorReceiver>,
) -> Result<cpal::Stream> {
    let device_config = stream_config(device, params, Direction::Input)?;
    log::info!(
        "Input config: {:?} ({})",
        device_config.config,
        device_config.format.name()
    );
    let channels = params.input_channels as usize;
    with_device_sample!(
        device_config.format,
        build_bridged_input_as,
        T,
        (device, device_config.config, channels, producer, shared, errors)
    )
}

fn build_bridged_input_as<T: StreamSample, D: StreamSample>(
    device: &cpal::Device,
    config: cpal::StreamConfig,
    channels: usize,
    mut producer: InputProducer<T>,
    shared: &Arc<StreamShared>,
    errors: &mut Vec<ErrorReceiver>,
) -> Result<cpal::Stream> {
    let device_channels = config.channels as usize;
    let on_error = error_callback(shared, Direction::Input, errors);

    let shared = Arc::clone(shared);
    let stream = device.build_input_stream(
        &config,
        move |data: &[D], info: &cpal::InputCallbackInfo| {
            let ts = info.timestamp();
            shared.set_input_latency(ts.callback.duration_since(&ts.capture).unwrap_or_default());
            producer.push_frames(data, device_channels, channels);
        },
        on_error,
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_package() {
        assert!(version_text().ends_with(env!("CARGO_PKG_VERSION")));
        assert_eq!(version() / 10_000, env!("CARGO_PKG_VERSION_MAJOR").parse::<u32>().unwrap());
    }

    fn range(channels: u16, format: cpal::SampleFormat) -> cpal::SupportedStreamConfigRange {
        cpal::SupportedStreamConfigRange::new(
            channels,
            cpal::SampleRate(8000),
            cpal::SampleRate(96000),
            cpal::SupportedBufferSize::Range { min: 64, max: 4096 },
            format,
        )
    }

    #[test]
    fn test_exact_config_preferred() {
        let configs = [
            range(2, cpal::SampleFormat::F32),
            range(1, cpal::SampleFormat::I16),
        ];
        let (config, format) = choose_config(&configs, 1, SampleFormat::I16, 8000).unwrap();
        assert_eq!(config.channels(), 1);
        assert_eq!(format, SampleFormat::I16);
    }

    #[test]
    fn test_mono_i16_falls_back_to_stereo_f32() {
        let configs = [
            range(4, cpal::SampleFormat::F32),
            range(2, cpal::SampleFormat::I32),
            range(2, cpal::SampleFormat::F32),
        ];
        let (config, format) = choose_config(&configs, 1, SampleFormat::I16, 8000).unwrap();
        assert_eq!(config.channels(), 2);
        assert_eq!(format, SampleFormat::F32);
    }

    #[test]
    fn test_fallback_uses_other_formats_without_f32() {
        let configs = [
            range(2, cpal::SampleFormat::F64),
            range(2, cpal::SampleFormat::I32),
        ];
        let (_, format) = choose_config(&configs, 2, SampleFormat::U8, 44100).unwrap();
        assert_eq!(format, SampleFormat::I32);
    }

    #[test]
    fn test_no_config_with_enough_channels_or_rate() {
        let configs = [range(2, cpal::SampleFormat::F32)];
        assert!(choose_config(&configs, 6, SampleFormat::F32, 44100).is_none());
        assert!(choose_config(&configs, 2, SampleFormat::F32, 192000).is_none());
    }

    #[test]
    fn test_host_name_is_an_available_host() {
        // Hosts without any audio backend have nothing to check
        if let Ok(engine) = AudioEngine::initialize() {
            let name = engine.host_name();
            assert!(cpal::available_hosts().iter().any(|id| id.name() == name));
            engine.terminate();
        }
    }

    #[test]
    fn test_host_api_info_out_of_range() {
        let result = host_api_info(host_api_count());
        assert!(matches!(result, Err(Error::Device(_))));
    }
}
