//! waveforms - play the synthesized waveform demo
//!
//! A single note steps through sawtooth, sine, square and white noise as
//! its phase accumulator passes each band, then the stream is aborted
//! after a fixed duration.

use std::process::ExitCode;
use std::time::Duration;

use audiostream::{AudioEngine, Error, Settings, WaveformSynth};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "waveforms", version, about = "Play a note cycling through four waveforms")]
struct Args {}

fn main() -> ExitCode {
    env_logger::init();
    let _args = Args::parse();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("waveforms: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> audiostream::Result<()> {
    let settings = Settings::load();
    let duration = Duration::try_from_secs_f64(settings.synth.duration_secs).map_err(|e| {
        Error::Settings(format!(
            "invalid duration {}: {}",
            settings.synth.duration_secs, e
        ))
    })?;

    let config = settings.synth.config();
    let params = config.stream_parameters(settings.synth.frames_per_buffer);

    let engine = AudioEngine::initialize()?;
    log::info!("Audio host: {}", engine.host_name());
    let mut stream =
        engine.open_stream(settings.device.as_deref(), params, WaveformSynth::new(config))?;
    stream.start()?;
    log::info!(
        "Playing {} Hz for {:.1}s",
        config.note_frequency,
        duration.as_secs_f64()
    );

    std::thread::sleep(duration);
    if stream.is_stopped() {
        log::warn!("Stream ended early after {:.1}s", stream.time());
    }
    stream.abort()?;

    let error = stream.take_error();
    log::info!(
        "Rendered {} frames, last callback load {:.1}%",
        stream.frames_processed(),
        stream.cpu_load() * 100.0
    );
    stream.close()?;
    engine.terminate();

    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
