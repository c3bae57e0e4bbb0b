//! Command runners.
//!
//! Builds the CPAL-backed controller from the user config and drives the
//! `start`, `devices` and `generate` commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::select;
use lowhum_types::{DeviceDescriptor, StopReason};
use noise_gen::{AssetCache, AssetHeader, CacheOutcome, GenerationSpec};
use noise_player::{AudioBackend, Controller, CpalBackend, PlaybackConfig, WatchEvent};

use crate::config::AppConfig;

/// How often `start` checks whether the session ended on its own.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_millis(250);

pub fn build_controller(config: &AppConfig) -> Result<Controller<CpalBackend>> {
    let asset = config.asset_path()?;
    let cache = AssetCache::new(asset, GenerationSpec::default());
    Ok(Controller::new(
        Arc::new(CpalBackend::new()),
        cache,
        PlaybackConfig::default(),
    ))
}

/// Play until Ctrl+C, device loss, or a playback error.
pub fn run_start(config: &AppConfig, device: Option<String>) -> Result<()> {
    let controller = build_controller(config)?;
    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .context("install Ctrl+C handler")?;

    if controller.cache().validate().is_err() {
        tracing::info!(
            path = %controller.cache().path().display(),
            "generating noise asset; this happens once"
        );
    }
    let device = config.device_for_start(device);
    controller
        .start(device.as_deref())
        .context("start playback")?;
    let status = controller.status();
    println!(
        "Playing on {} ({} Hz). Press Ctrl+C to stop.",
        status.device.as_deref().unwrap_or("unknown device"),
        status.output_rate.unwrap_or_default()
    );

    let watcher = controller.watch(config.poll_interval());
    let reason = wait_for_end(&controller, watcher.events(), &quit_rx);
    watcher.stop();
    controller.stop();

    let status = controller.status();
    tracing::info!(
        reason = ?reason,
        underrun_frames = status.underrun_frames.unwrap_or_default(),
        "session finished"
    );
    match reason {
        Some(StopReason::Stopped) | None => {}
        Some(reason) => eprintln!("{}", reason.describe()),
    }
    Ok(())
}

fn wait_for_end<B: AudioBackend>(
    controller: &Controller<B>,
    events: &crossbeam_channel::Receiver<WatchEvent>,
    quit: &crossbeam_channel::Receiver<()>,
) -> Option<StopReason> {
    loop {
        select! {
            recv(quit) -> _ => return Some(StopReason::Stopped),
            recv(events) -> event => match event {
                Ok(WatchEvent::PlaybackHalted { reason }) => return Some(reason),
                Ok(WatchEvent::DevicesChanged { added, removed }) => {
                    for d in &added {
                        println!("Output device connected: {}", d.name);
                    }
                    for d in &removed {
                        println!("Output device disconnected: {}", d.name);
                    }
                }
                Err(_) => return None,
            },
            default(SESSION_CHECK_INTERVAL) => {
                if !controller.player().has_session() {
                    return controller.status().end_reason;
                }
            }
        }
    }
}

/// Print output devices, marking the default.
pub fn run_devices(json: bool) -> Result<()> {
    let devices = CpalBackend::new()
        .output_devices()
        .context("list output devices")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No output devices found.");
    }
    for (i, d) in devices.iter().enumerate() {
        println!("{}", format_device_line(i, d));
    }
    Ok(())
}

/// Generate the asset, or report the cached one.
pub fn run_generate(config: &AppConfig, force: bool) -> Result<()> {
    let controller = build_controller(config)?;
    let path = controller.cache().path().to_path_buf();
    tracing::info!(path = %path.display(), force, "preparing noise asset");
    let outcome = controller.generate(force).context("generate asset")?;
    println!("{}", format_generate_outcome(&path, &outcome));
    Ok(())
}

fn format_device_line(index: usize, device: &DeviceDescriptor) -> String {
    let rates = if device.min_rate == device.max_rate {
        format!("{} Hz", device.min_rate)
    } else {
        format!("{}-{} Hz", device.min_rate, device.max_rate)
    };
    format!(
        "#{index}: {}{} [{}, {} ch] id={}",
        device.name,
        if device.is_default { " (default)" } else { "" },
        rates,
        device.max_output_channels,
        device.id
    )
}

fn format_generate_outcome(path: &Path, outcome: &CacheOutcome) -> String {
    let header: &AssetHeader = outcome.header();
    let verb = if outcome.was_generated() {
        "Generated"
    } else {
        "Using existing"
    };
    format!(
        "{verb} asset {} ({:.1} min, {} Hz, {} ch)",
        path.display(),
        header.duration_secs() / 60.0,
        header.sample_rate,
        header.channels
    )
}
