//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - describing output devices (id, name, rate range, channels, default flag)
//! - resolving a [`DeviceSelection`] to a concrete device
//! - choosing a stream config and buffer size for the asset's rate

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use cpal::traits::{DeviceTrait, HostTrait};
use lowhum_types::DeviceDescriptor;

use crate::backend::DeviceSelection;
use crate::error::PlaybackError;

/// Resolve `selection` against the host's current outputs.
pub fn pick_device(
    host: &cpal::Host,
    selection: &DeviceSelection,
) -> Result<(cpal::Device, DeviceDescriptor), PlaybackError> {
    let default_id = default_output_id(host);
    let mut described: Vec<(cpal::Device, DeviceDescriptor)> = host
        .output_devices()
        .map_err(|e| PlaybackError::Enumerate(e.to_string()))?
        .filter_map(|d| describe_device(&d, default_id.as_deref()).map(|info| (d, info)))
        .collect();

    let infos: Vec<DeviceDescriptor> = described.iter().map(|(_, info)| info.clone()).collect();
    let found = selection
        .resolve(&infos)
        .map(|info| info.id.clone())
        .and_then(|id| described.drain(..).find(|(_, info)| info.id == id));

    match (found, selection) {
        (Some(pair), _) => Ok(pair),
        (None, DeviceSelection::SystemDefault) => {
            let device = host
                .default_output_device()
                .ok_or_else(|| PlaybackError::DeviceUnavailable("no default output device".into()))?;
            let info = describe_device(&device, None).ok_or_else(|| {
                PlaybackError::DeviceUnavailable("default output has no usable config".into())
            })?;
            Ok((device, DeviceDescriptor { is_default: true, ..info }))
        }
        (None, DeviceSelection::Id(id)) => Err(PlaybackError::DeviceUnavailable(id.clone())),
    }
}

/// Id of the host's default output, if any.
pub fn default_output_id(host: &cpal::Host) -> Option<String> {
    let device = host.default_output_device()?;
    let name = device_name(&device)?;
    let key = device_cache_key(&device, &name);
    if let Ok(id) = device.id() {
        return Some(id.to_string());
    }
    let (min, max) = device_rates(&device, &key)?;
    Some(hash_device_id(&name, min, max))
}

/// Pick the best supported output config for the device.
///
/// If `target_rate` is `Some`, prefer the highest supported sample rate that is
/// **<= target_rate**; if none are <=, choose the lowest supported rate above it.
/// If `None`, choose the highest supported rate. Ties go to the better sample
/// format (F32 > I32 > I16 > U16).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig, PlaybackError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let format_rank = sample_format_rank(range.sample_format());
        if format_rank > 3 {
            continue;
        }
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = target_rate.map(|t| rate <= t).unwrap_or(true);
        let replace = match &best {
            None => true,
            Some((b_below, b_rate, b_rank, _)) => {
                is_better_candidate(below, rate, format_rank, *b_below, *b_rate, *b_rank)
            }
        };
        if replace {
            best = Some((below, rate, format_rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, _, cfg)| cfg)
        .ok_or_else(|| PlaybackError::Stream("no supported output configs".into()))
}

/// Pick a stream buffer size, preferring larger values to reduce underruns.
///
/// If the device reports a range, choose the max (capped at 16 384 frames). If
/// `Unknown`, return `None` so CPAL uses the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 16_384;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Sample formats the output callback can render into.
pub fn is_supported_sample_format(format: cpal::SampleFormat) -> bool {
    matches!(
        format,
        cpal::SampleFormat::F32
            | cpal::SampleFormat::I16
            | cpal::SampleFormat::I32
            | cpal::SampleFormat::U16
    )
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) if target < min => min,
        Some(target) if target > max => max,
        Some(target) => target,
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(
    below: bool,
    rate: u32,
    format_rank: u8,
    best_below: bool,
    best_rate: u32,
    best_rank: u8,
) -> bool {
    if below != best_below {
        below && !best_below
    } else if rate != best_rate {
        rate > best_rate
    } else {
        format_rank < best_rank
    }
}

/// Describe every usable output device on `host`.
pub fn list_device_infos(host: &cpal::Host) -> Result<Vec<DeviceDescriptor>, PlaybackError> {
    let default_id = default_output_id(host);
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::Enumerate(e.to_string()))?;
    Ok(devices
        .filter_map(|d| describe_device(&d, default_id.as_deref()))
        .collect())
}

/// Build a descriptor, or `None` for devices without a usable rate range.
fn describe_device(device: &cpal::Device, default_id: Option<&str>) -> Option<DeviceDescriptor> {
    let name = device_name(device)?;
    let cache_key = device_cache_key(device, &name);
    let Some((min_rate, max_rate)) = device_rates(device, &cache_key) else {
        if should_warn_invalid_device(&cache_key) {
            tracing::warn!(
                device = %name,
                id = %cache_key,
                "skipping device with invalid sample rate range"
            );
        }
        return None;
    };

    let max_output_channels = device
        .supported_output_configs()
        .map(|ranges| ranges.map(|r| r.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let default_config = device.default_output_config().ok();
    let default_rate = default_config.as_ref().map(|c| c.sample_rate());
    let max_output_channels = match (max_output_channels, default_config) {
        (0, Some(cfg)) => cfg.channels(),
        (n, _) => n,
    };

    let id = device_id_for(device, &name, min_rate, max_rate);
    Some(DeviceDescriptor {
        is_default: default_id == Some(id.as_str()),
        id,
        name,
        max_output_channels,
        min_rate,
        max_rate,
        default_rate,
    })
}

fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

/// Supported rate range, falling back to the default config and then to the
/// last range seen for this device (some hosts report nothing while busy).
fn device_rates(device: &cpal::Device, cache_key: &str) -> Option<(u32, u32)> {
    let mut min_rate = u32::MAX;
    let mut max_rate = 0u32;
    if let Ok(ranges) = device.supported_output_configs() {
        for r in ranges {
            min_rate = min_rate.min(r.min_sample_rate());
            max_rate = max_rate.max(r.max_sample_rate());
        }
    }
    let valid = |min: u32, max: u32| min != u32::MAX && min > 0 && max >= min;

    if !valid(min_rate, max_rate) {
        if let Ok(default_cfg) = device.default_output_config() {
            min_rate = default_cfg.sample_rate();
            max_rate = min_rate;
        }
    }
    if !valid(min_rate, max_rate) {
        if let Some(cached) = cached_rates(cache_key) {
            (min_rate, max_rate) = cached;
        }
    }
    if !valid(min_rate, max_rate) {
        return None;
    }
    update_cached_rates(cache_key, min_rate, max_rate);
    Some((min_rate, max_rate))
}

fn device_id_for(device: &cpal::Device, name: &str, min_rate: u32, max_rate: u32) -> String {
    if let Ok(id) = device.id() {
        return id.to_string();
    }
    hash_device_id(name, min_rate, max_rate)
}

fn device_cache_key(device: &cpal::Device, name: &str) -> String {
    if let Ok(id) = device.id() {
        return id.to_string();
    }
    name.to_string()
}

fn rates_cache() -> &'static Mutex<HashMap<String, (u32, u32)>> {
    static CACHE: OnceLock<Mutex<HashMap<String, (u32, u32)>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cached_rates(key: &str) -> Option<(u32, u32)> {
    rates_cache().lock().ok().and_then(|m| m.get(key).copied())
}

fn update_cached_rates(key: &str, min_rate: u32, max_rate: u32) {
    if let Ok(mut m) = rates_cache().lock() {
        m.insert(key.to_string(), (min_rate, max_rate));
    }
}

fn invalid_warned() -> &'static Mutex<HashSet<String>> {
    static WARNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    WARNED.get_or_init(|| Mutex::new(HashSet::new()))
}

fn should_warn_invalid_device(key: &str) -> bool {
    if let Ok(mut warned) = invalid_warned().lock() {
        return warned.insert(key.to_string());
    }
    true
}

/// FNV-1a over `name|min|max`, for hosts that cannot report a stable id.
fn hash_device_id(name: &str, min_rate: u32, max_rate: u32) -> String {
    let input = format!("{name}|{min_rate}|{max_rate}");
    let hash = input
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_device_id_is_deterministic() {
        let first = hash_device_id("Device", 44_100, 96_000);
        let second = hash_device_id("Device", 44_100, 96_000);
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
    }

    #[test]
    fn hash_device_id_changes_with_inputs() {
        let base = hash_device_id("Device", 44_100, 96_000);
        assert_ne!(base, hash_device_id("Other", 44_100, 96_000));
        assert_ne!(base, hash_device_id("Device", 48_000, 96_000));
    }

    #[test]
    fn hash_device_id_matches_fnv1a() {
        // FNV-1a of the empty-name key "|0|0".
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in b"|0|0" {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        assert_eq!(hash_device_id("", 0, 0), format!("{hash:016x}"));
    }

    #[test]
    fn cached_rates_roundtrip() {
        let key = "noise-player-device-key";
        update_cached_rates(key, 48_000, 96_000);
        assert_eq!(cached_rates(key), Some((48_000, 96_000)));
    }

    #[test]
    fn invalid_device_warns_once() {
        let key = "noise-player-invalid-device";
        assert!(should_warn_invalid_device(key));
        assert!(!should_warn_invalid_device(key));
    }

    #[test]
    fn pick_rate_for_range_prefers_target_when_in_range() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(48_000)), 48_000);
    }

    #[test]
    fn pick_rate_for_range_clamps() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(192_000)), 96_000);
    }

    #[test]
    fn pick_rate_for_range_defaults_to_max() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn is_better_candidate_ordering() {
        assert!(is_better_candidate(true, 48_000, 1, false, 48_000, 1));
        assert!(is_better_candidate(true, 96_000, 2, true, 48_000, 2));
        assert!(is_better_candidate(true, 48_000, 0, true, 48_000, 2));
        assert!(!is_better_candidate(false, 96_000, 0, true, 44_100, 3));
    }

    #[test]
    fn supported_sample_formats() {
        assert!(is_supported_sample_format(cpal::SampleFormat::F32));
        assert!(is_supported_sample_format(cpal::SampleFormat::U16));
        assert!(!is_supported_sample_format(cpal::SampleFormat::F64));
    }
}
