//! Audio backend seam.
//!
//! The player talks to audio hardware only through [`AudioBackend`], so the
//! session logic, the device watcher and the control surface run the same way
//! against CPAL and against the in-memory backend used by tests.

use lowhum_types::DeviceDescriptor;

use crate::error::PlaybackError;
use crate::playback::BlockRenderer;
use crate::signal::StopSignal;

/// Which output a session should use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Whatever the host reports as its default output ("System Default").
    SystemDefault,
    /// A device id from [`AudioBackend::output_devices`], or a name fragment.
    Id(String),
}

impl DeviceSelection {
    /// `None` and blank strings select the system default.
    pub fn from_option(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => DeviceSelection::Id(id.to_string()),
            _ => DeviceSelection::SystemDefault,
        }
    }

    pub fn follows_default(&self) -> bool {
        matches!(self, DeviceSelection::SystemDefault)
    }

    /// Find the selected device: exact id first, then a case-insensitive name match.
    pub fn resolve<'a>(&self, devices: &'a [DeviceDescriptor]) -> Option<&'a DeviceDescriptor> {
        match self {
            DeviceSelection::SystemDefault => devices.iter().find(|d| d.is_default),
            DeviceSelection::Id(id) => devices
                .iter()
                .find(|d| d.id == *id)
                .or_else(|| devices.iter().find(|d| matches_device_name(&d.name, id))),
        }
    }
}

impl std::fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSelection::SystemDefault => f.write_str("System Default"),
            DeviceSelection::Id(id) => f.write_str(id),
        }
    }
}

pub(crate) fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// What the session would like the device to run at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputRequest {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Negotiated stream parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Fixed callback size, when the device advertises a range.
    pub buffer_frames: Option<u32>,
}

impl OutputFormat {
    /// Largest callback the renderer should expect without a second pass.
    pub fn callback_frames_hint(&self) -> usize {
        self.buffer_frames.map(|f| f as usize).unwrap_or(4_096)
    }
}

pub trait AudioBackend: Send + Sync + 'static {
    fn output_devices(&self) -> Result<Vec<DeviceDescriptor>, PlaybackError>;

    fn default_output_id(&self) -> Option<String>;

    /// Open (but do not start) an output on the selected device.
    fn prepare_output(
        &self,
        selection: &DeviceSelection,
        request: OutputRequest,
    ) -> Result<Box<dyn PreparedOutput>, PlaybackError>;
}

/// An opened output with a negotiated format, not yet pulling audio.
pub trait PreparedOutput {
    fn device(&self) -> &DeviceDescriptor;

    fn format(&self) -> &OutputFormat;

    /// Start pulling audio through `renderer`. Device-loss notifications fire `stop`.
    fn start(
        self: Box<Self>,
        renderer: BlockRenderer,
        stop: StopSignal,
    ) -> Result<Box<dyn ActiveOutput>, PlaybackError>;
}

/// A running output. Dropping it stops the stream and releases the device.
pub trait ActiveOutput {}
