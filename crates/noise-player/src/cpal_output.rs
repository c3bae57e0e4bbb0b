//! [`AudioBackend`] over the platform's default CPAL host.

use cpal::traits::StreamTrait;
use lowhum_types::DeviceDescriptor;

use crate::backend::{
    ActiveOutput, AudioBackend, DeviceSelection, OutputFormat, OutputRequest, PreparedOutput,
};
use crate::device;
use crate::error::PlaybackError;
use crate::playback::{self, BlockRenderer};
use crate::signal::StopSignal;

/// Stateless: every call asks `cpal::default_host()` afresh, so hot-plugged
/// devices show up without restarting.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn output_devices(&self) -> Result<Vec<DeviceDescriptor>, PlaybackError> {
        device::list_device_infos(&cpal::default_host())
    }

    fn default_output_id(&self) -> Option<String> {
        device::default_output_id(&cpal::default_host())
    }

    fn prepare_output(
        &self,
        selection: &DeviceSelection,
        request: OutputRequest,
    ) -> Result<Box<dyn PreparedOutput>, PlaybackError> {
        let host = cpal::default_host();
        let (device, descriptor) = device::pick_device(&host, selection)?;
        let config = device::pick_output_config(&device, Some(request.sample_rate))?;
        let sample_format = config.sample_format();
        if !device::is_supported_sample_format(sample_format) {
            return Err(PlaybackError::Stream(format!(
                "unsupported sample format: {sample_format:?}"
            )));
        }

        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }
        let format = OutputFormat {
            sample_rate: stream_config.sample_rate,
            channels: stream_config.channels,
            buffer_frames: match stream_config.buffer_size {
                cpal::BufferSize::Fixed(frames) => Some(frames),
                cpal::BufferSize::Default => None,
            },
        };
        tracing::info!(
            device = %descriptor.name,
            rate_hz = format.sample_rate,
            channels = format.channels,
            sample_format = ?sample_format,
            buffer_frames = ?format.buffer_frames,
            "output prepared"
        );

        Ok(Box::new(CpalPrepared {
            device,
            descriptor,
            cpal_format: sample_format,
            stream_config,
            format,
        }))
    }
}

struct CpalPrepared {
    device: cpal::Device,
    descriptor: DeviceDescriptor,
    cpal_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
    format: OutputFormat,
}

impl PreparedOutput for CpalPrepared {
    fn device(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn format(&self) -> &OutputFormat {
        &self.format
    }

    fn start(
        self: Box<Self>,
        renderer: BlockRenderer,
        stop: StopSignal,
    ) -> Result<Box<dyn ActiveOutput>, PlaybackError> {
        let stream = playback::build_output_stream(
            &self.device,
            &self.stream_config,
            self.cpal_format,
            renderer,
            stop,
        )?;
        stream.play().map_err(playback::play_error)?;
        Ok(Box::new(CpalActive { _stream: stream }))
    }
}

struct CpalActive {
    _stream: cpal::Stream,
}

impl ActiveOutput for CpalActive {}
