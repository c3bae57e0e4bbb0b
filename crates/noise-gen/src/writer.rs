//! 16-bit PCM WAV output with crash-safe commit, and header inspection.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::buffer::NoiseBuffer;
use crate::config::BITS_PER_SAMPLE;
use crate::error::AssetError;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Format and layout of a PCM WAV file, read without touching the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Byte offset of the first sample.
    pub data_offset: u64,
    /// Declared payload size in bytes.
    pub data_len: u64,
    pub frames: u64,
    /// Actual file size on disk.
    pub file_len: u64,
}

impl AssetHeader {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// Payload shorter than the header declares.
    pub fn is_truncated(&self) -> bool {
        self.file_len < self.data_offset + self.data_len
    }
}

/// Walk the RIFF chunks of `path` and return the `fmt ` and `data` layout.
pub fn read_header(path: &Path) -> Result<AssetHeader, AssetError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(AssetError::Missing(path.to_path_buf()));
        }
        Err(err) => return Err(AssetError::io(path, err)),
    };
    let file_len = file
        .metadata()
        .map_err(|e| AssetError::io(path, e))?
        .len();

    let mut riff = [0u8; 12];
    read_exact_or_corrupt(&mut file, &mut riff, path, "riff header")?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(AssetError::corrupt(path, "not a RIFF/WAVE file"));
    }

    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut pos = 12u64;
    loop {
        let mut chunk = [0u8; 8];
        read_exact_or_corrupt(&mut file, &mut chunk, path, "missing data chunk")?;
        let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
        let body = pos + 8;

        match &id {
            b"fmt " => {
                if size < 16 {
                    return Err(AssetError::corrupt(path, "fmt chunk too short"));
                }
                let mut raw = [0u8; 16];
                read_exact_or_corrupt(&mut file, &mut raw, path, "fmt chunk")?;
                let tag = u16::from_le_bytes([raw[0], raw[1]]);
                let channels = u16::from_le_bytes([raw[2], raw[3]]);
                let rate = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
                let bits = u16::from_le_bytes([raw[14], raw[15]]);
                if tag != WAVE_FORMAT_PCM && tag != WAVE_FORMAT_EXTENSIBLE {
                    return Err(AssetError::corrupt(
                        path,
                        format!("unsupported format tag {tag:#06x}"),
                    ));
                }
                fmt = Some((tag, channels, rate, bits));
            }
            b"data" => {
                let Some((_, channels, sample_rate, bits_per_sample)) = fmt else {
                    return Err(AssetError::corrupt(path, "data chunk before fmt chunk"));
                };
                if channels == 0 || bits_per_sample == 0 || bits_per_sample % 8 != 0 {
                    return Err(AssetError::corrupt(path, "degenerate fmt chunk"));
                }
                let align = channels as u64 * (bits_per_sample as u64 / 8);
                return Ok(AssetHeader {
                    sample_rate,
                    channels,
                    bits_per_sample,
                    data_offset: body,
                    data_len: size,
                    frames: size / align,
                    file_len,
                });
            }
            _ => {}
        }

        // Chunks are word aligned.
        pos = body + size + (size & 1);
        file.seek(SeekFrom::Start(pos))
            .map_err(|e| AssetError::io(path, e))?;
    }
}

fn read_exact_or_corrupt(
    file: &mut File,
    buf: &mut [u8],
    path: &Path,
    what: &str,
) -> Result<(), AssetError> {
    file.read_exact(buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            AssetError::corrupt(path, format!("truncated: {what}"))
        } else {
            AssetError::io(path, err)
        }
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Streams frames into `<path>.partial`; [`AssetWriter::commit`] renames it into place.
///
/// Dropping an uncommitted writer removes the partial file, so a failed render
/// never leaves anything at the final path.
pub struct AssetWriter {
    path: PathBuf,
    partial: PathBuf,
    channels: u16,
    frames: u64,
    inner: Option<WavWriter<BufWriter<File>>>,
}

impl AssetWriter {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self, AssetError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| AssetError::io(dir, e))?;
        }
        let partial = partial_path(path);
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        };
        let inner = WavWriter::create(&partial, spec).map_err(|e| AssetError::encode(&partial, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            partial,
            channels,
            frames: 0,
            inner: Some(inner),
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    /// Interleave and append `buf`, clamping to [-1, 1] before quantizing.
    pub fn write_frames(&mut self, buf: &NoiseBuffer) -> Result<(), AssetError> {
        if buf.channels() != self.channels {
            return Err(AssetError::corrupt(
                &self.partial,
                format!("expected {} channels, got {}", self.channels, buf.channels()),
            ));
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        for frame in 0..buf.frames() {
            for plane in buf.planes() {
                let sample = quantize(plane[frame]);
                inner
                    .write_sample(sample)
                    .map_err(|e| AssetError::encode(&self.partial, e))?;
            }
        }
        self.frames += buf.frames() as u64;
        Ok(())
    }

    /// Finalize the WAV header, move the file into place and re-read its header.
    pub fn commit(mut self) -> Result<AssetHeader, AssetError> {
        if let Some(inner) = self.inner.take() {
            inner
                .finalize()
                .map_err(|e| AssetError::encode(&self.partial, e))?;
        }
        fs::rename(&self.partial, &self.path).map_err(|e| AssetError::io(&self.path, e))?;
        read_header(&self.path)
    }
}

impl Drop for AssetWriter {
    fn drop(&mut self) {
        if self.inner.take().is_some() || self.partial.exists() {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
