//! Looping asset reader.
//!
//! Uses Symphonia to:
//! - probe the WAV asset and open a decoder for its track
//! - hand out fixed-size interleaved `f32` blocks
//! - seek back to frame 0 at end of file, so the stream never ends

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use noise_gen::{AssetError, AssetHeader, read_header};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::PlaybackError;

pub struct AssetReader {
    path: PathBuf,
    header: AssetHeader,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    decoded: Option<SampleBuffer<f32>>,
    pending_len: usize,
    pending_pos: usize,
    position: Arc<AtomicU64>,
    open: Arc<AtomicBool>,
}

impl AssetReader {
    /// Validate the header and open a decoder.
    ///
    /// `open` is raised while the reader exists; `position` tracks the read
    /// offset in frames.
    pub fn open(
        path: &Path,
        open: Arc<AtomicBool>,
        position: Arc<AtomicU64>,
    ) -> Result<Self, PlaybackError> {
        let header = read_header(path)?;
        let corrupt = |reason: &str| AssetError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if header.frames == 0 {
            return Err(corrupt("asset has no audio frames").into());
        }
        if header.is_truncated() {
            return Err(corrupt("payload shorter than header declares").into());
        }

        let file = File::open(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| PlaybackError::Decode("no default audio track".into()))?;
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        open.store(true, Ordering::Release);
        position.store(0, Ordering::Relaxed);
        tracing::debug!(
            path = %path.display(),
            rate_hz = header.sample_rate,
            channels = header.channels,
            frames = header.frames,
            "asset opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            format,
            decoder,
            track_id,
            channels: header.channels as usize,
            decoded: None,
            pending_len: 0,
            pending_pos: 0,
            position,
            open,
        })
    }

    pub fn header(&self) -> &AssetHeader {
        &self.header
    }

    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.header.channels
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fill `out` completely with interleaved samples, wrapping at end of file.
    pub fn read_block(&mut self, out: &mut [f32]) -> Result<(), PlaybackError> {
        let want = out.len() - out.len() % self.channels;
        let mut filled = 0usize;
        let mut wrapped_empty = false;

        while filled < want {
            if self.pending_pos < self.pending_len {
                let n = (self.pending_len - self.pending_pos).min(want - filled);
                if let Some(buf) = self.decoded.as_ref() {
                    out[filled..filled + n]
                        .copy_from_slice(&buf.samples()[self.pending_pos..self.pending_pos + n]);
                }
                self.pending_pos += n;
                filled += n;
                wrapped_empty = false;
                continue;
            }
            if !self.decode_next()? {
                if wrapped_empty {
                    return Err(PlaybackError::Decode("asset yielded no audio".into()));
                }
                self.rewind()?;
                wrapped_empty = true;
            }
        }
        out[want..].fill(0.0);

        let frames = (want / self.channels) as u64;
        let next = (self.position.load(Ordering::Relaxed) + frames) % self.header.frames;
        self.position.store(next, Ordering::Relaxed);
        Ok(())
    }

    /// Decode the next packet into the pending buffer. `false` at end of stream.
    fn decode_next(&mut self) -> Result<bool, PlaybackError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(PlaybackError::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = %e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(PlaybackError::Decode(e.to_string())),
            };

            let needed = decoded.capacity() as u64;
            let buf = match self.decoded.as_mut() {
                Some(buf) if buf.capacity() as u64 >= needed => buf,
                _ => self
                    .decoded
                    .insert(SampleBuffer::<f32>::new(needed, *decoded.spec())),
            };
            buf.copy_interleaved_ref(decoded);
            self.pending_len = buf.samples().len();
            self.pending_pos = 0;
            if self.pending_len > 0 {
                return Ok(true);
            }
        }
    }

    fn rewind(&mut self) -> Result<(), PlaybackError> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| PlaybackError::Decode(format!("rewind failed: {e}")))?;
        self.decoder.reset();
        self.pending_len = 0;
        self.pending_pos = 0;
        tracing::debug!(path = %self.path.display(), "asset wrapped to start");
        Ok(())
    }
}

impl Drop for AssetReader {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}
