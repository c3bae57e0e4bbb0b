//! Brown-noise asset generation.
//!
//! Synthesizes integrated Gaussian noise, band-limits it, normalizes it in
//! chunks, stitches segments and splices the loop seam, then writes a 16-bit
//! PCM WAV that the player can loop without a click.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod crossfade;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod pipeline;
pub mod synth;
pub mod writer;

pub use buffer::NoiseBuffer;
pub use cache::{AssetCache, CacheOutcome};
pub use config::GenerationSpec;
pub use error::{AssetError, SynthesisError};
pub use pipeline::generate_asset;
pub use synth::NoiseSynthesizer;
pub use writer::{AssetHeader, read_header};
