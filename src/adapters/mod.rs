//! Adapters layer: Concrete implementations of ports and I/O edges.
//!
//! - `noise`: Laplace/Gaussian mechanisms, the noise-free variant, ChaCha20 streams
//! - `text`: line-oriented ingestion and result output

pub mod noise;
pub mod text;

pub use text::ParseError;
