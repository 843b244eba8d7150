//! framecast-pipeline — the conversion stage proper.
//!
//! # Architecture
//!
//! One frame per tick moves through a fixed sequence on a single CUDA
//! stream:
//!
//! ```text
//! FrameMessage → (host→device staging) → Resize → Convert/Permute → TensorMessage
//! ```
//!
//! # Module layout
//!
//! - [`catalogue`] — format-name parsing and the (source, destination) →
//!   operation table
//! - [`config`] — the `[converter]` configuration surface
//! - [`resize`] — per-plane geometric resampling stage
//! - [`convert`] — pixel-format/dtype conversion stage and the scalar
//!   reference semantics
//! - [`operator`] — the per-frame orchestrator with its four-phase
//!   lifecycle (configure, start, process, stop)

pub mod catalogue;
pub mod config;
pub mod convert;
pub mod operator;
pub mod resize;

pub use catalogue::{parse_format, ConvertOp};
pub use config::ConverterConfig;
pub use operator::FormatConverter;

// Re-exported so integration tests and downstream binaries can name the
// contract types without depending on framecast-core directly.
pub use framecast_core::{context, error, types};
