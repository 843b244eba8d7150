//! Typed error hierarchy for the conversion stage.
//!
//! Uses `thiserror` for library-grade errors.  Application code should wrap
//! these in `anyhow::Result` at call sites.
//!
//! The taxonomy distinguishes three lifetimes:
//!
//! - **configuration-time** errors ([`UnknownFormat`], [`UnsupportedConversion`],
//!   [`InvalidChannelOrder`], [`Config`](ConvertError::Config)) abort
//!   operator construction and never occur once a converter is running;
//! - **frame-scoped** errors ([`MissingInput`], [`Allocation`]) fail one tick
//!   and leave the operator usable for the next;
//! - everything else indicates a driver fault or an internal bug.
//!
//! [`UnknownFormat`]: ConvertError::UnknownFormat
//! [`UnsupportedConversion`]: ConvertError::UnsupportedConversion
//! [`InvalidChannelOrder`]: ConvertError::InvalidChannelOrder
//! [`MissingInput`]: ConvertError::MissingInput
//! [`Allocation`]: ConvertError::Allocation

use crate::types::FormatKind;

/// All errors originating from the conversion stage.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    // ── Configuration (fatal, initialization-time) ───────────────────
    #[error("unknown pixel format name: {0:?}")]
    UnknownFormat(String),

    #[error("no direct conversion from {from:?} to {to:?}")]
    UnsupportedConversion { from: FormatKind, to: FormatKind },

    #[error("channel order {got:?} does not address a {expected}-channel output")]
    InvalidChannelOrder { expected: usize, got: Vec<usize> },

    #[error("configuration error: {0}")]
    Config(String),

    // ── Frame-scoped (that tick produces no output) ──────────────────
    #[error("no usable input this tick: {0}")]
    MissingInput(&'static str),

    #[error("device allocation of {bytes} bytes failed")]
    Allocation {
        bytes: usize,
        #[source]
        source: cudarc::driver::DriverError,
    },

    // ── Driver / toolchain ───────────────────────────────────────────
    #[error("CUDA driver error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),

    #[error("CUDA kernel compilation error: {0}")]
    KernelCompile(#[from] cudarc::nvrtc::CompileError),

    // ── Bugs ─────────────────────────────────────────────────────────
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
}

impl ConvertError {
    /// Whether the pipeline may keep ticking after this error.
    ///
    /// Frame-scoped errors fail exactly one tick; everything else should
    /// tear the operator down.
    pub fn is_frame_scoped(&self) -> bool {
        matches!(self, Self::MissingInput(_) | Self::Allocation { .. })
    }
}

/// Convenience alias used throughout the framecast crates.
pub type Result<T> = std::result::Result<T, ConvertError>;
