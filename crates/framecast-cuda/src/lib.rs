#![doc = include_str!("../README.md")]

pub mod kernels;
pub mod scratch;

pub use kernels::{ConvertKernels, StageMetrics};
pub use scratch::ScratchBuffer;
