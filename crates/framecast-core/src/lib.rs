#![doc = include_str!("../README.md")]

pub mod context;
pub mod error;
pub mod types;
