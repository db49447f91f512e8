//! Release quality handling

pub mod quality;

pub use quality::{Resolution, select_best};
