//! Shared constants and small helpers

pub mod constants;
mod format;

pub use format::format_duration;
