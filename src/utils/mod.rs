//! Utility functions and helpers
//!
//! - `atomic`: crash-safe file replacement
//! - `time`: timestamp helpers for locally recorded events

pub mod atomic;
pub mod time;

pub use atomic::{
    atomic_write, atomic_write_json, atomic_write_with, cleanup_temp_files, safe_rename,
    temp_path, AtomicError, AtomicResult,
};
pub use time::{default_device, strictly_after};
