//! Shared utilities.

pub mod files;

pub use files::{atomic_write, copy_dir_all, ensure_parent_exists};
