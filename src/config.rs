//! Tool configuration.
//!
//! The external tools are resolved from environment variables so tests and
//! unusual hosts can substitute their own binaries. A `.env` file is folded
//! into the environment at startup; real environment variables win.

use std::env;
use std::path::PathBuf;

/// Where macOS installs the disk image utility.
pub const DEFAULT_HDIUTIL: &str = "/usr/bin/hdiutil";

/// Where macOS installs the package utility.
pub const DEFAULT_PKGUTIL: &str = "/usr/sbin/pkgutil";

/// Resolved tool paths.
#[derive(Debug, Clone)]
pub struct Config {
    /// Disk image attach/detach tool (TBTQUERY_HDIUTIL).
    pub hdiutil: PathBuf,
    /// Package expansion tool (TBTQUERY_PKGUTIL).
    pub pkgutil: PathBuf,
}

impl Config {
    /// Load tool paths from the environment, falling back to the stock
    /// macOS locations.
    pub fn load() -> Self {
        Self {
            hdiutil: tool_path("TBTQUERY_HDIUTIL", DEFAULT_HDIUTIL),
            pkgutil: tool_path("TBTQUERY_PKGUTIL", DEFAULT_PKGUTIL),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hdiutil: PathBuf::from(DEFAULT_HDIUTIL),
            pkgutil: PathBuf::from(DEFAULT_PKGUTIL),
        }
    }
}

fn tool_path(variable: &str, default: &str) -> PathBuf {
    match env::var(variable) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(default),
    }
}
