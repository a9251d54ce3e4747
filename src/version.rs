//! macOS version identification.
//!
//! A [`SystemVersion`] pairs the numeric product version with the build tag,
//! exactly as found in `SystemVersion.plist`. Versions also serve as database
//! keys in their `<version>_<build>` form, so parsing and key formatting must
//! stay inverse operations of each other.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("malformed version string '{0}': expected 2 or 3 dot-separated integers")]
    Malformed(String),
    #[error("malformed version key '{0}': expected '<version>_<build>'")]
    MalformedKey(String),
}

/// An installed (or installable) macOS release, e.g. 10.15.3 build 19D76.
///
/// Immutable once parsed; the stored strings always agree with the numeric
/// components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemVersion {
    major: u32,
    minor: u32,
    patch: u32,
    version: String,
    build: String,
}

impl SystemVersion {
    /// Parse a product version such as "10.15.3" or "10.12" together with
    /// its build tag. A missing patch component counts as zero.
    pub fn parse(version: &str, build: &str) -> Result<Self, VersionError> {
        let malformed = || VersionError::Malformed(version.to_string());
        let tokens: Vec<&str> = version.split('.').collect();
        if tokens.len() < 2 || tokens.len() > 3 {
            return Err(malformed());
        }
        let mut numbers = [0u32; 3];
        for (slot, token) in numbers.iter_mut().zip(&tokens) {
            *slot = token.parse().map_err(|_| malformed())?;
        }
        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            version: version.to_string(),
            build: build.to_string(),
        })
    }

    /// Parse a database key produced by [`SystemVersion::version_key`].
    pub fn from_version_key(key: &str) -> Result<Self, VersionError> {
        let parts: Vec<&str> = key.split('_').collect();
        if parts.len() != 2 {
            return Err(VersionError::MalformedKey(key.to_string()));
        }
        Self::parse(parts[0], parts[1])
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    /// The product version exactly as it was parsed, e.g. "10.12" keeps its
    /// two-token spelling.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    /// The database key for this release, e.g. "10.15.3_19D76".
    pub fn version_key(&self) -> String {
        format!("{}_{}", self.version, self.build)
    }

    /// Version and build without the marketing name, e.g. "10.15.3 (19D76)".
    pub fn short_name(&self) -> String {
        format!("{} ({})", self.version, self.build)
    }

    /// The marketing name of the release, e.g. "macOS Catalina".
    pub fn os_name(&self) -> String {
        if self.major > 10 {
            let name = match self.major {
                11 => "Big Sur",
                12 => "Monterey",
                13 => "Ventura",
                14 => "Sonoma",
                15 => "Sequoia",
                _ => return format!("macOS {}", self.major),
            };
            return format!("macOS {name}");
        }
        let name = match self.minor {
            0 => "Mac OS X Cheetah",
            1 => "Mac OS X Puma",
            2 => "Mac OS X Jaguar",
            3 => "Mac OS X Panther",
            4 => "Mac OS X Tiger",
            5 => "Mac OS X Leopard",
            6 => "Mac OS X Snow Leopard",
            7 => "Mac OS X Lion",
            8 => "OS X Mountain Lion",
            9 => "OS X Mavericks",
            10 => "OS X Yosemite",
            11 => "OS X El Capitan",
            12 => "macOS Sierra",
            13 => "macOS High Sierra",
            14 => "macOS Mojave",
            15 => "macOS Catalina",
            _ => return format!("macOS 10.{}", self.minor),
        };
        name.to_string()
    }

    /// Collapse the version into one comparable number. Minor and patch each
    /// occupy a decimal digit, which holds for every macOS release; the wide
    /// arithmetic keeps any parseable major in range.
    fn numeric(&self) -> u64 {
        u64::from(self.major) * 1000 + u64::from(self.minor) * 10 + u64::from(self.patch)
    }
}

impl fmt::Display for SystemVersion {
    /// Full name, e.g. "macOS Catalina 10.15.3 (19D76)".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.os_name(), self.short_name())
    }
}

impl Ord for SystemVersion {
    /// Order by release, then by build. Apple build tags grow with the
    /// release, and a longer tag sorts after a shorter one ("19D76" before
    /// "19D2064"), so length decides before the lexicographic fallback.
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric()
            .cmp(&other.numeric())
            .then_with(|| self.build.len().cmp(&other.build.len()))
            .then_with(|| self.build.cmp(&other.build))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for SystemVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
