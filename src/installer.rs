//! macOS installer resolution.
//!
//! An installer app is identified by the system images under
//! `Contents/SharedSupport`. The OS version it installs comes from the
//! `SystemVersion.plist` inside `BaseSystem.dmg`; installers older than
//! 10.13 keep that image nested inside `InstallESD.dmg`, so resolution
//! probes both layouts before giving up.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mount::MountBroker;
use crate::plist::{self, Value};
use crate::version::SystemVersion;

/// Container holding the install payload, relative to the app bundle.
pub const INSTALL_ESD: &str = "Contents/SharedSupport/InstallESD.dmg";

/// Recovery system image on 10.13+ installers, relative to the app bundle.
pub const BASE_SYSTEM: &str = "Contents/SharedSupport/BaseSystem.dmg";

/// Recovery system image inside a mounted `InstallESD.dmg` (pre-10.13).
pub const NESTED_BASE_SYSTEM: &str = "BaseSystem.dmg";

/// Version manifest on a mounted system volume.
pub const SYSTEM_VERSION_PLIST: &str = "System/Library/CoreServices/SystemVersion.plist";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{} has no Contents/SharedSupport/InstallESD.dmg; not a macOS installer app", .0.display())]
    MissingSystemImage(PathBuf),
    #[error("cannot determine which macOS version {} installs", .0.display())]
    VersionNotFound(PathBuf),
}

/// A macOS installer app resolved to the OS version it installs.
#[derive(Debug, Clone)]
pub struct Installer {
    pub path: PathBuf,
    pub version: SystemVersion,
}

impl Installer {
    /// Resolve the installer app at `app`. Mounts one or two of its system
    /// images read-only to find the version, and unmounts them again before
    /// returning.
    pub fn open(app: &Path, broker: &MountBroker) -> Result<Self, ResolveError> {
        let esd = app.join(INSTALL_ESD);
        if !esd.exists() {
            return Err(ResolveError::MissingSystemImage(app.to_path_buf()));
        }
        let base_system = app.join(BASE_SYSTEM);
        let version = version_from_system_image(&base_system, broker).or_else(|| {
            println!(
                "No version from SharedSupport/BaseSystem.dmg; trying the pre-10.13 layout inside InstallESD.dmg"
            );
            version_from_esd(&esd, broker)
        });
        match version {
            Some(version) => Ok(Self {
                path: app.to_path_buf(),
                version,
            }),
            None => Err(ResolveError::VersionNotFound(app.to_path_buf())),
        }
    }

    /// The container image the firmware package lives in.
    pub fn esd_image(&self) -> PathBuf {
        self.path.join(INSTALL_ESD)
    }
}

/// Mount a system image and read the OS version from its volume. Any
/// failure yields `None` so the caller can try the other layout.
fn version_from_system_image(image: &Path, broker: &MountBroker) -> Option<SystemVersion> {
    if !image.exists() {
        return None;
    }
    let mount = match broker.attach(image) {
        Ok(mount) => mount,
        Err(error) => {
            println!("Warning: {error}");
            return None;
        }
    };
    let version = version_from_volume(mount.path());
    broker.detach(mount);
    version
}

/// Mount the container and probe the base system image nested inside it.
fn version_from_esd(esd: &Path, broker: &MountBroker) -> Option<SystemVersion> {
    let mount = match broker.attach(esd) {
        Ok(mount) => mount,
        Err(error) => {
            println!("Warning: {error}");
            return None;
        }
    };
    let version = version_from_system_image(&mount.path().join(NESTED_BASE_SYSTEM), broker);
    broker.detach(mount);
    version
}

/// Read ProductVersion and ProductBuildVersion from a mounted system volume.
pub fn version_from_volume(volume: &Path) -> Option<SystemVersion> {
    let manifest = volume.join(SYSTEM_VERSION_PLIST);
    let value = match plist::parse_file(&manifest) {
        Ok(value) => value,
        Err(error) => {
            println!("Warning: {error}");
            return None;
        }
    };
    let product = value.get("ProductVersion").and_then(Value::as_str);
    let build = value.get("ProductBuildVersion").and_then(Value::as_str);
    let (Some(product), Some(build)) = (product, build) else {
        println!(
            "Warning: {} lacks ProductVersion or ProductBuildVersion",
            manifest.display()
        );
        return None;
    };
    match SystemVersion::parse(product, build) {
        Ok(version) => Some(version),
        Err(error) => {
            println!("Warning: {error}");
            None
        }
    }
}
