//! Disk image mounting with shared-mount reference counting.
//!
//! All `hdiutil` traffic goes through a [`MountBroker`]. Exclusive mounts
//! ([`MountBroker::attach`]) hand the caller an [`ActiveMount`] that must be
//! returned via [`MountBroker::detach`]. Shared mounts
//! ([`MountBroker::retain`] / [`MountBroker::release`]) reference-count the
//! image so several pipelines can use one container without re-attaching it;
//! the broker table is behind a mutex, so brokers can be shared across
//! threads.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;
use thiserror::Error;

use crate::process::Cmd;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("cannot create a mount point for {}: {source}", .image.display())]
    MountPoint { image: PathBuf, source: io::Error },
    #[error("cannot run the disk image tool for {}: {source}", .image.display())]
    Tool { image: PathBuf, source: io::Error },
    #[error("failed to attach {} (disk image tool exit code {code})", .image.display())]
    AttachFailed { image: PathBuf, code: i32 },
}

/// An exclusively mounted disk image. Hand it back to
/// [`MountBroker::detach`]; dropping it only removes the mount point
/// directory, not the mount.
#[derive(Debug)]
pub struct ActiveMount {
    image: PathBuf,
    dir: TempDir,
}

impl ActiveMount {
    /// Where the image contents are visible.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn image(&self) -> &Path {
        &self.image
    }
}

struct SharedMount {
    dir: TempDir,
    refs: usize,
}

/// Mediates every attach/detach and tracks shared mounts.
pub struct MountBroker {
    hdiutil: PathBuf,
    shared: Mutex<HashMap<PathBuf, SharedMount>>,
}

impl MountBroker {
    pub fn new(hdiutil: impl Into<PathBuf>) -> Self {
        Self {
            hdiutil: hdiutil.into(),
            shared: Mutex::new(HashMap::new()),
        }
    }

    /// Mount `image` exclusively at a fresh temporary mount point.
    pub fn attach(&self, image: &Path) -> Result<ActiveMount, MountError> {
        let dir = self.mount_point(image)?;
        self.attach_at(image, dir.path())?;
        Ok(ActiveMount {
            image: image.to_path_buf(),
            dir,
        })
    }

    /// Unmount an exclusive mount. A refused detach is reported and the
    /// mount point directory is left behind for the running mount.
    pub fn detach(&self, mount: ActiveMount) {
        if !self.detach_at(mount.dir.path()) {
            println!(
                "Warning: failed to detach {}; leaving the mount point {} in place",
                mount.image.display(),
                mount.dir.path().display()
            );
            let _ = mount.dir.keep();
        }
    }

    /// Mount `image` shared, or bump its reference count when it is already
    /// mounted. Returns the mount point.
    pub fn retain(&self, image: &Path) -> Result<PathBuf, MountError> {
        let mut shared = self.shared.lock().unwrap();
        if let Some(entry) = shared.get_mut(image) {
            entry.refs += 1;
            return Ok(entry.dir.path().to_path_buf());
        }
        let dir = self.mount_point(image)?;
        self.attach_at(image, dir.path())?;
        let mount_point = dir.path().to_path_buf();
        shared.insert(image.to_path_buf(), SharedMount { dir, refs: 1 });
        Ok(mount_point)
    }

    /// Drop one reference to a shared mount; the last reference unmounts.
    ///
    /// # Panics
    ///
    /// Panics if `image` is not currently tracked. An unbalanced release is
    /// a bookkeeping bug in the caller, not a runtime condition.
    pub fn release(&self, image: &Path) {
        let mut shared = self.shared.lock().unwrap();
        let Some(entry) = shared.get_mut(image) else {
            panic!(
                "released disk image {} is not tracked by the mount broker",
                image.display()
            );
        };
        if entry.refs > 1 {
            entry.refs -= 1;
            return;
        }
        if let Some(SharedMount { dir, .. }) = shared.remove(image) {
            if !self.detach_at(dir.path()) {
                println!(
                    "Warning: failed to detach {}; leaving the mount point {} in place",
                    image.display(),
                    dir.path().display()
                );
                let _ = dir.keep();
            }
        }
    }

    /// Number of shared images currently tracked.
    pub fn outstanding(&self) -> usize {
        self.shared.lock().unwrap().len()
    }

    fn mount_point(&self, image: &Path) -> Result<TempDir, MountError> {
        TempDir::new().map_err(|source| MountError::MountPoint {
            image: image.to_path_buf(),
            source,
        })
    }

    fn attach_at(&self, image: &Path, mount_point: &Path) -> Result<(), MountError> {
        let result = Cmd::new(&self.hdiutil)
            .arg("attach")
            .arg_path(image)
            .arg("-nobrowse")
            .arg("-mountpoint")
            .arg_path(mount_point)
            .arg("-noverify")
            .arg("-quiet")
            .run()
            .map_err(|source| MountError::Tool {
                image: image.to_path_buf(),
                source,
            })?;
        if !result.success() {
            return Err(MountError::AttachFailed {
                image: image.to_path_buf(),
                code: result.code(),
            });
        }
        Ok(())
    }

    /// True when the detach went through.
    fn detach_at(&self, mount_point: &Path) -> bool {
        let result = Cmd::new(&self.hdiutil)
            .arg("detach")
            .arg_path(mount_point)
            .arg("-quiet")
            .run();
        match result {
            Ok(result) => result.success(),
            Err(error) => {
                println!("Warning: cannot run the disk image tool: {error}");
                false
            }
        }
    }
}

impl Drop for MountBroker {
    /// Shared mounts should all be released by the time the broker goes
    /// away; any survivor points at a leaked reference, so report it and
    /// detach anyway.
    fn drop(&mut self) {
        let mut shared = match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (image, entry) in shared.drain() {
            println!(
                "Warning: disk image {} still held {} reference(s) at shutdown; detaching",
                image.display(),
                entry.refs
            );
            if !self.detach_at(entry.dir.path()) {
                let _ = entry.dir.keep();
            }
        }
    }
}
