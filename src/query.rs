//! The firmware query pipeline.
//!
//! One [`FirmwareQuery`] covers one installer app: mount its
//! `InstallESD.dmg`, expand the `FirmwareUpdate.pkg` found inside, and read
//! the per-board updater configs. Queries built from a container disk image
//! share the container through the broker's reference counting, so the
//! container stays mounted until the last of its queries has finished.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::common::files::copy_dir_all;
use crate::installer::{Installer, ResolveError};
use crate::mount::{MountBroker, MountError};
use crate::process::Cmd;
use crate::record::{FirmwareConfig, FirmwareRecords};
use crate::report::{IndentingWriter, Render};
use crate::version::SystemVersion;

/// The firmware package on a mounted install volume.
pub const FIRMWARE_UPDATE_PKG: &str = "Packages/FirmwareUpdate.pkg";

/// Updater payloads inside the expanded package, one directory per board.
pub const UPDATER_DIRECTORY: &str = "Scripts/Tools/USBCUpdater";

/// Apple board directories all start with this prefix.
pub const BOARD_ID_PREFIX: &str = "Mac-";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no FirmwareUpdate.pkg on the install volume of {}", .0.display())]
    PackageNotFound(PathBuf),
    #[error("failed to expand FirmwareUpdate.pkg (package tool exit code {code})")]
    ExpansionFailed { code: i32 },
    #[error("cannot run the package tool: {0}")]
    Tool(#[source] io::Error),
    #[error("cannot prepare a working directory: {0}")]
    Workspace(#[source] io::Error),
    #[error("cannot enumerate {}: {source}", .path.display())]
    ReadDirectory { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Mount(#[from] MountError),
}

/// Runs the package expansion tool.
pub struct PackageExpander {
    pkgutil: PathBuf,
}

impl PackageExpander {
    pub fn new(pkgutil: impl Into<PathBuf>) -> Self {
        Self {
            pkgutil: pkgutil.into(),
        }
    }

    /// Fully expand `package` into `destination`, payloads included. The
    /// destination must not exist yet; the tool creates it.
    fn expand(&self, package: &Path, destination: &Path) -> Result<(), QueryError> {
        let result = Cmd::new(&self.pkgutil)
            .arg("--expand-full")
            .arg_path(package)
            .arg_path(destination)
            .run()
            .map_err(QueryError::Tool)?;
        if !result.success() {
            if !result.stderr_trimmed().is_empty() {
                println!("Error: package tool: {}", result.stderr_trimmed());
            }
            return Err(QueryError::ExpansionFailed {
                code: result.code(),
            });
        }
        Ok(())
    }
}

/// What a query should do beyond reporting records.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Copy each board's firmware payloads under this directory, grouped by
    /// OS version.
    pub save_firmware_to: Option<PathBuf>,
}

impl QueryOptions {
    /// Create the per-version output directory, if saving was requested.
    fn prepare_output(&self, version: &SystemVersion) -> io::Result<Option<PathBuf>> {
        match &self.save_firmware_to {
            None => Ok(None),
            Some(root) => {
                let directory = root.join(version.version_key());
                fs::create_dir_all(&directory)?;
                Ok(Some(directory))
            }
        }
    }
}

/// Everything one installer had to say about Thunderbolt firmware.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub version: SystemVersion,
    pub records: FirmwareRecords,
}

impl Render for QueryResult {
    fn render(&self, writer: &mut IndentingWriter) {
        writer.println(format!("- {}", self.version));
        writer.indent();
        self.records.render(writer);
        writer.outdent();
    }
}

/// A pending query against one installer app.
pub struct FirmwareQuery {
    installer: Installer,
    /// Shared container image this query holds a reference on, if any.
    container: Option<PathBuf>,
}

impl FirmwareQuery {
    /// Build a query for a standalone installer app.
    pub fn on_installer(app: &Path, broker: &MountBroker) -> Result<Self, ResolveError> {
        let installer = Installer::open(app, broker)?;
        Ok(Self {
            installer,
            container: None,
        })
    }

    /// Build one query per installer app found on a disk image. The image
    /// is mounted once and stays mounted until every returned query has run;
    /// with no installers on it, it is unmounted before returning.
    pub fn on_disk_image(image: &Path, broker: &MountBroker) -> Result<Vec<Self>, QueryError> {
        let mount_point = broker.retain(image)?;
        let outcome = Self::on_volume(&mount_point, image, broker);
        // Queries hold their own references now; give up the discovery one.
        broker.release(image);
        outcome
    }

    fn on_volume(
        volume: &Path,
        image: &Path,
        broker: &MountBroker,
    ) -> Result<Vec<Self>, QueryError> {
        let mut queries = Vec::new();
        for app in installer_apps(volume)? {
            match Installer::open(&app, broker) {
                Ok(installer) => {
                    broker.retain(image)?;
                    queries.push(Self {
                        installer,
                        container: Some(image.to_path_buf()),
                    });
                }
                Err(error) => println!("Error: skipping {}: {error}", app.display()),
            }
        }
        Ok(queries)
    }

    /// The installer app this query targets.
    pub fn installer_path(&self) -> &Path {
        &self.installer.path
    }

    /// The OS version this query targets.
    pub fn version(&self) -> &SystemVersion {
        &self.installer.version
    }

    /// Perform the query. The container reference, if any, is released on
    /// both the success and the failure path.
    pub fn run(
        self,
        broker: &MountBroker,
        expander: &PackageExpander,
        options: &QueryOptions,
    ) -> Result<QueryResult, QueryError> {
        let outcome = self.query_records(broker, expander, options);
        if let Some(image) = &self.container {
            broker.release(image);
        }
        let records = outcome?;
        Ok(QueryResult {
            version: self.installer.version,
            records,
        })
    }

    fn query_records(
        &self,
        broker: &MountBroker,
        expander: &PackageExpander,
        options: &QueryOptions,
    ) -> Result<FirmwareRecords, QueryError> {
        println!("==========================================================================");
        println!("Installer: {}", self.installer.path.display());
        println!("Target system: {}", self.installer.version);

        let saved_to = options
            .prepare_output(&self.installer.version)
            .map_err(QueryError::Workspace)?;
        if let Some(directory) = &saved_to {
            println!("Saving firmware files under {}", directory.display());
        }

        println!("Mounting InstallESD.dmg");
        let mount = broker.attach(&self.installer.esd_image())?;
        let records = collect_records(mount.path(), &self.installer, expander, saved_to.as_deref());
        println!("Unmounting InstallESD.dmg");
        broker.detach(mount);
        records
    }
}

/// Expand the firmware package on the mounted install volume and read every
/// board config.
fn collect_records(
    volume: &Path,
    installer: &Installer,
    expander: &PackageExpander,
    saved_to: Option<&Path>,
) -> Result<FirmwareRecords, QueryError> {
    let package = volume.join(FIRMWARE_UPDATE_PKG);
    if !package.exists() {
        return Err(QueryError::PackageNotFound(installer.path.clone()));
    }
    println!("Found FirmwareUpdate.pkg; expanding the package");

    let workspace = TempDir::new().map_err(QueryError::Workspace)?;
    let expanded = workspace.path().join("expanded");
    expander.expand(&package, &expanded)?;
    println!("FirmwareUpdate.pkg expanded");

    let boards = board_directories(&expanded.join(UPDATER_DIRECTORY))?;
    println!("Found {} board id(s) in the updater directory", boards.len());

    let mut records = FirmwareRecords::new();
    for (index, board_dir) in boards.iter().enumerate() {
        let board = board_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "[{}/{}] Gathering Thunderbolt firmware for {board}",
            index + 1,
            boards.len()
        );
        let config = match FirmwareConfig::from_file(&board_dir.join("Config.plist"), &board) {
            Ok(config) => config,
            Err(error) => {
                println!("Warning: skipping {board}: {error}");
                continue;
            }
        };
        if let Some(output) = saved_to {
            if let Err(error) = copy_dir_all(board_dir, &output.join(&board)) {
                println!("Warning: cannot copy the {board} firmware files: {error}");
            }
        }
        records.insert(board, config);
    }
    Ok(records)
}

/// Installer app bundles on a mounted volume: `Install*.app`, sorted.
fn installer_apps(volume: &Path) -> Result<Vec<PathBuf>, QueryError> {
    let mut apps = Vec::new();
    for entry in read_dir_entries(volume)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.path().is_dir() && name.starts_with("Install") && name.ends_with(".app") {
            apps.push(entry.path());
        }
    }
    apps.sort();
    Ok(apps)
}

/// Board directories inside the expanded updater tree, sorted by board id.
fn board_directories(updater_dir: &Path) -> Result<Vec<PathBuf>, QueryError> {
    let mut boards = Vec::new();
    for entry in read_dir_entries(updater_dir)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.path().is_dir() && name.starts_with(BOARD_ID_PREFIX) {
            boards.push(entry.path());
        }
    }
    boards.sort();
    Ok(boards)
}

fn read_dir_entries(directory: &Path) -> Result<Vec<fs::DirEntry>, QueryError> {
    let read_error = |source| QueryError::ReadDirectory {
        path: directory.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(directory).map_err(read_error)? {
        entries.push(entry.map_err(read_error)?);
    }
    Ok(entries)
}
