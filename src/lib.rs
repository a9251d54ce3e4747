//! Thunderbolt firmware extraction from macOS installers.
//!
//! The pipeline: resolve an installer app to the OS version it installs
//! ([`installer`]), mount its disk images through a reference-counting
//! broker ([`mount`]), expand the firmware package and read the per-board
//! updater configs ([`query`]), then merge the records into a version-keyed
//! database ([`db`]) or render them as text ([`report`]).

pub mod commands;
pub mod common;
pub mod config;
pub mod db;
pub mod installer;
pub mod mount;
pub mod plist;
pub mod process;
pub mod query;
pub mod record;
pub mod report;
pub mod version;

pub use db::FirmwareDatabase;
pub use mount::MountBroker;
pub use query::{FirmwareQuery, PackageExpander, QueryOptions, QueryResult};
pub use record::{FirmwareConfig, FirmwareInfo, FirmwareRecords};
pub use version::SystemVersion;
