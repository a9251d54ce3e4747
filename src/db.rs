//! The on-disk firmware database.
//!
//! Records from many installers accumulate in one JSON file keyed by
//! `<version>_<build>`. The in-memory table is behind a mutex, so queries
//! running on different threads can merge their results into one database;
//! every mutation and snapshot goes through that lock.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::files::atomic_write;
use crate::record::FirmwareRecords;
use crate::report::{IndentingWriter, Render};
use crate::version::SystemVersion;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read the database at {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("the database at {} is corrupt: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("cannot encode the database: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Serialized shape of the database.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Storage {
    data: BTreeMap<String, FirmwareRecords>,
}

/// All gathered firmware records, keyed by OS version.
#[derive(Debug)]
pub struct FirmwareDatabase {
    storage: Mutex<Storage>,
}

impl FirmwareDatabase {
    /// A database with no records.
    pub fn empty() -> Self {
        Self {
            storage: Mutex::new(Storage::default()),
        }
    }

    /// Load a database previously written by [`FirmwareDatabase::save`].
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let storage = serde_json::from_str(&text).map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            storage: Mutex::new(storage),
        })
    }

    /// Write the database as pretty JSON. The file is replaced atomically,
    /// never truncated in place.
    pub fn save(&self, path: &Path) -> Result<(), SaveError> {
        let json = {
            let storage = self.storage.lock().unwrap();
            serde_json::to_string_pretty(&*storage).map_err(SaveError::Encode)?
        };
        atomic_write(path, json.as_bytes()).map_err(|source| SaveError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge one installer's records under `version_key`. An existing entry
    /// wins unless `overwrite` is set; the whole entry is replaced, never
    /// merged field by field.
    pub fn register(&self, version_key: &str, records: FirmwareRecords, overwrite: bool) {
        let mut storage = self.storage.lock().unwrap();
        match storage.data.entry(version_key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(records);
            }
            Entry::Occupied(mut slot) => {
                if overwrite {
                    slot.insert(records);
                } else {
                    println!(
                        "Warning: {version_key} is already in the database; keeping the existing records"
                    );
                }
            }
        }
    }

    /// Records registered under `version_key`, if any.
    pub fn records(&self, version_key: &str) -> Option<FirmwareRecords> {
        self.storage.lock().unwrap().data.get(version_key).cloned()
    }

    /// Number of OS versions in the database.
    pub fn len(&self) -> usize {
        self.storage.lock().unwrap().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the database and write it to `path` atomically.
    pub fn write_report(&self, path: &Path) -> Result<(), SaveError> {
        let mut writer = IndentingWriter::new();
        self.render(&mut writer);
        atomic_write(path, writer.as_str().as_bytes()).map_err(|source| SaveError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Render for FirmwareDatabase {
    /// Versions are listed oldest first. A key that no longer parses is
    /// reported and skipped; it stays in the file untouched.
    fn render(&self, writer: &mut IndentingWriter) {
        let storage = self.storage.lock().unwrap();
        writer.println("## Thunderbolt Firmware Database");
        let mut versions: Vec<SystemVersion> = storage
            .data
            .keys()
            .filter_map(|key| match SystemVersion::from_version_key(key) {
                Ok(version) => Some(version),
                Err(error) => {
                    println!("Warning: skipping a database entry: {error}");
                    None
                }
            })
            .collect();
        versions.sort();
        for version in versions {
            writer.println(format!("- {version}"));
            writer.indent();
            if let Some(records) = storage.data.get(&version.version_key()) {
                records.render(writer);
            }
            writer.outdent();
        }
    }
}
