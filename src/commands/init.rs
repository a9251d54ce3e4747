//! Init command - creates an empty firmware database.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::common::files::ensure_parent_exists;
use crate::db::FirmwareDatabase;

/// Execute the init command.
pub fn cmd_init(database: &Path) -> Result<()> {
    if database.exists() {
        bail!(
            "{} already exists; pass a fresh path or delete it first",
            database.display()
        );
    }
    ensure_parent_exists(database)
        .with_context(|| format!("cannot create the directory for {}", database.display()))?;
    FirmwareDatabase::empty().save(database)?;
    println!("Created an empty firmware database at {}", database.display());
    Ok(())
}
