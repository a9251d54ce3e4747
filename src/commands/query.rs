//! Query command - runs the firmware pipeline over one or more installers.
//!
//! Installer paths are resolved up front; the queries themselves run in
//! parallel. With `--database` the results are merged and saved, otherwise
//! they are printed to stdout.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::path::PathBuf;

use crate::config::Config;
use crate::db::FirmwareDatabase;
use crate::mount::MountBroker;
use crate::query::{FirmwareQuery, PackageExpander, QueryOptions, QueryResult};
use crate::report::{IndentingWriter, Render};

/// Arguments of the query command.
pub struct QueryArgs {
    /// Installer apps, or disk images when `disk_images` is set.
    pub files: Vec<PathBuf>,
    /// Treat `files` as disk images containing installer apps.
    pub disk_images: bool,
    /// Merge results into this database instead of printing them.
    pub database: Option<PathBuf>,
    /// Replace records for versions that are already in the database.
    pub overwrite: bool,
    /// Copy firmware payloads under this directory, grouped by version.
    pub output: Option<PathBuf>,
}

/// Execute the query command.
pub fn cmd_query(args: QueryArgs, config: &Config) -> Result<()> {
    if args.files.is_empty() {
        bail!("nothing to query; pass at least one installer path");
    }

    // Open the database first so a bad path fails before any mounting.
    let store = match &args.database {
        Some(path) => {
            let db = FirmwareDatabase::load(path)
                .with_context(|| format!("cannot open the database at {}", path.display()))?;
            Some((path.clone(), db))
        }
        None => None,
    };

    let broker = MountBroker::new(config.hdiutil.clone());
    let expander = PackageExpander::new(config.pkgutil.clone());
    let options = QueryOptions {
        save_firmware_to: args.output.clone(),
    };

    let mut queries: Vec<FirmwareQuery> = Vec::new();
    for file in &args.files {
        if args.disk_images {
            match FirmwareQuery::on_disk_image(file, &broker) {
                Ok(batch) => {
                    if batch.is_empty() {
                        println!("Warning: no installer apps on {}", file.display());
                    }
                    queries.extend(batch);
                }
                Err(error) => println!("Error: skipping {}: {error}", file.display()),
            }
        } else {
            match FirmwareQuery::on_installer(file, &broker) {
                Ok(query) => queries.push(query),
                Err(error) => println!("Error: skipping {}: {error}", file.display()),
            }
        }
    }
    if queries.is_empty() {
        bail!("none of the given paths yielded a queryable installer");
    }

    // Pipelines are independent; the broker and the database serialize
    // their own shared state.
    let attempted = queries.len();
    let results: Vec<QueryResult> = queries
        .into_par_iter()
        .filter_map(|query| {
            let installer = query.installer_path().to_path_buf();
            match query.run(&broker, &expander, &options) {
                Ok(result) => Some(result),
                Err(error) => {
                    println!("Error: no records from {}: {error}", installer.display());
                    None
                }
            }
        })
        .collect();

    println!("==========================================================================");
    println!("{} of {attempted} installer(s) produced firmware records", results.len());
    if results.is_empty() {
        bail!("every installer query failed");
    }

    match store {
        None => {
            let mut writer = IndentingWriter::new();
            for result in &results {
                result.render(&mut writer);
            }
            print!("{}", writer.as_str());
        }
        Some((path, database)) => {
            for result in results {
                let key = result.version.version_key();
                database.register(&key, result.records, args.overwrite);
            }
            database
                .save(&path)
                .with_context(|| format!("cannot save the database to {}", path.display()))?;
            println!(
                "Saved the database to {} ({} version(s) on record)",
                path.display(),
                database.len()
            );
        }
    }
    Ok(())
}
