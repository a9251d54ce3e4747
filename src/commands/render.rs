//! Render command - turns a database file into an indented report.

use anyhow::{Context, Result};
use std::path::Path;

use crate::db::FirmwareDatabase;
use crate::report::{IndentingWriter, Render};

/// Execute the render command. With `output` the report is written to a
/// file, otherwise it goes to stdout.
pub fn cmd_render(database: &Path, output: Option<&Path>) -> Result<()> {
    let db = FirmwareDatabase::load(database)
        .with_context(|| format!("cannot open the database at {}", database.display()))?;
    match output {
        Some(path) => {
            db.write_report(path)
                .with_context(|| format!("cannot write the report to {}", path.display()))?;
            println!("Rendered the database to {}", path.display());
        }
        None => {
            let mut writer = IndentingWriter::new();
            db.render(&mut writer);
            print!("{}", writer.as_str());
        }
    }
    Ok(())
}
