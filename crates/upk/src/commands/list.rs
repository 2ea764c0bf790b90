use clap::Args;
use itertools::Itertools;
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use crate::commands::ArchiveArgs;

#[derive(Args)]
pub struct ListArgs {
    /// An input package file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Only list entries of these data types
    #[arg(short, long = "type", value_name = "TYPE")]
    types: Vec<String>,

    /// Print the export rows as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl ListArgs {
    pub fn handle(&self, args: &ArchiveArgs) -> Result<()> {
        let archive = args.open(&self.file)?;
        let exports = archive.exports();

        let rows = if self.types.is_empty() {
            exports.rows().iter().collect::<Vec<_>>()
        } else {
            archive
                .search_files(&self.types)
                .into_iter()
                .map(|path| exports.row_by_path(path))
                .collect::<Result<Vec<_>, _>>()?
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows).into_diagnostic()?);
            return Ok(());
        }

        for row in rows.iter().sorted_by(|a, b| a.path.cmp(&b.path)) {
            println!(
                "{:#010X} {:>10} {}",
                row.serial_offset.dimmed(),
                row.serial_size,
                row.path
            );
        }
        Ok(())
    }
}
