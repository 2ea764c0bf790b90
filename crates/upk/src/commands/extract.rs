use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;

use crate::commands::ArchiveArgs;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input package file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Only extract this entry, without its package directories
    #[arg(short, long, value_name = "PATH")]
    entry: Option<String>,

    /// Allow writing into a directory that is not empty
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self, args: &ArchiveArgs) -> Result<()> {
        if !self.overwrite && self.has_content()? {
            return Err(miette!(
                "{} is not empty, pass --overwrite to write into it",
                self.directory.display()
            ));
        }

        let mut archive = args.open(&self.file)?;

        match &self.entry {
            Some(entry) => {
                info!("writing {entry}");
                let found = archive
                    .extract_file(entry, &self.directory, false)
                    .context(format!("extracting {entry}"))?;
                if !found {
                    return Err(miette!("{} has no entry {entry}", self.file.display()));
                }
            }
            None => {
                let count = archive
                    .extract_all(&self.directory)
                    .context(format!("extracting into {}", self.directory.display()))?;
                info!("extracted {count} entries");
            }
        }
        Ok(())
    }

    fn has_content(&self) -> Result<bool> {
        if !self.directory.exists() {
            return Ok(false);
        }
        let mut entries = std::fs::read_dir(&self.directory)
            .into_diagnostic()
            .context(format!("reading {}", self.directory.display()))?;
        Ok(entries.next().is_some())
    }
}
