use clap::Args;
use miette::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::commands::{finish_patch, ArchiveArgs};

#[derive(Args)]
pub struct ReplaceArgs {
    /// A package file to patch
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the entry to redirect
    #[arg(short, long, value_name = "PATH")]
    entry: String,

    /// Path of the entry whose payload is shared
    #[arg(short, long, value_name = "PATH")]
    source: String,

    /// Write the patched archive here instead of patching in place
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl ReplaceArgs {
    pub fn handle(&self, args: &ArchiveArgs) -> Result<()> {
        let mut archive = args.open_for_patch(&self.file, self.output.as_ref())?;

        info!("pointing {} at {}", self.entry, self.source);
        archive
            .replace_file(&self.entry, &self.source)
            .context(format!("replacing {}", self.entry))?;

        finish_patch(&mut archive, self.output.as_ref())
    }
}
