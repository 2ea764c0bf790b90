use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;
use upk_archive::PackedFile;

use crate::commands::{finish_patch, ArchiveArgs};

#[derive(Args)]
pub struct InjectArgs {
    /// A package file to patch
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the entry to replace
    #[arg(short, long, value_name = "PATH")]
    entry: String,

    /// File holding the new payload
    #[arg(short, long, value_name = "FILE")]
    data: PathBuf,

    /// Offset of a dword in the payload that must point right behind itself
    #[arg(long = "hard-link", value_name = "OFFSET")]
    hard_links: Vec<u32>,

    /// Write the patched archive here instead of patching in place
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl InjectArgs {
    pub fn handle(&self, args: &ArchiveArgs) -> Result<()> {
        let data = std::fs::read(&self.data)
            .into_diagnostic()
            .context(format!("reading {}", self.data.display()))?;

        let mut archive = args.open_for_patch(&self.file, self.output.as_ref())?;

        info!("injecting {} into {}", self.data.display(), self.entry);
        archive
            .inject_file(
                &self.entry,
                PackedFile {
                    data,
                    hard_links: self.hard_links.clone(),
                },
            )
            .context(format!("injecting {}", self.entry))?;

        finish_patch(&mut archive, self.output.as_ref())
    }
}
