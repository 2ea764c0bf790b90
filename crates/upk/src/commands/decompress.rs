use clap::Args;
use miette::{miette, Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::commands::{check_target, ArchiveArgs};

#[derive(Args)]
pub struct DecompressArgs {
    /// A compressed package file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target package file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl DecompressArgs {
    pub fn handle(&self, args: &ArchiveArgs) -> Result<()> {
        check_target(&self.output, self.overwrite)?;
        let mut archive = args.open(&self.file)?;

        info!("creating {}", self.output.display());
        let written = archive
            .save_decompressed_to(&self.output)
            .context(format!("writing {}", self.output.display()))?;
        if !written {
            return Err(miette!("{} is not compressed", self.file.display()));
        }
        Ok(())
    }
}
