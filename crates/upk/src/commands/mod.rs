pub mod compress;
pub mod decompress;
pub mod extract;
pub mod info;
pub mod inject;
pub mod list;
pub mod replace;

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::info;
use upk_archive::{Archive, ArchiveOptions, Family, Platform};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    #[default]
    Pc,
    Ps3,
    Xbox,
    PsVita,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Pc => Platform::Pc,
            PlatformArg::Ps3 => Platform::Ps3,
            PlatformArg::Xbox => Platform::Xbox,
            PlatformArg::PsVita => Platform::PsVita,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    #[default]
    Generic,
    MassEffect,
    Turok,
}

impl From<FamilyArg> for Family {
    fn from(value: FamilyArg) -> Self {
        match value {
            FamilyArg::Generic => Family::Generic,
            FamilyArg::MassEffect => Family::MassEffect,
            FamilyArg::Turok => Family::Turok,
        }
    }
}

/// How archives are opened and patched, shared by every subcommand
#[derive(Args)]
pub struct ArchiveArgs {
    /// Platform the archive was cooked for
    #[arg(long, global = true, value_enum, default_value_t = PlatformArg::Pc)]
    platform: PlatformArg,

    /// Game family of the archive
    #[arg(long, global = true, value_enum, default_value_t = FamilyArg::Generic)]
    family: FamilyArg,

    /// Accept unknown name table flags with a warning
    #[arg(long, global = true, default_value_t = false)]
    relaxed_name_flags: bool,

    /// Text embedded in the stamps written into patched archives
    #[arg(long, global = true, default_value = "upk-rs")]
    signature: String,

    /// Leave space released by `replace` untouched
    #[arg(long, global = true, default_value_t = false)]
    no_stamp: bool,
}

impl ArchiveArgs {
    pub fn options(&self) -> ArchiveOptions {
        ArchiveOptions::builder()
            .platform(self.platform.into())
            .family(self.family.into())
            .relaxed_name_flags(self.relaxed_name_flags)
            .signature(self.signature.as_str())
            .stamp_freed_space(!self.no_stamp)
            .build()
    }

    pub fn open(&self, file: &Path) -> Result<Archive> {
        Archive::open(file, self.options()).context(format!("opening {}", file.display()))
    }

    /// Open the archive a mutating command works on.
    ///
    /// Uncompressed archives are patched in place, or in a copy at `output`. Compressed archives
    /// are patched in memory and need an `output` to be recompressed into.
    pub fn open_for_patch(&self, file: &Path, output: Option<&PathBuf>) -> Result<Archive> {
        let archive = self.open(file)?;
        match output {
            Some(output) if !archive.is_compressed() => {
                info!("copying {} to {}", file.display(), output.display());
                std::fs::copy(file, output)
                    .into_diagnostic()
                    .context(format!("creating {}", output.display()))?;
                self.open(output)
            }
            None if archive.is_compressed() => Err(miette!(
                "{} is compressed, pass --output to write the patched copy",
                file.display()
            )),
            _ => Ok(archive),
        }
    }
}

/// Persist changes made to a compressed archive
pub fn finish_patch(archive: &mut Archive, output: Option<&PathBuf>) -> Result<()> {
    if let (true, Some(output)) = (archive.is_compressed(), output) {
        info!("writing {}", output.display());
        archive
            .save_compressed_to(output)
            .context(format!("writing {}", output.display()))?;
    }
    Ok(())
}

/// Refuse to clobber `path` unless asked to
pub fn check_target(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(miette!(
            "{} already exists, pass --overwrite to replace it",
            path.display()
        ));
    }
    Ok(())
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Show the header and chunk directory of an archive
    Info(info::InfoArgs),
    /// List the entries of an archive
    List(list::ListArgs),
    /// Extract entries into a directory
    Extract(extract::ExtractArgs),
    /// Replace the payload of an entry with the content of a file
    Inject(inject::InjectArgs),
    /// Point an entry at the payload of another entry
    Replace(replace::ReplaceArgs),
    /// Write a decompressed copy of a compressed archive
    Decompress(decompress::DecompressArgs),
    /// Write a recompressed copy of a compressed archive
    Compress(compress::CompressArgs),
}

impl Commands {
    pub fn handle(&self, archive: &ArchiveArgs) -> miette::Result<()> {
        match self {
            Commands::Info(info) => info.handle(archive),
            Commands::List(list) => list.handle(archive),
            Commands::Extract(extract) => extract.handle(archive),
            Commands::Inject(inject) => inject.handle(archive),
            Commands::Replace(replace) => replace.handle(archive),
            Commands::Decompress(decompress) => decompress.handle(archive),
            Commands::Compress(compress) => compress.handle(archive),
        }
    }
}
