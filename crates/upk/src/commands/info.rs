use clap::Args;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use upk_archive::CompressionMethod;

use crate::commands::ArchiveArgs;

#[derive(Args)]
pub struct InfoArgs {
    /// An input package file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl InfoArgs {
    pub fn handle(&self, args: &ArchiveArgs) -> Result<()> {
        let archive = args.open(&self.file)?;
        let header = archive.header();

        println!("{}", self.file.display().bold());
        println!("  platform: {}", header.platform);
        println!("  family: {}", archive.options().family);
        println!(
            "  version: {} (licensee {})",
            header.version, header.licensee_version
        );
        println!("  package flags: {:#010X}", header.package_flags);
        if !header.group.is_empty() {
            println!("  group: {}", header.group);
        }
        println!(
            "  guid: {}",
            header.guid.iter().map(|part| format!("{part:08X}")).collect::<String>()
        );
        println!("  names: {}", archive.names().len());
        println!("  imports: {}", archive.imports().len());
        println!("  exports: {}", archive.exports().len());

        let Some(table) = archive.chunk_table() else {
            return Ok(());
        };

        if !table.is_compressed() {
            println!("  compression: {}", "none".dimmed());
            return Ok(());
        }

        let method = CompressionMethod::try_from(table.flags())
            .map(|method| method.to_string())
            .unwrap_or_else(|_| format!("unknown ({:#010X})", table.flags()));
        println!("  compression: {}", method.green());
        println!("  chunks: {}", table.len());
        for (i, chunk) in table.chunks().iter().enumerate() {
            println!(
                "    {i:>4}: {:#010X}+{:#X} <- {:#010X}+{:#X}",
                chunk.uncompressed_offset(),
                chunk.uncompressed_size(),
                chunk.compressed_offset(),
                chunk.compressed_size(),
            );
        }

        Ok(())
    }
}
