//! Builds synthetic packages for the integration tests.
//!
//! Layout: header, names, exports, then the payloads in export order. Compressed packages split
//! everything after the header into zlib chunks and blocks.

#![allow(dead_code)]

use upk_archive::{
    compression::{Codec, CompressionMethod, StandardCodec},
    error::Result,
    header::{PACKAGE_FLAG_COMPRESSED, PACKAGE_MAGIC},
    store::MemoryStore,
    stream::{Platform, StreamExt},
};

pub const PACKAGE_FLAGS: u32 = 0x0008_0009;

#[derive(Debug, Clone)]
pub struct Export {
    pub name: usize,
    pub type_ref: i32,
    pub package_index: i32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct Compression {
    pub chunk_size: usize,
    pub block_size: usize,
}

/// Offsets of the interesting parts of a built package
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Logical end of the header, where the tables start
    pub header_end: u64,
    pub names_offset: u64,
    pub exports_offset: u64,
    pub link_offsets: Vec<u64>,
    pub serial_offsets: Vec<u64>,
    /// Logical size of the package
    pub end: u64,
}

#[derive(Debug, Clone)]
pub struct PackageBuilder {
    platform: Platform,
    version: u32,
    names: Vec<String>,
    exports: Vec<Export>,
    compression: Option<Compression>,
}

impl PackageBuilder {
    pub fn new(platform: Platform, version: u32) -> Self {
        PackageBuilder {
            platform,
            version,
            names: Vec::new(),
            exports: Vec::new(),
            compression: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name_id(name);
        self
    }

    /// Add an export named `name` whose payload is `data`
    pub fn export(mut self, name: &str, type_ref: i32, package_index: i32, data: &[u8]) -> Self {
        let name = self.name_id(name);
        self.exports.push(Export {
            name,
            type_ref,
            package_index,
            data: data.to_vec(),
        });
        self
    }

    pub fn compressed(mut self, chunk_size: usize, block_size: usize) -> Self {
        self.compression = Some(Compression {
            chunk_size,
            block_size,
        });
        self
    }

    fn name_id(&mut self, name: &str) -> usize {
        match self.names.iter().position(|n| n == name) {
            Some(id) => id,
            None => {
                self.names.push(name.to_owned());
                self.names.len() - 1
            }
        }
    }

    /// The package as it would look decompressed, whether or not compression is configured
    pub fn build_plain(&self) -> Result<(Vec<u8>, Layout)> {
        let header_end = self.header(&[], 0, 0, 0)?.len() as u64;
        let (body, layout) = self.body(header_end)?;

        let mut image = self.header(&[], layout.names_offset, layout.exports_offset, 0)?;
        image.extend_from_slice(&body);
        Ok((image, layout))
    }

    /// The package in its configured form
    pub fn build(&self) -> Result<(Vec<u8>, Layout)> {
        let Some(compression) = self.compression else {
            return self.build_plain();
        };

        let header_end = self.header(&[], 0, 0, 0)?.len() as u64;
        let (body, layout) = self.body(header_end)?;

        let pieces = body.chunks(compression.chunk_size).collect::<Vec<_>>();
        let data_start = header_end + 16 * pieces.len() as u64;

        let codec = StandardCodec::new();
        let mut entries = Vec::new();
        let mut data = Vec::new();
        let mut uncompressed_offset = header_end;
        for piece in pieces {
            let chunk = self.chunk(&codec, piece, compression.block_size)?;
            entries.push([
                uncompressed_offset as u32,
                piece.len() as u32,
                (data_start + data.len() as u64) as u32,
                chunk.len() as u32,
            ]);
            uncompressed_offset += piece.len() as u64;
            data.extend_from_slice(&chunk);
        }

        let mut image = self.header(
            &entries,
            layout.names_offset,
            layout.exports_offset,
            PACKAGE_FLAG_COMPRESSED,
        )?;
        assert_eq!(image.len() as u64, data_start);
        image.extend_from_slice(&data);
        Ok((image, layout))
    }

    fn header(
        &self,
        chunks: &[[u32; 4]],
        names_offset: u64,
        exports_offset: u64,
        extra_flags: u32,
    ) -> Result<Vec<u8>> {
        let version = self.version;
        let mut store = MemoryStore::empty(self.platform);

        store.write_u32(PACKAGE_MAGIC)?;
        store.write_u32(version)?;
        store.write_u32(names_offset as u32)?;
        if version >= 269 {
            store.write_string("None\0", false)?;
        }
        store.write_u32(PACKAGE_FLAGS | extra_flags)?;

        store.write_u32(self.names.len() as u32)?;
        store.write_u32(names_offset as u32)?;
        store.write_u32(self.exports.len() as u32)?;
        store.write_u32(exports_offset as u32)?;
        store.write_u32(0)?;
        store.write_u32(exports_offset as u32)?;

        if version >= 415 {
            store.write_u32(0)?;
        }
        if version >= 623 {
            store.write_u32(0)?;
            store.write_u32(0)?;
            store.write_u32(0)?;
        }
        if version >= 584 {
            store.write_u32(0)?;
        }
        for part in [0xDEAD, 0xBEEF, 0xCAFE, 0xF00D] {
            store.write_u32(part)?;
        }
        store.write_u32(1)?;
        store.write_u32(self.exports.len() as u32)?;
        store.write_u32(self.names.len() as u32)?;
        if version >= 322 {
            store.write_u32(0)?;
        }
        if version >= 245 {
            store.write_u32(8788)?;
        }
        if version >= 277 {
            store.write_u32(162)?;
        }
        if version >= 334 {
            store.write_u32(if chunks.is_empty() { 0 } else { 1 })?;
            store.write_u32(chunks.len() as u32)?;
            for entry in chunks {
                for value in entry {
                    store.write_u32(*value)?;
                }
            }
        }

        Ok(store.into_inner())
    }

    /// Tables and payloads laid out from the logical offset `start`
    fn body(&self, start: u64) -> Result<(Vec<u8>, Layout)> {
        let version = self.version;
        let mut store = MemoryStore::empty(self.platform);
        store.set_position(start)?;

        let mut layout = Layout {
            header_end: start,
            names_offset: start,
            ..Default::default()
        };

        for name in &self.names {
            store.write_string(&format!("{name}\0"), false)?;
            // Flags 0x70010, stored with their dwords swapped
            if self.platform.is_big_endian() {
                store.write_u32(0x70010)?;
                store.write_u32(0)?;
            } else {
                store.write_u32(0)?;
                store.write_u32(0x70010)?;
            }
        }

        layout.exports_offset = store.position()?;
        for export in &self.exports {
            store.write_i32(export.type_ref)?;
            store.write_i32(0)?;
            store.write_i32(export.package_index)?;
            store.write_i32(export.name as i32)?;
            if version >= 220 {
                store.write_i32(0)?;
            }
            store.write_u32(0x000F_0004)?;
            if version >= 195 {
                store.write_u64(0)?;
            }
            layout.link_offsets.push(store.position()?);
            store.write_u32(export.data.len() as u32)?;
            if !export.data.is_empty() || version >= 249 {
                store.write_u32(0)?;
            }
            if version < 543 {
                store.write_u32(0)?;
            }
            if version >= 247 {
                store.write_u32(0)?;
            }
            if version >= 322 {
                store.write_u32(0)?;
                for _ in 0..4 {
                    store.write_u32(0)?;
                }
            }
            if version >= 475 {
                store.write_u32(0)?;
            }
        }

        for (export, link) in self.exports.iter().zip(layout.link_offsets.clone()) {
            let offset = store.seek_end()?;
            store.write_data(&export.data)?;
            layout.serial_offsets.push(offset);

            if !export.data.is_empty() || version >= 249 {
                store.set_position(link + 4)?;
                store.write_u32(offset as u32)?;
            }
        }

        layout.end = store.seek_end()?;
        let body = store.into_inner().split_off(start as usize);
        Ok((body, layout))
    }

    /// One zlib chunk: header, block table, block data
    fn chunk(&self, codec: &StandardCodec, plain: &[u8], block_size: usize) -> Result<Vec<u8>> {
        let mut table = Vec::new();
        let mut data = Vec::new();
        for block in plain.chunks(block_size) {
            let compressed = codec.compress(block, CompressionMethod::Zlib)?;
            let stored = if compressed.len() < block.len() {
                compressed
            } else {
                block.to_vec()
            };
            table.push((stored.len() as u32, block.len() as u32));
            data.extend_from_slice(&stored);
        }

        let mut store = MemoryStore::empty(self.platform);
        store.write_u32(PACKAGE_MAGIC)?;
        store.write_u32(block_size as u32)?;
        store.write_u32(data.len() as u32)?;
        store.write_u32(plain.len() as u32)?;
        for (compressed, uncompressed) in table {
            store.write_u32(compressed)?;
            store.write_u32(uncompressed)?;
        }
        store.write_data(&data)?;
        Ok(store.into_inner())
    }
}

/// Bytes that compress well but are easy to tell apart
pub fn payload(seed: u8, length: usize) -> Vec<u8> {
    (0..length).map(|i| seed.wrapping_add((i / 8) as u8)).collect()
}
