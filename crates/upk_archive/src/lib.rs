//! This library reads, patches and rebuilds the **package** archives (`.upk`, `.u`, `.xxx`,
//! `.sfm`) of games built on Unreal Engine 3.
//!
//! # Package Format Documentation
//!
//! A package is a single file holding a header, three metadata tables and the serialized objects.
//! The payload after the header may be split into independently compressed chunks. Every offset
//! stored in the header and the tables is a *logical* offset, valid in the decompressed package.
//! This crate hides the compression behind a [`VirtualStore`], so reading and patching work the
//! same for compressed and uncompressed archives.
//!
//! ## Byte Order
//!
//! The byte order depends on the platform the package was cooked for. PC and PS Vita packages are
//! little endian, PS3 and Xbox 360 packages big endian. It cannot be detected reliably and is
//! part of the [`ArchiveOptions`].
//!
//! ## Header
//!
//! | Field                  | Description                                                        |
//! |------------------------|--------------------------------------------------------------------|
//! | Magic number           | 4 bytes: `0x9E2A83C1`                                              |
//! | Version                | 4 bytes: archive version in the low word, licensee in the high     |
//! | Headers size           | 4 bytes: size of everything before the serialized objects          |
//! | Group name             | length prefixed string, version 269 and up                         |
//! | Package flags          | 4 bytes: `0x02000000` marks a chunked archive                      |
//! | Name table             | 4 + 4 bytes: row count and offset                                  |
//! | Export table           | 4 + 4 bytes: row count and offset                                  |
//! | Import table           | 4 + 4 bytes: row count and offset                                  |
//! | ...                    | version dependent fields, see [`header`]                           |
//! | Chunk directory        | version 334 and up                                                 |
//!
//! ## Chunk Directory
//!
//! Compression flags (4 bytes, `1` zlib, `2` LZO, `8` LZMA) and a chunk count, followed by one
//! entry per chunk:
//!
//! | Offset (bytes) | Field                  | Description                                      |
//! |----------------|------------------------|--------------------------------------------------|
//! | 0x0000         | Uncompressed offset    | 4 bytes: logical start of the chunk              |
//! | 0x0004         | Uncompressed size      | 4 bytes                                          |
//! | 0x0008         | Compressed offset      | 4 bytes: position of the chunk in the file       |
//! | 0x000C         | Compressed size        | 4 bytes                                          |
//!
//! Each chunk starts with its own header (magic, block size, compressed and uncompressed size)
//! and a table of `(compressed size, uncompressed size)` pairs, one per block. The block data
//! follows. A block whose compressed size equals its uncompressed size is stored raw.
//!
//! ## Tables
//!
//! - **Names**: length prefixed strings, each followed by 64-bit flags.
//! - **Imports**: seven dwords per row referencing objects of other packages.
//! - **Exports**: one row per object of this package with its class, parent package, name, and
//!   the size and offset of its serialized data.
//!
//! Exports are addressed by a path built from their parent chain, `Package/Name.Type`, compared
//! without case.

pub mod archive;
pub mod block;
pub mod chunk;
pub mod compression;
pub mod error;
pub mod free_space;
pub mod header;
pub mod options;
pub mod store;
pub mod stream;
pub mod table;
pub mod virtual_store;

pub use archive::{Archive, PackedFile};
pub use compression::{Codec, CompressionMethod, LzoBackend, StandardCodec};
pub use options::{ArchiveOptions, Family};
pub use store::{FileStore, MemoryStore};
pub use stream::{OpenMode, Platform, Stream, StreamExt};
pub use virtual_store::VirtualStore;
