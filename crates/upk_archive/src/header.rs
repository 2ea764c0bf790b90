//! The package header (summary) at the start of every archive.
//!
//! The layout depends on the archive version. Every threshold below is an exact comparison
//! against the version read from the file:
//!
//! | Field | Present |
//! |-------|---------|
//! | magic, version, headers size | always |
//! | group name | version >= [`VER_GROUP_NAME`] |
//! | package flags, name/export/import table descriptors | always |
//! | depends offset | version >= [`VER_DEPENDS_OFFSET`] |
//! | import/export guid fields | version >= [`VER_IMPORT_EXPORT_GUIDS`] |
//! | thumbnail table offset | version >= [`VER_THUMBNAIL_TABLE`] |
//! | guid, generations | always |
//! | engine version | version >= [`VER_ENGINE_VERSION`] |
//! | cooker version | version >= [`VER_COOKER_VERSION`] |
//! | Mass Effect block | [`Family::MassEffect`] only |
//! | chunk directory | version >= [`VER_COMPRESSION`] |

use tracing::{debug, instrument};

use crate::{
    chunk::ChunkTable,
    error::{FormatError, Result},
    options::Family,
    stream::{Platform, Stream, StreamExt},
};

/// First dword of every package and of every compressed chunk
pub const PACKAGE_MAGIC: u32 = 0x9E2A_83C1;

/// Package flag set while the payload is split into compressed chunks
pub const PACKAGE_FLAG_COMPRESSED: u32 = 0x0200_0000;

/// Version words announcing an archive compressed as a whole
const FULLY_COMPRESSED: [u32; 2] = [0x10000, 0x20000];

/// Licensee version assumed for Mass Effect archives on PC, whose stored value is unrelated
const MASS_EFFECT_PC_LICENSEE: u32 = 90;

pub const VER_FLAGS2: u32 = 195;
pub const VER_ARCHETYPE: u32 = 220;
pub const VER_ENGINE_VERSION: u32 = 245;
pub const VER_EXPORT_FLAGS: u32 = 247;
pub const VER_SERIAL_OFFSET_ALWAYS: u32 = 249;
pub const VER_GROUP_NAME: u32 = 269;
pub const VER_COOKER_VERSION: u32 = 277;
pub const VER_NET_OBJECTS: u32 = 322;
pub const VER_COMPRESSION: u32 = 334;
pub const VER_DEPENDS_OFFSET: u32 = 415;
pub const VER_EXPORT_PACKAGE_FLAGS: u32 = 475;
pub const VER_COMPONENT_MAP_REMOVED: u32 = 543;
pub const VER_THUMBNAIL_TABLE: u32 = 584;
pub const VER_IMPORT_EXPORT_GUIDS: u32 = 623;

/// Row count and absolute offset of one metadata table
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TableInfo {
    pub count: u32,
    pub offset: u32,
}

/// Counts recorded for one save generation of the package
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Generation {
    pub export_count: u32,
    pub name_count: u32,

    /// Zero before version [`VER_NET_OBJECTS`]
    pub net_object_count: u32,
}

/// Parsed package header
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PackageHeader {
    pub platform: Platform,
    pub version: u32,

    /// Licensee version used for every decision, after family overrides
    pub licensee_version: u32,

    /// Licensee version as stored in the file
    pub stored_licensee_version: u32,

    pub headers_size: u32,
    pub group: String,

    pub package_flags: u32,

    /// Position of the package flags, patched when saving a decompressed copy
    pub package_flags_offset: u64,

    pub names: TableInfo,
    pub exports: TableInfo,
    pub imports: TableInfo,

    pub depends_offset: Option<u32>,
    pub import_export_guids: Option<[u32; 3]>,
    pub thumbnail_table_offset: Option<u32>,
    pub guid: [u32; 4],
    pub generations: Vec<Generation>,
    pub engine_version: Option<u32>,
    pub cooker_version: Option<u32>,

    /// Position of the chunk directory, which only exists from [`VER_COMPRESSION`] on
    pub chunk_table_offset: Option<u64>,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub chunk_table: Option<ChunkTable>,
}

impl PackageHeader {
    /// Read the header from the start of `stream`
    #[instrument(skip(stream), err)]
    pub fn parse<S: Stream>(stream: &mut S, family: Family) -> Result<Self> {
        stream.set_position(0)?;
        let platform = stream.platform();

        let magic = stream.read_u32()?;
        if magic != PACKAGE_MAGIC {
            return Err(FormatError::InvalidMagic(magic).into());
        }

        let version_word = stream.read_u32()?;
        if FULLY_COMPRESSED.contains(&version_word) {
            return Err(FormatError::FullyCompressed(version_word).into());
        }

        let version = version_word & 0xFFFF;
        let stored_licensee_version = version_word >> 16;
        let licensee_version = match (family, platform) {
            (Family::MassEffect, Platform::Pc) => MASS_EFFECT_PC_LICENSEE,
            _ => stored_licensee_version,
        };
        debug!(version, licensee_version, stored_licensee_version, "package version");

        let headers_size = stream.read_u32()?;

        let group = if version >= VER_GROUP_NAME {
            stream.read_string()?
        } else {
            String::new()
        };

        let package_flags_offset = stream.position()?;
        let package_flags = stream.read_u32()?;
        debug!(
            headers_size,
            group = %group,
            package_flags = format_args!("{package_flags:#010X}"),
            "package summary"
        );

        let mut table_info = || -> Result<TableInfo> {
            Ok(TableInfo {
                count: stream.read_u32()?,
                offset: stream.read_u32()?,
            })
        };
        let names = table_info()?;
        let exports = table_info()?;
        let imports = table_info()?;
        debug!(?names, ?exports, ?imports, "table descriptors");

        let depends_offset = if version >= VER_DEPENDS_OFFSET {
            Some(stream.read_u32()?)
        } else {
            None
        };

        let import_export_guids = if version >= VER_IMPORT_EXPORT_GUIDS {
            Some([stream.read_u32()?, stream.read_u32()?, stream.read_u32()?])
        } else {
            None
        };

        let thumbnail_table_offset = if version >= VER_THUMBNAIL_TABLE {
            Some(stream.read_u32()?)
        } else {
            None
        };

        let guid = [
            stream.read_u32()?,
            stream.read_u32()?,
            stream.read_u32()?,
            stream.read_u32()?,
        ];

        let generation_count = stream.read_u32()?;
        let generations = (0..generation_count)
            .map(|_| {
                Ok(Generation {
                    export_count: stream.read_u32()?,
                    name_count: stream.read_u32()?,
                    net_object_count: if version >= VER_NET_OBJECTS {
                        stream.read_u32()?
                    } else {
                        0
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(?guid, generations = generations.len(), "package identity");

        let engine_version = if version >= VER_ENGINE_VERSION {
            Some(stream.read_u32()?)
        } else {
            None
        };
        let cooker_version = if version >= VER_COOKER_VERSION {
            Some(stream.read_u32()?)
        } else {
            None
        };
        debug!(?engine_version, ?cooker_version, "engine");

        if family == Family::MassEffect {
            skip_mass_effect_fields(stream, licensee_version)?;
        }

        let (chunk_table_offset, chunk_table) = if version >= VER_COMPRESSION {
            let offset = stream.position()?;
            (Some(offset), Some(ChunkTable::parse(stream)?))
        } else {
            (None, None)
        };

        Ok(PackageHeader {
            platform,
            version,
            licensee_version,
            stored_licensee_version,
            headers_size,
            group,
            package_flags,
            package_flags_offset,
            names,
            exports,
            imports,
            depends_offset,
            import_export_guids,
            thumbnail_table_offset,
            guid,
            generations,
            engine_version,
            cooker_version,
            chunk_table_offset,
            chunk_table,
        })
    }

    /// Whether the payload is split into compressed chunks
    pub fn is_compressed(&self) -> bool {
        self.chunk_table
            .as_ref()
            .is_some_and(ChunkTable::is_compressed)
    }
}

/// Consume the family specific fields that follow the cooker version
fn skip_mass_effect_fields<S: Stream>(stream: &mut S, licensee: u32) -> Result<()> {
    if (16..136).contains(&licensee) {
        stream.read_u32()?;
    }
    if (32..136).contains(&licensee) {
        stream.read_u32()?;
    }
    if (35..113).contains(&licensee) && stream.read_u32()? != 0 {
        return Err(FormatError::UnsupportedHeader("non-empty additional packages map").into());
    }
    if licensee >= 37 {
        stream.read_u32()?;
        stream.read_u32()?;
    }
    if (39..136).contains(&licensee) {
        stream.read_u32()?;
        stream.read_u32()?;
    }
    Ok(())
}
