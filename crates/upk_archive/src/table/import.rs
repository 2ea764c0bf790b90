//! The import table: references to objects defined in other packages

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument, trace};

use crate::{
    error::{FormatError, Result},
    header::TableInfo,
    stream::{Stream, StreamExt},
    table::{instance_name, name::NameTable},
};

/// One import row as stored on disk
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportRecord {
    pub class_package: u32,
    pub class_package_instance: u32,
    pub class_name: u32,
    pub class_name_instance: u32,

    /// Export (positive) or import (negative) row owning this object, 0 for none
    pub outer_index: i32,

    pub object_name: u32,
    pub object_instance: u32,
}

/// Parsed import table
#[derive(Debug, Default, Clone)]
pub struct ImportTable {
    records: Vec<ImportRecord>,
    names: Vec<String>,
}

impl ImportTable {
    #[instrument(skip(stream, names), err)]
    pub fn parse<S: Stream>(stream: &mut S, info: TableInfo, names: &NameTable) -> Result<Self> {
        stream.set_position(info.offset as u64)?;
        let endian = stream.platform().endian();

        let mut records = Vec::new();
        let mut resolved = Vec::new();

        for id in 0..info.count as usize {
            let record = ImportRecord::read_options(stream, endian, ())?;
            let name = instance_name(
                names.name(record.object_name as i64)?,
                record.object_instance as i64,
            );
            trace!(id, name = %name, ?record, "import");

            records.push(record);
            resolved.push(name);
        }

        debug!(count = records.len(), "import table");
        Ok(ImportTable {
            records,
            names: resolved,
        })
    }

    /// Display name of the import at `id`
    pub fn name(&self, id: i64) -> Result<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.names.get(id))
            .map(String::as_str)
            .ok_or_else(|| Self::invalid(id))
    }

    /// Raw record of the import at `id`
    pub fn record(&self, id: i64) -> Result<&ImportRecord> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.records.get(id))
            .ok_or_else(|| Self::invalid(id))
    }

    pub fn records(&self) -> &[ImportRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn invalid(id: i64) -> crate::error::Error {
        FormatError::InvalidReference {
            table: "import",
            index: id,
        }
        .into()
    }
}
