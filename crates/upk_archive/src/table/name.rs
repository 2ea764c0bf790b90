//! The name table: interned strings referenced by id from every other table

use indexmap::IndexMap;
use tracing::{debug, instrument, trace, warn};

use crate::{
    error::{FormatError, Result},
    header::TableInfo,
    options::Family,
    stream::{Platform, Stream, StreamExt},
};

/// Name flags observed in well formed packages
pub const KNOWN_NAME_FLAGS: [u64; 3] = [0x70010, 0x71010, 0x70000];

/// Parsed name table
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    names: Vec<String>,
    /// Upper case name to the last row holding it
    index: IndexMap<String, usize>,
}

impl NameTable {
    /// Read `info.count` names starting at `info.offset`.
    ///
    /// Every name is followed by a 64-bit flags field, except in Mass Effect packages cooked for
    /// the PS3. Flags outside of [`KNOWN_NAME_FLAGS`] fail the parse unless `relaxed` is set or
    /// the package belongs to a family that does not use them.
    #[instrument(skip(stream), err)]
    pub fn parse<S: Stream>(
        stream: &mut S,
        info: TableInfo,
        family: Family,
        relaxed: bool,
    ) -> Result<Self> {
        stream.set_position(info.offset as u64)?;

        let has_flags = !(family == Family::MassEffect && stream.platform() == Platform::Ps3);
        let check_flags = family != Family::Turok;

        let mut names = Vec::new();
        let mut index = IndexMap::new();

        for id in 0..info.count as usize {
            let name = stream.read_string()?.trim_matches('\0').to_owned();

            if has_flags {
                let flags = stream.read_u64_swapped()?;
                trace!(id, name = %name, flags = format_args!("{flags:#018X}"), "name");

                if check_flags && !KNOWN_NAME_FLAGS.contains(&flags) {
                    if !relaxed {
                        return Err(FormatError::UnknownNameFlags { name, flags }.into());
                    }
                    warn!(id, name = %name, flags = format_args!("{flags:#018X}"), "unknown name flags");
                }
            } else {
                trace!(id, name = %name, "name");
            }

            index.insert(name.to_uppercase(), id);
            names.push(name);
        }

        debug!(count = names.len(), "name table");
        Ok(NameTable { names, index })
    }

    /// Get the name stored at `id`
    pub fn name(&self, id: i64) -> Result<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.names.get(id))
            .map(String::as_str)
            .ok_or_else(|| {
                FormatError::InvalidReference {
                    table: "name",
                    index: id,
                }
                .into()
            })
    }

    /// Find the id of a name, ignoring case
    pub fn id_by_name(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
