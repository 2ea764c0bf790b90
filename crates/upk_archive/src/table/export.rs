//! The export table: every object stored in this package.
//!
//! Rows are read in one pass and resolved in a second one, since both the type and the parent
//! package of a row may point at rows further down the table. Each row ends up addressed by a
//! path of the form `Package/Group/Name.Type`, unique when compared without case.

use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::{
    error::{Error, FileNotFoundError, FormatError, Result},
    header::{
        PackageHeader, VER_ARCHETYPE, VER_COMPONENT_MAP_REMOVED, VER_EXPORT_FLAGS,
        VER_EXPORT_PACKAGE_FLAGS, VER_FLAGS2, VER_NET_OBJECTS, VER_SERIAL_OFFSET_ALWAYS,
    },
    stream::{Stream, StreamExt},
    table::{import::ImportTable, instance_name, name::NameTable},
};

/// Size of one legacy component map entry, which is skipped
const COMPONENT_MAP_ENTRY_SIZE: u64 = 12;

/// One export row
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExportRow {
    /// Class of the object: import `-type_ref-1`, export `type_ref-1`, or `Class` when zero
    pub type_ref: i32,
    pub parent_type_ref: i32,

    /// One based export row of the package containing this object, 0 for the root
    pub package_index: i32,

    pub name_ref: i32,

    /// Instance number of the name, 0 when the name is unique
    pub archetype_ref: i32,

    pub flags: u32,
    pub flags2: u64,

    /// Absolute position of the serial size field, followed by the serial offset
    pub link_offset: u64,

    pub serial_size: u32,
    pub serial_offset: u32,

    /// Whether the serial offset is stored at all. Old packages omit it for empty objects.
    pub has_serial_offset: bool,

    pub export_flags: u32,
    pub net_object_ids: Vec<u32>,
    pub guid: [u32; 4],
    pub package_flags: u32,

    /// Object name including its instance suffix
    pub name: String,
    pub data_type: String,
    pub path: String,
}

impl ExportRow {
    /// Read the wire fields of one row. Names and paths are resolved afterwards.
    fn read<S: Stream>(stream: &mut S, version: u32) -> Result<Self> {
        let mut row = ExportRow {
            type_ref: stream.read_i32()?,
            parent_type_ref: stream.read_i32()?,
            package_index: stream.read_i32()?,
            name_ref: stream.read_i32()?,
            ..Default::default()
        };

        if version >= VER_ARCHETYPE {
            row.archetype_ref = stream.read_i32()?;
        }
        row.flags = stream.read_u32()?;
        if version >= VER_FLAGS2 {
            row.flags2 = stream.read_u64()?;
        }

        row.link_offset = stream.position()?;
        row.serial_size = stream.read_u32()?;
        row.has_serial_offset = row.serial_size > 0 || version >= VER_SERIAL_OFFSET_ALWAYS;
        if row.has_serial_offset {
            row.serial_offset = stream.read_u32()?;
        }

        if version < VER_COMPONENT_MAP_REMOVED {
            let count = stream.read_u32()? as u64;
            let position = stream.position()?;
            stream.set_position(position + count * COMPONENT_MAP_ENTRY_SIZE)?;
        }

        if version >= VER_EXPORT_FLAGS {
            row.export_flags = stream.read_u32()?;
        }

        if version >= VER_NET_OBJECTS {
            let count = stream.read_u32()?;
            row.net_object_ids = (0..count)
                .map(|_| stream.read_u32())
                .collect::<std::io::Result<Vec<_>>>()?;
            row.guid = [
                stream.read_u32()?,
                stream.read_u32()?,
                stream.read_u32()?,
                stream.read_u32()?,
            ];
        }

        if version >= VER_EXPORT_PACKAGE_FLAGS {
            row.package_flags = stream.read_u32()?;
        }

        Ok(row)
    }

    /// End of the payload in the archive
    pub fn serial_end(&self) -> u64 {
        self.serial_offset as u64 + self.serial_size as u64
    }

    /// The GUID as 32 upper case hex digits
    pub fn guid_string(&self) -> String {
        self.guid.iter().map(|part| format!("{part:08X}")).collect()
    }
}

/// Parsed export table with its path index
#[derive(Debug, Default, Clone)]
pub struct ExportTable {
    rows: Vec<ExportRow>,
    /// Upper case path to row id
    index: IndexMap<String, usize>,
}

impl ExportTable {
    /// Read and resolve the export table described by `header`
    #[instrument(skip_all, fields(count = header.exports.count, offset = header.exports.offset), err)]
    pub fn parse<S: Stream>(
        stream: &mut S,
        header: &PackageHeader,
        names: &NameTable,
        imports: &ImportTable,
    ) -> Result<Self> {
        stream.set_position(header.exports.offset as u64)?;

        let mut rows = Vec::new();
        for id in 0..header.exports.count as usize {
            let mut row = ExportRow::read(stream, header.version)?;
            row.name = instance_name(names.name(row.name_ref as i64)?, row.archetype_ref as i64);
            trace!(
                id,
                name = %row.name,
                type_ref = row.type_ref,
                package_index = row.package_index,
                link_offset = format_args!("{:#010X}", row.link_offset),
                serial_size = format_args!("{:#010X}", row.serial_size),
                serial_offset = format_args!("{:#010X}", row.serial_offset),
                "export"
            );
            rows.push(row);
        }

        let mut table = ExportTable {
            index: IndexMap::with_capacity(rows.len()),
            rows,
        };
        table.resolve(imports)?;

        debug!(count = table.rows.len(), "export table");
        Ok(table)
    }

    /// Second pass: data types, full paths and the path index
    fn resolve(&mut self, imports: &ImportTable) -> Result<()> {
        for id in 0..self.rows.len() {
            let data_type = self.data_type(self.rows[id].type_ref, imports)?;
            let directory = self.directory(id)?;

            let row = &mut self.rows[id];
            row.data_type = data_type;
            row.path = format!("{directory}{}.{}", row.name, row.data_type);
            trace!(id, path = %row.path, "resolved export");

            if self.index.insert(row.path.to_uppercase(), id).is_some() {
                return Err(FormatError::DuplicatePath(row.path.clone()).into());
            }
        }
        Ok(())
    }

    fn data_type(&self, type_ref: i32, imports: &ImportTable) -> Result<String> {
        Ok(match type_ref {
            0 => String::from("Class"),
            t if t < 0 => imports.name(-(t as i64) - 1)?.to_owned(),
            t => self.export(t as i64)?.name.clone(),
        })
    }

    /// Directory part of a row's path, ending in `/` unless empty
    fn directory(&self, id: usize) -> Result<String> {
        let mut parents = Vec::new();
        let mut package = self.rows[id].package_index;

        while package != 0 {
            if parents.len() >= self.rows.len() {
                return Err(FormatError::PackageCycle(id).into());
            }
            let parent = self.export(package as i64)?;
            parents.push(parent.name.as_str());
            package = parent.package_index;
        }

        Ok(parents
            .iter()
            .rev()
            .map(|name| format!("{name}/"))
            .collect())
    }

    /// Row referenced by a one based export index
    fn export(&self, index: i64) -> Result<&ExportRow> {
        usize::try_from(index - 1)
            .ok()
            .and_then(|id| self.rows.get(id))
            .ok_or_else(|| {
                FormatError::InvalidReference {
                    table: "export",
                    index,
                }
                .into()
            })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ExportRow] {
        &self.rows
    }

    /// Get a row by its zero based id
    pub fn row(&self, id: usize) -> Result<&ExportRow> {
        self.rows
            .get(id)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(id)))
    }

    /// Get a row by path, ignoring case
    pub fn row_by_path(&self, path: &str) -> Result<&ExportRow> {
        let Some(id) = self.id_by_path(path) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                path.to_owned(),
            )));
        };
        self.row(id)
    }

    /// Get the id of a row by path, ignoring case
    pub fn id_by_path(&self, path: &str) -> Option<usize> {
        self.index.get(&path.to_uppercase()).copied()
    }

    /// Path of the row at `id`
    pub fn path(&self, id: usize) -> Result<&str> {
        self.row(id).map(|row| row.path.as_str())
    }

    /// Paths of every row in table order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.path.as_str())
    }

    /// Paths of rows whose data type is one of `types`
    pub fn search_by_types<T: AsRef<str>>(&self, types: &[T]) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|row| types.iter().any(|t| t.as_ref() == row.data_type))
            .map(|row| row.path.as_str())
            .collect()
    }

    /// Ids of the rows whose payload overlaps `size` bytes at `offset`
    pub fn ids_overlapping(&self, offset: u32, size: u32) -> impl Iterator<Item = usize> + '_ {
        let (start, end) = (offset as u64, offset as u64 + size as u64);
        self.rows.iter().enumerate().filter_map(move |(id, row)| {
            let row_start = row.serial_offset as u64;
            let row_end = row_start + row.serial_size as u64;
            (row.serial_size > 0 && row_start < end && start < row_end).then_some(id)
        })
    }

    /// Point the row at a new payload. Only the in-memory row changes.
    pub fn set_serial(&mut self, id: usize, offset: u32, size: u32) -> Result<()> {
        let row = self
            .rows
            .get_mut(id)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(id)))?;
        row.serial_offset = offset;
        row.serial_size = size;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::error::{Error, FormatError, Result};
    use crate::header::{PackageHeader, TableInfo};
    use crate::options::Family;
    use crate::store::MemoryStore;
    use crate::stream::{Platform, StreamExt};
    use crate::table::export::ExportTable;
    use crate::table::import::ImportTable;
    use crate::table::name::NameTable;

    /// Names: None, Core, Package, Foo, Texture2D
    fn names(store: &mut MemoryStore) -> Result<NameTable> {
        let offset = store.seek_end()?;
        for name in ["None", "Core", "Package", "Foo", "Texture2D"] {
            store.write_string(name, false)?;
            store.write_u32(0)?;
            store.write_u32(0x70010)?;
        }
        NameTable::parse(
            store,
            TableInfo {
                count: 5,
                offset: offset as u32,
            },
            Family::Generic,
            false,
        )
    }

    /// One import named Texture2D
    fn imports(store: &mut MemoryStore, names: &NameTable) -> Result<ImportTable> {
        let offset = store.seek_end()?;
        for value in [1, 0, 2, 0, 0, 4, 0] {
            store.write_u32(value)?;
        }
        ImportTable::parse(
            store,
            TableInfo {
                count: 1,
                offset: offset as u32,
            },
            names,
        )
    }

    /// `(type_ref, package_index, name_ref, archetype_ref, serial_size, serial_offset)`
    type Row = (i32, i32, i32, i32, u32, u32);

    fn write_rows(store: &mut MemoryStore, version: u32, rows: &[Row]) -> Result<u64> {
        let offset = store.seek_end()?;
        for &(type_ref, package, name, archetype, size, serial_offset) in rows {
            store.write_i32(type_ref)?;
            store.write_i32(0)?;
            store.write_i32(package)?;
            store.write_i32(name)?;
            if version >= 220 {
                store.write_i32(archetype)?;
            }
            store.write_u32(0x000F_0004)?;
            if version >= 195 {
                store.write_u64(0)?;
            }
            store.write_u32(size)?;
            if size > 0 || version >= 249 {
                store.write_u32(serial_offset)?;
            }
            if version < 543 {
                store.write_u32(1)?;
                store.write_data(&[0xEE; 12])?;
            }
            if version >= 247 {
                store.write_u32(0)?;
            }
            if version >= 322 {
                store.write_u32(2)?;
                store.write_u32(7)?;
                store.write_u32(8)?;
                for part in [1, 2, 3, 4] {
                    store.write_u32(part)?;
                }
            }
            if version >= 475 {
                store.write_u32(0x55)?;
            }
        }
        Ok(offset)
    }

    fn parse(version: u32, rows: &[Row]) -> Result<ExportTable> {
        let mut store = MemoryStore::empty(Platform::Pc);
        let names = names(&mut store)?;
        let imports = imports(&mut store, &names)?;
        let offset = write_rows(&mut store, version, rows)?;

        let header = PackageHeader {
            version,
            exports: TableInfo {
                count: rows.len() as u32,
                offset: offset as u32,
            },
            ..Default::default()
        };
        ExportTable::parse(&mut store, &header, &names, &imports)
    }

    #[traced_test]
    #[test]
    fn resolve_paths() -> Result<()> {
        let rows = [
            // Core.Texture2D
            (-1, 0, 1, 0, 0, 0),
            // Core/Foo.Texture2D at 0x400
            (-1, 1, 3, 0, 0x20, 0x400),
            // Core/Foo/Foo_1.Foo_0, typed by the row after it
            (4, 2, 3, 2, 0x10, 0x420),
            // Core/Foo_0.Class
            (0, 1, 3, 1, 0x10, 0x430),
        ];
        let table = parse(868, &rows)?;

        assert_eq!(
            table.paths().collect::<Vec<_>>(),
            [
                "Core.Texture2D",
                "Core/Foo.Texture2D",
                "Core/Foo/Foo_1.Foo_0",
                "Core/Foo_0.Class",
            ]
        );
        assert_eq!(table.id_by_path("core/foo.texture2d"), Some(1));
        assert_eq!(table.row_by_path("CORE/FOO_0.CLASS")?.serial_offset, 0x430);
        assert_eq!(table.search_by_types(&["Texture2D"]).len(), 2);
        assert_eq!(table.search_by_types(&["Class", "Foo_0"]).len(), 2);

        let row = table.row(1)?;
        assert_eq!(row.serial_size, 0x20);
        assert_eq!(row.net_object_ids, vec![7, 8]);
        assert_eq!(row.guid_string(), "00000001000000020000000300000004");
        assert_eq!(row.package_flags, 0x55);
        assert_eq!(row.flags, 0x000F_0004);
        Ok(())
    }

    #[test]
    fn link_offset_points_at_serial_size() -> Result<()> {
        let table = parse(868, &[(0, 0, 3, 0, 0x10, 0x200)])?;
        let row = table.row(0)?;

        // Six dwords and the 64-bit flags precede the serial size
        let names_len = [4, 4, 7, 3, 9].iter().map(|len| 4 + len + 8).sum::<u64>();
        assert_eq!(row.link_offset, names_len + 28 + 32);
        Ok(())
    }

    #[test]
    fn legacy_rows() -> Result<()> {
        // Before 249 an empty payload has no offset, before 543 a component map follows
        let table = parse(
            240,
            &[(0, 0, 3, 0, 0, 0), (0, 0, 4, 0, 0x10, 0x300)],
        )?;
        assert_eq!(table.row(0)?.serial_offset, 0);
        assert!(!table.row(0)?.has_serial_offset);
        assert_eq!(table.row(1)?.serial_offset, 0x300);
        assert!(table.row(1)?.has_serial_offset);
        assert_eq!(table.row(1)?.path, "Texture2D.Class");

        let table = parse(200, &[(0, 0, 3, 5, 0x10, 0x300)])?;
        assert_eq!(table.row(0)?.path, "Foo.Class");
        Ok(())
    }

    #[test]
    fn duplicate_path() {
        let result = parse(868, &[(0, 0, 3, 0, 0, 0), (0, 0, 3, 0, 0, 0)]);
        assert!(matches!(
            result,
            Err(Error::Format(FormatError::DuplicatePath(path))) if path == "Foo.Class"
        ));
    }

    #[test]
    fn duplicate_path_ignores_case() -> Result<()> {
        let mut store = MemoryStore::empty(Platform::Pc);
        let offset = store.seek_end()?;
        for name in ["foo", "FOO"] {
            store.write_string(name, false)?;
            store.write_u64(0)?;
        }
        let names = NameTable::parse(
            &mut store,
            TableInfo { count: 2, offset: offset as u32 },
            Family::Turok,
            false,
        )?;
        let offset = write_rows(&mut store, 868, &[(0, 0, 0, 0, 0, 0), (0, 0, 1, 0, 0, 0)])?;
        let header = PackageHeader {
            version: 868,
            exports: TableInfo { count: 2, offset: offset as u32 },
            ..Default::default()
        };

        assert!(matches!(
            ExportTable::parse(&mut store, &header, &names, &ImportTable::default()),
            Err(Error::Format(FormatError::DuplicatePath(_)))
        ));
        Ok(())
    }

    #[test]
    fn package_cycle() {
        let result = parse(868, &[(0, 2, 3, 0, 0, 0), (0, 1, 1, 0, 0, 0)]);
        assert!(matches!(
            result,
            Err(Error::Format(FormatError::PackageCycle(0)))
        ));

        let result = parse(868, &[(0, 1, 3, 0, 0, 0)]);
        assert!(matches!(
            result,
            Err(Error::Format(FormatError::PackageCycle(0)))
        ));
    }

    #[test]
    fn bad_references() {
        assert!(matches!(
            parse(868, &[(0, 5, 3, 0, 0, 0)]),
            Err(Error::Format(FormatError::InvalidReference { table: "export", index: 5 }))
        ));
        assert!(matches!(
            parse(868, &[(-3, 0, 3, 0, 0, 0)]),
            Err(Error::Format(FormatError::InvalidReference { table: "import", index: 2 }))
        ));
        assert!(matches!(
            parse(868, &[(0, 0, 30, 0, 0, 0)]),
            Err(Error::Format(FormatError::InvalidReference { table: "name", index: 30 }))
        ));
    }

    #[test]
    fn not_found() -> Result<()> {
        let mut table = parse(868, &[(0, 0, 3, 0, 0x10, 0x100)])?;
        assert!(table.row_by_path("Bar.Class").is_err_and(|e| e.is_not_found()));
        assert!(table.row(1).is_err_and(|e| e.is_not_found()));

        table.set_serial(0, 0x800, 4)?;
        assert_eq!(table.row(0)?.serial_end(), 0x804);
        Ok(())
    }

    #[test]
    fn overlapping_rows() -> Result<()> {
        let rows = [
            (-1, 0, 1, 0, 0, 0),
            (-1, 1, 3, 0, 0x20, 0x400),
            (4, 2, 3, 2, 0x10, 0x420),
            (0, 1, 3, 1, 0x10, 0x430),
        ];
        let mut table = parse(868, &rows)?;

        assert_eq!(table.ids_overlapping(0x400, 0x20).collect::<Vec<_>>(), [1]);
        assert_eq!(table.ids_overlapping(0x41F, 2).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(table.ids_overlapping(0x440, 0x10).count(), 0);
        // Empty payloads never overlap
        assert_eq!(table.ids_overlapping(0, 0x10).count(), 0);

        table.set_serial(3, 0x400, 0x20)?;
        assert_eq!(table.ids_overlapping(0x400, 0x20).collect::<Vec<_>>(), [1, 3]);
        Ok(())
    }
}
