//! The archive facade: open a package, look up its exports, patch and rebuild it.

use std::{
    fmt::{self, Debug},
    fs,
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Component, Path, PathBuf},
};

use chrono::Local;
use tracing::{debug, info, instrument};

use crate::{
    chunk::ChunkTable,
    compression::{Codec, StandardCodec},
    error::{Error, FileNotFoundError, FormatError, Result},
    free_space::{FreeExtent, FreeSpace},
    header::{PackageHeader, PACKAGE_FLAG_COMPRESSED},
    options::ArchiveOptions,
    store::{FileStore, MemoryStore},
    stream::{OpenMode, Platform, Stream, StreamExt},
    table::{ExportRow, ExportTable, ImportTable, NameTable},
    virtual_store::VirtualStore,
};

/// Payload stamps are padded so that payloads appended at the end start on this boundary
const APPEND_ALIGNMENT: u64 = 0x30;

/// Payload to inject together with the offsets inside it that point back into it
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackedFile {
    pub data: Vec<u8>,

    /// Offsets, relative to the payload start, of dwords that must hold the absolute position of
    /// the byte right after them once the payload is placed
    pub hard_links: Vec<u32>,
}

impl From<Vec<u8>> for PackedFile {
    fn from(data: Vec<u8>) -> Self {
        PackedFile {
            data,
            hard_links: Vec::new(),
        }
    }
}

impl From<&[u8]> for PackedFile {
    fn from(data: &[u8]) -> Self {
        data.to_vec().into()
    }
}

/// The stream all table and payload access goes through
enum ActiveStore<S> {
    Raw(S),
    Virtual(VirtualStore<S>),
}

impl<S: Stream> Stream for ActiveStore<S> {
    fn platform(&self) -> Platform {
        match self {
            ActiveStore::Raw(store) => store.platform(),
            ActiveStore::Virtual(store) => store.platform(),
        }
    }

    fn data_len(&mut self) -> io::Result<u64> {
        match self {
            ActiveStore::Raw(store) => store.data_len(),
            ActiveStore::Virtual(store) => store.data_len(),
        }
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        match self {
            ActiveStore::Raw(store) => store.open(mode),
            ActiveStore::Virtual(store) => store.open(mode),
        }
    }

    fn close(&mut self) {
        match self {
            ActiveStore::Raw(store) => store.close(),
            ActiveStore::Virtual(store) => store.close(),
        }
    }
}

impl<S: Stream> Read for ActiveStore<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ActiveStore::Raw(store) => store.read(buf),
            ActiveStore::Virtual(store) => store.read(buf),
        }
    }
}

impl<S: Stream> Write for ActiveStore<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveStore::Raw(store) => store.write(buf),
            ActiveStore::Virtual(store) => store.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveStore::Raw(store) => store.flush(),
            ActiveStore::Virtual(store) => store.flush(),
        }
    }
}

impl<S: Stream> Seek for ActiveStore<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ActiveStore::Raw(store) => store.seek(pos),
            ActiveStore::Virtual(store) => store.seek(pos),
        }
    }
}

/// Open `stream` for the duration of `f`. The stream is closed again whatever `f` returns.
fn scoped<T, R>(stream: &mut T, mode: OpenMode, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R>
where
    T: Stream + ?Sized,
{
    stream.open(mode)?;
    let result = f(stream);
    stream.close();
    result
}

/// A package archive.
///
/// Compressed archives are accessed through a [`VirtualStore`], so every operation works on
/// logical offsets whether or not the payload is split into compressed chunks. Changes made to a
/// compressed archive live in memory until [`Archive::save_compressed`] or
/// [`Archive::save_decompressed`] writes them out. Uncompressed archives are patched in place.
///
/// ```no_run
/// use upk_archive::{Archive, ArchiveOptions};
///
/// fn dump_textures(path: &str) -> upk_archive::error::Result<()> {
///     let mut archive = Archive::open(path, ArchiveOptions::default())?;
///
///     let textures = archive
///         .search_files(&["Texture2D"])
///         .into_iter()
///         .map(str::to_owned)
///         .collect::<Vec<_>>();
///
///     for path in textures {
///         let data = archive.get_file_data(&path)?;
///         println!("{path}: {} bytes", data.len());
///     }
///
///     Ok(())
/// }
/// ```
pub struct Archive<S: Stream = FileStore> {
    store: ActiveStore<S>,
    options: ArchiveOptions,
    header: PackageHeader,
    names: NameTable,
    imports: ImportTable,
    exports: ExportTable,
    free_space: FreeSpace,
}

impl<S: Stream + Debug> Debug for Archive<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("version", &self.header.version)
            .field("platform", &self.header.platform)
            .field("compressed", &self.is_compressed())
            .field("names", &self.names.len())
            .field("imports", &self.imports.len())
            .field("exports", &self.exports.len())
            .finish()
    }
}

impl Archive<FileStore> {
    /// Open the archive at `path` with the standard codec
    pub fn open(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        Self::open_with_codec(path, options, StandardCodec::new())
    }

    /// Open the archive at `path`, compressing and decompressing blocks with `codec`
    pub fn open_with_codec(
        path: impl AsRef<Path>,
        options: ArchiveOptions,
        codec: impl Codec + 'static,
    ) -> Result<Self> {
        let store = FileStore::new(path.as_ref(), options.platform);
        Self::from_store(store, options, Box::new(codec))
    }

    /// Write a decompressed copy of the archive to a new file at `path`
    pub fn save_decompressed_to(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        if !self.is_compressed() {
            return Ok(false);
        }
        let mut target = FileStore::create(path.as_ref(), self.header.platform)?;
        self.save_decompressed(&mut target)
    }

    /// Write a recompressed copy of the archive to a new file at `path`
    pub fn save_compressed_to(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        if !self.is_compressed() {
            return Ok(false);
        }
        let mut target = FileStore::create(path.as_ref(), self.header.platform)?;
        self.save_compressed(&mut target)
    }
}

impl<S: Stream> Archive<S> {
    /// Parse the header and tables held by `store`.
    ///
    /// The platform of `store` decides the byte order, not the one in `options`.
    #[instrument(skip_all, fields(family = %options.family), err)]
    pub fn from_store(mut store: S, options: ArchiveOptions, codec: Box<dyn Codec>) -> Result<Self> {
        let mut header = scoped(&mut store, OpenMode::Read, |store| {
            PackageHeader::parse(store, options.family)
        })?;

        let mut store = match header.chunk_table.take() {
            Some(table) if table.is_compressed() => {
                debug!(
                    chunks = table.len(),
                    flags = format_args!("{:#010X}", table.flags()),
                    "compressed archive"
                );
                ActiveStore::Virtual(VirtualStore::new(store, table, codec))
            }
            table => {
                header.chunk_table = table;
                ActiveStore::Raw(store)
            }
        };

        let (names, imports, exports) = scoped(&mut store, OpenMode::Read, |store| {
            let names = NameTable::parse(
                store,
                header.names,
                options.family,
                options.relaxed_name_flags,
            )?;
            let imports = ImportTable::parse(store, header.imports, &names)?;
            let exports = ExportTable::parse(store, &header, &names, &imports)?;
            Ok((names, imports, exports))
        })?;

        info!(
            version = header.version,
            licensee = header.licensee_version,
            names = names.len(),
            imports = imports.len(),
            exports = exports.len(),
            "opened archive"
        );

        Ok(Archive {
            store,
            options,
            header,
            names,
            imports,
            exports,
            free_space: FreeSpace::new(),
        })
    }

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn imports(&self) -> &ImportTable {
        &self.imports
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    /// The chunk directory, if the archive version has one
    pub fn chunk_table(&self) -> Option<&ChunkTable> {
        match &self.store {
            ActiveStore::Virtual(store) => Some(store.table()),
            ActiveStore::Raw(_) => self.header.chunk_table.as_ref(),
        }
    }

    /// Whether the payload is split into compressed chunks
    pub fn is_compressed(&self) -> bool {
        matches!(self.store, ActiveStore::Virtual(_))
    }

    /// Extents released by replaced or injected entries and not reused yet
    pub fn free_extents(&self) -> &[FreeExtent] {
        self.free_space.extents()
    }

    /// Paths of the entries whose data type is one of `types`
    pub fn search_files<T: AsRef<str>>(&self, types: &[T]) -> Vec<&str> {
        self.exports.search_by_types(types)
    }

    /// Read the payload of the entry at `path`
    #[instrument(skip(self), err)]
    pub fn get_file_data(&mut self, path: &str) -> Result<Vec<u8>> {
        let row = self.exports.row_by_path(path)?;
        let (offset, size) = (row.serial_offset as u64, row.serial_size as usize);

        scoped(&mut self.store, OpenMode::Read, |store| {
            store.set_position(offset)?;
            Ok(store.read_data(size)?)
        })
    }

    /// Release the payloads of `paths`, optionally overwriting them with a marker.
    ///
    /// Payloads still referenced by an entry outside `paths` are kept.
    #[instrument(skip(self, paths), err)]
    pub fn mark_free_space<T: AsRef<str>>(
        &mut self,
        paths: &[T],
        fill_with_stamp: bool,
    ) -> Result<()> {
        let ids = paths
            .iter()
            .map(|path| {
                self.exports
                    .id_by_path(path.as_ref())
                    .ok_or_else(|| FileNotFoundError::Name(path.as_ref().to_owned()).into())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ranges = Vec::new();
        for &id in &ids {
            let row = self.exports.row(id)?;
            if self.owns_payload(row, &ids) {
                ranges.push((row.serial_offset as u64, row.serial_end()));
            }
        }
        ranges.sort_unstable();
        let mut merged: Vec<(u64, u64)> = Vec::new();
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let marker = fill_with_stamp.then(|| self.freed_marker());
        let mut free_space = self.free_space.clone();
        scoped(&mut self.store, OpenMode::ReadWrite, |store| {
            for &(start, end) in &merged {
                release(store, &mut free_space, start, end - start, marker.as_deref())?;
            }
            Ok(())
        })?;

        self.free_space = free_space;
        Ok(())
    }

    /// Replace the payload of the entry at `path`.
    ///
    /// The current payload is released first, so data that fits is written back in place and the
    /// unused tail stays available. Otherwise the first free extent large enough is used, and the
    /// payload is appended at the end of the archive as a last resort. A stamp precedes the
    /// payload whenever there is room for it. A payload shared with another entry is left alone.
    #[instrument(skip(self, file), err)]
    pub fn inject_file(&mut self, path: &str, file: impl Into<PackedFile>) -> Result<()> {
        let id = self
            .exports
            .id_by_path(path)
            .ok_or_else(|| FileNotFoundError::Name(path.to_owned()))?;
        let row = self.exports.row(id)?.clone();
        if !row.has_serial_offset {
            return Err(FormatError::NoSerialOffset(row.path).into());
        }

        let file = file.into();
        let length = file.data.len() as u64;
        let size = dword(length)?;
        let draft = self.stamp_draft();
        let owned = self.owns_payload(&row, &[id]);

        // Free space only changes once the payload and its link are written
        let mut free_space = self.free_space.clone();
        let offset = scoped(&mut self.store, OpenMode::ReadWrite, |store| {
            if owned {
                free_space.add(row.serial_offset as u64, row.serial_size as u64);
            }

            let (start, stamp_length) =
                if let Some(start) = free_space.allocate(length + draft.len() as u64) {
                    (start, draft.len() as u64)
                } else if let Some(start) = free_space.allocate(length) {
                    (start, 0)
                } else {
                    let end = store.seek_end()?;
                    (end, APPEND_ALIGNMENT - (end & 0x0F))
                };

            store.set_position(start)?;
            store.write_data(&repeat_pattern(&draft, stamp_length as usize))?;

            let position = store.position()?;
            let offset = dword(position)?;
            store.write_data(&file.data)?;
            debug!(
                position = format_args!("{position:#010X}"),
                length,
                stamp_length,
                "payload written"
            );

            store.set_position(row.link_offset)?;
            store.write_u32(size)?;
            store.write_u32(offset)?;

            for link in &file.hard_links {
                let at = position + *link as u64;
                store.set_position(at)?;
                store.write_u32(dword(at + 4)?)?;
            }

            Ok(offset)
        })?;

        self.exports.set_serial(id, offset, size)?;
        self.free_space = free_space;
        Ok(())
    }

    /// Point the entry at `dst` to the payload of `src`, releasing the payload of `dst` unless
    /// another entry still references it
    #[instrument(skip(self), err)]
    pub fn replace_file(&mut self, dst: &str, src: &str) -> Result<()> {
        let dst_id = self
            .exports
            .id_by_path(dst)
            .ok_or_else(|| FileNotFoundError::Name(dst.to_owned()))?;
        let src_id = self
            .exports
            .id_by_path(src)
            .ok_or_else(|| FileNotFoundError::Name(src.to_owned()))?;
        let dst_row = self.exports.row(dst_id)?.clone();
        let src_row = self.exports.row(src_id)?.clone();
        if !dst_row.has_serial_offset {
            return Err(FormatError::NoSerialOffset(dst_row.path).into());
        }

        let owned = dst_id != src_id && self.owns_payload(&dst_row, &[dst_id]);
        let marker = (owned && self.options.stamp_freed_space).then(|| self.freed_marker());
        let mut free_space = self.free_space.clone();
        let (header, names, imports) = (&self.header, &self.names, &self.imports);

        let exports = scoped(&mut self.store, OpenMode::ReadWrite, |store| {
            if owned {
                release(
                    store,
                    &mut free_space,
                    dst_row.serial_offset as u64,
                    dst_row.serial_size as u64,
                    marker.as_deref(),
                )?;
            }

            store.set_position(dst_row.link_offset)?;
            store.write_u32(src_row.serial_size)?;
            store.write_u32(src_row.serial_offset)?;

            ExportTable::parse(store, header, names, imports)
        })?;

        self.exports = exports;
        self.free_space = free_space;
        Ok(())
    }

    /// Whether the payload of `row` is still in use, and only by the entries `ids`
    fn owns_payload(&self, row: &ExportRow, ids: &[usize]) -> bool {
        !self
            .free_space
            .overlaps(row.serial_offset as u64, row.serial_size as u64)
            && self
                .exports
                .ids_overlapping(row.serial_offset, row.serial_size)
                .all(|id| ids.contains(&id))
    }

    /// Write the payload of the entry at `path` into `dest`.
    ///
    /// With `with_subdirs` the directories of the entry path are recreated below `dest`.
    /// Returns `false` when there is no such entry.
    #[instrument(skip(self, dest), err)]
    pub fn extract_file(
        &mut self,
        path: &str,
        dest: impl AsRef<Path>,
        with_subdirs: bool,
    ) -> Result<bool> {
        let data = match self.get_file_data(path) {
            Ok(data) => data,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };

        let relative = sanitized_path(path);
        let target = if with_subdirs {
            dest.as_ref().join(&relative)
        } else {
            let name = relative
                .file_name()
                .ok_or_else(|| Error::CustomError(format!("entry {path} has no file name")))?;
            dest.as_ref().join(name)
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        debug!(target = %target.display(), "extracted");
        Ok(true)
    }

    /// Extract every entry below `dest`, returning the number of written files
    #[instrument(skip(self, dest), err)]
    pub fn extract_all(&mut self, dest: impl AsRef<Path>) -> Result<usize> {
        let paths = self.exports.paths().map(str::to_owned).collect::<Vec<_>>();

        let mut count = 0;
        for path in paths {
            if self.extract_file(&path, dest.as_ref(), true)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Write an uncompressed copy of the archive into `target`.
    ///
    /// The chunk directory is replaced by an empty one and the compression flag cleared. Every
    /// chunk lands at its logical offset. Returns `false` if the archive is not compressed.
    #[instrument(skip_all, err)]
    pub fn save_decompressed<W: Stream>(&mut self, target: &mut W) -> Result<bool> {
        let ActiveStore::Virtual(store) = &mut self.store else {
            return Ok(false);
        };

        let table_offset = self
            .header
            .chunk_table_offset
            .ok_or(FormatError::UnsupportedHeader("compressed archive without chunk directory"))?;
        let table_length = store.table().encoded_len();
        let ranges = store
            .table()
            .chunks()
            .iter()
            .map(|chunk| (chunk.uncompressed_offset(), chunk.uncompressed_size() as usize))
            .collect::<Vec<_>>();
        let flags_offset = self.header.package_flags_offset;
        let flags = self.header.package_flags & !PACKAGE_FLAG_COMPRESSED;

        scoped(store, OpenMode::Read, |store| {
            let raw = raw_header(store)?;
            let directory = table_offset as usize..(table_offset + table_length) as usize;
            if directory.end > raw.len() {
                return Err(
                    FormatError::UnsupportedHeader("chunk directory overlaps chunk data").into(),
                );
            }

            let mut header = MemoryStore::empty(store.platform());
            header.write_data(&raw[..directory.start])?;
            header.write_u32(0)?;
            header.write_u32(0)?;
            header.write_data(&raw[directory.end..])?;
            header.set_position(flags_offset)?;
            header.write_u32(flags)?;

            scoped(target, OpenMode::ReadWrite, |target| {
                target.set_position(0)?;
                target.write_data(header.get_ref())?;

                for &(offset, size) in &ranges {
                    store.set_position(offset)?;
                    let data = store.read_data(size)?;
                    target.set_position(offset)?;
                    target.write_data(&data)?;
                    debug!(offset = format_args!("{offset:#010X}"), size, "chunk decompressed");
                }
                target.flush()?;
                Ok(())
            })
        })?;

        Ok(true)
    }

    /// Write a recompressed copy of the archive, including every pending change, into `target`.
    ///
    /// Returns `false` if the archive is not compressed.
    #[instrument(skip_all, err)]
    pub fn save_compressed<W: Stream>(&mut self, target: &mut W) -> Result<bool> {
        let ActiveStore::Virtual(store) = &mut self.store else {
            return Ok(false);
        };

        scoped(store, OpenMode::Read, |store| {
            let raw = raw_header(store)?;
            scoped(target, OpenMode::ReadWrite, |target| {
                target.set_position(0)?;
                target.write_data(&raw)?;
                store.flush_into(target)?;
                target.flush()?;
                Ok(())
            })
        })?;

        Ok(true)
    }

    /// Give back the underlying store
    pub fn into_inner(self) -> S {
        match self.store {
            ActiveStore::Raw(store) => store,
            ActiveStore::Virtual(store) => store.into_inner(),
        }
    }

    fn stamp_draft(&self) -> String {
        format!(".{}.{}.", self.options.signature, Local::now().format("%Y-%m-%d"))
    }

    fn freed_marker(&self) -> String {
        format!(
            "-=[ {} ]=- ({}) ",
            self.options.signature,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Raw bytes in front of the first chunk
fn raw_header<S: Stream>(store: &mut VirtualStore<S>) -> Result<Vec<u8>> {
    let end = store
        .table()
        .chunk(0)
        .map(|chunk| chunk.compressed_offset())
        .ok_or(FormatError::ChunkNotFound(0))?;

    let raw = store.raw();
    raw.set_position(0)?;
    Ok(raw.read_data(end as usize)?)
}

/// Hand the payload of `row` to the allocator, optionally overwriting it with `marker`
fn release<S: Stream>(
    store: &mut S,
    free_space: &mut FreeSpace,
    start: u64,
    length: u64,
    marker: Option<&str>,
) -> Result<()> {
    free_space.add(start, length);

    if let Some(marker) = marker {
        store.set_position(start)?;
        store.write_data(&repeat_pattern(marker, length as usize))?;
    }
    Ok(())
}

/// `pattern` repeated and cut to exactly `length` bytes
fn repeat_pattern(pattern: &str, length: usize) -> Vec<u8> {
    pattern.bytes().cycle().take(length).collect()
}

fn dword(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| FormatError::OffsetOverflow(value).into())
}

/// Relative file system path of an entry. Colons separate directories too, and components that
/// could leave the destination are dropped.
fn sanitized_path(path: &str) -> PathBuf {
    path.split(['/', ':', '\\'])
        .filter(|part| !part.is_empty())
        .map(Path::new)
        .filter(|part| matches!(part.components().next(), Some(Component::Normal(_))))
        .collect()
}
