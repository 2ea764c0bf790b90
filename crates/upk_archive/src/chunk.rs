//! Chunks and the chunk directory of compressed archives.
//!
//! The directory lives in the package header:
//!
//! | Field | Type |
//! |-------|------|
//! | compression flags | u32 |
//! | chunk count | u32 |
//! | chunks | [`ChunkEntry`] * count |
//!
//! Each chunk starts with a [`ChunkHeader`] followed by one [`BlockSizes`] pair per block and the
//! block data itself. The pairs are read until either running total reaches the declared total.

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument, trace};

use crate::{
    block::{Block, BlockCodec},
    error::{FormatError, Result},
    header::PACKAGE_MAGIC,
    stream::{Stream, StreamExt},
};

/// Size of [`ChunkHeader`] on disk
pub const CHUNK_HEADER_SIZE: u64 = 4 * 4;

/// Size of [`BlockSizes`] on disk
pub const BLOCK_SIZES_SIZE: u64 = 2 * 4;

/// Size of [`ChunkEntry`] on disk
pub const CHUNK_ENTRY_SIZE: u64 = 4 * 4;

/// Header at the start of every chunk
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Always the package magic
    pub magic: u32,

    /// Maximum uncompressed size of a block
    pub block_size: u32,

    /// Sum of the compressed block sizes
    pub compressed_size: u32,

    /// Sum of the uncompressed block sizes
    pub uncompressed_size: u32,
}

/// Stored and logical size of one block
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BlockSizes {
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

/// One row of the chunk directory
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChunkEntry {
    pub uncompressed_offset: u32,
    pub uncompressed_size: u32,
    pub compressed_offset: u32,
    pub compressed_size: u32,
}

/// A contiguous logical range backed by a sequence of blocks.
///
/// The block table is only parsed the first time a block is needed.
#[derive(Debug, Clone)]
pub struct Chunk {
    compressed_offset: u64,
    compressed_size: u32,
    uncompressed_offset: u64,
    uncompressed_size: u32,
    block_size: u32,
    blocks: Vec<Block>,
    parsed: bool,
}

impl From<ChunkEntry> for Chunk {
    fn from(entry: ChunkEntry) -> Self {
        Chunk {
            compressed_offset: entry.compressed_offset as u64,
            compressed_size: entry.compressed_size,
            uncompressed_offset: entry.uncompressed_offset as u64,
            uncompressed_size: entry.uncompressed_size,
            block_size: 0,
            blocks: Vec::new(),
            parsed: false,
        }
    }
}

impl Chunk {
    /// A chunk with no blocks yet, to be filled with [`Chunk::add_space`]
    pub fn empty(compressed_offset: u64, uncompressed_offset: u64, block_size: u32) -> Self {
        Chunk {
            compressed_offset,
            compressed_size: 0,
            uncompressed_offset,
            uncompressed_size: 0,
            block_size,
            blocks: Vec::new(),
            parsed: true,
        }
    }

    pub fn entry(&self) -> ChunkEntry {
        ChunkEntry {
            uncompressed_offset: self.uncompressed_offset as u32,
            uncompressed_size: self.uncompressed_size,
            compressed_offset: self.compressed_offset as u32,
            compressed_size: self.compressed_size,
        }
    }

    pub fn compressed_offset(&self) -> u64 {
        self.compressed_offset
    }

    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    pub fn uncompressed_offset(&self) -> u64 {
        self.uncompressed_offset
    }

    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// First logical offset after this chunk
    pub fn end(&self) -> u64 {
        self.uncompressed_offset + self.uncompressed_size as u64
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.uncompressed_offset && offset < self.end()
    }

    /// Maximum uncompressed block size. Zero until the block table has been parsed.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Blocks parsed so far. Empty until the chunk is first touched.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    /// Read the chunk header and block table from `source`
    #[instrument(skip_all, fields(offset = self.compressed_offset), err)]
    pub fn parse<S: Stream>(&mut self, source: &mut S) -> Result<()> {
        debug!("load chunk");

        source.set_position(self.compressed_offset)?;
        let endian = source.platform().endian();

        let header = ChunkHeader::read_options(source, endian, ())?;
        if header.magic != PACKAGE_MAGIC {
            return Err(FormatError::InvalidChunkMagic {
                offset: self.compressed_offset,
                magic: header.magic,
            }
            .into());
        }

        let mut sizes = Vec::new();
        let mut compressed_total = 0u64;
        let mut uncompressed_total = 0u64;
        while compressed_total < header.compressed_size as u64
            && uncompressed_total < header.uncompressed_size as u64
        {
            let pair = BlockSizes::read_options(source, endian, ())?;
            compressed_total += pair.compressed_size as u64;
            uncompressed_total += pair.uncompressed_size as u64;
            sizes.push(pair);
        }

        if uncompressed_total != header.uncompressed_size as u64 {
            return Err(FormatError::BlockTableLength {
                offset: self.compressed_offset,
                expected: header.uncompressed_size,
                actual: uncompressed_total as u32,
            }
            .into());
        }

        // Block data starts right after the table
        let mut compressed_offset = source.position()?;
        let mut uncompressed_offset = self.uncompressed_offset;
        self.blocks = sizes
            .into_iter()
            .map(|pair| {
                let block = Block::new(
                    compressed_offset,
                    pair.compressed_size,
                    uncompressed_offset,
                    pair.uncompressed_size,
                );
                compressed_offset += pair.compressed_size as u64;
                uncompressed_offset += pair.uncompressed_size as u64;
                block
            })
            .collect();

        trace!(
            block_size = header.block_size,
            blocks = self.blocks.len(),
            "parsed block table"
        );
        self.block_size = header.block_size;
        self.parsed = true;
        Ok(())
    }

    fn ensure_parsed<S: Stream>(&mut self, source: &mut S) -> Result<()> {
        if !self.parsed {
            self.parse(source)?;
        }
        Ok(())
    }

    /// Index of the block covering the logical `offset`
    pub fn locate<S: Stream>(&mut self, source: &mut S, offset: u64) -> Result<usize> {
        self.ensure_parsed(source)?;
        self.blocks
            .iter()
            .position(|block| block.contains(offset))
            .ok_or_else(|| FormatError::BlockNotFound(offset).into())
    }

    /// Grow the chunk by `length` zero bytes, filling the last block before creating new ones
    pub fn add_space<S: Stream>(
        &mut self,
        source: &mut S,
        codec: BlockCodec<'_>,
        length: u64,
    ) -> Result<()> {
        self.ensure_parsed(source)?;
        if self.block_size == 0 {
            return Err(FormatError::ZeroBlockSize(self.compressed_offset).into());
        }

        debug!(offset = self.end(), length, "grow chunk");

        let mut remaining = length;
        while remaining > 0 {
            let available = match self.blocks.last() {
                Some(block) if block.uncompressed_size() < self.block_size => {
                    self.block_size - block.uncompressed_size()
                }
                last => {
                    let start = last.map_or(self.uncompressed_offset, Block::end);
                    self.blocks.push(Block::padding(start));
                    self.block_size
                }
            };

            let step = remaining.min(available as u64) as u32;
            if let Some(block) = self.blocks.last_mut() {
                block.add_space(source, codec, step)?;
            }
            self.uncompressed_size += step;
            remaining -= step as u64;
        }

        Ok(())
    }

    /// Write the chunk at the current position of `target`.
    ///
    /// A zeroed header and block table are written first, then every block, then the real header
    /// and table. The position of `target` ends up after the last block.
    #[instrument(skip_all, fields(offset = self.uncompressed_offset), err)]
    pub fn flush<S: Stream, W: Stream>(
        &mut self,
        source: &mut S,
        target: &mut W,
        codec: BlockCodec<'_>,
    ) -> Result<()> {
        self.ensure_parsed(source)?;

        self.compressed_offset = target.position()?;
        let header_size = CHUNK_HEADER_SIZE + BLOCK_SIZES_SIZE * self.blocks.len() as u64;
        target.write_data(&vec![0; header_size as usize])?;

        let mut table = Vec::with_capacity(self.blocks.len());
        let mut compressed_total = 0u64;
        let mut uncompressed_total = 0u64;
        for block in &mut self.blocks {
            block.flush(source, target, codec)?;
            compressed_total += block.compressed_size() as u64;
            uncompressed_total += block.uncompressed_size() as u64;
            table.push(BlockSizes {
                compressed_size: block.compressed_size(),
                uncompressed_size: block.uncompressed_size(),
            });
        }

        let end = target.position()?;
        self.compressed_size = (header_size + compressed_total) as u32;

        if uncompressed_total != self.uncompressed_size as u64 {
            return Err(FormatError::UncompressedSizeMismatch {
                expected: self.uncompressed_size as u64,
                actual: uncompressed_total,
            }
            .into());
        }
        if end - self.compressed_offset != self.compressed_size as u64 {
            return Err(FormatError::CompressedSizeMismatch {
                expected: self.compressed_size as u64,
                actual: end - self.compressed_offset,
            }
            .into());
        }

        let endian = target.platform().endian();
        target.set_position(self.compressed_offset)?;
        ChunkHeader {
            magic: PACKAGE_MAGIC,
            block_size: self.block_size,
            compressed_size: compressed_total as u32,
            uncompressed_size: uncompressed_total as u32,
        }
        .write_options(target, endian, ())?;
        for pair in table {
            pair.write_options(target, endian, ())?;
        }

        target.set_position(end)?;
        Ok(())
    }
}

/// Position of a block inside a [`ChunkTable`] together with its logical range
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockWindow {
    pub chunk: usize,
    pub block: usize,
    pub start: u64,
    pub end: u64,
}

impl BlockWindow {
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// The chunk directory of a compressed archive
#[derive(Debug, Clone, Default)]
pub struct ChunkTable {
    offset: u64,
    flags: u32,
    chunks: Vec<Chunk>,
}

impl ChunkTable {
    /// A table that will be written at `offset` of the package header
    pub fn new(offset: u64, flags: u32, chunks: Vec<Chunk>) -> Self {
        ChunkTable {
            offset,
            flags,
            chunks,
        }
    }

    /// Read the directory at the current position of `source`. Block tables are left unparsed.
    #[instrument(skip_all, err)]
    pub fn parse<S: Stream>(source: &mut S) -> Result<Self> {
        let offset = source.position()?;
        let flags = source.read_u32()?;
        let count = source.read_u32()?;
        debug!(flags = format_args!("{flags:#010X}"), count, "chunk directory");

        let endian = source.platform().endian();
        let chunks = (0..count)
            .map(|index| {
                let entry = ChunkEntry::read_options(source, endian, ())?;
                debug!(
                    index,
                    uncompressed_offset = format_args!("{:#010X}", entry.uncompressed_offset),
                    uncompressed_size = entry.uncompressed_size,
                    compressed_offset = format_args!("{:#010X}", entry.compressed_offset),
                    compressed_size = entry.compressed_size,
                    "chunk"
                );
                Ok(Chunk::from(entry))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ChunkTable {
            offset,
            flags,
            chunks,
        })
    }

    /// Position of the directory inside the package header
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Raw compression flags, see [`CompressionMethod`](crate::compression::CompressionMethod)
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_compressed(&self) -> bool {
        self.flags != 0 && !self.chunks.is_empty()
    }

    /// Size of the directory on disk
    pub fn encoded_len(&self) -> u64 {
        2 * 4 + CHUNK_ENTRY_SIZE * self.chunks.len() as u64
    }

    /// End of the logical address space covered by the chunks
    pub fn data_len(&self) -> u64 {
        self.chunks.last().map_or(0, Chunk::end)
    }

    /// Index of the chunk covering the logical `offset`
    pub fn locate(&self, offset: u64) -> Result<usize> {
        self.chunks
            .iter()
            .position(|chunk| chunk.contains(offset))
            .ok_or_else(|| FormatError::ChunkNotFound(offset).into())
    }

    /// Find the block covering the logical `offset`, parsing its chunk if needed
    pub fn locate_block<S: Stream>(&mut self, source: &mut S, offset: u64) -> Result<BlockWindow> {
        let chunk = self.locate(offset)?;
        let block = self.chunks[chunk].locate(source, offset)?;
        let found = &self.chunks[chunk].blocks[block];

        Ok(BlockWindow {
            chunk,
            block,
            start: found.uncompressed_offset(),
            end: found.end(),
        })
    }

    pub fn block_mut(&mut self, window: &BlockWindow) -> Option<&mut Block> {
        self.chunks.get_mut(window.chunk)?.block_mut(window.block)
    }

    /// Grow the last chunk by `length` zero bytes
    pub fn add_space<S: Stream>(
        &mut self,
        source: &mut S,
        codec: BlockCodec<'_>,
        length: u64,
    ) -> Result<()> {
        let end = self.data_len();
        self.chunks
            .last_mut()
            .ok_or(FormatError::ChunkNotFound(end))?
            .add_space(source, codec, length)
    }

    /// Rewrite every chunk into `target` starting where the first chunk used to start, then
    /// update the directory inside the header copy at `target`.
    #[instrument(skip_all, err)]
    pub fn flush<S: Stream, W: Stream>(
        &mut self,
        source: &mut S,
        target: &mut W,
        codec: BlockCodec<'_>,
    ) -> Result<()> {
        let Some(first) = self.chunks.first() else {
            return Ok(());
        };

        target.set_position(first.compressed_offset())?;
        for chunk in &mut self.chunks {
            chunk.flush(source, target, codec)?;
        }

        let endian = target.platform().endian();
        target.set_position(self.offset + 2 * 4)?;
        for chunk in &self.chunks {
            chunk.entry().write_options(target, endian, ())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use binrw::BinWrite;
    use pretty_assertions::{assert_eq, assert_str_eq};
    use tracing_test::traced_test;

    use crate::block::BlockCodec;
    use crate::chunk::{Chunk, ChunkEntry, ChunkTable};
    use crate::compression::StandardCodec;
    use crate::error::{Error, FormatError, Result};
    use crate::store::MemoryStore;
    use crate::stream::{Platform, StreamExt};

    const ZLIB: u32 = 0x01;

    /// Build a zlib chunk holding `plain` with the given block size, written at `at`
    fn written_chunk(plain: &[u8], block_size: u32, at: u64) -> Result<(MemoryStore, Chunk)> {
        let standard = StandardCodec::new();
        let codec = BlockCodec::new(&standard, ZLIB);
        let mut scratch = MemoryStore::empty(Platform::Pc);

        let mut chunk = Chunk::empty(0, 0x200, block_size);
        chunk.add_space(&mut scratch, codec, plain.len() as u64)?;
        for (index, piece) in plain.chunks(block_size as usize).enumerate() {
            let offset = 0x200 + index as u64 * block_size as u64;
            chunk
                .block_mut(index)
                .ok_or(FormatError::BlockNotFound(offset))?
                .write(&mut scratch, codec, offset, piece)?;
        }

        let mut target = MemoryStore::new(vec![0; at as usize], Platform::Pc);
        target.seek_end()?;
        chunk.flush(&mut scratch, &mut target, codec)?;
        Ok((target, chunk))
    }

    fn pattern(length: usize) -> Vec<u8> {
        (0..length).map(|i| (i / 4) as u8).collect()
    }

    #[traced_test]
    #[test]
    fn add_space_fills_last_block_first() -> Result<()> {
        let standard = StandardCodec::new();
        let codec = BlockCodec::new(&standard, ZLIB);
        let mut scratch = MemoryStore::empty(Platform::Pc);

        let mut chunk = Chunk::empty(0, 0x100, 64);
        chunk.add_space(&mut scratch, codec, 40)?;
        chunk.add_space(&mut scratch, codec, 100)?;

        let sizes = chunk
            .blocks()
            .iter()
            .map(|b| (b.uncompressed_offset(), b.uncompressed_size()))
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![(0x100, 64), (0x140, 64), (0x180, 12)]);
        assert_eq!(chunk.uncompressed_size(), 140);
        assert_eq!(chunk.end(), 0x100 + 140);
        Ok(())
    }

    #[test]
    fn add_space_requires_block_size() {
        let standard = StandardCodec::new();
        let codec = BlockCodec::new(&standard, ZLIB);
        let mut scratch = MemoryStore::empty(Platform::Pc);

        let mut chunk = Chunk::empty(0, 0, 0);
        assert!(matches!(
            chunk.add_space(&mut scratch, codec, 1),
            Err(Error::Format(FormatError::ZeroBlockSize(_)))
        ));
    }

    #[traced_test]
    #[test]
    fn parse_written_chunk() -> Result<()> {
        let plain = pattern(150);
        let (mut store, written) = written_chunk(&plain, 64, 0x20)?;
        assert_eq!(written.compressed_offset(), 0x20);
        assert_eq!(
            written.compressed_size() as usize,
            store.get_ref().len() - 0x20
        );

        let mut chunk = Chunk::from(written.entry());
        chunk.parse(&mut store)?;
        assert_eq!(chunk.block_size(), 64);
        assert_eq!(chunk.blocks().len(), 3);

        // Offsets are fixed up past the header and the three size pairs
        let first = &chunk.blocks()[0];
        assert_eq!(first.compressed_offset(), 0x20 + 16 + 3 * 8);
        let second = &chunk.blocks()[1];
        assert_eq!(
            second.compressed_offset(),
            first.compressed_offset() + first.compressed_size() as u64
        );

        let standard = StandardCodec::new();
        let codec = BlockCodec::new(&standard, ZLIB);
        let index = chunk.locate(&mut store, 0x200 + 130)?;
        assert_eq!(index, 2);

        let mut buffer = [0; 20];
        chunk
            .block_mut(index)
            .ok_or(FormatError::BlockNotFound(0))?
            .read(&mut store, codec, 0x200 + 130, &mut buffer)?;
        assert_eq!(buffer.as_slice(), &plain[130..150]);
        Ok(())
    }

    #[test]
    fn parse_rejects_wrong_magic() -> Result<()> {
        let mut store = MemoryStore::new(vec![0; 32], Platform::Pc);
        let mut chunk = Chunk::from(ChunkEntry::default());
        assert!(matches!(
            chunk.parse(&mut store),
            Err(Error::Format(FormatError::InvalidChunkMagic { magic: 0, .. }))
        ));
        Ok(())
    }

    #[test]
    fn parse_rejects_short_block_table() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            0xC1, 0x83, 0x2A, 0x9E,
            0x00, 0x00, 0x02, 0x00,
            0x08, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
            // Consumes the whole compressed total but only 16 of 32 plain bytes
            0x08, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
        ];

        let mut store = MemoryStore::new(data, Platform::Pc);
        let mut chunk = Chunk::from(ChunkEntry::default());
        assert!(matches!(
            chunk.parse(&mut store),
            Err(Error::Format(FormatError::BlockTableLength {
                expected: 0x20,
                actual: 0x10,
                ..
            }))
        ));
        Ok(())
    }

    #[test]
    fn locate_outside_chunk() -> Result<()> {
        let (mut store, written) = written_chunk(&pattern(10), 64, 0)?;
        let mut chunk = Chunk::from(written.entry());
        assert!(matches!(
            chunk.locate(&mut store, 0x200 + 10),
            Err(Error::Format(FormatError::BlockNotFound(_)))
        ));
        Ok(())
    }

    #[test]
    fn parse_directory() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00,
            0x00, 0x03, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00,
        ];

        let mut store = MemoryStore::new(data, Platform::Pc);
        let table = ChunkTable::parse(&mut store)?;
        assert!(table.is_compressed());
        assert_eq!(table.len(), 2);
        assert_eq!(table.encoded_len(), 40);
        assert_eq!(table.data_len(), 0x310);
        assert_eq!(table.locate(0x2FF)?, 0);
        assert_eq!(table.locate(0x300)?, 1);
        assert!(table.locate(0xFF).is_err());
        assert!(table.locate(0x310).is_err());

        let empty = ChunkTable::new(0, 1, Vec::new());
        assert!(!empty.is_compressed());
        let uncompressed = ChunkTable::new(0, 0, table.chunks().to_vec());
        assert!(!uncompressed.is_compressed());
        Ok(())
    }

    #[test]
    fn big_endian_directory_entry() -> Result<()> {
        let mut store = MemoryStore::empty(Platform::Xbox);
        let endian = Platform::Xbox.endian();
        ChunkEntry {
            uncompressed_offset: 0x100,
            uncompressed_size: 0x20000,
            compressed_offset: 0x80,
            compressed_size: 0x400,
        }
        .write_options(&mut store, endian, ())?;

        assert_str_eq!(
            format!("{:02X?}", store.get_ref()),
            "[00, 00, 01, 00, 00, 02, 00, 00, 00, 00, 00, 80, 00, 00, 04, 00]"
        );
        Ok(())
    }

    #[traced_test]
    #[test]
    fn flush_table_rewrites_directory() -> Result<()> {
        let plain = pattern(100);
        let (mut source, written) = written_chunk(&plain, 64, 0x30)?;

        // Header copy: 8 junk bytes, then the directory at offset 8
        let mut header = MemoryStore::new(source.get_ref()[..0x30].to_vec(), Platform::Pc);
        header.set_position(8)?;
        header.write_u32(ZLIB)?;
        header.write_u32(1)?;
        written.entry().write_options(&mut header, Platform::Pc.endian(), ())?;
        source.set_position(0)?;
        source.write_data(&header.get_ref()[..0x30])?;

        source.set_position(8)?;
        let mut table = ChunkTable::parse(&mut source)?;

        let standard = StandardCodec::new();
        let codec = BlockCodec::new(&standard, ZLIB);
        let window = table.locate_block(&mut source, 0x200 + 70)?;
        table
            .block_mut(&window)
            .ok_or(FormatError::BlockNotFound(0))?
            .write(&mut source, codec, 0x200 + 70, &[0xFF; 4])?;

        let mut target = MemoryStore::new(source.get_ref()[..0x30].to_vec(), Platform::Pc);
        table.flush(&mut source, &mut target, codec)?;

        target.set_position(8)?;
        let mut reparsed = ChunkTable::parse(&mut target)?;
        assert_eq!(reparsed.chunks()[0].entry(), table.chunks()[0].entry());
        assert_eq!(reparsed.chunks()[0].compressed_offset(), 0x30);

        let window = reparsed.locate_block(&mut target, 0x200 + 70)?;
        let mut buffer = [0; 6];
        reparsed
            .block_mut(&window)
            .ok_or(FormatError::BlockNotFound(0))?
            .read(&mut target, codec, 0x200 + 69, &mut buffer)?;
        assert_eq!(buffer, [plain[69], 0xFF, 0xFF, 0xFF, 0xFF, plain[74]]);
        Ok(())
    }
}
