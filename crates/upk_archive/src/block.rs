//! The smallest independently compressed unit of a chunked archive.

use tracing::{debug, trace};

use crate::{
    compression::{Codec, CompressionMethod},
    error::{CodecError, Error, FormatError, Result},
    stream::{Stream, StreamExt},
};

/// The codec together with the compression flags of the chunk table a block belongs to.
#[derive(Copy, Clone)]
pub struct BlockCodec<'a> {
    codec: &'a dyn Codec,
    flags: u32,
}

impl<'a> BlockCodec<'a> {
    pub fn new(codec: &'a dyn Codec, flags: u32) -> Self {
        BlockCodec { codec, flags }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Decompress a stored block. Blocks whose stored size equals their logical size are raw.
    pub fn inflate(&self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        if compressed.len() == uncompressed_size {
            return Ok(compressed.to_vec());
        }

        let method = CompressionMethod::try_from(self.flags)?;
        let plain = self.codec.decompress(compressed, method, uncompressed_size)?;
        if plain.len() != uncompressed_size {
            return Err(CodecError::LengthMismatch {
                expected: uncompressed_size,
                actual: plain.len(),
            }
            .into());
        }

        Ok(plain)
    }

    /// Compress a block, falling back to the plain bytes when compression does not shrink them
    pub fn deflate(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let method = CompressionMethod::try_from(self.flags)?;
        let compressed = self.codec.compress(plain, method)?;

        if compressed.len() >= plain.len() {
            trace!(size = plain.len(), "storing block raw");
            return Ok(plain.to_vec());
        }

        Ok(compressed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockData {
    /// Nothing fetched from the source yet
    Unloaded,

    /// Compressed bytes held in memory
    Loaded(Vec<u8>),

    /// Plain bytes held in memory, with the compressed bytes they came from when those only
    /// live in memory
    Decompressed {
        plain: Vec<u8>,
        dirty: bool,
        packed: Option<Vec<u8>>,
    },
}

/// One compressed block, owned by a [`Chunk`](crate::chunk::Chunk).
///
/// Compressed bytes are fetched on first access and decompressed right away. The compressed
/// buffer is dropped unless the block was flushed, in which case it stays until the block is
/// modified.
#[derive(Debug, Clone)]
pub struct Block {
    compressed_offset: u64,
    compressed_size: u32,
    uncompressed_offset: u64,
    uncompressed_size: u32,
    data: BlockData,

    /// Whether the compressed bytes can still be fetched from the source at `compressed_offset`
    in_source: bool,
}

impl Block {
    pub fn new(
        compressed_offset: u64,
        compressed_size: u32,
        uncompressed_offset: u64,
        uncompressed_size: u32,
    ) -> Self {
        Block {
            compressed_offset,
            compressed_size,
            uncompressed_offset,
            uncompressed_size,
            data: BlockData::Unloaded,
            in_source: true,
        }
    }

    /// An empty block used to grow a chunk. It starts out decompressed and dirty.
    pub fn padding(uncompressed_offset: u64) -> Self {
        Block {
            compressed_offset: 0,
            compressed_size: 0,
            uncompressed_offset,
            uncompressed_size: 0,
            data: BlockData::Decompressed {
                plain: Vec::new(),
                dirty: true,
                packed: None,
            },
            in_source: false,
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

    /// First logical offset after this block
    pub fn end(&self) -> u64 {
        self.uncompressed_offset + self.uncompressed_size as u64
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.uncompressed_offset && offset < self.end()
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.data, BlockData::Unloaded)
    }

    pub fn is_decompressed(&self) -> bool {
        matches!(self.data, BlockData::Decompressed { .. })
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.data, BlockData::Decompressed { dirty: true, .. })
    }

    /// Copy `buffer.len()` bytes starting at the logical `offset` into `buffer`
    pub fn read<S: Stream>(
        &mut self,
        source: &mut S,
        codec: BlockCodec<'_>,
        offset: u64,
        buffer: &mut [u8],
    ) -> Result<()> {
        let start = self.check_bounds(offset, buffer.len() as u64)?;
        let plain = self.decompressed(source, codec, false)?;
        buffer.copy_from_slice(&plain[start..start + buffer.len()]);
        Ok(())
    }

    /// Overwrite bytes starting at the logical `offset`
    pub fn write<S: Stream>(
        &mut self,
        source: &mut S,
        codec: BlockCodec<'_>,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let start = self.check_bounds(offset, data.len() as u64)?;
        let plain = self.decompressed(source, codec, true)?;
        plain[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Append `length` zero bytes
    pub fn add_space<S: Stream>(
        &mut self,
        source: &mut S,
        codec: BlockCodec<'_>,
        length: u32,
    ) -> Result<()> {
        trace!(
            offset = self.uncompressed_offset,
            length,
            "add free space to block"
        );

        let size = self.uncompressed_size as usize + length as usize;
        self.decompressed(source, codec, true)?.resize(size, 0);
        self.uncompressed_size += length;
        Ok(())
    }

    /// Write the compressed form of this block at the current position of `target`.
    ///
    /// Untouched blocks are copied through unchanged. Afterwards the block holds the written
    /// bytes and records their offset and size in `target`.
    pub fn flush<S: Stream, W: Stream>(
        &mut self,
        source: &mut S,
        target: &mut W,
        codec: BlockCodec<'_>,
    ) -> Result<()> {
        let compressed = match &self.data {
            BlockData::Unloaded => self.fetch(source)?,
            BlockData::Loaded(bytes) => bytes.clone(),
            BlockData::Decompressed {
                dirty: false,
                packed: Some(bytes),
                ..
            } => bytes.clone(),
            BlockData::Decompressed { dirty: false, .. } if self.in_source => self.fetch(source)?,
            BlockData::Decompressed { plain, .. } => {
                debug!(offset = self.uncompressed_offset, "compress modified block");
                codec.deflate(plain)?
            }
        };

        self.compressed_offset = target.position()?;
        self.compressed_size = compressed.len() as u32;
        target.write_data(&compressed)?;

        self.data = BlockData::Loaded(compressed);
        self.in_source = false;
        Ok(())
    }

    fn check_bounds(&self, offset: u64, length: u64) -> Result<usize> {
        if !self.contains(offset) || offset + length > self.end() {
            return Err(FormatError::OutOfBounds {
                offset,
                length,
                start: self.uncompressed_offset,
                end: self.end(),
            }
            .into());
        }

        Ok((offset - self.uncompressed_offset) as usize)
    }

    fn fetch<S: Stream>(&self, source: &mut S) -> Result<Vec<u8>> {
        trace!(
            offset = self.compressed_offset,
            size = self.compressed_size,
            "load compressed block"
        );

        source.set_position(self.compressed_offset)?;
        Ok(source.read_data(self.compressed_size as usize)?)
    }

    /// Plain bytes of the block, marked as modified when `modify` is set
    fn decompressed<S: Stream>(
        &mut self,
        source: &mut S,
        codec: BlockCodec<'_>,
        modify: bool,
    ) -> Result<&mut Vec<u8>> {
        if let BlockData::Unloaded = self.data {
            self.data = BlockData::Loaded(self.fetch(source)?);
        }

        if let BlockData::Loaded(compressed) = &mut self.data {
            debug!(offset = self.uncompressed_offset, "decompress block");
            let plain = codec.inflate(compressed, self.uncompressed_size as usize)?;
            // Flushed bytes cannot be fetched from the source again
            let packed = (!self.in_source).then(|| std::mem::take(compressed));
            self.data = BlockData::Decompressed {
                plain,
                dirty: false,
                packed,
            };
        }

        match &mut self.data {
            BlockData::Decompressed {
                plain,
                dirty,
                packed,
            } => {
                if modify {
                    *dirty = true;
                    *packed = None;
                }
                Ok(plain)
            }
            _ => Err(Error::CustomError(format!(
                "block at {:#010X} failed to materialise",
                self.uncompressed_offset
            ))),
        }
    }
}
