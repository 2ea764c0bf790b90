//! A flat, seekable view of a chunked archive.
//!
//! Reads and writes are split across block boundaries and serviced block by block. The block
//! that served the last access stays cached as the current window. Writing at the logical end
//! grows the last chunk so the address space behaves like an extendable file.

use std::{
    fmt::{self, Debug},
    io::{self, Read, Seek, SeekFrom, Write},
};

use tracing::{instrument, trace};

use crate::{
    block::BlockCodec,
    chunk::{BlockWindow, ChunkTable},
    compression::Codec,
    error::{FormatError, Result},
    store::FileStore,
    stream::{OpenMode, Platform, Stream},
};

/// The virtual archive reader. Generic over the raw store holding the compressed bytes.
pub struct VirtualStore<S = FileStore> {
    raw: S,
    table: ChunkTable,
    codec: Box<dyn Codec>,
    position: u64,
    len: u64,
    window: Option<BlockWindow>,
}

impl<S: Debug> Debug for VirtualStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualStore")
            .field("raw", &self.raw)
            .field("chunks", &self.table.len())
            .field("position", &self.position)
            .field("len", &self.len)
            .finish()
    }
}

impl<S: Stream> VirtualStore<S> {
    pub fn new(raw: S, table: ChunkTable, codec: Box<dyn Codec>) -> Self {
        let len = table.data_len();
        VirtualStore {
            raw,
            table,
            codec,
            position: 0,
            len,
            window: None,
        }
    }

    pub fn table(&self) -> &ChunkTable {
        &self.table
    }

    /// The store holding the compressed bytes
    pub fn raw(&mut self) -> &mut S {
        &mut self.raw
    }

    pub fn into_inner(self) -> S {
        self.raw
    }

    /// Fill `buffer` from the current position. Every byte must exist.
    pub fn read_logical(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buffer.len() {
            let window = self.window_at(self.position)?;
            let count = ((window.end - self.position) as usize).min(buffer.len() - done);

            let codec = BlockCodec::new(self.codec.as_ref(), self.table.flags());
            self.table
                .block_mut(&window)
                .ok_or(FormatError::BlockNotFound(self.position))?
                .read(
                    &mut self.raw,
                    codec,
                    self.position,
                    &mut buffer[done..done + count],
                )?;

            self.position += count as u64;
            done += count;
        }

        Ok(())
    }

    /// Write `data` at the current position, growing the address space when needed
    pub fn write_logical(&mut self, data: &[u8]) -> Result<()> {
        if self.position + data.len() as u64 > self.len {
            // Gap bytes past the current end read back as zeros
            let growth = self.position + data.len() as u64 - self.len;
            self.grow(growth)?;
        }

        let mut done = 0;
        while done < data.len() {
            let window = self.window_at(self.position)?;
            let count = ((window.end - self.position) as usize).min(data.len() - done);

            let codec = BlockCodec::new(self.codec.as_ref(), self.table.flags());
            self.table
                .block_mut(&window)
                .ok_or(FormatError::BlockNotFound(self.position))?
                .write(
                    &mut self.raw,
                    codec,
                    self.position,
                    &data[done..done + count],
                )?;

            self.position += count as u64;
            done += count;
        }

        Ok(())
    }

    fn grow(&mut self, length: u64) -> Result<()> {
        trace!(length, end = self.len, "grow virtual store");

        let codec = BlockCodec::new(self.codec.as_ref(), self.table.flags());
        self.table.add_space(&mut self.raw, codec, length)?;
        self.len = self.table.data_len();

        // The cached window may have been the last block, which just grew
        self.window = None;
        Ok(())
    }

    fn window_at(&mut self, offset: u64) -> Result<BlockWindow> {
        match self.window {
            Some(window) if window.contains(offset) => Ok(window),
            _ => {
                let window = self.table.locate_block(&mut self.raw, offset)?;
                trace!(
                    chunk = window.chunk,
                    block = window.block,
                    start = window.start,
                    end = window.end,
                    "select block"
                );
                self.window = Some(window);
                Ok(window)
            }
        }
    }

    /// Recompress every chunk into `target` and rewrite the chunk directory there.
    ///
    /// `target` must already hold a copy of the package header up to the first chunk.
    #[instrument(skip_all, err)]
    pub fn flush_into<W: Stream>(&mut self, target: &mut W) -> Result<()> {
        let codec = BlockCodec::new(self.codec.as_ref(), self.table.flags());
        self.table.flush(&mut self.raw, target, codec)?;
        self.window = None;
        Ok(())
    }
}

impl<S: Stream> Stream for VirtualStore<S> {
    fn platform(&self) -> Platform {
        self.raw.platform()
    }

    fn data_len(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }

    /// Changes stay in memory until flushed into another stream, so the raw store is only ever
    /// read
    fn open(&mut self, _mode: OpenMode) -> io::Result<()> {
        self.raw.open(OpenMode::Read)
    }

    fn close(&mut self) {
        self.raw.close()
    }
}

impl<S: Stream> Read for VirtualStore<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.len.saturating_sub(self.position);
        let count = (buf.len() as u64).min(available) as usize;
        self.read_logical(&mut buf[..count])?;
        Ok(count)
    }
}

impl<S: Stream> Write for VirtualStore<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_logical(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.raw.flush()
    }
}

impl<S: Stream> Seek for VirtualStore<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        self.position = target;
        Ok(target)
    }
}
