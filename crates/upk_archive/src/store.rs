//! Backing stores: a file on disk and a growable memory buffer.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{instrument, trace};

use crate::stream::{OpenMode, Platform, Stream};

/// A file backed stream.
///
/// The file handle only exists between [`Stream::open`] and [`Stream::close`] so that many archives
/// can be processed in sequence without exhausting OS handles. Reading or writing while closed
/// fails with [`io::ErrorKind::NotConnected`].
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    platform: Platform,
    file: Option<File>,
}

impl FileStore {
    /// Wrap an existing file. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>, platform: Platform) -> Self {
        FileStore {
            path: path.into(),
            platform,
            file: None,
        }
    }

    /// Create (or truncate) a file and wrap it
    pub fn create(path: impl Into<PathBuf>, platform: Platform) -> io::Result<Self> {
        let path = path.into();
        File::create(&path)?;
        Ok(Self::new(path, platform))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is not open", self.path.display()),
            )
        })
    }
}

impl Stream for FileStore {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn data_len(&mut self) -> io::Result<u64> {
        match &self.file {
            Some(file) => file.metadata().map(|m| m.len()),
            None => std::fs::metadata(&self.path).map(|m| m.len()),
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()), err)]
    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        let file = match mode {
            OpenMode::Read => File::open(&self.path)?,
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(&self.path)?,
        };
        trace!("opened");
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }
}

impl Read for FileStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for FileStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Seek for FileStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

/// A growable in-memory stream.
///
/// Seeking or writing past the end extends the buffer with zero bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Vec<u8>,
    position: u64,
    platform: Platform,
}

impl MemoryStore {
    pub fn new(data: Vec<u8>, platform: Platform) -> Self {
        MemoryStore {
            data,
            position: 0,
            platform,
        }
    }

    pub fn empty(platform: Platform) -> Self {
        Self::new(Vec::new(), platform)
    }

    pub fn get_ref(&self) -> &Vec<u8> {
        &self.data
    }

    /// Replace the content and rewind
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.position = 0;
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn grow_to(&mut self, length: u64) {
        if length > self.data.len() as u64 {
            self.data.resize(length as usize, 0);
        }
    }
}

impl Stream for MemoryStore {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn data_len(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

impl Read for MemoryStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl Write for MemoryStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = self.position as usize;
        self.grow_to((start + buf.len()) as u64);
        self.data[start..start + buf.len()].copy_from_slice(buf);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        self.grow_to(target);
        self.position = target;
        Ok(target)
    }
}
