//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::compression::CompressionMethod;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is not a valid package archive
    #[error(transparent)]
    Format(#[from] FormatError),

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// compression codec failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

impl Error {
    /// Whether this error only reports a missing entry, which callers may skip over
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound(_))
    }
}

impl From<std::io::Error> for Error {
    /// Unwraps errors that were tunnelled through [`std::io::Read`] or [`std::io::Write`]
    fn from(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::IOError(err);
        }

        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => Error::CustomError(inner.to_string()),
            None => Error::CustomError("empty io error".to_owned()),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::IOError(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Structural problems with the archive. These always abort the current operation.
#[derive(Error, Diagnostic, Debug)]
pub enum FormatError {
    /// wrong magic in package header
    #[error("wrong magic in package header: {0:#010X}")]
    InvalidMagic(u32),

    /// the whole file is wrapped in one compressed stream
    #[error("fully compressed archives are not supported (version word {0:#010X})")]
    FullyCompressed(u32),

    /// unsupported family specific header layout
    #[error("unsupported header layout: {0}")]
    UnsupportedHeader(&'static str),

    /// wrong magic in chunk header
    #[error("wrong magic in chunk header at {offset:#010X}: {magic:#010X}")]
    InvalidChunkMagic { offset: u64, magic: u32 },

    /// block table of a chunk disagrees with its header
    #[error("block table of chunk at {offset:#010X} covers {actual} bytes, header declares {expected}")]
    BlockTableLength {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// a chunk that must grow declares a block size of zero
    #[error("chunk at {0:#010X} has a block size of zero")]
    ZeroBlockSize(u64),

    /// written blocks do not add up to the chunk's logical size
    #[error("written blocks hold {actual} uncompressed bytes, chunk tracks {expected}")]
    UncompressedSizeMismatch { expected: u64, actual: u64 },

    /// written blocks do not add up to the declared compressed size
    #[error("chunk wrote {actual} compressed bytes, header declares {expected}")]
    CompressedSizeMismatch { expected: u64, actual: u64 },

    /// access outside of a block
    #[error("range {offset:#010X}+{length} is out of bounds for block {start:#010X}..{end:#010X}")]
    OutOfBounds {
        offset: u64,
        length: u64,
        start: u64,
        end: u64,
    },

    /// no block covers the offset
    #[error("unable to find block for position {0:#010X}")]
    BlockNotFound(u64),

    /// no chunk covers the offset
    #[error("unable to find chunk for position {0:#010X}")]
    ChunkNotFound(u64),

    /// name table flags outside of the known set
    #[error("unexpected name table flags {flags:#018X} for name {name:?}")]
    UnknownNameFlags { name: String, flags: u64 },

    /// a table references a row that does not exist
    #[error("{table} table has no row {index}")]
    InvalidReference { table: &'static str, index: i64 },

    /// two export rows resolve to the same path
    #[error("index {0} already exists")]
    DuplicatePath(String),

    /// the parent chain of an export row never reaches the root
    #[error("package chain of export row {0} does not terminate")]
    PackageCycle(usize),

    /// the export row does not store a serial offset that could be rewritten
    #[error("export {0} has no serial offset field")]
    NoSerialOffset(String),

    /// archive offsets are stored as dwords
    #[error("offset {0:#X} does not fit in a dword")]
    OffsetOverflow(u64),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),
}

/// Failures reported by the compression collaborator
#[derive(Error, Diagnostic, Debug)]
pub enum CodecError {
    /// compression flags {0:#010X} are not known
    #[error("unknown compression flags: {0:#010X}")]
    UnknownFlags(u32),

    /// no implementation is available for the method
    #[error("{0} compression is not available")]
    Unsupported(CompressionMethod),

    /// the codec rejected its input
    #[error("{method} codec failed: {message}")]
    Failed {
        method: CompressionMethod,
        message: String,
    },

    /// the framed buffer handed back by an external codec is malformed
    #[error("invalid codec frame: {0}")]
    InvalidFrame(String),

    /// decompressed output does not match the block table
    #[error("incorrect uncompressed block length ({actual}:{expected})")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
