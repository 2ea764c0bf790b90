//! Compression methods used by chunked archives and the codec collaborator that implements them.

use std::{
    fmt::{self, Display},
    io::{self, Cursor, Read, Write},
};

use byteorder::{ByteOrder, LittleEndian};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tracing::instrument;

use crate::{error::CodecError, header::PACKAGE_MAGIC};

/// Identifies how the blocks of a chunked archive are compressed.
///
/// Stored in the chunk directory as a raw flags dword; see [`CompressionMethod::try_from`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CompressionMethod {
    /// zlib deflate stream
    Zlib = 0x01,

    /// LZO1X, handled by an external [`LzoBackend`]
    Lzo = 0x02,

    /// Raw LZMA with the size field left out, used by the Mass Effect family
    Lzma = 0x08,
}

impl TryFrom<u32> for CompressionMethod {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(CompressionMethod::Zlib),
            0x02 => Ok(CompressionMethod::Lzo),
            0x08 => Ok(CompressionMethod::Lzma),
            _ => Err(CodecError::UnknownFlags(value)),
        }
    }
}

impl Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionMethod::Zlib => "zlib",
            CompressionMethod::Lzo => "lzo",
            CompressionMethod::Lzma => "lzma",
        })
    }
}

/// The compression collaborator used by blocks when they are loaded or flushed.
pub trait Codec {
    fn compress(&self, data: &[u8], method: CompressionMethod) -> Result<Vec<u8>, CodecError>;

    /// `uncompressed_size` comes from the block table; formats that do not store it rely on it.
    fn decompress(
        &self,
        data: &[u8],
        method: CompressionMethod,
        uncompressed_size: usize,
    ) -> Result<Vec<u8>, CodecError>;
}

/// An LZO implementation working on framed buffers.
///
/// Both directions exchange a buffer prefixed with six little endian dwords: package magic,
/// `0x20000`, compressed size, uncompressed size, compressed size, uncompressed size. See
/// [`lzo_frame`].
pub trait LzoBackend {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, framed: &[u8]) -> io::Result<Vec<u8>>;
}

/// Size of the header wrapped around LZO payloads
pub const LZO_FRAME_SIZE: usize = 6 * 4;

const LZO_FRAME_VERSION: u32 = 0x20000;

/// Wrap a raw LZO block in the header expected by [`LzoBackend::decompress`]
pub fn lzo_frame(compressed: &[u8], uncompressed_size: u32) -> Vec<u8> {
    let compressed_size = compressed.len() as u32;
    let mut framed = vec![0; LZO_FRAME_SIZE];
    LittleEndian::write_u32_into(
        &[
            PACKAGE_MAGIC,
            LZO_FRAME_VERSION,
            compressed_size,
            uncompressed_size,
            compressed_size,
            uncompressed_size,
        ],
        &mut framed,
    );
    framed.extend_from_slice(compressed);
    framed
}

/// Strip the header produced by [`LzoBackend::compress`]
pub fn lzo_unframe(framed: &[u8]) -> Result<&[u8], CodecError> {
    if framed.len() < LZO_FRAME_SIZE {
        return Err(CodecError::InvalidFrame(format!(
            "{} bytes is shorter than the frame header",
            framed.len()
        )));
    }

    let magic = LittleEndian::read_u32(&framed[..4]);
    if magic != PACKAGE_MAGIC {
        return Err(CodecError::InvalidFrame(format!("wrong magic {magic:#010X}")));
    }

    Ok(&framed[LZO_FRAME_SIZE..])
}

/// Default codec: zlib through `flate2`, LZMA through `lzma-rs`, LZO through an optional backend.
#[derive(Default)]
pub struct StandardCodec {
    lzo: Option<Box<dyn LzoBackend>>,
}

impl StandardCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `backend` for LZO compressed archives
    pub fn with_lzo(backend: impl LzoBackend + 'static) -> Self {
        StandardCodec {
            lzo: Some(Box::new(backend)),
        }
    }

    fn lzo(&self) -> Result<&dyn LzoBackend, CodecError> {
        self.lzo
            .as_deref()
            .ok_or(CodecError::Unsupported(CompressionMethod::Lzo))
    }
}

impl fmt::Debug for StandardCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardCodec")
            .field("lzo", &self.lzo.is_some())
            .finish()
    }
}

fn failed(method: CompressionMethod) -> impl FnOnce(io::Error) -> CodecError {
    move |e| CodecError::Failed {
        method,
        message: e.to_string(),
    }
}

impl Codec for StandardCodec {
    #[instrument(skip(self, data), fields(size = data.len()), err)]
    fn compress(&self, data: &[u8], method: CompressionMethod) -> Result<Vec<u8>, CodecError> {
        match method {
            CompressionMethod::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data).map_err(failed(method))?;
                encoder.finish().map_err(failed(method))
            }
            CompressionMethod::Lzo => {
                let framed = self.lzo()?.compress(data).map_err(failed(method))?;
                lzo_unframe(&framed).map(<[u8]>::to_vec)
            }
            CompressionMethod::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_compress_with_options(
                    &mut Cursor::new(data),
                    &mut out,
                    &lzma_rs::compress::Options {
                        unpacked_size: lzma_rs::compress::UnpackedSize::SkipWritingToHeader,
                    },
                )
                .map_err(failed(method))?;
                Ok(out)
            }
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()), err)]
    fn decompress(
        &self,
        data: &[u8],
        method: CompressionMethod,
        uncompressed_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        match method {
            CompressionMethod::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(failed(method))?;
                Ok(out)
            }
            CompressionMethod::Lzo => self
                .lzo()?
                .decompress(&lzo_frame(data, uncompressed_size as u32))
                .map_err(failed(method)),
            CompressionMethod::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_decompress_with_options(
                    &mut Cursor::new(data),
                    &mut out,
                    &lzma_rs::decompress::Options {
                        unpacked_size: lzma_rs::decompress::UnpackedSize::UseProvided(Some(
                            uncompressed_size as u64,
                        )),
                        ..Default::default()
                    },
                )
                .map_err(|e| CodecError::Failed {
                    method,
                    message: e.to_string(),
                })?;
                Ok(out)
            }
        }
    }
}
