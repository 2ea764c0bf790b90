//! Byte order aware primitives shared by every stream in the crate.
//!
//! Every stream carries a [`Platform`] tag fixed at construction. Multi-byte values are read and
//! written in the byte order of that platform, with two quirks inherited from the format:
//!
//! - 64-bit values are stored as two dwords, low dword first, each in the stream's byte order. On
//!   big endian platforms this means the natural big endian 64-bit value has its dwords swapped.
//! - Length prefixed strings use a signed count. A negative count `-n` announces `n` UTF-16 code
//!   units (`2 * n` bytes).

use std::{
    fmt::{self, Display},
    io::{self, Read, Seek, SeekFrom, Write},
    str::FromStr,
};

use binrw::Endian;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use widestring::U16String;

use crate::error::Error;

/// Platform profile an archive was cooked for. Decides the byte order of every stream.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Platform {
    /// Windows, little endian
    #[default]
    Pc,
    /// PlayStation 3, big endian
    Ps3,
    /// Xbox 360, big endian
    Xbox,
    /// PlayStation Vita, little endian
    PsVita,
}

impl Platform {
    /// Byte order used by streams of this platform
    pub const fn endian(self) -> Endian {
        match self {
            Platform::Pc | Platform::PsVita => Endian::Little,
            Platform::Ps3 | Platform::Xbox => Endian::Big,
        }
    }

    pub const fn is_big_endian(self) -> bool {
        matches!(self.endian(), Endian::Big)
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Pc => "PC",
            Platform::Ps3 => "PS3",
            Platform::Xbox => "XBOX",
            Platform::PsVita => "PSVITA",
        })
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PC" => Ok(Platform::Pc),
            "PS3" => Ok(Platform::Ps3),
            "XBOX" => Ok(Platform::Xbox),
            "PSVITA" => Ok(Platform::PsVita),
            _ => Err(Error::CustomError(format!("unknown platform {s}"))),
        }
    }
}

/// How a backing store should be opened
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
}

/// A seekable byte stream with a fixed byte order.
///
/// Implemented by the file and memory backed stores as well as by the virtual store that hides
/// block compression. Stores that hold OS resources only acquire them between [`Stream::open`]
/// and [`Stream::close`].
pub trait Stream: Read + Write + Seek {
    /// Platform profile, and therefore byte order, of this stream
    fn platform(&self) -> Platform;

    /// Total number of addressable bytes
    fn data_len(&mut self) -> io::Result<u64>;

    /// Acquire the underlying resource
    fn open(&mut self, _mode: OpenMode) -> io::Result<()> {
        Ok(())
    }

    /// Release the underlying resource
    fn close(&mut self) {}
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn platform(&self) -> Platform {
        (**self).platform()
    }

    fn data_len(&mut self) -> io::Result<u64> {
        (**self).data_len()
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        (**self).open(mode)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Typed reads and writes on top of any [`Stream`]
pub trait StreamExt: Stream {
    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn set_position(&mut self, position: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(position)).map(|_| ())
    }

    /// Move to the end of the stream and return the new position
    fn seek_end(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }

    /// Read exactly `length` bytes. A short stream is an error.
    fn read_data(&mut self, length: usize) -> io::Result<Vec<u8>> {
        // Lengths come from the archive, so the buffer only grows with the bytes actually read
        let mut buffer = Vec::new();
        Read::take(&mut *self, length as u64).read_to_end(&mut buffer)?;
        if buffer.len() != length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {length} bytes, stream holds {}", buffer.len()),
            ));
        }
        Ok(buffer)
    }

    /// Read everything between the current position and the end of the stream
    fn read_rest(&mut self) -> io::Result<Vec<u8>> {
        let length = self.data_len()?;
        let position = self.position()?;
        self.read_data(length.saturating_sub(position) as usize)
    }

    fn write_data(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buffer = [0; 1];
        self.read_exact(&mut buffer)?;
        Ok(buffer[0])
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buffer = [0; 2];
        self.read_exact(&mut buffer)?;
        Ok(match self.platform().endian() {
            Endian::Little => LittleEndian::read_u16(&buffer),
            Endian::Big => BigEndian::read_u16(&buffer),
        })
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer)?;
        Ok(match self.platform().endian() {
            Endian::Little => LittleEndian::read_u32(&buffer),
            Endian::Big => BigEndian::read_u32(&buffer),
        })
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    /// Read a 64-bit value stored as two dwords, low dword first
    fn read_u64(&mut self) -> io::Result<u64> {
        let value = read_u64_raw(self)?;
        Ok(if self.platform().is_big_endian() {
            swap_dwords(value)
        } else {
            value
        })
    }

    /// Read a 64-bit value with its dwords swapped regardless of byte order
    fn read_u64_swapped(&mut self) -> io::Result<u64> {
        read_u64_raw(self).map(swap_dwords)
    }

    /// Read a 32-bit float. Big endian streams hold the four bytes reversed.
    fn read_f32(&mut self) -> io::Result<f32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer)?;
        Ok(match self.platform().endian() {
            Endian::Little => LittleEndian::read_f32(&buffer),
            Endian::Big => BigEndian::read_f32(&buffer),
        })
    }

    /// Read the raw bytes of a length prefixed string
    fn read_string_raw(&mut self) -> io::Result<Vec<u8>> {
        let count = self.read_i32()?;
        let length = if count < 0 {
            2 * count.unsigned_abs() as usize
        } else {
            count as usize
        };
        self.read_data(length)
    }

    /// Read a length prefixed string, decoding UTF-16 when the count is negative
    fn read_string(&mut self) -> io::Result<String> {
        let count = self.read_i32()?;
        if count >= 0 {
            let raw = self.read_data(count as usize)?;
            return Ok(String::from_utf8_lossy(&raw)
                .trim_end_matches('\0')
                .to_owned());
        }

        let raw = self.read_data(2 * count.unsigned_abs() as usize)?;
        let big = self.platform().is_big_endian();
        let units = raw
            .chunks_exact(2)
            .map(|unit| {
                if big {
                    BigEndian::read_u16(unit)
                } else {
                    LittleEndian::read_u16(unit)
                }
            })
            .collect::<Vec<_>>();

        Ok(U16String::from_vec(units)
            .to_string_lossy()
            .trim_end_matches('\0')
            .to_owned())
    }

    /// Read bytes up to a zero terminator, which is consumed but not returned
    fn read_cstring(&mut self) -> io::Result<String> {
        let mut raw = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                c => raw.push(c),
            }
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write_all(&[value])
    }

    fn write_u16(&mut self, value: u16) -> io::Result<()> {
        let bytes = pack_u16(value, self.platform());
        self.write_all(&bytes)
    }

    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        let bytes = pack_u32(value, self.platform());
        self.write_all(&bytes)
    }

    fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.write_u32(value as u32)
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        let bytes = pack_u64(value, self.platform());
        self.write_all(&bytes)
    }

    fn write_f32(&mut self, value: f32) -> io::Result<()> {
        let bytes = pack_f32(value, self.platform());
        self.write_all(&bytes)
    }

    /// Write a length prefixed string. UTF-16 strings are announced with a negative count.
    fn write_string(&mut self, value: &str, utf16: bool) -> io::Result<()> {
        if !utf16 {
            self.write_i32(value.len() as i32)?;
            return self.write_all(value.as_bytes());
        }

        let units = value.encode_utf16().collect::<Vec<_>>();
        self.write_i32(-(units.len() as i32))?;
        for unit in units {
            self.write_u16(unit)?;
        }
        Ok(())
    }

    /// Write a string followed by a zero terminator unless it already ends with one
    fn write_cstring(&mut self, value: &str) -> io::Result<()> {
        self.write_all(value.as_bytes())?;
        if !value.ends_with('\0') {
            self.write_all(&[0])?;
        }
        Ok(())
    }
}

impl<S: Stream + ?Sized> StreamExt for S {}

fn read_u64_raw<S: Stream + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let mut buffer = [0; 8];
    stream.read_exact(&mut buffer)?;
    Ok(match stream.platform().endian() {
        Endian::Little => LittleEndian::read_u64(&buffer),
        Endian::Big => BigEndian::read_u64(&buffer),
    })
}

const fn swap_dwords(value: u64) -> u64 {
    value.rotate_left(32)
}

/// Byte image of a word for the given platform
pub fn pack_u16(value: u16, platform: Platform) -> [u8; 2] {
    match platform.endian() {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

/// Byte image of a dword for the given platform
pub fn pack_u32(value: u32, platform: Platform) -> [u8; 4] {
    match platform.endian() {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

/// Byte image of a 64-bit value: low dword then high dword
pub fn pack_u64(value: u64, platform: Platform) -> [u8; 8] {
    let mut bytes = [0; 8];
    bytes[..4].copy_from_slice(&pack_u32(value as u32, platform));
    bytes[4..].copy_from_slice(&pack_u32((value >> 32) as u32, platform));
    bytes
}

/// Byte image of a float for the given platform
pub fn pack_f32(value: f32, platform: Platform) -> [u8; 4] {
    match platform.endian() {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::Result;
    use crate::store::MemoryStore;
    use crate::stream::{pack_u64, Platform, StreamExt};

    #[test]
    fn read_dwords_in_stream_byte_order() -> Result<()> {
        let data = vec![0x01, 0x02, 0x03, 0x04];

        let mut le = MemoryStore::new(data.clone(), Platform::Pc);
        assert_eq!(le.read_u32()?, 0x04030201);

        let mut be = MemoryStore::new(data, Platform::Xbox);
        assert_eq!(be.read_u32()?, 0x01020304);

        Ok(())
    }

    #[test]
    fn read_signed_dword() -> Result<()> {
        let mut store = MemoryStore::new(vec![0xFE, 0xFF, 0xFF, 0xFF], Platform::Pc);
        assert_eq!(store.read_i32()?, -2);
        Ok(())
    }

    #[test]
    fn read_u64_swaps_dwords_on_big_endian() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x02,
        ];

        let mut be = MemoryStore::new(data.clone(), Platform::Ps3);
        assert_eq!(be.read_u64()?, 0x0000_0002_0000_0001);

        let mut le = MemoryStore::new(data, Platform::Pc);
        assert_eq!(le.read_u64()?, 0x0200_0000_0100_0000);

        Ok(())
    }

    #[test]
    fn forced_swap_reads_name_flags() -> Result<()> {
        // Flags 0x0007_0010 as stored by a PC build
        let data = vec![0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x07, 0x00];

        let mut le = MemoryStore::new(data, Platform::Pc);
        assert_eq!(le.read_u64_swapped()?, 0x0007_0010);

        let mut be = MemoryStore::new(vec![0x00, 0x07, 0x00, 0x10, 0, 0, 0, 0], Platform::Ps3);
        assert_eq!(be.read_u64_swapped()?, 0x0007_0010);

        Ok(())
    }

    #[test]
    fn write_u64_matches_pack() -> Result<()> {
        for platform in [Platform::Pc, Platform::Xbox] {
            let mut store = MemoryStore::empty(platform);
            store.write_u64(0x1122_3344_5566_7788)?;
            assert_eq!(store.get_ref(), &pack_u64(0x1122_3344_5566_7788, platform));

            store.set_position(0)?;
            assert_eq!(store.read_u64()?, 0x1122_3344_5566_7788);
        }
        Ok(())
    }

    #[test]
    fn read_big_endian_float() -> Result<()> {
        let mut store = MemoryStore::new(vec![0x3F, 0x80, 0x00, 0x00], Platform::Ps3);
        assert_eq!(store.read_f32()?, 1.0);
        Ok(())
    }

    #[test]
    fn read_narrow_and_wide_strings() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            0x04, 0x00, 0x00, 0x00, b'F', b'o', b'o', 0x00,
            0xFD, 0xFF, 0xFF, 0xFF, b'B', 0x00, b'a', 0x00, 0x00, 0x00,
        ];

        let mut store = MemoryStore::new(data, Platform::Pc);
        assert_eq!(store.read_string()?, "Foo");
        assert_eq!(store.read_string()?, "Ba");
        assert_eq!(store.position()?, 18);

        Ok(())
    }

    #[test]
    fn write_wide_string_uses_negative_count() -> Result<()> {
        let mut store = MemoryStore::empty(Platform::Pc);
        store.write_string("Hi", true)?;
        assert_eq!(
            store.get_ref(),
            &vec![0xFE, 0xFF, 0xFF, 0xFF, b'H', 0x00, b'i', 0x00]
        );
        Ok(())
    }

    #[test]
    fn cstring_round_trip() -> Result<()> {
        let mut store = MemoryStore::empty(Platform::Pc);
        store.write_cstring("abc")?;
        store.write_cstring("def\0")?;
        assert_eq!(store.get_ref().len(), 8);

        store.set_position(0)?;
        assert_eq!(store.read_cstring()?, "abc");
        assert_eq!(store.read_cstring()?, "def");
        Ok(())
    }

    #[test]
    fn lengths_beyond_the_stream_are_errors() -> Result<()> {
        let mut store = MemoryStore::new(vec![0xFF, 0xFF, 0xFF, 0x7F, b'a', b'b'], Platform::Pc);
        let err = store.read_string().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        store.set_position(4)?;
        assert!(store.read_data(u32::MAX as usize).is_err());

        store.set_position(4)?;
        assert_eq!(store.read_data(2)?, b"ab");
        Ok(())
    }
}
