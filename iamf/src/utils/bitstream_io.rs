//! Bitstream I/O utilities for OBU payload parsing.
//!
//! Wraps [`bitstream_io`] readers for bounded, already-framed payloads. The
//! streaming read buffer ([`crate::utils::read_bit_buffer`]) handles framing;
//! once a whole OBU payload is buffered, these readers parse its fields.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader, SignedInteger, UnsignedInteger};

use crate::utils::read_bit_buffer::MAX_LEB128_BYTES;

/// Longest annotation string accepted, including the NUL terminator.
const MAX_STRING_BYTES: usize = 128;

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn get_s<S: SignedInteger>(&mut self, n: u32) -> io::Result<S> {
        match self.bs.read_signed_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_s({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    /// Reads an unsigned little-endian base-128 value of at most 5 bytes.
    #[inline(always)]
    pub fn get_uleb128(&mut self) -> io::Result<u32> {
        let mut value: u64 = 0;

        for i in 0..MAX_LEB128_BYTES {
            let byte: u64 = self.get_n(8)?;

            value |= (byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                if value > u32::MAX as u64 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "get_uleb128: value does not fit in 32 bits",
                    ));
                }
                return Ok(value as u32);
            }
        }

        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "get_uleb128: field exceeds 5 bytes",
        ))
    }

    pub fn get_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.bs.read_bytes(&mut buf)?;
        Ok(buf)
    }

    /// Reads a NUL-terminated UTF-8 string of at most 128 bytes.
    pub fn get_string(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();

        loop {
            let byte: u8 = self.get_n(8)?;
            if byte == 0 {
                break;
            }

            bytes.push(byte);
            if bytes.len() >= MAX_STRING_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "get_string: missing NUL terminator within 128 bytes",
                ));
            }
        }

        String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("get_string: {e}")))
    }

    #[inline(always)]
    pub fn seek(&mut self, offset: i64) -> io::Result<u64> {
        if (offset < 0 && self.position()? as i64 + offset >= 0)
            || (offset >= 0 && self.available()? as i64 >= offset)
        {
            return self.bs.seek_bits(SeekFrom::Current(offset));
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "seek({}): out of bounds bits at {}",
                offset,
                self.position()?
            ),
        ))
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n <= 64 {
            self.bs.skip(n)
        } else {
            self.available().and_then(|avail| {
                if n as u64 > avail {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "skip_n: out of bounds bits",
                    ))
                } else {
                    self.bs.skip(n)
                }
            })
        }
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}
