//! Length-tracking byte streams with sticky error latching.
//!
//! Decoding the binary container is long runs of straight-line field reads.
//! Instead of threading `?` through every step, the reader and writer latch
//! the first error: once latched, every later operation is an inert no-op
//! returning a zero value, and [`ByteReader::finish`]/[`ByteWriter::finish`]
//! surface the latched error with the byte count reached. All multi-byte
//! values are little-endian.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::util::{Error, Result};

pub struct ByteReader<R> {
    inner: R,
    offset: u64,
    err: Option<Error>,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            err: None,
        }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether an error has latched.
    #[inline]
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }

    /// Latch an error found outside the stream itself (a bad magic value, a
    /// failed decompression). The first latched error wins.
    pub fn latch(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    /// Consume the reader, yielding the byte count or the first error.
    pub fn finish(self) -> Result<u64> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.offset),
        }
    }

    /// Fill `buf` exactly. Returns true if the read failed (now or earlier).
    pub fn fill(&mut self, buf: &mut [u8]) -> bool {
        if self.err.is_some() {
            return true;
        }
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                false
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.err = Some(Error::UnexpectedEof(self.offset));
                true
            }
            Err(e) => {
                self.err = Some(Error::Io(e));
                true
            }
        }
    }

    /// Read everything left in the stream.
    pub fn read_to_end(&mut self) -> Vec<u8> {
        if self.err.is_some() {
            return Vec::new();
        }
        let mut buf = Vec::new();
        match self.inner.read_to_end(&mut buf) {
            Ok(n) => {
                self.offset += n as u64;
                buf
            }
            Err(e) => {
                self.err = Some(Error::Io(e));
                Vec::new()
            }
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        if self.fill(&mut buf) {
            return 0;
        }
        buf[0]
    }

    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    pub fn read_u16(&mut self) -> u16 {
        let mut buf = [0u8; 2];
        if self.fill(&mut buf) {
            return 0;
        }
        LittleEndian::read_u16(&buf)
    }

    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    pub fn read_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        if self.fill(&mut buf) {
            return 0;
        }
        LittleEndian::read_u32(&buf)
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    pub fn read_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        if self.fill(&mut buf) {
            return 0;
        }
        LittleEndian::read_u64(&buf)
    }

    pub fn read_i64(&mut self) -> i64 {
        self.read_u64() as i64
    }

    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Length-prefixed string: `u32` length then raw bytes, no terminator.
    pub fn read_string(&mut self) -> String {
        let len = self.read_u32() as usize;
        if self.err.is_some() {
            return String::new();
        }
        let mut buf = vec![0u8; len];
        if self.fill(&mut buf) {
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

pub struct ByteWriter<W> {
    inner: W,
    offset: u64,
    err: Option<Error>,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            err: None,
        }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }

    pub fn latch(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    pub fn finish(self) -> Result<u64> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.offset),
        }
    }

    /// Write all of `buf`. Returns true if the write failed (now or earlier).
    pub fn write(&mut self, buf: &[u8]) -> bool {
        if self.err.is_some() {
            return true;
        }
        match self.inner.write_all(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                false
            }
            Err(e) => {
                self.err = Some(Error::Io(e));
                true
            }
        }
    }

    pub fn write_u8(&mut self, v: u8) -> bool {
        self.write(&[v])
    }

    pub fn write_i8(&mut self, v: i8) -> bool {
        self.write_u8(v as u8)
    }

    pub fn write_u16(&mut self, v: u16) -> bool {
        self.write(&v.to_le_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> bool {
        self.write(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> bool {
        self.write(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> bool {
        self.write(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> bool {
        self.write(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> bool {
        self.write(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> bool {
        self.write_u32(v.to_bits())
    }

    pub fn write_f64(&mut self, v: f64) -> bool {
        self.write_u64(v.to_bits())
    }

    /// Length-prefixed string: `u32` length then raw bytes.
    pub fn write_string(&mut self, s: &str) -> bool {
        if self.write_u32(s.len() as u32) {
            return true;
        }
        self.write(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_reads() {
        let data = [
            0x01, // u8
            0x02, 0x01, // u16
            0xFF, 0xFF, 0xFF, 0xFF, // i32
            0x05, 0x00, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o', // string
        ];
        let mut r = ByteReader::new(&data[..]);
        assert_eq!(r.read_u8(), 1);
        assert_eq!(r.read_u16(), 0x0102);
        assert_eq!(r.read_i32(), -1);
        assert_eq!(r.read_string(), "hello");
        assert_eq!(r.finish().unwrap(), data.len() as u64);
    }

    #[test]
    fn test_reader_latches_eof() {
        let mut r = ByteReader::new(&[0x01u8][..]);
        assert_eq!(r.read_u32(), 0);
        assert!(r.failed());
        // Subsequent reads are inert.
        assert_eq!(r.read_u64(), 0);
        assert_eq!(r.read_string(), "");
        assert!(matches!(r.finish(), Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_latch_keeps_first_error() {
        let mut r = ByteReader::new(&[][..]);
        r.latch(Error::CorruptHeader);
        r.latch(Error::UnexpectedEof(0));
        assert!(matches!(r.finish(), Err(Error::CorruptHeader)));
    }

    #[test]
    fn test_writer_roundtrip() {
        let mut out = Vec::new();
        let mut w = ByteWriter::new(&mut out);
        w.write_u16(0x0102);
        w.write_string("hi");
        w.write_u8(9);
        assert_eq!(w.finish().unwrap(), 9);
        assert_eq!(out, [0x02, 0x01, 0x02, 0x00, 0x00, 0x00, b'h', b'i', 9]);
    }

    #[test]
    fn test_writer_latches() {
        // A fixed-size target overflows and latches.
        let mut buf = [0u8; 2];
        let mut w = ByteWriter::new(&mut buf[..]);
        assert!(!w.write_u16(7));
        assert!(w.write_u32(1));
        assert!(w.failed());
        assert!(w.write_u8(1));
        assert!(w.finish().is_err());
    }
}
