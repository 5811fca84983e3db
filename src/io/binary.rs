//! Little-endian primitive and composite I/O, generic over any
//! [`std::io::Read`]/[`std::io::Write`] so the same code serialises to
//! a plain file, a gzip stream (the plan-file cache, see
//! [`crate::plan::file`]), or an in-memory `Cursor<Vec<u8>>` in tests.
//!
//! Every failure — short read, open failure, underlying I/O error —
//! becomes [`crate::error::ConvolutionError::Io`] at this boundary; no
//! partial value is ever returned from a read.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustfft::num_complex::Complex64;
use std::io::{Read, Write};

use crate::error::Result;

/// Reads a closed set of little-endian primitives from any `Read`.
pub struct BinaryReader<R: Read> {
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.inner.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.inner.read_i64::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.inner.read_f64::<LittleEndian>()?)
    }

    pub fn read_complex64(&mut self) -> Result<Complex64> {
        let re = self.read_f64()?;
        let im = self.read_f64()?;
        Ok(Complex64::new(re, im))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Reads a fixed-width magic byte sequence and compares it exactly.
    pub fn read_magic(&mut self, expected: &[u8]) -> Result<bool> {
        let mut buf = vec![0u8; expected.len()];
        self.inner.read_exact(&mut buf)?;
        Ok(buf == expected)
    }

    pub fn read_vec_f64(&mut self) -> Result<Vec<f64>> {
        let len = self.read_u32()? as usize;
        (0..len).map(|_| self.read_f64()).collect()
    }

    pub fn read_vec_complex64(&mut self) -> Result<Vec<Complex64>> {
        let len = self.read_u32()? as usize;
        (0..len).map(|_| self.read_complex64()).collect()
    }
}

/// Writes a closed set of little-endian primitives to any `Write`.
pub struct BinaryWriter<W: Write> {
    inner: W,
}

impl<W: Write> BinaryWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.inner.write_u8(u8::from(value))?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.inner.write_u8(value)?;
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.inner.write_i16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.inner.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.inner.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.inner.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.inner.write_i64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.inner.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.inner.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.inner.write_f64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_complex64(&mut self, value: Complex64) -> Result<()> {
        self.write_f64(value.re)?;
        self.write_f64(value.im)?;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        self.write_u32(bytes.len() as u32)?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_magic(&mut self, magic: &[u8]) -> Result<()> {
        self.inner.write_all(magic)?;
        Ok(())
    }

    pub fn write_vec_f64(&mut self, values: &[f64]) -> Result<()> {
        self.write_u32(values.len() as u32)?;
        for &v in values {
            self.write_f64(v)?;
        }
        Ok(())
    }

    pub fn write_vec_complex64(&mut self, values: &[Complex64]) -> Result<()> {
        self.write_u32(values.len() as u32)?;
        for &v in values {
            self.write_complex64(v)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn primitives_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_bool(true).unwrap();
            w.write_u32(0xDEAD_BEEF).unwrap();
            w.write_i64(-12345).unwrap();
            w.write_f64(std::f64::consts::PI).unwrap();
            w.write_complex64(Complex64::new(1.5, -2.5)).unwrap();
            w.write_string("fft plan").unwrap();
        }

        let mut r = BinaryReader::new(Cursor::new(buf));
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_i64().unwrap(), -12345);
        assert_eq!(r.read_f64().unwrap(), std::f64::consts::PI);
        assert_eq!(r.read_complex64().unwrap(), Complex64::new(1.5, -2.5));
        assert_eq!(r.read_string().unwrap(), "fft plan");
    }

    #[test]
    fn short_read_is_io_failure() {
        let buf = vec![0u8; 2];
        let mut r = BinaryReader::new(Cursor::new(buf));
        match r.read_u64() {
            Err(crate::error::ConvolutionError::Io(_)) => {}
            other => panic!("expected Io failure, got {other:?}"),
        }
    }
}
