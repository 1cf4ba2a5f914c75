// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::Error;

/// Bounds-checked big-endian reader over a borrowed byte slice.
///
/// Every read advances the cursor.  A read that would run past the end of the
/// slice fails with [`Error::Truncated`] naming the current section and the
/// offset of the failed read, and leaves the cursor where it was.
#[derive(Copy, Clone, Debug)]
pub struct ByteReader<'a> {
    slice: &'a [u8],
    offset: usize,
    section: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(slice: &'a [u8]) -> ByteReader<'a> {
        Self::at(slice, 0)
    }

    /// Creates a reader positioned at `offset`.
    pub fn at(slice: &'a [u8], offset: usize) -> ByteReader<'a> {
        ByteReader {
            slice,
            offset,
            section: "buffer",
        }
    }

    /// Labels subsequent reads for error reporting.
    pub fn section(&mut self, section: &'static str) -> &mut Self {
        self.section = section;
        self
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.slice.len().saturating_sub(self.offset)
    }

    /// Returns the next `len` bytes and advances past them.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.offset > self.slice.len() || len > self.remaining() {
            return Err(Error::Truncated {
                section: self.section,
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }

        let bytes = &self.slice[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.bytes(len).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut array = [0; N];
        array.copy_from_slice(self.bytes(N)?);
        Ok(array)
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16, Error> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_be_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads() {
        let data = [
            0xAA, 0x55, 0xCC, 0x33, 0xFF, 0xFE, 0x01, 0x3F, 0x80, 0x00, 0x00, 0x07,
        ];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.u32().unwrap(), 0xAA55CC33);
        assert_eq!(reader.i16().unwrap(), -2);
        assert_eq!(reader.u8().unwrap(), 1);
        assert_eq!(reader.f32().unwrap(), 1.0);
        assert_eq!(reader.offset(), 11);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.u8().unwrap(), 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated() {
        let data = [0x00, 0x01, 0x02];
        let mut reader = ByteReader::at(&data, 1);
        reader.section("detections");

        match reader.u32() {
            Err(Error::Truncated {
                section,
                offset,
                needed,
                available,
            }) => {
                assert_eq!(section, "detections");
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected result {:?}", other),
        }

        // A failed read does not move the cursor.
        assert_eq!(reader.offset(), 1);
        assert_eq!(reader.u16().unwrap(), 0x0102);
    }

    #[test]
    fn test_offset_past_end() {
        let data = [0x00; 4];
        let mut reader = ByteReader::at(&data, 10);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.skip(1).is_err());
        assert!(reader.skip(0).is_err());

        let mut reader = ByteReader::at(&data, 4);
        assert!(reader.skip(0).is_ok());
    }
}
