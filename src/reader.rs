// Copyright 2023 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded, offset-checked reader over a VSS record's byte buffer, plus the
//! CRC-16 the format uses to validate record payloads.

use std::sync::Arc;

use crate::error::RecordError;

const CRC32_POLY: u32 = 0xEDB8_8320;

fn crc32_table() -> &'static [u32; 256] {
    static TABLE: std::sync::OnceLock<[u32; 256]> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ CRC32_POLY
                } else {
                    crc >> 1
                };
            }
            *entry = crc;
        }
        table
    })
}

/// Computes the reflected CRC-32 (initial value 0, no final XOR) over `data`.
fn crc32(data: &[u8]) -> u32 {
    let table = crc32_table();
    let mut crc = 0u32;
    for &byte in data {
        crc = table[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    crc
}

/// Folds a CRC-32 into the 16-bit checksum VSS stores in record headers.
pub fn crc16(data: &[u8]) -> u16 {
    let crc = crc32(data);
    (crc ^ (crc >> 16)) as u16
}

/// A bounded view over a shared byte buffer, with a cursor and alignment
/// rules matching the VSS binary format.
#[derive(Clone)]
pub struct RecordReader {
    buf: Arc<[u8]>,
    slice_offset: usize,
    length: usize,
    offset: usize,
}

impl RecordReader {
    /// Wraps the full contents of a file.
    pub fn new(buf: Arc<[u8]>) -> Self {
        let length = buf.len();
        Self {
            buf,
            slice_offset: 0,
            length,
            offset: 0,
        }
    }

    /// Current read position, relative to the start of this view.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total number of bytes in this view.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the cursor has consumed the whole view.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes remaining after the cursor.
    pub fn remaining(&self) -> usize {
        self.length.saturating_sub(self.offset)
    }

    /// Skips forward by `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) -> Result<(), RecordError> {
        self.check_read(n, "skip")?;
        self.offset += n;
        Ok(())
    }

    /// Returns a new, independently positioned view into the same backing
    /// buffer, `additional_offset` bytes past this view's current cursor, for
    /// `length` bytes.
    pub fn clone_at(&self, additional_offset: usize, length: usize) -> Result<Self, RecordError> {
        let start = self
            .offset
            .checked_add(additional_offset)
            .ok_or(RecordError::EndOfBuffer {
                what: "clone_at",
                offset: self.offset,
            })?;
        if start + length > self.length {
            return Err(RecordError::EndOfBuffer {
                what: "clone_at",
                offset: self.slice_offset + start,
            });
        }
        Ok(Self {
            buf: self.buf.clone(),
            slice_offset: self.slice_offset + start,
            length,
            offset: 0,
        })
    }

    fn check_read(&self, n: usize, what: &'static str) -> Result<(), RecordError> {
        if self.offset + n > self.length {
            return Err(RecordError::EndOfBuffer {
                what,
                offset: self.slice_offset + self.offset,
            });
        }
        Ok(())
    }

    fn check_align(&self, width: usize, unaligned: bool) -> Result<(), RecordError> {
        if !unaligned && (self.slice_offset + self.offset) % width != 0 {
            return Err(RecordError::UnalignedRead {
                width,
                offset: self.slice_offset + self.offset,
            });
        }
        Ok(())
    }

    fn raw(&self, start: usize, n: usize) -> &[u8] {
        &self.buf[self.slice_offset + start..self.slice_offset + start + n]
    }

    /// Reads `n` raw bytes and advances the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], RecordError> {
        self.check_read(n, "read_bytes")?;
        let bytes = self.raw(self.offset, n);
        self.offset += n;
        Ok(bytes)
    }

    /// Peeks `n` raw bytes at `at` without moving the cursor.
    pub fn read_bytes_at(&self, at: usize, n: usize) -> Result<&[u8], RecordError> {
        if at + n > self.length {
            return Err(RecordError::EndOfBuffer {
                what: "read_bytes_at",
                offset: self.slice_offset + at,
            });
        }
        Ok(self.raw(at, n))
    }

    /// Reads a little-endian `i16`, requiring 2-byte alignment unless
    /// `unaligned` is set.
    pub fn read_int16(&mut self, unaligned: bool) -> Result<i16, RecordError> {
        Ok(self.read_uint16(unaligned)? as i16)
    }

    /// Reads a little-endian `u16`.
    pub fn read_uint16(&mut self, unaligned: bool) -> Result<u16, RecordError> {
        self.check_align(2, unaligned)?;
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a little-endian `i32`.
    pub fn read_int32(&mut self, unaligned: bool) -> Result<i32, RecordError> {
        Ok(self.read_uint32(unaligned)? as i32)
    }

    /// Reads a little-endian `u32`.
    pub fn read_uint32(&mut self, unaligned: bool) -> Result<u32, RecordError> {
        self.check_align(4, unaligned)?;
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Peeks a little-endian `u32` at `at` without moving the cursor.
    pub fn read_uint32_at(&self, at: usize) -> Result<u32, RecordError> {
        let bytes = self.read_bytes_at(at, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads `n` bytes and truncates at the first zero byte.
    pub fn read_byte_string(&mut self, n: usize) -> Result<Vec<u8>, RecordError> {
        let bytes = self.read_bytes(n)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].to_vec())
    }

    /// Reads `n` bytes as a zero-terminated byte string, without advancing
    /// the cursor.
    pub fn read_byte_string_at(&self, at: usize, n: usize) -> Result<Vec<u8>, RecordError> {
        let bytes = self.read_bytes_at(at, n)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].to_vec())
    }

    /// Computes the CRC-16 over the next `length` bytes at the current
    /// cursor, without advancing it.
    pub fn crc16(&self, length: usize) -> Result<u16, RecordError> {
        let bytes = self.read_bytes_at(self.offset, length)?;
        Ok(crc16(bytes))
    }

    /// Reads the fixed 40-byte VSS name structure: flags (u16), a 34-byte
    /// zero-padded short name, and a 32-bit name-file offset.
    pub fn read_name(&mut self) -> Result<RawName, RecordError> {
        let flags = self.read_uint16(true)?;
        let short_name = self.read_byte_string(34)?;
        let name_file_offset = self.read_uint32(true)?;
        Ok(RawName {
            flags,
            short_name,
            name_file_offset,
        })
    }
}

/// Decoded fixed-width VSS name structure (flags + short name + offset into
/// the shared name file for a long/project-form alias).
#[derive(Debug, Clone)]
pub struct RawName {
    pub flags: u16,
    pub short_name: Vec<u8>,
    pub name_file_offset: u32,
}

impl RawName {
    const PROJECT_FLAG: u16 = 1;

    /// Whether this name belongs to a project (directory) entry.
    pub fn is_project(&self) -> bool {
        self.flags & Self::PROJECT_FLAG != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_matches_known_vector() {
        // CRC-32/ISO-HDLC of "123456789" is 0xCBF43926.
        let crc = crc32(b"123456789");
        assert_eq!(crc, 0xCBF4_3926);
        assert_eq!(crc16(b"123456789"), (0xCBF4_3926u32 ^ (0xCBF4_3926u32 >> 16)) as u16);
    }

    #[test]
    fn reads_are_alignment_checked() {
        let buf: Arc<[u8]> = Arc::from(vec![1u8, 2, 3, 4, 5]);
        let mut reader = RecordReader::new(buf);
        reader.skip(1).unwrap();
        assert!(matches!(
            reader.read_uint16(false),
            Err(RecordError::UnalignedRead { .. })
        ));
        assert!(reader.read_uint16(true).is_ok());
    }

    #[test]
    fn read_past_end_fails() {
        let buf: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);
        let mut reader = RecordReader::new(buf);
        assert!(matches!(
            reader.read_bytes(10),
            Err(RecordError::EndOfBuffer { .. })
        ));
    }

    #[test]
    fn byte_string_truncates_at_nul() {
        let buf: Arc<[u8]> = Arc::from(vec![b'a', b'b', 0, b'c']);
        let mut reader = RecordReader::new(buf);
        assert_eq!(reader.read_byte_string(4).unwrap(), b"ab");
    }

    #[test]
    fn clone_at_is_independently_positioned() {
        let buf: Arc<[u8]> = Arc::from(vec![0u8, 1, 2, 3, 4, 5]);
        let mut reader = RecordReader::new(buf);
        reader.skip(2).unwrap();
        let mut sub = reader.clone_at(1, 3).unwrap();
        assert_eq!(sub.read_bytes(3).unwrap(), &[3, 4, 5]);
    }
}
