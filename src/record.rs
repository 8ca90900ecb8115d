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

//! Generic record header parsing, plus the record kinds that aren't tied to
//! a particular item-file variant: comments, checkouts, branch/project back
//! references, and file deltas.

use crate::error::RecordError;
use crate::reader::RecordReader;

/// 8-byte header preceding every record: a little-endian length, a two-byte
/// signature, and a little-endian CRC-16 of the payload.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub length: u32,
    pub signature: [u8; 2],
    pub file_crc: u16,
    pub offset: usize,
}

impl RecordHeader {
    pub const SIZE: usize = 8;
    /// Comment records always store a CRC of zero and are exempt from
    /// validation.
    const CRC_EXEMPT_SIGNATURE: [u8; 2] = *b"MC";

    pub fn read(reader: &mut RecordReader) -> Result<Self, RecordError> {
        let offset = reader.offset();
        let length = reader.read_uint32(true)?;
        let sig_bytes = reader.read_bytes(2)?;
        let signature = [sig_bytes[0], sig_bytes[1]];
        let file_crc = reader.read_uint16(true)?;
        Ok(Self {
            length,
            signature,
            file_crc,
            offset,
        })
    }

    pub fn signature_str(&self) -> String {
        String::from_utf8_lossy(&self.signature).into_owned()
    }

    /// Checks the payload's CRC-16 against `self.file_crc`, skipping the
    /// check for comment records.
    pub fn check_crc(&self, reader: &RecordReader) -> Result<(), RecordError> {
        if self.signature == Self::CRC_EXEMPT_SIGNATURE {
            return Ok(());
        }
        let computed = reader.crc16(self.length as usize)?;
        if computed != self.file_crc {
            tracing::warn!(
                offset = self.offset,
                stored = self.file_crc,
                computed,
                "CRC mismatch reading record"
            );
            return Err(RecordError::RecordCrcMismatch {
                offset: self.offset,
                stored: self.file_crc,
                computed,
            });
        }
        Ok(())
    }

    pub fn check_signature(&self, expected: &[u8; 2]) -> Result<(), RecordError> {
        if &self.signature != expected {
            return Err(RecordError::RecordClassMismatch {
                offset: self.offset,
                actual: self.signature,
                expected: *expected,
            });
        }
        Ok(())
    }
}

/// A comment attached to a revision (`MC`). The CRC of this record is always
/// zero on disk.
#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub comment: String,
}

impl CommentRecord {
    pub const SIGNATURE: [u8; 2] = *b"MC";

    pub fn read(reader: &mut RecordReader, header: &RecordHeader, decode: &dyn Fn(&[u8]) -> String) -> Result<Self, RecordError> {
        let bytes = reader.read_bytes(header.length as usize)?;
        Ok(Self {
            comment: decode(bytes),
        })
    }
}

/// A checkout record (`CF`), retained for diagnostics only; VSS checkout
/// semantics are not enforced by this crate.
#[derive(Debug, Clone)]
pub struct CheckoutRecord {
    pub user: Vec<u8>,
    pub timestamp: u32,
    pub working_dir: Vec<u8>,
    pub machine: Vec<u8>,
    pub project: Vec<u8>,
    pub comment: Vec<u8>,
    pub revision: i16,
    pub flags: i16,
    pub prev_checkout_offset: i32,
    pub this_checkout_offset: i32,
}

impl CheckoutRecord {
    pub const SIGNATURE: [u8; 2] = *b"CF";

    pub fn read(reader: &mut RecordReader) -> Result<Self, RecordError> {
        Ok(Self {
            user: reader.read_byte_string(32)?,
            timestamp: reader.read_uint32(true)?,
            working_dir: reader.read_byte_string(260)?,
            machine: reader.read_byte_string(32)?,
            project: reader.read_byte_string(260)?,
            comment: reader.read_byte_string(64)?,
            revision: reader.read_int16(true)?,
            flags: reader.read_int16(true)?,
            prev_checkout_offset: reader.read_int32(true)?,
            this_checkout_offset: reader.read_int32(true)?,
        })
    }
}

/// A back-reference to a project that references this file (`PF`), forming
/// a reverse-linked chain analogous to the revision chain.
#[derive(Debug, Clone)]
pub struct ProjectRefRecord {
    pub prev_project_offset: i32,
    pub project_file: Vec<u8>,
}

impl ProjectRefRecord {
    pub const SIGNATURE: [u8; 2] = *b"PF";

    pub fn read(reader: &mut RecordReader) -> Result<Self, RecordError> {
        Ok(Self {
            prev_project_offset: reader.read_int32(true)?,
            project_file: reader.read_byte_string(12)?,
        })
    }
}

/// A back-reference to a branch of this file (`BF`).
#[derive(Debug, Clone)]
pub struct BranchRefRecord {
    pub prev_branch_offset: i32,
    pub branch_file: Vec<u8>,
}

impl BranchRefRecord {
    pub const SIGNATURE: [u8; 2] = *b"BF";

    pub fn read(reader: &mut RecordReader) -> Result<Self, RecordError> {
        Ok(Self {
            prev_branch_offset: reader.read_int32(true)?,
            branch_file: reader.read_byte_string(12)?,
        })
    }
}

/// One operation inside a delta (`FD`) record.
#[derive(Debug, Clone)]
pub enum DeltaOp {
    /// Append `data` verbatim.
    WriteLog(Vec<u8>),
    /// Copy `length` bytes from the base payload starting at `offset`.
    WriteSuccessor { offset: u32, length: u32 },
}

impl DeltaOp {
    fn apply(&self, base: &[u8]) -> Vec<u8> {
        match self {
            DeltaOp::WriteLog(data) => data.clone(),
            DeltaOp::WriteSuccessor { offset, length } => {
                let start = *offset as usize;
                let end = start.saturating_add(*length as usize).min(base.len());
                if start >= base.len() {
                    Vec::new()
                } else {
                    base[start..end].to_vec()
                }
            }
        }
    }
}

/// A file delta (`FD`): a sequence of operations that, applied to an older
/// payload, reconstruct the next-newer payload.
#[derive(Debug, Clone)]
pub struct DeltaRecord {
    pub ops: Vec<DeltaOp>,
}

impl DeltaRecord {
    pub const SIGNATURE: [u8; 2] = *b"FD";
    const CMD_WRITE_LOG: u16 = 0;
    const CMD_WRITE_SUCCESSOR: u16 = 1;
    const CMD_STOP: u16 = 2;

    pub fn read(reader: &mut RecordReader, header: &RecordHeader) -> Result<Self, RecordError> {
        let end = reader.offset() + header.length as usize;
        let mut ops = Vec::new();
        while reader.offset() < end {
            let command = reader.read_uint16(true)?;
            let _skip = reader.read_uint16(true)?;
            let offset = reader.read_uint32(true)?;
            let length = reader.read_uint32(true)?;
            match command {
                Self::CMD_STOP => break,
                Self::CMD_WRITE_LOG => {
                    let data = reader.read_bytes(length as usize)?.to_vec();
                    ops.push(DeltaOp::WriteLog(data));
                }
                Self::CMD_WRITE_SUCCESSOR => {
                    ops.push(DeltaOp::WriteSuccessor { offset, length });
                }
                _ => {
                    // Unknown delta opcode: treat as a no-op copy, matching
                    // the original's lenient behavior of only recognizing
                    // the three documented commands.
                }
            }
        }
        Ok(Self { ops })
    }

    /// Applies every operation in order against `base`, concatenating the
    /// results to produce the reconstructed payload.
    pub fn apply_delta(&self, base: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for op in &self.ops {
            out.extend(op.apply(base));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_replays_literal_and_copy_ops() {
        let delta = DeltaRecord {
            ops: vec![
                DeltaOp::WriteLog(b"hel".to_vec()),
                DeltaOp::WriteSuccessor { offset: 1, length: 2 },
                DeltaOp::WriteLog(b"!".to_vec()),
            ],
        };
        let base = b"world";
        assert_eq!(delta.apply_delta(base), b"helor!");
    }

    #[test]
    fn write_successor_past_base_end_is_empty() {
        let delta = DeltaRecord {
            ops: vec![DeltaOp::WriteSuccessor { offset: 100, length: 4 }],
        };
        assert_eq!(delta.apply_delta(b"abc"), Vec::<u8>::new());
    }
}
