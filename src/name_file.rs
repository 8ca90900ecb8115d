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

//! `names.dat`: resolves a short name's on-disk offset to its long-form or
//! project-form spelling.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ItemFileError;
use crate::reader::RecordReader;
use crate::record::RecordHeader;

/// Kind of alias stored in a name record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum NameKind {
    Dos = 1,
    Long = 2,
    MacOs = 3,
    Project = 10,
}

impl NameKind {
    fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::Dos),
            2 => Some(Self::Long),
            3 => Some(Self::MacOs),
            10 => Some(Self::Project),
            _ => None,
        }
    }
}

/// One `SN` record: a small inline string pool, addressed by per-kind
/// offsets within the same record payload.
#[derive(Debug, Clone)]
pub struct NameRecord {
    variants: HashMap<NameKind, Vec<u8>>,
}

impl NameRecord {
    pub const SIGNATURE: [u8; 2] = *b"SN";

    fn read(reader: &mut RecordReader) -> Result<Self, ItemFileError> {
        let count = reader.read_int16(true)?;
        reader.skip(2)?;
        let pool_skip = count.max(0) as usize * 4;
        let pool_len = reader.remaining().saturating_sub(pool_skip);
        let pool = reader.clone_at(pool_skip, pool_len)?;
        let mut entries = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            let kind = reader.read_int16(true)?;
            let offset = reader.read_int16(true)?;
            entries.push((kind, offset));
        }
        let mut variants = HashMap::new();
        for (kind, offset) in entries {
            if let Some(kind) = NameKind::from_i16(kind) {
                let name = pool.read_byte_string_at(offset.max(0) as usize, pool.remaining())?;
                variants.insert(kind, name);
            }
        }
        Ok(Self { variants })
    }

    /// Returns the alias of the given kind, or `default` if not present.
    pub fn get<'a>(&'a self, kind: NameKind, default: &'a [u8]) -> &'a [u8] {
        self.variants.get(&kind).map(Vec::as_slice).unwrap_or(default)
    }
}

/// The whole `names.dat` side-file: a header record followed by a sequence of
/// `SN` entries, indexed by their on-disk offset for O(1) lookup.
pub struct NameFile {
    records: HashMap<usize, NameRecord>,
}

impl NameFile {
    pub const HEADER_SIGNATURE: [u8; 2] = *b"HN";

    /// Parses a whole `names.dat` buffer.
    pub fn parse(buf: Arc<[u8]>) -> Result<Self, ItemFileError> {
        let mut reader = RecordReader::new(buf);
        let header = RecordHeader::read(&mut reader)?;
        header.check_crc(&reader)?;
        header.check_signature(&Self::HEADER_SIGNATURE)?;
        // 4 filler u32s then an i32 eof_offset.
        reader.skip(16)?;
        let eof_offset = reader.read_int32(true)?;

        let mut records = HashMap::new();
        while reader.offset() < eof_offset.max(0) as usize && reader.remaining() >= RecordHeader::SIZE {
            let offset = reader.offset();
            let record_header = RecordHeader::read(&mut reader)?;
            record_header.check_crc(&reader)?;
            if record_header.signature == NameRecord::SIGNATURE {
                let mut sub = reader.clone_at(0, record_header.length as usize)?;
                records.insert(offset, NameRecord::read(&mut sub)?);
            }
            reader.skip(record_header.length as usize)?;
        }
        Ok(Self { records })
    }

    /// Looks up the name record at `offset` (a nonzero `name_file_offset`
    /// from a [`crate::reader::RawName`]).
    pub fn get_name_record(&self, offset: u32) -> Option<&NameRecord> {
        self.records.get(&(offset as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_kind_round_trips_known_codes() {
        assert_eq!(NameKind::from_i16(1), Some(NameKind::Dos));
        assert_eq!(NameKind::from_i16(2), Some(NameKind::Long));
        assert_eq!(NameKind::from_i16(10), Some(NameKind::Project));
        assert_eq!(NameKind::from_i16(99), None);
    }
}
