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

//! In-memory model of a single item file: the 52-byte file header, the
//! directory-header record, and (for files) the reverse-linked revision
//! chain reconstructed into forward order. Project item files additionally
//! carry the reconstructed child-order array.

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::ItemFileError;
use crate::reader::RawName;
use crate::reader::RecordReader;
use crate::record::BranchRefRecord;
use crate::record::RecordHeader;
use crate::revision_record::RawRevisionRecord;

/// Kind of item a file header declares itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFileKind {
    Project,
    File,
}

impl ItemFileKind {
    fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::Project),
            2 => Some(Self::File),
            _ => None,
        }
    }
}

const ITEM_FILE_SIGNATURE: &[u8] = b"SourceSafe@Microsoft\0";
const ITEM_FILE_VERSION: i16 = 6;

/// The fixed 52-byte header at the start of every item file.
#[derive(Debug, Clone, Copy)]
pub struct ItemFileHeader {
    pub file_type: ItemFileKind,
}

impl ItemFileHeader {
    pub(crate) fn read(reader: &mut RecordReader, path: &Path) -> Result<Self, ItemFileError> {
        let sig = reader.read_bytes(32)?;
        if &sig[..ITEM_FILE_SIGNATURE.len()] != ITEM_FILE_SIGNATURE {
            return Err(ItemFileError::BadHeader {
                path: path.to_path_buf(),
                reason: "bad item file signature".to_string(),
            });
        }
        let file_type = reader.read_int16(true)?;
        let file_version = reader.read_int16(true)?;
        reader.skip(16)?;
        if file_version != ITEM_FILE_VERSION {
            return Err(ItemFileError::BadHeader {
                path: path.to_path_buf(),
                reason: format!("unsupported item file version {file_version}"),
            });
        }
        let file_type = ItemFileKind::from_i16(file_type).ok_or_else(|| ItemFileError::BadHeader {
            path: path.to_path_buf(),
            reason: format!("unrecognized item type {file_type}"),
        })?;
        Ok(Self { file_type })
    }
}

/// Fields common to both `DH` variants.
#[derive(Debug, Clone)]
pub struct ItemHeaderCommon {
    pub item_type: i16,
    pub num_revisions: u16,
    pub name: RawName,
    pub first_revision: u16,
    pub data_ext: [u8; 2],
    pub first_revision_offset: i32,
    pub last_revision_offset: i32,
    pub eof_offset: i32,
    pub rights_offset: i32,
}

impl ItemHeaderCommon {
    pub(crate) fn read(reader: &mut RecordReader) -> Result<Self, ItemFileError> {
        let item_type = reader.read_int16(true)?;
        let num_revisions = reader.read_uint16(true)?;
        let name = reader.read_name()?;
        let first_revision = reader.read_uint16(true)?;
        let ext_bytes = reader.read_bytes(2)?;
        let data_ext = [ext_bytes[0], ext_bytes[1]];
        let first_revision_offset = reader.read_int32(true)?;
        let last_revision_offset = reader.read_int32(true)?;
        let eof_offset = reader.read_int32(true)?;
        let rights_offset = reader.read_int32(true)?;
        reader.skip(16)?;
        Ok(Self {
            item_type,
            num_revisions,
            name,
            first_revision,
            data_ext,
            first_revision_offset,
            last_revision_offset,
            eof_offset,
            rights_offset,
        })
    }
}

/// Flags on a file item header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeaderFlags(pub u16);

impl FileHeaderFlags {
    pub const LOCKED: u16 = 1;
    pub const BINARY: u16 = 2;
    pub const LATEST_ONLY: u16 = 4;
    pub const SHARED: u16 = 0x20;
    pub const CHECKED_OUT: u16 = 0x40;

    pub fn is_locked(self) -> bool {
        self.0 & Self::LOCKED != 0
    }
    pub fn is_binary(self) -> bool {
        self.0 & Self::BINARY != 0
    }
    pub fn is_latest_only(self) -> bool {
        self.0 & Self::LATEST_ONLY != 0
    }
    pub fn is_shared(self) -> bool {
        self.0 & Self::SHARED != 0
    }
    pub fn is_checked_out(self) -> bool {
        self.0 & Self::CHECKED_OUT != 0
    }
}

/// `DH` record for a File item.
#[derive(Debug, Clone)]
pub struct FileHeaderRecord {
    pub common: ItemHeaderCommon,
    pub flags: FileHeaderFlags,
    pub branch_file: Vec<u8>,
    pub branch_offset: i32,
    pub project_offset: i32,
    pub branch_count: u16,
    pub project_count: u16,
    pub first_checkout_offset: i32,
    pub last_checkout_offset: i32,
    pub data_crc: u32,
    pub last_rev_timestamp: u32,
    pub modification_timestamp: u32,
    pub creation_timestamp: u32,
}

impl FileHeaderRecord {
    pub const SIGNATURE: [u8; 2] = *b"DH";

    pub(crate) fn read(reader: &mut RecordReader) -> Result<Self, ItemFileError> {
        let common = ItemHeaderCommon::read(reader)?;
        let flags = FileHeaderFlags(reader.read_int16(true)? as u16);
        let branch_file = reader.read_byte_string(10)?;
        let branch_offset = reader.read_int32(true)?;
        let project_offset = reader.read_int32(true)?;
        let branch_count = reader.read_uint16(true)?;
        let project_count = reader.read_uint16(true)?;
        let first_checkout_offset = reader.read_int32(true)?;
        let last_checkout_offset = reader.read_int32(true)?;
        let data_crc = reader.read_uint32(true)?;
        reader.skip(8)?;
        let last_rev_timestamp = reader.read_uint32(true)?;
        let modification_timestamp = reader.read_uint32(true)?;
        let creation_timestamp = reader.read_uint32(true)?;
        Ok(Self {
            common,
            flags,
            branch_file,
            branch_offset,
            project_offset,
            branch_count,
            project_count,
            first_checkout_offset,
            last_checkout_offset,
            data_crc,
            last_rev_timestamp,
            modification_timestamp,
            creation_timestamp,
        })
    }
}

/// `DH` record for a Project item.
#[derive(Debug, Clone)]
pub struct ProjectHeaderRecord {
    pub common: ItemHeaderCommon,
    pub parent_project: Vec<u8>,
    pub parent_file: Vec<u8>,
    pub total_items: i16,
    pub subprojects: i16,
}

impl ProjectHeaderRecord {
    pub const SIGNATURE: [u8; 2] = *b"DH";

    pub(crate) fn read(reader: &mut RecordReader) -> Result<Self, ItemFileError> {
        let common = ItemHeaderCommon::read(reader)?;
        let parent_project = reader.read_byte_string(260)?;
        let parent_file = reader.read_byte_string(12)?;
        let total_items = reader.read_int16(true)?;
        let subprojects = reader.read_int16(true)?;
        Ok(Self {
            common,
            parent_project,
            parent_file,
            total_items,
            subprojects,
        })
    }
}

/// Flags on a project-entry (`JP`) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectEntryFlags(pub u16);

impl ProjectEntryFlags {
    pub const DELETED: u16 = 1;
    pub const BINARY: u16 = 2;
    pub const LATEST_ONLY: u16 = 4;
    pub const SHARED: u16 = 8;

    pub fn is_deleted(self) -> bool {
        self.0 & Self::DELETED != 0
    }
    pub fn is_binary(self) -> bool {
        self.0 & Self::BINARY != 0
    }
    pub fn is_latest_only(self) -> bool {
        self.0 & Self::LATEST_ONLY != 0
    }
    pub fn is_shared(self) -> bool {
        self.0 & Self::SHARED != 0
    }
}

/// One child entry as declared, in on-disk order, in a project's side data
/// file (`JP`).
#[derive(Debug, Clone)]
pub struct ProjectEntryRecord {
    pub item_type: i16,
    pub flags: ProjectEntryFlags,
    pub name: RawName,
    pub pinned_version: i16,
    pub physical_name: Vec<u8>,
}

impl ProjectEntryRecord {
    pub const SIGNATURE: [u8; 2] = *b"JP";

    pub fn read(reader: &mut RecordReader) -> Result<Self, ItemFileError> {
        let item_type = reader.read_int16(true)?;
        let flags = ProjectEntryFlags(reader.read_int16(true)? as u16);
        let name = reader.read_name()?;
        let pinned_version = reader.read_int16(true)?;
        let physical_name = reader.read_byte_string(10)?;
        Ok(Self {
            item_type,
            flags,
            name,
            pinned_version,
            physical_name,
        })
    }
}

/// One entry in a reconstructed child-order array: an index name (the
/// lowercased short name, used for ordering) paired with the physical name
/// it resolves to.
#[derive(Debug, Clone)]
pub struct ItemsArrayEntry {
    pub index_name: String,
    pub physical_name: String,
}

/// The reconstructed child order of a Project item file, built by
/// forward-replaying revisions over a bisection-ordered array.
///
/// New entries with a duplicate index name are inserted at the left of the
/// run of equal names, matching the on-disk bisection-insert behavior VSS
/// itself uses.
#[derive(Debug, Clone, Default)]
pub struct ItemsArray {
    entries: Vec<ItemsArrayEntry>,
}

impl ItemsArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ItemsArrayEntry> {
        self.entries.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemsArrayEntry> {
        self.entries.iter()
    }

    /// Returns the index of the leftmost entry whose index name is `>=
    /// index_name`.
    fn lower_bound(&self, index_name: &str) -> usize {
        self.entries.partition_point(|e| e.index_name.as_str() < index_name)
    }

    /// Returns the leftmost entry matching `index_name`, ignoring physical
    /// name. Used where only one entry is expected to match (branch/rename)
    /// and the old physical name isn't carried by the revision record.
    pub fn find_by_index_name(&self, index_name: &str) -> Option<usize> {
        let i = self.lower_bound(index_name);
        if i < self.entries.len() && self.entries[i].index_name == index_name {
            Some(i)
        } else {
            None
        }
    }

    /// Searches for `physical_name` among entries sharing `index_name`,
    /// starting at the leftmost match.
    pub fn find_item_index(&self, index_name: &str, physical_name: &str) -> Option<usize> {
        let mut i = self.lower_bound(index_name);
        while i < self.entries.len() && self.entries[i].index_name == index_name {
            if self.entries[i].physical_name == physical_name {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Inserts a new entry at the left of any existing run sharing
    /// `index_name`, returning the index it landed at.
    pub fn add_item(&mut self, index_name: impl Into<String>, physical_name: impl Into<String>) -> usize {
        let index_name = index_name.into();
        let idx = self.lower_bound(&index_name);
        self.entries.insert(
            idx,
            ItemsArrayEntry {
                index_name,
                physical_name: physical_name.into(),
            },
        );
        idx
    }

    pub fn insert_item(&mut self, idx: usize, index_name: impl Into<String>, physical_name: impl Into<String>) {
        let idx = idx.min(self.entries.len());
        self.entries.insert(
            idx,
            ItemsArrayEntry {
                index_name: index_name.into(),
                physical_name: physical_name.into(),
            },
        );
    }

    pub fn remove_item(&mut self, index_name: &str, physical_name: &str) -> Option<ItemsArrayEntry> {
        let idx = self.find_item_index(index_name, physical_name)?;
        Some(self.entries.remove(idx))
    }

    pub fn remove_item_by_idx(&mut self, idx: usize) -> Option<ItemsArrayEntry> {
        if idx < self.entries.len() {
            Some(self.entries.remove(idx))
        } else {
            None
        }
    }
}

/// A whole item file's bytes, with helpers to fetch a single typed record at
/// a given offset, re-validating its CRC and signature each time. Revisions,
/// comments, deltas and branch/project back-references are all reached this
/// way, rather than pre-parsed, since the reverse-linked chains jump around
/// the file in an order that isn't known until walked.
pub struct RawItemFile {
    reader: RecordReader,
}

impl RawItemFile {
    pub fn new(buf: Arc<[u8]>) -> Self {
        Self {
            reader: RecordReader::new(buf),
        }
    }

    fn header_at(&self, offset: usize) -> Result<(RecordHeader, RecordReader), ItemFileError> {
        let mut sub = self.reader.clone_at(offset, self.reader.len() - offset)?;
        let header = RecordHeader::read(&mut sub)?;
        header.check_crc(&sub)?;
        Ok((header, sub))
    }

    /// Reads one `EL` revision record at `offset`.
    pub fn read_revision_at(&self, offset: usize) -> Result<RawRevisionRecord, ItemFileError> {
        let (header, mut sub) = self.header_at(offset)?;
        header.check_signature(&RawRevisionRecord::SIGNATURE)?;
        RawRevisionRecord::read(&mut sub, &header)
    }

    /// Reads the `BF` back-reference at `offset`, used to chase the branch
    /// chain of a file.
    pub fn read_branch_ref_at(&self, offset: usize) -> Result<BranchRefRecord, ItemFileError> {
        let (header, mut sub) = self.header_at(offset)?;
        header.check_signature(&BranchRefRecord::SIGNATURE)?;
        Ok(BranchRefRecord::read(&mut sub)?)
    }

    /// Reads the `MC` comment text at `offset`, decoding it with `decode`.
    pub fn read_comment_at(
        &self,
        offset: usize,
        decode: &dyn Fn(&[u8]) -> String,
    ) -> Result<String, ItemFileError> {
        let (header, mut sub) = self.header_at(offset)?;
        header.check_signature(&crate::record::CommentRecord::SIGNATURE)?;
        Ok(crate::record::CommentRecord::read(&mut sub, &header, decode)?.comment)
    }

    /// Reads the `FD` delta record at `offset`.
    pub fn read_delta_at(&self, offset: usize) -> Result<crate::record::DeltaRecord, ItemFileError> {
        let (header, mut sub) = self.header_at(offset)?;
        header.check_signature(&crate::record::DeltaRecord::SIGNATURE)?;
        Ok(crate::record::DeltaRecord::read(&mut sub, &header)?)
    }

    /// Reads the `JP` project-entry record at `offset`.
    pub fn read_project_entry_at(&self, offset: usize) -> Result<ProjectEntryRecord, ItemFileError> {
        let (header, mut sub) = self.header_at(offset)?;
        header.check_signature(&ProjectEntryRecord::SIGNATURE)?;
        ProjectEntryRecord::read(&mut sub)
    }

    /// Parses the 52-byte file header plus the directory-header (`DH`)
    /// record for a File item, returning the header and the reader
    /// positioned right after it.
    pub fn read_file_header(&self, path: &Path) -> Result<(ItemFileHeader, FileHeaderRecord), ItemFileError> {
        let mut reader = self.reader.clone_at(0, self.reader.len())?;
        let file_header = ItemFileHeader::read(&mut reader, path)?;
        let (dh_header, mut sub) = self.header_at(reader.offset())?;
        dh_header.check_signature(&FileHeaderRecord::SIGNATURE)?;
        let record = FileHeaderRecord::read(&mut sub)?;
        Ok((file_header, record))
    }

    /// Parses the 52-byte file header plus the directory-header (`DH`)
    /// record for a Project item.
    pub fn read_project_header(&self, path: &Path) -> Result<(ItemFileHeader, ProjectHeaderRecord), ItemFileError> {
        let mut reader = self.reader.clone_at(0, self.reader.len())?;
        let file_header = ItemFileHeader::read(&mut reader, path)?;
        let (dh_header, mut sub) = self.header_at(reader.offset())?;
        dh_header.check_signature(&ProjectHeaderRecord::SIGNATURE)?;
        let record = ProjectHeaderRecord::read(&mut sub)?;
        Ok((file_header, record))
    }
}

/// Lowercases a short name the way VSS does for ordering comparisons: plain
/// ASCII case folding, since VSS physical/index names are ASCII.
pub fn index_name_of(short_name: &[u8]) -> String {
    String::from_utf8_lossy(short_name).to_ascii_lowercase()
}

/// A fully materialized File item: its header plus the forward-ordered
/// revision list reconstructed from the reverse-linked on-disk chain. Built
/// by [`crate::database::Database::open_file_item`].
#[derive(Debug, Clone)]
pub struct FileItemFile {
    pub physical_name: String,
    pub header: FileHeaderRecord,
    pub first_revision: u16,
    pub revisions: Vec<crate::revision::Revision>,
    pub branch_parent: Option<Rc<FileItemFile>>,
}

impl FileItemFile {
    /// Resolves a revision number to its data, descending into the branch
    /// parent chain if the number predates this file's own history.
    pub fn get_revision(&self, version: u16) -> Option<&crate::revision::Revision> {
        if version >= self.first_revision {
            self.revisions.iter().find(|r| r.revision_num == version)
        } else {
            self.branch_parent.as_ref().and_then(|p| p.get_revision(version))
        }
    }

    pub fn last_revision_num(&self) -> u16 {
        self.revisions.last().map(|r| r.revision_num).unwrap_or(0)
    }

    /// The reconstructed file content as of `version`, descending into the
    /// branch parent chain when the revision predates this file's own
    /// history.
    pub fn get_revision_data(&self, version: u16) -> Option<Vec<u8>> {
        if version >= self.first_revision {
            self.revisions
                .iter()
                .find(|r| r.revision_num == version)
                .and_then(|r| r.revision_data.clone())
        } else {
            self.branch_parent.as_ref().and_then(|p| p.get_revision_data(version))
        }
    }
}

/// A fully materialized Project item: its header, revision list, and the
/// reconstructed child-order array.
#[derive(Debug, Clone)]
pub struct ProjectItemFile {
    pub physical_name: String,
    pub header: ProjectHeaderRecord,
    pub revisions: Vec<crate::revision::Revision>,
    pub items_array: ItemsArray,
}

impl ProjectItemFile {
    pub fn get_revision(&self, version: u16) -> Option<&crate::revision::Revision> {
        self.revisions.iter().find(|r| r.revision_num == version)
    }

    pub fn last_revision_num(&self) -> u16 {
        self.revisions.last().map(|r| r.revision_num).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_array_inserts_duplicates_at_left_of_run() {
        let mut arr = ItemsArray::new();
        arr.add_item("a.txt", "AAAAAAAA");
        arr.add_item("b.txt", "BBBBBBBB");
        let idx = arr.add_item("a.txt", "CCCCCCCC");
        assert_eq!(idx, 0);
        assert_eq!(arr.get(0).unwrap().physical_name, "CCCCCCCC");
        assert_eq!(arr.get(1).unwrap().physical_name, "AAAAAAAA");
    }

    #[test]
    fn find_item_index_matches_by_physical_name_among_duplicates() {
        let mut arr = ItemsArray::new();
        arr.add_item("a.txt", "AAAAAAAA");
        arr.add_item("a.txt", "BBBBBBBB");
        assert_eq!(arr.find_item_index("a.txt", "BBBBBBBB"), Some(0));
        assert_eq!(arr.find_item_index("a.txt", "AAAAAAAA"), Some(1));
        assert_eq!(arr.find_item_index("a.txt", "ZZZZZZZZ"), None);
    }

    #[test]
    fn index_name_lowercases_ascii() {
        assert_eq!(index_name_of(b"Foo.TXT"), "foo.txt");
    }
}
