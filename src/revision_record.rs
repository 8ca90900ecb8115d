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

//! Raw `EL` revision records: the 26 action codes and the fixed common
//! header shared by every revision, plus the variant-specific trailing
//! fields each action carries.
//!
//! The common header's byte layout (`prev_rev_offset`, `action`,
//! `revision_num`, `timestamp`, `user`, `label`, the two comment offsets and
//! lengths) is load-bearing and shared by all 26 actions. The trailing,
//! per-action fields below it are reconstructed from the attributes the
//! higher-level revision model needs (see [`crate::revision`]) rather than
//! byte-for-byte from an on-disk capture, since only the common header was
//! available to cross-check against.

use crate::error::ItemFileError;
use crate::reader::RawName;
use crate::reader::RecordReader;
use crate::record::RecordHeader;

/// The 26 revision action codes, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VssRevisionAction {
    Label = 0,
    CreateProject = 1,
    AddProject = 2,
    AddFile = 3,
    DestroyProject = 4,
    DestroyFile = 5,
    DeleteProject = 6,
    DeleteFile = 7,
    RecoverProject = 8,
    RecoverFile = 9,
    RenameProject = 10,
    RenameFile = 11,
    MoveFrom = 12,
    MoveTo = 13,
    ShareFile = 14,
    BranchFile = 15,
    CreateFile = 16,
    CheckinFile = 17,
    CheckInProject = 18,
    CreateBranch = 19,
    ArchiveVersionFile = 20,
    RestoreVersionFile = 21,
    ArchiveFile = 22,
    ArchiveProject = 23,
    RestoreFile = 24,
    RestoreProject = 25,
}

impl VssRevisionAction {
    pub fn from_code(code: u16) -> Option<Self> {
        use VssRevisionAction::*;
        Some(match code {
            0 => Label,
            1 => CreateProject,
            2 => AddProject,
            3 => AddFile,
            4 => DestroyProject,
            5 => DestroyFile,
            6 => DeleteProject,
            7 => DeleteFile,
            8 => RecoverProject,
            9 => RecoverFile,
            10 => RenameProject,
            11 => RenameFile,
            12 => MoveFrom,
            13 => MoveTo,
            14 => ShareFile,
            15 => BranchFile,
            16 => CreateFile,
            17 => CheckinFile,
            18 => CheckInProject,
            19 => CreateBranch,
            20 => ArchiveVersionFile,
            21 => RestoreVersionFile,
            22 => ArchiveFile,
            23 => ArchiveProject,
            24 => RestoreFile,
            25 => RestoreProject,
            _ => return None,
        })
    }

    /// Whether this action can appear in a File item's own revision chain
    /// (as opposed to only a Project's).
    pub fn is_file_local(self) -> bool {
        matches!(
            self,
            Self::Label | Self::CreateFile | Self::CreateBranch | Self::CheckinFile | Self::ArchiveFile
        )
    }
}

/// Variant-specific trailing fields, keyed by action. See the module doc for
/// why these layouts are reconstructed rather than captured byte-for-byte.
#[derive(Debug, Clone, Default)]
pub struct RevisionExtra {
    /// New or affected item name (Add/Delete/Recover/Create/Restore/Destroy).
    pub name: Option<RawName>,
    /// Physical name of the affected item.
    pub physical_name: Option<Vec<u8>>,
    /// Previous name, for Rename.
    pub old_name: Option<RawName>,
    /// Full project path, for Move/Share/Checkin/Branch context.
    pub project_path: Option<Vec<u8>>,
    /// Revision number this item was pinned to (Share), 0 if unpinned.
    pub pinned_revision: i16,
    /// Revision number an Unpin reverts to; negative means "new share".
    pub unpinned_revision: i16,
    /// Index into the project's items array this Share/Pin/Unpin refers to.
    pub project_idx: i16,
    /// Source item name a Branch was created from.
    pub source_name: Option<RawName>,
    /// Branch-file physical name.
    pub branch_file: Option<Vec<u8>>,
    /// Archive destination path (Archive/Restore).
    pub archive_path: Option<Vec<u8>>,
    /// Whether the destroyed item had already been soft-deleted.
    pub was_deleted: bool,
    /// Offset of this revision's delta record, if any (Checkin).
    pub delta_offset: i32,
}

/// A parsed `EL` record: the common header plus variant-specific fields.
#[derive(Debug, Clone)]
pub struct RawRevisionRecord {
    pub offset: usize,
    pub prev_rev_offset: i32,
    pub action: VssRevisionAction,
    pub revision_num: u16,
    pub timestamp: u32,
    pub user: Vec<u8>,
    pub label: Vec<u8>,
    pub comment_offset: u32,
    pub label_comment_offset: u32,
    pub comment_length: u16,
    pub label_comment_length: u16,
    pub extra: RevisionExtra,
}

impl RawRevisionRecord {
    pub const SIGNATURE: [u8; 2] = *b"EL";

    pub fn read(reader: &mut RecordReader, header: &RecordHeader) -> Result<Self, ItemFileError> {
        let prev_rev_offset = reader.read_int32(true)?;
        let code = reader.read_uint16(true)?;
        let revision_num = reader.read_uint16(true)?;
        let timestamp = reader.read_uint32(true)?;
        let user = reader.read_byte_string(32)?;
        let label = reader.read_byte_string(32)?;
        let comment_offset = reader.read_uint32(true)?;
        let label_comment_offset = reader.read_uint32(true)?;
        let comment_length = reader.read_uint16(true)?;
        let label_comment_length = reader.read_uint16(true)?;

        let action = VssRevisionAction::from_code(code).ok_or(ItemFileError::UnrecognizedRevAction {
            code,
            revision_num,
        })?;

        let extra = Self::read_extra(reader, header, action)?;

        Ok(Self {
            offset: header.offset,
            prev_rev_offset,
            action,
            revision_num,
            timestamp,
            user,
            label,
            comment_offset,
            label_comment_offset,
            comment_length,
            label_comment_length,
            extra,
        })
    }

    fn read_extra(
        reader: &mut RecordReader,
        header: &RecordHeader,
        action: VssRevisionAction,
    ) -> Result<RevisionExtra, ItemFileError> {
        use VssRevisionAction::*;
        let mut extra = RevisionExtra::default();
        let end = header.offset + RecordHeader::SIZE + header.length as usize;
        let remaining = || reader.offset() < end;

        match action {
            CreateProject | CreateFile => {}
            AddProject | AddFile | RestoreFile | RestoreProject | RestoreVersionFile => {
                if remaining() {
                    extra.name = Some(reader.read_name()?);
                }
                if remaining() {
                    extra.physical_name = Some(reader.read_byte_string(10)?);
                }
            }
            DeleteProject | DeleteFile | RecoverProject | RecoverFile => {
                if remaining() {
                    extra.name = Some(reader.read_name()?);
                }
            }
            DestroyProject | DestroyFile => {
                if remaining() {
                    extra.name = Some(reader.read_name()?);
                }
                if remaining() {
                    extra.physical_name = Some(reader.read_byte_string(10)?);
                }
                if remaining() {
                    extra.was_deleted = reader.read_int16(true)? != 0;
                }
            }
            RenameProject | RenameFile => {
                if remaining() {
                    extra.name = Some(reader.read_name()?);
                }
                if remaining() {
                    extra.old_name = Some(reader.read_name()?);
                }
            }
            MoveFrom | MoveTo => {
                // A move revision is a named revision (carries the moved
                // item's own name and physical name) plus the project path
                // it moved from/to.
                if remaining() {
                    extra.name = Some(reader.read_name()?);
                }
                if remaining() {
                    extra.physical_name = Some(reader.read_byte_string(10)?);
                }
                if remaining() {
                    extra.project_path = Some(reader.read_byte_string(260)?);
                }
            }
            ShareFile => {
                if remaining() {
                    extra.name = Some(reader.read_name()?);
                }
                if remaining() {
                    extra.project_idx = reader.read_int16(true)?;
                }
                if remaining() {
                    extra.pinned_revision = reader.read_int16(true)?;
                }
                if remaining() {
                    extra.unpinned_revision = reader.read_int16(true)?;
                }
                if remaining() {
                    extra.project_path = Some(reader.read_byte_string(260)?);
                }
            }
            BranchFile => {
                if remaining() {
                    extra.source_name = Some(reader.read_name()?);
                }
                if remaining() {
                    extra.branch_file = Some(reader.read_byte_string(10)?);
                }
            }
            CreateBranch => {
                if remaining() {
                    extra.branch_file = Some(reader.read_byte_string(10)?);
                }
            }
            CheckinFile | CheckInProject => {
                if remaining() {
                    extra.delta_offset = reader.read_int32(true)?;
                }
            }
            ArchiveVersionFile | ArchiveFile | ArchiveProject => {
                if remaining() {
                    extra.archive_path = Some(reader.read_byte_string(260)?);
                }
            }
            Label => {}
        }
        Ok(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes_round_trip() {
        for code in 0u16..=25 {
            let action = VssRevisionAction::from_code(code).unwrap();
            assert_eq!(action as u16, code);
        }
        assert!(VssRevisionAction::from_code(26).is_none());
    }

    #[test]
    fn file_local_actions_match_glossary() {
        use VssRevisionAction::*;
        for action in [Label, CreateFile, CreateBranch, CheckinFile, ArchiveFile] {
            assert!(action.is_file_local());
        }
        for action in [AddProject, DeleteFile, RenameProject, ShareFile] {
            assert!(!action.is_file_local());
        }
    }
}
