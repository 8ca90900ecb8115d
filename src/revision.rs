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

//! The logical, per-item-instance view of a revision: a [`RawRevisionRecord`]
//! enriched with resolved names, and the effect it has on a project's child
//! order when replayed forward.

use crate::database::Database;
use crate::item_file::ItemsArray;
use crate::item_file::index_name_of;
use crate::reader::RawName;
use crate::revision_record::RawRevisionRecord;
use crate::revision_record::VssRevisionAction;

/// A name resolved to its long form, alongside the physical name and index
/// name needed to place it in a project's child order.
#[derive(Debug, Clone)]
pub struct FullName {
    pub long_name: String,
    pub index_name: String,
    pub is_project: bool,
}

impl FullName {
    fn resolve(database: &Database, name: &RawName) -> Self {
        let long_name = database.resolve_name(name);
        let index_name = index_name_of(&name.short_name);
        Self {
            long_name,
            index_name,
            is_project: name.is_project(),
        }
    }
}

/// A decoded, name-resolved revision. One per `EL` record, with variant
/// fields populated according to its action (see the per-action table in the
/// item file layer's design notes).
#[derive(Debug, Clone)]
pub struct Revision {
    pub revision_num: u16,
    pub action: VssRevisionAction,
    pub timestamp: u32,
    pub author: String,
    pub comment: Option<String>,
    pub label: Option<String>,
    pub label_comment: Option<String>,
    pub full_name: Option<FullName>,
    pub old_full_name: Option<FullName>,
    pub physical_name: Option<String>,
    pub project_path: Option<String>,
    pub pinned_revision: i16,
    pub unpinned_revision: i16,
    pub project_idx: i16,
    pub source_full_name: Option<FullName>,
    pub branch_file: Option<String>,
    pub archive_path: Option<String>,
    pub was_deleted: bool,
    pub delta_offset: i32,
    /// Reconstructed payload, populated for File items only.
    pub revision_data: Option<Vec<u8>>,
    /// Position this revision's forward effect landed at in the owning
    /// project's reconstructed child order. Populated by
    /// [`Revision::apply_to_project_items`].
    pub item_index: Option<usize>,
    /// For Rename, the position the item occupied under its old name.
    pub old_item_index: Option<usize>,
}

fn decode_fixed(decode: &dyn Fn(&[u8]) -> String, bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(decode(bytes))
    }
}

impl Revision {
    pub fn from_raw(
        raw: &RawRevisionRecord,
        database: &Database,
        comment: Option<String>,
        label_comment: Option<String>,
    ) -> Self {
        let decode = database.decoder();
        Self {
            revision_num: raw.revision_num,
            action: raw.action,
            timestamp: raw.timestamp,
            author: decode(&raw.user),
            comment,
            label: decode_fixed(decode, &raw.label),
            label_comment,
            full_name: raw.extra.name.as_ref().map(|n| FullName::resolve(database, n)),
            old_full_name: raw.extra.old_name.as_ref().map(|n| FullName::resolve(database, n)),
            physical_name: raw.extra.physical_name.as_ref().map(|p| decode(p)),
            project_path: raw.extra.project_path.as_ref().map(|p| decode(p)),
            pinned_revision: raw.extra.pinned_revision,
            unpinned_revision: raw.extra.unpinned_revision,
            project_idx: raw.extra.project_idx,
            source_full_name: raw.extra.source_name.as_ref().map(|n| FullName::resolve(database, n)),
            branch_file: raw.extra.branch_file.as_ref().map(|p| decode(p)),
            archive_path: raw.extra.archive_path.as_ref().map(|p| decode(p)),
            was_deleted: raw.extra.was_deleted,
            delta_offset: raw.extra.delta_offset,
            revision_data: None,
            item_index: None,
            old_item_index: None,
        }
    }

    fn physical_or_current(&self, current_physical: &str) -> String {
        self.physical_name.clone().unwrap_or_else(|| current_physical.to_string())
    }

    /// Mutates `items` to reflect this revision's forward effect on its
    /// owning project's child order, recording the landing position into
    /// `item_index`/`old_item_index` for the changeset-action layer to
    /// recover later. `current_physical` is the physical name of the project
    /// whose items array is being updated (used only for branch/share
    /// bookkeeping that refers back to the owner).
    pub fn apply_to_project_items(&mut self, items: &mut ItemsArray, current_physical: &str) {
        use VssRevisionAction::*;
        match self.action {
            AddProject | AddFile | RestoreFile | RestoreProject | RestoreVersionFile => {
                if let Some(name) = &self.full_name {
                    let idx = items.add_item(name.index_name.clone(), self.physical_or_current(current_physical));
                    self.item_index = Some(idx);
                }
            }
            DestroyProject | DestroyFile => {
                if let Some(name) = &self.full_name {
                    if let Some(idx) = items.find_by_index_name(&name.index_name) {
                        items.remove_item_by_idx(idx);
                        self.item_index = Some(idx);
                    }
                }
            }
            RenameProject | RenameFile => {
                if let (Some(old), Some(new)) = (&self.old_full_name, &self.full_name) {
                    if let Some(idx) = items.find_by_index_name(&old.index_name) {
                        let entry = items.remove_item_by_idx(idx).unwrap();
                        self.old_item_index = Some(idx);
                        let new_idx = items.add_item(new.index_name.clone(), entry.physical_name);
                        self.item_index = Some(new_idx);
                    }
                }
            }
            MoveFrom => {
                if let Some(name) = &self.full_name {
                    let idx = items.add_item(name.index_name.clone(), self.physical_or_current(current_physical));
                    self.item_index = Some(idx);
                }
            }
            MoveTo => {
                if let Some(name) = &self.full_name {
                    if let Some(idx) = items.find_by_index_name(&name.index_name) {
                        items.remove_item_by_idx(idx);
                        self.item_index = Some(idx);
                    }
                }
            }
            ShareFile => {
                // A negative unpinned_revision marks a brand-new share;
                // pin/unpin transitions on an already-shared item leave the
                // child order unchanged.
                let idx = self.project_idx.max(0) as usize;
                if self.unpinned_revision < 0 {
                    if let Some(name) = &self.full_name {
                        items.insert_item(idx, name.index_name.clone(), self.physical_or_current(current_physical));
                    }
                }
                self.item_index = Some(idx);
            }
            BranchFile => {
                if let (Some(source), Some(new)) = (&self.source_full_name, &self.full_name) {
                    if let Some(idx) = items.find_by_index_name(&source.index_name) {
                        items.remove_item_by_idx(idx);
                        items.insert_item(idx, new.index_name.clone(), self.physical_or_current(current_physical));
                        self.item_index = Some(idx);
                    }
                }
            }
            // Delete/Recover leave the child present but toggle its deleted
            // flag at the tree-state layer; Label/Archive/Checkin/CreateBranch
            // never change structure.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_fixed_treats_empty_as_absent() {
        let decode: &dyn Fn(&[u8]) -> String = &|b| String::from_utf8_lossy(b).into_owned();
        assert_eq!(decode_fixed(decode, b""), None);
        assert_eq!(decode_fixed(decode, b"x"), Some("x".to_string()));
    }
}
