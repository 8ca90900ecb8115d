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

//! The live, mutable project tree: one [`Node`] per project or file entry,
//! built eagerly and recursively from the root project down, mirroring the
//! shape the repository had at the moment of reconstruction (its "present"
//! state, revision-wise). The changeset engine walks this tree backwards in
//! time, mutating it as it goes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::rc::Weak;

use crate::database::Database;
use crate::database::ROOT_PROJECT_NAME;
use crate::database::ROOT_PROJECT_PHYSICAL;
use crate::error::ItemFileError;
use crate::error::VssError;
use crate::item_file::FileItemFile;
use crate::item_file::ProjectEntryFlags;
use crate::item_file::ProjectEntryRecord;
use crate::item_file::ProjectItemFile;
use crate::item_file::index_name_of;
use crate::reader::RecordReader;
use crate::record::RecordHeader;

pub type NodeRef = Rc<RefCell<Node>>;

fn ascii_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Either side of a tree node's payload: a fully or partially reconstructed
/// item file, or `None` if the backing item file was missing on disk (an
/// orphaned reference).
pub enum NodeKind {
    File { item_file: Option<Rc<FileItemFile>> },
    Project {
        item_file: Option<Rc<ProjectItemFile>>,
        items_array: Vec<NodeRef>,
        /// Active (non-deleted) children only, keyed by current logical name.
        items_by_logical_name: HashMap<String, NodeRef>,
        /// (timestamp, cursor) pairs, "latest last"; drained from the tail
        /// by the changeset engine's k-way merge. A cursor pointing back at
        /// this same node represents the directory's own next revision.
        pending: Vec<(u32, NodeRef)>,
    },
}

/// One node of the live project tree: a project (directory) or a file.
pub struct Node {
    pub physical_name: String,
    pub logical_name: String,
    pub flags: ProjectEntryFlags,
    pub pinned_version: i16,
    pub(crate) deleted: bool,
    pub parent: Option<Weak<RefCell<Node>>>,
    pub kind: NodeKind,
    /// Next (chronologically earlier) revision to process, walking backward.
    pub next_revision: Option<crate::revision::Revision>,
    pub next_revision_num: u16,
}

impl Node {
    pub fn is_project(&self) -> bool {
        matches!(self.kind, NodeKind::Project { .. })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// Builds the full path from the repository root down to (and
    /// including) `node`, with a trailing slash on every project segment.
    pub fn make_full_path(node: &NodeRef) -> String {
        let mut parts = Vec::new();
        let mut current = Some(node.clone());
        while let Some(n) = current {
            let n_ref = n.borrow();
            if n_ref.is_project() {
                parts.push(format!("{}/", n_ref.logical_name));
            } else {
                parts.push(n_ref.logical_name.clone());
            }
            current = n_ref.parent.as_ref().and_then(Weak::upgrade);
        }
        parts.reverse();
        parts.concat()
    }

    pub fn get_item_by_logical_name(project: &NodeRef, logical_name: &str) -> Option<NodeRef> {
        match &project.borrow().kind {
            NodeKind::Project { items_by_logical_name, .. } => items_by_logical_name.get(logical_name).cloned(),
            NodeKind::File { .. } => None,
        }
    }

    pub fn get_item_by_index(project: &NodeRef, idx: usize) -> Option<NodeRef> {
        match &project.borrow().kind {
            NodeKind::Project { items_array, .. } => items_array.get(idx).cloned(),
            NodeKind::File { .. } => None,
        }
    }

    /// Inserts `child` at `idx` in `project`'s child order, registering it
    /// in `items_by_logical_name` if active.
    pub fn insert_item_by_idx(project: &NodeRef, child: NodeRef, idx: usize) {
        child.borrow_mut().parent = Some(Rc::downgrade(project));
        let (logical_name, active) = {
            let c = child.borrow();
            (c.logical_name.clone(), !c.is_deleted())
        };
        if let NodeKind::Project {
            items_array,
            items_by_logical_name,
            ..
        } = &mut project.borrow_mut().kind
        {
            let idx = idx.min(items_array.len());
            items_array.insert(idx, child);
            if active {
                items_by_logical_name.insert(logical_name, items_array[idx].clone());
            }
        }
    }

    /// Removes and returns the child at `idx`. If `remove_from_directory` is
    /// set (or the child's item file is missing), the child is also dropped
    /// from the active-name map; otherwise a later Create action is expected
    /// to do that itself.
    pub fn remove_item_by_index(project: &NodeRef, idx: usize, remove_from_directory: bool) -> Option<NodeRef> {
        let removed = if let NodeKind::Project { items_array, .. } = &mut project.borrow_mut().kind {
            if idx < items_array.len() {
                Some(items_array.remove(idx))
            } else {
                None
            }
        } else {
            None
        }?;

        let (logical_name, missing_item_file, already_deleted) = {
            let r = removed.borrow();
            let missing = match &r.kind {
                NodeKind::File { item_file } => item_file.is_none(),
                NodeKind::Project { item_file, .. } => item_file.is_none(),
            };
            (r.logical_name.clone(), missing, r.is_deleted())
        };
        if !already_deleted && (remove_from_directory || missing_item_file) {
            if let NodeKind::Project { items_by_logical_name, .. } = &mut project.borrow_mut().kind {
                items_by_logical_name.remove(&logical_name);
            }
        }
        Some(removed)
    }

    /// Drops `child` from `project`'s active-name map by its current
    /// logical name, leaving `items_array` untouched. Used when a later
    /// Create action is expected to re-add it under that same name.
    pub fn remove_from_directory(project: &NodeRef, child: &NodeRef) {
        let logical_name = child.borrow().logical_name.clone();
        if let NodeKind::Project { items_by_logical_name, .. } = &mut project.borrow_mut().kind {
            items_by_logical_name.remove(&logical_name);
        }
    }

    /// All children of `project`, deleted or not, in child order.
    pub fn all_items(project: &NodeRef) -> Vec<NodeRef> {
        match &project.borrow().kind {
            NodeKind::Project { items_array, .. } => items_array.clone(),
            NodeKind::File { .. } => Vec::new(),
        }
    }

    /// The parent project of `node`, if it currently has one.
    pub fn parent_of(node: &NodeRef) -> Option<NodeRef> {
        node.borrow().parent.as_ref().and_then(Weak::upgrade)
    }

    fn root_of(node: &NodeRef) -> NodeRef {
        let mut current = node.clone();
        loop {
            let parent = current.borrow().parent.as_ref().and_then(Weak::upgrade);
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    /// Resolves a `/`-separated path (as produced by [`Node::make_full_path`])
    /// starting from the repository root, stopping early if an intermediate
    /// segment names a file rather than a project.
    pub fn find_by_path_name(node: &NodeRef, full_name: &str) -> Option<NodeRef> {
        let root = Self::root_of(node);
        let trimmed = full_name.strip_suffix('/').unwrap_or(full_name);
        let mut parts = trimmed.split('/');
        let first = parts.next()?;
        if first != root.borrow().logical_name {
            return None;
        }
        let mut item = root;
        for part in parts {
            let next = Self::get_item_by_logical_name(&item, part)?;
            let is_project = next.borrow().is_project();
            item = next;
            if !is_project {
                break;
            }
        }
        Some(item)
    }

    /// Reverses a MoveFrom: transfers `child` away from the directory it
    /// currently sits detached from, into the peer directory recorded at
    /// `original_path`. Returns the peer directory the child landed in, so
    /// the caller can re-register it for further backward processing there.
    pub fn move_from_self(node: &NodeRef, original_path: &str, child: NodeRef) -> Option<NodeRef> {
        match Self::find_by_path_name(node, original_path) {
            Some(peer) if peer.borrow().is_project() => {
                let idx = match &peer.borrow().kind {
                    NodeKind::Project { items_array, .. } => items_array.len(),
                    NodeKind::File { .. } => 0,
                };
                Self::insert_item_by_idx(&peer, child, idx);
                Some(peer)
            }
            _ => None,
        }
    }

    /// Reverses a MoveTo: locates the child previously moved out to
    /// `new_path` by physical/logical name, detaches it from there, and
    /// reinserts it into `node` at `item_idx` under its original name.
    pub fn move_to_self(
        node: &NodeRef,
        new_path: &str,
        physical_name: &str,
        logical_name: &str,
        item_idx: usize,
    ) -> Option<NodeRef> {
        let peer = Self::find_by_path_name(node, new_path)?;
        if !peer.borrow().is_project() {
            return None;
        }
        let idx = match &peer.borrow().kind {
            NodeKind::Project { items_array, .. } => items_array.iter().position(|c| {
                let c = c.borrow();
                c.physical_name == physical_name && c.logical_name == logical_name
            }),
            NodeKind::File { .. } => None,
        }?;
        let item = Self::remove_item_by_index(&peer, idx, true)?;
        Self::insert_item_by_idx(node, item.clone(), item_idx);
        Some(item)
    }

    /// Marks the child at `idx` deleted and drops it from the active-name
    /// map, returning it. The base counterpart to `unset_item_deleted`,
    /// mirroring how `remove_item_by_index`/`remove_from_directory` already
    /// split bookkeeping from structural removal.
    pub fn set_item_deleted(project: &NodeRef, idx: usize) -> Option<NodeRef> {
        let item = Self::get_item_by_index(project, idx)?;
        item.borrow_mut().set_deleted(true);
        Self::remove_from_directory(project, &item);
        Some(item)
    }

    /// Clears the deleted flag on the child at `idx` and re-registers it in
    /// the active-name map, returning it.
    pub fn unset_item_deleted(project: &NodeRef, idx: usize) -> Option<NodeRef> {
        let item = Self::get_item_by_index(project, idx)?;
        item.borrow_mut().set_deleted(false);
        let logical_name = item.borrow().logical_name.clone();
        if let NodeKind::Project { items_by_logical_name, .. } = &mut project.borrow_mut().kind {
            items_by_logical_name.insert(logical_name, item.clone());
        }
        Some(item)
    }
}

fn read_project_entries(buf: std::sync::Arc<[u8]>) -> Result<Vec<ProjectEntryRecord>, ItemFileError> {
    let mut reader = RecordReader::new(buf);
    let mut entries = Vec::new();
    while reader.remaining() >= RecordHeader::SIZE {
        let header = RecordHeader::read(&mut reader)?;
        header.check_crc(&reader)?;
        if header.signature == ProjectEntryRecord::SIGNATURE {
            let mut sub = reader.clone_at(0, header.length as usize)?;
            entries.push(ProjectEntryRecord::read(&mut sub)?);
        }
        reader.skip(header.length as usize)?;
    }
    Ok(entries)
}

/// Opens the repository's implicit root project and recursively builds the
/// whole live tree beneath it.
pub fn open_project_tree(database: &Database) -> Result<NodeRef, VssError> {
    build_project(
        database,
        ROOT_PROJECT_PHYSICAL,
        ROOT_PROJECT_NAME,
        ProjectEntryFlags(0),
        0,
    )
}

fn orphaned<T>(result: Result<T, VssError>) -> Result<Option<T>, VssError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(VssError::ItemFile {
            physical_name,
            source: ItemFileError::VssFileNotFound { .. },
        }) => {
            tracing::warn!(physical_name, "data file missing; treating item as orphaned");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Builds a project node and, if its item file is present, every descendant
/// beneath it, by replaying the directory's declared `JP` entries into the
/// authoritative (reconstructed) child order.
pub fn build_project(
    database: &Database,
    physical_name: &str,
    logical_name: &str,
    flags: ProjectEntryFlags,
    pinned_version: i16,
) -> Result<NodeRef, VssError> {
    let item_file = orphaned(database.open_project_item(physical_name))?;

    let node = Rc::new(RefCell::new(Node {
        physical_name: physical_name.to_string(),
        logical_name: logical_name.to_string(),
        flags,
        pinned_version,
        deleted: flags.is_deleted(),
        parent: None,
        kind: NodeKind::Project {
            item_file: item_file.clone(),
            items_array: Vec::new(),
            items_by_logical_name: HashMap::new(),
            pending: Vec::new(),
        },
        next_revision: None,
        next_revision_num: 0,
    }));

    let Some(item_file) = item_file else {
        return Ok(node);
    };

    let ext = ascii_string(trim_nul(&item_file.header.common.data_ext));
    let buf = database
        .read_item_sibling(physical_name, &ext)
        .map_err(|e| VssError::item_file(physical_name, e))?;
    let entries = read_project_entries(buf).map_err(|e| VssError::item_file(physical_name, e))?;

    let mut slots: Vec<Option<NodeRef>> = (0..item_file.items_array.len()).map(|_| None).collect();
    for entry in &entries {
        let long_name = database.resolve_name(&entry.name);
        let index_name = index_name_of(&entry.name.short_name);
        let entry_physical = ascii_string(&entry.physical_name);
        let idx = item_file
            .items_array
            .find_item_index(&index_name, &entry_physical)
            .unwrap_or(slots.len());

        let child_flags = ProjectEntryFlags(entry.flags.0);
        let is_project = entry.item_type == 1;
        let child = if is_project {
            build_project(database, &entry_physical, &long_name, child_flags, 0)?
        } else {
            build_file(database, &entry_physical, &long_name, child_flags, entry.pinned_version)?
        };
        if idx < slots.len() {
            slots[idx] = Some(child);
        }
    }

    for child in slots.into_iter().flatten() {
        let (logical_name, active) = {
            let c = child.borrow();
            (c.logical_name.clone(), !c.is_deleted())
        };
        child.borrow_mut().parent = Some(Rc::downgrade(&node));
        if let NodeKind::Project {
            items_array,
            items_by_logical_name,
            ..
        } = &mut node.borrow_mut().kind
        {
            items_array.push(child.clone());
            if active {
                items_by_logical_name.insert(logical_name, child);
            }
        }
    }

    Ok(node)
}

/// Builds a leaf file node; does not recurse (files have no children).
pub fn build_file(
    database: &Database,
    physical_name: &str,
    logical_name: &str,
    flags: ProjectEntryFlags,
    pinned_version: i16,
) -> Result<NodeRef, VssError> {
    let item_file = orphaned(database.open_file_item(physical_name))?;
    Ok(Rc::new(RefCell::new(Node {
        physical_name: physical_name.to_string(),
        logical_name: logical_name.to_string(),
        flags,
        pinned_version,
        deleted: flags.is_deleted(),
        parent: None,
        kind: NodeKind::File { item_file },
        next_revision: None,
        next_revision_num: 0,
    })))
}

/// Builds a fresh node and inserts it into `project` at `item_idx` (append
/// if `None`), used when the backward-apply pass needs to materialize a
/// child that the live tree didn't already have an entry for.
pub fn insert_new_item(
    database: &Database,
    project: &NodeRef,
    physical_name: &str,
    logical_name: &str,
    is_project: bool,
    flags: ProjectEntryFlags,
    pinned_version: i16,
    item_idx: Option<usize>,
) -> Result<NodeRef, VssError> {
    let item = if is_project {
        build_project(database, physical_name, logical_name, flags, pinned_version)?
    } else {
        build_file(database, physical_name, logical_name, flags, pinned_version)?
    };
    let idx = item_idx.unwrap_or_else(|| match &project.borrow().kind {
        NodeKind::Project { items_array, .. } => items_array.len(),
        NodeKind::File { .. } => 0,
    });
    Node::insert_item_by_idx(project, item.clone(), idx);
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_full_path_nests_project_segments() {
        let root = Rc::new(RefCell::new(Node {
            physical_name: "AAAAAAAA".to_string(),
            logical_name: "$".to_string(),
            flags: ProjectEntryFlags(0),
            pinned_version: 0,
            deleted: false,
            parent: None,
            kind: NodeKind::Project {
                item_file: None,
                items_array: Vec::new(),
                items_by_logical_name: HashMap::new(),
                pending: Vec::new(),
            },
            next_revision: None,
            next_revision_num: 0,
        }));
        let child = Rc::new(RefCell::new(Node {
            physical_name: "BBBBBBBB".to_string(),
            logical_name: "file.txt".to_string(),
            flags: ProjectEntryFlags(0),
            pinned_version: 0,
            deleted: false,
            parent: Some(Rc::downgrade(&root)),
            kind: NodeKind::File { item_file: None },
            next_revision: None,
            next_revision_num: 0,
        }));
        assert_eq!(Node::make_full_path(&child), "$/file.txt");
    }
}
