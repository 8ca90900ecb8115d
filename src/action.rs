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

//! The changeset-action layer: turns a single backward-walked [`Revision`]
//! into an [`Action`] that both mutates the live tree to its state one step
//! further back in time, and (unless skipped) knows how to replay its
//! forward effect through a [`RevisionActionHandler`].
//!
//! Where the upstream model gives every action kind its own class and lets a
//! constructor reassign `perform_revision_action` to the inert base
//! implementation when an action turns out to have nothing to emit, this
//! layer keeps one `Action` struct per revision and tracks that with an
//! explicit [`EmitKind`] field set during [`Action::apply_to_item_backwards`].

use crate::database::Database;
use crate::error::ItemFileError;
use crate::item_file::ProjectEntryFlags;
use crate::revision::Revision;
use crate::revision_record::VssRevisionAction;
use crate::tree_state::Node;
use crate::tree_state::NodeKind;
use crate::tree_state::NodeRef;

fn has_item_file(node: &NodeRef) -> bool {
    match &node.borrow().kind {
        NodeKind::File { item_file } => item_file.is_some(),
        NodeKind::Project { item_file, .. } => item_file.is_some(),
    }
}

/// Whether an action's forward effect should actually be replayed through
/// the [`RevisionActionHandler`]. Replaces the upstream pattern of
/// reassigning an instance's `perform_revision_action` to a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    Normal,
    Skip,
}

/// One file or directory recreated by a RecoverProject's backward apply,
/// either a directory (`data: None`) or a file with its reconstructed bytes.
#[derive(Debug, Clone)]
pub struct RecoverEntry {
    pub pathname: String,
    pub is_project: bool,
    pub data: Option<Vec<u8>>,
}

/// The changeset-layer wrapper around a single backward-walked revision.
///
/// `revision` already carries every action-specific payload field (see
/// [`Revision`]); `Action` adds only what doesn't already live there: the
/// fully qualified path this action applies to, the data it reconstructs
/// (for file content actions), the directory tree a RecoverProject rebuilds,
/// the "other side" path a Rename/Move/Share refers to, and any errors
/// encountered while tracing the action back through the tree.
#[derive(Debug, Clone)]
pub struct Action {
    pub revision: Revision,
    pub pathname: String,
    pub is_project_context: bool,
    pub errors: Vec<String>,
    pub emit_kind: EmitKind,
    pub data: Option<Vec<u8>>,
    pub tree: Vec<RecoverEntry>,
    pub other_pathname: Option<String>,
}

/// Action codes a File item's own revision chain may dispatch through
/// [`create_file_action`]. Mirrors `file_action_dict`.
fn is_file_dispatchable(action: VssRevisionAction) -> bool {
    use VssRevisionAction::*;
    matches!(action, Label | CreateBranch | CheckinFile | ArchiveFile | CreateFile)
}

/// Action codes a Project item's own revision chain may dispatch through
/// [`create_project_action`]. Mirrors `project_action_dict`.
fn is_project_dispatchable(action: VssRevisionAction) -> bool {
    use VssRevisionAction::*;
    matches!(
        action,
        Label
            | DestroyProject
            | DestroyFile
            | RenameProject
            | RenameFile
            | MoveFrom
            | MoveTo
            | ShareFile
            | BranchFile
            | ArchiveFile
            | ArchiveProject
            | RestoreFile
            | RestoreProject
            | CreateProject
            | AddProject
            | AddFile
            | DeleteProject
            | DeleteFile
            | RecoverProject
            | RecoverFile
    )
}

fn full_name(revision: &Revision) -> String {
    revision.full_name.as_ref().map(|n| n.long_name.clone()).unwrap_or_default()
}

fn old_name(revision: &Revision) -> String {
    revision.old_full_name.as_ref().map(|n| n.long_name.clone()).unwrap_or_default()
}

impl Action {
    fn new(revision: Revision, pathname: String, is_project_context: bool) -> Self {
        Self {
            revision,
            pathname,
            is_project_context,
            errors: Vec::new(),
            emit_kind: EmitKind::Normal,
            data: None,
            tree: Vec::new(),
            other_pathname: None,
        }
    }

    fn push_error(&mut self, error: String) {
        self.errors.push(error);
    }

    fn skip(&mut self) {
        self.emit_kind = EmitKind::Skip;
    }

    /// Reverses this revision's forward effect on the live tree, a single
    /// step back in time. `node` is the file's or project's own tree node
    /// (the item the revision belongs to); for project actions it is the
    /// project whose child order the action mutated.
    pub fn apply_to_item_backwards(&mut self, database: &Database, node: &NodeRef) {
        use VssRevisionAction::*;
        match self.revision.action {
            Label => {}

            CreateFile => {
                node.borrow_mut().next_revision = None;
                if let Some(parent) = Node::parent_of(node) {
                    Node::remove_from_directory(&parent, node);
                }
            }

            CreateProject => {
                node.borrow_mut().next_revision = None;
                // A CreateProject can land before all of its children's own
                // history has finished draining (e.g. when one of its
                // descendants was restored from an archive). The root
                // project has no parent and is never itself emitted.
                match Node::parent_of(node) {
                    Some(parent) => Node::remove_from_directory(&parent, node),
                    None => self.skip(),
                }
                node.borrow_mut().parent = None;
            }

            AddProject | AddFile => {
                let idx = self.revision.item_index.unwrap_or(0);
                match Node::remove_item_by_index(node, idx, false) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!(
                                "{} could not be added: file {} missing",
                                self.pathname,
                                item.borrow().physical_name
                            ));
                        } else if matches!(self.revision.action, AddProject) {
                            // The directory itself will be recreated by its own CreateProject.
                            self.skip();
                        }
                    }
                }
            }

            DeleteProject | DeleteFile => {
                let idx = self.revision.item_index.unwrap_or(0);
                match crate::changeset_item::unset_item_deleted(database, node, idx, self.revision.timestamp) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!(
                                "{} could not be deleted: file {} missing",
                                self.pathname,
                                item.borrow().physical_name
                            ));
                            if matches!(self.revision.action, DeleteFile) {
                                self.skip();
                            }
                        }
                    }
                }
            }

            RecoverFile => {
                let idx = self.revision.item_index.unwrap_or(0);
                match crate::changeset_item::set_item_deleted(node, idx) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!("File {} could not be recovered: file missing", self.pathname));
                        } else {
                            self.data = crate::changeset_item::get_next_revision_data(&item);
                        }
                    }
                }
            }

            RecoverProject => {
                let idx = self.revision.item_index.unwrap_or(0);
                match crate::changeset_item::set_item_deleted(node, idx) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!("Project {} could not be recovered: file missing", self.pathname));
                            self.tree = vec![RecoverEntry {
                                pathname: self.pathname.clone(),
                                is_project: true,
                                data: None,
                            }];
                        } else {
                            self.tree = recover_directory(&item);
                        }
                    }
                }
            }

            DestroyProject | DestroyFile => {
                let is_project = matches!(self.revision.action, DestroyProject);
                let physical_name = self.revision.physical_name.clone().unwrap_or_default();
                let logical_name = full_name(&self.revision);
                let was_deleted = self.revision.was_deleted;
                let flags = ProjectEntryFlags(if was_deleted { ProjectEntryFlags::DELETED } else { 0 });
                match crate::changeset_item::insert_new_item(
                    database,
                    node,
                    &physical_name,
                    &logical_name,
                    is_project,
                    flags,
                    0,
                    self.revision.timestamp,
                    self.revision.item_index,
                ) {
                    Err(e) => self.push_error(format!("{e}")),
                    Ok(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!(
                                "Destroyed item {} could not be traced back: file {physical_name} missing",
                                self.pathname
                            ));
                            if !is_project || was_deleted {
                                self.skip();
                            }
                        } else if was_deleted {
                            self.skip();
                        }
                    }
                }
            }

            RenameProject | RenameFile => {
                let idx = self.revision.item_index.unwrap_or(0);
                let old_idx = self.revision.old_item_index.unwrap_or(idx);
                let original_name = old_name(&self.revision);
                let current_name = full_name(&self.revision);
                let base_path = self.pathname.strip_suffix(current_name.as_str()).unwrap_or(&self.pathname);
                self.other_pathname = Some(format!("{base_path}{original_name}"));
                match Node::remove_item_by_index(node, idx, true) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        item.borrow_mut().logical_name = original_name;
                        Node::insert_item_by_idx(node, item.clone(), old_idx);
                        if !has_item_file(&item) {
                            self.push_error(format!(
                                "Rename: physical name {} not present in the database",
                                self.revision.physical_name.clone().unwrap_or_default()
                            ));
                            if matches!(self.revision.action, RenameFile) {
                                self.skip();
                            }
                        } else if item.borrow().is_deleted() {
                            // A shared file's rename touches every instance, deleted or not.
                            self.skip();
                        } else {
                            crate::changeset_item::remove_pending_item(node, &item);
                            crate::changeset_item::insert_pending_item(node, &item);
                        }
                    }
                }
            }

            MoveFrom => {
                let idx = self.revision.item_index.unwrap_or(0);
                match Node::remove_item_by_index(node, idx, true) {
                    None => {
                        self.push_error(format!("{} missing from child order at index {idx}", self.pathname));
                        self.skip();
                    }
                    Some(item) => {
                        if has_item_file(&item) {
                            crate::changeset_item::remove_pending_item(node, &item);
                        }
                        let original_path = self.revision.project_path.clone().unwrap_or_default();
                        if !crate::changeset_item::move_from_self(node, &original_path, item) {
                            self.skip();
                        }
                    }
                }
            }

            MoveTo => {
                let physical_name = self.revision.physical_name.clone().unwrap_or_default();
                let logical_name = full_name(&self.revision);
                let idx = self.revision.item_index.unwrap_or(0);
                let new_pathname = self.revision.project_path.clone().unwrap_or_default();
                match crate::changeset_item::move_to_self(node, &new_pathname, &physical_name, &logical_name, idx) {
                    None => self.skip(),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!("Unable to move item {}: file {physical_name} missing", self.pathname));
                        }
                    }
                }
            }

            ShareFile => self.apply_share_backwards(database, node),

            BranchFile => {
                let idx = self.revision.item_index.unwrap_or(0);
                match Node::remove_item_by_index(node, idx, true) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!(
                                "File {} could not be branched: file missing",
                                self.pathname
                            ));
                        }
                    }
                }
                let branch_file = self.revision.branch_file.clone().unwrap_or_default();
                let logical_name = full_name(&self.revision);
                match crate::changeset_item::insert_new_item(
                    database,
                    node,
                    &branch_file,
                    &logical_name,
                    false,
                    ProjectEntryFlags(0),
                    0,
                    self.revision.timestamp,
                    self.revision.item_index,
                ) {
                    Err(e) => self.push_error(format!("{e}")),
                    Ok(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!(
                                "Branch source item {} could not be reinserted: file {branch_file} missing",
                                self.pathname
                            ));
                        }
                    }
                }
            }

            CreateBranch => {
                node.borrow_mut().next_revision = None;
                self.data = self.revision.revision_data.clone();
            }

            CheckinFile => {
                self.data = self.revision.revision_data.clone();
            }

            CheckInProject | ArchiveVersionFile | RestoreVersionFile => {
                self.push_error(format!("unrecognized revision action for {}", self.pathname));
                self.skip();
            }

            ArchiveFile | ArchiveProject => {}

            RestoreFile | RestoreProject => {
                let idx = self.revision.item_index.unwrap_or(0);
                match Node::remove_item_by_index(node, idx, false) {
                    None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                    Some(item) => {
                        if !has_item_file(&item) {
                            self.push_error(format!("{} could not be restored: file missing", self.pathname));
                        } else if matches!(self.revision.action, RestoreProject) {
                            // The directory will be recreated by its own CreateProject.
                            self.skip();
                        }
                    }
                }
            }
        }
    }

    fn apply_share_backwards(&mut self, database: &Database, node: &NodeRef) {
        let idx = self.revision.item_index.unwrap_or(0);
        if self.revision.unpinned_revision < 0 {
            // A brand-new share.
            match Node::remove_item_by_index(node, idx, true) {
                None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                Some(item) => {
                    if !has_item_file(&item) {
                        self.push_error(format!("File {} could not be shared: file missing", self.pathname));
                        self.skip();
                        return;
                    }
                    crate::changeset_item::remove_pending_item(node, &item);
                    self.data = crate::changeset_item::get_next_revision_data(&item);
                    let original_project = self.revision.project_path.clone().unwrap_or_default();
                    let logical_name = item.borrow().logical_name.clone();
                    self.other_pathname = Some(format!("{original_project}/{logical_name}"));
                    let found = Node::find_by_path_name(node, &original_project);
                    if !found.map(|n| has_item_file(&n)).unwrap_or(false) {
                        self.other_pathname = None;
                    }
                }
            }
        } else if self.revision.unpinned_revision == 0 {
            // Pin: the item is reverting from pinned-at-`pinned_revision` to unpinned.
            match crate::changeset_item::unset_item_pinned(database, node, idx, self.revision.timestamp) {
                None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                Some(item) => {
                    let pinned_revision = self.revision.pinned_revision.max(0) as u16;
                    let data = match &item.borrow().kind {
                        NodeKind::File { item_file: Some(f) } => f.get_revision_data(pinned_revision),
                        _ => None,
                    };
                    if has_item_file(&item) {
                        self.data = data;
                    } else {
                        self.push_error(format!("File {} could not be pinned: file missing", self.pathname));
                        self.skip();
                    }
                }
            }
        } else {
            // Unpin: the item regains a cursor of its own.
            match crate::changeset_item::set_item_pinned(node, idx) {
                None => self.push_error(format!("{} missing from child order at index {idx}", self.pathname)),
                Some(item) => {
                    if has_item_file(&item) {
                        self.data = crate::changeset_item::get_next_revision_data(&item);
                    } else {
                        self.push_error(format!("File {} could not be unpinned: file missing", self.pathname));
                        self.skip();
                    }
                }
            }
        }
    }

    /// Replays this action's forward effect through `handler`, unless it was
    /// marked [`EmitKind::Skip`] during backward apply.
    pub fn perform_revision_action(&self, handler: &mut dyn crate::handler::RevisionActionHandler) {
        if self.emit_kind == EmitKind::Skip {
            return;
        }
        use VssRevisionAction::*;
        match self.revision.action {
            Label => {
                let label = self.revision.label.clone().unwrap_or_default();
                if self.is_project_context {
                    handler.create_dir_label(&self.pathname, &label);
                } else {
                    handler.create_file_label(&self.pathname, &label);
                }
            }
            AddProject => handler.create_directory(&self.pathname),
            AddFile => {}
            DeleteProject => handler.delete_directory(&self.pathname),
            DeleteFile => handler.delete_file(&self.pathname),
            RecoverFile => handler.create_file(&self.pathname, self.data.as_deref().unwrap_or(&[]), None),
            RecoverProject => {
                for entry in &self.tree {
                    if entry.is_project {
                        handler.create_directory(&entry.pathname);
                    } else {
                        handler.create_file(&entry.pathname, entry.data.as_deref().unwrap_or(&[]), None);
                    }
                }
            }
            CreateFile => handler.create_file(&self.pathname, self.revision.revision_data.as_deref().unwrap_or(&[]), None),
            CreateProject => handler.create_directory(&self.pathname),
            DestroyProject => handler.delete_directory(&self.pathname),
            DestroyFile => handler.delete_file(&self.pathname),
            RenameProject => handler.rename_directory(self.rename_source(), &self.pathname),
            RenameFile => handler.rename_file(self.rename_source(), &self.pathname),
            MoveFrom => handler.rename_directory(
                self.other_pathname.as_deref().unwrap_or(&self.pathname),
                &self.pathname,
            ),
            MoveTo => handler.rename_directory(
                &self.pathname,
                self.other_pathname.as_deref().unwrap_or(&self.pathname),
            ),
            ShareFile => {
                if self.revision.unpinned_revision < 0 {
                    handler.create_file(
                        &self.pathname,
                        self.data.as_deref().unwrap_or(&[]),
                        self.other_pathname.as_deref(),
                    );
                } else {
                    handler.change_file(&self.pathname, self.data.as_deref().unwrap_or(&[]));
                }
            }
            BranchFile => {}
            CreateBranch | CheckinFile => {
                handler.change_file(&self.pathname, self.data.as_deref().unwrap_or(&[]));
            }
            CheckInProject | ArchiveVersionFile | RestoreVersionFile | ArchiveFile | ArchiveProject => {}
            RestoreFile => {}
            RestoreProject => handler.create_directory(&self.pathname),
        }
    }

    fn rename_source(&self) -> &str {
        self.other_pathname.as_deref().unwrap_or(&self.pathname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::RecordedCall;
    use crate::handler::test_support::RecordingHandler;
    use crate::revision::FullName;

    fn make_revision(action: VssRevisionAction) -> Revision {
        Revision {
            revision_num: 1,
            action,
            timestamp: 100,
            author: "alice".to_string(),
            comment: None,
            label: None,
            label_comment: None,
            full_name: None,
            old_full_name: None,
            physical_name: None,
            project_path: None,
            pinned_revision: 0,
            unpinned_revision: 0,
            project_idx: 0,
            source_full_name: None,
            branch_file: None,
            archive_path: None,
            was_deleted: false,
            delta_offset: 0,
            revision_data: None,
            item_index: None,
            old_item_index: None,
        }
    }

    #[test]
    fn create_file_action_accepts_dispatchable_code() {
        let action = create_file_action(make_revision(VssRevisionAction::CreateFile), "$/foo.txt".to_string());
        assert_eq!(action.emit_kind, EmitKind::Normal);
        assert!(action.errors.is_empty());
    }

    #[test]
    fn create_file_action_rejects_project_only_code() {
        let action = create_file_action(make_revision(VssRevisionAction::DeleteProject), "$/foo.txt".to_string());
        assert_eq!(action.emit_kind, EmitKind::Skip);
        assert_eq!(action.errors.len(), 1);
    }

    #[test]
    fn create_project_action_rejects_code_in_neither_dict() {
        let action = create_project_action(make_revision(VssRevisionAction::CheckInProject), "$/dir".to_string());
        assert_eq!(action.emit_kind, EmitKind::Skip);
        assert_eq!(action.errors.len(), 1);
    }

    #[test]
    fn skipped_action_emits_nothing() {
        let mut action = Action::new(make_revision(VssRevisionAction::CreateFile), "$/foo.txt".to_string(), false);
        action.skip();
        let mut handler = RecordingHandler::default();
        action.perform_revision_action(&mut handler);
        assert!(handler.calls.is_empty());
    }

    #[test]
    fn create_file_emits_create_file_with_revision_data() {
        let mut revision = make_revision(VssRevisionAction::CreateFile);
        revision.revision_data = Some(b"hello".to_vec());
        let action = Action::new(revision, "$/foo.txt".to_string(), false);
        let mut handler = RecordingHandler::default();
        action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![RecordedCall::CreateFile {
                path: "$/foo.txt".to_string(),
                data: b"hello".to_vec(),
                copy_from: None,
            }]
        );
    }

    #[test]
    fn label_dispatches_on_project_context() {
        let mut revision = make_revision(VssRevisionAction::Label);
        revision.label = Some("v1".to_string());

        let mut file_action = Action::new(revision.clone(), "$/foo.txt".to_string(), false);
        let mut handler = RecordingHandler::default();
        file_action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![RecordedCall::CreateFileLabel {
                path: "$/foo.txt".to_string(),
                label: "v1".to_string(),
            }]
        );

        let mut dir_action = Action::new(revision, "$/dir".to_string(), true);
        let mut handler = RecordingHandler::default();
        dir_action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![RecordedCall::CreateDirLabel {
                path: "$/dir".to_string(),
                label: "v1".to_string(),
            }]
        );
    }

    #[test]
    fn rename_file_falls_back_to_pathname_when_no_other_side() {
        let mut action = Action::new(make_revision(VssRevisionAction::RenameFile), "$/b.txt".to_string(), false);
        action.other_pathname = Some("$/a.txt".to_string());
        let mut handler = RecordingHandler::default();
        action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![RecordedCall::RenameFile {
                old_path: "$/a.txt".to_string(),
                new_path: "$/b.txt".to_string(),
            }]
        );
    }

    #[test]
    fn share_new_emits_create_file_with_copy_from() {
        let mut revision = make_revision(VssRevisionAction::ShareFile);
        revision.unpinned_revision = -1;
        let mut action = Action::new(revision, "$/pub/x".to_string(), false);
        action.data = Some(b"shared".to_vec());
        action.other_pathname = Some("$/src/x".to_string());
        let mut handler = RecordingHandler::default();
        action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![RecordedCall::CreateFile {
                path: "$/pub/x".to_string(),
                data: b"shared".to_vec(),
                copy_from: Some("$/src/x".to_string()),
            }]
        );
    }

    #[test]
    fn share_pin_transition_emits_change_file() {
        let mut revision = make_revision(VssRevisionAction::ShareFile);
        revision.unpinned_revision = 0;
        let mut action = Action::new(revision, "$/pub/x".to_string(), false);
        action.data = Some(b"pinned".to_vec());
        let mut handler = RecordingHandler::default();
        action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![RecordedCall::ChangeFile {
                path: "$/pub/x".to_string(),
                data: b"pinned".to_vec(),
            }]
        );
    }

    #[test]
    fn recover_project_replays_tree_depth_first() {
        let action = Action {
            tree: vec![
                RecoverEntry {
                    pathname: "$/dir".to_string(),
                    is_project: true,
                    data: None,
                },
                RecoverEntry {
                    pathname: "$/dir/a.txt".to_string(),
                    is_project: false,
                    data: Some(b"a".to_vec()),
                },
                RecoverEntry {
                    pathname: "$/dir/b.txt".to_string(),
                    is_project: false,
                    data: Some(b"b".to_vec()),
                },
            ],
            ..Action::new(make_revision(VssRevisionAction::RecoverProject), "$/dir".to_string(), true)
        };
        let mut handler = RecordingHandler::default();
        action.perform_revision_action(&mut handler);
        assert_eq!(
            handler.calls,
            vec![
                RecordedCall::CreateDirectory { path: "$/dir".to_string() },
                RecordedCall::CreateFile {
                    path: "$/dir/a.txt".to_string(),
                    data: b"a".to_vec(),
                    copy_from: None,
                },
                RecordedCall::CreateFile {
                    path: "$/dir/b.txt".to_string(),
                    data: b"b".to_vec(),
                    copy_from: None,
                },
            ]
        );
    }

    #[test]
    fn full_name_and_old_name_default_empty_when_absent() {
        let revision = make_revision(VssRevisionAction::CreateFile);
        assert_eq!(full_name(&revision), "");
        assert_eq!(old_name(&revision), "");
        let mut named = revision;
        named.full_name = Some(FullName {
            long_name: "foo.txt".to_string(),
            index_name: "foo.txt".to_string(),
            is_project: false,
        });
        assert_eq!(full_name(&named), "foo.txt");
    }
}

fn recover_directory(item: &NodeRef) -> Vec<RecoverEntry> {
    let mut out = vec![RecoverEntry {
        pathname: Node::make_full_path(item),
        is_project: item.borrow().is_project(),
        data: None,
    }];
    for child in Node::all_items(item) {
        if child.borrow().is_deleted() {
            continue;
        }
        if child.borrow().is_project() {
            out.extend(recover_directory(&child));
        } else {
            let data = crate::changeset_item::get_next_revision_data(&child);
            out.push(RecoverEntry {
                pathname: Node::make_full_path(&child),
                is_project: false,
                data,
            });
        }
    }
    out
}

/// Builds the action for a revision drawn from a File item's own chain,
/// validating the action code against the file-dispatchable set. An
/// unrecognized code (one only ever legal on a project's own chain, or not
/// legal anywhere) yields an `Action` recorded with an error and marked
/// [`EmitKind::Skip`] rather than a hard failure, since a single malformed
/// revision should not abort reconstruction of the rest of the repository.
pub fn create_file_action(revision: Revision, pathname: String) -> Action {
    let mut action = Action::new(revision, pathname, false);
    if !is_file_dispatchable(action.revision.action) {
        action.push_error(format!(
            "{}",
            ItemFileError::UnrecognizedRevAction {
                code: action.revision.action as u16,
                revision_num: action.revision.revision_num,
            }
        ));
        action.skip();
    }
    action
}

/// As [`create_file_action`], for a revision drawn from a Project item's own
/// chain, validated against the project-dispatchable set. `base_path` is the
/// owning directory's own path; every dispatchable action except `Label` and
/// `CreateProject` affects a named child of that directory, so its resolved
/// name is appended to form the action's `pathname` (mirrors `named_action`).
pub fn create_project_action(revision: Revision, base_path: String) -> Action {
    use VssRevisionAction::*;
    let dispatchable = is_project_dispatchable(revision.action);
    let pathname = if dispatchable && !matches!(revision.action, Label | CreateProject) {
        format!("{base_path}{}", full_name(&revision))
    } else {
        base_path
    };
    let mut action = Action::new(revision, pathname, true);
    if !dispatchable {
        action.push_error(format!(
            "{}",
            ItemFileError::UnrecognizedRevAction {
                code: action.revision.action as u16,
                revision_num: action.revision.revision_num,
            }
        ));
        action.skip();
    }
    action
}
