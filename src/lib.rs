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

//! Reconstructs linear changeset history from a Visual SourceSafe
//! repository.
//!
//! A VSS repository stores, per item, a reverse-linked chain of revision
//! records: the newest revision is on disk, and each record holds enough of
//! a delta (or a full snapshot) to derive the revision before it. This crate
//! walks those chains from a project's root, in reverse, turning the raw
//! per-item history back into the forward sequence of file and directory
//! operations that produced it, grouped into [`history::Changeset`]s the way
//! a VSS client's own history view groups them: by `(timestamp, author)`.
//!
//! The pipeline, bottom-up:
//!
//! - [`reader`] / [`record`]: bounded, checksum-validated parsing of the
//!   fixed-size records that make up every `.dat` file.
//! - [`name_file`]: resolves a short name to its long-form or project-form
//!   spelling via the shared `names.dat`.
//! - [`revision_record`] / [`item_file`]: the per-item-file revision chain
//!   and the project/file header records wrapping it.
//! - [`revision`]: a decoded, self-contained [`revision::Revision`] for one
//!   step of an item's history, independent of the raw record layout.
//! - [`database`]: the repository handle — config, name file, decoder and
//!   an item-file cache keyed by physical name.
//! - [`tree_state`]: the live, in-memory project tree a changeset walk
//!   reconstructs as it goes, plus the structural mutations
//!   ([`tree_state::insert_new_item`], `remove_item_by_index`, ...) applying
//!   a reversed revision needs.
//! - [`changeset_item`]: per-item revision cursors and the pending-item
//!   queue that lets a directory's history interleave with its children's.
//! - [`action`]: one reversed revision turned into an [`action::Action`],
//!   with the bookkeeping (`apply_to_item_backwards`) and forward replay
//!   (`perform_revision_action`) that action needs.
//! - [`history`]: groups the flat action stream into
//!   [`history::Changeset`]s and replays them through a
//!   [`handler::RevisionActionHandler`].
//!
//! Single-threaded by design: the reconstruction walk mutates a shared tree
//! of reference-counted nodes ([`tree_state::NodeRef`]) in place, the way a
//! single VSS client session would.

pub mod action;
pub mod changeset_item;
pub mod config;
pub mod database;
pub mod error;
pub mod file_util;
pub mod handler;
pub mod history;
pub mod item_file;
pub mod name_file;
pub mod reader;
pub mod record;
pub mod revision;
pub mod revision_record;
pub mod tree_state;

pub use action::Action;
pub use database::Database;
pub use error::VssError;
pub use handler::RevisionActionHandler;
pub use history::Changeset;
pub use history::ChangesetHistory;

/// Opens the repository at `base_path` and reconstructs its full changeset
/// history in one call: the common case for a caller that just wants the
/// result, not the intermediate [`Database`] handle.
pub fn reconstruct_history(
    base_path: impl Into<std::path::PathBuf>,
    decode: Box<dyn Fn(&[u8]) -> String>,
) -> Result<ChangesetHistory, VssError> {
    let database = Database::open(base_path, decode)?;
    ChangesetHistory::build(&database)
}
