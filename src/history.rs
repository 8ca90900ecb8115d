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

//! Groups the flat, per-revision [`Action`] stream the changeset-cursor
//! layer produces into [`Changeset`]s: VSS has no first-class "commit", so a
//! changeset here is every action sharing the same timestamp and author,
//! exactly as a VSS client's own history view groups them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::action::Action;
use crate::database::Database;
use crate::tree_state;

static CARRIAGE_RETURNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r+\n|\r+").unwrap());
static TRIPLE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n\n+").unwrap());

fn normalize_comment(comment: &str) -> String {
    let trimmed = comment.trim();
    let lf_only = CARRIAGE_RETURNS.replace_all(trimmed, "\n");
    TRIPLE_NEWLINES.replace_all(&lf_only, "\n\n").into_owned()
}

/// One group of actions sharing a timestamp and author: VSS's closest
/// equivalent to a commit.
#[derive(Debug, Default)]
pub struct Changeset {
    pub timestamp: u32,
    pub author: String,
    pub comments: Vec<String>,
    pub actions: Vec<Action>,
}

impl Changeset {
    fn new(timestamp: u32, author: String) -> Self {
        Self {
            timestamp,
            author,
            comments: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Folds `action` in, normalizing and de-duplicating its revision's
    /// comment and label comment, and keeping the action list in the same
    /// relative order the actions were originally pulled in.
    fn append(&mut self, action: Action) {
        for comment in [action.revision.comment.as_deref(), action.revision.label_comment.as_deref()] {
            let Some(comment) = comment.filter(|c| !c.is_empty()) else {
                continue;
            };
            let normalized = normalize_comment(comment);
            if !normalized.is_empty() && !self.comments.contains(&normalized) {
                self.comments.push(normalized);
            }
        }
        self.actions.insert(0, action);
    }

    /// The changeset's comments joined the way a VSS client would display
    /// them: each distinct comment on its own paragraph.
    pub fn message(&self) -> String {
        self.comments.join("\n\n")
    }

    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::TimeZone;
        match chrono::Utc.timestamp_opt(self.timestamp as i64, 0) {
            chrono::LocalResult::Single(dt) => Some(dt),
            chrono::LocalResult::Ambiguous(dt, _) => Some(dt),
            chrono::LocalResult::None => None,
        }
    }
}

/// The reconstructed, ordered list of changesets for an entire repository.
#[derive(Debug, Default)]
pub struct ChangesetHistory {
    changesets: Vec<Changeset>,
}

impl ChangesetHistory {
    /// Opens the repository's root project, drains its entire backward
    /// history into a flat action list, then sorts and groups it into
    /// changesets by `(timestamp, author)`.
    pub fn build(database: &Database) -> Result<Self, crate::error::VssError> {
        let root = tree_state::open_project_tree(database)?;
        crate::changeset_item::init_cursors(&root);

        let mut actions = Vec::new();
        while crate::changeset_item::next_revision_timestamp(&root).is_some() {
            if let Some(action) = crate::changeset_item::get_next_revision_action(database, &root, "") {
                actions.push(action);
            } else {
                break;
            }
        }

        // Stable: actions sharing a (timestamp, author) key keep their
        // original (backward-pull) relative order.
        actions.sort_by(|a, b| {
            (a.revision.timestamp, &a.revision.author).cmp(&(b.revision.timestamp, &b.revision.author))
        });

        let mut changesets: Vec<Changeset> = Vec::new();
        for action in actions {
            let timestamp = action.revision.timestamp;
            let author = action.revision.author.clone();
            let needs_new = match changesets.last() {
                Some(c) => c.timestamp != timestamp || c.author != author,
                None => true,
            };
            if needs_new {
                changesets.push(Changeset::new(timestamp, author));
            }
            changesets.last_mut().unwrap().append(action);
        }

        let action_count: usize = changesets.iter().map(|c| c.actions.len()).sum();
        tracing::info!(
            changesets = changesets.len(),
            actions = action_count,
            "changeset history built"
        );

        Ok(Self { changesets })
    }

    pub fn changesets(&self) -> &[Changeset] {
        &self.changesets
    }

    /// Replays every changeset's actions, in order, through `handler`.
    pub fn replay(&self, handler: &mut dyn crate::handler::RevisionActionHandler) {
        for changeset in &self.changesets {
            for action in &changeset.actions {
                action.perform_revision_action(handler);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_comment_collapses_runs_and_trims() {
        assert_eq!(normalize_comment("  hello  \r\n\r\nworld  "), "hello\n\nworld");
        assert_eq!(normalize_comment("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(normalize_comment("\r\r\rplain"), "\nplain");
    }

    #[test]
    fn normalize_comment_is_idempotent_on_already_clean_text() {
        assert_eq!(normalize_comment("one line"), "one line");
    }
}
