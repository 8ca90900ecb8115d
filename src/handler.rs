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

//! The sink [`Action::perform_revision_action`](crate::action::Action::perform_revision_action)
//! replays into. One implementation can write a working copy to disk, feed a
//! Git import, or (as in the test suite) just record calls for assertions.

/// Everything an [`Action`](crate::action::Action) can ask to have done to
/// reconstruct one step of forward history. Mirrors the call vocabulary used
/// across `vss_action.py`'s `perform_revision_action` overrides: create,
/// change, delete and rename a file; create, delete and rename a directory;
/// and label either one.
pub trait RevisionActionHandler {
    /// Creates a new file at `path` with `data`. `copy_from`, when set, names
    /// the path of a sibling file this one was shared from (the handler may
    /// use it to record history, or ignore it and just write `data`).
    fn create_file(&mut self, path: &str, data: &[u8], copy_from: Option<&str>);

    /// Overwrites the content of the file at `path` with `data`.
    fn change_file(&mut self, path: &str, data: &[u8]);

    /// Removes the file at `path`.
    fn delete_file(&mut self, path: &str);

    /// Moves the file at `old_path` to `new_path`.
    fn rename_file(&mut self, old_path: &str, new_path: &str);

    /// Creates a new (empty) directory at `path`.
    fn create_directory(&mut self, path: &str);

    /// Removes the directory at `path`.
    fn delete_directory(&mut self, path: &str);

    /// Moves the directory at `old_path` to `new_path`.
    fn rename_directory(&mut self, old_path: &str, new_path: &str);

    /// Records a VSS label applied to the file at `path`.
    fn create_file_label(&mut self, path: &str, label: &str);

    /// Records a VSS label applied to the directory at `path`.
    fn create_dir_label(&mut self, path: &str, label: &str);
}

#[cfg(test)]
pub mod test_support {
    use super::RevisionActionHandler;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RecordedCall {
        CreateFile {
            path: String,
            data: Vec<u8>,
            copy_from: Option<String>,
        },
        ChangeFile {
            path: String,
            data: Vec<u8>,
        },
        DeleteFile {
            path: String,
        },
        RenameFile {
            old_path: String,
            new_path: String,
        },
        CreateDirectory {
            path: String,
        },
        DeleteDirectory {
            path: String,
        },
        RenameDirectory {
            old_path: String,
            new_path: String,
        },
        CreateFileLabel {
            path: String,
            label: String,
        },
        CreateDirLabel {
            path: String,
            label: String,
        },
    }

    /// Records every call it receives, in order, for assertion in tests.
    #[derive(Debug, Default)]
    pub struct RecordingHandler {
        pub calls: Vec<RecordedCall>,
    }

    impl RevisionActionHandler for RecordingHandler {
        fn create_file(&mut self, path: &str, data: &[u8], copy_from: Option<&str>) {
            self.calls.push(RecordedCall::CreateFile {
                path: path.to_string(),
                data: data.to_vec(),
                copy_from: copy_from.map(str::to_string),
            });
        }

        fn change_file(&mut self, path: &str, data: &[u8]) {
            self.calls.push(RecordedCall::ChangeFile {
                path: path.to_string(),
                data: data.to_vec(),
            });
        }

        fn delete_file(&mut self, path: &str) {
            self.calls.push(RecordedCall::DeleteFile { path: path.to_string() });
        }

        fn rename_file(&mut self, old_path: &str, new_path: &str) {
            self.calls.push(RecordedCall::RenameFile {
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
            });
        }

        fn create_directory(&mut self, path: &str) {
            self.calls.push(RecordedCall::CreateDirectory { path: path.to_string() });
        }

        fn delete_directory(&mut self, path: &str) {
            self.calls.push(RecordedCall::DeleteDirectory { path: path.to_string() });
        }

        fn rename_directory(&mut self, old_path: &str, new_path: &str) {
            self.calls.push(RecordedCall::RenameDirectory {
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
            });
        }

        fn create_file_label(&mut self, path: &str, label: &str) {
            self.calls.push(RecordedCall::CreateFileLabel {
                path: path.to_string(),
                label: label.to_string(),
            });
        }

        fn create_dir_label(&mut self, path: &str, label: &str) {
            self.calls.push(RecordedCall::CreateDirLabel {
                path: path.to_string(),
                label: label.to_string(),
            });
        }
    }
}
