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

//! The repository handle: configuration, the shared name file, an
//! encoding-agnostic decoder, and the item-file cache that turns physical
//! names into fully reconstructed [`FileItemFile`]/[`ProjectItemFile`]
//! instances.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::ItemFileError;
use crate::error::VssError;
use crate::file_util::IoResultExt as _;
use crate::item_file::FileHeaderRecord;
use crate::item_file::FileItemFile;
use crate::item_file::ItemsArray;
use crate::item_file::ProjectItemFile;
use crate::item_file::RawItemFile;
use crate::name_file::NameFile;
use crate::name_file::NameKind;
use crate::reader::RawName;
use crate::revision::Revision;
use crate::revision_record::RawRevisionRecord;
use crate::revision_record::VssRevisionAction;

/// Physical name of the implicit top-level project every repository has.
pub const ROOT_PROJECT_PHYSICAL: &str = "AAAAAAAA";
/// Display name of the root project.
pub const ROOT_PROJECT_NAME: &str = "$";

/// One slot in the item-file cache. `Loading` marks a physical name whose
/// load is in progress higher up the call stack, so a reentrant request
/// (a branch parent cycle) can be told apart from "not yet requested".
enum CacheSlot {
    Loading,
    File(Rc<FileItemFile>),
    Project(Rc<ProjectItemFile>),
}

fn ascii_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// A repository handle: the base path, the loaded `srcsafe.ini` config, the
/// shared name file, an injected byte-to-string decoder, and the item-file
/// cache.
///
/// Single-threaded by design (see the crate's concurrency notes): the cache
/// is a `RefCell`, not a `Mutex`, so the type system documents the
/// non-reentrant-across-threads contract instead of only asserting it.
pub struct Database {
    #[allow(dead_code)]
    base_path: PathBuf,
    data_path: PathBuf,
    decode: Box<dyn Fn(&[u8]) -> String>,
    name_file: NameFile,
    cache: RefCell<HashMap<String, CacheSlot>>,
}

impl Database {
    /// Opens a repository rooted at `base_path`, loading `srcsafe.ini` and
    /// `names.dat`. `decode` turns raw on-disk bytes (author names, comments,
    /// long names) into `String`s under whatever encoding the repository was
    /// written in.
    pub fn open(base_path: impl Into<PathBuf>, decode: Box<dyn Fn(&[u8]) -> String>) -> Result<Self, VssError> {
        let base_path = base_path.into();
        tracing::debug!(base_path = %base_path.display(), "opening VSS database");
        let config = DatabaseConfig::load(&base_path)?;
        let names_path = config.data_path.join("names.dat");
        let names_buf: Arc<[u8]> = Arc::from(fs::read(&names_path).context(&names_path)?);
        let name_file = NameFile::parse(names_buf).map_err(|source| VssError::item_file("names.dat", source))?;
        tracing::debug!(data_path = %config.data_path.display(), "database opened");
        Ok(Self {
            base_path,
            data_path: config.data_path,
            decode,
            name_file,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Returns the injected decoder, for callers building their own
    /// [`Revision`](crate::revision::Revision) values outside the normal
    /// item-file build path.
    pub fn decoder(&self) -> &dyn Fn(&[u8]) -> String {
        self.decode.as_ref()
    }

    /// Resolves a [`RawName`] to its long-form (or project-form) spelling via
    /// the shared name file, falling back to the short name when there is no
    /// entry (`name_file_offset == 0`) or the name file lacks the expected
    /// alias kind.
    pub fn resolve_name(&self, name: &RawName) -> String {
        if name.name_file_offset == 0 {
            return (self.decode)(&name.short_name);
        }
        match self.name_file.get_name_record(name.name_file_offset) {
            Some(record) => {
                let kind = if name.is_project() { NameKind::Project } else { NameKind::Long };
                (self.decode)(record.get(kind, &name.short_name))
            }
            None => (self.decode)(&name.short_name),
        }
    }

    fn sharded_path(&self, physical_name: &str) -> PathBuf {
        let first = &physical_name[..physical_name.len().min(1)];
        self.data_path.join(first).join(physical_name)
    }

    /// Reads a sharded file (item file or sibling data file) by physical
    /// name. A missing file is reported as [`ItemFileError::VssFileNotFound`],
    /// which callers above the database layer treat as "this item is
    /// orphaned" rather than a fatal error.
    fn read_sharded(&self, physical_name: &str) -> Result<Arc<[u8]>, ItemFileError> {
        let path = self.sharded_path(physical_name);
        let bytes = fs::read(&path)
            .context(&path)
            .map_err(|source| ItemFileError::VssFileNotFound {
                path: path.clone(),
                source,
            })?;
        Ok(Arc::from(bytes))
    }

    /// Reads a project's sibling entry-data file (physical name plus the
    /// extension declared in its header), for callers outside this module
    /// reconstructing the live tree.
    pub(crate) fn read_item_sibling(&self, physical_name: &str, ext: &str) -> Result<Arc<[u8]>, ItemFileError> {
        self.read_sharded(&format!("{physical_name}{ext}"))
    }

    fn read_comment(&self, raw: &RawItemFile, record: &RawRevisionRecord) -> Result<Option<String>, ItemFileError> {
        if record.comment_offset > 0 && record.comment_length > 0 {
            Ok(Some(raw.read_comment_at(record.comment_offset as usize, self.decoder())?))
        } else {
            Ok(None)
        }
    }

    fn read_label_comment(&self, raw: &RawItemFile, record: &RawRevisionRecord) -> Result<Option<String>, ItemFileError> {
        if record.label_comment_offset > 0 && record.label_comment_length > 0 {
            Ok(Some(raw.read_comment_at(record.label_comment_offset as usize, self.decoder())?))
        } else {
            Ok(None)
        }
    }

    /// Opens the root project, recursively loading its whole subtree on
    /// demand as children are visited.
    pub fn open_root_project(&self) -> Result<Rc<ProjectItemFile>, VssError> {
        self.open_project_item(ROOT_PROJECT_PHYSICAL)
    }

    /// Opens (or returns the cached) File item for `physical_name`.
    pub fn open_file_item(&self, physical_name: &str) -> Result<Rc<FileItemFile>, VssError> {
        if let Some(slot) = self.cache.borrow().get(physical_name) {
            match slot {
                CacheSlot::Loading => {
                    tracing::warn!(physical_name, "branch-parent cycle detected");
                    return Err(VssError::CyclicBranchParent {
                        physical_name: physical_name.to_string(),
                    });
                }
                CacheSlot::File(item) => return Ok(item.clone()),
                CacheSlot::Project(_) => {
                    return Err(VssError::item_file(
                        physical_name,
                        ItemFileError::BadHeader {
                            path: self.sharded_path(physical_name),
                            reason: "expected a file item, found a project item".to_string(),
                        },
                    ));
                }
            }
        }
        tracing::debug!(physical_name, "loading file item");
        self.cache.borrow_mut().insert(physical_name.to_string(), CacheSlot::Loading);
        match self.build_file_item(physical_name) {
            Ok(item) => {
                let rc = Rc::new(item);
                self.cache
                    .borrow_mut()
                    .insert(physical_name.to_string(), CacheSlot::File(rc.clone()));
                Ok(rc)
            }
            Err(source) => {
                self.cache.borrow_mut().remove(physical_name);
                Err(VssError::item_file(physical_name, source))
            }
        }
    }

    /// Opens (or returns the cached) Project item for `physical_name`.
    pub fn open_project_item(&self, physical_name: &str) -> Result<Rc<ProjectItemFile>, VssError> {
        if let Some(slot) = self.cache.borrow().get(physical_name) {
            match slot {
                CacheSlot::Loading => {
                    tracing::warn!(physical_name, "branch-parent cycle detected");
                    return Err(VssError::CyclicBranchParent {
                        physical_name: physical_name.to_string(),
                    });
                }
                CacheSlot::Project(item) => return Ok(item.clone()),
                CacheSlot::File(_) => {
                    return Err(VssError::item_file(
                        physical_name,
                        ItemFileError::BadHeader {
                            path: self.sharded_path(physical_name),
                            reason: "expected a project item, found a file item".to_string(),
                        },
                    ));
                }
            }
        }
        tracing::debug!(physical_name, "loading project item");
        self.cache.borrow_mut().insert(physical_name.to_string(), CacheSlot::Loading);
        match self.build_project_item(physical_name) {
            Ok(item) => {
                let rc = Rc::new(item);
                self.cache
                    .borrow_mut()
                    .insert(physical_name.to_string(), CacheSlot::Project(rc.clone()));
                Ok(rc)
            }
            Err(source) => {
                self.cache.borrow_mut().remove(physical_name);
                Err(VssError::item_file(physical_name, source))
            }
        }
    }

    /// Resolves a branch parent by physical name. A cycle (the parent is
    /// itself still loading) resolves to `None` rather than an error:
    /// revisions below `first_revision` then simply fail to resolve.
    fn resolve_branch_parent(&self, physical_name: &str) -> Result<Option<Rc<FileItemFile>>, ItemFileError> {
        match self.open_file_item(physical_name) {
            Ok(item) => Ok(Some(item)),
            Err(VssError::CyclicBranchParent { .. }) => Ok(None),
            Err(VssError::ItemFile { source, .. }) => Err(source),
            Err(VssError::Path(e)) => Err(ItemFileError::Path(e)),
            Err(VssError::Config(_)) => unreachable!("config is only loaded once, at Database::open"),
        }
    }

    fn build_file_item(&self, physical_name: &str) -> Result<FileItemFile, ItemFileError> {
        let path = self.sharded_path(physical_name);
        let buf = self.read_sharded(physical_name)?;
        let raw = RawItemFile::new(buf);
        let (file_header, header) = raw.read_file_header(&path)?;
        if file_header.file_type != crate::item_file::ItemFileKind::File {
            return Err(ItemFileError::BadHeader {
                path,
                reason: "file-variant header declared a non-file item type".to_string(),
            });
        }

        let ext = ascii_string(trim_nul(&header.common.data_ext));
        let data_physical = format!("{physical_name}{ext}");
        let data = self.read_sharded(&data_physical)?;

        let branch_parent = if !header.branch_file.is_empty() {
            self.resolve_branch_parent(&ascii_string(&header.branch_file))?
        } else {
            None
        };

        let revisions = self.build_file_revisions(&raw, &header, data.to_vec())?;

        Ok(FileItemFile {
            physical_name: physical_name.to_string(),
            first_revision: header.common.first_revision,
            header,
            revisions,
            branch_parent,
        })
    }

    /// Walks a file item's revision chain from last to first via
    /// `prev_rev_offset`, reconstructing each revision's payload by applying
    /// checkin deltas in reverse. Mirrors the VSS reference implementation's
    /// `build_revisions`, including its "first revision recorded empty,
    /// promote the second revision's data" special case.
    fn build_file_revisions(
        &self,
        raw: &RawItemFile,
        header: &FileHeaderRecord,
        data: Vec<u8>,
    ) -> Result<Vec<Revision>, ItemFileError> {
        let first_revision = header.common.first_revision;
        let num_revisions = header.common.num_revisions;
        let count = (num_revisions - first_revision + 1) as usize;
        let mut slots: Vec<Option<Revision>> = (0..count).map(|_| None).collect();

        let mut data = data;
        let mut prev_data = data.clone();
        let mut offset = header.common.last_revision_offset;
        while offset > 0 {
            let raw_rev = raw.read_revision_at(offset as usize)?;
            let comment = self.read_comment(raw, &raw_rev)?;
            let label_comment = self.read_label_comment(raw, &raw_rev)?;
            let mut revision = Revision::from_raw(&raw_rev, self, comment, label_comment);

            if revision.revision_num == 1 && data.is_empty() {
                data = prev_data.clone();
            } else if raw_rev.action == VssRevisionAction::CheckinFile {
                prev_data = data.clone();
            }

            revision.revision_data = Some(data.clone());
            if raw_rev.action == VssRevisionAction::CheckinFile && raw_rev.extra.delta_offset > 0 {
                let delta = raw.read_delta_at(raw_rev.extra.delta_offset as usize)?;
                data = delta.apply_delta(&data);
            }

            let idx = (revision.revision_num - first_revision) as usize;
            slots[idx] = Some(revision);
            offset = raw_rev.prev_rev_offset;
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn build_project_item(&self, physical_name: &str) -> Result<ProjectItemFile, ItemFileError> {
        let path = self.sharded_path(physical_name);
        let buf = self.read_sharded(physical_name)?;
        let raw = RawItemFile::new(buf);
        let (file_header, header) = raw.read_project_header(&path)?;
        if file_header.file_type != crate::item_file::ItemFileKind::Project {
            return Err(ItemFileError::BadHeader {
                path,
                reason: "project-variant header declared a non-project item type".to_string(),
            });
        }

        let num_revisions = header.common.num_revisions as usize;
        let mut slots: Vec<Option<Revision>> = (0..num_revisions).map(|_| None).collect();
        let mut offset = header.common.last_revision_offset;
        while offset > 0 {
            let raw_rev = raw.read_revision_at(offset as usize)?;
            let comment = self.read_comment(&raw, &raw_rev)?;
            let label_comment = self.read_label_comment(&raw, &raw_rev)?;
            let revision = Revision::from_raw(&raw_rev, self, comment, label_comment);
            let idx = (revision.revision_num - 1) as usize;
            slots[idx] = Some(revision);
            offset = raw_rev.prev_rev_offset;
        }
        let mut revisions: Vec<Revision> = slots.into_iter().flatten().collect();

        let mut items_array = ItemsArray::new();
        for revision in &mut revisions {
            revision.apply_to_project_items(&mut items_array, physical_name);
        }

        Ok(ProjectItemFile {
            physical_name: physical_name.to_string(),
            header,
            revisions,
            items_array,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn make_repo(dir: &Path) {
        fs::create_dir_all(dir.join("data")).unwrap();
        // A minimal valid names.dat: header (HN) with eof_offset 0, no entries.
        let mut names = Vec::new();
        // length, signature, crc placeholder, then payload (4 filler u32s + eof_offset)
        let payload_len = 20u32;
        names.extend_from_slice(&payload_len.to_le_bytes());
        names.extend_from_slice(b"HN");
        let crc_offset = names.len();
        names.extend_from_slice(&0u16.to_le_bytes());
        let payload_start = names.len();
        names.extend_from_slice(&[0u8; 16]);
        names.extend_from_slice(&0i32.to_le_bytes());
        let crc = crate::reader::crc16(&names[payload_start..]);
        names[crc_offset..crc_offset + 2].copy_from_slice(&crc.to_le_bytes());
        fs::write(dir.join("data/names.dat"), names).unwrap();
    }

    #[test]
    fn open_loads_empty_name_file() {
        let dir = TempDir::new().unwrap();
        make_repo(dir.path());
        let db = Database::open(dir.path(), Box::new(|b: &[u8]| String::from_utf8_lossy(b).into_owned())).unwrap();
        let name = RawName {
            flags: 0,
            short_name: b"foo.txt".to_vec(),
            name_file_offset: 0,
        };
        assert_eq!(db.resolve_name(&name), "foo.txt");
    }

    #[test]
    fn sharded_path_uses_first_letter_subdirectory() {
        let dir = TempDir::new().unwrap();
        make_repo(dir.path());
        let db = Database::open(dir.path(), Box::new(|b: &[u8]| String::from_utf8_lossy(b).into_owned())).unwrap();
        let path = db.sharded_path("AAAAAAAA");
        assert_eq!(path, dir.path().join("data").join("A").join("AAAAAAAA"));
    }

    #[test]
    fn missing_item_file_reports_not_found() {
        let dir = TempDir::new().unwrap();
        make_repo(dir.path());
        let db = Database::open(dir.path(), Box::new(|b: &[u8]| String::from_utf8_lossy(b).into_owned())).unwrap();
        let err = db.open_project_item("AAAAAAAA").unwrap_err();
        assert!(matches!(
            err,
            VssError::ItemFile {
                source: ItemFileError::VssFileNotFound { .. },
                ..
            }
        ));
    }
}
