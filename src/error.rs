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

//! Error types for the binary record layer, the item-file layer, and the
//! database/changeset layer, one enum per subsystem boundary.

use std::path::PathBuf;

use thiserror::Error;

use crate::file_util::PathError;

/// Errors raised while reading or interpreting a single binary record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A read would have consumed bytes past the end of the buffer.
    #[error("unexpected end of buffer reading {what} at offset {offset}")]
    EndOfBuffer {
        /// What was being read when the buffer ran out.
        what: &'static str,
        /// Offset at which the read was attempted.
        offset: usize,
    },
    /// A 16- or 32-bit read was attempted at a misaligned offset.
    #[error("unaligned read of {width} bytes at offset {offset}")]
    UnalignedRead {
        /// Width in bytes of the read (2 or 4).
        width: usize,
        /// Offset at which the read was attempted.
        offset: usize,
    },
    /// A record header claimed a length that runs past the file end.
    #[error("record truncated at offset {offset}")]
    RecordTruncated {
        /// Offset of the record header.
        offset: usize,
    },
    /// The CRC-16 recorded in the header does not match the computed value.
    #[error("CRC mismatch for record at offset {offset}: stored {stored:#06x}, computed {computed:#06x}")]
    RecordCrcMismatch {
        /// Offset of the record header.
        offset: usize,
        /// CRC stored on disk.
        stored: u16,
        /// CRC computed from the payload.
        computed: u16,
    },
    /// No record was found at the requested offset.
    #[error("no record at offset {offset}")]
    RecordNotFound {
        /// Offset that was probed.
        offset: usize,
    },
    /// The record's signature does not match any known record kind.
    #[error("unrecognized record signature {signature:?} at offset {offset}")]
    UnrecognizedRecord {
        /// The two-byte signature read from the file.
        signature: [u8; 2],
        /// Offset of the record header.
        offset: usize,
    },
    /// A record at a known offset was re-requested as the wrong kind.
    #[error("record at offset {offset} is {actual:?}, not the expected {expected:?}")]
    RecordClassMismatch {
        /// Offset of the record header.
        offset: usize,
        /// Signature actually stored on disk.
        actual: [u8; 2],
        /// Signature the caller expected.
        expected: [u8; 2],
    },
}

/// Errors raised while constructing an [`crate::item_file::ItemFile`].
#[derive(Debug, Error)]
pub enum ItemFileError {
    /// The 52-byte file header had a bad signature or an unsupported version.
    #[error("bad item file header in {path}: {reason}")]
    BadHeader {
        /// Path of the offending file.
        path: PathBuf,
        /// Human-readable description of the mismatch.
        reason: String,
    },
    /// The data file or item file referenced on disk could not be opened.
    #[error("data file not found: {path}")]
    VssFileNotFound {
        /// Path that was not found.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: PathError,
    },
    /// A revision record carried an action code with no known handler.
    #[error("unrecognized revision action code {code} at revision {revision_num}")]
    UnrecognizedRevAction {
        /// Raw action code read from disk.
        code: u16,
        /// Revision number the action belonged to.
        revision_num: u16,
    },
    /// A revision number fell outside `[1, num_revisions]`.
    #[error("revision {requested} out of range [1, {num_revisions}]")]
    ArgumentOutOfRange {
        /// Revision number requested.
        requested: i64,
        /// Highest valid revision number.
        num_revisions: u16,
    },
    /// A lower-level record error propagated up while building an item file.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// Plain I/O failure opening or reading the item file itself.
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Top-level error returned by the database and changeset-history API.
#[derive(Debug, Error)]
pub enum VssError {
    /// Failure loading or parsing an item file.
    #[error("failed to process item file for physical name {physical_name}")]
    ItemFile {
        /// Physical name of the offending item.
        physical_name: String,
        /// Underlying cause.
        #[source]
        source: ItemFileError,
    },
    /// The `srcsafe.ini` configuration file could not be read or parsed.
    #[error("failed to load repository configuration")]
    Config(#[from] crate::config::ConfigLoadError),
    /// A branch-parent cycle was detected while opening an item file.
    #[error("cyclic branch parent detected while opening {physical_name}")]
    CyclicBranchParent {
        /// Physical name whose load triggered the cycle.
        physical_name: String,
    },
    /// Generic I/O failure with path context.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl VssError {
    /// Wraps an [`ItemFileError`] with the physical name that was being
    /// processed when it occurred.
    pub fn item_file(physical_name: impl Into<String>, source: ItemFileError) -> Self {
        Self::ItemFile {
            physical_name: physical_name.into(),
            source,
        }
    }
}
