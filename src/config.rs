// Copyright 2022 The Jujutsu Authors
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

//! Repository configuration: parses `srcsafe.ini` and falls back to defaults
//! for anything it doesn't set.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;

/// Error that can occur when loading `srcsafe.ini`.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The file exists but could not be read.
    #[error("failed to read {0}")]
    Read(#[source] PathError),
}

/// A minimal `key = value` INI reader, tolerant of `;`-comments and blank
/// lines, matching the on-disk format VSS itself uses for `srcsafe.ini`.
#[derive(Debug, Default, Clone)]
struct SimpleIni {
    values: HashMap<String, String>,
}

impl SimpleIni {
    fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some(eq) = line.find('=') else {
                continue;
            };
            let key = line[..eq].trim();
            let value = line[eq + 1..].trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), value.to_string());
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Resolved configuration for a single VSS repository root.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory (relative to the repository root) holding sharded item and
    /// data files. Defaults to `data`.
    pub data_path: PathBuf,
}

impl DatabaseConfig {
    /// Loads configuration from `<root>/srcsafe.ini`, falling back to
    /// defaults if the file is absent.
    pub fn load(root: &Path) -> Result<Self, ConfigLoadError> {
        let ini_path = root.join("srcsafe.ini");
        let ini = match fs::read_to_string(&ini_path).context(&ini_path) {
            Ok(text) => SimpleIni::parse(&text),
            Err(e) if e.source.kind() == std::io::ErrorKind::NotFound => SimpleIni::default(),
            Err(e) => return Err(ConfigLoadError::Read(e)),
        };
        let data_path = ini.get("Data_Path").unwrap_or("data");
        Ok(Self {
            data_path: root.join(data_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_ini_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::load(dir.path()).unwrap();
        assert_eq!(config.data_path, dir.path().join("data"));
    }

    #[test]
    fn ini_overrides_data_path() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("srcsafe.ini"),
            "; comment\nData_Path = alt_data\n",
        )
        .unwrap();
        let config = DatabaseConfig::load(dir.path()).unwrap();
        assert_eq!(config.data_path, dir.path().join("alt_data"));
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        let ini = SimpleIni::parse("\n; a comment\n  \nData_Path=x\n");
        assert_eq!(ini.get("Data_Path"), Some("x"));
    }
}
