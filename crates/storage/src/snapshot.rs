// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON snapshot files
//!
//! Each snapshot is one pretty-printed JSON file under the base directory.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error in {name}: {source}")]
    Json {
        name: String,
        source: serde_json::Error,
    },
}

/// Directory of named JSON snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    base_path: PathBuf,
}

impl SnapshotStore {
    /// Open a store at the given directory, creating it if needed
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Write `data` as snapshot `name`, replacing any previous one
    pub fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<(), SnapshotError> {
        let path = self.path_for(name);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(data).map_err(|source| SnapshotError::Json {
            name: name.to_string(),
            source,
        })?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(snapshot = name, path = %path.display(), "snapshot written");
        Ok(())
    }

    /// Read snapshot `name`; `None` when it was never written
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SnapshotError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let value = serde_json::from_str(&json).map_err(|source| SnapshotError::Json {
            name: name.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    pub fn delete(&self, name: &str) -> Result<(), SnapshotError> {
        let path = self.path_for(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.json"))
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
