use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PersistError;

/// The single record that survives shutdown: the active session's file,
/// page and zoom. Scroll position and tabs are deliberately not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSessionRecord {
    pub path: PathBuf,
    pub page_index: usize,
    pub zoom: f32,
}

/// Stores the last-session record as one JSON file, replaced wholesale on
/// every save via a temp-file rename.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, record: &LastSessionRecord) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload =
            serde_json::to_string_pretty(record).map_err(|source| PersistError::Encode { source })?;
        let tmp = self.path.with_extension("json.tmp");
        let write_err = |source| PersistError::Write {
            path: tmp.clone(),
            source,
        };
        let mut file = File::create(&tmp).map_err(write_err)?;
        file.write_all(payload.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(|source| PersistError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "saved session record");
        Ok(())
    }

    /// A missing store, an unreadable or malformed record, and a record whose
    /// file no longer exists all restore nothing.
    pub fn load(&self) -> Option<LastSessionRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "failed to read session record");
                }
                return None;
            }
        };
        let record: LastSessionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "malformed session record; ignoring");
                return None;
            }
        };
        if !record.path.exists() {
            debug!(path = %record.path.display(), "recorded file no longer exists");
            return None;
        }
        Some(record)
    }

    pub fn clear(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to clear session record");
            }
        }
    }
}
