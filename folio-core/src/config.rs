use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Viewer settings read from the per-user config file. Every field has a
/// default, so a partial file is valid; a missing or malformed file falls
/// back to the defaults without failing startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Zoom assigned to newly opened documents.
    pub default_zoom: f32,
    /// Additive step applied per zoom-in/zoom-out command.
    pub zoom_step: f32,
    /// Fraction of the page height moved per scroll command.
    pub scroll_step: f32,
    /// Reopen the last viewed document when no files are given.
    pub restore_last_session: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_zoom: 0.8,
            zoom_step: 0.1,
            scroll_step: 0.25,
            restore_last_session: true,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "failed to read config; using defaults");
                }
                return Self::default();
            }
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed config; using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();

        let config = ViewerConfig::load(&dir.path().join("folio.toml"));

        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "default_zoom = 1.5\nrestore_last_session = false\n").unwrap();

        let config = ViewerConfig::load(&path);

        assert_eq!(config.default_zoom, 1.5);
        assert!(!config.restore_last_session);
        assert_eq!(config.zoom_step, 0.1);
        assert_eq!(config.scroll_step, 0.25);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "default_zoom = [oops\n").unwrap();

        let config = ViewerConfig::load(&path);

        assert_eq!(config, ViewerConfig::default());
    }
}
