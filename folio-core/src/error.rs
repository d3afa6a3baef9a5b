use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no such file: {path:?}")]
    NotFound { path: PathBuf },
    #[error("failed to open {path:?}: {source}")]
    Backend {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {page} out of range ({count} pages)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("failed to rasterize page {page}: {source}")]
    Backend {
        page: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write session record {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode session record: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}
