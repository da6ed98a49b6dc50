use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the update client.
/// Every module returns `Result<T, UpdateError>`.
#[derive(Debug, Error)]
pub enum UpdateError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Setup (fatal) ───────────────────────────────────
    #[error("Can not load the native update module. Please check the setup document.")]
    NativeModuleMissing,

    #[error("Platform setup mismatch: {0}")]
    PlatformSetup(String),

    #[error("Update APIs can only run in a release build")]
    DebugBuild,

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Native layer ────────────────────────────────────
    #[error("Native module error: {0}")]
    Native(String),

    #[error("Operation not supported by this native module: {0}")]
    Unsupported(&'static str),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type UpdateResult<T> = Result<T, UpdateError>;

impl UpdateError {
    /// Setup-time violations are the only errors allowed past the
    /// orchestrator boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UpdateError::NativeModuleMissing
                | UpdateError::PlatformSetup(_)
                | UpdateError::DebugBuild
                | UpdateError::Config(_)
        )
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(source: std::io::Error) -> Self {
        UpdateError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
