// ─── Native Update Module boundary ───
// Everything that touches bytes on disk or the running bundle lives behind
// this trait: patch application, package extraction, bundle switching and
// the durable flags (current hash, first run, rollback, block window).

pub mod fs;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::error::{UpdateError, UpdateResult};
use crate::core::version::{BlockWindow, ProgressSample};

pub use fs::FsNativeModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Other,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ios => write!(f, "ios"),
            Self::Android => write!(f, "android"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Facts the native layer reports once, at load time.
#[derive(Debug, Clone)]
pub struct NativeConstants {
    pub download_root_dir: PathBuf,
    pub package_version: String,
    /// Hash of the running bundle; `None` when running the packaged baseline.
    pub current_hash: Option<String>,
    pub is_first_time: bool,
    pub rolled_back_hash: Option<String>,
    pub build_time: i64,
    pub install_uuid: Option<String>,
    pub block_window: Option<BlockWindow>,
    /// Android only.
    pub is_using_bundle_url: Option<bool>,
    pub platform: Platform,
    pub os_version: String,
    /// Version of the host runtime the bundle runs on.
    pub runtime_version: String,
    /// Android API level, when known.
    pub api_level: Option<u32>,
}

impl Default for NativeConstants {
    fn default() -> Self {
        Self {
            download_root_dir: PathBuf::new(),
            package_version: String::new(),
            current_hash: None,
            is_first_time: false,
            rolled_back_hash: None,
            build_time: 0,
            install_uuid: None,
            block_window: None,
            is_using_bundle_url: None,
            platform: Platform::Other,
            os_version: String::new(),
            runtime_version: String::new(),
            api_level: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[async_trait]
pub trait NativeModule: Send + Sync {
    fn constants(&self) -> NativeConstants;

    /// Progress of any running transfer. Subscribe before starting it.
    fn progress_events(&self) -> broadcast::Receiver<ProgressSample>;

    async fn set_local_hash_info(&self, hash: &str, json: &str) -> UpdateResult<()>;

    /// Stored JSON for `hash`, if any.
    async fn get_local_hash_info(&self, hash: &str) -> UpdateResult<Option<String>>;

    async fn download_patch_from_current_bundle(
        &self,
        url: &str,
        hash: &str,
        origin_hash: Option<&str>,
    ) -> UpdateResult<()>;

    async fn download_patch_from_package(&self, url: &str, hash: &str) -> UpdateResult<()>;

    async fn download_full_update(&self, url: &str, hash: &str) -> UpdateResult<()>;

    async fn reload_update(&self, hash: &str) -> UpdateResult<()>;

    async fn set_need_update_on_next_launch(&self, hash: &str) -> UpdateResult<()>;

    async fn mark_success(&self) -> UpdateResult<()>;

    async fn set_block_window(&self, window: &BlockWindow) -> UpdateResult<()>;

    async fn set_uuid(&self, uuid: &str) -> UpdateResult<()>;

    async fn request_storage_permission(&self) -> UpdateResult<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn download_and_install_apk(
        &self,
        _url: &str,
        _target_file: &str,
        _hash: &str,
    ) -> UpdateResult<()> {
        Err(UpdateError::Unsupported("downloadAndInstallApk"))
    }
}
