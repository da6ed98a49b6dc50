// ─── Filesystem native module ───
// Reference implementation of the native boundary for desktop hosts:
// bundles live in `<root>/<hash>/`, durable flags in `<root>/state.json`.
// Binary diffs are not supported here, so the client always falls through
// to the full package.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use super::{NativeConstants, NativeModule, Platform};
use crate::core::downloader::{extract_package, Downloader};
use crate::core::error::{UpdateError, UpdateResult};
use crate::core::http::build_http_client;
use crate::core::version::{is_valid_hash, BlockWindow, ProgressSample};

const APP_DIR_NAME: &str = "cresc";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PersistedState {
    current_hash: Option<String>,
    last_hash: Option<String>,
    pending_hash: Option<String>,
    /// Set on the first launch of a switched bundle, cleared by markSuccess.
    /// Still set at the next launch means that bundle never proved healthy.
    awaiting_confirmation: bool,
    block_update: Option<BlockWindow>,
    uuid: Option<String>,
    hash_info: BTreeMap<String, String>,
}

/// Outcome of the launch bookkeeping done in `open`.
#[derive(Debug, Default)]
struct LaunchFlags {
    is_first_time: bool,
    rolled_back_hash: Option<String>,
}

impl PersistedState {
    /// Applies a pending switch or reverts an unconfirmed one.
    fn on_launch(&mut self) -> LaunchFlags {
        if self.awaiting_confirmation {
            self.awaiting_confirmation = false;
            let reverted = self.current_hash.take();
            self.current_hash = self.last_hash.take();
            return LaunchFlags {
                is_first_time: false,
                rolled_back_hash: reverted,
            };
        }

        if let Some(next) = self.pending_hash.take() {
            self.last_hash = self.current_hash.replace(next);
            self.awaiting_confirmation = true;
            return LaunchFlags {
                is_first_time: true,
                rolled_back_hash: None,
            };
        }

        LaunchFlags::default()
    }
}

pub struct FsNativeModule {
    root: PathBuf,
    constants: NativeConstants,
    downloader: Downloader,
    progress: broadcast::Sender<ProgressSample>,
    state: Mutex<PersistedState>,
}

impl FsNativeModule {
    /// Default root: `<data dir>/cresc`.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    /// Opens (or creates) the update root and performs launch bookkeeping:
    /// a pending hash becomes current, an unconfirmed switch is reverted.
    pub async fn open(
        root: PathBuf,
        package_version: impl Into<String>,
        build_time: i64,
    ) -> UpdateResult<Self> {
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| UpdateError::Io {
                path: root.clone(),
                source,
            })?;

        let mut state = load_state(&root).await;
        let flags = state.on_launch();
        if let Some(hash) = &flags.rolled_back_hash {
            warn!("Bundle {} was never marked successful, rolled back", hash);
        }
        save_state(&root, &state).await?;

        let constants = NativeConstants {
            download_root_dir: root.clone(),
            package_version: package_version.into(),
            current_hash: state.current_hash.clone(),
            is_first_time: flags.is_first_time,
            rolled_back_hash: flags.rolled_back_hash,
            build_time,
            install_uuid: state.uuid.clone(),
            block_window: state.block_update.clone(),
            is_using_bundle_url: None,
            platform: Platform::Other,
            os_version: std::env::consts::OS.to_string(),
            runtime_version: String::new(),
            api_level: None,
        };

        let (progress, _) = broadcast::channel(256);
        let downloader = Downloader::new(build_http_client()?).with_progress(progress.clone());

        Ok(Self {
            root,
            constants,
            downloader,
            progress,
            state: Mutex::new(state),
        })
    }

    /// Replaces the HTTP client used for package downloads.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.downloader = Downloader::new(client).with_progress(self.progress.clone());
        self
    }

    /// `<root>/<hash>`. Hashes come from the server, so anything that is not
    /// a single plain path component is refused before a path is built.
    pub fn bundle_dir(&self, hash: &str) -> UpdateResult<PathBuf> {
        if !is_valid_hash(hash) {
            return Err(UpdateError::Native(format!("invalid bundle hash {hash:?}")));
        }
        Ok(self.root.join(hash))
    }

    /// Directory of the bundle that should run now, if any.
    pub fn current_bundle_dir(&self) -> Option<PathBuf> {
        self.constants
            .current_hash
            .as_deref()
            .and_then(|hash| self.bundle_dir(hash).ok())
    }

    pub async fn pending_hash(&self) -> Option<String> {
        self.state.lock().await.pending_hash.clone()
    }

    async fn update_state<F>(&self, change: F) -> UpdateResult<()>
    where
        F: FnOnce(&mut PersistedState) + Send,
    {
        let mut state = self.state.lock().await;
        change(&mut state);
        save_state(&self.root, &state).await
    }
}

async fn load_state(root: &Path) -> PersistedState {
    let path = root.join(STATE_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Corrupt {:?}, starting fresh: {}", path, e);
            PersistedState::default()
        }),
        Err(_) => PersistedState::default(),
    }
}

async fn save_state(root: &Path, state: &PersistedState) -> UpdateResult<()> {
    let path = root.join(STATE_FILE);
    let json = serde_json::to_string_pretty(state)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| UpdateError::Io { path, source })
}

#[async_trait]
impl NativeModule for FsNativeModule {
    fn constants(&self) -> NativeConstants {
        self.constants.clone()
    }

    fn progress_events(&self) -> broadcast::Receiver<ProgressSample> {
        self.progress.subscribe()
    }

    async fn set_local_hash_info(&self, hash: &str, json: &str) -> UpdateResult<()> {
        self.update_state(|state| {
            state.hash_info.insert(hash.to_string(), json.to_string());
        })
        .await
    }

    async fn get_local_hash_info(&self, hash: &str) -> UpdateResult<Option<String>> {
        Ok(self.state.lock().await.hash_info.get(hash).cloned())
    }

    async fn download_patch_from_current_bundle(
        &self,
        _url: &str,
        _hash: &str,
        _origin_hash: Option<&str>,
    ) -> UpdateResult<()> {
        Err(UpdateError::Unsupported("downloadPatchFromPpk"))
    }

    async fn download_patch_from_package(&self, _url: &str, _hash: &str) -> UpdateResult<()> {
        Err(UpdateError::Unsupported("downloadPatchFromPackage"))
    }

    async fn download_full_update(&self, url: &str, hash: &str) -> UpdateResult<()> {
        let dest = self.bundle_dir(hash)?;
        let archive = self.root.join(format!("{hash}.ppk"));
        self.downloader.download_file(url, &archive, hash).await?;

        let archive_for_task = archive.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract_package(&archive_for_task, &dest))
                .await
                .map_err(|e| UpdateError::Other(format!("extract task failed: {e}")))
                .and_then(|result| result);

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!("Failed to remove {:?}: {}", archive, e);
        }
        let files = extracted?;
        info!("Extracted {} files for bundle {}", files, hash);
        Ok(())
    }

    async fn reload_update(&self, hash: &str) -> UpdateResult<()> {
        self.set_need_update_on_next_launch(hash).await?;
        info!("Bundle {} will run after the host restarts", hash);
        Ok(())
    }

    async fn set_need_update_on_next_launch(&self, hash: &str) -> UpdateResult<()> {
        if !self.bundle_dir(hash)?.is_dir() {
            return Err(UpdateError::Native(format!("bundle {hash} is not on disk")));
        }
        self.update_state(|state| state.pending_hash = Some(hash.to_string()))
            .await
    }

    async fn mark_success(&self) -> UpdateResult<()> {
        self.update_state(|state| {
            state.awaiting_confirmation = false;
            state.last_hash = None;
        })
        .await
    }

    async fn set_block_window(&self, window: &BlockWindow) -> UpdateResult<()> {
        self.update_state(|state| state.block_update = Some(window.clone()))
            .await
    }

    async fn set_uuid(&self, uuid: &str) -> UpdateResult<()> {
        self.update_state(|state| state.uuid = Some(uuid.to_string()))
            .await
    }
}
