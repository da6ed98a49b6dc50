use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{UpdateError, UpdateResult};

pub const DEFAULT_MAIN_ENDPOINT: &str = "https://api.cresc.dev";
pub const DEFAULT_BACKUP_ENDPOINT: &str = "https://api.cresc.app";
pub const DEFAULT_ENDPOINTS_QUERY_URL: &str =
    "https://raw.githubusercontent.com/cresc-dev/cresc/main/endpoints.json";

pub const DEFAULT_CHECK_THROTTLE_MS: u64 = 5_000;
pub const DEFAULT_DOWNLOAD_COOLDOWN_MS: u64 = 3_000;

/// When the client checks for updates on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    OnAppStart,
    OnAppResume,
    Both,
}

impl Strategy {
    pub fn checks_on_start(self) -> bool {
        matches!(self, Strategy::OnAppStart | Strategy::Both)
    }

    pub fn checks_on_resume(self) -> bool {
        matches!(self, Strategy::OnAppResume | Strategy::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub main: String,
    #[serde(default)]
    pub backups: Vec<String>,
    #[serde(default)]
    pub query_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            main: DEFAULT_MAIN_ENDPOINT.into(),
            backups: vec![DEFAULT_BACKUP_ENDPOINT.into()],
            query_url: Some(DEFAULT_ENDPOINTS_QUERY_URL.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    pub app_key: String,
    pub server: ServerConfig,
    pub strategy: Strategy,
    pub auto_mark_success: bool,
    /// Minimum interval between two networked checks.
    pub check_throttle_ms: u64,
    /// Quiet period after a download attempt finishes.
    pub download_cooldown_ms: u64,
    /// Refuse to run update APIs in builds with debug assertions.
    pub enforce_release_build: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            server: ServerConfig::default(),
            strategy: Strategy::Both,
            auto_mark_success: true,
            check_throttle_ms: DEFAULT_CHECK_THROTTLE_MS,
            download_cooldown_ms: DEFAULT_DOWNLOAD_COOLDOWN_MS,
            enforce_release_build: true,
        }
    }
}

impl ClientOptions {
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            ..Self::default()
        }
    }

    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn validate(&self) -> UpdateResult<()> {
        if self.app_key.trim().is_empty() {
            return Err(UpdateError::Config("appKey must not be empty".into()));
        }
        if self.server.main.trim().is_empty() {
            return Err(UpdateError::Config("server.main must not be empty".into()));
        }
        Ok(())
    }

    /// Fails with `DebugBuild` when release enforcement is on and this
    /// binary carries debug assertions.
    pub fn assert_release(&self) -> UpdateResult<()> {
        if self.enforce_release_build && cfg!(debug_assertions) {
            return Err(UpdateError::DebugBuild);
        }
        Ok(())
    }

    pub fn load(path: &Path) -> UpdateResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| UpdateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let options: ClientOptions = serde_json::from_str(&raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn save(&self, path: &Path) -> UpdateResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| UpdateError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
