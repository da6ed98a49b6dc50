use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::{UpdateError, UpdateResult};
use crate::core::native::{NativeConstants, NativeModule, Platform};
use crate::core::version::LocalHashInfo;

/// Client identification sent with every check and attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub cresc: String,
    pub rn: String,
    pub os: String,
    pub uuid: String,
}

/// Read-only view of the native-reported version facts, plus access to the
/// per-hash metadata cache.
pub struct VersionStore {
    native: Arc<dyn NativeModule>,
    constants: NativeConstants,
    client_info: ClientInfo,
}

impl VersionStore {
    /// Reads the native constants once and validates the platform setup.
    ///
    /// Generates and persists an install UUID when the native layer has none.
    pub async fn load(native: Arc<dyn NativeModule>) -> UpdateResult<Self> {
        let constants = native.constants();

        if constants.platform == Platform::Android && constants.is_using_bundle_url == Some(false)
        {
            return Err(UpdateError::PlatformSetup(
                "Can not load the native update module. Please check your bundle url.".into(),
            ));
        }

        let uuid = match constants.install_uuid.clone().filter(|u| !u.is_empty()) {
            Some(uuid) => uuid,
            None => {
                let uuid = Uuid::new_v4().to_string();
                if let Err(e) = native.set_uuid(&uuid).await {
                    warn!("Failed to persist install uuid: {}", e);
                }
                uuid
            }
        };
        info!("uuid: {}", uuid);

        let client_info = ClientInfo {
            cresc: env!("CARGO_PKG_VERSION").into(),
            rn: constants.runtime_version.clone(),
            os: format!("{} {}", constants.platform, constants.os_version)
                .trim()
                .to_string(),
            uuid,
        };

        Ok(Self {
            native,
            constants,
            client_info,
        })
    }

    pub fn constants(&self) -> &NativeConstants {
        &self.constants
    }

    pub fn client_info(&self) -> &ClientInfo {
        &self.client_info
    }

    pub fn package_version(&self) -> &str {
        &self.constants.package_version
    }

    pub fn current_hash(&self) -> Option<&str> {
        self.constants.current_hash.as_deref()
    }

    pub fn rolled_back_hash(&self) -> Option<&str> {
        self.constants.rolled_back_hash.as_deref()
    }

    pub fn is_rolled_back(&self) -> bool {
        self.constants.rolled_back_hash.is_some()
    }

    pub fn is_first_time(&self) -> bool {
        self.constants.is_first_time
    }

    pub fn build_time(&self) -> i64 {
        self.constants.build_time
    }

    pub async fn set_local_hash_info(&self, hash: &str, info: &LocalHashInfo) -> UpdateResult<()> {
        let json = serde_json::to_string(info)?;
        self.native.set_local_hash_info(hash, &json).await
    }

    pub async fn local_hash_info(&self, hash: &str) -> UpdateResult<LocalHashInfo> {
        match self.native.get_local_hash_info(hash).await? {
            Some(json) => {
                let value: serde_json::Value = serde_json::from_str(&json)?;
                if value.is_null() {
                    return Ok(LocalHashInfo::default());
                }
                Ok(serde_json::from_value(value)?)
            }
            None => Ok(LocalHashInfo::default()),
        }
    }

    /// Metadata of the running bundle; empty when running the baseline.
    pub async fn current_version_info(&self) -> UpdateResult<LocalHashInfo> {
        match self.current_hash() {
            Some(hash) => self.local_hash_info(hash).await,
            None => Ok(LocalHashInfo::default()),
        }
    }
}
