// ─── Debug console ───
// Drives the native update module by hand from a tiny text protocol:
//
//   line 1      method name
//   line 2      a single value, or
//   lines 2..n  key / value pairs, one per line
//
// Only the methods listed in `ConsoleCommand` exist; everything else is
// rejected at parse time.

use std::collections::HashMap;

use tracing::info;

use crate::core::error::{UpdateError, UpdateResult};
use crate::core::native::NativeModule;
use crate::core::version::BlockWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    MarkSuccess,
    SetUuid(String),
    ReloadUpdate { hash: String },
    SetNeedUpdate { hash: String },
    GetLocalHashInfo { hash: String },
    SetLocalHashInfo { hash: String, json: String },
    DownloadPatchFromPpk {
        update_url: String,
        hash: String,
        origin_hash: Option<String>,
    },
    DownloadPatchFromPackage { update_url: String, hash: String },
    DownloadFullUpdate { update_url: String, hash: String },
    SetBlockUpdate { reason: String, until: i64 },
}

#[derive(Debug, Default)]
enum Params {
    #[default]
    None,
    Value(String),
    Map(HashMap<String, String>),
}

impl Params {
    fn parse(lines: &[&str]) -> Self {
        match lines {
            [] => Params::None,
            [value] => Params::Value(value.to_string()),
            pairs => Params::Map(
                pairs
                    .chunks(2)
                    .map(|pair| {
                        (
                            pair[0].to_string(),
                            pair.get(1).map(|v| v.to_string()).unwrap_or_default(),
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// A lone value answers for any key.
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Params::None => None,
            Params::Value(value) => Some(value.clone()),
            Params::Map(map) => map.get(key).cloned(),
        }
    }

    fn require(&self, method: &str, key: &str) -> UpdateResult<String> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UpdateError::Config(format!("{method} needs `{key}`")))
    }

    fn keyed(&self, key: &str) -> Option<String> {
        match self {
            Params::Map(map) => map.get(key).cloned(),
            _ => None,
        }
    }
}

impl ConsoleCommand {
    pub fn parse(input: &str) -> UpdateResult<Self> {
        let lines: Vec<&str> = input
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let Some((method, rest)) = lines.split_first() else {
            return Err(UpdateError::Config("empty console input".into()));
        };
        let params = Params::parse(rest);

        let command = match *method {
            "markSuccess" => Self::MarkSuccess,
            "setUuid" => Self::SetUuid(params.require(method, "uuid")?),
            "reloadUpdate" => Self::ReloadUpdate {
                hash: params.require(method, "hash")?,
            },
            "setNeedUpdate" => Self::SetNeedUpdate {
                hash: params.require(method, "hash")?,
            },
            "getLocalHashInfo" => Self::GetLocalHashInfo {
                hash: params.require(method, "hash")?,
            },
            "setLocalHashInfo" => Self::SetLocalHashInfo {
                hash: params.require(method, "hash")?,
                json: params.keyed("info").unwrap_or_else(|| "{}".into()),
            },
            "downloadPatchFromPpk" => Self::DownloadPatchFromPpk {
                update_url: params.require(method, "updateUrl")?,
                hash: params.require(method, "hash")?,
                origin_hash: params.keyed("originHash"),
            },
            "downloadPatchFromPackage" => Self::DownloadPatchFromPackage {
                update_url: params.require(method, "updateUrl")?,
                hash: params.require(method, "hash")?,
            },
            "downloadFullUpdate" => Self::DownloadFullUpdate {
                update_url: params.require(method, "updateUrl")?,
                hash: params.require(method, "hash")?,
            },
            "setBlockUpdate" => {
                let until = params.require(method, "until")?;
                Self::SetBlockUpdate {
                    reason: params.keyed("reason").unwrap_or_default(),
                    until: until.parse().map_err(|_| {
                        UpdateError::Config(format!("setBlockUpdate: bad `until` {until}"))
                    })?,
                }
            }
            other => {
                return Err(UpdateError::Config(format!("unknown console method `{other}`")));
            }
        };
        Ok(command)
    }

    /// Runs the command and returns a line for the operator.
    pub async fn execute(&self, native: &dyn NativeModule) -> UpdateResult<String> {
        info!("console: {:?}", self);
        match self {
            Self::MarkSuccess => native.mark_success().await?,
            Self::SetUuid(uuid) => native.set_uuid(uuid).await?,
            Self::ReloadUpdate { hash } => native.reload_update(hash).await?,
            Self::SetNeedUpdate { hash } => native.set_need_update_on_next_launch(hash).await?,
            Self::GetLocalHashInfo { hash } => {
                return Ok(native
                    .get_local_hash_info(hash)
                    .await?
                    .unwrap_or_else(|| "null".into()));
            }
            Self::SetLocalHashInfo { hash, json } => {
                serde_json::from_str::<serde_json::Value>(json)?;
                native.set_local_hash_info(hash, json).await?
            }
            Self::DownloadPatchFromPpk {
                update_url,
                hash,
                origin_hash,
            } => {
                native
                    .download_patch_from_current_bundle(update_url, hash, origin_hash.as_deref())
                    .await?
            }
            Self::DownloadPatchFromPackage { update_url, hash } => {
                native.download_patch_from_package(update_url, hash).await?
            }
            Self::DownloadFullUpdate { update_url, hash } => {
                native.download_full_update(update_url, hash).await?
            }
            Self::SetBlockUpdate { reason, until } => {
                native
                    .set_block_window(&BlockWindow {
                        reason: reason.clone(),
                        until: *until,
                    })
                    .await?
            }
        }
        Ok("done".into())
    }
}
