// ─── Check Result ───
// Shapes returned by `POST {endpoint}/checkUpdate/{appKey}` and the
// metadata the client keeps about downloaded bundles.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of a check for updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// No information yet: the initial state, or a check that produced nothing.
    Empty,
    UpToDate { paused: Option<Paused> },
    /// The installed native package is too old for any bundle patch.
    Expired { download_url: String },
    Available(UpdateInfo),
}

impl CheckResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, CheckResult::Empty)
    }

    pub fn as_update(&self) -> Option<&UpdateInfo> {
        match self {
            CheckResult::Available(info) => Some(info),
            _ => None,
        }
    }
}

/// Why an up-to-date answer is not a real "no update".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paused {
    App,
    Package,
    /// Local short-circuit while a server-issued block window is active.
    Blocked {
        reason: String,
        until_epoch_seconds: i64,
    },
}

/// An update the server offers for this install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub hash: String,
    pub name: String,
    pub description: String,
    pub meta_info: String,
    pub diff_url: Option<String>,
    pub pdiff_url: Option<String>,
    pub update_url: Option<String>,
}

impl UpdateInfo {
    pub fn local_info(&self) -> LocalHashInfo {
        LocalHashInfo {
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            meta_info: Some(self.meta_info.clone()),
        }
    }
}

/// Instruction embedded by the server in the `op` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerOp {
    Block {
        #[serde(default)]
        reason: String,
        /// Milliseconds.
        #[serde(default)]
        duration: u64,
    },
    #[serde(other)]
    Unknown,
}

/// Parsed check response: the classified result plus side-channel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResponse {
    pub result: CheckResult,
    pub ops: Vec<ServerOp>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCheckResponse {
    expired: bool,
    download_url: Option<String>,
    up_to_date: bool,
    paused: Option<String>,
    update: bool,
    name: Option<String>,
    hash: Option<String>,
    description: Option<String>,
    meta_info: Option<String>,
    diff_url: Option<String>,
    pdiff_url: Option<String>,
    update_url: Option<String>,
    message: Option<String>,
    op: Option<serde_json::Value>,
}

impl CheckResponse {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let raw: RawCheckResponse = serde_json::from_str(body)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawCheckResponse) -> Self {
        let ops = match raw.op {
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<ServerOp>(item) {
                    Ok(op) => Some(op),
                    Err(e) => {
                        debug!("Ignoring malformed server op: {}", e);
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let result = if raw.expired {
            CheckResult::Expired {
                download_url: raw.download_url.unwrap_or_default(),
            }
        } else if raw.update {
            match raw.hash.filter(|h| {
                let valid = is_valid_hash(h);
                if !valid {
                    warn!("Ignoring update with malformed hash {:?}", h);
                }
                valid
            }) {
                Some(hash) => CheckResult::Available(UpdateInfo {
                    hash,
                    name: raw.name.unwrap_or_default(),
                    description: raw.description.unwrap_or_default(),
                    meta_info: raw.meta_info.unwrap_or_default(),
                    diff_url: non_empty(raw.diff_url),
                    pdiff_url: non_empty(raw.pdiff_url),
                    update_url: non_empty(raw.update_url),
                }),
                None => CheckResult::Empty,
            }
        } else if raw.up_to_date {
            let paused = match raw.paused.as_deref() {
                Some("app") => Some(Paused::App),
                Some("package") => Some(Paused::Package),
                _ => None,
            };
            CheckResult::UpToDate { paused }
        } else {
            CheckResult::Empty
        };

        Self {
            result,
            ops,
            message: raw.message,
        }
    }
}

/// A bundle hash names a directory, so it must be one plain path component.
pub fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty()
        && hash
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn non_empty(url: Option<String>) -> Option<String> {
    url.filter(|u| !u.trim().is_empty())
}

/// Download progress reported by the native layer, keyed by bundle hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub hash: String,
    pub received: u64,
    /// Zero until the transfer size is known.
    pub total: u64,
}

/// Server-directed pause of the update service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWindow {
    pub reason: String,
    /// Epoch seconds.
    pub until: i64,
}

impl BlockWindow {
    /// `until = ceil((now + duration) / 1000)`, both in milliseconds, so the
    /// window never closes before `now + duration`.
    pub fn from_duration(reason: impl Into<String>, duration_ms: u64, now_ms: i64) -> Self {
        let end_ms = now_ms.saturating_add(duration_ms.min(i64::MAX as u64) as i64);
        Self {
            reason: reason.into(),
            until: end_ms.saturating_add(999).div_euclid(1000),
        }
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        now_ms < self.until.saturating_mul(1000)
    }

    pub fn paused_message(&self) -> String {
        let retry_after = Local
            .timestamp_opt(self.until, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.until.to_string());
        format!(
            "Update service is paused because: {}. Please retry after {}.",
            self.reason, retry_after
        )
    }
}

/// Metadata persisted per downloaded hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalHashInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_info: Option<String>,
}
