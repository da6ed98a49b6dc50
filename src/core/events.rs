// ─── Event Reporter ───
// The one telemetry seam: every lifecycle transition is delivered to a
// replaceable sink as `{ type, data }`.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::core::version::ClientInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Rollback,
    ErrorChecking,
    Checking,
    Downloading,
    ErrorUpdate,
    MarkSuccess,
    DownloadingApk,
    RejectStoragePermission,
    ErrorStoragePermission,
    ErrorDownloadAndInstallApk,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rollback => "rollback",
            Self::ErrorChecking => "errorChecking",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::ErrorUpdate => "errorUpdate",
            Self::MarkSuccess => "markSuccess",
            Self::DownloadingApk => "downloadingApk",
            Self::RejectStoragePermission => "rejectStoragePermission",
            Self::ErrorStoragePermission => "errorStoragePermission",
            Self::ErrorDownloadAndInstallApk => "errorDownloadAndInstallApk",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub current_version: Option<String>,
    #[serde(rename = "cInfo")]
    pub client_info: ClientInfo,
    pub package_version: String,
    pub build_time: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub data: EventData,
}

pub type EventSink = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

static GLOBAL_REPORTER: LazyLock<Arc<EventReporter>> =
    LazyLock::new(|| Arc::new(EventReporter::new()));

/// Holder of the current sink. A missing sink is a no-op.
#[derive(Default)]
pub struct EventReporter {
    sink: RwLock<Option<EventSink>>,
}

impl EventReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide reporter shared by clients that are not given one.
    pub fn global() -> Arc<EventReporter> {
        GLOBAL_REPORTER.clone()
    }

    /// Replaces the sink; the last assignment wins.
    pub fn set_sink(&self, sink: EventSink) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    pub fn clear(&self) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Logs the event and hands it to the sink. Never fails: a panicking
    /// sink is caught and logged.
    pub fn emit(&self, event: &UpdateEvent) {
        info!("{} {}", event.kind, event.data.message);

        let sink = self
            .sink
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(sink) = sink {
            if catch_unwind(AssertUnwindSafe(|| sink(event))).is_err() {
                warn!("Event sink panicked while handling {}", event.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(kind: EventType) -> UpdateEvent {
        UpdateEvent {
            kind,
            data: EventData {
                current_version: Some("h0".into()),
                client_info: ClientInfo {
                    cresc: "0.1.0".into(),
                    rn: "0.73.0".into(),
                    os: "ios 17".into(),
                    uuid: "u1".into(),
                },
                package_version: "1.0".into(),
                build_time: 1700000000,
                message: String::new(),
                rolled_back_version: None,
                new_version: Some("h1".into()),
            },
        }
    }

    #[test]
    fn serializes_wire_shape() {
        let value = serde_json::to_value(event(EventType::ErrorUpdate)).unwrap();
        assert_eq!(value["type"], "errorUpdate");
        assert_eq!(value["data"]["currentVersion"], "h0");
        assert_eq!(value["data"]["cInfo"]["uuid"], "u1");
        assert_eq!(value["data"]["newVersion"], "h1");
        assert!(value["data"].get("rolledBackVersion").is_none());
    }

    #[test]
    fn missing_sink_is_noop_and_last_sink_wins() {
        let reporter = EventReporter::new();
        reporter.emit(&event(EventType::Checking));

        let first = Arc::new(Mutex::new(0));
        let second = Arc::new(Mutex::new(0));
        let f = first.clone();
        reporter.set_sink(Arc::new(move |_: &UpdateEvent| *f.lock().unwrap() += 1));
        let s = second.clone();
        reporter.set_sink(Arc::new(move |_: &UpdateEvent| *s.lock().unwrap() += 1));

        reporter.emit(&event(EventType::Checking));
        assert_eq!(*first.lock().unwrap(), 0);
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn panicking_sink_does_not_escape() {
        let reporter = EventReporter::new();
        reporter.set_sink(Arc::new(|_: &UpdateEvent| panic!("sink failure")));
        reporter.emit(&event(EventType::MarkSuccess));
    }
}
