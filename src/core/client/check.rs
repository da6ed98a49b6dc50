use std::sync::Mutex;

use futures_util::future::select_ok;
use serde_json::json;
use tracing::{debug, info, warn};

use super::UpdateClient;
use crate::core::endpoint::build_check_url;
use crate::core::error::UpdateResult;
use crate::core::events::EventType;
use crate::core::http::TransportResponse;
use crate::core::state::SessionState;
use crate::core::version::{BlockWindow, CheckResponse, CheckResult, Paused, ServerOp};

/// Decision taken under the session lock before any I/O.
enum CheckGate {
    Cached(CheckResult),
    Busy(CheckResult),
    Blocked(BlockWindow),
    Proceed,
}

/// Clears `check_in_flight` even when the check future is dropped midway.
struct CheckFlight<'a>(&'a Mutex<SessionState>);

impl Drop for CheckFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).check_in_flight = false;
    }
}

impl UpdateClient {
    /// Asks the update server whether a newer bundle exists.
    ///
    /// Network and server failures never surface as `Err`: they are reported
    /// as `errorChecking` events and the last known result (or `Empty`) is
    /// returned. Only setup violations are errors.
    pub async fn check_update(&self) -> UpdateResult<CheckResult> {
        self.options.assert_release()?;

        let gate = {
            let now = self.clock.now_millis();
            let mut session = self.session();
            if let Some(cached) = session.throttled_result(now, self.options.check_throttle_ms) {
                CheckGate::Cached(cached)
            } else if session.check_in_flight {
                CheckGate::Busy(session.last_result_or_empty())
            } else if let Some(window) = session.active_block(now) {
                CheckGate::Blocked(window.clone())
            } else {
                session.check_in_flight = true;
                CheckGate::Proceed
            }
        };

        match gate {
            CheckGate::Cached(result) => {
                debug!("Repeated checking within throttle window, returning cached result");
                return Ok(result);
            }
            CheckGate::Busy(result) => {
                debug!("A check is already running, ignored");
                return Ok(result);
            }
            CheckGate::Blocked(window) => {
                self.report(EventType::ErrorChecking, window.paused_message());
                return Ok(CheckResult::UpToDate {
                    paused: Some(Paused::Blocked {
                        reason: window.reason,
                        until_epoch_seconds: window.until,
                    }),
                });
            }
            CheckGate::Proceed => {}
        }

        let _flight = CheckFlight(&self.session);
        self.report(EventType::Checking, "");

        let payload = json!({
            "packageVersion": self.store.package_version(),
            "hash": self.store.current_hash(),
            "buildTime": self.store.build_time(),
            "cInfo": self.store.client_info(),
        });

        let Some(response) = self.fetch_check(&payload).await else {
            self.report(
                EventType::ErrorChecking,
                "Can not connect to update server. Please check your network.",
            );
            return Ok(self.session().last_result_or_empty());
        };

        let parsed = match CheckResponse::parse(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report(
                    EventType::ErrorChecking,
                    format!(
                        "Invalid response from update server (HTTP {}): {}",
                        response.status, e
                    ),
                );
                return Ok(self.session().last_result_or_empty());
            }
        };

        let now = self.clock.now_millis();
        self.session().record_check(now, parsed.result.clone());
        self.apply_server_ops(&parsed.ops, now).await;

        if response.status != 200 {
            let message = parsed
                .message
                .clone()
                .unwrap_or_else(|| format!("Update server returned HTTP {}", response.status));
            self.report(EventType::ErrorChecking, message);
        }

        Ok(parsed.result)
    }

    /// Primary endpoint first; on a transport failure, every backup is
    /// raced and the first one that answers wins.
    async fn fetch_check(&self, payload: &serde_json::Value) -> Option<TransportResponse> {
        let primary = self.endpoints.check_url(&self.options.app_key);
        match self.transport.post_json(&primary, payload).await {
            Ok(response) => return Some(response),
            Err(e) => warn!("Check against {} failed: {}", primary, e),
        }

        self.report(
            EventType::ErrorChecking,
            "Can not connect to update server. Trying backup endpoints.",
        );
        let backups = self.endpoints.resolve_backups(self.transport.as_ref()).await;
        if backups.is_empty() {
            return None;
        }

        let attempts = backups.iter().map(|endpoint| {
            let url = build_check_url(&self.options.app_key, endpoint);
            let transport = self.transport.clone();
            Box::pin(async move { transport.post_json(&url, payload).await })
        });

        // Losers are dropped with the remaining futures; their answers are never read.
        match select_ok(attempts).await {
            Ok((response, _pending)) => Some(response),
            Err(e) => {
                warn!("All {} backup endpoints failed, last error: {}", backups.len(), e);
                None
            }
        }
    }

    async fn apply_server_ops(&self, ops: &[ServerOp], now_ms: i64) {
        for op in ops {
            match op {
                ServerOp::Block { reason, duration } => {
                    let window = BlockWindow::from_duration(reason.clone(), *duration, now_ms);
                    info!(
                        "Server paused update checks until {} ({})",
                        window.until, window.reason
                    );
                    self.session().block_window = Some(window.clone());
                    if let Err(e) = self.native.set_block_window(&window).await {
                        warn!("Failed to persist block window: {}", e);
                    }
                }
                ServerOp::Unknown => debug!("Ignoring unknown server op"),
            }
        }
    }
}
