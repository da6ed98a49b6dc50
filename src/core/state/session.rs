use crate::core::version::{BlockWindow, CheckResult};

/// Phase of the check pipeline. `Blocked` is derived from the block window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    Idle,
    Checking,
    Blocked,
}

/// In-memory guard state of one client. Lives as long as the client and is
/// never persisted; durable flags belong to the native layer.
#[derive(Debug, Default)]
pub struct SessionState {
    pub last_check_at: Option<i64>,
    pub last_result: Option<CheckResult>,
    pub check_in_flight: bool,
    pub block_window: Option<BlockWindow>,

    pub download_in_flight: bool,
    /// Epoch millis before which a new download is refused.
    pub download_cooldown_until: i64,
    pub downloaded_hash: Option<String>,

    pub marked_success: bool,
    pub switch_requested: bool,
    pub rollback_reported: bool,
}

impl SessionState {
    pub fn new(block_window: Option<BlockWindow>) -> Self {
        Self {
            block_window,
            ..Self::default()
        }
    }

    pub fn check_phase(&self, now_ms: i64) -> CheckPhase {
        if self.check_in_flight {
            CheckPhase::Checking
        } else if self.active_block(now_ms).is_some() {
            CheckPhase::Blocked
        } else {
            CheckPhase::Idle
        }
    }

    /// Cached result when the previous check is younger than `window_ms`.
    pub fn throttled_result(&self, now_ms: i64, window_ms: u64) -> Option<CheckResult> {
        let last_at = self.last_check_at?;
        let result = self.last_result.as_ref()?;
        if now_ms.saturating_sub(last_at) < window_ms as i64 {
            Some(result.clone())
        } else {
            None
        }
    }

    pub fn active_block(&self, now_ms: i64) -> Option<&BlockWindow> {
        self.block_window
            .as_ref()
            .filter(|window| window.is_active(now_ms))
    }

    pub fn record_check(&mut self, now_ms: i64, result: CheckResult) {
        self.last_check_at = Some(now_ms);
        self.last_result = Some(result);
    }

    pub fn last_result_or_empty(&self) -> CheckResult {
        self.last_result.clone().unwrap_or(CheckResult::Empty)
    }

    /// Single-flight gate: true when the caller may start a download.
    pub fn try_begin_download(&mut self, now_ms: i64) -> bool {
        if self.download_in_flight || now_ms < self.download_cooldown_until {
            return false;
        }
        self.download_in_flight = true;
        true
    }

    pub fn finish_download(&mut self, now_ms: i64, cooldown_ms: u64) {
        self.download_in_flight = false;
        self.download_cooldown_until = now_ms.saturating_add(cooldown_ms as i64);
    }

    pub fn is_downloaded(&self, hash: &str) -> bool {
        self.downloaded_hash.as_deref() == Some(hash)
    }
}
