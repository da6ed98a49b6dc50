use tracing::{debug, info, warn};

use super::UpdateClient;
use crate::core::error::UpdateResult;
use crate::core::events::EventType;
use crate::core::state::SessionState;

/// Only the hash downloaded by this session may be applied.
fn accepts_hash(session: &SessionState, hash: &str) -> bool {
    match session.downloaded_hash.as_deref() {
        None => {
            debug!("No downloaded hash, refusing to switch to {}", hash);
            false
        }
        Some(downloaded) if downloaded != hash => {
            debug!("Use downloaded hash {} first", downloaded);
            false
        }
        Some(_) => true,
    }
}

impl UpdateClient {
    /// Switches to `hash` immediately. One-shot per session: returns `true`
    /// only for the call that actually reached the native layer.
    pub async fn switch_version(&self, hash: &str) -> UpdateResult<bool> {
        self.options.assert_release()?;
        {
            let mut session = self.session();
            if !accepts_hash(&session, hash) {
                return Ok(false);
            }
            if session.switch_requested {
                debug!("Switch already requested, ignored");
                return Ok(false);
            }
            session.switch_requested = true;
        }

        info!("switchVersion: {}", hash);
        if let Err(e) = self.native.reload_update(hash).await {
            warn!("Native reload of {} failed: {}", hash, e);
            self.session().switch_requested = false;
            return Ok(false);
        }
        Ok(true)
    }

    /// Applies `hash` on the next launch. Safe to call repeatedly.
    pub async fn switch_version_later(&self, hash: &str) -> UpdateResult<bool> {
        self.options.assert_release()?;
        if !accepts_hash(&self.session(), hash) {
            return Ok(false);
        }

        info!("switchVersionLater: {}", hash);
        if let Err(e) = self.native.set_need_update_on_next_launch(hash).await {
            warn!("Failed to schedule {} for next launch: {}", hash, e);
            return Ok(false);
        }
        Ok(true)
    }

    /// Tells the native layer the running bundle is healthy, disarming the
    /// automatic rollback. Only the first call in a session does anything.
    pub async fn mark_success(&self) -> UpdateResult<bool> {
        self.options.assert_release()?;
        {
            let mut session = self.session();
            if session.marked_success {
                debug!("Repeated markSuccess, ignored");
                return Ok(false);
            }
            session.marked_success = true;
        }

        if let Err(e) = self.native.mark_success().await {
            warn!("Native markSuccess failed: {}", e);
        }
        self.report(EventType::MarkSuccess, "");
        Ok(true)
    }
}
