use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::UpdateClient;
use crate::core::error::UpdateResult;
use crate::core::events::EventType;
use crate::core::version::{CheckResult, ProgressSample, UpdateInfo};

/// Caller-supplied progress callback. May fire many times per download.
pub type ProgressSink = Arc<dyn Fn(&ProgressSample) + Send + Sync>;

/// One step of the download fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// Binary diff against the running bundle.
    Diff,
    /// Binary diff against the baseline shipped in the native package.
    PackageDiff,
    /// Complete bundle package.
    Full,
}

impl PatchKind {
    pub const CHAIN: [PatchKind; 3] = [PatchKind::Diff, PatchKind::PackageDiff, PatchKind::Full];

    pub fn url(self, info: &UpdateInfo) -> Option<&str> {
        match self {
            PatchKind::Diff => info.diff_url.as_deref(),
            PatchKind::PackageDiff => info.pdiff_url.as_deref(),
            PatchKind::Full => info.update_url.as_deref(),
        }
    }
}

/// Marks the download flight finished (starting the cooldown) on every exit
/// path, including cancellation.
struct DownloadFlight<'a>(&'a UpdateClient);

impl Drop for DownloadFlight<'_> {
    fn drop(&mut self) {
        let now = self.0.clock.now_millis();
        self.0
            .session()
            .finish_download(now, self.0.options.download_cooldown_ms);
    }
}

impl UpdateClient {
    /// Downloads the update described by `result`.
    ///
    /// Returns the new hash on success. `None` covers both refused calls
    /// (not an update, rolled-back hash, download already running) and a
    /// failed fallback chain, which is additionally reported as `errorUpdate`.
    pub async fn download_update(
        &self,
        result: &CheckResult,
        on_progress: Option<ProgressSink>,
    ) -> UpdateResult<Option<String>> {
        self.options.assert_release()?;

        let Some(info) = result.as_update() else {
            debug!("Nothing to download");
            return Ok(None);
        };
        if self.store.rolled_back_hash() == Some(info.hash.as_str()) {
            debug!("Rolled back hash {}, ignored", info.hash);
            return Ok(None);
        }
        {
            let now = self.clock.now_millis();
            let mut session = self.session();
            if session.is_downloaded(&info.hash) {
                debug!("Duplicated downloaded hash {}, ignored", info.hash);
                return Ok(Some(info.hash.clone()));
            }
            if !session.try_begin_download(now) {
                debug!("Repeated downloading, ignored");
                return Ok(None);
            }
        }
        let _flight = DownloadFlight(self);

        self.report(EventType::Downloading, "");
        let succeeded = self
            .forward_progress(&info.hash, on_progress.as_ref(), self.run_patch_chain(info))
            .await;

        if !succeeded {
            let mut data = self.event_data("");
            data.new_version = Some(info.hash.clone());
            self.emit(EventType::ErrorUpdate, data);
            return Ok(None);
        }

        if let Err(e) = self
            .store
            .set_local_hash_info(&info.hash, &info.local_info())
            .await
        {
            warn!("Failed to store metadata for {}: {}", info.hash, e);
        }
        self.session().downloaded_hash = Some(info.hash.clone());
        info!("Update {} downloaded", info.hash);
        Ok(Some(info.hash.clone()))
    }

    async fn run_patch_chain(&self, info: &UpdateInfo) -> bool {
        for kind in PatchKind::CHAIN {
            let Some(url) = kind.url(info) else {
                continue;
            };
            info!("Downloading {:?} for {}", kind, info.hash);
            match self.apply_patch(kind, url, &info.hash).await {
                Ok(()) => return true,
                Err(e) => warn!("{:?} download failed for {}: {}", kind, info.hash, e),
            }
        }
        false
    }

    async fn apply_patch(&self, kind: PatchKind, url: &str, hash: &str) -> UpdateResult<()> {
        match kind {
            PatchKind::Diff => {
                self.native
                    .download_patch_from_current_bundle(url, hash, self.store.current_hash())
                    .await
            }
            PatchKind::PackageDiff => self.native.download_patch_from_package(url, hash).await,
            PatchKind::Full => self.native.download_full_update(url, hash).await,
        }
    }

    /// Drives `work` while forwarding native progress for `hash` to `sink`.
    /// Samples for any other hash are dropped.
    pub(super) async fn forward_progress<F, T>(
        &self,
        hash: &str,
        sink: Option<&ProgressSink>,
        work: F,
    ) -> T
    where
        F: Future<Output = T>,
    {
        let Some(sink) = sink else {
            return work.await;
        };

        let mut events = self.native.progress_events();
        tokio::pin!(work);

        let output = loop {
            tokio::select! {
                biased;
                received = events.recv() => match received {
                    Ok(sample) => {
                        if sample.hash == hash {
                            sink(&sample);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Progress listener lagged, {} samples skipped", skipped);
                    }
                    Err(RecvError::Closed) => break (&mut work).await,
                },
                output = &mut work => break output,
            }
        };

        while let Ok(sample) = events.try_recv() {
            if sample.hash == hash {
                sink(&sample);
            }
        }
        output
    }
}
