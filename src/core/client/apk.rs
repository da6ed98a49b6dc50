use tracing::{debug, warn};

use super::{ProgressSink, UpdateClient};
use crate::core::events::EventType;
use crate::core::native::{PermissionStatus, Platform};

/// Last Android API level that needs a runtime storage permission.
const STORAGE_PERMISSION_MAX_API: u32 = 23;
const APK_TARGET_FILE: &str = "update.apk";

impl UpdateClient {
    /// Downloads and launches the installer for a full native package
    /// (the `Expired` case). Android only; elsewhere this is a no-op.
    ///
    /// Failures are reported as events and yield `false`.
    pub async fn download_and_install_apk(
        &self,
        url: &str,
        on_progress: Option<ProgressSink>,
    ) -> bool {
        let constants = self.store.constants();
        if constants.platform != Platform::Android {
            debug!("APK install requested on {}, ignored", constants.platform);
            return false;
        }

        self.report(EventType::DownloadingApk, "");

        if constants
            .api_level
            .is_some_and(|level| level <= STORAGE_PERMISSION_MAX_API)
        {
            match self.native.request_storage_permission().await {
                Ok(PermissionStatus::Granted) => {}
                Ok(PermissionStatus::Denied) => {
                    self.report(EventType::RejectStoragePermission, "");
                    return false;
                }
                Err(e) => {
                    warn!("Storage permission request failed: {}", e);
                    self.report(EventType::ErrorStoragePermission, e.to_string());
                    return false;
                }
            }
        }

        // The installer has no bundle hash; a timestamp keys its progress.
        let progress_key = self.clock.now_millis().to_string();
        let result = self
            .forward_progress(
                &progress_key,
                on_progress.as_ref(),
                self.native
                    .download_and_install_apk(url, APK_TARGET_FILE, &progress_key),
            )
            .await;

        if let Err(e) = result {
            warn!("APK download/install from {} failed: {}", url, e);
            self.report(EventType::ErrorDownloadAndInstallApk, e.to_string());
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::native::NativeConstants;
    use crate::core::testing::{test_client, ManualClock, MockNative, MockTransport};

    fn android(api_level: u32) -> Arc<MockNative> {
        Arc::new(MockNative::new(NativeConstants {
            platform: Platform::Android,
            is_using_bundle_url: Some(true),
            api_level: Some(api_level),
            ..Default::default()
        }))
    }

    fn kinds(
        events: &Arc<std::sync::Mutex<Vec<crate::core::events::UpdateEvent>>>,
    ) -> Vec<EventType> {
        events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn ignored_outside_android() {
        let native = Arc::new(MockNative::new(NativeConstants {
            platform: Platform::Ios,
            ..Default::default()
        }));
        let (client, events) =
            test_client(native.clone(), Arc::new(MockTransport::new()), ManualClock::at(0)).await;

        assert!(!client.download_and_install_apk("https://x/app.apk", None).await);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(native.calls_named("downloadAndInstallApk"), 0);
    }

    #[tokio::test]
    async fn denied_permission_is_reported() {
        let native = android(23);
        native.deny_storage_permission();
        let (client, events) =
            test_client(native.clone(), Arc::new(MockTransport::new()), ManualClock::at(0)).await;

        assert!(!client.download_and_install_apk("https://x/app.apk", None).await);
        assert_eq!(
            kinds(&events),
            vec![EventType::DownloadingApk, EventType::RejectStoragePermission]
        );
        assert_eq!(native.calls_named("downloadAndInstallApk"), 0);
    }

    #[tokio::test]
    async fn modern_android_skips_permission_and_installs() {
        let native = android(30);
        native.deny_storage_permission();
        let (client, events) =
            test_client(native.clone(), Arc::new(MockTransport::new()), ManualClock::at(42)).await;

        assert!(client.download_and_install_apk("https://x/app.apk", None).await);
        assert_eq!(kinds(&events), vec![EventType::DownloadingApk]);
        assert_eq!(native.calls_named("requestStoragePermission"), 0);
        assert_eq!(native.calls_named("downloadAndInstallApk"), 1);
    }

    #[tokio::test]
    async fn install_failure_is_reported() {
        let native = android(30);
        native.fail("downloadAndInstallApk");
        let (client, events) =
            test_client(native, Arc::new(MockTransport::new()), ManualClock::at(0)).await;

        assert!(!client.download_and_install_apk("https://x/app.apk", None).await);
        assert_eq!(
            kinds(&events),
            vec![EventType::DownloadingApk, EventType::ErrorDownloadAndInstallApk]
        );
    }
}
