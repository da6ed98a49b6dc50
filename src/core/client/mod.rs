// ─── Update Client ───
// Orchestrates check → download → apply for one app. Each concern lives in
// its own file as an `impl UpdateClient` block:
//   check.rs    throttled check pipeline with endpoint failover
//   download.rs patch fallback chain and progress forwarding
//   apply.rs    switch / switch-later / mark-success
//   apk.rs      Android full package install

mod apk;
mod apply;
mod check;
mod download;

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::ClientOptions;
use crate::core::endpoint::EndpointResolver;
use crate::core::error::{UpdateError, UpdateResult};
use crate::core::events::{EventData, EventReporter, EventSink, EventType, UpdateEvent};
use crate::core::http::{build_http_client, CheckTransport, HttpTransport};
use crate::core::native::NativeModule;
use crate::core::state::{CheckPhase, SessionState};
use crate::core::version::{CheckResult, LocalHashInfo, VersionStore};

pub use download::{PatchKind, ProgressSink};

/// What the native layer reported about the previous switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStatus {
    Normal,
    /// First start of a freshly switched bundle; call `mark_success`.
    FirstRunAfterUpdate,
    /// The previous switch was reverted by the native layer.
    RolledBack { hash: String },
}

pub struct UpdateClient {
    options: ClientOptions,
    native: Arc<dyn NativeModule>,
    transport: Arc<dyn CheckTransport>,
    clock: Arc<dyn Clock>,
    reporter: Arc<EventReporter>,
    store: VersionStore,
    endpoints: EndpointResolver,
    session: Mutex<SessionState>,
}

pub struct UpdateClientBuilder {
    options: ClientOptions,
    native: Option<Arc<dyn NativeModule>>,
    transport: Option<Arc<dyn CheckTransport>>,
    clock: Option<Arc<dyn Clock>>,
    reporter: Option<Arc<EventReporter>>,
}

impl UpdateClientBuilder {
    pub fn native(mut self, native: Arc<dyn NativeModule>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn CheckTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to the process-wide reporter.
    pub fn reporter(mut self, reporter: Arc<EventReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub async fn build(self) -> UpdateResult<UpdateClient> {
        self.options.validate()?;
        let native = self.native.ok_or(UpdateError::NativeModuleMissing)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(build_http_client()?)),
        };
        let store = VersionStore::load(native.clone()).await?;
        let session = SessionState::new(store.constants().block_window.clone());
        let endpoints = EndpointResolver::new(&self.options.server);

        info!(
            "Update client ready (package {}, bundle {:?})",
            store.package_version(),
            store.current_hash()
        );

        Ok(UpdateClient {
            options: self.options,
            native,
            transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            reporter: self.reporter.unwrap_or_else(EventReporter::global),
            store,
            endpoints,
            session: Mutex::new(session),
        })
    }
}

impl UpdateClient {
    pub fn builder(options: ClientOptions) -> UpdateClientBuilder {
        UpdateClientBuilder {
            options,
            native: None,
            transport: None,
            clock: None,
            reporter: None,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn endpoints(&self) -> &EndpointResolver {
        &self.endpoints
    }

    pub fn current_hash(&self) -> Option<&str> {
        self.store.current_hash()
    }

    pub fn is_first_time(&self) -> bool {
        self.store.is_first_time()
    }

    pub fn is_rolled_back(&self) -> bool {
        self.store.is_rolled_back()
    }

    pub fn downloaded_hash(&self) -> Option<String> {
        self.session().downloaded_hash.clone()
    }

    pub fn last_result(&self) -> CheckResult {
        self.session().last_result_or_empty()
    }

    pub fn check_phase(&self) -> CheckPhase {
        let now = self.clock.now_millis();
        self.session().check_phase(now)
    }

    pub async fn current_version_info(&self) -> UpdateResult<LocalHashInfo> {
        self.store.current_version_info().await
    }

    pub fn launch_status(&self) -> LaunchStatus {
        if let Some(hash) = self.store.rolled_back_hash() {
            LaunchStatus::RolledBack { hash: hash.to_string() }
        } else if self.store.is_first_time() {
            LaunchStatus::FirstRunAfterUpdate
        } else {
            LaunchStatus::Normal
        }
    }

    /// Replaces the event sink, then reports a pending rollback to it.
    pub fn on_events(&self, sink: EventSink) {
        self.reporter.set_sink(sink);
        self.report_rollback();
    }

    /// Start-of-process hook: surfaces rollback, auto-marks success after a
    /// fresh switch, and checks when the strategy asks for it.
    pub async fn on_launch(&self) -> UpdateResult<Option<CheckResult>> {
        match self.launch_status() {
            LaunchStatus::RolledBack { .. } => self.report_rollback(),
            LaunchStatus::FirstRunAfterUpdate if self.options.auto_mark_success => {
                self.mark_success().await?;
            }
            _ => {}
        }

        if self.options.strategy.checks_on_start() {
            return self.check_update().await.map(Some);
        }
        Ok(None)
    }

    pub async fn on_app_resume(&self) -> UpdateResult<Option<CheckResult>> {
        if self.options.strategy.checks_on_resume() {
            return self.check_update().await.map(Some);
        }
        Ok(None)
    }

    fn report_rollback(&self) {
        let Some(hash) = self.store.rolled_back_hash() else {
            return;
        };
        {
            let mut session = self.session();
            if session.rollback_reported {
                debug!("Rollback of {} already reported", hash);
                return;
            }
            session.rollback_reported = true;
        }
        let mut data = self.event_data("");
        data.rolled_back_version = Some(hash.to_string());
        self.emit(EventType::Rollback, data);
    }

    // ── Internals ───────────────────────────────────────

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn event_data(&self, message: impl Into<String>) -> EventData {
        EventData {
            current_version: self.store.current_hash().map(str::to_string),
            client_info: self.store.client_info().clone(),
            package_version: self.store.package_version().to_string(),
            build_time: self.store.build_time(),
            message: message.into(),
            rolled_back_version: None,
            new_version: None,
        }
    }

    fn report(&self, kind: EventType, message: impl Into<String>) {
        let data = self.event_data(message);
        self.emit(kind, data);
    }

    fn emit(&self, kind: EventType, data: EventData) {
        self.reporter.emit(&UpdateEvent { kind, data });
    }
}
