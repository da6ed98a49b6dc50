// Test doubles shared by the unit tests of every module.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

use crate::core::clock::Clock;
use crate::core::client::UpdateClient;
use crate::core::config::{ClientOptions, ServerConfig};
use crate::core::error::{UpdateError, UpdateResult};
use crate::core::events::{EventReporter, UpdateEvent};
use crate::core::http::{CheckTransport, TransportResponse};
use crate::core::native::{NativeConstants, NativeModule, PermissionStatus};
use crate::core::version::{BlockWindow, ProgressSample};

const DOWNLOAD_CALLS: [&str; 3] = [
    "downloadPatchFromPpk",
    "downloadPatchFromPackage",
    "downloadFullUpdate",
];

// ── Clock ───────────────────────────────────────────────

pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(now_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_ms)))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Native module ───────────────────────────────────────

pub struct MockNative {
    constants: NativeConstants,
    calls: Mutex<Vec<(String, Option<String>)>>,
    failing: Mutex<HashSet<String>>,
    hash_info: Mutex<HashMap<String, String>>,
    progress: broadcast::Sender<ProgressSample>,
    progress_script: Mutex<Vec<ProgressSample>>,
    gate: Mutex<Option<Arc<Notify>>>,
    permission: Mutex<PermissionStatus>,
}

impl MockNative {
    pub fn new(constants: NativeConstants) -> Self {
        let (progress, _) = broadcast::channel(64);
        Self {
            constants,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hash_info: Mutex::new(HashMap::new()),
            progress,
            progress_script: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            permission: Mutex::new(PermissionStatus::Granted),
        }
    }

    pub fn fail(&self, method: &str) {
        self.failing.lock().unwrap().insert(method.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn deny_storage_permission(&self) {
        *self.permission.lock().unwrap() = PermissionStatus::Denied;
    }

    /// Downloads wait on the returned gate before completing.
    pub fn hold_downloads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Samples broadcast by every download call before it completes.
    pub fn script_progress(&self, samples: Vec<ProgressSample>) {
        *self.progress_script.lock().unwrap() = samples;
    }

    pub fn put_hash_info(&self, hash: &str, json: &str) {
        self.hash_info
            .lock()
            .unwrap()
            .insert(hash.to_string(), json.to_string());
    }

    pub fn hash_info(&self, hash: &str) -> Option<String> {
        self.hash_info.lock().unwrap().get(hash).cloned()
    }

    pub fn calls_named(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == method)
            .count()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| DOWNLOAD_CALLS.contains(&name.as_str()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// `originHash` arguments of diff-from-current-bundle calls.
    pub fn origin_hashes(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == "downloadPatchFromPpk")
            .map(|(_, arg)| arg.clone())
            .collect()
    }

    fn record(&self, method: &str, arg: Option<&str>) -> UpdateResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), arg.map(str::to_string)));
        if self.failing.lock().unwrap().contains(method) {
            return Err(UpdateError::Native(format!("{method} failed")));
        }
        Ok(())
    }

    async fn simulate_download(&self, method: &str, arg: Option<&str>) -> UpdateResult<()> {
        self.record(method, arg)?;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let script = self.progress_script.lock().unwrap().clone();
        for sample in script {
            let _ = self.progress.send(sample);
        }
        Ok(())
    }
}

#[async_trait]
impl NativeModule for MockNative {
    fn constants(&self) -> NativeConstants {
        self.constants.clone()
    }

    fn progress_events(&self) -> broadcast::Receiver<ProgressSample> {
        self.progress.subscribe()
    }

    async fn set_local_hash_info(&self, hash: &str, json: &str) -> UpdateResult<()> {
        self.record("setLocalHashInfo", Some(hash))?;
        self.put_hash_info(hash, json);
        Ok(())
    }

    async fn get_local_hash_info(&self, hash: &str) -> UpdateResult<Option<String>> {
        Ok(self.hash_info(hash))
    }

    async fn download_patch_from_current_bundle(
        &self,
        _url: &str,
        _hash: &str,
        origin_hash: Option<&str>,
    ) -> UpdateResult<()> {
        self.simulate_download("downloadPatchFromPpk", origin_hash)
            .await
    }

    async fn download_patch_from_package(&self, _url: &str, hash: &str) -> UpdateResult<()> {
        self.simulate_download("downloadPatchFromPackage", Some(hash))
            .await
    }

    async fn download_full_update(&self, _url: &str, hash: &str) -> UpdateResult<()> {
        self.simulate_download("downloadFullUpdate", Some(hash)).await
    }

    async fn reload_update(&self, hash: &str) -> UpdateResult<()> {
        self.record("reloadUpdate", Some(hash))
    }

    async fn set_need_update_on_next_launch(&self, hash: &str) -> UpdateResult<()> {
        self.record("setNeedUpdate", Some(hash))
    }

    async fn mark_success(&self) -> UpdateResult<()> {
        self.record("markSuccess", None)
    }

    async fn set_block_window(&self, window: &BlockWindow) -> UpdateResult<()> {
        self.record("setBlockUpdate", Some(&window.reason))
    }

    async fn set_uuid(&self, uuid: &str) -> UpdateResult<()> {
        self.record("setUuid", Some(uuid))
    }

    async fn request_storage_permission(&self) -> UpdateResult<PermissionStatus> {
        self.record("requestStoragePermission", None)?;
        Ok(*self.permission.lock().unwrap())
    }

    async fn download_and_install_apk(
        &self,
        _url: &str,
        target_file: &str,
        _hash: &str,
    ) -> UpdateResult<()> {
        self.record("downloadAndInstallApk", Some(target_file))
    }
}

// ── Transport ───────────────────────────────────────────

/// Scripted server. Unknown URLs behave like unreachable hosts.
#[derive(Default)]
pub struct MockTransport {
    posts: Mutex<HashMap<String, Option<TransportResponse>>>,
    gets: Mutex<HashMap<String, serde_json::Value>>,
    post_log: Mutex<Vec<(String, serde_json::Value)>>,
    get_log: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_post(&self, url: &str, status: u16, body: &str) {
        self.posts.lock().unwrap().insert(
            url.to_string(),
            Some(TransportResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub fn fail_post(&self, url: &str) {
        self.posts.lock().unwrap().insert(url.to_string(), None);
    }

    pub fn on_get(&self, url: &str, value: serde_json::Value) {
        self.gets.lock().unwrap().insert(url.to_string(), value);
    }

    pub fn post_count(&self, url: &str) -> usize {
        self.post_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }

    pub fn last_post_body(&self) -> Option<serde_json::Value> {
        self.post_log.lock().unwrap().last().map(|(_, b)| b.clone())
    }

    pub fn get_count(&self) -> usize {
        self.get_log.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckTransport for MockTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> UpdateResult<TransportResponse> {
        self.post_log
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        let route = self.posts.lock().unwrap().get(url).cloned().flatten();
        route.ok_or_else(|| UpdateError::Other(format!("connection refused: {url}")))
    }

    async fn get_json(&self, url: &str) -> UpdateResult<serde_json::Value> {
        self.get_log.lock().unwrap().push(url.to_string());
        let value = self.gets.lock().unwrap().get(url).cloned();
        value.ok_or_else(|| UpdateError::Other(format!("connection refused: {url}")))
    }
}

// ── HTTP server ─────────────────────────────────────────

/// Canned answer of `serve_http` for one path.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    /// Announces `declared` bytes, sends `body`, then hangs up.
    Truncated { declared: usize, body: Vec<u8> },
}

/// Serves `routes` on an ephemeral localhost port and returns the base url.
/// Unknown paths get a 404.
pub async fn serve_http(routes: Vec<(&str, Reply)>) -> String {
    let routes: Arc<HashMap<String, Reply>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, reply)| (path.to_string(), reply))
            .collect(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                let reply = routes.get(&path).cloned().unwrap_or(Reply::Status(404));
                let (status, declared, body) = match reply {
                    Reply::Body(body) => (200, body.len(), body),
                    Reply::Status(code) => (code, 0, Vec::new()),
                    Reply::Truncated { declared, body } => (200, declared, body),
                };
                let reason = if status == 200 { "OK" } else { "Error" };
                let header = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Direct client for `serve_http`; proxy variables must not reroute localhost.
pub fn local_http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

// ── Client ──────────────────────────────────────────────

pub fn test_options() -> ClientOptions {
    let mut options = ClientOptions::new("app-key").with_server(ServerConfig {
        main: "https://main.test".into(),
        backups: vec!["https://backup1.test".into(), "https://backup2.test".into()],
        query_url: None,
    });
    options.enforce_release_build = false;
    options
}

/// Client wired to the given doubles, with a private reporter whose events
/// are collected in the returned vector.
pub async fn test_client(
    native: Arc<MockNative>,
    transport: Arc<MockTransport>,
    clock: Arc<ManualClock>,
) -> (UpdateClient, Arc<Mutex<Vec<UpdateEvent>>>) {
    let reporter = Arc::new(EventReporter::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    reporter.set_sink(Arc::new(move |event: &UpdateEvent| {
        sink_events.lock().unwrap().push(event.clone());
    }));

    let client = UpdateClient::builder(test_options())
        .native(native)
        .transport(transport)
        .clock(clock)
        .reporter(reporter)
        .build()
        .await
        .unwrap();
    (client, events)
}
