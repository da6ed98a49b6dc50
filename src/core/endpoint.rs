// ─── Endpoint Resolver ───
// Primary update server plus an ordered, de-duplicated set of backups,
// optionally extended once from a remote JSON list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::core::config::ServerConfig;
use crate::core::http::CheckTransport;

pub fn build_check_url(app_key: &str, endpoint: &str) -> String {
    format!("{}/checkUpdate/{}", endpoint.trim_end_matches('/'), app_key)
}

pub struct EndpointResolver {
    main: String,
    query_url: Option<String>,
    backups: Mutex<Vec<String>>,
    remote_merged: AtomicBool,
}

impl EndpointResolver {
    pub fn new(server: &ServerConfig) -> Self {
        let mut backups = Vec::new();
        merge_unique(&mut backups, &server.main, server.backups.iter().cloned());

        Self {
            main: server.main.clone(),
            query_url: server.query_url.clone().filter(|u| !u.trim().is_empty()),
            backups: Mutex::new(backups),
            remote_merged: AtomicBool::new(false),
        }
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn check_url(&self, app_key: &str) -> String {
        build_check_url(app_key, &self.main)
    }

    /// Currently known backups, without contacting the network.
    pub fn known_backups(&self) -> Vec<String> {
        self.backups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Backup endpoints in insertion order, primary excluded.
    ///
    /// The remote list is merged at most once; a failed fetch leaves the
    /// known list untouched and is retried on the next call.
    pub async fn resolve_backups(&self, transport: &dyn CheckTransport) -> Vec<String> {
        let Some(query_url) = self.query_url.as_deref() else {
            return self.known_backups();
        };
        if self.remote_merged.load(Ordering::Acquire) {
            return self.known_backups();
        }

        match transport.get_json(query_url).await {
            Ok(serde_json::Value::Array(items)) => {
                let remote: Vec<String> = items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect();
                info!("Fetched remote endpoints: {:?}", remote);

                let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
                merge_unique(&mut backups, &self.main, remote);
                self.remote_merged.store(true, Ordering::Release);
                debug!("Merged backup endpoints: {:?}", *backups);
                backups.clone()
            }
            Ok(other) => {
                warn!("Endpoint list at {} is not an array: {}", query_url, other);
                self.known_backups()
            }
            Err(e) => {
                warn!("Failed to fetch endpoints from {}: {}", query_url, e);
                self.known_backups()
            }
        }
    }
}

fn merge_unique(target: &mut Vec<String>, main: &str, items: impl IntoIterator<Item = String>) {
    for item in items {
        let item = item.trim().to_string();
        if item.is_empty() || item == main || target.contains(&item) {
            continue;
        }
        target.push(item);
    }
}
