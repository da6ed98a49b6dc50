use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::core::error::{UpdateError, UpdateResult};
use crate::core::version::ProgressSample;

/// Streaming downloader that publishes progress keyed by bundle hash.
pub struct Downloader {
    client: Client,
    progress: Option<broadcast::Sender<ProgressSample>>,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: broadcast::Sender<ProgressSample>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Download `url` to `dest`, publishing progress under `progress_key`.
    ///
    /// Writes to a `.part` sibling first and renames on completion, so a
    /// half-written file never sits at `dest`. Returns the byte count.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress_key: &str,
    ) -> UpdateResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let part = part_path(dest);

        let received = match self.write_part(response, &part, progress_key, total).await {
            Ok(received) => received,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {:?}: {}", part, cleanup);
                    }
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| UpdateError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, received);
        Ok(received)
    }

    /// Streams the body into `part`. The handle is closed before returning.
    async fn write_part(
        &self,
        response: reqwest::Response,
        part: &Path,
        progress_key: &str,
        total: u64,
    ) -> UpdateResult<u64> {
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| UpdateError::Io {
                path: part.to_path_buf(),
                source: e,
            })?;

        let mut received: u64 = 0;
        self.publish(progress_key, 0, total);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| UpdateError::Io {
                path: part.to_path_buf(),
                source: e,
            })?;
            received += chunk.len() as u64;
            self.publish(progress_key, received, total.max(received));
        }

        file.flush().await.map_err(|e| UpdateError::Io {
            path: part.to_path_buf(),
            source: e,
        })?;
        Ok(received)
    }

    fn publish(&self, hash: &str, received: u64, total: u64) {
        if let Some(progress) = &self.progress {
            // no subscribers is fine
            let _ = progress.send(ProgressSample {
                hash: hash.to_string(),
                received,
                total,
            });
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
