//! Media resolution
//!
//! Turns a track id into a local file the transport can open. The cached
//! resolver keeps one file per id and media kind under the download
//! directory and fills misses by running an external downloader.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Resolves track ids to playable files
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Local path for the track; `Error::MediaUnavailable` on failure
    async fn resolve(&self, track_id: &str, wants_video: bool) -> Result<PathBuf>;
}

/// Disk-cached resolver backed by a downloader program (yt-dlp compatible)
pub struct CachedResolver {
    download_dir: PathBuf,
    program: String,
    source_url_prefix: String,
    timeout: Duration,
    /// One lock per cache file; concurrent misses for a file share one download
    in_flight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl CachedResolver {
    pub fn new(
        download_dir: impl Into<PathBuf>,
        program: impl Into<String>,
        source_url_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            download_dir: download_dir.into(),
            program: program.into(),
            source_url_prefix: source_url_prefix.into(),
            timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.download_dir,
            &config.downloader,
            &config.source_url_prefix,
            config.resolve_timeout(),
        )
    }

    /// Where the file for `track_id` lives once downloaded
    pub fn cache_path(&self, track_id: &str, wants_video: bool) -> PathBuf {
        let ext = if wants_video { "mp4" } else { "webm" };
        self.download_dir.join(format!("{}.{}", track_id, ext))
    }

    fn downloader_args(&self, track_id: &str, wants_video: bool) -> Vec<String> {
        let template = self.download_dir.join("%(id)s.%(ext)s");
        let mut args = vec![
            "--quiet".to_string(),
            "--no-playlist".to_string(),
            "--geo-bypass".to_string(),
            "--no-warnings".to_string(),
            "--no-overwrites".to_string(),
            "--no-check-certificates".to_string(),
            "-o".to_string(),
            template.display().to_string(),
        ];
        if wants_video {
            args.push("-f".to_string());
            args.push("(bestvideo[height<=?720][width<=?1280][ext=mp4])+(bestaudio)".to_string());
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        } else {
            args.push("-f".to_string());
            args.push("bestaudio[ext=webm][acodec=opus]".to_string());
        }
        args.push(format!("{}{}", self.source_url_prefix, track_id));
        args
    }

    async fn download(&self, track_id: &str, wants_video: bool) -> Result<()> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let mut command = Command::new(&self.program);
        command
            .args(self.downloader_args(track_id, wants_video))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::MediaUnavailable(format!(
                    "failed to run {}: {}",
                    self.program, e
                )))
            }
            Err(_) => {
                return Err(Error::MediaUnavailable(format!(
                    "download of {} timed out after {}s",
                    track_id,
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Downloader failed for {}: {}", track_id, stderr.trim());
            return Err(Error::MediaUnavailable(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(())
    }

    async fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(path.to_path_buf()).or_default())
    }

    async fn release_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        drop(lock);
        // Only the map still holds it: nobody is waiting on this file
        if in_flight
            .get(path)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            in_flight.remove(path);
        }
    }
}

/// Track ids become file names; reject anything that could escape the cache dir
fn valid_track_id(track_id: &str) -> bool {
    !track_id.is_empty()
        && track_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl MediaResolver for CachedResolver {
    async fn resolve(&self, track_id: &str, wants_video: bool) -> Result<PathBuf> {
        if !valid_track_id(track_id) {
            return Err(Error::MediaUnavailable(format!("invalid track id {:?}", track_id)));
        }

        let path = self.cache_path(track_id, wants_video);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Cache hit for {}", path.display());
            return Ok(path);
        }

        let lock = self.file_lock(&path).await;
        let result = {
            let _guard = lock.lock().await;
            // Another caller may have finished the download while we waited
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                Ok(())
            } else {
                info!("Downloading {} (video={})", track_id, wants_video);
                self.download(track_id, wants_video).await
            }
        };
        self.release_lock(&path, lock).await;
        result?;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(path)
        } else {
            Err(Error::MediaUnavailable(format!(
                "downloader produced no file for {}",
                track_id
            )))
        }
    }
}
