use std::error::Error as _;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use terrasync::{Mirror, MirrorStats, SyncError};
use tokio_util::sync::CancellationToken;

/// Transport settings for [`Downloader`].
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(20),
            user_agent: format!("terrasync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Something that can fetch a mirror-relative path into memory.
///
/// The synchronizer talks to mirrors only through this trait.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// `Ok(None)` means the mirror answered with something other than 200.
    async fn fetch(
        &self,
        mirror: &Mirror,
        path: &str,
        stats: &mut MirrorStats,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, SyncError>;
}

/// Fetches whole resources from a mirror into memory.
///
/// Every request races against a [`CancellationToken`], so a cancelled sync
/// stops at the next network await instead of waiting out a slow server.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(config: &DownloaderConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SyncError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch `path` below `mirror`.
    ///
    /// Returns `Ok(None)` for any non-200 status, after counting an error
    /// against the mirror. Transport failures are classified so the caller
    /// can decide whether to demote the mirror.
    pub async fn fetch(
        &self,
        mirror: &Mirror,
        path: &str,
        stats: &mut MirrorStats,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, SyncError> {
        let url = mirror.url_for(path);
        let started = Instant::now();

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            sent = self.client.get(&url).send() => sent,
        };
        let mut response = sent.map_err(|e| {
            stats.record_error();
            classify(mirror, &e)
        })?;

        if response.status() != StatusCode::OK {
            stats.record_error();
            tracing::warn!(status = %response.status(), %url, "download failed");
            return Ok(None);
        }

        let capacity = response.content_length().unwrap_or(0).min(64 << 20);
        let mut body = Vec::with_capacity(capacity as usize);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                chunk = response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => body.extend_from_slice(&bytes),
                Ok(None) => break,
                Err(e) => {
                    stats.record_error();
                    return Err(classify(mirror, &e));
                }
            }
        }

        let elapsed = started.elapsed();
        stats.record_download(body.len() as u64, elapsed);
        tracing::debug!(%url, bytes = body.len(), ?elapsed, "downloaded");
        Ok(Some(body))
    }
}

#[async_trait]
impl Fetch for Downloader {
    async fn fetch(
        &self,
        mirror: &Mirror,
        path: &str,
        stats: &mut MirrorStats,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, SyncError> {
        Downloader::fetch(self, mirror, path, stats, cancel).await
    }
}

/// Sort a reqwest failure into the error classes the synchronizer acts on.
///
/// Timeouts stay transient. Failures to resolve, connect or complete a TLS
/// handshake are pinned on the mirror.
fn classify(mirror: &Mirror, err: &reqwest::Error) -> SyncError {
    let chain = error_chain(err);
    let lower = chain.to_ascii_lowercase();
    let mirror_url = mirror.url.clone();

    if err.is_timeout() {
        return SyncError::Network(format!("timed out: {chain}"));
    }
    if lower.contains("dns error") || lower.contains("failed to lookup address") {
        return SyncError::UnknownHost {
            mirror: mirror_url,
            message: chain,
        };
    }
    if mentions_tls_failure(&lower) || (err.is_connect() && has_io_kind(err, &[ErrorKind::InvalidData])) {
        return SyncError::Handshake {
            mirror: mirror_url,
            message: chain,
        };
    }
    if err.is_connect()
        || has_io_kind(
            err,
            &[ErrorKind::ConnectionReset, ErrorKind::ConnectionAborted, ErrorKind::BrokenPipe],
        )
    {
        return SyncError::Connect {
            mirror: mirror_url,
            message: chain,
        };
    }
    SyncError::Network(chain)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

/// TLS stacks report bad certificates and failed handshakes in these terms.
fn mentions_tls_failure(lower: &str) -> bool {
    ["certificate", "tls handshake", "handshake failure", "ssl routines", "ssl error"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// True if an `io::Error` of one of `kinds` sits in the source chain.
///
/// rustls surfaces alerts during the handshake as `InvalidData`.
fn has_io_kind(err: &reqwest::Error, kinds: &[ErrorKind]) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return kinds.contains(&io.kind());
        }
        source = inner.source();
    }
    false
}
