use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use terrasync::manifest::{MANIFEST_FILENAME, join_remote};
use terrasync::{Manifest, Mirror, MirrorStats, RootKind, SyncError};
use tokio_util::sync::CancellationToken;

use crate::downloader::{Downloader, Fetch};

/// Local path of a slash-separated remote path below `base`.
pub fn local_path(base: &Path, remote: &str) -> PathBuf {
    remote
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}

/// Remote manifests fetched during one sync run, keyed by `(mirror, path)`.
///
/// A fresh index is created for every run so changes on the server are
/// picked up by the next one.
#[derive(Debug, Default)]
pub struct ManifestIndex {
    cache: HashMap<(String, String), Arc<Manifest>>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The manifest of `remote_path` as served by `mirror`.
    ///
    /// A fetched body is written to `<local_base>/<remote_path>/.dirindex`
    /// before it is parsed. Missing or empty manifests come back empty and
    /// are not cached.
    pub async fn get(
        &mut self,
        downloader: &dyn Fetch,
        mirror: &Mirror,
        stats: &mut MirrorStats,
        remote_path: &str,
        local_base: &Path,
        cancel: &CancellationToken,
    ) -> Result<Arc<Manifest>, SyncError> {
        let key = (mirror.url.clone(), remote_path.to_owned());
        if let Some(manifest) = self.cache.get(&key) {
            return Ok(Arc::clone(manifest));
        }

        let url_path = join_remote(remote_path, MANIFEST_FILENAME);
        let body = match downloader.fetch(mirror, &url_path, stats, cancel).await? {
            Some(body) if !body.is_empty() => body,
            _ => {
                tracing::debug!(mirror = %mirror.url, path = remote_path, "no manifest");
                return Ok(Arc::new(Manifest::default()));
            }
        };

        let local_dir = local_path(local_base, remote_path);
        fs::create_dir_all(&local_dir)?;
        fs::write(local_dir.join(MANIFEST_FILENAME), &body)?;

        let manifest = Arc::new(Manifest::parse(&String::from_utf8_lossy(&body)));
        self.cache.insert(key, Arc::clone(&manifest));
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// The `.dirindex` last persisted for a local directory.
#[derive(Debug, Clone, Default)]
pub struct LocalManifest {
    pub manifest: Manifest,
    /// Time since the file was last written; `None` if there is no file.
    pub age: Option<Duration>,
}

impl LocalManifest {
    pub fn read(local_dir: &Path) -> Self {
        let path = local_dir.join(MANIFEST_FILENAME);
        let Ok(text) = fs::read_to_string(&path) else {
            return Self::default();
        };
        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(|modified| {
                SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or(Duration::ZERO)
            });
        Self {
            manifest: Manifest::parse(&text),
            age,
        }
    }

    /// True if the snapshot exists and is younger than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age.is_some_and(|age| age < max_age)
    }
}

/// Classify a mirror's dataset from its top-level manifest.
pub async fn probe_root(
    downloader: &Downloader,
    mirror: &Mirror,
    cancel: &CancellationToken,
) -> Result<(RootKind, Manifest), SyncError> {
    let mut stats = MirrorStats::new(&mirror.url, mirror.weight);
    let body = downloader
        .fetch(mirror, MANIFEST_FILENAME, &mut stats, cancel)
        .await?
        .unwrap_or_default();
    let manifest = Manifest::parse(&String::from_utf8_lossy(&body));
    Ok((RootKind::detect(&manifest.directory_types()), manifest))
}
