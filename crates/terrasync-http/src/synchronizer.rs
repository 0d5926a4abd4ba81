//! Recursive, manifest-driven reconciliation of a local tree with a mirror.
//!
//! Every remote directory publishes a `.dirindex`. The synchronizer walks
//! those manifests depth-first, descending only into directories whose hash
//! changed, downloading files whose local SHA-1 differs, and unpacking
//! archives that are missing or stale.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use terrasync::manifest::{ARCHIVE_SUFFIX, basename, join_remote, leaf_name, parent_path};
use terrasync::{
    DirectoryType, EntryKind, Manifest, ManifestEntry, Mirror, MirrorPool, Root, SyncError,
    SyncEvent, TileMap, TileName,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::digest::{sha1_bytes, sha1_file_if_exists};
use crate::downloader::Fetch;
use crate::manifest_index::{LocalManifest, ManifestIndex, local_path};

/// Per-root state for one sync run: the mirror pool and its manifest cache.
pub struct RootSession {
    pub root: Root,
    pub pool: MirrorPool,
    pub index: ManifestIndex,
}

impl RootSession {
    pub fn new(root: Root, pool: MirrorPool) -> Self {
        Self {
            root,
            pool,
            index: ManifestIndex::new(),
        }
    }
}

/// Where progress events go. Sending never blocks and a gone receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<SyncEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<SyncEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    fn extend(&self, n: u64) {
        if n > 0 {
            self.send(SyncEvent::Extend(n));
        }
    }

    fn advance(&self, n: u64) {
        if n > 0 {
            self.send(SyncEvent::Advance(n));
        }
    }
}

/// Options that apply to a single sync request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Skip directories whose local `.dirindex` is younger than `max_age`.
    pub age_check: bool,
    pub max_age: Duration,
}

/// Synchronizes remote paths of one root into one local base directory.
pub struct TreeSync<'a> {
    session: &'a mut RootSession,
    downloader: &'a dyn Fetch,
    tiles: &'a mut TileMap,
    events: &'a EventSink,
    cancel: &'a CancellationToken,
    local_base: &'a Path,
    options: SyncOptions,
}

impl<'a> TreeSync<'a> {
    pub fn new(
        session: &'a mut RootSession,
        downloader: &'a dyn Fetch,
        tiles: &'a mut TileMap,
        events: &'a EventSink,
        cancel: &'a CancellationToken,
        local_base: &'a Path,
        options: SyncOptions,
    ) -> Self {
        Self {
            session,
            downloader,
            tiles,
            events,
            cancel,
            local_base,
            options,
        }
    }

    /// Bring `remote_path` up to date, returning the number of local updates.
    ///
    /// The kind of `remote_path` comes from its parent's manifest. Mirrors
    /// failing with a handshake error are demoted and the next one is tried;
    /// any other failure abandons the path with zero updates.
    pub async fn sync_directory(&mut self, remote_path: &str, force: bool, ty: DirectoryType) -> u64 {
        while let Some(mirror) = self.session.pool.select() {
            if self.cancel.is_cancelled() {
                return 0;
            }
            match self.sync_with(&mirror, remote_path, force, ty).await {
                Ok(updates) => {
                    if ty.is_tile() {
                        self.record_tile(remote_path, ty);
                    }
                    return updates;
                }
                Err(SyncError::Cancelled) => return 0,
                Err(e) if e.retry_other_mirror() => {
                    self.session.pool.demote(&mirror, &e);
                }
                Err(e) if e.is_mirror_fatal() => {
                    self.session.pool.demote(&mirror, &e);
                    return 0;
                }
                Err(e) => {
                    tracing::warn!(mirror = %mirror.url, path = remote_path, error = %e, "sync failed");
                    return 0;
                }
            }
        }
        tracing::warn!(path = remote_path, root = %self.session.root.name, "no mirror available");
        0
    }

    async fn sync_with(
        &mut self,
        mirror: &Mirror,
        remote_path: &str,
        force: bool,
        ty: DirectoryType,
    ) -> Result<u64, SyncError> {
        let parent = parent_path(remote_path);
        let leaf = leaf_name(remote_path);
        let parent_manifest = self.manifest(mirror, parent).await?;
        let lookup = parent_manifest.lookup();

        match lookup.kind_of(basename(leaf)) {
            Some(EntryKind::Archive) => {
                let name = lookup
                    .full_name_of(basename(leaf))
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{leaf}{ARCHIVE_SUFFIX}"));
                self.process_archive(mirror, &join_remote(parent, &name), force, &parent_manifest)
                    .await
            }
            Some(EntryKind::Directory) => self.process_dir(mirror, remote_path, force, ty).await,
            Some(EntryKind::File) => {
                let entry = parent_manifest
                    .entry(leaf)
                    .cloned()
                    .unwrap_or_else(|| ManifestEntry {
                        kind: EntryKind::File,
                        name: leaf.to_owned(),
                        hash: lookup.hash_of(basename(leaf)).map(str::to_owned),
                        size: None,
                    });
                self.events.extend(1);
                self.reconcile_file(mirror, remote_path, &entry).await
            }
            None => {
                tracing::warn!(mirror = %mirror.url, path = remote_path, "not listed by its parent");
                Ok(0)
            }
        }
    }

    /// Reconcile the remote directory `path` with its local copy.
    ///
    /// Subdirectories go back through [`sync_directory`](Self::sync_directory),
    /// so a failing branch costs only its own updates. A cancelled run keeps
    /// the updates counted so far.
    pub async fn process_dir(
        &mut self,
        mirror: &Mirror,
        path: &str,
        force: bool,
        ty: DirectoryType,
    ) -> Result<u64, SyncError> {
        let local_dir = local_path(self.local_base, path);
        let snapshot = LocalManifest::read(&local_dir);

        if !force && self.options.age_check && snapshot.is_fresh(self.options.max_age) {
            let count = snapshot.manifest.len() as u64;
            tracing::debug!(path, count, "local manifest is fresh, skipping");
            self.events.extend(count);
            self.events.advance(count);
            return Ok(count);
        }

        let remote = self.manifest(mirror, path).await?;
        self.events.extend(remote.file_count() as u64);

        let mut updates = 0;
        for entry in remote.entries() {
            if self.cancel.is_cancelled() {
                return Ok(updates);
            }
            let child = join_remote(path, &entry.name);
            let result = match entry.kind {
                EntryKind::Directory => {
                    let stale = match (entry.hash.as_deref(), snapshot.manifest.hash_of(&entry.name)) {
                        (Some(remote_hash), Some(local_hash)) => remote_hash != local_hash,
                        _ => true,
                    };
                    if force || stale || !local_path(self.local_base, &child).exists() {
                        Ok(Box::pin(self.sync_directory(&child, force, ty)).await)
                    } else {
                        Ok(0)
                    }
                }
                EntryKind::File => self.reconcile_file(mirror, &child, entry).await,
                EntryKind::Archive => self.process_archive(mirror, &child, force, &remote).await,
            };
            match result {
                Ok(n) => updates += n,
                Err(SyncError::Cancelled) => return Ok(updates),
                Err(e) => return Err(e),
            }
        }
        Ok(updates)
    }

    /// Make one local file match its manifest entry.
    ///
    /// Always counts as one update. The download goes through a freshly
    /// selected mirror; if that mirror fails at the transport level it is
    /// demoted and only this file is given up.
    async fn reconcile_file(
        &mut self,
        manifest_mirror: &Mirror,
        path: &str,
        entry: &ManifestEntry,
    ) -> Result<u64, SyncError> {
        let local = local_path(self.local_base, path);
        let local_hash = sha1_file_if_exists(&local)?;
        if local_hash.is_none() {
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        if local_hash.is_some() && local_hash.as_deref() == entry.hash.as_deref() {
            self.session.pool.stats_mut(manifest_mirror).record_unchanged();
        } else if let Some(mirror) = self.session.pool.select() {
            match self.download(&mirror, path).await {
                Ok(Some(bytes)) => {
                    if let Some(expected) = entry.hash.as_deref() {
                        let actual = sha1_bytes(&bytes);
                        if actual != expected {
                            tracing::warn!(mirror = %mirror.url, path, %expected, %actual, "hash mismatch");
                        }
                    }
                    fs::write(&local, &bytes)?;
                }
                Ok(None) => {}
                Err(e) if e.is_mirror_fatal() => self.session.pool.demote(&mirror, &e),
                Err(e) => return Err(e),
            }
        }

        self.events.advance(1);
        Ok(1)
    }

    /// Refresh a packed archive and unpack it next to itself.
    async fn process_archive(
        &mut self,
        mirror: &Mirror,
        archive_path: &str,
        force: bool,
        parent_manifest: &Manifest,
    ) -> Result<u64, SyncError> {
        let declared = parent_manifest.hash_of(leaf_name(archive_path));
        let local = local_path(self.local_base, archive_path);
        let local_hash = sha1_file_if_exists(&local)?;

        let current = local_hash.is_some() && local_hash.as_deref() == declared;
        if current && !force {
            self.session.pool.stats_mut(mirror).record_unchanged();
            return Ok(0);
        }

        let Some(payload) = self.download(mirror, archive_path).await? else {
            return Ok(0);
        };
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&local, &payload)?;

        let dest = local.parent().unwrap_or(self.local_base);
        match archive::extract(&payload, dest) {
            Ok(written) => {
                tracing::debug!(path = archive_path, written, "unpacked archive");
                self.events.extend(written);
                self.events.advance(written);
                Ok(written)
            }
            Err(e) => {
                tracing::warn!(path = archive_path, error = %e, "failed to unpack archive");
                Ok(0)
            }
        }
    }

    async fn manifest(&mut self, mirror: &Mirror, path: &str) -> Result<Arc<Manifest>, SyncError> {
        let session = &mut *self.session;
        let stats = session.pool.stats_mut(mirror);
        session
            .index
            .get(self.downloader, mirror, stats, path, self.local_base, self.cancel)
            .await
    }

    async fn download(&mut self, mirror: &Mirror, path: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let stats = self.session.pool.stats_mut(mirror);
        self.downloader.fetch(mirror, path, stats, self.cancel).await
    }

    /// Remember `<Type>/<container>/<tile>` paths in the tile map.
    fn record_tile(&mut self, remote_path: &str, ty: DirectoryType) {
        let Ok(tile) = leaf_name(remote_path).parse::<TileName>() else {
            return;
        };
        if leaf_name(parent_path(remote_path)) != tile.container().to_string() {
            return;
        }
        let local = local_path(self.local_base, remote_path);
        if self.tiles.record(tile, &self.session.root.name, ty, &local) {
            tracing::debug!(%tile, %ty, "tile present");
        }
    }
}
