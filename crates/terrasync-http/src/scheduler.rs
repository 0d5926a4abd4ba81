//! The background worker that drains the sync queue.
//!
//! One OS thread runs a current-thread tokio runtime and owns everything the
//! synchronizer touches: mirror pools, manifest caches and statistics.
//! Callers share only the queue, the cancellation token, the wake signal and
//! a published snapshot of the tile map.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use terrasync::target::by_name;
use terrasync::{
    MirrorPool, MirrorSource, MirrorStats, Root, RunReport, SyncError, SyncEvent, SyncTarget,
    TileMap, TileName,
};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::downloader::{Downloader, DownloaderConfig};
use crate::synchronizer::{EventSink, RootSession, SyncOptions, TreeSync};

/// How long the idle worker sleeps before looking at the queue again.
const IDLE_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Enabled roots, in the order they are synced for each target.
    pub roots: Vec<Root>,
    /// Directories whose local manifest is younger than this are skipped
    /// when a request asks for age checking.
    pub max_age: Duration,
    pub downloader: DownloaderConfig,
}

#[derive(Debug, Clone)]
struct QueuedTarget {
    target: SyncTarget,
    age_check: bool,
}

struct Shared {
    roots: Vec<Root>,
    queue: Mutex<Vec<QueuedTarget>>,
    cancel: Mutex<CancellationToken>,
    stop: CancellationToken,
    wake: Notify,
    tiles: Mutex<TileMap>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn current_cancel(&self) -> CancellationToken {
        lock(&self.cancel).clone()
    }

    fn pop_front(&self) -> Option<QueuedTarget> {
        let mut queue = lock(&self.queue);
        (!queue.is_empty()).then(|| queue.remove(0))
    }

    fn queue_is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}

/// Serializes sync requests onto a single background worker.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the `terrasync-worker` thread.
    ///
    /// The returned receiver yields progress events; the worker never waits
    /// for it to be drained.
    pub fn start(
        config: SchedulerConfig,
        source: Arc<dyn MirrorSource>,
    ) -> Result<(Self, UnboundedReceiver<SyncEvent>), SyncError> {
        let downloader = Downloader::new(&config.downloader)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            tiles: Mutex::new(TileMap::scan(&config.roots)),
            roots: config.roots,
            queue: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            stop: CancellationToken::new(),
            wake: Notify::new(),
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            source,
            downloader,
            events: EventSink::new(tx),
            max_age: config.max_age,
        };
        let handle = std::thread::Builder::new()
            .name("terrasync-worker".into())
            .spawn(move || worker.run())?;

        Ok((
            Self {
                shared,
                worker: Mutex::new(Some(handle)),
            },
            rx,
        ))
    }

    /// Queue targets, keeping the queue sorted by name, and wake the worker.
    ///
    /// A pending cancellation is cleared so the new work runs.
    pub fn enqueue(&self, targets: impl IntoIterator<Item = SyncTarget>, age_check: bool) {
        {
            let mut queue = lock(&self.shared.queue);
            queue.extend(targets.into_iter().map(|target| QueuedTarget { target, age_check }));
            queue.sort_by(|a, b| by_name(&a.target, &b.target));
        }
        {
            let mut cancel = lock(&self.shared.cancel);
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
        }
        self.shared.wake.notify_one();
    }

    /// Abort the running pass and drop everything still queued.
    pub fn cancel(&self) {
        lock(&self.shared.cancel).cancel();
        lock(&self.shared.queue).clear();
    }

    /// Cancel and stop the worker for good.
    pub fn quit(&self) {
        self.shared.stop.cancel();
        self.cancel();
        self.shared.wake.notify_one();
    }

    /// Wait for the worker thread to exit. Call after [`Scheduler::quit`].
    pub fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("sync worker panicked");
            }
        }
    }

    /// False once the worker has exited, whether by quitting or by panicking.
    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Targets still waiting, in processing order.
    pub fn queue(&self) -> Vec<SyncTarget> {
        lock(&self.shared.queue)
            .iter()
            .map(|q| q.target.clone())
            .collect()
    }

    /// The most recently published tile map.
    pub fn tiles(&self) -> TileMap {
        lock(&self.shared.tiles).clone()
    }

    /// Remove tiles from disk, from the tile map and from the queue.
    pub fn delete(&self, tiles: &[TileName]) -> io::Result<()> {
        lock(&self.shared.queue)
            .retain(|q| q.target.tile().is_none_or(|tile| !tiles.contains(&tile)));

        let mut map = lock(&self.shared.tiles);
        for tile in tiles {
            if map.delete(tile)? {
                tracing::info!(%tile, "deleted tile");
            }
        }
        Ok(())
    }

    /// Rescan the local roots and replace the tile map.
    pub fn rebuild_tile_map(&self) {
        let scanned = TileMap::scan(&self.shared.roots);
        *lock(&self.shared.tiles) = scanned;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.quit();
    }
}

struct Worker {
    shared: Arc<Shared>,
    source: Arc<dyn MirrorSource>,
    downloader: Downloader,
    events: EventSink,
    max_age: Duration,
}

impl Worker {
    fn run(self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "failed to start sync runtime");
                return;
            }
        };
        runtime.block_on(self.run_loop());
        tracing::debug!("sync worker stopped");
    }

    async fn run_loop(&self) {
        while !self.shared.stop.is_cancelled() {
            if self.shared.queue_is_empty() {
                tokio::select! {
                    _ = self.shared.stop.cancelled() => break,
                    _ = tokio::time::timeout(IDLE_WAIT, self.shared.wake.notified()) => {}
                }
                continue;
            }
            self.run_pass().await;
        }
    }

    /// Drain the queue once, with fresh mirror pools and manifest caches.
    async fn run_pass(&self) {
        let cancel = self.shared.current_cancel();
        self.events.send(SyncEvent::Started);

        let mut sessions = Vec::with_capacity(self.shared.roots.len());
        for root in &self.shared.roots {
            let mirrors = self.source.mirrors(&root.name).await;
            if mirrors.is_empty() {
                tracing::warn!(root = %root.name, "no mirrors configured");
            }
            sessions.push(RootSession::new(root.clone(), MirrorPool::new(mirrors)));
        }

        let mut report = RunReport::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(queued) = self.shared.pop_front() else {
                break;
            };
            tracing::info!(name = %queued.target.name(), "syncing target");

            let options = SyncOptions {
                age_check: queued.age_check,
                max_age: self.max_age,
            };
            let mut found = TileMap::new();
            for session in &mut sessions {
                let local_base: PathBuf = queued.target.local_base(&session.root).to_path_buf();
                for ty in queued.target.directory_types(&session.root) {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let remote_path = queued.target.remote_path(ty);
                    let mut sync = TreeSync::new(
                        session,
                        &self.downloader,
                        &mut found,
                        &self.events,
                        &cancel,
                        &local_base,
                        options,
                    );
                    report.updates += sync.sync_directory(&remote_path, false, ty).await;
                }
            }
            lock(&self.shared.tiles).merge(found);

            if !cancel.is_cancelled() {
                report.targets += 1;
            }
        }

        report.cancelled = cancel.is_cancelled();
        report.mirrors = merge_stats(&sessions);
        tracing::info!(
            updates = report.updates,
            targets = report.targets,
            cancelled = report.cancelled,
            "sync pass finished"
        );
        self.events.send(SyncEvent::Finished(report));
    }
}

/// One entry per mirror URL across all roots, sorted by URL.
fn merge_stats(sessions: &[RootSession]) -> Vec<MirrorStats> {
    let mut by_url: HashMap<String, MirrorStats> = HashMap::new();
    for stats in sessions.iter().flat_map(|s| s.pool.report()) {
        match by_url.get_mut(&stats.url) {
            Some(merged) => {
                merged.bytes += stats.bytes;
                merged.downloads += stats.downloads;
                merged.time += stats.time;
                merged.errors += stats.errors;
                merged.unchanged += stats.unchanged;
                merged.demoted |= stats.demoted;
                if stats.last_error.is_some() {
                    merged.last_error = stats.last_error;
                }
            }
            None => {
                by_url.insert(stats.url.clone(), stats);
            }
        }
    }
    let mut all: Vec<_> = by_url.into_values().collect();
    all.sort_by(|a, b| a.url.cmp(&b.url));
    all
}
