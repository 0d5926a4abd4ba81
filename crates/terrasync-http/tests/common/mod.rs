#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;
use terrasync::{DirectoryType, Mirror, MirrorPool, Root, TileMap};
use terrasync_http::digest::sha1_bytes;
use terrasync_http::{
    Downloader, DownloaderConfig, EventSink, Fetch, RootSession, SyncOptions, TreeSync,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TILE: &str = "Terrain/e010n40/e012n45";

pub fn ws20(dir: &Path) -> Root {
    Root::new("ws20", dir, vec![DirectoryType::Terrain])
}

/// Serve `body` at `url_path` for GET requests.
pub async fn serve(server: &MockServer, url_path: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

/// Paths of all requests the server has seen, in order.
pub async fn requested(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_owned())
        .collect()
}

/// Requests that were not for manifests.
pub async fn payload_requests(server: &MockServer) -> Vec<String> {
    requested(server)
        .await
        .into_iter()
        .filter(|p| !p.ends_with(".dirindex"))
        .collect()
}

pub fn tar_entries(builder: &mut tar::Builder<impl Write>, entries: &[(&str, &[u8])]) {
    for (entry_path, data) in entries {
        let mut header = tar::Header::new_gnu();
        if entry_path.ends_with('/') {
            header.set_path(entry_path).unwrap();
            header.set_size(0);
            header.set_mode(0o755);
            header.set_entry_type(tar::EntryType::Directory);
            header.set_cksum();
            builder.append(&header, std::io::empty()).unwrap();
        } else {
            header.set_path(entry_path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
    }
}

/// Build a .txz in memory. Paths ending in `/` become directory entries.
pub fn build_txz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    let mut builder = tar::Builder::new(encoder);
    tar_entries(&mut builder, entries);
    builder.into_inner().unwrap().finish().unwrap()
}

/// Build a .tar.gz in memory.
pub fn build_tgz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    tar_entries(&mut builder, entries);
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn sha(bytes: &[u8]) -> String {
    sha1_bytes(bytes)
}

/// Everything a [`TreeSync`] borrows, for driving it directly.
pub struct Harness {
    pub dir: TempDir,
    pub downloader: Downloader,
    pub tiles: TileMap,
    pub events: EventSink,
    pub cancel: CancellationToken,
    pub session: RootSession,
    pub options: SyncOptions,
    mirrors: Vec<Mirror>,
}

impl Harness {
    pub fn new(mirrors: Vec<Mirror>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let session = new_session(ws20(dir.path()), mirrors.clone());
        Self {
            dir,
            downloader: Downloader::new(&DownloaderConfig::default()).unwrap(),
            tiles: TileMap::new(),
            events: EventSink::none(),
            cancel: CancellationToken::new(),
            session,
            options: SyncOptions::default(),
            mirrors,
        }
    }

    pub fn single(server: &MockServer) -> Self {
        Self::new(vec![Mirror::new(server.uri(), 100)])
    }

    /// Start over with a new pool and an empty manifest cache, as a new run would.
    pub fn next_run(&mut self) {
        self.session = new_session(ws20(self.dir.path()), self.mirrors.clone());
    }

    pub fn sync(&mut self) -> TreeSync<'_> {
        TreeSync::new(
            &mut self.session,
            &self.downloader,
            &mut self.tiles,
            &self.events,
            &self.cancel,
            self.dir.path(),
            self.options,
        )
    }

    /// Like [`sync`](Self::sync), but talking to mirrors through `fetcher`.
    pub fn sync_via<'a>(&'a mut self, fetcher: &'a dyn Fetch) -> TreeSync<'a> {
        TreeSync::new(
            &mut self.session,
            fetcher,
            &mut self.tiles,
            &self.events,
            &self.cancel,
            self.dir.path(),
            self.options,
        )
    }

    pub fn local(&self, remote: &str) -> std::path::PathBuf {
        terrasync_http::local_path(self.dir.path(), remote)
    }
}

fn new_session(root: Root, mirrors: Vec<Mirror>) -> RootSession {
    RootSession::new(root, MirrorPool::with_rng(mirrors, StdRng::seed_from_u64(42)))
}
