use std::sync::atomic::{AtomicUsize, Ordering};

use crate::manifest::EntryKind;
use crate::mirror::{Mirror, MirrorSource};

/// Builds `.dirindex` text for mock servers.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    path: String,
    lines: Vec<String>,
}

impl ManifestBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            lines: Vec::new(),
        }
    }

    pub fn dir(self, name: &str, hash: Option<&str>) -> Self {
        self.entry(EntryKind::Directory, name, hash, None)
    }

    pub fn file(self, name: &str, hash: &str, size: u64) -> Self {
        self.entry(EntryKind::File, name, Some(hash), Some(size))
    }

    pub fn archive(self, name: &str, hash: &str, size: u64) -> Self {
        self.entry(EntryKind::Archive, name, Some(hash), Some(size))
    }

    fn entry(mut self, kind: EntryKind, name: &str, hash: Option<&str>, size: Option<u64>) -> Self {
        let mut line = format!("{}:{name}", kind.tag());
        if let Some(hash) = hash {
            line.push(':');
            line.push_str(hash);
            if let Some(size) = size {
                line.push_str(&format!(":{size}"));
            }
        }
        self.lines.push(line);
        self
    }

    pub fn build(&self) -> String {
        let mut out = format!("version:1\npath:{}\n", self.path);
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// A mirror source that hands out a fixed list and counts lookups.
#[derive(Debug, Default)]
pub struct CountingMirrors {
    mirrors: Vec<Mirror>,
    lookups: AtomicUsize,
}

impl CountingMirrors {
    pub fn new(mirrors: Vec<Mirror>) -> Self {
        Self {
            mirrors,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MirrorSource for CountingMirrors {
    async fn mirrors(&self, _root: &str) -> Vec<Mirror> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.mirrors.clone()
    }
}
