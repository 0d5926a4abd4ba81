use std::time::Duration;

use serde::Serialize;

/// Transfer counters for one mirror over one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub url: String,
    pub weight: u32,
    pub bytes: u64,
    pub downloads: u64,
    #[serde(serialize_with = "millis")]
    pub time: Duration,
    pub errors: u64,
    pub unchanged: u64,
    pub last_error: Option<String>,
    pub demoted: bool,
}

impl MirrorStats {
    pub fn new(url: impl Into<String>, weight: u32) -> Self {
        Self {
            url: url.into(),
            weight,
            ..Self::default()
        }
    }

    pub fn record_download(&mut self, bytes: u64, elapsed: Duration) {
        self.downloads += 1;
        self.bytes += bytes;
        self.time += elapsed;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_unchanged(&mut self) {
        self.unchanged += 1;
    }

    /// Mean throughput in bytes per second, if anything was transferred.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.time.as_secs_f64();
        (self.bytes > 0 && secs > 0.0).then(|| self.bytes as f64 / secs)
    }
}

fn millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// End-of-run summary handed to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Every mirror used in the run, demoted ones included, sorted by URL.
    pub mirrors: Vec<MirrorStats>,
    /// Entries updated locally (files processed plus archive members extracted).
    pub updates: u64,
    /// Targets fully processed.
    pub targets: u64,
    pub cancelled: bool,
}

impl RunReport {
    pub fn demoted(&self) -> impl Iterator<Item = &MirrorStats> {
        self.mirrors.iter().filter(|m| m.demoted)
    }

    pub fn total_downloads(&self) -> u64 {
        self.mirrors.iter().map(|m| m.downloads).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.mirrors.iter().map(|m| m.bytes).sum()
    }

    pub fn total_unchanged(&self) -> u64 {
        self.mirrors.iter().map(|m| m.unchanged).sum()
    }

    pub fn mirror(&self, url: &str) -> Option<&MirrorStats> {
        self.mirrors.iter().find(|m| m.url == url)
    }
}
