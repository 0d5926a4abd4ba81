use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::stats::MirrorStats;

/// How many times one run may refill an exhausted pool from its demoted mirrors.
pub const MAX_REPOPULATIONS: u32 = 10;

/// A base URL hosting a full copy of a dataset root, with its selection weight.
///
/// Two mirrors are the same mirror if their URLs match, whatever their weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mirror {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    100
}

impl Mirror {
    pub fn new(url: impl Into<String>, weight: u32) -> Self {
        Self {
            url: url.into(),
            weight,
        }
    }

    /// Absolute URL of a path below this mirror.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl PartialEq for Mirror {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Mirror {}

impl Hash for Mirror {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Supplies the candidate mirrors of a dataset root.
///
/// Discovery (DNS NAPTR records, a settings file) lives behind this seam;
/// the engine only needs `{url, weight}` pairs.
#[async_trait::async_trait]
pub trait MirrorSource: Send + Sync {
    async fn mirrors(&self, root: &str) -> Vec<Mirror>;
}

#[async_trait::async_trait]
impl<T: MirrorSource + ?Sized> MirrorSource for Arc<T> {
    async fn mirrors(&self, root: &str) -> Vec<Mirror> {
        (**self).mirrors(root).await
    }
}

/// A fixed mirror list per root, typically read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMirrors {
    by_root: HashMap<String, Vec<Mirror>>,
}

impl StaticMirrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<String>, mirrors: Vec<Mirror>) -> Self {
        self.insert(root, mirrors);
        self
    }

    pub fn insert(&mut self, root: impl Into<String>, mirrors: Vec<Mirror>) {
        self.by_root.insert(root.into(), mirrors);
    }
}

#[async_trait::async_trait]
impl MirrorSource for StaticMirrors {
    async fn mirrors(&self, root: &str) -> Vec<Mirror> {
        self.by_root.get(root).cloned().unwrap_or_default()
    }
}

/// Weighted pool of live mirrors for one root over one sync run.
///
/// Mirrors that fail at the transport level are demoted out of the live set;
/// they only come back when the live set runs dry and the pool refills.
pub struct MirrorPool {
    live: Vec<Mirror>,
    demoted: Vec<Mirror>,
    stats: HashMap<String, MirrorStats>,
    repopulations: u32,
    max_repopulations: u32,
    rng: StdRng,
}

impl MirrorPool {
    pub fn new(mirrors: Vec<Mirror>) -> Self {
        Self::with_rng(mirrors, StdRng::from_os_rng())
    }

    pub fn with_rng(mirrors: Vec<Mirror>, rng: StdRng) -> Self {
        let mut live: Vec<Mirror> = Vec::with_capacity(mirrors.len());
        for mirror in mirrors {
            if !live.contains(&mirror) {
                live.push(mirror);
            }
        }
        let stats = live
            .iter()
            .map(|m| (m.url.clone(), MirrorStats::new(&m.url, m.weight)))
            .collect();
        Self {
            live,
            demoted: Vec::new(),
            stats,
            repopulations: 0,
            max_repopulations: MAX_REPOPULATIONS,
            rng,
        }
    }

    pub fn with_max_repopulations(mut self, max: u32) -> Self {
        self.max_repopulations = max;
        self
    }

    /// Pick a live mirror with probability proportional to its weight.
    ///
    /// An empty live set is refilled from the demoted mirrors, at most
    /// `max_repopulations` times per pool; after that `None` is returned.
    pub fn select(&mut self) -> Option<Mirror> {
        if self.live.is_empty() {
            tracing::warn!("no mirrors left to sync with");
            if self.repopulations >= self.max_repopulations || self.demoted.is_empty() {
                return None;
            }
            self.repopulations += 1;
            self.repopulate();
        }

        let total: f64 = self.live.iter().map(|m| f64::from(m.weight)).sum();
        let mut remainder = self.rng.random::<f64>() * total;
        for mirror in &self.live {
            remainder -= f64::from(mirror.weight);
            if remainder <= 0.0 {
                return Some(mirror.clone());
            }
        }
        self.live.last().cloned()
    }

    /// Take a mirror out of the live set after a transport failure.
    pub fn demote(&mut self, mirror: &Mirror, error: &SyncError) {
        let stats = self.stats_mut(mirror);
        stats.last_error = Some(error.to_string());
        stats.demoted = true;

        if let Some(idx) = self.live.iter().position(|m| m == mirror) {
            let removed = self.live.remove(idx);
            tracing::warn!(mirror = %removed.url, %error, "demoting mirror");
            self.demoted.push(removed);
        }
    }

    fn repopulate(&mut self) {
        tracing::info!(count = self.demoted.len(), "readmitting demoted mirrors");
        for mirror in &self.demoted {
            if let Some(stats) = self.stats.get_mut(&mirror.url) {
                stats.demoted = false;
            }
        }
        self.live.append(&mut self.demoted);
    }

    pub fn has_live(&self) -> bool {
        !self.live.is_empty()
    }

    pub fn live(&self) -> &[Mirror] {
        &self.live
    }

    pub fn demoted(&self) -> &[Mirror] {
        &self.demoted
    }

    pub fn stats_mut(&mut self, mirror: &Mirror) -> &mut MirrorStats {
        self.stats
            .entry(mirror.url.clone())
            .or_insert_with(|| MirrorStats::new(&mirror.url, mirror.weight))
    }

    pub fn stats(&self, url: &str) -> Option<&MirrorStats> {
        self.stats.get(url)
    }

    /// Statistics of every mirror seen by this pool, sorted by URL.
    pub fn report(&self) -> Vec<MirrorStats> {
        let mut all: Vec<MirrorStats> = self.stats.values().cloned().collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(mirrors: Vec<Mirror>) -> MirrorPool {
        MirrorPool::with_rng(mirrors, StdRng::seed_from_u64(7))
    }

    fn refused() -> SyncError {
        SyncError::Connect {
            mirror: "a".into(),
            message: "refused".into(),
        }
    }

    #[test]
    fn equality_ignores_weight() {
        assert_eq!(Mirror::new("http://a/", 1), Mirror::new("http://a/", 99));
        assert_ne!(Mirror::new("http://a/", 1), Mirror::new("http://b/", 1));
    }

    #[test]
    fn url_for_joins_with_single_slash() {
        let mirror = Mirror::new("http://a/scenery/", 1);
        assert_eq!(
            mirror.url_for("/Terrain/.dirindex"),
            "http://a/scenery/Terrain/.dirindex"
        );
        assert_eq!(Mirror::new("http://a", 1).url_for("x"), "http://a/x");
    }

    #[test]
    fn selection_follows_weights() {
        let mut pool = seeded(vec![Mirror::new("http://a/", 75), Mirror::new("http://b/", 25)]);
        let draws = 20_000;
        let mut a = 0u32;
        for _ in 0..draws {
            if pool.select().unwrap().url == "http://a/" {
                a += 1;
            }
        }
        let b = draws - a;
        let ratio = f64::from(a) / f64::from(b);
        assert!((2.7..3.3).contains(&ratio), "ratio was {ratio}");
    }

    #[test]
    fn duplicate_urls_are_collapsed() {
        let pool = seeded(vec![Mirror::new("http://a/", 1), Mirror::new("http://a/", 5)]);
        assert_eq!(pool.live().len(), 1);
    }

    #[test]
    fn demoted_mirror_is_never_selected() {
        let a = Mirror::new("http://a/", 50);
        let b = Mirror::new("http://b/", 50);
        let mut pool = seeded(vec![a.clone(), b.clone()]);

        pool.demote(&a, &refused());
        for _ in 0..200 {
            assert_eq!(pool.select().unwrap(), b);
        }

        let stats = pool.stats("http://a/").unwrap();
        assert!(stats.demoted);
        assert!(stats.last_error.as_deref().unwrap().contains("refused"));
        assert_eq!(pool.demoted(), &[a]);
    }

    #[test]
    fn exhausted_pool_repopulates_a_bounded_number_of_times() {
        let a = Mirror::new("http://a/", 1);
        let mut pool = seeded(vec![a.clone()]).with_max_repopulations(2);

        for _ in 0..2 {
            pool.demote(&a, &refused());
            assert!(!pool.has_live());
            assert_eq!(pool.select(), Some(a.clone()));
            assert!(!pool.stats("http://a/").unwrap().demoted);
        }

        pool.demote(&a, &refused());
        assert_eq!(pool.select(), None);
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let mut pool = seeded(Vec::new());
        assert_eq!(pool.select(), None);
    }

    #[test]
    fn report_includes_demoted_mirrors_sorted() {
        let a = Mirror::new("http://a/", 1);
        let b = Mirror::new("http://b/", 1);
        let mut pool = seeded(vec![b.clone(), a.clone()]);
        pool.demote(&b, &refused());
        pool.stats_mut(&a).record_unchanged();

        let report = pool.report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].url, "http://a/");
        assert_eq!(report[0].unchanged, 1);
        assert!(report[1].demoted);
    }

    #[tokio::test]
    async fn static_mirrors_by_root() {
        let source = StaticMirrors::new().with_root("ws20", vec![Mirror::new("http://a/", 1)]);
        assert_eq!(source.mirrors("ws20").await.len(), 1);
        assert!(source.mirrors("o2c").await.is_empty());

        let shared: Arc<dyn MirrorSource> = Arc::new(source);
        assert_eq!(shared.mirrors("ws20").await.len(), 1);
    }
}
