use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use terrasync::{DirectoryType, Mirror, Root, StaticMirrors};
use terrasync_http::{DownloaderConfig, SchedulerConfig};

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Directory the roots are materialized under, one subdirectory per root.
    pub scenery_path: Option<PathBuf>,
    /// Directories synced more recently than this are skipped on age-checked requests.
    #[serde(default)]
    pub max_tile_age_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_roots")]
    pub roots: Vec<RootEntry>,
}

/// A dataset root and where it comes from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides `<scenery_path>/<name>`.
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub directory_types: Vec<DirectoryType>,
    #[serde(default)]
    pub mirrors: Vec<Mirror>,
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scenery_path: None,
            max_tile_age_secs: 0,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            roots: default_roots(),
        }
    }
}

/// Built-in roots: the classic world scenery and the OSM overlay.
pub fn default_roots() -> Vec<RootEntry> {
    vec![
        RootEntry {
            name: "ws20".into(),
            enabled: true,
            local_path: None,
            directory_types: vec![
                DirectoryType::Terrain,
                DirectoryType::Objects,
                DirectoryType::Models,
                DirectoryType::Airports,
            ],
            mirrors: vec![Mirror::new("http://terramaster.flightgear.org/terrasync/ws20/", 100)],
        },
        RootEntry {
            name: "o2c".into(),
            enabled: false,
            local_path: None,
            directory_types: vec![
                DirectoryType::Buildings,
                DirectoryType::Pylons,
                DirectoryType::Roads,
                DirectoryType::Details,
                DirectoryType::Trees,
            ],
            mirrors: Vec::new(),
        },
    ]
}

impl AppConfig {
    /// Configured scenery path, or `<data dir>/terrasync`.
    pub fn scenery_path(&self) -> PathBuf {
        self.scenery_path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("terrasync")))
            .unwrap_or_else(|| PathBuf::from("terrasync"))
    }

    pub fn enabled_roots(&self) -> Vec<Root> {
        let base = self.scenery_path();
        self.roots
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| {
                let local_dir = entry
                    .local_path
                    .clone()
                    .unwrap_or_else(|| base.join(&entry.name));
                Root::new(&entry.name, local_dir, entry.directory_types.clone())
            })
            .collect()
    }

    pub fn mirror_source(&self) -> StaticMirrors {
        let mut source = StaticMirrors::new();
        for entry in self.roots.iter().filter(|entry| entry.enabled) {
            source.insert(&entry.name, entry.mirrors.clone());
        }
        source
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            roots: self.enabled_roots(),
            max_age: Duration::from_secs(self.max_tile_age_secs),
            downloader: DownloaderConfig {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                read_timeout: Duration::from_secs(self.read_timeout_secs),
                ..DownloaderConfig::default()
            },
        }
    }
}

/// Config file path: `~/.config/terrasync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("terrasync").join("config.toml"))
}

/// Load config from `path` (or the default location), falling back to defaults.
pub fn load_config(path: Option<&Path>) -> AppConfig {
    let path = path.map(Path::to_path_buf).or_else(config_path);
    if let Some(path) = path
        && let Ok(contents) = std::fs::read_to_string(&path)
    {
        match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => return config,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config, using defaults"
            ),
        }
    }

    AppConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_only_ws20() {
        let config = AppConfig {
            scenery_path: Some("/scenery".into()),
            ..AppConfig::default()
        };
        let roots = config.enabled_roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "ws20");
        assert_eq!(roots[0].local_dir, Path::new("/scenery/ws20"));
        assert!(roots[0].enables(DirectoryType::Terrain));
    }

    #[test]
    fn parse_full_config_from_toml() {
        let toml_str = r#"
scenery_path = "/data/scenery"
max_tile_age_secs = 86400
read_timeout_secs = 60

[[roots]]
name = "ws20"
directory_types = ["terrain", "objects"]

[[roots.mirrors]]
url = "https://a.example/ws20/"
weight = 75

[[roots.mirrors]]
url = "https://b.example/ws20/"
weight = 25

[[roots]]
name = "o2c"
enabled = false
local_path = "/elsewhere/osm"
directory_types = ["buildings", "pylons"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_tile_age_secs, 86400);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.read_timeout_secs, 60);
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.roots[0].mirrors[1].weight, 25);
        assert!(!config.roots[1].enabled);
        assert_eq!(config.roots[1].local_path.as_deref(), Some(Path::new("/elsewhere/osm")));

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.roots.len(), 1);
        assert_eq!(scheduler.max_age, Duration::from_secs(86400));
        assert_eq!(scheduler.downloader.read_timeout, Duration::from_secs(60));
    }

    #[test]
    fn roots_default_when_omitted() {
        let config: AppConfig = toml::from_str("scenery_path = \"/s\"\n").unwrap();
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.read_timeout_secs, 20);
    }

    #[test]
    fn mirror_weight_defaults() {
        let toml_str = r#"
[[roots]]
name = "ws20"

[[roots.mirrors]]
url = "https://a.example/"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.roots[0].mirrors[0].weight, 100);
        assert!(config.roots[0].enabled);
    }

    #[tokio::test]
    async fn mirror_source_only_covers_enabled_roots() {
        use terrasync::MirrorSource;

        let source = AppConfig::default().mirror_source();
        assert_eq!(source.mirrors("ws20").await.len(), 1);
        assert!(source.mirrors("o2c").await.is_empty());
    }

    #[test]
    fn unreadable_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.roots.len(), 2);

        std::fs::write(&path, "max_tile_age_secs = 5\n").unwrap();
        assert_eq!(load_config(Some(&path)).max_tile_age_secs, 5);
    }
}
