use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::directory::{DirectoryType, Root};
use crate::tile::TileName;

/// Something the scheduler can synchronize.
///
/// Tiles resolve their local base from the root being synced; bulk resources
/// carry an explicit base path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncTarget {
    /// A single 1°×1° tile across every enabled tile layer.
    Tile(TileName),
    /// The shared model library.
    Models { base_path: PathBuf },
    /// Airport data, optionally narrowed to one ICAO prefix (`KS` → `K/S`).
    Airports {
        base_path: PathBuf,
        icao_prefix: Option<String>,
    },
    /// Navigation data.
    NavData { base_path: PathBuf },
}

impl SyncTarget {
    /// Display name; the queue is ordered by it.
    pub fn name(&self) -> String {
        match self {
            Self::Tile(tile) => tile.to_string(),
            Self::Models { .. } => "Models".to_owned(),
            Self::Airports { .. } => "Airports".to_owned(),
            Self::NavData { .. } => "Navdata".to_owned(),
        }
    }

    /// Path fragment below a directory type; empty for whole-directory targets.
    pub fn relative_path(&self) -> String {
        match self {
            Self::Tile(tile) => tile.relative_path(),
            Self::Airports {
                icao_prefix: Some(icao),
                ..
            } => {
                let mut chars = icao.chars();
                match (chars.next(), chars.next()) {
                    (Some(first), Some(second)) => format!("{first}/{second}"),
                    (Some(first), None) => first.to_string(),
                    _ => String::new(),
                }
            }
            Self::Models { .. } | Self::Airports { .. } | Self::NavData { .. } => String::new(),
        }
    }

    /// Directory types this target wants from `root`.
    pub fn directory_types(&self, root: &Root) -> Vec<DirectoryType> {
        match self {
            Self::Tile(_) => root.tile_types().collect(),
            Self::Models { .. } => Self::bulk(root, DirectoryType::Models),
            Self::Airports { .. } => Self::bulk(root, DirectoryType::Airports),
            Self::NavData { .. } => Self::bulk(root, DirectoryType::Navdata),
        }
    }

    /// Explicit local base path, if this target carries one.
    pub fn base_path(&self) -> Option<&Path> {
        match self {
            Self::Tile(_) => None,
            Self::Models { base_path }
            | Self::Airports { base_path, .. }
            | Self::NavData { base_path } => Some(base_path.as_path()),
        }
    }

    /// Local directory the target is materialized under when syncing `root`.
    pub fn local_base<'a>(&'a self, root: &'a Root) -> &'a Path {
        self.base_path().unwrap_or(root.local_dir.as_path())
    }

    /// Remote path below the root for one directory type, e.g. `Terrain/e010n40/e012n45`.
    pub fn remote_path(&self, ty: DirectoryType) -> String {
        let fragment = self.relative_path();
        if fragment.is_empty() {
            ty.dirname().to_owned()
        } else {
            format!("{}/{fragment}", ty.dirname())
        }
    }

    pub fn tile(&self) -> Option<TileName> {
        match self {
            Self::Tile(tile) => Some(*tile),
            _ => None,
        }
    }

    fn bulk(root: &Root, ty: DirectoryType) -> Vec<DirectoryType> {
        if root.enables(ty) { vec![ty] } else { Vec::new() }
    }
}

impl From<TileName> for SyncTarget {
    fn from(tile: TileName) -> Self {
        Self::Tile(tile)
    }
}

/// Orders targets by name, the order the scheduler processes them in.
pub fn by_name(a: &SyncTarget, b: &SyncTarget) -> Ordering {
    a.name().cmp(&b.name())
}
