//! Which tiles exist locally, per root and directory type.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::directory::{DirectoryType, Root};
use crate::manifest::ARCHIVE_SUFFIX;
use crate::tile::TileName;

/// Local paths of one tile, keyed by `(root name, directory type)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileData {
    paths: BTreeMap<(String, DirectoryType), PathBuf>,
}

impl TileData {
    /// Remember `path` for `(root, ty)`; ignored unless the path exists.
    pub fn record(&mut self, root: &str, ty: DirectoryType, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        self.paths
            .insert((root.to_owned(), ty), path.to_path_buf());
        true
    }

    pub fn path(&self, root: &str, ty: DirectoryType) -> Option<&Path> {
        self.paths
            .get(&(root.to_owned(), ty))
            .map(PathBuf::as_path)
    }

    pub fn has(&self, ty: DirectoryType) -> bool {
        self.paths.keys().any(|(_, t)| *t == ty)
    }

    /// True if every tile type enabled by `root` is present for it.
    pub fn has_all(&self, root: &Root) -> bool {
        let mut types = root.tile_types().peekable();
        types.peek().is_some()
            && types.all(|ty| self.paths.contains_key(&(root.name.clone(), ty)))
    }

    pub fn types(&self) -> impl Iterator<Item = DirectoryType> + '_ {
        self.paths.keys().map(|(_, ty)| *ty)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, DirectoryType, &Path)> {
        self.paths
            .iter()
            .map(|((root, ty), path)| (root.as_str(), *ty, path.as_path()))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every recorded directory and its `<tile>.txz` sibling from disk.
    ///
    /// Paths that are already gone are not an error.
    pub fn delete(&mut self) -> io::Result<()> {
        for path in self.paths.values() {
            remove_dir_if_present(path)?;
            if let Some(archive) = archive_sibling(path) {
                remove_file_if_present(&archive)?;
            }
        }
        self.paths.clear();
        Ok(())
    }
}

fn archive_sibling(dir: &Path) -> Option<PathBuf> {
    let name = dir.file_name()?.to_str()?;
    Some(dir.with_file_name(format!("{name}{ARCHIVE_SUFFIX}")))
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// All locally known tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileMap {
    tiles: BTreeMap<TileName, TileData>,
}

impl TileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map by scanning `<root>/<Type>/<10x10>/<1x1>` for each root.
    pub fn scan(roots: &[Root]) -> Self {
        let mut map = Self::new();
        for root in roots {
            map.scan_root(root);
        }
        map
    }

    fn scan_root(&mut self, root: &Root) {
        for ty in root.tile_types() {
            let type_dir = root.local_dir.join(ty.dirname());
            for (_, container) in tile_dirs(&type_dir) {
                for (tile, path) in tile_dirs(&container) {
                    self.record(tile, &root.name, ty, &path);
                }
            }
        }
    }

    pub fn record(&mut self, tile: TileName, root: &str, ty: DirectoryType, path: &Path) -> bool {
        let data = self.tiles.entry(tile).or_default();
        let recorded = data.record(root, ty, path);
        if data.is_empty() {
            self.tiles.remove(&tile);
        }
        recorded
    }

    /// Fold another map's records into this one; `other` wins on conflicts.
    pub fn merge(&mut self, other: TileMap) {
        for (tile, data) in other.tiles {
            self.tiles.entry(tile).or_default().paths.extend(data.paths);
        }
    }

    pub fn get(&self, tile: &TileName) -> Option<&TileData> {
        self.tiles.get(tile)
    }

    pub fn contains(&self, tile: &TileName) -> bool {
        self.tiles.contains_key(tile)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileName, &TileData)> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Delete a tile's files and forget it. Unknown tiles are a no-op.
    pub fn delete(&mut self, tile: &TileName) -> io::Result<bool> {
        match self.tiles.remove(tile) {
            Some(mut data) => {
                data.delete()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Subdirectories of `dir` whose names parse as tile names.
fn tile_dirs(dir: &Path) -> Vec<(TileName, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let tile = e.file_name().to_str()?.parse().ok()?;
            Some((tile, e.path()))
        })
        .collect()
}
