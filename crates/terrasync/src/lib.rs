pub mod directory;
pub mod error;
pub mod event;
pub mod manifest;
pub mod mirror;
pub mod stats;
pub mod target;
pub mod tile;
pub mod tile_state;

pub use directory::{DirectoryType, Root, RootKind};
pub use error::SyncError;
pub use event::{Progress, SyncEvent};
pub use manifest::{EntryKind, Manifest, ManifestEntry, ManifestLookup};
pub use mirror::{Mirror, MirrorPool, MirrorSource, StaticMirrors};
pub use stats::{MirrorStats, RunReport};
pub use target::SyncTarget;
pub use tile::{TileName, TileNameError};
pub use tile_state::{TileData, TileMap};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
