pub mod archive;
pub mod digest;
pub mod downloader;
pub mod manifest_index;
pub mod scheduler;
pub mod synchronizer;

pub use downloader::{Downloader, DownloaderConfig, Fetch};
pub use manifest_index::{LocalManifest, ManifestIndex, local_path, probe_root};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use synchronizer::{EventSink, RootSession, SyncOptions, TreeSync};
