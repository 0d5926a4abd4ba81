use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use terrasync::SyncError;
use xz2::read::XzDecoder;

const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];

/// Compression wrapped around a tar payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Xz,
    Gzip,
    None,
}

impl Compression {
    pub fn detect(payload: &[u8]) -> Self {
        if payload.starts_with(XZ_MAGIC) {
            Self::Xz
        } else if payload.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

/// Unpack a compressed tar payload into `dest`, overwriting existing files.
///
/// Returns the number of regular files written. Entries whose path would
/// land outside `dest` are skipped.
pub fn extract(payload: &[u8], dest: &Path) -> Result<u64, SyncError> {
    fs::create_dir_all(dest)?;

    let reader: Box<dyn Read + '_> = match Compression::detect(payload) {
        Compression::Xz => Box::new(XzDecoder::new(payload)),
        Compression::Gzip => Box::new(GzDecoder::new(payload)),
        Compression::None => Box::new(payload),
    };
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| SyncError::Extraction(format!("failed to read tar entries: {e}")))?;

    let mut written = 0;
    for entry_result in entries {
        let mut entry = entry_result
            .map_err(|e| SyncError::Extraction(format!("failed to read tar entry: {e}")))?;

        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| SyncError::Extraction(format!("failed to unpack entry: {e}")))?;

        if !unpacked {
            let path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
            tracing::warn!(%path, "skipping archive entry outside destination");
            continue;
        }
        if is_file {
            written += 1;
        }
    }

    Ok(written)
}
