/// Errors that can occur during sync operations.
///
/// Transport failures are split by how the synchronizer reacts to them:
/// handshake, connect and unknown-host failures take the mirror out of the
/// pool, everything else only aborts the branch being synced.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("TLS handshake with {mirror} failed: {message}")]
    Handshake { mirror: String, message: String },

    #[error("connection to {mirror} failed: {message}")]
    Connect { mirror: String, message: String },

    #[error("unknown host for {mirror}: {message}")]
    UnknownHost { mirror: String, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sync cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// True if the mirror that produced this error should be demoted.
    pub fn is_mirror_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. } | Self::Connect { .. } | Self::UnknownHost { .. }
        )
    }

    /// True if the failed directory should be retried right away on another mirror.
    ///
    /// Only handshake failures qualify; a refused connection or unresolvable
    /// host abandons the branch after demotion.
    pub fn retry_other_mirror(&self) -> bool {
        matches!(self, Self::Handshake { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
