//! Error taxonomy shared by all craftmon crates.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{source_name} unavailable at {}", path.display())]
    SourceUnavailable {
        source_name: &'static str,
        path: PathBuf,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {source_name}: {detail}")]
    Parse {
        source_name: &'static str,
        detail: String,
    },

    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MonitorError {
    /// Build the right variant for a failed read of an input source:
    /// a missing file is `SourceUnavailable`, anything else is `Read`.
    pub fn from_read(source_name: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::SourceUnavailable { source_name, path }
        } else {
            Self::Read { path, source: err }
        }
    }

    pub fn parse(source_name: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            source_name,
            detail: detail.into(),
        }
    }

    /// True for errors the caller should treat as "try again next cycle".
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}
