use std::io;
use std::path::PathBuf;

/// Failure of a single extractor while reading its artifact.
///
/// A pattern that matches nothing is not an error; only I/O and
/// decompression problems end up here.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to open artifact {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ExtractError::Open { path, .. } | ExtractError::Read { path, .. } => path,
        }
    }
}

/// Failure of a whole parse request.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("artifact directory {path} does not exist or is not a directory")]
    InvalidDirectory { path: PathBuf },

    #[error("failed to read device serial from {path}: {source}")]
    Serial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create crash record {path}: {source}")]
    RecordOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write crash record {path}: {source}")]
    RecordWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{tag} extraction failed: {source}")]
    Extraction {
        tag: String,
        #[source]
        source: ExtractError,
    },
}

impl ParseError {
    /// True when a crash record was left on disk despite the failure.
    pub fn record_written(&self) -> bool {
        matches!(
            self,
            ParseError::Extraction { .. } | ParseError::RecordWrite { .. }
        )
    }
}
