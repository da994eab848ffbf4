use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum CorpusError {
    Network {
        url: String,
        message: String,
    },
    Filesystem {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidPath {
        path: PathBuf,
        why: &'static str,
    },
    Archive {
        path: PathBuf,
        message: String,
    },
    UnsupportedEntry {
        path: PathBuf,
        kind: String,
    },
    UnsupportedFormat {
        url: String,
    },
}

impl CorpusError {
    pub fn category(&self) -> &'static str {
        match self {
            CorpusError::Network { .. } => "network",
            CorpusError::Filesystem { .. }
            | CorpusError::InvalidPath { .. }
            | CorpusError::Archive { .. } => "filesystem",
            CorpusError::UnsupportedEntry { .. } => "unsupported_entry",
            CorpusError::UnsupportedFormat { .. } => "unsupported_format",
        }
    }
}

impl std::fmt::Display for CorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusError::Network { url, message } => write!(f, "GET {url}: {message}"),
            CorpusError::Filesystem { op, path, source } => {
                write!(f, "{op} {}: {source}", path.display())
            }
            CorpusError::InvalidPath { path, why } => {
                write!(f, "invalid archive path {}: {why}", path.display())
            }
            CorpusError::Archive { path, message } => {
                write!(f, "read archive {}: {message}", path.display())
            }
            CorpusError::UnsupportedEntry { path, kind } => {
                write!(f, "unsupported archive entry kind {kind}: {}", path.display())
            }
            CorpusError::UnsupportedFormat { url } => {
                write!(f, "unsupported archive format: {url}")
            }
        }
    }
}

impl std::error::Error for CorpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorpusError::Filesystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub(crate) fn fs_err<'a>(
    op: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> CorpusError + 'a {
    move |source| CorpusError::Filesystem {
        op,
        path: path.to_path_buf(),
        source,
    }
}
