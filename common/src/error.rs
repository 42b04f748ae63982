//! Per-entry error taxonomy
//!
//! Every variant is scoped to a single file or directory: it is sent to the aggregation
//! sink as an [`Outcome::Failed`](crate::Outcome::Failed) and never aborts sibling work.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{path:?} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("cannot stat {path:?}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?} is not a regular file")]
    NotAFile { path: PathBuf },
    #[error("cannot open {path:?} for reading")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open {path:?} for writing")]
    OpenDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot list directory {path:?}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{src:?} and {dst:?} are the same file")]
    SameFile { src: PathBuf, dst: PathBuf },
    #[error("cannot chmod {path:?}")]
    Chmod {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot copy {src:?} to {dst:?}")]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot sync {path:?}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot close {path:?}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("skipping symlink {path:?}")]
    SkippedSymlink { path: PathBuf },
    #[error("skipping {path:?}, unsupported file type: {file_type:?}")]
    SkippedSpecial {
        path: PathBuf,
        file_type: std::fs::FileType,
    },
    #[error("cancelled before copying {path:?}")]
    Cancelled { path: PathBuf },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotADirectory,
    Stat,
    NotAFile,
    OpenSource,
    OpenDestination,
    CreateDir,
    ListDir,
    SameFile,
    Chmod,
    Copy,
    Sync,
    Close,
    SkippedSymlink,
    SkippedSpecial,
    Cancelled,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotADirectory { .. } => ErrorKind::NotADirectory,
            Error::Stat { .. } => ErrorKind::Stat,
            Error::NotAFile { .. } => ErrorKind::NotAFile,
            Error::OpenSource { .. } => ErrorKind::OpenSource,
            Error::OpenDestination { .. } => ErrorKind::OpenDestination,
            Error::CreateDir { .. } => ErrorKind::CreateDir,
            Error::ListDir { .. } => ErrorKind::ListDir,
            Error::SameFile { .. } => ErrorKind::SameFile,
            Error::Chmod { .. } => ErrorKind::Chmod,
            Error::Copy { .. } => ErrorKind::Copy,
            Error::Sync { .. } => ErrorKind::Sync,
            Error::Close { .. } => ErrorKind::Close,
            Error::SkippedSymlink { .. } => ErrorKind::SkippedSymlink,
            Error::SkippedSpecial { .. } => ErrorKind::SkippedSpecial,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Skips are warnings reported through the failure channel, not real failures.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SkippedSymlink | ErrorKind::SkippedSpecial
        )
    }

    /// The path the error is about (the destination for errors naming both ends).
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Error::NotADirectory { path }
            | Error::Stat { path, .. }
            | Error::NotAFile { path }
            | Error::OpenSource { path, .. }
            | Error::OpenDestination { path, .. }
            | Error::CreateDir { path, .. }
            | Error::ListDir { path, .. }
            | Error::Chmod { path, .. }
            | Error::Sync { path, .. }
            | Error::Close { path, .. }
            | Error::SkippedSymlink { path }
            | Error::SkippedSpecial { path, .. }
            | Error::Cancelled { path } => path,
            Error::Copy { dst, .. } | Error::SameFile { dst, .. } => dst,
        }
    }
}
