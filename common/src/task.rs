use std::path::PathBuf;

use crate::error::Error;

/// One file to copy. Duplicate destinations are allowed and race at the filesystem level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub src: PathBuf,
    pub dst: PathBuf,
}

impl CopyTask {
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Result of a single dispatched task or discovery event.
#[derive(Debug)]
pub enum Outcome {
    Copied {
        src: PathBuf,
        dst: PathBuf,
        bytes: u64,
    },
    DirectoryCreated {
        path: PathBuf,
    },
    Failed(Error),
}

impl From<Error> for Outcome {
    fn from(error: Error) -> Self {
        Outcome::Failed(error)
    }
}

/// Tally of a pipeline run, owned by the aggregation stage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub directories_created: usize,
    pub entries_skipped: usize,
    pub failures: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files copied: {}\n\
            bytes copied: {}\n\
            directories created: {}\n\
            entries skipped: {}\n\
            failures: {}",
            self.files_copied,
            bytesize::ByteSize(self.bytes_copied),
            self.directories_created,
            self.entries_skipped,
            self.failures,
        )
    }
}
