//! Tree discovery
//!
//! Walks the source tree depth-first, mirroring every directory into the destination
//! and submitting one copy task per regular file. The walk is iterative: each level of
//! the tree holds one open directory listing on an explicit stack, so deep trees do not
//! grow the call stack. Entries are visited in listing order, a subdirectory is fully
//! walked before its next sibling.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::copy::MODE_MASK;
use crate::error::Error;
use crate::pipeline::Producer;
use crate::task::{CopyTask, Outcome};

struct Frame {
    src: PathBuf,
    dst: PathBuf,
    entries: tokio::fs::ReadDir,
}

/// Verifies `src` is a directory, makes sure `dst` exists and starts listing `src`.
///
/// Any failure is reported and the whole subtree is skipped.
#[instrument(skip(producer))]
async fn open_directory(src: &Path, dst: &Path, producer: &Producer) -> Option<Frame> {
    let src_metadata = match tokio::fs::metadata(src).await {
        Ok(metadata) => metadata,
        Err(source) => {
            producer
                .report(
                    Error::Stat {
                        path: src.to_owned(),
                        source,
                    }
                    .into(),
                )
                .await;
            return None;
        }
    };
    if !src_metadata.is_dir() {
        producer
            .report(
                Error::NotADirectory {
                    path: src.to_owned(),
                }
                .into(),
            )
            .await;
        return None;
    }
    let missing = match tokio::fs::metadata(dst).await {
        Ok(_) => false,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => true,
        Err(source) => {
            producer
                .report(
                    Error::Stat {
                        path: dst.to_owned(),
                        source,
                    }
                    .into(),
                )
                .await;
            return None;
        }
    };
    if let Err(source) = tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(src_metadata.permissions().mode() & MODE_MASK)
        .create(dst)
        .await
    {
        producer
            .report(
                Error::CreateDir {
                    path: dst.to_owned(),
                    source,
                }
                .into(),
            )
            .await;
        return None;
    }
    if missing {
        producer
            .report(Outcome::DirectoryCreated {
                path: dst.to_owned(),
            })
            .await;
    }
    match tokio::fs::read_dir(src).await {
        Ok(entries) => Some(Frame {
            src: src.to_owned(),
            dst: dst.to_owned(),
            entries,
        }),
        Err(source) => {
            producer
                .report(
                    Error::ListDir {
                        path: src.to_owned(),
                        source,
                    }
                    .into(),
                )
                .await;
            None
        }
    }
}

/// Mirrors the tree under `src` into `dst`, returns the number of submitted copy tasks.
///
/// Symlinks are reported and skipped, never followed. Other special files (fifos,
/// sockets, devices) are skipped the same way.
#[instrument(skip(producer))]
pub async fn walk(src: &Path, dst: &Path, producer: &Producer) -> usize {
    let mut submitted = 0;
    let mut stack = Vec::new();
    if let Some(root) = open_directory(src, dst, producer).await {
        stack.push(root);
    }
    loop {
        if producer.is_cancelled() {
            tracing::debug!("walk cancelled");
            break;
        }
        let Some(frame) = stack.last_mut() else {
            break;
        };
        let entry = match frame.entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                stack.pop();
                continue;
            }
            Err(source) => {
                let path = frame.src.clone();
                stack.pop();
                producer
                    .report(Error::ListDir { path, source }.into())
                    .await;
                continue;
            }
        };
        // throttle the syscalls generated per entry
        throttle::get_ops_token().await;
        let entry_path = entry.path();
        let dst_path = frame.dst.join(entry.file_name());
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(source) => {
                producer
                    .report(
                        Error::Stat {
                            path: entry_path,
                            source,
                        }
                        .into(),
                    )
                    .await;
                continue;
            }
        };
        if file_type.is_dir() {
            if let Some(child) = open_directory(&entry_path, &dst_path, producer).await {
                stack.push(child);
            }
        } else if file_type.is_symlink() {
            producer
                .report(Error::SkippedSymlink { path: entry_path }.into())
                .await;
        } else if !file_type.is_file() {
            producer
                .report(
                    Error::SkippedSpecial {
                        path: entry_path,
                        file_type,
                    }
                    .into(),
                )
                .await;
        } else if producer
            .submit(CopyTask::new(entry_path, dst_path))
            .await
        {
            submitted += 1;
        }
    }
    submitted
}
