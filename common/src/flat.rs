use std::path::{Component, Path, PathBuf};

use tracing::instrument;

use crate::error::Error;
use crate::pipeline::Producer;
use crate::task::CopyTask;

/// Joins `root` with the full path of `src`, not just its file name.
///
/// Like a lexical join-and-clean: root and `.` components of `src` are dropped and `..`
/// removes the previously joined component. `..` never climbs above `root`.
pub fn mirror_path(root: &Path, src: &Path) -> PathBuf {
    let mut dst = root.to_path_buf();
    let mut depth = 0usize;
    for component in src.components() {
        match component {
            Component::Normal(name) => {
                dst.push(name);
                depth += 1;
            }
            Component::ParentDir => {
                if depth > 0 {
                    dst.pop();
                    depth -= 1;
                }
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    dst
}

/// Submits one copy task per path, returns how many were queued.
///
/// Every path is assumed to be a regular file. Parent directories of the destination
/// are only created when `create_parents` is set, otherwise a missing parent surfaces
/// as an open failure of that copy.
#[instrument(skip(paths, producer))]
pub async fn enumerate(
    paths: Vec<PathBuf>,
    dst_root: &Path,
    create_parents: bool,
    producer: &Producer,
) -> usize {
    let mut submitted = 0;
    for src in paths {
        if producer.is_cancelled() {
            producer.report(Error::Cancelled { path: src }.into()).await;
            continue;
        }
        let dst = mirror_path(dst_root, &src);
        if create_parents {
            if let Some(parent) = dst.parent() {
                if let Err(source) = tokio::fs::create_dir_all(parent).await {
                    producer
                        .report(
                            Error::CreateDir {
                                path: parent.to_owned(),
                                source,
                            }
                            .into(),
                        )
                        .await;
                    continue;
                }
            }
        }
        if producer.submit(CopyTask::new(src, dst)).await {
            submitted += 1;
        }
    }
    submitted
}
