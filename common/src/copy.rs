use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use tracing::instrument;

use crate::error::Error;
use crate::task::{CopyTask, Outcome};

/// Permission bits carried over from source to destination.
pub const MODE_MASK: u32 = 0o7777;

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    /// Flush destination contents to stable storage before closing it
    pub fsync: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { fsync: true }
    }
}

/// Copies the contents and permission bits of `src` into `dst`.
///
/// Only regular files are copied. The destination is created or truncated once it is known
/// not to be `src` itself, its mode is always reapplied (opening an existing file does not
/// reset it) and it is closed exactly once on every path. When
/// a step fails after `dst` was opened, that failure is returned and a failing close
/// is only logged.
#[instrument(skip(settings))]
pub async fn copy_file(src: &Path, dst: &Path, settings: &Settings) -> Result<u64, Error> {
    let _open_file_guard = throttle::open_file_permit().await;
    tracing::debug!("opening 'src' for reading");
    let mut reader = tokio::fs::File::open(src)
        .await
        .map_err(|source| Error::OpenSource {
            path: src.to_owned(),
            source,
        })?;
    let src_metadata = reader.metadata().await.map_err(|source| Error::Stat {
        path: src.to_owned(),
        source,
    })?;
    if !src_metadata.is_file() {
        return Err(Error::NotAFile {
            path: src.to_owned(),
        });
    }
    let permissions =
        std::fs::Permissions::from_mode(src_metadata.permissions().mode() & MODE_MASK);
    tracing::debug!("opening 'dst' for writing");
    // not truncated on open, `dst` may turn out to be `src` itself
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .mode(permissions.mode())
        .open(dst)
        .await
        .map_err(|source| Error::OpenDestination {
            path: dst.to_owned(),
            source,
        })?;
    let dst_metadata = match writer.metadata().await {
        Ok(metadata) => metadata,
        Err(source) => {
            close_or_warn(writer, dst).await;
            return Err(Error::Stat {
                path: dst.to_owned(),
                source,
            });
        }
    };
    if (dst_metadata.dev(), dst_metadata.ino()) == (src_metadata.dev(), src_metadata.ino()) {
        close_or_warn(writer, dst).await;
        return Err(Error::SameFile {
            src: src.to_owned(),
            dst: dst.to_owned(),
        });
    }
    let written = write_contents(&mut reader, &mut writer, src, dst, permissions, settings).await;
    let closed = close_file(writer, dst).await;
    match (written, closed) {
        (Ok(bytes), Ok(())) => Ok(bytes),
        (Ok(_), Err(close_error)) => Err(close_error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close_error)) => {
            tracing::warn!("{:#}", anyhow::Error::new(close_error));
            Err(error)
        }
    }
}

async fn close_or_warn(file: tokio::fs::File, path: &Path) {
    if let Err(close_error) = close_file(file, path).await {
        tracing::warn!("{:#}", anyhow::Error::new(close_error));
    }
}

async fn write_contents(
    reader: &mut tokio::fs::File,
    writer: &mut tokio::fs::File,
    src: &Path,
    dst: &Path,
    permissions: std::fs::Permissions,
    settings: &Settings,
) -> Result<u64, Error> {
    tracing::debug!("setting permissions");
    writer
        .set_permissions(permissions)
        .await
        .map_err(|source| Error::Chmod {
            path: dst.to_owned(),
            source,
        })?;
    writer.set_len(0).await.map_err(|source| Error::Copy {
        src: src.to_owned(),
        dst: dst.to_owned(),
        source,
    })?;
    tracing::debug!("copying data");
    let bytes = tokio::io::copy(reader, writer)
        .await
        .map_err(|source| Error::Copy {
            src: src.to_owned(),
            dst: dst.to_owned(),
            source,
        })?;
    if settings.fsync {
        tracing::debug!("syncing 'dst'");
        writer.sync_all().await.map_err(|source| Error::Sync {
            path: dst.to_owned(),
            source,
        })?;
    }
    Ok(bytes)
}

/// Closes `file` observing the result, which dropping a file handle would discard.
async fn close_file(file: tokio::fs::File, path: &Path) -> Result<(), Error> {
    // waits for any in-flight background write before handing the descriptor back
    let fd = std::os::fd::OwnedFd::from(file.into_std().await);
    let closed = tokio::task::spawn_blocking(move || nix::unistd::close(fd))
        .await
        .map_err(std::io::Error::other)
        .and_then(|res| res.map_err(std::io::Error::from));
    closed.map_err(|source| Error::Close {
        path: path.to_owned(),
        source,
    })
}

/// Executes one dispatched task, turning its result into an [`Outcome`].
pub async fn copy_task(task: CopyTask, settings: Settings) -> Outcome {
    match copy_file(&task.src, &task.dst, &settings).await {
        Ok(bytes) => Outcome::Copied {
            src: task.src,
            dst: task.dst,
            bytes,
        },
        Err(error) => Outcome::Failed(error),
    }
}
