//! Orchestration of the copy pipeline
//!
//! ```text
//! discovery --(bounded work queue)--> dispatch --(outcome channel)--> aggregation
//!     \_____________________ skip / directory outcomes ______________/
//! ```
//!
//! Shutdown runs strictly in stage order: the work queue is closed only after discovery
//! returned, the outcome channel only after every dispatched copy finished, and the
//! summary is read only after aggregation drained the outcome channel.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::aggregate::aggregate;
use crate::copy;
use crate::dispatch::dispatch;
use crate::error::Error;
use crate::flat;
use crate::task::{CopyTask, Outcome, Summary};
use crate::walk;

/// Capacity of the outcome channel feeding the aggregation stage.
pub const OUTCOME_BUFFER: usize = 64;
/// Default work queue depth when walking a tree.
pub const TREE_QUEUE_DEPTH: usize = 5;
/// Default work queue depth for an explicit list of files.
pub const FLAT_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    /// Capacity of the work queue between discovery and dispatch
    pub queue_depth: usize,
    /// Maximum number of copies running at once, 0 means unbounded
    pub max_in_flight: usize,
    pub copy: copy::Settings,
}

impl Settings {
    #[must_use]
    pub fn tree_default() -> Self {
        Self {
            queue_depth: TREE_QUEUE_DEPTH,
            max_in_flight: 0,
            copy: copy::Settings::default(),
        }
    }

    #[must_use]
    pub fn flat_default() -> Self {
        Self {
            queue_depth: FLAT_QUEUE_DEPTH,
            max_in_flight: 0,
            copy: copy::Settings::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_depth == 0 {
            return Err(anyhow!("queue depth must be greater than 0"));
        }
        Ok(())
    }
}

/// Handle used by discovery to feed the pipeline.
#[derive(Clone, Debug)]
pub struct Producer {
    work_tx: mpsc::Sender<CopyTask>,
    outcome_tx: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
}

impl Producer {
    pub(crate) fn new(
        work_tx: mpsc::Sender<CopyTask>,
        outcome_tx: mpsc::Sender<Outcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            work_tx,
            outcome_tx,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queues a copy, waiting while the work queue is full.
    ///
    /// Returns false if the pipeline was cancelled, in which case the task has been
    /// reported as cancelled instead.
    pub async fn submit(&self, task: CopyTask) -> bool {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.work_tx.reserve() => permit.ok(),
        };
        match permit {
            Some(permit) => {
                permit.send(task);
                true
            }
            None => {
                self.report(Error::Cancelled { path: task.src }.into())
                    .await;
                false
            }
        }
    }

    /// Sends an outcome straight to the aggregation stage.
    pub async fn report(&self, outcome: Outcome) {
        if self.outcome_tx.send(outcome).await.is_err() {
            tracing::error!("outcome channel closed while discovery was still running");
        }
    }
}

/// Runs discovery, dispatch and aggregation to completion and returns the tally.
pub async fn run_pipeline<D, DFut>(
    settings: &Settings,
    cancel: CancellationToken,
    discover: D,
) -> anyhow::Result<Summary>
where
    D: FnOnce(Producer) -> DFut,
    DFut: std::future::Future<Output = ()> + Send + 'static,
{
    settings.validate()?;
    let (work_tx, work_rx) = mpsc::channel::<CopyTask>(settings.queue_depth);
    let (outcome_tx, outcome_rx) = mpsc::channel::<Outcome>(OUTCOME_BUFFER);
    let aggregator = tokio::spawn(aggregate(outcome_rx));
    let copy_settings = settings.copy;
    let dispatcher = tokio::spawn(dispatch(
        work_rx,
        outcome_tx.clone(),
        throttle::Limiter::new(settings.max_in_flight),
        cancel.clone(),
        move |task| copy::copy_task(task, copy_settings),
    ));
    let producer = Producer::new(work_tx.clone(), outcome_tx.clone(), cancel);
    let discovery = tokio::spawn(discover(producer));
    if let Err(error) = discovery.await {
        tracing::error!("discovery did not complete: {}", &error);
    }
    // no more tasks
    drop(work_tx);
    let dispatched = dispatcher.await.context("dispatch did not complete")?;
    tracing::debug!("all {} dispatched copies finished", dispatched);
    // no more outcomes
    drop(outcome_tx);
    aggregator.await.context("aggregation did not complete")
}

/// Mirrors the directory tree `src` into `dst`.
#[instrument(skip(settings, cancel))]
pub async fn extract_tree(
    src: &Path,
    dst: &Path,
    settings: &Settings,
    cancel: CancellationToken,
) -> anyhow::Result<Summary> {
    let src = src.to_owned();
    let dst = dst.to_owned();
    run_pipeline(settings, cancel, move |producer| async move {
        let submitted = walk::walk(&src, &dst, &producer).await;
        tracing::debug!("discovered {} files under {:?}", submitted, &src);
    })
    .await
}

/// Copies every path in `paths` to the same relative location under `dst_root`.
#[instrument(skip(paths, settings, cancel))]
pub async fn extract_files(
    paths: Vec<PathBuf>,
    dst_root: &Path,
    create_parents: bool,
    settings: &Settings,
    cancel: CancellationToken,
) -> anyhow::Result<Summary> {
    let dst_root = dst_root.to_owned();
    run_pipeline(settings, cancel, move |producer| async move {
        let submitted = flat::enumerate(paths, &dst_root, create_parents, &producer).await;
        tracing::debug!("queued {} files", submitted);
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn tree_scenario() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = testutils::setup_test_tree(tmp_dir.path())?;
        let dst = tmp_dir.path().join("b");
        let summary = extract_tree(
            &src,
            &dst,
            &Settings::tree_default(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(summary.files_copied, 2);
        assert_eq!(summary.bytes_copied, 5);
        assert_eq!(summary.entries_skipped, 1);
        assert_eq!(summary.failures, 0);
        // b, b/sub, b/empty
        assert_eq!(summary.directories_created, 3);
        assert_eq!(std::fs::read_to_string(dst.join("x.txt"))?, "hi");
        assert_eq!(testutils::file_mode(&dst.join("x.txt"))?, 0o644);
        assert_eq!(std::fs::read_to_string(dst.join("sub").join("y.txt"))?, "bye");
        assert_eq!(testutils::file_mode(&dst.join("sub").join("y.txt"))?, 0o600);
        assert!(dst.join("empty").is_dir());
        assert!(std::fs::symlink_metadata(dst.join("link")).is_err());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn second_run_restores_modes() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = testutils::setup_test_tree(tmp_dir.path())?;
        let dst = tmp_dir.path().join("b");
        let settings = Settings::tree_default();
        extract_tree(&src, &dst, &settings, CancellationToken::new()).await?;
        testutils::create_file(&dst.join("x.txt"), "tampered with", 0o755)?;
        let summary = extract_tree(&src, &dst, &settings, CancellationToken::new()).await?;
        assert_eq!(summary.files_copied, 2);
        assert_eq!(summary.directories_created, 0);
        assert_eq!(std::fs::read_to_string(dst.join("x.txt"))?, "hi");
        assert_eq!(testutils::file_mode(&dst.join("x.txt"))?, 0o644);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[traced_test]
    async fn bounded_tree_copy_accounts_for_every_file() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        for dir in ["d0", "d1", "d1/d2"] {
            std::fs::create_dir_all(src.join(dir))?;
            testutils::create_files(&src.join(dir), 40)?;
        }
        testutils::create_files(&src, 40)?;
        let dst = tmp_dir.path().join("dst");
        let settings = Settings {
            queue_depth: 2,
            max_in_flight: 3,
            ..Settings::tree_default()
        };
        let summary = extract_tree(&src, &dst, &settings, CancellationToken::new()).await?;
        assert_eq!(summary.files_copied, 160);
        assert_eq!(summary.failures, 0);
        assert_eq!(
            std::fs::read_to_string(dst.join("d1").join("d2").join("39.txt"))?,
            "39"
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn source_must_be_a_directory() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("file.txt");
        testutils::create_file(&src, "not a dir", 0o644)?;
        let dst = tmp_dir.path().join("dst");
        let summary = extract_tree(
            &src,
            &dst,
            &Settings::tree_default(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(summary.files_copied, 0);
        assert_eq!(summary.failures, 1);
        assert!(!dst.exists());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn flat_scenario() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let ok = tmp_dir.path().join("ok.txt");
        testutils::create_file(&ok, "ok", 0o640)?;
        let out = tmp_dir.path().join("out");
        std::fs::create_dir(&out)?;
        let summary = extract_files(
            vec![tmp_dir.path().join("missing.txt"), ok.clone()],
            &out,
            true,
            &Settings::flat_default(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(summary.files_copied, 1);
        assert_eq!(summary.failures, 1);
        let copied = flat::mirror_path(&out, &ok);
        assert_eq!(std::fs::read_to_string(&copied)?, "ok");
        assert_eq!(testutils::file_mode(&copied)?, 0o640);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn absolute_path_under_filesystem_root_is_not_erased() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let precious = tmp_dir.path().join("precious.txt");
        testutils::create_file(&precious, "precious", 0o644)?;
        // "/" is the default output root, an absolute path then maps onto itself
        let summary = extract_files(
            vec![precious.clone()],
            Path::new("/"),
            false,
            &Settings::flat_default(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(summary.files_copied, 0);
        assert_eq!(summary.failures, 1);
        assert_eq!(std::fs::read_to_string(&precious)?, "precious");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn tree_onto_itself_is_not_erased() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = testutils::setup_test_tree(tmp_dir.path())?;
        let summary = extract_tree(
            &src,
            &src,
            &Settings::tree_default(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(summary.files_copied, 0);
        assert_eq!(summary.failures, 2);
        assert_eq!(std::fs::read_to_string(src.join("x.txt"))?, "hi");
        assert_eq!(std::fs::read_to_string(src.join("sub").join("y.txt"))?, "bye");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn cancelled_run_copies_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        testutils::create_files(tmp_dir.path(), 3)?;
        let out = tmp_dir.path().join("out");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let paths = (0..3)
            .map(|i| tmp_dir.path().join(format!("{i}.txt")))
            .collect();
        let summary =
            extract_files(paths, &out, true, &Settings::flat_default(), cancel).await?;
        assert_eq!(summary.files_copied, 0);
        assert_eq!(summary.failures, 3);
        assert!(!out.exists());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn zero_queue_depth_is_rejected() {
        let settings = Settings {
            queue_depth: 0,
            ..Settings::tree_default()
        };
        let res = extract_tree(
            Path::new("/nonexistent"),
            Path::new("/nonexistent-dst"),
            &settings,
            CancellationToken::new(),
        )
        .await;
        assert!(res.is_err());
    }
}
