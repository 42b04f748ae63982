use crate::task::{Outcome, Summary};

/// Drains the outcome channel into a [`Summary`].
///
/// This is the only consumer of the channel and the only owner of the tally, outcomes
/// from every concurrent producer are applied one at a time. Returns once every sender
/// is gone.
pub async fn aggregate(mut outcome_rx: tokio::sync::mpsc::Receiver<Outcome>) -> Summary {
    let mut summary = Summary::default();
    while let Some(outcome) = outcome_rx.recv().await {
        match outcome {
            Outcome::Copied { src, dst, bytes } => {
                tracing::info!("copied {:?} to {:?}", src, dst);
                summary.files_copied += 1;
                summary.bytes_copied += bytes;
            }
            Outcome::DirectoryCreated { path } => {
                tracing::debug!("created directory {:?}", path);
                summary.directories_created += 1;
            }
            Outcome::Failed(error) if error.is_skip() => {
                tracing::warn!("{}", &error);
                summary.entries_skipped += 1;
            }
            Outcome::Failed(error) => {
                tracing::error!("{:#}", anyhow::Error::new(error));
                summary.failures += 1;
            }
        }
    }
    summary
}
