use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::task::{CopyTask, Outcome};

async fn report_cancelled(outcome_tx: &mpsc::Sender<Outcome>, task: CopyTask) {
    let outcome = Error::Cancelled { path: task.src }.into();
    if outcome_tx.send(outcome).await.is_err() {
        tracing::error!("outcome channel closed while dispatch was still running");
    }
}

fn log_join_error(res: Result<(), tokio::task::JoinError>) {
    if let Err(error) = res {
        tracing::error!("copy task failed to complete: {}", &error);
    }
}

/// Drains the work queue, running `execute` for every task on its own tokio task.
///
/// Before spawning, a permit is taken from `limiter`; while all permits are out the queue
/// is not drained, so a saturated pool pushes back on discovery. Every spawned task sends
/// exactly one outcome. Returns the number of dispatched tasks, and only after all of them
/// have finished.
///
/// On cancellation the queue is closed and every task still in it is reported as
/// cancelled; copies that already started run to completion.
pub async fn dispatch<E, Fut>(
    mut work_rx: mpsc::Receiver<CopyTask>,
    outcome_tx: mpsc::Sender<Outcome>,
    limiter: throttle::Limiter,
    cancel: CancellationToken,
    execute: E,
) -> usize
where
    E: Fn(CopyTask) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Outcome> + Send + 'static,
{
    let mut join_set = tokio::task::JoinSet::new();
    let mut dispatched = 0;
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = work_rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report_cancelled(&outcome_tx, task).await;
                break;
            }
            permit = limiter.acquire() => permit,
        };
        let execute = execute.clone();
        let outcome_tx = outcome_tx.clone();
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let _permit = permit;
            let outcome = if cancel.is_cancelled() {
                Error::Cancelled { path: task.src }.into()
            } else {
                execute(task).await
            };
            if outcome_tx.send(outcome).await.is_err() {
                tracing::error!("outcome channel closed before all copies finished");
            }
        });
        dispatched += 1;
        // reap finished copies so the set only holds what is in flight
        while let Some(res) = join_set.try_join_next() {
            log_join_error(res);
        }
    }
    if cancel.is_cancelled() {
        work_rx.close();
        // a sender holding a reserved slot can still deliver after the close
        while let Some(task) = work_rx.recv().await {
            report_cancelled(&outcome_tx, task).await;
        }
    }
    drop(work_rx);
    while let Some(res) = join_set.join_next().await {
        log_join_error(res);
    }
    dispatched
}
