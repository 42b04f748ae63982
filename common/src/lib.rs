//! Core library for the extraction tools
//!
//! Copies files out of a source location into a destination tree through a concurrent
//! pipeline. Two discovery modes feed the same pipeline:
//!
//! - [`extract_tree`] walks a directory tree and mirrors it into the destination
//! - [`extract_files`] copies an explicit list of files, each to its own path joined under
//!   the destination root
//!
//! # Pipeline
//!
//! Discovery submits [`CopyTask`]s into a bounded work queue; when the queue is full
//! discovery waits. The dispatch stage pulls tasks from the queue and runs every copy on
//! its own tokio task, optionally capped by `max_in_flight`. Every task and every discovery
//! event produces exactly one [`Outcome`] which is tallied into a [`Summary`] by a single
//! aggregation task. See [`pipeline`] for the shutdown ordering between the stages.
//!
//! # Error handling
//!
//! Failures are per-entry: a file that cannot be copied is logged and counted, the rest of
//! the run continues. Skipped entries (symlinks, special files) are counted separately and
//! never treated as failures.
//!
//! # Copy semantics
//!
//! Each regular file is copied with its permission bits (including setuid, setgid and
//! sticky), an existing destination is truncated and rewritten. Ownership, timestamps and
//! extended attributes are not preserved. Symlinks are skipped, never followed.
//!
//! # Throttling
//!
//! The number of simultaneously open copies and the rate at which discovery processes
//! directory entries can be limited process-wide, see [`ThrottleConfig`].

use std::io::IsTerminal;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

pub mod aggregate;
pub mod config;
pub mod copy;
pub mod dispatch;
pub mod error;
pub mod flat;
pub mod pipeline;
pub mod task;
pub mod walk;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};
pub use error::{Error, ErrorKind};
pub use pipeline::{Producer, Settings, extract_files, extract_tree};
pub use task::{CopyTask, Outcome, Summary};

/// Caps the default open files limit, the copies never need more than this.
const MAX_DEFAULT_OPEN_FILES: usize = 65_536;

/// Default limit on simultaneously open copies: 80% of the soft `RLIMIT_NOFILE`.
fn default_max_open_files() -> anyhow::Result<usize> {
    use nix::sys::resource::{Resource, getrlimit};
    let (soft, _hard) =
        getrlimit(Resource::RLIMIT_NOFILE).context("failed reading the open files limit")?;
    let soft = usize::try_from(soft).unwrap_or(usize::MAX);
    Ok((soft / 10 * 8).clamp(1, MAX_DEFAULT_OPEN_FILES))
}

/// Splits an operations-per-second budget into (tokens, interval) for the replenish loop.
///
/// The budget is replenished in up to 10 equal chunks per second to smooth out bursts,
/// using the largest chunk count that divides it so the rate is kept exactly.
fn ops_replenish_schedule(ops_throttle: usize) -> (usize, std::time::Duration) {
    let chunks = (1..=10u32)
        .rev()
        .find(|&chunks| ops_throttle % chunks as usize == 0)
        .unwrap_or(1);
    (
        ops_throttle / chunks as usize,
        std::time::Duration::from_secs(1) / chunks,
    )
}

fn setup_throttle(config: &ThrottleConfig) -> anyhow::Result<()> {
    let max_open_files = match config.max_open_files {
        Some(max_open_files) => max_open_files,
        None => default_max_open_files()?,
    };
    tracing::debug!("limiting open files to {}", max_open_files);
    throttle::set_max_open_files(max_open_files);
    if config.ops_throttle > 0 {
        let (tokens, interval) = ops_replenish_schedule(config.ops_throttle);
        throttle::init_ops_tokens(tokens);
        tokio::spawn(throttle::run_ops_replenish_thread(tokens, interval));
    }
    Ok(())
}

fn setup_logging(output: &OutputConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(output.log_level().into())
        .from_env_lossy();
    let res = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
    if let Err(error) = res {
        eprintln!("failed to initialize logging: {error}");
    }
}

/// Sets up logging, the tokio runtime and throttling, then runs `func` to completion.
///
/// Returns `None` if `func` failed or the runtime could not be created; the error has been
/// printed to stderr unless `quiet` was requested. On success the summary is printed to
/// stdout when `print_summary` is set.
pub fn run<Fut, S, Func>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle: ThrottleConfig,
    func: Func,
) -> Option<S>
where
    S: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<S>>,
    Func: FnOnce() -> Fut,
{
    setup_logging(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let res = builder
        .build()
        .context("failed to create the tokio runtime")
        .and_then(|runtime| {
            runtime.block_on(async move {
                setup_throttle(&throttle)?;
                func().await
            })
        });
    match res {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}
