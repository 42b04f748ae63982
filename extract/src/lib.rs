//! Concurrent file extraction tools - `extract` and `extract-files`
//!
//! Both tools copy regular files out of a source location into a destination tree,
//! running one copy per file concurrently while the source is still being discovered.
//!
//! # Tools
//!
//! ## extract - mirror a directory tree
//!
//! ```bash
//! # Mirror /data into /srv/out
//! extract -d /data -C /srv/out
//!
//! # Mirror into the current directory, at most 64 copies at once
//! extract -d /mnt/image --max-in-flight 64 --summary
//! ```
//!
//! Directories are recreated with the source permission bits, symlinks and other special
//! files are skipped with a warning.
//!
//! ## extract-files - copy listed files
//!
//! ```bash
//! # Copies /etc/hosts to /srv/out/etc/hosts (the parent must exist)
//! extract-files -C /srv/out /etc/hosts
//!
//! # Create missing parent directories
//! extract-files -C /srv/out --parents /etc/hosts /usr/share/dict/words
//! ```
//!
//! Each source path is joined to the output root in full, `..` components never climb
//! above the output root.
//!
//! # Exit status
//!
//! Failed copies are logged and counted but do not change the exit status unless
//! `--fail-on-error` is given. Interrupting with Ctrl-C or reaching `--timeout` lets the
//! copies already running finish, reports everything else as cancelled and exits with 1.

use std::path::PathBuf;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

/// Options shared by both tools.
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    // Pipeline
    /// Capacity of the queue between discovery and the copies (default: 5 for extract, 1024 for extract-files)
    #[arg(long, value_name = "N", help_heading = "Pipeline")]
    pub queue_depth: Option<usize>,

    /// Maximum number of copies running at once, 0 means unbounded
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Pipeline"
    )]
    pub max_in_flight: usize,

    /// Do not fsync copied files before closing them
    #[arg(long, help_heading = "Pipeline")]
    pub no_fsync: bool,

    /// Exit with an error if any file failed to copy (skipped entries do not count)
    #[arg(long, help_heading = "Pipeline")]
    pub fail_on_error: bool,

    /// Stop after the given time, copies already running are completed
    ///
    /// This option accepts a human readable duration, e.g. "30s", "10min" etc.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration, help_heading = "Pipeline")]
    pub timeout: Option<std::time::Duration>,

    // Output
    /// Verbose level: -v DEBUG / -vv TRACE (default: INFO)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    pub verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Output")]
    pub summary: bool,

    /// Quiet mode, no log output and no error report
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    pub quiet: bool,

    // Performance & throttling
    /// Maximum number of open files, 0 means no limit, leaving unspecified means using 80% of max open files system limit
    #[arg(long, value_name = "N", help_heading = "Performance & throttling")]
    pub max_open_files: Option<usize>,

    /// Throttle the number of directory entries discovered per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    pub ops_throttle: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    pub max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    pub max_blocking_threads: usize,
}

impl CommonArgs {
    #[must_use]
    pub fn output_config(&self) -> common::OutputConfig {
        common::OutputConfig {
            quiet: self.quiet,
            verbose: self.verbose,
            print_summary: self.summary,
        }
    }

    #[must_use]
    pub fn runtime_config(&self) -> common::RuntimeConfig {
        common::RuntimeConfig {
            max_workers: self.max_workers,
            max_blocking_threads: self.max_blocking_threads,
        }
    }

    #[must_use]
    pub fn throttle_config(&self) -> common::ThrottleConfig {
        common::ThrottleConfig {
            max_open_files: self.max_open_files,
            ops_throttle: self.ops_throttle,
        }
    }

    /// Pipeline settings, `defaults` provides the queue depth when none was given.
    #[must_use]
    pub fn settings(&self, defaults: common::Settings) -> common::Settings {
        common::Settings {
            queue_depth: self.queue_depth.unwrap_or(defaults.queue_depth),
            max_in_flight: self.max_in_flight,
            copy: common::copy::Settings {
                fsync: !self.no_fsync,
            },
        }
    }

    /// Turns the final tally into the process result.
    pub fn finish(
        &self,
        summary: common::Summary,
        cancelled: bool,
    ) -> anyhow::Result<common::Summary> {
        let reason = if cancelled {
            "extraction was cancelled"
        } else if self.fail_on_error && summary.failures > 0 {
            "extraction encountered errors"
        } else {
            return Ok(summary);
        };
        if self.summary {
            return Err(anyhow!("{}\n\n{}", reason, &summary));
        }
        Err(anyhow!("{}", reason))
    }
}

/// Output directory as given on the command line, empty means the current directory.
#[must_use]
pub fn output_dir(arg: &str) -> PathBuf {
    if arg.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(arg)
    }
}

async fn wait_for_cancellation(timeout: Option<std::time::Duration>) {
    let interrupted = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for Ctrl-C: {}", &error);
            std::future::pending::<()>().await;
        }
        tracing::warn!("interrupted, waiting for running copies to finish");
    };
    let deadline = async {
        match timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                tracing::warn!(
                    "timed out after {}, waiting for running copies to finish",
                    humantime::format_duration(timeout)
                );
            }
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        () = interrupted => {}
        () = deadline => {}
    }
}

/// Runs `func` with a token that is cancelled on Ctrl-C or once `timeout` elapses.
///
/// Returns the result of `func` together with whether cancellation happened.
pub async fn with_cancellation<T, F, Fut>(
    timeout: Option<std::time::Duration>,
    func: F,
) -> anyhow::Result<(T, bool)>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            wait_for_cancellation(timeout).await;
            cancel.cancel();
        })
    };
    let res = func(cancel.clone()).await;
    watcher.abort();
    Ok((res?, cancel.is_cancelled()))
}
