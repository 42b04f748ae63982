//! Resource throttling for the extraction pipeline
//!
//! Three independent mechanisms keep a large extraction from exhausting the machine:
//!
//! 1. **Open files limit** - a process-wide cap on simultaneously open copy operations,
//!    so that thousands of concurrent copies do not run into `EMFILE`.
//! 2. **Operations throttle** - a token bucket limiting how many directory entries
//!    discovery processes per second.
//! 3. **In-flight limit** - a [`Limiter`] owned by the dispatch stage, capping how many
//!    copies run at the same time.
//!
//! The first two are global and disabled until configured:
//!
//! ```rust,no_run
//! use throttle::{get_ops_token, init_ops_tokens, open_file_permit, run_ops_replenish_thread};
//! use std::time::Duration;
//!
//! # async fn example() {
//! throttle::set_max_open_files(8000);
//! // 100 entries per second: 10 tokens every 100ms
//! init_ops_tokens(10);
//! tokio::spawn(run_ops_replenish_thread(10, Duration::from_millis(100)));
//!
//! get_ops_token().await;
//! let _guard = open_file_permit().await;
//! // open files here, the permit is released when the guard is dropped
//! # }
//! ```
//!
//! The [`Limiter`] hands out owned permits so a permit can be moved into a spawned task:
//!
//! ```rust,no_run
//! # async fn example() {
//! let limiter = throttle::Limiter::new(4);
//! let permit = limiter.acquire().await;
//! tokio::spawn(async move {
//!     let _permit = permit;
//!     // at most 4 of these run at once
//! });
//! # }
//! ```

mod semaphore;

static OPEN_FILES_LIMIT: std::sync::LazyLock<semaphore::Semaphore> =
    std::sync::LazyLock::new(semaphore::Semaphore::new);
static OPS_THROTTLE: std::sync::LazyLock<semaphore::Semaphore> =
    std::sync::LazyLock::new(semaphore::Semaphore::new);

pub fn set_max_open_files(max_open_files: usize) {
    OPEN_FILES_LIMIT.setup(max_open_files);
}

pub struct OpenFileGuard {
    _permit: Option<tokio::sync::SemaphorePermit<'static>>,
}

pub async fn open_file_permit() -> OpenFileGuard {
    OpenFileGuard {
        _permit: OPEN_FILES_LIMIT.acquire().await,
    }
}

pub fn init_ops_tokens(ops_tokens: usize) {
    OPS_THROTTLE.setup(ops_tokens);
}

pub async fn get_ops_token() {
    OPS_THROTTLE.consume().await;
}

pub async fn run_ops_replenish_thread(replenish: usize, interval: std::time::Duration) {
    OPS_THROTTLE.run_replenish_thread(replenish, interval).await;
}

/// Caps the number of concurrently running operations.
///
/// A limit of 0 means unbounded: [`Limiter::acquire`] returns immediately with no permit.
#[derive(Clone, Debug, Default)]
pub struct Limiter {
    sem: Option<std::sync::Arc<tokio::sync::Semaphore>>,
}

impl Limiter {
    pub fn new(limit: usize) -> Self {
        if limit == 0 {
            return Self::unbounded();
        }
        Self {
            sem: Some(std::sync::Arc::new(tokio::sync::Semaphore::new(
                limit.min(tokio::sync::Semaphore::MAX_PERMITS),
            ))),
        }
    }

    pub fn unbounded() -> Self {
        Self { sem: None }
    }

    pub fn is_bounded(&self) -> bool {
        self.sem.is_some()
    }

    /// Waits until fewer than `limit` permits are outstanding.
    pub async fn acquire(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        match &self.sem {
            // the semaphore is never closed so acquiring cannot fail
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}
