use std::sync::atomic::{AtomicBool, Ordering};

/// A semaphore that stays out of the way until it is configured.
///
/// Until [`Semaphore::setup`] is called with a non-zero value every acquire succeeds
/// immediately without touching the underlying tokio semaphore.
pub struct Semaphore {
    enabled: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            sem: tokio::sync::Semaphore::new(0),
        }
    }

    /// Sets the number of permits, 0 disables the semaphore.
    pub fn setup(&self, value: usize) {
        self.enabled.store(value > 0, Ordering::Release);
        if value == 0 {
            return;
        }
        self.sem.forget_permits(self.sem.available_permits());
        self.sem
            .add_permits(value.min(tokio::sync::Semaphore::MAX_PERMITS));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.sem.available_permits()
    }

    pub async fn acquire(&self) -> Option<tokio::sync::SemaphorePermit<'_>> {
        if !self.is_enabled() {
            return None;
        }
        // the semaphore is never closed
        self.sem.acquire().await.ok()
    }

    /// Takes one permit and never gives it back, the replenish loop refills it.
    pub async fn consume(&self) {
        if let Some(permit) = self.acquire().await {
            permit.forget();
        }
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        if !self.is_enabled() {
            return;
        }
        let replenish = replenish.min(tokio::sync::Semaphore::MAX_PERMITS);
        loop {
            tokio::time::sleep(interval).await;
            let curr_permits = self.sem.available_permits();
            if curr_permits >= replenish {
                continue;
            }
            let missing = replenish - curr_permits;
            tracing::trace!("replenishing {} tokens", missing);
            self.sem.add_permits(missing);
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_semaphore_never_blocks() {
        let sem = Semaphore::new();
        for _ in 0..100 {
            assert!(sem.acquire().await.is_none());
            sem.consume().await;
        }
    }

    #[tokio::test]
    async fn setup_replaces_permits() {
        let sem = Semaphore::new();
        sem.setup(3);
        assert_eq!(sem.available_permits(), 3);
        sem.setup(1);
        assert_eq!(sem.available_permits(), 1);
        sem.setup(0);
        assert!(!sem.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn consumed_tokens_are_replenished() {
        let sem = std::sync::Arc::new(Semaphore::new());
        sem.setup(2);
        sem.consume().await;
        sem.consume().await;
        assert_eq!(sem.available_permits(), 0);
        let replenish = tokio::spawn({
            let sem = sem.clone();
            async move {
                sem.run_replenish_thread(2, std::time::Duration::from_millis(100))
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(sem.available_permits(), 2);
        replenish.abort();
    }
}
