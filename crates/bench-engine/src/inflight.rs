use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counts jobs that have been admitted but have not yet terminated.
///
/// This is not a semaphore: it tracks outstanding admissions, not
/// parallelism. Each admission takes an [`InflightGuard`]; the count drops
/// when the guard drops, which happens exactly once per job no matter how
/// many attempts the job made. The coordinator parks on [`wait_idle`]
/// before closing the sample stream.
///
/// [`wait_idle`]: InflightCounter::wait_idle
#[derive(Debug, Clone, Default)]
pub struct InflightCounter {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

impl InflightCounter {
    /// A fresh counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one admission. The count stays raised until the returned
    /// guard is dropped.
    pub fn guard(&self) -> InflightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            inner: self.inner.clone(),
        }
    }

    /// The current number of outstanding admissions.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Resolve once the count reaches zero. Returns immediately if it
    /// already is.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before reading so a final decrement between
            // the load and the await still wakes us.
            let notified = self.inner.notify.notified();
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps the owning job counted as in-flight until dropped.
#[derive(Debug)]
pub struct InflightGuard {
    inner: Arc<Inner>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}
