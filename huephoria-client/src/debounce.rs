use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    future::Future,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

struct Pending {
    generation: u64,
    token: CancellationToken,
}

/// Trailing per-key debounce: scheduling a key again supersedes its waiting task.
pub struct Debouncer<K> {
    pending: Arc<Mutex<HashMap<K, Pending>>>,
    next_generation: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Runs `task` after `delay` unless `key` is scheduled again or cancelled first.
    ///
    /// Must be called from within a tokio runtime. A task that has started running is not
    /// interrupted by later scheduling.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.pending.lock();
            let previous = pending.insert(
                key.clone(),
                Pending {
                    generation,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.token.cancel();
            }
        }

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            if !take_if_current(&pending, &key, generation, &token) {
                return;
            }

            task.await;
        });
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Cancels the waiting task for `key`. Returns whether there was one.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.pending.lock().remove(key);
        removed.map(|pending| pending.token.cancel()).is_some()
    }

    pub fn cancel_all(&self) {
        for (_, pending) in self.pending.lock().drain() {
            pending.token.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claims the slot for `key` once the delay elapsed. Superseding happens under the same lock,
/// so a superseded task always observes its cancelled token here.
fn take_if_current<K: Eq + Hash>(
    pending: &Mutex<HashMap<K, Pending>>,
    key: &K,
    generation: u64,
    token: &CancellationToken,
) -> bool {
    let mut pending = pending.lock();
    if token.is_cancelled() {
        return false;
    }
    if pending
        .get(key)
        .is_some_and(|current| current.generation == generation)
    {
        pending.remove(key);
    }
    true
}

impl<K> Default for Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, pending) in self.pending.lock().drain() {
            pending.token.cancel();
        }
    }
}

impl<K> Debug for Debouncer<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::debounce::Debouncer;
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};

    const DELAY: Duration = Duration::from_millis(600);

    #[tokio::test(start_paused = true)]
    async fn only_last_schedule_runs() {
        let debouncer = Debouncer::new();
        let runs = Arc::new(Mutex::new(Vec::new()));

        for value in 1..=3 {
            let runs = Arc::clone(&runs);
            debouncer.schedule("post", DELAY, async move { runs.lock().push(value) });
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(debouncer.is_pending(&"post"));
        assert!(runs.lock().is_empty());

        tokio::time::sleep(DELAY).await;
        assert_eq!(*runs.lock(), vec![3]);
        assert!(!debouncer.is_pending(&"post"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new();
        let runs = Arc::new(Mutex::new(Vec::new()));

        for key in ["a", "b"] {
            let runs = Arc::clone(&runs);
            debouncer.schedule(key, DELAY, async move { runs.lock().push(key) });
        }
        tokio::time::sleep(DELAY * 2).await;

        let mut ran = runs.lock().clone();
        ran.sort_unstable();
        assert_eq!(ran, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_tasks_never_run() {
        let debouncer = Debouncer::new();
        let runs = Arc::new(Mutex::new(0));

        for key in ["a", "b"] {
            let runs = Arc::clone(&runs);
            debouncer.schedule(key, DELAY, async move { *runs.lock() += 1 });
        }
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));
        debouncer.cancel_all();
        assert!(debouncer.is_empty());

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(*runs.lock(), 0);
    }
}
