//! Keyed, cancellable "latest wins" timers.
//!
//! Each key owns at most one pending task. Scheduling again replaces the
//! pending task, and [`Debouncer::cancel`] drops it explicitly. A task that
//! has already started running is not interrupted by a later `schedule`; it
//! is only detached from the slot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    pending: HashMap<String, Slot>,
}

/// Single-slot timer per key.
#[derive(Clone, Default)]
pub struct Debouncer {
    slots: Arc<Mutex<Slots>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless the key is rescheduled or cancelled first.
    pub fn schedule<F>(&self, key: impl Into<String>, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let registry = Arc::clone(&self.slots);
        let slot_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the slot before running so the task can reschedule its own key.
            if let Ok(mut slots) = registry.lock() {
                if slots
                    .pending
                    .get(&slot_key)
                    .is_some_and(|s| s.generation == generation)
                {
                    slots.pending.remove(&slot_key);
                } else {
                    return;
                }
            }
            task.await;
        });

        if let Some(previous) = slots.pending.insert(key, Slot { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the pending task for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            return false;
        };
        match slots.pending.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.slots
            .lock()
            .map(|s| s.pending.contains_key(key))
            .unwrap_or(false)
    }

    /// Cancel everything.
    pub fn cancel_all(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            for (_, slot) in slots.pending.drain() {
                slot.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_task(counter: &Arc<AtomicUsize>, value: usize) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(value, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_schedule_wins() {
        let debouncer = Debouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule("p", Duration::from_millis(100), counter_task(&counter, 1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule("p", Duration::from_millis(100), counter_task(&counter, 10));

        tokio::time::sleep(Duration::from_millis(75)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0, "first task was replaced");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(!debouncer.is_pending("p"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_explicit() {
        let debouncer = Debouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule("p", Duration::from_millis(100), counter_task(&counter, 1));
        assert!(debouncer.is_pending("p"));
        assert!(debouncer.cancel("p"));
        assert!(!debouncer.cancel("p"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule("a", Duration::from_millis(10), counter_task(&counter, 1));
        debouncer.schedule("b", Duration::from_millis(10), counter_task(&counter, 2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
