//! Keyed debounce scheduler.
//!
//! Each key owns a recurring timer. Registering a callback replaces whatever
//! was pending for that key; on every tick the pending callback (if any) runs
//! once and is cleared. Work for one key is strictly serialized. The whole
//! table can be flushed at teardown, or every key but one can be flushed
//! before that key's work is registered.

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

type Callback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A key's running timer. Dropping it stops the timer loop after any
/// callback it is currently running has finished.
struct KeyTimer {
    delay: Duration,
    _stop: oneshot::Sender<()>,
}

struct Table<K> {
    timers: DashMap<K, KeyTimer>,
    /// Callbacks are `Send` only; the mutex makes the table `Sync` so timer
    /// tasks can share it.
    pending: DashMap<K, std::sync::Mutex<Callback>>,
    /// Per-key execution locks so ticks and flushes never overlap for a key
    running: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Table<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        self.running
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs the pending callback for `key`, if there is one.
    async fn run_pending(&self, key: &K) -> bool {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let callback = self
            .pending
            .remove(key)
            .map(|(_, slot)| slot.into_inner().unwrap_or_else(PoisonError::into_inner));
        match callback {
            Some(callback) => {
                debug!(key = ?key, "Running debounced callback");
                callback().await;
                true
            }
            None => false,
        }
    }

    /// Stops the key's timer and runs its pending callback immediately.
    /// The key's execution lock is dropped too unless a tick still holds it.
    async fn flush_key(&self, key: &K) -> bool {
        self.timers.remove(key);
        let ran = self.run_pending(key).await;
        self.running
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        ran
    }
}

/// Per-key debouncer. Cheap to clone; clones share one table.
pub struct DebounceScheduler<K> {
    table: Arc<Table<K>>,
}

impl<K> Clone for DebounceScheduler<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K> Default for DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table {
                timers: DashMap::new(),
                pending: DashMap::new(),
                running: DashMap::new(),
            }),
        }
    }

    /// Registers `callback` to run on the next tick of `key`'s timer.
    ///
    /// - A previously pending callback for `key` is replaced, never run.
    /// - If `delay` differs from the key's current delay, the timer is
    ///   restarted with the new delay and pending work for `key` is dropped.
    /// - With `flush_others`, every other key's timer is stopped and its
    ///   pending callback is run to completion before this call registers
    ///   `callback`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn schedule<F, Fut>(&self, key: K, callback: F, delay: Duration, flush_others: bool)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let current_delay = self.table.timers.get(&key).map(|timer| timer.delay);
        if current_delay != Some(delay) {
            if self.table.pending.remove(&key).is_some() {
                debug!(key = ?key, "Delay changed, dropping pending callback");
            }
            self.start_timer(key.clone(), delay);
        }

        if flush_others {
            self.flush_others(&key).await;
        }

        let callback: Callback = Box::new(move || callback().boxed());
        self.table
            .pending
            .insert(key, std::sync::Mutex::new(callback));
    }

    fn start_timer(&self, key: K, delay: Duration) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        // replacing the entry drops the old stop sender, ending the old loop
        self.table.timers.insert(
            key.clone(),
            KeyTimer {
                delay,
                _stop: stop_tx,
            },
        );

        let table = Arc::clone(&self.table);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + delay, delay);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        table.run_pending(&key).await;
                    }
                }
            }
            debug!(key = ?key, "Debounce timer stopped");
        });
    }

    /// Stops every timer except `key`'s and runs their pending callbacks now.
    ///
    /// Returns how many callbacks ran.
    pub async fn flush_others(&self, key: &K) -> usize {
        let others: HashSet<K> = self
            .table
            .timers
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.table.pending.iter().map(|entry| entry.key().clone()))
            .filter(|k| k != key)
            .collect();

        let mut flushed = 0;
        for other in others {
            if self.table.flush_key(&other).await {
                flushed += 1;
            }
        }
        flushed
    }

    /// Stops every timer and runs every pending callback, once each.
    ///
    /// This is the teardown path: nothing scheduled before the call is lost.
    pub async fn flush_all(&self) -> usize {
        let keys: HashSet<K> = self
            .table
            .timers
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.table.pending.iter().map(|entry| entry.key().clone()))
            .collect();

        let mut flushed = 0;
        for key in keys {
            if self.table.flush_key(&key).await {
                flushed += 1;
            }
        }
        debug!(flushed, "Flushed all debounced callbacks");
        flushed
    }

    pub fn has_pending(&self, key: &K) -> bool {
        self.table.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.table.pending.len()
    }

    /// The delay `key`'s timer currently runs at, if it has one.
    pub fn delay_for(&self, key: &K) -> Option<Duration> {
        self.table.timers.get(key).map(|timer| timer.delay)
    }
}
