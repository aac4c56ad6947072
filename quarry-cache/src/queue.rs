//! Rate-limited delaying work queue
//!
//! Holds keys waiting to be synced. Besides plain FIFO order it guarantees:
//! - a key is queued at most once, however many times it is added
//! - a key being processed is never handed to a second worker; adding it
//!   meanwhile marks it dirty and it is re-queued once `done` is called
//! - keys can be added after a delay, either explicit or decided by the rate
//!   limiter; the earliest pending deadline wins

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::rate_limiter::RateLimiter;

#[derive(Default)]
struct QueueState {
    /// Keys ready to be handed out, in order
    queue: VecDeque<String>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Deadline of each delayed key
    waiting: HashMap<String, Instant>,
    /// Delayed keys ordered by deadline; entries not matching `waiting` are stale
    deadlines: BinaryHeap<Reverse<(Instant, u64, String)>>,
    seq: u64,
    shutting_down: bool,
}

impl QueueState {
    /// Returns true if the key became ready for a worker
    fn push(&mut self, key: String) -> bool {
        if self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    deadlines_changed: Notify,
    limiter: Arc<dyn RateLimiter>,
}

impl WorkQueue {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            deadlines_changed: Notify::new(),
            limiter,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().expect("work queue mutex poisoned")
    }

    /// Marks `key` as needing processing now
    pub fn add(&self, key: &str) {
        let pushed = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.waiting.remove(key);
            state.push(key.to_string())
        };

        if pushed {
            self.ready.notify_one();
        }
    }

    /// Adds `key` once `delay` has passed
    pub fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }

            let deadline = Instant::now() + delay;
            if let Some(existing) = state.waiting.get(key) {
                if *existing <= deadline {
                    return;
                }
            }

            state.waiting.insert(key.to_string(), deadline);
            let seq = state.seq;
            state.seq += 1;
            state
                .deadlines
                .push(Reverse((deadline, seq, key.to_string())));
        }

        self.deadlines_changed.notify_one();
    }

    /// Adds `key` after whatever delay the rate limiter decides
    pub fn add_rate_limited(&self, key: &str) {
        let delay = self.limiter.when(key);
        debug!("Rate limiting key {} for {:?}", key, delay);
        self.add_after(key, delay);
    }

    /// Clears the rate limiter's memory of `key`
    pub fn forget(&self, key: &str) {
        self.limiter.forget(key);
    }

    /// Number of rate limited adds of `key` since it was last forgotten
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.limiter.retries(key)
    }

    /// Drops a pending delayed add of `key`, if any
    pub fn remove_pending(&self, key: &str) {
        self.lock().waiting.remove(key);
        self.limiter.forget(key);
    }

    /// Waits for up to `max` ready keys
    ///
    /// Returned keys are marked as processing until `done` is called for each
    /// of them. Returns `None` once the queue is shut down.
    pub async fn get_batch(&self, max: usize) -> Option<Vec<String>> {
        loop {
            let notified = self.ready.notified();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }

                if !state.queue.is_empty() {
                    let take = max.min(state.queue.len());
                    let keys: Vec<String> = state.queue.drain(..take).collect();
                    for key in &keys {
                        state.dirty.remove(key);
                        state.processing.insert(key.clone());
                    }

                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.ready.notify_one();
                    }
                    return Some(keys);
                }
            }

            notified.await;
        }
    }

    /// Releases `key` after processing
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };

        if requeued {
            self.ready.notify_one();
        }
    }

    /// Moves delayed keys into the ready queue as their deadlines pass
    ///
    /// Runs until the queue is shut down.
    pub async fn run_delay_loop(self: Arc<Self>) {
        loop {
            let changed = self.deadlines_changed.notified();

            let next_deadline = {
                let mut state = self.lock();
                if state.shutting_down {
                    return;
                }

                let now = Instant::now();
                let mut pushed = 0usize;
                loop {
                    let due = match state.deadlines.peek() {
                        Some(Reverse((deadline, _, _))) if *deadline <= now => true,
                        _ => false,
                    };
                    if !due {
                        break;
                    }

                    let Some(Reverse((deadline, _, key))) = state.deadlines.pop() else {
                        break;
                    };
                    if state.waiting.get(&key) != Some(&deadline) {
                        continue;
                    }
                    state.waiting.remove(&key);
                    if state.push(key) {
                        pushed += 1;
                    }
                }

                let next = state
                    .deadlines
                    .peek()
                    .map(|Reverse((deadline, _, _))| *deadline);
                drop(state);

                for _ in 0..pushed {
                    self.ready.notify_one();
                }
                next
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = time::sleep_until(deadline) => {}
                        _ = changed => {}
                    }
                }
                None => changed.await,
            }
        }
    }

    /// Stops handing out keys and wakes every waiter
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.ready.notify_waiters();
        self.deadlines_changed.notify_waiters();
    }

    /// Number of keys ready to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys waiting for a deadline
    pub fn pending_len(&self) -> usize {
        self.lock().waiting.len()
    }
}
