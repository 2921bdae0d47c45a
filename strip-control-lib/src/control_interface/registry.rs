use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::error::{Error, Result};
use crate::packet::response::{Response, ResponseKind};

/// Default number of unclaimed responses kept per kind.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

struct Entry {
    /// Callers that announced they will wait for this kind and have not claimed yet.
    outstanding: usize,
    queue: VecDeque<Response>,
    notify: Arc<Notify>,
}

impl Entry {
    fn new() -> Self {
        Entry {
            outstanding: 0,
            queue: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Correlates inbound responses with the callers waiting for them.
///
/// The protocol has no sequence numbers, so responses are matched by kind only.
/// Responses of a kind nobody announced are dropped. Each kind buffers at most
/// `capacity` responses; when full, the oldest one is discarded.
pub struct ResponseRegistry {
    capacity: usize,
    entries: Mutex<HashMap<ResponseKind, Entry>>,
}

impl Default for ResponseRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ResponseRegistry {
    pub fn new(capacity: usize) -> Self {
        ResponseRegistry {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Announces that one response of `kind` will be awaited.
    ///
    /// Must happen before the request is sent, otherwise a fast reply could be
    /// dropped as unsolicited. Dropping the returned [`Expectation`] withdraws the
    /// announcement.
    pub fn expect(&self, kind: ResponseKind) -> Expectation<'_> {
        let mut entries = self.lock();
        entries.entry(kind).or_insert_with(Entry::new).outstanding += 1;
        Expectation {
            registry: self,
            kind,
        }
    }

    /// Hands an inbound response to its waiters. Returns `false` if nobody expected it.
    pub fn deliver(&self, response: Response) -> bool {
        let kind = response.kind();
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&kind) else {
            debug!("Dropping unsolicited {:?} response", kind);
            return false;
        };
        if entry.queue.len() >= self.capacity {
            warn!(
                "Queue for {:?} responses is full, dropping the oldest one",
                kind
            );
            entry.queue.pop_front();
        }
        entry.queue.push_back(response);
        entry.notify.notify_one();
        true
    }

    /// Number of delivered but unclaimed responses of `kind`.
    pub fn pending(&self, kind: ResponseKind) -> usize {
        self.lock().get(&kind).map_or(0, |e| e.queue.len())
    }

    /// Whether anybody is currently waiting for `kind`.
    pub fn is_expected(&self, kind: ResponseKind) -> bool {
        self.lock().contains_key(&kind)
    }

    async fn claim(&self, kind: ResponseKind, wait: Duration) -> Result<Response> {
        let started = Instant::now();
        let deadline = started + wait;
        loop {
            let notify = {
                let mut entries = self.lock();
                // The caller's expectation keeps the entry alive.
                let entry = entries.entry(kind).or_insert_with(Entry::new);
                if let Some(response) = entry.queue.pop_front() {
                    return Ok(response);
                }
                entry.notify.clone()
            };

            // A delivery between releasing the lock and polling `notified` leaves a
            // permit behind, so the wake-up is not lost.
            if timeout_at(deadline, notify.notified()).await.is_err() {
                let mut entries = self.lock();
                // A response may have arrived right at the deadline.
                if let Some(response) = entries.get_mut(&kind).and_then(|e| e.queue.pop_front()) {
                    return Ok(response);
                }
                return Err(Error::ResponseTimeout {
                    kind,
                    elapsed: started.elapsed(),
                });
            }
        }
    }

    fn release(&self, kind: ResponseKind) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(&kind) {
            entry.outstanding = entry.outstanding.saturating_sub(1);
            if entry.outstanding == 0 {
                if !entry.queue.is_empty() {
                    debug!(
                        "Discarding {} unclaimed {:?} responses",
                        entry.queue.len(),
                        kind
                    );
                }
                entries.remove(&kind);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResponseKind, Entry>> {
        // The map stays consistent even if a holder panicked, every mutation is a single step.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One announced response, returned by [`ResponseRegistry::expect`].
///
/// Holds exactly one share of the outstanding count for its kind and gives it back
/// when dropped, whether the response was claimed, timed out or never awaited.
#[must_use = "dropping an expectation withdraws it"]
pub struct Expectation<'a> {
    registry: &'a ResponseRegistry,
    kind: ResponseKind,
}

impl Expectation<'_> {
    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Waits for the next response of this kind.
    ///
    /// Fails with [`Error::ResponseTimeout`] once `wait` has elapsed.
    pub async fn wait(self, wait: Duration) -> Result<Response> {
        self.registry.claim(self.kind, wait).await
    }
}

impl Drop for Expectation<'_> {
    fn drop(&mut self) {
        self.registry.release(self.kind);
    }
}
