//! Write-once/read-once response store polled by blocked callers.

use super::backoff::Backoff;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Result records keyed by source id.
///
/// A successful [`take`](Self::take) removes the entry. Entries that are
/// never read stay until the store is dropped.
#[derive(Debug, Default)]
pub struct ResponseStore {
    entries: Mutex<HashMap<u8, Bytes>>,
    written: Notify,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<u8, Bytes>> {
        // A poisoned map is still consistent: every critical section is a
        // single insert or remove.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `record` under `id`, replacing any unread entry.
    pub fn insert(&self, id: u8, record: Bytes) -> Option<Bytes> {
        let previous = self.entries().insert(id, record);
        if previous.is_some() {
            debug!("Replaced unread sync result for source id {}", id);
        }
        self.written.notify_waiters();
        previous
    }

    pub fn take(&self, id: u8) -> Option<Bytes> {
        self.entries().remove(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Wait for the entry for `id`, checking on the [`Backoff`] schedule.
    ///
    /// Each wait also ends early when any entry is written. Returns `None`
    /// once more than `timeout` has elapsed without the entry appearing.
    pub async fn poll(&self, id: u8, timeout: Duration) -> Option<Bytes> {
        let started = Instant::now();
        let mut backoff = Backoff::default();
        loop {
            // Register for wake-ups before checking so a write between the
            // check and the wait is not missed.
            let mut written = std::pin::pin!(self.written.notified());
            written.as_mut().enable();

            if let Some(record) = self.take(id) {
                return Some(record);
            }
            if started.elapsed() > timeout {
                return None;
            }
            let _ = tokio::time::timeout(backoff.next_wait(), written).await;
        }
    }
}
