//! Rotating source id allocator.

use crate::config::SyncConfig;
use std::collections::HashSet;

/// Hands out source ids from `1..=254`, wrapping from 254 back to 1.
///
/// An id stays pending from assignment until its result is collected, and
/// pending ids are never handed out twice.
#[derive(Debug, Clone)]
pub struct SourceIdAllocator {
    next: u8,
    pending: HashSet<u8>,
}

impl Default for SourceIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceIdAllocator {
    pub fn new() -> Self {
        Self {
            next: SyncConfig::FIRST_SOURCE_ID,
            pending: HashSet::new(),
        }
    }

    /// Whether `id` is inside the assignable range.
    pub fn in_range(id: i64) -> bool {
        (i64::from(SyncConfig::FIRST_SOURCE_ID)..=i64::from(SyncConfig::LAST_SOURCE_ID))
            .contains(&id)
    }

    fn advance(&mut self) -> u8 {
        let id = self.next;
        self.next = if id >= SyncConfig::LAST_SOURCE_ID {
            SyncConfig::FIRST_SOURCE_ID
        } else {
            id + 1
        };
        id
    }

    /// Assign the next free id, or `None` when every id is pending.
    pub fn assign(&mut self) -> Option<u8> {
        let range = usize::from(SyncConfig::LAST_SOURCE_ID - SyncConfig::FIRST_SOURCE_ID) + 1;
        for _ in 0..range {
            let id = self.advance();
            if self.pending.insert(id) {
                return Some(id);
            }
        }
        None
    }

    /// Return an id to the pool. Returns `false` if it was not pending.
    pub fn release(&mut self, id: u8) -> bool {
        self.pending.remove(&id)
    }

    pub fn is_pending(&self, id: u8) -> bool {
        self.pending.contains(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
