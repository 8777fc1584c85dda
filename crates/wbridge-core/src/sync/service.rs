//! Responder side of the synchronous bridge: id allocation and result pickup.

use super::allocator::SourceIdAllocator;
use super::store::ResponseStore;
use crate::buffer::ResultRecord;
use crate::config::SyncConfig;
use crate::envelope::{MessageKind, WireMessage};
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Answer to an id request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceIdReply {
    Assigned(u8),
    /// No id is free; the bridge is degraded.
    Unavailable,
}

impl SourceIdReply {
    /// Response body: the decimal id, or the sentinel string.
    pub fn to_body(&self) -> String {
        match self {
            SourceIdReply::Assigned(id) => id.to_string(),
            SourceIdReply::Unavailable => SyncConfig::NO_ID_SENTINEL.to_string(),
        }
    }

    pub fn parse(body: &str) -> Result<Self> {
        let body = body.trim();
        if body == SyncConfig::NO_ID_SENTINEL {
            return Ok(SourceIdReply::Unavailable);
        }
        let id: i64 = body
            .parse()
            .map_err(|_| BridgeError::Other(format!("Unexpected GetId response: {:?}", body)))?;
        if !SourceIdAllocator::in_range(id) {
            return Err(BridgeError::InvalidSourceId(id));
        }
        Ok(SourceIdReply::Assigned(id as u8))
    }

    /// Value published in the control buffer scalar slot.
    pub fn as_scalar(&self) -> i32 {
        match self {
            SourceIdReply::Assigned(id) => i32::from(*id),
            SourceIdReply::Unavailable => SyncConfig::UNAVAILABLE_ID,
        }
    }
}

/// Hosts the id allocator and response store.
#[derive(Debug)]
pub struct SyncService {
    allocator: Mutex<SourceIdAllocator>,
    store: ResponseStore,
    timeout: Duration,
}

impl Default for SyncService {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncService {
    pub fn new() -> Self {
        Self::with_timeout(SyncConfig::RESULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            allocator: Mutex::new(SourceIdAllocator::new()),
            store: ResponseStore::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn store(&self) -> &ResponseStore {
        &self.store
    }

    fn allocator(&self) -> std::sync::MutexGuard<'_, SourceIdAllocator> {
        self.allocator.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `GetId`.
    pub fn assign_id(&self) -> SourceIdReply {
        match self.allocator().assign() {
            Some(id) => {
                if self.store.take(id).is_some() {
                    debug!("Discarded late sync result for reassigned source id {}", id);
                }
                debug!("Assigned sync source id {}", id);
                SourceIdReply::Assigned(id)
            }
            None => {
                warn!("All sync source ids are pending; answering with the sentinel");
                SourceIdReply::Unavailable
            }
        }
    }

    /// `GetResult`: wait for the record addressed to `id`.
    ///
    /// `Ok(None)` means the timeout elapsed. Either way the id is released.
    pub async fn get_result(&self, id: i64) -> Result<Option<Bytes>> {
        if !SourceIdAllocator::in_range(id) {
            return Err(BridgeError::InvalidSourceId(id));
        }
        let id = id as u8;
        let record = self.store.poll(id, self.timeout).await;
        self.allocator().release(id);
        if record.is_none() {
            warn!(
                "Sync call result for source id {} was not set within {:?}",
                id, self.timeout
            );
        }
        Ok(record)
    }

    /// Store a result record under the source id it carries.
    ///
    /// Returns `false` when the record was ignored.
    pub fn set_result(&self, record: Bytes) -> bool {
        let Some(source_id) = ResultRecord::peek_source_id(&record) else {
            debug!("Ignoring {}-byte sync result without a source id", record.len());
            return false;
        };
        if !SourceIdAllocator::in_range(i64::from(source_id)) {
            debug!("Ignoring sync result for out-of-range source id {}", source_id);
            return false;
        }
        debug!("Sync result for source id {} ({} bytes)", source_id, record.len());
        self.store.insert(source_id as u8, record);
        true
    }

    /// Store write path for messages arriving at the responder's context.
    pub fn on_message(&self, message: &WireMessage) -> bool {
        if message.kind() != Some(MessageKind::Res) || message.payload.len() != 1 {
            return false;
        }
        self.set_result(message.payload[0].clone())
    }
}
