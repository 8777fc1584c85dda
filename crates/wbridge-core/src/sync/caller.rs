//! Caller side of the synchronous bridge.

use super::service::SourceIdReply;
use super::transport::BlockingTransport;
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use tracing::{debug, warn};

/// Where a blocked caller is in its round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncCallState {
    #[default]
    Idle,
    IdAssigned(u8),
    AwaitingResult(u8),
    Delivered(u8),
    TimedOut(u8),
}

impl SyncCallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCallState::Idle => "idle",
            SyncCallState::IdAssigned(_) => "id assigned",
            SyncCallState::AwaitingResult(_) => "awaiting result",
            SyncCallState::Delivered(_) => "delivered",
            SyncCallState::TimedOut(_) => "timed out",
        }
    }

    /// Whether a new id may be requested. `Delivered` and `TimedOut` count
    /// as idle.
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            SyncCallState::Idle | SyncCallState::Delivered(_) | SyncCallState::TimedOut(_)
        )
    }
}

/// State machine for one calling context.
#[derive(Debug, Default)]
pub struct SyncCaller {
    state: SyncCallState,
}

impl SyncCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncCallState {
        self.state
    }

    fn invalid(&self, expected: &'static str) -> BridgeError {
        BridgeError::InvalidSyncState {
            state: self.state.as_str(),
            expected,
        }
    }

    /// Idle -> IdAssigned.
    ///
    /// The sentinel reply fails fast with [`BridgeError::SyncUnavailable`]
    /// and leaves the caller idle.
    pub fn assign(&mut self, transport: &dyn BlockingTransport) -> Result<u8> {
        if !self.state.is_idle() {
            return Err(self.invalid("idle"));
        }
        match transport.request_id()? {
            SourceIdReply::Assigned(id) => {
                debug!("Sync caller holds source id {}", id);
                self.state = SyncCallState::IdAssigned(id);
                Ok(id)
            }
            SourceIdReply::Unavailable => {
                self.state = SyncCallState::Idle;
                Err(BridgeError::SyncUnavailable)
            }
        }
    }

    /// IdAssigned -> AwaitingResult, once the tagged call has been sent.
    pub fn dispatched(&mut self) -> Result<u8> {
        match self.state {
            SyncCallState::IdAssigned(id) => {
                self.state = SyncCallState::AwaitingResult(id);
                Ok(id)
            }
            _ => Err(self.invalid("id assigned")),
        }
    }

    /// AwaitingResult -> Delivered | TimedOut. Blocks the calling thread.
    pub fn wait(&mut self, transport: &dyn BlockingTransport) -> Result<Bytes> {
        let SyncCallState::AwaitingResult(id) = self.state else {
            return Err(self.invalid("awaiting result"));
        };
        match transport.request_result(id) {
            Ok(Some(record)) => {
                self.state = SyncCallState::Delivered(id);
                Ok(record)
            }
            Ok(None) => {
                warn!("Sync call for source id {} timed out", id);
                self.state = SyncCallState::TimedOut(id);
                Err(BridgeError::SyncTimeout { id })
            }
            Err(e) => {
                // The responder releases the id whether or not we heard back.
                self.state = SyncCallState::TimedOut(id);
                Err(e)
            }
        }
    }

    /// Forget any in-flight id.
    pub fn reset(&mut self) {
        self.state = SyncCallState::Idle;
    }
}
