//! Synchronous call emulation.
//!
//! A blocked caller asks the responder for a source id, sends its call
//! tagged with that id through the ordinary envelope path, then blocks on a
//! `GetResult` request. The responder polls its [`ResponseStore`] on a
//! doubling schedule (1 ms up to 128 ms) and gives up after 60 seconds.

pub mod allocator;
pub mod backoff;
pub mod caller;
pub mod service;
pub mod store;
pub mod transport;

pub use allocator::SourceIdAllocator;
pub use backoff::Backoff;
pub use caller::{SyncCallState, SyncCaller};
pub use service::{SourceIdReply, SyncService};
pub use store::ResponseStore;
pub use transport::{BlockingTransport, HttpSyncTransport, InProcessTransport};
