//! Worker contexts and the transport between them and their parent.
//!
//! The parent drives workers through [`WorkerHandle`]s kept in a
//! [`WorkerRegistry`](crate::registry::WorkerRegistry); a worker talks back
//! to its parent through a [`WorkerPort`]. [`ThreadSpawner`] provides both
//! ends over tokio channels with one OS thread per worker.

pub mod channel;
pub mod parent;
pub mod scope;

pub use channel::{ChannelPort, ChannelWorker, ThreadSpawner, WorkerContext};
pub use parent::WorkerParent;
pub use scope::{RuntimeData, WorkerScope};

use crate::envelope::WireMessage;
use crate::error::Result;
use bytes::Bytes;

/// Parent-side handle to a running worker.
pub trait WorkerHandle: Send {
    /// Transfer a message to the worker.
    fn post(&self, message: WireMessage) -> Result<()>;

    /// Stop the worker. Messages posted afterwards fail.
    fn terminate(&mut self) -> Result<()>;
}

/// Starts workers for a parent.
pub trait WorkerSpawner {
    type Handle: WorkerHandle;

    /// Start worker `id` running `script`, handing it the init settings bytes.
    fn spawn(&mut self, id: u32, script: &str, init: Bytes) -> Result<Self::Handle>;
}

/// Worker-side connection to the parent.
pub trait WorkerPort: Send {
    fn post(&self, message: WireMessage) -> Result<()>;

    /// Block until the parent sends a message; `None` once terminated.
    fn recv(&mut self) -> Option<WireMessage>;
}
