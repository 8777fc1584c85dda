//! wbridge core - call bridge between isolated worker contexts.
//!
//! A managed, single-threaded unit in one context calls operations hosted in
//! another context through a fixed control buffer plus a growable data
//! region. Calls that must look blocking to the caller go through the
//! synchronous bridge: a blocking request to a responder that polls a
//! response store until the result arrives or 60 seconds pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use wbridge_core::{BridgeEndpoint, EndpointConfig, FnReceiver, Completion, OutgoingCall};
//!
//! let receiver = FnReceiver::new(0, |_delivery, _codec| Ok(Completion::Pending));
//! let mut endpoint = BridgeEndpoint::new_parent(EndpointConfig::default(), Box::new(receiver))?;
//! endpoint
//!     .codec_mut()
//!     .encode_outgoing_call(&OutgoingCall::new(&b"Foo"[..], &b"{}"[..]))?;
//! let scall = endpoint.static_call()?;
//! ```

pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod resource;
pub mod sync;
pub mod text;
pub mod worker;

// Re-export commonly used types
pub use buffer::{Codec, Discriminant, IncomingCall, OutgoingCall, ReplyTag, ResultRecord};
pub use config::{
    BufferConfig, EndpointConfig, EnvironmentSettings, ResourceConfig, SyncConfig,
    WorkerInitSettings, PARENT_RECEIVER_ID,
};
pub use endpoint::{BridgeEndpoint, Completion, Delivery, FnReceiver, ManagedReceiver, Role};
pub use envelope::{Envelope, Inbound, MessageKind, WireMessage};
pub use error::{BridgeError, Result};
pub use registry::WorkerRegistry;
pub use resource::{CacheStorage, HttpFetcher, MemoryCache, ResourceLoader};
pub use sync::{
    BlockingTransport, HttpSyncTransport, InProcessTransport, SourceIdReply, SyncCaller,
    SyncService,
};
pub use worker::{
    RuntimeData, ThreadSpawner, WorkerHandle, WorkerParent, WorkerPort, WorkerScope, WorkerSpawner,
};
