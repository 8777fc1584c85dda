//! Thread-per-worker transport over tokio channels.

use super::{WorkerHandle, WorkerPort, WorkerSpawner};
use crate::envelope::{Inbound, WireMessage};
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Everything a worker entry function receives.
#[derive(Debug)]
pub struct WorkerContext {
    pub id: u32,
    pub script: String,
    /// Init settings document as posted by the parent.
    pub init: Bytes,
    pub port: ChannelPort,
}

/// Worker end of the channel pair.
#[derive(Debug)]
pub struct ChannelPort {
    id: u32,
    inbox: UnboundedReceiver<WireMessage>,
    outbox: UnboundedSender<Inbound>,
}

impl ChannelPort {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl WorkerPort for ChannelPort {
    fn post(&self, message: WireMessage) -> Result<()> {
        self.outbox
            .send(Inbound {
                source: self.id,
                message,
            })
            .map_err(|_| BridgeError::TransportClosed("parent inbound channel".to_string()))
    }

    fn recv(&mut self) -> Option<WireMessage> {
        self.inbox.blocking_recv()
    }
}

/// Parent end: posts into the worker's inbox.
#[derive(Debug)]
pub struct ChannelWorker {
    id: u32,
    sender: Option<UnboundedSender<WireMessage>>,
    thread: Option<JoinHandle<()>>,
}

impl ChannelWorker {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread to exit. Only returns after termination
    /// or once the entry function gives up on its own.
    pub fn join(&mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| BridgeError::Other(format!("worker {} panicked", self.id)))?;
        }
        Ok(())
    }
}

impl WorkerHandle for ChannelWorker {
    fn post(&self, message: WireMessage) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BridgeError::TransportClosed(format!("worker {}", self.id)))?;
        sender
            .send(message)
            .map_err(|_| BridgeError::TransportClosed(format!("worker {}", self.id)))
    }

    fn terminate(&mut self) -> Result<()> {
        // Closing the inbox ends the worker's message pump.
        self.sender.take();
        Ok(())
    }
}

type EntryFn = dyn Fn(WorkerContext) + Send + Sync;

/// Runs each worker's entry function on its own OS thread.
///
/// Every worker posts to one shared inbound channel; messages are tagged
/// with the worker id so the parent knows the source.
#[derive(Clone)]
pub struct ThreadSpawner {
    entry: Arc<EntryFn>,
    inbound: UnboundedSender<Inbound>,
}

impl std::fmt::Debug for ThreadSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSpawner").finish_non_exhaustive()
    }
}

impl ThreadSpawner {
    /// Create a spawner and the receiver for everything workers send back.
    pub fn new<F>(entry: F) -> (Self, UnboundedReceiver<Inbound>)
    where
        F: Fn(WorkerContext) + Send + Sync + 'static,
    {
        let (inbound, receiver) = unbounded_channel();
        (
            Self {
                entry: Arc::new(entry),
                inbound,
            },
            receiver,
        )
    }
}

impl WorkerSpawner for ThreadSpawner {
    type Handle = ChannelWorker;

    fn spawn(&mut self, id: u32, script: &str, init: Bytes) -> Result<ChannelWorker> {
        let (sender, inbox) = unbounded_channel();
        let context = WorkerContext {
            id,
            script: script.to_string(),
            init,
            port: ChannelPort {
                id,
                inbox,
                outbox: self.inbound.clone(),
            },
        };
        let entry = self.entry.clone();
        let thread = std::thread::Builder::new()
            .name(format!("wbridge-worker-{}", id))
            .spawn(move || {
                entry(context);
                debug!("Worker {} entry function returned", id);
            })?;
        info!("Spawned worker {} running {}", id, script);
        Ok(ChannelWorker {
            id,
            sender: Some(sender),
            thread: Some(thread),
        })
    }
}
