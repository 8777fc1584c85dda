//! One context's side of the bridge: a codec plus its managed receiver.

use crate::buffer::{Codec, ResultRecord, RECORD_PREFIX_LEN};
use crate::buffer::record::declared_len;
use crate::config::{EndpointConfig, SyncConfig, PARENT_RECEIVER_ID};
use crate::envelope::{Envelope, MessageKind, WireMessage};
use crate::error::{BridgeError, Result};
use crate::sync::{BlockingTransport, SyncCaller, SyncCallState};
use tracing::debug;

/// What the managed receiver is told when a message lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub receiver_id: i32,
    pub kind: MessageKind,
    /// Registry id of the sending worker, or `0` for the parent.
    pub source: u32,
}

/// How the receiver left the codec after handling a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Nothing to send now.
    #[default]
    Pending,
    /// A reply with result bytes is ready; send it as `Res`.
    Result,
    /// A void reply is ready; send it as `Res`.
    VoidResult,
    /// A reply is ready for a blocked caller; post it to the responder.
    SyncResult,
    /// A void reply is ready for a blocked caller.
    SyncVoidResult,
}

/// The managed side of an endpoint.
///
/// `receive` runs after the endpoint has written the incoming call or
/// result into the codec. It may write a reply back into the same codec
/// and report it through the returned [`Completion`].
pub trait ManagedReceiver: Send {
    /// Create the receiver and return its id. Only worker endpoints ask.
    fn create_receiver(&mut self, control_len: usize) -> Result<i32>;

    fn receive(&mut self, delivery: Delivery, codec: &mut Codec) -> Result<Completion>;
}

/// Receiver backed by a closure.
pub struct FnReceiver<F> {
    id: i32,
    handler: F,
}

impl<F> FnReceiver<F>
where
    F: FnMut(Delivery, &mut Codec) -> Result<Completion> + Send,
{
    pub fn new(id: i32, handler: F) -> Self {
        Self { id, handler }
    }
}

impl<F> ManagedReceiver for FnReceiver<F>
where
    F: FnMut(Delivery, &mut Codec) -> Result<Completion> + Send,
{
    fn create_receiver(&mut self, _control_len: usize) -> Result<i32> {
        Ok(self.id)
    }

    fn receive(&mut self, delivery: Delivery, codec: &mut Codec) -> Result<Completion> {
        (self.handler)(delivery, codec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Parent,
    Worker,
}

/// Codec, receiver binding and synchronous call state for one context.
pub struct BridgeEndpoint {
    role: Role,
    codec: Codec,
    receiver: Box<dyn ManagedReceiver>,
    receiver_id: i32,
    sync: SyncCaller,
}

impl std::fmt::Debug for BridgeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEndpoint")
            .field("role", &self.role)
            .field("receiver_id", &self.receiver_id)
            .field("codec", &self.codec)
            .field("sync", &self.sync)
            .finish()
    }
}

impl BridgeEndpoint {
    /// Parent endpoint; the receiver id is always [`PARENT_RECEIVER_ID`].
    pub fn new_parent(config: EndpointConfig, receiver: Box<dyn ManagedReceiver>) -> Result<Self> {
        Ok(Self {
            role: Role::Parent,
            codec: Codec::new(config)?,
            receiver,
            receiver_id: PARENT_RECEIVER_ID,
            sync: SyncCaller::new(),
        })
    }

    /// Worker endpoint; the managed side supplies the receiver id.
    pub fn new_worker(
        config: EndpointConfig,
        mut receiver: Box<dyn ManagedReceiver>,
    ) -> Result<Self> {
        let codec = Codec::new(config)?;
        let receiver_id = receiver.create_receiver(config.control_len)?;
        debug!("Worker receiver created with id {}", receiver_id);
        Ok(Self {
            role: Role::Worker,
            codec,
            receiver,
            receiver_id,
            sync: SyncCaller::new(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn receiver_id(&self) -> i32 {
        self.receiver_id
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut Codec {
        &mut self.codec
    }

    pub fn sync_state(&self) -> SyncCallState {
        self.sync.state()
    }

    /// Package the outgoing call the managed side encoded as an `SCall`.
    pub fn static_call(&self) -> Result<WireMessage> {
        let call = self.codec.decode_outgoing_call()?;
        debug!(
            "SCall {} ({} argument bytes)",
            call.method_name(),
            call.args.len()
        );
        Ok(Envelope::scall(call).into_wire())
    }

    /// Package the reply the managed side wrote as a `Res`.
    pub fn return_result(&self) -> Result<WireMessage> {
        let record = self.codec.decode_result()?;
        Ok(Envelope::res(&record)?.into_wire())
    }

    pub fn return_void_result(&self) -> Result<WireMessage> {
        let record = self.codec.decode_void_result()?;
        Ok(Envelope::res(&record)?.into_wire())
    }

    /// Post the reply to the responder instead of the caller's context.
    pub fn return_result_sync(&self, transport: &dyn BlockingTransport) -> Result<()> {
        let record = self.codec.decode_result()?;
        transport.post_result(record.to_bytes()?)
    }

    pub fn return_void_result_sync(&self, transport: &dyn BlockingTransport) -> Result<()> {
        let record = self.codec.decode_void_result()?;
        transport.post_result(record.to_bytes()?)
    }

    /// Decode an inbound message into the codec and hand it to the receiver.
    ///
    /// Unknown kinds are ignored and report [`Completion::Pending`].
    pub fn handle_message(&mut self, message: WireMessage, source: u32) -> Result<Completion> {
        let tag = message.tag.clone();
        let Some(envelope) = Envelope::from_wire(message)? else {
            debug!("Ignoring message with unknown kind '{}' from {}", tag, source);
            return Ok(Completion::Pending);
        };

        let kind = envelope.kind();
        match envelope {
            Envelope::Init => {}
            Envelope::SCall { name, args } => {
                self.codec.encode_incoming_call(&name, &args)?;
            }
            Envelope::Res { record } => {
                if declared_len(&record)? == RECORD_PREFIX_LEN {
                    let record = ResultRecord::parse(&record)?;
                    self.codec.encode_void_result(record.tag)?;
                } else {
                    self.codec.encode_result(&record)?;
                }
            }
        }

        debug!("{} from {} to receiver {}", kind, source, self.receiver_id);
        self.receiver.receive(
            Delivery {
                receiver_id: self.receiver_id,
                kind,
                source,
            },
            &mut self.codec,
        )
    }

    /// Obtain a source id and publish it as a scalar.
    ///
    /// When the responder has no id free, `-1` is published and
    /// [`BridgeError::SyncUnavailable`] is returned.
    pub fn assign_sync_call_source_id(&mut self, transport: &dyn BlockingTransport) -> Result<i32> {
        match self.sync.assign(transport) {
            Ok(id) => {
                self.codec.encode_scalar(i32::from(id));
                Ok(i32::from(id))
            }
            Err(BridgeError::SyncUnavailable) => {
                self.codec.encode_scalar(SyncConfig::UNAVAILABLE_ID);
                Err(BridgeError::SyncUnavailable)
            }
            Err(e) => Err(e),
        }
    }

    /// Block until the result for `id` arrives and land it in the codec.
    pub fn wait_sync_result(&mut self, transport: &dyn BlockingTransport, id: i32) -> Result<()> {
        let held = match self.sync.state() {
            SyncCallState::IdAssigned(held) | SyncCallState::AwaitingResult(held) => held,
            _ => return Err(BridgeError::InvalidSourceId(i64::from(id))),
        };
        if i32::from(held) != id {
            return Err(BridgeError::InvalidSourceId(i64::from(id)));
        }
        if matches!(self.sync.state(), SyncCallState::IdAssigned(_)) {
            self.sync.dispatched()?;
        }
        let record = self.sync.wait(transport)?;
        self.codec.encode_result(&record)
    }
}
