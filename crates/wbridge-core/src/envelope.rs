//! Transport envelopes exchanged between contexts.
//!
//! On the wire every message is a kind tag plus a list of byte regions:
//!
//! | tag     | regions                                   |
//! |---------|-------------------------------------------|
//! | `Init`  | none                                      |
//! | `SCall` | header + method name bytes, JSON argument |
//! | `Res`   | one result record                         |
//!
//! Regions are [`Bytes`], so handing a message to a transport moves the
//! buffers instead of copying them. Tags this version does not know are
//! ignored by receivers.

use crate::buffer::{OutgoingCall, ResultRecord};
use crate::error::{BridgeError, Result};
use bytes::Bytes;

/// Known envelope kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Init,
    SCall,
    Res,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Init => "Init",
            MessageKind::SCall => "SCall",
            MessageKind::Res => "Res",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Init" => Some(MessageKind::Init),
            "SCall" => Some(MessageKind::SCall),
            "Res" => Some(MessageKind::Res),
            _ => None,
        }
    }

    fn region_count(&self) -> usize {
        match self {
            MessageKind::Init => 0,
            MessageKind::SCall => 2,
            MessageKind::Res => 1,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Untyped message as a transport carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub tag: String,
    pub payload: Vec<Bytes>,
}

impl WireMessage {
    pub fn new(tag: impl Into<String>, payload: Vec<Bytes>) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.tag)
    }
}

/// A message received from another context, tagged with its source id.
///
/// The parent uses the sending worker's registry id; a worker always uses
/// `0` for its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub source: u32,
    pub message: WireMessage,
}

/// Typed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Init,
    SCall { name: Bytes, args: Bytes },
    Res { record: Bytes },
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Init => MessageKind::Init,
            Envelope::SCall { .. } => MessageKind::SCall,
            Envelope::Res { .. } => MessageKind::Res,
        }
    }

    /// `SCall` for a decoded outgoing call; the header is folded into the name region.
    pub fn scall(call: OutgoingCall) -> Self {
        Envelope::SCall {
            name: call.name_region(),
            args: call.args,
        }
    }

    pub fn res(record: &ResultRecord) -> Result<Self> {
        Ok(Envelope::Res {
            record: record.to_bytes()?,
        })
    }

    pub fn into_wire(self) -> WireMessage {
        let kind = self.kind();
        let payload = match self {
            Envelope::Init => Vec::new(),
            Envelope::SCall { name, args } => vec![name, args],
            Envelope::Res { record } => vec![record],
        };
        WireMessage::new(kind.as_str(), payload)
    }

    /// Type a wire message.
    ///
    /// Unknown tags yield `Ok(None)`; a known tag with the wrong number of
    /// regions is a fatal malformed-envelope error.
    pub fn from_wire(message: WireMessage) -> Result<Option<Self>> {
        let Some(kind) = message.kind() else {
            return Ok(None);
        };
        if message.payload.len() != kind.region_count() {
            return Err(BridgeError::malformed(
                kind.as_str(),
                format!(
                    "expected {} payload regions, got {}",
                    kind.region_count(),
                    message.payload.len()
                ),
            ));
        }

        let mut regions = message.payload.into_iter();
        let envelope = match kind {
            MessageKind::Init => Envelope::Init,
            MessageKind::SCall => {
                let name = regions.next().unwrap_or_default();
                let args = regions.next().unwrap_or_default();
                Envelope::SCall { name, args }
            }
            MessageKind::Res => Envelope::Res {
                record: regions.next().unwrap_or_default(),
            },
        };
        Ok(Some(envelope))
    }
}

impl From<Envelope> for WireMessage {
    fn from(envelope: Envelope) -> Self {
        envelope.into_wire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReplyTag;

    #[test]
    fn test_scall_wire_shape() {
        let call = OutgoingCall::new(&b"Foo"[..], &b"{}"[..]).with_header(&b"H"[..]);
        let wire = Envelope::scall(call).into_wire();
        assert_eq!(wire.tag, "SCall");
        assert_eq!(wire.payload.len(), 2);
        assert_eq!(&wire.payload[0][..], b"HFoo");
        assert_eq!(&wire.payload[1][..], b"{}");
    }

    #[test]
    fn test_init_has_no_payload() {
        let wire = Envelope::Init.into_wire();
        assert_eq!(wire, WireMessage::new("Init", Vec::new()));
        assert_eq!(Envelope::from_wire(wire).unwrap(), Some(Envelope::Init));
    }

    #[test]
    fn test_res_carries_record() {
        let record = ResultRecord::void(ReplyTag::new(5, 0));
        let wire = Envelope::res(&record).unwrap().into_wire();
        assert_eq!(wire.payload.len(), 1);
        assert_eq!(ResultRecord::parse(&wire.payload[0]).unwrap(), record);
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let wire = WireMessage::new("Stream", vec![Bytes::from_static(b"x")]);
        assert_eq!(Envelope::from_wire(wire).unwrap(), None);
    }

    #[test]
    fn test_wrong_region_count_is_fatal() {
        let wire = WireMessage::new("SCall", vec![Bytes::from_static(b"Foo")]);
        let err = Envelope::from_wire(wire).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope { kind: "SCall", .. }));
        assert!(err.is_fatal());
    }
}
