//! Fixed-size control buffer and its header variants.
//!
//! The control buffer is a run of little-endian 4-byte signed slots. Slot 0
//! holds the discriminant: the number of header bytes currently valid, which
//! doubles as the "message ready" flag and the variant selector.
//!
//! ```text
//! disc  slots
//!  0    -
//!  8    [value]
//! 12    [ptr, len]                       result landed / void reply tag
//! 20    [ptr, len][ptr, len]             incoming call / reply
//! 28    [ptr, len][ptr, len][ptr, len]   outgoing call
//! ```

use crate::config::BufferConfig;
use crate::error::{BridgeError, Result};
use std::ops::Range;

/// Known discriminant values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Discriminant {
    Empty = 0,
    Scalar = 8,
    Result = 12,
    IncomingCall = 20,
    OutgoingCall = 28,
}

impl Discriminant {
    /// Number of header bytes this variant makes valid.
    pub const fn bytes(self) -> i32 {
        self as i32
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Discriminant::Empty => "empty",
            Discriminant::Scalar => "scalar",
            Discriminant::Result => "result",
            Discriminant::IncomingCall => "incoming call",
            Discriminant::OutgoingCall => "outgoing call",
        }
    }

    /// Exact-match lookup; values between the known thresholds return `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Discriminant::Empty),
            8 => Some(Discriminant::Scalar),
            12 => Some(Discriminant::Result),
            20 => Some(Discriminant::IncomingCall),
            28 => Some(Discriminant::OutgoingCall),
            _ => None,
        }
    }
}

impl std::fmt::Display for Discriminant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.bytes())
    }
}

/// A pointer/length pair referencing bytes in the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub ptr: i32,
    pub len: i32,
}

impl Span {
    pub const fn new(ptr: i32, len: i32) -> Self {
        Self { ptr, len }
    }

    /// Span covering `len` bytes at byte offset `offset`.
    pub fn at(offset: usize, len: usize) -> Result<Self> {
        let end = offset
            .checked_add(len)
            .ok_or(BridgeError::PayloadTooLarge { len })?;
        if i32::try_from(end).is_err() {
            return Err(BridgeError::PayloadTooLarge { len: end });
        }
        Ok(Self {
            ptr: offset as i32,
            len: len as i32,
        })
    }

    /// Byte range inside a region of `capacity` bytes.
    pub fn range(&self, capacity: usize) -> Result<Range<usize>> {
        let invalid = || BridgeError::InvalidSpan {
            ptr: self.ptr,
            len: self.len,
            capacity,
        };
        let start = usize::try_from(self.ptr).map_err(|_| invalid())?;
        let len = usize::try_from(self.len).map_err(|_| invalid())?;
        let end = start.checked_add(len).ok_or_else(invalid)?;
        if end > capacity {
            return Err(invalid());
        }
        Ok(start..end)
    }
}

/// Opaque pair the managed side writes ahead of a reply.
///
/// The first value is the source id the reply is addressed to; the
/// synchronous responder reads it from bytes 4..8 of the result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplyTag {
    pub source_id: i32,
    pub status: i32,
}

impl ReplyTag {
    pub const fn new(source_id: i32, status: i32) -> Self {
        Self { source_id, status }
    }
}

/// Typed view of the control buffer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Empty,
    Scalar(i32),
    /// A result record landed in the data region.
    Result(Span),
    /// The managed side wrote a void reply.
    VoidReply(ReplyTag),
    IncomingCall { method: Span, args: Span },
    Reply { tag: ReplyTag, result: Span },
    OutgoingCall { header: Span, method: Span, args: Span },
}

impl Header {
    pub fn discriminant(&self) -> Discriminant {
        match self {
            Header::Empty => Discriminant::Empty,
            Header::Scalar(_) => Discriminant::Scalar,
            Header::Result(_) | Header::VoidReply(_) => Discriminant::Result,
            Header::IncomingCall { .. } | Header::Reply { .. } => Discriminant::IncomingCall,
            Header::OutgoingCall { .. } => Discriminant::OutgoingCall,
        }
    }

    fn slots(&self) -> Vec<i32> {
        match *self {
            Header::Empty => Vec::new(),
            Header::Scalar(value) => vec![value],
            Header::Result(span) => vec![span.ptr, span.len],
            Header::VoidReply(tag) => vec![tag.source_id, tag.status],
            Header::IncomingCall { method, args } => {
                vec![method.ptr, method.len, args.ptr, args.len]
            }
            Header::Reply { tag, result } => {
                vec![tag.source_id, tag.status, result.ptr, result.len]
            }
            Header::OutgoingCall {
                header,
                method,
                args,
            } => vec![
                header.ptr, header.len, method.ptr, method.len, args.ptr, args.len,
            ],
        }
    }
}

/// The fixed-length header region owned by one endpoint.
#[derive(Debug, Clone)]
pub struct ControlBuffer {
    slots: Box<[i32]>,
}

impl ControlBuffer {
    /// Allocate a control buffer of `byte_len` bytes.
    ///
    /// The length must be a multiple of 4 and large enough for an outgoing
    /// call header.
    pub fn new(byte_len: usize) -> Result<Self> {
        if byte_len < BufferConfig::MIN_CONTROL_LEN {
            return Err(BridgeError::InvalidControlLength {
                len: byte_len,
                reason: "shorter than an outgoing call header",
            });
        }
        if byte_len % 4 != 0 {
            return Err(BridgeError::InvalidControlLength {
                len: byte_len,
                reason: "not a multiple of 4",
            });
        }
        Ok(Self {
            slots: vec![0; byte_len / 4].into_boxed_slice(),
        })
    }

    pub fn byte_len(&self) -> usize {
        self.slots.len() * 4
    }

    /// Raw discriminant value in slot 0.
    pub fn discriminant(&self) -> i32 {
        self.slots[0]
    }

    pub fn slot(&self, index: usize) -> Option<i32> {
        self.slots.get(index).copied()
    }

    /// Write a raw slot. Slot 0 is the discriminant.
    pub fn set_slot(&mut self, index: usize, value: i32) -> Result<()> {
        let slots = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BridgeError::SlotOutOfRange { index, slots })?;
        *slot = value;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.slots[0] = 0;
    }

    /// Fail unless at least `required` header bytes are valid.
    pub fn require(&self, required: Discriminant) -> Result<()> {
        let found = self.discriminant();
        if found < required.bytes() {
            return Err(BridgeError::ProtocolDesync {
                expected: required.bytes(),
                found,
            });
        }
        Ok(())
    }

    /// Publish a header: reset, write the payload slots, then the discriminant.
    pub fn write(&mut self, header: Header) {
        self.reset();
        for (index, value) in header.slots().into_iter().enumerate() {
            self.slots[index + 1] = value;
        }
        self.slots[0] = header.discriminant().bytes();
    }

    pub fn read_scalar(&self) -> Result<i32> {
        self.require(Discriminant::Scalar)?;
        Ok(self.slots[1])
    }

    pub fn read_result(&self) -> Result<Span> {
        self.require(Discriminant::Result)?;
        Ok(Span::new(self.slots[1], self.slots[2]))
    }

    pub fn read_void_reply(&self) -> Result<ReplyTag> {
        self.require(Discriminant::Result)?;
        Ok(ReplyTag::new(self.slots[1], self.slots[2]))
    }

    pub fn read_incoming_call(&self) -> Result<(Span, Span)> {
        self.require(Discriminant::IncomingCall)?;
        Ok((
            Span::new(self.slots[1], self.slots[2]),
            Span::new(self.slots[3], self.slots[4]),
        ))
    }

    pub fn read_reply(&self) -> Result<(ReplyTag, Span)> {
        self.require(Discriminant::IncomingCall)?;
        Ok((
            ReplyTag::new(self.slots[1], self.slots[2]),
            Span::new(self.slots[3], self.slots[4]),
        ))
    }

    pub fn read_outgoing_call(&self) -> Result<(Span, Span, Span)> {
        self.require(Discriminant::OutgoingCall)?;
        Ok((
            Span::new(self.slots[1], self.slots[2]),
            Span::new(self.slots[3], self.slots[4]),
            Span::new(self.slots[5], self.slots[6]),
        ))
    }

    /// Little-endian bytes of the first `count` slots, capped at the buffer length.
    pub fn slot_bytes(&self, count: usize) -> Vec<u8> {
        self.slots[..count.min(self.slots.len())]
            .iter()
            .flat_map(|slot| slot.to_le_bytes())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminant_values_are_wire_stable() {
        assert_eq!(Discriminant::Empty.bytes(), 0);
        assert_eq!(Discriminant::Scalar.bytes(), 8);
        assert_eq!(Discriminant::Result.bytes(), 12);
        assert_eq!(Discriminant::IncomingCall.bytes(), 20);
        assert_eq!(Discriminant::OutgoingCall.bytes(), 28);
        assert_eq!(Discriminant::from_raw(20), Some(Discriminant::IncomingCall));
        assert_eq!(Discriminant::from_raw(16), None);
    }

    #[test]
    fn test_control_buffer_length_validation() {
        assert!(ControlBuffer::new(256).is_ok());
        assert!(ControlBuffer::new(28).is_ok());
        assert!(matches!(
            ControlBuffer::new(24),
            Err(BridgeError::InvalidControlLength { .. })
        ));
        assert!(matches!(
            ControlBuffer::new(30),
            Err(BridgeError::InvalidControlLength { .. })
        ));
    }

    #[test]
    fn test_write_publishes_discriminant_last() {
        let mut control = ControlBuffer::new(256).unwrap();
        control.write(Header::IncomingCall {
            method: Span::new(0, 3),
            args: Span::new(3, 2),
        });
        assert_eq!(control.discriminant(), 20);
        assert_eq!(
            control.read_incoming_call().unwrap(),
            (Span::new(0, 3), Span::new(3, 2))
        );
    }

    #[test]
    fn test_reader_rejects_short_header() {
        let mut control = ControlBuffer::new(256).unwrap();
        control.write(Header::IncomingCall {
            method: Span::new(0, 1),
            args: Span::new(1, 1),
        });
        let err = control.read_outgoing_call().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ProtocolDesync {
                expected: 28,
                found: 20
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_longer_header_satisfies_shorter_reader() {
        let mut control = ControlBuffer::new(256).unwrap();
        control.write(Header::Reply {
            tag: ReplyTag::new(7, 0),
            result: Span::new(0, 5),
        });
        // A void reader only needs the first two slots.
        assert_eq!(control.read_void_reply().unwrap(), ReplyTag::new(7, 0));
    }

    #[test]
    fn test_span_range_validation() {
        assert_eq!(Span::new(4, 4).range(8).unwrap(), 4..8);
        assert!(Span::new(4, 5).range(8).is_err());
        assert!(Span::new(-1, 2).range(8).is_err());
        assert!(Span::new(0, -2).range(8).is_err());
        assert!(Span::at(usize::MAX, 1).is_err());
    }

    #[test]
    fn test_slot_bytes_little_endian() {
        let mut control = ControlBuffer::new(28).unwrap();
        control.write(Header::VoidReply(ReplyTag::new(7, 1)));
        assert_eq!(
            control.slot_bytes(3),
            vec![12, 0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn test_raw_slot_access_is_bounds_checked() {
        let mut control = ControlBuffer::new(28).unwrap();
        // A managed writer publishing a scalar by hand.
        control.set_slot(1, -1).unwrap();
        control.set_slot(0, Discriminant::Scalar.bytes()).unwrap();
        assert_eq!(control.read_scalar().unwrap(), -1);
        assert_eq!(control.slot(6), Some(0));

        assert_eq!(control.slot(7), None);
        assert!(matches!(
            control.set_slot(7, 1),
            Err(BridgeError::SlotOutOfRange { index: 7, slots: 7 })
        ));
        assert_eq!(control.slot_bytes(100).len(), 28);
    }
}
