//! Translation between typed calls/results and the control + data buffers.
//!
//! Every encode resets the discriminant before touching the data region and
//! publishes the new discriminant last, so a reader never sees a header that
//! points at half-written payload bytes.

use super::control::{ControlBuffer, Discriminant, Header, ReplyTag, Span};
use super::data::{DataRegion, RegionAllocator};
use super::record::{declared_len, ResultRecord, RECORD_PREFIX_LEN};
use crate::config::EndpointConfig;
use crate::error::{BridgeError, Result};
use crate::text::decode_utf8;
use bytes::{Bytes, BytesMut};

/// A call produced by the managed side, ready to forward to another context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingCall {
    /// Opaque bytes the managed side places ahead of the method name.
    pub header: Bytes,
    pub method: Bytes,
    /// JSON argument, kept as raw bytes.
    pub args: Bytes,
}

impl OutgoingCall {
    pub fn new(method: impl Into<Bytes>, args: impl Into<Bytes>) -> Self {
        Self {
            header: Bytes::new(),
            method: method.into(),
            args: args.into(),
        }
    }

    pub fn with_header(mut self, header: impl Into<Bytes>) -> Self {
        self.header = header.into();
        self
    }

    pub fn method_name(&self) -> String {
        decode_utf8(&self.method).into_owned()
    }

    /// Header and method name as one contiguous region.
    pub fn name_region(&self) -> Bytes {
        if self.header.is_empty() {
            return self.method.clone();
        }
        let mut out = BytesMut::with_capacity(self.header.len() + self.method.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.method);
        out.freeze()
    }
}

/// A call delivered to the managed receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub method: Bytes,
    pub args: Bytes,
}

impl IncomingCall {
    pub fn method_name(&self) -> String {
        decode_utf8(&self.method).into_owned()
    }
}

/// Control buffer plus data region for one endpoint.
#[derive(Debug)]
pub struct Codec {
    control: ControlBuffer,
    data: DataRegion,
}

impl Codec {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        Ok(Self {
            control: ControlBuffer::new(config.control_len)?,
            data: DataRegion::new(config.data_len),
        })
    }

    pub fn with_allocator(
        config: EndpointConfig,
        allocator: Box<dyn RegionAllocator>,
    ) -> Result<Self> {
        Ok(Self {
            control: ControlBuffer::new(config.control_len)?,
            data: DataRegion::with_allocator(config.data_len, allocator),
        })
    }

    pub fn control(&self) -> &ControlBuffer {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut ControlBuffer {
        &mut self.control
    }

    pub fn data(&self) -> &DataRegion {
        &self.data
    }

    /// Copy `parts` back to back from offset 0, growing the region if needed.
    fn write_parts(&mut self, parts: &[&[u8]]) -> Result<Vec<Span>> {
        let total = parts.iter().try_fold(0usize, |acc, part| {
            acc.checked_add(part.len())
                .ok_or(BridgeError::PayloadTooLarge { len: usize::MAX })
        })?;
        self.data.ensure_capacity(total)?;
        let region = self.data.as_mut_slice()?;

        let mut spans = Vec::with_capacity(parts.len());
        let mut offset = 0;
        for part in parts {
            let span = Span::at(offset, part.len())?;
            region[offset..offset + part.len()].copy_from_slice(part);
            spans.push(span);
            offset += part.len();
        }
        Ok(spans)
    }

    /// Copy the bytes a span references out of the data region.
    pub fn read_span(&self, span: Span) -> Result<Bytes> {
        let region = self.data.as_slice()?;
        let range = span.range(region.len())?;
        Ok(Bytes::copy_from_slice(&region[range]))
    }

    pub fn encode_outgoing_call(&mut self, call: &OutgoingCall) -> Result<()> {
        self.control.reset();
        let spans = self.write_parts(&[&call.header[..], &call.method[..], &call.args[..]])?;
        self.control.write(Header::OutgoingCall {
            header: spans[0],
            method: spans[1],
            args: spans[2],
        });
        Ok(())
    }

    pub fn decode_outgoing_call(&self) -> Result<OutgoingCall> {
        let (header, method, args) = self.control.read_outgoing_call()?;
        Ok(OutgoingCall {
            header: self.read_span(header)?,
            method: self.read_span(method)?,
            args: self.read_span(args)?,
        })
    }

    pub fn encode_incoming_call(&mut self, method: &[u8], args: &[u8]) -> Result<()> {
        self.control.reset();
        let spans = self.write_parts(&[method, args])?;
        self.control.write(Header::IncomingCall {
            method: spans[0],
            args: spans[1],
        });
        Ok(())
    }

    pub fn decode_incoming_call(&self) -> Result<IncomingCall> {
        let (method, args) = self.control.read_incoming_call()?;
        Ok(IncomingCall {
            method: self.read_span(method)?,
            args: self.read_span(args)?,
        })
    }

    /// Managed side: publish a reply carrying result bytes.
    pub fn encode_reply(&mut self, tag: ReplyTag, result: &[u8]) -> Result<()> {
        self.control.reset();
        let spans = self.write_parts(&[result])?;
        self.control.write(Header::Reply {
            tag,
            result: spans[0],
        });
        Ok(())
    }

    /// Managed side: publish a void reply.
    pub fn encode_void_reply(&mut self, tag: ReplyTag) {
        self.control.write(Header::VoidReply(tag));
    }

    /// Read a reply with result bytes into a result record.
    pub fn decode_result(&self) -> Result<ResultRecord> {
        let (tag, result) = self.control.read_reply()?;
        Ok(ResultRecord::new(tag, self.read_span(result)?))
    }

    /// Read a void reply into a prefix-only result record.
    pub fn decode_void_result(&self) -> Result<ResultRecord> {
        let tag = self.control.read_void_reply()?;
        Ok(ResultRecord::void(tag))
    }

    /// Land a received result record in the data region.
    pub fn encode_result(&mut self, record: &[u8]) -> Result<()> {
        let len = declared_len(record)?;
        if len < RECORD_PREFIX_LEN || len > record.len() {
            return Err(BridgeError::malformed(
                "Res",
                format!("declared length {} for {} bytes", len, record.len()),
            ));
        }
        self.control.reset();
        let spans = self.write_parts(&[&record[..len]])?;
        self.control.write(Header::Result(spans[0]));
        Ok(())
    }

    /// Land a void result for `tag`.
    pub fn encode_void_result(&mut self, tag: ReplyTag) -> Result<()> {
        let record = ResultRecord::void(tag).to_bytes()?;
        self.encode_result(&record)
    }

    /// Managed side: parse the result record that landed last.
    pub fn read_result(&self) -> Result<ResultRecord> {
        let span = self.control.read_result()?;
        let bytes = self.read_span(span)?;
        ResultRecord::parse(&bytes)
    }

    pub fn encode_scalar(&mut self, value: i32) {
        self.control.write(Header::Scalar(value));
    }

    pub fn decode_scalar(&self) -> Result<i32> {
        self.control.read_scalar()
    }

    /// Raw discriminant, as the managed side would poll it.
    pub fn discriminant(&self) -> i32 {
        self.control.discriminant()
    }

    /// Whether the header is at least `required` bytes long.
    pub fn is_ready(&self, required: Discriminant) -> bool {
        self.control.discriminant() >= required.bytes()
    }
}
