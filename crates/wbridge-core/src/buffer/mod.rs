//! Shared-buffer call/response protocol.
//!
//! Each endpoint owns one [`ControlBuffer`] (fixed header, never reallocated)
//! and one [`DataRegion`] (growable payload bytes). The [`Codec`] moves typed
//! calls and results through both.
//!
//! # Single flight
//!
//! Both buffers are shared by every call on an endpoint with no per-call
//! tagging, so a new outgoing call must not be encoded before the previous
//! result has been decoded. The buffers do not enforce this.

pub mod codec;
pub mod control;
pub mod data;
pub mod record;

pub use codec::{Codec, IncomingCall, OutgoingCall};
pub use control::{ControlBuffer, Discriminant, Header, ReplyTag, Span};
pub use data::{DataRegion, HeapAllocator, RegionAllocator};
pub use record::{ResultRecord, RECORD_PREFIX_LEN};
