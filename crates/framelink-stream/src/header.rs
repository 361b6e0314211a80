//! Stream-layer message header.
//!
//! The first payload byte of every frame classifies the message:
//!
//! ```text
//! bit 0  isRequest
//! bit 1  isOneWay   (only with isRequest)
//! bits 2-7 reserved, must be zero
//! ```
//!
//! Two-way requests and all responses follow the header byte with an 8-byte
//! big-endian sequence number.

use framelink_frame::Buffer;

use crate::error::{Result, RpcError};

pub const FLAG_REQUEST: u8 = 0x01;
pub const FLAG_ONE_WAY: u8 = 0x02;

/// Size of the sequence number field.
pub const SEQ_SIZE: usize = 8;

const RESERVED_BITS: u8 = !(FLAG_REQUEST | FLAG_ONE_WAY);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    OneWayRequest,
    Response,
}

impl MessageKind {
    /// Classify a header byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & RESERVED_BITS != 0 {
            return Err(RpcError::Protocol(format!(
                "reserved header bits set: {byte:#04x}"
            )));
        }
        match (byte & FLAG_REQUEST != 0, byte & FLAG_ONE_WAY != 0) {
            (true, false) => Ok(MessageKind::Request),
            (true, true) => Ok(MessageKind::OneWayRequest),
            (false, false) => Ok(MessageKind::Response),
            (false, true) => Err(RpcError::Protocol(
                "one-way flag set on a response".to_string(),
            )),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            MessageKind::Request => FLAG_REQUEST,
            MessageKind::OneWayRequest => FLAG_REQUEST | FLAG_ONE_WAY,
            MessageKind::Response => 0,
        }
    }

    /// Whether a sequence number follows the header byte.
    pub fn has_seq(self) -> bool {
        !matches!(self, MessageKind::OneWayRequest)
    }
}

/// A decoded header. `seq` is zero for one-way requests, which carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageKind,
    pub seq: u64,
}

impl Header {
    pub fn new(kind: MessageKind, seq: u64) -> Self {
        Self { kind, seq }
    }

    /// Append the header byte and, where required, the sequence number.
    pub fn write_to(&self, buffer: &mut Buffer) {
        buffer.write_u8(self.kind.to_byte());
        if self.kind.has_seq() {
            buffer.write_u64(self.seq);
        }
    }

    /// Consume a header from the cursor, leaving it at the application bytes.
    pub fn read_from(buffer: &mut Buffer) -> Result<Self> {
        let kind = MessageKind::from_byte(buffer.read_u8().map_err(truncated)?)?;
        let seq = if kind.has_seq() {
            buffer.read_u64().map_err(truncated)?
        } else {
            0
        };
        Ok(Self { kind, seq })
    }
}

fn truncated(err: framelink_frame::FrameError) -> RpcError {
    RpcError::Protocol(format!("truncated header: {err}"))
}
