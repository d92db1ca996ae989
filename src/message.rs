//! Peer wire messages.
//!
//! Every message on a peer connection shares one frame:
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length prefix**: 4 bytes, big-endian, counting the ID byte plus the
//!   payload.
//! - **Message ID**: 1 byte.
//! - **Payload**: length - 1 bytes.
//!
//! A length prefix of 0 carries no ID and no payload: it is a keep-alive,
//! surfaced to callers as the absence of a message.
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | choke | empty |
//! | 1 | unchoke | empty |
//! | 2 | interested | empty |
//! | 3 | not-interested | empty |
//! | 4 | have | piece index (u32) |
//! | 5 | bitfield | packed bit array |
//! | 6 | request | index, begin, length (3 x u32) |
//! | 7 | piece | index, begin (2 x u32), then block bytes |
//! | 8 | cancel | index, begin, length (3 x u32) |
//!
//! All integers on the wire are big-endian.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};

pub type MessageId = u8;

pub const MSG_CHOKE: MessageId = 0;
pub const MSG_UNCHOKE: MessageId = 1;
pub const MSG_INTERESTED: MessageId = 2;
pub const MSG_NOT_INTERESTED: MessageId = 3;
pub const MSG_HAVE: MessageId = 4;
pub const MSG_BITFIELD: MessageId = 5;
pub const MSG_REQUEST: MessageId = 6;
pub const MSG_PIECE: MessageId = 7;
#[allow(dead_code)] // a leech-only client never cancels
pub const MSG_CANCEL: MessageId = 8;

/// A single peer wire message. Keep-alives have no representation here;
/// [`read`] reports them as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a payload-less message.
    pub fn new(id: MessageId) -> Message {
        Message {
            id,
            payload: vec![],
        }
    }

    pub fn with_payload(id: MessageId, payload: Vec<u8>) -> Message {
        Message { id, payload }
    }

    /// Serialize into the length-prefixed wire frame.
    pub fn serialize(&self) -> Vec<u8> {
        let length = 1 + self.payload.len();

        let mut frame = Vec::with_capacity(4 + length);
        frame.extend_from_slice(&(length as u32).to_be_bytes());
        frame.push(self.id);
        frame.extend_from_slice(&self.payload);

        frame
    }

    /// Human-readable message name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self.id {
            MSG_CHOKE => "choke",
            MSG_UNCHOKE => "unchoke",
            MSG_INTERESTED => "interested",
            MSG_NOT_INTERESTED => "not-interested",
            MSG_HAVE => "have",
            MSG_BITFIELD => "bitfield",
            MSG_REQUEST => "request",
            MSG_PIECE => "piece",
            MSG_CANCEL => "cancel",
            _ => "unknown",
        }
    }
}

/// Read one message frame from `stream`.
///
/// Returns `None` for a keep-alive (length prefix 0). A short read, on the
/// prefix or on the body, is a transport error.
pub fn read(stream: &mut impl Read) -> Result<Option<Message>> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).map_err(Error::Transport)?;

    let length = u32::from_be_bytes(prefix) as usize;
    if length == 0 {
        return Ok(None);
    }

    let mut frame = vec![0u8; length];
    stream.read_exact(&mut frame).map_err(Error::Transport)?;

    Ok(Some(Message {
        id: frame[0],
        payload: frame[1..].to_vec(),
    }))
}

/// Build a request message for a block of `length` bytes at offset `begin`
/// within piece `index`.
pub fn format_request(index: u32, begin: u32, length: u32) -> Message {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&begin.to_be_bytes());
    payload.extend_from_slice(&length.to_be_bytes());

    Message::with_payload(MSG_REQUEST, payload)
}

/// Build a have message announcing possession of piece `index`.
pub fn format_have(index: u32) -> Message {
    Message::with_payload(MSG_HAVE, index.to_be_bytes().to_vec())
}

/// Extract the piece index from a have message.
pub fn parse_have(msg: &Message) -> Result<u32> {
    if msg.id != MSG_HAVE {
        return Err(Error::ProtocolViolation(format!(
            "expected have message, got {}",
            msg.name()
        )));
    }
    if msg.payload.len() != 4 {
        return Err(Error::MalformedInput(format!(
            "have payload must be 4 bytes, got {}",
            msg.payload.len()
        )));
    }

    let mut cursor = Cursor::new(&msg.payload);
    let index = cursor.read_u32::<BigEndian>().map_err(Error::Transport)?;

    Ok(index)
}

/// Copy the block carried by a piece message into `buf` at the offset the
/// message names, returning the number of bytes written.
///
/// Rejects messages for a piece other than `index` and blocks that fall
/// outside `buf`. Blocks may arrive in any order; placement relies solely on
/// the begin field.
pub fn parse_piece(index: u32, buf: &mut [u8], msg: &Message) -> Result<usize> {
    if msg.id != MSG_PIECE {
        return Err(Error::ProtocolViolation(format!(
            "expected piece message, got {}",
            msg.name()
        )));
    }
    if msg.payload.len() < 8 {
        return Err(Error::MalformedInput(format!(
            "piece payload must be at least 8 bytes, got {}",
            msg.payload.len()
        )));
    }

    let mut cursor = Cursor::new(&msg.payload[..8]);
    let parsed_index = cursor.read_u32::<BigEndian>().map_err(Error::Transport)?;
    let begin = cursor.read_u32::<BigEndian>().map_err(Error::Transport)? as usize;

    if parsed_index != index {
        return Err(Error::ProtocolViolation(format!(
            "expected piece {index}, got piece {parsed_index}"
        )));
    }
    if begin >= buf.len() {
        return Err(Error::ProtocolViolation(format!(
            "begin offset {begin} is beyond the piece buffer of {} bytes",
            buf.len()
        )));
    }

    let block = &msg.payload[8..];
    if begin + block.len() > buf.len() {
        return Err(Error::ProtocolViolation(format!(
            "block of {} bytes at offset {begin} overruns the piece buffer of {} bytes",
            block.len(),
            buf.len()
        )));
    }

    buf[begin..begin + block.len()].copy_from_slice(block);

    Ok(block.len())
}
