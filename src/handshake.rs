//! Connection-opening handshake.
//!
//! The first bytes exchanged on every peer connection, before any
//! length-prefixed message:
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte, the length of the protocol string (19).
//! - **pstr**: the literal `"BitTorrent protocol"`.
//! - **reserved**: 8 zero bytes.
//! - **info_hash**: 20 bytes identifying the torrent.
//! - **peer_id**: 20 bytes identifying the sender.
//!
//! 68 bytes total for the standard protocol string. A peer answering with a
//! different info hash is talking about a different torrent and must be
//! dropped; that check belongs to the session setup, not to this codec.

use std::io::Read;

use crate::error::{Error, Result};

const PROTOCOL_ID: &str = "BitTorrent protocol";

/// The greeting frame either side of a connection sends first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub pstr: String,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Build a handshake carrying the standard protocol string.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Handshake {
        Handshake {
            pstr: PROTOCOL_ID.to_string(),
            info_hash,
            peer_id,
        }
    }

    /// Serialize the frame: pstrlen, pstr, 8 reserved zero bytes, info hash,
    /// peer id.
    pub fn serialize(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(49 + self.pstr.len());

        frame.push(self.pstr.len() as u8);
        frame.extend_from_slice(self.pstr.as_bytes());
        frame.extend_from_slice(&[0u8; 8]);
        frame.extend_from_slice(&self.info_hash);
        frame.extend_from_slice(&self.peer_id);

        frame
    }

    /// Read a handshake from `stream`: one length byte, then exactly
    /// 48 + pstrlen further bytes. A zero-length protocol string is invalid.
    pub fn read(stream: &mut impl Read) -> Result<Handshake> {
        let mut pstrlen = [0u8; 1];
        stream.read_exact(&mut pstrlen).map_err(Error::Transport)?;

        let pstrlen = pstrlen[0] as usize;
        if pstrlen == 0 {
            return Err(Error::MalformedInput(
                "handshake protocol string length cannot be 0".to_string(),
            ));
        }

        let mut frame = vec![0u8; 48 + pstrlen];
        stream.read_exact(&mut frame).map_err(Error::Transport)?;

        let pstr = String::from_utf8_lossy(&frame[..pstrlen]).into_owned();

        let mut info_hash = [0u8; 20];
        let mut peer_id = [0u8; 20];
        info_hash.copy_from_slice(&frame[pstrlen + 8..pstrlen + 28]);
        peer_id.copy_from_slice(&frame[pstrlen + 28..pstrlen + 48]);

        Ok(Handshake {
            pstr,
            info_hash,
            peer_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn standard_frame_is_68_bytes() {
        let hs = Handshake::new([1u8; 20], [2u8; 20]);
        let frame = hs.serialize();

        assert_eq!(frame.len(), 68);
        assert_eq!(frame[0], 19);
        assert_eq!(&frame[1..20], PROTOCOL_ID.as_bytes());
        assert_eq!(&frame[20..28], &[0u8; 8]);
    }

    #[test]
    fn serialize_then_read_is_identity() {
        let hs = Handshake::new([0xD8; 20], [0x42; 20]);
        let mut stream = Cursor::new(hs.serialize());

        assert_eq!(Handshake::read(&mut stream).unwrap(), hs);
    }

    #[test]
    fn read_rejects_zero_pstrlen() {
        let mut frame = vec![0u8];
        frame.extend_from_slice(&[0u8; 48]);
        let mut stream = Cursor::new(frame);

        assert!(Handshake::read(&mut stream).is_err());
    }

    #[test]
    fn read_fails_on_truncated_frame() {
        let hs = Handshake::new([1u8; 20], [2u8; 20]);
        let mut frame = hs.serialize();
        frame.truncate(40);
        let mut stream = Cursor::new(frame);

        assert!(Handshake::read(&mut stream).is_err());
    }
}
