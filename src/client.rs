//! One live peer connection.
//!
//! A session goes through a fixed setup sequence before any piece traffic:
//!
//! 1. TCP connect (3-second timeout).
//! 2. Handshake exchange; the peer must echo our info hash.
//! 3. The peer's first message must be its bitfield.
//!
//! Each setup read runs under a 3-second socket deadline, cleared before
//! the session is handed to the caller. Every exit path, success or
//! failure, closes the socket by dropping the `TcpStream`.
//!
//! After setup the session exposes one read primitive (again with a
//! set-then-cleared 3-second deadline per call) and the small set of sends
//! a download-only client needs. The choked flag starts true and is only
//! ever changed by the owner processing choke/unchoke messages.

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use crate::bitfield::Bitfield;
use crate::error::{Error, Result};
use crate::handshake::Handshake;
use crate::message::{self, Message, MSG_BITFIELD, MSG_INTERESTED, MSG_NOT_INTERESTED, MSG_UNCHOKE};
use crate::peer::Peer;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// A connected, handshaken peer session.
#[derive(Debug)]
pub struct Client {
    conn: TcpStream,
    /// Whether the peer currently refuses our requests.
    pub choked: bool,
    /// Which pieces the peer claims to have.
    pub bitfield: Bitfield,
    peer: Peer,
}

impl Client {
    /// Connect to `peer` and run the setup sequence. On any failure the
    /// connection is dropped and the peer is unusable for this run.
    pub fn connect(peer: Peer, peer_id: &[u8; 20], info_hash: &[u8; 20]) -> Result<Client> {
        let conn = TcpStream::connect_timeout(&peer.socket_addr(), CONNECT_TIMEOUT)
            .map_err(Error::Transport)?;
        conn.set_write_timeout(Some(READ_TIMEOUT))
            .map_err(Error::Transport)?;

        let mut client = Client {
            conn,
            choked: true,
            bitfield: Bitfield::default(),
            peer,
        };
        client.exchange_handshake(peer_id, info_hash)?;
        client.recv_bitfield()?;

        Ok(client)
    }

    /// Run `f` with the 3-second read deadline armed; the deadline is
    /// cleared again on every path out.
    fn with_read_deadline<T>(&mut self, f: impl FnOnce(&mut Client) -> Result<T>) -> Result<T> {
        self.conn
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(Error::Transport)?;
        let result = f(self);
        let _ = self.conn.set_read_timeout(None);

        result
    }

    fn exchange_handshake(&mut self, peer_id: &[u8; 20], info_hash: &[u8; 20]) -> Result<()> {
        self.with_read_deadline(|client| {
            let request = Handshake::new(*info_hash, *peer_id);
            client
                .conn
                .write_all(&request.serialize())
                .map_err(Error::Transport)?;

            let response = Handshake::read(&mut client.conn)?;
            if response.info_hash != *info_hash {
                return Err(Error::ProtocolViolation(
                    "peer handshake carries a different info hash".to_string(),
                ));
            }

            Ok(())
        })
    }

    /// The first real message has to be the peer's bitfield.
    fn recv_bitfield(&mut self) -> Result<()> {
        self.with_read_deadline(|client| match message::read(&mut client.conn)? {
            Some(msg) if msg.id == MSG_BITFIELD => {
                client.bitfield = Bitfield::new(msg.payload);
                Ok(())
            }
            Some(msg) => Err(Error::ProtocolViolation(format!(
                "expected bitfield, got {}",
                msg.name()
            ))),
            None => Err(Error::ProtocolViolation(
                "expected bitfield, got keep-alive".to_string(),
            )),
        })
    }

    /// Read the next message; `None` is a keep-alive.
    pub fn read(&mut self) -> Result<Option<Message>> {
        self.with_read_deadline(|client| message::read(&mut client.conn))
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    fn send(&mut self, msg: &Message) -> Result<()> {
        self.conn
            .write_all(&msg.serialize())
            .map_err(Error::Transport)
    }

    /// Ask for `length` bytes at offset `begin` of piece `index`.
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        trace!(
            "request piece {} [{}..{}] from {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        self.send(&message::format_request(index, begin, length))
    }

    /// Tell the peer we now have piece `index`.
    pub fn send_have(&mut self, index: u32) -> Result<()> {
        self.send(&message::format_have(index))
    }

    pub fn send_interested(&mut self) -> Result<()> {
        self.send(&Message::new(MSG_INTERESTED))
    }

    #[allow(dead_code)] // the download path never loses interest
    pub fn send_not_interested(&mut self) -> Result<()> {
        self.send(&Message::new(MSG_NOT_INTERESTED))
    }

    pub fn send_unchoke(&mut self) -> Result<()> {
        self.send(&Message::new(MSG_UNCHOKE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    use crate::message::{MSG_HAVE, MSG_PIECE, MSG_UNCHOKE};

    const INFO_HASH: [u8; 20] = [0xAB; 20];

    /// Accept one connection and run `serve` on it; returns the peer
    /// address to dial.
    fn mock_peer(serve: impl FnOnce(TcpStream) + Send + 'static) -> Peer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            if let Ok((conn, _)) = listener.accept() {
                serve(conn);
            }
        });

        Peer {
            ip: Ipv4Addr::LOCALHOST,
            port,
        }
    }

    fn read_handshake(conn: &mut TcpStream) {
        let mut buf = [0u8; 68];
        conn.read_exact(&mut buf).unwrap();
    }

    #[test]
    fn connect_completes_setup() {
        let peer = mock_peer(|mut conn| {
            read_handshake(&mut conn);
            let reply = Handshake::new(INFO_HASH, [7u8; 20]);
            conn.write_all(&reply.serialize()).unwrap();
            conn.write_all(&Message::with_payload(MSG_BITFIELD, vec![0b10100000]).serialize())
                .unwrap();

            // echo the next message's id back inside a have frame
            let next = message::read(&mut conn).unwrap().unwrap();
            conn.write_all(&message::format_have(u32::from(next.id)).serialize())
                .unwrap();
        });

        let mut client = Client::connect(peer, &[1u8; 20], &INFO_HASH).unwrap();
        assert!(client.choked);
        assert!(client.bitfield.has(0));
        assert!(!client.bitfield.has(1));
        assert!(client.bitfield.has(2));

        client.send_not_interested().unwrap();
        let echoed = client.read().unwrap().unwrap();
        assert_eq!(
            message::parse_have(&echoed).unwrap(),
            u32::from(MSG_NOT_INTERESTED)
        );
    }

    #[test]
    fn connect_rejects_wrong_info_hash() {
        let peer = mock_peer(|mut conn| {
            read_handshake(&mut conn);
            let reply = Handshake::new([0xCD; 20], [7u8; 20]);
            let _ = conn.write_all(&reply.serialize());
        });

        let err = Client::connect(peer, &[1u8; 20], &INFO_HASH).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn connect_rejects_non_bitfield_first_message() {
        let peer = mock_peer(|mut conn| {
            read_handshake(&mut conn);
            let reply = Handshake::new(INFO_HASH, [7u8; 20]);
            let _ = conn.write_all(&reply.serialize());
            let _ = conn.write_all(&Message::new(MSG_UNCHOKE).serialize());
        });

        let err = Client::connect(peer, &[1u8; 20], &INFO_HASH).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn session_reads_and_sends_after_setup() {
        let peer = mock_peer(|mut conn| {
            read_handshake(&mut conn);
            let reply = Handshake::new(INFO_HASH, [7u8; 20]);
            conn.write_all(&reply.serialize()).unwrap();
            conn.write_all(&Message::with_payload(MSG_BITFIELD, vec![0xFF]).serialize())
                .unwrap();
            conn.write_all(&message::format_have(3).serialize()).unwrap();

            // expect interested followed by a request, then answer with a block
            let interested = message::read(&mut conn).unwrap().unwrap();
            assert_eq!(interested.id, MSG_INTERESTED);
            let request = message::read(&mut conn).unwrap().unwrap();
            assert_eq!(request.id, crate::message::MSG_REQUEST);
            let mut payload = vec![0, 0, 0, 0, 0, 0, 0, 0];
            payload.extend_from_slice(&[0xEE; 4]);
            conn.write_all(&Message::with_payload(MSG_PIECE, payload).serialize())
                .unwrap();
        });

        let mut client = Client::connect(peer, &[1u8; 20], &INFO_HASH).unwrap();

        let have = client.read().unwrap().unwrap();
        assert_eq!(have.id, MSG_HAVE);
        assert_eq!(message::parse_have(&have).unwrap(), 3);

        client.send_interested().unwrap();
        client.send_request(0, 0, 4).unwrap();

        let piece = client.read().unwrap().unwrap();
        assert_eq!(piece.id, MSG_PIECE);
        let mut buf = [0u8; 4];
        assert_eq!(message::parse_piece(0, &mut buf, &piece).unwrap(), 4);
        assert_eq!(buf, [0xEE; 4]);
    }
}
