//! Peer addresses and the tracker's compact peer list.
//!
//! Trackers answer with peers packed six bytes each: four bytes of IPv4
//! address followed by a big-endian port.

use std::fmt;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};

const COMPACT_PEER_SIZE: usize = 6;

/// A remote peer as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parse a compact peer list. The input length must be a multiple of 6.
pub fn parse_compact(raw: &[u8]) -> Result<Vec<Peer>> {
    if !raw.len().is_multiple_of(COMPACT_PEER_SIZE) {
        return Err(Error::MalformedInput(format!(
            "compact peer list of {} bytes is not a multiple of {}",
            raw.len(),
            COMPACT_PEER_SIZE
        )));
    }

    let mut peers = Vec::with_capacity(raw.len() / COMPACT_PEER_SIZE);
    for group in raw.chunks_exact(COMPACT_PEER_SIZE) {
        let ip = Ipv4Addr::new(group[0], group[1], group[2], group[3]);
        let port = Cursor::new(&group[4..])
            .read_u16::<BigEndian>()
            .map_err(Error::Transport)?;

        peers.push(Peer { ip, port });
    }

    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_groups() {
        let raw = [0x7F, 0x00, 0x00, 0x01, 0x00, 0x50, 0x01, 0x01, 0x01, 0x01, 0x01, 0xBB];
        let peers = parse_compact(&raw).unwrap();

        assert_eq!(
            peers,
            vec![
                Peer {
                    ip: Ipv4Addr::new(127, 0, 0, 1),
                    port: 80
                },
                Peer {
                    ip: Ipv4Addr::new(1, 1, 1, 1),
                    port: 443
                },
            ]
        );
    }

    #[test]
    fn empty_list_is_valid() {
        assert_eq!(parse_compact(&[]).unwrap(), vec![]);
    }

    #[test]
    fn rejects_partial_groups() {
        let raw = [0x7F, 0x00, 0x00, 0x01, 0x00];
        assert!(parse_compact(&raw).is_err());
    }

    #[test]
    fn displays_as_host_port() {
        let peer = Peer {
            ip: Ipv4Addr::new(10, 0, 0, 2),
            port: 6881,
        };
        assert_eq!(peer.to_string(), "10.0.0.2:6881");
    }
}
