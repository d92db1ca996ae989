//! Tracker announce: peer discovery over HTTP.
//!
//! One GET against the metainfo's announce URL with the standard query
//! parameters. The response is a bencoded dictionary carrying `interval`
//! (how long to wait before re-announcing; this client downloads once and
//! ignores it) and `peers`, the compact peer list.

use std::time::Duration;

use serde::Deserialize;
use serde_bytes::ByteBuf;
use url::Url;

use crate::error::{Error, Result};
use crate::peer::{self, Peer};
use crate::torrent::Torrent;

/// Port reported to the tracker. The client never listens; the value is
/// informational, per convention the first of the BitTorrent port range.
pub const CLIENT_PORT: u16 = 6881;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct BencodeTrackerResponse {
    interval: u32,
    peers: ByteBuf,
}

impl Torrent {
    /// Announce to the tracker and return the peers it knows about.
    pub fn request_peers(&self, peer_id: &[u8; 20], port: u16) -> Result<Vec<Peer>> {
        let url = self.build_tracker_url(peer_id, port)?;
        debug!("announcing to {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(TRACKER_TIMEOUT)
            .build()?;
        let body = client.get(&url).send()?.error_for_status()?.bytes()?;

        let response: BencodeTrackerResponse = serde_bencode::de::from_bytes(&body)
            .map_err(|e| Error::TrackerFailure(format!("could not decode response: {e}")))?;
        debug!(
            "tracker answered with {} bytes of peers, re-announce interval {}s",
            response.peers.len(),
            response.interval
        );

        peer::parse_compact(&response.peers)
    }

    /// Build the announce URL. Binary values are percent-encoded byte for
    /// byte; keys are emitted in lexicographic order, the canonical form.
    fn build_tracker_url(&self, peer_id: &[u8; 20], port: u16) -> Result<String> {
        let base = Url::parse(&self.announce)?;

        let query = format!(
            "compact=1&downloaded=0&info_hash={}&left={}&peer_id={}&port={}&uploaded=0",
            urlencode_bytes(&self.info_hash),
            self.length,
            urlencode_bytes(peer_id),
            port,
        );

        let mut url = base.to_string();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);

        Ok(url)
    }
}

/// Percent-encode arbitrary bytes for a query string: unreserved bytes
/// (`A-Z a-z 0-9 - _ . ~`) stay literal, everything else becomes `%XX`.
fn urlencode_bytes(data: &[u8]) -> String {
    const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

    let mut encoded = String::with_capacity(data.len() * 3);
    for &byte in data {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
                encoded.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
            }
        }
    }

    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(announce: &str) -> Torrent {
        Torrent {
            announce: announce.to_string(),
            info_hash: [
                0xD8, 0xF7, 0x39, 0xCE, 0xC3, 0x28, 0x95, 0x6C, 0xCC, 0x5B, 0xBF, 0x1F, 0x86,
                0xD9, 0xFD, 0xCF, 0xDB, 0xA8, 0xCE, 0xB6,
            ],
            piece_hashes: vec![],
            piece_length: 262144,
            length: 351272960,
            name: "debian.iso".to_string(),
        }
    }

    fn sequential_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        for (i, b) in peer_id.iter_mut().enumerate() {
            *b = i as u8;
        }
        peer_id
    }

    #[test]
    fn builds_the_announce_url() {
        let torrent = descriptor("http://bttracker.debian.org:6969/announce");
        let url = torrent
            .build_tracker_url(&sequential_peer_id(), 6789)
            .unwrap();

        assert_eq!(
            url,
            "http://bttracker.debian.org:6969/announce\
             ?compact=1\
             &downloaded=0\
             &info_hash=%D8%F79%CE%C3%28%95l%CC%5B%BF%1F%86%D9%FD%CF%DB%A8%CE%B6\
             &left=351272960\
             &peer_id=%00%01%02%03%04%05%06%07%08%09%0A%0B%0C%0D%0E%0F%10%11%12%13\
             &port=6789\
             &uploaded=0"
        );
    }

    #[test]
    fn appends_to_an_existing_query() {
        let torrent = descriptor("http://tracker.example/announce?key=abcd");
        let url = torrent
            .build_tracker_url(&sequential_peer_id(), 6881)
            .unwrap();

        assert!(url.starts_with("http://tracker.example/announce?key=abcd&compact=1&"));
    }

    #[test]
    fn rejects_a_bad_announce_url() {
        let torrent = descriptor("not a url");
        assert!(torrent
            .build_tracker_url(&sequential_peer_id(), 6881)
            .is_err());
    }

    #[test]
    fn urlencode_keeps_unreserved_bytes() {
        assert_eq!(urlencode_bytes(b"aZ0-_.~"), "aZ0-_.~");
        assert_eq!(urlencode_bytes(&[0x00, 0x1F, b' ', b'%']), "%00%1F%20%25");
    }
}
