//! Metainfo parsing and the torrent descriptor.
//!
//! A .torrent file is a bencoded dictionary:
//!
//! - **announce**: tracker URL.
//! - **info**: file metadata: `name`, `length`, `piece length`, and
//!   `pieces`, the concatenated 20-byte SHA-1 digests of every piece.
//!
//! The info hash identifying the torrent on the wire is the SHA-1 of the
//! bencoded `info` sub-dictionary, re-encoded byte-identically from the
//! parsed fields. The descriptor built here is immutable for the rest of
//! the run; piece geometry (size and byte offset per index) lives with it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

const SHA1_HASH_SIZE: usize = 20;

/// Everything the download engine needs to know about a single-file torrent.
#[derive(Debug, Clone)]
pub struct Torrent {
    /// Tracker URL for peer discovery.
    pub announce: String,
    /// SHA-1 of the bencoded info dictionary.
    pub info_hash: [u8; 20],
    /// One SHA-1 digest per piece, in piece order.
    pub piece_hashes: Vec<[u8; 20]>,
    /// Size of every piece but possibly the last, in bytes.
    pub piece_length: u32,
    /// Total file size in bytes.
    pub length: u32,
    /// Suggested output filename from the metainfo.
    pub name: String,
}

// Field declaration order matches bencode's sorted-key dictionary order, so
// re-encoding reproduces the original info bytes regardless of how the
// serializer orders struct fields.
#[derive(Debug, Deserialize, Serialize)]
struct BencodeInfo {
    length: u32,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u32,
    pieces: ByteBuf,
}

#[derive(Debug, Deserialize, Serialize)]
struct BencodeTorrent {
    announce: String,
    info: BencodeInfo,
}

impl BencodeInfo {
    /// SHA-1 of the re-encoded info dictionary.
    fn info_hash(&self) -> Result<[u8; 20]> {
        let encoded = ser::to_bytes(self)
            .map_err(|e| Error::MalformedInput(format!("could not re-encode info: {e}")))?;

        Ok(Sha1::digest(&encoded).into())
    }

    /// Split the concatenated digest string into 20-byte groups.
    fn split_piece_hashes(&self) -> Result<Vec<[u8; 20]>> {
        if !self.pieces.len().is_multiple_of(SHA1_HASH_SIZE) {
            return Err(Error::MalformedInput(format!(
                "pieces string of {} bytes is not a multiple of {}",
                self.pieces.len(),
                SHA1_HASH_SIZE
            )));
        }

        let mut hashes = Vec::with_capacity(self.pieces.len() / SHA1_HASH_SIZE);
        for group in self.pieces.chunks_exact(SHA1_HASH_SIZE) {
            let mut hash = [0u8; SHA1_HASH_SIZE];
            hash.copy_from_slice(group);
            hashes.push(hash);
        }

        Ok(hashes)
    }
}

impl Torrent {
    /// Read and decode a .torrent file.
    pub fn open(path: &Path) -> Result<Torrent> {
        let raw = fs::read(path).map_err(Error::LocalIo)?;
        Torrent::from_bytes(&raw)
    }

    /// Decode a torrent descriptor from raw metainfo bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Torrent> {
        let bencode: BencodeTorrent = de::from_bytes(raw)
            .map_err(|e| Error::MalformedInput(format!("could not decode torrent: {e}")))?;

        Ok(Torrent {
            announce: bencode.announce,
            info_hash: bencode.info.info_hash()?,
            piece_hashes: bencode.info.split_piece_hashes()?,
            piece_length: bencode.info.piece_length,
            length: bencode.info.length,
            name: bencode.info.name,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Size of piece `index` in bytes: the piece length, clamped to what is
    /// left of the file for the final piece.
    pub fn piece_size(&self, index: u32) -> u32 {
        let begin = u64::from(index) * u64::from(self.piece_length);
        let end = (begin + u64::from(self.piece_length)).min(u64::from(self.length));

        (end - begin) as u32
    }

    /// Absolute byte offset of piece `index` in the output file.
    pub fn piece_offset(&self, index: u32) -> u64 {
        u64::from(index) * u64::from(self.piece_length)
    }
}
