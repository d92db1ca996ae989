//! Crate-wide error type.
//!
//! Per-peer failures (transport, protocol, integrity) are recoverable: the
//! worker that hit them returns its work unit to the queue. Everything else
//! (bad metainfo, tracker failure, output file I/O, a swarm with no live
//! workers left) aborts the download.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad metainfo, peer list, or message framing.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The peer broke the wire protocol: wrong info hash, a non-bitfield
    /// message where a bitfield was expected, a piece for the wrong index,
    /// or a block outside the piece bounds.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A fully downloaded piece did not match its expected SHA-1 digest.
    #[error("piece {index} failed its integrity check")]
    IntegrityFailure { index: u32 },

    /// Connect, read, or write failure, including timeouts.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// Announce URL, HTTP, or response decoding failure.
    #[error("tracker failure: {0}")]
    TrackerFailure(String),

    /// Local file failure: reading the metainfo, or creating and writing
    /// the output.
    #[error("local file error: {0}")]
    LocalIo(#[source] io::Error),

    /// Every worker exited while pieces were still missing.
    #[error("download stalled: no live peer workers remain")]
    NoProgress,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TrackerFailure(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::TrackerFailure(format!("could not parse tracker url: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
