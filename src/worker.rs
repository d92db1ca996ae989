//! Per-peer download worker.
//!
//! One worker owns one peer session for its whole life. It pulls piece
//! work units off the shared queue, runs the pipelined block-request state
//! machine against its peer, verifies each finished piece against its
//! SHA-1 digest, and hands verified pieces to the results channel.
//!
//! Failure is routed by kind:
//!
//! - the peer lacks the piece: unit back on the queue, take the next;
//! - transport or protocol error: unit back on the queue, worker exits
//!   (the session is dead);
//! - integrity failure: unit back on the queue, worker continues (the
//!   session still works, another attempt may come from another peer).
//!
//! The queue is sized so that a unit being handed back always has a free
//! slot: a worker can only return the unit it just took out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use sha1::{Digest, Sha1};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::message::{self, MSG_CHOKE, MSG_HAVE, MSG_PIECE, MSG_UNCHOKE};
use crate::peer::Peer;
use crate::piece::{PieceResult, PieceWork};

/// Largest block a single request may ask for.
pub const MAX_BLOCK_SIZE: u32 = 16384;

/// Most requests left unanswered on one connection at a time.
pub const MAX_BACKLOG: u32 = 8;

// 30 seconds is more than enough to move a typical 256 KiB piece; a peer
// that cannot manage it gets abandoned.
const PIECE_DEADLINE: Duration = Duration::from_secs(30);

/// In-flight state of a single piece attempt.
struct PieceProgress {
    index: u32,
    buf: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: u32,
}

impl PieceProgress {
    /// Block for the peer's next message and fold it into the state.
    fn read_message(&mut self, client: &mut Client) -> Result<()> {
        let msg = match client.read()? {
            Some(msg) => msg,
            None => return Ok(()), // keep-alive
        };

        match msg.id {
            MSG_CHOKE => client.choked = true,
            MSG_UNCHOKE => client.choked = false,
            MSG_HAVE => {
                let index = message::parse_have(&msg)?;
                client.bitfield.set(index);
            }
            MSG_PIECE => {
                let n = message::parse_piece(self.index, &mut self.buf, &msg)?;
                self.downloaded += n as u32;
                self.backlog = self.backlog.saturating_sub(1);
            }
            _ => trace!("ignoring {} from {}", msg.name(), client.peer()),
        }

        Ok(())
    }
}

/// Run the block-request pipeline until the piece buffer is full.
///
/// While unchoked, keeps up to [`MAX_BACKLOG`] requests outstanding, each
/// for at most [`MAX_BLOCK_SIZE`] bytes, issued in increasing offset order.
/// Blocks are placed wherever their begin field says, so out-of-order
/// arrival is fine. The whole attempt must finish inside a 30-second
/// wall-clock deadline on top of the session's per-read deadline.
fn attempt_download_piece(client: &mut Client, work: &PieceWork) -> Result<Vec<u8>> {
    let mut state = PieceProgress {
        index: work.index,
        buf: vec![0; work.length as usize],
        downloaded: 0,
        requested: 0,
        backlog: 0,
    };

    let deadline = Instant::now() + PIECE_DEADLINE;

    while state.downloaded < work.length {
        if Instant::now() >= deadline {
            return Err(Error::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("piece {} attempt exceeded 30s", work.index),
            )));
        }

        if !client.choked {
            while state.backlog < MAX_BACKLOG && state.requested < work.length {
                let block_size = MAX_BLOCK_SIZE.min(work.length - state.requested);

                client.send_request(work.index, state.requested, block_size)?;
                state.backlog += 1;
                state.requested += block_size;
            }
        }

        state.read_message(client)?;
    }

    Ok(state.buf)
}

fn verify_piece(work: &PieceWork, data: &[u8]) -> Result<()> {
    let digest: [u8; 20] = Sha1::digest(data).into();
    if digest != work.hash {
        return Err(Error::IntegrityFailure { index: work.index });
    }

    Ok(())
}

/// Decrements the live-worker count when the worker leaves scope, on every
/// exit path.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Downloads pieces from a single peer until the queue closes or the
/// session dies.
pub struct Worker {
    peer: Peer,
    peer_id: [u8; 20],
    info_hash: [u8; 20],
    work: (Sender<PieceWork>, Receiver<PieceWork>),
    results: Sender<PieceResult>,
    live: Arc<AtomicUsize>,
}

impl Worker {
    pub fn new(
        peer: Peer,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        work: (Sender<PieceWork>, Receiver<PieceWork>),
        results: Sender<PieceResult>,
        live: Arc<AtomicUsize>,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            work,
            results,
            live,
        }
    }

    /// Worker thread body.
    pub fn run(self) {
        let _live = LiveGuard(self.live.clone());

        let mut client = match Client::connect(self.peer.clone(), &self.peer_id, &self.info_hash) {
            Ok(client) => client,
            Err(e) => {
                warn!("dropping peer {}: {}", self.peer, e);
                return;
            }
        };
        info!("completed handshake with {}", self.peer);

        if let Err(e) = client
            .send_unchoke()
            .and_then(|_| client.send_interested())
        {
            warn!("dropping peer {}: {}", self.peer, e);
            return;
        }

        loop {
            let work = match self.work.1.recv() {
                Ok(work) => work,
                Err(_) => return, // queue closed, download is over
            };

            if !client.bitfield.has(work.index) {
                if self.work.0.send(work).is_err() {
                    return;
                }
                continue;
            }

            let data = match attempt_download_piece(&mut client, &work) {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        "abandoning peer {} after error on piece {}: {}",
                        self.peer, work.index, e
                    );
                    let _ = self.work.0.send(work);
                    return;
                }
            };

            if let Err(e) = verify_piece(&work, &data) {
                warn!("{} (from peer {}), retrying elsewhere", e, self.peer);
                if self.work.0.send(work).is_err() {
                    return;
                }
                continue;
            }

            if let Err(e) = client.send_have(work.index) {
                // not worth losing the piece over
                debug!("could not send have to {}: {}", self.peer, e);
            }

            let result = PieceResult {
                index: work.index,
                data,
            };
            if self.results.send(result).is_err() {
                return;
            }
        }
    }
}
