//! Download coordination.
//!
//! The coordinator seeds a bounded queue with one work unit per piece,
//! spawns one worker thread per tracker-returned peer, and collects
//! verified pieces off the results channel, writing each at its absolute
//! offset in the output file. Results arrive in whatever order the swarm
//! produces them; positional writes make ordering irrelevant.
//!
//! The queue holds at most n units and exactly n units exist, so a worker
//! handing a unit back can never block. The results channel is a
//! rendezvous: a worker parks on it until the collector takes the piece.
//! If every worker dies while pieces are missing, the workers' ends of the
//! results channel are all gone and the collector fails with `NoProgress`
//! instead of waiting forever.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;

use crate::error::{Error, Result};
use crate::piece::{PieceResult, PieceWork};
use crate::torrent::Torrent;
use crate::tracker::CLIENT_PORT;
use crate::worker::Worker;

impl Torrent {
    /// Download the whole torrent into the file at `path`, creating or
    /// truncating it. Returns once all pieces are written and verified.
    pub fn download_to_file(&self, path: &Path) -> Result<()> {
        let mut peer_id = [0u8; 20];
        rand::thread_rng().fill(&mut peer_id[..]);

        let peers = self.request_peers(&peer_id, CLIENT_PORT)?;
        info!(
            "starting download for {} from {} peer(s)",
            self.name,
            peers.len()
        );

        let total_pieces = self.piece_count();
        let (work_tx, work_rx) = bounded::<PieceWork>(total_pieces);
        let (result_tx, result_rx) = bounded::<PieceResult>(0);

        for (index, hash) in self.piece_hashes.iter().enumerate() {
            let index = index as u32;
            let work = PieceWork {
                index,
                hash: *hash,
                length: self.piece_size(index),
            };
            work_tx
                .send(work)
                .map_err(|_| Error::Transport(disconnected("work queue")))?;
        }

        let live_workers = Arc::new(AtomicUsize::new(peers.len()));
        for peer in peers {
            let worker = Worker::new(
                peer,
                peer_id,
                self.info_hash,
                (work_tx.clone(), work_rx.clone()),
                result_tx.clone(),
                Arc::clone(&live_workers),
            );
            thread::spawn(move || worker.run());
        }
        // only workers may hold result senders from here on; when the last
        // worker exits, the collector's recv below reports it
        drop(result_tx);

        let output = File::create(path).map_err(Error::LocalIo)?;

        let progress = ProgressBar::new(u64::from(self.length));
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut done_pieces = 0;
        while done_pieces < total_pieces {
            let result = match result_rx.recv() {
                Ok(result) => result,
                Err(_) => return Err(Error::NoProgress),
            };

            output
                .write_all_at(&result.data, self.piece_offset(result.index))
                .map_err(Error::LocalIo)?;
            done_pieces += 1;

            progress.inc(result.data.len() as u64);
            info!(
                "({:.2}%) downloaded piece {} ({} live workers)",
                done_pieces as f64 / total_pieces as f64 * 100.0,
                result.index,
                live_workers.load(Ordering::SeqCst)
            );
        }
        progress.finish();

        Ok(())
    }
}

fn disconnected(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, format!("{what} disconnected"))
}
