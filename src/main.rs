//! leechy, a lean command-line BitTorrent download client.
//!
//! Points a worker thread at every peer the tracker knows about and lets
//! the swarm fill in the file piece by piece:
//!
//! - **Main thread**: parses arguments, loads the torrent, collects
//!   verified pieces and writes them at their offsets.
//! - **Worker threads**: one per peer, each running the pipelined
//!   block-request state machine over its own connection.
//! - **Channels**: a bounded work queue and a results channel are the only
//!   things the threads share.
//!
//! ```bash
//! leechy debian.iso.torrent debian.iso
//! ```

#[macro_use]
extern crate log;

mod bitfield;
mod client;
mod download;
mod error;
mod handshake;
mod message;
mod peer;
mod piece;
mod torrent;
mod tracker;
mod worker;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use torrent::Torrent;

#[derive(Parser, Debug)]
#[command(version, about = "A lean command-line BitTorrent download client.")]
struct Args {
    /// Path to the .torrent file
    torrent: PathBuf,

    /// Where to write the downloaded file
    output: PathBuf,
}

fn run(args: Args) -> Result<()> {
    let torrent = Torrent::open(&args.torrent)
        .with_context(|| format!("could not load torrent {}", args.torrent.display()))?;
    info!(
        "loaded {} ({} pieces, {} bytes)",
        torrent.name,
        torrent.piece_count(),
        torrent.length
    );

    torrent
        .download_to_file(&args.output)
        .with_context(|| format!("download of {} failed", torrent.name))?;

    println!("saved in {:?}", args.output);

    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        eprintln!("Error: {error:#}");
        process::exit(1);
    }
}
