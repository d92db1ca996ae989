//! Units of work and result flowing between the coordinator and the workers.

/// One piece to download: what the queue carries. Passed by value so a
/// failed attempt can hand the same unit back to the queue.
#[derive(Debug, Clone)]
pub struct PieceWork {
    /// Zero-based index of the piece.
    pub index: u32,
    /// Expected SHA-1 digest of the piece.
    pub hash: [u8; 20],
    /// Piece size in bytes; the last piece of a torrent may be short.
    pub length: u32,
}

/// A downloaded, hash-verified piece on its way to the output file.
#[derive(Debug)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}
