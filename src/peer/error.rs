use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::Sha1;
use crate::message::{HandshakeError, ProtocolError};

/// Failure to open a connection to a peer.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("unable to connect to {addr}: {source}")]
    Io { addr: SocketAddr, source: io::Error },

    #[error("connecting to {0} timed out after {1:?}")]
    Timeout(SocketAddr, Duration),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// The assembled piece does not hash to the digest listed in the metainfo.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("piece {piece} hash mismatch: expected {expected}, got {actual}")]
pub struct IntegrityError {
    pub piece: usize,
    pub expected: Sha1,
    pub actual: Sha1,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("piece {piece} out of range, torrent has {total} pieces")]
    InvalidPiece { piece: usize, total: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}
