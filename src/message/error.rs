use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::Sha1;
use crate::message::MessageId;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("io error: {0}")]
    Io(#[source] io::Error),

    #[error("stream closed before a full handshake was received")]
    Truncated,

    #[error("unsupported protocol {0:?}")]
    InvalidProtocol(String),

    #[error("info hash mismatch: expected {expected}, got {got}")]
    InfoHashMismatch { expected: Sha1, got: Sha1 },

    #[error("no handshake within {0:?}")]
    Timeout(Duration),

    #[error("handshake already performed")]
    AlreadyPerformed,
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("connection closed with a partial frame of {0} bytes")]
    TruncatedFrame(usize),

    #[error("message length {length} exceeds maximum of {max}")]
    MessageTooLong { length: usize, max: usize },

    #[error("unknown message id {0}")]
    UnknownMessageId(u8),

    #[error("invalid length {length} for message id {id}")]
    InvalidLength { id: u8, length: usize },

    #[error("expected {expected:?}, got {got}")]
    UnexpectedMessage { expected: MessageId, got: String },

    #[error("unrequested block: piece {piece}, offset {offset}")]
    UnexpectedBlock { piece: usize, offset: usize },

    #[error("block at offset {offset} with {length} bytes overruns piece of {piece_size} bytes")]
    BlockOutOfBounds {
        offset: usize,
        length: usize,
        piece_size: usize,
    },

    #[error("bitfield of {actual} bytes, expected {expected}")]
    InvalidBitfield { expected: usize, actual: usize },

    #[error("bitfield has bits set past piece {0}")]
    SpareBitsSet(usize),

    #[error("{0} does not fit in a 32-bit field")]
    FieldTooLarge(usize),

    #[error("no message within {0:?}")]
    Timeout(Duration),

    #[error("connection is not established")]
    NotEstablished,
}
