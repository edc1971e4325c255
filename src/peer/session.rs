use bit_set::BitSet;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::message::{Message, MessageId, ProtocolError};
use crate::peer::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingBitfield,
    AwaitingUnchoke,
    Ready,
}

/// Pieces a peer announced through bitfield and have messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPieces(BitSet);

impl PeerPieces {
    pub fn has(&self, piece: usize) -> bool {
        self.0.contains(piece)
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }
}

/// Tracks what a freshly handshaken peer has told us until it unchokes us.
pub struct Session {
    stage: Stage,
    pieces: BitSet,
    total_pieces: usize,
}

impl Session {
    pub fn new(total_pieces: usize) -> Self {
        Self {
            stage: Stage::AwaitingBitfield,
            pieces: BitSet::with_capacity(total_pieces),
            total_pieces,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Applies one incoming message, returning the reply to send, if any. Interest is declared
    /// once, on the first message that is not a keep-alive.
    pub fn handle(&mut self, message: Message) -> Result<Option<Message>, ProtocolError> {
        let reply = match (self.stage, &message) {
            (_, Message::KeepAlive) => return Ok(None),
            (Stage::AwaitingBitfield, _) => {
                self.stage = Stage::AwaitingUnchoke;
                Some(Message::Interested)
            }
            _ => None,
        };
        match message {
            Message::Bitfield(pieces) => self.bitfield(pieces)?,
            Message::Have(piece) => self.have(piece),
            Message::Unchoke => self.stage = Stage::Ready,
            Message::Choke => debug!("choked while waiting for unchoke"),
            Message::Piece(block_data) => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: MessageId::Unchoke,
                    got: format!("{:?}", Message::Piece(block_data)),
                });
            }
            _ => (),
        }
        Ok(reply)
    }

    pub fn into_pieces(self) -> PeerPieces {
        PeerPieces(self.pieces)
    }

    fn bitfield(&mut self, pieces: BitSet) -> Result<(), ProtocolError> {
        let expected = self.total_pieces.div_ceil(8);
        let actual = pieces.get_ref().len() / 8;
        if actual != expected {
            return Err(ProtocolError::InvalidBitfield { expected, actual });
        }
        if pieces.iter().any(|piece| piece >= self.total_pieces) {
            return Err(ProtocolError::SpareBitsSet(self.total_pieces));
        }
        self.pieces.union_with(&pieces);
        Ok(())
    }

    fn have(&mut self, piece: usize) {
        if piece < self.total_pieces {
            self.pieces.insert(piece);
        } else {
            warn!("have for piece {} out of {}", piece, self.total_pieces);
        }
    }
}

/// Drives a freshly handshaken connection until the peer unchokes us, declaring interest on
/// the way. Returns the pieces the peer announced.
pub async fn prepare<S>(
    connection: &mut Connection<S>,
    total_pieces: usize,
) -> Result<PeerPieces, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // A full bitfield may be larger than any piece message.
    connection.raise_max_message_length(1 + total_pieces.div_ceil(8));
    let mut session = Session::new(total_pieces);
    while session.stage() != Stage::Ready {
        let message = connection.receive().await?;
        if let Some(reply) = session.handle(message)? {
            connection.send(reply).await?;
        }
    }
    let pieces = session.into_pieces();
    debug!(
        "[{}] unchoked, peer has {} of {} pieces",
        connection.peer(),
        pieces.count(),
        total_pieces
    );
    Ok(pieces)
}
