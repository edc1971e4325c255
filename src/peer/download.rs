use std::collections::HashMap;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::crypto::Sha1;
use crate::message::{Block, BlockData, Message, MessageId, ProtocolError};
use crate::peer::blocks::Blocks;
use crate::peer::{Connection, DownloadError, IntegrityError};
use crate::torrent::Info;

pub const BLOCK_SIZE: usize = 16 * 1024;

/// Reassembly state of a single piece. Lives only while the piece is being downloaded and is
/// consumed by [`PieceDownload::verify`].
pub struct PieceDownload {
    piece: usize,
    expected: Sha1,
    buffer: Vec<u8>,
    blocks: Blocks,
    /// Outstanding requests keyed by (piece, offset).
    pending: HashMap<(usize, usize), Block>,
    requested: usize,
    received: usize,
    total_blocks: usize,
}

impl PieceDownload {
    pub fn new(info: &Info, piece: usize) -> Result<Self, DownloadError> {
        let expected = *info.pieces.get(piece).ok_or(DownloadError::InvalidPiece {
            piece,
            total: info.total_pieces(),
        })?;
        let piece_size = info.piece_size(piece);
        Ok(Self {
            piece,
            expected,
            buffer: vec![0; piece_size],
            blocks: Blocks::new(piece, piece_size, BLOCK_SIZE),
            pending: HashMap::new(),
            requested: 0,
            received: 0,
            total_blocks: Blocks::total(piece_size, BLOCK_SIZE),
        })
    }

    /// The next block to request, now tracked as pending.
    pub fn next_request(&mut self) -> Option<Block> {
        let block = self.blocks.next()?;
        self.pending.insert((block.piece, block.offset), block);
        self.requested += 1;
        Some(block)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total_blocks
    }

    /// Stores a received block. Only an exact (piece, offset) match against an outstanding
    /// request is accepted.
    pub fn receive(&mut self, block_data: BlockData) -> Result<(), ProtocolError> {
        let key = (block_data.piece, block_data.offset);
        if !self.pending.contains_key(&key) {
            return Err(ProtocolError::UnexpectedBlock {
                piece: block_data.piece,
                offset: block_data.offset,
            });
        }
        let end = block_data.offset + block_data.data.len();
        if end > self.buffer.len() {
            return Err(ProtocolError::BlockOutOfBounds {
                offset: block_data.offset,
                length: block_data.data.len(),
                piece_size: self.buffer.len(),
            });
        }
        self.pending.remove(&key);
        self.buffer[block_data.offset..end].copy_from_slice(&block_data.data);
        self.received += 1;
        Ok(())
    }

    pub fn verify(self) -> Result<Vec<u8>, IntegrityError> {
        let actual = Sha1::digest(&self.buffer);
        if actual != self.expected {
            return Err(IntegrityError {
                piece: self.piece,
                expected: self.expected,
                actual,
            });
        }
        Ok(self.buffer)
    }
}

/// Downloads and verifies one piece, one block at a time: each request waits for its reply
/// before the next one is sent.
///
/// The connection must be past the handshake, with the peer already unchoking us.
pub async fn download_piece<S>(
    info: &Info,
    connection: &mut Connection<S>,
    piece: usize,
) -> Result<Vec<u8>, DownloadError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    download_piece_pipelined(info, connection, piece, 1).await
}

/// Like [`download_piece`], but keeps up to `window` requests in flight. Replies may arrive in
/// any order as long as each one matches an outstanding request.
pub async fn download_piece_pipelined<S>(
    info: &Info,
    connection: &mut Connection<S>,
    piece: usize,
    window: usize,
) -> Result<Vec<u8>, DownloadError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let window = window.max(1);
    let mut download = PieceDownload::new(info, piece)?;
    debug!(
        "[{}] downloading piece {} ({} blocks)",
        connection.peer(),
        piece,
        download.total_blocks
    );

    while !download.is_complete() {
        while download.pending() < window {
            match download.next_request() {
                Some(block) => connection.send(Message::Request(block)).await?,
                None => break,
            }
        }
        match connection.receive().await? {
            Message::KeepAlive => continue,
            Message::Piece(block_data) => download.receive(block_data)?,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: MessageId::Piece,
                    got: format!("{:?}", other),
                }
                .into());
            }
        }
    }

    let requested = download.requested;
    let data = download.verify()?;
    info!(
        "[{}] piece {} verified ({} bytes, {} requests)",
        connection.peer(),
        piece,
        data.len(),
        requested
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use futures::SinkExt;

    use super::*;
    use crate::client::Config;
    use crate::peer::testing::{Seeder, established, torrent};

    #[tokio::test]
    async fn download_evenly_divided_piece() {
        let (data, info) = torrent(2 * 32768, 32768);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder::new(data.clone(), 32768).spawn(remote);

        let piece = download_piece(&info, &mut connection, 1)
            .await
            .expect("download failed");

        assert_eq!(piece, &data[32768..]);
        assert_eq!(Sha1::digest(&piece), info.pieces[1]);
        drop(connection);
        let requests = seeder.await.expect("seeder panicked").requests;
        assert_eq!(
            requests,
            vec![Block::new(1, 0, 16384), Block::new(1, 16384, 16384)]
        );
    }

    #[tokio::test]
    async fn download_piece_with_short_final_block() {
        let (data, info) = torrent(20000, 20000);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder::new(data.clone(), 20000).spawn(remote);

        let piece = download_piece(&info, &mut connection, 0)
            .await
            .expect("download failed");

        assert_eq!(piece, data);
        drop(connection);
        let requests = seeder.await.expect("seeder panicked").requests;
        assert_eq!(
            requests,
            vec![Block::new(0, 0, 16384), Block::new(0, 16384, 3616)]
        );
    }

    #[tokio::test]
    async fn download_short_last_piece() {
        let (data, info) = torrent(32768 + 5000, 32768);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder::new(data.clone(), 32768).spawn(remote);

        let piece = download_piece(&info, &mut connection, 1)
            .await
            .expect("download failed");

        assert_eq!(piece, &data[32768..]);
        drop(connection);
        let requests = seeder.await.expect("seeder panicked").requests;
        assert_eq!(requests, vec![Block::new(1, 0, 5000)]);
    }

    #[tokio::test]
    async fn corrupted_block_fails_integrity_check() {
        let (data, info) = torrent(2 * 32768, 32768);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder {
            corrupt: Some((0, 16384)),
            ..Seeder::new(data, 32768)
        };
        seeder.spawn(remote);

        let result = download_piece(&info, &mut connection, 0).await;

        match result {
            Err(DownloadError::Integrity(err)) => {
                assert_eq!(err.piece, 0);
                assert_eq!(err.expected, info.pieces[0]);
                assert_ne!(err.actual, info.pieces[0]);
            }
            other => panic!("unexpected result {:?}", other.map(|piece| piece.len())),
        }
    }

    #[tokio::test]
    async fn mismatched_index_stops_download() {
        let (data, info) = torrent(2 * 32768, 32768);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder {
            wrong_index: true,
            ..Seeder::new(data, 32768)
        }
        .spawn(remote);

        let result = download_piece(&info, &mut connection, 0).await;

        assert!(matches!(
            result,
            Err(DownloadError::Protocol(ProtocolError::UnexpectedBlock {
                piece: 1,
                offset: 0
            }))
        ));
        drop(connection);
        let requests = seeder.await.expect("seeder panicked").requests;
        assert_eq!(requests, vec![Block::new(0, 0, 16384)]);
    }

    #[tokio::test]
    async fn unexpected_message_is_fatal() {
        let (_, info) = torrent(32768, 32768);
        let (mut connection, mut remote) = established(&Config::new()).await;
        remote.send(Message::Choke).await.expect("unable to send");

        let result = download_piece(&info, &mut connection, 0).await;

        assert!(matches!(
            result,
            Err(DownloadError::Protocol(ProtocolError::UnexpectedMessage {
                expected: MessageId::Piece,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn keep_alive_is_skipped() {
        let (data, info) = torrent(16384, 16384);
        let (mut connection, mut remote) = established(&Config::new()).await;
        remote.send(Message::KeepAlive).await.expect("unable to send");
        Seeder::new(data.clone(), 16384).spawn(remote);

        let piece = download_piece(&info, &mut connection, 0)
            .await
            .expect("download failed");

        assert_eq!(piece, data);
    }

    #[tokio::test]
    async fn piece_index_out_of_range() {
        let (_, info) = torrent(32768, 32768);
        let (mut connection, _remote) = established(&Config::new()).await;

        let result = download_piece(&info, &mut connection, 1).await;

        assert!(matches!(
            result,
            Err(DownloadError::InvalidPiece { piece: 1, total: 1 })
        ));
    }

    #[tokio::test]
    async fn one_request_in_flight_by_default() {
        let (data, info) = torrent(4 * 16384, 4 * 16384);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder {
            batch: 4,
            ..Seeder::new(data.clone(), 4 * 16384)
        }
        .spawn(remote);

        let piece = download_piece(&info, &mut connection, 0)
            .await
            .expect("download failed");

        assert_eq!(piece, data);
        drop(connection);
        let served = seeder.await.expect("seeder panicked");
        assert_eq!(served.requests.len(), 4);
        assert_eq!(served.max_in_flight, 1);
    }

    #[tokio::test]
    async fn pipelined_download_accepts_out_of_order_replies() {
        let (data, info) = torrent(3 * 16384 + 100, 3 * 16384 + 100);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder {
            batch: 4,
            ..Seeder::new(data.clone(), 3 * 16384 + 100)
        }
        .spawn(remote);

        let piece = download_piece_pipelined(&info, &mut connection, 0, 4)
            .await
            .expect("download failed");

        assert_eq!(piece, data);
        drop(connection);
        let served = seeder.await.expect("seeder panicked");
        assert_eq!(served.requests.len(), 4);
        assert_eq!(served.max_in_flight, 4);
    }

    #[tokio::test]
    async fn pipelined_download_respects_window() {
        let (data, info) = torrent(6 * 16384, 6 * 16384);
        let (mut connection, remote) = established(&Config::new()).await;
        let seeder = Seeder {
            batch: 6,
            ..Seeder::new(data.clone(), 6 * 16384)
        }
        .spawn(remote);

        let piece = download_piece_pipelined(&info, &mut connection, 0, 2)
            .await
            .expect("download failed");

        assert_eq!(piece, data);
        drop(connection);
        let served = seeder.await.expect("seeder panicked");
        let offsets: Vec<_> = served.requests.iter().map(|block| block.offset).collect();
        assert_eq!(offsets, vec![0, 16384, 32768, 49152, 65536, 81920]);
        assert_eq!(served.max_in_flight, 2);
    }

    #[test]
    fn receive_rejects_duplicate_block() {
        let (data, info) = torrent(32768, 32768);
        let mut download = PieceDownload::new(&info, 0).expect("invalid piece");
        let block = download.next_request().expect("no block");
        let block_data = BlockData {
            piece: 0,
            offset: block.offset,
            data: data[..block.length].to_vec(),
        };

        download.receive(block_data.clone()).expect("rejected block");
        let result = download.receive(block_data);

        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedBlock { piece: 0, offset: 0 })
        ));
    }

    #[test]
    fn receive_rejects_oversized_block() {
        let (_, info) = torrent(100, 100);
        let mut download = PieceDownload::new(&info, 0).expect("invalid piece");
        download.next_request();

        let result = download.receive(BlockData {
            piece: 0,
            offset: 0,
            data: vec![0; 101],
        });

        assert!(matches!(
            result,
            Err(ProtocolError::BlockOutOfBounds {
                piece_size: 100,
                ..
            })
        ));
    }
}
