//! Scripted peers for exercising connections over in-memory streams.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use crate::client::Config;
use crate::core::PeerId;
use crate::crypto::Sha1;
use crate::message::{Block, BlockData, HANDSHAKE_LEN, Handshake, Message, MessageCodec};
use crate::peer::Connection;
use crate::torrent::{DownloadType, Info};

pub const INFO_HASH: Sha1 = Sha1([3; 20]);
pub const REMOTE_ID: PeerId = PeerId([4; 20]);

pub type Remote = Framed<DuplexStream, MessageCodec>;

pub fn remote_handshake(info_hash: Sha1) -> [u8; HANDSHAKE_LEN] {
    Handshake::new(info_hash, REMOTE_ID).to_bytes()
}

/// A connection past the handshake, and the peer's end of it.
pub async fn established(config: &Config) -> (Connection<DuplexStream>, Remote) {
    let (client, mut remote) = duplex(1 << 20);
    remote
        .write_all(&remote_handshake(INFO_HASH))
        .await
        .expect("unable to write handshake");
    let mut connection = Connection::new("peer", client, config);
    connection
        .handshake(INFO_HASH, PeerId([7; 20]))
        .await
        .expect("handshake failed");
    let mut sent = [0; HANDSHAKE_LEN];
    remote
        .read_exact(&mut sent)
        .await
        .expect("unable to read handshake");
    (connection, Framed::new(remote, MessageCodec::new(1 << 20)))
}

/// Deterministic content and the matching single-file info.
pub fn torrent(total_size: usize, piece_size: usize) -> (Vec<u8>, Info) {
    let data: Vec<u8> = (0..total_size).map(|i| (i * 31 % 251) as u8).collect();
    let pieces = data.chunks(piece_size).map(Sha1::digest).collect();
    let info = Info {
        info_hash: INFO_HASH,
        name: "data.bin".to_string(),
        piece_size,
        pieces,
        download_type: DownloadType::SingleFile {
            size: total_size,
            md5sum: None,
        },
    };
    (data, info)
}

/// How long a seeder waits for more requests before answering the ones it holds.
const LINGER: Duration = Duration::from_millis(20);

#[derive(Default)]
pub struct Seeder {
    pub data: Vec<u8>,
    pub piece_size: usize,
    /// Requests held before answering. Fewer are answered when no more arrive within
    /// [`LINGER`]. Answers go out in reverse order.
    pub batch: usize,
    /// Flips the first byte of the block at (piece, offset).
    pub corrupt: Option<(usize, usize)>,
    /// Echoes the wrong piece index for every block.
    pub wrong_index: bool,
}

/// What a seeder saw before the client went away.
#[derive(Debug, Default)]
pub struct Served {
    pub requests: Vec<Block>,
    /// Most requests the client had outstanding at once.
    pub max_in_flight: usize,
}

impl Seeder {
    pub fn new(data: Vec<u8>, piece_size: usize) -> Self {
        Self {
            data,
            piece_size,
            batch: 1,
            ..Default::default()
        }
    }

    fn block(&self, block: Block) -> BlockData {
        let start = block.piece * self.piece_size + block.offset;
        let end = (start + block.length).min(self.data.len());
        let mut data = self.data[start..end].to_vec();
        if self.corrupt == Some((block.piece, block.offset)) {
            data[0] ^= 0xff;
        }
        let piece = if self.wrong_index {
            block.piece + 1
        } else {
            block.piece
        };
        BlockData {
            piece,
            offset: block.offset,
            data,
        }
    }

    async fn answer(&self, remote: &mut Remote, held: &mut Vec<Block>) -> bool {
        for block in held.drain(..).rev() {
            if remote.send(Message::Piece(self.block(block))).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Answers requests until the client goes away.
    pub fn spawn(self, mut remote: Remote) -> JoinHandle<Served> {
        tokio::spawn(async move {
            let mut served = Served::default();
            let mut held = Vec::new();
            loop {
                let next = if held.is_empty() {
                    remote.next().await
                } else {
                    match timeout(LINGER, remote.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            if !self.answer(&mut remote, &mut held).await {
                                return served;
                            }
                            continue;
                        }
                    }
                };
                let Some(Ok(message)) = next else {
                    return served;
                };
                let Message::Request(block) = message else {
                    continue;
                };
                served.requests.push(block);
                held.push(block);
                served.max_in_flight = served.max_in_flight.max(held.len());
                if held.len() >= self.batch.max(1) && !self.answer(&mut remote, &mut held).await {
                    return served;
                }
            }
        })
    }
}
