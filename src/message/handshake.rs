use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{AsyncDecoder, AsyncEncoder, TransportMessage};
use crate::core::{PEER_ID_LEN, PeerId};
use crate::crypto::{SHA1_LEN, Sha1};
use crate::message::HandshakeError;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";
const RESERVED_LEN: usize = 8;
const INFO_HASH_OFFSET: usize = 1 + PROTOCOL.len() + RESERVED_LEN;
const PEER_ID_OFFSET: usize = INFO_HASH_OFFSET + SHA1_LEN;
pub const HANDSHAKE_LEN: usize = PEER_ID_OFFSET + PEER_ID_LEN;

/// The handshake is a required message and must be the first message transmitted by the client.
///
/// _handshake: <pstrlen><pstr><reserved><info\_hash><peer\_id>_
///
/// * **pstrlen**: string length of <pstr>, as a single raw byte (19)
/// * **pstr**: string identifier of the protocol ("BitTorrent protocol")
/// * **reserved**: eight (8) reserved bytes. We send all zeroes and ignore what peers send, since
///   each bit may only enable an extension.
/// * **info\_hash**: 20-byte SHA1 hash of the info key in the metainfo file.
/// * **peer\_id**: 20-byte string used as a unique ID for the client.
///
/// If a client receives a handshake with an info\_hash that it is not currently serving, then the
/// client must drop the connection.
#[derive(Debug, PartialEq, Clone)]
pub struct Handshake {
    pub info_hash: Sha1,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: Sha1, peer_id: PeerId) -> Self {
        Self { info_hash, peer_id }
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0; HANDSHAKE_LEN];
        buf[0] = PROTOCOL.len() as u8;
        buf[1..=PROTOCOL.len()].copy_from_slice(PROTOCOL);
        buf[INFO_HASH_OFFSET..PEER_ID_OFFSET].copy_from_slice(&self.info_hash.0);
        buf[PEER_ID_OFFSET..].copy_from_slice(&self.peer_id.0);
        buf
    }

    pub fn from_bytes(buf: &[u8; HANDSHAKE_LEN]) -> Result<Self, HandshakeError> {
        let protocol = &buf[1..INFO_HASH_OFFSET - RESERVED_LEN];
        if buf[0] as usize != PROTOCOL.len() || protocol != PROTOCOL {
            let length = (buf[0] as usize).min(HANDSHAKE_LEN - 1);
            let claimed = &buf[1..=length];
            return Err(HandshakeError::InvalidProtocol(
                String::from_utf8_lossy(claimed).into_owned(),
            ));
        }
        let mut info_hash = [0; SHA1_LEN];
        info_hash.copy_from_slice(&buf[INFO_HASH_OFFSET..PEER_ID_OFFSET]);
        let mut peer_id = [0; PEER_ID_LEN];
        peer_id.copy_from_slice(&buf[PEER_ID_OFFSET..]);
        Ok(Handshake {
            info_hash: Sha1(info_hash),
            peer_id: PeerId(peer_id),
        })
    }
}

impl AsyncDecoder for Handshake {
    type Error = HandshakeError;

    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self, Self::Error> {
        let mut buf = [0; HANDSHAKE_LEN];
        stream.read_exact(&mut buf).await?;
        Handshake::from_bytes(&buf)
    }
}

impl AsyncEncoder for Handshake {
    type Error = HandshakeError;

    async fn encode<S: AsyncWrite + Unpin>(&self, stream: &mut S) -> Result<(), Self::Error> {
        stream.write_all(&self.to_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

impl TransportMessage for Handshake {
    fn transport_bytes(&self) -> usize {
        HANDSHAKE_LEN
    }
}
