use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use crate::client::Config;
use crate::codec::{AsyncDecoder, AsyncEncoder, TransportMessage};
use crate::core::PeerId;
use crate::crypto::Sha1;
use crate::message::{Handshake, HandshakeError, Message, MessageCodec, ProtocolError};
use crate::peer::ConnectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    HandshakePending,
    Established,
    Closed,
}

enum Transport<S> {
    Raw(S),
    Framed(Framed<S, MessageCodec>),
    Closed,
}

/// One byte stream to a peer. Sending and receiving both take `&mut self`, so a connection is
/// driven by a single flow of control at a time.
pub struct Connection<S> {
    peer: String,
    transport: Transport<S>,
    remote_peer_id: Option<PeerId>,
    handshake_timeout: Duration,
    receive_timeout: Option<Duration>,
    max_message_length: usize,
}

impl Connection<TcpStream> {
    /// Opens a TCP connection and performs the handshake.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: Sha1,
        config: &Config,
    ) -> Result<Self, ConnectError> {
        info!("[{}] {:?}...", addr, ConnectionState::Connecting);
        let socket = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(source)) => return Err(ConnectError::Io { addr, source }),
            Err(_) => return Err(ConnectError::Timeout(addr, config.connect_timeout)),
        };
        let mut connection = Connection::new(addr.to_string(), socket, config);
        connection.handshake(info_hash, config.client_id).await?;
        Ok(connection)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(peer: impl Into<String>, stream: S, config: &Config) -> Self {
        Self {
            peer: peer.into(),
            transport: Transport::Raw(stream),
            remote_peer_id: None,
            handshake_timeout: config.handshake_timeout,
            receive_timeout: config.receive_timeout,
            max_message_length: config.max_message_length,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        match self.transport {
            Transport::Raw(_) => ConnectionState::HandshakePending,
            Transport::Framed(_) => ConnectionState::Established,
            Transport::Closed => ConnectionState::Closed,
        }
    }

    pub fn remote_peer_id(&self) -> Option<&PeerId> {
        self.remote_peer_id.as_ref()
    }

    /// Sends our handshake, then waits for the peer's. A peer answering with a different info
    /// hash is rejected and the connection is closed.
    pub async fn handshake(
        &mut self,
        info_hash: Sha1,
        client_id: PeerId,
    ) -> Result<PeerId, HandshakeError> {
        let mut stream = match std::mem::replace(&mut self.transport, Transport::Closed) {
            Transport::Raw(stream) => stream,
            other => {
                self.transport = other;
                return Err(HandshakeError::AlreadyPerformed);
            }
        };
        let handshake = Handshake::new(info_hash, client_id);
        match exchange_handshakes(&mut stream, &handshake, self.handshake_timeout).await {
            Ok(remote) => {
                info!(
                    "[{}] handshake completed, peer id {}",
                    self.peer,
                    remote.peer_id.to_hex()
                );
                self.remote_peer_id = Some(remote.peer_id);
                let codec = MessageCodec::new(self.max_message_length);
                self.transport = Transport::Framed(Framed::new(stream, codec));
                Ok(remote.peer_id)
            }
            Err(err) => {
                warn!("[{}] handshake failed: {}", self.peer, err);
                Err(err)
            }
        }
    }

    /// Lets frames of up to `length` bytes through from now on. The limit never shrinks.
    pub fn raise_max_message_length(&mut self, length: usize) {
        if length <= self.max_message_length {
            return;
        }
        debug!(
            "[{}] raising max message length from {} to {}",
            self.peer, self.max_message_length, length
        );
        self.max_message_length = length;
        if let Transport::Framed(messages) = &mut self.transport {
            messages.codec_mut().set_max_length(length);
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<(), ProtocolError> {
        let Transport::Framed(messages) = &mut self.transport else {
            return Err(ProtocolError::NotEstablished);
        };
        debug!(
            "[{}] > sending {:?} ({} bytes)",
            self.peer,
            &message,
            message.transport_bytes()
        );
        if let Err(err) = messages.send(message).await {
            warn!("[{}] failed to send message: {}", self.peer, err);
            self.transport = Transport::Closed;
            return Err(err);
        }
        Ok(())
    }

    /// Waits for the next complete frame. Expiry of the receive timeout leaves the connection
    /// open, every other failure closes it.
    pub async fn receive(&mut self) -> Result<Message, ProtocolError> {
        let Transport::Framed(messages) = &mut self.transport else {
            return Err(ProtocolError::NotEstablished);
        };
        let next = match self.receive_timeout {
            Some(deadline) => match timeout(deadline, messages.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!("[{}] no message within {:?}", self.peer, deadline);
                    return Err(ProtocolError::Timeout(deadline));
                }
            },
            None => messages.next().await,
        };
        match next {
            Some(Ok(message)) => {
                debug!("[{}] < got {:?}", self.peer, message);
                Ok(message)
            }
            Some(Err(err)) => {
                warn!("[{}] failed to decode message: {}", self.peer, err);
                self.transport = Transport::Closed;
                Err(err)
            }
            None => {
                info!("[{}] socket closed by peer", self.peer);
                self.transport = Transport::Closed;
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    pub async fn close(&mut self) {
        let result = match std::mem::replace(&mut self.transport, Transport::Closed) {
            Transport::Framed(mut messages) => messages.close().await,
            Transport::Raw(mut stream) => stream.shutdown().await.map_err(ProtocolError::from),
            Transport::Closed => return,
        };
        if let Err(err) = result {
            debug!("[{}] error while closing: {}", self.peer, err);
        }
        info!("[{}] disconnected", self.peer);
    }
}

async fn exchange_handshakes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    handshake: &Handshake,
    deadline: Duration,
) -> Result<Handshake, HandshakeError> {
    handshake.encode(stream).await?;
    let handshake_got = timeout(deadline, Handshake::decode(stream))
        .await
        .map_err(|_| HandshakeError::Timeout(deadline))??;
    if handshake_got.info_hash != handshake.info_hash {
        return Err(HandshakeError::InfoHashMismatch {
            expected: handshake.info_hash,
            got: handshake_got.info_hash,
        });
    }
    Ok(handshake_got)
}
