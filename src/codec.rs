use tokio::io::{AsyncRead, AsyncWrite};

/// A trait for messages that can be encoded into an async stream.
pub trait AsyncEncoder {
    type Error;

    /// Encodes a message into an async stream.
    async fn encode<S: AsyncWrite + Unpin>(&self, stream: &mut S) -> Result<(), Self::Error>;
}

/// A trait for messages that can be decoded from an async stream.
pub trait AsyncDecoder: Sized {
    type Error;

    /// Decodes a message from an async stream.
    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self, Self::Error>;
}

/// A trait for messages that can be transported over a network connection.
pub trait TransportMessage {
    /// Returns the total number of bytes needed to transport this message,
    /// including any length prefixes, message IDs, and payload data.
    fn transport_bytes(&self) -> usize;
}
