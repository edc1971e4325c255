use bit_set::BitSet;
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::TransportMessage;
use crate::message::{Block, BlockData, Message, MessageId, ProtocolError};

const LENGTH_SIZE: usize = 4;

/// Frames messages as `<u32 length><id><payload>`, with length counting the id and payload.
pub struct MessageCodec {
    max_length: usize,
}

impl MessageCodec {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn set_max_length(&mut self, max_length: usize) {
        self.max_length = max_length;
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.transport_bytes());
        match item {
            Message::KeepAlive => dst.put_u32(0),
            Message::Choke => put_header(dst, MessageId::Choke, 0)?,
            Message::Unchoke => put_header(dst, MessageId::Unchoke, 0)?,
            Message::Interested => put_header(dst, MessageId::Interested, 0)?,
            Message::NotInterested => put_header(dst, MessageId::NotInterested, 0)?,
            Message::Have(piece) => {
                let piece = to_u32(piece)?;
                put_header(dst, MessageId::Have, 4)?;
                dst.put_u32(piece);
            }
            Message::Bitfield(bitset) => {
                let bytes = bitset.get_ref().to_bytes();
                put_header(dst, MessageId::Bitfield, bytes.len())?;
                dst.extend_from_slice(&bytes);
            }
            Message::Request(block) => encode_block(dst, MessageId::Request, block)?,
            Message::Piece(BlockData {
                piece,
                offset,
                data,
            }) => {
                let (piece, offset) = (to_u32(piece)?, to_u32(offset)?);
                put_header(dst, MessageId::Piece, 8 + data.len())?;
                dst.put_u32(piece);
                dst.put_u32(offset);
                dst.extend_from_slice(&data);
            }
            Message::Cancel(block) => encode_block(dst, MessageId::Cancel, block)?,
        }
        Ok(())
    }
}

fn to_u32(value: usize) -> Result<u32, ProtocolError> {
    u32::try_from(value).map_err(|_| ProtocolError::FieldTooLarge(value))
}

fn put_header(
    dst: &mut BytesMut,
    id: MessageId,
    payload_length: usize,
) -> Result<(), ProtocolError> {
    dst.put_u32(to_u32(1 + payload_length)?);
    dst.put_u8(id as u8);
    Ok(())
}

/// Fields are checked before anything is written, so a rejected block leaves `dst` untouched.
fn encode_block(dst: &mut BytesMut, id: MessageId, block: Block) -> Result<(), ProtocolError> {
    let piece = to_u32(block.piece)?;
    let offset = to_u32(block.offset)?;
    let length = to_u32(block.length)?;
    put_header(dst, id, 12)?;
    dst.put_u32(piece);
    dst.put_u32(offset);
    dst.put_u32(length);
    Ok(())
}

impl Decoder for MessageCodec {
    type Error = ProtocolError;
    type Item = Message;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_SIZE {
            // Not enough data to read length marker.
            return Ok(None);
        }

        let mut length_bytes = [0; LENGTH_SIZE];
        length_bytes.copy_from_slice(&src[0..LENGTH_SIZE]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length == 0 {
            src.advance(LENGTH_SIZE);
            return Ok(Some(Message::KeepAlive));
        }

        if length > self.max_length {
            src.advance(LENGTH_SIZE);
            return Err(ProtocolError::MessageTooLong {
                length,
                max: self.max_length,
            });
        }

        if src.len() < LENGTH_SIZE + length {
            src.reserve(LENGTH_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_SIZE);
        let mut frame = src.split_to(length);
        let raw_id = frame.get_u8();
        let id = MessageId::try_from(raw_id)?;
        let invalid_length = ProtocolError::InvalidLength { id: raw_id, length };
        let message = match (id, length) {
            (MessageId::Choke, 1) => Message::Choke,
            (MessageId::Unchoke, 1) => Message::Unchoke,
            (MessageId::Interested, 1) => Message::Interested,
            (MessageId::NotInterested, 1) => Message::NotInterested,
            (MessageId::Have, 5) => Message::Have(frame.get_u32() as usize),
            (MessageId::Bitfield, _) => Message::Bitfield(BitSet::from_bytes(&frame)),
            (MessageId::Request, 13) => Message::Request(decode_block(&mut frame)),
            (MessageId::Piece, 9..) => {
                let piece = frame.get_u32() as usize;
                let offset = frame.get_u32() as usize;
                Message::Piece(BlockData {
                    piece,
                    offset,
                    data: frame.to_vec(),
                })
            }
            (MessageId::Cancel, 13) => Message::Cancel(decode_block(&mut frame)),
            _ => return Err(invalid_length),
        };
        Ok(Some(message))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame(src.len())),
        }
    }
}

fn decode_block(src: &mut BytesMut) -> Block {
    let piece = src.get_u32() as usize;
    let offset = src.get_u32() as usize;
    let length = src.get_u32() as usize;
    Block::new(piece, offset, length)
}

impl TransportMessage for Message {
    fn transport_bytes(&self) -> usize {
        let payload_size = match self {
            Self::KeepAlive => 0,
            Self::Choke => 1,
            Self::Unchoke => 1,
            Self::Interested => 1,
            Self::NotInterested => 1,
            Self::Have(_) => 5,
            Self::Bitfield(bitset) => 1 + bitset.get_ref().to_bytes().len(),
            Self::Request(_) => 13,
            Self::Piece(block) => 9 + block.data.len(),
            Self::Cancel(_) => 13,
        };
        LENGTH_SIZE + payload_size
    }
}
