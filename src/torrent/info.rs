use crate::bencoding::{Value, ValueError};
use crate::crypto::{SHA1_LEN, Sha1};
use crate::torrent::DownloadType;
use crate::torrent::MetainfoError;
use crate::torrent::error::{positive, required};

#[derive(Debug, PartialEq, Clone)]
pub struct Info {
    pub info_hash: Sha1,
    pub name: String,
    pub piece_size: usize,
    pub pieces: Vec<Sha1>,
    pub download_type: DownloadType,
}

impl Info {
    /// Splits the concatenated `pieces` string into digests. Order maps to piece index and is
    /// kept as is.
    fn build_pieces(pieces: &[u8]) -> Result<Vec<Sha1>, MetainfoError> {
        if pieces.len() % SHA1_LEN != 0 {
            return Err(MetainfoError::InvalidPiecesLength(pieces.len()));
        }
        let all = pieces
            .chunks_exact(SHA1_LEN)
            .map(|chunk| {
                let mut bytes = [0; SHA1_LEN];
                bytes.copy_from_slice(chunk);
                Sha1(bytes)
            })
            .collect();
        Ok(all)
    }

    pub fn total_pieces(&self) -> usize {
        self.pieces.len()
    }

    /// Length of `piece`. Every piece is `piece_size` long except the last one, which holds
    /// whatever remains of the total.
    pub fn piece_size(&self, piece: usize) -> usize {
        let piece_start = self.piece_offset(piece);
        let piece_end = piece_start.saturating_add(self.piece_size).min(self.total_size());
        piece_end.saturating_sub(piece_start)
    }

    pub fn piece_offset(&self, piece: usize) -> usize {
        self.piece_size * piece
    }

    pub fn total_size(&self) -> usize {
        self.download_type.total_size()
    }
}

impl TryFrom<Value> for Info {
    type Error = MetainfoError;

    fn try_from(mut value: Value) -> Result<Self, Self::Error> {
        if !matches!(value, Value::Dictionary(_)) {
            return Err(MetainfoError::InvalidKey {
                key: "info",
                source: ValueError::UnexpectedType {
                    expected: "dictionary",
                    found: value.type_name(),
                },
            });
        }
        // Hashed before any entry is taken out of the dictionary.
        let info_hash = Sha1::from(&value);
        let name = required(&mut value, "name")?;
        let piece_size = positive("piece length", required(&mut value, "piece length")?)?;
        let pieces: Vec<u8> = required(&mut value, "pieces")?;
        let pieces = Info::build_pieces(&pieces)?;
        let download_type = DownloadType::try_from(&mut value)?;

        let expected = download_type.total_size().div_ceil(piece_size);
        if pieces.len() != expected {
            return Err(MetainfoError::PieceCountMismatch {
                expected,
                actual: pieces.len(),
            });
        }

        Ok(Info {
            info_hash,
            name,
            piece_size,
            pieces,
            download_type,
        })
    }
}
