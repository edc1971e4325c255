use thiserror::Error;

use crate::bencoding::{ParseError, Value, ValueError};

/// A metainfo file that decodes as bencode but does not describe a valid torrent.
#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("invalid bencode: {0}")]
    Parse(#[from] ParseError),

    #[error("metainfo must be a dictionary, found {0}")]
    NotADictionary(&'static str),

    #[error("missing key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid key `{key}`: {source}")]
    InvalidKey {
        key: &'static str,
        source: ValueError,
    },

    #[error("invalid announce url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("pieces length {0} is not a multiple of 20")]
    InvalidPiecesLength(usize),

    #[error("`{key}` must be positive, got {value}")]
    NonPositive { key: &'static str, value: i64 },

    #[error("expected {expected} piece hashes, found {actual}")]
    PieceCountMismatch { expected: usize, actual: usize },

    #[error("total length of all files overflows")]
    TotalSizeOverflow,

    #[error("info must contain either `length` or `files`")]
    MissingLength,

    #[error("invalid md5sum {0:?}")]
    InvalidMd5(String),

    #[error("invalid path component {0:?}")]
    InvalidPath(String),
}

type Result<T> = std::result::Result<T, MetainfoError>;

pub(crate) fn required<T>(value: &mut Value, key: &'static str) -> Result<T>
where
    T: TryFrom<Value, Error = ValueError>,
{
    optional(value, key)?.ok_or(MetainfoError::MissingKey(key))
}

pub(crate) fn optional<T>(value: &mut Value, key: &'static str) -> Result<Option<T>>
where
    T: TryFrom<Value, Error = ValueError>,
{
    let invalid = |source| MetainfoError::InvalidKey { key, source };
    match value.try_remove_entry(key).map_err(invalid)? {
        Some(entry) => T::try_from(entry).map(Some).map_err(invalid),
        None => Ok(None),
    }
}

pub(crate) fn positive(key: &'static str, value: i64) -> Result<usize> {
    match usize::try_from(value) {
        Ok(positive) if positive > 0 => Ok(positive),
        _ => Err(MetainfoError::NonPositive { key, value }),
    }
}
