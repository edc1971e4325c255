mod download_type;
mod error;
mod info;

use url::Url;

use crate::bencoding::Value;

pub use download_type::*;
pub use error::MetainfoError;
pub use info::*;

// https://wiki.theory.org/BitTorrentSpecification#Metainfo_File_Structure

#[derive(Debug, PartialEq, Clone)]
pub struct Torrent {
    pub announce: Url,
    pub info: Info,
}

impl Torrent {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        let value = Value::from_bytes(bytes)?;
        Torrent::try_from(value)
    }
}

impl TryFrom<Value> for Torrent {
    type Error = MetainfoError;

    fn try_from(mut value: Value) -> Result<Self, Self::Error> {
        if !matches!(value, Value::Dictionary(_)) {
            return Err(MetainfoError::NotADictionary(value.type_name()));
        }
        let announce: String = error::required(&mut value, "announce")?;
        let announce = Url::parse(&announce)?;
        let info = value
            .try_remove_entry("info")
            .map_err(|source| MetainfoError::InvalidKey { key: "info", source })?
            .ok_or(MetainfoError::MissingKey("info"))?;
        let info = Info::try_from(info)?;
        Ok(Torrent { announce, info })
    }
}
