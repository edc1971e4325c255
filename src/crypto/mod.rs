use sha1::Digest;

use crate::bencoding::Value;

pub const SHA1_LEN: usize = 20;

#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Sha1(pub [u8; SHA1_LEN]);

impl Sha1 {
    pub fn digest(data: &[u8]) -> Self {
        Self(sha1::Sha1::digest(data).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// The info hash of a metainfo file is the digest of the canonical encoding of its `info` value.
impl From<&Value> for Sha1 {
    fn from(value: &Value) -> Self {
        Self::digest(&value.to_bytes())
    }
}

impl std::fmt::Debug for Sha1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha1({})", self.to_hex())
    }
}

impl std::fmt::Display for Sha1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Md5(pub [u8; 16]);

impl Md5 {
    pub fn digest(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        let mut bytes = [0; 16];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl std::fmt::Debug for Md5 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Md5({})", self.to_hex())
    }
}

impl std::fmt::Display for Md5 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}
