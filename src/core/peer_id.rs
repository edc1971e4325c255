use rand::RngCore;

pub const PEER_ID_LEN: usize = 20;

/// 20-byte identifier a client announces to trackers and peers.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct PeerId(pub [u8; PEER_ID_LEN]);

impl PeerId {
    /// Azureus-style client prefix, followed by random bytes.
    const PREFIX: &'static [u8; 8] = b"-RT0001-";

    pub fn random() -> Self {
        let mut data = [0; PEER_ID_LEN];
        data[..Self::PREFIX.len()].copy_from_slice(Self::PREFIX);
        rand::rng().fill_bytes(&mut data[Self::PREFIX.len()..]);
        Self(data)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}
