mod peer_id;

pub use peer_id::*;
