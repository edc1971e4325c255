mod blocks;
mod connection;
mod download;
mod error;
mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use connection::*;
pub use download::*;
pub use error::*;
pub use session::*;
