mod decoder;
mod encoder;
mod error;
pub mod value;

pub use error::*;
pub use value::Value;
