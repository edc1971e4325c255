use std::io::Write;

use crate::bencoding::EncodeError;
use crate::bencoding::value::Value;

impl Value {
    /// Writes the canonical encoding of this value: dictionary keys are always emitted in
    /// ascending byte order, whatever order they were inserted or decoded in.
    pub fn encode(&self, dest: &mut impl Write) -> Result<(), EncodeError> {
        match self {
            Self::String(string) => encode_string(string, dest)?,
            Self::Integer(integer) => write!(dest, "i{}e", integer)?,
            Self::List(values) => {
                write!(dest, "l")?;
                for value in values {
                    value.encode(dest)?;
                }
                write!(dest, "e")?;
            }
            Self::Dictionary(entries) => {
                write!(dest, "d")?;
                for (key, value) in entries {
                    encode_string(key, dest)?;
                    value.encode(dest)?;
                }
                write!(dest, "e")?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.encode(&mut buffer).expect("writing to a vec cannot fail");
        buffer
    }
}

fn encode_string(string: &[u8], dest: &mut impl Write) -> std::io::Result<()> {
    write!(dest, "{}:", string.len())?;
    dest.write_all(string)
}
