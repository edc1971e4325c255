use std::collections::btree_map::Entry;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::bencoding::ParseError;
use crate::bencoding::value::Value;
use crate::codec::AsyncDecoder;

const MAX_DEPTH: usize = 512;

type Result<T> = std::result::Result<T, ParseError>;

impl Value {
    /// Decodes exactly one value from `input`. Trailing whitespace is ignored, anything else after
    /// the value is an error.
    pub fn from_bytes(input: &[u8]) -> Result<Value> {
        let mut decoder = Decoder::new(input);
        let value = decoder.value()?;
        decoder.finish()?;
        Ok(value)
    }
}

impl AsyncDecoder for Value {
    type Error = ParseError;

    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Value::from_bytes(&buf)
    }
}

/// Recursive descent over a single forward cursor. The leading byte of every production decides
/// which branch to take, so the decoder never backtracks.
struct Decoder<'a> {
    input: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek()? {
            b'0'..=b'9' => self.string().map(Value::String),
            b'i' => self.integer().map(Value::Integer),
            b'l' => self.nested(Self::list),
            b'd' => self.nested(Self::dictionary),
            byte => Err(ParseError::UnrecognizedPrefix {
                byte,
                position: self.position,
            }),
        }
    }

    fn string(&mut self) -> Result<Vec<u8>> {
        let start = self.position;
        let digits = self.take_until(b':')?;
        let length = parse_length(digits).ok_or(ParseError::InvalidStringLength { position: start })?;
        let remaining = self.input.len() - self.position;
        if length > remaining {
            return Err(ParseError::LengthExceedsInput {
                length,
                remaining,
                position: start,
            });
        }
        let bytes = self.input[self.position..self.position + length].to_vec();
        self.position += length;
        Ok(bytes)
    }

    fn integer(&mut self) -> Result<i64> {
        self.advance(); // 'i'
        let start = self.position;
        let text = self.take_until(b'e')?;
        parse_integer(text).ok_or_else(|| ParseError::InvalidInteger {
            text: String::from_utf8_lossy(text).into_owned(),
            position: start,
        })
    }

    fn list(&mut self) -> Result<Value> {
        self.advance(); // 'l'
        let mut values = Vec::new();
        while !self.at_end_marker()? {
            values.push(self.value()?);
        }
        Ok(Value::List(values))
    }

    fn dictionary(&mut self) -> Result<Value> {
        self.advance(); // 'd'
        let mut entries = std::collections::BTreeMap::new();
        while !self.at_end_marker()? {
            let position = self.position;
            if !self.peek()?.is_ascii_digit() {
                return Err(ParseError::NonStringKey { position });
            }
            let key = self.string()?;
            let value = self.value()?;
            match entries.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
                Entry::Occupied(mut entry) => {
                    debug!(
                        "duplicate dictionary key {:?} at byte {}, keeping last",
                        String::from_utf8_lossy(entry.key()),
                        position
                    );
                    entry.insert(value);
                }
            }
        }
        Ok(Value::Dictionary(entries))
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth == MAX_DEPTH {
            return Err(ParseError::NestingTooDeep {
                max_depth: MAX_DEPTH,
                position: self.position,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Consumes the `e` terminating a list or dictionary if it is next.
    fn at_end_marker(&mut self) -> Result<bool> {
        if self.peek()? == b'e' {
            self.advance();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns the bytes up to `delimiter` and moves the cursor past it.
    fn take_until(&mut self, delimiter: u8) -> Result<&'a [u8]> {
        let input = self.input;
        let rest = &input[self.position..];
        let index = rest
            .iter()
            .position(|&byte| byte == delimiter)
            .ok_or(ParseError::UnexpectedEof {
                position: input.len(),
            })?;
        self.position += index + 1;
        Ok(&rest[..index])
    }

    fn peek(&self) -> Result<u8> {
        self.input
            .get(self.position)
            .copied()
            .ok_or(ParseError::UnexpectedEof {
                position: self.position,
            })
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn finish(&self) -> Result<()> {
        let trailing = &self.input[self.position..];
        match trailing.iter().position(|byte| !byte.is_ascii_whitespace()) {
            None => Ok(()),
            Some(offset) => Err(ParseError::TrailingData {
                position: self.position + offset,
            }),
        }
    }
}

fn parse_length(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Only canonical integers are accepted: no leading zeros, no "-0", no explicit '+'.
fn parse_integer(text: &[u8]) -> Option<i64> {
    let digits = text.strip_prefix(b"-").unwrap_or(text);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if digits[0] == b'0' && (digits.len() > 1 || digits.len() != text.len()) {
        return None;
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn decode(input: &[u8]) -> Result<Value> {
        Value::from_bytes(input)
    }

    #[test]
    fn unrecognized_prefix() {
        assert_eq!(
            decode(b"foo"),
            Err(ParseError::UnrecognizedPrefix {
                byte: b'f',
                position: 0
            })
        );
    }

    #[test]
    fn string() {
        assert_eq!(decode(b"4:spam"), Ok(Value::string("spam")));
    }

    #[test]
    fn empty_string() {
        assert_eq!(decode(b"0:"), Ok(Value::string("")));
    }

    #[test]
    fn binary_string() {
        assert_eq!(
            decode(b"3:\x00\xff\x10"),
            Ok(Value::String(vec![0x00, 0xff, 0x10]))
        );
    }

    #[test]
    fn string_length_exceeds_input() {
        assert_eq!(
            decode(b"10:spam"),
            Err(ParseError::LengthExceedsInput {
                length: 10,
                remaining: 4,
                position: 0
            })
        );
    }

    #[test]
    fn string_missing_colon() {
        assert!(matches!(
            decode(b"4spam"),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn positive_integer() {
        assert_eq!(decode(b"i42e"), Ok(Value::Integer(42)));
    }

    #[test]
    fn negative_integer() {
        assert_eq!(decode(b"i-5e"), Ok(Value::Integer(-5)));
    }

    #[test]
    fn zero() {
        assert_eq!(decode(b"i0e"), Ok(Value::Integer(0)));
    }

    #[test]
    fn large_integer() {
        assert_eq!(
            decode(b"i9223372036854775807e"),
            Ok(Value::Integer(i64::MAX))
        );
    }

    #[test]
    fn fail_for_overflowing_integer() {
        assert!(decode(b"i9223372036854775808e").is_err());
    }

    #[test]
    fn fail_for_minus_zero() {
        assert!(matches!(
            decode(b"i-0e"),
            Err(ParseError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn fail_for_leading_zero() {
        assert!(matches!(
            decode(b"i03e"),
            Err(ParseError::InvalidInteger { .. })
        ));
        assert!(decode(b"i-03e").is_err());
    }

    #[test]
    fn fail_for_non_numeric_integer() {
        assert!(matches!(
            decode(b"i4x2e"),
            Err(ParseError::InvalidInteger { .. })
        ));
        assert!(decode(b"ie").is_err());
        assert!(decode(b"i-e").is_err());
        assert!(decode(b"i+1e").is_err());
    }

    #[test]
    fn fail_for_unterminated_integer() {
        assert_eq!(
            decode(b"i42"),
            Err(ParseError::UnexpectedEof { position: 3 })
        );
    }

    #[test]
    fn empty_list() {
        assert_eq!(decode(b"le"), Ok(Value::list()));
    }

    #[test]
    fn list() {
        assert_eq!(
            decode(b"l4:spam4:eggse"),
            Ok(Value::list()
                .with_value(Value::string("spam"))
                .with_value(Value::string("eggs")))
        );
    }

    #[test]
    fn nested_list() {
        assert_eq!(
            decode(b"li1eli2ei3eee"),
            Ok(Value::list().with_value(Value::Integer(1)).with_value(
                Value::list()
                    .with_value(Value::Integer(2))
                    .with_value(Value::Integer(3))
            ))
        );
    }

    #[test]
    fn fail_for_unterminated_list() {
        assert!(matches!(
            decode(b"l4:spam"),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn empty_dictionary() {
        assert_eq!(decode(b"de"), Ok(Value::dictionary()));
    }

    #[test]
    fn dictionary() {
        assert_eq!(
            decode(b"d3:cow3:moo4:spam4:eggse"),
            Ok(Value::dictionary()
                .with_entry("cow", Value::string("moo"))
                .with_entry("spam", Value::string("eggs")))
        );
    }

    #[test]
    fn duplicate_key_keeps_last_value() {
        assert_eq!(
            decode(b"d3:fooi1e3:fooi2ee"),
            Ok(Value::dictionary().with_entry("foo", Value::Integer(2)))
        );
    }

    #[test]
    fn fail_for_non_string_keys() {
        assert_eq!(
            decode(b"di1ei2ee"),
            Err(ParseError::NonStringKey { position: 1 })
        );
    }

    #[test]
    fn fail_for_missing_dictionary_value() {
        assert!(decode(b"d3:fooe").is_err());
    }

    #[test]
    fn deeply_nested_structure() {
        assert_eq!(
            decode(b"d3:food3:barl3:bazee3:quxi42ee"),
            Ok(Value::dictionary()
                .with_entry(
                    "foo",
                    Value::dictionary()
                        .with_entry("bar", Value::list().with_value(Value::string("baz")))
                )
                .with_entry("qux", Value::Integer(42)))
        );
    }

    #[test]
    fn fail_for_excessive_nesting() {
        let mut input = vec![b'l'; MAX_DEPTH + 1];
        input.extend(vec![b'e'; MAX_DEPTH + 1]);

        assert!(matches!(
            decode(&input),
            Err(ParseError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn ignore_trailing_whitespace() {
        assert_eq!(decode(b"i42e \n"), Ok(Value::Integer(42)));
    }

    #[test]
    fn fail_for_trailing_data() {
        assert_eq!(
            decode(b"i42ei1e"),
            Err(ParseError::TrailingData { position: 4 })
        );
    }

    #[tokio::test]
    async fn decode_from_stream() {
        let mut cursor = Cursor::new(b"d3:cow3:mooe".to_vec());

        let value = Value::decode(&mut cursor).await;

        assert_eq!(
            value,
            Ok(Value::dictionary().with_entry("cow", Value::string("moo")))
        );
    }
}
