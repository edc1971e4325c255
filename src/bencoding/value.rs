use std::collections::BTreeMap;
use std::time::Duration;

use crate::bencoding::ValueError;

/// A decoded bencode value.
///
/// Dictionary keys are raw byte strings. `BTreeMap` keeps them ordered byte-lexicographically,
/// which is exactly the order the canonical encoding requires.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Value {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<Value>),
    Dictionary(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn string(string: impl AsRef<[u8]>) -> Self {
        Self::String(string.as_ref().to_vec())
    }

    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    pub fn dictionary() -> Self {
        Self::Dictionary(BTreeMap::new())
    }

    /// Appends `value` when `self` is a list, otherwise returns `self` unchanged.
    pub fn with_value(mut self, value: Value) -> Self {
        if let Self::List(values) = &mut self {
            values.push(value);
        }
        self
    }

    /// Inserts an entry when `self` is a dictionary, otherwise returns `self` unchanged.
    pub fn with_entry(mut self, key: impl AsRef<[u8]>, value: Value) -> Self {
        if let Self::Dictionary(entries) = &mut self {
            entries.insert(key.as_ref().to_vec(), value);
        }
        self
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::List(_) => "list",
            Self::Dictionary(_) => "dictionary",
        }
    }

    pub fn remove_entry(&mut self, key: &str) -> Result<Value, ValueError> {
        self.try_remove_entry(key)?
            .ok_or_else(|| ValueError::MissingEntry(key.to_string()))
    }

    pub fn try_remove_entry(&mut self, key: &str) -> Result<Option<Value>, ValueError> {
        match self {
            Self::Dictionary(entries) => Ok(entries.remove(key.as_bytes())),
            other => Err(unexpected("dictionary", other)),
        }
    }
}

fn unexpected(expected: &'static str, found: &Value) -> ValueError {
    ValueError::UnexpectedType {
        expected,
        found: found.type_name(),
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(bytes) => Ok(bytes),
            other => Err(unexpected("string", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let bytes: Vec<u8> = value.try_into()?;
        String::from_utf8(bytes).map_err(|_| ValueError::InvalidUtf8)
    }
}

impl TryFrom<Value> for i64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(integer) => Ok(integer),
            other => Err(unexpected("integer", &other)),
        }
    }
}

impl TryFrom<Value> for usize {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let integer: i64 = value.try_into()?;
        usize::try_from(integer).map_err(|_| ValueError::OutOfRange(integer))
    }
}

impl TryFrom<Value> for u16 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let integer: i64 = value.try_into()?;
        u16::try_from(integer).map_err(|_| ValueError::OutOfRange(integer))
    }
}

impl TryFrom<Value> for Duration {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let seconds: i64 = value.try_into()?;
        let seconds = u64::try_from(seconds).map_err(|_| ValueError::OutOfRange(seconds))?;
        Ok(Duration::from_secs(seconds))
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::List(values) => Ok(values),
            other => Err(unexpected("list", &other)),
        }
    }
}
