use std::net::AddrParseError;

use reqwest::StatusCode;
use thiserror::Error;

use crate::bencoding::{ParseError, ValueError};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracker returned status {0}")]
    Status(StatusCode),

    #[error("malformed response body: {0}")]
    Parse(#[from] ParseError),

    #[error("tracker refused request: {0}")]
    Failure(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(#[from] ValueError),

    #[error("compact peers of {0} bytes is not a multiple of 6")]
    InvalidPeers(usize),

    #[error("invalid peer address: {0}")]
    InvalidAddress(#[from] AddrParseError),
}
