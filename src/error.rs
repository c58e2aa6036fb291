use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

use crate::config::ConfigError;

#[derive(Debug)]
pub enum ServerError {
    Io(io::Error),
    Config(ConfigError),
    AddrParse(std::net::AddrParseError),
    /// Internal invariant violation or unrecoverable subsystem failure.
    Internal(String),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "io error: {}", e),
            ServerError::Config(e) => write!(f, "{}", e),
            ServerError::AddrParse(e) => write!(f, "bad address: {}", e),
            ServerError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        ServerError::Config(e)
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(e: std::net::AddrParseError) -> Self {
        ServerError::AddrParse(e)
    }
}

impl From<String> for ServerError {
    fn from(msg: String) -> Self {
        ServerError::Internal(msg)
    }
}

impl From<&str> for ServerError {
    fn from(msg: &str) -> Self {
        ServerError::Internal(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
