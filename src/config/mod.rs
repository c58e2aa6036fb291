//! Declarative server configuration.
//!
//! The model mirrors the nginx-like file format: an ordered list of
//! `server { }` blocks, each with listen endpoints, names, a document root,
//! and an ordered list of `location` blocks. The parser produces an
//! immutable [`ServerConfig`] consumed by the router; nothing here is
//! consulted on the hot path.

mod parser;
mod validate;

pub use parser::parse_config;
pub use validate::validate_config;

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::net::{IpAddr, Ipv4Addr};

use crate::http::Method;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_MAX_BODY_SIZE: u64 = 1_048_576;

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub line: Option<usize>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>, line: Option<usize>) -> Self {
        ConfigError {
            message: message.into(),
            line,
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "config error (line {}): {}", line, self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// One listen endpoint. `0.0.0.0` is the wildcard sentinel and matches any
/// local IP on its port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Listen {
    pub ip: IpAddr,
    pub port: u16,
}

impl Listen {
    pub fn wildcard(port: u16) -> Self {
        Listen {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        match self.ip {
            IpAddr::V4(v4) => v4.is_unspecified(),
            IpAddr::V6(v6) => v6.is_unspecified(),
        }
    }

    /// True when a connection accepted on `endpoint` belongs to this listen.
    pub fn matches(&self, endpoint_ip: IpAddr, endpoint_port: u16) -> bool {
        self.port == endpoint_port && (self.is_wildcard() || self.ip == endpoint_ip)
    }
}

impl Display for Listen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// One `location [back] PATTERN { }` block, before inheritance.
#[derive(Debug, Clone, Default)]
pub struct LocationConf {
    pub pattern: String,
    /// `location back PATTERN` — match the pattern as a path suffix.
    pub backward_match: bool,
    pub allowed_methods: Option<Vec<Method>>,
    pub root: Option<String>,
    pub index_pages: Option<Vec<String>>,
    pub client_max_body_size: Option<u64>,
    pub error_pages: HashMap<u16, String>,
    pub autoindex: Option<bool>,
    /// `return CODE URL`.
    pub redirect: Option<(u16, String)>,
    pub upload_store: Option<String>,
    /// Extension -> interpreter path, in declaration order.
    pub cgi_interpreters: Vec<(String, String)>,
}

/// One `server { }` block.
#[derive(Debug, Clone)]
pub struct VirtualServerConf {
    pub listens: Vec<Listen>,
    pub server_names: Vec<String>,
    pub root: String,
    pub index_pages: Vec<String>,
    pub client_max_body_size: u64,
    pub error_pages: HashMap<u16, String>,
    pub locations: Vec<LocationConf>,
}

impl Default for VirtualServerConf {
    fn default() -> Self {
        VirtualServerConf {
            listens: Vec::new(),
            server_names: Vec::new(),
            root: DEFAULT_ROOT.to_string(),
            index_pages: Vec::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_pages: HashMap::new(),
            locations: Vec::new(),
        }
    }
}

/// The whole configuration: an ordered sequence of virtual servers.
/// Declaration order matters — the first server matching a listen endpoint
/// is its default server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub servers: Vec<VirtualServerConf>,
}

impl ServerConfig {
    pub fn from_str(text: &str) -> ConfigResult<ServerConfig> {
        let config = parse_config(text)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Distinct listen endpoints, in first-seen order. The accept layer
    /// binds one socket per entry.
    pub fn distinct_listens(&self) -> Vec<Listen> {
        let mut out: Vec<Listen> = Vec::new();
        for server in &self.servers {
            for listen in &server.listens {
                if !out.contains(listen) {
                    out.push(*listen);
                }
            }
        }
        out
    }
}
