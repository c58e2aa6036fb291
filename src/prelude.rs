//! Shared constants and the crate-wide result type.

pub use crate::error::{Result, ServerError};
pub use log::{debug, error, info, trace, warn};

/// Read/write chunk for buffered fd I/O.
pub const IO_CHUNK_SIZE: usize = 4096;

/// Receive-side cap per connection; reads pause above this (backpressure).
pub const MAX_RECV_BUFFER_BYTES: usize = 64 * 1024;

/// Target fill level for the send buffer per writer pump.
pub const SEND_LOW_WATERMARK: usize = 16 * 1024;

/// Internal redirects (error pages + CGI local redirects) per request.
pub const MAX_INTERNAL_REDIRECTS: u32 = 5;

pub const HTTP_SESSION_TIMEOUT_SECS: u64 = 60;
pub const CGI_SESSION_TIMEOUT_SECS: u64 = 30;

pub const SERVER_SOFTWARE: &str = "webhive";
