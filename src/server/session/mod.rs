//! Session variants owned by the controller.

mod cgi_session;
mod http_session;

pub use cgi_session::{CgiEventOutcome, CgiSession};
pub use http_session::HttpSession;

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// The closed set of session kinds: one per client connection, one per CGI
/// child.
pub enum Session {
    Http(HttpSession),
    Cgi(CgiSession),
}

impl Session {
    pub fn id(&self) -> u64 {
        match self {
            Session::Http(s) => s.id(),
            Session::Cgi(s) => s.id(),
        }
    }

    pub fn last_active(&self) -> Instant {
        match self {
            Session::Http(s) => s.last_active(),
            Session::Cgi(s) => s.last_active(),
        }
    }

    /// `None` disables the idle timeout for this session.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Session::Http(s) => Some(s.timeout()),
            Session::Cgi(s) => s.timeout(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Session::Http(s) => s.is_complete(),
            Session::Cgi(s) => s.is_complete(),
        }
    }

    pub fn initial_watches(&self) -> Vec<(RawFd, bool, bool)> {
        match self {
            Session::Http(s) => s.initial_watches(),
            Session::Cgi(s) => s.initial_watches(),
        }
    }
}
