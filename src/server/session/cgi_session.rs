//! Child-process session: owns the three CGI pipes and the spooled request
//! body, parses the child's header section, and hands the stdout fd to the
//! parent HTTP session once headers are ready.

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::Child;
use std::time::{Duration, Instant};

use log::{error, trace};

use crate::cgi::{reap_child, SpawnedCgi};
use crate::http::{CgiResponse, HttpStatus};
use crate::prelude::{CGI_SESSION_TIMEOUT_SECS, IO_CHUNK_SIZE};
use crate::server::buffer::IoBuffer;
use crate::server::controller::SessionController;
use crate::server::reactor::{EventKind, FdEvent};

/// What an event did to this session; the controller routes the outcome to
/// the parent HTTP session.
#[derive(Debug)]
pub enum CgiEventOutcome {
    None,
    /// The header section is parsed; stdout is ready to be released.
    HeadersReady,
    /// The child failed before producing usable headers.
    Failed(HttpStatus),
}

pub struct CgiSession {
    id: u64,
    parent_id: u64,

    child: Child,
    stdin: Option<OwnedFd>,
    stdout: Option<OwnedFd>,
    stderr: Option<OwnedFd>,
    /// Read side of the spooled request body, drained into stdin.
    request_body: Option<File>,

    stdin_buffer: IoBuffer,
    stdout_buffer: IoBuffer,
    stderr_buffer: IoBuffer,

    response: CgiResponse,
    prefetched_body: Vec<u8>,

    headers_complete: bool,
    input_complete: bool,
    stderr_eof: bool,

    last_active: Instant,
    timeout: Duration,
}

impl CgiSession {
    pub fn new(id: u64, parent_id: u64, spawned: SpawnedCgi, request_body: Option<File>) -> Self {
        CgiSession {
            id,
            parent_id,
            child: spawned.child,
            stdin: Some(spawned.stdin),
            stdout: Some(spawned.stdout),
            stderr: Some(spawned.stderr),
            request_body,
            stdin_buffer: IoBuffer::new(),
            stdout_buffer: IoBuffer::new(),
            stderr_buffer: IoBuffer::new(),
            response: CgiResponse::new(),
            prefetched_body: Vec::new(),
            headers_complete: false,
            input_complete: false,
            stderr_eof: false,
            last_active: Instant::now(),
            timeout: Duration::from_secs(CGI_SESSION_TIMEOUT_SECS),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent_id(&self) -> u64 {
        self.parent_id
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// The child must produce its header section within the timeout; once
    /// stdout is handed to the parent, only the parent's own timeout
    /// applies (a slowly streaming body is legitimate).
    pub fn timeout(&self) -> Option<Duration> {
        if self.headers_complete {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Done when the header handoff happened, stdin was fully delivered,
    /// and stderr reached EOF (the child has effectively exited).
    pub fn is_complete(&self) -> bool {
        self.headers_complete && self.input_complete && self.stderr_eof
    }

    pub fn initial_watches(&self) -> Vec<(RawFd, bool, bool)> {
        let mut watches = Vec::new();
        if let Some(fd) = &self.stdin {
            watches.push((fd.as_raw_fd(), false, true));
        }
        if let Some(fd) = &self.stdout {
            watches.push((fd.as_raw_fd(), true, false));
        }
        if let Some(fd) = &self.stderr {
            watches.push((fd.as_raw_fd(), true, false));
        }
        watches
    }

    pub fn response(&self) -> &CgiResponse {
        &self.response
    }

    /// One-shot fd move: after this the session must neither read nor
    /// close the stdout fd — the HTTP session's body source owns it.
    pub fn release_stdout(&mut self) -> Option<OwnedFd> {
        self.stdout.take()
    }

    pub fn take_prefetched_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.prefetched_body)
    }

    pub fn handle_event(
        &mut self,
        controller: &mut SessionController,
        event: &FdEvent,
    ) -> CgiEventOutcome {
        self.last_active = Instant::now();

        match event.kind {
            EventKind::Timeout => return CgiEventOutcome::Failed(HttpStatus::GATEWAY_TIMEOUT),
            EventKind::Error => return CgiEventOutcome::Failed(HttpStatus::BAD_GATEWAY),
            EventKind::Read | EventKind::Write => {}
        }

        if self.fd_matches(&self.stdin, event.fd) {
            return self.handle_stdin(controller, event);
        }
        if self.fd_matches(&self.stdout, event.fd) {
            return self.handle_stdout(controller, event);
        }
        if self.fd_matches(&self.stderr, event.fd) {
            return self.handle_stderr(controller, event);
        }
        CgiEventOutcome::None
    }

    fn fd_matches(&self, slot: &Option<OwnedFd>, fd: RawFd) -> bool {
        slot.as_ref().map(|f| f.as_raw_fd()) == Some(fd)
    }

    /// Writable child stdin: refill a small chunk from the spooled body and
    /// flush it, closing stdin when everything was delivered.
    fn handle_stdin(
        &mut self,
        controller: &mut SessionController,
        event: &FdEvent,
    ) -> CgiEventOutcome {
        if event.kind != EventKind::Write || self.input_complete {
            return CgiEventOutcome::None;
        }

        loop {
            self.refill_stdin_buffer();

            if !self.stdin_buffer.is_empty() {
                let fd = match &self.stdin {
                    Some(fd) => fd.as_raw_fd(),
                    None => break,
                };
                let n = self.stdin_buffer.flush_to_fd(fd);
                if n <= 0 {
                    // Pipe full; resume on the next writable event.
                    return CgiEventOutcome::None;
                }
                continue;
            }

            if self.request_body.is_none() {
                self.close_stdin(controller);
                break;
            }
        }
        CgiEventOutcome::None
    }

    fn refill_stdin_buffer(&mut self) {
        if self.stdin_buffer.len() >= IO_CHUNK_SIZE {
            return;
        }
        let Some(file) = self.request_body.as_mut() else {
            return;
        };
        let mut chunk = [0u8; IO_CHUNK_SIZE];
        match file.read(&mut chunk) {
            Ok(0) => self.request_body = None,
            Ok(n) => self.stdin_buffer.append(&chunk[..n]),
            Err(_) => self.request_body = None,
        }
    }

    fn close_stdin(&mut self, controller: &mut SessionController) {
        if let Some(fd) = self.stdin.take() {
            controller.unregister_fd(fd.as_raw_fd());
            // Dropping the fd delivers EOF to the child.
        }
        self.input_complete = true;
        trace!("cgi[{}]: stdin closed", self.id);
    }

    /// Readable child stdout: accumulate and parse header lines. Bytes read
    /// in the same syscall as the terminator become the prefetched body
    /// prefix.
    fn handle_stdout(
        &mut self,
        controller: &mut SessionController,
        event: &FdEvent,
    ) -> CgiEventOutcome {
        if event.kind != EventKind::Read || self.headers_complete {
            return CgiEventOutcome::None;
        }

        loop {
            let fd = match &self.stdout {
                Some(fd) => fd.as_raw_fd(),
                None => return CgiEventOutcome::None,
            };
            let n = self.stdout_buffer.fill_from_fd(fd);
            if n < 0 {
                return CgiEventOutcome::None;
            }
            if n == 0 {
                // EOF before the header terminator: the child exited (or
                // closed stdout) without a usable response.
                return CgiEventOutcome::Failed(HttpStatus::BAD_GATEWAY);
            }

            let consumed = match self.response.parse(self.stdout_buffer.data()) {
                Ok(consumed) => consumed,
                Err(message) => {
                    error!("cgi[{}]: bad header section: {}", self.id, message);
                    return CgiEventOutcome::Failed(HttpStatus::BAD_GATEWAY);
                }
            };
            self.stdout_buffer.consume(consumed);

            if self.response.is_parse_complete() {
                self.prefetched_body = self.stdout_buffer.data().to_vec();
                self.stdout_buffer.clear();
                self.headers_complete = true;

                // From here the parent reads stdout; stop watching it.
                if let Some(fd) = &self.stdout {
                    controller.unregister_fd(fd.as_raw_fd());
                }
                return CgiEventOutcome::HeadersReady;
            }
        }
    }

    fn handle_stderr(
        &mut self,
        controller: &mut SessionController,
        event: &FdEvent,
    ) -> CgiEventOutcome {
        if event.kind != EventKind::Read {
            return CgiEventOutcome::None;
        }

        loop {
            let fd = match &self.stderr {
                Some(fd) => fd.as_raw_fd(),
                None => return CgiEventOutcome::None,
            };
            let n = self.stderr_buffer.fill_from_fd(fd);
            if n < 0 {
                return CgiEventOutcome::None;
            }
            if n == 0 {
                self.stderr_eof = true;
                if let Some(fd) = self.stderr.take() {
                    controller.unregister_fd(fd.as_raw_fd());
                }
                return CgiEventOutcome::None;
            }
            if !self.stderr_buffer.is_empty() {
                let text = String::from_utf8_lossy(self.stderr_buffer.data()).into_owned();
                error!("cgi[{}] stderr: {}", self.id, text.trim_end());
                let len = self.stderr_buffer.len();
                self.stderr_buffer.consume(len);
            }
        }
    }
}

impl Drop for CgiSession {
    fn drop(&mut self) {
        // Fds close via their owners; the child must not linger as a
        // zombie.
        reap_child(&mut self.child);
    }
}
