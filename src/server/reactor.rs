//! FD readiness demultiplexing over `mio::Poll`.
//!
//! Watches are keyed by (fd, direction) and carry an opaque token the
//! controller resolves back to a session; the reactor never dereferences
//! it. Raw fds (pipes, sockets) register through `SourceFd`, so everything
//! pollable goes through one path.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

/// Opaque owner reference carried by a watch; resolved by the controller.
pub type WatchToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Read,
    Write,
    Error,
    /// Synthesized by the controller's timeout sweep, never by the reactor.
    Timeout,
}

#[derive(Debug, Clone, Copy)]
pub struct FdEvent {
    pub fd: RawFd,
    pub kind: EventKind,
    pub token: WatchToken,
    /// The platform's half-close indication: the peer shut its send side.
    pub peer_closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct WatchEntry {
    token: WatchToken,
    read: bool,
    write: bool,
}

impl WatchEntry {
    fn interest(&self) -> Option<Interest> {
        match (self.read, self.write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

pub struct PollReactor {
    poll: Poll,
    events: Events,
    watches: HashMap<RawFd, WatchEntry>,
}

impl PollReactor {
    pub fn new() -> io::Result<Self> {
        Ok(PollReactor {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            watches: HashMap::new(),
        })
    }

    /// Registers interest in one direction. Watching an already-watched
    /// (fd, direction) pair is an error.
    pub fn add_watch(
        &mut self,
        fd: RawFd,
        direction: Direction,
        token: WatchToken,
    ) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid fd"));
        }
        let mut entry = self.watches.get(&fd).copied().unwrap_or(WatchEntry {
            token,
            read: false,
            write: false,
        });
        let already = match direction {
            Direction::Read => entry.read,
            Direction::Write => entry.write,
        };
        if already {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "fd direction already watched",
            ));
        }

        let had_any = entry.interest().is_some();
        match direction {
            Direction::Read => entry.read = true,
            Direction::Write => entry.write = true,
        }
        entry.token = token;

        let interest = entry
            .interest()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no interest"))?;
        let mut source = SourceFd(&fd);
        if had_any {
            self.poll
                .registry()
                .reregister(&mut source, Token(fd as usize), interest)?;
        } else {
            self.poll
                .registry()
                .register(&mut source, Token(fd as usize), interest)?;
        }
        self.watches.insert(fd, entry);
        Ok(())
    }

    /// Drops interest in one direction; idempotent.
    pub fn remove_watch(&mut self, fd: RawFd, direction: Direction) -> io::Result<()> {
        let Some(mut entry) = self.watches.get(&fd).copied() else {
            return Ok(());
        };
        match direction {
            Direction::Read => {
                if !entry.read {
                    return Ok(());
                }
                entry.read = false;
            }
            Direction::Write => {
                if !entry.write {
                    return Ok(());
                }
                entry.write = false;
            }
        }

        let mut source = SourceFd(&fd);
        match entry.interest() {
            Some(interest) => {
                self.poll
                    .registry()
                    .reregister(&mut source, Token(fd as usize), interest)?;
                self.watches.insert(fd, entry);
            }
            None => {
                let _ = self.poll.registry().deregister(&mut source);
                self.watches.remove(&fd);
            }
        }
        Ok(())
    }

    /// Removes every direction for `fd`. Cleanup primitive; never fails on
    /// an unknown fd.
    pub fn delete_watch(&mut self, fd: RawFd) {
        if self.watches.remove(&fd).is_some() {
            let mut source = SourceFd(&fd);
            let _ = self.poll.registry().deregister(&mut source);
        }
    }

    pub fn clear(&mut self) {
        let fds: Vec<RawFd> = self.watches.keys().copied().collect();
        for fd in fds {
            self.delete_watch(fd);
        }
    }

    /// Blocks up to `timeout_ms` (0 = non-blocking poll) and returns the
    /// ready events in the order the OS reported them, one direction per
    /// entry.
    pub fn wait(&mut self, timeout_ms: u64) -> io::Result<Vec<FdEvent>> {
        match self.poll.poll(
            &mut self.events,
            Some(Duration::from_millis(timeout_ms)),
        ) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let mut out = Vec::new();
        for event in self.events.iter() {
            let fd = event.token().0 as RawFd;
            let Some(entry) = self.watches.get(&fd) else {
                continue;
            };
            let peer_closed = event.is_read_closed();

            if event.is_error() {
                out.push(FdEvent {
                    fd,
                    kind: EventKind::Error,
                    token: entry.token,
                    peer_closed,
                });
                continue;
            }
            if event.is_readable() && entry.read {
                out.push(FdEvent {
                    fd,
                    kind: EventKind::Read,
                    token: entry.token,
                    peer_closed,
                });
            }
            if event.is_writable() && entry.write {
                out.push(FdEvent {
                    fd,
                    kind: EventKind::Write,
                    token: entry.token,
                    peer_closed,
                });
            }
            // A bare half-close with no readable interest still needs to
            // reach the session.
            if peer_closed && !(event.is_readable() && entry.read) && !event.is_error() {
                out.push(FdEvent {
                    fd,
                    kind: EventKind::Read,
                    token: entry.token,
                    peer_closed,
                });
            }
        }
        Ok(out)
    }
}
