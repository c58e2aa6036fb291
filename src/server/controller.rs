//! Session ownership and event dispatch.
//!
//! The controller owns every session in an id-keyed map and is the only
//! component talking to the reactor. Sessions express interest through
//! [`update_watch`]; the controller diffs against the recorded state and
//! issues the minimal reactor calls.
//!
//! Destruction is deferred: `request_delete` moves a session out of the
//! active set and unregisters its fds, but the value is dropped only at the
//! end of the current dispatch batch, so later events in the same batch can
//! never touch a dead session.
//!
//! [`update_watch`]: SessionController::update_watch

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::fd::RawFd;
use std::time::Instant;

use log::trace;

use super::reactor::{Direction, EventKind, FdEvent, PollReactor};
use super::session::{CgiEventOutcome, CgiSession, Session};

#[derive(Debug, Clone, Copy)]
struct FdWatchState {
    owner: u64,
    read: bool,
    write: bool,
}

pub struct SessionController {
    reactor: PollReactor,
    sessions: HashMap<u64, Session>,
    deleting: HashSet<u64>,
    destroy_queue: Vec<Session>,
    fd_state: HashMap<RawFd, FdWatchState>,
    session_fds: HashMap<u64, HashSet<RawFd>>,
    next_id: u64,
}

impl SessionController {
    pub fn new() -> io::Result<Self> {
        Ok(SessionController {
            reactor: PollReactor::new()?,
            sessions: HashMap::new(),
            deleting: HashSet::new(),
            destroy_queue: Vec::new(),
            fd_state: HashMap::new(),
            session_fds: HashMap::new(),
            next_id: 1,
        })
    }

    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Registers an accept-layer fd (a listener). The token is an id from
    /// [`allocate_id`] that never names a session; its events come back
    /// from [`poll`] for the caller to handle.
    ///
    /// [`allocate_id`]: SessionController::allocate_id
    /// [`poll`]: SessionController::poll
    pub fn watch_listener(&mut self, fd: RawFd, token: u64) -> io::Result<()> {
        self.apply_watch(fd, token, true, false)
    }

    /// Takes ownership of a session and registers its initial watches.
    /// Rolls everything back if a registration fails.
    pub fn delegate(&mut self, session: Session) -> io::Result<()> {
        let id = session.id();
        let watches = session.initial_watches();
        self.sessions.insert(id, session);

        for &(fd, read, write) in &watches {
            if let Err(e) = self.apply_watch(fd, id, read, write) {
                self.detach_session_fds(id);
                self.sessions.remove(&id);
                return Err(e);
            }
        }
        trace!("controller: delegated session {}", id);
        Ok(())
    }

    /// Marks a session for destruction at the end of the current batch and
    /// unregisters all of its fds now. Idempotent.
    pub fn request_delete(&mut self, id: u64) {
        if self.deleting.contains(&id) {
            return;
        }
        self.deleting.insert(id);
        self.detach_session_fds(id);
        if let Some(session) = self.sessions.remove(&id) {
            self.destroy_queue.push(session);
        }
        trace!("controller: session {} scheduled for deletion", id);
    }

    /// Reconciles the watch state of `fd` for its owning session. Both
    /// directions false removes the watch entirely.
    pub fn update_watch(
        &mut self,
        fd: RawFd,
        owner: u64,
        want_read: bool,
        want_write: bool,
    ) -> io::Result<()> {
        self.apply_watch(fd, owner, want_read, want_write)
    }

    /// Cleanup primitive: removes every direction for `fd` and forgets it.
    pub fn unregister_fd(&mut self, fd: RawFd) {
        self.reactor.delete_watch(fd);
        if let Some(state) = self.fd_state.remove(&fd) {
            if let Some(fds) = self.session_fds.get_mut(&state.owner) {
                fds.remove(&fd);
            }
        }
    }

    fn apply_watch(
        &mut self,
        fd: RawFd,
        owner: u64,
        want_read: bool,
        want_write: bool,
    ) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid fd"));
        }
        let current = self.fd_state.get(&fd).copied();
        if let Some(state) = current {
            if state.owner != owner {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "fd owned by another session",
                ));
            }
        }
        let have_read = current.map(|s| s.read).unwrap_or(false);
        let have_write = current.map(|s| s.write).unwrap_or(false);

        if want_read && !have_read {
            self.reactor.add_watch(fd, Direction::Read, owner)?;
        }
        if want_write && !have_write {
            self.reactor.add_watch(fd, Direction::Write, owner)?;
        }
        if !want_read && have_read {
            self.reactor.remove_watch(fd, Direction::Read)?;
        }
        if !want_write && have_write {
            self.reactor.remove_watch(fd, Direction::Write)?;
        }

        if want_read || want_write {
            self.fd_state.insert(
                fd,
                FdWatchState {
                    owner,
                    read: want_read,
                    write: want_write,
                },
            );
            self.session_fds.entry(owner).or_default().insert(fd);
        } else {
            self.unregister_fd(fd);
        }
        Ok(())
    }

    fn detach_session_fds(&mut self, id: u64) {
        if let Some(fds) = self.session_fds.remove(&id) {
            for fd in fds {
                self.reactor.delete_watch(fd);
                self.fd_state.remove(&fd);
            }
        }
    }

    /// Waits for readiness. Listener events come back for the accept layer;
    /// everything else goes to [`dispatch`].
    ///
    /// [`dispatch`]: SessionController::dispatch
    pub fn poll(&mut self, timeout_ms: u64) -> io::Result<Vec<FdEvent>> {
        self.reactor.wait(timeout_ms)
    }

    /// Delivers an event batch in order. A session that entered the
    /// deleting set mid-batch receives no further events; all deletions run
    /// exactly once at the end.
    pub fn dispatch(&mut self, events: &[FdEvent]) {
        for event in events {
            self.dispatch_one(event);
        }
        self.finish_batch();
    }

    fn dispatch_one(&mut self, event: &FdEvent) {
        let id = event.token;
        if self.deleting.contains(&id) {
            return;
        }
        let Some(mut session) = self.sessions.remove(&id) else {
            return;
        };

        match &mut session {
            Session::Http(http) => http.handle_event(self, event),
            Session::Cgi(cgi) => match cgi.handle_event(self, event) {
                CgiEventOutcome::None => {}
                CgiEventOutcome::HeadersReady => self.notify_parent_headers_ready(cgi),
                CgiEventOutcome::Failed(status) => self.notify_parent_failed(cgi, status),
            },
        }

        self.put_back(id, session);

        // Controller-side reaping: a CGI session that finished its work is
        // collected even if nobody asked for it.
        if !self.deleting.contains(&id) {
            if let Some(session) = self.sessions.get(&id) {
                if session.is_complete() {
                    self.request_delete(id);
                }
            }
        }
    }

    fn put_back(&mut self, id: u64, session: Session) {
        if self.deleting.contains(&id) {
            self.destroy_queue.push(session);
        } else {
            self.sessions.insert(id, session);
        }
    }

    fn notify_parent_headers_ready(&mut self, cgi: &mut CgiSession) {
        let parent_id = cgi.parent_id();
        let Some(mut parent) = self.sessions.remove(&parent_id) else {
            // The connection is gone; the child and its pipes go too.
            drop(cgi.release_stdout());
            self.request_delete(cgi.id());
            return;
        };
        if let Session::Http(http) = &mut parent {
            http.on_cgi_headers_ready(self, cgi);
        }
        self.put_back(parent_id, parent);
    }

    fn notify_parent_failed(&mut self, cgi: &mut CgiSession, status: crate::http::HttpStatus) {
        let parent_id = cgi.parent_id();
        let Some(mut parent) = self.sessions.remove(&parent_id) else {
            drop(cgi.release_stdout());
            self.request_delete(cgi.id());
            return;
        };
        if let Session::Http(http) = &mut parent {
            http.on_cgi_error(self, cgi, status);
        }
        self.put_back(parent_id, parent);
    }

    /// Drops everything scheduled during the batch, exactly once.
    fn finish_batch(&mut self) {
        for session in self.destroy_queue.drain(..) {
            trace!("controller: destroying session {}", session.id());
        }
        self.deleting.clear();
    }

    /// Sends one synthetic timeout event (fd = -1) to each expired session,
    /// then deletes it.
    pub fn handle_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .sessions
            .iter()
            .filter(|(_, s)| match s.timeout() {
                Some(timeout) => now.duration_since(s.last_active()) > timeout,
                None => false,
            })
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if self.deleting.contains(&id) {
                continue;
            }
            let event = FdEvent {
                fd: -1,
                kind: EventKind::Timeout,
                token: id,
                peer_closed: false,
            };
            self.dispatch_one(&event);
            self.request_delete(id);
        }
        self.finish_batch();
    }

    /// Milliseconds until the nearest session timeout, capped at one second
    /// so the run loop re-checks its stop flag regularly.
    pub fn next_timeout_ms(&self) -> u64 {
        let now = Instant::now();
        let mut nearest: Option<u64> = None;
        for session in self.sessions.values() {
            let Some(timeout) = session.timeout() else {
                continue;
            };
            let elapsed = now.duration_since(session.last_active());
            let ms = timeout.saturating_sub(elapsed).as_millis() as u64;
            nearest = Some(match nearest {
                Some(n) => n.min(ms),
                None => ms,
            });
        }
        nearest.unwrap_or(1000).min(1000)
    }

    /// Shutdown path: unregister everything and drop all sessions.
    pub fn clear_all_sessions(&mut self) {
        self.reactor.clear();
        self.fd_state.clear();
        self.session_fds.clear();
        self.sessions.clear();
        self.destroy_queue.clear();
        self.deleting.clear();
    }
}
