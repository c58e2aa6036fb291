//! The server core: reactor, buffers, sessions, controller, and the accept
//! layer that feeds connections into it.

pub mod body_source;
pub mod body_store;
pub mod buffer;
pub mod controller;
pub mod reactor;
pub mod session;
pub mod writer;

pub use body_source::{BodyRead, BodySource};
pub use body_store::BodyStore;
pub use buffer::IoBuffer;
pub use controller::SessionController;
pub use reactor::{Direction, EventKind, FdEvent, PollReactor};
pub use session::{CgiSession, HttpSession, Session};
pub use writer::{PumpResult, PumpStep, ResponseWriter};

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::router::RequestRouter;

struct BoundListener {
    listener: TcpListener,
    token: u64,
    addr: SocketAddr,
}

/// Accept layer + run loop: one nonblocking listener per distinct
/// endpoint; accepted connections become `HttpSession`s owned by the
/// controller.
pub struct Server {
    controller: SessionController,
    router: Arc<RequestRouter>,
    listeners: Vec<BoundListener>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Server> {
        let router = Arc::new(RequestRouter::new(&config));
        let mut controller = SessionController::new()?;
        let mut listeners = Vec::new();

        for listen in config.distinct_listens() {
            let addr = SocketAddr::new(listen.ip, listen.port);
            let listener = TcpListener::bind(addr)?;
            listener.set_nonblocking(true)?;
            let token = controller.allocate_id();
            controller.watch_listener(listener.as_raw_fd(), token)?;
            info!("listening on {}", addr);
            listeners.push(BoundListener {
                listener,
                token,
                addr,
            });
        }

        if listeners.is_empty() {
            return Err(ServerError::Internal("no listen endpoints".to_string()));
        }

        Ok(Server {
            controller,
            router,
            listeners,
        })
    }

    /// Runs until `stop` flips. One iteration: wait, accept, dispatch,
    /// sweep timeouts.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            let timeout_ms = self.controller.next_timeout_ms();
            let events = self.controller.poll(timeout_ms)?;

            let mut session_events = Vec::with_capacity(events.len());
            for event in events {
                match self.listener_index(event.token) {
                    Some(index) => self.accept_ready(index),
                    None => session_events.push(event),
                }
            }

            self.controller.dispatch(&session_events);
            self.controller.handle_timeouts();
        }

        info!("shutting down, dropping {} sessions", self.controller.active_session_count());
        self.controller.clear_all_sessions();
        Ok(())
    }

    fn listener_index(&self, token: u64) -> Option<usize> {
        self.listeners.iter().position(|l| l.token == token)
    }

    /// Accepts until the listener would block (readiness is edge-style).
    fn accept_ready(&mut self, index: usize) {
        loop {
            let (stream, client_addr) = match self.listeners[index].listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept on {} failed: {}", self.listeners[index].addr, e);
                    break;
                }
            };

            if let Err(e) = stream.set_nonblocking(true) {
                warn!("cannot make accepted socket nonblocking: {}", e);
                continue;
            }
            // The local address is the concrete endpoint even when the
            // listener bound a wildcard IP.
            let server_addr = stream
                .local_addr()
                .unwrap_or(self.listeners[index].addr);

            let id = self.controller.allocate_id();
            let session = HttpSession::new(
                id,
                mio::net::TcpStream::from_std(stream),
                server_addr,
                client_addr,
                Arc::clone(&self.router),
            );
            if let Err(e) = self.controller.delegate(Session::Http(session)) {
                error!("cannot register connection from {}: {}", client_addr, e);
            }
        }
    }
}
