//! Per-connection HTTP session: a four-state machine driving the parser on
//! the receive side and the response writer on the send side, with CGI
//! handoff in between.
//!
//! States: `RecvRequest` -> (`ExecuteCgi` ->) `SendResponse` -> back to
//! `RecvRequest` on keep-alive, or `CloseWait` (terminal). Reads pause when
//! the receive buffer hits its cap; writable interest exists only while
//! there is a response to send.

use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, trace, warn};
use mio::net::TcpStream;

use crate::cgi::{is_php_cgi, spawn_cgi};
use crate::http::{
    DiscardSink, EncoderOptions, HttpRequest, HttpResponse, HttpStatus, Method,
};
use crate::prelude::{HTTP_SESSION_TIMEOUT_SECS, MAX_INTERNAL_REDIRECTS, MAX_RECV_BUFFER_BYTES};
use crate::processor::{build_internal_get_request, ProcessOutcome, ProcessorOutput, RequestProcessor};
use crate::router::{CgiContext, RequestRouter};
use crate::server::body_source::BodySource;
use crate::server::body_store::BodyStore;
use crate::server::buffer::IoBuffer;
use crate::server::controller::SessionController;
use crate::server::reactor::{EventKind, FdEvent};
use crate::server::session::cgi_session::CgiSession;
use crate::server::session::Session;
use crate::server::writer::{PumpStep, ResponseWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    RecvRequest,
    ExecuteCgi,
    SendResponse,
    CloseWait,
}

pub struct HttpSession {
    id: u64,
    socket: TcpStream,
    server_addr: SocketAddr,
    client_addr: SocketAddr,
    router: Arc<RequestRouter>,

    recv_buffer: IoBuffer,
    send_buffer: IoBuffer,

    request: HttpRequest,
    response: HttpResponse,
    writer: Option<ResponseWriter>,
    /// CGI stdout fd watched for readability while streaming the body.
    body_watch_fd: Option<RawFd>,

    body_store: BodyStore,
    body_prep_done: bool,
    discard_body: bool,

    state: SessionState,
    active_cgi: Option<u64>,
    redirect_count: u32,
    should_close: bool,
    peer_closed: bool,

    last_active: Instant,
    timeout: Duration,
}

impl HttpSession {
    pub fn new(
        id: u64,
        socket: TcpStream,
        server_addr: SocketAddr,
        client_addr: SocketAddr,
        router: Arc<RequestRouter>,
    ) -> Self {
        HttpSession {
            id,
            socket,
            server_addr,
            client_addr,
            router,
            recv_buffer: IoBuffer::new(),
            send_buffer: IoBuffer::new(),
            request: HttpRequest::new(),
            response: HttpResponse::new(),
            writer: None,
            body_watch_fd: None,
            body_store: BodyStore::new(id),
            body_prep_done: false,
            discard_body: true,
            state: SessionState::RecvRequest,
            active_cgi: None,
            redirect_count: 0,
            should_close: false,
            peer_closed: false,
            last_active: Instant::now(),
            timeout: Duration::from_secs(HTTP_SESSION_TIMEOUT_SECS),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::CloseWait
    }

    fn socket_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub fn initial_watches(&self) -> Vec<(RawFd, bool, bool)> {
        vec![(self.socket_fd(), true, false)]
    }

    // --- event dispatch ---------------------------------------------------

    pub fn handle_event(&mut self, controller: &mut SessionController, event: &FdEvent) {
        self.last_active = Instant::now();

        if event.kind == EventKind::Timeout || event.kind == EventKind::Error {
            if event.kind == EventKind::Timeout {
                trace!("session[{}]: idle timeout", self.id);
            }
            self.close_now(controller);
            return;
        }

        match self.state {
            SessionState::RecvRequest => self.on_recv_event(controller, event),
            SessionState::ExecuteCgi => self.on_cgi_wait_event(controller, event),
            SessionState::SendResponse => self.on_send_event(controller, event),
            SessionState::CloseWait => self.close_now(controller),
        }
    }

    // --- receive side -----------------------------------------------------

    fn on_recv_event(&mut self, controller: &mut SessionController, event: &FdEvent) {
        if event.peer_closed && event.fd == self.socket_fd() {
            self.peer_closed = true;
            self.should_close = true;
            // Whatever already sits in the buffer still gets one chance.
            self.consume_recv_buffer(controller);
            if self.state == SessionState::RecvRequest {
                self.close_now(controller);
            }
            return;
        }

        if event.kind != EventKind::Read {
            return;
        }

        loop {
            self.consume_recv_buffer(controller);
            if self.state != SessionState::RecvRequest {
                break;
            }
            if self.recv_buffer.len() >= MAX_RECV_BUFFER_BYTES {
                // Backpressure: stop reading until the buffer drains.
                break;
            }
            let n = self.recv_buffer.fill_from_fd(self.socket_fd());
            if n < 0 {
                break;
            }
            if n == 0 {
                self.close_now(controller);
                return;
            }
        }
        self.update_watches(controller);
    }

    /// Parses buffered bytes without reading the socket. Routing happens
    /// once at the header/body boundary (to aim the body sink) and again at
    /// parse completion (to execute the action).
    fn consume_recv_buffer(&mut self, controller: &mut SessionController) {
        loop {
            if self.request.headers_complete() && !self.body_prep_done {
                self.prepare_body_sink();
            }

            let mut discard = DiscardSink;
            let parse_result = if self.discard_body {
                self.request.parse(self.recv_buffer.data(), &mut discard)
            } else {
                self.request.parse(self.recv_buffer.data(), &mut self.body_store)
            };

            match parse_result {
                Ok(consumed) => {
                    self.recv_buffer.consume(consumed);
                    if self.request.is_parse_complete() {
                        self.log_request_accepted();
                        self.finish_request(controller);
                        return;
                    }
                    if consumed == 0 {
                        return;
                    }
                }
                Err(status) => {
                    // The connection framing is unusable after a parse
                    // error; respond and close.
                    self.send_error(controller, status, true);
                    return;
                }
            }
        }
    }

    /// At headers-done: one routing pass decides where body bytes go (the
    /// upload target, the CGI spool, or nowhere) and installs the
    /// per-location body cap before the first body octet is parsed.
    fn prepare_body_sink(&mut self) {
        use crate::router::Action;

        self.body_prep_done = true;
        self.discard_body = true;

        let routing = match self.router.route(
            &self.request,
            self.server_addr.ip(),
            self.server_addr.port(),
        ) {
            Ok(routing) => routing,
            Err(_) => return,
        };

        let cap = routing
            .client_max_body_size()
            .unwrap_or(crate::config::DEFAULT_MAX_BODY_SIZE);

        match routing.action() {
            Action::StoreBody => match routing.upload_context() {
                Ok(upload) => {
                    if self
                        .body_store
                        .configure_for_upload(&upload.destination_path, upload.allow_overwrite)
                        .is_ok()
                    {
                        self.discard_body = false;
                    }
                }
                Err(_) => {
                    // finish_request will re-derive the same failure and
                    // answer it; the body drains into nothing meanwhile.
                }
            },
            Action::RunCgi => {
                // CGI wants the decoded body spooled for its stdin.
                self.discard_body = false;
            }
            _ => {}
        }

        // An oversized declared Content-Length is answered after the body
        // has been drained, so HTTP/1.1 keep-alive survives the 413.
        let declared = self.request.content_length();
        let limit = match declared {
            Some(length) if length > cap => length,
            _ => cap,
        };
        let hard_cap = self.request.limits().max_body_bytes;
        if limit <= hard_cap {
            self.request.set_max_body_bytes(limit);
        }
    }

    /// A complete request: run the processor (or start CGI) and move to
    /// sending.
    fn finish_request(&mut self, controller: &mut SessionController) {
        let _ = self.body_store.finish();

        self.response.reset();
        let outcome = {
            let processor = RequestProcessor::new(
                self.router.as_ref(),
                self.server_addr.ip(),
                self.server_addr.port(),
            );
            processor.process(&self.request, &mut self.response)
        };

        match outcome {
            Ok(ProcessOutcome::Response(output)) => {
                if self.response.status() == HttpStatus::CREATED && self.body_store.is_upload() {
                    self.body_store.commit();
                }
                self.install_writer_and_send(controller, output, false);
            }
            Ok(ProcessOutcome::RunCgi(request)) => {
                self.request = request;
                self.start_cgi(controller);
            }
            Err(message) => {
                error!("session[{}]: processing failed: {}", self.id, message);
                self.send_error(controller, HttpStatus::SERVER_ERROR, true);
            }
        }
    }

    // --- send side --------------------------------------------------------

    fn on_send_event(&mut self, controller: &mut SessionController, event: &FdEvent) {
        if event.peer_closed && event.fd == self.socket_fd() {
            // The response cannot be completed; tear down.
            self.peer_closed = true;
            self.should_close = true;
            self.close_now(controller);
            return;
        }

        let relevant = (event.fd == self.socket_fd() && event.kind == EventKind::Write)
            || (Some(event.fd) == self.body_watch_fd && event.kind == EventKind::Read);
        if !relevant {
            return;
        }

        self.send_step(controller);
    }

    fn send_step(&mut self, controller: &mut SessionController) {
        loop {
            let mut progressed = false;

            if self.send_buffer.is_empty() && !self.response.is_complete() {
                let Some(writer) = self.writer.as_mut() else {
                    self.close_now(controller);
                    return;
                };
                let before = self.send_buffer.len();
                match writer.pump(&mut self.response, &mut self.send_buffer) {
                    Ok(result) => {
                        if result.should_close {
                            self.should_close = true;
                        }
                        if self.send_buffer.len() > before
                            || result.step == PumpStep::Done
                        {
                            progressed = true;
                        }
                    }
                    Err(message) => {
                        // Mid-response failure: terminate the framing and
                        // drop the connection after the flush.
                        error!("session[{}]: response aborted: {}", self.id, message);
                        let _ = writer.write_eof(&mut self.response, &mut self.send_buffer);
                        self.should_close = true;
                        progressed = true;
                    }
                }
            }

            if !self.send_buffer.is_empty() {
                let n = self.send_buffer.flush_to_fd(self.socket_fd());
                if n < 0 {
                    warn!("session[{}]: write backpressure", self.id);
                    break;
                }
                if n > 0 {
                    progressed = true;
                }
            }

            if self.send_buffer.is_empty() && self.response.is_complete() {
                self.on_response_complete(controller);
                return;
            }

            if !progressed {
                break;
            }
        }
        self.update_watches(controller);
    }

    fn on_response_complete(&mut self, controller: &mut SessionController) {
        info!(
            "{} -> {} {} \"{} {}\" from {}",
            self.server_addr,
            self.response.status().code(),
            self.response.reason_phrase(),
            self.request.method_token,
            self.request.path,
            self.client_addr
        );

        if let Some(fd) = self.body_watch_fd.take() {
            controller.unregister_fd(fd);
        }
        self.writer = None;

        self.response.reset();
        self.request = HttpRequest::new();
        self.body_store.reset();
        self.body_prep_done = false;
        self.discard_body = true;

        if self.should_close || self.peer_closed {
            self.close_now(controller);
            return;
        }

        // Keep-alive: back to receiving, and give any pipelined bytes an
        // immediate chance.
        self.state = SessionState::RecvRequest;
        self.update_watches(controller);
        if !self.recv_buffer.is_empty() {
            trace!("session[{}]: pipelined bytes pending", self.id);
            self.consume_recv_buffer(controller);
        }
        self.update_watches(controller);
    }

    // --- CGI --------------------------------------------------------------

    fn on_cgi_wait_event(&mut self, controller: &mut SessionController, event: &FdEvent) {
        if event.fd == self.socket_fd() && event.kind == EventKind::Read {
            if self.recv_buffer.len() < MAX_RECV_BUFFER_BYTES {
                let n = self.recv_buffer.fill_from_fd(self.socket_fd());
                if n == 0 {
                    self.peer_closed = true;
                    self.should_close = true;
                }
            }
        }
        if event.peer_closed && event.fd == self.socket_fd() {
            self.peer_closed = true;
            self.should_close = true;
        }

        if self.peer_closed {
            self.close_now(controller);
        } else {
            self.update_watches(controller);
        }
    }

    fn start_cgi(&mut self, controller: &mut SessionController) {
        let context: CgiContext = {
            let routing = match self.router.route(
                &self.request,
                self.server_addr.ip(),
                self.server_addr.port(),
            ) {
                Ok(routing) => routing,
                Err(e) => {
                    error!("session[{}]: routing failed: {}", self.id, e);
                    self.send_error(controller, HttpStatus::SERVER_ERROR, false);
                    return;
                }
            };
            match routing.cgi_context() {
                Ok(context) => context,
                Err(message) => {
                    error!("session[{}]: no cgi context: {}", self.id, message);
                    self.send_error(controller, HttpStatus::SERVER_ERROR, false);
                    return;
                }
            }
        };

        let request_body = if self.request.has_body() {
            match self.body_store.open_for_read() {
                Ok(file) => Some(file),
                Err(e) => {
                    error!("session[{}]: cannot reopen body spool: {}", self.id, e);
                    self.send_error(controller, HttpStatus::SERVER_ERROR, false);
                    return;
                }
            }
        } else {
            None
        };

        let mut meta = crate::http::CgiMetaVariables::from_request(
            &self.request,
            &context.script_name,
            &context.path_info,
        );
        meta.set("SERVER_NAME", &self.server_addr.ip().to_string());
        meta.set("SERVER_PORT", &self.server_addr.port().to_string());
        meta.set("REMOTE_ADDR", &self.client_addr.ip().to_string());
        meta.set("SERVER_SOFTWARE", crate::prelude::SERVER_SOFTWARE);
        meta.set("SCRIPT_FILENAME", context.script_filename.as_str());
        meta.set("QUERY_STRING", &context.query_string);
        if self.request.has_body() {
            // Chunked bodies have no Content-Length header; the spool size
            // is the decoded length the child must see.
            if let Ok(size) = self.body_store.stored_size() {
                meta.set("CONTENT_LENGTH", &size.to_string());
            }
        }
        if is_php_cgi(&context.executor_path) {
            meta.set("REDIRECT_STATUS", "200");
        }

        let spawned = match spawn_cgi(&context, &meta) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("session[{}]: cgi spawn failed: {}", self.id, e);
                self.send_error(controller, HttpStatus::SERVER_ERROR, false);
                return;
            }
        };

        let cgi_id = controller.allocate_id();
        let cgi = CgiSession::new(cgi_id, self.id, spawned, request_body);
        if let Err(e) = controller.delegate(Session::Cgi(cgi)) {
            error!("session[{}]: cgi delegate failed: {}", self.id, e);
            self.send_error(controller, HttpStatus::SERVER_ERROR, false);
            return;
        }

        self.active_cgi = Some(cgi_id);
        self.state = SessionState::ExecuteCgi;
        self.update_watches(controller);
    }

    /// CGI headers are parsed; classify the response and either hand the
    /// stdout fd over as the body source or re-enter routing on a local
    /// redirect.
    pub fn on_cgi_headers_ready(
        &mut self,
        controller: &mut SessionController,
        cgi: &mut CgiSession,
    ) {
        use crate::http::CgiResponseType;

        if self.state != SessionState::ExecuteCgi {
            // Already closing; the stdout fd dies with the CGI session.
            return;
        }

        if cgi.response().response_type() == CgiResponseType::LocalRedirect {
            self.on_cgi_local_redirect(controller, cgi);
            return;
        }

        self.response.reset();
        if let Err(message) = cgi.response().apply_to_response(&mut self.response) {
            error!("session[{}]: cgi headers rejected: {}", self.id, message);
            self.on_cgi_error(controller, cgi, HttpStatus::BAD_GATEWAY);
            return;
        }

        let prefetched = cgi.take_prefetched_body();
        let Some(stdout) = cgi.release_stdout() else {
            self.on_cgi_error(controller, cgi, HttpStatus::BAD_GATEWAY);
            return;
        };

        // The CGI session lives on to drain stdin/stderr; only the link is
        // dropped.
        self.active_cgi = None;

        let output = ProcessorOutput {
            body: Some(BodySource::from_fd_with_prefix(stdout, prefetched)),
            should_close: false,
        };
        self.install_writer_and_send(controller, output, false);
    }

    fn on_cgi_local_redirect(&mut self, controller: &mut SessionController, cgi: &mut CgiSession) {
        // Either way the child's stdout is no longer wanted.
        drop(cgi.release_stdout());
        controller.request_delete(cgi.id());
        self.active_cgi = None;

        if self.redirect_count >= MAX_INTERNAL_REDIRECTS {
            self.send_error(controller, HttpStatus::SERVER_ERROR, false);
            return;
        }

        let Some(target) = cgi.response().local_redirect_target().map(String::from) else {
            self.send_error(controller, HttpStatus::BAD_GATEWAY, false);
            return;
        };
        self.redirect_count += 1;
        trace!("session[{}]: cgi local redirect -> {}", self.id, target);

        let next = match build_internal_get_request(&target, &self.request) {
            Ok(next) => next,
            Err(message) => {
                error!("session[{}]: bad local redirect: {}", self.id, message);
                self.send_error(controller, HttpStatus::BAD_GATEWAY, false);
                return;
            }
        };

        self.response.reset();
        self.body_store.reset();
        self.body_prep_done = false;
        self.discard_body = true;
        self.request = next;
        self.state = SessionState::RecvRequest;
        self.finish_request(controller);
    }

    /// Maps a CGI failure (exit before headers, bad headers, timeout) to
    /// 502/504 through the error-page machinery.
    pub fn on_cgi_error(
        &mut self,
        controller: &mut SessionController,
        cgi: &mut CgiSession,
        status: HttpStatus,
    ) {
        drop(cgi.release_stdout());
        controller.request_delete(cgi.id());
        self.active_cgi = None;

        if self.state != SessionState::ExecuteCgi {
            return;
        }
        warn!("session[{}]: cgi failed with {}", self.id, status.code());
        self.send_error(controller, status, false);
    }

    // --- response installation -------------------------------------------

    fn send_error(
        &mut self,
        controller: &mut SessionController,
        status: HttpStatus,
        force_close: bool,
    ) {
        self.response.reset();
        let output = {
            let processor = RequestProcessor::new(
                self.router.as_ref(),
                self.server_addr.ip(),
                self.server_addr.port(),
            );
            processor.process_error(&self.request, status, &mut self.response)
        };

        match output {
            Ok(output) => self.install_writer_and_send(controller, output, force_close),
            Err(message) => {
                error!("session[{}]: error page failed: {}", self.id, message);
                self.should_close = true;
                self.close_now(controller);
            }
        }
    }

    fn install_writer_and_send(
        &mut self,
        controller: &mut SessionController,
        output: ProcessorOutput,
        force_close: bool,
    ) {
        self.should_close = self.should_close
            || force_close
            || output.should_close
            || self.peer_closed
            || !self.request.should_keep_alive();

        let options = EncoderOptions {
            request_minor_version: self.request.minor_version,
            request_keep_alive: self.request.should_keep_alive(),
            request_is_head: self.request.method == Method::Head,
        };

        let mut writer = ResponseWriter::new(options, output.body);
        if self.should_close {
            writer.force_close();
        }
        self.body_watch_fd = writer.body_pollable_fd();
        self.writer = Some(writer);
        self.state = SessionState::SendResponse;
        self.update_watches(controller);
    }

    // --- teardown / bookkeeping -------------------------------------------

    fn close_now(&mut self, controller: &mut SessionController) {
        if let Some(cgi_id) = self.active_cgi.take() {
            controller.request_delete(cgi_id);
        }
        if let Some(fd) = self.body_watch_fd.take() {
            controller.unregister_fd(fd);
        }
        self.state = SessionState::CloseWait;
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        controller.request_delete(self.id);
    }

    /// Reconciles reactor interest with the current state: read while
    /// receiving (below the cap), write while sending, plus the CGI body
    /// fd's read watch.
    fn update_watches(&mut self, controller: &mut SessionController) {
        let (want_read, want_write) = match self.state {
            SessionState::RecvRequest => (self.recv_buffer.len() < MAX_RECV_BUFFER_BYTES, false),
            SessionState::ExecuteCgi => (self.recv_buffer.len() < MAX_RECV_BUFFER_BYTES, false),
            SessionState::SendResponse => (false, true),
            SessionState::CloseWait => (false, false),
        };
        let _ = controller.update_watch(self.socket_fd(), self.id, want_read, want_write);

        if self.state == SessionState::SendResponse {
            if let Some(fd) = self.body_watch_fd {
                let _ = controller.update_watch(fd, self.id, true, false);
            }
        }
    }

    fn log_request_accepted(&self) {
        let host = self.request.host().unwrap_or("-");
        info!(
            "{} <- \"{} {}{}{}\" host={} from {}",
            self.server_addr,
            self.request.method_token,
            self.request.path,
            if self.request.query.is_empty() { "" } else { "?" },
            self.request.query,
            host,
            self.client_addr
        );
    }
}
