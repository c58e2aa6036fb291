//! Request processing: executes the routed action against the filesystem
//! and builds the outgoing response.
//!
//! Internal redirects (configured error pages, `return` with a local
//! target) loop back through routing with a synthesized GET request, at
//! most [`MAX_INTERNAL_REDIRECTS`] times per external request. When the
//! chain started from an error, the original status is preserved: the body
//! comes from the redirect target, the status code from the first error.

mod autoindex;
mod error_page;
mod static_file;
mod templates;

pub use error_page::{build_error_body, respond_error};

use std::net::IpAddr;

use crate::http::{DiscardSink, HttpRequest, HttpResponse, HttpStatus, Method};
use crate::prelude::MAX_INTERNAL_REDIRECTS;
use crate::router::{Action, LocationRouting, RequestRouter};
use crate::server::BodySource;

/// What a processed action hands back to the session.
#[derive(Debug)]
pub struct ProcessorOutput {
    pub body: Option<BodySource>,
    pub should_close: bool,
}

/// Result of a full processing run.
#[derive(Debug)]
pub enum ProcessOutcome {
    Response(ProcessorOutput),
    /// An internal redirect landed on a CGI path; the session must spawn
    /// the child for this request.
    RunCgi(HttpRequest),
}

struct ProcessingState {
    current: HttpRequest,
    preserved_error: Option<HttpStatus>,
    preserved_allow: Option<String>,
}

impl ProcessingState {
    fn status_for_success(&self) -> HttpStatus {
        self.preserved_error.unwrap_or(HttpStatus::OK)
    }

    fn preserve_error(&mut self, status: HttpStatus, routing: &LocationRouting) {
        if status.is_error() && self.preserved_error.is_none() {
            self.preserved_error = Some(status);
        }
        if status == HttpStatus::METHOD_NOT_ALLOWED && self.preserved_allow.is_none() {
            self.preserved_allow = routing.allow_header_value();
        }
    }
}

enum Step {
    Output(ProcessorOutput),
    Continue(HttpRequest),
    StartCgi,
}

pub struct RequestProcessor<'a> {
    router: &'a RequestRouter,
    endpoint_ip: IpAddr,
    endpoint_port: u16,
}

impl<'a> RequestProcessor<'a> {
    pub fn new(router: &'a RequestRouter, endpoint_ip: IpAddr, endpoint_port: u16) -> Self {
        RequestProcessor {
            router,
            endpoint_ip,
            endpoint_port,
        }
    }

    /// Routes and executes `request`, mutating `response` and returning the
    /// body source (or the request to run as CGI).
    pub fn process(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<ProcessOutcome, String> {
        let mut state = ProcessingState {
            current: request.clone(),
            preserved_error: None,
            preserved_allow: None,
        };

        // One initial pass plus at most MAX_INTERNAL_REDIRECTS re-entries.
        for _ in 0..=MAX_INTERNAL_REDIRECTS {
            let routing = self
                .router
                .route(&state.current, self.endpoint_ip, self.endpoint_port)
                .map_err(|e| e.to_string())?;

            let step = match self.run_action(&routing, &mut state, response) {
                Ok(step) => step,
                Err(status) => {
                    match self.error_redirect_request(&routing, &state.current, status) {
                        Some(next) => {
                            state.preserve_error(status, &routing);
                            Step::Continue(next)
                        }
                        None => {
                            let mut out = respond_error(status, response)?;
                            self.apply_allow_header(&routing, &state, status, response)?;
                            out.should_close = false;
                            Step::Output(out)
                        }
                    }
                }
            };

            match step {
                Step::Output(out) => {
                    if let Some(allow) = &state.preserved_allow {
                        if !response.headers_flushed() {
                            let _ = response.set_header("Allow", allow);
                        }
                    }
                    return Ok(ProcessOutcome::Response(out));
                }
                Step::Continue(next) => {
                    response.reset();
                    state.current = next;
                }
                Step::StartCgi => {
                    return Ok(ProcessOutcome::RunCgi(state.current));
                }
            }
        }

        Err("too many internal redirects".to_string())
    }

    /// Error path entry: build the response for `status`, using a
    /// configured error page when one applies, otherwise the default body.
    /// The final status always equals `status`.
    pub fn process_error(
        &self,
        request: &HttpRequest,
        status: HttpStatus,
        response: &mut HttpResponse,
    ) -> Result<ProcessorOutput, String> {
        if let Ok(routing) = self
            .router
            .route(request, self.endpoint_ip, self.endpoint_port)
        {
            if let Some(target) = routing.error_page_target(status) {
                let target = target.to_string();
                if target.starts_with('/') && target != request.path {
                    if let Ok(redirect_request) =
                        build_internal_get_request(&target, request)
                    {
                        response.reset();
                        if let Ok(ProcessOutcome::Response(out)) =
                            self.process(&redirect_request, response)
                        {
                            if response.status().is_success() && !response.headers_flushed() {
                                response.set_status(status)?;
                                return Ok(out);
                            }
                        }
                        response.reset();
                    }
                }
            }
        }

        respond_error(status, response)
    }

    fn run_action(
        &self,
        routing: &LocationRouting,
        state: &mut ProcessingState,
        response: &mut HttpResponse,
    ) -> Result<Step, HttpStatus> {
        match routing.action() {
            Action::RespondError => {
                let status = routing.status();
                let mut out =
                    respond_error(status, response).map_err(|_| HttpStatus::SERVER_ERROR)?;
                self.apply_allow_header(routing, state, status, response)
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                out.should_close = false;
                Ok(Step::Output(out))
            }
            Action::RedirectExternal => {
                response
                    .set_status(routing.status())
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                response
                    .set_header("Location", routing.redirect_location())
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                response
                    .set_expected_content_length(0)
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                Ok(Step::Output(ProcessorOutput {
                    body: None,
                    should_close: false,
                }))
            }
            Action::RedirectInternal => {
                let target = routing.redirect_location().to_string();
                // A target redirecting to itself would spin until the
                // redirect cap; refuse it here.
                if target == state.current.path {
                    return Err(if routing.status().is_error() {
                        routing.status()
                    } else {
                        HttpStatus::SERVER_ERROR
                    });
                }
                state.preserve_error(routing.status(), routing);
                let next = build_internal_get_request(&target, &state.current)
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                Ok(Step::Continue(next))
            }
            Action::ServeStatic | Action::ServeAutoindex => {
                let out =
                    static_file::handle_static(routing, state.status_for_success(), response)?;
                Ok(Step::Output(out))
            }
            Action::StoreBody => {
                if routing.method() != Method::Post {
                    return Err(HttpStatus::METHOD_NOT_ALLOWED);
                }
                routing.upload_context().map_err(|status| status)?;
                // The body already streamed into the upload target through
                // the session's body sink; only the result is built here.
                response
                    .set_status(HttpStatus::CREATED)
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                response
                    .set_expected_content_length(0)
                    .map_err(|_| HttpStatus::SERVER_ERROR)?;
                Ok(Step::Output(ProcessorOutput {
                    body: None,
                    should_close: false,
                }))
            }
            Action::RunCgi => Ok(Step::StartCgi),
        }
    }

    fn apply_allow_header(
        &self,
        routing: &LocationRouting,
        state: &ProcessingState,
        status: HttpStatus,
        response: &mut HttpResponse,
    ) -> Result<(), String> {
        if status != HttpStatus::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        let allow = state
            .preserved_allow
            .clone()
            .or_else(|| routing.allow_header_value());
        if let Some(allow) = allow {
            if !allow.is_empty() && !response.headers_flushed() {
                response.set_header("Allow", &allow)?;
            }
        }
        Ok(())
    }

    /// A configured error page with a local target, unless it would point
    /// back at the failing URI.
    fn error_redirect_request(
        &self,
        routing: &LocationRouting,
        current: &HttpRequest,
        status: HttpStatus,
    ) -> Option<HttpRequest> {
        let target = routing.error_page_target(status)?;
        if !target.starts_with('/') || target == current.path {
            return None;
        }
        build_internal_get_request(target, current).ok()
    }
}

/// Synthesizes the `GET target HTTP/1.x` request that re-enters routing,
/// preserving the Host so virtual-server selection is stable. Built as wire
/// bytes and fed through the real parser.
pub fn build_internal_get_request(
    target: &str,
    base: &HttpRequest,
) -> Result<HttpRequest, String> {
    let mut raw = format!("GET {} HTTP/1.{}\r\n", target, base.minor_version);
    if let Some(host) = base.host() {
        if !host.is_empty() {
            raw.push_str(&format!("Host: {}\r\n", host));
        }
    }
    raw.push_str("\r\n");

    let mut request = HttpRequest::new();
    let mut sink = DiscardSink;
    request
        .parse(raw.as_bytes(), &mut sink)
        .map_err(|status| format!("internal redirect request failed: {}", status))?;
    if !request.is_parse_complete() {
        return Err("internal redirect request is incomplete".to_string());
    }
    Ok(request)
}
