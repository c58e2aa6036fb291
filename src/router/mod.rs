//! Request routing: virtual-host selection, longest-prefix location match,
//! and the action decision.

mod context;
mod location;
mod routing;
mod vserver;

pub use context::ResolvedRequestContext;
pub use location::LocationDirective;
pub use routing::{Action, AutoIndexContext, CgiContext, LocationRouting, UploadContext};
pub use vserver::VirtualServer;

use std::fmt::{self, Display};
use std::net::IpAddr;

use crate::config::ServerConfig;
use crate::http::{HttpRequest, HttpStatus};

#[derive(Debug)]
pub enum RouterError {
    /// No virtual server is configured for the accepted endpoint.
    NoVirtualServer,
}

impl Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::NoVirtualServer => {
                write!(f, "no virtual server for the listen endpoint")
            }
        }
    }
}

impl std::error::Error for RouterError {}

/// Immutable routing table built once from the configuration and shared by
/// every session.
#[derive(Debug)]
pub struct RequestRouter {
    servers: Vec<VirtualServer>,
}

impl RequestRouter {
    pub fn new(config: &ServerConfig) -> Self {
        RequestRouter {
            servers: config.servers.iter().map(VirtualServer::from_conf).collect(),
        }
    }

    /// Routes a parsed request accepted on `endpoint` into an action
    /// decision. A request that failed normalization still routes (with a
    /// 400 status) so the error-page machinery applies.
    pub fn route<'a>(
        &'a self,
        request: &HttpRequest,
        endpoint_ip: IpAddr,
        endpoint_port: u16,
    ) -> Result<LocationRouting<'a>, RouterError> {
        let ctx = match ResolvedRequestContext::create(request) {
            Ok(ctx) => ctx,
            Err(status) => {
                let vserver = self
                    .select_virtual_server(endpoint_ip, endpoint_port, "")
                    .ok_or(RouterError::NoVirtualServer)?;
                let bad = ResolvedRequestContext::for_bad_request(request);
                return Ok(LocationRouting::decide(vserver, None, &bad, request, status));
            }
        };

        let vserver = self
            .select_virtual_server(endpoint_ip, endpoint_port, ctx.host())
            .ok_or(RouterError::NoVirtualServer)?;
        let location = vserver.find_location(ctx.path());

        // Unconfigured methods still route so 405 + Allow can be produced.
        Ok(LocationRouting::decide(
            vserver,
            location,
            &ctx,
            request,
            HttpStatus::OK,
        ))
    }

    /// First server listening on the endpoint whose names include `host`;
    /// otherwise the first listening server (the endpoint's default).
    fn select_virtual_server(
        &self,
        ip: IpAddr,
        port: u16,
        host: &str,
    ) -> Option<&VirtualServer> {
        let mut default_server = None;
        for server in &self.servers {
            if !server.listens_on(ip, port) {
                continue;
            }
            if default_server.is_none() {
                default_server = Some(server);
            }
            if !host.is_empty() && server.has_server_name(host) {
                return Some(server);
            }
        }
        default_server
    }
}
