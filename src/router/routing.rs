//! The routing decision: request + endpoint -> action + context.

use crate::fs_path::{resolve_under_root, PathError, PhysicalPath};
use crate::http::{HttpRequest, HttpStatus, Method};

use super::context::ResolvedRequestContext;
use super::location::LocationDirective;
use super::vserver::VirtualServer;

/// What the request processor should do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ServeStatic,
    ServeAutoindex,
    RunCgi,
    StoreBody,
    RedirectExternal,
    RedirectInternal,
    RespondError,
}

/// Everything the static/autoindex handler needs for a directory URI.
#[derive(Debug)]
pub struct AutoIndexContext {
    pub directory_path: PhysicalPath,
    pub uri_dir_path: String,
    pub index_candidates: Vec<PhysicalPath>,
    pub autoindex_enabled: bool,
}

/// Everything the CGI subsystem needs to spawn a child.
#[derive(Debug)]
pub struct CgiContext {
    pub executor_path: String,
    pub script_filename: PhysicalPath,
    pub script_name: String,
    pub path_info: String,
    pub query_string: String,
}

/// Everything the store-body handler needs.
#[derive(Debug)]
pub struct UploadContext {
    pub destination_path: PhysicalPath,
    pub allow_overwrite: bool,
}

/// The routing result: the matched virtual server and location, the decided
/// action, and accessors for each action's context.
#[derive(Debug)]
pub struct LocationRouting<'a> {
    vserver: &'a VirtualServer,
    location: Option<&'a LocationDirective>,
    path: String,
    query: String,
    method: Method,
    status: HttpStatus,
    action: Action,
    redirect_location: String,
    content_length: Option<u64>,
}

impl<'a> LocationRouting<'a> {
    pub(super) fn decide(
        vserver: &'a VirtualServer,
        location: Option<&'a LocationDirective>,
        ctx: &ResolvedRequestContext,
        request: &HttpRequest,
        status: HttpStatus,
    ) -> Self {
        let mut routing = LocationRouting {
            vserver,
            location,
            path: ctx.path().to_string(),
            query: request.query.clone(),
            method: request.method,
            status,
            action: Action::RespondError,
            redirect_location: String::new(),
            content_length: request.content_length(),
        };
        routing.decide_action();
        routing
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn status(&self) -> HttpStatus {
        self.status
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn redirect_location(&self) -> &str {
        &self.redirect_location
    }

    pub fn allow_header_value(&self) -> Option<String> {
        self.location.map(|l| l.allow_header_value())
    }

    pub fn client_max_body_size(&self) -> Option<u64> {
        self.location.map(|l| l.client_max_body_size())
    }

    /// error_page lookup: location first, then the virtual server.
    pub fn error_page_target(&self, status: HttpStatus) -> Option<&str> {
        if let Some(location) = self.location {
            if let Some(target) = location.error_page_target(status) {
                return Some(target);
            }
        }
        self.vserver.error_page_target(status)
    }

    fn decide_action(&mut self) {
        self.action = Action::RespondError;

        if self.status.is_error() {
            self.apply_error_page_or_respond();
            return;
        }

        let location = match self.location {
            Some(location) => location,
            None => {
                self.status = HttpStatus::NOT_FOUND;
                self.apply_error_page_or_respond();
                return;
            }
        };

        if let Some((status, target)) = location.redirect() {
            self.status = status;
            self.redirect_location = target.to_string();
            self.action = if target.starts_with('/') {
                Action::RedirectInternal
            } else {
                Action::RedirectExternal
            };
            return;
        }

        // Content-Length is checked up front; chunked bodies are enforced
        // by the session while receiving.
        if let Some(length) = self.content_length {
            if length > location.client_max_body_size() {
                self.status = HttpStatus::PAYLOAD_TOO_LARGE;
                self.apply_error_page_or_respond();
                return;
            }
        }

        if !location.is_method_allowed(self.method) {
            self.status = HttpStatus::METHOD_NOT_ALLOWED;
            self.apply_error_page_or_respond();
            return;
        }

        if location.upload_store().is_some() && self.method == Method::Post {
            self.action = Action::StoreBody;
            return;
        }

        if self.path.ends_with('/')
            && location.is_autoindex_enabled()
            && location.index_candidate_uris(&self.path).is_empty()
        {
            self.action = Action::ServeAutoindex;
            return;
        }

        if location.is_cgi_enabled() {
            if let Some((_, _, script_end)) = location.choose_cgi_executor(&self.path) {
                let script_name = &self.path[..script_end];
                let under_location = location.strip_pattern(script_name);
                let root = match PhysicalPath::resolve(location.root()) {
                    Ok(root) => root,
                    Err(_) => {
                        self.status = HttpStatus::BAD_REQUEST;
                        self.apply_error_page_or_respond();
                        return;
                    }
                };
                match resolve_under_root(&root, &under_location, true) {
                    Ok(script) => {
                        // The script must exist as a regular file; a
                        // missing script is a 404, not a CGI failure.
                        match std::fs::metadata(script.as_path()) {
                            Ok(meta) if meta.is_file() => {
                                self.action = Action::RunCgi;
                                return;
                            }
                            _ => {
                                self.status = HttpStatus::NOT_FOUND;
                                self.apply_error_page_or_respond();
                                return;
                            }
                        }
                    }
                    Err(_) => {
                        self.status = HttpStatus::BAD_REQUEST;
                        self.apply_error_page_or_respond();
                        return;
                    }
                }
            }
        }

        self.action = Action::ServeStatic;
    }

    /// Promotes a decided error into an internal redirect when an error
    /// page is configured with a server-absolute target.
    fn apply_error_page_or_respond(&mut self) {
        self.action = Action::RespondError;
        self.redirect_location.clear();

        let target = match self.error_page_target(self.status) {
            Some(target) => target.to_string(),
            None => return,
        };
        if target.starts_with('/') {
            self.redirect_location = target;
            self.action = Action::RedirectInternal;
        }
        // External error-page URLs fall back to the plain error body.
    }

    /// Physical path for static/upload targets: the URI path under the
    /// location's root.
    pub fn resolve_physical(
        &self,
        allow_nonexistent_leaf: bool,
    ) -> Result<PhysicalPath, PathError> {
        let location = self.location.ok_or(PathError::NotFound)?;
        let under_location = location.strip_pattern(&self.path);
        let root = PhysicalPath::resolve(location.root()).map_err(|_| PathError::NotFound)?;
        resolve_under_root(&root, &under_location, allow_nonexistent_leaf)
    }

    pub fn autoindex_context(&self) -> Result<AutoIndexContext, PathError> {
        let location = self.location.ok_or(PathError::NotFound)?;
        if !self.path.ends_with('/') {
            return Err(PathError::Invalid);
        }

        let root = PhysicalPath::resolve(location.root()).map_err(|_| PathError::NotFound)?;
        let under_location = location.strip_pattern(&self.path);
        let directory_path = resolve_under_root(&root, &under_location, false)?;

        let mut index_candidates = Vec::new();
        for candidate_uri in location.index_candidate_uris(&self.path) {
            let candidate_under_location = location.strip_pattern(&candidate_uri);
            if let Ok(candidate) = resolve_under_root(&root, &candidate_under_location, true) {
                index_candidates.push(candidate);
            }
        }

        Ok(AutoIndexContext {
            directory_path,
            uri_dir_path: self.path.clone(),
            index_candidates,
            autoindex_enabled: location.is_autoindex_enabled(),
        })
    }

    pub fn cgi_context(&self) -> Result<CgiContext, String> {
        if self.action != Action::RunCgi {
            return Err("routing did not select CGI".to_string());
        }
        let location = self.location.ok_or("no location matched")?;
        let (executor, _ext, script_end) = location
            .choose_cgi_executor(&self.path)
            .ok_or("cgi extension not matched")?;

        let script_name = self.path[..script_end].to_string();
        let path_info = self.path[script_end..].to_string();

        let under_location = location.strip_pattern(&script_name);
        let root =
            PhysicalPath::resolve(location.root()).map_err(|e| format!("bad root: {}", e))?;
        let script_filename = resolve_under_root(&root, &under_location, true)
            .map_err(|e| format!("cannot resolve script: {}", e))?;

        Ok(CgiContext {
            executor_path: executor.to_string(),
            script_filename,
            script_name,
            path_info,
            query_string: self.query.clone(),
        })
    }

    pub fn upload_context(&self) -> Result<UploadContext, HttpStatus> {
        if self.action != Action::StoreBody {
            return Err(HttpStatus::SERVER_ERROR);
        }
        let location = self.location.ok_or(HttpStatus::SERVER_ERROR)?;
        let store = location.upload_store().ok_or(HttpStatus::SERVER_ERROR)?;

        let rel = location.strip_pattern(&self.path);
        // The target must name a file, not a directory.
        if rel == "/" || rel.ends_with('/') {
            return Err(HttpStatus::BAD_REQUEST);
        }

        let store_root =
            PhysicalPath::resolve(store).map_err(|_| HttpStatus::SERVER_ERROR)?;
        let destination_path = resolve_under_root(&store_root, &rel, true).map_err(|e| match e {
            PathError::SymlinkEscape => HttpStatus::FORBIDDEN,
            PathError::Invalid => HttpStatus::BAD_REQUEST,
            PathError::NotFound => HttpStatus::NOT_FOUND,
        })?;

        Ok(UploadContext {
            destination_path,
            allow_overwrite: true,
        })
    }
}
