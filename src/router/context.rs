//! Normalized per-request routing context.

use crate::http::{HttpRequest, HttpStatus};

/// The request facts routing works from: a normalized path, the Host (port
/// stripped), and the protocol minor version.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRequestContext {
    path: String,
    host: String,
    minor_version: u8,
}

impl ResolvedRequestContext {
    /// Builds the context: collapses duplicate slashes, rejects NUL and
    /// non-absolute paths, then resolves dot segments. Popping beyond the
    /// root is a client error.
    pub fn create(request: &HttpRequest) -> Result<ResolvedRequestContext, HttpStatus> {
        let raw = &request.path;
        if raw.is_empty() || !raw.starts_with('/') || raw.contains('\0') {
            return Err(HttpStatus::BAD_REQUEST);
        }

        let mut ctx = ResolvedRequestContext {
            path: collapse_slashes(raw),
            host: extract_host(request),
            minor_version: request.minor_version,
        };
        ctx.path = resolve_dot_segments(&ctx.path).ok_or(HttpStatus::BAD_REQUEST)?;
        Ok(ctx)
    }

    /// Context for a request that already failed parsing; carries only the
    /// protocol version so an error response can still be framed.
    pub fn for_bad_request(request: &HttpRequest) -> ResolvedRequestContext {
        ResolvedRequestContext {
            path: String::new(),
            host: String::new(),
            minor_version: request.minor_version,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }
}

fn extract_host(request: &HttpRequest) -> String {
    let host = request.host().unwrap_or("");
    match host.find(':') {
        Some(colon) => host[..colon].to_string(),
        None => host.to_string(),
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_slash {
                out.push(c);
            }
            previous_slash = true;
        } else {
            previous_slash = false;
            out.push(c);
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// RFC 3986 §5.2.4 on an absolute path: `.` drops, `..` pops. `None` when
/// the path tries to ascend above the root. A trailing slash survives.
fn resolve_dot_segments(path: &str) -> Option<String> {
    let ends_with_slash = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    let mut out = String::from("/");
    out.push_str(&segments.join("/"));
    if ends_with_slash && out.len() > 1 {
        out.push('/');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::VecSink;

    fn request(raw: &[u8]) -> HttpRequest {
        let mut req = HttpRequest::new();
        let mut sink = VecSink::default();
        let mut pending = raw.to_vec();
        loop {
            let consumed = req.parse(&pending, &mut sink).unwrap();
            pending.drain(..consumed);
            if req.is_parse_complete() {
                return req;
            }
        }
    }

    #[test]
    fn collapses_duplicate_slashes() {
        let req = request(b"GET //a///b HTTP/1.1\r\nHost: h\r\n\r\n");
        let ctx = ResolvedRequestContext::create(&req).unwrap();
        assert_eq!(ctx.path(), "/a/b");
    }

    #[test]
    fn resolves_dot_segments() {
        let req = request(b"GET /a/./b/../c HTTP/1.1\r\nHost: h\r\n\r\n");
        let ctx = ResolvedRequestContext::create(&req).unwrap();
        assert_eq!(ctx.path(), "/a/c");
    }

    #[test]
    fn dot_resolution_is_idempotent() {
        for p in ["/a/b/../c/", "/x/./y", "/"] {
            let once = resolve_dot_segments(p).unwrap();
            assert_eq!(resolve_dot_segments(&once).unwrap(), once);
        }
    }

    #[test]
    fn ascending_above_root_is_rejected() {
        let req = request(b"GET /../etc/passwd HTTP/1.1\r\nHost: h\r\n\r\n");
        assert_eq!(
            ResolvedRequestContext::create(&req).unwrap_err(),
            HttpStatus::BAD_REQUEST
        );
    }

    #[test]
    fn trailing_slash_survives_normalization() {
        let req = request(b"GET /dir/sub/ HTTP/1.1\r\nHost: h\r\n\r\n");
        let ctx = ResolvedRequestContext::create(&req).unwrap();
        assert_eq!(ctx.path(), "/dir/sub/");
    }

    #[test]
    fn host_port_is_stripped() {
        let req = request(b"GET / HTTP/1.1\r\nHost: example.test:8080\r\n\r\n");
        let ctx = ResolvedRequestContext::create(&req).unwrap();
        assert_eq!(ctx.host(), "example.test");
    }
}
