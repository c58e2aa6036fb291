//! CGI child stdout header parsing and RFC 3875 §6 response classification.

use super::response::HttpResponse;
use super::status::HttpStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgiResponseType {
    NotIdentified,
    /// Headers + body, no `Location`.
    Document,
    /// `Location: /path` — handled entirely server-side.
    LocalRedirect,
    /// `Location: <absolute-URL>` without a document.
    ClientRedirect,
    /// `Location: <absolute-URL>` plus `Content-Type` and a body.
    ClientRedirectWithDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Complete,
    Error,
}

/// Incremental parser for the CGI header section. Lines are accepted with
/// either LF or CRLF endings (scripts are sloppy); the empty line ends the
/// section.
#[derive(Debug)]
pub struct CgiResponse {
    response_type: CgiResponseType,
    headers: Vec<(String, String)>,
    phase: Phase,
    line_buffer: Vec<u8>,
}

impl Default for CgiResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl CgiResponse {
    pub fn new() -> Self {
        CgiResponse {
            response_type: CgiResponseType::NotIdentified,
            headers: Vec::new(),
            phase: Phase::Header,
            line_buffer: Vec::new(),
        }
    }

    pub fn is_parse_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn response_type(&self) -> CgiResponseType {
        self.response_type
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Consumes bytes up to and including the header terminator; returns how
    /// many were used. Bytes past the terminator belong to the body and are
    /// left untouched.
    pub fn parse(&mut self, data: &[u8]) -> Result<usize, String> {
        if self.phase == Phase::Complete {
            return Ok(0);
        }
        if self.phase == Phase::Error {
            return Err("cgi response is in error state".to_string());
        }

        let mut consumed = 0usize;
        for &byte in data {
            consumed += 1;
            self.line_buffer.push(byte);
            if byte != b'\n' {
                continue;
            }

            let mut line = std::mem::take(&mut self.line_buffer);
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                self.finalize()?;
                return Ok(consumed);
            }
            self.parse_header_line(&line)?;
        }
        Ok(consumed)
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<(), String> {
        let text = std::str::from_utf8(line).map_err(|_| {
            self.phase = Phase::Error;
            "cgi header is not valid UTF-8".to_string()
        })?;
        let colon = text.find(':').ok_or_else(|| {
            self.phase = Phase::Error;
            "invalid CGI header line".to_string()
        })?;
        let name = text[..colon].trim_matches(|c| c == ' ' || c == '\t');
        let value = text[colon + 1..].trim_matches(|c| c == ' ' || c == '\t');
        if name.is_empty() {
            self.phase = Phase::Error;
            return Err("empty CGI header name".to_string());
        }
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), String> {
        self.response_type = self.classify();
        self.phase = Phase::Complete;
        Ok(())
    }

    fn classify(&self) -> CgiResponseType {
        let location = self.header("Location");
        let has_content_type = self.header("Content-Type").is_some();

        match location {
            None => CgiResponseType::Document,
            Some(l) if l.starts_with('/') => CgiResponseType::LocalRedirect,
            Some(_) if has_content_type => CgiResponseType::ClientRedirectWithDocument,
            Some(_) => CgiResponseType::ClientRedirect,
        }
    }

    /// Status from the `Status:` header; 302 for redirects without one,
    /// 200 otherwise.
    pub fn http_status(&self) -> HttpStatus {
        if let Some(value) = self.header("Status") {
            let digits: String = value
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(code) = digits.parse::<u16>() {
                if (100..=999).contains(&code) {
                    return HttpStatus(code);
                }
            }
        }
        if self.header("Location").is_some() {
            return HttpStatus::FOUND;
        }
        HttpStatus::OK
    }

    pub fn local_redirect_target(&self) -> Option<&str> {
        if self.response_type != CgiResponseType::LocalRedirect {
            return None;
        }
        self.header("Location").filter(|l| l.starts_with('/'))
    }

    /// Applies status and headers to the HTTP response. Hop-by-hop headers
    /// and framing are the server's business and are filtered out; a valid
    /// `Content-Length` becomes the expected body size.
    pub fn apply_to_response(&self, response: &mut HttpResponse) -> Result<(), String> {
        response.set_status(self.http_status())?;

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("Status") {
                continue;
            }
            if is_hop_by_hop(name) {
                continue;
            }
            if name.eq_ignore_ascii_case("Content-Length") {
                if let Ok(n) = value.trim().parse::<u64>() {
                    response.set_expected_content_length(n)?;
                }
                continue;
            }
            response.append_header(name, value)?;
        }
        Ok(())
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    name.eq_ignore_ascii_case("Connection")
        || name.eq_ignore_ascii_case("Transfer-Encoding")
        || name.eq_ignore_ascii_case("Keep-Alive")
        || name.eq_ignore_ascii_case("TE")
        || name.eq_ignore_ascii_case("Trailer")
        || name.eq_ignore_ascii_case("Upgrade")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_response_with_status() {
        let mut r = CgiResponse::new();
        let used = r
            .parse(b"Status: 404 Not Found\r\nContent-Type: text/plain\r\n\r\nbody")
            .unwrap();
        assert!(r.is_parse_complete());
        assert_eq!(r.response_type(), CgiResponseType::Document);
        assert_eq!(r.http_status(), HttpStatus::NOT_FOUND);
        // The body bytes after the terminator are not consumed.
        assert_eq!(used, b"Status: 404 Not Found\r\nContent-Type: text/plain\r\n\r\n".len());
    }

    #[test]
    fn bare_lf_line_endings_are_accepted() {
        let mut r = CgiResponse::new();
        r.parse(b"Content-Type: text/html\n\n").unwrap();
        assert!(r.is_parse_complete());
        assert_eq!(r.header("Content-Type"), Some("text/html"));
    }

    #[test]
    fn local_redirect_classification() {
        let mut r = CgiResponse::new();
        r.parse(b"Location: /actual\r\n\r\n").unwrap();
        assert_eq!(r.response_type(), CgiResponseType::LocalRedirect);
        assert_eq!(r.local_redirect_target(), Some("/actual"));
    }

    #[test]
    fn client_redirect_defaults_to_302() {
        let mut r = CgiResponse::new();
        r.parse(b"Location: https://example.test/\r\n\r\n").unwrap();
        assert_eq!(r.response_type(), CgiResponseType::ClientRedirect);
        assert_eq!(r.http_status(), HttpStatus::FOUND);
    }

    #[test]
    fn client_redirect_with_document() {
        let mut r = CgiResponse::new();
        r.parse(b"Location: https://example.test/\r\nContent-Type: text/html\r\n\r\n")
            .unwrap();
        assert_eq!(r.response_type(), CgiResponseType::ClientRedirectWithDocument);
    }

    #[test]
    fn hop_by_hop_headers_are_filtered_on_apply() {
        let mut r = CgiResponse::new();
        r.parse(b"Content-Type: text/plain\r\nConnection: close\r\nTransfer-Encoding: chunked\r\nContent-Length: 2\r\n\r\n")
            .unwrap();
        let mut response = HttpResponse::new();
        r.apply_to_response(&mut response).unwrap();
        assert!(!response.headers().contains("Connection"));
        assert!(!response.headers().contains("Transfer-Encoding"));
        assert_eq!(response.expected_content_length(), 2);
        assert_eq!(response.headers().first("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn split_feeding_is_equivalent() {
        let raw = b"Status: 201\r\nX-One: a\r\n\r\n";
        let mut whole = CgiResponse::new();
        whole.parse(raw).unwrap();

        let mut split = CgiResponse::new();
        let mut offset = 0;
        while offset < raw.len() && !split.is_parse_complete() {
            offset += split.parse(&raw[offset..offset + 1]).unwrap();
        }
        assert!(split.is_parse_complete());
        assert_eq!(split.http_status(), whole.http_status());
        assert_eq!(split.header("X-One"), whole.header("X-One"));
    }
}
