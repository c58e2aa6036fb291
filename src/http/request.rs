//! Streaming HTTP/1.1 request parser (RFC 9112).
//!
//! The parser consumes bytes from the front of a caller-owned buffer and
//! reports how many it used; partial lines are left in place for the next
//! call, so feeding a request in arbitrary splits yields the same result as
//! feeding it whole. Decoded body octets are pushed into a caller-supplied
//! [`BodySink`] instead of being buffered.
//!
//! `parse` deliberately returns once when the header section completes,
//! before any body octet is consumed, so the session can route the request
//! and point the sink at its destination first.

use std::io;
use std::str::FromStr;

use super::headers::HeaderMap;
use super::method::Method;
use super::status::HttpStatus;

const CRLF_LEN: usize = 2;
/// A chunk-size line ("FFFFFFFF;ext..") has no business being longer.
const MAX_CHUNK_SIZE_LINE: usize = 64;

/// Receives decoded body octets as they stream through the parser.
pub trait BodySink {
    fn write_body(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Sink for requests whose body is irrelevant (GET and friends).
pub struct DiscardSink;

impl BodySink for DiscardSink {
    fn write_body(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory sink, used by tests and synthesized requests.
#[derive(Default)]
pub struct VecSink(pub Vec<u8>);

impl BodySink for VecSink {
    fn write_body(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.extend_from_slice(data);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    RequestLine,
    HeaderField,
    Body,
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    None,
    ContentLength,
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    SizeLine,
    Data,
    DataCrlf,
    Trailer,
}

/// Defensive limits (DoS). Zero is not a valid value; defaults are tight.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    /// Request line length, CRLF excluded. Exceeding: 414.
    pub max_request_line_bytes: usize,
    /// Header section total bytes, CRLFs included. Exceeding: 400.
    pub max_header_bytes: usize,
    /// Header line count. Exceeding: 400.
    pub max_header_count: usize,
    /// Decoded body octets. Exceeding: 413.
    pub max_body_bytes: u64,
}

impl Default for ParseLimits {
    fn default() -> Self {
        ParseLimits {
            max_request_line_bytes: 8 * 1024,
            max_header_bytes: 32 * 1024,
            max_header_count: 128,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// The method token exactly as received.
    pub method_token: String,
    pub path: String,
    pub query: String,
    pub minor_version: u8,
    pub headers: HeaderMap,

    phase: ParsePhase,
    parse_error_status: HttpStatus,

    framing: BodyFraming,
    is_chunked: bool,
    content_length: Option<u64>,
    content_length_remaining: u64,

    chunk_phase: ChunkPhase,
    chunk_bytes_remaining: u64,

    limits: ParseLimits,
    header_bytes_seen: usize,
    header_count: usize,
    body_bytes_seen: u64,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::Unknown,
            method_token: String::new(),
            path: String::new(),
            query: String::new(),
            minor_version: 1,
            headers: HeaderMap::new(),
            phase: ParsePhase::RequestLine,
            parse_error_status: HttpStatus::OK,
            framing: BodyFraming::None,
            is_chunked: false,
            content_length: None,
            content_length_remaining: 0,
            chunk_phase: ChunkPhase::SizeLine,
            chunk_bytes_remaining: 0,
            limits: ParseLimits::default(),
            header_bytes_seen: 0,
            header_count: 0,
            body_bytes_seen: 0,
        }
    }

    pub fn phase(&self) -> ParsePhase {
        self.phase
    }

    pub fn is_parse_complete(&self) -> bool {
        self.phase == ParsePhase::Complete
    }

    pub fn has_parse_error(&self) -> bool {
        self.phase == ParsePhase::Error
    }

    pub fn parse_error_status(&self) -> HttpStatus {
        self.parse_error_status
    }

    /// True once the header section has been fully consumed and validated.
    pub fn headers_complete(&self) -> bool {
        matches!(
            self.phase,
            ParsePhase::Body | ParsePhase::Complete
        )
    }

    pub fn is_chunked(&self) -> bool {
        self.is_chunked
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn has_body(&self) -> bool {
        self.framing != BodyFraming::None
    }

    pub fn http_version(&self) -> &'static str {
        if self.minor_version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.first("Host")
    }

    pub fn limits(&self) -> &ParseLimits {
        &self.limits
    }

    pub fn set_limits(&mut self, limits: ParseLimits) {
        self.limits = limits;
    }

    pub fn set_max_body_bytes(&mut self, max: u64) {
        self.limits.max_body_bytes = max;
    }

    /// Connection reuse per RFC 9112 §9.3: explicit `close` wins; HTTP/1.0
    /// requires an explicit `keep-alive`.
    pub fn should_keep_alive(&self) -> bool {
        let connection = self.headers.first("Connection").unwrap_or("");
        if token_list_contains(connection, "close") {
            return false;
        }
        if self.minor_version == 0 {
            return token_list_contains(connection, "keep-alive");
        }
        true
    }

    /// Feeds `buffer` to the parser, writing decoded body octets to `sink`.
    /// Returns the number of consumed bytes; the caller drops exactly that
    /// prefix. On a malformed or over-limit request the phase flips to
    /// `Error` and the mapped status is returned.
    pub fn parse(
        &mut self,
        buffer: &[u8],
        sink: &mut dyn BodySink,
    ) -> Result<usize, HttpStatus> {
        if self.phase == ParsePhase::Error {
            return Err(self.parse_error_status);
        }

        let mut cursor = 0usize;
        loop {
            match self.phase {
                ParsePhase::RequestLine => {
                    match self.take_line(buffer, cursor, self.limits.max_request_line_bytes) {
                        LineScan::Line(line_end) => {
                            let line = &buffer[cursor..line_end];
                            self.parse_request_line(line)
                                .map_err(|st| self.fail(st))?;
                            cursor = line_end + CRLF_LEN;
                            self.phase = ParsePhase::HeaderField;
                        }
                        LineScan::NeedMore => return Ok(cursor),
                        LineScan::TooLong => {
                            return Err(self.fail(HttpStatus::URI_TOO_LONG));
                        }
                    }
                }
                ParsePhase::HeaderField => {
                    let remaining_budget = self
                        .limits
                        .max_header_bytes
                        .saturating_sub(self.header_bytes_seen);
                    match self.take_line(buffer, cursor, remaining_budget) {
                        LineScan::Line(line_end) => {
                            let line_len = line_end + CRLF_LEN - cursor;
                            self.header_bytes_seen += line_len;
                            let line = &buffer[cursor..line_end];
                            cursor = line_end + CRLF_LEN;
                            if line.is_empty() {
                                self.validate_headers().map_err(|st| self.fail(st))?;
                                if self.framing == BodyFraming::None {
                                    self.phase = ParsePhase::Complete;
                                } else {
                                    self.phase = ParsePhase::Body;
                                }
                                // Hand control back so the caller can route
                                // the request and prepare the body sink.
                                return Ok(cursor);
                            }
                            self.header_count += 1;
                            if self.header_count > self.limits.max_header_count {
                                return Err(self.fail(HttpStatus::BAD_REQUEST));
                            }
                            self.parse_header_line(line).map_err(|st| self.fail(st))?;
                        }
                        LineScan::NeedMore => return Ok(cursor),
                        LineScan::TooLong => {
                            return Err(self.fail(HttpStatus::BAD_REQUEST));
                        }
                    }
                }
                ParsePhase::Body => match self.framing {
                    BodyFraming::ContentLength => {
                        if self.content_length_remaining > self.limits.max_body_bytes {
                            return Err(self.fail(HttpStatus::PAYLOAD_TOO_LARGE));
                        }
                        let available = buffer.len() - cursor;
                        let wanted = self.content_length_remaining.min(available as u64) as usize;
                        if wanted > 0 {
                            self.push_to_sink(sink, &buffer[cursor..cursor + wanted])?;
                            cursor += wanted;
                            self.content_length_remaining -= wanted as u64;
                        }
                        if self.content_length_remaining == 0 {
                            self.phase = ParsePhase::Complete;
                        } else {
                            return Ok(cursor);
                        }
                    }
                    BodyFraming::Chunked => match self.parse_chunked(buffer, &mut cursor, sink)? {
                        ChunkStep::Progress => {}
                        ChunkStep::NeedMore => return Ok(cursor),
                        ChunkStep::Done => self.phase = ParsePhase::Complete,
                    },
                    BodyFraming::None => self.phase = ParsePhase::Complete,
                },
                ParsePhase::Complete | ParsePhase::Error => return Ok(cursor),
            }
        }
    }

    fn fail(&mut self, status: HttpStatus) -> HttpStatus {
        self.phase = ParsePhase::Error;
        self.parse_error_status = status;
        status
    }

    fn push_to_sink(
        &mut self,
        sink: &mut dyn BodySink,
        data: &[u8],
    ) -> Result<(), HttpStatus> {
        self.body_bytes_seen += data.len() as u64;
        if self.body_bytes_seen > self.limits.max_body_bytes {
            return Err(self.fail(HttpStatus::PAYLOAD_TOO_LARGE));
        }
        sink.write_body(data)
            .map_err(|_| self.fail(HttpStatus::SERVER_ERROR))
    }

    /// Scans for a CRLF-terminated line starting at `start`. `budget` bounds
    /// the line length, CRLF excluded.
    fn take_line(&self, buffer: &[u8], start: usize, budget: usize) -> LineScan {
        let area = &buffer[start..];
        let mut i = 0;
        while i + 1 < area.len() {
            if area[i] == b'\r' && area[i + 1] == b'\n' {
                if i > budget {
                    return LineScan::TooLong;
                }
                return LineScan::Line(start + i);
            }
            i += 1;
        }
        if area.len() > budget + CRLF_LEN {
            return LineScan::TooLong;
        }
        LineScan::NeedMore
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), HttpStatus> {
        let line = std::str::from_utf8(line).map_err(|_| HttpStatus::BAD_REQUEST)?;

        // Runs of SP collapse into a single delimiter.
        let parts: Vec<&str> = line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() != 3 {
            return Err(HttpStatus::BAD_REQUEST);
        }

        self.method_token = parts[0].to_string();
        self.method = Method::from_str(parts[0]).unwrap_or(Method::Unknown);

        let target = parts[1];
        match target.find('?') {
            Some(q) => {
                self.path = target[..q].to_string();
                self.query = target[q + 1..].to_string();
            }
            None => {
                self.path = target.to_string();
                self.query.clear();
            }
        }
        if self.path.is_empty() || !self.path.starts_with('/') {
            return Err(HttpStatus::BAD_REQUEST);
        }

        let version = parts[2];
        if version.len() != 8 || !version.starts_with("HTTP/1.") {
            return Err(HttpStatus::HTTP_VERSION_NOT_SUPPORTED);
        }
        self.minor_version = match version.as_bytes()[7] {
            b'0' => 0,
            b'1' => 1,
            _ => return Err(HttpStatus::HTTP_VERSION_NOT_SUPPORTED),
        };
        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<(), HttpStatus> {
        let line = std::str::from_utf8(line).map_err(|_| HttpStatus::BAD_REQUEST)?;
        let colon = line.find(':').ok_or(HttpStatus::BAD_REQUEST)?;
        let name = &line[..colon];
        let value = &line[colon + 1..];

        if name.is_empty() || !name.bytes().all(is_tchar) {
            return Err(HttpStatus::BAD_REQUEST);
        }
        self.headers.append(name, trim_ows(value));
        Ok(())
    }

    fn validate_headers(&mut self) -> Result<(), HttpStatus> {
        if self.minor_version == 1 && !self.headers.contains("Host") {
            return Err(HttpStatus::BAD_REQUEST);
        }

        if let Some(values) = self.headers.values("Transfer-Encoding") {
            for value in values {
                if value
                    .split(',')
                    .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
                {
                    self.is_chunked = true;
                }
            }
        }

        if let Some(values) = self.headers.values("Content-Length") {
            // A single decimal value only.
            if values.len() != 1 {
                return Err(HttpStatus::BAD_REQUEST);
            }
            let text = values[0].trim();
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(HttpStatus::BAD_REQUEST);
            }
            let n: u64 = text.parse().map_err(|_| HttpStatus::BAD_REQUEST)?;
            self.content_length = Some(n);
        }

        if self.is_chunked && self.content_length.unwrap_or(0) > 0 {
            return Err(HttpStatus::BAD_REQUEST);
        }

        self.framing = if self.is_chunked {
            BodyFraming::Chunked
        } else if self.content_length.unwrap_or(0) > 0 {
            self.content_length_remaining = self.content_length.unwrap_or(0);
            BodyFraming::ContentLength
        } else {
            BodyFraming::None
        };
        Ok(())
    }

    fn parse_chunked(
        &mut self,
        buffer: &[u8],
        cursor: &mut usize,
        sink: &mut dyn BodySink,
    ) -> Result<ChunkStep, HttpStatus> {
        match self.chunk_phase {
            ChunkPhase::SizeLine => {
                match self.take_line(buffer, *cursor, MAX_CHUNK_SIZE_LINE) {
                    LineScan::Line(line_end) => {
                        let line = std::str::from_utf8(&buffer[*cursor..line_end])
                            .map_err(|_| self.fail(HttpStatus::BAD_REQUEST))?;
                        // Chunk extensions after ';' are ignored.
                        let size_text = line.split(';').next().unwrap_or("").trim();
                        let size = u64::from_str_radix(size_text, 16)
                            .map_err(|_| self.fail(HttpStatus::BAD_REQUEST))?;
                        if self.body_bytes_seen + size > self.limits.max_body_bytes {
                            return Err(self.fail(HttpStatus::PAYLOAD_TOO_LARGE));
                        }
                        *cursor = line_end + CRLF_LEN;
                        if size == 0 {
                            self.chunk_phase = ChunkPhase::Trailer;
                        } else {
                            self.chunk_bytes_remaining = size;
                            self.chunk_phase = ChunkPhase::Data;
                        }
                        Ok(ChunkStep::Progress)
                    }
                    LineScan::NeedMore => Ok(ChunkStep::NeedMore),
                    LineScan::TooLong => Err(self.fail(HttpStatus::BAD_REQUEST)),
                }
            }
            ChunkPhase::Data => {
                let available = buffer.len() - *cursor;
                if available == 0 {
                    return Ok(ChunkStep::NeedMore);
                }
                let wanted = self.chunk_bytes_remaining.min(available as u64) as usize;
                self.push_to_sink(sink, &buffer[*cursor..*cursor + wanted])?;
                *cursor += wanted;
                self.chunk_bytes_remaining -= wanted as u64;
                if self.chunk_bytes_remaining == 0 {
                    self.chunk_phase = ChunkPhase::DataCrlf;
                    Ok(ChunkStep::Progress)
                } else {
                    Ok(ChunkStep::NeedMore)
                }
            }
            ChunkPhase::DataCrlf => {
                if buffer.len() - *cursor < CRLF_LEN {
                    return Ok(ChunkStep::NeedMore);
                }
                if &buffer[*cursor..*cursor + CRLF_LEN] != b"\r\n" {
                    return Err(self.fail(HttpStatus::BAD_REQUEST));
                }
                *cursor += CRLF_LEN;
                self.chunk_phase = ChunkPhase::SizeLine;
                Ok(ChunkStep::Progress)
            }
            ChunkPhase::Trailer => {
                // Trailer fields are consumed and ignored; the empty line
                // terminates the message.
                match self.take_line(buffer, *cursor, self.limits.max_header_bytes) {
                    LineScan::Line(line_end) => {
                        let empty = line_end == *cursor;
                        *cursor = line_end + CRLF_LEN;
                        if empty {
                            Ok(ChunkStep::Done)
                        } else {
                            Ok(ChunkStep::Progress)
                        }
                    }
                    LineScan::NeedMore => Ok(ChunkStep::NeedMore),
                    LineScan::TooLong => Err(self.fail(HttpStatus::BAD_REQUEST)),
                }
            }
        }
    }
}

enum LineScan {
    /// Index of the `\r` ending the line.
    Line(usize),
    NeedMore,
    TooLong,
}

enum ChunkStep {
    Progress,
    NeedMore,
    Done,
}

fn is_tchar(b: u8) -> bool {
    // RFC 9110 §5.6.2 token characters.
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

fn trim_ows(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

fn token_list_contains(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(req: &mut HttpRequest, bytes: &[u8]) -> Result<Vec<u8>, HttpStatus> {
        let mut sink = VecSink::default();
        let mut pending = bytes.to_vec();
        loop {
            let before = pending.len();
            let consumed = req.parse(&pending, &mut sink)?;
            pending.drain(..consumed);
            if req.is_parse_complete() || (pending.len() == before && consumed == 0) {
                break;
            }
        }
        Ok(sink.0)
    }

    #[test]
    fn parses_simple_get() {
        let mut req = HttpRequest::new();
        parse_all(&mut req, b"GET /a/b?x=1 HTTP/1.1\r\nHost: e\r\n\r\n").unwrap();
        assert!(req.is_parse_complete());
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/a/b");
        assert_eq!(req.query, "x=1");
        assert_eq!(req.minor_version, 1);
        assert_eq!(req.host(), Some("e"));
    }

    #[test]
    fn byte_at_a_time_matches_whole_parse() {
        let raw = b"POST /u HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nwxyz";
        let mut whole = HttpRequest::new();
        let body_whole = parse_all(&mut whole, raw).unwrap();

        let mut split = HttpRequest::new();
        let mut sink = VecSink::default();
        let mut pending: Vec<u8> = Vec::new();
        for b in raw.iter() {
            pending.push(*b);
            let consumed = split.parse(&pending, &mut sink).unwrap();
            pending.drain(..consumed);
        }
        assert!(split.is_parse_complete());
        assert_eq!(sink.0, body_whole);
        assert_eq!(split.path, whole.path);
    }

    #[test]
    fn collapses_sp_runs_in_request_line() {
        let mut req = HttpRequest::new();
        parse_all(&mut req, b"GET   /x    HTTP/1.1\r\nHost: e\r\n\r\n").unwrap();
        assert_eq!(req.path, "/x");
    }

    #[test]
    fn rejects_missing_host_on_http11() {
        let mut req = HttpRequest::new();
        let err = parse_all(&mut req, b"GET / HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, HttpStatus::BAD_REQUEST);
    }

    #[test]
    fn http10_without_host_is_fine() {
        let mut req = HttpRequest::new();
        parse_all(&mut req, b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(req.is_parse_complete());
        assert!(!req.should_keep_alive());
    }

    #[test]
    fn rejects_unsupported_minor_version() {
        let mut req = HttpRequest::new();
        let err = parse_all(&mut req, b"GET / HTTP/1.2\r\nHost: e\r\n\r\n").unwrap_err();
        assert_eq!(err, HttpStatus::HTTP_VERSION_NOT_SUPPORTED);
    }

    #[test]
    fn rejects_chunked_with_content_length() {
        let mut req = HttpRequest::new();
        let err = parse_all(
            &mut req,
            b"POST / HTTP/1.1\r\nHost: e\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n",
        )
        .unwrap_err();
        assert_eq!(err, HttpStatus::BAD_REQUEST);
    }

    #[test]
    fn rejects_non_decimal_content_length() {
        let mut req = HttpRequest::new();
        let err = parse_all(
            &mut req,
            b"POST / HTTP/1.1\r\nHost: e\r\nContent-Length: 5x\r\n\r\n",
        )
        .unwrap_err();
        assert_eq!(err, HttpStatus::BAD_REQUEST);
    }

    #[test]
    fn decodes_chunked_body() {
        let mut req = HttpRequest::new();
        let body = parse_all(
            &mut req,
            b"POST / HTTP/1.1\r\nHost: e\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nABCD\r\n3;ext=1\r\nEFG\r\n0\r\n\r\n",
        )
        .unwrap();
        assert!(req.is_parse_complete());
        assert_eq!(body, b"ABCDEFG");
    }

    #[test]
    fn chunked_trailer_section_is_ignored() {
        let mut req = HttpRequest::new();
        let body = parse_all(
            &mut req,
            b"POST / HTTP/1.1\r\nHost: e\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\nX-Meta: 1\r\n\r\n",
        )
        .unwrap();
        assert!(req.is_parse_complete());
        assert_eq!(body, b"hi");
        assert!(!req.headers.contains("X-Meta"));
    }

    #[test]
    fn request_line_over_limit_is_414() {
        let mut req = HttpRequest::new();
        req.set_limits(ParseLimits {
            max_request_line_bytes: 32,
            ..ParseLimits::default()
        });
        let long = format!("GET /{} HTTP/1.1\r\nHost: e\r\n\r\n", "a".repeat(100));
        let err = parse_all(&mut req, long.as_bytes()).unwrap_err();
        assert_eq!(err, HttpStatus::URI_TOO_LONG);
    }

    #[test]
    fn header_section_over_limit_is_400() {
        let mut req = HttpRequest::new();
        req.set_limits(ParseLimits {
            max_header_bytes: 64,
            ..ParseLimits::default()
        });
        let long = format!("GET / HTTP/1.1\r\nHost: e\r\nX-Pad: {}\r\n\r\n", "b".repeat(200));
        let err = parse_all(&mut req, long.as_bytes()).unwrap_err();
        assert_eq!(err, HttpStatus::BAD_REQUEST);
    }

    #[test]
    fn body_over_limit_is_413() {
        let mut req = HttpRequest::new();
        req.set_max_body_bytes(3);
        let err = parse_all(
            &mut req,
            b"POST / HTTP/1.1\r\nHost: e\r\nContent-Length: 10\r\n\r\n0123456789",
        )
        .unwrap_err();
        assert_eq!(err, HttpStatus::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn repeated_headers_accumulate_in_order() {
        let mut req = HttpRequest::new();
        parse_all(
            &mut req,
            b"GET / HTTP/1.1\r\nHost: e\r\nCookie: a=1\r\nCookie: b=2\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.headers.values("Cookie").unwrap(), &["a=1", "b=2"]);
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let mut req = HttpRequest::new();
        let err = parse_all(&mut req, b"GET / HTTP/1.1\r\nBad Name: x\r\nHost: e\r\n\r\n")
            .unwrap_err();
        assert_eq!(err, HttpStatus::BAD_REQUEST);
    }

    #[test]
    fn parse_returns_at_header_body_boundary() {
        let raw = b"POST / HTTP/1.1\r\nHost: e\r\nContent-Length: 2\r\n\r\nok";
        let mut req = HttpRequest::new();
        let mut sink = VecSink::default();
        let consumed = req.parse(raw, &mut sink).unwrap();
        assert!(req.headers_complete());
        assert!(!req.is_parse_complete());
        assert!(sink.0.is_empty());

        let consumed2 = req.parse(&raw[consumed..], &mut sink).unwrap();
        assert_eq!(consumed2, 2);
        assert!(req.is_parse_complete());
        assert_eq!(sink.0, b"ok");
    }

    #[test]
    fn connection_close_disables_keep_alive() {
        let mut req = HttpRequest::new();
        parse_all(&mut req, b"GET / HTTP/1.1\r\nHost: e\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.should_keep_alive());
    }
}
