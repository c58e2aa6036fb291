//! Response wire encoding.
//!
//! The framing decision is made exactly once, on the first emission:
//!
//! | request                      | Content-Length set? | framing          |
//! |------------------------------|---------------------|------------------|
//! | HEAD, or status 1xx/204/304  | —                   | no body          |
//! | otherwise                    | yes                 | fixed length     |
//! | HTTP/1.1 otherwise           | no                  | chunked          |
//! | HTTP/1.0 otherwise           | no                  | close-delimited  |

use super::response::HttpResponse;
use super::status::HttpStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    NoBody,
    ContentLength,
    Chunked,
    CloseDelimited,
}

#[derive(Debug, Clone, Copy)]
pub struct EncoderOptions {
    pub request_minor_version: u8,
    pub request_keep_alive: bool,
    pub request_is_head: bool,
}

#[derive(Debug)]
pub struct ResponseEncoder {
    options: EncoderOptions,
    body_mode: BodyMode,
    decided: bool,
    should_close_connection: bool,
    expected_content_length: u64,
    body_bytes_sent: u64,
}

impl ResponseEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        ResponseEncoder {
            options,
            body_mode: BodyMode::NoBody,
            decided: false,
            should_close_connection: false,
            expected_content_length: 0,
            body_bytes_sent: 0,
        }
    }

    pub fn body_mode(&self) -> BodyMode {
        self.body_mode
    }

    pub fn should_close_connection(&self) -> bool {
        self.should_close_connection
    }

    /// Requests that the emitted header section carry `Connection: close`.
    /// Must happen before the first emission.
    pub fn force_close(&mut self) {
        self.should_close_connection = true;
    }

    fn decide(&mut self, response: &HttpResponse) {
        if self.decided {
            return;
        }
        self.decided = true;
        self.body_bytes_sent = 0;

        if self.options.request_is_head || body_forbidden(response.status()) {
            self.body_mode = BodyMode::NoBody;
        } else if response.has_expected_content_length() {
            self.body_mode = BodyMode::ContentLength;
            self.expected_content_length = response.expected_content_length();
        } else if self.options.request_minor_version >= 1 {
            self.body_mode = BodyMode::Chunked;
        } else {
            // HTTP/1.0 cannot do chunked; the close delimits the body.
            self.body_mode = BodyMode::CloseDelimited;
            self.should_close_connection = true;
        }

        if self.options.request_minor_version >= 1 {
            if !self.options.request_keep_alive {
                self.should_close_connection = true;
            }
        } else {
            // HTTP/1.0 keep-alive needs a self-delimiting body.
            let reusable = matches!(self.body_mode, BodyMode::ContentLength | BodyMode::NoBody);
            if !self.options.request_keep_alive || !reusable {
                self.should_close_connection = true;
            }
        }
    }

    /// Emits the status line and header section, applying the framing and
    /// Connection adjustments. Flips the response to `HeadersFlushed` (and
    /// `Complete` when no body follows).
    pub fn encode_header(&mut self, response: &mut HttpResponse) -> Result<Vec<u8>, String> {
        self.decide(response);

        let version = if self.options.request_minor_version >= 1 {
            "HTTP/1.1"
        } else {
            "HTTP/1.0"
        };

        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(version.as_bytes());
        out.push(b' ');
        out.extend_from_slice(response.status().code().to_string().as_bytes());
        out.push(b' ');
        let reason = if response.reason_phrase().is_empty() {
            response.status().reason_phrase()
        } else {
            response.reason_phrase()
        };
        out.extend_from_slice(reason.as_bytes());
        out.extend_from_slice(b"\r\n");

        // Work on a copy of the headers so framing adjustments never leak
        // back into the response object.
        let mut skip_content_length = false;
        let mut extra: Vec<(&str, String)> = Vec::new();

        if self.body_mode == BodyMode::Chunked {
            skip_content_length = true;
            extra.push(("Transfer-Encoding", "chunked".to_string()));
        }
        if self.should_close_connection {
            extra.push(("Connection", "close".to_string()));
        } else if self.options.request_minor_version == 0 {
            extra.push(("Connection", "keep-alive".to_string()));
        }

        for (name, values) in response.headers().iter() {
            if skip_content_length && name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            if name.eq_ignore_ascii_case("Connection")
                || (self.body_mode == BodyMode::Chunked
                    && name.eq_ignore_ascii_case("Transfer-Encoding"))
            {
                continue;
            }
            for value in values {
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        for (name, value) in &extra {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");

        response.mark_headers_flushed()?;
        if self.body_mode == BodyMode::NoBody {
            response.mark_complete()?;
        }
        Ok(out)
    }

    /// Encodes one body chunk. For HEAD / bodiless statuses the data is
    /// swallowed and nothing is emitted.
    pub fn encode_body_chunk(
        &mut self,
        response: &mut HttpResponse,
        data: &[u8],
    ) -> Result<Vec<u8>, String> {
        self.decide(response);

        if response.is_complete() || self.body_mode == BodyMode::NoBody {
            return Ok(Vec::new());
        }

        match self.body_mode {
            BodyMode::ContentLength => {
                let after = self.body_bytes_sent + data.len() as u64;
                if after > self.expected_content_length {
                    return Err("body exceeds declared Content-Length".to_string());
                }
                self.body_bytes_sent = after;
                Ok(data.to_vec())
            }
            BodyMode::Chunked => {
                if data.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = Vec::with_capacity(data.len() + 16);
                out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
                Ok(out)
            }
            BodyMode::CloseDelimited => Ok(data.to_vec()),
            BodyMode::NoBody => Ok(Vec::new()),
        }
    }

    /// Terminates the body. Fixed-length framing verifies that exactly the
    /// declared number of octets was sent; chunked framing appends the
    /// last-chunk marker.
    pub fn encode_eof(&mut self, response: &mut HttpResponse) -> Result<Vec<u8>, String> {
        self.decide(response);

        if response.is_complete() {
            return Ok(Vec::new());
        }

        if self.body_mode == BodyMode::ContentLength
            && self.body_bytes_sent != self.expected_content_length
        {
            response.mark_error();
            return Err("body shorter than declared Content-Length".to_string());
        }

        let mut out = Vec::new();
        if self.body_mode == BodyMode::Chunked {
            out.extend_from_slice(b"0\r\n\r\n");
        }
        response.mark_complete()?;
        Ok(out)
    }
}

fn body_forbidden(status: HttpStatus) -> bool {
    let code = status.code();
    (100..200).contains(&code) || code == 204 || code == 304
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(minor: u8, keep_alive: bool, head: bool) -> EncoderOptions {
        EncoderOptions {
            request_minor_version: minor,
            request_keep_alive: keep_alive,
            request_is_head: head,
        }
    }

    #[test]
    fn fixed_length_round_trip() {
        let mut response = HttpResponse::new();
        response.set_expected_content_length(5).unwrap();
        response.set_header("Content-Type", "text/plain").unwrap();

        let mut enc = ResponseEncoder::new(options(1, true, false));
        let mut wire = enc.encode_header(&mut response).unwrap();
        wire.extend(enc.encode_body_chunk(&mut response, b"hello").unwrap());
        wire.extend(enc.encode_eof(&mut response).unwrap());

        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
        assert!(response.is_complete());
    }

    #[test]
    fn fixed_length_overrun_fails() {
        let mut response = HttpResponse::new();
        response.set_expected_content_length(3).unwrap();
        let mut enc = ResponseEncoder::new(options(1, true, false));
        enc.encode_header(&mut response).unwrap();
        assert!(enc.encode_body_chunk(&mut response, b"toolong").is_err());
    }

    #[test]
    fn fixed_length_underrun_fails_at_eof() {
        let mut response = HttpResponse::new();
        response.set_expected_content_length(10).unwrap();
        let mut enc = ResponseEncoder::new(options(1, true, false));
        enc.encode_header(&mut response).unwrap();
        enc.encode_body_chunk(&mut response, b"short").unwrap();
        assert!(enc.encode_eof(&mut response).is_err());
    }

    #[test]
    fn http11_without_length_is_chunked() {
        let mut response = HttpResponse::new();
        let mut enc = ResponseEncoder::new(options(1, true, false));
        let header = enc.encode_header(&mut response).unwrap();
        assert_eq!(enc.body_mode(), BodyMode::Chunked);
        let text = String::from_utf8(header).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));

        let chunk = enc.encode_body_chunk(&mut response, b"abc").unwrap();
        assert_eq!(chunk, b"3\r\nabc\r\n");
        let eof = enc.encode_eof(&mut response).unwrap();
        assert_eq!(eof, b"0\r\n\r\n");
    }

    #[test]
    fn chunked_strips_stale_content_length() {
        let mut response = HttpResponse::new();
        response.set_header("Content-Length", "99").unwrap();
        response.remove_header("Content-Length").unwrap();
        let mut enc = ResponseEncoder::new(options(1, true, false));
        let header = String::from_utf8(enc.encode_header(&mut response).unwrap()).unwrap();
        assert!(!header.contains("Content-Length"));
    }

    #[test]
    fn http10_without_length_is_close_delimited() {
        let mut response = HttpResponse::new();
        let mut enc = ResponseEncoder::new(options(0, true, false));
        enc.encode_header(&mut response).unwrap();
        assert_eq!(enc.body_mode(), BodyMode::CloseDelimited);
        assert!(enc.should_close_connection());

        let chunk = enc.encode_body_chunk(&mut response, b"raw").unwrap();
        assert_eq!(chunk, b"raw");
    }

    #[test]
    fn head_suppresses_body() {
        let mut response = HttpResponse::new();
        response.set_expected_content_length(5).unwrap();
        let mut enc = ResponseEncoder::new(options(1, true, true));
        enc.encode_header(&mut response).unwrap();
        assert_eq!(enc.body_mode(), BodyMode::NoBody);
        assert!(response.is_complete());
        let chunk = enc.encode_body_chunk(&mut response, b"hello").unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn status_204_has_no_body() {
        let mut response = HttpResponse::new();
        response.set_status(HttpStatus::NO_CONTENT).unwrap();
        let mut enc = ResponseEncoder::new(options(1, true, false));
        enc.encode_header(&mut response).unwrap();
        assert_eq!(enc.body_mode(), BodyMode::NoBody);
    }

    #[test]
    fn close_request_forces_connection_close() {
        let mut response = HttpResponse::new();
        response.set_expected_content_length(0).unwrap();
        let mut enc = ResponseEncoder::new(options(1, false, false));
        let header = String::from_utf8(enc.encode_header(&mut response).unwrap()).unwrap();
        assert!(header.contains("Connection: close\r\n"));
        assert!(enc.should_close_connection());
    }
}
