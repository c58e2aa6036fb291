use super::headers::HeaderMap;
use super::status::HttpStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePhase {
    /// Headers are still editable.
    AwaitingHeaders,
    /// The status line and header section have been emitted.
    HeadersFlushed,
    Complete,
    Error,
}

/// An outgoing response. Header mutation is only legal before the header
/// section hits the wire; the encoder flips the phase.
#[derive(Debug)]
pub struct HttpResponse {
    phase: ResponsePhase,
    status: HttpStatus,
    reason_phrase: String,
    headers: HeaderMap,
    has_expected_content_length: bool,
    expected_content_length: u64,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        HttpResponse {
            phase: ResponsePhase::AwaitingHeaders,
            status: HttpStatus::OK,
            reason_phrase: HttpStatus::OK.reason_phrase().to_string(),
            headers: HeaderMap::new(),
            has_expected_content_length: false,
            expected_content_length: 0,
        }
    }

    pub fn reset(&mut self) {
        self.phase = ResponsePhase::AwaitingHeaders;
        self.status = HttpStatus::OK;
        self.reason_phrase = HttpStatus::OK.reason_phrase().to_string();
        self.headers.clear();
        self.has_expected_content_length = false;
        self.expected_content_length = 0;
    }

    pub fn phase(&self) -> ResponsePhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ResponsePhase::Complete
    }

    pub fn headers_flushed(&self) -> bool {
        matches!(
            self.phase,
            ResponsePhase::HeadersFlushed | ResponsePhase::Complete
        )
    }

    pub fn status(&self) -> HttpStatus {
        self.status
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn ensure_editable(&self) -> Result<(), String> {
        match self.phase {
            ResponsePhase::AwaitingHeaders => Ok(()),
            ResponsePhase::HeadersFlushed => Err("headers already flushed".to_string()),
            ResponsePhase::Complete => Err("response already complete".to_string()),
            ResponsePhase::Error => Err("response is in error state".to_string()),
        }
    }

    pub fn set_status(&mut self, status: HttpStatus) -> Result<(), String> {
        self.ensure_editable()?;
        self.status = status;
        self.reason_phrase = status.reason_phrase().to_string();
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.ensure_editable()?;
        self.headers.set(name, value);
        self.refresh_expected_content_length();
        Ok(())
    }

    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.ensure_editable()?;
        self.headers.append(name, value);
        self.refresh_expected_content_length();
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) -> Result<(), String> {
        self.ensure_editable()?;
        self.headers.remove(name);
        self.refresh_expected_content_length();
        Ok(())
    }

    pub fn has_expected_content_length(&self) -> bool {
        self.has_expected_content_length
    }

    pub fn expected_content_length(&self) -> u64 {
        self.expected_content_length
    }

    /// Declares the body size and keeps the `Content-Length` header in sync.
    pub fn set_expected_content_length(&mut self, n: u64) -> Result<(), String> {
        self.ensure_editable()?;
        self.has_expected_content_length = true;
        self.expected_content_length = n;
        self.headers.set("Content-Length", &n.to_string());
        Ok(())
    }

    pub fn mark_headers_flushed(&mut self) -> Result<(), String> {
        match self.phase {
            ResponsePhase::AwaitingHeaders | ResponsePhase::HeadersFlushed => {
                self.phase = ResponsePhase::HeadersFlushed;
                Ok(())
            }
            _ => Err("invalid phase transition".to_string()),
        }
    }

    pub fn mark_complete(&mut self) -> Result<(), String> {
        match self.phase {
            ResponsePhase::Error => Err("response is in error state".to_string()),
            _ => {
                self.phase = ResponsePhase::Complete;
                Ok(())
            }
        }
    }

    pub fn mark_error(&mut self) {
        self.phase = ResponsePhase::Error;
    }

    /// Re-derives `expected_content_length` from the `Content-Length`
    /// header so the two can never disagree.
    fn refresh_expected_content_length(&mut self) {
        match self.headers.first("Content-Length") {
            Some(v) if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(n) = v.parse::<u64>() {
                    self.has_expected_content_length = true;
                    self.expected_content_length = n;
                    return;
                }
                self.has_expected_content_length = false;
                self.expected_content_length = 0;
            }
            _ => {
                self.has_expected_content_length = false;
                self.expected_content_length = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_length_tracks_header() {
        let mut r = HttpResponse::new();
        r.set_header("Content-Length", "42").unwrap();
        assert!(r.has_expected_content_length());
        assert_eq!(r.expected_content_length(), 42);

        r.remove_header("Content-Length").unwrap();
        assert!(!r.has_expected_content_length());
    }

    #[test]
    fn headers_frozen_after_flush() {
        let mut r = HttpResponse::new();
        r.mark_headers_flushed().unwrap();
        assert!(r.set_header("X", "1").is_err());
        assert!(r.set_status(HttpStatus::NOT_FOUND).is_err());
    }
}
