//! Response writer: pulls from the body source, pushes through the encoder
//! into the send buffer.

use crate::http::{EncoderOptions, HttpResponse, ResponseEncoder};
use crate::prelude::SEND_LOW_WATERMARK;

use super::body_source::{BodyRead, BodySource};
use super::buffer::IoBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStep {
    /// More body remains (or the source would block).
    NeedMore,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub struct PumpResult {
    pub step: PumpStep,
    pub should_close: bool,
}

pub struct ResponseWriter {
    encoder: ResponseEncoder,
    body: Option<BodySource>,
    header_written: bool,
    eof_written: bool,
}

impl ResponseWriter {
    pub fn new(options: EncoderOptions, body: Option<BodySource>) -> Self {
        ResponseWriter {
            encoder: ResponseEncoder::new(options),
            body,
            header_written: false,
            eof_written: false,
        }
    }

    /// Asks the encoder to emit `Connection: close`. Only effective before
    /// the header section is written.
    pub fn force_close(&mut self) {
        self.encoder.force_close();
    }

    pub fn body_pollable_fd(&self) -> Option<std::os::fd::RawFd> {
        self.body.as_ref().and_then(|b| b.pollable_fd())
    }

    /// Moves one step of the response into `send_buffer`: the header
    /// section first, then one body chunk per call until EOF.
    pub fn pump(
        &mut self,
        response: &mut HttpResponse,
        send_buffer: &mut IoBuffer,
    ) -> Result<PumpResult, String> {
        if !self.header_written {
            let header = self.encoder.encode_header(response)?;
            send_buffer.append(&header);
            self.header_written = true;
            if response.is_complete() {
                self.eof_written = true;
                return Ok(self.result(PumpStep::Done));
            }
        }

        if self.eof_written {
            return Ok(self.result(PumpStep::Done));
        }

        let source = match self.body.as_mut() {
            Some(source) => source,
            None => {
                let eof = self.encoder.encode_eof(response)?;
                send_buffer.append(&eof);
                self.eof_written = true;
                return Ok(self.result(PumpStep::Done));
            }
        };

        match source.read(SEND_LOW_WATERMARK) {
            BodyRead::Data(data) => {
                let encoded = self.encoder.encode_body_chunk(response, &data)?;
                send_buffer.append(&encoded);
                if response.is_complete() {
                    // HEAD and bodiless statuses: the source drains with
                    // nothing emitted.
                    self.eof_written = true;
                    return Ok(self.result(PumpStep::Done));
                }
                Ok(self.result(PumpStep::NeedMore))
            }
            BodyRead::Eof => {
                let eof = self.encoder.encode_eof(response)?;
                send_buffer.append(&eof);
                self.eof_written = true;
                Ok(self.result(PumpStep::Done))
            }
            BodyRead::WouldBlock => Ok(self.result(PumpStep::NeedMore)),
        }
    }

    /// Forces termination after a mid-response failure: emits the header if
    /// needed and the chunked last-chunk marker, nothing else.
    pub fn write_eof(
        &mut self,
        response: &mut HttpResponse,
        send_buffer: &mut IoBuffer,
    ) -> Result<(), String> {
        if self.eof_written || response.is_complete() {
            return Ok(());
        }
        if !self.header_written {
            let header = self.encoder.encode_header(response)?;
            send_buffer.append(&header);
            self.header_written = true;
        }
        if !response.is_complete() {
            let eof = self.encoder.encode_eof(response)?;
            send_buffer.append(&eof);
        }
        self.eof_written = true;
        Ok(())
    }

    fn result(&self, step: PumpStep) -> PumpResult {
        PumpResult {
            step,
            should_close: self.encoder.should_close_connection(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpStatus;

    fn options() -> EncoderOptions {
        EncoderOptions {
            request_minor_version: 1,
            request_keep_alive: true,
            request_is_head: false,
        }
    }

    fn drain(writer: &mut ResponseWriter, response: &mut HttpResponse) -> Vec<u8> {
        let mut buffer = IoBuffer::new();
        loop {
            let result = writer.pump(response, &mut buffer).unwrap();
            if result.step == PumpStep::Done {
                break;
            }
        }
        buffer.data().to_vec()
    }

    #[test]
    fn memory_body_with_content_length() {
        let mut response = HttpResponse::new();
        response.set_expected_content_length(4).unwrap();
        let mut writer =
            ResponseWriter::new(options(), Some(BodySource::from_bytes(b"data".to_vec())));
        let wire = drain(&mut writer, &mut response);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.ends_with("\r\n\r\ndata"));
        assert!(response.is_complete());
    }

    #[test]
    fn no_body_emits_bare_header_and_terminator() {
        let mut response = HttpResponse::new();
        response.set_status(HttpStatus::CREATED).unwrap();
        response.set_expected_content_length(0).unwrap();
        let mut writer = ResponseWriter::new(options(), None);
        let wire = drain(&mut writer, &mut response);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(response.is_complete());
    }

    #[test]
    fn chunked_stream_concatenates_to_source() {
        let mut response = HttpResponse::new();
        let mut writer = ResponseWriter::new(
            options(),
            Some(BodySource::from_bytes(b"streamed-body".to_vec())),
        );
        let wire = drain(&mut writer, &mut response);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked"));
        assert!(text.contains("d\r\nstreamed-body\r\n0\r\n\r\n"));
    }

    #[test]
    fn write_eof_terminates_chunked_mid_stream() {
        let mut response = HttpResponse::new();
        let mut writer = ResponseWriter::new(
            options(),
            Some(BodySource::from_bytes(b"partial".to_vec())),
        );
        let mut buffer = IoBuffer::new();
        writer.pump(&mut response, &mut buffer).unwrap();
        writer.write_eof(&mut response, &mut buffer).unwrap();
        let text = String::from_utf8(buffer.data().to_vec()).unwrap();
        assert!(text.ends_with("0\r\n\r\n"));
    }
}
