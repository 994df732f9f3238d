use std::io::{self, Write};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";
const CONTENT_LENGTH: &str = "Content-Length";

/// Serializes a response into its wire form.
///
/// Any caller-supplied `Content-Length` is dropped and replaced by the exact
/// byte length of the body, written after the other headers.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        if k.eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    let content_length = format!("{}: {}\r\n", CONTENT_LENGTH, resp.body.len());
    buf.extend_from_slice(content_length.as_bytes());

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(&resp.body);

    buf
}

/// Holds a serialized response and sends it with a single write call.
///
/// Short writes are reported but never retried: once `write_once` returns the
/// connection is closed regardless of how much was sent.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub fn write_once<W: Write>(&mut self, stream: &mut W) -> io::Result<usize> {
        let n = stream.write(&self.buffer[self.written..])?;
        self.written += n;
        Ok(n)
    }

    pub fn is_complete(&self) -> bool {
        self.written == self.buffer.len()
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}
