use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::http::request::{Method, Request};

const CRLF: &[u8] = b"\r\n";
const HTTP_VERSION: &str = "HTTP/1.1";
const CONTENT_LENGTH: &str = "Content-Length";

/// Progress of a [`RequestParser`] through one request.
///
/// Transitions only move forward: `StartLine -> Headers -> Body -> Finished`,
/// with `Body` skipped when there is no `Content-Length`. `Error` can be
/// entered from any of the first three states. `Finished` and `Error` are
/// terminal until the request is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    StartLine,
    Headers,
    Body,
    Finished,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidStartLine,
    #[error("unrecognised request method")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    #[error("request is incomplete")]
    Incomplete,
}

/// Incremental HTTP/1.1 request parser.
///
/// Bytes may arrive split at any position. Each call to [`parse`](Self::parse)
/// consumes as much of the buffer as it can turn into request data and leaves
/// the rest (a partial line, or nothing) at the front of the buffer for the
/// next call.
#[derive(Debug)]
pub struct RequestParser {
    state: ParserState,
    request: Request,
    body_len: Option<usize>,
    error: Option<ParseError>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::StartLine,
            request: Request::default(),
            body_len: None,
            error: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Why the parser entered [`ParserState::Error`], if it did.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Advances the state machine as far as the buffered bytes allow.
    ///
    /// Consumed bytes are removed from the front of `buffer`. Calling this
    /// again after appending more data resumes where the previous call
    /// stopped. Once the state is terminal further calls are no-ops.
    pub fn parse(&mut self, buffer: &mut BytesMut) -> ParserState {
        loop {
            let keep_parsing = match self.state {
                ParserState::StartLine => self.parse_start_line(buffer),
                ParserState::Headers => self.parse_headers(buffer),
                ParserState::Body => self.parse_body(buffer),
                ParserState::Finished | ParserState::Error => false,
            };
            if !keep_parsing {
                break;
            }
        }
        self.state
    }

    /// Hands out the completed request and rearms the parser for the next one.
    ///
    /// # Panics
    ///
    /// Panics if the state is not [`ParserState::Finished`].
    pub fn take_request(&mut self) -> Request {
        assert_eq!(
            self.state,
            ParserState::Finished,
            "take_request called on an unfinished request"
        );
        self.state = ParserState::StartLine;
        self.body_len = None;
        self.error = None;
        std::mem::take(&mut self.request)
    }

    fn fail(&mut self, error: ParseError) -> bool {
        self.error = Some(error);
        self.state = ParserState::Error;
        false
    }

    fn parse_start_line(&mut self, buffer: &mut BytesMut) -> bool {
        let Some(end) = find_crlf(buffer) else {
            return false;
        };

        match parse_request_line(&buffer[..end]) {
            Ok((method, path)) => {
                self.request.method = method;
                self.request.path = path;
                buffer.advance(end + CRLF.len());
                self.state = ParserState::Headers;
                true
            }
            Err(e) => self.fail(e),
        }
    }

    fn parse_headers(&mut self, buffer: &mut BytesMut) -> bool {
        while let Some(end) = find_crlf(buffer) {
            let line = &buffer[..end];

            // Blank line ends the header section
            if line.iter().all(u8::is_ascii_whitespace) {
                buffer.advance(end + CRLF.len());
                if self.request.headers.contains_key(CONTENT_LENGTH) {
                    self.state = ParserState::Body;
                    return true;
                }
                self.state = ParserState::Finished;
                return false;
            }

            match parse_header_line(line) {
                Ok((key, value)) => {
                    self.request.headers.insert(key, value);
                    buffer.advance(end + CRLF.len());
                }
                Err(e) => return self.fail(e),
            }
        }

        false
    }

    fn parse_body(&mut self, buffer: &mut BytesMut) -> bool {
        let target = match self.body_len {
            Some(len) => len,
            None => {
                match self.request.content_length() {
                    Ok(Some(len)) => {
                        self.body_len = Some(len);
                        len
                    }
                    Ok(None) => return self.fail(ParseError::InvalidContentLength),
                    Err(e) => return self.fail(e),
                }
            }
        };

        // The body only ever grows up to `target`, so this cannot underflow.
        debug_assert!(self.request.body.len() <= target);
        let remaining = target - self.request.body.len();
        let take = remaining.min(buffer.len());
        self.request.body.extend_from_slice(&buffer[..take]);
        buffer.advance(take);

        if self.request.body.len() == target {
            self.state = ParserState::Finished;
        }

        // Body is the last stage: either done or waiting for more bytes.
        false
    }
}

/// Parses a complete request held in `buf` with a fresh [`RequestParser`].
///
/// Returns the request and the number of bytes it occupied, or
/// [`ParseError::Incomplete`] when `buf` ends before the request does.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let mut buffer = BytesMut::from(buf);
    let mut parser = RequestParser::new();

    match parser.parse(&mut buffer) {
        ParserState::Finished => {
            let consumed = buf.len() - buffer.len();
            Ok((parser.take_request(), consumed))
        }
        ParserState::Error => Err(parser
            .error()
            .cloned()
            .unwrap_or(ParseError::InvalidStartLine)),
        _ => Err(ParseError::Incomplete),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

/// Splits on runs of ASCII whitespace, like `str::split_ascii_whitespace`.
fn split_tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(u8::is_ascii_whitespace)
        .filter(|token| !token.is_empty())
}

/// Only the method and version are compared, so only they must be exact
/// ASCII. The path is kept as sent, with invalid UTF-8 replaced.
fn parse_request_line(line: &[u8]) -> Result<(Method, String), ParseError> {
    let mut parts = split_tokens(line);

    let method = parts.next().ok_or(ParseError::InvalidStartLine)?;
    let path = parts.next().ok_or(ParseError::InvalidStartLine)?;
    let version = parts.next().ok_or(ParseError::InvalidStartLine)?;
    if parts.next().is_some() {
        return Err(ParseError::InvalidStartLine);
    }

    let method = std::str::from_utf8(method)
        .ok()
        .and_then(Method::from_str)
        .ok_or(ParseError::InvalidMethod)?;
    if version != HTTP_VERSION.as_bytes() {
        return Err(ParseError::InvalidVersion);
    }

    Ok((method, String::from_utf8_lossy(path).into_owned()))
}

/// Header bytes are accepted as-is; invalid UTF-8 is replaced, never rejected.
fn parse_header_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let (key, value) = match line.iter().position(|&b| b == b':') {
        Some(colon) => (&line[..colon], &line[colon + 1..]),
        None => (line, &line[line.len()..]),
    };
    let key = key.trim_ascii();
    let value = value.trim_ascii();

    if key.is_empty() || value.is_empty() {
        return Err(ParseError::InvalidHeader);
    }

    Ok((
        String::from_utf8_lossy(key).into_owned(),
        String::from_utf8_lossy(value).into_owned(),
    ))
}

/// Strict decimal parse: no sign, no whitespace, no empty string.
pub fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn content_length_is_strictly_decimal() {
        assert_eq!(parse_content_length("42"), Ok(42));
        assert_eq!(parse_content_length("0"), Ok(0));
        assert!(parse_content_length("").is_err());
        assert!(parse_content_length("+5").is_err());
        assert!(parse_content_length("-1").is_err());
        assert!(parse_content_length("5 ").is_err());
        assert!(parse_content_length("0x10").is_err());
        assert!(parse_content_length("99999999999999999999999999").is_err());
    }

    #[test]
    fn header_line_trims_key_and_value() {
        let (k, v) = parse_header_line(b"  Host :   example.com  ").unwrap();
        assert_eq!(k, "Host");
        assert_eq!(v, "example.com");
    }

    #[test]
    fn header_value_may_contain_colons() {
        let (k, v) = parse_header_line(b"Host: localhost:4221").unwrap();
        assert_eq!(k, "Host");
        assert_eq!(v, "localhost:4221");
    }

    #[test]
    fn header_line_without_colon_is_rejected() {
        assert_eq!(
            parse_header_line(b"BrokenHeader"),
            Err(ParseError::InvalidHeader)
        );
    }

    #[test]
    fn request_line_tolerates_whitespace_runs() {
        let (method, path) = parse_request_line(b"GET   /a \t HTTP/1.1").unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/a");
    }

    #[test]
    #[should_panic(expected = "unfinished request")]
    fn take_request_before_finished_panics() {
        let mut parser = RequestParser::new();
        parser.take_request();
    }
}
