use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::http::parser::{ParserState, RequestParser};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::router::Router;

const READ_CHUNK_SIZE: usize = 1024;

/// One accepted client, carried across readiness events.
///
/// All progress lives in the struct (buffer and parser), so the reactor can
/// call [`on_readable`](Connection::on_readable) any number of times as bytes
/// trickle in. Dropping the connection closes the socket.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    buffer: BytesMut,
    parser: RequestParser,
    state: ConnectionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for more request bytes
    Reading,
    /// Parser reached `Finished` or `Error`; a response is due
    Complete,
    /// Done; the reactor deregisters and drops the connection
    Closed,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            parser: RequestParser::new(),
            state: ConnectionState::Reading,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Bytes read from the socket that the parser has not consumed yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drains the socket until it would block, feeding every chunk to the parser.
    ///
    /// Stops early once the parser finishes or fails. A peer that closes
    /// before that, or a read error, closes the connection with no response.
    pub fn on_readable(&mut self) -> ConnectionState {
        if self.state != ConnectionState::Reading {
            return self.state;
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!(peer = %self.peer, "Peer closed before sending a full request");
                    self.state = ConnectionState::Closed;
                    break;
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    match self.parser.parse(&mut self.buffer) {
                        ParserState::Finished | ParserState::Error => {
                            self.state = ConnectionState::Complete;
                            break;
                        }
                        _ => {}
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Read failed, dropping connection");
                    self.state = ConnectionState::Closed;
                    break;
                }
            }
        }

        self.state
    }

    /// Routes the finished request (or answers 400) and writes the response once.
    pub fn respond(&mut self, router: &Router) -> ConnectionState {
        if self.state != ConnectionState::Complete {
            return self.state;
        }

        let response = match self.parser.state() {
            ParserState::Finished => {
                let request = self.parser.take_request();
                debug!(
                    peer = %self.peer,
                    method = %request.method,
                    path = %request.path,
                    "Request received"
                );
                router.route(&request)
            }
            _ => {
                warn!(peer = %self.peer, error = ?self.parser.error(), "Malformed request");
                Response::bad_request()
            }
        };

        debug!(peer = %self.peer, status = response.status.as_u16(), "Sending response");

        let mut writer = ResponseWriter::new(&response);
        match writer.write_once(&mut self.stream) {
            Ok(_) if !writer.is_complete() => {
                warn!(
                    peer = %self.peer,
                    written = writer.written(),
                    total = writer.len(),
                    "Short write, response truncated"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Failed to write response");
            }
        }

        self.state = ConnectionState::Closed;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::default_router;
    use std::collections::VecDeque;
    use std::io;

    /// In-memory socket: serves scripted reads, then reports `WouldBlock`.
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        write_limit: Option<usize>,
    }

    impl ScriptedStream {
        fn new() -> Self {
            Self {
                reads: VecDeque::new(),
                written: Vec::new(),
                write_limit: None,
            }
        }

        fn push(&mut self, data: &[u8]) {
            self.reads.push_back(Ok(data.to_vec()));
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.reads.push_front(Ok(data.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::from(ErrorKind::WouldBlock)),
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    fn written(conn: &mut Connection<ScriptedStream>) -> String {
        String::from_utf8_lossy(&conn.stream_mut().written).into_owned()
    }

    #[test]
    fn complete_request_in_one_read() {
        let mut stream = ScriptedStream::new();
        stream.push(b"GET /echo/abc HTTP/1.1\r\n\r\n");
        let mut conn = Connection::new(stream, peer());
        assert_eq!(conn.state(), ConnectionState::Reading);

        assert_eq!(conn.on_readable(), ConnectionState::Complete);
        assert_eq!(conn.state(), ConnectionState::Complete);
        assert_eq!(conn.respond(&default_router(None)), ConnectionState::Closed);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            written(&mut conn),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\nabc"
        );
    }

    #[test]
    fn one_byte_per_event_keeps_reading() {
        let request = b"GET /echo/hi HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut conn = Connection::new(ScriptedStream::new(), peer());

        for (i, byte) in request.iter().enumerate() {
            conn.stream_mut().push(&[*byte]);
            let state = conn.on_readable();
            if i + 1 < request.len() {
                assert_eq!(state, ConnectionState::Reading);
            } else {
                assert_eq!(state, ConnectionState::Complete);
            }
        }

        conn.respond(&default_router(None));
        assert!(written(&mut conn).ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn body_split_across_events() {
        let mut conn = Connection::new(ScriptedStream::new(), peer());
        conn.stream_mut()
            .push(b"POST /files/x HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc");
        assert_eq!(conn.on_readable(), ConnectionState::Reading);
        assert_eq!(conn.state(), ConnectionState::Reading);
        assert!(conn.buffered().is_empty());

        conn.stream_mut().push(b"de");
        assert_eq!(conn.on_readable(), ConnectionState::Complete);
    }

    #[test]
    fn malformed_request_gets_400() {
        let mut stream = ScriptedStream::new();
        stream.push(b"GET HTTP/1.1\r\n\r\n");
        let mut conn = Connection::new(stream, peer());

        assert_eq!(conn.on_readable(), ConnectionState::Complete);
        conn.respond(&default_router(None));
        assert_eq!(
            written(&mut conn),
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn peer_close_before_complete_sends_nothing() {
        let mut stream = ScriptedStream::new();
        stream.push(b"GET / HTTP/1.1\r\n");
        stream.push(b"");
        let mut conn = Connection::new(stream, peer());

        assert_eq!(conn.on_readable(), ConnectionState::Closed);
        assert_eq!(conn.respond(&default_router(None)), ConnectionState::Closed);
        assert!(conn.stream_mut().written.is_empty());
    }

    #[test]
    fn read_error_closes_without_response() {
        let mut stream = ScriptedStream::new();
        stream.push(b"GET / HT");
        stream
            .reads
            .push_back(Err(io::Error::from(ErrorKind::ConnectionReset)));
        let mut conn = Connection::new(stream, peer());

        assert_eq!(conn.on_readable(), ConnectionState::Closed);
        assert!(conn.stream_mut().written.is_empty());
    }

    #[test]
    fn interrupted_read_is_retried() {
        let mut stream = ScriptedStream::new();
        stream
            .reads
            .push_back(Err(io::Error::from(ErrorKind::Interrupted)));
        stream.push(b"GET / HTTP/1.1\r\n\r\n");
        let mut conn = Connection::new(stream, peer());

        assert_eq!(conn.on_readable(), ConnectionState::Complete);
    }

    #[test]
    fn stops_reading_once_request_is_complete() {
        let mut stream = ScriptedStream::new();
        stream.push(b"GET / HTTP/1.1\r\n\r\n");
        stream.push(b"GET /second HTTP/1.1\r\n\r\n");
        let mut conn = Connection::new(stream, peer());

        assert_eq!(conn.on_readable(), ConnectionState::Complete);
        assert_eq!(conn.stream_mut().reads.len(), 1);
    }

    #[test]
    fn short_write_is_not_retried() {
        let mut stream = ScriptedStream::new();
        stream.push(b"GET /echo/abcdef HTTP/1.1\r\n\r\n");
        stream.write_limit = Some(8);
        let mut conn = Connection::new(stream, peer());

        conn.on_readable();
        assert_eq!(conn.respond(&default_router(None)), ConnectionState::Closed);
        assert_eq!(written(&mut conn), "HTTP/1.1");
    }
}
