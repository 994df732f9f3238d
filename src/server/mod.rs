//! Single-threaded readiness reactor.
//!
//! One [`Poll`] multiplexes the listening socket and every client socket.
//! mio registrations are edge-triggered, so each wake-up drains its source:
//! the listener until `accept` would block, a client until `read` would block
//! or its request is complete.
//!
//! Nothing here bounds a client: there is no idle timeout, no body size cap
//! and no connection limit. A client that reads a lot in one wake-up delays
//! the others handled in the same batch.

pub mod listener;

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::http::connection::{Connection, ConnectionState};
use crate::router::Router;
use listener::Accepted;

const LISTENER: Token = Token(0);
const EVENTS_CAPACITY: usize = 128;
/// Upper bound on the wait after a listener-level accept failure. The listener
/// edge was consumed, so the queue is retried on the next pass instead.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection<TcpStream>>,
    router: Router,
    next_token: usize,
    accept_stalled: bool,
}

impl Server {
    /// Binds the listening socket and registers it with a fresh poller.
    pub fn bind(addr: SocketAddr, router: Router) -> anyhow::Result<Self> {
        let poll = Poll::new().context("Failed to create readiness poller")?;
        let mut listener = listener::bind(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("Failed to register listening socket")?;

        info!("Listening on {}", listener.local_addr().unwrap_or(addr));

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            router,
            next_token: LISTENER.0 + 1,
            accept_stalled: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of clients currently registered.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs the event loop forever. Wait errors are logged and retried.
    pub fn run(&mut self) -> ! {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            if let Err(e) = self.poll_once(&mut events, None) {
                if e.kind() != ErrorKind::Interrupted {
                    warn!(error = %e, "Waiting for readiness failed, retrying");
                }
            }
        }
    }

    /// Waits for readiness once (up to `timeout`) and dispatches every event.
    ///
    /// If the previous accept pass stopped on a listener-level error, the wait
    /// is capped at `ACCEPT_RETRY_DELAY` and the accept queue is drained again
    /// even without a fresh listener event.
    pub fn poll_once(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let retry_accept = std::mem::take(&mut self.accept_stalled);
        let timeout = if retry_accept {
            Some(timeout.map_or(ACCEPT_RETRY_DELAY, |t| t.min(ACCEPT_RETRY_DELAY)))
        } else {
            timeout
        };

        if let Err(e) = self.poll.poll(events, timeout) {
            self.accept_stalled |= retry_accept;
            return Err(e);
        }

        let mut accepted = false;
        for event in events.iter() {
            match event.token() {
                LISTENER => {
                    accepted = true;
                    self.accept_connections();
                }
                token => self.process_connection(token),
            }
        }

        if retry_accept && !accepted {
            self.accept_connections();
        }

        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match listener::accept_one(&self.listener) {
                Accepted::Connection(mut stream, peer) => {
                    let token = self.next_token();
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(peer = %peer, error = %e, "Failed to register connection");
                        continue;
                    }
                    debug!(peer = %peer, token = ?token, "Accepted connection");
                    self.connections.insert(token, Connection::new(stream, peer));
                }
                Accepted::Skipped => continue,
                Accepted::Drained => break,
                Accepted::Stalled(e) => {
                    warn!(error = %e, "Accept failed, retrying shortly");
                    self.accept_stalled = true;
                    break;
                }
            }
        }
    }

    fn process_connection(&mut self, token: Token) {
        // Events for a connection closed earlier in the same batch are stale.
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let mut state = conn.on_readable();
        if state == ConnectionState::Complete {
            state = conn.respond(&self.router);
        }

        if state == ConnectionState::Closed {
            self.close_connection(token);
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                debug!(peer = %conn.peer(), error = %e, "Deregister failed");
            }
            debug!(peer = %conn.peer(), token = ?token, "Connection closed");
        }
    }

    fn next_token(&mut self) -> Token {
        loop {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1);
            if token != LISTENER && token.0 != usize::MAX && !self.connections.contains_key(&token)
            {
                return token;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::default_router;

    fn bind_loopback() -> Server {
        Server::bind("127.0.0.1:0".parse().unwrap(), default_router(None)).unwrap()
    }

    #[test]
    fn stalled_accept_is_retried_without_a_new_listener_event() {
        let mut server = bind_loopback();
        let addr = server.local_addr().unwrap();
        let mut events = Events::with_capacity(16);

        let _client = std::net::TcpStream::connect(addr).unwrap();

        // Swallow the listener edge without accepting, as a failed pass would.
        let mut seen = false;
        for _ in 0..50 {
            server
                .poll
                .poll(&mut events, Some(Duration::from_millis(100)))
                .unwrap();
            if events.iter().any(|e| e.token() == LISTENER) {
                seen = true;
                break;
            }
        }
        assert!(seen);
        assert_eq!(server.connection_count(), 0);

        server.accept_stalled = true;
        server.poll_once(&mut events, None).unwrap();

        assert_eq!(server.connection_count(), 1);
        assert!(!server.accept_stalled);
    }

    #[test]
    fn no_retry_when_accept_is_healthy() {
        let mut server = bind_loopback();
        let mut events = Events::with_capacity(16);

        server
            .poll_once(&mut events, Some(Duration::from_millis(10)))
            .unwrap();

        assert_eq!(server.connection_count(), 0);
        assert!(!server.accept_stalled);
    }
}
