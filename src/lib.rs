//! Lantern - minimal HTTP/1.1 server
//!
//! A single-threaded, readiness-driven server: one event loop multiplexes
//! non-blocking client sockets, each feeding an incremental request parser.

pub mod config;
pub mod handlers;
pub mod http;
pub mod router;
pub mod server;
