//! HTTP/1.1 protocol implementation.
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`request`** / **`response`**: the wire value types
//! - **`parser`**: incremental request parser fed from partial socket reads
//! - **`connection`**: per-client state driven by the reactor
//! - **`writer`**: serializes a response and sends it
//!
//! # Connection State Machine
//!
//! Each accepted client handles exactly one request:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← readiness events append bytes and re-run the parser
//!        └──────┬──────┘
//!               │ parser Finished or Error
//!               ▼
//!        ┌──────────────────┐
//!        │    Complete      │ ← route (or 400), single write
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │     Closed       │ ← deregistered and dropped
//!        └──────────────────┘
//! ```
//!
//! Peer hang-up or a read error in `Reading` goes straight to `Closed`.

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
