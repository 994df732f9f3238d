//! Ordered, first-match request dispatch.
//!
//! ```text
//! Request → Router → (first Handler whose `matches` is true) → Response
//!                  └─ none matched ──────────────────────────→ 404
//! ```
//!
//! Registration order is precedence: a broad handler registered early
//! shadows narrower ones registered after it.

use crate::http::request::Request;
use crate::http::response::Response;

/// A pluggable request handler.
pub trait Handler {
    /// Whether this handler claims the request.
    fn matches(&self, request: &Request) -> bool;

    /// Produces the response for a request this handler claimed.
    fn handle(&self, request: &Request) -> Response;
}

#[derive(Default)]
pub struct Router {
    handlers: Vec<Box<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Appends a handler. Handlers are tried in the order they were added.
    pub fn add_handler<H: Handler + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Dispatches to the first matching handler, or answers 404.
    pub fn route(&self, request: &Request) -> Response {
        self.handlers
            .iter()
            .find(|h| h.matches(request))
            .map(|h| h.handle(request))
            .unwrap_or_else(Response::not_found)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
