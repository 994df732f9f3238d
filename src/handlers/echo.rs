use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::router::Handler;

const ECHO_PREFIX: &str = "/echo/";

/// `GET /echo/<text>` returns `<text>` verbatim as `text/plain`.
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn matches(&self, request: &Request) -> bool {
        request.method == Method::GET && request.path.starts_with(ECHO_PREFIX)
    }

    fn handle(&self, request: &Request) -> Response {
        let text = request.path.strip_prefix(ECHO_PREFIX).unwrap_or_default();
        Response::text(text.as_bytes())
    }
}
