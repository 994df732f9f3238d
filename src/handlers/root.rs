use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::router::Handler;

/// `GET /` answers an empty 200.
pub struct RootHandler;

impl Handler for RootHandler {
    fn matches(&self, request: &Request) -> bool {
        request.method == Method::GET && request.path == "/"
    }

    fn handle(&self, _request: &Request) -> Response {
        Response::ok(Vec::new())
    }
}
