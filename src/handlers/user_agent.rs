use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::router::Handler;

/// `GET /user-agent` reflects the `User-Agent` header, or 404 without one.
pub struct UserAgentHandler;

impl Handler for UserAgentHandler {
    fn matches(&self, request: &Request) -> bool {
        request.method == Method::GET && request.path == "/user-agent"
    }

    fn handle(&self, request: &Request) -> Response {
        match request.header("User-Agent") {
            Some(agent) => Response::text(agent.as_bytes()),
            None => Response::not_found(),
        }
    }
}
