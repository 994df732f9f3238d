//! The built-in route surface.
//!
//! | Route                | Handler            |
//! |----------------------|--------------------|
//! | `GET /`              | [`RootHandler`]    |
//! | `GET /echo/<text>`   | [`EchoHandler`]    |
//! | `GET /user-agent`    | [`UserAgentHandler`] |
//! | `GET /files/<name>`  | [`FileHandler`]    |
//! | `POST /files/<name>` | [`FileHandler`]    |

pub mod echo;
pub mod files;
pub mod root;
pub mod user_agent;

use std::path::PathBuf;

pub use echo::EchoHandler;
pub use files::FileHandler;
pub use root::RootHandler;
pub use user_agent::UserAgentHandler;

use crate::router::Router;

/// Builds the router with every built-in handler in precedence order.
///
/// File routes are only registered when a directory is configured.
pub fn default_router(directory: Option<PathBuf>) -> Router {
    let mut router = Router::new();
    router
        .add_handler(RootHandler)
        .add_handler(EchoHandler)
        .add_handler(UserAgentHandler);

    if let Some(dir) = directory {
        router
            .add_handler(FileHandler::get(dir.clone()))
            .add_handler(FileHandler::post(dir));
    }

    router
}
