//! File-backed routes under `/files/`.
//!
//! The file name is joined onto the configured directory as-is. Names
//! containing `..` or path separators are not rejected, so a client can
//! reach outside the directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::Handler;

const FILES_PREFIX: &str = "/files/";

/// Serves (`GET`) or stores (`POST`) files in one directory.
pub struct FileHandler {
    directory: PathBuf,
    method: Method,
}

impl FileHandler {
    /// `GET /files/<name>`: 200 with the file contents, 404 when unavailable.
    pub fn get(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            method: Method::GET,
        }
    }

    /// `POST /files/<name>`: 201 after writing the body, 422 when it cannot be stored.
    pub fn post(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            method: Method::POST,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name<'a>(&self, request: &'a Request) -> Option<&'a str> {
        request
            .path
            .strip_prefix(FILES_PREFIX)
            .filter(|name| !name.is_empty())
    }

    fn read(&self, name: &str) -> Response {
        if !self.directory.is_dir() {
            return Response::not_found();
        }
        let path = self.directory.join(name);
        if !path.is_file() {
            return Response::not_found();
        }

        match fs::read(&path) {
            Ok(contents) => ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Type", "application/octet-stream")
                .body(contents)
                .build(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to read file");
                Response::not_found()
            }
        }
    }

    fn write(&self, name: &str, body: &[u8]) -> Response {
        if !self.directory.is_dir() {
            return Response::unprocessable();
        }
        let path = self.directory.join(name);

        match fs::write(&path, body) {
            Ok(()) => Response::created(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to write file");
                Response::unprocessable()
            }
        }
    }
}

impl Handler for FileHandler {
    fn matches(&self, request: &Request) -> bool {
        request.method == self.method && self.file_name(request).is_some()
    }

    fn handle(&self, request: &Request) -> Response {
        let Some(name) = self.file_name(request) else {
            return Response::not_found();
        };

        match self.method {
            Method::GET => self.read(name),
            Method::POST => self.write(name, &request.body),
        }
    }
}
