//! Local fallback for requests no rule forwards.
//!
//! Serves the built single-page app. Paths without a file extension that
//! don't exist on disk get the index document, so client-side routes
//! like `/reviews/42` load the app instead of a 404.

use std::path::{Component, Path, PathBuf};

use crate::config::StaticFilesConfig;
use crate::http::mime;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index: String,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, index: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            index: index.into(),
        }
    }

    pub fn from_config(cfg: &StaticFilesConfig) -> Self {
        Self::new(cfg.root.clone(), cfg.index.clone())
    }

    pub async fn serve(&self, request: &Request) -> Response {
        if !matches!(request.method, Method::GET | Method::HEAD) {
            return Response::method_not_allowed();
        }

        let Some(relative) = sanitize(request.path()) else {
            tracing::debug!(path = request.path(), "Rejected static path");
            return Response::not_found();
        };

        let mut file = self.root.join(&relative);
        if relative.as_os_str().is_empty() || is_dir(&file).await {
            file = file.join(&self.index);
        }

        match tokio::fs::read(&file).await {
            Ok(body) => file_response(&file, body),
            Err(_) if relative.extension().is_none() => self.serve_index().await,
            Err(_) => Response::not_found(),
        }
    }

    async fn serve_index(&self) -> Response {
        let index = self.root.join(&self.index);
        match tokio::fs::read(&index).await {
            Ok(body) => file_response(&index, body),
            Err(e) => {
                tracing::debug!(index = %index.display(), error = %e, "Index document unavailable");
                Response::not_found()
            }
        }
    }
}

fn file_response(path: &Path, body: Vec<u8>) -> Response {
    ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", mime::from_path(path))
        .body(body)
        .build()
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Turns a URL path into a relative filesystem path. `None` for anything
/// that would escape the root.
fn sanitize(url_path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();

    for segment in url_path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." || segment.contains('\\') {
            return None;
        }

        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => out.push(part),
            _ => return None,
        }
    }

    Some(out)
}
