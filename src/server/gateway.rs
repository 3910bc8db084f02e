//! Per-request dispatch: forward matched paths, serve the rest locally.

use std::sync::Arc;

use crate::config::Config;
use crate::http::parser::MAX_BODY_BYTES;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::ProxyHandler;
use crate::routing::{Resolution, RuleTable};
use crate::server::static_files::StaticFiles;

/// Everything a connection needs to answer a request. Shared read-only.
#[derive(Debug, Clone)]
pub struct Gateway {
    table: Arc<RuleTable>,
    proxy: ProxyHandler,
    static_files: Option<StaticFiles>,
    max_body_bytes: usize,
}

impl Gateway {
    pub fn new(table: Arc<RuleTable>, proxy: ProxyHandler, static_files: Option<StaticFiles>) -> Self {
        Self {
            table,
            proxy,
            static_files,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn from_config(cfg: &Config, table: Arc<RuleTable>) -> Self {
        Self::new(
            table,
            ProxyHandler::from_config(&cfg.server),
            cfg.static_files.as_ref().map(StaticFiles::from_config),
        )
        .with_max_body_bytes(cfg.server.max_body_bytes)
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Request body limit applied while reading requests.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub async fn handle(&self, request: &Request) -> Response {
        match self.table.resolve(request.path()) {
            Ok(Resolution::Matched(route)) => self.proxy.forward(request, &route).await,

            Ok(Resolution::NoMatch) => match &self.static_files {
                Some(files) => files.serve(request).await,
                None => {
                    tracing::debug!(path = request.path(), "No rule matched and no static root");
                    Response::not_found()
                }
            },

            Err(e) => {
                tracing::warn!(target_uri = %request.target, error = %e, "Rejected request");
                Response::bad_request(&e.to_string())
            }
        }
    }
}
