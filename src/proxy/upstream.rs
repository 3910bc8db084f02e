//! Upstream request forwarding
//!
//! Sends a client request to the origin picked by the rule table and relays
//! the response. One connection per request, `Connection: close`, no retries.

use crate::config::ServerConfig;
use crate::http::chunked::{self, ChunkedError};
use crate::http::parser::find_headers_end;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::routing::ResolvedRoute;
use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};
use url::Url;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Upper bound on upstream response headers
const MAX_RESPONSE_HEADER_BYTES: usize = 64 * 1024;

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "TE",
    "Trailer",
    "Upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Forwards resolved requests to their upstream origin
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    connection_timeout: Duration,
    request_timeout: Duration,
}

impl ProxyHandler {
    pub fn new(connection_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connection_timeout,
            request_timeout,
        }
    }

    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self::new(cfg.connect_timeout(), cfg.request_timeout())
    }

    /// Forwards `request` as described by `route` and returns the upstream
    /// response. Failures become 502 / 504 responses.
    pub async fn forward(&self, request: &Request, route: &ResolvedRoute) -> Response {
        tracing::debug!(
            method = request.method.as_str(),
            path = %route.original_path(),
            upstream = %route.target_origin(),
            rewritten = %route.rewritten_path(),
            "Forwarding request upstream"
        );

        match self.proxy_to_origin(request, route).await {
            Ok(response) => {
                tracing::info!(
                    method = request.method.as_str(),
                    path = %route.original_path(),
                    upstream = %route.target_origin(),
                    status = response.status.as_u16(),
                    "Request forwarded"
                );
                response
            }
            Err(e) => {
                let detail = format!("{e:#}");
                tracing::warn!(
                    method = request.method.as_str(),
                    path = %route.original_path(),
                    upstream = %route.target_origin(),
                    error = %detail,
                    "Failed to proxy request"
                );
                self.handle_proxy_error(&e)
            }
        }
    }

    async fn proxy_to_origin(&self, request: &Request, route: &ResolvedRoute) -> Result<Response> {
        let url = Url::parse(route.target_origin()).context("Invalid target origin")?;

        if url.scheme() != "http" {
            anyhow::bail!("Unsupported upstream scheme `{}`", url.scheme());
        }

        let host = url.host_str().context("Target origin missing host")?;
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{}:{}", host, port);

        let stream = timeout(self.connection_timeout, TcpStream::connect(&addr))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {}", addr))?;

        tracing::trace!(upstream = %addr, "Connected to upstream");

        timeout(
            self.request_timeout,
            self.exchange(stream, request, route, &url),
        )
        .await
        .context("Request timeout")?
    }

    async fn exchange(
        &self,
        mut stream: TcpStream,
        request: &Request,
        route: &ResolvedRoute,
        target: &Url,
    ) -> Result<Response> {
        let request_bytes = self.build_upstream_request(request, route, target);
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        self.read_http_response(&mut stream, request.method == Method::HEAD)
            .await
    }

    /// Serializes the outbound request.
    ///
    /// Header fields keep the client's order, repeats included. The body is
    /// always sent with `Content-Length`; a chunked client body was already
    /// decoded by the parser.
    ///
    /// The request line carries the rewritten path plus the client's query.
    /// `Host` is the target authority when the route changes origin, else the
    /// client's own `Host` header.
    pub fn build_upstream_request(
        &self,
        request: &Request,
        route: &ResolvedRoute,
        target: &Url,
    ) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(512 + request.body.len());

        let mut path = route.rewritten_path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = request.query() {
            path.push('?');
            path.push_str(query);
        }

        buffer.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", request.method.as_str(), path).as_bytes(),
        );

        let target_authority = authority(target);
        let host = if route.change_origin() {
            target_authority
        } else {
            request
                .header("Host")
                .map(str::to_string)
                .unwrap_or(target_authority)
        };

        let mut headers: Vec<(&str, String)> = vec![("Host", host)];

        // The body goes out in full with the head, so `Expect: 100-continue`
        // has nothing left to gate.
        for (key, value) in &request.headers {
            if is_hop_by_hop(key)
                || key.eq_ignore_ascii_case("Host")
                || key.eq_ignore_ascii_case("Content-Length")
                || key.eq_ignore_ascii_case("Expect")
            {
                continue;
            }
            headers.push((key.as_str(), value.clone()));
        }

        let had_body_framing = request.header("Content-Length").is_some()
            || request.header("Transfer-Encoding").is_some();
        if !request.body.is_empty() || had_body_framing {
            headers.push(("Content-Length", request.body.len().to_string()));
        }
        headers.push(("Connection", "close".to_string()));

        for (key, value) in &headers {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        buffer.extend_from_slice(b"\r\n");

        if !request.body.is_empty() {
            buffer.extend_from_slice(&request.body);
        }

        buffer
    }

    async fn read_http_response(&self, stream: &mut TcpStream, head_request: bool) -> Result<Response> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        loop {
            if let Some(headers_end) = find_headers_end(&buffer) {
                let headers_bytes = buffer.split_to(headers_end + 4);
                let (status, headers) = parse_response_head(&headers_bytes)?;

                if status.is_interim() {
                    tracing::trace!(status = status.as_u16(), "Skipping interim response");
                    continue;
                }

                let body = if head_request || status.is_bodyless() {
                    Vec::new()
                } else {
                    read_response_body(stream, &mut buffer, &headers).await?
                };

                return Ok(relay_response(status, headers, body, head_request));
            }

            if buffer.len() > MAX_RESPONSE_HEADER_BYTES {
                anyhow::bail!("Response headers too large");
            }

            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                anyhow::bail!("Connection closed before complete response received");
            }
        }
    }

    /// Maps a forwarding failure onto the response sent to the client.
    fn handle_proxy_error(&self, error: &anyhow::Error) -> Response {
        let timed_out = error.chain().any(|cause| cause.is::<Elapsed>());

        if timed_out {
            Response::plain(
                StatusCode::GatewayTimeout,
                "The upstream server did not respond in time.",
            )
        } else {
            Response::plain(
                StatusCode::BadGateway,
                "Failed to reach the upstream server.",
            )
        }
    }
}

/// `host[:port]`, port omitted when it is the scheme default.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parses the status line and header fields of an upstream response.
fn parse_response_head(bytes: &[u8]) -> Result<(StatusCode, Vec<(String, String)>)> {
    let text = std::str::from_utf8(bytes).context("Invalid UTF-8 in response headers")?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().context("Empty response")?;
    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        anyhow::bail!("Invalid status line: {}", status_line);
    }

    let code: u16 = parts
        .next()
        .context("Missing status code")?
        .parse()
        .context("Invalid status code")?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok((StatusCode::from_u16(code), headers))
}

async fn read_response_body(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    headers: &[(String, String)],
) -> Result<Vec<u8>> {
    let chunked = header_value(headers, "Transfer-Encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    if chunked {
        let raw = read_to_close(stream, buffer).await?;
        return match chunked::decode(&raw, usize::MAX) {
            Ok((body, _)) => Ok(body),
            Err(ChunkedError::Incomplete) => anyhow::bail!("Truncated chunked response body"),
            Err(e) => anyhow::bail!("Invalid chunked response body: {:?}", e),
        };
    }

    let Some(content_length) = header_value(headers, "Content-Length") else {
        return read_to_close(stream, buffer).await;
    };
    let content_length: usize = content_length
        .parse()
        .context("Invalid Content-Length in response")?;

    let mut body = Vec::with_capacity(content_length);

    let from_buffer = buffer.len().min(content_length);
    body.extend_from_slice(&buffer[..from_buffer]);
    buffer.advance(from_buffer);

    let mut chunk = [0u8; BUFFER_SIZE];
    while body.len() < content_length {
        let to_read = (content_length - body.len()).min(BUFFER_SIZE);
        let n = stream.read(&mut chunk[..to_read]).await?;

        if n == 0 {
            anyhow::bail!("Connection closed before complete body received");
        }

        body.extend_from_slice(&chunk[..n]);
    }

    Ok(body)
}

async fn read_to_close(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<Vec<u8>> {
    let mut body = buffer.split().to_vec();
    stream.read_to_end(&mut body).await?;
    Ok(body)
}

/// Builds the client-facing response, dropping hop-by-hop fields.
fn relay_response(
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    head_request: bool,
) -> Response {
    let mut builder = ResponseBuilder::new(status);

    for (key, value) in headers {
        if is_hop_by_hop(&key) {
            continue;
        }
        // Body length may change after dechunking; HEAD keeps the upstream value.
        if key.eq_ignore_ascii_case("Content-Length") && !head_request {
            continue;
        }
        builder = builder.append_header(key, value);
    }

    builder.body(body).build()
}
