use crate::http::chunked::{self, ChunkedError};
use crate::http::request::{Method, Request};

/// Upper bound on the request line plus headers.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Default upper bound on a request body, after dechunking.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Room for chunk size lines and trailers on top of the body limit.
const CHUNK_FRAMING_SLACK: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    InvalidChunkedBody,
    UnsupportedTransferEncoding,
    HeadersTooLarge,
    BodyTooLarge,
    Incomplete,
}

/// Parses one request from the front of `buf` with the default body limit.
///
/// Returns the request and the number of bytes it occupied, or
/// `ParseError::Incomplete` when more data is needed.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_limited(buf, MAX_BODY_BYTES)
}

/// Like [`parse_http_request`], rejecting bodies over `max_body` bytes.
///
/// A declared `Content-Length` over the limit fails as soon as the headers
/// are in, without waiting for the body. Chunked bodies are decoded here, so
/// `Request::body` always holds the payload and the whole chunked message is
/// consumed.
pub fn parse_http_request_limited(
    buf: &[u8],
    max_body: usize,
) -> Result<(Request, usize), ParseError> {
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEADER_BYTES => return Err(ParseError::HeadersTooLarge),
        None => return Err(ParseError::Incomplete),
    };
    if headers_end > MAX_HEADER_BYTES {
        return Err(ParseError::HeadersTooLarge);
    }

    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str =
        std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers = Vec::new();
    let mut content_length = None;
    let mut transfer_encoding: Option<String> = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim();
        let value = value.trim();

        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }
        if key.eq_ignore_ascii_case("Content-Length") {
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| ParseError::InvalidContentLength)?,
            );
        }
        if key.eq_ignore_ascii_case("Transfer-Encoding") {
            let codings = transfer_encoding.get_or_insert_with(String::new);
            if !codings.is_empty() {
                codings.push(',');
            }
            codings.push_str(value);
        }

        headers.push((key.to_string(), value.to_string()));
    }

    // Transfer-Encoding wins over Content-Length when both are present.
    let (body, body_len) = match transfer_encoding {
        Some(codings) => {
            if !is_chunked_only(&codings) {
                return Err(ParseError::UnsupportedTransferEncoding);
            }
            match chunked::decode(body_bytes, max_body) {
                Ok(decoded) => decoded,
                Err(ChunkedError::Incomplete)
                    if body_bytes.len() > max_body.saturating_add(CHUNK_FRAMING_SLACK) =>
                {
                    return Err(ParseError::BodyTooLarge);
                }
                Err(ChunkedError::Incomplete) => return Err(ParseError::Incomplete),
                Err(ChunkedError::Invalid) => return Err(ParseError::InvalidChunkedBody),
                Err(ChunkedError::TooLarge) => return Err(ParseError::BodyTooLarge),
            }
        }
        None => {
            let content_length = content_length.unwrap_or(0);
            if content_length > max_body {
                return Err(ParseError::BodyTooLarge);
            }
            if body_bytes.len() < content_length {
                return Err(ParseError::Incomplete);
            }
            (body_bytes[..content_length].to_vec(), content_length)
        }
    };

    let request = Request {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    Ok((request, headers_end + 4 + body_len))
}

/// `chunked` must be the one and only coding; anything else can't be framed.
fn is_chunked_only(codings: &str) -> bool {
    let mut codings = codings.split(',').map(str::trim).filter(|c| !c.is_empty());
    matches!(
        (codings.next(), codings.next()),
        (Some(c), None) if c.eq_ignore_ascii_case("chunked")
    )
}

pub(crate) fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
