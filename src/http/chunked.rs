//! `Transfer-Encoding: chunked` decoding, shared by the request parser and
//! the upstream response reader.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedError {
    /// The terminating zero-size chunk has not arrived yet
    Incomplete,
    /// Bad size line or missing CRLF after chunk data
    Invalid,
    /// Decoded payload would exceed the caller's limit
    TooLarge,
}

/// Decodes a chunked body from the front of `data`.
///
/// Returns the payload and the number of bytes consumed, including the
/// zero-size chunk and the trailer section. Chunk extensions and trailers
/// are dropped.
///
/// ```
/// # use devgate::http::chunked::{decode, ChunkedError};
/// let raw = b"5\r\nhello\r\n0\r\n\r\nGET";
/// assert_eq!(decode(raw, 1024), Ok((b"hello".to_vec(), 15)));
/// assert_eq!(decode(b"5\r\nhel", 1024), Err(ChunkedError::Incomplete));
/// ```
pub fn decode(data: &[u8], limit: usize) -> Result<(Vec<u8>, usize), ChunkedError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = find_crlf(&data[pos..]).ok_or(ChunkedError::Incomplete)?;
        let size = parse_size_line(&data[pos..pos + line_end])?;
        pos += line_end + 2;

        if size == 0 {
            // trailer fields, up to an empty line
            loop {
                let end = find_crlf(&data[pos..]).ok_or(ChunkedError::Incomplete)?;
                pos += end + 2;
                if end == 0 {
                    return Ok((body, pos));
                }
            }
        }

        if size > limit.saturating_sub(body.len()) {
            return Err(ChunkedError::TooLarge);
        }
        if data.len() < pos + size + 2 {
            return Err(ChunkedError::Incomplete);
        }

        body.extend_from_slice(&data[pos..pos + size]);
        if &data[pos + size..pos + size + 2] != b"\r\n" {
            return Err(ChunkedError::Invalid);
        }
        pos += size + 2;
    }
}

fn parse_size_line(line: &[u8]) -> Result<usize, ChunkedError> {
    let line = std::str::from_utf8(line).map_err(|_| ChunkedError::Invalid)?;
    let size_hex = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(size_hex, 16).map_err(|_| ChunkedError::Invalid)
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}
