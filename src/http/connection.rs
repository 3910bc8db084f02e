use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use crate::http::parser::{parse_http_request_limited, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::gateway::Gateway;

const READ_CHUNK: usize = 4096;

pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: Vec<u8>,
    state: ConnectionState,
    gateway: Arc<Gateway>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

enum Incoming {
    Request(Request),
    Malformed(ParseError),
    Eof,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, gateway: Arc<Gateway>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
            state: ConnectionState::Reading,
            gateway,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    Incoming::Request(req) => ConnectionState::Processing(req),
                    Incoming::Malformed(e) => {
                        tracing::warn!(error = ?e, "Rejected request, closing connection");
                        let response = rejection_response(&e);
                        ConnectionState::Writing(ResponseWriter::new(&response, true), false)
                    }
                    Incoming::Eof => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let response = self.gateway.handle(&req).await;
                    let include_body = req.method != Method::HEAD;

                    ConnectionState::Writing(
                        ResponseWriter::new(&response, include_body),
                        keep_alive,
                    )
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<Incoming> {
        loop {
            match parse_http_request_limited(&self.buffer, self.gateway.max_body_bytes()) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Incoming::Request(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => return Ok(Incoming::Malformed(e)),
            }

            let mut temp = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed the connection
                return Ok(Incoming::Eof);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}

/// Response for a request that can't be read; the connection closes after it.
fn rejection_response(error: &ParseError) -> Response {
    match error {
        ParseError::BodyTooLarge => Response::plain(
            StatusCode::PayloadTooLarge,
            "The request body exceeds the configured limit.",
        ),
        ParseError::UnsupportedTransferEncoding => Response::plain(
            StatusCode::NotImplemented,
            "Only the chunked transfer coding is supported.",
        ),
        _ => Response::bad_request("Malformed HTTP request."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_status_follows_parse_error() {
        let status = |e| rejection_response(&e).status;

        assert_eq!(status(ParseError::BodyTooLarge), StatusCode::PayloadTooLarge);
        assert_eq!(
            status(ParseError::UnsupportedTransferEncoding),
            StatusCode::NotImplemented
        );
        assert_eq!(status(ParseError::InvalidChunkedBody), StatusCode::BadRequest);
        assert_eq!(status(ParseError::InvalidMethod), StatusCode::BadRequest);
    }
}
