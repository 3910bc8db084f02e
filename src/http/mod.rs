//! Minimal HTTP/1.1 server side.
//!
//! # Architecture
//!
//! - **`connection`**: per-client request/response state machine
//! - **`parser`**: parses requests out of a byte buffer
//! - **`chunked`**: chunked transfer-coding decoder
//! - **`request`**: request representation and target splitting
//! - **`response`**: response representation with builder
//! - **`writer`**: serializes and writes responses
//! - **`mime`**: Content-Type by file extension
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received (malformed → 400, body over limit → 413,
//!               │ unknown transfer coding → 501; then Closed)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Resolve, then forward or serve locally
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod chunked;
pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
