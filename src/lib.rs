//! h2wire - a client-side HTTP/2 wire engine
//!
//! This crate implements the wire level of an HTTP/2 client over TCP,
//! cleartext or TLS with ALPN `h2`: the binary frame codec (RFC 7540), the
//! HPACK header compression layer (RFC 7541), per-connection stream
//! multiplexing with flow-control bookkeeping, and the connection bring-up
//! sequence (preface + SETTINGS exchange).
//!
//! # Architecture
//!
//! - `codec` / `frames`: the 9-octet frame header and per-type payloads
//! - `hpack`: integer and Huffman coding, static and dynamic tables,
//!   header block encode/decode
//! - `stream`: the RFC 7540 Section 5.1 stream state machine and the
//!   per-connection stream registry with its inbound queues
//! - `flow_control`: signed window bookkeeping at connection and stream
//!   level
//! - `session` / `tls`: the transport abstraction over plain TCP and
//!   OpenSSL
//! - `connection`: bring-up, the background reader and settings-handler
//!   threads, and the request/response API
//!
//! # Example
//!
//! ```no_run
//! use h2wire::dial;
//!
//! # fn main() -> h2wire::Result<()> {
//! let mut conn = dial("127.0.0.1:8080")?;
//! conn.start()?;
//!
//! let response = conn.request("GET", "/", &[("host", "localhost")])?;
//! println!("status: {}", response.status());
//! println!("body: {}", response.body_string()?);
//!
//! conn.close();
//! # Ok(())
//! # }
//! ```
//!
//! Over TLS the server must select `h2` via ALPN:
//!
//! ```no_run
//! use h2wire::dial_tls;
//!
//! # fn main() -> h2wire::Result<()> {
//! let mut conn = dial_tls("example.com:443")?;
//! conn.start()?;
//! let response = conn.get("/")?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod hpack;
pub mod session;
pub mod settings;
pub mod stream;
pub mod tls;

pub use codec::{FrameCodec, FrameHeader, FRAME_HEADER_SIZE, MAX_FRAME_LEN};
pub use connection::{dial, dial_tls, Connection, Response};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameType};
pub use hpack::{HeaderField, HpackDecoder, HpackEncoder};
pub use session::{FdSessionOps, SessionOps};
pub use settings::{Settings, SettingsBuilder, SettingsParameter};
pub use stream::{StreamId, StreamState};
pub use tls::{TlsConfig, TlsSessionOps};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
