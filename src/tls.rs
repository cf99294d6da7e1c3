//! TLS transport for HTTP/2 connections
//!
//! Client-side TLS over OpenSSL. HTTP/2 over TLS requires ALPN: the client
//! offers `h2` during the handshake and the connection is only usable if
//! the server selects it (RFC 7540 Section 3.3).

use crate::error::{Error, Result};
use crate::session::SessionOps;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslStream, SslVerifyMode, SslVersion};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

/// The ALPN protocol identifier for HTTP/2 over TLS
pub const ALPN_H2: &[u8] = b"h2";

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    fn to_openssl_version(self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Client TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    ctx: SslContext,
    servername: Option<String>,
}

impl TlsConfig {
    /// Create a new client configuration builder, with ALPN already set to
    /// offer `h2`.
    pub fn client() -> TlsConfigBuilder {
        TlsConfigBuilder::new()
    }

    /// Connect and complete the TLS handshake over an established TCP
    /// stream.
    pub fn connect(&self, stream: TcpStream) -> std::result::Result<TlsSessionOps, TlsError> {
        TlsSessionOps::connect(stream, self.clone())
    }
}

/// Client TLS configuration builder
pub struct TlsConfigBuilder {
    ctx_builder: SslContextBuilder,
    servername: Option<String>,
}

impl TlsConfigBuilder {
    fn new() -> Self {
        let mut ctx_builder =
            SslContextBuilder::new(SslMethod::tls_client()).expect("failed to create SSL context");

        // Peer verification is off by default, matching the reference
        // client's behavior against self-signed test servers.
        ctx_builder.set_verify(SslVerifyMode::NONE);

        let mut builder = TlsConfigBuilder {
            ctx_builder,
            servername: None,
        };
        builder.set_alpn(&[ALPN_H2]);
        builder
    }

    /// Set TLS version (both minimum and maximum)
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.ctx_builder
            .set_min_proto_version(Some(version.to_openssl_version()))
            .expect("failed to set min proto version");
        self.ctx_builder
            .set_max_proto_version(Some(version.to_openssl_version()))
            .expect("failed to set max proto version");
        self
    }

    /// Enable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.ctx_builder.set_verify(if verify {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });
        self
    }

    /// Set the SNI server name
    pub fn servername(mut self, name: &str) -> Self {
        self.servername = Some(name.to_string());
        self
    }

    fn set_alpn(&mut self, protocols: &[&[u8]]) {
        // ALPN wire format: length-prefixed protocol names.
        let mut alpn_bytes = Vec::new();
        for proto in protocols {
            alpn_bytes.push(proto.len() as u8);
            alpn_bytes.extend_from_slice(proto);
        }
        self.ctx_builder
            .set_alpn_protos(&alpn_bytes)
            .expect("failed to set ALPN protocols");
    }

    /// Build the configuration
    pub fn build(self) -> std::result::Result<TlsConfig, TlsError> {
        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            servername: self.servername,
        })
    }
}

/// TLS session operations
///
/// Wraps an OpenSSL `SslStream` and implements [`SessionOps`] so the
/// connection engine treats encrypted transports like plain TCP.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
}

impl TlsSessionOps {
    /// Create a client TLS connection (performs the handshake)
    pub fn connect(
        tcp_stream: TcpStream,
        config: TlsConfig,
    ) -> std::result::Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if let Some(ref servername) = config.servername {
            ssl.set_hostname(servername)?;
        }

        let ssl_stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("connection failed: {}", e)))?;

        Ok(TlsSessionOps { stream: ssl_stream })
    }

    /// The protocol the server selected via ALPN, if any
    pub fn negotiated_alpn(&self) -> Option<Vec<u8>> {
        self.stream.ssl().selected_alpn_protocol().map(|p| p.to_vec())
    }

    /// Whether ALPN settled on `h2`
    pub fn is_h2(&self) -> bool {
        self.stream.ssl().selected_alpn_protocol() == Some(ALPN_H2)
    }
}

impl SessionOps for TlsSessionOps {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        let _ = self.stream.shutdown();

        use std::net::Shutdown;
        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.stream.get_ref().as_raw_fd()
    }

    fn pending(&self) -> usize {
        self.stream.ssl().pending()
    }
}
