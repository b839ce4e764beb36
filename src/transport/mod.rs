//! Outbound byte streams for uploads.
//!
//! The orchestrator only sees two traits:
//! - `Connector`: opens one stream to a `ServerTarget`.
//! - `UploadStream`: a bidirectional byte stream with a read timeout and an explicit close.
//!
//! `NetConnector` is the real implementation. It selects plaintext TCP or TLS from
//! the target port (443 means TLS), makes a single connection attempt, and never
//! retries.

mod tls;

pub use tls::{build_client_config, TlsVerification};

use anyhow::Result;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::target::{ServerTarget, DEFAULT_HTTPS_PORT};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConnectError {
    /// Port 0 comes from a malformed `:port` suffix in the server URL.
    #[error("refusing to connect to {host}: port 0 (malformed port in server URL?)")]
    InvalidPort { host: String },

    #[error("{host}:{port} unreachable: {source}")]
    Unreachable {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("TLS session with {host} failed: {reason}")]
    Tls { host: String, reason: String },
}

/// A connected, bidirectional byte stream.
pub trait UploadStream: Read + Write {
    /// Bound how long a single `read` may block. `None` blocks indefinitely.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close the stream. Called once, after which the stream is dropped.
    fn close(&mut self) -> io::Result<()>;
}

/// Opens streams to upload targets.
pub trait Connector {
    type Stream: UploadStream;

    fn connect(&self, target: &ServerTarget) -> Result<Self::Stream, ConnectError>;
}

impl<C: Connector + ?Sized> Connector for &C {
    type Stream = C::Stream;

    fn connect(&self, target: &ServerTarget) -> Result<Self::Stream, ConnectError> {
        (**self).connect(target)
    }
}

/// Which socket implementation a target gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Plain,
    Tls,
}

impl TransportKind {
    /// Port-based selection: 443 uses TLS, everything else is plaintext.
    pub fn for_port(port: u16) -> Self {
        if port == DEFAULT_HTTPS_PORT {
            Self::Tls
        } else {
            Self::Plain
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
        }
    }
}

/// Socket settings for `NetConnector`.
#[derive(Clone, Debug)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub tls: TlsVerification,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            tls: TlsVerification::default(),
        }
    }
}

/// TCP / rustls connector.
pub struct NetConnector {
    connect_timeout: Duration,
    write_timeout: Duration,
    tls_config: Arc<ClientConfig>,
}

impl NetConnector {
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        let tls_config = build_client_config(&settings.tls)?;
        if settings.tls == TlsVerification::Disabled {
            log::debug!("TLS certificate verification disabled");
        }
        Ok(Self {
            connect_timeout: settings.connect_timeout,
            write_timeout: settings.write_timeout,
            tls_config: Arc::new(tls_config),
        })
    }

    /// Open a stream of an explicit kind, bypassing port-based selection.
    pub fn open(&self, kind: TransportKind, target: &ServerTarget) -> Result<NetStream, ConnectError> {
        let tcp = self.connect_tcp(target)?;
        match kind {
            TransportKind::Plain => Ok(NetStream::Plain(tcp)),
            TransportKind::Tls => self.wrap_tls(&target.host, tcp),
        }
    }

    fn connect_tcp(&self, target: &ServerTarget) -> Result<TcpStream, ConnectError> {
        if target.port == 0 {
            return Err(ConnectError::InvalidPort {
                host: target.host.clone(),
            });
        }
        let unreachable = |source: io::Error| ConnectError::Unreachable {
            host: target.host.clone(),
            port: target.port,
            source,
        };

        let addrs = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(unreachable)?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_write_timeout(Some(self.write_timeout))
                        .map_err(unreachable)?;
                    if let Err(err) = stream.set_nodelay(true) {
                        log::debug!("set TCP_NODELAY on {} failed: {}", addr, err);
                    }
                    return Ok(stream);
                }
                Err(err) => {
                    log::debug!("connect to {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }
        Err(unreachable(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    fn wrap_tls(&self, host: &str, mut tcp: TcpStream) -> Result<NetStream, ConnectError> {
        let tls_err = |reason: String| ConnectError::Tls {
            host: host.to_string(),
            reason,
        };
        let server_name = ServerName::try_from(host.to_string()).map_err(|e| tls_err(e.to_string()))?;
        let mut conn = ClientConnection::new(self.tls_config.clone(), server_name)
            .map_err(|e| tls_err(e.to_string()))?;

        tcp.set_read_timeout(Some(self.connect_timeout))
            .map_err(|e| tls_err(e.to_string()))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)
                .map_err(|e| tls_err(format!("handshake: {}", e)))?;
        }
        Ok(NetStream::Tls(Box::new(StreamOwned::new(conn, tcp))))
    }
}

impl Connector for NetConnector {
    type Stream = NetStream;

    fn connect(&self, target: &ServerTarget) -> Result<NetStream, ConnectError> {
        let kind = TransportKind::for_port(target.port);
        log::info!(
            "connecting to host: {}, port: {} ({})",
            target.host,
            target.port,
            kind
        );
        self.open(kind, target)
    }
}

/// Plaintext or TLS socket.
pub enum NetStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl NetStream {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Plain(_) => TransportKind::Plain,
            Self::Tls(_) => TransportKind::Tls,
        }
    }

    fn socket(&self) -> &TcpStream {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(stream) => &stream.sock,
        }
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NetStream").field(&self.kind()).finish()
    }
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(tcp) => tcp.read(buf),
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(tcp) => tcp.write(buf),
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(tcp) => tcp.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }
}

impl UploadStream for NetStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket().set_read_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Self::Tls(stream) = self {
            stream.conn.send_close_notify();
            if let Err(err) = stream.flush() {
                log::debug!("flush close_notify failed: {}", err);
            }
        }
        match self.socket().shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
