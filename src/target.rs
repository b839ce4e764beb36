//! Server URL decomposition.
//!
//! Supports formats:
//! - `http://host` and `https://host` (scheme-implied port 80 / 443, path `/`)
//! - `http://host:port/path` (explicit port overrides the scheme default)
//!
//! This is a deliberately small parser: no IPv6 brackets, no percent-decoding,
//! no host validation. A non-numeric `:port` suffix yields port 0, which the
//! transport layer refuses to connect to.

use std::fmt;
use thiserror::Error;

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid URL: protocol (http:// or https://) is missing")]
    MissingScheme,
}

/// Connection destination parsed out of a server URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ServerTarget {
    pub fn parse(url: &str) -> Result<Self, ParseError> {
        parse_server_url(url)
    }

    /// `host:port` form used for socket address resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

impl std::str::FromStr for ServerTarget {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        parse_server_url(s)
    }
}

/// Split a base URL into host, port and path.
pub fn parse_server_url(url: &str) -> Result<ServerTarget, ParseError> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix(HTTPS_PREFIX) {
        (DEFAULT_HTTPS_PORT, rest)
    } else if let Some(rest) = url.strip_prefix(HTTP_PREFIX) {
        (DEFAULT_HTTP_PORT, rest)
    } else {
        return Err(ParseError::MissingScheme);
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, lenient_port(port)),
        None => (authority, default_port),
    };

    Ok(ServerTarget {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// Leading-digit integer parse. Anything that does not start with a digit, or
/// does not fit a TCP port, becomes 0.
fn lenient_port(raw: &str) -> u16 {
    let digits = raw
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(idx, c)| &raw[..idx + c.len_utf8()])
        .unwrap_or("");
    digits.parse::<u16>().unwrap_or(0)
}
