use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::target::ServerTarget;
use crate::transport::{TlsVerification, TransportSettings};
use crate::upload::{UploadSettings, DEFAULT_MAX_RESPONSE_BYTES};

const DEFAULT_SERVER_URL: &str = "http://192.168.1.100:8000/api/vision/logs/";
const DEFAULT_DELAY_SECS: u64 = 10;
const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DRAIN_IDLE_MS: u64 = 500;
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FLUSH_FRAMES: u32 = 2;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct DualshotConfigFile {
    server_url: Option<String>,
    api_key: Option<String>,
    delay_secs: Option<u64>,
    response: Option<ResponseConfigFile>,
    transport: Option<TransportConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseConfigFile {
    timeout_secs: Option<u64>,
    drain_idle_ms: Option<u64>,
    max_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TransportConfigFile {
    connect_timeout_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
    tls: Option<TlsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TlsConfigFile {
    verify: Option<String>,
    ca_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    flush_frames: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: String,
    /// Parsed form of `server_url`, filled in by validation.
    pub target: ServerTarget,
    pub api_key: Option<String>,
    pub delay: Duration,
    pub response_timeout: Duration,
    pub drain_idle: Duration,
    pub max_response_bytes: usize,
    pub transport: TransportSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    /// Stale frames discarded before each capture.
    pub flush_frames: u32,
    pub width: u32,
    pub height: u32,
    /// HTTP snapshot timeout.
    pub timeout: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            flush_frames: DEFAULT_FLUSH_FRAMES,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            timeout: Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Defaults, then `DUALSHOT_CONFIG` (TOML by extension, JSON otherwise),
    /// then `DUALSHOT_*` environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DUALSHOT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            server_url: self.server_url.clone(),
            api_key: self.api_key.clone(),
            response_timeout: self.response_timeout,
            drain_idle: self.drain_idle,
            max_response_bytes: self.max_response_bytes,
        }
    }

    fn from_file(file: DualshotConfigFile) -> Result<Self> {
        let server_url = file
            .server_url
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let api_key = file.api_key.filter(|key| !key.trim().is_empty());
        let delay = Duration::from_secs(file.delay_secs.unwrap_or(DEFAULT_DELAY_SECS));

        let response = file.response.unwrap_or_default();
        let response_timeout = Duration::from_secs(
            response
                .timeout_secs
                .unwrap_or(DEFAULT_RESPONSE_TIMEOUT_SECS),
        );
        let drain_idle =
            Duration::from_millis(response.drain_idle_ms.unwrap_or(DEFAULT_DRAIN_IDLE_MS));
        let max_response_bytes = response.max_bytes.unwrap_or(DEFAULT_MAX_RESPONSE_BYTES);

        let transport_file = file.transport.unwrap_or_default();
        let tls = match transport_file.tls {
            Some(tls) => tls_verification(tls.verify.as_deref(), tls.ca_path)?,
            None => TlsVerification::default(),
        };
        let transport = TransportSettings {
            connect_timeout: Duration::from_secs(
                transport_file
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            write_timeout: Duration::from_secs(
                transport_file
                    .write_timeout_secs
                    .unwrap_or(DEFAULT_WRITE_TIMEOUT_SECS),
            ),
            tls,
        };

        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            flush_frames: source_file.flush_frames.unwrap_or(DEFAULT_FLUSH_FRAMES),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
            timeout: Duration::from_secs(
                source_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS),
            ),
        };

        Ok(Self {
            target: ServerTarget::default(),
            server_url,
            api_key,
            delay,
            response_timeout,
            drain_idle,
            max_response_bytes,
            transport,
            source,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DUALSHOT_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = url.trim().to_string();
            }
        }
        if let Ok(key) = std::env::var("DUALSHOT_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(delay) = std::env::var("DUALSHOT_DELAY_SECS") {
            let seconds: u64 = delay.trim().parse().map_err(|_| {
                anyhow!("DUALSHOT_DELAY_SECS must be an integer number of seconds")
            })?;
            self.delay = Duration::from_secs(seconds);
        }
        if let Ok(timeout) = std::env::var("DUALSHOT_RESPONSE_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("DUALSHOT_RESPONSE_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.response_timeout = Duration::from_secs(seconds);
        }
        if let Ok(url) = std::env::var("DUALSHOT_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url.trim().to_string();
            }
        }
        let env_ca = std::env::var("DUALSHOT_TLS_CA")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let env_mode = std::env::var("DUALSHOT_TLS_VERIFY")
            .ok()
            .filter(|mode| !mode.trim().is_empty());
        match (env_mode, env_ca) {
            (Some(mode), ca_path) => {
                let ca_path = ca_path.or_else(|| match &self.transport.tls {
                    TlsVerification::CustomCa(path) => Some(path.clone()),
                    _ => None,
                });
                self.transport.tls = tls_verification(Some(mode.as_str()), ca_path)?;
            }
            (None, Some(ca_path)) => {
                self.transport.tls = tls_verification(None, Some(ca_path))?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let target = ServerTarget::parse(&self.server_url)
            .map_err(|e| anyhow!("invalid server_url '{}': {}", self.server_url, e))?;
        if target.host.is_empty() {
            return Err(anyhow!("server_url '{}' has no host", self.server_url));
        }
        if target.port == 0 {
            return Err(anyhow!(
                "server_url '{}' has an invalid port",
                self.server_url
            ));
        }
        self.target = target;

        if self.response_timeout.is_zero() {
            return Err(anyhow!("response timeout must be greater than zero"));
        }
        if self.drain_idle.is_zero() {
            return Err(anyhow!("response drain idle time must be greater than zero"));
        }
        if self.transport.connect_timeout.is_zero() {
            return Err(anyhow!("connect timeout must be greater than zero"));
        }
        if self.transport.write_timeout.is_zero() {
            return Err(anyhow!("write timeout must be greater than zero"));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        Ok(())
    }
}

fn tls_verification(mode: Option<&str>, ca_path: Option<PathBuf>) -> Result<TlsVerification> {
    match mode.map(|m| m.trim().to_lowercase()) {
        Some(mode) if mode == "ca" => ca_path
            .map(TlsVerification::CustomCa)
            .ok_or_else(|| anyhow!("TLS verification 'ca' requires ca_path")),
        Some(mode) => mode.parse(),
        None => Ok(ca_path
            .map(TlsVerification::CustomCa)
            .unwrap_or_default()),
    }
}

fn read_config_file(path: &Path) -> Result<DualshotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
