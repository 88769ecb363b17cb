use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::RelayError;

// =============================================================================
// File config (figment-deserialized from defaults / pylens.toml / env vars)
// =============================================================================
//
//   pylens.toml:     [upstream]
//                    port = 1337
//
//   env var:         PYLENS_UPSTREAM__PORT=1337   (double underscore = nesting)

pub const DEFAULT_CONFIG_FILE: &str = "pylens.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub upstream: UpstreamFileConfig,
}

/// Browser-facing HTTP listener (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Directory of extra static assets served next to the root page.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            static_dir: None,
        }
    }
}

/// Listener accepting the runtime connection (lives under `[upstream]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
}

impl Default for UpstreamFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_upstream_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    3000
}
fn default_upstream_port() -> u16 {
    1337
}

/// Build a figment that layers: defaults → config file → PYLENS_* env vars.
///
/// A missing config file is not an error; its layer is simply empty.
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("PYLENS_").split("__"))
}

/// Command-line values that take priority over every figment layer.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upstream_host: Option<String>,
    pub upstream_port: Option<u16>,
    pub static_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, fc: &mut FileConfig) {
        if let Some(host) = self.host {
            fc.server.host = host;
        }
        if let Some(port) = self.port {
            fc.server.port = port;
        }
        if let Some(host) = self.upstream_host {
            fc.upstream.host = host;
        }
        if let Some(port) = self.upstream_port {
            fc.upstream.port = port;
        }
        if self.static_dir.is_some() {
            fc.server.static_dir = self.static_dir;
        }
    }
}

// =============================================================================
// Runtime config
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub http_addr: SocketAddr,
    pub upstream_addr: SocketAddr,
    pub static_dir: Option<PathBuf>,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, RelayError> {
        Ok(Self {
            http_addr: socket_addr("server.host", &fc.server.host, fc.server.port)?,
            upstream_addr: socket_addr("upstream.host", &fc.upstream.host, fc.upstream.port)?,
            static_dir: fc.server.static_dir.clone(),
        })
    }

    /// Loopback on ephemeral ports; used by tests.
    pub fn ephemeral() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], 0).into(),
            upstream_addr: ([127, 0, 0, 1], 0).into(),
            static_dir: None,
        }
    }
}

fn socket_addr(field: &str, host: &str, port: u16) -> Result<SocketAddr, RelayError> {
    let ip: IpAddr = match host {
        "localhost" => IpAddr::from([127, 0, 0, 1]),
        other => other
            .parse()
            .map_err(|_| RelayError::Config(format!("{field}: `{other}` is not an IP address")))?,
    };
    Ok(SocketAddr::new(ip, port))
}
