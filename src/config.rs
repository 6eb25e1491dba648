//! Configuration management for Gatehouse.
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML
//! file, then `GATEHOUSE_*` environment variables with `__` separating
//! nested keys (`GATEHOUSE_RATE_LIMITING__WINDOW_SECS=10`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GatehouseError, Result};
use crate::gate::{BearerTokenProbe, RouteConfig, RouteTable, TrustedProxies};
use crate::ratelimit::LimiterConfig;

const ENV_PREFIX: &str = "GATEHOUSE";

/// Main configuration for the Gatehouse service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatehouseConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Proxy trust configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Route classification
    #[serde(default)]
    pub routes: RouteConfig,

    /// Credential verification
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests allowed per window and key
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_secs() -> u64 {
    10
}

fn default_max_requests() -> u32 {
    10
}

/// Proxy trust configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// IP literals of proxies allowed to report the client address
    #[serde(default = "default_trusted_proxies")]
    pub trusted_proxies: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: default_trusted_proxies(),
        }
    }
}

fn default_trusted_proxies() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

/// Credential verification configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token to subject id, file only
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl GatehouseConfig {
    /// Load from defaults, an optional YAML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, environment())
    }

    /// Load from defaults, an optional YAML file and the given environment source.
    pub fn load_from(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        reject_env_tokens(&env)?;
        let config: GatehouseConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document on top of the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatehouseConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting that would otherwise only fail at request time.
    pub fn validate(&self) -> Result<()> {
        self.limiter()?;
        self.trusted_proxies()?;
        self.route_table()?;
        Ok(())
    }

    /// Validated limiter settings.
    pub fn limiter(&self) -> Result<LimiterConfig> {
        LimiterConfig::new(
            self.rate_limiting.window_secs,
            self.rate_limiting.max_requests,
        )
    }

    /// Parsed trusted proxy set.
    pub fn trusted_proxies(&self) -> Result<TrustedProxies> {
        TrustedProxies::parse(&self.proxy.trusted_proxies)
    }

    /// Validated route table.
    pub fn route_table(&self) -> Result<RouteTable> {
        RouteTable::new(self.routes.clone())
    }

    /// Probe backed by the configured token table.
    pub fn auth_probe(&self) -> BearerTokenProbe {
        BearerTokenProbe::new(self.auth.tokens.clone())
    }
}

/// Environment keys are lowercased on the way in, which would corrupt
/// case-sensitive bearer tokens, so `auth` may only come from the file.
fn reject_env_tokens(env: &Environment) -> Result<()> {
    let from_env = Config::builder().add_source(env.clone()).build()?;
    if from_env.get_table("auth").is_ok() {
        return Err(GatehouseError::Config(
            "auth.tokens cannot be set from the environment; use the configuration file"
                .to_string(),
        ));
    }
    Ok(())
}

/// `GATEHOUSE_*` environment source.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("proxy.trusted_proxies")
        .with_list_parse_key("routes.protected")
        .with_list_parse_key("routes.auth")
        .with_list_parse_key("routes.api_prefixes")
        .with_list_parse_key("routes.excluded_prefixes")
        .with_list_parse_key("routes.excluded_extensions")
}
