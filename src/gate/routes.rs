//! Route classification.
//!
//! Routes are listed in configuration and matched by exact path or by path
//! prefix on a segment boundary, so `/admin` covers `/admin/users` but not
//! `/administrator`.

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::error::{GatehouseError, Result};

/// How the gate should treat a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteClass {
    /// Requires an authenticated identity
    pub protected: bool,
    /// Sign-in / sign-up pages that authenticated users should skip
    pub auth_only: bool,
    /// API call or state-changing method; subject to rate limiting
    pub api_or_mutating: bool,
}

/// Static route configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Routes that require an authenticated identity
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,

    /// Routes only meant for anonymous users
    #[serde(default = "default_auth")]
    pub auth: Vec<String>,

    /// Prefixes that are always rate limited
    #[serde(default = "default_api_prefixes")]
    pub api_prefixes: Vec<String>,

    /// Static asset prefixes the gate never sees
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,

    /// Static asset file extensions the gate never sees
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// Where unauthenticated users are sent
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,

    /// Where authenticated users land
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            protected: default_protected(),
            auth: default_auth(),
            api_prefixes: default_api_prefixes(),
            excluded_prefixes: default_excluded_prefixes(),
            excluded_extensions: default_excluded_extensions(),
            sign_in_path: default_sign_in_path(),
            landing_path: default_landing_path(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_protected() -> Vec<String> {
    strings(&["/dashboard", "/admin", "/chat"])
}

fn default_auth() -> Vec<String> {
    strings(&["/login", "/register"])
}

fn default_api_prefixes() -> Vec<String> {
    strings(&["/api"])
}

fn default_excluded_prefixes() -> Vec<String> {
    strings(&["/_next/static", "/_next/image", "/favicon.ico", "/static"])
}

fn default_excluded_extensions() -> Vec<String> {
    strings(&[
        "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "css", "js", "map", "woff", "woff2",
    ])
}

fn default_sign_in_path() -> String {
    "/login".to_string()
}

fn default_landing_path() -> String {
    "/dashboard".to_string()
}

/// Validated, ready-to-match route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    config: RouteConfig,
}

impl RouteTable {
    /// Validate `config` and build the table.
    pub fn new(config: RouteConfig) -> Result<Self> {
        let paths = config
            .protected
            .iter()
            .chain(&config.auth)
            .chain(&config.api_prefixes)
            .chain(&config.excluded_prefixes)
            .chain([&config.sign_in_path, &config.landing_path]);

        for path in paths {
            if !path.starts_with('/') {
                return Err(GatehouseError::Config(format!(
                    "routes: '{}' must start with '/'",
                    path
                )));
            }
        }

        Ok(Self { config })
    }

    /// Classify a request.
    pub fn classify(&self, method: &Method, path: &str) -> RouteClass {
        let mutating = !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS);
        RouteClass {
            protected: matches_any(&self.config.protected, path),
            auth_only: matches_any(&self.config.auth, path),
            api_or_mutating: mutating || matches_any(&self.config.api_prefixes, path),
        }
    }

    /// Whether `path` is a static asset that bypasses the gate entirely.
    pub fn is_excluded(&self, path: &str) -> bool {
        if self
            .config
            .excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return true;
        }

        let file = path.rsplit('/').next().unwrap_or(path);
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .config
                .excluded_extensions
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }

    pub fn sign_in_path(&self) -> &str {
        &self.config.sign_in_path
    }

    pub fn landing_path(&self) -> &str {
        &self.config.landing_path
    }
}

fn matches_any(routes: &[String], path: &str) -> bool {
    routes.iter().any(|route| route_matches(route, path))
}

fn route_matches(route: &str, path: &str) -> bool {
    if route == "/" {
        return path == "/";
    }
    let route = route.trim_end_matches('/');
    match path.strip_prefix(route) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
