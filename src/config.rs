//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.cardcrafter/config.toml` (user)
//! 3. `/etc/cardcrafter/config.toml` (system)
//!
//! Every section and key is optional; missing values take the library
//! defaults.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.cardcrafter/secrets.toml` (user, must be 0600)
//! 2. `/etc/cardcrafter/secrets.toml` (system, must be 0600)
//! 3. `CARDCRAFTER_SECRET` environment variable

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::content::CacheTtls;
use crate::fetch::{DEFAULT_ALLOWED_PORTS, DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_TRACKED};
use crate::fetch::{FetchConfig, TargetPolicy};
use crate::ratelimit::RateLimitConfig;
use crate::{CardError, Result};

/// Environment variable holding the anti-forgery secret.
pub const SECRET_ENV_VAR: &str = "CARDCRAFTER_SECRET";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub refresh: RefreshSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// Site identity and render behaviour.
///
/// `site_id` and `locale` take part in native-query cache keys, so two
/// sites or languages sharing a store never see each other's cards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site_id: String,
    pub locale: String,
    /// Endpoint the widget calls for proxied fetches.
    pub proxy_endpoint: String,
    /// Used when a remote render is requested without a URL.
    pub demo_source: Option<String>,
    /// Bypass cache reads for native queries and log query timings.
    pub debug: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_id: "default".into(),
            locale: "en_US".into(),
            proxy_endpoint: "/wp-admin/admin-ajax.php".into(),
            demo_source: None,
            debug: false,
        }
    }
}

impl SiteConfig {
    pub fn site_id(mut self, id: impl Into<String>) -> Self {
        self.site_id = id.into();
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn proxy_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.proxy_endpoint = endpoint.into();
        self
    }

    pub fn demo_source(mut self, url: impl Into<String>) -> Self {
        self.demo_source = Some(url.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// `[fetch]`: outbound requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub ttl_secs: u64,
    pub max_tracked: usize,
    pub allow_private_networks: bool,
    /// Empty list allows any port.
    pub allowed_ports: Vec<u16>,
    pub max_redirects: usize,
    pub user_agent: Option<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            refresh_timeout_secs: 10,
            ttl_secs: 3600,
            max_tracked: DEFAULT_MAX_TRACKED,
            allow_private_networks: false,
            allowed_ports: DEFAULT_ALLOWED_PORTS.to_vec(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: None,
        }
    }
}

/// `[rate_limit]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_requests: u32,
    pub window_secs: u64,
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
            trust_forwarded_headers: true,
        }
    }
}

/// `[cache]` with `[cache.durations]` (post type → seconds).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub default_ttl_secs: u64,
    pub empty_ttl_secs: u64,
    pub durations: HashMap<String, u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
            empty_ttl_secs: 300,
            durations: HashMap::new(),
        }
    }
}

/// `[refresh]`: background refresh of tracked URLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub interval_secs: u64,
    pub concurrency: usize,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            concurrency: 4,
        }
    }
}

/// `[store]`: where CLI state lives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// JSON store file (default: `~/.cache/cardcrafter/store.json`).
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.cardcrafter/config.toml`
    /// 3. `/etc/cardcrafter/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?.ok_or_else(|| {
            CardError::Configuration(
                "No config file found. Create ~/.cardcrafter/config.toml or /etc/cardcrafter/config.toml"
                    .to_string(),
            )
        })?;
        Self::load_from_file(&path)
    }

    /// Like [`load`](Self::load), but defaults when no file exists. An
    /// explicit path must still exist.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CardError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            CardError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(CardError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cardcrafter").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/cardcrafter/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let f = &self.fetch;
        let ports = (!f.allowed_ports.is_empty()).then(|| f.allowed_ports.clone());
        let mut config = FetchConfig::default()
            .timeout(Duration::from_secs(f.timeout_secs))
            .refresh_timeout(Duration::from_secs(f.refresh_timeout_secs))
            .ttl(Duration::from_secs(f.ttl_secs))
            .max_tracked(f.max_tracked)
            .refresh_concurrency(self.refresh.concurrency)
            .policy(
                TargetPolicy::default()
                    .allow_private_networks(f.allow_private_networks)
                    .allowed_ports(ports)
                    .max_redirects(f.max_redirects),
            );
        if let Some(ua) = &f.user_agent {
            config = config.user_agent(ua.clone());
        }
        config
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::default()
            .max_requests(self.rate_limit.max_requests)
            .window(Duration::from_secs(self.rate_limit.window_secs))
            .trust_forwarded_headers(self.rate_limit.trust_forwarded_headers)
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        let mut ttls = CacheTtls::default()
            .default_query(Duration::from_secs(self.cache.default_ttl_secs))
            .empty_result(Duration::from_secs(self.cache.empty_ttl_secs));
        for (post_type, secs) in &self.cache.durations {
            ttls = ttls.post_type(post_type.clone(), Duration::from_secs(*secs));
        }
        ttls
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs.max(1))
    }
}

/// Secrets file contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    /// Server secret for anti-forgery tokens.
    #[serde(default)]
    pub anti_forgery_secret: Option<String>,
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.cardcrafter/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/cardcrafter/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (the env var may still apply).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".cardcrafter").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/cardcrafter/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            CardError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            CardError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            CardError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(CardError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// The anti-forgery secret, falling back to `CARDCRAFTER_SECRET`.
    pub fn anti_forgery_secret(&self) -> Option<String> {
        self.anti_forgery_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(SECRET_ENV_VAR).ok().filter(|s| !s.is_empty()))
    }
}
