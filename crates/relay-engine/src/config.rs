//! # Relay Configuration
//!
//! Configuration management for the relay daemon and engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TENANT_ID=...  SALSIFY_ORG_ID=...  POLL_INTERVAL=300               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/asset-relay/relay.toml (Linux)                           │
//! │     ~/Library/Application Support/com.assetrelay.relay/relay.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # relay.toml
//! [azure]
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! client_secret = "..."
//!
//! [sharepoint]
//! site_id = "contoso.sharepoint.com,abc,def"
//! folder_path = "Shared Documents/SalsifyImages"
//!
//! [salsify]
//! api_key = "..."
//! org_id = "s-1234"
//! auth_scheme = "bearer"         # bearer | x_api_key
//! association_mode = "none"      # none | digital_assets
//!
//! [poll]
//! poll_interval_secs = 300
//! batch_size = 10
//! circuit_threshold = 5
//! circuit_reset_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::{ExtensionPolicy, DEFAULT_ALLOWED_EXTENSIONS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Azure AD
// =============================================================================

/// Client-credentials settings for the Graph token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureSettings {
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Scopes requested for Graph.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    /// Refresh the token this many seconds before it expires.
    #[serde(default = "default_refresh_margin")]
    pub token_refresh_margin_secs: u64,

    /// Lifetime assumed when Azure AD omits `expires_in`.
    #[serde(default = "default_token_lifetime")]
    pub default_token_lifetime_secs: u64,
}

fn default_scopes() -> Vec<String> {
    vec!["https://graph.microsoft.com/.default".to_string()]
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_refresh_margin() -> u64 {
    60
}

fn default_token_lifetime() -> u64 {
    3000
}

impl Default for AzureSettings {
    fn default() -> Self {
        AzureSettings {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: default_scopes(),
            authority_host: default_authority_host(),
            token_refresh_margin_secs: default_refresh_margin(),
            default_token_lifetime_secs: default_token_lifetime(),
        }
    }
}

// =============================================================================
// SharePoint
// =============================================================================

/// Which SharePoint folder to watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePointSettings {
    #[serde(default)]
    pub site_id: String,

    /// Folder path relative to the root of the site's default drive.
    #[serde(default = "default_folder_path")]
    pub folder_path: String,

    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
}

fn default_folder_path() -> String {
    "Shared Documents/SalsifyImages".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

impl Default for SharePointSettings {
    fn default() -> Self {
        SharePointSettings {
            site_id: String::new(),
            folder_path: default_folder_path(),
            graph_base_url: default_graph_base_url(),
        }
    }
}

// =============================================================================
// Salsify
// =============================================================================

/// How the Salsify API key is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,

    /// `X-API-KEY: <key>`
    XApiKey,
}

impl std::str::FromStr for AuthScheme {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "x_api_key" | "x-api-key" | "apikey" => Ok(AuthScheme::XApiKey),
            other => Err(EngineError::Config(format!(
                "Unknown Salsify auth scheme: '{}'. Valid options: bearer, x_api_key",
                other
            ))),
        }
    }
}

/// Whether uploaded assets are linked to their product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    /// Upload only.
    #[default]
    None,

    /// Append the asset to the product's `salsify:digital_assets`.
    DigitalAssets,
}

impl std::str::FromStr for AssociationMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "off" => Ok(AssociationMode::None),
            "digital_assets" | "digital-assets" => Ok(AssociationMode::DigitalAssets),
            other => Err(EngineError::Config(format!(
                "Unknown association mode: '{}'. Valid options: none, digital_assets",
                other
            ))),
        }
    }
}

/// Salsify organisation and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalsifySettings {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub org_id: String,

    #[serde(default = "default_salsify_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub auth_scheme: AuthScheme,

    #[serde(default)]
    pub association_mode: AssociationMode,
}

fn default_salsify_base_url() -> String {
    "https://api.salsify.com".to_string()
}

impl Default for SalsifySettings {
    fn default() -> Self {
        SalsifySettings {
            api_key: String::new(),
            org_id: String::new(),
            base_url: default_salsify_base_url(),
            auth_scheme: AuthScheme::default(),
            association_mode: AssociationMode::default(),
        }
    }
}

// =============================================================================
// Poll Loop
// =============================================================================

/// Upper bound for the poll interval and the breaker cooldown (one week).
pub const MAX_WAIT_SECS: u64 = 7 * 24 * 60 * 60;

/// Scheduling, batching and breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Seconds between ticks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum items dispatched per tick, and the worker count.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: u32,

    /// Cooldown once the breaker opens (seconds).
    #[serde(default = "default_circuit_reset")]
    pub circuit_reset_secs: u64,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_batch_size() -> usize {
    10
}

fn default_circuit_threshold() -> u32 {
    5
}

fn default_circuit_reset() -> u64 {
    60
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            circuit_threshold: default_circuit_threshold(),
            circuit_reset_secs: default_circuit_reset(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

// =============================================================================
// HTTP Client
// =============================================================================

/// Timeouts and the retry policy for idempotent calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Retries after the first attempt. Zero disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Applies to streaming uploads only.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    120
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            request_timeout_secs: default_request_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

// =============================================================================
// Local Paths
// =============================================================================

/// Where the ledger and the dead-letter log live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_processed_files_path")]
    pub processed_files_path: PathBuf,

    #[serde(default = "default_dead_letter_path")]
    pub dead_letter_path: PathBuf,
}

fn default_processed_files_path() -> PathBuf {
    PathBuf::from("data/processed_files.json")
}

fn default_dead_letter_path() -> PathBuf {
    PathBuf::from("data/dead_letter.jsonl")
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            processed_files_path: default_processed_files_path(),
            dead_letter_path: default_dead_letter_path(),
        }
    }
}

// =============================================================================
// Server and Logging
// =============================================================================

/// Health and metrics listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,

    /// Human-readable multi-line output.
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// =============================================================================
// Main Relay Configuration
// =============================================================================

/// Complete relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub azure: AzureSettings,

    #[serde(default)]
    pub sharepoint: SharePointSettings,

    #[serde(default)]
    pub salsify: SalsifySettings,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl RelayConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (relay.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading relay config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load relay config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses one TOML file without applying overrides.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Relay config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.poll.batch_size == 0 {
            return Err(EngineError::Config(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.poll.circuit_threshold == 0 {
            return Err(EngineError::Config(
                "circuit_threshold must be greater than 0".into(),
            ));
        }

        if self.poll.poll_interval_secs == 0 {
            return Err(EngineError::Config(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        for (field, value) in [
            ("poll_interval_secs", self.poll.poll_interval_secs),
            ("circuit_reset_secs", self.poll.circuit_reset_secs),
        ] {
            if value > MAX_WAIT_SECS {
                return Err(EngineError::Config(format!(
                    "{} must be at most {}, got: {}",
                    field, MAX_WAIT_SECS, value
                )));
            }
        }

        self.extension_policy()?;

        for (field, value) in [
            ("azure.authority_host", &self.azure.authority_host),
            ("sharepoint.graph_base_url", &self.sharepoint.graph_base_url),
            ("salsify.base_url", &self.salsify.base_url),
        ] {
            let parsed = Url::parse(value)
                .map_err(|e| EngineError::Config(format!("{} is not a URL: {}", field, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(EngineError::Config(format!(
                    "{} must start with http:// or https://, got: {}",
                    field, value
                )));
            }
        }

        Ok(())
    }

    /// Fails if any credential needed to talk to the remote services is blank.
    pub fn require_credentials(&self) -> EngineResult<()> {
        let missing: Vec<&str> = [
            ("TENANT_ID", &self.azure.tenant_id),
            ("CLIENT_ID", &self.azure.client_id),
            ("CLIENT_SECRET", &self.azure.client_secret),
            ("SITE_ID", &self.sharepoint.site_id),
            ("SALSIFY_ORG_ID", &self.salsify.org_id),
            ("SALSIFY_API_KEY", &self.salsify.api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                debug!(key, "Overriding setting from environment");
                *target = value;
            }
        };

        text("TENANT_ID", &mut self.azure.tenant_id);
        text("CLIENT_ID", &mut self.azure.client_id);
        text("CLIENT_SECRET", &mut self.azure.client_secret);
        text("SITE_ID", &mut self.sharepoint.site_id);
        text("SHAREPOINT_FOLDER_PATH", &mut self.sharepoint.folder_path);
        text("SALSIFY_API_KEY", &mut self.salsify.api_key);
        text("SALSIFY_ORG_ID", &mut self.salsify.org_id);
        text("SALSIFY_BASE_URL", &mut self.salsify.base_url);
        text("LOG_LEVEL", &mut self.logging.level);

        if let Some(scheme) = lookup("SALSIFY_AUTH_SCHEME") {
            match scheme.parse() {
                Ok(parsed) => self.salsify.auth_scheme = parsed,
                Err(e) => warn!(error = %e, "Ignoring SALSIFY_AUTH_SCHEME"),
            }
        }

        if let Some(mode) = lookup("SALSIFY_PRODUCT_ASSOCIATION_MODE") {
            match mode.parse() {
                Ok(parsed) => self.salsify.association_mode = parsed,
                Err(e) => warn!(error = %e, "Ignoring SALSIFY_PRODUCT_ASSOCIATION_MODE"),
            }
        }

        if let Some(path) = lookup("PROCESSED_FILES_PATH") {
            self.paths.processed_files_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("DEAD_LETTER_PATH") {
            self.paths.dead_letter_path = PathBuf::from(path);
        }

        parse_into(&lookup, "POLL_INTERVAL", &mut self.poll.poll_interval_secs);
        parse_into(&lookup, "BATCH_SIZE", &mut self.poll.batch_size);
        parse_into(&lookup, "CIRCUIT_THRESHOLD", &mut self.poll.circuit_threshold);
        parse_into(&lookup, "CIRCUIT_RESET_SECONDS", &mut self.poll.circuit_reset_secs);
        parse_into(&lookup, "MAX_RETRIES", &mut self.http.max_retries);
        parse_into(&lookup, "HTTP_PORT", &mut self.server.port);
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "assetrelay", "relay")
            .map(|dirs| dirs.config_dir().join("relay.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The validated extension allow-list.
    pub fn extension_policy(&self) -> EngineResult<ExtensionPolicy> {
        Ok(ExtensionPolicy::new(&self.poll.allowed_extensions)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.poll_interval_secs)
    }

    pub fn circuit_reset(&self) -> Duration {
        Duration::from_secs(self.poll.circuit_reset_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.azure.token_refresh_margin_secs)
    }

    pub fn default_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.azure.default_token_lifetime_secs)
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => {
                debug!(key, "Overriding setting from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable numeric override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.poll.poll_interval_secs, 300);
        assert_eq!(config.poll.batch_size, 10);
        assert_eq!(config.poll.circuit_threshold, 5);
        assert_eq!(config.poll.circuit_reset_secs, 60);
        assert_eq!(config.azure.token_refresh_margin_secs, 60);
        assert_eq!(config.azure.default_token_lifetime_secs, 3000);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.salsify.auth_scheme, AuthScheme::Bearer);
        assert_eq!(config.salsify.association_mode, AssociationMode::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RelayConfig::default();

        config.poll.batch_size = 0;
        assert!(config.validate().is_err());
        config.poll.batch_size = 10;

        config.poll.circuit_threshold = 0;
        assert!(config.validate().is_err());
        config.poll.circuit_threshold = 5;

        config.poll.circuit_reset_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.poll.circuit_reset_secs = MAX_WAIT_SECS;
        assert!(config.validate().is_ok());
        config.poll.circuit_reset_secs = 60;

        config.poll.poll_interval_secs = MAX_WAIT_SECS + 1;
        assert!(config.validate().is_err());
        config.poll.poll_interval_secs = 300;

        config.poll.allowed_extensions.clear();
        assert!(config.validate().is_err());
        config.poll.allowed_extensions = vec!["png".into()];

        config.salsify.base_url = "ftp://api.salsify.com".into();
        assert!(config.validate().is_err());

        config.salsify.base_url = "https://api.salsify.com".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_require_credentials_lists_missing() {
        let mut config = RelayConfig::default();
        config.azure.tenant_id = "t".into();
        config.azure.client_id = "c".into();

        let err = config.require_credentials().unwrap_err().to_string();
        assert!(err.contains("CLIENT_SECRET"));
        assert!(err.contains("SALSIFY_API_KEY"));
        assert!(!err.contains("TENANT_ID"));
    }

    #[test]
    fn test_overrides_use_service_variable_names() {
        let vars = env(&[
            ("TENANT_ID", "tenant"),
            ("SITE_ID", "site"),
            ("SALSIFY_AUTH_SCHEME", "x_api_key"),
            ("SALSIFY_PRODUCT_ASSOCIATION_MODE", "digital_assets"),
            ("POLL_INTERVAL", "30"),
            ("BATCH_SIZE", "4"),
            ("CIRCUIT_RESET_SECONDS", "120"),
            ("HTTP_PORT", "9100"),
            ("DEAD_LETTER_PATH", "/var/lib/relay/dead.jsonl"),
        ]);

        let mut config = RelayConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());

        assert_eq!(config.azure.tenant_id, "tenant");
        assert_eq!(config.sharepoint.site_id, "site");
        assert_eq!(config.salsify.auth_scheme, AuthScheme::XApiKey);
        assert_eq!(
            config.salsify.association_mode,
            AssociationMode::DigitalAssets
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.poll.batch_size, 4);
        assert_eq!(config.circuit_reset(), Duration::from_secs(120));
        assert_eq!(config.server.port, 9100);
        assert_eq!(
            config.paths.dead_letter_path,
            PathBuf::from("/var/lib/relay/dead.jsonl")
        );
    }

    #[test]
    fn test_unparseable_numeric_override_is_ignored() {
        let vars = env(&[("BATCH_SIZE", "lots"), ("SALSIFY_AUTH_SCHEME", "magic")]);
        let mut config = RelayConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        assert_eq!(config.poll.batch_size, 10);
        assert_eq!(config.salsify.auth_scheme, AuthScheme::Bearer);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            "[poll]\nbatch_size = 3\n\n[salsify]\norg_id = \"s-1\"\nauth_scheme = \"x_api_key\"\n",
        )
        .unwrap();

        let config = RelayConfig::from_file(&path).unwrap();
        assert_eq!(config.poll.batch_size, 3);
        assert_eq!(config.poll.poll_interval_secs, 300);
        assert_eq!(config.salsify.org_id, "s-1");
        assert_eq!(config.salsify.auth_scheme, AuthScheme::XApiKey);
        assert_eq!(config.sharepoint.folder_path, "Shared Documents/SalsifyImages");
    }

    #[test]
    fn test_save_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.toml");

        let mut config = RelayConfig::default();
        config.salsify.association_mode = AssociationMode::DigitalAssets;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[poll]"));
        assert!(contents.contains("association_mode = \"digital_assets\""));

        let loaded = RelayConfig::from_file(&path).unwrap();
        assert_eq!(
            loaded.salsify.association_mode,
            AssociationMode::DigitalAssets
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[poll\nbatch_size = ").unwrap();
        assert!(matches!(
            RelayConfig::from_file(&path),
            Err(EngineError::Config(_))
        ));
    }
}
