use anyhow::{anyhow, bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REDACTED: &str = "[REDACTED]";

/// Main configuration structure for Boulder
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BoulderConfig {
    /// Identity service connection
    pub identity: IdentityConfig,
    /// Platform (org/space) connection
    pub platform: PlatformConfig,
    /// Roster and retention settings
    pub lifecycle: LifecycleConfig,
    /// Action worker pool
    pub workers: WorkerConfig,
    /// Outbound HTTP behaviour
    pub http: HttpConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the identity service
    pub target: String,
    /// Token endpoint; defaults to `<target>/oauth/token`
    pub token_endpoint: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub skip_tls_verify: bool,
}

impl IdentityConfig {
    pub fn token_endpoint_url(&self) -> String {
        self.token_endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{}/oauth/token", self.target.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the platform API
    pub target: String,
    /// Token endpoint used for the password grant; read from `<target>/v2/info` when unset
    pub token_endpoint: Option<String>,
    pub username: String,
    pub password: String,
    /// OAuth client the password grant is issued to
    pub client_id: String,
    pub skip_tls_verify: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            token_endpoint: None,
            username: String::new(),
            password: String::new(),
            client_id: "cf".to_string(),
            skip_tls_verify: false,
        }
    }
}

/// What to do with an entry whose start date cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidActivationPolicy {
    /// Log and process the entry as if it activated at the Unix epoch
    #[default]
    Degrade,
    /// Log and leave the entry out of the pass
    Skip,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// CSV roster path
    pub roster_file: PathBuf,
    /// How long resources live after activation, e.g. "24h" or "1h 30m"
    pub retention: String,
    /// Initial password for every created account
    pub baseline_password: String,
    pub poll_interval_seconds: u64,
    pub invalid_activation: InvalidActivationPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            roster_file: PathBuf::from("roster.csv"),
            retention: "24h".to_string(),
            baseline_password: String::new(),
            poll_interval_seconds: 60,
            invalid_activation: InvalidActivationPolicy::Degrade,
        }
    }
}

impl LifecycleConfig {
    /// Parsed retention window; an unparsable value is a fatal startup error.
    pub fn retention_window(&self) -> Result<Duration> {
        humantime::parse_duration(self.retention.trim())
            .map_err(|e| anyhow!("cannot parse retention '{}': {}", self.retention, e))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum actions running at once
    pub concurrency: usize,
    /// How long shutdown waits for in-flight actions
    pub drain_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            drain_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            requests_per_second: 10,
            burst: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

/// Flat environment names from earlier deployments, applied over everything else.
const LEGACY_ENV: [&str; 9] = [
    "UAA_TARGET",
    "UAA_USER",
    "UAA_PASSWORD",
    "CAPI_TARGET",
    "CAPI_USER",
    "CAPI_PASSWORD",
    "USER_KEEPALIVE",
    "DEFAULT_PASSWORD",
    "CSV_FILE",
];

impl BoulderConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`boulder.toml`, or `explicit_path`)
    /// 3. Environment variables (prefixed with BOULDER_, `__` between sections)
    /// 4. Legacy flat environment variables
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match explicit_path {
            Some(path) => {
                if !path.exists() {
                    bail!("configuration file {} does not exist", path.display());
                }
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("boulder.toml").exists() {
                    builder = builder.add_source(File::with_name("boulder"));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("BOULDER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut boulder_config: BoulderConfig = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        boulder_config.apply_overrides(|name| std::env::var(name).ok());

        Ok(boulder_config)
    }

    /// Apply legacy flat variables; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in LEGACY_ENV {
            let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match name {
                "UAA_TARGET" => self.identity.target = value,
                "UAA_USER" => self.identity.client_id = value,
                "UAA_PASSWORD" => self.identity.client_secret = value,
                "CAPI_TARGET" => self.platform.target = value,
                "CAPI_USER" => self.platform.username = value,
                "CAPI_PASSWORD" => self.platform.password = value,
                "USER_KEEPALIVE" => self.lifecycle.retention = value,
                "DEFAULT_PASSWORD" => self.lifecycle.baseline_password = value,
                "CSV_FILE" => self.lifecycle.roster_file = PathBuf::from(value),
                _ => {}
            }
        }
    }

    /// Checks that must pass before any pass runs.
    pub fn validate(&self) -> Result<()> {
        self.lifecycle.retention_window()?;
        if self.lifecycle.poll_interval_seconds == 0 {
            bail!("lifecycle.poll_interval_seconds must be greater than zero");
        }
        if self.workers.concurrency == 0 {
            bail!("workers.concurrency must be greater than zero");
        }
        Ok(())
    }

    /// Additional checks for commands that talk to the remote systems.
    pub fn validate_remote(&self) -> Result<()> {
        self.validate()?;
        let mut missing = Vec::new();
        if self.identity.target.trim().is_empty() {
            missing.push("identity.target");
        }
        if self.platform.target.trim().is_empty() {
            missing.push("platform.target");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            bail!("missing required settings: {}", missing.join(", "))
        }
    }

    /// Mutating commands also need a password to hand out.
    pub fn validate_provisioning(&self) -> Result<()> {
        self.validate_remote()?;
        if self.lifecycle.baseline_password.is_empty() {
            bail!("lifecycle.baseline_password must be set");
        }
        Ok(())
    }

    /// Copy with every secret replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.identity.client_secret,
            &mut copy.platform.password,
            &mut copy.lifecycle.baseline_password,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load `.env` from the working directory if it exists.
    ///
    /// Returns whether a file was read; callers log it once telemetry is up.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Load a dotenv file if it exists. Variables already set are kept.
    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenvy::from_path(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BoulderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lifecycle.retention_window().unwrap(), Duration::from_secs(86_400));
        assert_eq!(config.lifecycle.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_retention_formats() {
        let mut lifecycle = LifecycleConfig::default();
        for (raw, secs) in [("24h", 86_400), ("90m", 5_400), ("1h 30m", 5_400), ("720h", 2_592_000)] {
            lifecycle.retention = raw.to_string();
            assert_eq!(lifecycle.retention_window().unwrap(), Duration::from_secs(secs), "{raw}");
        }
    }

    #[test]
    fn test_unparsable_retention_fails_validation() {
        let mut config = BoulderConfig::default();
        config.lifecycle.retention = "a while".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("a while"));
    }

    #[test]
    fn test_zero_interval_and_concurrency_rejected() {
        let mut config = BoulderConfig::default();
        config.lifecycle.poll_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = BoulderConfig::default();
        config.workers.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_validation_lists_missing_targets() {
        let config = BoulderConfig::default();
        let err = config.validate_remote().unwrap_err().to_string();
        assert!(err.contains("identity.target"));
        assert!(err.contains("platform.target"));
    }

    #[test]
    fn test_provisioning_requires_password() {
        let mut config = BoulderConfig::default();
        config.identity.target = "https://uaa.example.com".to_string();
        config.platform.target = "https://api.example.com".to_string();
        assert!(config.validate_remote().is_ok());
        assert!(config.validate_provisioning().is_err());

        config.lifecycle.baseline_password = "changeme".to_string();
        assert!(config.validate_provisioning().is_ok());
    }

    #[test]
    fn test_legacy_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("UAA_TARGET", "https://uaa.example.com"),
            ("CAPI_USER", "admin"),
            ("USER_KEEPALIVE", "48h"),
            ("CSV_FILE", "/data/users.csv"),
            ("DEFAULT_PASSWORD", ""),
        ]);
        let mut config = BoulderConfig::default();
        config.lifecycle.baseline_password = "kept".to_string();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.identity.target, "https://uaa.example.com");
        assert_eq!(config.platform.username, "admin");
        assert_eq!(config.lifecycle.retention, "48h");
        assert_eq!(config.lifecycle.roster_file, PathBuf::from("/data/users.csv"));
        assert_eq!(config.lifecycle.baseline_password, "kept");
    }

    #[test]
    fn test_legacy_environment_alone_is_enough_to_provision() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("UAA_TARGET", "https://uaa.example.com"),
            ("UAA_USER", "boulder"),
            ("UAA_PASSWORD", "client-secret"),
            ("CAPI_TARGET", "https://api.example.com"),
            ("CAPI_USER", "admin"),
            ("CAPI_PASSWORD", "admin-pass"),
            ("USER_KEEPALIVE", "1h30m"),
            ("DEFAULT_PASSWORD", "changeme"),
            ("CSV_FILE", "users.csv"),
        ]);
        let mut config = BoulderConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        config.validate_provisioning().unwrap();
        assert!(config.platform.token_endpoint.is_none());
        assert_eq!(config.lifecycle.retention_window().unwrap(), Duration::from_secs(5_400));
    }

    #[test]
    fn test_token_endpoint_default() {
        let mut identity = IdentityConfig {
            target: "https://uaa.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(identity.token_endpoint_url(), "https://uaa.example.com/oauth/token");
        identity.token_endpoint = Some("https://login.example.com/token".to_string());
        assert_eq!(identity.token_endpoint_url(), "https://login.example.com/token");
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = BoulderConfig::default();
        config.identity.client_secret = "s1".to_string();
        config.platform.password = "s2".to_string();
        config.lifecycle.baseline_password = "s3".to_string();

        let rendered = config.redacted().to_toml().unwrap();
        assert!(!rendered.contains("s1"));
        assert!(!rendered.contains("\"s2\""));
        assert!(!rendered.contains("s3"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[lifecycle]\nretention = \"12h\"\npoll_interval_seconds = 5\n\n[workers]\nconcurrency = 2"
        )
        .unwrap();

        let config = BoulderConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.lifecycle.poll_interval_seconds, 5);
        assert_eq!(config.workers.concurrency, 2);
        assert_eq!(config.http.timeout_seconds, 30);
    }

    #[test]
    fn test_env_file_loading_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        assert!(!BoulderConfig::load_env_file_from(&path).unwrap());

        std::fs::write(&path, "BOULDER_DOTENV_TEST_MARKER=from-file\n").unwrap();
        assert!(BoulderConfig::load_env_file_from(&path).unwrap());
        assert_eq!(std::env::var("BOULDER_DOTENV_TEST_MARKER").unwrap(), "from-file");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BoulderConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
