//! Configuration types for node-dns-sync.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::state::CorruptStatePolicy;

/// Prefix for nested environment overrides, e.g. `NODE_DNS_SYNC__SYNC__TTL=300`.
pub const ENV_PREFIX: &str = "NODE_DNS_SYNC";

/// Flat environment variables honored for existing deployments: (variable, config key).
const LEGACY_ENV: &[(&str, &str)] = &[
    ("CLOUDFLARE_API_TOKEN", "cloudflare.api_token"),
    ("CLOUDFLARE_ZONE_ID", "cloudflare.zone_id"),
    ("DOMAIN_SUFFIX", "sync.domain_suffix"),
    ("STATE_FILE", "sync.state_file"),
];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS provider configuration.
    pub cloudflare: CloudflareConfig,

    /// Reconciliation configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Cloudflare API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// API token with DNS edit permission on the zone.
    pub api_token: String,

    /// Zone identifier records are managed in.
    pub zone_id: String,

    /// API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Domain suffix appended to derived record names.
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,

    /// Path of the persisted membership state.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// TTL for managed records in seconds (1 = automatic).
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Whether records are proxied by the provider.
    #[serde(default)]
    pub proxied: bool,

    /// Node address type published in DNS.
    #[serde(default = "default_address_type")]
    pub address_type: String,

    /// Maximum number of record names synchronized concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Behavior when persisted state cannot be decoded.
    #[serde(default)]
    pub on_corrupt_state: CorruptStatePolicy,

    /// Refuse to start when the state file does not exist yet.
    #[serde(default)]
    pub require_state_file: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            domain_suffix: default_domain_suffix(),
            state_file: default_state_file(),
            ttl: default_ttl(),
            proxied: false,
            address_type: default_address_type(),
            max_concurrency: default_max_concurrency(),
            on_corrupt_state: CorruptStatePolicy::default(),
            require_state_file: false,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "node_dns_sync=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus push gateway the run's metrics are pushed to on exit.
    #[serde(default)]
    pub push_gateway: Option<PushGatewayConfig>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// Prometheus push gateway target. A one-shot run exits before any scrape,
/// so metrics are pushed once when telemetry shuts down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushGatewayConfig {
    /// Gateway base URL (e.g., "http://pushgateway:9091").
    pub endpoint: String,

    /// Job label the metrics are grouped under.
    #[serde(default = "default_service_name")]
    pub job: String,
}

impl PushGatewayConfig {
    /// URL the rendered metrics are `PUT` to, replacing the job's previous group.
    pub fn push_url(&self) -> String {
        format!(
            "{}/metrics/job/{}",
            self.endpoint.trim_end_matches('/'),
            self.job
        )
    }
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            push_gateway: None,
            opentelemetry: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_domain_suffix() -> String {
    "gigaspace.live".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/data/state.json")
}

fn default_ttl() -> u32 {
    120
}

fn default_address_type() -> String {
    "ExternalIP".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "node-dns-sync".to_string()
}

impl Config {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Precedence, lowest first: file, `NODE_DNS_SYNC__*` variables, legacy flat variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let legacy = LEGACY_ENV
            .iter()
            .map(|(var, key)| (*key, std::env::var(var).ok()))
            .collect::<Vec<_>>();
        Self::load_with(path, legacy)
    }

    fn load_with(
        path: Option<&Path>,
        overrides: Vec<(&str, Option<String>)>,
    ) -> Result<Self, SyncError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        for (key, value) in overrides {
            builder = builder.set_override_option(key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a correct run.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.cloudflare.api_token.trim().is_empty() {
            return Err(SyncError::Config("cloudflare.api_token is empty".into()));
        }
        if self.cloudflare.zone_id.trim().is_empty() {
            return Err(SyncError::Config("cloudflare.zone_id is empty".into()));
        }
        if self.sync.domain_suffix.trim_matches('.').is_empty() {
            return Err(SyncError::Config("sync.domain_suffix is empty".into()));
        }
        if let Some(gateway) = &self.telemetry.push_gateway {
            if gateway.endpoint.trim().is_empty() || gateway.job.trim().is_empty() {
                return Err(SyncError::Config(
                    "telemetry.push_gateway needs an endpoint and a job".into(),
                ));
            }
        }
        if self.sync.max_concurrency == 0 {
            return Err(SyncError::Config(
                "sync.max_concurrency must be at least 1".into(),
            ));
        }
        if self.sync.ttl != 1 && !(60..=86400).contains(&self.sync.ttl) {
            return Err(SyncError::Config(format!(
                "sync.ttl {} must be 1 (automatic) or between 60 and 86400",
                self.sync.ttl
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("node-dns-sync.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_file_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [cloudflare]
            api_token = "tok"
            zone_id = "zone"
            "#,
        );

        let config = Config::load_with(Some(&path), vec![]).unwrap();
        assert_eq!(config.cloudflare.zone_id, "zone");
        assert_eq!(
            config.cloudflare.api_base_url,
            "https://api.cloudflare.com/client/v4"
        );
        assert_eq!(config.sync.domain_suffix, "gigaspace.live");
        assert_eq!(config.sync.state_file, PathBuf::from("/data/state.json"));
        assert_eq!(config.sync.ttl, 120);
        assert!(!config.sync.proxied);
        assert_eq!(config.sync.address_type, "ExternalIP");
        assert_eq!(config.sync.on_corrupt_state, CorruptStatePolicy::Fail);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_legacy_overrides_win() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [cloudflare]
            api_token = "tok"
            zone_id = "zone"

            [sync]
            domain_suffix = "from-file.example.com"
            on_corrupt_state = "reset"
            "#,
        );

        let config = Config::load_with(
            Some(&path),
            vec![
                ("sync.domain_suffix", Some("from-env.example.com".to_string())),
                ("sync.state_file", None),
            ],
        )
        .unwrap();
        assert_eq!(config.sync.domain_suffix, "from-env.example.com");
        assert_eq!(config.sync.on_corrupt_state, CorruptStatePolicy::Reset);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [cloudflare]
            api_token = ""
            zone_id = "zone"
            "#,
        );

        assert!(matches!(
            Config::load_with(Some(&path), vec![]),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_validate_ttl_and_concurrency() {
        let mut config = Config {
            cloudflare: CloudflareConfig {
                api_token: "tok".into(),
                zone_id: "zone".into(),
                api_base_url: default_api_base_url(),
                request_timeout_secs: 30,
            },
            sync: SyncConfig::default(),
            telemetry: TelemetryConfig::default(),
        };
        config.validate().unwrap();

        config.sync.ttl = 1;
        config.validate().unwrap();

        config.sync.ttl = 30;
        assert!(config.validate().is_err());

        config.sync.ttl = 120;
        config.sync.max_concurrency = 0;
        assert!(config.validate().is_err());

        config.sync.max_concurrency = 4;
        config.telemetry.push_gateway = Some(PushGatewayConfig {
            endpoint: " ".into(),
            job: "node-dns-sync".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_push_gateway_section() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [cloudflare]
            api_token = "tok"
            zone_id = "zone"

            [telemetry.push_gateway]
            endpoint = "http://pushgateway:9091/"
            "#,
        );

        let config = Config::load_with(Some(&path), vec![]).unwrap();
        let gateway = config.telemetry.push_gateway.unwrap();
        assert_eq!(gateway.job, "node-dns-sync");
        assert_eq!(
            gateway.push_url(),
            "http://pushgateway:9091/metrics/job/node-dns-sync"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let cf = CloudflareConfig {
            api_token: "super-secret".into(),
            zone_id: "zone".into(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: 30,
        };
        let rendered = format!("{:?}", cf);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("zone"));
    }
}
