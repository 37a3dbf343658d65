//! Gateway configuration container, validation and loading.
//!
//! [`GatewayConfig`] holds everything the runtime needs before it serves the
//! first request. Call [`validate()`](GatewayConfig::validate) to check all
//! structural invariants before any socket is bound; [`GatewayConfig::load`]
//! does so automatically after layering defaults, an optional file and
//! `TETHER_*` environment variables.

use super::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Prefix of environment variables that override configuration keys,
/// e.g. `TETHER_LISTEN_ADDR`.
pub const ENV_PREFIX: &str = "TETHER";

// ─────────────────────────────────────────────────────────────────────────────
// GatewayConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identifier of this gateway instance (used in logs).
    pub id: String,
    /// `host:port` the HTTP surface binds to.
    pub listen_addr: String,
    /// RPC endpoint for remote dispatch, e.g. `http://127.0.0.1:9090`.
    pub upstream_endpoint: Option<String>,
    /// Per-call deadline in milliseconds; `0` disables the default deadline.
    pub request_timeout_ms: u64,
    /// Dial timeout for the upstream connection (must be > 0).
    pub connect_timeout_ms: u64,
    /// Largest request body accepted, in bytes (must be > 0).
    pub max_body_bytes: usize,
    /// Indent JSON responses.
    pub pretty_json: bool,
    /// Extra header names never copied into call metadata.
    pub reserved_headers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            id: "tether-gateway".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            upstream_endpoint: None,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            max_body_bytes: 4 * 1024 * 1024,
            pretty_json: false,
            reserved_headers: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Construct a default config with the given gateway id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builder: set the listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Builder: set the upstream endpoint.
    pub fn with_upstream(mut self, endpoint: impl Into<String>) -> Self {
        self.upstream_endpoint = Some(endpoint.into());
        self
    }

    /// Builder: set the default per-call deadline.
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Default per-call deadline, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// Upstream dial timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate all structural invariants of this configuration.
    ///
    /// Checks performed (in order):
    /// 1. Gateway id is non-empty.
    /// 2. `listen_addr` parses as a socket address.
    /// 3. The upstream endpoint, if set, is an `http://` or `https://` URI
    ///    with a host.
    /// 4. `connect_timeout_ms` is non-zero.
    /// 5. `max_body_bytes` is non-zero.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.id.trim().is_empty() {
            return Err(GatewayError::EmptyGatewayId);
        }

        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(GatewayError::InvalidListenAddr(self.listen_addr.clone()));
        }

        if let Some(endpoint) = &self.upstream_endpoint {
            let Some(rest) = endpoint
                .strip_prefix("http://")
                .or_else(|| endpoint.strip_prefix("https://"))
            else {
                return Err(GatewayError::InvalidEndpoint(
                    endpoint.clone(),
                    "endpoint must start with http:// or https://".to_string(),
                ));
            };
            if rest.trim_end_matches('/').is_empty() {
                return Err(GatewayError::InvalidEndpoint(
                    endpoint.clone(),
                    "endpoint has no host".to_string(),
                ));
            }
        }

        if self.connect_timeout_ms == 0 {
            return Err(GatewayError::InvalidTimeout);
        }

        if self.max_body_bytes == 0 {
            return Err(GatewayError::InvalidBodyLimit);
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "config")]
mod loading {
    use super::{ENV_PREFIX, GatewayConfig};
    use crate::gateway::error::GatewayError;
    use config::{Config as Cfg, Environment, File, FileFormat};
    use std::path::Path;

    /// Configuration loading error.
    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    pub enum ConfigError {
        #[error("Config parsing error: {0}")]
        Parse(String),

        #[error("Unsupported format: {0}")]
        UnsupportedFormat(String),

        #[error("Serialization error: {0}")]
        Serialization(String),

        #[error("Invalid configuration: {0}")]
        Invalid(#[from] GatewayError),
    }

    /// Result type for config operations
    pub type ConfigResult<T> = Result<T, ConfigError>;

    /// Detect configuration format from file extension.
    ///
    /// Supported: `.toml`, `.yaml` / `.yml`, `.json`.
    pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    impl GatewayConfig {
        /// Load defaults, then `path` (if given), then `TETHER_*`
        /// environment variables, and validate the result.
        pub fn load(path: Option<&str>) -> ConfigResult<GatewayConfig> {
            let mut builder = Cfg::builder();
            if let Some(path) = path {
                let format = detect_format(path)?;
                builder = builder.add_source(File::new(path, format));
            }
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

            let config: GatewayConfig = builder
                .build()
                .map_err(|e| ConfigError::Parse(e.to_string()))?
                .try_deserialize()
                .map_err(|e| ConfigError::Serialization(e.to_string()))?;
            config.validate()?;
            Ok(config)
        }
    }
}

#[cfg(feature = "config")]
pub use loading::{ConfigError, ConfigResult, detect_format};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        GatewayConfig::default().validate().unwrap();
        assert_eq!(
            GatewayConfig::default().request_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn zero_request_timeout_disables_deadline() {
        let cfg = GatewayConfig::default().with_request_timeout_ms(0);
        assert_eq!(cfg.request_timeout(), None);
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(
            GatewayConfig::new("  ").validate(),
            Err(GatewayError::EmptyGatewayId)
        );
    }

    #[test]
    fn bad_listen_addr_rejected() {
        let cfg = GatewayConfig::default().with_listen_addr("localhost");
        assert!(matches!(
            cfg.validate(),
            Err(GatewayError::InvalidListenAddr(_))
        ));
    }

    #[test]
    fn upstream_must_be_http() {
        let cfg = GatewayConfig::default().with_upstream("grpc://backend:9090");
        assert!(matches!(cfg.validate(), Err(GatewayError::InvalidEndpoint(..))));
        let cfg = GatewayConfig::default().with_upstream("http://");
        assert!(matches!(cfg.validate(), Err(GatewayError::InvalidEndpoint(..))));
        GatewayConfig::default()
            .with_upstream("http://127.0.0.1:9090")
            .validate()
            .unwrap();
    }

    #[test]
    fn zero_limits_rejected() {
        let cfg = GatewayConfig {
            connect_timeout_ms: 0,
            ..GatewayConfig::default()
        };
        assert_eq!(cfg.validate(), Err(GatewayError::InvalidTimeout));
        let cfg = GatewayConfig {
            max_body_bytes: 0,
            ..GatewayConfig::default()
        };
        assert_eq!(cfg.validate(), Err(GatewayError::InvalidBodyLimit));
    }

    #[cfg(feature = "config")]
    #[test]
    fn load_reads_toml_file_over_defaults() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "id = \"edge\"\nupstream_endpoint = \"http://10.0.0.5:9090\"\npretty_json = true\nreserved_headers = [\"cookie\"]"
        )
        .unwrap();

        let cfg = GatewayConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.id, "edge");
        assert_eq!(cfg.upstream_endpoint.as_deref(), Some("http://10.0.0.5:9090"));
        assert!(cfg.pretty_json);
        assert_eq!(cfg.reserved_headers, vec!["cookie".to_string()]);
        assert_eq!(cfg.connect_timeout_ms, 5_000);
    }

    #[cfg(feature = "config")]
    #[test]
    fn load_rejects_invalid_file_values() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"max_body_bytes": 0}}"#).unwrap();
        let err = GatewayConfig::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(GatewayError::InvalidBodyLimit)));
    }

    #[cfg(feature = "config")]
    #[test]
    fn unknown_extension_rejected() {
        assert!(matches!(
            detect_format("gateway.ini"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
