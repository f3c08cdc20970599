//! Configuration loading and types for bucketroute.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every field has a default, so an empty file (or no
//! file at all) yields a session on the `default` profile in `us-east-1`.

use serde::Deserialize;
use std::path::Path;

use crate::credentials::Credentials;
use crate::region::Region;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// How the session authenticates.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Region of the first client; also where new buckets are created.
    #[serde(default = "default_region")]
    pub region: Region,

    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,

    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,

    /// Result-size caps for listings.
    #[serde(default)]
    pub listing: ListingConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: CredentialsConfig::default(),
            region: default_region(),
            endpoint_url: String::new(),
            use_path_style: false,
            listing: ListingConfig::default(),
            logging: LoggingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Credential selection.
///
/// Explicit keys win over the profile when both are present.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Profile name in the shared credentials file.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Explicit access key (also accepts `access_key`).
    #[serde(alias = "access_key", default)]
    pub access_key_id: String,

    /// Explicit secret key (also accepts `secret_key`).
    #[serde(alias = "secret_key", default)]
    pub secret_access_key: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

impl CredentialsConfig {
    pub fn to_credentials(&self) -> Credentials {
        if !self.access_key_id.is_empty() && !self.secret_access_key.is_empty() {
            Credentials::keys(&self.access_key_id, &self.secret_access_key)
        } else {
            Credentials::profile(&self.profile)
        }
    }
}

/// Listing caps.  Unset means the service's own page size.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingConfig {
    /// Maximum objects returned by a bucket-contents listing.
    #[serde(default)]
    pub max_keys: Option<i32>,

    /// Maximum versions fetched before filtering to a single key.
    #[serde(default)]
    pub max_versions: Option<i32>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    /// Install the Prometheus recorder for pool and RPC metrics.
    #[serde(default)]
    pub metrics: bool,
}

// -- Defaults ----------------------------------------------------------------

fn default_region() -> Region {
    Region::US_EAST_1
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text.  Blank input yields the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.region, Region::US_EAST_1);
        assert_eq!(config.credentials.to_credentials(), Credentials::profile("default"));
        assert_eq!(config.listing.max_keys, None);
        assert_eq!(config.logging.level, "info");
        assert!(!config.observability.metrics);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
credentials:
  profile: work
region: EU-West-1
endpoint_url: http://localhost:9000
use_path_style: true
listing:
  max_keys: 5
  max_versions: 2
logging:
  level: debug
  format: json
observability:
  metrics: true
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.region, Region::EU_WEST_1);
        assert_eq!(config.credentials.to_credentials(), Credentials::profile("work"));
        assert_eq!(config.endpoint_url, "http://localhost:9000");
        assert!(config.use_path_style);
        assert_eq!(config.listing.max_keys, Some(5));
        assert_eq!(config.listing.max_versions, Some(2));
        assert_eq!(config.logging.format, "json");
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_static_keys_take_precedence() {
        let yaml = r#"
credentials:
  profile: ignored
  access_key: AKIAEXAMPLE
  secret_key: s3cr3t
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(
            config.credentials.to_credentials(),
            Credentials::keys("AKIAEXAMPLE", "s3cr3t")
        );
    }

    #[test]
    fn test_unknown_region_is_rejected() {
        assert!(parse_config("region: atlantis-1").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucketroute.yaml");
        std::fs::write(&path, "region: ap-south-1\n").unwrap();
        assert_eq!(load_config(&path).unwrap().region, Region::AP_SOUTH_1);
    }
}
