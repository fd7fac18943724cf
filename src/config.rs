//! Configuration
//!
//! YAML configuration covering the server, cache, persistence, cluster,
//! security, logging, monitoring, performance and features sections.
//! Missing file or missing fields fall back to the built-in defaults.
//!
//! Several recognised options (`max_memory`, `eviction_policy`,
//! `compression`, `max_request_size`, `max_connections`, the `cluster`,
//! `security` and `monitoring` sections) are parsed and validated but not
//! enforced by the data plane.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parse a duration literal like `500ms`, `30s`, `5m`, `24h` or `7d`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::Invalid("empty duration".to_string()));
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, "d")
    } else {
        return Err(ConfigError::Invalid(format!("missing duration unit: {s}")));
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid duration: {s}")))?;

    Ok(match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        _ => Duration::from_secs(num * 86400),
    })
}

/// Serde adapter so duration fields read and write literal strings.
mod duration_fmt {
    use super::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if d.subsec_millis() > 0 {
            serializer.serialize_str(&format!("{}ms", d.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", d.as_secs()))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub cache: CacheSection,
    pub persistence: PersistenceSection,
    pub cluster: ClusterSection,
    pub security: SecuritySection,
    pub logging: LoggingSection,
    pub monitoring: MonitoringSection,
    pub performance: PerformanceSection,
    pub features: FeaturesSection,
}

/// Which front-ends to start. The RESP listener runs in every mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Tcp,
    #[default]
    Rest,
    Both,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub mode: ServerMode,
    pub tcp: TcpSection,
    pub rest: RestSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSection {
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    /// Zero disables the deadline; idle connections then live until the
    /// peer closes.
    #[serde(with = "duration_fmt")]
    pub read_timeout: Duration,
    #[serde(with = "duration_fmt")]
    pub write_timeout: Duration,
}

impl Default for TcpSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6380,
            max_connections: 1000,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestSection {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    #[serde(with = "duration_fmt")]
    pub request_timeout: Duration,
    pub max_request_size: String,
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_request_size: "10MB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Lfu,
    Random,
    Ttl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_memory: String,
    pub max_keys: usize,
    #[serde(with = "duration_fmt")]
    pub default_ttl: Duration,
    #[serde(with = "duration_fmt")]
    pub max_ttl: Duration,
    #[serde(with = "duration_fmt")]
    pub cleanup_interval: Duration,
    pub eviction_policy: EvictionPolicy,
    pub eviction_threshold: f64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_memory: "1GB".to_string(),
            max_keys: 1_000_000,
            default_ttl: Duration::ZERO,
            max_ttl: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(60),
            eviction_policy: EvictionPolicy::Lru,
            eviction_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    pub enabled: bool,
    pub file: PathBuf,
    #[serde(with = "duration_fmt")]
    pub interval: Duration,
    pub compression: bool,
    pub backup_count: usize,
    /// Backup rotation fires only once at least this many backups exist.
    pub cleanup_when_exceeds: usize,
    pub snapshot: SnapshotSection,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("./data/boltcache.json"),
            interval: Duration::from_secs(30),
            compression: true,
            backup_count: 3,
            cleanup_when_exceeds: 20,
            snapshot: SnapshotSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    pub enabled: bool,
    #[serde(with = "duration_fmt")]
    pub interval: Duration,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub enabled: bool,
    pub node_id: String,
    pub replication: ReplicationSection,
    pub discovery: DiscoverySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    pub enabled: bool,
    pub mode: String,
    pub replicas: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub method: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub auth: AuthSection,
    pub tls: TlsSection,
    pub rate_limit: RateLimitSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub enabled: bool,
    pub method: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub enabled: bool,
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: String,
    pub file: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSection {
    pub metrics: MetricsSection,
    pub health: HealthSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub enabled: bool,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSection {
    /// Size in bytes of each pooled connection scratch buffer.
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// How many scratch buffers the pool pre-allocates.
    pub buffer_pool_capacity: usize,
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            write_buffer_size: 4096,
            buffer_pool_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    pub lua_scripting: bool,
    pub pub_sub: bool,
    pub complex_types: bool,
    pub transactions: bool,
    pub geo_commands: bool,
    pub streams: bool,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            lua_scripting: true,
            pub_sub: true,
            complex_types: true,
            transactions: false,
            geo_commands: false,
            streams: false,
        }
    }
}

impl Config {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tcp.port == 0 {
            return Err(ConfigError::Invalid("tcp port must be non-zero".into()));
        }
        if self.server.rest.port == 0 {
            return Err(ConfigError::Invalid("rest port must be non-zero".into()));
        }
        let threshold = self.cache.eviction_threshold;
        if !(0.1..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "eviction threshold must be between 0.1 and 1.0, got {threshold}"
            )));
        }
        Ok(())
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.server.tcp.host, self.server.tcp.port)
    }

    /// The RESP listener sits two ports above the text listener.
    pub fn resp_addr(&self) -> String {
        format!("{}:{}", self.server.tcp.host, self.server.tcp.port + 2)
    }

    pub fn rest_addr(&self) -> String {
        format!("{}:{}", self.server.rest.host, self.server.rest.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.mode, ServerMode::Rest);
        assert_eq!(config.server.tcp.port, 6380);
        assert_eq!(config.server.rest.port, 8080);
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(60));
        assert!(config.persistence.enabled);
        assert_eq!(config.persistence.interval, Duration::from_secs(30));
        assert_eq!(config.persistence.backup_count, 3);
        assert_eq!(config.persistence.cleanup_when_exceeds, 20);
        assert!(config.features.lua_scripting);
        assert!(config.features.pub_sub);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_duration_literals() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);

        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("10").is_err());
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
server:
  mode: "both"
  tcp:
    port: 7000
    read_timeout: "30s"
cache:
  cleanup_interval: "5s"
persistence:
  enabled: false
  backup_count: 5
features:
  lua_scripting: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.mode, ServerMode::Both);
        assert_eq!(config.server.tcp.port, 7000);
        assert_eq!(config.server.tcp.read_timeout, Duration::from_secs(30));
        // Untouched fields keep their defaults.
        assert_eq!(config.server.rest.port, 8080);
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(5));
        assert!(!config.persistence.enabled);
        assert_eq!(config.persistence.backup_count, 5);
        assert!(!config.features.lua_scripting);
        assert!(config.features.pub_sub);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.cache.eviction_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_mode_rejected_at_parse() {
        let yaml = "server:\n  mode: \"cluster\"\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_resp_addr_is_tcp_plus_two() {
        let config = Config::default();
        assert_eq!(config.resp_addr(), "0.0.0.0:6382");
    }

    #[test]
    fn test_load_missing_file_is_defaults() {
        let config = Config::load("/nonexistent/boltcache.yaml").unwrap();
        assert_eq!(config.server.tcp.port, 6380);
    }
}
