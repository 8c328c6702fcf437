use serde::Deserialize;

/// Complete coordinator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorralConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Liveness and retention configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Silence beyond this many seconds makes an agent stale
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: i64,
    /// How often the health monitor sweeps
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    /// Persisted history older than this is pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_agent_timeout() -> i64 {
    30
}

fn default_health_check_interval() -> u64 {
    10
}

fn default_retention_days() -> i64 {
    30
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            agent_timeout_seconds: default_agent_timeout(),
            health_check_interval_seconds: default_health_check_interval(),
            retention_days: default_retention_days(),
        }
    }
}

/// Fan-out hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Per-sink buffered message budget before the sink counts as slow
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// How often the hub-level heartbeat fires
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

fn default_channel_capacity() -> usize {
    64
}

fn default_heartbeat_interval() -> u64 {
    5
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
        }
    }
}

/// History storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Bound on queued fire-and-forget persistence jobs
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_db_path() -> String {
    "data/corral.db".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for CorralConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            monitoring: MonitoringConfig::default(),
            hub: HubConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<CorralConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: CorralConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CorralConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.monitoring.agent_timeout_seconds, 30);
        assert_eq!(config.monitoring.health_check_interval_seconds, 10);
        assert_eq!(config.hub.channel_capacity, 64);
        assert_eq!(config.storage.queue_capacity, 256);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [monitoring]
            agent_timeout_seconds = 60
            health_check_interval_seconds = 5
            retention_days = 7

            [hub]
            channel_capacity = 16
            heartbeat_interval_seconds = 2

            [storage]
            path = "/tmp/corral.db"
            queue_capacity = 32
        "#;

        let config: CorralConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.monitoring.agent_timeout_seconds, 60);
        assert_eq!(config.monitoring.retention_days, 7);
        assert_eq!(config.hub.channel_capacity, 16);
        assert_eq!(config.storage.path, "/tmp/corral.db");
    }

    #[test]
    fn test_partial_config() {
        // Missing sections fall back to defaults
        let toml = r#"
            [monitoring]
            agent_timeout_seconds = 45
        "#;

        let config: CorralConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.monitoring.agent_timeout_seconds, 45);
        assert_eq!(config.monitoring.health_check_interval_seconds, 10); // Default
        assert_eq!(config.server.port, 8080); // Default
    }
}
