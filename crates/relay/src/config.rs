// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HEARTBEAT_SECS: u64 = 5;
const MAX_HEARTBEAT_SECS: u64 = 300;

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Directory holding one working copy per open document.
    pub data_dir: PathBuf,
    /// Directory that document paths are resolved against on first register.
    pub workspace_root: PathBuf,
    /// Expected interval between client heartbeats.
    pub heartbeat_interval: Duration,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `tandem_relay=debug`).
    pub log_filter: String,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TANDEM_RELAY_HOST` | `0.0.0.0` |
    /// | `TANDEM_RELAY_PORT` | `8080` |
    /// | `TANDEM_RELAY_DATA_DIR` | `./.tandem/working-copies` |
    /// | `TANDEM_RELAY_WORKSPACE_ROOT` | `.` |
    /// | `TANDEM_RELAY_HEARTBEAT_SECS` | `5`, clamped to `1..=300` |
    /// | `TANDEM_RELAY_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `TANDEM_RELAY_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("TANDEM_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("TANDEM_RELAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let data_dir = env("TANDEM_RELAY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.tandem/working-copies"));
        let workspace_root = env("TANDEM_RELAY_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let heartbeat_secs = env("TANDEM_RELAY_HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HEARTBEAT_SECS)
            .clamp(1, MAX_HEARTBEAT_SECS);

        let cors_origins = env("TANDEM_RELAY_CORS_ORIGINS").ok();
        let log_filter = env("TANDEM_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self {
            listen_addr,
            data_dir,
            workspace_root,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            cors_origins,
            log_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = RelayConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert_eq!(cfg.data_dir, PathBuf::from("./.tandem/working-copies"));
        assert_eq!(cfg.workspace_root, PathBuf::from("."));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_HOST", "127.0.0.1");
        m.insert("TANDEM_RELAY_PORT", "3000");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn invalid_port_uses_default() {
        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_PORT", "not_a_number");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 8080);
    }

    #[test]
    fn heartbeat_interval_is_clamped() {
        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_HEARTBEAT_SECS", "0");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(1));

        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_HEARTBEAT_SECS", "86400");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(300));

        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_HEARTBEAT_SECS", "12");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(12));
    }

    #[test]
    fn directories_from_env() {
        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_DATA_DIR", "/var/lib/tandem");
        m.insert("TANDEM_RELAY_WORKSPACE_ROOT", "/srv/docs");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/tandem"));
        assert_eq!(cfg.workspace_root, PathBuf::from("/srv/docs"));
    }

    #[test]
    fn cors_and_log_filter_overrides() {
        let mut m = HashMap::new();
        m.insert("TANDEM_RELAY_CORS_ORIGINS", "https://editor.example.com");
        m.insert("TANDEM_RELAY_LOG_FILTER", "debug,tower_http=trace");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.cors_origins.as_deref(), Some("https://editor.example.com"));
        assert_eq!(cfg.log_filter, "debug,tower_http=trace");
    }
}
