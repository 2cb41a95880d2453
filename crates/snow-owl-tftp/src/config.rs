use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::{Result, TftpError};

/// Write operation configuration for the example filesystem handler.
///
/// NIST 800-53 Controls:
/// - AC-3: Access Enforcement (restrict write access)
/// - AC-6: Least Privilege (minimal write permissions)
/// - CM-5: Access Restrictions for Change (control file modifications)
///
/// STIG V-222602: Applications must enforce access restrictions
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WriteConfig {
    /// Enable write operations (disabled by default for security)
    pub enabled: bool,

    /// Allow overwriting existing files. When false, an existing file
    /// causes the write route to fail instead of truncating it.
    pub allow_overwrite: bool,

    /// Glob patterns the write route will accept. Empty means no writes.
    pub allowed_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TftpConfig {
    /// UDP address the reactor binds. Default matches the framework's
    /// historical development default (127.0.0.1:3942); production
    /// deployments typically set this to ":69".
    pub bind_addr: SocketAddr,
    /// Staleness threshold the maintainer uses to detect conversations
    /// needing a retransmit.
    pub resend_timeout_secs: u64,
    /// Retry budget before a stale conversation is timed out.
    pub retries_before_giveup: u32,
    /// Maintainer sweep interval.
    pub maintainer_tick_secs: u64,
    /// Number of tasks in the reactor's bounded worker pool.
    pub worker_count: usize,
    /// Depth of the bounded queue feeding the worker pool.
    pub worker_channel_capacity: usize,
    pub logging: LoggingConfig,
    /// Root directory and write policy for the example filesystem handler
    /// wired up by `snow-owl-tftp-server`; unused by the core itself.
    pub root_dir: PathBuf,
    pub write_config: WriteConfig,
    /// Maximum file size in bytes the example read handler will serve.
    /// Zero means unlimited, but in all cases `ReadBuffer` itself rejects a
    /// payload past `buffer::MAX_READ_SIZE` (the largest size a 16-bit block
    /// number can address); the default matches that ceiling exactly.
    pub max_file_size_bytes: u64,
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 3942),
            resend_timeout_secs: 5,
            retries_before_giveup: 6,
            maintainer_tick_secs: 1,
            worker_count: 4,
            worker_channel_capacity: 1024,
            logging: LoggingConfig::default(),
            root_dir: PathBuf::from("/var/lib/snow-owl/tftp"),
            write_config: WriteConfig::default(),
            max_file_size_bytes: crate::buffer::MAX_READ_SIZE as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    /// JSON structured logging for SIEM / log-aggregator ingestion.
    Json,
}

pub fn load_config(path: &std::path::Path) -> Result<TftpConfig> {
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents)
        .map_err(|e| TftpError::Protocol(format!("invalid config file {}: {}", path.display(), e)))
}

pub fn write_default_config(path: &std::path::Path) -> Result<()> {
    write_config(path, &TftpConfig::default())
}

pub fn write_config(path: &std::path::Path, config: &TftpConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| TftpError::Protocol(format!("failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Validate configuration for correctness before the server binds.
///
/// NIST 800-53 Controls:
/// - CM-6: Configuration Settings (validate all configuration parameters)
/// - SC-7: Boundary Protection (validate network bindings)
/// - SC-5: Denial of Service Protection (validate resource limits)
pub fn validate_config(config: &TftpConfig, validate_bind: bool) -> Result<()> {
    if config.bind_addr.port() == 0 {
        return Err(TftpError::Protocol("bind_addr port must be non-zero".into()));
    }

    if config.retries_before_giveup == 0 {
        return Err(TftpError::Protocol(
            "retries_before_giveup must be at least 1".into(),
        ));
    }

    if config.maintainer_tick_secs == 0 {
        return Err(TftpError::Protocol(
            "maintainer_tick_secs must be at least 1".into(),
        ));
    }

    if config.worker_count == 0 {
        return Err(TftpError::Protocol("worker_count must be at least 1".into()));
    }

    if validate_bind {
        if let Err(e) = std::net::UdpSocket::bind(config.bind_addr) {
            return Err(TftpError::Protocol(format!("bind_addr is not available: {e}")));
        }
    }

    if let Some(ref log_file) = config.logging.file {
        let parent = log_file
            .parent()
            .ok_or_else(|| TftpError::Protocol("logging.file must include a parent directory".into()))?;
        match std::fs::metadata(parent) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(TftpError::Protocol("logging.file parent must be a directory".into())),
            Err(e) => return Err(TftpError::Protocol(format!("logging.file parent error: {e}"))),
        }
    }

    validate_write_config(&config.write_config)
}

/// Enforce least-privilege write policy (NIST AC-3, AC-6; STIG V-222602):
/// writes must be explicitly scoped to a non-empty, non-wildcard pattern
/// set, never opened up by default.
pub fn validate_write_config(config: &WriteConfig) -> Result<()> {
    if config.enabled && config.allowed_patterns.is_empty() {
        return Err(TftpError::Protocol(
            "write operations enabled but no allowed_patterns specified".into(),
        ));
    }

    for pattern in &config.allowed_patterns {
        if pattern.trim().is_empty() {
            return Err(TftpError::Protocol(
                "write allowed_patterns cannot contain empty patterns".into(),
            ));
        }
        if pattern == "*" || pattern == "**" || pattern == "**/*" {
            return Err(TftpError::Protocol(format!(
                "write pattern '{pattern}' is too permissive; use a specific pattern like '*.txt'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let toml = r#"
bind_addr = "127.0.0.1:6969"
"#;
        let config: TftpConfig = toml::from_str(toml)?;
        validate_config(&config, false)?;
        Ok(())
    }

    #[test]
    fn round_trips_through_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        write_default_config(&path)?;
        let loaded = load_config(&path)?;
        assert_eq!(loaded.bind_addr, TftpConfig::default().bind_addr);
        Ok(())
    }

    #[test]
    fn logging_file_with_missing_parent_dir_is_rejected() {
        let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let mut config = TftpConfig::default();
        config.logging.file = Some(temp_dir.path().join("does-not-exist").join("server.log"));
        let err = validate_config(&config, false).unwrap_err();
        assert!(format!("{err}").contains("logging.file parent"));
    }

    #[test]
    fn rejects_zero_bind_port() {
        let mut config = TftpConfig::default();
        config.bind_addr = "127.0.0.1:0".parse().unwrap();
        let err = validate_config(&config, false).unwrap_err();
        assert!(format!("{err}").contains("bind_addr port must be non-zero"));
    }

    #[test]
    fn rejects_zero_retry_budget() {
        let mut config = TftpConfig::default();
        config.retries_before_giveup = 0;
        let err = validate_config(&config, false).unwrap_err();
        assert!(format!("{err}").contains("retries_before_giveup"));
    }

    #[test]
    fn rejects_zero_maintainer_tick() {
        let mut config = TftpConfig::default();
        config.maintainer_tick_secs = 0;
        let err = validate_config(&config, false).unwrap_err();
        assert!(format!("{err}").contains("maintainer_tick_secs"));
    }

    #[test]
    fn rejects_bind_addr_when_in_use() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0")?;
        let port = socket.local_addr()?.port();

        let mut config = TftpConfig::default();
        config.bind_addr = format!("127.0.0.1:{port}").parse()?;
        match validate_config(&config, true) {
            Ok(()) => Err("expected error for bind_addr in use".into()),
            Err(err) => {
                assert!(format!("{err}").contains("bind_addr is not available"));
                Ok(())
            }
        }
    }

    #[test]
    fn rejects_writes_enabled_with_no_patterns() {
        let mut config = WriteConfig::default();
        config.enabled = true;
        let err = validate_write_config(&config).unwrap_err();
        assert!(format!("{err}").contains("no allowed_patterns specified"));
    }

    #[test]
    fn rejects_overly_permissive_patterns() {
        for pattern in &["*", "**", "**/*"] {
            let config = WriteConfig {
                enabled: true,
                allow_overwrite: false,
                allowed_patterns: vec![pattern.to_string()],
            };
            let err = validate_write_config(&config).unwrap_err();
            assert!(format!("{err}").contains("too permissive"));
        }
    }

    #[test]
    fn accepts_valid_write_config() {
        let config = WriteConfig {
            enabled: true,
            allow_overwrite: true,
            allowed_patterns: vec!["*.txt".to_string(), "configs/*.cfg".to_string()],
        };
        assert!(validate_write_config(&config).is_ok());
    }

    #[test]
    fn accepts_write_disabled_with_no_patterns() {
        let config = WriteConfig::default();
        assert!(validate_write_config(&config).is_ok());
    }
}
