//! Configuration system for the natprobe CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// natprobe configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Client configuration
    #[serde(default)]
    pub client: ClientSection,
    /// Lifetime probe configuration
    #[serde(default)]
    pub lifetime: LifetimeSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Local IPv4 address probe sockets bind to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: Ipv4Addr,
    /// Initial retransmission timeout in milliseconds
    #[serde(default = "default_rto_ms")]
    pub rto_ms: u64,
    /// Sends per request before giving up
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    /// Verify the FINGERPRINT attribute of received datagrams
    #[serde(default)]
    pub verify_fingerprint: bool,
}

/// Lifetime probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifetimeSection {
    /// First candidate interval in seconds
    #[serde(default = "default_initial")]
    pub initial: u64,
    /// Accepted bracket width in seconds
    #[serde(default = "default_acceptable_error")]
    pub acceptable_error: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default values

fn default_bind_addr() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_rto_ms() -> u64 {
    500
}

fn default_attempts() -> usize {
    7
}

fn default_initial() -> u64 {
    10
}

fn default_acceptable_error() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rto_ms: default_rto_ms(),
            attempts: default_attempts(),
            verify_fingerprint: false,
        }
    }
}

impl Default for LifetimeSection {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            acceptable_error: default_acceptable_error(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("natprobe/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client.rto_ms == 0 {
            anyhow::bail!("rto_ms must be at least 1");
        }
        if self.client.attempts == 0 || self.client.attempts > 32 {
            anyhow::bail!("attempts must be between 1 and 32");
        }
        if self.lifetime.initial == 0 {
            anyhow::bail!("lifetime initial interval must be at least 1 second");
        }
        if self.lifetime.acceptable_error == 0 {
            anyhow::bail!("lifetime acceptable error must be at least 1 second");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.client.bind_addr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.client.rto_ms, 500);
        assert_eq!(config.client.attempts, 7);
        assert!(!config.client.verify_fingerprint);
        assert_eq!(config.lifetime.initial, 10);
        assert_eq!(config.lifetime.acceptable_error, 15);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.client.rto_ms = 0;
        assert!(config.validate().is_err());

        config.client.rto_ms = 500;
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "info".to_string();
        config.client.attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.client.rto_ms, deserialized.client.rto_ms);
        assert_eq!(config.client.bind_addr, deserialized.client.bind_addr);
        assert_eq!(
            config.lifetime.acceptable_error,
            deserialized.lifetime.acceptable_error
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[client]\nrto_ms = 250\n").unwrap();
        assert_eq!(config.client.rto_ms, 250);
        assert_eq!(config.client.attempts, 7);
        assert_eq!(config.lifetime.initial, 10);
    }
}
