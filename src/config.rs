use std::env;
use std::path::PathBuf;

/// How long a request may sit in `pending` before the expiry sweep
/// auto-resolves it (7 days).
pub const DEFAULT_PENDING_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

/// How often the external scheduler is expected to invoke the sweep
/// (every 6 hours). The engine itself does not run a timer; this is
/// documentation for whoever wires up cron.
pub const SWEEP_INTERVAL_SECS: i64 = 6 * 60 * 60;

/// Configuration for the service-market CLI tool
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (default: `.service-market/` in current directory)
    pub data_dir: PathBuf,

    /// Output format: "human" (default) or "json"
    pub output_format: String,

    /// Log level: "info", "debug", "warn", "error" (default: "info")
    pub log_level: String,

    /// Seconds a pending request may wait before the sweep expires it
    pub pending_window_secs: i64,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        let data_dir = env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".service-market");

        Config {
            data_dir,
            output_format: "human".to_string(),
            log_level: "info".to_string(),
            pending_window_secs: DEFAULT_PENDING_WINDOW_SECS,
        }
    }

    /// Create config with custom data directory
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Config {
            data_dir,
            ..Config::new()
        }
    }

    /// Get the data directory path
    pub fn get_data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Set data directory
    pub fn set_data_dir(&mut self, dir: PathBuf) {
        self.data_dir = dir;
    }

    /// Get output format
    pub fn get_output_format(&self) -> &str {
        &self.output_format
    }

    /// Set output format ("human" or "json")
    pub fn set_output_format(&mut self, format: String) {
        self.output_format = format;
    }

    /// Get the operation log path
    pub fn get_op_log_path(&self) -> PathBuf {
        self.data_dir.join("ops.log")
    }

    /// Get the state snapshot path
    pub fn get_state_path(&self) -> PathBuf {
        self.data_dir.join("state.bin")
    }

    /// Load config from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_MARKET_DATA_DIR`: override data directory
    /// - `SERVICE_MARKET_OUTPUT_FORMAT`: "human" or "json"
    /// - `SERVICE_MARKET_LOG_LEVEL`: log level
    /// - `SERVICE_MARKET_PENDING_WINDOW_SECS`: pending expiry window
    pub fn from_env() -> Self {
        let mut config = Config::new();

        if let Ok(dir) = env::var("SERVICE_MARKET_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(format) = env::var("SERVICE_MARKET_OUTPUT_FORMAT") {
            config.output_format = format;
        }

        if let Ok(level) = env::var("SERVICE_MARKET_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(secs) = env::var("SERVICE_MARKET_PENDING_WINDOW_SECS") {
            if let Ok(parsed) = secs.parse::<i64>() {
                config.pending_window_secs = parsed;
            }
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new();
        assert_eq!(config.output_format, "human");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.pending_window_secs, DEFAULT_PENDING_WINDOW_SECS);
        assert!(config.data_dir.ends_with(".service-market"));
    }

    #[test]
    fn test_config_paths() {
        let config = Config::new();
        assert!(config.get_op_log_path().ends_with("ops.log"));
        assert!(config.get_state_path().ends_with("state.bin"));
    }

    #[test]
    fn test_config_setters() {
        let mut config = Config::new();
        config.set_output_format("json".to_string());
        assert_eq!(config.get_output_format(), "json");

        config.set_data_dir(PathBuf::from("/tmp/market-data"));
        assert!(config.get_op_log_path().starts_with("/tmp/market-data"));
    }
}
