use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address
    pub bind_addr: String,

    /// Port to listen on
    pub port: u16,

    /// Capacity hint for the keyspace, rounded up to a power-of-two shard count
    pub shard_capacity: usize,

    /// TCP nodelay
    pub tcp_nodelay: bool,

    /// Read buffer size (per connection)
    pub read_buffer_size: usize,

    /// Backoff after a transient accept error
    pub accept_backoff_ms: u64,

    /// Upper bound on how long the accept loop sleeps in poll
    pub poll_interval_ms: u64,

    /// Install the SIGINT/SIGTERM/SIGHUP/SIGQUIT listener while serving
    pub handle_signals: bool,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 6399,
            shard_capacity: 1024,
            tcp_nodelay: true,
            read_buffer_size: 16 * 1024, // 16KB
            accept_backoff_ms: 5,
            poll_interval_ms: 100,
            handle_signals: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use shardkv_server::Config;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::from_file("config.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be > 0");
        }

        if self.read_buffer_size < 1024 {
            anyhow::bail!("read_buffer_size must be >= 1024");
        }

        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be > 0");
        }

        Ok(())
    }

    /// Address string handed to the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
