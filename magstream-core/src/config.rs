//! Centralized configuration for Magstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Magstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct MagstreamConfig {
    pub session: SessionConfig,
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub simulation: SimulationConfig,
}

/// Per-session lifecycle tuning.
///
/// Controls how much of a torrent is fetched eagerly and how long an
/// unattended session lingers before it is paused and then torn down.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fraction of total pieces fetched at high priority from the start
    pub preload_ratio: f64,
    /// Delay after the last connection detaches before the main file is deselected
    pub pause_delay: Duration,
    /// Delay after pausing before the session is destroyed
    pub remove_delay: Duration,
    /// How long to wait for torrent metadata before failing the session
    pub metadata_timeout: Duration,
    /// Keep downloaded data on disk when a session is destroyed
    pub keep_data_on_destroy: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preload_ratio: 0.001,
            pause_delay: Duration::from_secs(3),
            remove_delay: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(20),
            keep_data_on_destroy: false,
        }
    }
}

/// HTTP streaming configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Bytes delivered before a session is reported as serving
    pub serving_threshold_bytes: u64,
    /// Sampling interval for the serving meter
    pub serving_window: Duration,
    /// Delay before redirecting a client whose session has no metadata yet
    pub not_ready_retry_delay: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            serving_threshold_bytes: 10 * 1024 * 1024, // 10 MiB
            serving_window: Duration::from_secs(1),
            not_ready_retry_delay: Duration::from_secs(1),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

/// Where swarm engines keep downloaded data.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub download_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
        }
    }
}

/// Parameters for the in-process simulated swarm.
///
/// The simulated swarm stands in for a real BitTorrent engine during
/// development and testing.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay before the swarm reports torrent metadata
    pub metadata_delay: Duration,
    /// Time taken to fetch and verify one piece
    pub piece_interval: Duration,
    /// Piece size in bytes
    pub piece_length: u64,
    /// Size of the synthesized main media file
    pub main_file_size: u64,
    /// Peer count range reported while downloading
    pub min_peers: usize,
    pub max_peers: usize,
    /// Uploaded bytes per downloaded byte
    pub upload_ratio: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            metadata_delay: Duration::from_millis(1500),
            piece_interval: Duration::from_millis(20),
            piece_length: 256 * 1024, // 256 KiB
            main_file_size: 64 * 1024 * 1024,
            min_peers: 8,
            max_peers: 40,
            upload_ratio: 0.25,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            metadata_delay: Duration::from_millis(10),
            piece_interval: Duration::from_millis(1),
            piece_length: 16 * 1024,
            main_file_size: 1024 * 1024,
            min_peers: 4,
            max_peers: 4,
            upload_ratio: 0.0,
        }
    }
}

impl MagstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ratio) = env_parse::<f64>("MAGSTREAM_PRELOAD_RATIO") {
            config.session.preload_ratio = ratio;
        }
        if let Some(seconds) = env_parse::<u64>("MAGSTREAM_PAUSE_DELAY_SECS") {
            config.session.pause_delay = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env_parse::<u64>("MAGSTREAM_REMOVE_DELAY_SECS") {
            config.session.remove_delay = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env_parse::<u64>("MAGSTREAM_METADATA_TIMEOUT_SECS") {
            config.session.metadata_timeout = Duration::from_secs(seconds);
        }
        if let Some(keep) = env_parse::<bool>("MAGSTREAM_KEEP_DATA") {
            config.session.keep_data_on_destroy = keep;
        }
        if let Some(bytes) = env_parse::<u64>("MAGSTREAM_SERVING_THRESHOLD_BYTES") {
            config.streaming.serving_threshold_bytes = bytes;
        }
        if let Some(port) = env_parse::<u16>("MAGSTREAM_PORT") {
            config.server.port = port;
        }
        if let Ok(host) = std::env::var("MAGSTREAM_HOST") {
            if !host.is_empty() {
                config.server.host = host;
            }
        }
        if let Ok(dir) = std::env::var("MAGSTREAM_DOWNLOAD_DIR") {
            if !dir.is_empty() {
                config.storage.download_dir = PathBuf::from(dir);
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Every delay is shortened so lifecycle tests finish quickly.
    pub fn for_testing() -> Self {
        Self {
            session: SessionConfig {
                pause_delay: Duration::from_millis(30),
                remove_delay: Duration::from_millis(50),
                metadata_timeout: Duration::from_millis(500),
                ..SessionConfig::default()
            },
            streaming: StreamingConfig {
                serving_threshold_bytes: 64 * 1024,
                serving_window: Duration::from_millis(10),
                not_ready_retry_delay: Duration::from_millis(10),
            },
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = MagstreamConfig::default();

        assert_eq!(config.session.preload_ratio, 0.001);
        assert_eq!(config.session.pause_delay, Duration::from_secs(3));
        assert_eq!(config.session.remove_delay, Duration::from_secs(5));
        assert_eq!(config.session.metadata_timeout, Duration::from_secs(20));
        assert!(!config.session.keep_data_on_destroy);
        assert_eq!(config.streaming.serving_threshold_bytes, 10 * 1024 * 1024);
        assert_eq!(config.streaming.serving_window, Duration::from_secs(1));
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_testing_preset_shortens_delays() {
        let config = MagstreamConfig::for_testing();
        let defaults = MagstreamConfig::default();

        assert!(config.session.pause_delay < defaults.session.pause_delay);
        assert!(config.session.remove_delay < defaults.session.remove_delay);
        assert!(config.session.metadata_timeout < defaults.session.metadata_timeout);
        assert_eq!(config.simulation.max_peers, 4);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("MAGSTREAM_PRELOAD_RATIO", "0.01");
            std::env::set_var("MAGSTREAM_PAUSE_DELAY_SECS", "7");
            std::env::set_var("MAGSTREAM_KEEP_DATA", "true");
            std::env::set_var("MAGSTREAM_PORT", "not-a-port");
        }

        let config = MagstreamConfig::from_env();

        assert_eq!(config.session.preload_ratio, 0.01);
        assert_eq!(config.session.pause_delay, Duration::from_secs(7));
        assert!(config.session.keep_data_on_destroy);
        assert_eq!(config.server.port, 3001);

        unsafe {
            std::env::remove_var("MAGSTREAM_PRELOAD_RATIO");
            std::env::remove_var("MAGSTREAM_PAUSE_DELAY_SECS");
            std::env::remove_var("MAGSTREAM_KEEP_DATA");
            std::env::remove_var("MAGSTREAM_PORT");
        }
    }
}
