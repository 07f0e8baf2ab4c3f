use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{
    client::ClientSettings,
    protocol::{FrameLimits, codec::MAX_PEEKABLE_HEADER_BYTES},
    server::acceptor::AcceptorSettings,
    workflow::scheduler::SchedulerSettings
};

/// Configuration for both sides of the coordinator
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig
}

/// Coordinator (server side) settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host:                 String,
    pub port:                 u16,
    /// Initial dataset; required to serve
    pub dataset_path:         Option<PathBuf>,
    /// Backing file rewritten whenever a worker updates the dataset
    pub working_copy:         PathBuf,
    /// Parallel worker outputs
    pub received_dir:         PathBuf,
    /// Final results
    pub output_dir:           PathBuf,
    pub backup_dir:           PathBuf,
    /// Sequential workers at this level run after the parallel phase
    pub final_tier_level:     u32,
    pub handshake_timeout_ms: u64,
    pub work_timeout_ms:      u64,
    pub settle_delay_ms:      u64,
    pub liveness_interval_ms: u64,
    /// How long the next exchange waits for a reply left over from a timed-out one
    pub owed_reply_wait_ms:   u64,
    /// Returned payloads smaller than this do not replace the dataset
    pub min_artifact_bytes:   usize,
    pub max_header_bytes:     u32,
    pub max_payload_bytes:    u64
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = FrameLimits::default();
        Self {
            host:                 "0.0.0.0".to_string(),
            port:                 9090,
            dataset_path:         None,
            working_copy:         PathBuf::from("temp_processing.csv"),
            received_dir:         PathBuf::from("received_from_clients"),
            output_dir:           PathBuf::from("."),
            backup_dir:           PathBuf::from("backups"),
            final_tier_level:     8,
            handshake_timeout_ms: 5_000,
            work_timeout_ms:      180_000,
            settle_delay_ms:      500,
            liveness_interval_ms: 1_000,
            owed_reply_wait_ms:   2_000,
            min_artifact_bytes:   101,
            max_header_bytes:     limits.max_header_bytes,
            max_payload_bytes:    limits.max_payload_bytes
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        // Larger headers would be misread as commands by the peeking side
        FrameLimits {
            max_header_bytes:  self.max_header_bytes.min(MAX_PEEKABLE_HEADER_BYTES),
            max_payload_bytes: self.max_payload_bytes
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            final_tier_level:   self.final_tier_level,
            work_timeout:       Duration::from_millis(self.work_timeout_ms),
            settle_delay:       Duration::from_millis(self.settle_delay_ms),
            owed_reply_wait:    Duration::from_millis(self.owed_reply_wait_ms),
            min_artifact_bytes: self.min_artifact_bytes,
            limits:             self.frame_limits()
        }
    }

    pub fn acceptor_settings(&self) -> AcceptorSettings {
        AcceptorSettings {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            liveness_interval: Duration::from_millis(self.liveness_interval_ms)
        }
    }
}

/// Worker runtime settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Coordinator address, `host:port`
    pub server:               String,
    pub handshake_timeout_ms: u64,
    /// Pause between the status text and the returned frame
    pub settle_delay_ms:      u64
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { server: "127.0.0.1:9090".to_string(), handshake_timeout_ms: 2_000, settle_delay_ms: 500 }
    }
}

impl WorkerConfig {
    pub fn client_settings(&self, limits: FrameLimits) -> ClientSettings {
        ClientSettings {
            server: self.server.clone(),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            limits
        }
    }
}

/// Get the project directories for cross-platform config path resolution
pub fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "pipeline-coordinator").context("Failed to determine project directories")
}

/// Get the configuration directory path
pub fn get_config_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    Ok(project_dirs.config_dir().to_path_buf())
}

/// Get the config file path
pub fn get_config_file_path() -> Result<PathBuf> {
    let config_dir = get_config_dir()?;
    Ok(config_dir.join("coordinator.yaml"))
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file at the default location yields the defaults; a missing
/// explicit path is an error.
pub fn load_config(path: Option<&Path>) -> Result<CoordinatorConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = get_config_file_path()?;
            if !default_path.exists() {
                return Ok(CoordinatorConfig::default());
            }
            default_path
        }
    };

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", config_path.display()))
}

/// Save configuration to `path`, creating parent directories
pub fn save_config(config: &CoordinatorConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(config).context("Failed to serialize config")?;

    fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.yaml");
        fs::write(&path, "server:\n  port: 7000\n  final_tier_level: 3\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.final_tier_level, 3);
        assert_eq!(config.server.work_timeout_ms, 180_000);
        assert_eq!(config.server.min_artifact_bytes, 101);
        assert_eq!(config.worker, WorkerConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coordinator.yaml");
        let mut config = CoordinatorConfig::default();
        config.server.dataset_path = Some(PathBuf::from("data/input.csv"));
        config.worker.server = "10.0.0.5:9090".to_string();

        save_config(&config, &path).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let server = ServerConfig { work_timeout_ms: 1_500, settle_delay_ms: 20, ..ServerConfig::default() };
        let settings = server.scheduler_settings();
        assert_eq!(settings.work_timeout, Duration::from_millis(1_500));
        assert_eq!(settings.settle_delay, Duration::from_millis(20));
        assert_eq!(settings.final_tier_level, 8);
        assert_eq!(server.bind_address(), "0.0.0.0:9090");
    }

    #[test]
    fn test_header_limit_capped_to_peekable_size() {
        let server = ServerConfig { max_header_bytes: 64 * 1024, ..ServerConfig::default() };
        assert_eq!(server.frame_limits().max_header_bytes, MAX_PEEKABLE_HEADER_BYTES);

        let small = ServerConfig { max_header_bytes: 512, ..ServerConfig::default() };
        assert_eq!(small.frame_limits().max_header_bytes, 512);
    }
}
