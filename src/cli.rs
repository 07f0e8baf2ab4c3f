use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{config::ServerConfig, domain::worker::WorkerMode};

/// Coordinate a pipeline of remote workers over TCP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CoordinatorCli {
    /// Configuration file; defaults to coordinator.yaml in the platform config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: CoordinatorCommand
}

#[derive(Subcommand, Debug)]
pub enum CoordinatorCommand {
    /// Accept workers and drive workflows from an interactive console
    Serve {
        /// Address to listen on
        #[arg(long)]
        host:       Option<String>,
        #[arg(long)]
        port:       Option<u16>,
        /// Initial dataset
        #[arg(long)]
        dataset:    Option<PathBuf>,
        /// Level whose sequential workers run after the parallel phase
        #[arg(long)]
        final_tier: Option<u32>
    },
    /// Connect to a coordinator and process datasets
    Worker {
        /// Coordinator address, host:port
        #[arg(long)]
        server: Option<String>,
        /// Unique worker name
        #[arg(long)]
        name:   String,
        /// Pipeline position, 1 runs first
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        level:  u32,
        #[arg(long, value_enum, default_value_t = WorkerMode::Sequential)]
        mode:   WorkerMode,
        /// Program that receives the dataset on stdin and prints the updated dataset
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        exec:   Vec<String>
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        init: bool
    }
}

/// Apply `serve` flags on top of the loaded configuration
pub fn apply_serve_overrides(
    config: &mut ServerConfig,
    host: Option<String>,
    port: Option<u16>,
    dataset: Option<PathBuf>,
    final_tier: Option<u32>
) {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(dataset) = dataset {
        config.dataset_path = Some(dataset);
    }
    if let Some(level) = final_tier {
        config.final_tier_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worker_command() {
        let cli = CoordinatorCli::parse_from([
            "coordinator", "worker", "--name", "Tokenizer", "--level", "2", "--mode", "parallel", "--exec", "tr",
            "a-z", "A-Z"
        ]);
        match cli.command {
            CoordinatorCommand::Worker { name, level, mode, exec, server } => {
                assert_eq!(name, "Tokenizer");
                assert_eq!(level, 2);
                assert_eq!(mode, WorkerMode::Parallel);
                assert_eq!(exec, ["tr", "a-z", "A-Z"]);
                assert!(server.is_none());
            }
            other => panic!("unexpected command {other:?}")
        }
    }

    #[test]
    fn test_level_zero_rejected() {
        assert!(CoordinatorCli::try_parse_from(["coordinator", "worker", "--name", "A", "--level", "0"]).is_err());
    }

    #[test]
    fn test_serve_overrides() {
        let cli = CoordinatorCli::parse_from(["coordinator", "serve", "--port", "7000", "--dataset", "data.csv"]);
        let CoordinatorCommand::Serve { host, port, dataset, final_tier } = cli.command else {
            panic!("expected serve");
        };
        let mut config = ServerConfig::default();
        apply_serve_overrides(&mut config, host, port, dataset, final_tier);
        assert_eq!(config.port, 7000);
        assert_eq!(config.dataset_path, Some(PathBuf::from("data.csv")));
        assert_eq!(config.host, "0.0.0.0");
    }
}
