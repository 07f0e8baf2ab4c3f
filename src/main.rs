//! # Pipeline Coordinator
//!
//! Runs either side of the worker-coordination protocol.
//!
//! ```bash
//! # Coordinator with an interactive console
//! coordinator serve --dataset data/input.csv
//!
//! # A sequential worker that pipes the dataset through a program
//! coordinator worker --name Cleaner --level 1 --exec ./clean.sh
//!
//! # Effective configuration
//! coordinator config
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use coordinator::{
    adapter::{
        dataset::FileDatasetLoader,
        notifier::ChannelNotifier,
        storage::FileArtifactStore,
        transform::{CommandTransform, NoUpdateTransform}
    },
    cli::{CoordinatorCli, CoordinatorCommand, apply_serve_overrides},
    client::WorkerClient,
    config::{CoordinatorConfig, get_config_file_path, load_config, save_config},
    console,
    port::transform::Transform,
    protocol::Handshake,
    server::Coordinator
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = CoordinatorCli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        CoordinatorCommand::Serve { host, port, dataset, final_tier } => {
            apply_serve_overrides(&mut config.server, host, port, dataset, final_tier);
            serve(config).await
        }
        CoordinatorCommand::Worker { server, name, level, mode, exec } => {
            if let Some(server) = server {
                config.worker.server = server;
            }
            let transform: Box<dyn Transform> = match exec.split_first() {
                Some((program, args)) => Box::new(CommandTransform::new(program.clone(), args.to_vec())),
                None => Box::new(NoUpdateTransform::new(name.clone()))
            };
            worker(config, Handshake { name, level, mode }, transform).await
        }
        CoordinatorCommand::Config { init } => show_config(&config, cli.config, init)
    }
}

async fn serve(config: CoordinatorConfig) -> Result<()> {
    let server = config.server;
    let source = server
        .dataset_path
        .clone()
        .context("No dataset configured; pass --dataset or set server.dataset_path")?;

    let loader = Arc::new(FileDatasetLoader::new(source, server.working_copy.clone()));
    let store = Arc::new(FileArtifactStore::new(
        server.received_dir.clone(),
        server.output_dir.clone(),
        server.backup_dir.clone()
    ));
    let (notifier, results) = ChannelNotifier::new();

    let coordinator = Coordinator::start(&server, loader, store, Arc::new(notifier))
        .await
        .context("Failed to start coordinator")?;

    console::run(&coordinator, results).await;
    coordinator.shutdown().await;
    Ok(())
}

async fn worker(config: CoordinatorConfig, handshake: Handshake, transform: Box<dyn Transform>) -> Result<()> {
    let settings = config.worker.client_settings(config.server.frame_limits());
    let server = settings.server.clone();
    let client = WorkerClient::connect(settings, handshake)
        .await
        .with_context(|| format!("Failed to register with {}", server))?;

    tokio::select! {
        result = client.run(transform.as_ref()) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

fn show_config(config: &CoordinatorConfig, path: Option<PathBuf>, init: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => get_config_file_path()?
    };

    if init {
        save_config(config, &path)?;
        println!("# written to {}", path.display());
    } else {
        println!("# {}", path.display());
    }
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}
