//! kubetopo - live topology graph of Kubernetes cluster resources
//!
//! Builds the graph from one snapshot of every tracked collection and keeps
//! it current from the Kubernetes watch API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kubetopo::cli::{ConfigSubcommand, handle_config_command, init_logging};
use kubetopo::config::ConfigLoader;
use kubetopo::graph::render::render_text;
use kubetopo::kube::KubeClusterSource;
use kubetopo::models::ResourceKind;
use kubetopo::services::{SessionOptions, TopologySession, fetch_snapshot};

/// kubetopo - live topology graph of Kubernetes cluster resources
#[derive(Parser, Debug)]
#[command(name = "kubetopo")]
#[command(about = "Live topology graph of Kubernetes cluster resources", long_about = None)]
struct Args {
    /// Enable debug logging (written to a temporary file)
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Kubeconfig context to use instead of the configured one
    #[arg(long, global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Main commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Build the graph once and print it
    Snapshot {
        /// Print the full graph as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow live updates, printing a summary after every change
    Watch,
    /// List tracked resource kinds
    Kinds,
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let command = match args.command {
        Command::Config { subcommand } => {
            return handle_config_command(subcommand, args.context.as_deref());
        }
        Command::Kinds => return print_kinds(),
        command => command,
    };

    let loaded = ConfigLoader::load(args.context.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logger.level.clone())
        .unwrap_or_else(|_| "warn".to_string());

    let log_file = init_logging(args.debug, &level)?;
    if let Some(ref log_path) = log_file {
        eprintln!(
            "Debug logging enabled. Logs written to: {}",
            log_path.display()
        );
    }

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{:#}", e), "Failed to load configuration, using defaults");
        ConfigLoader::load_defaults()
    });
    let context = config
        .context()
        .map(str::to_string)
        .or_else(kubetopo::kube::current_context)
        .unwrap_or_else(|| "<in-cluster>".to_string());
    tracing::debug!(
        context = %context,
        timeout_secs = config.fetch.timeout_secs,
        "Configuration loaded"
    );

    match command {
        Command::Snapshot { json } => {
            let client = kubetopo::kube::client_for(config.context()).await?;
            let source = Arc::new(KubeClusterSource::new(client));
            let (graph, fetched) = fetch_snapshot(source, &SessionOptions::from_config(&config))
                .await
                .context("Snapshot failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&graph).context("Failed to serialize graph")?
                );
            } else {
                print!("{}", render_text(&graph));
            }
            for collection in fetched.iter().filter(|c| c.is_degraded()) {
                eprintln!(
                    "warning: {} unavailable: {}",
                    collection.spec.kind,
                    collection.error.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Watch => watch(&config).await?,
        Command::Kinds | Command::Config { .. } => {}
    }

    Ok(())
}

fn print_kinds() -> Result<()> {
    println!("{:<24}{:<32}{:<28}SCOPE", "KIND", "API VERSION", "PLURAL");
    for spec in ResourceKind::collections() {
        let scope = if spec.namespaced { "Namespaced" } else { "Cluster" };
        println!(
            "{:<24}{:<32}{:<28}{}",
            spec.kind.as_str(),
            spec.api_version(),
            spec.plural,
            scope
        );
    }
    Ok(())
}

async fn watch(config: &kubetopo::config::Config) -> Result<()> {
    let session = TopologySession::connect(config).await?;
    for kind in session.degraded_kinds() {
        eprintln!("warning: {} unavailable, following changes only", kind);
    }
    println!("{}", session.current_graph().summary());

    let mut revisions = session.subscribe();
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", session.current_graph().summary());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
