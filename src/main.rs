use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use masterswap::cli::{format_abort, format_preview, format_summary, Args, OutputFormat};
use masterswap::cluster::{
    ClusterGateway, InMemoryCluster, OcGateway, ReplaceError, ReplacementOrchestrator,
};
use masterswap::config::{load_settings, ReplaceConfig};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let settings = match load_settings(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            process::exit(1);
        }
    };

    let mut inputs = args.config_inputs();
    if inputs.cluster_name.is_none() {
        // the env file may have just provided it
        inputs.cluster_name = std::env::var("CLUSTER_NAME").ok();
    }

    let config = match ReplaceConfig::from_parts(inputs, settings) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let gateway: Arc<dyn ClusterGateway> = match &args.simulate {
        Some(path) => match InMemoryCluster::from_simulation_file(path, &config.target) {
            Ok(cluster) => {
                warn!("Simulating against in-memory cluster from {}", path.display());
                Arc::new(cluster)
            }
            Err(e) => {
                error!("Failed to load simulation {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Arc::new(OcGateway::from_config(&config)),
    };

    let mut orchestrator = match ReplacementOrchestrator::new(gateway, config.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if args.dry_run {
        match orchestrator.preview().await {
            Ok(preview) => match args.output {
                OutputFormat::Text => println!("{}", format_preview(&preview, &config)),
                OutputFormat::Json => print_json(&preview.plan.schedule()),
            },
            Err(ReplaceError::NoSourcePoolsFound { target, skipped }) if skipped.is_empty() => {
                println!("No old master pools with replicas found besides {}; nothing to do.", target);
            }
            Err(e) => {
                error!("Dry run failed: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    info!(run_id = %orchestrator.run_id(), "Replacing masters of cluster {}", config.cluster_name);

    match orchestrator.run().await {
        Ok(summary) => match args.output {
            OutputFormat::Text => println!("{}", format_summary(&summary)),
            OutputFormat::Json => print_json(&summary),
        },
        Err(e) => {
            match args.output {
                OutputFormat::Text => {
                    eprintln!("{}", format_abort(&e, orchestrator.plan(), orchestrator.cycles()))
                }
                OutputFormat::Json => print_json(&serde_json::json!({
                    "run_id": orchestrator.run_id(),
                    "phase": orchestrator.phase(),
                    "error": { "kind": e.kind(), "message": e.to_string() },
                    "plan": orchestrator.plan(),
                    "cycles": orchestrator.cycles(),
                })),
            }
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            process::exit(1);
        }
    }
}
