// ABOUTME: Command-line entry point for the Cloudant mesh replicator
// ABOUTME: Loads accounts, logs in, picks databases and runs the orchestrator

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::{MultiSelect, Password};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cloudant_mesh_replicator::remote::CloudantClient;
use cloudant_mesh_replicator::{MeshConfig, Orchestrator, Sessions};

#[derive(Parser)]
#[command(name = "cloudant-mesh-replicator")]
#[command(about = "Synchronizes Cloudant databases across regional accounts", long_about = None)]
#[command(version)]
struct Cli {
    /// Account configuration file
    #[arg(short, long, default_value = "mesh.toml")]
    config: PathBuf,

    /// Comma-separated databases to replicate
    #[arg(short, long, value_delimiter = ',')]
    databases: Vec<String>,

    /// Password for accounts that do not set one in the config
    #[arg(short, long, env = "CLOUDANT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = MeshConfig::load(&cli.config)?;

    let shared_password = match cli.password {
        Some(password) => Some(password),
        None if config.needs_shared_password() => Some(
            Password::new()
                .with_prompt("Cloudant password")
                .interact()
                .context("Failed to read password")?,
        ),
        None => None,
    };

    let accounts = config.accounts(shared_password.as_deref())?;
    let client = CloudantClient::new(config.settings.request_timeout())?;

    let sessions = Sessions::open(&client, accounts).await?;
    info!("Logged in to {} accounts", sessions.accounts().len());

    let databases = if !cli.databases.is_empty() {
        Ok(cli.databases)
    } else if !config.databases.is_empty() {
        Ok(config.databases.clone())
    } else {
        choose_databases(&client, &sessions).await
    };

    let databases = match databases {
        Ok(databases) if !databases.is_empty() => databases,
        outcome => {
            // Nothing to replicate, but the sessions are already open.
            if let Err(e) = sessions.terminate(&client).await {
                error!("{}", e);
            }
            return match outcome {
                Err(e) => Err(e),
                Ok(_) => bail!("No databases selected"),
            };
        }
    };

    let mut orchestrator = match Orchestrator::new(client.clone(), databases) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            if let Err(cleanup) = sessions.terminate(&client).await {
                error!("{}", cleanup);
            }
            return Err(e.into());
        }
    };

    let report = orchestrator.run(sessions).await;
    match report.into_result() {
        Ok(()) => {
            info!("All databases are now replicating between every account");
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn choose_databases(client: &CloudantClient, sessions: &Sessions) -> Result<Vec<String>> {
    let first = sessions
        .accounts()
        .first()
        .context("No accounts to list databases from")?;
    let all: Vec<String> = client
        .all_dbs(first)
        .await?
        .into_iter()
        .filter(|db| !db.starts_with('_'))
        .collect();

    if all.is_empty() {
        bail!("No databases found on '{}'", first.endpoint);
    }

    let picked = MultiSelect::new()
        .with_prompt("Select databases to replicate (space to toggle, enter to confirm)")
        .items(&all)
        .interact()
        .context("Failed to read database selection")?;

    Ok(picked.into_iter().map(|i| all[i].clone()).collect())
}
