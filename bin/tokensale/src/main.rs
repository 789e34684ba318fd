//! tokensale is a CLI tool to deploy a token and its crowdsale in one run.

mod cli;

use std::{path::Path, process::ExitCode};

use alloy_core::primitives::{U256, address};
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use tokensale_deploy::{
    ArtifactRegistry, CredentialLock, DeploymentOutcome, DeploymentParameters, DeploymentRecord,
    NetworkRegistry, ResumeFrom, RpcDeployer, SaleArtifacts, SaleOrchestrator, TokensaleConfig,
    format_timestamp, now,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let Cli {
        verbosity,
        config,
        credentials,
        command,
    } = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt().with_max_level(verbosity).init();

    let load_config = || TokensaleConfig::load(&config, credentials.as_deref());

    match command {
        Command::Deploy { network } => deploy(&load_config()?, &network, None).await,
        Command::Resume { network, token } => {
            deploy(&load_config()?, &network, Some(token.resume_from())).await
        }
        Command::Networks => {
            print_networks(&load_config()?.registry());
            Ok(ExitCode::SUCCESS)
        }
        Command::Init { path, force } => {
            init_config(&path, force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run (or resume) a deployment and write its record.
///
/// Errors returned from here happen before any transaction is sent.
async fn deploy(
    config: &TokensaleConfig,
    network: &str,
    resume: Option<ResumeFrom>,
) -> Result<ExitCode> {
    let params = config.sale()?.clone();
    let registry = config.registry();

    let binding = registry.connect(network, &config.credentials)?;
    binding.verify_network_id().await?;

    let _lock = CredentialLock::acquire(&config.lock_dir(), binding.address())?;

    let artifacts = load_artifacts(
        &ArtifactRegistry::new(&config.artifacts.dir),
        config,
        resume,
    )?;

    let record_path = DeploymentRecord::path_for(&config.records_dir, network);
    if resume.is_some() {
        warn_on_changed_params(&record_path, &params);
    }

    let ledger = RpcDeployer::new(&binding, config.confirmation).await?;

    tracing::info!(
        network,
        endpoint = %binding.profile.endpoint_label(),
        chain_id = ledger.chain_id(),
        account = %binding.address(),
        "Connected to network"
    );
    let mut orchestrator =
        SaleOrchestrator::new(ledger, binding.profile, params.clone(), artifacts);

    let outcome = match resume {
        Some(from) => orchestrator.resume(from, now()).await,
        None => orchestrator.run().await,
    };

    let record = DeploymentRecord::from_outcome(network, &params, &outcome);
    if let Err(err) = record.save_to_file(&record_path) {
        tracing::error!(error = %err, "Failed to save deployment record");
    }

    print_summary(network, &outcome);
    Ok(ExitCode::from(outcome.exit_code()))
}

/// A resume bound to an existing token only needs the crowdsale artifact.
fn load_artifacts(
    registry: &ArtifactRegistry,
    config: &TokensaleConfig,
    resume: Option<ResumeFrom>,
) -> Result<SaleArtifacts> {
    let artifacts = match resume {
        Some(ResumeFrom::ExistingToken(_)) => {
            registry.load_for_existing_token(&config.artifacts)?
        }
        Some(ResumeFrom::FreshToken) | None => registry.load_sale(&config.artifacts)?,
    };

    tracing::debug!(
        dir = %registry.dir().display(),
        token_loaded = artifacts.token.is_some(),
        "Artifacts loaded"
    );
    Ok(artifacts)
}

fn warn_on_changed_params(record_path: &Path, params: &DeploymentParameters) {
    match DeploymentRecord::load_from_file(record_path) {
        Ok(record) if !record.matches_params(params) => tracing::warn!(
            path = %record_path.display(),
            "Sale parameters differ from the recorded run"
        ),
        Ok(record) => tracing::debug!(status = %record.status, "Previous deployment record found"),
        Err(err) => tracing::debug!(error = %err, "No usable previous deployment record"),
    }
}

fn print_summary(network: &str, outcome: &DeploymentOutcome) {
    if outcome.token().is_some() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Contract", "Address", "Transaction"]);

        for artifact in outcome.token().into_iter().chain(outcome.crowdsale()) {
            table.add_row(vec![
                artifact.name.clone(),
                artifact.address.to_string(),
                artifact
                    .tx_hash
                    .map(|hash| hash.to_string())
                    .unwrap_or_else(|| "(existing)".to_string()),
            ]);
        }

        println!("{table}");
    }

    match outcome {
        DeploymentOutcome::Complete { .. } => println!("Deployment on {network} complete."),
        DeploymentOutcome::Failed { error } => {
            println!("Deployment on {network} failed, nothing was deployed: {error}")
        }
        DeploymentOutcome::PartiallyComplete { token, error } => {
            println!("Crowdsale deployment on {network} failed: {error}");
            println!("Token {} is live. To finish, run:", token.address);
            println!(
                "  tokensale resume {network} --token {}",
                token.address
            );
        }
    }
}

fn print_networks(registry: &NetworkRegistry) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Network", "Endpoint", "Network id", "Gas"]);

    for (name, profile) in registry.iter() {
        table.add_row(vec![
            name.clone(),
            profile.endpoint_label(),
            profile.network_id.to_string(),
            profile
                .gas
                .map(|gas| gas.to_string())
                .unwrap_or_else(|| "default".to_string()),
        ]);
    }

    println!("{table}");
}

/// Write a configuration template with a sale opening in one day.
fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite it",
            path.display()
        );
    }

    let opening_time = now() + 24 * 60 * 60;
    let config = TokensaleConfig {
        sale: Some(DeploymentParameters {
            beneficiary: address!("64293d503191BB5298cD15B64D733CFF5151a683"),
            opening_time,
            closing_time: opening_time + 7 * 24 * 60 * 60,
            rate: 10,
            goal: U256::from(4_000_000_000_000_000_000u128),
            cap: U256::from(50_000_000_000_000_000_000u128),
            gas_price: 50_000_000_000,
        }),
        ..TokensaleConfig::default()
    };

    config
        .save_to_file(path)
        .with_context(|| format!("Failed to write template to {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        opening = %format_timestamp(opening_time),
        "Configuration template written, set the beneficiary and credentials before deploying"
    );
    Ok(())
}
