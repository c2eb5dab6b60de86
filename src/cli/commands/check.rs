//! The `check` subcommand: configuration assembly, server resolution and
//! the final console summary.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use comfy_table::Table;
use console::style;
use tracing::info;

use crate::cli::types::CheckArgs;
use crate::domain::models::{CheckConfig, CheckReport, ServerAddress};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::registry;
use crate::services::ClusterChecker;

/// Run a full cluster check.
pub async fn execute(args: CheckArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = build_config(&args, config_path)?;
    let output_dir = config.output_dir.clone();

    let checker = ClusterChecker::new(config.clone())
        .await
        .context("failed to initialize the checker")?;
    let servers = resolve_servers(&config, &checker).await?;
    info!(replicas = servers.len(), "starting consistency check");

    let report = checker.run(&servers).await?;
    print_summary(&report, &output_dir);
    Ok(())
}

fn build_config(args: &CheckArgs, config_path: Option<PathBuf>) -> Result<CheckConfig> {
    let mut config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if !args.servers.is_empty() {
        config.servers = args.servers.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(percent) = args.content_sample_percent {
        config.content_sample_percent = percent;
    }
    if args.fail_fast {
        config.fail_fast = true;
    }
    ConfigLoader::validate(&config)?;
    Ok(config)
}

async fn resolve_servers(
    config: &CheckConfig,
    checker: &ClusterChecker,
) -> Result<Vec<ServerAddress>> {
    if !config.servers.is_empty() {
        return Ok(config.servers.clone());
    }
    let Some(registry_url) = &config.registry_url else {
        bail!("no replica addresses configured and no registry_url to discover them from");
    };
    let servers = registry::discover_servers(checker.client(), registry_url)
        .await
        .context("registry discovery failed")?;
    info!(registry = %registry_url, replicas = servers.len(), "discovered replicas");
    Ok(servers)
}

fn print_summary(report: &CheckReport, output_dir: &std::path::Path) {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Failures"]);
    table.add_row(vec![
        "Entities".to_string(),
        report.failed_entities.len().to_string(),
    ]);
    table.add_row(vec![
        "Audit".to_string(),
        report.failed_audit.len().to_string(),
    ]);
    table.add_row(vec![
        "Pointers".to_string(),
        report.failed_pointers.len().to_string(),
    ]);
    table.add_row(vec![
        "Content availability".to_string(),
        report.failed_content.len().to_string(),
    ]);
    table.add_row(vec![
        "Content files".to_string(),
        report.failed_content_files.len().to_string(),
    ]);
    println!("{table}");

    let total = report.total_failures();
    if total == 0 {
        println!("{}", style("All synchronized replicas agree").green());
    } else {
        println!(
            "{}",
            style(format!(
                "{total} failures recorded. See {} for details",
                output_dir.join("failed.txt").display()
            ))
            .red()
        );
    }
}
