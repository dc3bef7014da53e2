use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use tidemirror_core::modules::config as core_config;
use tidemirror_core::{AttemptOutcome, FetchOptions, FetchReport, MirrorClient, RequireJsonField, TargetRegistry};
use tidemirror_types::{MirrorConfig, ProtocolVersion, Region};

pub struct FetchArgs {
    pub url: String,
    pub api: ProtocolVersion,
    pub quality: Option<String>,
    pub region: Region,
    pub require_field: Option<String>,
    pub output: Option<PathBuf>,
    pub report: bool,
}

pub async fn fetch(config: &MirrorConfig, args: FetchArgs) -> Result<()> {
    let client = MirrorClient::from_config(config).context("Failed to build mirror client")?;

    let mut options = FetchOptions::new().version(args.api).region(args.region);
    if let Some(quality) = args.quality {
        options = options.preferred_quality(quality);
    }
    if let Some(field) = args.require_field {
        options = options.validator(Arc::new(RequireJsonField(field)));
    }

    let report = client.fetch_with_report(&args.url, options).await?;
    if args.report {
        print_attempts(&report);
    }

    if report.outcome != AttemptOutcome::Accepted {
        anyhow::bail!(
            "all mirrors failed after {} attempts; last useful response: {} ({})",
            report.attempts.len(),
            report.response.status(),
            report.outcome
        );
    }

    tracing::info!(
        mirror = report.response.target().unwrap_or("-"),
        status = %report.response.status(),
        "Fetched {}",
        args.url
    );
    write_body(report, args.output.as_deref()).await
}

fn print_attempts(report: &FetchReport) {
    for (idx, attempt) in report.attempts.iter().enumerate() {
        let outcome = if attempt.outcome == AttemptOutcome::Accepted {
            attempt.outcome.to_string().green()
        } else {
            attempt.outcome.to_string().red()
        };
        eprintln!(
            "{:>2}. {:<16} {} {}",
            idx + 1,
            attempt.target.as_deref().unwrap_or("(unmanaged)"),
            outcome,
            attempt.url.as_str().dimmed()
        );
    }
}

async fn write_body(report: FetchReport, output: Option<&Path>) -> Result<()> {
    let mut stream = report.response.bytes_stream();

    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut written = 0usize;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                written += chunk.len();
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            eprintln!("{} Wrote {} bytes to {}", "✓".green(), written, path.display());
        },
        None => {
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        },
    }
    Ok(())
}

pub fn list_targets(config: &MirrorConfig, api: ProtocolVersion, region: Region, json: bool) -> Result<()> {
    let registry = TargetRegistry::from_config(config);
    let weighted = registry.weighted_in(api, region)?;

    if json {
        let entries: Vec<serde_json::Value> = weighted
            .iter()
            .map(|w| {
                serde_json::json!({
                    "name": w.target.name,
                    "base_url": w.target.base_url.as_str(),
                    "weight": w.target.weight,
                    "version": w.target.version,
                    "region": w.target.region,
                    "kind": w.target.kind,
                    "requires_proxy": w.target.requires_proxy,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let total = weighted.last().map_or(0, |w| w.cumulative_weight);
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "Base URL", "Version", "Region", "Weight", "Share", "Proxy"]);

    for entry in &weighted {
        let target = &entry.target;
        let share = if total == 0 { 0.0 } else { f64::from(target.weight) * 100.0 / total as f64 };
        let proxy = if target.requires_proxy {
            Cell::new("required").fg(Color::Yellow)
        } else {
            Cell::new("-")
        };
        let name = if target.is_custom() {
            Cell::new(format!("{} (custom)", target.name)).fg(Color::Cyan)
        } else {
            Cell::new(&target.name)
        };

        table.add_row(vec![
            name,
            Cell::new(target.base_url.as_str()),
            Cell::new(target.version.as_str()),
            Cell::new(target.region.as_str()),
            Cell::new(target.weight),
            Cell::new(format!("{:.1}%", share)),
            proxy,
        ]);
    }

    println!("{table}");
    println!("\n{} mirrors for {} ({})", weighted.len(), api, region);
    Ok(())
}

pub fn show_config(config: &MirrorConfig, path: Option<&Path>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let source = match path.map(Path::to_path_buf).or_else(core_config::default_config_path) {
        Some(path) if path.exists() => path.display().to_string(),
        _ => "built-in defaults".to_string(),
    };
    println!("{}", "Mirror Configuration:".cyan().bold());
    println!("  Source: {}", source);
    println!("  Targets: {}", config.targets.len());
    println!("  Proxy: {} ({})", config.proxy.enabled, config.proxy.endpoint);
    println!("  Attempt timeout: {}s", config.fetch.attempt_timeout_secs);
    println!("  Minimum attempts: {}", config.fetch.min_attempts);
    Ok(())
}

pub fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => core_config::default_config_path()
            .context("No platform config directory; pass --config")?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    core_config::save_config(&path, &MirrorConfig::default())?;
    println!("{} Wrote default config to {}", "✓".green(), path.display());
    Ok(())
}
