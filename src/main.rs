use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use request_trace::tracing::{init_tracing, LogFormat};
use scope_enforcer::CapabilityScopeEnforcer;
use serde::Serialize;
use tenantgate::config::GatewayConfig;
use tenantgate::server;
use tracing::{error, info};

/// Tenantgate - tenant isolation and capability scope gateway
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (yaml, toml or json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides log.level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format; overrides log.format
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve,
    /// Validate the configuration and print its effective values
    CheckConfig {
        #[arg(long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    config: &'a GatewayConfig,
    credentials: Vec<CredentialReport<'a>>,
}

#[derive(Serialize)]
struct CredentialReport<'a> {
    id: &'a str,
    project_id: String,
    permitted_operations: Vec<&'static str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    init_tracing(level, cli.log_format.unwrap_or(config.log.format));

    info!("Starting tenantgate v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Serve => server::serve(config).await,
        Commands::CheckConfig { output } => check_config(&config, output),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn check_config(config: &GatewayConfig, output: OutputFormat) -> Result<()> {
    let enforcer = CapabilityScopeEnforcer::new();
    let report = ConfigReport {
        config,
        credentials: config
            .api_keys
            .iter()
            .map(|seed| CredentialReport {
                id: &seed.credential.id,
                project_id: seed.project_id.to_string(),
                permitted_operations: enforcer.permitted_operations(&seed.credential),
            })
            .collect(),
    };
    let rendered = match output {
        OutputFormat::Yaml => serde_yaml::to_string(&report).context("failed to render yaml")?,
        OutputFormat::Json => {
            serde_json::to_string_pretty(&report).context("failed to render json")?
        }
    };
    println!("{rendered}");
    Ok(())
}
