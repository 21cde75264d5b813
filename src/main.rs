use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use payments_bridge::config::{AppConfig, PaymentsConfig};
use payments_bridge::domain::callback::InboundCallback;
use payments_bridge::domain::request::PaymentRequest;
use payments_bridge::registry::GatewayRegistry;
use payments_bridge::transport::ReqwestTransport;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Drives the configured payment gateways from a shell.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gateway configuration file. Defaults to `PAYMENTS_CONFIG`.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured gateways in configuration order.
    Gateways,
    /// Show which auth headers a gateway sends. Values are redacted.
    Headers { gateway: String },
    /// Start a payment from a JSON request file.
    Initiate { gateway: String, request: PathBuf },
    /// Verify a callback body stored in a file.
    Callback {
        gateway: String,
        body: PathBuf,
        /// Extra request header, `name:value`. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
    },
    /// Ask the provider for the current state of a payment.
    Status { gateway: String, id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env();
    let path = cli.config.unwrap_or_else(|| PathBuf::from(&cfg.config_path));
    let config = PaymentsConfig::from_path(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    let transport = ReqwestTransport::new(cfg.gateway_timeout(), cfg.user_agent.as_deref())?;
    let registry = GatewayRegistry::from_config(config, Arc::new(transport));

    match cli.command {
        Command::Gateways => {
            let names: Vec<&str> = registry.available_gateways().collect();
            print_json(&names)?;
        }
        Command::Headers { gateway } => {
            let gateway = registry.resolve(&gateway)?;
            let names: Vec<String> = gateway.build_auth_headers().into_keys().collect();
            print_json(&serde_json::json!({
                "gateway": gateway.name(),
                "headers": names,
            }))?;
        }
        Command::Initiate { gateway, request } => {
            let gateway = registry.resolve(&gateway)?;
            let raw = std::fs::read_to_string(&request)
                .with_context(|| format!("reading {}", request.display()))?;
            let request: PaymentRequest = serde_json::from_str(&raw)?;
            print_json(&gateway.initiate(&request).await)?;
        }
        Command::Callback {
            gateway,
            body,
            headers,
        } => {
            let gateway = registry.resolve(&gateway)?;
            let bytes = std::fs::read(&body).with_context(|| format!("reading {}", body.display()))?;
            let mut callback = InboundCallback::from_json_body(bytes);
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| anyhow!("header `{header}` is not NAME:VALUE"))?;
                callback = callback.with_header(name.trim(), value.trim());
            }
            print_json(&gateway.verify_callback(&callback).await)?;
        }
        Command::Status { gateway, id } => {
            let gateway = registry.resolve(&gateway)?;
            print_json(&gateway.query_status(&id).await?)?;
        }
    }
    Ok(())
}
