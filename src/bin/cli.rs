use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portfolio_nav::{Config, ConversionContext, Deployment, Network, QuoteRequest, QuoteService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "portfolio-nav")]
#[command(about = "Value token holdings through CoW Protocol quotes", long_about = None)]
struct Args {
    /// Unit of account (weth or usdc)
    #[arg(long, env = "NAV_DEPLOYMENT", default_value = "weth")]
    deployment: Deployment,

    /// Configuration file to use instead of the embedded one
    #[arg(long, env = "NAV_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quote a conversion between two tokens
    Quote {
        #[arg(short, long, default_value = "ethereum")]
        network: Network,

        /// Token to sell
        #[arg(long)]
        sell: Address,

        /// Token to buy
        #[arg(long)]
        buy: Address,

        /// Amount in base units of the sell token
        #[arg(long)]
        amount: String,

        /// Decimals of the sell token
        #[arg(long, default_value_t = 18)]
        decimals: u8,

        /// Decimals of the buy token, looked up in the registry when omitted
        #[arg(long)]
        buy_decimals: Option<u8>,

        /// Symbol of the sell token
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value = "default")]
        context: ConversionContext,
    },

    /// Value every registered token held by an address
    Value {
        #[arg(short, long, default_value = "ethereum")]
        network: Network,

        /// The address to value
        #[arg(short, long)]
        address: Address,

        #[arg(long, default_value = "spot")]
        context: ConversionContext,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load_deployment(args.deployment)?,
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("portfolio_nav=info".parse().context("invalid log directive")?),
        )
        .init();

    let args = Args::parse();
    let config = Arc::new(load_config(&args)?);

    let output = match args.command {
        Command::Quote {
            network,
            sell,
            buy,
            amount,
            decimals,
            buy_decimals,
            symbol,
            context,
        } => {
            let mut request = QuoteRequest::new(network, sell, buy, &amount)?
                .with_sell_decimals(decimals)
                .with_context(context);
            if let Some(buy_decimals) = buy_decimals {
                request = request.with_buy_decimals(buy_decimals);
            }
            if let Some(symbol) = symbol {
                request = request.with_symbol(symbol);
            }

            let service = QuoteService::from_config(config)?;
            let result = service.get_quote(&request).await?;
            serde_json::to_string_pretty(&result)?
        }
        Command::Value {
            network,
            address,
            context,
        } => {
            tracing::info!(%network, %address, "valuing wallet");
            let valuation = portfolio_nav::value_wallet(config, network, address, context).await?;
            serde_json::to_string_pretty(&valuation)?
        }
    };

    println!("{output}");
    Ok(())
}
