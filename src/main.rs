use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use rhtrader::config::{read_env_file, CredentialReport};
use rhtrader::exchange::types::{Account, Holding, Order, OrderSize, Quote};
use rhtrader::exchange::TradingClient;
use rhtrader::logging::{log, obj, v_str, Domain, Level};
use rhtrader::{Config, Credentials};

#[derive(Debug, Parser)]
#[command(name = "rhtrader", about = "Signed crypto trading client")]
struct Cli {
    /// Dotenv file with RH_API_KEY / RH_PRIVATE_KEY (default: ./.env if present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Trading pair, overrides RH_SYMBOL
    #[arg(long, global = true)]
    symbol: Option<String>,

    /// Print raw JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Best bid/ask for the pair
    Price,
    /// Market buy; amount is dollars unless --quantity is set
    Buy {
        amount: String,
        #[arg(long)]
        quantity: bool,
    },
    /// Market sell of the whole available position
    Sell,
    /// Holdings of the pair's base asset
    Holdings,
    /// Account status and buying power
    Account,
    /// Status of an order
    Order { id: String },
    /// Check that credentials are present and decodable
    CheckEnv,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_vars = load_env_file(cli.env_file.as_ref())?;
    let lookup = |name: &str| {
        std::env::var(name)
            .ok()
            .or_else(|| file_vars.get(name).cloned())
    };

    if let Command::CheckEnv = cli.command {
        return check_env(CredentialReport::inspect(lookup));
    }

    let mut cfg = Config::from_lookup(lookup)?;
    if let Some(symbol) = cli.symbol.clone() {
        cfg.symbol = symbol.to_ascii_uppercase();
    }
    let credentials = Credentials::from_lookup(lookup)?;
    log(
        Level::Debug,
        Domain::System,
        "startup",
        obj(&[
            ("base_url", v_str(&cfg.base_url)),
            ("symbol", v_str(&cfg.symbol)),
        ]),
    );

    let client = TradingClient::new(cfg, credentials)?;
    if let Err(err) = run(&client, &cli).await {
        if let Some(client_err) = err.downcast_ref::<rhtrader::ClientError>() {
            log(
                Level::Error,
                Domain::System,
                "command_failed",
                obj(&[
                    ("error", v_str(&client_err.to_string())),
                    ("transient", serde_json::json!(client_err.is_transient())),
                ]),
            );
        }
        return Err(err);
    }
    Ok(())
}

fn load_env_file(path: Option<&PathBuf>) -> Result<HashMap<String, String>> {
    match path {
        Some(p) => Ok(read_env_file(p)?),
        None => {
            let default = PathBuf::from(".env");
            if default.exists() {
                Ok(read_env_file(&default)?)
            } else {
                Ok(HashMap::new())
            }
        }
    }
}

async fn run(client: &TradingClient, cli: &Cli) -> Result<()> {
    let symbol = client.config().symbol.clone();
    match &cli.command {
        Command::Price => {
            let quote = client.get_price(&symbol).await?;
            emit(cli.json, &quote, print_quote)?;
        }
        Command::Buy { amount, quantity } => {
            let amount = Decimal::from_str(amount.trim())
                .with_context(|| format!("amount {:?} is not a decimal", amount))?;
            let size = if *quantity {
                OrderSize::Quantity(amount)
            } else {
                OrderSize::Notional(amount)
            };
            let order = client.buy(size).await?;
            emit(cli.json, &order, print_order)?;
        }
        Command::Sell => match client.sell().await? {
            Some(order) => emit(cli.json, &order, print_order)?,
            None => println!("No {} available to sell", client.config().asset_code()),
        },
        Command::Holdings => {
            let holdings = client.get_holdings(client.config().asset_code()).await?;
            emit(cli.json, &holdings, |h: &Vec<Holding>| print_holdings(h))?;
        }
        Command::Account => {
            let account = client.get_account().await?;
            emit(cli.json, &account, |a: &Account| {
                println!("Account: {} ({})", a.account_number, a.status);
                println!("Buying power: {} {}", a.buying_power, a.buying_power_currency);
            })?;
        }
        Command::Order { id } => {
            let order = client.get_order(id).await?;
            emit(cli.json, &order, print_order)?;
        }
        // handled in main before credentials are loaded
        Command::CheckEnv => {}
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl Fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn print_quote(q: &Quote) {
    println!("{} price:", q.symbol);
    println!("Buy Price: ${}", q.ask);
    println!("Sell Price: ${}", q.bid);
}

fn print_order(o: &Order) {
    println!(
        "Order {}: {} {} {} ({})",
        o.id,
        o.side.as_str(),
        o.symbol,
        o.state,
        o.created_at.as_deref().unwrap_or("-")
    );
}

fn print_holdings(holdings: &[Holding]) {
    if holdings.is_empty() {
        println!("No holdings");
    }
    for h in holdings {
        println!(
            "{}: {} (available {})",
            h.asset_code, h.total_quantity, h.quantity_available_for_trading
        );
    }
}

fn check_env(report: CredentialReport) -> Result<()> {
    let yes_no = |b: bool| if b { "Yes" } else { "No" };
    println!("API Key found: {}", yes_no(report.api_key_present));
    println!("Private Key found: {}", yes_no(report.private_key_present));
    if report.api_key_present {
        println!("API Key format correct: {}", yes_no(report.api_key_format_ok));
    }
    if report.private_key_present {
        println!("Private Key decodes: {}", yes_no(report.private_key_decodes));
    }
    if !report.is_ok() {
        bail!("credentials are missing or malformed");
    }
    Ok(())
}
