//! Stablecoin operator CLI
//!
//! Runs protocol operations against a local workspace snapshot: initialize a
//! protocol, sign oracle prices, execute operation batches and inspect
//! positions, lots and the global ledger.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;

use stablecoin::cli::{
    format_amount, format_price, format_ratio, parse_amount, print_data, print_events, print_table, KeyFile,
    OutputFormat, Workspace,
};
use stablecoin::core::{CallContext, FungibleToken, ProtocolConfig};
use stablecoin::oracle::PriceSigner;
use stablecoin::protocol::{Asset, ProtocolOperation};
use stablecoin::utils::crypto::{KeyPair, PublicKey};

/// Stablecoin operator CLI
#[derive(Parser)]
#[command(name = "stablecoin")]
#[command(version = stablecoin::VERSION)]
#[command(about = "Operator tools for the stablecoin protocol", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, env = "STABLECOIN_HOME", default_value = ".stablecoin")]
    workspace: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace with a fresh admin key
    Init {
        /// Protocol configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overwrite an existing workspace
        #[arg(long)]
        force: bool,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Key management
    #[command(subcommand)]
    Keys(KeysCommands),

    /// Sign a price attestation
    SignPrice {
        /// Signer key file
        #[arg(short, long)]
        key: PathBuf,

        /// Attestation nonce
        #[arg(short, long)]
        nonce: u64,

        /// Price in USD, e.g. 2000.5
        #[arg(short, long)]
        price: String,

        /// Asset symbol
        #[arg(short, long)]
        symbol: String,
    },

    /// Execute a JSON array of operations and save the new state
    Exec {
        /// Operations file
        file: PathBuf,

        /// Caller public key (defaults to the workspace key)
        #[arg(short, long)]
        caller: Option<String>,

        /// Unix time of the call (defaults to now)
        #[arg(short, long)]
        now: Option<u64>,
    },

    /// Global ledger and token supplies
    Status {
        /// Unix time used for prices (defaults to now)
        #[arg(short, long)]
        now: Option<u64>,
    },

    /// Inspect one position
    Position {
        /// Owner public key
        #[arg(short, long)]
        owner: String,

        /// Collateral symbol
        #[arg(short, long)]
        symbol: String,

        /// Unix time used for the price (defaults to now)
        #[arg(short, long)]
        now: Option<u64>,
    },

    /// List collateral auction lots
    Lots {
        /// Collateral symbol
        #[arg(short, long)]
        symbol: String,

        /// Unix time used for current prices (defaults to now)
        #[arg(short, long)]
        now: Option<u64>,
    },

    /// Show the most recent events
    Events {
        /// Number of events
        #[arg(short, long, default_value = "20")]
        count: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the workspace configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// Configuration file
        file: PathBuf,
    },

    /// Print the default configuration
    Default,
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Generate a key pair
    Generate {
        /// Write the key file here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the workspace public key
    Show,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run_command(&cli) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let workspace = Workspace::new(&cli.workspace);
    match &cli.command {
        Commands::Init { config, force } => cmd_init(&workspace, config.as_ref(), *force),
        Commands::Config(cmd) => cmd_config(&workspace, cmd),
        Commands::Keys(cmd) => cmd_keys(&workspace, cmd),
        Commands::SignPrice {
            key,
            nonce,
            price,
            symbol,
        } => cmd_sign_price(key, *nonce, price, symbol),
        Commands::Exec { file, caller, now } => cmd_exec(&workspace, cli.format, file, caller.as_deref(), *now),
        Commands::Status { now } => cmd_status(&workspace, cli.format, now.unwrap_or_else(unix_now)),
        Commands::Position { owner, symbol, now } => {
            cmd_position(&workspace, cli.format, owner, symbol, now.unwrap_or_else(unix_now))
        }
        Commands::Lots { symbol, now } => cmd_lots(&workspace, cli.format, symbol, now.unwrap_or_else(unix_now)),
        Commands::Events { count } => cmd_events(&workspace, cli.format, *count),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_init(workspace: &Workspace, config: Option<&PathBuf>, force: bool) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            ProtocolConfig::from_json(&json)?
        }
        None => ProtocolConfig::default(),
    };
    let key = workspace.init(config, force)?;

    println!(
        "{} Workspace created at {}",
        style("✓").green(),
        workspace.root().display()
    );
    println!("{} Admin key: {}", style("✓").green(), style(&key.public_key).yellow());
    Ok(())
}

fn cmd_config(workspace: &Workspace, cmd: &ConfigCommands) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => print_data(OutputFormat::Json, &workspace.load_config()?),
        ConfigCommands::Default => print_data(OutputFormat::Json, &ProtocolConfig::default()),
        ConfigCommands::Validate { file } => {
            let json = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            let config = ProtocolConfig::from_json(&json)?;
            config.validate()?;
            println!(
                "{} {} is valid ({} collateral types)",
                style("✓").green(),
                file.display(),
                config.collaterals.len()
            );
        }
    }
    Ok(())
}

fn cmd_keys(workspace: &Workspace, cmd: &KeysCommands) -> anyhow::Result<()> {
    match cmd {
        KeysCommands::Generate { output } => {
            let key = KeyFile::from_keypair(&KeyPair::generate());
            let json = serde_json::to_string_pretty(&key)?;
            match output {
                Some(path) => {
                    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
                    println!("{} Public key: {}", style("✓").green(), style(&key.public_key).yellow());
                }
                None => println!("{}", json),
            }
        }
        KeysCommands::Show => println!("{}", workspace.operator()?),
    }
    Ok(())
}

fn cmd_sign_price(key: &PathBuf, nonce: u64, price: &str, symbol: &str) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(key).with_context(|| format!("reading {}", key.display()))?;
    let key: KeyFile = serde_json::from_str(&json)?;
    let signer = PriceSigner::new(key.keypair()?);
    let price = parse_amount(price, 18)?;

    let operation = ProtocolOperation::UpdatePrice {
        nonce,
        price,
        signature: signer.sign_price(nonce, price, symbol),
        symbol: symbol.to_string(),
    };
    println!("{}", serde_json::to_string_pretty(&operation)?);
    Ok(())
}

fn cmd_exec(
    workspace: &Workspace,
    format: OutputFormat,
    file: &PathBuf,
    caller: Option<&str>,
    now: Option<u64>,
) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let operations: Vec<ProtocolOperation> = serde_json::from_str(&json).context("parsing operations")?;
    let caller = match caller {
        Some(hex) => PublicKey::from_hex(hex)?,
        None => workspace.operator()?,
    };
    let ctx = CallContext::new(caller, now.unwrap_or_else(unix_now));

    let mut protocol = workspace.load_protocol()?;
    for (i, operation) in operations.into_iter().enumerate() {
        let name = operation.operation_type();
        let events = protocol
            .execute(&ctx, operation)
            .with_context(|| format!("operation {} ({}) failed, nothing after it was applied", i, name))?;
        workspace.save_protocol(&protocol)?;
        println!("{} {}", style("✓").green(), name);
        print_events(format, &events);
    }
    protocol.verify_invariants()?;
    Ok(())
}

fn cmd_status(workspace: &Workspace, format: OutputFormat, now: u64) -> anyhow::Result<()> {
    let protocol = workspace.load_protocol()?;
    let config = protocol.config();
    let router = protocol.router();
    let stable_decimals = config.stable_decimals;

    if format == OutputFormat::Json {
        print_data(format, router.ledger());
        return Ok(());
    }

    println!("{}", style("Global ledger").cyan().bold());
    println!("  total debt   {}", format_amount(router.total_debt(), stable_decimals));
    println!("  deficit      {}", format_amount(router.deficit(), stable_decimals));
    println!("  surplus      {}", format_amount(router.surplus(), stable_decimals));
    println!("  liquidations {}", router.liquidation_count());
    match router.total_collateral_value(protocol.oracle(), now) {
        Ok(value) => println!("  collateral   ${}", format_amount(value, stable_decimals)),
        Err(e) => println!("  collateral   {}", style(format!("unpriced ({})", e)).yellow()),
    }

    println!("\n{}", style("Supplies").cyan().bold());
    println!(
        "  {:<6} {}",
        config.stable_symbol,
        format_amount(protocol.total_supply(&Asset::Stable)?, stable_decimals)
    );
    println!(
        "  {:<6} {}",
        config.governance_symbol,
        format_amount(protocol.total_supply(&Asset::Governance)?, config.governance_decimals)
    );

    let rows = config
        .collaterals
        .iter()
        .map(|c| {
            let price = protocol
                .oracle()
                .price_record(&c.symbol)
                .map(|r| {
                    let marker = if r.is_fresh(now, protocol.oracle().validity_window()) { "" } else { " (stale)" };
                    format!("{}{}", format_price(r.price), marker)
                })
                .unwrap_or_else(|| "-".to_string());
            vec![
                c.symbol.clone(),
                price,
                format_amount(router.total_collateral(&c.symbol), c.decimals),
                format_amount(router.reserve(&c.symbol), c.decimals),
                format_ratio(c.minimum_collateral_ratio),
            ]
        })
        .collect::<Vec<_>>();
    println!();
    print_table(&["SYMBOL", "PRICE", "LOCKED", "RESERVE", "MIN RATIO"], &rows);
    Ok(())
}

fn cmd_position(workspace: &Workspace, format: OutputFormat, owner: &str, symbol: &str, now: u64) -> anyhow::Result<()> {
    let protocol = workspace.load_protocol()?;
    let owner = PublicKey::from_hex(owner)?;
    let position = protocol
        .router()
        .position(&owner, symbol)
        .with_context(|| format!("no {} position for {}", symbol, owner))?;

    if format == OutputFormat::Json {
        print_data(format, position);
        return Ok(());
    }

    let config = protocol.router().collateral_config(symbol)?;
    let stable_decimals = protocol.config().stable_decimals;
    println!("{} {} / {}", style("Position").cyan().bold(), owner, symbol);
    println!("  collateral {}", format_amount(position.collateral_amount, config.decimals));
    println!("  debt       {}", format_amount(position.debt_amount, stable_decimals));
    println!("  fees       {}", format_amount(position.accrued_fees, stable_decimals));
    println!("  status     {:?}", position.status);
    match protocol.router().collateral_ratio(protocol.oracle(), &owner, symbol, now) {
        Ok(ratio) => {
            let text = format_ratio(ratio);
            let styled = if ratio < config.liquidation_threshold {
                style(text).red()
            } else {
                style(text).green()
            };
            println!("  ratio      {}", styled);
        }
        Err(e) => println!("  ratio      {}", style(e.to_string()).yellow()),
    }
    Ok(())
}

fn cmd_lots(workspace: &Workspace, format: OutputFormat, symbol: &str, now: u64) -> anyhow::Result<()> {
    let protocol = workspace.load_protocol()?;
    let auction = protocol
        .collateral_auction(symbol)
        .with_context(|| format!("no auction for {}", symbol))?;
    let lots = auction
        .get_price_indexes(0, usize::MAX)
        .into_iter()
        .flat_map(|index| auction.get_lots(index, 0, usize::MAX))
        .collect::<Vec<_>>();

    if format == OutputFormat::Json {
        print_data(format, &lots);
        return Ok(());
    }

    let decimals = protocol.state().collateral_tokens.get(symbol).map(|t| t.decimals()).unwrap_or(18);
    let rows = lots
        .iter()
        .map(|lot| {
            let price = if lot.status.is_on_sale() && !lot.is_expired(now) {
                auction
                    .current_lot_price(lot.id, now)
                    .map(format_price)
                    .unwrap_or_else(|e| e.to_string())
            } else {
                "-".to_string()
            };
            vec![
                lot.id.to_string(),
                format!("{}/{}", lot.price_index, lot.index),
                format!("{:?}", lot.status),
                format_amount(lot.collateral_amount, decimals),
                price,
            ]
        })
        .collect::<Vec<_>>();
    print_table(&["ID", "BUCKET", "STATUS", "REMAINING", "PRICE"], &rows);
    Ok(())
}

fn cmd_events(workspace: &Workspace, format: OutputFormat, count: usize) -> anyhow::Result<()> {
    let protocol = workspace.load_protocol()?;
    let events = protocol.events().events();
    let start = events.len().saturating_sub(count);
    print_events(format, &events[start..]);
    Ok(())
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
