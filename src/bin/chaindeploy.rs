#![forbid(unsafe_code)]
//! Smart-contract deployment CLI

use chaindeploy::config::load_config;
use chaindeploy::context::DeployContext;
use chaindeploy::deploy::{self, DeployOptions, DeployOutcome, DeployRequest};
use chaindeploy::error::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Solidity smart contract deployment management", long_about = None)]
struct Cli {
    /// Configuration file (default: ./chaindeploy.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment name
    #[arg(long, global = true)]
    env: Option<String>,

    /// Path of the contracts ledger
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Account-model RPC url
    #[arg(long, global = true)]
    account_rpc: Option<String>,

    /// (account) Sender address; defaults to the node's first account
    #[arg(long, global = true)]
    account_sender: Option<String>,

    /// UTXO-model RPC url
    #[arg(long, global = true)]
    utxo_rpc: Option<String>,

    /// (utxo) Sender address
    #[arg(long, global = true)]
    utxo_sender: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and deploy a contract
    Deploy {
        /// Source file, optionally with a deploy name: path/File.sol:Name
        target: String,
        /// Constructor params as JSON; `$Name` expands to a deployed address
        #[arg(default_value = "")]
        params: String,
        /// Overwrite a previously deployed contract with the same deploy name
        #[arg(long)]
        force: bool,
        /// Deploy the contract as a library
        #[arg(long)]
        lib: bool,
        /// Don't wait for the network to confirm the deploy
        #[arg(long)]
        no_confirm: bool,
        /// (dev) Don't generate a block to confirm the deploy immediately
        #[arg(long)]
        no_fast_confirm: bool,
        /// Gas limit for creating the contract
        #[arg(long)]
        gas_limit: Option<u64>,
    },
    /// Confirm deployments left pending by an earlier run
    Confirm {
        /// (dev) Don't generate a block first
        #[arg(long)]
        no_fast_confirm: bool,
    },
    /// Show the contracts ledger
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "❗️ error:".red().bold(), e);
        if !e.is_fatal() {
            eprintln!(
                "{}",
                "   The ledger is intact; pending deployments resume with `chaindeploy confirm`."
                    .yellow()
            );
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(env) = cli.env {
        config.env = env;
    }
    if cli.repo.is_some() {
        config.repo = cli.repo;
    }
    if cli.account_rpc.is_some() {
        config.account_rpc = cli.account_rpc;
    }
    if cli.account_sender.is_some() {
        config.account_sender = cli.account_sender;
    }
    if cli.utxo_rpc.is_some() {
        config.utxo_rpc = cli.utxo_rpc;
    }
    if cli.utxo_sender.is_some() {
        config.utxo_sender = cli.utxo_sender;
    }

    match cli.command {
        Commands::Deploy {
            target,
            params,
            force,
            lib,
            no_confirm,
            no_fast_confirm,
            gas_limit,
        } => {
            let mut ctx = DeployContext::from_config(&config)?;
            let mut request = DeployRequest::new(&target, &params);
            request.options = DeployOptions {
                force,
                as_lib: lib,
                no_confirm,
                no_fast_confirm,
                gas_limit,
            };

            println!("{} {}", "🚀 deploying".bright_cyan(), target.bright_white());
            match deploy::deploy(&mut ctx, &request).await? {
                DeployOutcome::Confirmed(record) => println!(
                    "   {} {} => {}",
                    "deployed".cyan(),
                    record.name,
                    ctx.format_address(&record.address)
                ),
                DeployOutcome::Pending(record) => println!(
                    "   {} {} (tx {})",
                    "pending".yellow(),
                    record.name,
                    record.tx_id
                ),
            }
        }
        Commands::Confirm { no_fast_confirm } => {
            let mut ctx = DeployContext::from_config(&config)?;
            let confirmed = deploy::confirm_pending(&mut ctx, !no_fast_confirm).await?;
            if confirmed == 0 {
                println!("{}", "Nothing to confirm".yellow());
            }
        }
        Commands::Status => {
            print!("{}", deploy::ledger_status(&config)?);
        }
    }

    Ok(())
}
