mod backend;
mod client;
mod commands;

use backend::{
    AdminBackend,
    LocalAdmin,
};
use clap::{
    Parser,
    Subcommand,
};
use client::AdminClient;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use plinko::{
    Points,
    ledger::LedgerService,
    stats::StatsOptions,
    storage::sled_storage::SledStorage,
};
use std::{
    fs,
    io,
    path::PathBuf,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "plinko-admin",
    about = "Inspect and manage the Plinko ledger",
    version
)]
struct Args {
    /// Sled database directory, opened directly; only usable while no server
    /// has it open (defaults to ~/.plinko/db)
    #[arg(long, default_value = "~/.plinko/db")]
    db_path: String,

    /// Base URL of a running plinko-server; commands go through its admin API
    #[arg(long, conflicts_with = "db_path")]
    server: Option<String>,

    /// Sent as the admin token header when using --server
    #[arg(long, requires = "server")]
    admin_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print aggregate statistics, recent games and top players
    Stats {
        #[arg(long, default_value_t = 5)]
        top: usize,

        #[arg(long, default_value_t = 10)]
        recent: usize,
    },
    /// Show all settings, show one, or set one
    Config { key: Option<String>, value: Option<String> },
    /// Credit (or debit, with a negative amount) a user's balance
    Points {
        username: String,
        #[arg(allow_hyphen_values = true)]
        amount: Points,
    },
    /// Create an account
    Register {
        username: String,

        #[arg(long, default_value_t = 0)]
        balance: Points,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();

    let args = Args::parse();
    if let Some(server) = &args.server {
        let client = AdminClient::new(server.as_str(), args.admin_token.clone())?;
        return run(&client, args.command).await;
    }

    let db_path = PathBuf::from(shellexpand::tilde(&args.db_path).into_owned());
    fs::create_dir_all(&db_path)
        .wrap_err_with(|| format!("creating database directory {}", db_path.display()))?;
    let storage = SledStorage::open(&db_path).wrap_err_with(|| {
        format!(
            "opening ledger at {}; if plinko-server is running it holds the lock, \
             so pass --server <URL> to go through its admin API instead",
            db_path.display()
        )
    })?;
    let admin = LocalAdmin::new(LedgerService::new(storage));
    run(&admin, args.command).await
}

async fn run(backend: &impl AdminBackend, command: Command) -> Result<()> {
    let mut out = io::stdout().lock();
    match command {
        Command::Stats { top, recent } => {
            let options = StatsOptions {
                top_players: top,
                recent_games: recent,
            };
            commands::stats(backend, &options, &mut out).await
        }
        Command::Config { key, value } => {
            commands::config(backend, key.as_deref(), value.as_deref(), &mut out).await
        }
        Command::Points { username, amount } => {
            commands::points(backend, &username, amount, &mut out).await
        }
        Command::Register { username, balance } => {
            commands::register(backend, &username, balance, &mut out).await
        }
    }
}
