use anyhow::Context;
use clap::Parser;
use plinko::{
    ledger::LedgerService,
    storage::{
        LedgerStorage,
        in_memory_storage::InMemoryStorage,
        sled_storage::SledStorage,
    },
};
use plinko_server::{
    app::{
        App,
        RunState,
        actix_query_api::ActixQueryApi,
        init_tracing,
    },
    seed::{
        SeedUser,
        seed_users,
    },
};
use std::{
    fs,
    path::PathBuf,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Sled database directory; a leading `~` is expanded.
    #[arg(long, default_value = "~/.plinko/db")]
    db_path: String,

    /// Keep all state in memory and discard it on exit.
    #[arg(long, conflicts_with = "db_path")]
    in_memory: bool,

    #[arg(short, long)]
    port: Option<u16>,

    /// Open an account at startup; repeatable, e.g. `--seed-user alice:100`.
    #[arg(long = "seed-user", value_name = "NAME:BALANCE")]
    seed_users: Vec<SeedUser>,

    /// Require this value in the `x-plinko-admin-token` header on admin routes.
    #[arg(long)]
    admin_token: Option<String>,

    #[arg(short, long, default_value = "false")]
    tracing: bool,

    /// Write logs to a daily rolling file in this directory.
    #[arg(long)]
    log_dir: Option<String>,
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

async fn serve<S: LedgerStorage>(storage: S, args: &Args) -> anyhow::Result<()> {
    let ledger = LedgerService::new(storage);
    seed_users(&ledger, &args.seed_users).context("seeding accounts")?;
    if args.admin_token.is_none() {
        tracing::warn!("no admin token set; admin routes accept any local caller");
    }
    let api = ActixQueryApi::with_admin_token(args.port, args.admin_token.clone()).await?;
    let mut app = App::new(api, ledger);

    tracing::info!("Starting plinko service");
    loop {
        let interrupt = handle_interupt();
        match app.run(interrupt).await? {
            RunState::Continue => continue,
            RunState::Exit => {
                tracing::info!("Exiting plinko service");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_dir = args.log_dir.as_deref().map(expand);
    if let Some(dir) = &log_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    let _log_guard = if args.tracing || log_dir.is_some() {
        init_tracing(log_dir.as_deref())
    } else {
        None
    };

    if args.in_memory {
        tracing::info!("Using in-memory storage");
        let storage = InMemoryStorage::new();
        plinko::settings::GameSettings::seed_defaults(&storage)?;
        serve(storage, &args).await
    } else {
        let db_path = expand(&args.db_path);
        fs::create_dir_all(&db_path)
            .with_context(|| format!("creating database directory {}", db_path.display()))?;
        tracing::info!("Using sled storage directory: {}", db_path.display());
        let storage = SledStorage::open(&db_path)?;
        serve(storage, &args).await
    }
}
