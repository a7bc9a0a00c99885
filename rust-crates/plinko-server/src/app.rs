use crate::{
    Result,
    app::query_api::{
        AdminQuery,
        PlayQuery,
        Query,
        QueryAPI,
        StatsQuery,
    },
};
use plinko::{
    ledger::{
        Clock,
        LedgerService,
        SystemClock,
    },
    settings::GameSettings,
    stats::StatsOptions,
    storage::LedgerStorage,
};
use rand::{
    Rng,
    rngs::StdRng,
};
use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

pub mod actix_query_api;
pub mod query_api;

#[cfg(test)]
mod tests;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Exit,
}

pub struct App<API, S, R = StdRng, C = SystemClock> {
    api: API,
    ledger: LedgerService<S, R, C>,
    stats_options: StatsOptions,
}

impl<API, S, R, C> App<API, S, R, C> {
    pub fn new(api: API, ledger: LedgerService<S, R, C>) -> Self {
        Self {
            api,
            ledger,
            stats_options: StatsOptions::default(),
        }
    }

    pub fn with_stats_options(mut self, stats_options: StatsOptions) -> Self {
        self.stats_options = stats_options;
        self
    }

    pub fn ledger(&self) -> &LedgerService<S, R, C> {
        &self.ledger
    }
}

impl<API: QueryAPI, S: LedgerStorage, R: Rng, C: Clock> App<API, S, R, C> {
    /// Serve one query, or return [`RunState::Exit`] once `interrupt` resolves.
    pub async fn run(&mut self, interrupt: impl Future<Output = ()>) -> Result<RunState> {
        tokio::select! {
            query = self.api.query() => {
                self.handle_query(query?);
                Ok(RunState::Continue)
            }
            _ = interrupt => Ok(RunState::Exit),
        }
    }

    fn handle_query(&self, query: Query) {
        match query {
            Query::Play(PlayQuery {
                user,
                bet_amount,
                drop_position,
                sender,
            }) => {
                let result = self.ledger.play(user, bet_amount, drop_position);
                if sender.send(result).is_err() {
                    tracing::warn!(user, "play responder dropped before settlement");
                }
            }
            Query::Stats(StatsQuery {
                scope,
                options,
                sender,
            }) => {
                let options = options.unwrap_or(self.stats_options);
                let result = self.ledger.stats(scope, &options);
                if let Err(e) = &result {
                    tracing::error!("failed to summarize {scope:?}: {e}");
                }
                if sender.send(result).is_err() {
                    tracing::warn!("stats responder dropped");
                }
            }
            Query::Admin(query) => self.handle_admin(query),
        }
    }

    fn handle_admin(&self, query: AdminQuery) {
        let delivered = match query {
            AdminQuery::Settings { sender } => {
                sender.send(GameSettings::load(self.ledger.storage())).is_ok()
            }
            AdminQuery::UpdateSetting { key, value, sender } => {
                let result = GameSettings::update(self.ledger.storage(), &key, &value);
                sender.send(result).is_ok()
            }
            AdminQuery::AdjustPoints {
                username,
                amount,
                sender,
            } => sender
                .send(self.ledger.adjust_points(&username, amount))
                .is_ok(),
            AdminQuery::Register {
                username,
                balance,
                sender,
            } => sender.send(self.ledger.register(&username, balance)).is_ok(),
        };
        if !delivered {
            tracing::warn!("admin responder dropped");
        }
    }
}

/// Install the global subscriber. With a log directory, output goes to a
/// daily rolling file and the returned guard must outlive the program.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = rolling::daily(dir, "plinko-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
            None
        }
    }
}
