use plinko::{
    Points,
    UserId,
    ledger::PlayOutcome,
    records::Account,
    settings::GameSettings,
    stats::{
        StatsOptions,
        StatsScope,
        StatsSummary,
    },
};
use tokio::sync::oneshot;

pub trait QueryAPI {
    fn query(&mut self) -> impl Future<Output = crate::Result<Query>>;
}

#[derive(Debug)]
pub enum Query {
    Play(PlayQuery),
    Stats(StatsQuery),
    Admin(AdminQuery),
}

impl Query {
    pub fn play(
        user: UserId,
        bet_amount: Points,
        drop_position: i64,
        sender: oneshot::Sender<plinko::Result<PlayOutcome>>,
    ) -> Self {
        Query::Play(PlayQuery {
            user,
            bet_amount,
            drop_position,
            sender,
        })
    }

    pub fn stats(
        scope: StatsScope,
        sender: oneshot::Sender<plinko::Result<StatsSummary>>,
    ) -> Self {
        Query::Stats(StatsQuery {
            scope,
            options: None,
            sender,
        })
    }

    pub fn stats_with(
        scope: StatsScope,
        options: StatsOptions,
        sender: oneshot::Sender<plinko::Result<StatsSummary>>,
    ) -> Self {
        Query::Stats(StatsQuery {
            scope,
            options: Some(options),
            sender,
        })
    }
}

#[derive(Debug)]
pub struct PlayQuery {
    pub user: UserId,
    pub bet_amount: Points,
    pub drop_position: i64,
    pub sender: oneshot::Sender<plinko::Result<PlayOutcome>>,
}

#[derive(Debug)]
pub struct StatsQuery {
    pub scope: StatsScope,
    /// `None` uses the app's configured options.
    pub options: Option<StatsOptions>,
    pub sender: oneshot::Sender<plinko::Result<StatsSummary>>,
}

/// Operator requests; these mutate settings and balances on the live ledger.
#[derive(Debug)]
pub enum AdminQuery {
    Settings {
        sender: oneshot::Sender<plinko::Result<GameSettings>>,
    },
    UpdateSetting {
        key: String,
        value: String,
        sender: oneshot::Sender<plinko::Result<GameSettings>>,
    },
    AdjustPoints {
        username: String,
        amount: Points,
        sender: oneshot::Sender<plinko::Result<Account>>,
    },
    Register {
        username: String,
        balance: Points,
        sender: oneshot::Sender<plinko::Result<Account>>,
    },
}
