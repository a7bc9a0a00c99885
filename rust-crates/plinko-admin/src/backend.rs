use color_eyre::eyre::Result;
use plinko::{
    Points,
    ledger::{
        Clock,
        LedgerService,
        SystemClock,
    },
    records::Account,
    settings::GameSettings,
    stats::{
        StatsOptions,
        StatsScope,
        StatsSummary,
    },
    storage::LedgerStorage,
};
use rand::{
    Rng,
    rngs::StdRng,
};

/// Where admin commands are carried out: an open database, or a running server.
pub trait AdminBackend {
    fn summary(&self, options: &StatsOptions) -> impl Future<Output = Result<StatsSummary>>;

    fn settings(&self) -> impl Future<Output = Result<GameSettings>>;

    fn update_setting(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<GameSettings>>;

    fn adjust_points(
        &self,
        username: &str,
        amount: Points,
    ) -> impl Future<Output = Result<Account>>;

    fn register(&self, username: &str, balance: Points) -> impl Future<Output = Result<Account>>;
}

/// Direct access to a database no server holds open.
pub struct LocalAdmin<S, R = StdRng, C = SystemClock> {
    ledger: LedgerService<S, R, C>,
}

impl<S, R, C> LocalAdmin<S, R, C> {
    pub fn new(ledger: LedgerService<S, R, C>) -> Self {
        Self { ledger }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &LedgerService<S, R, C> {
        &self.ledger
    }
}

impl<S: LedgerStorage, R: Rng, C: Clock> AdminBackend for LocalAdmin<S, R, C> {
    async fn summary(&self, options: &StatsOptions) -> Result<StatsSummary> {
        Ok(self.ledger.stats(StatsScope::All, options)?)
    }

    async fn settings(&self) -> Result<GameSettings> {
        Ok(GameSettings::load(self.ledger.storage())?)
    }

    async fn update_setting(&self, key: &str, value: &str) -> Result<GameSettings> {
        Ok(GameSettings::update(self.ledger.storage(), key, value)?)
    }

    async fn adjust_points(&self, username: &str, amount: Points) -> Result<Account> {
        Ok(self.ledger.adjust_points(username, amount)?)
    }

    async fn register(&self, username: &str, balance: Points) -> Result<Account> {
        Ok(self.ledger.register(username, balance)?)
    }
}
