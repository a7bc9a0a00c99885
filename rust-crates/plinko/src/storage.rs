use crate::{
    Points,
    UserId,
    records::{
        Account,
        GameRecord,
        PlayCommit,
    },
    stats::StatsScope,
};
use chrono::{
    DateTime,
    Utc,
};

pub use crate::settings::SettingsStore;

pub mod in_memory_storage;
pub mod sled_storage;

pub trait AccountStore {
    /// Register a user with an opening balance. Usernames are unique.
    fn create_account(
        &self,
        username: &str,
        opening_balance: Points,
        created_at: DateTime<Utc>,
    ) -> crate::Result<Account>;

    fn account(&self, id: UserId) -> crate::Result<Option<Account>>;

    fn account_by_username(&self, username: &str) -> crate::Result<Option<Account>>;

    /// Add a signed amount to a balance in one step, refusing to go below zero.
    fn adjust_balance(&self, id: UserId, delta: Points) -> crate::Result<Account>;
}

pub trait GameRepository {
    /// Move the account to `commit.new_balance` and append the game record as
    /// a single unit: either both land or neither does.
    fn commit_play(&self, commit: PlayCommit) -> crate::Result<GameRecord>;

    /// Games a user started in `[from, to)`.
    fn count_games_between(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<u32>;

    /// Snapshot of the records in scope, in insertion order.
    fn games(&self, scope: StatsScope) -> crate::Result<Vec<GameRecord>>;
}

/// Everything the ledger needs from its storage collaborator.
pub trait LedgerStorage: AccountStore + GameRepository + SettingsStore {}

impl<T: AccountStore + GameRepository + SettingsStore> LedgerStorage for T {}
