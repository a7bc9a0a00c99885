use crate::{
    Error,
    GameId,
    Points,
    UserId,
    records::{
        Account,
        GameRecord,
        PlayCommit,
    },
    settings::SettingsStore,
    stats::StatsScope,
    storage::{
        AccountStore,
        GameRepository,
    },
};
use anyhow::anyhow;
use chrono::{
    DateTime,
    Utc,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

#[derive(Default)]
struct State {
    accounts: BTreeMap<UserId, Account>,
    games: Vec<GameRecord>,
    settings: HashMap<String, String>,
    next_user_id: UserId,
    next_game_id: GameId,
}

/// Process-local storage. Every operation runs inside one critical section,
/// which is what makes `commit_play` atomic here.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> crate::Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage(anyhow!("in-memory storage lock poisoned")))
    }
}

impl SettingsStore for InMemoryStorage {
    fn raw_setting(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.state()?.settings.get(key).cloned())
    }

    fn put_raw_setting(&self, key: &str, value: &str) -> crate::Result<()> {
        self.state()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl AccountStore for InMemoryStorage {
    fn create_account(
        &self,
        username: &str,
        opening_balance: Points,
        created_at: DateTime<Utc>,
    ) -> crate::Result<Account> {
        let mut state = self.state()?;
        if state.accounts.values().any(|a| a.username == username) {
            return Err(Error::UsernameTaken(username.to_string()));
        }
        if opening_balance < 0 {
            return Err(Error::NegativeBalance {
                balance: 0,
                delta: opening_balance,
            });
        }
        state.next_user_id += 1;
        let account = Account {
            id: state.next_user_id,
            username: username.to_string(),
            balance: opening_balance,
            created_at,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn account(&self, id: UserId) -> crate::Result<Option<Account>> {
        Ok(self.state()?.accounts.get(&id).cloned())
    }

    fn account_by_username(&self, username: &str) -> crate::Result<Option<Account>> {
        Ok(self
            .state()?
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    fn adjust_balance(&self, id: UserId, delta: Points) -> crate::Result<Account> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::UserNotFound(id.to_string()))?;
        let balance = account.balance.checked_add(delta).filter(|b| *b >= 0);
        let Some(balance) = balance else {
            return Err(Error::NegativeBalance {
                balance: account.balance,
                delta,
            });
        };
        account.balance = balance;
        Ok(account.clone())
    }
}

impl GameRepository for InMemoryStorage {
    fn commit_play(&self, commit: PlayCommit) -> crate::Result<GameRecord> {
        let mut state = self.state()?;
        let game_id = state.next_game_id + 1;
        let account = state
            .accounts
            .get_mut(&commit.user_id)
            .ok_or_else(|| Error::UserNotFound(commit.user_id.to_string()))?;
        if account.balance != commit.expected_balance {
            return Err(Error::Storage(anyhow!(
                "balance for user {} changed during play (expected {}, found {})",
                commit.user_id,
                commit.expected_balance,
                account.balance
            )));
        }
        account.balance = commit.new_balance;
        let record = commit.into_record(game_id);
        state.next_game_id = game_id;
        state.games.push(record.clone());
        Ok(record)
    }

    fn count_games_between(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<u32> {
        let count = self
            .state()?
            .games
            .iter()
            .filter(|g| g.user_id == user && g.created_at >= from && g.created_at < to)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn games(&self, scope: StatsScope) -> crate::Result<Vec<GameRecord>> {
        Ok(self
            .state()?
            .games
            .iter()
            .filter(|g| scope.includes(g))
            .cloned()
            .collect())
    }
}
