// Sled-backed persistence for accounts, game records and settings.
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
    settings::{
        GameSettings,
        SettingsStore,
    },
    stats::StatsScope,
    storage::{
        AccountStore,
        GameRepository,
    },
};
use anyhow::{
    Context,
    anyhow,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use sled::{
    Config,
    Db,
    Tree,
    transaction::{
        ConflictableTransactionError,
        TransactionError,
        Transactional,
    },
};
use std::path::Path;

type TxResult<T> = Result<T, ConflictableTransactionError<Error>>;

#[derive(Clone)]
pub struct SledStorage {
    db: Db,
    accounts: Tree,
    usernames: Tree,
    games: Tree,
    games_by_user: Tree,
    settings: Tree,
}

impl SledStorage {
    pub fn new(db: &Db) -> crate::Result<Self> {
        let accounts = db.open_tree("accounts").context("open accounts tree")?;
        let usernames = db.open_tree("usernames").context("open usernames tree")?;
        let games = db.open_tree("games").context("open games tree")?;
        let games_by_user = db
            .open_tree("games_by_user")
            .context("open games_by_user tree")?;
        let settings = db.open_tree("settings").context("open settings tree")?;

        Ok(Self {
            db: db.clone(),
            accounts,
            usernames,
            games,
            games_by_user,
            settings,
        })
    }

    /// Open (or create) the database at `path` and seed default settings.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let config = Config::default().path(path);
        let db = config.open().context("open sled database")?;
        let storage = Self::new(&db)?;
        GameSettings::seed_defaults(&storage)?;
        Ok(storage)
    }

    fn flush(&self, label: &str) -> crate::Result<()> {
        self.db.flush().with_context(|| format!("flush {label}"))?;
        Ok(())
    }

    fn load_game(&self, id: GameId) -> crate::Result<GameRecord> {
        let value = self
            .games
            .get(id.to_be_bytes())
            .context("read game record")?
            .ok_or_else(|| anyhow!("game {id} is indexed but missing"))?;
        deserialize(value.as_ref())
    }
}

/// `user | created_at millis | game id`, big-endian so that a user's games
/// sort by time and a day is one contiguous range.
fn user_game_key(user: UserId, at: DateTime<Utc>, game: GameId) -> [u8; 24] {
    let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..16].copy_from_slice(&millis.to_be_bytes());
    key[16..].copy_from_slice(&game.to_be_bytes());
    key
}

fn serialize_record<T: Serialize>(value: &T, label: &str) -> crate::Result<Vec<u8>> {
    let bytes = serde_json::to_vec(value).with_context(|| format!("serialize {label}"))?;
    Ok(bytes)
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> crate::Result<T> {
    let value = serde_json::from_slice(bytes).context("deserialize sled record")?;
    Ok(value)
}

fn abort(error: impl Into<Error>) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(error.into())
}

fn from_transaction(error: TransactionError<Error>, label: &str) -> Error {
    match error {
        TransactionError::Abort(error) => error,
        TransactionError::Storage(error) => {
            Error::Storage(anyhow::Error::new(error).context(label.to_string()))
        }
    }
}

impl SettingsStore for SledStorage {
    fn raw_setting(&self, key: &str) -> crate::Result<Option<String>> {
        let Some(value) = self.settings.get(key).context("read setting")? else {
            return Ok(None);
        };
        let value = String::from_utf8(value.to_vec())
            .with_context(|| format!("setting {key} is not valid UTF-8"))?;
        Ok(Some(value))
    }

    fn put_raw_setting(&self, key: &str, value: &str) -> crate::Result<()> {
        self.settings
            .insert(key, value.as_bytes())
            .context("persist setting")?;
        self.flush("settings")
    }
}

impl AccountStore for SledStorage {
    fn create_account(
        &self,
        username: &str,
        opening_balance: Points,
        created_at: DateTime<Utc>,
    ) -> crate::Result<Account> {
        if opening_balance < 0 {
            return Err(Error::NegativeBalance {
                balance: 0,
                delta: opening_balance,
            });
        }
        let account = (&self.accounts, &self.usernames)
            .transaction(|(accounts, usernames)| -> TxResult<Account> {
                if usernames.get(username.as_bytes())?.is_some() {
                    return Err(abort(Error::UsernameTaken(username.to_string())));
                }
                let id = accounts.generate_id()? + 1;
                let account = Account {
                    id,
                    username: username.to_string(),
                    balance: opening_balance,
                    created_at,
                };
                let bytes = serialize_record(&account, "account").map_err(abort)?;
                accounts.insert(id.to_be_bytes().to_vec(), bytes)?;
                usernames.insert(username.as_bytes(), id.to_be_bytes().to_vec())?;
                Ok(account)
            })
            .map_err(|e| from_transaction(e, "create account"))?;
        self.flush("accounts")?;
        tracing::debug!("created account {} ({})", account.id, account.username);
        Ok(account)
    }

    fn account(&self, id: UserId) -> crate::Result<Option<Account>> {
        let value = match self.accounts.get(id.to_be_bytes()).context("read account")? {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(Some(deserialize(value.as_ref())?))
    }

    fn account_by_username(&self, username: &str) -> crate::Result<Option<Account>> {
        let Some(id) = self
            .usernames
            .get(username.as_bytes())
            .context("read username index")?
        else {
            return Ok(None);
        };
        let id: [u8; 8] = id
            .as_ref()
            .try_into()
            .context("username index entry should be 8 bytes")?;
        self.account(UserId::from_be_bytes(id))
    }

    fn adjust_balance(&self, id: UserId, delta: Points) -> crate::Result<Account> {
        let account = self
            .accounts
            .transaction(|accounts| -> TxResult<Account> {
                let key = id.to_be_bytes();
                let Some(value) = accounts.get(key)? else {
                    return Err(abort(Error::UserNotFound(id.to_string())));
                };
                let mut account: Account = deserialize(value.as_ref()).map_err(abort)?;
                let Some(balance) = account.balance.checked_add(delta).filter(|b| *b >= 0)
                else {
                    return Err(abort(Error::NegativeBalance {
                        balance: account.balance,
                        delta,
                    }));
                };
                account.balance = balance;
                let bytes = serialize_record(&account, "account").map_err(abort)?;
                accounts.insert(key.to_vec(), bytes)?;
                Ok(account)
            })
            .map_err(|e| from_transaction(e, "adjust balance"))?;
        self.flush("accounts")?;
        Ok(account)
    }
}

impl GameRepository for SledStorage {
    fn commit_play(&self, commit: PlayCommit) -> crate::Result<GameRecord> {
        let record = (&self.accounts, &self.games, &self.games_by_user)
            .transaction(|(accounts, games, games_by_user)| -> TxResult<GameRecord> {
                let key = commit.user_id.to_be_bytes();
                let Some(value) = accounts.get(key)? else {
                    return Err(abort(Error::UserNotFound(commit.user_id.to_string())));
                };
                let mut account: Account = deserialize(value.as_ref()).map_err(abort)?;
                if account.balance != commit.expected_balance {
                    return Err(abort(anyhow!(
                        "balance for user {} changed during play (expected {}, found {})",
                        commit.user_id,
                        commit.expected_balance,
                        account.balance
                    )));
                }
                account.balance = commit.new_balance;

                let record = commit.clone().into_record(games.generate_id()? + 1);
                let account_bytes = serialize_record(&account, "account").map_err(abort)?;
                let record_bytes =
                    serialize_record(&record, "game record").map_err(abort)?;
                accounts.insert(key.to_vec(), account_bytes)?;
                games.insert(record.id.to_be_bytes().to_vec(), record_bytes)?;
                games_by_user.insert(
                    user_game_key(record.user_id, record.created_at, record.id).to_vec(),
                    Vec::new(),
                )?;
                Ok(record)
            })
            .map_err(|e| from_transaction(e, "commit play"))?;
        self.flush("play")?;
        Ok(record)
    }

    fn count_games_between(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<u32> {
        let start = user_game_key(user, from, 0);
        let end = user_game_key(user, to, 0);
        let mut count = 0u32;
        for entry in self.games_by_user.range(start..end) {
            entry.context("iterate games_by_user index")?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    fn games(&self, scope: StatsScope) -> crate::Result<Vec<GameRecord>> {
        let mut records = Vec::new();
        match scope {
            StatsScope::All => {
                for entry in self.games.iter() {
                    let (_, value) = entry.context("iterate game records")?;
                    records.push(deserialize(value.as_ref())?);
                }
            }
            StatsScope::ForUser(user) => {
                for entry in self.games_by_user.scan_prefix(user.to_be_bytes()) {
                    let (key, _) = entry.context("iterate games_by_user index")?;
                    let id: [u8; 8] = key[16..]
                        .try_into()
                        .context("games_by_user key should end with a game id")?;
                    records.push(self.load_game(GameId::from_be_bytes(id))?);
                }
                records.sort_by_key(|record: &GameRecord| record.id);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::board::Slot;
    use chrono::TimeZone;
    use tempdir::TempDir;

    fn sled_db(temp_dir: &TempDir) -> sled::Db {
        sled::Config::default()
            .path(temp_dir.path())
            .open()
            .expect("open sled db")
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn commit(
        user_id: UserId,
        expected_balance: Points,
        slot: u8,
        created_at: DateTime<Utc>,
    ) -> PlayCommit {
        let slot = Slot::new(slot).unwrap();
        let payout = slot.multiplier().payout(10);
        PlayCommit {
            user_id,
            expected_balance,
            new_balance: expected_balance - 10 + payout,
            bet_amount: 10,
            slot_hit: slot,
            multiplier: slot.multiplier(),
            payout,
            created_at,
        }
    }

    #[test]
    fn open__seeds_default_settings_once() {
        // given
        let temp_dir = TempDir::new("sled_storage_open").unwrap();
        {
            let storage = SledStorage::open(temp_dir.path()).unwrap();
            GameSettings::update(&storage, "max_bet", "500").unwrap();
        }

        // when
        let reopened = SledStorage::open(temp_dir.path()).unwrap();

        // then
        let settings = GameSettings::load(&reopened).unwrap();
        assert_eq!(settings.max_bet, 500);
        assert_eq!(settings.daily_limit, 50);
        assert_eq!(reopened.raw_setting("enabled").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn sut__when_committing_play_then_balance_and_record_are_persisted() {
        // given
        let temp_dir = TempDir::new("sled_storage_commit").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledStorage::new(&db).unwrap();
        let alice = storage.create_account("alice", 100, at(1, 8)).unwrap();

        // when
        let record = storage.commit_play(commit(alice.id, 100, 4, at(1, 9))).unwrap();

        // then
        assert_eq!(record.payout, 50);
        assert_eq!(storage.account(alice.id).unwrap().unwrap().balance, 140);
        assert_eq!(storage.games(StatsScope::All).unwrap(), vec![record.clone()]);
        assert_eq!(
            storage.games(StatsScope::ForUser(alice.id)).unwrap(),
            vec![record]
        );
    }

    #[test]
    fn sut__when_balance_is_stale_then_commit_aborts_without_writes() {
        // given
        let temp_dir = TempDir::new("sled_storage_stale").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledStorage::new(&db).unwrap();
        let alice = storage.create_account("alice", 100, at(1, 8)).unwrap();

        // when
        let result = storage.commit_play(commit(alice.id, 80, 4, at(1, 9)));

        // then
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(storage.account(alice.id).unwrap().unwrap().balance, 100);
        assert!(storage.games(StatsScope::All).unwrap().is_empty());
        assert_eq!(
            storage
                .count_games_between(alice.id, at(1, 0), at(2, 0))
                .unwrap(),
            0
        );
    }

    #[test]
    fn sut__when_user_is_unknown_then_commit_reports_user_not_found() {
        // given
        let temp_dir = TempDir::new("sled_storage_unknown").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledStorage::new(&db).unwrap();

        // when
        let result = storage.commit_play(commit(77, 100, 4, at(1, 9)));

        // then
        assert!(matches!(result, Err(Error::UserNotFound(id)) if id == "77"));
    }

    #[test]
    fn count_games_between__only_counts_the_requested_user_and_day() {
        // given
        let temp_dir = TempDir::new("sled_storage_count").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledStorage::new(&db).unwrap();
        let alice = storage.create_account("alice", 1_000, at(1, 0)).unwrap();
        let bob = storage.create_account("bob", 1_000, at(1, 0)).unwrap();
        let mut balance = 1_000;
        for (day, hour) in [(1, 23), (2, 0), (2, 12), (3, 0)] {
            let record = storage
                .commit_play(commit(alice.id, balance, 0, at(day, hour)))
                .unwrap();
            balance = balance - record.bet_amount + record.payout;
        }
        storage.commit_play(commit(bob.id, 1_000, 0, at(2, 6))).unwrap();

        // when
        let alice_day_two = storage
            .count_games_between(alice.id, at(2, 0), at(3, 0))
            .unwrap();
        let bob_day_two = storage
            .count_games_between(bob.id, at(2, 0), at(3, 0))
            .unwrap();

        // then
        assert_eq!(alice_day_two, 2);
        assert_eq!(bob_day_two, 1);
        assert_eq!(storage.account(alice.id).unwrap().unwrap().balance, 960);
    }

    #[test]
    fn adjust_balance__rejects_overdraft_and_keeps_balance() {
        // given
        let temp_dir = TempDir::new("sled_storage_adjust").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledStorage::new(&db).unwrap();
        let alice = storage.create_account("alice", 10, at(1, 0)).unwrap();

        // when
        let credited = storage.adjust_balance(alice.id, 15).unwrap();
        let overdrawn = storage.adjust_balance(alice.id, -26);

        // then
        assert_eq!(credited.balance, 25);
        assert!(matches!(overdrawn, Err(Error::NegativeBalance { .. })));
        assert_eq!(
            storage
                .account_by_username("alice")
                .unwrap()
                .map(|a| a.balance),
            Some(25)
        );
    }

    #[test]
    fn create_account__usernames_are_unique() {
        // given
        let temp_dir = TempDir::new("sled_storage_usernames").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledStorage::new(&db).unwrap();
        storage.create_account("alice", 10, at(1, 0)).unwrap();

        // when
        let duplicate = storage.create_account("alice", 10, at(1, 1));

        // then
        assert!(matches!(duplicate, Err(Error::UsernameTaken(_))));
        assert!(storage.account_by_username("nobody").unwrap().is_none());
    }
}
