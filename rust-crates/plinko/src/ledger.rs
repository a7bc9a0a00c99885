use crate::{
    Error,
    GameId,
    Points,
    Rejection,
    UserId,
    board::{
        Multiplier,
        Slot,
    },
    records::{
        Account,
        PlayCommit,
    },
    settings::GameSettings,
    simulator::{
        BallPath,
        OutcomeSimulator,
    },
    stats::{
        self,
        StatsOptions,
        StatsScope,
        StatsSummary,
    },
    storage::LedgerStorage,
    validator,
};
use anyhow::anyhow;
use chrono::{
    DateTime,
    Duration,
    Local,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
    TimeZone,
    Utc,
};
use rand::{
    Rng,
    rngs::StdRng,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// `[local midnight, next local midnight)` around `now`, in UTC.
pub fn day_window(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);
    (local_midnight(today), local_midnight(tomorrow))
}

fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    first_valid_instant(naive, |wall| {
        Local
            .from_local_datetime(&wall)
            .earliest()
            .map(|at| at.with_timezone(&Utc))
    })
    .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// The first wall-clock minute at or after `start` that `resolve` maps to a
/// real instant. Skips over a DST gap that swallows midnight.
fn first_valid_instant(
    start: NaiveDateTime,
    resolve: impl Fn(NaiveDateTime) -> Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    (0..MINUTES_PER_DAY).find_map(|minute| resolve(start + Duration::minutes(minute)))
}

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Outcome of a validated play, before it is persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub slot_hit: Slot,
    pub multiplier: Multiplier,
    pub payout: Points,
    pub profit: Points,
    pub new_balance: Points,
}

/// Validate, drop the ball and price the result. No side effects beyond the
/// random source.
pub fn settle<R: Rng>(
    balance: Points,
    bet: Points,
    drop: Slot,
    today_game_count: u32,
    settings: &GameSettings,
    simulator: &mut OutcomeSimulator<R>,
) -> Result<Settlement, Rejection> {
    validator::validate(balance, bet, today_game_count, settings)?;
    let slot_hit = simulator.simulate(drop);
    let multiplier = slot_hit.multiplier();
    let payout = multiplier.payout(bet);
    Ok(Settlement {
        slot_hit,
        multiplier,
        payout,
        profit: payout - bet,
        new_balance: balance - bet + payout,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayOutcome {
    pub game_id: GameId,
    pub slot_hit: Slot,
    pub multiplier: Multiplier,
    pub payout: Points,
    pub profit: Points,
    pub new_balance: Points,
    pub ball_path: BallPath,
}

#[derive(Default)]
struct UserLocks {
    table: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Run `f` while holding `user`'s lock. Other users are not blocked.
    fn with_user<T>(
        &self,
        user: UserId,
        f: impl FnOnce() -> crate::Result<T>,
    ) -> crate::Result<T> {
        let lock = {
            let mut table = self
                .table
                .lock()
                .map_err(|_| Error::Storage(anyhow!("user lock table poisoned")))?;
            table.entry(user).or_default().clone()
        };
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(Error::Storage(anyhow!("lock for user {user} poisoned"))),
        };
        self.release(user, &lock);
        result
    }

    /// Forget `user`'s entry once no other caller holds or waits on it.
    fn release(&self, user: UserId, lock: &Arc<Mutex<()>>) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        if Arc::strong_count(lock) == 2 {
            table.remove(&user);
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.table.lock().map(|table| table.len()).unwrap_or(0)
    }
}

/// Runs plays against a storage collaborator. The read-validate-commit
/// sequence for one user is serialized; different users run in parallel.
pub struct LedgerService<S, R = StdRng, C = SystemClock> {
    storage: S,
    simulator: Mutex<OutcomeSimulator<R>>,
    clock: C,
    locks: UserLocks,
}

impl<S: LedgerStorage> LedgerService<S> {
    pub fn new(storage: S) -> Self {
        Self::with_parts(storage, OutcomeSimulator::from_os_rng(), SystemClock)
    }
}

impl<S: LedgerStorage, R: Rng, C: Clock> LedgerService<S, R, C> {
    pub fn with_parts(storage: S, simulator: OutcomeSimulator<R>, clock: C) -> Self {
        Self {
            storage,
            simulator: Mutex::new(simulator),
            clock,
            locks: UserLocks::default(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn play(
        &self,
        user: UserId,
        bet: Points,
        drop_position: i64,
    ) -> crate::Result<PlayOutcome> {
        self.locks.with_user(user, || {
            let settings = GameSettings::load(&self.storage)?;
            let account = self
                .storage
                .account(user)?
                .ok_or_else(|| Error::UserNotFound(user.to_string()))?;
            let now = self.clock.now();
            let (from, to) = day_window(now);
            let today = self.storage.count_games_between(user, from, to)?;
            let drop = Slot::clamped(drop_position);

            let settlement = {
                let mut simulator = self.simulator()?;
                settle(account.balance, bet, drop, today, &settings, &mut *simulator)
            };
            let settlement = match settlement {
                Ok(settlement) => settlement,
                Err(rejection) => {
                    tracing::warn!(
                        "rejected play for user {user} (bet {bet}): {rejection}"
                    );
                    return Err(rejection.into());
                }
            };

            let commit = PlayCommit {
                user_id: user,
                expected_balance: account.balance,
                new_balance: settlement.new_balance,
                bet_amount: bet,
                slot_hit: settlement.slot_hit,
                multiplier: settlement.multiplier,
                payout: settlement.payout,
                created_at: now.with_timezone(&Utc),
            };
            let record = self.storage.commit_play(commit).inspect_err(|e| {
                tracing::error!("failed to record play for user {user}: {e}");
            })?;

            let ball_path = self
                .simulator()?
                .trace_path(drop, settlement.slot_hit);
            tracing::info!(
                "game {} user {} bet {} landed in slot {} ({}) payout {} balance {}",
                record.id,
                user,
                bet,
                settlement.slot_hit,
                settlement.multiplier,
                settlement.payout,
                settlement.new_balance
            );
            Ok(PlayOutcome {
                game_id: record.id,
                slot_hit: settlement.slot_hit,
                multiplier: settlement.multiplier,
                payout: settlement.payout,
                profit: settlement.profit,
                new_balance: settlement.new_balance,
                ball_path,
            })
        })
    }

    /// Open an account stamped with the ledger clock.
    pub fn register(&self, username: &str, opening_balance: Points) -> crate::Result<Account> {
        let account = self.storage.create_account(
            username,
            opening_balance,
            self.clock.now().with_timezone(&Utc),
        )?;
        tracing::info!(
            "registered {} as user {} with {} points",
            account.username,
            account.id,
            account.balance
        );
        Ok(account)
    }

    /// Credit or debit a user by name. Serialized with that user's plays.
    pub fn adjust_points(&self, username: &str, delta: Points) -> crate::Result<Account> {
        let account = self
            .storage
            .account_by_username(username)?
            .ok_or_else(|| Error::UserNotFound(username.to_string()))?;
        let account = self
            .locks
            .with_user(account.id, || self.storage.adjust_balance(account.id, delta))?;
        tracing::info!(
            "adjusted {} by {delta}; balance now {}",
            account.username,
            account.balance
        );
        Ok(account)
    }

    pub fn stats(
        &self,
        scope: StatsScope,
        options: &StatsOptions,
    ) -> crate::Result<StatsSummary> {
        stats::summarize(&self.storage, scope, options)
    }

    fn simulator(&self) -> crate::Result<std::sync::MutexGuard<'_, OutcomeSimulator<R>>> {
        self.simulator
            .lock()
            .map_err(|_| Error::Storage(anyhow!("outcome simulator lock poisoned")))
    }
}
