pub mod board;

pub mod ledger;

pub mod records;

pub mod settings;

pub mod simulator;

pub mod stats;

pub mod storage;

pub mod validator;

pub type UserId = u64;

pub type GameId = u64;

/// Signed point amount; balances, bets and payouts share one unit.
pub type Points = i64;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reasons a play is refused before anything is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Plinko is currently disabled")]
    GameDisabled,
    #[error("Bet must be between {min} and {max} points")]
    InvalidBetAmount { min: Points, max: Points },
    #[error("Insufficient points: balance {balance}, bet {bet}")]
    InsufficientBalance { balance: Points, bet: Points },
    #[error("Daily game limit of {limit} reached")]
    DailyLimitReached { limit: u32 },
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::GameDisabled => "game_disabled",
            Rejection::InvalidBetAmount { .. } => "invalid_bet_amount",
            Rejection::InsufficientBalance { .. } => "insufficient_balance",
            Rejection::DailyLimitReached { .. } => "daily_limit_reached",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("unknown setting '{0}' (expected one of: enabled, min_bet, max_bet, daily_limit)")]
    InvalidConfigKey(String),
    #[error("invalid value '{value}' for setting '{key}'")]
    InvalidConfigValue { key: String, value: String },
    #[error("adjusting balance {balance} by {delta} would leave it negative")]
    NegativeBalance { balance: Points, delta: Points },
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Error::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }
}
