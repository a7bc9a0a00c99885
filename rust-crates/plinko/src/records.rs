use crate::{
    GameId,
    Points,
    UserId,
    board::{
        Multiplier,
        Slot,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// One settled play. Append-only once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub user_id: UserId,
    pub bet_amount: Points,
    pub slot_hit: Slot,
    pub multiplier: Multiplier,
    pub payout: Points,
    pub created_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn profit(&self) -> Points {
        self.payout - self.bet_amount
    }

    pub fn is_win(&self) -> bool {
        self.payout > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub balance: Points,
    pub created_at: DateTime<Utc>,
}

/// Everything storage needs to settle a validated play in one step.
///
/// `expected_balance` is the balance the play was validated against; the
/// commit must fail if the stored balance no longer matches it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayCommit {
    pub user_id: UserId,
    pub expected_balance: Points,
    pub new_balance: Points,
    pub bet_amount: Points,
    pub slot_hit: Slot,
    pub multiplier: Multiplier,
    pub payout: Points,
    pub created_at: DateTime<Utc>,
}

impl PlayCommit {
    pub fn into_record(self, id: GameId) -> GameRecord {
        GameRecord {
            id,
            user_id: self.user_id,
            bet_amount: self.bet_amount,
            slot_hit: self.slot_hit,
            multiplier: self.multiplier,
            payout: self.payout,
            created_at: self.created_at,
        }
    }
}
