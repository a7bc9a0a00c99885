use crate::Points;
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

pub const SLOT_COUNT: usize = 9;

pub const MAX_SLOT: u8 = (SLOT_COUNT - 1) as u8;

pub const CENTER_SLOT: u8 = 4;

/// Multipliers in half-units so that 0.5x stays exact: 0, 0.5, 1, 2, 5, 2, 1, 0.5, 0.
const MULTIPLIER_HALVES: [u8; SLOT_COUNT] = [0, 1, 2, 4, 10, 4, 2, 1, 0];

/// One of the nine landing positions at the bottom of the board.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Slot(u8);

impl Slot {
    pub const CENTER: Slot = Slot(CENTER_SLOT);

    pub fn new(index: u8) -> Option<Self> {
        (index <= MAX_SLOT).then_some(Self(index))
    }

    /// Pull any column number onto the board.
    pub fn clamped(position: i64) -> Self {
        Self(position.clamp(0, i64::from(MAX_SLOT)) as u8)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn multiplier(self) -> Multiplier {
        Multiplier {
            halves: MULTIPLIER_HALVES[usize::from(self.0)],
        }
    }

    pub fn left(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn right(self) -> Self {
        Self((self.0 + 1).min(MAX_SLOT))
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        (0..=MAX_SLOT).map(Slot)
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Slot::new(index).ok_or_else(|| format!("slot {index} is off the board"))
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Multiplier {
    halves: u8,
}

impl Multiplier {
    pub fn as_f64(self) -> f64 {
        f64::from(self.halves) / 2.0
    }

    /// `floor(bet * multiplier)` for a non-negative bet.
    pub fn payout(self, bet: Points) -> Points {
        bet.saturating_mul(Points::from(self.halves)) / 2
    }
}

impl TryFrom<f64> for Multiplier {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        MULTIPLIER_HALVES
            .iter()
            .copied()
            .find(|halves| f64::from(*halves) / 2.0 == value)
            .map(|halves| Multiplier { halves })
            .ok_or_else(|| format!("{value} is not a board multiplier"))
    }
}

impl From<Multiplier> for f64 {
    fn from(multiplier: Multiplier) -> Self {
        multiplier.as_f64()
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn multiplier__matches_symmetric_table_for_every_slot() {
        // given
        let expected = [0.0, 0.5, 1.0, 2.0, 5.0, 2.0, 1.0, 0.5, 0.0];

        // when
        let actual: Vec<f64> = Slot::all().map(|slot| slot.multiplier().as_f64()).collect();

        // then
        assert_eq!(actual, expected);
    }

    #[test]
    fn payout__floors_half_multiplier() {
        // given
        let half = Slot::new(1).unwrap().multiplier();

        // when
        let payout = half.payout(7);

        // then
        assert_eq!(payout, 3);
    }

    #[test]
    fn payout__center_slot_pays_five_times() {
        assert_eq!(Slot::CENTER.multiplier().payout(10), 50);
    }

    #[test]
    fn clamped__pulls_out_of_range_columns_onto_board() {
        assert_eq!(Slot::clamped(-3).index(), 0);
        assert_eq!(Slot::clamped(42).index(), MAX_SLOT);
        assert_eq!(Slot::clamped(6).index(), 6);
    }

    #[test]
    fn slot__rejects_index_past_last_slot() {
        assert!(Slot::new(9).is_none());
        assert!(serde_json::from_str::<Slot>("9").is_err());
    }

    #[test]
    fn multiplier__serializes_as_plain_number() {
        // given
        let multiplier = Slot::new(7).unwrap().multiplier();

        // when
        let json = serde_json::to_string(&multiplier).unwrap();

        // then
        assert_eq!(json, "0.5");
        assert_eq!(serde_json::from_str::<Multiplier>(&json).unwrap(), multiplier);
        assert!(serde_json::from_str::<Multiplier>("3.0").is_err());
    }

    proptest! {
        #[test]
        fn payout__equals_floor_of_bet_times_multiplier(bet in 0i64..1_000_000, index in 0u8..=MAX_SLOT) {
            let multiplier = Slot::new(index).unwrap().multiplier();
            let expected = (bet as f64 * multiplier.as_f64()).floor() as i64;
            prop_assert_eq!(multiplier.payout(bet), expected);
        }
    }
}
