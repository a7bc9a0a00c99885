use crate::board::Slot;
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};

/// Peg rows between the drop column and the slots.
pub const PEG_ROWS: usize = 5;

/// Drop column followed by one position per peg row.
pub const PATH_LEN: usize = PEG_ROWS + 1;

pub type BallPath = [Slot; PATH_LEN];

/// Decides where a dropped ball lands.
///
/// The random source is owned so tests can pin it with [`OutcomeSimulator::seeded`].
pub struct OutcomeSimulator<R = StdRng> {
    rng: R,
}

impl OutcomeSimulator<StdRng> {
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> OutcomeSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Walk `PEG_ROWS` fair left/right steps from `drop`, absorbing at both edges.
    pub fn simulate(&mut self, drop: Slot) -> Slot {
        (0..PEG_ROWS).fold(drop, |position, _| {
            if self.rng.random_bool(0.5) {
                position.left()
            } else {
                position.right()
            }
        })
    }

    /// Cosmetic path for the animation. Each row may nudge one column towards
    /// `end`; the last entry is always `end`, wherever the nudges got to.
    pub fn trace_path(&mut self, start: Slot, end: Slot) -> BallPath {
        let mut path = [start; PATH_LEN];
        let mut current = start;
        for step in path.iter_mut().skip(1) {
            let moves = self.rng.random_bool(0.5);
            if moves && current < end {
                current = current.right();
            } else if moves && current > end {
                current = current.left();
            }
            *step = current;
        }
        path[PATH_LEN - 1] = end;
        path
    }
}
