//! # Column Indexer
//!
//! ## Role
//! Chooses which Monte-Carlo column of a package is read on each iteration.
//!
//! ## Modes
//! - **Random**: `index = draw(0..2^31-1) % ncols`. Seeded with `StdRng::seed_from_u64`
//!   when a seed is given, from OS entropy otherwise. Same seed, same stream.
//! - **Sequential**: `index = count % ncols`, wrapping to 0 after `ncols` steps.
//!
//! Every `advance()` increments `count`, whatever the mode.
//!
//! `ncols == 0` means the column count is unknown (a package with no data).
//! The index then starts as `None` and each step yields the raw draw or count.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{SeedSpec, MAX_SIGNED_32BIT_INT};

#[derive(Clone, Debug)]
enum Mode {
    Random { rng: StdRng, seed: Option<u64> },
    Sequential,
}

#[derive(Clone, Debug)]
pub struct Indexer {
    ncols: usize,
    mode: Mode,
    count: usize,
    index: Option<usize>,
}

impl Indexer {
    /// `seed`: `None` for an unseeded random stream
    pub fn new(ncols: usize, seed: Option<SeedSpec>) -> Self {
        let mode = match seed {
            Some(SeedSpec::Sequential) => Mode::Sequential,
            Some(SeedSpec::Value(s)) => Mode::Random {
                rng: StdRng::seed_from_u64(s),
                seed: Some(s),
            },
            None => Mode::Random {
                rng: StdRng::from_entropy(),
                seed: None,
            },
        };
        Self {
            ncols,
            mode,
            count: 0,
            index: Self::initial_index(ncols),
        }
    }

    fn initial_index(ncols: usize) -> Option<usize> {
        (ncols > 0).then_some(0)
    }

    /// Move to the next column and return it
    pub fn advance(&mut self) -> usize {
        let index = match &mut self.mode {
            Mode::Sequential => self.count,
            Mode::Random { rng, .. } => rng.gen_range(0..MAX_SIGNED_32BIT_INT) as usize,
        };
        let index = if self.ncols > 0 { index % self.ncols } else { index };
        self.count += 1;
        self.index = Some(index);
        index
    }

    /// Restart from the beginning: zero count, and the seeded stream replays
    pub fn reset(&mut self) {
        self.count = 0;
        self.index = Self::initial_index(self.ncols);
        if let Mode::Random {
            rng,
            seed: Some(seed),
        } = &mut self.mode
        {
            *rng = StdRng::seed_from_u64(*seed);
        }
    }

    /// Current column, `None` before the first step when `ncols == 0`
    #[inline]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Number of `advance()` calls since construction or the last reset
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self.mode, Mode::Sequential)
    }

    /// Seed this indexer was built with
    pub fn seed(&self) -> Option<SeedSpec> {
        match self.mode {
            Mode::Sequential => Some(SeedSpec::Sequential),
            Mode::Random { seed, .. } => seed.map(SeedSpec::Value),
        }
    }
}
