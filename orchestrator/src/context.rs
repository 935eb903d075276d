//! Explicit run context handed to every component
//!
//! Holds the run identity and the random seed. Randomness is drawn from
//! independent streams keyed by iteration, so a resumed run replays exactly
//! the draws an uninterrupted run would have made.

use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::RunId;

/// Independent random streams used during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    RowSeeding,
    ColumnSeeding,
    RowUpdate,
    ColumnUpdate,
}

impl RngStream {
    fn tag(self) -> u64 {
        match self {
            RngStream::RowSeeding => 1,
            RngStream::ColumnSeeding => 2,
            RngStream::RowUpdate => 3,
            RngStream::ColumnUpdate => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    seed: u64,
}

impl RunContext {
    pub fn new(run_id: RunId, seed: u64) -> Self {
        Self { run_id, seed }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Deterministic generator for one stream on one iteration
    pub fn rng(&self, iteration: u32, stream: RngStream) -> StdRng {
        let mixed = splitmix64(self.seed ^ splitmix64((u64::from(iteration) << 8) | stream.tag()));
        StdRng::seed_from_u64(mixed)
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
