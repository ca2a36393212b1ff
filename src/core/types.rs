//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// The single random source threaded through every operation that draws
/// randomness. Seeded once per run.
pub type SimRng = rand_chacha::ChaCha8Rng;

/// Simulation step counter
pub type Step = u32;

/// Unique identifier for labs
///
/// Ordering matters: the auction breaks price ties by ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabId(pub u32);

impl LabId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lab#{}", self.0)
    }
}
