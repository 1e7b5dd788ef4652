//! Deterministic PRNG for sensor fault sampling.
//!
//! Uses the SplitMix64 algorithm. The generator lives inside the simulation
//! state, so advancing a frame twice from the same state draws the same
//! numbers and produces the same fault log.

use crate::fixed::Fixed64;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Returns `true` with the given probability.
    ///
    /// Probabilities at or below zero never fire and do not consume a draw;
    /// probabilities at or above one always fire, also without a draw.
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // For p in (0, 1) the Q32.32 bits are the fraction scaled to [0, 2^32).
        let upper = self.next_u64() >> 32;
        upper < probability.to_bits() as u64
    }

    /// Internal state, fed into the frame hash.
    pub fn state(&self) -> u64 {
        self.state
    }
}
