//! Simulated unreliable-channel behavior.
//!
//! The injector sits between the splitter and the wire: before each
//! first transmission the sender asks it what the "network" did to the
//! chunk. Requested retransmissions bypass it, so a retransmitted chunk
//! always arrives intact.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::chunk::{Chunk, chunk_digest};

/// Checksum substituted when corruption cannot be expressed as payload
/// bit flips (empty payloads, or flips that cancelled out).
const CLOBBERED_CHECKSUM: &str = "00000000000000000000000000000000";

/// Fault-injection policy for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultPolicy {
    pub enabled: bool,
    /// Per-chunk probability of a fault, 0.0 to 1.0.
    pub rate: f64,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 0.0,
        }
    }
}

/// What the simulated network did to an outgoing chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Chunk goes out untouched.
    Pass(Chunk),
    /// Chunk is silently lost; the receiver learns of the gap only from
    /// later traffic.
    Drop,
    /// Chunk goes out with a payload that no longer matches its declared
    /// checksum, so the receiver's verification must reject it.
    Corrupt(Chunk),
}

/// Per-session fault injector owning its own RNG.
///
/// Sessions get independent injectors so one transfer's draws never
/// perturb another's, and a seeded injector replays identical fault
/// sequences for reproducible tests.
pub struct FaultInjector {
    policy: FaultPolicy,
    rng: StdRng,
}

impl FaultInjector {
    /// Creates an injector with an OS-seeded RNG.
    pub fn new(policy: FaultPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates an injector with a fixed seed for reproducible runs.
    pub fn with_seed(policy: FaultPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Decides the fate of one outgoing chunk.
    pub fn perturb(&mut self, chunk: Chunk) -> Outcome {
        if !self.policy.enabled {
            return Outcome::Pass(chunk);
        }
        if !self.rng.gen_bool(self.policy.rate.clamp(0.0, 1.0)) {
            return Outcome::Pass(chunk);
        }

        if self.rng.gen_bool(0.5) {
            tracing::debug!(sequence = chunk.sequence, "injecting chunk drop");
            Outcome::Drop
        } else {
            tracing::debug!(sequence = chunk.sequence, "injecting chunk corruption");
            Outcome::Corrupt(self.corrupt(chunk))
        }
    }

    /// XORs up to 10 random payload bytes with nonzero values, keeping
    /// the declared checksum. Flips can cancel out, and empty payloads
    /// have nothing to flip; in those cases the checksum is clobbered
    /// instead so verification still fails.
    fn corrupt(&mut self, mut chunk: Chunk) -> Chunk {
        for _ in 0..chunk.data.len().min(10) {
            let pos = self.rng.gen_range(0..chunk.data.len());
            chunk.data[pos] ^= self.rng.gen_range(1..=255u8);
        }
        if chunk_digest(&chunk.data) == chunk.checksum {
            chunk.checksum = CLOBBERED_CHECKSUM.into();
        }
        chunk
    }
}
