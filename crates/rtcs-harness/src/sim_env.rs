//! Simulated environment for deterministic store tests.
//!
//! Time is virtual: it starts at zero and only moves when [`SimEnv::advance`]
//! is called, so TTLs in a [`MemoryStore`](rtcs_storage::MemoryStore) expire
//! exactly when a test says so. Randomness comes from a seeded ChaCha RNG,
//! and identifiers can be scripted to force allocator collisions.

use std::{
    collections::VecDeque,
    ops::{Add, Sub},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rtcs_core::{Environment, env::encode_id};

/// Point on the virtual clock, measured from simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time elapsed since simulation start.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = SimInstant;

    fn add(self, rhs: Duration) -> SimInstant {
        SimInstant(self.0.saturating_add(rhs))
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: SimInstant) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct SimState {
    rng: ChaCha8Rng,
    now: Duration,
    scripted_ids: VecDeque<String>,
}

/// Deterministic environment. Clones share clock, RNG and script.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment with the given RNG seed, clock at zero.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                now: Duration::ZERO,
                scripted_ids: VecDeque::new(),
            })),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now = state.now.saturating_add(by);
    }

    /// Queue identifiers to hand out before falling back to the RNG.
    ///
    /// Repeating a value makes the allocator collide on it.
    pub fn script_ids<I, T>(&self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.lock().scripted_ids.extend(ids.into_iter().map(Into::into));
    }

    /// Scripted identifiers not yet handed out.
    pub fn scripted_remaining(&self) -> usize {
        self.lock().scripted_ids.len()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        SimInstant(self.lock().now)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }

    fn fresh_id(&self) -> String {
        let mut state = self.lock();
        if let Some(id) = state.scripted_ids.pop_front() {
            return id;
        }

        let mut bytes = [0u8; rtcs_core::env::ID_BYTES];
        state.rng.fill_bytes(&mut bytes);
        encode_id(&bytes)
    }
}
