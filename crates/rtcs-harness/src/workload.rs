//! Seeded soak workload.
//!
//! Drives both stores the way a chat server would: guests arrive, connect
//! sockets, join and leave rooms, chat, and hand off one-time tokens. Every
//! choice comes from a seeded RNG, so a failing run replays exactly.
//!
//! Transient errors (backend and partial failures) are counted and the
//! workload moves on. Anything else is a bug and aborts the run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rtcs_core::{Environment, KeyValueStore, StoreError};
use rtcs_storage::{ChatMessage, EphemeralStore, PersistentStore};
use serde_json::{Value, json};

/// Shape of one workload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// RNG seed for every choice
    pub seed: u64,
    /// Guests created up front
    pub users: usize,
    /// Rooms the guests move between
    pub rooms: usize,
    /// Operations after setup
    pub rounds: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self { seed: 0, users: 8, rooms: 3, rounds: 500 }
    }
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadStats {
    /// Operations attempted
    pub operations: usize,
    /// Guests created
    pub guests: usize,
    /// Room joins that added a new membership
    pub joins: usize,
    /// Room departures that removed a membership
    pub leaves: usize,
    /// Chat messages appended
    pub messages: usize,
    /// Tokens created and released
    pub tokens: usize,
    /// Operations that failed with a transient error
    pub failures: usize,
    /// Failures that were partial (state possibly inconsistent)
    pub partial_failures: usize,
    /// Released token payload differed from what was stored
    pub token_mismatches: usize,
    /// A token released a second time still returned a payload
    pub double_releases: usize,
}

impl WorkloadStats {
    /// Check if any operation failed.
    pub fn saw_faults(&self) -> bool {
        self.failures > 0
    }

    fn record<T>(
        &mut self,
        op: &'static str,
        result: Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        self.operations += 1;
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_transient() => {
                self.failures += 1;
                if matches!(err, StoreError::PartialFailure { .. }) {
                    self.partial_failures += 1;
                }
                tracing::debug!(op, %err, "operation failed");
                Ok(None)
            },
            Err(err) => {
                tracing::error!(op, %err, "operation failed with a non-transient error");
                Err(err)
            },
        }
    }
}

/// Run the workload against a pair of stores sharing one backend.
///
/// # Errors
///
/// Returns the first non-transient [`StoreError`]; transient ones are only
/// counted.
pub async fn run<S, E>(
    persistent: &PersistentStore<S, E>,
    ephemeral: &EphemeralStore<S, E>,
    config: &WorkloadConfig,
) -> Result<WorkloadStats, StoreError>
where
    S: KeyValueStore,
    E: Environment,
{
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut stats = WorkloadStats::default();

    let mut users = Vec::with_capacity(config.users);
    for i in 0..config.users {
        let name = if i % 2 == 0 { None } else { Some(format!("soak-{i}")) };
        let guest = stats.record("get_guest", persistent.get_guest(name.as_deref()).await)?;
        if let Some(guest) = guest {
            stats.guests += 1;
            users.push(guest.id);
        }
    }

    if users.is_empty() || config.rooms == 0 {
        tracing::warn!(guests = users.len(), rooms = config.rooms, "nothing to drive");
        return Ok(stats);
    }

    for round in 0..config.rounds {
        let user = &users[rng.gen_range(0..users.len())];
        let room = format!("room-{}", rng.gen_range(0..config.rooms));
        let time = round as u64;

        match rng.gen_range(0..6) {
            0 => {
                let socket = format!("socket-{round}");
                stats.record("add_socket", ephemeral.add_socket(&socket, user).await)?;
            },
            1 => {
                let sockets = stats.record("get_sockets", ephemeral.get_sockets(user).await)?;
                if let Some(socket) = sockets.and_then(|sockets| sockets.into_iter().next()) {
                    stats.record("remove_socket", ephemeral.remove_socket(&socket, user).await)?;
                }
            },
            2 => {
                let joined = ephemeral.add_user_to_room(user, &room).await;
                let already = stats.record("add_user_to_room", joined)?;
                if already == Some(false) {
                    stats.joins += 1;
                }
            },
            3 => {
                let left = ephemeral.remove_user_from_room(user, &room).await;
                let departure = stats.record("remove_user_from_room", left)?;
                if departure.is_some_and(|d| !d.already_absent) {
                    stats.leaves += 1;
                }
            },
            4 => {
                let message = ChatMessage::new(time)
                    .with("from", user.as_str())
                    .with("text", format!("message {round}"));
                if stats.record("add_log", persistent.add_log(&room, &message).await)?.is_some() {
                    stats.messages += 1;
                }
            },
            _ => hand_off_token(ephemeral, &mut stats, user, round).await?,
        }
    }

    tracing::info!(?stats, "workload finished");
    Ok(stats)
}

async fn hand_off_token<S, E>(
    ephemeral: &EphemeralStore<S, E>,
    stats: &mut WorkloadStats,
    user: &str,
    round: usize,
) -> Result<(), StoreError>
where
    S: KeyValueStore,
    E: Environment,
{
    let payload = json!({"user": user, "round": round});
    let Some(token) = stats.record("create_token", ephemeral.create_token(&payload).await)? else {
        return Ok(());
    };
    stats.tokens += 1;

    let first = ephemeral.release_token::<Value>(&token).await;
    let first = stats.record("release_token", first)?.flatten();
    if first.as_ref().is_some_and(|released| *released != payload) {
        stats.token_mismatches += 1;
    }

    let second = ephemeral.release_token::<Value>(&token).await;
    let second = stats.record("release_token", second)?.flatten();
    if first.is_some() && second.is_some() {
        stats.double_releases += 1;
    }
    Ok(())
}
