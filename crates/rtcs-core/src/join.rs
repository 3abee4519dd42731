//! Fan-out/fan-in of independent store operations.
//!
//! Several verbs that together form one logical step (both halves of a
//! membership pair, the trim/append/expire of a chat append) are launched
//! together and joined into a single result. The join waits for EVERY branch
//! to settle before reporting: no branch is abandoned in flight and no error
//! is dropped.
//!
//! There is no rollback. A multi-branch failure is reported as
//! [`StoreError::PartialFailure`] carrying every branch error, and callers
//! must treat it as "state possibly inconsistent", not "state unchanged".

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, join_all};

use crate::error::StoreError;

/// A set of homogeneous branches joined into one result.
///
/// Branches run concurrently on the polling task; results come back in push
/// order.
pub struct FanOut<'a, T> {
    /// Operation name for logs
    label: &'static str,
    branches: Vec<BoxFuture<'a, Result<T, StoreError>>>,
}

impl<'a, T: Send + 'a> FanOut<'a, T> {
    /// Create an empty fan-out.
    pub fn new(label: &'static str) -> Self {
        Self { label, branches: Vec::new() }
    }

    /// Add a branch. It is not polled until [`FanOut::join`].
    pub fn push<F>(&mut self, branch: F)
    where
        F: Future<Output = Result<T, StoreError>> + Send + 'a,
    {
        self.branches.push(branch.boxed());
    }

    /// Number of branches.
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Check if no branches were added.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Run every branch to completion.
    ///
    /// A single branch reports its own error unchanged. With more than one
    /// branch any failure becomes [`StoreError::PartialFailure`].
    pub async fn join(self) -> Result<Vec<T>, StoreError> {
        let total = self.branches.len();
        let outcomes = join_all(self.branches).await;

        if total == 1 {
            return outcomes.into_iter().collect();
        }

        let mut values = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(value) => values.push(value),
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() { Ok(values) } else { Err(partial_failure(self.label, total, errors)) }
    }
}

/// Join two branches with different output types.
///
/// Both branches always run to completion. Any failure becomes
/// [`StoreError::PartialFailure`].
pub async fn join2<A, B, FA, FB>(label: &'static str, a: FA, b: FB) -> Result<(A, B), StoreError>
where
    FA: Future<Output = Result<A, StoreError>>,
    FB: Future<Output = Result<B, StoreError>>,
{
    match futures::join!(a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (a, b) => {
            let errors = [a.err(), b.err()].into_iter().flatten().collect();
            Err(partial_failure(label, 2, errors))
        },
    }
}

fn partial_failure(label: &'static str, total: usize, errors: Vec<StoreError>) -> StoreError {
    debug_assert!(!errors.is_empty());
    let applied = total - errors.len();

    tracing::warn!(
        op = label,
        applied,
        total,
        first_error = %errors[0],
        "fan-out partially failed, state may be inconsistent"
    );

    StoreError::PartialFailure { applied, total, errors }
}
