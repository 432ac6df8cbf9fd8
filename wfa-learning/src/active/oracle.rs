use std::time::{Duration, Instant};

use thiserror::Error;
use wfa::{lattice::LatticeError, prelude::*};

/// Answers membership queries, i.e. gives the weight that the target assigns to a word. Answers must be a
/// pure function of the word, which allows the learner to cache them in a [`super::MembershipCache`].
pub trait MembershipOracle {
    /// Returns the weight of `word`.
    fn membership(&self, word: &[char]) -> Weight;
}

impl MembershipOracle for WeightedAutomaton {
    fn membership(&self, word: &[char]) -> Weight {
        self.member(word)
    }
}

/// Failures of closedness and equivalence oracles. Some of them are recoverable in the sense that
/// asking a different oracle may still produce an answer, see [`OracleError::is_recoverable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The oracle did not produce an answer before its deadline.
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
    /// The oracle cannot be reached, for example because its input was closed.
    #[error("oracle is unavailable: {0}")]
    Unavailable(String),
    /// Exact arithmetic failed, for example because the rows handed to a solver were ragged.
    #[error("exact arithmetic failed: {0}")]
    Arithmetic(#[from] LatticeError),
    /// The oracle returned a combination with the wrong number of coefficients.
    #[error("oracle returned {found} coefficients for {expected} rows")]
    Malformed {
        /// The number of rows in the table.
        expected: usize,
        /// The number of coefficients that were returned.
        found: usize,
    },
    /// The oracle returned a combination which does not reproduce the row of the given word.
    #[error("returned combination does not produce the row of {0}")]
    IncorrectCombination(String),
    /// The oracle returned a word on which target and hypothesis agree.
    #[error("{0} is not a counterexample")]
    SpuriousCounterexample(String),
}

impl OracleError {
    /// Returns true if the failure concerns the oracle's ability to answer rather than the correctness
    /// of an answer, in which case retrying with a different oracle is sensible.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OracleError::Timeout(_) | OracleError::Unavailable(_) | OracleError::Arithmetic(_)
        )
    }
}

/// A point in time until which an oracle has to answer. Oracles check the deadline
/// regularly and give up with [`OracleError::Timeout`] once it has passed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Creates a deadline that expires `limit` from now, or never if `limit` is `None`.
    pub fn after(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self::after(None)
    }

    /// Returns true if the deadline has passed.
    pub fn expired(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.start.elapsed() >= limit)
    }

    /// Fails with [`OracleError::Timeout`] if the deadline has passed.
    pub fn check(&self) -> Result<(), OracleError> {
        match self.limit {
            Some(limit) if self.expired() => Err(OracleError::Timeout(limit)),
            _ => Ok(()),
        }
    }

    /// The point in time at which the deadline expires, if any. This is what the `_until` functions of
    /// [`wfa::lattice`] expect.
    pub fn instant(&self) -> Option<Instant> {
        self.limit.and_then(|limit| self.start.checked_add(limit))
    }

    /// Translates a failed exact computation into an oracle failure, an interrupted elimination
    /// becomes a [`OracleError::Timeout`].
    pub fn lattice_error(&self, error: LatticeError) -> OracleError {
        match error {
            LatticeError::Interrupted => OracleError::Timeout(self.limit.unwrap_or_default()),
            error => OracleError::Arithmetic(error),
        }
    }
}
