//! A library for actively learning weighted automata over the integers.
//!
//! The learner in [`active`] follows the L* scheme: an observation table collects the weights of words
//! (obtained through membership queries) and is extended until every row can be written as an integer
//! linear combination of the rows it already contains. From such a closed table, a hypothesis automaton
//! is built and handed to an equivalence oracle, which either accepts it or produces a counterexample
//! that refines the table.

/// Deals with active learning algorithms such as L*.
pub mod active;

pub use active::{LearningError, LearningOptions, LearningStats, WeightedLStar};
