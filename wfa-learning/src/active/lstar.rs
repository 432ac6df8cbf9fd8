use std::time::Duration;

use itertools::Itertools;
use num_traits::One;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use wfa::{
    math::{divides, gcd_all, unit},
    prelude::*,
    word::parent,
};

use super::{
    collapse_basis, create_machine, describe_combination, ClosednessOracle, ClosednessQuery,
    CollapseError, Deadline, EquivalenceOracle, LearningStats, LinearCombinations,
    MembershipCache, ObservationTable, OracleError,
};

const ROUND_THRESHOLD: usize = if cfg!(debug_assertions) { 300 } else { 200000 };

/// Configures a run of [`WeightedLStar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningOptions {
    /// Whether rows are divided by the greatest common divisor of their entries. Without factorization
    /// the table holds raw weights, every state weight is the weight of its access word and the initial
    /// distribution is the first unit vector.
    pub factorize: bool,
    /// Whether rows that are combinations of other rows are deleted once a correct hypothesis is found.
    pub remove_redundant_rows: bool,
    /// Whether the final hypothesis is rebuilt from a lattice basis of the row space.
    pub collapse_basis: bool,
    /// The maximal number of hypotheses that are built.
    pub max_rounds: usize,
    /// The time that every single oracle call may take.
    pub oracle_timeout: Option<Duration>,
    /// If set, learning a hypothesis with more states fails with [`LearningError::NotMinimal`].
    pub state_bound: Option<usize>,
}

impl Default for LearningOptions {
    fn default() -> Self {
        let max_rounds = std::env::var("MAX_ROUNDS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(ROUND_THRESHOLD);
        Self {
            factorize: true,
            remove_redundant_rows: true,
            collapse_basis: false,
            max_rounds,
            oracle_timeout: None,
            state_bound: None,
        }
    }
}

impl LearningOptions {
    /// The default options, but without factorization of rows.
    pub fn plain() -> Self {
        Self {
            factorize: false,
            ..Default::default()
        }
    }

    /// Enables or disables factorization.
    pub fn with_factorize(mut self, factorize: bool) -> Self {
        self.factorize = factorize;
        self
    }

    /// Enables or disables the removal of redundant rows.
    pub fn with_redundant_row_removal(mut self, remove: bool) -> Self {
        self.remove_redundant_rows = remove;
        self
    }

    /// Enables or disables the basis collapse.
    pub fn with_basis_collapse(mut self, collapse: bool) -> Self {
        self.collapse_basis = collapse;
        self
    }

    /// Sets the maximal number of rounds.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Sets the time limit for oracle calls.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = Some(timeout);
        self
    }

    /// Sets the maximal number of states that the learned automaton may have.
    pub fn with_state_bound(mut self, bound: usize) -> Self {
        self.state_bound = Some(bound);
        self
    }
}

/// Everything that makes a learning run fail.
#[derive(Debug, Error)]
pub enum LearningError {
    /// An oracle failed and no fallback could answer instead.
    #[error(transparent)]
    Oracle(#[from] OracleError),
    /// A hypothesis could not be built from the table.
    #[error("could not build hypothesis: {0}")]
    Construction(#[from] InvalidTransition),
    /// The basis collapse failed on a closed table.
    #[error("basis collapse failed: {0}")]
    Collapse(#[from] CollapseError),
    /// The learned automaton is larger than allowed.
    #[error("learned automaton has {learned} states, but at most {bound} are allowed")]
    NotMinimal {
        /// The size of the learned automaton.
        learned: usize,
        /// The configured bound.
        bound: usize,
    },
    /// No correct hypothesis was found within the given number of rounds.
    #[error("no correct hypothesis after {0} rounds")]
    RoundLimit(usize),
    /// A counterexample did not change the table.
    #[error("counterexample {0} does not refine the table")]
    Stalled(String),
}

/// What happened when the learner tried to replace a correct hypothesis by a collapsed one.
enum Collapse {
    Accepted(WeightedAutomaton),
    Rejected,
    Refined,
}

/// Learns a weighted automaton with integer weights in the style of L*.
///
/// The learner maintains an [`ObservationTable`] and alternates between closing the table with the
/// help of a [`ClosednessOracle`] and checking the resulting hypothesis with an [`EquivalenceOracle`].
/// Counterexamples contribute all their suffixes as new columns. Once the hypothesis is correct, rows
/// which turn out to be combinations of other rows are deleted and, if requested, the hypothesis is
/// rebuilt from a lattice basis of the rows. Membership queries are answered by the target itself and
/// cached for the duration of the run.
pub struct WeightedLStar<'a, C: ClosednessOracle, Q: EquivalenceOracle> {
    target: &'a WeightedAutomaton,
    closedness: C,
    equivalence: Q,
    fallback: Option<Box<dyn EquivalenceOracle>>,
    closedness_fallback: Option<Box<dyn ClosednessOracle>>,
    options: LearningOptions,
    cache: MembershipCache,
    table: ObservationTable,
    stats: LearningStats,
    // set whenever closing adds a row or shrinks a common divisor
    table_changed: bool,
}

impl<'a, C: ClosednessOracle, Q: EquivalenceOracle> WeightedLStar<'a, C, Q> {
    /// Creates a learner for `target` with default options.
    pub fn new(target: &'a WeightedAutomaton, closedness: C, equivalence: Q) -> Self {
        let options = LearningOptions::default();
        let mut cache = MembershipCache::new();
        let table =
            ObservationTable::new(target.alphabet().clone(), options.factorize, target, &mut cache);
        Self {
            target,
            closedness,
            equivalence,
            fallback: None,
            closedness_fallback: None,
            options,
            cache,
            table,
            stats: LearningStats::default(),
            table_changed: false,
        }
    }

    /// Replaces the options. This resets the table, so it should be called before learning.
    pub fn with_options(mut self, options: LearningOptions) -> Self {
        self.table = ObservationTable::new(
            self.target.alphabet().clone(),
            options.factorize,
            self.target,
            &mut self.cache,
        );
        self.options = options;
        self
    }

    /// Sets an equivalence oracle that answers whenever the primary one fails with a recoverable error.
    pub fn with_fallback<F: EquivalenceOracle + 'static>(mut self, fallback: F) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Sets a closedness oracle that answers whenever the primary one fails with a recoverable error,
    /// both while closing the table and while removing redundant rows.
    pub fn with_closedness_fallback<F: ClosednessOracle + 'static>(mut self, fallback: F) -> Self {
        self.closedness_fallback = Some(Box::new(fallback));
        self
    }

    /// The counters collected so far.
    pub fn stats(&self) -> LearningStats {
        self.stats
    }

    /// The current observation table.
    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    /// All membership queries that were posed so far.
    pub fn cache(&self) -> &MembershipCache {
        &self.cache
    }

    /// The options of this run.
    pub fn options(&self) -> &LearningOptions {
        &self.options
    }

    /// Runs the learner until a hypothesis is found that the equivalence oracle accepts.
    pub fn infer(&mut self) -> Result<WeightedAutomaton, LearningError> {
        let start = std::time::Instant::now();
        let mut combinations = self.close()?;
        let mut collapse_tried = false;

        for round in 0..self.options.max_rounds {
            let hypothesis = create_machine(&self.table, &combinations)?;
            trace!("hypothesis of round {round}\n{hypothesis}");

            if let Some(counterexample) = self.check_equivalence(&hypothesis)? {
                combinations = self.refine(&counterexample)?;
                continue;
            }

            // every removal shrinks the table, so this settles unless counterexamples add rows again
            if self.options.remove_redundant_rows && self.remove_redundant_rows()? > 0 {
                combinations = self.close()?;
                continue;
            }

            let result = if self.options.collapse_basis && !collapse_tried {
                collapse_tried = true;
                match self.collapse(&hypothesis)? {
                    Collapse::Accepted(collapsed) => collapsed,
                    Collapse::Rejected => hypothesis,
                    Collapse::Refined => {
                        combinations = self.close()?;
                        continue;
                    }
                }
            } else {
                hypothesis
            };

            self.check_bound(&result)?;
            info!(
                "learning an automaton with {} states took {}ms",
                result.size(),
                start.elapsed().as_millis()
            );
            return Ok(result);
        }

        Err(LearningError::RoundLimit(self.options.max_rounds))
    }

    /// Closes the table. The one letter extensions of all rows are scanned and every extension that is not
    /// a row itself is handed to the closedness oracle. An extension whose row cannot be expressed becomes
    /// a new row, and whenever the common divisor of the parent does not divide the extension, the divisor
    /// is shrunk. Both restart the scan. Returns the combinations for all extensions together with the
    /// initial distribution, which is mapped to the empty word.
    pub fn close(&mut self) -> Result<LinearCombinations, LearningError> {
        'scan: loop {
            self.stats.closedness_passes += 1;
            let size = self.table.size();
            let mut combinations = LinearCombinations::default();
            combinations.insert(
                Word::new(),
                unit(0, size, self.table.transition(&[]).unwrap_or_else(Weight::one)),
            );

            for t in self.table.one_letter_extensions() {
                if let Some(j) = self.table.index_of(&t) {
                    let transition = self.table.transition(&t).unwrap_or_else(Weight::one);
                    combinations.insert(t, unit(j, size, transition));
                    continue;
                }

                let raw = self.table.raw_row(&t, self.target, &mut self.cache);
                let common = gcd_all(&raw);
                let origin = parent(&t).unwrap_or_default();
                let scale = self.table.scale(origin);
                if !divides(&scale, &common) {
                    debug!(
                        "common divisor {scale} of {} does not divide {common} of {}",
                        origin.show(),
                        t.show()
                    );
                    self.table
                        .shrink_gcd(origin, &common, self.target, &mut self.cache);
                    self.table_changed = true;
                    continue 'scan;
                }

                let row = raw.iter().map(|x| x / &scale).collect_vec();
                let basis = self.table.basis();
                let query = ClosednessQuery {
                    prefixes: self.table.prefixes(),
                    suffixes: self.table.suffixes(),
                    candidate: &t,
                    basis: &basis,
                    row: &row,
                };
                let answer = decide_closedness(
                    &mut self.closedness,
                    &mut self.closedness_fallback,
                    &mut self.stats,
                    self.options.oracle_timeout,
                    &query,
                )?;
                match answer {
                    Some(combination) => {
                        query.verify(&combination)?;
                        trace!(
                            "{} = {}",
                            t.show(),
                            describe_combination(self.table.prefixes(), &combination)
                        );
                        combinations.insert(t, combination);
                    }
                    None => {
                        debug!("promoting {} to a row", t.show());
                        self.table.push_row(t, self.target, &mut self.cache);
                        self.table_changed = true;
                        continue 'scan;
                    }
                }
            }

            debug_assert!(self.table.is_consistent(&self.cache));
            trace!("closed table\n{:?}", self.table);
            return Ok(combinations);
        }
    }

    /// Asks the equivalence oracle, or the fallback if the oracle fails in a recoverable way. A returned
    /// counterexample is checked against the target.
    fn check_equivalence(
        &mut self,
        hypothesis: &WeightedAutomaton,
    ) -> Result<Option<Word>, LearningError> {
        self.stats.equivalence_queries += 1;
        self.stats.membership_queries = self.cache.len();

        let deadline = Deadline::after(self.options.oracle_timeout);
        let answer = match self.equivalence.find_counterexample(
            self.target,
            hypothesis,
            &mut self.cache,
            &deadline,
        ) {
            Ok(answer) => answer,
            Err(e) if e.is_recoverable() => {
                let Some(fallback) = self.fallback.as_mut() else {
                    return Err(e.into());
                };
                warn!("equivalence oracle failed with `{e}`, asking fallback");
                self.stats.fallbacks += 1;
                let deadline = Deadline::after(self.options.oracle_timeout);
                fallback.find_counterexample(self.target, hypothesis, &mut self.cache, &deadline)?
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(word) = &answer {
            let expected = self.cache.query(self.target, word);
            if expected == hypothesis.member(word) {
                return Err(OracleError::SpuriousCounterexample(word.show()).into());
            }
            debug!(
                "counterexample {} has weight {expected} instead of {}",
                word.show(),
                hypothesis.member(word)
            );
        }
        Ok(answer)
    }

    /// Adds the suffixes of `counterexample` to the table and closes it again.
    fn refine(&mut self, counterexample: &[char]) -> Result<LinearCombinations, LearningError> {
        let (added, changed) =
            self.table
                .add_counterexample(counterexample, self.target, &mut self.cache);
        if added.is_empty() && !changed {
            return Err(LearningError::Stalled(counterexample.show()));
        }
        self.table_changed = false;
        let combinations = self.close()?;
        if !self.table_changed {
            self.stats.closed_after_counterexample += 1;
        }
        Ok(combinations)
    }

    /// Deletes rows that are combinations of the remaining rows, starting with the most recent one.
    /// The row of the empty word is never deleted. Returns the number of deleted rows.
    fn remove_redundant_rows(&mut self) -> Result<usize, LearningError> {
        let mut removed = 0;
        for index in (1..self.table.size()).rev() {
            let t = self.table.prefixes()[index].clone();
            let scale = self.table.parent_scale(&t);
            let raw = self.table.raw_row(&t, self.target, &mut self.cache);
            if !raw.iter().all(|x| divides(&scale, x)) {
                continue;
            }
            let row = raw.iter().map(|x| x / &scale).collect_vec();
            let (prefixes, basis) = self.table.basis_without(index);
            let query = ClosednessQuery {
                prefixes: &prefixes,
                suffixes: self.table.suffixes(),
                candidate: &t,
                basis: &basis,
                row: &row,
            };
            let answer = decide_closedness(
                &mut self.closedness,
                &mut self.closedness_fallback,
                &mut self.stats,
                self.options.oracle_timeout,
                &query,
            )?;
            if let Some(combination) = answer {
                query.verify(&combination)?;
                debug!(
                    "row {} is redundant, it equals {}",
                    t.show(),
                    describe_combination(&prefixes, &combination)
                );
                if self.table.remove_row(index).is_some() {
                    removed += 1;
                }
            }
        }
        self.stats.rows_removed += removed;
        Ok(removed)
    }

    /// Tries to replace the correct `hypothesis` by one built from a lattice basis of the rows, which is
    /// only worthwhile if it has fewer states. This is attempted once per run, a counterexample to the
    /// collapsed hypothesis refines the table and learning continues with rows as states.
    fn collapse(&mut self, hypothesis: &WeightedAutomaton) -> Result<Collapse, LearningError> {
        let collapsed = collapse_basis(&self.table, self.target, &mut self.cache)?;
        if collapsed.size() >= hypothesis.size() {
            debug!("lattice basis has {} vectors, keeping the rows", collapsed.size());
            return Ok(Collapse::Rejected);
        }

        match self.check_equivalence(&collapsed)? {
            None => {
                self.stats.collapsed = true;
                Ok(Collapse::Accepted(collapsed))
            }
            Some(counterexample) => {
                let (added, changed) =
                    self.table
                        .add_counterexample(&counterexample, self.target, &mut self.cache);
                if added.is_empty() && !changed {
                    debug!(
                        "counterexample {} to collapsed hypothesis does not refine the table",
                        counterexample.show()
                    );
                    return Ok(Collapse::Rejected);
                }
                Ok(Collapse::Refined)
            }
        }
    }

    fn check_bound(&self, result: &WeightedAutomaton) -> Result<(), LearningError> {
        match self.options.state_bound {
            Some(bound) if result.size() > bound => Err(LearningError::NotMinimal {
                learned: result.size(),
                bound,
            }),
            _ => Ok(()),
        }
    }
}

/// Asks `primary` and, if it fails in a recoverable way, `fallback`. Each oracle gets its own deadline.
fn decide_closedness<C: ClosednessOracle>(
    primary: &mut C,
    fallback: &mut Option<Box<dyn ClosednessOracle>>,
    stats: &mut LearningStats,
    timeout: Option<Duration>,
    query: &ClosednessQuery<'_>,
) -> Result<Option<Vec<Weight>>, LearningError> {
    match primary.decide(query, &Deadline::after(timeout)) {
        Ok(answer) => Ok(answer),
        Err(e) if e.is_recoverable() => {
            let Some(fallback) = fallback.as_mut() else {
                return Err(e.into());
            };
            warn!(
                "closedness oracle failed with `{e}` on {}, asking fallback",
                query.candidate.show()
            );
            stats.fallbacks += 1;
            Ok(fallback.decide(query, &Deadline::after(timeout))?)
        }
        Err(e) => Err(e.into()),
    }
}

impl<C: ClosednessOracle, Q: EquivalenceOracle> std::fmt::Debug for WeightedLStar<'_, C, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.table)
    }
}

#[cfg(test)]
mod tests {
    use wfa::random::{generate_random_wfa, RandomWfaConfig};

    use super::*;
    use crate::active::{Bisimulation, ExactSolver};

    #[test]
    fn options() {
        let options = LearningOptions::plain()
            .with_basis_collapse(true)
            .with_max_rounds(5)
            .with_state_bound(3);
        assert!(!options.factorize);
        assert!(options.remove_redundant_rows);
        assert!(options.collapse_basis);
        assert_eq!(options.max_rounds, 5);
        assert_eq!(options.state_bound, Some(3));
        assert_eq!(options.oracle_timeout, None);
    }

    #[test_log::test]
    fn removal_keeps_the_table_closed() {
        let mut rng = fastrand::Rng::with_seed(17);
        let alphabet = alphabet!(simple 'a', 'b');
        let config = RandomWfaConfig::default();
        for _ in 0..10 {
            let target = generate_random_wfa(&alphabet, &config, &mut rng);
            let options = LearningOptions::default().with_redundant_row_removal(false);
            let mut lstar =
                WeightedLStar::new(&target, ExactSolver, Bisimulation).with_options(options);
            lstar.infer().unwrap();

            let before = lstar.table().size();
            let removed = lstar.remove_redundant_rows().unwrap();
            assert_eq!(lstar.table().size() + removed, before);
            assert_eq!(lstar.stats().rows_removed, removed);

            lstar.table_changed = false;
            lstar.close().unwrap();
            assert!(!lstar.table_changed);
            assert_eq!(lstar.table().size(), before - removed);
        }
    }

    #[test_log::test]
    fn removal_is_repeated_until_nothing_is_redundant() {
        let mut rng = fastrand::Rng::with_seed(29);
        let alphabet = alphabet!(simple 'a', 'b', 'c');
        let config = RandomWfaConfig::with_states(6);
        for _ in 0..8 {
            let target = generate_random_wfa(&alphabet, &config, &mut rng);
            let mut lstar = WeightedLStar::new(&target, ExactSolver, Bisimulation);
            let learned = lstar.infer().unwrap();
            assert_eq!(learned.size(), lstar.table().size());
            assert_eq!(lstar.remove_redundant_rows().unwrap(), 0);
        }
    }

    #[test]
    fn error_messages() {
        let error = LearningError::NotMinimal {
            learned: 3,
            bound: 2,
        };
        assert_eq!(
            error.to_string(),
            "learned automaton has 3 states, but at most 2 are allowed"
        );
        let error: LearningError = OracleError::Unavailable("closed".into()).into();
        assert_eq!(error.to_string(), "oracle is unavailable: closed");
    }
}
