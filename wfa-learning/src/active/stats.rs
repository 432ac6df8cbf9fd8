use std::fmt::Display;

/// Counters that are collected during a learning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearningStats {
    /// Number of distinct membership queries, taken at the last equivalence query.
    pub membership_queries: usize,
    /// Number of passes over the one letter extensions while closing the table.
    pub closedness_passes: usize,
    /// Number of equivalence queries.
    pub equivalence_queries: usize,
    /// How often the table was already closed right after processing a counterexample.
    pub closed_after_counterexample: usize,
    /// Number of rows deleted by the redundancy check.
    pub rows_removed: usize,
    /// How often the fallback equivalence oracle had to answer instead of the primary one.
    pub fallbacks: usize,
    /// Whether the final automaton was obtained from a lattice basis.
    pub collapsed: bool,
}

impl Display for LearningStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "membership queries: {}", self.membership_queries)?;
        writeln!(f, "closedness passes: {}", self.closedness_passes)?;
        writeln!(f, "equivalence queries: {}", self.equivalence_queries)?;
        writeln!(
            f,
            "closed after counterexample: {}",
            self.closed_after_counterexample
        )?;
        writeln!(f, "rows removed: {}", self.rows_removed)?;
        writeln!(f, "fallbacks: {}", self.fallbacks)?;
        write!(f, "collapsed: {}", self.collapsed)
    }
}
