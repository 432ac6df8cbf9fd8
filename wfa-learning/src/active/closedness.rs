use std::io::{BufRead, Write};

use itertools::Itertools;
use num_traits::{One, Zero};
use tracing::{debug, trace};
use wfa::{lattice, prelude::*};

use super::{Deadline, OracleError};

/// Everything a closedness oracle needs to know: the rows of the table together with the prefixes
/// they belong to, the suffixes that index the columns, and the candidate word whose normalized row
/// should be expressed as an integer linear combination of the rows.
#[derive(Debug, Clone, Copy)]
pub struct ClosednessQuery<'a> {
    /// The prefixes whose rows form the basis.
    pub prefixes: &'a [Word],
    /// The columns of the table.
    pub suffixes: &'a [Word],
    /// The word whose row is in question.
    pub candidate: &'a [char],
    /// The normalized rows, in the order of `prefixes`.
    pub basis: &'a [Vec<Weight>],
    /// The normalized row of the candidate.
    pub row: &'a [Weight],
}

impl ClosednessQuery<'_> {
    /// Checks that `combination` has one coefficient per row and that it actually produces the row
    /// of the candidate.
    pub fn verify(&self, combination: &[Weight]) -> Result<(), OracleError> {
        if combination.len() != self.basis.len() {
            return Err(OracleError::Malformed {
                expected: self.basis.len(),
                found: combination.len(),
            });
        }
        if math::combine(combination, self.basis, self.row.len()) != self.row {
            return Err(OracleError::IncorrectCombination(self.candidate.show()));
        }
        Ok(())
    }
}

/// Decides whether a row is an integer linear combination of other rows. An answer of `Some(x)` means
/// that `sum_i x[i] * basis[i] = row`, while `None` states that no such combination exists.
pub trait ClosednessOracle {
    /// Answers the given query before `deadline` expires.
    fn decide(
        &mut self,
        query: &ClosednessQuery<'_>,
        deadline: &Deadline,
    ) -> Result<Option<Vec<Weight>>, OracleError>;
}

impl<C: ClosednessOracle + ?Sized> ClosednessOracle for Box<C> {
    fn decide(
        &mut self,
        query: &ClosednessQuery<'_>,
        deadline: &Deadline,
    ) -> Result<Option<Vec<Weight>>, OracleError> {
        C::decide(self, query, deadline)
    }
}

/// Solves closedness queries exactly by bringing the basis into Hermite normal form. The deadline is
/// checked throughout the elimination, so a long computation ends in [`OracleError::Timeout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSolver;

impl ClosednessOracle for ExactSolver {
    fn decide(
        &mut self,
        query: &ClosednessQuery<'_>,
        deadline: &Deadline,
    ) -> Result<Option<Vec<Weight>>, OracleError> {
        deadline.check()?;
        let solution = lattice::solve_until(query.basis, query.row, deadline.instant())
            .map_err(|e| deadline.lattice_error(e))?;
        trace!(
            "row {} of {} is {}",
            query.row.show(),
            query.candidate.show(),
            solution
                .as_ref()
                .map_or("not a combination".to_string(), |x| format!("combination {}", x.show()))
        );
        Ok(solution)
    }
}

/// Asks a human for the answer to closedness queries. The table is printed to `output` and a line is
/// read from `input`, which is either `false` or the coefficients separated by whitespace. Answers that
/// cannot be parsed, have the wrong length or do not produce the row are rejected and the question is
/// asked again.
pub struct InteractiveClosedness<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractiveClosedness<R, W> {
    /// Creates an oracle that reads answers from `input` and writes questions to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, query: &ClosednessQuery<'_>) -> std::io::Result<()> {
        writeln!(self.output, "rows over suffixes {}:", query.suffixes.show())?;
        for (i, (s, row)) in query.prefixes.iter().zip(query.basis).enumerate() {
            writeln!(self.output, "  {i}: {} {}", s.show(), row.show())?;
        }
        writeln!(
            self.output,
            "Is {} {} a combination of these rows? Answer `false` or give {} coefficients.",
            query.candidate.show(),
            query.row.show(),
            query.basis.len()
        )?;
        self.output.flush()
    }
}

impl InteractiveClosedness<std::io::StdinLock<'static>, std::io::Stdout> {
    /// An oracle that talks to the terminal.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

fn unavailable(e: std::io::Error) -> OracleError {
    OracleError::Unavailable(e.to_string())
}

impl<R: BufRead, W: Write> ClosednessOracle for InteractiveClosedness<R, W> {
    fn decide(
        &mut self,
        query: &ClosednessQuery<'_>,
        deadline: &Deadline,
    ) -> Result<Option<Vec<Weight>>, OracleError> {
        self.ask(query).map_err(unavailable)?;
        loop {
            deadline.check()?;
            let mut line = String::new();
            if self.input.read_line(&mut line).map_err(unavailable)? == 0 {
                return Err(OracleError::Unavailable("input was closed".to_string()));
            }
            let answer = line.trim();
            if answer == "false" {
                debug!("user states that {} is not a combination", query.candidate.show());
                return Ok(None);
            }

            let parsed: Result<Vec<Weight>, _> =
                answer.split_whitespace().map(str::parse).collect();
            let problem = match parsed {
                Err(e) => format!("could not parse `{answer}`: {e}"),
                Ok(combination) => match query.verify(&combination) {
                    Ok(()) => return Ok(Some(combination)),
                    Err(e) => e.to_string(),
                },
            };
            debug!("rejecting answer: {problem}");
            writeln!(self.output, "{problem}, please try again.").map_err(unavailable)?;
        }
    }
}

/// The available closedness oracles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosednessStrategy {
    /// Use [`ExactSolver`].
    #[default]
    Exact,
    /// Use [`InteractiveClosedness`] on the terminal.
    Interactive,
}

impl ClosednessStrategy {
    /// All strategies, together with the names they are known by.
    pub const NAMES: [(&'static str, ClosednessStrategy); 2] = [
        ("exact", ClosednessStrategy::Exact),
        ("interactive", ClosednessStrategy::Interactive),
    ];

    /// Looks up a strategy by its name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find_map(|(n, s)| (*n == name).then_some(*s))
    }

    /// Instantiates the oracle.
    pub fn build(self) -> Box<dyn ClosednessOracle> {
        match self {
            ClosednessStrategy::Exact => Box::new(ExactSolver),
            ClosednessStrategy::Interactive => Box::new(InteractiveClosedness::stdio()),
        }
    }
}

impl std::fmt::Display for ClosednessStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = Self::NAMES
            .iter()
            .find_map(|(n, s)| (s == self).then_some(*n))
            .unwrap_or_default();
        write!(f, "{name}")
    }
}

/// Formats a combination as a readable sum of prefixes, e.g. `2·"a" - "b"`.
pub fn describe_combination(prefixes: &[Word], combination: &[Weight]) -> String {
    let terms = prefixes
        .iter()
        .zip(combination)
        .filter(|(_, c)| !c.is_zero())
        .map(|(s, c)| {
            if c.is_one() {
                s.show()
            } else if (-c).is_one() {
                format!("-{}", s.show())
            } else {
                format!("{c}·{}", s.show())
            }
        })
        .join(" + ");
    if terms.is_empty() {
        "0".to_string()
    } else {
        terms
    }
}
