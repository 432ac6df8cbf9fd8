use itertools::Itertools;
use num_traits::Zero;
use thiserror::Error;
use tracing::{debug, trace};
use wfa::{
    lattice,
    math::divides,
    prelude::*,
    word::{concat, prepend},
};

use super::{MembershipCache, MembershipOracle, ObservationTable};

/// Maps one letter extensions `s + a` of rows to the coefficients that express their row through the
/// rows of the table. The empty word is mapped to the initial distribution.
pub type LinearCombinations = math::Map<Word, Vec<Weight>>;

/// Builds the hypothesis of a closed table. State `i` corresponds to the `i`-th row, its weight is the
/// normalized entry for the empty suffix, and the transition from `i` on `a` to `j` carries the `j`-th
/// coefficient of the combination for `S[i] + a`.
pub fn create_machine(
    table: &ObservationTable,
    combinations: &LinearCombinations,
) -> Result<WeightedAutomaton, InvalidTransition> {
    WeightedAutomaton::from_linear_combinations(
        table.alphabet().clone(),
        table.prefixes(),
        table.state_weights(),
        combinations,
    )
}

/// Reasons for which a hypothesis cannot be built from a lattice basis of the rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollapseError {
    /// The weight of `word` is not divisible by the scale of its row.
    #[error("weight {weight} of {word} is not divisible by {scale}")]
    Inexact {
        /// The queried word.
        word: String,
        /// Its weight.
        weight: Weight,
        /// The scale of the row that contains it.
        scale: Weight,
    },
    /// Some function is not a combination of the basis vectors.
    #[error("{0} cannot be expressed through the basis")]
    Unsolvable(String),
    /// Exact arithmetic failed.
    #[error(transparent)]
    Arithmetic(#[from] LatticeError),
    /// The computed transitions do not fit the automaton.
    #[error(transparent)]
    Construction(#[from] InvalidTransition),
}

/// Builds a hypothesis whose states are the vectors of a lattice basis of the row space instead of the
/// rows themselves. The columns are extended to `E ∪ {a·e}` so that successor functions of the basis
/// vectors are visible, which gives the transitions. Weights that are not known yet are queried through
/// `oracle`. The result computes the same weights on `S · E` as the table, whether it is equivalent to
/// the target has to be checked separately.
pub fn collapse_basis<M: MembershipOracle + ?Sized>(
    table: &ObservationTable,
    oracle: &M,
    cache: &mut MembershipCache,
) -> Result<WeightedAutomaton, CollapseError> {
    let suffixes = table.suffixes();
    let alphabet = table.alphabet();
    let mut columns: Vec<Word> = suffixes.to_vec();
    for a in alphabet.universe() {
        for e in suffixes {
            let shifted = prepend(a, e);
            if !columns.contains(&shifted) {
                columns.push(shifted);
            }
        }
    }
    let position = |word: &[char]| columns.iter().position(|c| c == word);

    let mut rows = Vec::with_capacity(table.size());
    for s in table.prefixes() {
        let scale = table.scale(s);
        let mut row = Vec::with_capacity(columns.len());
        for e in &columns {
            let word = concat(s, e);
            let weight = cache.query(oracle, &word);
            if !divides(&scale, &weight) {
                return Err(CollapseError::Inexact {
                    word: word.show(),
                    weight,
                    scale,
                });
            }
            row.push(weight / &scale);
        }
        rows.push(row);
    }

    let lattice = Lattice::generated_by(columns.len(), &rows)?;
    let basis = lattice.basis();
    debug!(
        "row space of {} rows has a basis of size {}",
        rows.len(),
        basis.len()
    );

    let weights = basis.iter().map(|b| b[0].clone()).collect_vec();
    let empty = cache.query_row(oracle, &[], &columns);
    let initial = lattice::solve(basis, &empty)?
        .ok_or_else(|| CollapseError::Unsolvable("the weights of the target".to_string()))?;
    let mut aut = WeightedAutomaton::new(alphabet.clone(), weights, Some(initial));

    let restricted = basis
        .iter()
        .map(|b| b[..suffixes.len()].to_vec())
        .collect_vec();
    for (origin, b) in basis.iter().enumerate() {
        for a in alphabet.universe() {
            let successor = suffixes
                .iter()
                .map(|e| {
                    position(&prepend(a, e))
                        .map(|i| b[i].clone())
                        .ok_or_else(|| CollapseError::Unsolvable(prepend(a, e).show()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let combination = lattice::solve(&restricted, &successor)?.ok_or_else(|| {
                CollapseError::Unsolvable(format!("successor of basis vector {origin} on {a}"))
            })?;
            trace!("basis vector {origin} on {a} gives {}", combination.show());
            for (target, weight) in combination.into_iter().enumerate() {
                if !weight.is_zero() {
                    aut.add_transition(origin, a, target, weight)?;
                }
            }
        }
    }
    Ok(aut)
}
