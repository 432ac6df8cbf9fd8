use std::fmt::Display;

use itertools::Itertools;
use num_traits::{One, Zero};
use thiserror::Error;
use tracing::trace;

use crate::{math, prelude::*};

/// Describes why a transition could not be added to a [`WeightedAutomaton`]. Adding an invalid
/// transition never modifies the automaton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    /// The state in which the transition originates does not exist.
    #[error("origin state {origin} does not exist, there are {size} states")]
    UnknownOrigin {
        /// The offending state index.
        origin: usize,
        /// The number of states of the automaton.
        size: usize,
    },
    /// The state that the transition leads to does not exist.
    #[error("target state {target} does not exist, there are {size} states")]
    UnknownTarget {
        /// The offending state index.
        target: usize,
        /// The number of states of the automaton.
        size: usize,
    },
    /// The symbol labelling the transition is not part of the alphabet.
    #[error("letter {symbol} not in alphabet, alphabet is {alphabet}")]
    UnknownSymbol {
        /// The offending symbol.
        symbol: char,
        /// The alphabet of the automaton.
        alphabet: CharAlphabet,
    },
}

/// A weighted automaton over the integers with states `0..n`.
///
/// Every state `q` carries an output weight `weights[q]` and an initial weight `initial[q]`.
/// Reading symbol `a` in state `q` may lead to any number of states, where for each pair
/// `(q', w)` stored for `(q, a)`, the mass in `q` is multiplied by `w` and moved to `q'`. The
/// weight of a word is obtained by propagating the initial distribution through the transitions
/// and finally taking the dot product with the state weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedAutomaton {
    alphabet: CharAlphabet,
    weights: Vec<Weight>,
    initial: Vec<Weight>,
    transitions: math::Map<(usize, char), Vec<(usize, Weight)>>,
}

impl WeightedAutomaton {
    /// Creates a new automaton without transitions. Each entry of `weights` gives rise to one state.
    /// If no initial distribution is given, all initial mass is placed on state `0`.
    pub fn new<W: Into<Weight>, I: IntoIterator<Item = W>>(
        alphabet: CharAlphabet,
        weights: I,
        initial: Option<Vec<Weight>>,
    ) -> Self {
        let weights = math::vector(weights);
        let initial = match initial {
            Some(mut initial) => {
                initial.resize(weights.len(), Weight::zero());
                initial
            }
            None if weights.is_empty() => vec![],
            None => math::unit(0, weights.len(), Weight::one()),
        };
        Self {
            alphabet,
            weights,
            initial,
            transitions: math::Map::default(),
        }
    }

    /// Returns a [`WfaBuilder`] for the given alphabet, which allows to conveniently construct
    /// an automaton from collections of weights and transitions.
    pub fn builder(alphabet: CharAlphabet) -> WfaBuilder {
        WfaBuilder::new(alphabet)
    }

    /// Adds a new state with the given output and initial weight, returning its index.
    pub fn add_state<W: Into<Weight>, V: Into<Weight>>(&mut self, weight: W, initial: V) -> usize {
        self.weights.push(weight.into());
        self.initial.push(initial.into());
        self.weights.len() - 1
    }

    /// Adds a transition from `origin` to `target` on `symbol` with weight `weight`. Fails if one of
    /// the states does not exist or the symbol is not in the alphabet, in which case the automaton
    /// remains unchanged.
    pub fn add_transition<W: Into<Weight>>(
        &mut self,
        origin: usize,
        symbol: char,
        target: usize,
        weight: W,
    ) -> Result<(), InvalidTransition> {
        let size = self.size();
        if origin >= size {
            return Err(InvalidTransition::UnknownOrigin { origin, size });
        }
        if target >= size {
            return Err(InvalidTransition::UnknownTarget { target, size });
        }
        if !self.alphabet.contains(symbol) {
            return Err(InvalidTransition::UnknownSymbol {
                symbol,
                alphabet: self.alphabet.clone(),
            });
        }
        self.transitions
            .entry((origin, symbol))
            .or_default()
            .push((target, weight.into()));
        Ok(())
    }

    /// Builds an automaton from a basis of states and linear combinations, where state `i` corresponds to
    /// `states[i]`. For each state `s` and symbol `a`, the vector `combinations[s + a]` gives the weights of
    /// the transitions from `s` on `a`, i.e. its `j`-th entry is the weight of the transition to state `j`.
    /// Only non-zero coefficients give rise to a transition and missing combinations lead to no transitions.
    /// The initial distribution is `combinations[""]` if present and the first unit vector otherwise.
    pub fn from_linear_combinations<W: Into<Weight>, I: IntoIterator<Item = W>>(
        alphabet: CharAlphabet,
        states: &[Word],
        weights: I,
        combinations: &math::Map<Word, Vec<Weight>>,
    ) -> Result<Self, InvalidTransition> {
        let initial = combinations.get(&Word::new()).cloned();
        let mut aut = Self::new(alphabet, weights, initial);
        for (origin, state) in states.iter().enumerate() {
            for symbol in aut.alphabet.clone().universe() {
                let Some(combination) = combinations.get(&crate::word::extend(state, symbol))
                else {
                    continue;
                };
                for (target, weight) in combination.iter().enumerate() {
                    if !weight.is_zero() {
                        aut.add_transition(origin, symbol, target, weight.clone())?;
                    }
                }
            }
        }
        Ok(aut)
    }

    /// Returns the number of states.
    pub fn size(&self) -> usize {
        self.weights.len()
    }

    /// Gives a reference to the alphabet.
    pub fn alphabet(&self) -> &CharAlphabet {
        &self.alphabet
    }

    /// Returns the output weights of the states.
    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }

    /// Returns the initial distribution.
    pub fn initial(&self) -> &[Weight] {
        &self.initial
    }

    /// Iterates over all transitions as tuples `(origin, symbol, target, weight)`. Transitions are
    /// ordered by origin, then by the position of the symbol in the alphabet and finally by insertion.
    pub fn transitions(&self) -> impl Iterator<Item = (usize, char, usize, Weight)> + '_ {
        (0..self.size())
            .cartesian_product(self.alphabet.universe().collect_vec())
            .flat_map(move |(q, a)| {
                self.transitions
                    .get(&(q, a))
                    .into_iter()
                    .flatten()
                    .map(move |(p, w)| (q, a, *p, w.clone()))
            })
    }

    /// Returns the total number of transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }

    /// Pushes the given distribution through the transitions labelled with `symbol`.
    pub fn step(&self, distribution: &[Weight], symbol: char) -> Vec<Weight> {
        let mut next = vec![Weight::zero(); self.size()];
        for (q, mass) in distribution.iter().enumerate() {
            if mass.is_zero() {
                continue;
            }
            for (p, w) in self.transitions.get(&(q, symbol)).into_iter().flatten() {
                next[*p] += mass * w;
            }
        }
        next
    }

    /// Computes the output of a distribution, that is its dot product with the state weights.
    pub fn output(&self, distribution: &[Weight]) -> Weight {
        math::dot(distribution, &self.weights)
    }

    /// Computes the weight of `word`.
    pub fn member(&self, word: &[char]) -> Weight {
        self.member_distribution(word, None).0
    }

    /// Reads `word` starting from the distribution `start`, or from the initial distribution if `start`
    /// is `None`. Returns the weight together with the reached distribution, which allows continuing
    /// from there without recomputation.
    pub fn member_distribution(
        &self,
        word: &[char],
        start: Option<&[Weight]>,
    ) -> (Weight, Vec<Weight>) {
        let mut distribution = start.unwrap_or(&self.initial).to_vec();
        for symbol in word {
            distribution = self.step(&distribution, *symbol);
        }
        trace!("{} reaches {}", word.show(), distribution.show());
        (self.output(&distribution), distribution)
    }
}

impl Display for WeightedAutomaton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Alphabet: {}", self.alphabet)?;
        writeln!(f, "Weights: {}", self.weights.show())?;
        writeln!(
            f,
            "Transitions: [{}]",
            self.transitions()
                .map(|(q, a, p, w)| format!("({q}, {a}, {p}, {w})"))
                .join(", ")
        )?;
        write!(f, "Initial: {}", self.initial.show())
    }
}

/// Helper struct for the construction of weighted automata. Collects states, the initial
/// distribution and transitions, and validates everything at the very end in [`WfaBuilder::build`].
#[derive(Debug, Clone)]
pub struct WfaBuilder {
    alphabet: CharAlphabet,
    weights: Vec<Weight>,
    initial: Option<Vec<Weight>>,
    transitions: Vec<(usize, char, usize, Weight)>,
}

impl WfaBuilder {
    /// Creates an empty builder for the given alphabet.
    pub fn new(alphabet: CharAlphabet) -> Self {
        Self {
            alphabet,
            weights: vec![],
            initial: None,
            transitions: vec![],
        }
    }

    /// Sets the state weights, each weight gives rise to one state.
    pub fn with_weights<W: Into<Weight>, I: IntoIterator<Item = W>>(mut self, weights: I) -> Self {
        self.weights = math::vector(weights);
        self
    }

    /// Sets the initial distribution.
    pub fn with_initial<W: Into<Weight>, I: IntoIterator<Item = W>>(mut self, initial: I) -> Self {
        self.initial = Some(math::vector(initial));
        self
    }

    /// Adds the given transitions, which are tuples `(origin, symbol, target, weight)`.
    pub fn with_transitions<W: Into<Weight>, I: IntoIterator<Item = (usize, char, usize, W)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions
            .extend(transitions.into_iter().map(|(q, a, p, w)| (q, a, p, w.into())));
        self
    }

    /// Builds the automaton, failing on the first invalid transition.
    pub fn build(self) -> Result<WeightedAutomaton, InvalidTransition> {
        let mut aut = WeightedAutomaton::new(self.alphabet, self.weights, self.initial);
        for (q, a, p, w) in self.transitions {
            aut.add_transition(q, a, p, w)?;
        }
        Ok(aut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(x: i64) -> Weight {
        Weight::from(x)
    }

    fn edge(q: usize, a: char, p: usize, x: i64) -> (usize, char, usize, Weight) {
        (q, a, p, w(x))
    }

    fn two_states() -> WeightedAutomaton {
        WeightedAutomaton::builder(alphabet!(simple 'a', 'b'))
            .with_weights([1, 2])
            .with_initial([1, 0])
            .with_transitions([(0, 'a', 1, 3), (1, 'a', 0, 1), (0, 'b', 0, 2), (0, 'b', 1, 1)])
            .build()
            .unwrap()
    }

    #[test]
    fn evaluate_words() {
        let aut = super::super::tests::tripling();
        assert_eq!(aut.member(&[]), w(2));
        assert_eq!(aut.member(&['a', 'a']), w(18));

        let aut = two_states();
        assert_eq!(aut.member(&[]), w(1));
        assert_eq!(aut.member(&['a']), w(6));
        assert_eq!(aut.member(&['a', 'a']), w(3));
        // b moves mass 2 to state 0 and mass 1 to state 1
        assert_eq!(aut.member(&['b']), w(4));
        assert_eq!(aut.member(&['b', 'a']), w(2 * 6 + 1));
    }

    #[test]
    fn long_words_do_not_overflow() {
        let aut = WeightedAutomaton::builder(alphabet!(simple 'a'))
            .with_weights([1])
            .with_transitions([(0, 'a', 0, 4)])
            .build()
            .unwrap();
        let word = vec!['a'; 70];
        let expected = (0..70).fold(w(1), |acc, _| acc * 4);
        assert_eq!(aut.member(&word), expected);
        assert_eq!(expected, w(2).pow(140));
    }

    #[test]
    fn member_distribution_continues() {
        let aut = two_states();
        let (weight, d) = aut.member_distribution(&['b'], None);
        assert_eq!((weight, d.clone()), (w(4), math::vector([2, 1])));
        let (weight, d) = aut.member_distribution(&['a'], Some(&d));
        assert_eq!(weight, aut.member(&['b', 'a']));
        assert_eq!(d, math::vector([1, 6]));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut aut = two_states();
        let before = aut.clone();
        assert_eq!(
            aut.add_transition(2, 'a', 0, 1),
            Err(InvalidTransition::UnknownOrigin { origin: 2, size: 2 })
        );
        assert_eq!(
            aut.add_transition(0, 'a', 5, 1),
            Err(InvalidTransition::UnknownTarget { target: 5, size: 2 })
        );
        assert!(matches!(
            aut.add_transition(0, 'c', 0, 1),
            Err(InvalidTransition::UnknownSymbol { symbol: 'c', .. })
        ));
        assert_eq!(aut, before);
    }

    #[test]
    fn from_combinations_is_sparse() {
        let mut combinations = math::Map::default();
        combinations.insert(vec![], math::vector([2, 0]));
        combinations.insert(vec!['a'], math::vector([0, 1]));
        combinations.insert(vec!['a', 'a'], math::vector([5, 0]));
        let aut = WeightedAutomaton::from_linear_combinations(
            alphabet!(simple 'a'),
            &[vec![], vec!['a']],
            [1, 1],
            &combinations,
        )
        .unwrap();
        assert_eq!(aut.initial().to_vec(), math::vector([2, 0]));
        assert_eq!(
            aut.transitions().collect_vec(),
            vec![edge(0, 'a', 1, 1), edge(1, 'a', 0, 5)]
        );
        assert_eq!(aut.member(&['a', 'a']), w(10));
    }

    #[test]
    fn default_initial_distribution() {
        let aut = WeightedAutomaton::new(alphabet!(simple 'a'), [3, 4], None);
        assert_eq!(aut.initial().to_vec(), math::vector([1, 0]));
        let mut aut = aut;
        assert_eq!(aut.add_state(7, 2), 2);
        assert_eq!(aut.member(&[]), w(3 + 14));
    }

    #[test]
    fn display() {
        let aut = super::super::tests::tripling();
        assert_eq!(
            aut.to_string(),
            "Alphabet: [a]\nWeights: [2]\nTransitions: [(0, a, 0, 3)]\nInitial: [1]"
        );
    }
}
