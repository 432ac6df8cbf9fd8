use crate::prelude::*;
use tracing::debug;

/// Parameters for drawing a random [`WeightedAutomaton`] with [`generate_random_wfa`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomWfaConfig {
    /// The minimal number of states.
    pub min_states: usize,
    /// The maximal number of states.
    pub max_states: usize,
    /// The pool from which state and transition weights are drawn uniformly.
    pub weights: Vec<Weight>,
    /// The minimal number of transitions that are added on top of the mandatory ones.
    pub min_transitions: usize,
    /// The maximal number of transitions that are added on top of the mandatory ones.
    pub max_transitions: usize,
}

impl Default for RandomWfaConfig {
    fn default() -> Self {
        Self {
            min_states: 1,
            max_states: 5,
            weights: (1..5).map(Weight::from).collect(),
            min_transitions: 0,
            max_transitions: 5,
        }
    }
}

impl RandomWfaConfig {
    /// Creates a configuration which always produces exactly `states` states.
    pub fn with_states(states: usize) -> Self {
        Self {
            min_states: states,
            max_states: states,
            ..Default::default()
        }
    }
}

/// Generates a random weighted automaton over `alphabet`. The algorithm is as follows:
/// 1. Draw the number of states from `min_states..=max_states` and give each state a weight from the pool.
/// 2. For each symbol and each state, add one transition with a random weight to a random state.
/// 3. Draw a number of extra transitions from `min_transitions..=max_transitions` and add that many
///    transitions with random origin, symbol, target and weight.
///
/// All initial mass is placed on state `0`, so depending on the transitions, some states may be unreachable.
pub fn generate_random_wfa(
    alphabet: &CharAlphabet,
    config: &RandomWfaConfig,
    rng: &mut fastrand::Rng,
) -> WeightedAutomaton {
    assert!(
        config.min_states >= 1 && config.min_states <= config.max_states,
        "state bounds are malformed"
    );
    assert!(!config.weights.is_empty(), "weight pool must not be empty");
    let symbols = alphabet.symbols();
    let draw_weight =
        |rng: &mut fastrand::Rng| config.weights[rng.usize(..config.weights.len())].clone();

    let size = rng.usize(config.min_states..=config.max_states);
    let weights: Vec<Weight> = (0..size).map(|_| draw_weight(rng)).collect();
    let mut aut = WeightedAutomaton::new(alphabet.clone(), weights, None);

    let mut mandatory = vec![];
    for &a in symbols {
        for q in 0..size {
            mandatory.push((q, a, rng.usize(..size), draw_weight(rng)));
        }
    }
    let extra = rng.usize(config.min_transitions..=config.max_transitions);
    let mut additional = vec![];
    if !symbols.is_empty() {
        for _ in 0..extra {
            let q = rng.usize(..size);
            let a = symbols[rng.usize(..symbols.len())];
            additional.push((q, a, rng.usize(..size), draw_weight(rng)));
        }
    }

    for (q, a, p, w) in mandatory.into_iter().chain(additional) {
        // all indices are drawn in range, so this cannot fail
        if let Err(e) = aut.add_transition(q, a, p, w) {
            debug!("skipping random transition: {e}");
        }
    }
    aut
}
