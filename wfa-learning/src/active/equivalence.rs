use std::{
    collections::VecDeque,
    io::{BufRead, Write},
};

use tracing::{debug, trace};
use wfa::{prelude::*, word::extend};

use super::{Deadline, MembershipCache, OracleError};

/// Compares a hypothesis against the target. An answer of `None` means that the oracle found no
/// difference, how strong this guarantee is depends on the implementation. A returned word is one on
/// which the weights of target and hypothesis differ. Weights of the target that the oracle
/// computes along the way are recorded in `cache`.
pub trait EquivalenceOracle {
    /// Searches for a word on which `target` and `hypothesis` differ.
    fn find_counterexample(
        &mut self,
        target: &WeightedAutomaton,
        hypothesis: &WeightedAutomaton,
        cache: &mut MembershipCache,
        deadline: &Deadline,
    ) -> Result<Option<Word>, OracleError>;
}

impl<Q: EquivalenceOracle + ?Sized> EquivalenceOracle for Box<Q> {
    fn find_counterexample(
        &mut self,
        target: &WeightedAutomaton,
        hypothesis: &WeightedAutomaton,
        cache: &mut MembershipCache,
        deadline: &Deadline,
    ) -> Result<Option<Word>, OracleError> {
        Q::find_counterexample(self, target, hypothesis, cache, deadline)
    }
}

/// Tests the hypothesis on randomly drawn words of increasing length. The `k`-th try, starting from
/// `1`, uses a word of length `k + min_length`. Unless configured otherwise, the number of tries
/// depends on the hypothesis and is `2 * |alphabet| * size + 3`. Finding no counterexample is no
/// proof of equivalence.
#[derive(Debug, Clone)]
pub struct RandomSampling {
    rng: fastrand::Rng,
    min_length: usize,
    tries: Option<usize>,
}

impl RandomSampling {
    /// Creates a sampling oracle drawing from `rng`.
    pub fn new(rng: fastrand::Rng) -> Self {
        Self {
            rng,
            min_length: 0,
            tries: None,
        }
    }

    /// Sets the length that is added to every sampled word.
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Fixes the number of tries.
    pub fn with_tries(mut self, tries: usize) -> Self {
        self.tries = Some(tries);
        self
    }

    fn sample(&mut self, symbols: &[char], length: usize) -> Word {
        if symbols.is_empty() {
            return Word::new();
        }
        (0..length)
            .map(|_| symbols[self.rng.usize(..symbols.len())])
            .collect()
    }
}

impl EquivalenceOracle for RandomSampling {
    fn find_counterexample(
        &mut self,
        target: &WeightedAutomaton,
        hypothesis: &WeightedAutomaton,
        cache: &mut MembershipCache,
        deadline: &Deadline,
    ) -> Result<Option<Word>, OracleError> {
        let symbols = target.alphabet().symbols();
        let tries = self
            .tries
            .unwrap_or(2 * symbols.len() * hypothesis.size() + 3);

        for k in 1..tries {
            deadline.check()?;
            let word = self.sample(symbols, k + self.min_length);
            let expected = cache.query(target, &word);
            let actual = hypothesis.member(&word);
            if expected != actual {
                debug!(
                    "sampled word {} has weight {expected} but hypothesis gives {actual}",
                    word.show()
                );
                return Ok(Some(word));
            }
        }
        Ok(None)
    }
}

/// Decides equivalence exactly through bisimulation up to congruence. Pairs of distributions
/// reached by target and hypothesis on the same word are explored breadth first, and a pair is
/// skipped if its concatenation is an integer linear combination of pairs that were already
/// processed. Since distribution pairs that agree in output and are closed under successors form a
/// bisimulation, the automata are equivalent if the exploration finishes without finding a
/// difference in output. The returned counterexamples are shortest ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bisimulation;

impl EquivalenceOracle for Bisimulation {
    fn find_counterexample(
        &mut self,
        target: &WeightedAutomaton,
        hypothesis: &WeightedAutomaton,
        cache: &mut MembershipCache,
        deadline: &Deadline,
    ) -> Result<Option<Word>, OracleError> {
        let start = (target.initial().to_vec(), hypothesis.initial().to_vec());
        let expected = target.output(&start.0);
        if expected != hypothesis.output(&start.1) {
            cache.record(&[], expected);
            return Ok(Some(Word::new()));
        }

        let mut relation = Lattice::new(target.size() + hypothesis.size());
        let mut queue = VecDeque::from([(Word::new(), start.0, start.1)]);
        while let Some((word, left, right)) = queue.pop_front() {
            deadline.check()?;
            let pair = [left.as_slice(), right.as_slice()].concat();
            if relation.contains(&pair)? {
                continue;
            }

            for a in target.alphabet().universe() {
                let next_left = target.step(&left, a);
                let next_right = hypothesis.step(&right, a);
                let next = extend(&word, a);
                let expected = target.output(&next_left);
                let actual = hypothesis.output(&next_right);
                if expected != actual {
                    debug!(
                        "bisimulation fails on {}, target gives {expected} and hypothesis {actual}",
                        next.show()
                    );
                    cache.record(&next, expected);
                    return Ok(Some(next));
                }
                queue.push_back((next, next_left, next_right));
            }
            relation.insert(&pair)?;
            trace!("relation of rank {} after {}", relation.rank(), word.show());
        }
        Ok(None)
    }
}

/// Lets a human act as the equivalence oracle. The hypothesis is printed to `output` and a line is read
/// from `input`: `None` accepts the hypothesis, anything else is taken as a word, optionally surrounded
/// by double quotes. A word that does not distinguish target and hypothesis, or that uses unknown
/// symbols, is rejected and the question is asked again.
pub struct InteractiveEquivalence<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractiveEquivalence<R, W> {
    /// Creates an oracle that reads answers from `input` and writes the hypothesis to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl InteractiveEquivalence<std::io::StdinLock<'static>, std::io::Stdout> {
    /// An oracle that talks to the terminal.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

fn unavailable(e: std::io::Error) -> OracleError {
    OracleError::Unavailable(e.to_string())
}

impl<R: BufRead, W: Write> EquivalenceOracle for InteractiveEquivalence<R, W> {
    fn find_counterexample(
        &mut self,
        target: &WeightedAutomaton,
        hypothesis: &WeightedAutomaton,
        cache: &mut MembershipCache,
        deadline: &Deadline,
    ) -> Result<Option<Word>, OracleError> {
        writeln!(self.output, "{hypothesis}").map_err(unavailable)?;
        writeln!(
            self.output,
            "Enter a counterexample or `None` if the hypothesis is correct."
        )
        .map_err(unavailable)?;

        loop {
            deadline.check()?;
            let mut line = String::new();
            if self.input.read_line(&mut line).map_err(unavailable)? == 0 {
                return Err(OracleError::Unavailable("input was closed".to_string()));
            }
            let answer = line.trim();
            if answer == "None" {
                return Ok(None);
            }

            let word: Word = answer.trim_matches('"').chars().collect();
            let problem = if let Some(c) = word.iter().find(|c| !target.alphabet().contains(**c)) {
                format!("{} is not a symbol of the alphabet", c)
            } else {
                let expected = cache.query(target, &word);
                if expected != hypothesis.member(&word) {
                    debug!("user gave counterexample {}", word.show());
                    return Ok(Some(word));
                }
                format!("{} was not a counterexample", word.show())
            };
            writeln!(self.output, "{problem}, please try again.").map_err(unavailable)?;
        }
    }
}

/// The available equivalence oracles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EquivalenceStrategy {
    /// Use [`RandomSampling`].
    Random,
    /// Use [`Bisimulation`].
    #[default]
    Bisimulation,
    /// Use [`InteractiveEquivalence`] on the terminal.
    Interactive,
}

impl EquivalenceStrategy {
    /// All strategies, together with the names they are known by.
    pub const NAMES: [(&'static str, EquivalenceStrategy); 3] = [
        ("random", EquivalenceStrategy::Random),
        ("hkc", EquivalenceStrategy::Bisimulation),
        ("interactive", EquivalenceStrategy::Interactive),
    ];

    /// Looks up a strategy by its name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find_map(|(n, s)| (*n == name).then_some(*s))
    }

    /// Instantiates the oracle. Random sampling draws from a generator seeded with `seed`, or from
    /// a randomly seeded one if no seed is given.
    pub fn build(self, seed: Option<u64>) -> Box<dyn EquivalenceOracle> {
        match self {
            EquivalenceStrategy::Random => Box::new(RandomSampling::new(
                seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed),
            )),
            EquivalenceStrategy::Bisimulation => Box::new(Bisimulation),
            EquivalenceStrategy::Interactive => Box::new(InteractiveEquivalence::stdio()),
        }
    }
}

impl std::fmt::Display for EquivalenceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = Self::NAMES
            .iter()
            .find_map(|(n, s)| (s == self).then_some(*n))
            .unwrap_or_default();
        write!(f, "{name}")
    }
}
