use tracing::trace;
use wfa::prelude::*;

use super::MembershipOracle;

/// Remembers the answers to all membership queries that were posed during one learning run. Since the
/// weights of the target never change, entries are never invalidated and a word is never queried twice.
/// The cache is shared between the learner and the oracles by passing it around explicitly, so that
/// words evaluated by an equivalence oracle are available to the learner afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipCache {
    queries: math::Map<Word, Weight>,
}

impl MembershipCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct words that have been queried.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns true if nothing has been queried yet.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Looks up the weight of `word` without querying.
    pub fn get(&self, word: &[char]) -> Option<&Weight> {
        self.queries.get(word)
    }

    /// Returns true if `word` has been queried before.
    pub fn contains(&self, word: &[char]) -> bool {
        self.queries.contains_key(word)
    }

    /// Returns the weight of `word`, asking `oracle` only if the word has not been seen before.
    pub fn query<M: MembershipOracle + ?Sized>(&mut self, oracle: &M, word: &[char]) -> Weight {
        if let Some(weight) = self.queries.get(word) {
            return weight.clone();
        }
        let weight = oracle.membership(word);
        trace!("membership query {} gives {weight}", word.show());
        self.queries.insert(word.to_vec(), weight.clone());
        weight
    }

    /// Queries all words `prefix + suffix` for the given suffixes and collects the weights.
    pub fn query_row<M: MembershipOracle + ?Sized>(
        &mut self,
        oracle: &M,
        prefix: &[char],
        suffixes: &[Word],
    ) -> Vec<Weight> {
        suffixes
            .iter()
            .map(|e| self.query(oracle, &wfa::word::concat(prefix, e)))
            .collect()
    }

    /// Records a weight that was obtained elsewhere, for example by evaluating the target on a
    /// distribution. A word that is already known keeps its weight.
    pub fn record(&mut self, word: &[char], weight: Weight) {
        let known = self.queries.entry(word.to_vec()).or_insert_with(|| weight.clone());
        debug_assert_eq!(*known, weight, "conflicting weights for {}", word.show());
    }

    /// Iterates over all queried words together with their weights, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Word, &Weight)> + '_ {
        self.queries.iter()
    }
}
