use std::cmp::Reverse;

use itertools::Itertools;
use num_traits::{One, Signed, Zero};
use owo_colors::OwoColorize;
use tracing::{debug, trace};
use wfa::{
    math::{divides, gcd, gcd_all},
    prelude::*,
    word::{concat, extend, parent},
};

use super::{MembershipCache, MembershipOracle};

/// The data that is derived for every row of the table from the raw membership queries.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RowData {
    // common divisor of all entries of the row
    gcd: Weight,
    // factor between this row and the row of its parent
    transition: Weight,
    // the raw entries divided by the scale of the row
    normalized: Vec<Weight>,
}

/// An observation table for weighted automata.
///
/// The table consists of a sequence of prefixes `S` (the rows, each of which becomes a state of the
/// hypothesis) and a sequence of suffixes `E` (the columns). Both start with the empty word, rows keep
/// their insertion order and suffixes are only ever appended. The entry in row `s` and column `e` is
/// derived from the weight of `s + e`, which is looked up in a [`MembershipCache`].
///
/// If factorization is enabled, each row `s` stores a common divisor `gcd(s)` of all its entries and
/// the table holds the normalized row `weight(s + e) / gcd(s)`. The quotient `gcd(s) / gcd(parent)`,
/// where the parent of `s` is `s` without its last symbol, is the transition weight of `s`. Splitting
/// weights like this moves common factors onto transitions, which keeps the rows small and allows
/// more rows to be expressed through others. A common divisor of `0` (which can only happen for a row
/// that is entirely zero) is treated as `1` when normalizing.
///
/// Without factorization, every row has scale `1` and the table holds the raw weights.
#[derive(Clone)]
pub struct ObservationTable {
    alphabet: CharAlphabet,
    factorize: bool,
    prefixes: Vec<Word>,
    suffixes: Vec<Word>,
    rows: math::Map<Word, RowData>,
}

impl ObservationTable {
    /// Creates a table whose only row and column are the empty word.
    pub fn new<M: MembershipOracle + ?Sized>(
        alphabet: CharAlphabet,
        factorize: bool,
        oracle: &M,
        cache: &mut MembershipCache,
    ) -> Self {
        let empty = cache.query(oracle, &[]);
        let mut table = Self {
            alphabet,
            factorize,
            prefixes: vec![vec![]],
            suffixes: vec![vec![]],
            rows: math::Map::default(),
        };
        table.rows.insert(
            vec![],
            RowData {
                gcd: empty.abs(),
                transition: Weight::one(),
                normalized: vec![],
            },
        );
        table.refresh_rows(oracle, cache);
        table
    }

    /// Gives a reference to the alphabet.
    pub fn alphabet(&self) -> &CharAlphabet {
        &self.alphabet
    }

    /// Returns true if rows are factorized.
    pub fn factorizes(&self) -> bool {
        self.factorize
    }

    /// The rows `S` of the table, in insertion order.
    pub fn prefixes(&self) -> &[Word] {
        &self.prefixes
    }

    /// The columns `E` of the table, in insertion order.
    pub fn suffixes(&self) -> &[Word] {
        &self.suffixes
    }

    /// The number of rows.
    pub fn size(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns the position of `word` among the rows.
    pub fn index_of(&self, word: &[char]) -> Option<usize> {
        if !self.rows.contains_key(word) {
            return None;
        }
        self.prefixes.iter().position(|s| s == word)
    }

    /// Returns true if `word` is one of the rows.
    pub fn contains(&self, word: &[char]) -> bool {
        self.rows.contains_key(word)
    }

    /// The common divisor of the row of `word`.
    pub fn gcd(&self, word: &[char]) -> Option<Weight> {
        self.rows.get(word).map(|r| r.gcd.clone())
    }

    /// The transition weight of the row of `word`.
    pub fn transition(&self, word: &[char]) -> Option<Weight> {
        self.rows.get(word).map(|r| r.transition.clone())
    }

    /// The normalized row of `word`.
    pub fn row(&self, word: &[char]) -> Option<&[Weight]> {
        self.rows.get(word).map(|r| r.normalized.as_slice())
    }

    /// The value that the raw weights in the row of `word` are divided by. This is `1` for words
    /// that are not rows of the table.
    pub fn scale(&self, word: &[char]) -> Weight {
        match self.rows.get(word) {
            Some(row) if self.factorize && !row.gcd.is_zero() => row.gcd.clone(),
            _ => Weight::one(),
        }
    }

    /// The scale of the parent of `word`, which is what the one letter extension `word` of the parent
    /// is divided by. Gives `1` for the empty word and for words whose parent is not a row.
    pub fn parent_scale(&self, word: &[char]) -> Weight {
        parent(word).map_or_else(Weight::one, |p| self.scale(p))
    }

    /// The normalized rows, in the order of [`Self::prefixes`].
    pub fn basis(&self) -> Vec<Vec<Weight>> {
        self.prefixes
            .iter()
            .map(|s| self.rows[s].normalized.clone())
            .collect()
    }

    /// Gives all prefixes and normalized rows except the one at position `index`.
    pub fn basis_without(&self, index: usize) -> (Vec<Word>, Vec<Vec<Weight>>) {
        self.prefixes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, s)| (s.clone(), self.rows[s].normalized.clone()))
            .unzip()
    }

    /// All one letter extensions `s + a` of rows `s`, ordered by row and then by symbol.
    pub fn one_letter_extensions(&self) -> Vec<Word> {
        self.prefixes
            .iter()
            .cartesian_product(self.alphabet.symbols())
            .map(|(s, a)| extend(s, *a))
            .collect()
    }

    /// The output weights of the hypothesis states, i.e. the normalized entries in the column of
    /// the empty word.
    pub fn state_weights(&self) -> Vec<Weight> {
        self.prefixes
            .iter()
            .map(|s| self.rows[s].normalized[0].clone())
            .collect()
    }

    /// Collects the weights of `word + e` for all suffixes `e`, querying where necessary.
    pub fn raw_row<M: MembershipOracle + ?Sized>(
        &self,
        word: &[char],
        oracle: &M,
        cache: &mut MembershipCache,
    ) -> Vec<Weight> {
        cache.query_row(oracle, word, &self.suffixes)
    }

    /// Appends `word` as a new row.
    pub(crate) fn push_row<M: MembershipOracle + ?Sized>(
        &mut self,
        word: Word,
        oracle: &M,
        cache: &mut MembershipCache,
    ) {
        let raw = self.raw_row(&word, oracle, cache);
        let gcd = gcd_all(&raw);
        debug!("adding row {} with common divisor {gcd}", word.show());
        self.prefixes.push(word.clone());
        self.rows.insert(
            word,
            RowData {
                gcd,
                transition: Weight::one(),
                normalized: vec![],
            },
        );
        self.repair(&[], oracle, cache);
    }

    /// Shrinks the common divisor of the row of `word` to its greatest common divisor with `value`
    /// and propagates the change to the ancestors of `word`.
    pub(crate) fn shrink_gcd<M: MembershipOracle + ?Sized>(
        &mut self,
        word: &[char],
        value: &Weight,
        oracle: &M,
        cache: &mut MembershipCache,
    ) {
        if let Some(row) = self.rows.get_mut(word) {
            let shrunk = gcd(&row.gcd, value);
            debug!(
                "common divisor of {} shrinks from {} to {shrunk}",
                word.show(),
                row.gcd
            );
            row.gcd = shrunk;
        }
        self.repair(&[], oracle, cache);
    }

    /// Adds all suffixes of the counterexample `word` that are not yet columns, shortest first. Returns
    /// the added suffixes together with whether some common divisor changed.
    pub(crate) fn add_counterexample<M: MembershipOracle + ?Sized>(
        &mut self,
        word: &[char],
        oracle: &M,
        cache: &mut MembershipCache,
    ) -> (Vec<Word>, bool) {
        let mut added: Vec<Word> = vec![];
        for e in suffixes(word) {
            if !self.suffixes.contains(&e) && !added.contains(&e) {
                added.push(e);
            }
        }
        debug!(
            "counterexample {} adds suffixes {}",
            word.show(),
            added.as_slice().show()
        );
        self.suffixes.extend(added.iter().cloned());
        let changed = self.repair(&added, oracle, cache);
        (added, changed)
    }

    /// Removes the row at position `index` and returns its word. The row of the empty word at position
    /// `0` is never removed, for it and for positions out of range nothing happens and `None` is returned.
    pub(crate) fn remove_row(&mut self, index: usize) -> Option<Word> {
        if index == 0 || index >= self.prefixes.len() {
            return None;
        }
        let word = self.prefixes.remove(index);
        self.rows.remove(&word);
        debug!("removed row {}", word.show());
        self.refresh_transitions();
        Some(word)
    }

    /// Recomputes the common divisors. Children are treated before their parents, and every row takes
    /// the greatest common divisor of its old value, the values of its children and its weights for the
    /// `new_suffixes`. Afterwards all normalized rows and transitions are recomputed from the raw
    /// weights. Returns true if some common divisor changed.
    pub(crate) fn repair<M: MembershipOracle + ?Sized>(
        &mut self,
        new_suffixes: &[Word],
        oracle: &M,
        cache: &mut MembershipCache,
    ) -> bool {
        let mut changed = false;
        if self.factorize {
            let mut order = (0..self.prefixes.len()).rev().collect_vec();
            order.sort_by_key(|i| Reverse(self.prefixes[*i].len()));

            for i in order {
                let s = self.prefixes[i].clone();
                let old = self.rows[&s].gcd.clone();
                let children = self
                    .alphabet
                    .symbols()
                    .iter()
                    .filter_map(|a| self.rows.get(&extend(&s, *a)).map(|r| r.gcd.clone()))
                    .collect_vec();
                let observed = new_suffixes
                    .iter()
                    .map(|e| cache.query(oracle, &concat(&s, e)))
                    .collect_vec();
                let updated = gcd_all(std::iter::once(&old).chain(&children).chain(&observed));
                if updated != old {
                    debug!("common divisor of {} changes from {old} to {updated}", s.show());
                    if let Some(row) = self.rows.get_mut(&s) {
                        row.gcd = updated;
                    }
                    changed = true;
                }
            }
        }
        self.refresh_rows(oracle, cache);
        changed
    }

    fn refresh_rows<M: MembershipOracle + ?Sized>(
        &mut self,
        oracle: &M,
        cache: &mut MembershipCache,
    ) {
        let updates = self
            .prefixes
            .iter()
            .map(|s| {
                let scale = self.scale(s);
                let normalized = cache
                    .query_row(oracle, s, &self.suffixes)
                    .into_iter()
                    .map(|x| {
                        debug_assert!(divides(&scale, &x), "{scale} does not divide {x}");
                        x / &scale
                    })
                    .collect_vec();
                (s.clone(), normalized)
            })
            .collect_vec();
        for (s, normalized) in updates {
            if let Some(row) = self.rows.get_mut(&s) {
                row.normalized = normalized;
            }
        }
        self.refresh_transitions();
        trace!("refreshed table\n{:?}", self);
    }

    fn refresh_transitions(&mut self) {
        let updates = self
            .prefixes
            .iter()
            .map(|s| (s.clone(), self.scale(s) / self.parent_scale(s)))
            .collect_vec();
        for (s, transition) in updates {
            if let Some(row) = self.rows.get_mut(&s) {
                row.transition = transition;
            }
        }
    }

    /// Verifies that the derived data is consistent with the raw weights in `cache`: every common
    /// divisor divides all raw entries of its row, normalized entries times the scale give the raw
    /// entries, and transitions are exact quotients of the scales of a row and its parent.
    pub fn is_consistent(&self, cache: &MembershipCache) -> bool {
        self.prefixes.iter().all(|s| {
            let row = &self.rows[s];
            let scale = self.scale(s);
            let entries_ok = self.suffixes.iter().zip(&row.normalized).all(|(e, n)| {
                match cache.get(&concat(s, e)) {
                    Some(raw) => (!self.factorize || divides(&row.gcd, raw)) && n * &scale == *raw,
                    None => false,
                }
            });
            let parent_scale = self.parent_scale(s);
            entries_ok
                && row.normalized.len() == self.suffixes.len()
                && &row.transition * &parent_scale == scale
        })
    }
}

impl std::fmt::Debug for ObservationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["S".to_string(), "gcd".to_string(), "tr".to_string()];
        for e in &self.suffixes {
            header.push(e.show());
        }
        builder.push_record(header);

        for s in &self.prefixes {
            let row = &self.rows[s];
            let mut record = vec![
                s.show().blue().to_string(),
                row.gcd.to_string(),
                row.transition.to_string(),
            ];
            record.extend(row.normalized.iter().map(|x| x.to_string()));
            builder.push_record(record);
        }

        write!(
            f,
            "{}",
            builder.build().with(tabled::settings::Style::rounded())
        )
    }
}

#[cfg(test)]
mod tests {
    use wfa::math::vector;

    use super::*;

    fn w(x: i64) -> Weight {
        Weight::from(x)
    }

    fn row(table: &ObservationTable, word: &[char]) -> Option<Vec<Weight>> {
        table.row(word).map(<[Weight]>::to_vec)
    }

    fn target() -> WeightedAutomaton {
        // weight of a^n is 2 * 3^n, b multiplies by 10 and moves on to a dead end of weight 7
        WeightedAutomaton::builder(alphabet!(simple 'a', 'b'))
            .with_weights([2, 7])
            .with_transitions([(0, 'a', 0, 3), (0, 'b', 1, 10)])
            .build()
            .unwrap()
    }

    #[test]
    fn initial_table() {
        let target = target();
        let mut cache = MembershipCache::new();
        let table = ObservationTable::new(target.alphabet().clone(), true, &target, &mut cache);
        assert_eq!(table.prefixes(), &[Word::new()]);
        assert_eq!(table.suffixes(), &[Word::new()]);
        assert_eq!(table.gcd(&[]), Some(w(2)));
        assert_eq!(row(&table, &[]), Some(vector([1])));
        assert_eq!(table.transition(&[]), Some(w(2)));
        assert!(table.is_consistent(&cache));
        assert_eq!(
            table.one_letter_extensions(),
            vec![vec!['a'], vec!['b']]
        );
    }

    #[test_log::test]
    fn counterexample_suffixes_are_appended_in_order() {
        let target = target();
        let mut cache = MembershipCache::new();
        let mut table = ObservationTable::new(target.alphabet().clone(), true, &target, &mut cache);
        let (added, _) = table.add_counterexample(&['a', 'b', 'a'], &target, &mut cache);
        assert_eq!(added, vec![vec!['a'], vec!['b', 'a'], vec!['a', 'b', 'a']]);
        let (added, changed) = table.add_counterexample(&['b', 'a'], &target, &mut cache);
        assert!(added.is_empty());
        assert!(!changed);
        assert_eq!(table.suffixes().len(), 4);
        assert!(table.is_consistent(&cache));
    }

    #[test_log::test]
    fn new_suffixes_shrink_common_divisors() {
        let target = target();
        let mut cache = MembershipCache::new();
        let mut table = ObservationTable::new(target.alphabet().clone(), true, &target, &mut cache);
        table.push_row(vec!['b'], &target, &mut cache);
        // row of b is [70], its parent has divisor 2 which divides 70
        assert_eq!(table.gcd(&['b']), Some(w(70)));
        assert_eq!(table.transition(&['b']), Some(w(35)));
        assert!(table.is_consistent(&cache));

        // the suffix a gives weight 6 for the empty row and 0 for b
        let (_, changed) = table.add_counterexample(&['a'], &target, &mut cache);
        assert!(!changed);
        assert_eq!(row(&table, &[]), Some(vector([1, 3])));
        assert_eq!(row(&table, &['b']), Some(vector([1, 0])));

        // a suffix b gives weight 70 for the empty row, which keeps the divisor 2
        let (_, changed) = table.add_counterexample(&['b'], &target, &mut cache);
        assert!(!changed);
        assert!(table.is_consistent(&cache));
    }

    #[test_log::test]
    fn shrinking_propagates_to_ancestors() {
        let target = WeightedAutomaton::builder(alphabet!(simple 'a'))
            .with_weights([4, 6, 9])
            .with_transitions([(0, 'a', 1, 1), (1, 'a', 2, 1)])
            .build()
            .unwrap();
        let mut cache = MembershipCache::new();
        let mut table = ObservationTable::new(target.alphabet().clone(), true, &target, &mut cache);
        table.push_row(vec!['a'], &target, &mut cache);
        assert_eq!(table.gcd(&[]), Some(w(2)));
        table.push_row(vec!['a', 'a'], &target, &mut cache);
        assert_eq!(table.gcd(&['a']), Some(w(3)));
        assert_eq!(table.gcd(&[]), Some(w(1)));
        assert!(table.is_consistent(&cache));

        table.shrink_gcd(&['a', 'a'], &w(2), &target, &mut cache);
        assert_eq!(table.gcd(&['a', 'a']), Some(w(1)));
        assert_eq!(table.gcd(&['a']), Some(w(1)));
        assert!(table.is_consistent(&cache));
    }

    #[test]
    fn removing_rows() {
        let target = target();
        let mut cache = MembershipCache::new();
        let mut table = ObservationTable::new(target.alphabet().clone(), true, &target, &mut cache);
        table.push_row(vec!['a'], &target, &mut cache);
        table.push_row(vec!['b'], &target, &mut cache);
        assert_eq!(table.size(), 3);
        assert_eq!(table.remove_row(1), Some(vec!['a']));
        assert_eq!(table.index_of(&['b']), Some(1));
        assert!(!table.contains(&['a']));
        assert!(table.is_consistent(&cache));
        let (words, rows) = table.basis_without(0);
        assert_eq!(words, vec![vec!['b']]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn the_empty_row_stays() {
        let target = target();
        let mut cache = MembershipCache::new();
        let mut table = ObservationTable::new(target.alphabet().clone(), true, &target, &mut cache);
        table.push_row(vec!['a'], &target, &mut cache);
        assert_eq!(table.remove_row(0), None);
        assert_eq!(table.remove_row(2), None);
        assert_eq!(table.prefixes(), &[vec![], vec!['a']]);
        assert!(table.is_consistent(&cache));
    }

    #[test]
    fn plain_tables_keep_raw_weights() {
        let target = target();
        let mut cache = MembershipCache::new();
        let mut table = ObservationTable::new(target.alphabet().clone(), false, &target, &mut cache);
        table.push_row(vec!['a'], &target, &mut cache);
        assert_eq!(row(&table, &[]), Some(vector([2])));
        assert_eq!(row(&table, &['a']), Some(vector([6])));
        assert_eq!(table.transition(&['a']), Some(w(1)));
        assert_eq!(table.state_weights(), vector([2, 6]));
        assert!(table.is_consistent(&cache));
    }
}
