/// A finite word is simply a sequence of symbols. The empty word is the empty vector.
pub type Word = Vec<char>;

/// Gives the non-empty suffixes of `word`, shortest first and including `word` itself.
/// The empty word is special: its only suffix is the empty word.
///
/// # Example
/// ```
/// use wfa::prelude::*;
/// let word = ['a', 'b', 'c'];
/// let out: Vec<Word> = suffixes(&word).collect();
/// assert_eq!(out, vec![vec!['c'], vec!['b', 'c'], vec!['a', 'b', 'c']]);
/// assert_eq!(suffixes(&[]).collect::<Vec<_>>(), vec![Word::new()]);
/// ```
pub fn suffixes(word: &[char]) -> impl Iterator<Item = Word> + '_ {
    let len = word.len();
    let lengths = if len == 0 { 0..=0 } else { 1..=len };
    lengths.map(move |i| word[len - i..].to_vec())
}

/// Gives the proper prefixes of `word`, shortest first and including the empty word. For the empty
/// word, this yields only the empty word.
pub fn prefixes(word: &[char]) -> impl Iterator<Item = Word> + '_ {
    let upper = word.len().max(1);
    (0..upper).map(move |i| word[..i.min(word.len())].to_vec())
}

/// Concatenates the two given words into a fresh one.
pub fn concat(left: &[char], right: &[char]) -> Word {
    let mut out = Vec::with_capacity(left.len() + right.len());
    out.extend_from_slice(left);
    out.extend_from_slice(right);
    out
}

/// Appends the single `symbol` to `word`, producing a fresh word.
pub fn extend(word: &[char], symbol: char) -> Word {
    let mut out = Vec::with_capacity(word.len() + 1);
    out.extend_from_slice(word);
    out.push(symbol);
    out
}

/// Prepends the single `symbol` to `word`, producing a fresh word.
pub fn prepend(symbol: char, word: &[char]) -> Word {
    let mut out = Vec::with_capacity(word.len() + 1);
    out.push(symbol);
    out.extend_from_slice(word);
    out
}

/// Returns the word without its last symbol, or `None` for the empty word.
pub fn parent(word: &[char]) -> Option<&[char]> {
    word.split_last().map(|(_, init)| init)
}
