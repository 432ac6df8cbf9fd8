//! A line based text format for weighted automata. A file consists of four lines:
//! 1. the symbols of the alphabet, separated by spaces,
//! 2. the state weights, separated by spaces,
//! 3. the transitions as a concatenation of tuples `(q0, 'a', q1, w)`,
//! 4. the initial distribution, separated by spaces.
//!
//! For example, the automaton with a single state of weight 2 and a self loop of weight 3 on `a`
//! is written as
//! ```text
//! a
//! 2
//! (0, 'a', 0, 3)
//! 1
//! ```
use std::{path::Path, str::FromStr};

use itertools::Itertools;
use thiserror::Error;
use tracing::warn;

use crate::prelude::*;

/// Errors that are encountered when parsing the text representation of an automaton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input does not contain the alphabet and the state weights.
    #[error("missing line with {0}")]
    MissingLine(&'static str),
    /// A symbol of the alphabet consists of more than one character.
    #[error("encountered malformed alphabet symbol `{0}`")]
    Symbol(String),
    /// Some value which should be an integer is not.
    #[error("could not parse integer `{0}`")]
    Integer(String),
    /// A transition tuple is malformed.
    #[error("malformed transition `{0}`")]
    Transition(String),
}

/// Errors that can occur when reading or writing automata from and to files.
#[derive(Debug, Error)]
pub enum FormatError {
    /// An underlying I/O error.
    #[error("could not access automaton file: {0}")]
    Io(#[from] std::io::Error),
    /// The content of the file could not be parsed.
    #[error("could not parse automaton: {0}")]
    Parse(#[from] ParseError),
}

fn parse_integer(s: &str) -> Result<Weight, ParseError> {
    s.trim()
        .parse()
        .map_err(|_| ParseError::Integer(s.trim().to_string()))
}

fn parse_integers(line: &str) -> Result<Vec<Weight>, ParseError> {
    line.split_whitespace().map(parse_integer).collect()
}

fn parse_symbol(s: &str) -> Result<char, ParseError> {
    let trimmed = s.trim().trim_matches(|c| c == '\'' || c == '"');
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ParseError::Symbol(s.trim().to_string())),
    }
}

fn parse_transitions(line: &str) -> Result<Vec<(usize, char, usize, Weight)>, ParseError> {
    line.split(')')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let inner = piece
                .strip_prefix('(')
                .ok_or_else(|| ParseError::Transition(piece.to_string()))?;
            let fields = inner.split(',').map(str::trim).collect_vec();
            let [origin, symbol, target, weight] = fields[..] else {
                return Err(ParseError::Transition(piece.to_string()));
            };
            let state = |s: &str| {
                s.parse::<usize>()
                    .map_err(|_| ParseError::Transition(piece.to_string()))
            };
            Ok((
                state(origin)?,
                parse_symbol(symbol)?,
                state(target)?,
                parse_integer(weight)?,
            ))
        })
        .collect()
}

impl FromStr for WeightedAutomaton {
    type Err = ParseError;

    /// Parses an automaton. Transitions which refer to non-existent states or symbols are skipped
    /// with a warning, the remaining ones are still added. A missing initial distribution places
    /// all initial mass on state `0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines();
        let alphabet: CharAlphabet = lines
            .next()
            .ok_or(ParseError::MissingLine("alphabet"))?
            .split_whitespace()
            .map(parse_symbol)
            .collect::<Result<Vec<_>, _>>()?
            .into();
        let weights = parse_integers(lines.next().ok_or(ParseError::MissingLine("weights"))?)?;
        let transitions = parse_transitions(lines.next().unwrap_or_default())?;
        let initial = match lines.next().map(str::trim) {
            Some(line) if !line.is_empty() => Some(parse_integers(line)?),
            _ => None,
        };

        let mut aut = WeightedAutomaton::new(alphabet, weights, initial);
        for (q, a, p, w) in transitions {
            if let Err(e) = aut.add_transition(q, a, p, w.clone()) {
                warn!("invalid transition ({q}, {a}, {p}, {w}) not added to the automaton: {e}");
            }
        }
        Ok(aut)
    }
}

impl WeightedAutomaton {
    /// Produces the text representation of the automaton, which can be read back with
    /// [`str::parse`].
    pub fn to_text(&self) -> String {
        let alphabet = self.alphabet().universe().join(" ");
        let weights = self.weights().iter().join(" ");
        let transitions = self
            .transitions()
            .map(|(q, a, p, w)| format!("({q}, '{a}', {p}, {w})"))
            .join("");
        let initial = self.initial().iter().join(" ");
        format!("{alphabet}\n{weights}\n{transitions}\n{initial}")
    }
}

/// Reads an automaton from the file at `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<WeightedAutomaton, FormatError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.parse()?)
}

/// Writes the text representation of `aut` to the file at `path`, returning the written text.
pub fn save<P: AsRef<Path>>(aut: &WeightedAutomaton, path: P) -> Result<String, FormatError> {
    let text = aut.to_text();
    std::fs::write(path, &text)?;
    Ok(text)
}
