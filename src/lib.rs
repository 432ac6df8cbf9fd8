//! Library for working with weighted finite automata over the integers.
//!
//! A weighted automaton assigns every finite word an integer weight. It consists of a finite number of
//! states, each of which carries an output weight, an initial distribution which assigns every state
//! some starting mass, and weighted transitions labelled by symbols of an [`Alphabet`]. Evaluating a word
//! amounts to pushing the initial distribution through the weighted adjacency matrix of each symbol in
//! turn and finally taking the dot product with the vector of state weights, see
//! [`WeightedAutomaton::member`].
//!
//! Besides the automaton model itself, the crate provides
//! - [`lattice`], exact integer linear algebra (Hermite-style echelon forms, integral solutions of linear
//!   systems and incrementally maintained lattices). Since weights come from a ring without any notion of
//!   tolerance, all of this is exact.
//! - [`format`], a simple line based text format for storing automata.
//! - [`random`], the generation of random automata, feature gated behind the `random` feature.
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use wfa::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        alphabet,
        alphabet::{Alphabet, CharAlphabet},
        automaton::{InvalidTransition, WeightedAutomaton, WfaBuilder},
        lattice::{Lattice, LatticeError},
        math,
        word::{prefixes, suffixes, Word},
        Show, Weight,
    };
}

/// This module contains some definitions of mathematical objects which are used throughout the crate and
/// do not really fit to the top level.
pub mod math;

/// Module that contains definitions for dealing with alphabets.
#[macro_use]
pub mod alphabet;
pub use alphabet::{Alphabet, CharAlphabet};

/// Module that contains definitions for dealing with finite words.
pub mod word;
pub use word::Word;

/// Defines weighted automata, their construction and their semantics.
pub mod automaton;
pub use automaton::WeightedAutomaton;

/// Exact linear algebra over the integers.
pub mod lattice;

/// Reading and writing automata in a line based text format.
pub mod format;

/// Implements the generation of random weighted automata.
#[cfg(feature = "random")]
pub mod random;

/// The type of weights. Weights are integers of arbitrary size, so evaluating long words or eliminating
/// large matrices never overflows.
pub type Weight = num_bigint::BigInt;

/// Helper trait which can be used to display words, collections of words and such.
pub trait Show {
    /// Returns a human readable representation of `self`. For a word this is for example `"abba"`,
    /// for a collection of words it is `{"", "a", "ab"}`. This is mainly used for debugging purposes.
    fn show(&self) -> String;
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }
}

impl Show for [char] {
    fn show(&self) -> String {
        format!("\"{}\"", self.iter().collect::<String>())
    }
}

impl Show for Vec<char> {
    fn show(&self) -> String {
        self.as_slice().show()
    }
}

impl Show for [Vec<char>] {
    fn show(&self) -> String {
        format!(
            "{{{}}}",
            itertools::Itertools::join(&mut self.iter().map(|w| w.show()), ", ")
        )
    }
}

impl Show for [Weight] {
    fn show(&self) -> String {
        format!(
            "[{}]",
            itertools::Itertools::join(&mut self.iter(), ", ")
        )
    }
}

impl Show for Vec<Weight> {
    fn show(&self) -> String {
        self.as_slice().show()
    }
}

impl<S: Show + ?Sized> Show for &S {
    fn show(&self) -> String {
        S::show(*self)
    }
}
