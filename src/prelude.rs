// prelude.rs - Convenient re-exports for building and scanning matchers.
//
//! # Prelude
//!
//! ```
//! use regex_prefilter::prelude::*;
//!
//! let mut ac: Automaton = Automaton::default();
//! ac.add(b"he", PatternId::new(1), false).unwrap();
//! ac.add(b"she", PatternId::new(2), false).unwrap();
//! assert!(ac.compile());
//! let hits = ac.find_all(b"she", DecodeMode::None);
//! assert_eq!(hits.len(), 2);
//! ```

pub use crate::automaton::{Automaton, AutomatonConfig, Hit, PatternId, TrieHit};
pub use crate::decode::DecodeMode;
pub use crate::decompose::{decompose, Branch, DecomposeOptions, Decomposer, Strategy};
pub use crate::error::{AutomatonError, MatchError, PatternError, SyntaxKind};
pub use crate::matcher::{Matcher, MatcherBuilder, MatcherConfig, PatternMatch, ScanState};
pub use crate::verify::Verifier;
#[cfg(feature = "verify")]
pub use crate::verify::RegexVerifier;
