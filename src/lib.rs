//! # regex-prefilter
//!
//! Multi-pattern literal prefilter for regular expressions.
//!
//! Every pattern is decomposed into *branches*: ordered lists of literals
//! that any match of the pattern must contain. All literals of a pattern
//! group go into one Aho-Corasick automaton, and a single pass over the
//! text reports the patterns whose literals of some branch were seen in
//! order. Candidates can then be confirmed with a full regex engine.
//!
//! ## Quick Start
//!
//! ```rust
//! use regex_prefilter::prelude::*;
//!
//! let mut matcher = Matcher::new(MatcherConfig::default());
//! let union = matcher.add_pattern(0, r"union\s+select", "sqli").unwrap();
//! let script = matcher.add_pattern(0, r"<script[^>]*>", "xss").unwrap();
//! matcher.compile(0).unwrap();
//!
//! let found = matcher
//!     .find_all(0, b"id=1 UNION  SELECT pass", DecodeMode::None)
//!     .unwrap();
//! assert_eq!(found, vec![union]);
//!
//! let found = matcher
//!     .find_all(0, b"q=%3Cscript%3E", DecodeMode::UrlEncodedUnicode)
//!     .unwrap();
//! assert_eq!(found, vec![script]);
//! ```
//!
//! Decomposition on its own:
//!
//! ```rust
//! use regex_prefilter::decompose::decompose;
//!
//! let branches = decompose(r"foo\d+bar(baz|qux)").unwrap();
//! assert_eq!(branches.len(), 20);
//! assert_eq!(branches[0].literals()[0], b"foo0".to_vec());
//! ```
//!
//! ## Module Structure
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`arena`] | Index-addressed pools and byte storage |
//! | [`charclass`] | Byte sets for escapes and bracket expressions |
//! | [`parse`] | Pattern parser building the decomposition tree |
//! | [`tree`] | AND/OR tree: simplification and branch enumeration |
//! | [`decompose`] | Branch cap, fallbacks and keyword extraction |
//! | [`decode`] | URL and HTML escape decoding of scanned text |
//! | [`automaton`] | Aho-Corasick automaton with case folding and whole-word hits |
//! | [`matcher`] | Pattern groups, ordered-literal cursors, versioned scans |
//! | [`verify`] | Confirming candidates with a full regex |
//! | [`error`] | Error types |

pub mod arena;
pub mod automaton;
pub mod charclass;
pub mod decode;
pub mod decompose;
pub mod error;
pub mod matcher;
pub mod parse;
pub mod prelude;
pub mod tree;
pub mod verify;
