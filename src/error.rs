// error.rs - Error types for decomposition, automaton building and matching.
//
// Every failure is an explicit value: syntax errors carry the offending
// pattern and byte offset, automaton errors the rejected byte, and the
// matcher wraps both.

use thiserror::Error;

/// What went wrong while parsing a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    /// `(` without a matching `)`.
    UnmatchedOpenParen,
    /// `)` without a matching `(`.
    UnmatchedCloseParen,
    /// `[` without a closing `]`.
    UnterminatedClass,
    /// Character class range whose end sorts before its start (`[z-a]`).
    InvalidRange,
    /// Pattern ends in a lone backslash.
    TrailingBackslash,
    /// Malformed numeric, control, property or reference escape.
    InvalidEscape,
    /// Unrecognized `(?...)` or `(*...)` construct.
    InvalidGroup,
    /// Unknown POSIX bracket name such as `[:foo:]`.
    UnknownPosixClass,
    /// Quantifier with no preceding atom.
    NothingToRepeat,
    /// Quantifier directly following another quantifier.
    NestedQuantifier,
    /// `{m,n}` with `m > n`.
    InvalidRepeatRange,
    /// Repeat bound above the supported maximum.
    RepeatTooLarge,
    /// Groups nested deeper than the parser allows.
    DepthLimit,
}

impl SyntaxKind {
    /// Short human-readable description.
    pub fn message(self) -> &'static str {
        match self {
            SyntaxKind::UnmatchedOpenParen => "missing closing parenthesis",
            SyntaxKind::UnmatchedCloseParen => "unmatched closing parenthesis",
            SyntaxKind::UnterminatedClass => "premature end of char-class",
            SyntaxKind::InvalidRange => "empty range in char class",
            SyntaxKind::TrailingBackslash => "end pattern at escape",
            SyntaxKind::InvalidEscape => "invalid escape sequence",
            SyntaxKind::InvalidGroup => "undefined group option",
            SyntaxKind::UnknownPosixClass => "invalid POSIX bracket type",
            SyntaxKind::NothingToRepeat => "target of repeat operator is not specified",
            SyntaxKind::NestedQuantifier => "nested repeat operator",
            SyntaxKind::InvalidRepeatRange => "upper bound smaller than lower bound in repeat range",
            SyntaxKind::RepeatTooLarge => "too big number for repeat range",
            SyntaxKind::DepthLimit => "parse depth limit over",
        }
    }
}

impl std::fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Error produced while decomposing a pattern into literal branches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern could not be parsed.
    #[error("syntax error at offset {offset} in {pattern:?}: {kind}")]
    Syntax {
        kind: SyntaxKind,
        offset: usize,
        pattern: String,
    },
    /// The tree violated a structural contract during simplification.
    #[error("corrupt pattern tree")]
    CorruptTree,
    /// At least one alternative of the pattern has no literal long enough to index.
    #[error("pattern {pattern:?} cannot be indexed: {reason}")]
    Unindexable {
        pattern: String,
        reason: &'static str,
    },
    /// Keyword fallback produced more literals than the branch cap allows.
    #[error("pattern {pattern:?} yields {count} keywords, cap is {cap}")]
    TooManyKeywords {
        pattern: String,
        count: usize,
        cap: u64,
    },
}

impl PatternError {
    pub(crate) fn syntax(kind: SyntaxKind, offset: usize, pattern: &str) -> Self {
        PatternError::Syntax {
            kind,
            offset,
            pattern: pattern.to_string(),
        }
    }

    /// Stable numeric code, negative like the classic C regex libraries.
    pub fn code(&self) -> i32 {
        match self {
            PatternError::Syntax { kind, .. } => -100 - *kind as i32,
            PatternError::CorruptTree => -11,
            PatternError::Unindexable { .. } => -20,
            PatternError::TooManyKeywords { .. } => -21,
        }
    }

    /// The syntax error kind, if this is a syntax error.
    pub fn syntax_kind(&self) -> Option<SyntaxKind> {
        match self {
            PatternError::Syntax { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Error produced when inserting a key into an [`Automaton`](crate::automaton::Automaton).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AutomatonError {
    /// Empty keys would match everywhere.
    #[error("empty key")]
    EmptyKey,
    /// A key byte (after case folding) lies outside the configured alphabet.
    #[error("byte 0x{byte:02x} at position {position} is outside the automaton alphabet")]
    Alphabet { byte: u8, position: usize },
}

impl AutomatonError {
    pub fn code(&self) -> i32 {
        match self {
            AutomatonError::EmptyKey => -30,
            AutomatonError::Alphabet { .. } => -31,
        }
    }
}

/// Error produced by the [`Matcher`](crate::matcher::Matcher).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
    /// Group index beyond the configured number of groups.
    #[error("unknown group {group} (matcher has {groups})")]
    UnknownGroup { group: usize, groups: usize },
    /// Search on a group whose automaton has pending insertions.
    #[error("group {group} is not compiled")]
    NotCompiled { group: usize },
    /// Debug consistency check failed after compilation.
    #[error("automaton of group {group} failed its consistency check")]
    Inconsistent { group: usize },
}

impl MatchError {
    pub fn code(&self) -> i32 {
        match self {
            MatchError::Pattern(e) => e.code(),
            MatchError::Automaton(e) => e.code(),
            MatchError::UnknownGroup { .. } => -40,
            MatchError::NotCompiled { .. } => -41,
            MatchError::Inconsistent { .. } => -42,
        }
    }
}
