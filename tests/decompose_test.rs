// decompose_test.rs - Integration tests for pattern decomposition.

use regex_prefilter::decompose::{decompose, DecomposeOptions, Decomposer, Strategy};
use regex_prefilter::error::{PatternError, SyntaxKind};
use regex_prefilter::tree::PatternTree;

fn literals(pattern: &str) -> Vec<Vec<String>> {
    decompose(pattern)
        .unwrap()
        .iter()
        .map(|b| {
            b.literals()
                .iter()
                .map(|l| String::from_utf8_lossy(l).into_owned())
                .collect()
        })
        .collect()
}

fn with_cap(pattern: &str, cap: u64) -> Result<(Strategy, usize), PatternError> {
    let mut d = Decomposer::new(DecomposeOptions {
        max_branches: cap,
        ..DecomposeOptions::default()
    });
    d.decompose(pattern).map(|d| (d.strategy, d.branches.len()))
}

// === Branch enumeration ===

#[test]
fn alternation_in_sequence() {
    assert_eq!(literals("abc(d|e)fg"), vec![vec!["abcdfg"], vec!["abcefg"]]);
}

#[test]
fn optional_and_zero_repeat() {
    assert_eq!(literals("ab?c"), vec![vec!["abc"], vec!["ac"]]);
    assert_eq!(literals("a{0}bc"), vec![vec!["bc"]]);
}

#[test]
fn top_level_alternation() {
    assert_eq!(literals("cat|dog|bird"), vec![vec!["cat"], vec!["dog"], vec!["bird"]]);
}

#[test]
fn nested_groups() {
    assert_eq!(
        literals("x(a(b|c)|de)y"),
        vec![vec!["xaby"], vec!["xacy"], vec!["xdey"]]
    );
}

#[test]
fn gaps_keep_order() {
    let expected: Vec<Vec<String>> = (b'0'..=b'9')
        .map(|d| {
            vec![
                "GET /admin".to_string(),
                format!("?id={}", d as char),
                "drop".to_string(),
            ]
        })
        .collect();
    assert_eq!(literals(r"GET /admin.*\?id=\d+.*drop"), expected);
}

#[test]
fn escapes_and_quotes() {
    assert_eq!(literals(r"a\.b\x41B"), vec![vec!["a.bAB"]]);
    assert_eq!(literals(r"\Q(a+b)\E!"), vec![vec!["(a+b)!"]]);
    assert_eq!(literals(r"tab\there"), vec![vec!["tab\there"]]);
}

#[test]
fn anchors_and_lookarounds_are_gaps() {
    assert_eq!(literals(r"^admin(?=\d)$"), vec![vec!["admin"]]);
    assert_eq!(literals(r"\bfoo\b(?<!x)bar"), vec![vec!["foo", "bar"]]);
}

#[test]
fn sets_expand() {
    assert_eq!(literals("[bc]at"), vec![vec!["bat"], vec!["cat"]]);
    assert_eq!(literals("x[y]z"), vec![vec!["xyz"]]);
}

// === Fallbacks ===

#[test]
fn branch_cap_is_respected() {
    let pattern = r"(ab|cd|ef)(gh|ij|kl)(mn|op|qr)\w\w";
    for cap in [3u64, 9, 27, 100, 10_000] {
        let (_, n) = with_cap(pattern, cap).unwrap();
        assert!(n >= 1 && n as u64 <= cap, "cap {cap} gave {n}");
    }
}

#[test]
fn strategies() {
    assert_eq!(with_cap("a(b|c)d", 10).unwrap(), (Strategy::Exact, 2));
    assert_eq!(with_cap("(ab|cd)(e|f|g)", 2).unwrap(), (Strategy::Folded, 2));
    assert_eq!(with_cap("(abc|Abc|ABC)", 1).unwrap(), (Strategy::Keywords, 1));
}

#[test]
fn unindexable_patterns() {
    for pattern in [".*", "a", r"\d+", "(?i)", "ab|c", "a.b.c", "(foo)?"] {
        let err = decompose(pattern).unwrap_err();
        assert!(
            matches!(err, PatternError::Unindexable { .. }),
            "{pattern}: {err:?}"
        );
    }
}

#[test]
fn syntax_errors_carry_offsets() {
    let err = decompose("ab(cd").unwrap_err();
    assert_eq!(err.syntax_kind(), Some(SyntaxKind::UnmatchedOpenParen));
    assert!(matches!(err, PatternError::Syntax { offset: 2, .. }));

    let err = decompose("abc)").unwrap_err();
    assert_eq!(err.syntax_kind(), Some(SyntaxKind::UnmatchedCloseParen));

    let err = decompose("a[bc").unwrap_err();
    assert_eq!(err.syntax_kind(), Some(SyntaxKind::UnterminatedClass));

    let err = decompose("ab[z-a]").unwrap_err();
    assert_eq!(err.syntax_kind(), Some(SyntaxKind::InvalidRange));
}

// === Tree inspection ===

#[test]
fn tree_dump() {
    let mut tree = PatternTree::new();
    tree.compile("ab(c|d)", true).unwrap();
    tree.merge().unwrap();
    let dump = tree.to_string();
    assert!(dump.starts_with("and"));
    assert!(dump.contains("leaf \"ab\""));
    assert!(dump.contains("or"));
    assert_eq!(tree.get_branch_cnt(), 2);
}

#[test]
fn decomposer_is_reusable() {
    let mut d = Decomposer::default();
    assert_eq!(d.decompose("foo|bar").unwrap().branches.len(), 2);
    assert!(d.decompose("a.").is_err());
    assert_eq!(d.decompose("hello").unwrap().branches.len(), 1);
    assert_eq!(d.tree().pattern(), "hello");
}
