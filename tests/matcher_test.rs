// matcher_test.rs - Integration tests for the multi-pattern matcher.

use regex_prefilter::prelude::*;

fn matcher(patterns: &[&str]) -> (Matcher<&'static str>, Vec<PatternId>) {
    let mut m = Matcher::new(MatcherConfig::default());
    let ids = patterns
        .iter()
        .map(|p| m.add_pattern(0, p, "payload").unwrap())
        .collect();
    m.compile(0).unwrap();
    (m, ids)
}

fn reported(m: &mut Matcher<&'static str>, text: &[u8], version: u64) -> Vec<PatternId> {
    let mut out = Vec::new();
    m.search(0, text, DecodeMode::None, version, |found| {
        out.push(found.pattern);
        false
    })
    .unwrap();
    out
}

// === Ordering ===

#[test]
fn ordered_literals_match_once() {
    let (mut m, ids) = matcher(&["foo.*bar.*baz"]);
    assert_eq!(reported(&mut m, b"foo bar baz foo bar baz", 1), vec![ids[0]]);
    assert!(reported(&mut m, b"baz bar foo", 2).is_empty());
    assert!(reported(&mut m, b"bar foo baz", 3).is_empty());
    assert_eq!(reported(&mut m, b"xfooxbarxbazx", 4), vec![ids[0]]);
}

#[test]
fn match_offsets() {
    let (mut m, _) = matcher(&["foo.*bar"]);
    let mut spans = Vec::new();
    m.search(0, b"--foo--bar--", DecodeMode::None, 1, |found| {
        spans.push((found.offset, found.end, found.keyword.to_vec()));
        false
    })
    .unwrap();
    assert_eq!(spans, vec![(2, 10, b"bar".to_vec())]);
}

#[test]
fn shared_literals_across_patterns() {
    let (mut m, ids) = matcher(&["login.*admin", "admin.*panel", "admin"]);
    let found = m.find_all(0, b"admin panel", DecodeMode::None).unwrap();
    assert_eq!(found, vec![ids[2], ids[1]]);
    let found = m.find_all(0, b"login as admin", DecodeMode::None).unwrap();
    assert_eq!(found, vec![ids[0], ids[2]]);
}

// === Versions ===

#[test]
fn bumped_versions_repeat_matches() {
    let (mut m, _) = matcher(&["select.*from", "union", "drop\\s+table"]);
    let text = b"select * from t union drop table x";
    let first = reported(&mut m, text, 1);
    let second = reported(&mut m, text, 2);
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert!(reported(&mut m, text, 2).is_empty());
}

#[test]
fn reset_rearms_the_same_version() {
    let (mut m, ids) = matcher(&["needle"]);
    assert_eq!(reported(&mut m, b"needle", 9), vec![ids[0]]);
    m.reset(9);
    assert_eq!(reported(&mut m, b"needle", 9), vec![ids[0]]);
}

#[test]
fn streaming_across_chunks() {
    let (mut m, ids) = matcher(&["header.*footer"]);
    assert!(reported(&mut m, b"header ...", 1).is_empty());
    assert!(reported(&mut m, b"... body ...", 1).is_empty());
    assert_eq!(reported(&mut m, b"... footer", 1), vec![ids[0]]);
}

// === Groups and decoding ===

#[test]
fn groups_are_independent() {
    let mut m: Matcher<u32> = MatcherBuilder::new().groups(2).build();
    let a = m.add_pattern(0, "alpha", 1).unwrap();
    let b = m.add_pattern(1, "beta", 2).unwrap();
    m.compile_all().unwrap();
    assert_eq!(m.find_all(0, b"alpha beta", DecodeMode::None).unwrap(), vec![a]);
    assert_eq!(m.find_all(1, b"alpha beta", DecodeMode::None).unwrap(), vec![b]);
    assert_eq!(
        m.find_all(2, b"alpha", DecodeMode::None),
        Err(MatchError::UnknownGroup { group: 2, groups: 2 })
    );
}

#[test]
fn decoded_scans() {
    let (mut m, ids) = matcher(&["<script", "a&b"]);
    assert_eq!(
        m.find_all(0, b"%3Cscript%3E", DecodeMode::UrlEncodedUnicode).unwrap(),
        vec![ids[0]]
    );
    assert_eq!(
        m.find_all(0, b"a&amp;b", DecodeMode::HtmlEntity).unwrap(),
        vec![ids[1]]
    );
    assert!(m.find_all(0, b"a&amp;b", DecodeMode::None).unwrap().is_empty());
}

#[test]
fn case_sensitivity() {
    let mut m: Matcher<()> = MatcherBuilder::new().case_insensitive(false).build();
    let id = m.add_pattern(0, "Secret", ()).unwrap();
    m.compile(0).unwrap();
    assert!(m.find_all(0, b"secret", DecodeMode::None).unwrap().is_empty());
    assert_eq!(m.find_all(0, b"Secret", DecodeMode::None).unwrap(), vec![id]);

    let (mut m, ids) = matcher(&["Secret"]);
    assert_eq!(m.find_all(0, b"sEcReT", DecodeMode::None).unwrap(), ids);
}

#[test]
fn inline_caseless_on_case_sensitive_matcher() {
    let mut m: Matcher<()> = MatcherBuilder::new().case_insensitive(false).build();
    let whole = m.add_pattern(0, "(?i)select", ()).unwrap();
    let scoped = m.add_pattern(0, "drop (?i:table)", ()).unwrap();
    m.compile(0).unwrap();
    assert_eq!(m.find_all(0, b"SELECT 1", DecodeMode::None).unwrap(), vec![whole]);
    assert_eq!(m.find_all(0, b"sElEcT 1", DecodeMode::None).unwrap(), vec![whole]);
    assert_eq!(m.find_all(0, b"drop TaBlE", DecodeMode::None).unwrap(), vec![scoped]);
    assert!(m.find_all(0, b"DROP table", DecodeMode::None).unwrap().is_empty());
}

#[test]
fn negated_classes_see_high_bytes() {
    let (mut m, ids) = matcher(&["foo[^a]bar", r"ab\Wcd"]);
    assert_eq!(m.find_all(0, b"foo\xE9bar ab\xA0cd", DecodeMode::None).unwrap(), ids);
}

// === Shared scanning ===

#[test]
fn scan_from_threads() {
    let (m, ids) = matcher(&["alpha.*omega", "beta"]);
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut state = ScanState::new();
                let mut seen = Vec::new();
                m.search_with(&mut state, 0, b"alpha beta omega", DecodeMode::None, 1, |found| {
                    seen.push(found.pattern);
                    false
                })
                .unwrap();
                assert_eq!(seen, vec![ids[1], ids[0]]);
            });
        }
    });
}

#[test]
fn one_shot_scans_reuse_state() {
    let (m, ids) = matcher(&["foo.*bar", "baz"]);
    let mut state = ScanState::new();
    for round in 1..=3u64 {
        let found = m.find_all_with(&mut state, 0, b"baz foo bar baz", DecodeMode::None).unwrap();
        assert_eq!(found, vec![ids[1], ids[0]]);
        assert_eq!(state.version(), round);
    }
    // Progress from one call never leaks into the next.
    assert!(m.find_all_with(&mut state, 0, b"foo", DecodeMode::None).unwrap().is_empty());
    assert!(m.find_all_with(&mut state, 0, b"bar", DecodeMode::None).unwrap().is_empty());
    assert!(m.is_match_with(&mut state, 0, b"a baz", DecodeMode::None).unwrap());
    assert!(!m.is_match_with(&mut state, 0, b"bar", DecodeMode::None).unwrap());
}

#[test]
fn counts_and_literals() {
    let (m, _) = matcher(&["abc(d|e)", "xyz"]);
    assert_eq!(m.pattern_count(), 2);
    assert_eq!(m.piece_count(), 3);
    assert_eq!(m.frame_count(), 3);
    let literals = m.list_literals(0).unwrap();
    assert_eq!(literals, vec![b"abcd".as_slice(), b"abce".as_slice(), b"xyz".as_slice()]);
    assert!(m.memory_size() > 0);
}

#[test]
fn rejected_patterns_are_reported() {
    let mut m: Matcher<()> = Matcher::default();
    let err = m.add_pattern(0, ".*", ()).unwrap_err();
    assert!(matches!(err, MatchError::Pattern(PatternError::Unindexable { .. })));
    assert!(err.code() < 0);
    assert_eq!(m.test_pattern("ab|cd"), Ok(2));
    assert!(m.test_pattern("(").is_err());
}
