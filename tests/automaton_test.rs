// automaton_test.rs - Integration tests for the Aho-Corasick automaton.

use regex_prefilter::automaton::{Automaton, AutomatonConfig, PatternId};
use regex_prefilter::decode::DecodeMode;
use regex_prefilter::error::AutomatonError;

fn pid(n: u32) -> PatternId {
    PatternId::new(n)
}

fn compiled(keys: &[(&str, u32)]) -> Automaton {
    let mut ac: Automaton = Automaton::default();
    for (key, id) in keys {
        ac.add(key.as_bytes(), pid(*id), false).unwrap();
    }
    assert!(ac.compile());
    assert!(ac.check());
    ac
}

fn ids_at(ac: &Automaton, text: &[u8], decode: DecodeMode) -> Vec<(usize, usize)> {
    ac.find_all(text, decode)
        .iter()
        .map(|h| (h.id.index(), h.offset))
        .collect()
}

// === Basic scanning ===

#[test]
fn he_she() {
    let ac = compiled(&[("he", 1), ("she", 2)]);
    let mut found = ids_at(&ac, b"she", DecodeMode::None);
    found.sort();
    assert_eq!(found, vec![(1, 1), (2, 0)]);
}

#[test]
fn every_key_alone_reports_its_id() {
    let keys = [("alpha", 1), ("alp", 2), ("pha", 3), ("ha", 4), ("lphab", 5)];
    let ac = compiled(&keys);
    for (key, id) in keys {
        let found = ids_at(&ac, key.as_bytes(), DecodeMode::None);
        assert!(found.contains(&(id as usize, 0)), "{key}: {found:?}");
    }
}

#[test]
fn overlapping_occurrences() {
    let ac = compiled(&[("aa", 1)]);
    assert_eq!(
        ids_at(&ac, b"aaaa", DecodeMode::None),
        vec![(1, 0), (1, 1), (1, 2)]
    );
}

#[test]
fn hit_fields() {
    let ac = compiled(&[("needle", 7)]);
    let mut seen = Vec::new();
    let stopped = ac.search(b"hay NEEDLE hay", DecodeMode::None, |hit| {
        seen.push((hit.offset, hit.end, hit.key.to_vec(), *hit.value));
        false
    });
    assert!(!stopped);
    assert_eq!(seen, vec![(4, 10, b"needle".to_vec(), pid(7))]);
}

#[test]
fn binary_keys() {
    let mut ac: Automaton = Automaton::new(AutomatonConfig {
        case_insensitive: false,
        ..AutomatonConfig::default()
    });
    ac.add(&[0x00, 0xFF, 0x80], pid(1), false).unwrap();
    assert!(ac.compile());
    let hits = ac.find_all(&[1, 0, 0xFF, 0x80, 2], DecodeMode::None);
    assert_eq!(hits.len(), 1);
    assert_eq!((hits[0].offset, hits[0].end), (1, 4));
}

// === Whole words ===

#[test]
fn whole_word_cat() {
    let mut ac: Automaton = Automaton::default();
    ac.add(b"cat", pid(1), true).unwrap();
    assert!(ac.compile());
    assert!(ac.find_all(b"concatenate", DecodeMode::None).is_empty());
    assert_eq!(ids_at(&ac, b"a cat sat", DecodeMode::None), vec![(1, 2)]);
    assert_eq!(ids_at(&ac, b"cat-cat", DecodeMode::None), vec![(1, 0), (1, 4)]);
}

#[test]
fn whole_word_only_where_requested() {
    let mut ac: Automaton = Automaton::default();
    ac.add(b"cat", pid(1), true).unwrap();
    ac.add(b"dog", pid(2), false).unwrap();
    assert!(ac.compile());
    assert_eq!(ids_at(&ac, b"hotdogs concat", DecodeMode::None), vec![(2, 3)]);
}

// === Decoding ===

#[test]
fn url_encoded_text() {
    let ac = compiled(&[("abc", 1)]);
    assert_eq!(ids_at(&ac, b"%61%62%63", DecodeMode::UrlEncodedUnicode), vec![(1, 0)]);
    assert!(ac.find_all(b"%61%62%63", DecodeMode::None).is_empty());
    assert_eq!(ids_at(&ac, b"%u0061bc", DecodeMode::UrlEncodedUnicode), vec![(1, 0)]);
}

#[test]
fn html_entity_text() {
    let ac = compiled(&[("&", 1), ("<b>", 2)]);
    assert_eq!(ids_at(&ac, b"&amp;", DecodeMode::HtmlEntity), vec![(1, 0)]);
    let found = ids_at(&ac, b"x&lt;B&#62;", DecodeMode::HtmlEntity);
    assert_eq!(found, vec![(2, 1)]);
}

// === Bookkeeping ===

#[test]
fn rejected_keys_leave_trie_untouched() {
    let mut ac: Automaton = Automaton::new(AutomatonConfig {
        case_insensitive: true,
        min_letter: b'A',
        max_letter: b'Z',
    });
    assert!(ac.add(b"abc", pid(1), false).is_ok());
    assert_eq!(
        ac.add(b"ab1", pid(2), false),
        Err(AutomatonError::Alphabet { byte: b'1', position: 2 })
    );
    assert_eq!(ac.len(), 1);
    assert_eq!(ac.state_count(), 4);
}

#[test]
fn introspection() {
    let ac = compiled(&[("one", 1), ("three", 3), ("ONE", 9)]);
    assert_eq!(ac.len(), 2);
    assert_eq!(ac.insertions(), 3);
    assert_eq!(ac.min_length(), 3);
    assert_eq!(ac.max_length(), 5);
    assert_eq!(ac.find_key(b"One"), Some(&pid(1)));
    let keys: Vec<_> = ac.iter().map(|t| t.key.to_vec()).collect();
    assert_eq!(keys, vec![b"one".to_vec(), b"three".to_vec()]);
    assert!(ac.to_string().contains("2 keys"));
}
