// verify.rs - Confirming prefilter candidates with a real regex engine.
//
// The matcher only proves that the literals of a pattern occur in order.
// A Verifier attached as pattern payload runs the full pattern on the
// candidates.

use std::ops::Range;

/// A full matcher for one pattern.
pub trait Verifier {
    fn is_match(&self, haystack: &[u8]) -> bool;

    /// Leftmost match.
    fn find(&self, haystack: &[u8]) -> Option<Range<usize>>;

    /// Successive non-overlapping matches.
    fn find_all(&self, haystack: &[u8]) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut at = 0;
        while at <= haystack.len() {
            let Some(m) = self.find(&haystack[at..]) else {
                break;
            };
            let range = at + m.start..at + m.end;
            at = if range.is_empty() { range.end + 1 } else { range.end };
            out.push(range);
        }
        out
    }
}

impl<V: Verifier + ?Sized> Verifier for &V {
    fn is_match(&self, haystack: &[u8]) -> bool {
        (**self).is_match(haystack)
    }

    fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
        (**self).find(haystack)
    }

    fn find_all(&self, haystack: &[u8]) -> Vec<Range<usize>> {
        (**self).find_all(haystack)
    }
}

#[cfg(feature = "verify")]
pub use self::regex_verifier::RegexVerifier;

#[cfg(feature = "verify")]
mod regex_verifier {
    use std::ops::Range;

    use regex::bytes::{Regex, RegexBuilder};

    use super::Verifier;

    impl Verifier for Regex {
        fn is_match(&self, haystack: &[u8]) -> bool {
            Regex::is_match(self, haystack)
        }

        fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
            Regex::find(self, haystack).map(|m| m.range())
        }

        fn find_all(&self, haystack: &[u8]) -> Vec<Range<usize>> {
            self.find_iter(haystack).map(|m| m.range()).collect()
        }
    }

    /// A [`Verifier`] over `regex::bytes::Regex` that remembers its source.
    ///
    /// ```
    /// use regex_prefilter::verify::{RegexVerifier, Verifier};
    ///
    /// let v = RegexVerifier::new(r"ab+c").unwrap();
    /// assert!(v.is_match(b"xxabbbc"));
    /// assert_eq!(v.find(b"xxabbbc"), Some(2..7));
    /// ```
    #[derive(Clone, Debug)]
    pub struct RegexVerifier {
        regex: Regex,
    }

    impl RegexVerifier {
        pub fn new(pattern: &str) -> Result<Self, regex::Error> {
            Self::with_case(pattern, false)
        }

        pub fn with_case(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .unicode(false)
                .build()?;
            Ok(RegexVerifier { regex })
        }

        pub fn as_str(&self) -> &str {
            self.regex.as_str()
        }

        pub fn regex(&self) -> &Regex {
            &self.regex
        }
    }

    impl Verifier for RegexVerifier {
        fn is_match(&self, haystack: &[u8]) -> bool {
            self.regex.is_match(haystack)
        }

        fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
            self.regex.find(haystack).map(|m| m.range())
        }

        fn find_all(&self, haystack: &[u8]) -> Vec<Range<usize>> {
            Verifier::find_all(&self.regex, haystack)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Needle(&'static [u8]);

    impl Verifier for Needle {
        fn is_match(&self, haystack: &[u8]) -> bool {
            self.find(haystack).is_some()
        }

        fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
            memchr::memmem::find(haystack, self.0).map(|i| i..i + self.0.len())
        }
    }

    #[test]
    fn default_find_all() {
        let n = Needle(b"ab");
        assert_eq!(n.find_all(b"ab_ab_a"), vec![0..2, 3..5]);
        assert!((&n).is_match(b"xab"));
        assert!(n.find_all(b"").is_empty());
    }

    #[cfg(feature = "verify")]
    #[test]
    fn regex_verifier() {
        let v = RegexVerifier::with_case(r"foo\d+", true).unwrap();
        assert_eq!(v.as_str(), r"foo\d+");
        assert_eq!(v.find_all(b"FOO1 foo22 foo"), vec![0..4, 5..10]);
        assert!(!v.is_match(b"foo"));
        assert!(RegexVerifier::new("(").is_err());
    }

    #[cfg(feature = "verify")]
    #[test]
    fn matcher_confirms_candidates() {
        use crate::decode::DecodeMode;
        use crate::matcher::Matcher;

        let mut m: Matcher<RegexVerifier> = Matcher::default();
        let p = r"user=\w+&admin=1";
        let id = m.add_pattern(0, p, RegexVerifier::new(p).unwrap()).unwrap();
        m.compile(0).unwrap();

        let text = b"user=bob&x=1&admin=1";
        assert_eq!(m.find_all(0, text, DecodeMode::None).unwrap(), vec![id]);
        assert!(m.search_verified(0, text, DecodeMode::None).unwrap().is_empty());
        assert_eq!(
            m.search_verified(0, b"user%3Dbob%26admin=1", DecodeMode::UrlEncodedUnicode).unwrap(),
            vec![id]
        );
    }

    #[cfg(feature = "verify")]
    #[test]
    fn candidates_cover_regex_matches() {
        use crate::decode::DecodeMode;
        use crate::matcher::{Matcher, MatcherBuilder};

        // Negated classes also match bytes outside ASCII.
        let text = b"foo\xE9bar";
        for p in [r"foo[^a]bar", r"foo\Sbar", r"foo\Wbar", r"foo\Dbar"] {
            let mut m: Matcher<RegexVerifier> = Matcher::default();
            let id = m.add_pattern(0, p, RegexVerifier::new(p).unwrap()).unwrap();
            m.compile(0).unwrap();
            assert_eq!(m.search_verified(0, text, DecodeMode::None).unwrap(), vec![id], "{p}");
        }

        // Inline case flags on a case-sensitive matcher.
        for (p, text) in [
            (r"(?i)select", b"SELECT 1".as_slice()),
            (r"union (?i:all)", b"union ALL".as_slice()),
        ] {
            let mut m: Matcher<RegexVerifier> = MatcherBuilder::new().case_insensitive(false).build();
            let id = m.add_pattern(0, p, RegexVerifier::new(p).unwrap()).unwrap();
            m.compile(0).unwrap();
            assert_eq!(m.search_verified(0, text, DecodeMode::None).unwrap(), vec![id], "{p}");
        }
    }
}
