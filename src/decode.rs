// decode.rs - Escape-aware letter stream over raw scan text.
//
// The automaton consumes one decoded letter per step. Each letter keeps
// the raw offset it started at, so hits can be reported against the
// original text.

use std::borrow::Cow;

/// How escape sequences in scanned text are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DecodeMode {
    /// Bytes are letters.
    #[default]
    None,
    /// `+`, `%hh` and `%uhhhh` escapes.
    UrlEncodedUnicode,
    /// `&#ddd;`, `&#xhh;` and a few named entities.
    HtmlEntity,
}

impl DecodeMode {
    /// Whether `text` contains anything this mode would decode.
    pub fn needs_decoding(self, text: &[u8]) -> bool {
        match self {
            DecodeMode::None => false,
            DecodeMode::UrlEncodedUnicode => memchr::memchr2(b'%', b'+', text).is_some(),
            DecodeMode::HtmlEntity => memchr::memchr(b'&', text).is_some(),
        }
    }
}

/// Decode the letter starting at `pos`. Returns the letter and the raw
/// offset of the next one. `pos` must be inside `text`.
pub fn next_letter(text: &[u8], pos: usize, mode: DecodeMode) -> (u8, usize) {
    let b = text[pos];
    match mode {
        DecodeMode::None => (b, pos + 1),
        DecodeMode::UrlEncodedUnicode => match b {
            b'+' => (b' ', pos + 1),
            b'%' => url_escape(text, pos).unwrap_or((b, pos + 1)),
            _ => (b, pos + 1),
        },
        DecodeMode::HtmlEntity => match b {
            b'&' => html_entity(text, pos).unwrap_or((b, pos + 1)),
            _ => (b, pos + 1),
        },
    }
}

fn hex_value(b: u8) -> Option<u32> {
    (b as char).to_digit(16)
}

fn hex_run(bytes: &[u8]) -> Option<u32> {
    bytes
        .iter()
        .try_fold(0u32, |acc, b| Some(acc * 16 + hex_value(*b)?))
}

fn url_escape(text: &[u8], pos: usize) -> Option<(u8, usize)> {
    let rest = &text[pos + 1..];
    if matches!(rest.first(), Some(b'u' | b'U')) {
        if let Some(value) = rest.get(1..5).and_then(hex_run) {
            // Fullwidth forms U+FF01..U+FF5E fold onto ASCII.
            let letter = if (0xFF01..=0xFF5E).contains(&value) {
                (value - 0xFF01 + 0x21) as u8
            } else {
                (value & 0xFF) as u8
            };
            return Some((letter, pos + 6));
        }
    }
    let value = rest.get(..2).and_then(hex_run)?;
    Some((value as u8, pos + 3))
}

const NAMED_ENTITIES: &[(&[u8], u8)] = &[
    (b"quot", b'"'),
    (b"amp", b'&'),
    (b"lt", b'<'),
    (b"gt", b'>'),
    (b"nbsp", 0xA0),
];

fn html_entity(text: &[u8], pos: usize) -> Option<(u8, usize)> {
    let rest = &text[pos + 1..];
    let (value, used) = if rest.first() == Some(&b'#') {
        let (radix, skip) = match rest.get(1) {
            Some(b'x' | b'X') => (16, 2),
            _ => (10, 1),
        };
        let digits = rest[skip..]
            .iter()
            .take_while(|b| (**b as char).is_digit(radix))
            .count();
        if digits == 0 {
            return None;
        }
        let value = rest[skip..skip + digits]
            .iter()
            .fold(0u32, |acc, b| {
                acc.saturating_mul(radix)
                    .saturating_add((*b as char).to_digit(radix).unwrap_or(0))
            });
        ((value & 0xFF) as u8, skip + digits)
    } else {
        NAMED_ENTITIES.iter().find_map(|(name, letter)| {
            let candidate = rest.get(..name.len())?;
            candidate
                .eq_ignore_ascii_case(name)
                .then_some((*letter, name.len()))
        })?
    };
    let mut next = pos + 1 + used;
    if text.get(next) == Some(&b';') {
        next += 1;
    }
    Some((value, next))
}

/// Iterator over `(raw_offset, letter)` pairs.
#[derive(Clone, Debug)]
pub struct Letters<'t> {
    text: &'t [u8],
    pos: usize,
    mode: DecodeMode,
}

impl<'t> Letters<'t> {
    pub fn new(text: &'t [u8], mode: DecodeMode) -> Self {
        // Plain texts skip the escape checks altogether.
        let mode = if mode.needs_decoding(text) {
            mode
        } else {
            DecodeMode::None
        };
        Letters { text, pos: 0, mode }
    }

    /// Raw offset of the next letter.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Mode actually in effect after the plain-text check.
    pub fn mode(&self) -> DecodeMode {
        self.mode
    }
}

impl Iterator for Letters<'_> {
    type Item = (usize, u8);

    #[inline]
    fn next(&mut self) -> Option<(usize, u8)> {
        if self.pos >= self.text.len() {
            return None;
        }
        let start = self.pos;
        let (letter, next) = next_letter(self.text, start, self.mode);
        self.pos = next;
        Some((start, letter))
    }
}

/// Decode all of `text`, borrowing when nothing needs decoding.
pub fn decode(text: &[u8], mode: DecodeMode) -> Cow<'_, [u8]> {
    if !mode.needs_decoding(text) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(Letters::new(text, mode).map(|(_, letter)| letter).collect())
}
