// charclass.rs - Byte sets for escape classes and bracket expressions.

use std::fmt;

/// A set of byte values.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CharSet {
    bits: [u64; 4],
}

impl CharSet {
    pub const fn new() -> Self {
        CharSet { bits: [0; 4] }
    }

    pub fn from_fn(mut f: impl FnMut(u8) -> bool) -> Self {
        let mut set = CharSet::new();
        for b in 0..=255u8 {
            if f(b) {
                set.insert(b);
            }
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, b: u8) {
        self.bits[(b >> 6) as usize] |= 1u64 << (b & 63);
    }

    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        for b in lo..=hi {
            self.insert(b);
        }
    }

    #[inline]
    pub fn contains(&self, b: u8) -> bool {
        self.bits[(b >> 6) as usize] & (1u64 << (b & 63)) != 0
    }

    pub fn union(&mut self, other: &CharSet) {
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a |= *b;
        }
    }

    /// Complement over all 256 byte values.
    pub fn negate(&mut self) {
        for w in &mut self.bits {
            *w = !*w;
        }
    }

    /// Add the other ASCII case of every letter in the set.
    pub fn add_ascii_case(&mut self) {
        for b in self.iter().collect::<Vec<_>>() {
            if b.is_ascii_alphabetic() {
                self.insert(b ^ 0x20);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Whether every member is below 0x80.
    pub fn is_ascii(&self) -> bool {
        self.bits[2] == 0 && self.bits[3] == 0
    }

    /// The only member, if the set has exactly one.
    pub fn single(&self) -> Option<u8> {
        if self.len() == 1 {
            self.iter().next()
        } else {
            None
        }
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |b| self.contains(*b))
    }
}

impl fmt::Debug for CharSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for b in self.iter() {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        f.write_str("]")
    }
}

#[inline]
pub fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Space characters as `\s` sees them: space, \t \n \v \f \r.
#[inline]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r')
}

/// The set behind a class escape letter (`d`, `D`, `s`, `S`, `w`, `W`,
/// `h`, `H`, `v`, `V`), or `None` for any other letter.
pub fn escape_class(letter: u8) -> Option<CharSet> {
    let (mut set, negated) = match letter {
        b'd' | b'D' => (CharSet::from_fn(|b| b.is_ascii_digit()), letter == b'D'),
        b's' | b'S' => (CharSet::from_fn(is_space), letter == b'S'),
        b'w' | b'W' => (CharSet::from_fn(is_word_byte), letter == b'W'),
        b'h' | b'H' => (
            CharSet::from_fn(|b| b == b'\t' || b == b' ' || b == 0xA0),
            letter == b'H',
        ),
        b'v' | b'V' => (CharSet::from_fn(|b| (0x0A..=0x0D).contains(&b)), letter == b'V'),
        _ => return None,
    };
    if negated {
        set.negate();
    }
    Some(set)
}

/// The set named by a POSIX bracket expression such as `alpha` in `[:alpha:]`.
pub fn posix_class(name: &[u8]) -> Option<CharSet> {
    let set = match name {
        b"alnum" => CharSet::from_fn(|b| b.is_ascii_alphanumeric()),
        b"alpha" => CharSet::from_fn(|b| b.is_ascii_alphabetic()),
        b"ascii" => CharSet::from_fn(|b| b < 0x80),
        b"blank" => CharSet::from_fn(|b| b == b' ' || b == b'\t'),
        b"cntrl" => CharSet::from_fn(|b| b.is_ascii_control()),
        b"digit" => CharSet::from_fn(|b| b.is_ascii_digit()),
        b"graph" => CharSet::from_fn(|b| b.is_ascii_graphic()),
        b"lower" => CharSet::from_fn(|b| b.is_ascii_lowercase()),
        b"print" => CharSet::from_fn(|b| b.is_ascii_graphic() || b == b' '),
        b"punct" => CharSet::from_fn(|b| b.is_ascii_punctuation()),
        b"space" => CharSet::from_fn(is_space),
        b"upper" => CharSet::from_fn(|b| b.is_ascii_uppercase()),
        b"word" => CharSet::from_fn(is_word_byte),
        b"xdigit" => CharSet::from_fn(|b| b.is_ascii_hexdigit()),
        _ => return None,
    };
    Some(set)
}
