// parse.rs - Recursive-descent pattern parser building a PatternTree.
//
// Grammar (PCRE flavoured):
//   alternatives := branch ('|' branch)*
//   branch       := (atom quantifier?)*
//   atom         := char | escape | class | group | '.' | '^' | '$'
//
// Every atom either extends the pending literal run of its branch or
// interrupts it with a structural node. Constructs that cannot be reduced
// to literals become disabled leaves.

use std::ops::Range;

use smallvec::SmallVec;

use crate::charclass::{escape_class, posix_class, CharSet};
use crate::error::{PatternError, SyntaxKind};
use crate::tree::{Children, NodeId, PatternTree};

/// Maximum group nesting.
pub const PARSE_DEPTH_LIMIT: u32 = 256;
/// Largest accepted bound in `{m,n}`.
pub const MAX_REPEAT_NUM: u32 = 100_000;
/// Exact repeats of a single character up to this count are written out.
const EXACT_REPEAT_INLINE: u32 = 16;

type CharBytes = SmallVec<[u8; 4]>;

enum Atom {
    /// One character, UTF-8 encoded.
    Char(CharBytes),
    Set(CharSet),
    /// `\Q...\E` contents (range into the pattern).
    Quoted(Range<usize>),
    /// A parsed sub-pattern.
    Node(NodeId),
    /// Anything that is not reducible to literals.
    Disabled,
    /// Constructs that leave no trace (comments, stray `\E`).
    Nothing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Quantifier {
    min: u32,
    max: Option<u32>,
}

/// Inline option flags in effect for the current group.
#[derive(Clone, Copy, Debug, Default)]
struct Flags {
    /// `x`: whitespace and `#` comments are ignored.
    extended: bool,
    /// `i`: letters match in either case.
    caseless: bool,
}

enum ClassMember {
    Byte(u8),
    Set(CharSet),
    /// Non-ASCII or property member; the class cannot be expanded.
    Opaque,
    Nothing,
}

/// Pending state of one branch: finished nodes plus the literal run that
/// is still being accumulated.
struct Sequence {
    items: Children,
    run: Vec<u8>,
    run_source: Option<Range<usize>>,
}

impl Sequence {
    fn new() -> Self {
        Sequence {
            items: Children::new(),
            run: Vec::new(),
            run_source: None,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8], source: Range<usize>) {
        self.run.extend_from_slice(bytes);
        self.run_source = Some(match self.run_source.take() {
            Some(run) => run.start..source.end,
            None => source,
        });
    }

    fn flush(&mut self, tree: &mut PatternTree) {
        if let Some(source) = self.run_source.take() {
            let leaf = tree.new_leaf(&self.run, source);
            self.items.push(leaf);
            self.run.clear();
        }
    }

    fn push_node(&mut self, tree: &mut PatternTree, id: NodeId) {
        self.flush(tree);
        self.items.push(id);
    }

    fn finish(mut self, tree: &mut PatternTree, source: Range<usize>) -> NodeId {
        self.flush(tree);
        tree.new_and(self.items, source)
    }
}

pub(crate) struct Parser<'t, 'p> {
    tree: &'t mut PatternTree,
    text: &'p str,
    pattern: &'p [u8],
    pos: usize,
    expansion: bool,
    /// Literals are matched as written, so `(?i)` letters must be widened.
    case_sensitive: bool,
    flags: Flags,
    depth: u32,
}

impl<'t, 'p> Parser<'t, 'p> {
    pub(crate) fn new(tree: &'t mut PatternTree, text: &'p str, expansion: bool) -> Self {
        let case_sensitive = tree.case_sensitive();
        Parser {
            tree,
            text,
            pattern: text.as_bytes(),
            pos: 0,
            expansion,
            case_sensitive,
            flags: Flags::default(),
            depth: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<NodeId, PatternError> {
        let root = self.parse_alternatives()?;
        if self.pos < self.pattern.len() {
            return Err(self.error(SyntaxKind::UnmatchedCloseParen, self.pos));
        }
        Ok(root)
    }

    fn error(&self, kind: SyntaxKind, offset: usize) -> PatternError {
        PatternError::syntax(kind, offset, self.text)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.pattern.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.pattern.get(self.pos + ahead).copied()
    }

    // === Alternatives and branches ===

    fn parse_alternatives(&mut self) -> Result<NodeId, PatternError> {
        let start = self.pos;
        let mut alts = Children::new();
        loop {
            alts.push(self.parse_branch()?);
            if self.peek() == Some(b'|') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(self.tree.new_or(alts, start..self.pos))
    }

    fn parse_branch(&mut self) -> Result<NodeId, PatternError> {
        let start = self.pos;
        let mut seq = Sequence::new();

        while let Some(c) = self.peek() {
            if c == b'|' || c == b')' {
                break;
            }
            let atom_start = self.pos;
            let atom = match c {
                b'\\' => self.parse_escape()?,
                b'(' => self.parse_group()?,
                b'[' => self.parse_class()?,
                b'^' | b'$' | b'.' => {
                    self.pos += 1;
                    Atom::Disabled
                }
                b'*' | b'+' | b'?' => {
                    return Err(self.error(SyntaxKind::NothingToRepeat, self.pos));
                }
                b'{' if self.scan_interval(self.pos).is_some() => {
                    return Err(self.error(SyntaxKind::NothingToRepeat, self.pos));
                }
                b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r' if self.flags.extended => {
                    self.pos += 1;
                    continue;
                }
                b'#' if self.flags.extended => {
                    self.skip_line_comment();
                    continue;
                }
                _ => self.parse_char(),
            };
            let atom = self.caseless_atom(atom);
            if let Atom::Nothing = atom {
                continue;
            }
            let atom_end = self.pos;
            let quantifier = self.parse_quantifier()?;
            self.emit(&mut seq, atom, quantifier, atom_start..atom_end)?;
        }

        Ok(seq.finish(self.tree, start..self.pos))
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'\n' {
                break;
            }
        }
    }

    fn skip_extended_space(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r' => self.pos += 1,
                b'#' => self.skip_line_comment(),
                _ => break,
            }
        }
    }

    fn parse_char(&mut self) -> Atom {
        let len = self
            .text
            .get(self.pos..)
            .and_then(|s| s.chars().next())
            .map_or(1, char::len_utf8);
        let end = (self.pos + len).min(self.pattern.len());
        let bytes = CharBytes::from_slice(&self.pattern[self.pos..end]);
        self.pos = end;
        Atom::Char(bytes)
    }

    /// Widen an atom read under `(?i)` so that it matches either case.
    fn caseless_atom(&self, atom: Atom) -> Atom {
        if !self.flags.caseless {
            return atom;
        }
        match atom {
            Atom::Char(bytes) if bytes.len() == 1 => {
                if self.case_sensitive && bytes[0].is_ascii_alphabetic() {
                    let mut set = CharSet::new();
                    set.insert(bytes[0]);
                    set.add_ascii_case();
                    Atom::Set(set)
                } else {
                    Atom::Char(bytes)
                }
            }
            // Unicode case folding is not indexed.
            Atom::Char(_) => Atom::Disabled,
            Atom::Set(mut set) => {
                if self.case_sensitive {
                    set.add_ascii_case();
                }
                Atom::Set(set)
            }
            Atom::Quoted(range) => {
                let quoted = &self.pattern[range.clone()];
                let letters = quoted.iter().any(u8::is_ascii_alphabetic);
                if !quoted.is_ascii() || (self.case_sensitive && letters) {
                    Atom::Disabled
                } else {
                    Atom::Quoted(range)
                }
            }
            other => other,
        }
    }

    // === Emission ===

    /// Append an atom and its quantifier to the branch.
    fn emit(
        &mut self,
        seq: &mut Sequence,
        atom: Atom,
        quantifier: Option<Quantifier>,
        atom_source: Range<usize>,
    ) -> Result<(), PatternError> {
        let end = self.pos;
        let full = atom_source.start..end;

        // The quantifier of a quoted run binds to its last character only.
        if let Atom::Quoted(range) = atom {
            let last = self
                .text
                .get(range.clone())
                .and_then(|s| s.chars().last())
                .map_or(0, char::len_utf8);
            let split = range.end - last;
            if split > range.start {
                let head = &self.pattern[range.start..split];
                seq.push_bytes(head, atom_source.start..split);
            }
            if last == 0 {
                return Ok(());
            }
            let tail = CharBytes::from_slice(&self.pattern[split..range.end]);
            return self.emit(seq, Atom::Char(tail), quantifier, split..atom_source.end);
        }

        let Some(q) = quantifier else {
            self.emit_once(seq, atom, atom_source);
            return Ok(());
        };

        if let Atom::Disabled = atom {
            let id = self.tree.new_disabled(full);
            seq.push_node(self.tree, id);
            return Ok(());
        }

        if q.min == 0 {
            let id = if q.max == Some(1) {
                let node = self.atom_node(atom, atom_source);
                if self.tree.node(node).is_disabled() {
                    self.tree.new_disabled(full)
                } else {
                    let absent = self.tree.new_leaf(b"", end..end);
                    let alts: Children = [node, absent].into_iter().collect();
                    self.tree.new_or(alts, full)
                }
            } else {
                self.tree.new_disabled(full)
            };
            seq.push_node(self.tree, id);
            return Ok(());
        }

        if let Atom::Char(bytes) = &atom {
            if q.max == Some(q.min) && q.min <= EXACT_REPEAT_INLINE {
                let mut repeated = Vec::with_capacity(bytes.len() * q.min as usize);
                for _ in 0..q.min {
                    repeated.extend_from_slice(bytes);
                }
                seq.push_bytes(&repeated, full);
                return Ok(());
            }
        }

        let atom_end = atom_source.end;
        self.emit_once(seq, atom, atom_source);
        if q != (Quantifier { min: 1, max: Some(1) }) {
            let gap = self.tree.new_disabled(atom_end..end);
            seq.push_node(self.tree, gap);
        }
        Ok(())
    }

    fn emit_once(&mut self, seq: &mut Sequence, atom: Atom, source: Range<usize>) {
        match atom {
            Atom::Char(bytes) => seq.push_bytes(&bytes, source),
            Atom::Set(set) => match set.single() {
                Some(b) if b.is_ascii() => seq.push_bytes(&[b], source),
                _ => {
                    let id = self.set_node(&set, source);
                    seq.push_node(self.tree, id);
                }
            },
            Atom::Node(id) => seq.push_node(self.tree, id),
            Atom::Disabled => {
                let id = self.tree.new_disabled(source);
                seq.push_node(self.tree, id);
            }
            Atom::Quoted(range) => {
                let bytes = &self.pattern[range];
                seq.push_bytes(bytes, source);
            }
            Atom::Nothing => {}
        }
    }

    /// Standalone node for an atom (used under `?`).
    fn atom_node(&mut self, atom: Atom, source: Range<usize>) -> NodeId {
        match atom {
            Atom::Char(bytes) => self.tree.new_leaf(&bytes, source),
            Atom::Set(set) => match set.single() {
                Some(b) if b.is_ascii() => self.tree.new_leaf(&[b], source),
                _ => self.set_node(&set, source),
            },
            Atom::Node(id) => id,
            Atom::Quoted(range) => {
                let bytes = &self.pattern[range];
                self.tree.new_leaf(bytes, source)
            }
            Atom::Disabled => self.tree.new_disabled(source),
            Atom::Nothing => self.tree.new_leaf(b"", source),
        }
    }

    fn set_node(&mut self, set: &CharSet, source: Range<usize>) -> NodeId {
        // High bytes stand for parts of multi-byte characters in UTF-8 text.
        if !self.expansion || set.is_empty() || !set.is_ascii() {
            return self.tree.new_disabled(source);
        }
        let mut alts = Children::with_capacity(set.len());
        for b in set.iter() {
            alts.push(self.tree.new_leaf(&[b], source.clone()));
        }
        self.tree.new_or(alts, source)
    }

    // === Quantifiers ===

    fn parse_quantifier(&mut self) -> Result<Option<Quantifier>, PatternError> {
        if self.flags.extended {
            self.skip_extended_space();
        }
        let q = match self.peek() {
            Some(b'{') => match self.parse_interval()? {
                Some(q) => q,
                None => return Ok(None),
            },
            Some(c @ (b'*' | b'+' | b'?')) => {
                self.pos += 1;
                match c {
                    b'*' => Quantifier { min: 0, max: None },
                    b'+' => Quantifier { min: 1, max: None },
                    _ => Quantifier { min: 0, max: Some(1) },
                }
            }
            _ => return Ok(None),
        };

        // lazy or possessive suffix
        if matches!(self.peek(), Some(b'?') | Some(b'+')) {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'*') | Some(b'+') | Some(b'?') => {
                Err(self.error(SyntaxKind::NestedQuantifier, self.pos))
            }
            Some(b'{') if self.scan_interval(self.pos).is_some() => {
                Err(self.error(SyntaxKind::NestedQuantifier, self.pos))
            }
            _ => Ok(Some(q)),
        }
    }

    /// Parse `{m}`, `{m,}` or `{m,n}` at the cursor. Anything else is not an
    /// interval and leaves the cursor untouched.
    fn parse_interval(&mut self) -> Result<Option<Quantifier>, PatternError> {
        let start = self.pos;
        let Some((min, max, end)) = self.scan_interval(start) else {
            return Ok(None);
        };
        if min > MAX_REPEAT_NUM || max.is_some_and(|m| m > MAX_REPEAT_NUM) {
            return Err(self.error(SyntaxKind::RepeatTooLarge, start));
        }
        if max.is_some_and(|m| m < min) {
            return Err(self.error(SyntaxKind::InvalidRepeatRange, start));
        }
        self.pos = end;
        Ok(Some(Quantifier { min, max }))
    }

    fn scan_interval(&self, at: usize) -> Option<(u32, Option<u32>, usize)> {
        if self.pattern.get(at) != Some(&b'{') {
            return None;
        }
        let mut p = at + 1;
        let min = scan_number(&mut p, self.pattern)?;
        let max = match self.pattern.get(p) {
            Some(b'}') => Some(min),
            Some(b',') => {
                p += 1;
                scan_number(&mut p, self.pattern)
            }
            _ => return None,
        };
        if self.pattern.get(p) != Some(&b'}') {
            return None;
        }
        Some((min, max, p + 1))
    }

    // === Escapes ===

    fn parse_escape(&mut self) -> Result<Atom, PatternError> {
        let start = self.pos;
        self.pos += 1;
        let Some(c) = self.peek() else {
            return Err(self.error(SyntaxKind::TrailingBackslash, start));
        };
        if let Some(set) = escape_class(c) {
            self.pos += 1;
            return Ok(Atom::Set(set));
        }
        if c >= 0x80 {
            return Ok(self.parse_char());
        }
        self.pos += 1;

        let atom = match c {
            b'b' | b'B' | b'A' | b'z' | b'Z' | b'G' | b'K' => Atom::Disabled,
            b'X' | b'R' | b'N' | b'C' => Atom::Disabled,
            b'p' | b'P' => {
                self.skip_property(start)?;
                Atom::Disabled
            }
            b'Q' => {
                let from = self.pos;
                let to = match memchr::memmem::find(&self.pattern[from..], b"\\E") {
                    Some(i) => {
                        self.pos = from + i + 2;
                        from + i
                    }
                    None => {
                        self.pos = self.pattern.len();
                        self.pattern.len()
                    }
                };
                if to == from {
                    Atom::Nothing
                } else {
                    Atom::Quoted(from..to)
                }
            }
            b'E' => Atom::Nothing,
            b'c' => code_atom(self.parse_control(start)?),
            b'0' => {
                let mut value = 0;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                code_atom(value)
            }
            b'1'..=b'9' => {
                // backreference
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
                Atom::Disabled
            }
            b'g' => {
                self.skip_reference(start, true)?;
                Atom::Disabled
            }
            b'k' => {
                self.skip_reference(start, false)?;
                Atom::Disabled
            }
            b'o' => code_atom(self.parse_braced(8, start)?),
            b'x' => code_atom(self.parse_hex_escape(start)?),
            b'u' => match self.parse_unicode_escape() {
                Some(value) => code_atom(value),
                None => Atom::Char(CharBytes::from_slice(b"u")),
            },
            _ => match simple_escape(c) {
                Some(value) => Atom::Char(CharBytes::from_slice(&[value])),
                None => Atom::Char(CharBytes::from_slice(&[c])),
            },
        };
        Ok(atom)
    }

    /// `\cX`: the cursor is after `c`.
    fn parse_control(&mut self, start: usize) -> Result<u32, PatternError> {
        match self.peek() {
            Some(x) if x.is_ascii_graphic() || x == b' ' => {
                self.pos += 1;
                Ok(u32::from(x.to_ascii_uppercase() ^ 0x40))
            }
            _ => Err(self.error(SyntaxKind::InvalidEscape, start)),
        }
    }

    /// `\xhh` or `\x{h...}`: the cursor is after `x`.
    fn parse_hex_escape(&mut self, start: usize) -> Result<u32, PatternError> {
        if self.peek() == Some(b'{') {
            return self.parse_braced(16, start);
        }
        let mut p = self.pos;
        match scan_hexadecimal_number(&mut p, self.pattern, 2) {
            Some(value) => {
                self.pos = p;
                Ok(value)
            }
            None => Err(self.error(SyntaxKind::InvalidEscape, start)),
        }
    }

    /// `\uhhhh`: exactly four hex digits, otherwise not a code escape.
    fn parse_unicode_escape(&mut self) -> Option<u32> {
        let mut p = self.pos;
        let value = scan_hexadecimal_number(&mut p, self.pattern, 4)?;
        if p - self.pos != 4 {
            return None;
        }
        self.pos = p;
        Some(value)
    }

    /// `{digits}` in the given radix: the cursor is on `{`.
    fn parse_braced(&mut self, radix: u32, start: usize) -> Result<u32, PatternError> {
        if self.peek() != Some(b'{') {
            return Err(self.error(SyntaxKind::InvalidEscape, start));
        }
        let mut p = self.pos + 1;
        let value = match radix {
            8 => scan_octal_number(&mut p, self.pattern, 11),
            _ => scan_hexadecimal_number(&mut p, self.pattern, 8),
        };
        match (value, self.pattern.get(p)) {
            (Some(value), Some(b'}')) if value <= 0x10FFFF => {
                self.pos = p + 1;
                Ok(value)
            }
            _ => Err(self.error(SyntaxKind::InvalidEscape, start)),
        }
    }

    /// `\p{..}`, `\P{..}`, `\pL`: the cursor is after `p`.
    fn skip_property(&mut self, start: usize) -> Result<(), PatternError> {
        match self.peek() {
            Some(b'{') => self.skip_delimited(b'}', start),
            Some(c) if c.is_ascii_alphabetic() => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(SyntaxKind::InvalidEscape, start)),
        }
    }

    /// `\g` and `\k` references: the cursor is after the letter.
    fn skip_reference(&mut self, start: usize, numeric: bool) -> Result<(), PatternError> {
        match self.peek() {
            Some(b'{') => self.skip_delimited(b'}', start),
            Some(b'<') => self.skip_delimited(b'>', start),
            Some(b'\'') => self.skip_delimited(b'\'', start),
            Some(b'+' | b'-' | b'0'..=b'9') if numeric => {
                self.pos += 1;
                let digits = self.pos;
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
                if self.pos == digits && !self.pattern[digits - 1].is_ascii_digit() {
                    return Err(self.error(SyntaxKind::InvalidEscape, start));
                }
                Ok(())
            }
            _ => Err(self.error(SyntaxKind::InvalidEscape, start)),
        }
    }

    /// Skip an opener at the cursor and a non-empty body up to `close`.
    fn skip_delimited(&mut self, close: u8, start: usize) -> Result<(), PatternError> {
        let body = self.pos + 1;
        match memchr::memchr(close, &self.pattern[body.min(self.pattern.len())..]) {
            Some(len) if len > 0 => {
                self.pos = body + len + 1;
                Ok(())
            }
            _ => Err(self.error(SyntaxKind::InvalidEscape, start)),
        }
    }

    // === Groups ===

    fn parse_group(&mut self) -> Result<Atom, PatternError> {
        let start = self.pos;
        self.pos += 1;
        match self.peek() {
            Some(b'*') => return self.skip_verb(start),
            Some(b'?') => self.pos += 1,
            _ => return self.parse_group_body(start, self.flags).map(Atom::Node),
        }

        let Some(c) = self.peek() else {
            return Err(self.error(SyntaxKind::UnmatchedOpenParen, start));
        };
        match c {
            b'#' => match memchr::memchr(b')', &self.pattern[self.pos..]) {
                Some(len) => {
                    self.pos += len + 1;
                    Ok(Atom::Nothing)
                }
                None => Err(self.error(SyntaxKind::UnmatchedOpenParen, start)),
            },
            b':' | b'>' | b'|' => {
                self.pos += 1;
                self.parse_group_body(start, self.flags).map(Atom::Node)
            }
            b'=' | b'!' => {
                self.pos += 1;
                self.parse_group_body(start, self.flags)?;
                Ok(Atom::Disabled)
            }
            b'<' => match self.peek_at(1) {
                Some(b'=' | b'!') => {
                    self.pos += 2;
                    self.parse_group_body(start, self.flags)?;
                    Ok(Atom::Disabled)
                }
                _ => {
                    self.skip_group_name(b'>', start)?;
                    self.parse_group_body(start, self.flags).map(Atom::Node)
                }
            },
            b'\'' => {
                self.skip_group_name(b'\'', start)?;
                self.parse_group_body(start, self.flags).map(Atom::Node)
            }
            b'P' => match self.peek_at(1) {
                Some(b'<') => {
                    self.pos += 1;
                    self.skip_group_name(b'>', start)?;
                    self.parse_group_body(start, self.flags).map(Atom::Node)
                }
                Some(b'=' | b'>') => self.skip_to_close(start),
                _ => Err(self.error(SyntaxKind::InvalidGroup, start)),
            },
            b'R' | b'&' | b'0'..=b'9' => self.skip_to_close(start),
            b'+' | b'-' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.skip_to_close(start),
            b'(' => self.skip_conditional(start),
            _ => self.parse_option_group(start),
        }
    }

    fn parse_group_body(&mut self, start: usize, flags: Flags) -> Result<NodeId, PatternError> {
        if self.depth >= PARSE_DEPTH_LIMIT {
            return Err(self.error(SyntaxKind::DepthLimit, start));
        }
        self.depth += 1;
        let saved = self.flags;
        self.flags = flags;
        let node = self.parse_alternatives();
        self.flags = saved;
        self.depth -= 1;
        let node = node?;

        if self.peek() != Some(b')') {
            return Err(self.error(SyntaxKind::UnmatchedOpenParen, start));
        }
        self.pos += 1;
        Ok(node)
    }

    /// `(?flags)` or `(?flags:...)`: the cursor is on the first flag.
    fn parse_option_group(&mut self, start: usize) -> Result<Atom, PatternError> {
        let mut on = true;
        let mut flags = self.flags;
        while let Some(c) = self.peek() {
            match c {
                b'-' => on = false,
                b'x' => flags.extended = on,
                b'i' => flags.caseless = on,
                b'm' | b's' | b'n' | b'U' | b'J' | b'u' | b'a' => {}
                b')' => {
                    self.pos += 1;
                    self.flags = flags;
                    return Ok(Atom::Disabled);
                }
                b':' => {
                    self.pos += 1;
                    return self.parse_group_body(start, flags).map(Atom::Node);
                }
                _ => return Err(self.error(SyntaxKind::InvalidGroup, start)),
            }
            self.pos += 1;
        }
        Err(self.error(SyntaxKind::UnmatchedOpenParen, start))
    }

    /// Named group opener: the cursor is on the byte before the name.
    fn skip_group_name(&mut self, close: u8, start: usize) -> Result<(), PatternError> {
        let name = self.pos + 1;
        let rest = self.pattern.get(name..).unwrap_or_default();
        let len = rest
            .iter()
            .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_'))
            .unwrap_or(rest.len());
        if len == 0 || rest.get(len) != Some(&close) {
            return Err(self.error(SyntaxKind::InvalidGroup, start));
        }
        self.pos = name + len + 1;
        Ok(())
    }

    /// Reference-like groups with no nested pattern: `(?P=name)`, `(?R)`, `(?1)`.
    fn skip_to_close(&mut self, start: usize) -> Result<Atom, PatternError> {
        match memchr::memchr(b')', &self.pattern[self.pos..]) {
            Some(len) => {
                self.pos += len + 1;
                Ok(Atom::Disabled)
            }
            None => Err(self.error(SyntaxKind::UnmatchedOpenParen, start)),
        }
    }

    /// `(*VERB)` or `(*VERB:arg)`.
    fn skip_verb(&mut self, start: usize) -> Result<Atom, PatternError> {
        let name = self.pos + 1;
        let ok = self.pattern.get(name).is_some_and(|b| b.is_ascii_alphabetic() || *b == b':');
        if !ok {
            return Err(self.error(SyntaxKind::InvalidGroup, start));
        }
        self.skip_to_close(start)
    }

    /// `(?(cond)yes|no)`: skipped as one balanced unit.
    fn skip_conditional(&mut self, start: usize) -> Result<Atom, PatternError> {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                b'\\' => self.pos += 1,
                b'[' => {
                    self.pos = self.skip_class_text(self.pos);
                    continue;
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(Atom::Disabled);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error(SyntaxKind::UnmatchedOpenParen, start))
    }

    /// Position after the bracket expression starting at `at`, or the end of
    /// the pattern when it is unterminated.
    fn skip_class_text(&self, at: usize) -> usize {
        let mut p = at + 1;
        if self.pattern.get(p) == Some(&b'^') {
            p += 1;
        }
        if self.pattern.get(p) == Some(&b']') {
            p += 1;
        }
        while let Some(&c) = self.pattern.get(p) {
            match c {
                b'\\' => p += 2,
                b']' => return p + 1,
                _ => p += 1,
            }
        }
        self.pattern.len()
    }

    // === Character classes ===

    fn parse_class(&mut self) -> Result<Atom, PatternError> {
        let start = self.pos;
        self.pos += 1;
        let negated = self.peek() == Some(b'^');
        if negated {
            self.pos += 1;
        }

        let mut set = CharSet::new();
        let mut opaque = false;
        let mut first = true;
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error(SyntaxKind::UnterminatedClass, start));
            };
            if c == b']' && !first {
                self.pos += 1;
                break;
            }
            first = false;

            match self.parse_class_member(start)? {
                ClassMember::Byte(lo) => {
                    let is_range = self.peek() == Some(b'-')
                        && self.peek_at(1).is_some_and(|c| c != b']');
                    if !is_range {
                        set.insert(lo);
                        continue;
                    }
                    let dash = self.pos;
                    self.pos += 1;
                    match self.parse_class_member(start)? {
                        ClassMember::Byte(hi) if hi >= lo => set.insert_range(lo, hi),
                        ClassMember::Opaque => opaque = true,
                        _ => return Err(self.error(SyntaxKind::InvalidRange, dash)),
                    }
                }
                ClassMember::Set(members) => set.union(&members),
                ClassMember::Opaque => opaque = true,
                ClassMember::Nothing => {}
            }
        }

        if opaque {
            return Ok(Atom::Disabled);
        }
        if negated {
            set.negate();
        }
        Ok(Atom::Set(set))
    }

    fn parse_class_member(&mut self, class_start: usize) -> Result<ClassMember, PatternError> {
        let Some(c) = self.peek() else {
            return Err(self.error(SyntaxKind::UnterminatedClass, class_start));
        };
        match c {
            b'[' if self.peek_at(1) == Some(b':') => {
                if let Some(member) = self.parse_posix_bracket()? {
                    return Ok(member);
                }
                self.pos += 1;
                Ok(ClassMember::Byte(b'['))
            }
            b'\\' => self.parse_class_escape(class_start),
            _ if c >= 0x80 => {
                self.parse_char();
                Ok(ClassMember::Opaque)
            }
            _ => {
                self.pos += 1;
                Ok(ClassMember::Byte(c))
            }
        }
    }

    /// `[:name:]` or `[:^name:]` at the cursor. Returns `None` (cursor
    /// untouched) when the text is not a bracket expression.
    fn parse_posix_bracket(&mut self) -> Result<Option<ClassMember>, PatternError> {
        let mut p = self.pos + 2;
        let negated = self.pattern.get(p) == Some(&b'^');
        if negated {
            p += 1;
        }
        let name_start = p;
        while self.pattern.get(p).is_some_and(|b| b.is_ascii_alphabetic()) {
            p += 1;
        }
        if self.pattern.get(p..p + 2) != Some(b":]".as_slice()) {
            return Ok(None);
        }
        let Some(mut set) = posix_class(&self.pattern[name_start..p]) else {
            return Err(self.error(SyntaxKind::UnknownPosixClass, self.pos));
        };
        if negated {
            set.negate();
        }
        self.pos = p + 2;
        Ok(Some(ClassMember::Set(set)))
    }

    fn parse_class_escape(&mut self, class_start: usize) -> Result<ClassMember, PatternError> {
        let start = self.pos;
        self.pos += 1;
        let Some(c) = self.peek() else {
            return Err(self.error(SyntaxKind::UnterminatedClass, class_start));
        };
        if let Some(set) = escape_class(c) {
            self.pos += 1;
            return Ok(ClassMember::Set(set));
        }
        if c >= 0x80 {
            self.parse_char();
            return Ok(ClassMember::Opaque);
        }
        self.pos += 1;

        let value = match c {
            b'b' => 0x08,
            b'c' => self.parse_control(start)?,
            b'0'..=b'7' => {
                let mut p = self.pos - 1;
                let value = scan_octal_number(&mut p, self.pattern, 3).unwrap_or(0);
                self.pos = p;
                value
            }
            b'x' => self.parse_hex_escape(start)?,
            b'o' => self.parse_braced(8, start)?,
            b'u' => self.parse_unicode_escape().unwrap_or(u32::from(b'u')),
            b'p' | b'P' => {
                self.skip_property(start)?;
                return Ok(ClassMember::Opaque);
            }
            b'N' | b'R' | b'X' => return Ok(ClassMember::Opaque),
            b'E' => return Ok(ClassMember::Nothing),
            b'Q' => return Ok(self.parse_class_quote()),
            _ => u32::from(simple_escape(c).unwrap_or(c)),
        };
        if value < 0x80 {
            Ok(ClassMember::Byte(value as u8))
        } else {
            Ok(ClassMember::Opaque)
        }
    }

    /// `\Q...\E` inside a class: the cursor is after `Q`.
    fn parse_class_quote(&mut self) -> ClassMember {
        let from = self.pos;
        let to = match memchr::memmem::find(&self.pattern[from..], b"\\E") {
            Some(i) => {
                self.pos = from + i + 2;
                from + i
            }
            None => {
                self.pos = self.pattern.len();
                self.pattern.len()
            }
        };
        let quoted = &self.pattern[from..to];
        if !quoted.is_ascii() {
            return ClassMember::Opaque;
        }
        let mut set = CharSet::new();
        for &b in quoted {
            set.insert(b);
        }
        ClassMember::Set(set)
    }
}

/// Character atom for a numeric escape; values beyond ASCII are ambiguous
/// between byte and code point semantics and are not indexed.
fn code_atom(value: u32) -> Atom {
    if value < 0x80 {
        Atom::Char(CharBytes::from_slice(&[value as u8]))
    } else {
        Atom::Disabled
    }
}

/// Single-letter escapes standing for control characters.
fn simple_escape(c: u8) -> Option<u8> {
    match c {
        b'a' => Some(0x07),
        b'e' => Some(0x1B),
        b'f' => Some(0x0C),
        b'n' => Some(b'\n'),
        b'r' => Some(b'\r'),
        b't' => Some(b'\t'),
        _ => None,
    }
}

/// Decimal number at `p`; `None` if there is no digit. Saturates on overflow.
fn scan_number(p: &mut usize, pattern: &[u8]) -> Option<u32> {
    let start = *p;
    let mut num: u32 = 0;
    while let Some(&c) = pattern.get(*p) {
        if !c.is_ascii_digit() {
            break;
        }
        num = num.saturating_mul(10).saturating_add(u32::from(c - b'0'));
        *p += 1;
    }
    (*p > start).then_some(num)
}

/// Up to `maxlen` hex digits at `p`; `None` if there is none.
fn scan_hexadecimal_number(p: &mut usize, pattern: &[u8], maxlen: usize) -> Option<u32> {
    let start = *p;
    let mut num: u32 = 0;
    while *p - start < maxlen {
        let Some(d) = pattern.get(*p).and_then(|c| (*c as char).to_digit(16)) else {
            break;
        };
        num = num.saturating_mul(16).saturating_add(d);
        *p += 1;
    }
    (*p > start).then_some(num)
}

/// Up to `maxlen` octal digits at `p`; `None` if there is none.
fn scan_octal_number(p: &mut usize, pattern: &[u8], maxlen: usize) -> Option<u32> {
    let start = *p;
    let mut num: u32 = 0;
    while *p - start < maxlen {
        let Some(d) = pattern.get(*p).and_then(|c| (*c as char).to_digit(8)) else {
            break;
        };
        num = num.saturating_mul(8).saturating_add(d);
        *p += 1;
    }
    (*p > start).then_some(num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    fn render(tree: &PatternTree, id: NodeId) -> String {
        let node = tree.node(id);
        let join = |children: &[NodeId], sep: &str| {
            children
                .iter()
                .map(|c| render(tree, *c))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match node.kind() {
            NodeKind::Leaf if node.is_disabled() => "_".to_string(),
            NodeKind::Leaf => String::from_utf8_lossy(tree.literal(id)).into_owned(),
            NodeKind::And => format!("({})", join(node.and_children(), " ")),
            NodeKind::Or => format!("{{{}}}", join(node.or_children(), "|")),
        }
    }

    fn shape_with(pattern: &str, expansion: bool) -> String {
        let mut tree = PatternTree::new();
        tree.compile(pattern, expansion).unwrap();
        tree.merge().unwrap();
        render(&tree, tree.root().unwrap())
    }

    fn shape(pattern: &str) -> String {
        shape_with(pattern, true)
    }

    fn shape_case_sensitive(pattern: &str) -> String {
        let mut tree = PatternTree::new();
        tree.set_case_sensitive(true);
        tree.compile(pattern, true).unwrap();
        tree.merge().unwrap();
        render(&tree, tree.root().unwrap())
    }

    fn syntax_error(pattern: &str) -> (SyntaxKind, usize) {
        let mut tree = PatternTree::new();
        match tree.compile(pattern, true) {
            Err(PatternError::Syntax { kind, offset, .. }) => (kind, offset),
            other => panic!("expected syntax error for {pattern:?}, got {other:?}"),
        }
    }

    // === Literals and escapes ===

    #[test]
    fn plain_literals() {
        assert_eq!(shape("abc"), "abc");
        assert_eq!(shape("ab|cd"), "{ab|cd}");
        assert_eq!(shape("a{,3}"), "a{,3}");
        assert_eq!(shape("a}b]"), "a}b]");
        assert_eq!(shape("caf\u{e9}"), "caf\u{e9}");
    }

    #[test]
    fn character_escapes() {
        assert_eq!(shape("a\\tb"), "a\tb");
        assert_eq!(shape("\\x41\\x{42}\\o{103}"), "ABC");
        assert_eq!(shape("\\cA"), "\u{1}");
        assert_eq!(shape("\\011x"), "\tx");
        assert_eq!(shape("\\u0041b"), "Ab");
        assert_eq!(shape("a\\.b\\/c"), "a.b/c");
        assert_eq!(shape("ab\\xe9"), "(ab _)");
    }

    #[test]
    fn quoting() {
        assert_eq!(shape("\\Qa.b\\E+"), "(a.b _)");
        assert_eq!(shape("x\\Q(*)"), "x(*)");
        assert_eq!(shape("a\\Q\\Eb"), "ab");
    }

    #[test]
    fn zero_width_and_references() {
        assert_eq!(shape("^abc$"), "(_ abc _)");
        assert_eq!(shape("\\bword\\b"), "(_ word _)");
        assert_eq!(shape("(a)\\1"), "(a _)");
        assert_eq!(shape("(?<n>ab)\\k<n>"), "(ab _)");
        assert_eq!(shape("ab\\g{-1}"), "(ab _)");
        assert_eq!(shape("\\p{Greek}xy"), "(_ xy)");
    }

    // === Quantifiers ===

    #[test]
    fn optional_becomes_alternative() {
        assert_eq!(shape("ab?c"), "(a {b|} c)");
        assert_eq!(shape("x(yz)?"), "(x {yz|})");
    }

    #[test]
    fn zero_minimum_disables() {
        assert_eq!(shape("a{0}bc"), "(_ bc)");
        assert_eq!(shape("ab*c"), "(a _ c)");
        assert_eq!(shape("a(bc)*?d"), "(a _ d)");
    }

    #[test]
    fn positive_minimum_keeps_atom() {
        assert_eq!(shape("ab+c"), "(ab _ c)");
        assert_eq!(shape("a{3}"), "aaa");
        assert_eq!(shape("ab{1}c"), "abc");
        assert_eq!(shape("a(bc){2,}"), "(abc _)");
    }

    // === Classes ===

    #[test]
    fn classes_expand() {
        assert_eq!(shape("[abc]"), "{a|b|c}");
        assert_eq!(shape("[a]x"), "ax");
        assert_eq!(shape("x[a-c]"), "(x {a|b|c})");
        assert_eq!(shape("\\d"), "{0|1|2|3|4|5|6|7|8|9}");
        assert_eq!(shape("x[[:digit:]]"), "(x {0|1|2|3|4|5|6|7|8|9})");
        assert_eq!(shape("[\\]]"), "]");
        assert_eq!(shape("[]a]"), "{]|a}");
        assert_eq!(shape("[a-]"), "{-|a}");
    }

    #[test]
    fn classes_without_expansion() {
        assert_eq!(shape_with("[a-c]x", false), "(_ x)");
        assert_eq!(shape_with("\\dx", false), "(_ x)");
        // a single member is still a literal
        assert_eq!(shape_with("[a]x", false), "ax");
    }

    #[test]
    fn opaque_classes_disable() {
        assert_eq!(shape("ab[\u{e9}x]"), "(ab _)");
        assert_eq!(shape("ab[\\p{L}]"), "(ab _)");
        assert_eq!(shape("ab."), "(ab _)");
    }

    #[test]
    fn negated_classes_disable() {
        assert_eq!(shape("x[^a]y"), "(x _ y)");
        assert_eq!(shape("a\\Sb"), "(a _ b)");
        assert_eq!(shape("a\\Wb"), "(a _ b)");
        assert_eq!(shape("ab\\D"), "(ab _)");
        assert_eq!(shape("ab[[:^digit:]]"), "(ab _)");
        assert_eq!(shape("ab[^\\x00-\\x7f]"), "(ab _)");
    }

    #[test]
    fn horizontal_space_is_not_expanded() {
        assert_eq!(shape("a\\hb"), "(a _ b)");
        assert_eq!(shape("a[\\h]b"), "(a _ b)");
    }

    // === Groups ===

    #[test]
    fn groups_splice_in() {
        assert_eq!(shape("a(bc)d"), "abcd");
        assert_eq!(shape("(?:ab|cd)e"), "({ab|cd} e)");
        assert_eq!(shape("(?<name>ab)c"), "abc");
        assert_eq!(shape("(?P<name>ab)c"), "abc");
        assert_eq!(shape("(?'name'ab)c"), "abc");
        assert_eq!(shape("(?>ab)c"), "abc");
        assert_eq!(shape("(?i:ab)c"), "abc");
    }

    #[test]
    fn lookaround_and_options_disable() {
        assert_eq!(shape("(?=abc)def"), "(_ def)");
        assert_eq!(shape("abc(?<!x)"), "(abc _)");
        assert_eq!(shape("(?i)abc"), "(_ abc)");
        assert_eq!(shape("(?(1)a|b)cd"), "(_ cd)");
        assert_eq!(shape("(*UTF8)abc"), "(_ abc)");
        assert_eq!(shape("(?R)ab"), "(_ ab)");
        assert_eq!(shape("a(?#comment)b"), "ab");
    }

    #[test]
    fn caseless_scopes() {
        // Folding automaton: letters stay literal.
        assert_eq!(shape("(?i)abc"), "(_ abc)");
        assert_eq!(shape("(?i)caf\u{e9}"), "(_ caf _)");

        assert_eq!(shape_case_sensitive("(?i)ab"), "(_ {A|a} {B|b})");
        assert_eq!(shape_case_sensitive("(?i:x)y"), "({X|x} y)");
        assert_eq!(shape_case_sensitive("(?i)[a-b]1"), "(_ {A|B|a|b} 1)");
        assert_eq!(shape_case_sensitive("(?i)\\Q12\\Eab"), "(_ 12 {A|a} {B|b})");
        assert_eq!(shape_case_sensitive("ab(?i:\\Qcd\\E)"), "(ab _)");
        assert_eq!(shape_case_sensitive("((?i)a)bc"), "(_ {A|a} bc)");
        assert_eq!(shape_case_sensitive("(?i)a(?-i)bc"), "(_ {A|a} _ bc)");
    }

    #[test]
    fn extended_mode() {
        assert_eq!(shape("(?x) a b # comment\n c"), "(_ abc)");
        assert_eq!(shape("(?x: a b ) c"), "ab c");
    }

    // === Errors ===

    #[test]
    fn syntax_errors() {
        assert_eq!(syntax_error("(ab"), (SyntaxKind::UnmatchedOpenParen, 0));
        assert_eq!(syntax_error("ab)"), (SyntaxKind::UnmatchedCloseParen, 2));
        assert_eq!(syntax_error("[ab"), (SyntaxKind::UnterminatedClass, 0));
        assert_eq!(syntax_error("[z-a]"), (SyntaxKind::InvalidRange, 2));
        assert_eq!(syntax_error("ab\\"), (SyntaxKind::TrailingBackslash, 2));
        assert_eq!(syntax_error("*a"), (SyntaxKind::NothingToRepeat, 0));
        assert_eq!(syntax_error("a|{2}"), (SyntaxKind::NothingToRepeat, 2));
        assert_eq!(syntax_error("a**"), (SyntaxKind::NestedQuantifier, 2));
        assert_eq!(syntax_error("a{3,2}"), (SyntaxKind::InvalidRepeatRange, 1));
        assert_eq!(syntax_error("a{200000}"), (SyntaxKind::RepeatTooLarge, 1));
        assert_eq!(syntax_error("\\x{zz}"), (SyntaxKind::InvalidEscape, 0));
        assert_eq!(syntax_error("\\xq"), (SyntaxKind::InvalidEscape, 0));
        assert_eq!(syntax_error("\\c"), (SyntaxKind::InvalidEscape, 0));
        assert_eq!(syntax_error("\\k"), (SyntaxKind::InvalidEscape, 0));
        assert_eq!(syntax_error("[[:foo:]]"), (SyntaxKind::UnknownPosixClass, 1));
        assert_eq!(syntax_error("(?Q)"), (SyntaxKind::InvalidGroup, 0));
        assert_eq!(syntax_error("(?<=ab"), (SyntaxKind::UnmatchedOpenParen, 0));
    }

    #[test]
    fn lazy_and_possessive_suffixes() {
        assert_eq!(shape("ab+?c"), "(ab _ c)");
        assert_eq!(shape("ab++c"), "(ab _ c)");
        assert_eq!(shape("ab??c"), "(a {b|} c)");
        assert_eq!(syntax_error("ab???"), (SyntaxKind::NestedQuantifier, 4));
    }

    #[test]
    fn depth_limit() {
        let depth = PARSE_DEPTH_LIMIT as usize + 1;
        let pattern = format!("{}a{}", "(".repeat(depth), ")".repeat(depth));
        let (kind, _) = syntax_error(&pattern);
        assert_eq!(kind, SyntaxKind::DepthLimit);

        let depth = 32;
        let pattern = format!("{}ab{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(shape(&pattern), "ab");
    }

    #[test]
    fn scan_helpers() {
        let mut p = 0;
        assert_eq!(scan_number(&mut p, b"123x"), Some(123));
        assert_eq!(p, 3);
        let mut p = 0;
        assert_eq!(scan_number(&mut p, b"x"), None);
        let mut p = 0;
        assert_eq!(scan_hexadecimal_number(&mut p, b"fFz", 8), Some(0xff));
        let mut p = 0;
        assert_eq!(scan_octal_number(&mut p, b"1778", 3), Some(0o177));
        assert_eq!(p, 3);
    }
}
