// automaton.rs - Aho-Corasick automaton over decoded bytes.
//
// Keys are inserted into a sparse trie (`add`/`add_with`), then `compile`
// derives fail links, output chains and a dense 256-column goto table.
// A compiled automaton is read-only; scanning borrows it immutably.

use std::collections::VecDeque;
use std::fmt;

use smallvec::SmallVec;
use tracing::debug;

use crate::arena::{arena_index, Arena, ByteArena, Span};
use crate::charclass::is_word_byte;
use crate::decode::{next_letter, DecodeMode, Letters};
use crate::error::AutomatonError;

arena_index! {
    /// State of an [`Automaton`]; the root is state 0.
    pub struct StateId;
}

arena_index! {
    /// Terminal of an [`Automaton`], one per distinct key.
    pub struct EndId;
}

arena_index! {
    /// Caller-assigned key identifier.
    pub struct PatternId;
}

const ROOT: StateId = StateId::new(0);

/// Alphabet and case handling of an [`Automaton`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutomatonConfig {
    /// Fold ASCII letters to upper case in keys and text.
    pub case_insensitive: bool,
    /// Smallest letter a key may contain (after folding).
    pub min_letter: u8,
    /// Largest letter a key may contain (after folding).
    pub max_letter: u8,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        AutomatonConfig {
            case_insensitive: true,
            min_letter: 0,
            max_letter: 255,
        }
    }
}

#[derive(Clone, Debug)]
struct TrieNode {
    parent: Option<StateId>,
    letter: u8,
    depth: u32,
    /// Sorted by letter.
    children: SmallVec<[(u8, StateId); 2]>,
    fail: Option<StateId>,
    /// Next terminal state along the fail chain.
    output: Option<StateId>,
    end: Option<EndId>,
}

impl TrieNode {
    fn new(parent: Option<StateId>, letter: u8, depth: u32) -> Self {
        TrieNode {
            parent,
            letter,
            depth,
            children: SmallVec::new(),
            fail: None,
            output: None,
            end: None,
        }
    }

    #[inline]
    fn child(&self, letter: u8) -> Option<StateId> {
        self.children
            .binary_search_by_key(&letter, |(l, _)| *l)
            .ok()
            .map(|i| self.children[i].1)
    }
}

/// Data attached to one terminal state.
#[derive(Clone, Debug)]
pub struct EndNode<V> {
    state: StateId,
    key: Span,
    id: PatternId,
    value: V,
    whole_word: bool,
}

impl<V> EndNode<V> {
    /// Pattern id of the first insertion.
    pub fn id(&self) -> PatternId {
        self.id
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn whole_word(&self) -> bool {
        self.whole_word
    }
}

/// A match reported by [`Automaton::search`].
#[derive(Debug)]
pub struct Hit<'a, V> {
    /// Raw offset of the first letter of the match.
    pub offset: usize,
    /// Raw offset just past the last letter of the match.
    pub end: usize,
    /// The key as first inserted.
    pub key: &'a [u8],
    pub id: PatternId,
    pub value: &'a V,
    pub terminal: EndId,
}

/// Owned form of a [`Hit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrieHit {
    pub offset: usize,
    pub end: usize,
    pub id: PatternId,
    pub terminal: EndId,
}

/// One stored key, yielded by [`Automaton::iter`].
#[derive(Debug)]
pub struct Terminal<'a, V> {
    pub key: &'a [u8],
    pub id: PatternId,
    pub value: &'a V,
    pub whole_word: bool,
}

/// Multi-key automaton with a value of type `V` per distinct key.
#[derive(Clone, Debug)]
pub struct Automaton<V = PatternId> {
    config: AutomatonConfig,
    nodes: Arena<StateId, TrieNode>,
    ends: Arena<EndId, EndNode<V>>,
    keys: ByteArena,
    moves: Vec<[StateId; 256]>,
    compiled: bool,
    insertions: usize,
    min_len: usize,
    max_len: usize,
}

impl<V> Default for Automaton<V> {
    fn default() -> Self {
        Self::new(AutomatonConfig::default())
    }
}

impl<V> Automaton<V> {
    pub fn new(config: AutomatonConfig) -> Self {
        let mut nodes = Arena::new();
        nodes.alloc(TrieNode::new(None, 0, 0));
        Automaton {
            config,
            nodes,
            ends: Arena::new(),
            keys: ByteArena::new(),
            moves: Vec::new(),
            compiled: false,
            insertions: 0,
            min_len: 0,
            max_len: 0,
        }
    }

    pub fn config(&self) -> &AutomatonConfig {
        &self.config
    }

    #[inline]
    fn fold(&self, letter: u8) -> u8 {
        if self.config.case_insensitive {
            letter.to_ascii_uppercase()
        } else {
            letter
        }
    }

    /// Check that `key` can be inserted without touching the trie.
    pub fn validate(&self, key: &[u8]) -> Result<(), AutomatonError> {
        if key.is_empty() {
            return Err(AutomatonError::EmptyKey);
        }
        let (lo, hi) = (self.config.min_letter, self.config.max_letter);
        for (position, &b) in key.iter().enumerate() {
            let letter = self.fold(b);
            if letter < lo || letter > hi {
                return Err(AutomatonError::Alphabet { byte: b, position });
            }
        }
        Ok(())
    }

    /// Walk or extend the trie along `key`; returns the terminal state.
    fn insert_path(&mut self, key: &[u8]) -> Result<StateId, AutomatonError> {
        self.validate(key)?;
        let mut state = ROOT;
        for &b in key {
            let letter = self.fold(b);
            state = match self.nodes[state].child(letter) {
                Some(next) => next,
                None => {
                    let depth = self.nodes[state].depth + 1;
                    let next = self.nodes.alloc(TrieNode::new(Some(state), letter, depth));
                    let children = &mut self.nodes[state].children;
                    let at = children.partition_point(|(l, _)| *l < letter);
                    children.insert(at, (letter, next));
                    next
                }
            };
        }
        if self.compiled {
            self.compiled = false;
            self.moves.clear();
        }
        self.insertions += 1;
        Ok(state)
    }

    fn new_terminal(&mut self, state: StateId, key: &[u8], id: PatternId, value: V, whole_word: bool) -> EndId {
        let span = self.keys.push(key);
        let end = self.ends.alloc(EndNode {
            state,
            key: span,
            id,
            value,
            whole_word,
        });
        self.nodes[state].end = Some(end);
        self.min_len = if self.ends.len() == 1 {
            key.len()
        } else {
            self.min_len.min(key.len())
        };
        self.max_len = self.max_len.max(key.len());
        end
    }

    /// Insert `key` for `id`.
    ///
    /// `on_insert` receives the key, the id and the value already stored at
    /// the terminal (`None` on first insertion) and returns the value to
    /// store. Keys sharing a terminal keep the first id and key text; their
    /// `whole_word` flags are and-ed.
    pub fn add_with<F>(&mut self, key: &[u8], id: PatternId, whole_word: bool, on_insert: F) -> Result<EndId, AutomatonError>
    where
        V: Default,
        F: FnOnce(&[u8], PatternId, Option<V>) -> V,
    {
        let state = self.insert_path(key)?;
        match self.nodes[state].end {
            Some(end) => {
                let node = &mut self.ends[end];
                let previous = std::mem::take(&mut node.value);
                node.value = on_insert(key, id, Some(previous));
                node.whole_word &= whole_word;
                Ok(end)
            }
            None => {
                let value = on_insert(key, id, None);
                Ok(self.new_terminal(state, key, id, value, whole_word))
            }
        }
    }

    // === Compilation ===

    /// Build fail links and the goto table.
    pub fn compile(&mut self) -> bool {
        let ok = self.compile_fail() && self.compile_move();
        self.compiled = ok;
        if ok {
            debug!(
                states = self.nodes.len(),
                keys = self.ends.len(),
                "automaton compiled"
            );
        }
        ok
    }

    /// Breadth-first fail links and output chains.
    pub fn compile_fail(&mut self) -> bool {
        let mut queue = VecDeque::with_capacity(self.nodes.len());
        self.nodes[ROOT].fail = None;
        self.nodes[ROOT].output = None;
        for i in 0..self.nodes[ROOT].children.len() {
            let child = self.nodes[ROOT].children[i].1;
            self.nodes[child].fail = Some(ROOT);
            self.nodes[child].output = None;
            queue.push_back(child);
        }

        while let Some(state) = queue.pop_front() {
            for i in 0..self.nodes[state].children.len() {
                let (letter, child) = self.nodes[state].children[i];
                if self.nodes[child].parent != Some(state) {
                    return false;
                }
                let mut cursor = self.nodes[state].fail;
                let fail = loop {
                    match cursor {
                        Some(f) => match self.nodes[f].child(letter) {
                            Some(next) => break next,
                            None => cursor = self.nodes[f].fail,
                        },
                        None => break ROOT,
                    }
                };
                let output = if self.nodes[fail].end.is_some() {
                    Some(fail)
                } else {
                    self.nodes[fail].output
                };
                let node = &mut self.nodes[child];
                node.fail = Some(fail);
                node.output = output;
                queue.push_back(child);
            }
        }
        true
    }

    /// Dense goto table; requires fail links.
    pub fn compile_move(&mut self) -> bool {
        let mut moves = vec![[ROOT; 256]; self.nodes.len()];
        let mut queue = VecDeque::with_capacity(self.nodes.len());
        queue.push_back(ROOT);
        while let Some(state) = queue.pop_front() {
            let node = &self.nodes[state];
            if state != ROOT {
                let Some(fail) = node.fail else {
                    return false;
                };
                moves[state.index()] = moves[fail.index()];
            }
            for &(letter, child) in &node.children {
                moves[state.index()][letter as usize] = child;
                queue.push_back(child);
            }
        }
        self.moves = moves;
        true
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    // === Consistency checks ===

    /// Validate trie shape, fail links, output chains and the goto table.
    pub fn check(&self) -> bool {
        self.check_sibling() && self.check_fail() && self.check_move()
    }

    /// Children sorted, parents and depths consistent.
    pub fn check_sibling(&self) -> bool {
        self.nodes.iter().all(|(id, node)| {
            node.children.windows(2).all(|w| w[0].0 < w[1].0)
                && node.children.iter().all(|&(letter, child)| {
                    let c = &self.nodes[child];
                    c.parent == Some(id) && c.letter == letter && c.depth == node.depth + 1
                })
        })
    }

    /// Every fail target is a proper suffix; output chains are terminal,
    /// strictly shrinking suffixes.
    pub fn check_fail(&self) -> bool {
        if !self.compiled {
            return true;
        }
        self.nodes.iter().all(|(id, node)| {
            if id == ROOT {
                return node.fail.is_none();
            }
            let Some(fail) = node.fail else {
                return false;
            };
            let path = self.path(id);
            if self.nodes[fail].depth >= node.depth || !path.ends_with(&self.path(fail)) {
                return false;
            }
            let mut depth = node.depth;
            let mut out = node.output;
            while let Some(o) = out {
                let target = &self.nodes[o];
                if target.end.is_none() || target.depth >= depth || !path.ends_with(&self.path(o)) {
                    return false;
                }
                depth = target.depth;
                out = target.output;
            }
            true
        })
    }

    /// The goto table agrees with trie edges plus fail links.
    pub fn check_move(&self) -> bool {
        if !self.compiled {
            return true;
        }
        if self.moves.len() != self.nodes.len() {
            return false;
        }
        self.nodes.iter().all(|(id, _)| {
            (0..=255u8).all(|letter| self.moves[id.index()][letter as usize] == self.slow_goto(id, letter))
        })
    }

    fn slow_goto(&self, mut state: StateId, letter: u8) -> StateId {
        loop {
            if let Some(next) = self.nodes[state].child(letter) {
                return next;
            }
            match self.nodes[state].fail {
                Some(fail) => state = fail,
                None => return ROOT,
            }
        }
    }

    fn path(&self, mut state: StateId) -> Vec<u8> {
        let mut path = Vec::with_capacity(self.nodes[state].depth as usize);
        while let Some(parent) = self.nodes[state].parent {
            path.push(self.nodes[state].letter);
            state = parent;
        }
        path.reverse();
        path
    }

    // === Scanning ===

    /// Scan `text`, calling `on_hit` for every occurrence of every key.
    ///
    /// Hits are reported in order of their end offset; several hits ending
    /// at the same letter are reported longest first. Returns true if the
    /// callback stopped the scan by returning true. An automaton that is
    /// not compiled reports nothing.
    pub fn search<F>(&self, text: &[u8], decode: DecodeMode, mut on_hit: F) -> bool
    where
        F: FnMut(&Hit<'_, V>) -> bool,
    {
        if !self.compiled || self.ends.is_empty() {
            return false;
        }
        let mut letters = Letters::new(text, decode);
        let mode = letters.mode();

        // (raw start, folded letter) of the last max_len + 1 letters
        let ring_len = self.max_len + 1;
        let mut ring: Vec<(usize, u8)> = vec![(0, 0); ring_len];

        let mut state = ROOT;
        let mut index = 0usize;
        while let Some((start, raw)) = letters.next() {
            let letter = self.fold(raw);
            ring[index % ring_len] = (start, letter);
            state = self.moves[state.index()][letter as usize];

            let end = letters.position();
            let mut out = if self.nodes[state].end.is_some() {
                Some(state)
            } else {
                self.nodes[state].output
            };
            while let Some(o) = out {
                let node = &self.nodes[o];
                out = node.output;
                let Some(terminal) = node.end else {
                    continue;
                };
                let entry = &self.ends[terminal];
                let depth = node.depth as usize;
                let first = index + 1 - depth;
                if entry.whole_word && !self.at_word_boundary(text, mode, &ring, first, end) {
                    continue;
                }
                let hit = Hit {
                    offset: ring[first % ring_len].0,
                    end,
                    key: self.keys.get(entry.key),
                    id: entry.id,
                    value: &entry.value,
                    terminal,
                };
                if on_hit(&hit) {
                    return true;
                }
            }
            index += 1;
        }
        false
    }

    fn at_word_boundary(&self, text: &[u8], mode: DecodeMode, ring: &[(usize, u8)], first: usize, end: usize) -> bool {
        if first > 0 && is_word_byte(ring[(first - 1) % ring.len()].1) {
            return false;
        }
        if end < text.len() && is_word_byte(next_letter(text, end, mode).0) {
            return false;
        }
        true
    }

    /// First hit in scan order.
    pub fn find_first(&self, text: &[u8], decode: DecodeMode) -> Option<TrieHit> {
        let mut found = None;
        self.search(text, decode, |hit| {
            found = Some(TrieHit::from(hit));
            true
        });
        found
    }

    /// Every hit in scan order.
    pub fn find_all(&self, text: &[u8], decode: DecodeMode) -> Vec<TrieHit> {
        let mut hits = Vec::new();
        self.search(text, decode, |hit| {
            hits.push(TrieHit::from(hit));
            false
        });
        hits
    }

    // === Lookup ===

    fn find_state(&self, key: &[u8]) -> Option<StateId> {
        key.iter().try_fold(ROOT, |state, &b| self.nodes[state].child(self.fold(b)))
    }

    /// Value stored for `key`, if it was inserted.
    pub fn find_key(&self, key: &[u8]) -> Option<&V> {
        let state = self.find_state(key)?;
        let end = self.nodes[state].end?;
        Some(&self.ends[end].value)
    }

    pub fn terminal(&self, id: EndId) -> Option<&EndNode<V>> {
        self.ends.get(id)
    }

    /// Key text of a terminal as first inserted.
    pub fn key(&self, id: EndId) -> &[u8] {
        self.keys.get(self.ends[id].key)
    }

    /// Stored keys in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Terminal<'_, V>> + '_ {
        self.ends.values().map(move |end| Terminal {
            key: self.keys.get(end.key),
            id: end.id,
            value: &end.value,
            whole_word: end.whole_word,
        })
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Number of successful insertions, duplicates included.
    pub fn insertions(&self) -> usize {
        self.insertions
    }

    pub fn state_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn min_length(&self) -> usize {
        self.min_len
    }

    pub fn max_length(&self) -> usize {
        self.max_len
    }

    /// Remove every key.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.alloc(TrieNode::new(None, 0, 0));
        self.ends.clear();
        self.keys.clear();
        self.moves.clear();
        self.compiled = false;
        self.insertions = 0;
        self.min_len = 0;
        self.max_len = 0;
    }

    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
        self.ends.shrink_to_fit();
        self.keys.shrink_to_fit();
        self.moves.shrink_to_fit();
    }

    /// Approximate heap usage in bytes.
    pub fn memory_size(&self) -> usize {
        self.nodes.memory_size()
            + self.ends.memory_size()
            + self.keys.memory_size()
            + self.moves.capacity() * std::mem::size_of::<[StateId; 256]>()
    }
}

impl Automaton<PatternId> {
    /// Insert `key`; a key inserted twice keeps its first id.
    pub fn add(&mut self, key: &[u8], id: PatternId, whole_word: bool) -> Result<EndId, AutomatonError> {
        self.add_with(key, id, whole_word, |_, id, previous| previous.unwrap_or(id))
    }
}

impl Default for PatternId {
    fn default() -> Self {
        PatternId::new(0)
    }
}

impl<V> From<&Hit<'_, V>> for TrieHit {
    fn from(hit: &Hit<'_, V>) -> Self {
        TrieHit {
            offset: hit.offset,
            end: hit.end,
            id: hit.id,
            terminal: hit.terminal,
        }
    }
}

impl<V> fmt::Display for Automaton<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "automaton: {} states, {} keys{}",
            self.nodes.len(),
            self.ends.len(),
            if self.compiled { ", compiled" } else { "" }
        )?;
        for (id, end) in self.ends.iter() {
            let state = &self.nodes[end.state];
            write!(
                f,
                "  {:?} {:?} -> {:?} state {} depth {}",
                id,
                String::from_utf8_lossy(self.keys.get(end.key)),
                end.id,
                end.state.index(),
                state.depth
            )?;
            if end.whole_word {
                f.write_str(" whole-word")?;
            }
            if let Some(fail) = state.fail {
                write!(f, " fail {}", fail.index())?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}
