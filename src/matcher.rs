// matcher.rs - Multi-pattern prefilter built on the automaton.
//
// Each pattern is decomposed into branches. A branch becomes a MatchPiece
// (a cursor over its literals) and one MatchFrame per literal; frames are
// attached to the automaton terminal of their literal. During a scan every
// literal hit walks its frame list and advances the cursors of pieces
// whose next expected literal it is. A piece whose cursor reaches the end
// reports its pattern.
//
// Cursor state lives in a ScanState and is reset lazily: a piece touched
// under an older version restarts only when its first literal is seen.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::arena::{arena_index, Arena};
use crate::automaton::{Automaton, AutomatonConfig, PatternId};
use crate::decode::DecodeMode;
use crate::decompose::{DecomposeOptions, Decomposer, DEFAULT_MAX_BRANCHES, DEFAULT_MIN_KEYWORD_LEN};
use crate::error::{MatchError, PatternError};
use crate::verify::Verifier;

arena_index! {
    /// Index of a [`MatchPiece`].
    pub struct PieceId;
}

arena_index! {
    /// Index of a [`MatchFrame`].
    pub struct FrameId;
}

/// Frames attached to one automaton terminal.
pub type FrameList = SmallVec<[FrameId; 2]>;

/// One branch of a pattern: `size` literals that must be seen in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchPiece {
    size: u32,
    pattern: PatternId,
}

impl MatchPiece {
    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn pattern(&self) -> PatternId {
        self.pattern
    }
}

/// One literal of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchFrame {
    piece: PieceId,
    prev: Option<FrameId>,
    pos: u32,
}

impl MatchFrame {
    pub fn piece(&self) -> PieceId {
        self.piece
    }

    /// The frame of the preceding literal; `None` for the first one.
    pub fn prev(&self) -> Option<FrameId> {
        self.prev
    }

    pub fn position(&self) -> usize {
        self.pos as usize
    }
}

#[derive(Debug)]
struct PatternEntry<P> {
    group: usize,
    source: String,
    payload: P,
    branches: usize,
}

// === Scan state ===

#[derive(Clone, Copy, Debug)]
struct PieceState {
    version: u64,
    /// Position of the last literal seen, -1 before the first.
    cur: i32,
    discarded: bool,
    /// Raw offset of the first literal's hit.
    start: usize,
}

impl PieceState {
    fn fresh(version: u64) -> Self {
        PieceState {
            version,
            cur: -1,
            discarded: false,
            start: 0,
        }
    }
}

impl Default for PieceState {
    fn default() -> Self {
        PieceState::fresh(0)
    }
}

/// Per-scanner cursor state. A default state is fresh for version 0.
#[derive(Clone, Debug, Default)]
pub struct ScanState {
    version: u64,
    pieces: Vec<PieceState>,
    /// Version under which each pattern was last collected by `find_all`.
    reported: Vec<u64>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the most recent scan.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Restart every cursor under `version`.
    pub fn reset(&mut self, version: u64) {
        self.version = version;
        self.pieces.fill(PieceState::fresh(version));
    }

    fn prepare(&mut self, version: u64, pieces: usize) {
        self.version = version;
        if self.pieces.len() < pieces {
            self.pieces.resize(pieces, PieceState::default());
        }
    }
}

/// A pattern whose literals were all seen in order.
#[derive(Debug)]
pub struct PatternMatch<'a, P> {
    pub pattern: PatternId,
    pub payload: &'a P,
    /// Raw offset of the first literal of the completed branch.
    pub offset: usize,
    /// Raw offset just past the last literal.
    pub end: usize,
    /// The last literal.
    pub keyword: &'a [u8],
}

// === Configuration ===

/// Settings shared by every group of a [`Matcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatcherConfig {
    pub groups: usize,
    pub case_insensitive: bool,
    /// Literals only match between non-word letters.
    pub whole_word: bool,
    pub max_branches: u64,
    pub expansion: bool,
    pub min_keyword_len: usize,
    pub min_letter: u8,
    pub max_letter: u8,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            groups: 1,
            case_insensitive: true,
            whole_word: false,
            max_branches: DEFAULT_MAX_BRANCHES,
            expansion: true,
            min_keyword_len: DEFAULT_MIN_KEYWORD_LEN,
            min_letter: 0,
            max_letter: 255,
        }
    }
}

impl MatcherConfig {
    pub fn decompose_options(&self) -> DecomposeOptions {
        DecomposeOptions {
            max_branches: self.max_branches,
            expansion: self.expansion,
            min_keyword_len: self.min_keyword_len,
            case_insensitive: self.case_insensitive,
        }
    }

    pub fn automaton_config(&self) -> AutomatonConfig {
        AutomatonConfig {
            case_insensitive: self.case_insensitive,
            min_letter: self.min_letter,
            max_letter: self.max_letter,
        }
    }
}

/// Fluent construction of a [`Matcher`].
///
/// ```
/// use regex_prefilter::matcher::{Matcher, MatcherBuilder};
///
/// let matcher: Matcher<&str> = MatcherBuilder::new()
///     .groups(2)
///     .case_insensitive(false)
///     .max_branches(64)
///     .build();
/// assert_eq!(matcher.group_count(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MatcherBuilder {
    config: MatcherConfig,
}

impl MatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of independent pattern groups.
    pub fn groups(mut self, groups: usize) -> Self {
        self.config.groups = groups;
        self
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.config.case_insensitive = yes;
        self
    }

    pub fn whole_word(mut self, yes: bool) -> Self {
        self.config.whole_word = yes;
        self
    }

    /// Branch cap per pattern before coarser decompositions are tried.
    pub fn max_branches(mut self, cap: u64) -> Self {
        self.config.max_branches = cap;
        self
    }

    /// Expand character sets into alternatives.
    pub fn expansion(mut self, yes: bool) -> Self {
        self.config.expansion = yes;
        self
    }

    pub fn min_keyword_len(mut self, len: usize) -> Self {
        self.config.min_keyword_len = len;
        self
    }

    /// Restrict literal bytes to `min..=max`.
    pub fn alphabet(mut self, min: u8, max: u8) -> Self {
        self.config.min_letter = min;
        self.config.max_letter = max;
        self
    }

    pub fn build<P>(self) -> Matcher<P> {
        Matcher::new(self.config)
    }
}

// === Matcher ===

/// Prefilter over groups of patterns, each pattern carrying a payload `P`.
///
/// ```
/// use regex_prefilter::prelude::*;
///
/// let mut matcher = Matcher::new(MatcherConfig::default());
/// let id = matcher.add_pattern(0, r"select\s.+\sfrom", "sql").unwrap();
/// matcher.compile(0).unwrap();
///
/// let found = matcher.find_all(0, b"SELECT name FROM users", DecodeMode::None).unwrap();
/// assert_eq!(found, vec![id]);
/// ```
#[derive(Debug)]
pub struct Matcher<P> {
    config: MatcherConfig,
    groups: Vec<Automaton<FrameList>>,
    patterns: Arena<PatternId, PatternEntry<P>>,
    pieces: Arena<PieceId, MatchPiece>,
    frames: Arena<FrameId, MatchFrame>,
    decomposer: Decomposer,
    state: ScanState,
    /// State for one-shot scans, kept apart from caller versions.
    scratch: ScanState,
}

impl<P> Default for Matcher<P> {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl<P> Matcher<P> {
    pub fn new(config: MatcherConfig) -> Self {
        let automaton = config.automaton_config();
        let groups = (0..config.groups)
            .map(|_| Automaton::new(automaton.clone()))
            .collect();
        Matcher {
            decomposer: Decomposer::new(config.decompose_options()),
            config,
            groups,
            patterns: Arena::new(),
            pieces: Arena::new(),
            frames: Arena::new(),
            state: ScanState::new(),
            scratch: ScanState::new(),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn group(&self, group: usize) -> Result<&Automaton<FrameList>, MatchError> {
        self.groups.get(group).ok_or(MatchError::UnknownGroup {
            group,
            groups: self.groups.len(),
        })
    }

    fn group_mut(&mut self, group: usize) -> Result<&mut Automaton<FrameList>, MatchError> {
        let groups = self.groups.len();
        self.groups
            .get_mut(group)
            .ok_or(MatchError::UnknownGroup { group, groups })
    }

    // === Building ===

    /// Decompose `pattern` and index its literals in `group`.
    pub fn add_pattern(&mut self, group: usize, pattern: &str, payload: P) -> Result<PatternId, MatchError> {
        self.group(group)?;
        let decomposition = match self.decomposer.decompose(pattern) {
            Ok(decomposition) => decomposition,
            Err(err) => {
                warn!(group, pattern, error = %err, "pattern rejected");
                return Err(err.into());
            }
        };

        let automaton = &self.groups[group];
        for literal in decomposition.branches.iter().flat_map(|b| b.literals()) {
            if let Err(err) = automaton.validate(literal) {
                warn!(group, pattern, error = %err, "pattern rejected");
                return Err(err.into());
            }
        }

        let id = self.patterns.alloc(PatternEntry {
            group,
            source: pattern.to_string(),
            payload,
            branches: decomposition.branches.len(),
        });
        for branch in &decomposition.branches {
            self.add_branch(group, id, branch.literals())?;
        }
        debug!(
            group,
            pattern,
            strategy = ?decomposition.strategy,
            branches = decomposition.branches.len(),
            "pattern added"
        );
        Ok(id)
    }

    /// Index `keyword` as a single-literal pattern, without parsing it.
    pub fn add_keyword(&mut self, group: usize, keyword: &[u8], payload: P) -> Result<PatternId, MatchError> {
        self.group(group)?.validate(keyword)?;
        let id = self.patterns.alloc(PatternEntry {
            group,
            source: String::from_utf8_lossy(keyword).into_owned(),
            payload,
            branches: 1,
        });
        self.add_branch(group, id, &[keyword.to_vec()])?;
        Ok(id)
    }

    /// Frames are created last literal first, so a terminal shared by
    /// several positions of one branch lists the later position first.
    fn add_branch(&mut self, group: usize, pattern: PatternId, literals: &[Vec<u8>]) -> Result<(), MatchError> {
        let size = literals.len();
        let piece = self.pieces.alloc(MatchPiece {
            size: size as u32,
            pattern,
        });
        let base = self.frames.len();
        let whole_word = self.config.whole_word;
        for (pos, literal) in literals.iter().enumerate().rev() {
            let prev = (pos > 0).then(|| FrameId::new((base + size - pos) as u32));
            let frame = self.frames.alloc(MatchFrame {
                piece,
                prev,
                pos: pos as u32,
            });
            self.groups[group].add_with(literal, pattern, whole_word, |_, _, list: Option<FrameList>| {
                let mut list = list.unwrap_or_default();
                list.push(frame);
                list
            })?;
        }
        Ok(())
    }

    /// Number of branches `pattern` would be indexed with.
    pub fn test_pattern(&self, pattern: &str) -> Result<usize, PatternError> {
        Decomposer::new(self.config.decompose_options())
            .decompose(pattern)
            .map(|d| d.branches.len())
    }

    /// Compile the automaton of `group`; required before searching it.
    pub fn compile(&mut self, group: usize) -> Result<(), MatchError> {
        let automaton = self.group_mut(group)?;
        if !automaton.compile() {
            return Err(MatchError::Inconsistent { group });
        }
        if cfg!(debug_assertions) && !automaton.check() {
            return Err(MatchError::Inconsistent { group });
        }
        debug!(
            group,
            keys = automaton.len(),
            states = automaton.state_count(),
            "group compiled"
        );
        Ok(())
    }

    /// Compile every group.
    pub fn compile_all(&mut self) -> Result<(), MatchError> {
        (0..self.groups.len()).try_for_each(|group| self.compile(group))
    }

    // === Searching ===

    /// Scan with a caller-owned state.
    ///
    /// Pieces last touched under another `version` count as reset. Each
    /// branch reports at most once per version. Returns true if `on_match`
    /// stopped the scan.
    pub fn search_with<F>(
        &self,
        state: &mut ScanState,
        group: usize,
        text: &[u8],
        decode: DecodeMode,
        version: u64,
        mut on_match: F,
    ) -> Result<bool, MatchError>
    where
        F: FnMut(&PatternMatch<'_, P>) -> bool,
    {
        let automaton = self.group(group)?;
        if !automaton.is_compiled() {
            return Err(MatchError::NotCompiled { group });
        }
        state.prepare(version, self.pieces.len());

        let stopped = automaton.search(text, decode, |hit| {
            for &frame_id in hit.value.iter() {
                let frame = &self.frames[frame_id];
                let slot = &mut state.pieces[frame.piece.index()];
                if slot.version != version {
                    if frame.prev.is_some() {
                        continue;
                    }
                    *slot = PieceState::fresh(version);
                }
                if slot.discarded || slot.cur + 1 != frame.pos as i32 {
                    continue;
                }
                if frame.pos == 0 {
                    slot.start = hit.offset;
                }
                slot.cur = frame.pos as i32;

                let piece = &self.pieces[frame.piece];
                if frame.pos + 1 == piece.size {
                    slot.discarded = true;
                    let found = PatternMatch {
                        pattern: piece.pattern,
                        payload: &self.patterns[piece.pattern].payload,
                        offset: slot.start,
                        end: hit.end,
                        keyword: hit.key,
                    };
                    if on_match(&found) {
                        return true;
                    }
                }
            }
            false
        });
        Ok(stopped)
    }

    /// Scan with the matcher's own state.
    pub fn search<F>(
        &mut self,
        group: usize,
        text: &[u8],
        decode: DecodeMode,
        version: u64,
        on_match: F,
    ) -> Result<bool, MatchError>
    where
        F: FnMut(&PatternMatch<'_, P>) -> bool,
    {
        let mut state = std::mem::take(&mut self.state);
        let result = self.search_with(&mut state, group, text, decode, version, on_match);
        self.state = state;
        result
    }

    /// Whether any pattern of `group` is a candidate for `text`.
    pub fn is_match(&mut self, group: usize, text: &[u8], decode: DecodeMode) -> Result<bool, MatchError> {
        let mut state = std::mem::take(&mut self.scratch);
        let result = self.is_match_with(&mut state, group, text, decode);
        self.scratch = state;
        result
    }

    /// [`is_match`](Self::is_match) with a caller-owned state. Each call
    /// scans under the next version of `state`, so no cursor is carried
    /// over and nothing is cleared.
    pub fn is_match_with(
        &self,
        state: &mut ScanState,
        group: usize,
        text: &[u8],
        decode: DecodeMode,
    ) -> Result<bool, MatchError> {
        let version = state.version() + 1;
        self.search_with(state, group, text, decode, version, |_| true)
    }

    /// Candidate patterns for `text`, each once, in order of discovery.
    pub fn find_all(&mut self, group: usize, text: &[u8], decode: DecodeMode) -> Result<Vec<PatternId>, MatchError> {
        let mut state = std::mem::take(&mut self.scratch);
        let result = self.find_all_with(&mut state, group, text, decode);
        self.scratch = state;
        result
    }

    /// [`find_all`](Self::find_all) with a caller-owned state, under the
    /// next version of `state`.
    pub fn find_all_with(
        &self,
        state: &mut ScanState,
        group: usize,
        text: &[u8],
        decode: DecodeMode,
    ) -> Result<Vec<PatternId>, MatchError> {
        let version = state.version() + 1;
        let mut reported = std::mem::take(&mut state.reported);
        if reported.len() < self.patterns.len() {
            reported.resize(self.patterns.len(), 0);
        }
        let mut found = Vec::new();
        let result = self.search_with(state, group, text, decode, version, |m| {
            let slot = &mut reported[m.pattern.index()];
            if *slot != version {
                *slot = version;
                found.push(m.pattern);
            }
            false
        });
        state.reported = reported;
        result.map(|_| found)
    }

    /// Restart every cursor of the matcher's own state under `version`.
    pub fn reset(&mut self, version: u64) {
        self.state.prepare(version, self.pieces.len());
        self.state.reset(version);
    }

    // === Introspection ===

    /// Change the number of groups. Dropped groups lose their automata;
    /// their patterns stay allocated but can no longer match.
    pub fn resize(&mut self, groups: usize) {
        let automaton = self.config.automaton_config();
        self.groups
            .resize_with(groups, || Automaton::new(automaton.clone()));
        self.config.groups = groups;
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Distinct literals indexed in `group`, in insertion order.
    pub fn list_literals(&self, group: usize) -> Result<Vec<&[u8]>, MatchError> {
        Ok(self.group(group)?.iter().map(|t| t.key).collect())
    }

    pub fn pattern(&self, id: PatternId) -> Option<&str> {
        self.patterns.get(id).map(|p| p.source.as_str())
    }

    pub fn payload(&self, id: PatternId) -> Option<&P> {
        self.patterns.get(id).map(|p| &p.payload)
    }

    /// Group the pattern was added to.
    pub fn pattern_group(&self, id: PatternId) -> Option<usize> {
        self.patterns.get(id).map(|p| p.group)
    }

    /// Number of branches the pattern was indexed with.
    pub fn branch_count(&self, id: PatternId) -> Option<usize> {
        self.patterns.get(id).map(|p| p.branches)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn piece(&self, id: PieceId) -> Option<&MatchPiece> {
        self.pieces.get(id)
    }

    pub fn frame(&self, id: FrameId) -> Option<&MatchFrame> {
        self.frames.get(id)
    }

    /// Drop every pattern; groups stay.
    pub fn clear(&mut self) {
        for automaton in &mut self.groups {
            automaton.clear();
        }
        self.patterns.clear();
        self.pieces.clear();
        self.frames.clear();
        self.state = ScanState::new();
        self.scratch = ScanState::new();
        self.decomposer.clear();
    }

    pub fn shrink_to_fit(&mut self) {
        for automaton in &mut self.groups {
            automaton.shrink_to_fit();
        }
        self.patterns.shrink_to_fit();
        self.pieces.shrink_to_fit();
        self.frames.shrink_to_fit();
        self.state.pieces.shrink_to_fit();
        self.scratch.pieces.shrink_to_fit();
        self.scratch.reported.shrink_to_fit();
        self.decomposer.clear();
    }

    /// Approximate heap usage in bytes.
    pub fn memory_size(&self) -> usize {
        self.groups.iter().map(|a| a.memory_size()).sum::<usize>()
            + self.patterns.memory_size()
            + self.pieces.memory_size()
            + self.frames.memory_size()
            + (self.state.pieces.capacity() + self.scratch.pieces.capacity())
                * std::mem::size_of::<PieceState>()
            + self.scratch.reported.capacity() * std::mem::size_of::<u64>()
    }
}

impl<P: Verifier> Matcher<P> {
    /// Candidates from [`find_all`](Self::find_all) confirmed by their
    /// payload against the decoded text.
    pub fn search_verified(&mut self, group: usize, text: &[u8], decode: DecodeMode) -> Result<Vec<PatternId>, MatchError> {
        let candidates = self.find_all(group, text, decode)?;
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let haystack = crate::decode::decode(text, decode);
        Ok(candidates
            .into_iter()
            .filter(|id| self.patterns[*id].payload.is_match(&haystack))
            .collect())
    }
}
