// decompose.rs - Turning a pattern into indexable literal branches.
//
// Strategy ladder:
//   1. Exact    -- every alternative expanded, cap permitting
//                  (sets are re-parsed as opaque gaps if they blow the cap)
//   2. Folded   -- outermost ORs expanded up to the cap, the rest opaque
//   3. Keywords -- independent literal islands, accepted only when every
//                  path through the pattern crosses one of them
//
// Each step is a safe over-approximation: a text matching the pattern
// always contains every literal of at least one branch, in order.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::error::PatternError;
use crate::tree::{NodeId, PatternTree};

/// Default upper bound on the number of branches per pattern.
pub const DEFAULT_MAX_BRANCHES: u64 = 100_000;
/// Literals shorter than this are too unselective to index.
pub const DEFAULT_MIN_KEYWORD_LEN: usize = 2;

/// Tuning knobs for [`Decomposer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecomposeOptions {
    /// Branch cap; exceeding it triggers the coarser strategies.
    pub max_branches: u64,
    /// Expand character sets into alternatives on the first pass.
    pub expansion: bool,
    /// Minimum keyword length in bytes.
    pub min_keyword_len: usize,
    /// Literals are matched ignoring ASCII case. Branches differing only in
    /// case are duplicates; when off, `(?i)` letters expand to both cases.
    pub case_insensitive: bool,
}

impl Default for DecomposeOptions {
    fn default() -> Self {
        DecomposeOptions {
            max_branches: DEFAULT_MAX_BRANCHES,
            expansion: true,
            min_keyword_len: DEFAULT_MIN_KEYWORD_LEN,
            case_insensitive: true,
        }
    }
}

/// How the branches of a [`Decomposition`] were obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    Folded,
    Keywords,
}

/// One alternative of a pattern: literals that must all appear, in order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Branch {
    literals: Vec<Vec<u8>>,
}

impl Branch {
    pub fn new(literals: Vec<Vec<u8>>) -> Self {
        Branch { literals }
    }

    pub fn literals(&self) -> &[Vec<u8>] {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn into_literals(self) -> Vec<Vec<u8>> {
        self.literals
    }

    fn dedup_key(&self, case_insensitive: bool) -> Vec<Vec<u8>> {
        if case_insensitive {
            self.literals.iter().map(|l| l.to_ascii_lowercase()).collect()
        } else {
            self.literals.clone()
        }
    }
}

/// Branches of one pattern plus the strategy that produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decomposition {
    pub strategy: Strategy,
    pub branches: Vec<Branch>,
}

/// Reusable decomposition driver; owns the tree arena.
#[derive(Debug, Default)]
pub struct Decomposer {
    tree: PatternTree,
    options: DecomposeOptions,
}

impl Decomposer {
    pub fn new(options: DecomposeOptions) -> Self {
        Decomposer {
            tree: PatternTree::new(),
            options,
        }
    }

    pub fn options(&self) -> &DecomposeOptions {
        &self.options
    }

    /// Tree of the most recently decomposed pattern.
    pub fn tree(&self) -> &PatternTree {
        &self.tree
    }

    /// Release the tree arena.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.tree.shrink_to_fit();
    }

    pub fn decompose(&mut self, pattern: &str) -> Result<Decomposition, PatternError> {
        let cap = self.options.max_branches.max(1);
        let min_len = self.options.min_keyword_len.max(1);

        self.tree.set_case_sensitive(!self.options.case_insensitive);
        self.tree.compile(pattern, self.options.expansion)?;
        self.tree.merge()?;
        let mut count = self.tree.get_branch_cnt();
        if count > cap && self.options.expansion {
            debug!(pattern, count, cap, "branch cap exceeded, sets kept opaque");
            self.tree.compile(pattern, false)?;
            self.tree.merge()?;
            count = self.tree.get_branch_cnt();
        }
        trace!(pattern, count, "decomposition tree:\n{}", self.tree);

        if count <= cap {
            let raw = self.tree.get_branches();
            return match self.collect(&raw, min_len) {
                Some(branches) => Ok(self.finish(pattern, Strategy::Exact, branches)),
                None => Err(PatternError::Unindexable {
                    pattern: pattern.to_string(),
                    reason: "an alternative has no literal of sufficient length",
                }),
            };
        }

        let raw = self.tree.unfold(true, cap);
        if let Some(branches) = self.collect(&raw, min_len) {
            return Ok(self.finish(pattern, Strategy::Folded, branches));
        }

        self.keywords(pattern, cap, min_len)
    }

    /// Keyword extraction for every branch; `None` if some branch has no
    /// keyword.
    fn collect(&self, raw: &[Vec<NodeId>], min_len: usize) -> Option<Vec<Branch>> {
        let mut seen = HashSet::with_capacity(raw.len());
        let mut branches = Vec::with_capacity(raw.len());
        for nodes in raw {
            let literals = branch_keywords(&self.tree, nodes, min_len);
            if literals.is_empty() {
                return None;
            }
            let branch = Branch::new(literals);
            if seen.insert(branch.dedup_key(self.options.case_insensitive)) {
                branches.push(branch);
            }
        }
        Some(branches)
    }

    fn keywords(&self, pattern: &str, cap: u64, min_len: usize) -> Result<Decomposition, PatternError> {
        if !self.tree.covers(min_len) {
            return Err(PatternError::Unindexable {
                pattern: pattern.to_string(),
                reason: "too many branches and no keyword set covers every alternative",
            });
        }

        let mut seen = HashSet::new();
        let mut branches = Vec::new();
        for id in self.tree.get_all() {
            let literal = self.tree.literal(id);
            if literal.len() < min_len {
                continue;
            }
            let branch = Branch::new(vec![literal.to_vec()]);
            if seen.insert(branch.dedup_key(self.options.case_insensitive)) {
                branches.push(branch);
            }
        }
        if branches.len() as u64 > cap {
            return Err(PatternError::TooManyKeywords {
                pattern: pattern.to_string(),
                count: branches.len(),
                cap,
            });
        }
        Ok(self.finish(pattern, Strategy::Keywords, branches))
    }

    fn finish(&self, pattern: &str, strategy: Strategy, branches: Vec<Branch>) -> Decomposition {
        debug!(pattern, ?strategy, branches = branches.len(), "pattern decomposed");
        Decomposition { strategy, branches }
    }
}

/// Join adjacent enabled literal leaves of one branch into keywords.
///
/// Empty leaves are transparent; disabled leaves and folded ORs break the
/// run. Runs shorter than `min_len` are dropped.
pub fn branch_keywords(tree: &PatternTree, nodes: &[NodeId], min_len: usize) -> Vec<Vec<u8>> {
    let mut keywords = Vec::new();
    let mut run: Vec<u8> = Vec::new();
    for &id in nodes {
        if tree.node(id).is_literal() {
            run.extend_from_slice(tree.literal(id));
            continue;
        }
        if run.len() >= min_len {
            keywords.push(std::mem::take(&mut run));
        }
        run.clear();
    }
    if run.len() >= min_len {
        keywords.push(run);
    }
    keywords
}

/// Decompose `pattern` with default options.
///
/// ```
/// use regex_prefilter::decompose::decompose;
///
/// let branches = decompose("abc(d|e)fg").unwrap();
/// let literals: Vec<_> = branches.iter().map(|b| b.literals().to_vec()).collect();
/// assert_eq!(literals, vec![vec![b"abcdfg".to_vec()], vec![b"abcefg".to_vec()]]);
/// ```
pub fn decompose(pattern: &str) -> Result<Vec<Branch>, PatternError> {
    Decomposer::default()
        .decompose(pattern)
        .map(|d| d.branches)
}
