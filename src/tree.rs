// tree.rs - AND/OR decomposition tree for one pattern.
//
// A pattern compiles into leaves (literal runs, or disabled placeholders
// for anything that cannot be indexed), AND sequences and OR
// alternatives. The tree is simplified with adjust/mark/merge and then
// enumerated into branches: ordered leaf lists, one per alternative.

use std::fmt;
use std::ops::Range;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::arena::{arena_index, Arena, ByteArena, Span};
use crate::error::PatternError;
use crate::parse::Parser;

arena_index! {
    /// Index of a [`PatternNode`] inside its [`PatternTree`].
    pub struct NodeId;
}

bitflags! {
    /// Per-node flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The node is a literal leaf.
        const TARGET = 1 << 0;
        /// The node cannot contribute an indexable literal.
        const DISABLED = 1 << 1;
        /// Every AND child is (recursively) disabled. Set by `mark`.
        const AND_ALL_DISABLED = 1 << 2;
    }
}

/// Structural role of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    And,
    Or,
}

pub(crate) type Children = SmallVec<[NodeId; 4]>;

/// One node of the decomposition tree.
#[derive(Clone, Debug)]
pub struct PatternNode {
    and_children: Children,
    or_children: Children,
    literal: Span,
    source: Range<usize>,
    flags: NodeFlags,
}

impl PatternNode {
    pub fn kind(&self) -> NodeKind {
        if self.flags.contains(NodeFlags::TARGET) {
            NodeKind::Leaf
        } else if !self.or_children.is_empty() {
            NodeKind::Or
        } else {
            NodeKind::And
        }
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[inline]
    pub fn is_target(&self) -> bool {
        self.flags.contains(NodeFlags::TARGET)
    }

    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.flags.contains(NodeFlags::DISABLED)
    }

    #[inline]
    pub fn is_and_all_disabled(&self) -> bool {
        self.flags.contains(NodeFlags::AND_ALL_DISABLED)
    }

    /// An enabled literal leaf (possibly empty).
    #[inline]
    pub fn is_literal(&self) -> bool {
        self.is_target() && !self.is_disabled()
    }

    pub fn and_children(&self) -> &[NodeId] {
        &self.and_children
    }

    pub fn or_children(&self) -> &[NodeId] {
        &self.or_children
    }

    /// Byte range of the pattern text this node was built from.
    pub fn source(&self) -> Range<usize> {
        self.source.clone()
    }

    pub fn literal_len(&self) -> usize {
        self.literal.len()
    }
}

/// Decomposition tree of a single pattern, backed by a reusable arena.
#[derive(Clone, Debug, Default)]
pub struct PatternTree {
    nodes: Arena<NodeId, PatternNode>,
    bytes: ByteArena,
    pattern: String,
    root: Option<NodeId>,
    case_sensitive: bool,
}

impl PatternTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the literals will be matched case-sensitively. Letters in
    /// `(?i)` scopes then compile to both cases.
    pub fn set_case_sensitive(&mut self, yes: bool) {
        self.case_sensitive = yes;
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Parse `pattern` into a fresh tree, discarding the previous one.
    ///
    /// With `expansion` off, character sets become disabled nodes instead of
    /// OR nodes over their members.
    pub fn compile(&mut self, pattern: &str, expansion: bool) -> Result<NodeId, PatternError> {
        self.clear();
        self.pattern.push_str(pattern);
        let root = Parser::new(self, pattern, expansion).parse()?;
        self.root = Some(root);
        Ok(root)
    }

    /// Drop all nodes and literals, keeping allocations.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.bytes.clear();
        self.pattern.clear();
        self.root = None;
    }

    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
        self.bytes.shrink_to_fit();
        self.pattern.shrink_to_fit();
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// The pattern the tree was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &PatternNode {
        &self.nodes[id]
    }

    /// Resolved literal bytes of a leaf (empty for non-leaves).
    pub fn literal(&self, id: NodeId) -> &[u8] {
        self.bytes.get(self.nodes[id].literal)
    }

    /// Pattern text the node was built from.
    pub fn source_text(&self, id: NodeId) -> &str {
        self.pattern.get(self.nodes[id].source.clone()).unwrap_or("")
    }

    pub fn memory_size(&self) -> usize {
        self.nodes.memory_size() + self.bytes.memory_size() + self.pattern.capacity()
    }

    // === Construction (used by the parser) ===

    pub(crate) fn new_leaf(&mut self, literal: &[u8], source: Range<usize>) -> NodeId {
        let literal = self.bytes.push(literal);
        self.nodes.alloc(PatternNode {
            and_children: Children::new(),
            or_children: Children::new(),
            literal,
            source,
            flags: NodeFlags::TARGET,
        })
    }

    pub(crate) fn new_disabled(&mut self, source: Range<usize>) -> NodeId {
        self.nodes.alloc(PatternNode {
            and_children: Children::new(),
            or_children: Children::new(),
            literal: Span::EMPTY,
            source,
            flags: NodeFlags::TARGET | NodeFlags::DISABLED,
        })
    }

    pub(crate) fn new_and(&mut self, children: Children, source: Range<usize>) -> NodeId {
        self.nodes.alloc(PatternNode {
            and_children: children,
            or_children: Children::new(),
            literal: Span::EMPTY,
            source,
            flags: NodeFlags::empty(),
        })
    }

    pub(crate) fn new_or(&mut self, children: Children, source: Range<usize>) -> NodeId {
        if children.is_empty() {
            return self.new_leaf(b"", source);
        }
        self.nodes.alloc(PatternNode {
            and_children: Children::new(),
            or_children: children,
            literal: Span::EMPTY,
            source,
            flags: NodeFlags::empty(),
        })
    }

    // === Simplification ===

    /// Collapse single-child wrappers and flatten nested sequences.
    pub fn adjust(&mut self) -> Result<(), PatternError> {
        let root = self.root.ok_or(PatternError::CorruptTree)?;
        let root = self.adjust_node(root)?;
        self.root = Some(root);
        Ok(())
    }

    fn adjust_node(&mut self, id: NodeId) -> Result<NodeId, PatternError> {
        let node = &self.nodes[id];
        if node.is_target() {
            if !node.or_children.is_empty() || !node.and_children.is_empty() {
                return Err(PatternError::CorruptTree);
            }
            return Ok(id);
        }

        let kind = node.kind();
        let children = match kind {
            NodeKind::Or => node.or_children.clone(),
            _ => node.and_children.clone(),
        };

        let mut adjusted = Children::with_capacity(children.len());
        for child in children {
            let child = self.adjust_node(child)?;
            let inner = &self.nodes[child];
            let same_kind = !inner.is_target() && inner.kind() == kind && !inner.is_disabled();
            if same_kind {
                let grand = match kind {
                    NodeKind::Or => &inner.or_children,
                    _ => &inner.and_children,
                };
                adjusted.extend(grand.iter().copied());
            } else {
                adjusted.push(child);
            }
        }

        match adjusted.len() {
            0 => {
                let node = &mut self.nodes[id];
                node.and_children.clear();
                node.or_children.clear();
                node.literal = Span::EMPTY;
                node.flags = NodeFlags::TARGET;
                Ok(id)
            }
            1 => Ok(adjusted[0]),
            _ => {
                let node = &mut self.nodes[id];
                match kind {
                    NodeKind::Or => node.or_children = adjusted,
                    _ => node.and_children = adjusted,
                }
                Ok(id)
            }
        }
    }

    /// Derive `AND_ALL_DISABLED` and disable ORs that have an alternative
    /// without any indexable content. Returns true if the whole tree is
    /// disabled.
    pub fn mark(&mut self) -> bool {
        match self.root {
            Some(root) => self.mark_node(root),
            None => true,
        }
    }

    fn mark_node(&mut self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        match node.kind() {
            NodeKind::Leaf => node.is_disabled(),
            NodeKind::And => {
                let children = node.and_children.clone();
                let mut all = !children.is_empty();
                for child in children {
                    all &= self.mark_node(child);
                }
                self.nodes[id].flags.set(NodeFlags::AND_ALL_DISABLED, all);
                all
            }
            NodeKind::Or => {
                let children = node.or_children.clone();
                let mut any = false;
                for child in children {
                    any |= self.mark_node(child);
                }
                if any {
                    self.nodes[id].flags.insert(NodeFlags::DISABLED);
                }
                any
            }
        }
    }

    /// Simplify the tree and join adjacent literal leaves.
    ///
    /// Returns `Ok(false)` when nothing indexable is left.
    pub fn merge(&mut self) -> Result<bool, PatternError> {
        self.adjust()?;
        let all_disabled = self.mark();
        if let Some(root) = self.root {
            self.merge_node(root);
        }
        Ok(!all_disabled)
    }

    fn merge_node(&mut self, id: NodeId) {
        match self.nodes[id].kind() {
            NodeKind::Leaf => {}
            NodeKind::Or => {
                let children = self.nodes[id].or_children.clone();
                for child in children {
                    self.merge_node(child);
                }
            }
            NodeKind::And => {
                let children = self.nodes[id].and_children.clone();
                let mut merged = Children::with_capacity(children.len());
                let mut run: SmallVec<[NodeId; 8]> = SmallVec::new();
                for child in children {
                    self.merge_node(child);
                    if self.nodes[child].is_literal() {
                        run.push(child);
                    } else {
                        self.flush_run(&mut run, &mut merged);
                        merged.push(child);
                    }
                }
                self.flush_run(&mut run, &mut merged);

                if merged.len() == 1 {
                    let only = self.nodes[merged[0]].clone();
                    self.nodes[id] = only;
                } else {
                    self.nodes[id].and_children = merged;
                }
            }
        }
    }

    fn flush_run(&mut self, run: &mut SmallVec<[NodeId; 8]>, out: &mut Children) {
        match run.len() {
            0 => {}
            1 => out.push(run[0]),
            _ => {
                let parts: SmallVec<[Span; 8]> = run.iter().map(|id| self.nodes[*id].literal).collect();
                let literal = self.bytes.concat(&parts);
                let source = self.nodes[run[0]].source.start..self.nodes[run[run.len() - 1]].source.end;
                let id = self.nodes.alloc(PatternNode {
                    and_children: Children::new(),
                    or_children: Children::new(),
                    literal,
                    source,
                    flags: NodeFlags::TARGET,
                });
                out.push(id);
            }
        }
        run.clear();
    }

    // === Enumeration ===

    /// Number of branches a full expansion would produce. OR nodes add,
    /// AND nodes multiply; saturates at `u64::MAX`.
    pub fn get_branch_cnt(&self) -> u64 {
        match self.root {
            Some(root) => self.count(root, None),
            None => 0,
        }
    }

    fn count(&self, id: NodeId, expanded: Option<&[bool]>) -> u64 {
        let node = &self.nodes[id];
        match node.kind() {
            NodeKind::Leaf => 1,
            NodeKind::Or => {
                if let Some(expanded) = expanded {
                    if !expanded[id.index()] {
                        return 1;
                    }
                }
                node.or_children
                    .iter()
                    .fold(0u64, |acc, c| acc.saturating_add(self.count(*c, expanded)))
            }
            NodeKind::And => node
                .and_children
                .iter()
                .fold(1u64, |acc, c| acc.saturating_mul(self.count(*c, expanded))),
        }
    }

    /// Fully expand the tree: one ordered leaf list per alternative.
    ///
    /// The result has `get_branch_cnt()` entries; callers check the count
    /// first.
    pub fn get_branches(&self) -> Vec<Vec<NodeId>> {
        match self.root {
            Some(root) => self.expand(root, None),
            None => Vec::new(),
        }
    }

    /// Expand ORs outermost first while the projected branch count stays
    /// within `cap`. ORs that would exceed it are kept folded and appear as
    /// a single opaque element. With `all` off only ORs outside any AND
    /// are candidates for expansion.
    pub fn unfold(&self, all: bool, cap: u64) -> Vec<Vec<NodeId>> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut expanded = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            match node.kind() {
                NodeKind::Leaf => {}
                NodeKind::Or => {
                    expanded[id.index()] = true;
                    if self.count(root, Some(&expanded)) > cap {
                        expanded[id.index()] = false;
                        continue;
                    }
                    stack.extend(node.or_children.iter().rev().copied());
                }
                NodeKind::And => {
                    if all {
                        stack.extend(node.and_children.iter().rev().copied());
                    }
                }
            }
        }
        self.expand(root, Some(&expanded))
    }

    fn expand(&self, id: NodeId, expanded: Option<&[bool]>) -> Vec<Vec<NodeId>> {
        let node = &self.nodes[id];
        match node.kind() {
            NodeKind::Leaf => vec![vec![id]],
            NodeKind::Or => {
                if let Some(expanded) = expanded {
                    if !expanded[id.index()] {
                        return vec![vec![id]];
                    }
                }
                node.or_children
                    .iter()
                    .flat_map(|c| self.expand(*c, expanded))
                    .collect()
            }
            NodeKind::And => {
                let mut acc: Vec<Vec<NodeId>> = vec![Vec::new()];
                for child in &node.and_children {
                    let tails = self.expand(*child, expanded);
                    let mut next = Vec::with_capacity(acc.len() * tails.len());
                    for head in &acc {
                        for tail in &tails {
                            let mut branch = Vec::with_capacity(head.len() + tail.len());
                            branch.extend_from_slice(head);
                            branch.extend_from_slice(tail);
                            next.push(branch);
                        }
                    }
                    acc = next;
                }
                acc
            }
        }
    }

    /// Every non-empty enabled literal reachable through enabled ORs and
    /// ANDs that are not fully disabled, in pattern order.
    pub fn get_all(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.collect_literals(root, &mut out);
        }
        out
    }

    fn collect_literals(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = &self.nodes[id];
        match node.kind() {
            NodeKind::Leaf => {
                if node.is_literal() && !node.literal.is_empty() {
                    out.push(id);
                }
            }
            NodeKind::Or => {
                if !node.is_disabled() {
                    for child in &node.or_children {
                        self.collect_literals(*child, out);
                    }
                }
            }
            NodeKind::And => {
                if !node.is_and_all_disabled() {
                    for child in &node.and_children {
                        self.collect_literals(*child, out);
                    }
                }
            }
        }
    }

    /// Whether every path through the tree crosses an enabled literal of at
    /// least `min_len` bytes, i.e. whether the literals from `get_all` of
    /// that length are jointly necessary evidence for a match.
    pub fn covers(&self, min_len: usize) -> bool {
        match self.root {
            Some(root) => self.covers_node(root, min_len),
            None => false,
        }
    }

    fn covers_node(&self, id: NodeId, min_len: usize) -> bool {
        let node = &self.nodes[id];
        match node.kind() {
            NodeKind::Leaf => node.is_literal() && node.literal.len() >= min_len,
            NodeKind::Or => node.or_children.iter().all(|c| self.covers_node(*c, min_len)),
            NodeKind::And => node.and_children.iter().any(|c| self.covers_node(*c, min_len)),
        }
    }

    /// Depth-first pre-order walk. The callback receives the node, its
    /// depth and returns false to stop the walk.
    pub fn traverse<F>(&self, mut f: F) -> bool
    where
        F: FnMut(NodeId, &PatternNode, usize) -> bool,
    {
        match self.root {
            Some(root) => self.traverse_node(root, 0, &mut f),
            None => true,
        }
    }

    fn traverse_node<F>(&self, id: NodeId, level: usize, f: &mut F) -> bool
    where
        F: FnMut(NodeId, &PatternNode, usize) -> bool,
    {
        let node = &self.nodes[id];
        if !f(id, node, level) {
            return false;
        }
        let children = match node.kind() {
            NodeKind::Leaf => return true,
            NodeKind::Or => &node.or_children,
            NodeKind::And => &node.and_children,
        };
        children.iter().all(|c| self.traverse_node(*c, level + 1, f))
    }
}

impl fmt::Display for PatternTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Ok(());
        self.traverse(|id, node, level| {
            let kind = match node.kind() {
                NodeKind::Leaf => "leaf",
                NodeKind::And => "and",
                NodeKind::Or => "or",
            };
            let mut flags = String::new();
            if node.is_disabled() {
                flags.push_str(" disabled");
            }
            if node.is_and_all_disabled() {
                flags.push_str(" all-disabled");
            }
            result = if node.is_target() {
                writeln!(
                    f,
                    "{:indent$}{}{} {:?} <- {:?}",
                    "",
                    kind,
                    flags,
                    String::from_utf8_lossy(self.literal(id)),
                    self.source_text(id),
                    indent = level * 2
                )
            } else {
                writeln!(f, "{:indent$}{}{}", "", kind, flags, indent = level * 2)
            };
            result.is_ok()
        });
        result
    }
}
