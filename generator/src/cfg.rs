// cfg.rs — Control-flow topology and its growth transformations
//
// A function's topology starts as start → end and grows one randomized,
// shape-preserving transformation at a time. Blocks live in an arena;
// successor lists own the edges, predecessor lists are back-references kept
// in sync on every edge change. Each block also carries the temporaries
// created in it and its private memory tokens.
//
// Preconditions: none.
// Postconditions: after every transformation each block has at most two
// successors, every non-start block has a predecessor, start has none and
// the designated end block has no successors.
// Failure modes: edge bookkeeping violations panic (generator defect).
// Side effects: none.

use std::collections::HashSet;
use std::fmt;

use crate::id::{BlockId, NodeId, TempId};
use crate::rng::GenRng;
use crate::types::ValueType;

pub const MAX_SUCCS: usize = 2;

// ── Blocks and temporaries ───────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ControlFlowBlock {
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Every temporary created in this block, resolved or not.
    pub temps: Vec<TempId>,
    /// Unresolved temporaries, oldest first.
    pub pending: Vec<TempId>,
    /// Nodes created here by the resolver; drives the strategy weights.
    pub n_nodes: usize,
    /// Memory state the next side effect in this block will produce into.
    pub mem: Option<NodeId>,
    /// Memory state leaving the block.
    pub last_mem: Option<NodeId>,
    /// Backend block, once materialized.
    pub irb: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Temporary {
    pub block: BlockId,
    pub ty: ValueType,
    /// Placeholder until resolved, then the defining value.
    pub node: NodeId,
    pub resolved: bool,
}

/// The four growth transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    SelfLoop,
    FanIn,
    Splice,
    Extend,
}

impl Transform {
    pub const ALL: [Transform; 4] = [
        Transform::SelfLoop,
        Transform::FanIn,
        Transform::Splice,
        Transform::Extend,
    ];
}

// ── Topology ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Cfg {
    blocks: Vec<ControlFlowBlock>,
    temps: Vec<Temporary>,
    start: BlockId,
    end: BlockId,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg::new()
    }
}

impl Cfg {
    /// The two-block skeleton start → end.
    pub fn new() -> Self {
        let mut cfg = Cfg {
            blocks: Vec::new(),
            temps: Vec::new(),
            start: BlockId(0),
            end: BlockId(1),
        };
        let start = cfg.new_block();
        let end = cfg.new_block();
        cfg.add_edge(start, end);
        cfg
    }

    pub fn start(&self) -> BlockId {
        self.start
    }

    pub fn end(&self) -> BlockId {
        self.end
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, b: BlockId) -> &ControlFlowBlock {
        &self.blocks[b.index()]
    }

    pub fn block_mut(&mut self, b: BlockId) -> &mut ControlFlowBlock {
        &mut self.blocks[b.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::from_index)
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId::from_index(self.blocks.len());
        self.blocks.push(ControlFlowBlock::default());
        id
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        assert!(
            self.blocks[from.index()].succs.len() < MAX_SUCCS,
            "block {} already has {MAX_SUCCS} successors",
            from.0
        );
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    /// Remove one `from → to` edge and exactly one matching predecessor record.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        let succs = &mut self.blocks[from.index()].succs;
        let pos = succs
            .iter()
            .position(|&s| s == to)
            .unwrap_or_else(|| panic!("no edge {} -> {}", from.0, to.0));
        succs.remove(pos);

        let preds = &mut self.blocks[to.index()].preds;
        let before = preds.len();
        if let Some(pos) = preds.iter().position(|&p| p == from) {
            preds.remove(pos);
        }
        assert_eq!(
            preds.len() + 1,
            before,
            "edge {} -> {} had no predecessor record",
            from.0,
            to.0
        );
    }

    // ── Transformations ──

    pub fn applicable(&self, b: BlockId, t: Transform, loops: bool) -> bool {
        let n_succs = self.block(b).succs.len();
        match t {
            Transform::SelfLoop => {
                loops && b != self.start && n_succs == 1 && !self.block(b).succs.contains(&b)
            }
            Transform::FanIn => b != self.end && n_succs >= 1,
            Transform::Splice => b != self.end && (1..=2).contains(&n_succs),
            Transform::Extend => b != self.end && n_succs < MAX_SUCCS,
        }
    }

    /// Apply `t` to `b` if its precondition holds. Returns whether it did.
    pub fn apply(&mut self, b: BlockId, t: Transform, loops: bool) -> bool {
        if !self.applicable(b, t, loops) {
            return false;
        }
        match t {
            Transform::SelfLoop => self.add_edge(b, b),
            Transform::FanIn => {
                let n = self.new_block();
                for s in self.block(b).succs.clone() {
                    self.remove_edge(b, s);
                    self.add_edge(n, s);
                }
                self.add_edge(b, n);
            }
            Transform::Splice => {
                let n = self.new_block();
                let first = self.block(b).succs[0];
                if self.block(b).succs.len() == 1 {
                    // A single arm stays in place and gains a detour through `n`.
                    self.add_edge(b, n);
                    self.add_edge(n, first);
                } else {
                    self.remove_edge(b, first);
                    self.add_edge(n, first);
                    self.add_edge(b, n);
                }
            }
            Transform::Extend => {
                let n = self.new_block();
                self.add_edge(b, n);
            }
        }
        true
    }

    /// Apply `steps` successful random transformations.
    pub fn grow(&mut self, steps: usize, rng: &mut GenRng, loops: bool) {
        for _ in 0..steps {
            loop {
                let b = BlockId::from_index(rng.below(self.blocks.len()));
                let t = Transform::ALL[rng.below(Transform::ALL.len())];
                if self.apply(b, t, loops) {
                    tracing::trace!(block = b.0, transform = ?t, "cfg grown");
                    break;
                }
            }
        }
    }

    /// Blocks without successors, in index order.
    pub fn exits(&self) -> Vec<BlockId> {
        self.block_ids()
            .filter(|&b| self.block(b).succs.is_empty())
            .collect()
    }

    // ── Temporaries ──

    pub fn temp(&self, t: TempId) -> &Temporary {
        &self.temps[t.index()]
    }

    pub fn n_temps(&self) -> usize {
        self.temps.len()
    }

    pub fn add_temporary(&mut self, block: BlockId, ty: ValueType, node: NodeId) -> TempId {
        let t = TempId::from_index(self.temps.len());
        self.temps.push(Temporary {
            block,
            ty,
            node,
            resolved: false,
        });
        let cfb = self.block_mut(block);
        cfb.temps.push(t);
        cfb.pending.push(t);
        t
    }

    pub fn has_pending(&self, b: BlockId) -> bool {
        !self.block(b).pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.blocks.iter().map(|b| b.pending.len()).sum()
    }

    /// Next temporary to resolve in `b`: pointers first, then oldest first.
    pub fn take_pending(&mut self, b: BlockId) -> Option<TempId> {
        let pending = &self.blocks[b.index()].pending;
        if pending.is_empty() {
            return None;
        }
        let pos = pending
            .iter()
            .position(|&t| self.temps[t.index()].ty.is_pointer())
            .unwrap_or(0);
        Some(self.blocks[b.index()].pending.remove(pos))
    }

    pub fn mark_resolved(&mut self, t: TempId, value: NodeId) {
        let temp = &mut self.temps[t.index()];
        assert!(!temp.resolved, "temporary {} resolved twice", t.0);
        temp.node = value;
        temp.resolved = true;
    }

    /// Resolved temporaries of `b` with type `ty`.
    pub fn resolved_of(&self, b: BlockId, ty: ValueType) -> impl Iterator<Item = TempId> + '_ {
        self.block(b)
            .temps
            .iter()
            .copied()
            .filter(move |&t| {
                let temp = self.temp(t);
                temp.resolved && temp.ty == ty
            })
    }

    // ── Walks ──

    /// Post-order over predecessor edges, starting from every exit.
    ///
    /// Each block appears once, after all predecessors that were not already
    /// on the walk's path.
    pub fn postorder_from_exits(&self) -> Vec<BlockId> {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(self.blocks.len());
        for exit in self.exits() {
            if !seen.insert(exit) {
                continue;
            }
            let mut stack: Vec<(BlockId, usize)> = vec![(exit, 0)];
            while let Some(top) = stack.last_mut() {
                let (b, next) = *top;
                if let Some(&p) = self.block(b).preds.get(next) {
                    top.1 += 1;
                    if seen.insert(p) {
                        stack.push((p, 0));
                    }
                } else {
                    order.push(b);
                    stack.pop();
                }
            }
        }
        order
    }

    /// Blocks reachable from start along successor edges.
    pub fn reachable(&self) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.start];
        while let Some(b) = stack.pop() {
            if seen.insert(b) {
                stack.extend(self.block(b).succs.iter().copied());
            }
        }
        seen
    }

    /// Check the topology invariants; returns a description of the first violation.
    pub fn check_well_formed(&self) -> Result<(), String> {
        if !self.block(self.start).preds.is_empty() {
            return Err("start block has predecessors".into());
        }
        if !self.block(self.end).succs.is_empty() {
            return Err("end block has successors".into());
        }
        for b in self.block_ids() {
            let cfb = self.block(b);
            if cfb.succs.len() > MAX_SUCCS {
                return Err(format!("block {} has {} successors", b.0, cfb.succs.len()));
            }
            if b != self.start && cfb.preds.is_empty() {
                return Err(format!("block {} has no predecessor", b.0));
            }
            for &s in &cfb.succs {
                let forward = cfb.succs.iter().filter(|&&x| x == s).count();
                let back = self.block(s).preds.iter().filter(|&&p| p == b).count();
                if forward != back {
                    return Err(format!("edge {} -> {} has {back} predecessor records", b.0, s.0));
                }
            }
        }
        let reachable = self.reachable();
        if reachable.len() != self.blocks.len() {
            return Err(format!(
                "{} blocks unreachable from start",
                self.blocks.len() - reachable.len()
            ));
        }
        Ok(())
    }
}

/// Successor tree in index order; repeated blocks are printed once.
impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = HashSet::new();
        let mut stack = vec![(self.start, 0usize)];
        while let Some((b, depth)) = stack.pop() {
            let indent = "  ".repeat(depth);
            if !seen.insert(b) {
                writeln!(f, "{indent}^{}", b.0)?;
                continue;
            }
            let cfb = self.block(b);
            let kind = match cfb.succs.len() {
                0 => "exit",
                1 => "jmp",
                _ => "cond",
            };
            writeln!(f, "{indent}{} {kind}", b.0)?;
            for &s in cfb.succs.iter().rev() {
                stack.push((s, depth + 1));
            }
        }
        Ok(())
    }
}
