// ir.rs — Arena operation graph (the IR backend)
//
// One `Graph` per function. Nodes live in an append-only arena addressed by
// `NodeId`; a node is never removed, only turned into an `Id` forwarder by
// `exchange`. Blocks are nodes too: their inputs are the control-flow nodes
// (Jmp, Cond projections, Return) that enter them, in the order those edges
// were added. That order is the "backend predecessor order" that phi inputs
// follow.
//
// Layout of a fresh graph:
//   %0 start block   %1 end block   %2 Start   %3 End
//   %4 initial memory (Proj M of Start)   %5.. parameters (Proj of Start)
//
// Preconditions: callers only add predecessors to immature blocks.
// Postconditions: `verify` accepts only fully resolved, well-moded graphs.
// Failure modes: misuse of the arena API panics (generator defect);
// `verify` returns a coded `VerifyError`.
// Side effects: none.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::diag::{codes, VerifyError};
use crate::id::{EntityId, FuncId, NodeId, TypeId};
use crate::types::Mode;

/// Projection numbers.
pub mod pn {
    /// Memory result of Load, Store, Alloc and Call; initial memory of Start.
    pub const MEM: u32 = 0;
    /// Value result of Load, Alloc and Call.
    pub const RES: u32 = 1;
    /// First parameter of Start.
    pub const ARG0: u32 = 1;
    pub const COND_FALSE: u32 = 0;
    pub const COND_TRUE: u32 = 1;
}

// ── Node kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

impl BinOp {
    pub const ALL: [BinOp; 3] = [BinOp::Add, BinOp::Sub, BinOp::Mul];

    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "Add",
            BinOp::Sub => "Sub",
            BinOp::Mul => "Mul",
        }
    }
}

/// Comparison relation. The always-false relation is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    True,
}

impl Relation {
    pub const ALL: [Relation; 7] = [
        Relation::Eq,
        Relation::Ne,
        Relation::Lt,
        Relation::Le,
        Relation::Gt,
        Relation::Ge,
        Relation::True,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Relation::Eq => "eq",
            Relation::Ne => "ne",
            Relation::Lt => "lt",
            Relation::Le => "le",
            Relation::Gt => "gt",
            Relation::Ge => "ge",
            Relation::True => "true",
        }
    }

    pub fn from_name(s: &str) -> Option<Relation> {
        Relation::ALL.iter().copied().find(|r| r.name() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Start,
    End,
    Block,
    Jmp,
    Cond,
    Return,
    Proj(u32),
    /// Literal bit pattern, truncated to the node's mode.
    Const(u64),
    Binary(BinOp),
    Cmp(Relation),
    Phi,
    Load,
    Store,
    /// Allocation of one object of the given type.
    Alloc(TypeId),
    Call(FuncId),
    Member(EntityId),
    Conv,
    /// Placeholder awaiting a concrete definition.
    Dummy,
    /// Forwarder left behind by `exchange`.
    Id,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Start => "Start",
            Op::End => "End",
            Op::Block => "Block",
            Op::Jmp => "Jmp",
            Op::Cond => "Cond",
            Op::Return => "Return",
            Op::Proj(_) => "Proj",
            Op::Const(_) => "Const",
            Op::Binary(b) => b.name(),
            Op::Cmp(_) => "Cmp",
            Op::Phi => "Phi",
            Op::Load => "Load",
            Op::Store => "Store",
            Op::Alloc(_) => "Alloc",
            Op::Call(_) => "Call",
            Op::Member(_) => "Member",
            Op::Conv => "Conv",
            Op::Dummy => "Dummy",
            Op::Id => "Id",
        }
    }

    /// Control-flow nodes that may appear as block inputs.
    pub fn is_control(&self, mode: Mode) -> bool {
        matches!(self, Op::Jmp | Op::Return) || (matches!(self, Op::Proj(_)) && mode == Mode::X)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub op: Op,
    pub mode: Mode,
    /// Owning block; `None` for block nodes.
    pub block: Option<NodeId>,
    pub ins: Vec<NodeId>,
}

/// Parameter and result modes of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Mode>,
    pub results: Vec<Mode>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |modes: &[Mode]| {
            modes
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "{} ({}) -> ({})",
            self.name,
            list(&self.params),
            list(&self.results)
        )
    }
}

// ── Graph ────────────────────────────────────────────────────────────────

const START_BLOCK: NodeId = NodeId(0);
const END_BLOCK: NodeId = NodeId(1);
const START: NodeId = NodeId(2);
const END: NodeId = NodeId(3);
const INITIAL_MEM: NodeId = NodeId(4);

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    immature: BTreeSet<NodeId>,
    n_params: usize,
}

impl Graph {
    pub fn new(params: &[Mode]) -> Self {
        let mut g = Graph {
            nodes: Vec::new(),
            immature: BTreeSet::new(),
            n_params: params.len(),
        };
        let start_block = g.push(Op::Block, Mode::X, None, Vec::new());
        let end_block = g.new_block();
        let start = g.push(Op::Start, Mode::T, Some(start_block), Vec::new());
        let end = g.push(Op::End, Mode::X, Some(end_block), Vec::new());
        let mem = g.new_proj(start_block, start, Mode::M, pn::MEM);
        debug_assert_eq!(
            (start_block, end_block, start, end, mem),
            (START_BLOCK, END_BLOCK, START, END, INITIAL_MEM)
        );
        for (i, &mode) in params.iter().enumerate() {
            g.new_proj(start_block, start, mode, pn::ARG0 + i as u32);
        }
        g
    }

    /// Rebuild a graph from serialized nodes. Every block is taken as mature.
    pub fn from_nodes(nodes: Vec<Node>, n_params: usize) -> Self {
        Graph {
            nodes,
            immature: BTreeSet::new(),
            n_params,
        }
    }

    fn push(&mut self, op: Op, mode: Mode, block: Option<NodeId>, ins: Vec<NodeId>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            op,
            mode,
            block,
            ins,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::from_index(i), n))
    }

    /// Nodes that are not forwarders.
    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.op != Op::Id)
    }

    pub fn start_block(&self) -> NodeId {
        START_BLOCK
    }

    pub fn end_block(&self) -> NodeId {
        END_BLOCK
    }

    pub fn start(&self) -> NodeId {
        START
    }

    pub fn end(&self) -> NodeId {
        END
    }

    pub fn initial_mem(&self) -> NodeId {
        INITIAL_MEM
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    /// The `i`-th parameter value.
    pub fn arg(&self, i: usize) -> NodeId {
        assert!(i < self.n_params, "parameter {i} out of range");
        NodeId::from_index(INITIAL_MEM.index() + 1 + i)
    }

    // ── Blocks ──

    pub fn new_block(&mut self) -> NodeId {
        let b = self.push(Op::Block, Mode::X, None, Vec::new());
        self.immature.insert(b);
        b
    }

    pub fn add_block_pred(&mut self, block: NodeId, ctrl: NodeId) {
        assert_eq!(self.node(block).op, Op::Block, "%{} is not a block", block.0);
        assert!(
            self.immature.contains(&block),
            "predecessor added to mature block %{}",
            block.0
        );
        self.nodes[block.index()].ins.push(ctrl);
    }

    pub fn mature(&mut self, block: NodeId) {
        self.immature.remove(&block);
    }

    pub fn is_mature(&self, block: NodeId) -> bool {
        !self.immature.contains(&block)
    }

    /// Control-flow inputs of a block, in backend predecessor order.
    pub fn block_preds(&self, block: NodeId) -> &[NodeId] {
        &self.node(block).ins
    }

    /// Block the `i`-th control input of `block` comes from.
    pub fn pred_block(&self, block: NodeId, i: usize) -> Option<NodeId> {
        self.node(block)
            .ins
            .get(i)
            .and_then(|&ctrl| self.node(self.skip_id(ctrl)).block)
    }

    // ── Constructors ──

    pub fn new_jmp(&mut self, block: NodeId) -> NodeId {
        self.push(Op::Jmp, Mode::X, Some(block), Vec::new())
    }

    pub fn new_cond(&mut self, block: NodeId, selector: NodeId) -> NodeId {
        self.push(Op::Cond, Mode::T, Some(block), vec![selector])
    }

    pub fn new_proj(&mut self, block: NodeId, tuple: NodeId, mode: Mode, num: u32) -> NodeId {
        self.push(Op::Proj(num), mode, Some(block), vec![tuple])
    }

    pub fn new_return(&mut self, block: NodeId, mem: NodeId, results: &[NodeId]) -> NodeId {
        let mut ins = Vec::with_capacity(results.len() + 1);
        ins.push(mem);
        ins.extend_from_slice(results);
        self.push(Op::Return, Mode::X, Some(block), ins)
    }

    /// Literals live in the start block so they dominate every use.
    pub fn new_const(&mut self, mode: Mode, raw: u64) -> NodeId {
        self.push(Op::Const(mode.truncate(raw)), mode, Some(START_BLOCK), Vec::new())
    }

    pub fn new_binary(&mut self, block: NodeId, op: BinOp, l: NodeId, r: NodeId) -> NodeId {
        let mode = self.node(l).mode;
        self.push(Op::Binary(op), mode, Some(block), vec![l, r])
    }

    pub fn new_cmp(&mut self, block: NodeId, rel: Relation, l: NodeId, r: NodeId) -> NodeId {
        self.push(Op::Cmp(rel), Mode::B, Some(block), vec![l, r])
    }

    pub fn new_phi(&mut self, block: NodeId, ins: Vec<NodeId>, mode: Mode) -> NodeId {
        assert_eq!(
            ins.len(),
            self.block_preds(block).len(),
            "phi arity must match predecessors of %{}",
            block.0
        );
        self.push(Op::Phi, mode, Some(block), ins)
    }

    pub fn new_load(&mut self, block: NodeId, mem: NodeId, ptr: NodeId) -> NodeId {
        self.push(Op::Load, Mode::T, Some(block), vec![mem, ptr])
    }

    pub fn new_store(&mut self, block: NodeId, mem: NodeId, ptr: NodeId, value: NodeId) -> NodeId {
        self.push(Op::Store, Mode::T, Some(block), vec![mem, ptr, value])
    }

    pub fn new_alloc(&mut self, block: NodeId, mem: NodeId, size: NodeId, ty: TypeId) -> NodeId {
        self.push(Op::Alloc(ty), Mode::T, Some(block), vec![mem, size])
    }

    pub fn new_call(&mut self, block: NodeId, mem: NodeId, callee: FuncId, args: &[NodeId]) -> NodeId {
        let mut ins = Vec::with_capacity(args.len() + 1);
        ins.push(mem);
        ins.extend_from_slice(args);
        self.push(Op::Call(callee), Mode::T, Some(block), ins)
    }

    pub fn new_member(&mut self, block: NodeId, ptr: NodeId, entity: EntityId) -> NodeId {
        self.push(Op::Member(entity), Mode::P, Some(block), vec![ptr])
    }

    pub fn new_conv(&mut self, block: NodeId, value: NodeId, mode: Mode) -> NodeId {
        self.push(Op::Conv, mode, Some(block), vec![value])
    }

    pub fn new_dummy(&mut self, block: NodeId, mode: Mode) -> NodeId {
        self.push(Op::Dummy, mode, Some(block), Vec::new())
    }

    // ── Rewriting ──

    /// Reroute every use of `old` to `new`, then turn `old` into a forwarder.
    pub fn exchange(&mut self, old: NodeId, new: NodeId) {
        assert_ne!(old, new, "exchange of %{} with itself", old.0);
        assert_ne!(self.node(old).op, Op::Id, "%{} already exchanged", old.0);
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if i == old.index() {
                continue;
            }
            for input in node.ins.iter_mut() {
                if *input == old {
                    *input = new;
                }
            }
        }
        let slot = &mut self.nodes[old.index()];
        slot.op = Op::Id;
        slot.ins = vec![new];
    }

    /// Follow forwarders to the node that now stands for `n`.
    pub fn skip_id(&self, mut n: NodeId) -> NodeId {
        while self.node(n).op == Op::Id {
            n = self.node(n).ins[0];
        }
        n
    }

    /// Keep `n` reachable from End.
    pub fn keep_alive(&mut self, n: NodeId) {
        if !self.nodes[END.index()].ins.contains(&n) {
            self.nodes[END.index()].ins.push(n);
        }
    }

    pub fn count_op(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.live_nodes().filter(|(_, n)| pred(&n.op)).count()
    }

    // ── Verification ──

    /// Whole-graph verification.
    ///
    /// `sigs` is the program's signature table, `this` the index of the
    /// function owning this graph.
    pub fn verify(&self, sigs: &[Signature], this: FuncId) -> Result<(), VerifyError> {
        for (id, node) in self.live_nodes() {
            self.verify_refs(id, node)?;
        }
        for (id, node) in self.live_nodes() {
            self.verify_node(id, node, sigs, this)?;
        }
        self.verify_acyclic()
    }

    fn verify_refs(&self, id: NodeId, node: &Node) -> Result<(), VerifyError> {
        let refs = node.ins.iter().chain(node.block.iter());
        for &r in refs {
            if r.index() >= self.nodes.len() {
                return Err(VerifyError::new(
                    codes::V0007,
                    Some(id),
                    format!("%{} references missing node %{}", id.0, r.0),
                ));
            }
            if self.node(r).op == Op::Id {
                return Err(VerifyError::new(
                    codes::V0007,
                    Some(id),
                    format!("%{} references forwarded node %{}", id.0, r.0),
                ));
            }
        }
        if let Some(b) = node.block {
            if self.node(b).op != Op::Block {
                return Err(VerifyError::new(
                    codes::V0007,
                    Some(id),
                    format!("%{} is placed in non-block %{}", id.0, b.0),
                ));
            }
        }
        Ok(())
    }

    fn verify_node(
        &self,
        id: NodeId,
        node: &Node,
        sigs: &[Signature],
        this: FuncId,
    ) -> Result<(), VerifyError> {
        let mode_err = |msg: String| Err(VerifyError::new(codes::V0003, Some(id), msg));
        let in_mode = |i: usize| self.node(node.ins[i]).mode;
        let arity = |n: usize| -> Result<(), VerifyError> {
            if node.ins.len() == n {
                Ok(())
            } else {
                Err(VerifyError::new(
                    codes::V0003,
                    Some(id),
                    format!("%{} {} has {} inputs, expected {n}", id.0, node.op.name(), node.ins.len()),
                ))
            }
        };

        match node.op {
            Op::Dummy => {
                return Err(VerifyError::new(
                    codes::V0001,
                    Some(id),
                    format!("placeholder %{} ({}) left in graph", id.0, node.mode),
                ))
            }
            Op::Block => {
                if !self.is_mature(id) {
                    return Err(VerifyError::new(
                        codes::V0005,
                        Some(id),
                        format!("block %{} is not mature", id.0),
                    ));
                }
                for &c in &node.ins {
                    let ctrl = self.node(c);
                    if !ctrl.op.is_control(ctrl.mode) {
                        return mode_err(format!("block %{} has non-control input %{}", id.0, c.0));
                    }
                }
            }
            Op::Phi => {
                let block = node.block.unwrap_or(START_BLOCK);
                let n_preds = self.block_preds(block).len();
                if node.ins.len() != n_preds {
                    return Err(VerifyError::new(
                        codes::V0002,
                        Some(id),
                        format!(
                            "phi %{} has {} inputs, block %{} has {n_preds} predecessors",
                            id.0,
                            node.ins.len(),
                            block.0
                        ),
                    ));
                }
                if let Some(&bad) = node.ins.iter().find(|&&i| self.node(i).mode != node.mode) {
                    return mode_err(format!(
                        "phi %{} ({}) has input %{} of mode {}",
                        id.0,
                        node.mode,
                        bad.0,
                        self.node(bad).mode
                    ));
                }
            }
            Op::Binary(_) => {
                arity(2)?;
                if !node.mode.is_int() || in_mode(0) != node.mode || in_mode(1) != node.mode {
                    return mode_err(format!("%{} {} operand modes differ", id.0, node.op.name()));
                }
            }
            Op::Cmp(_) => {
                arity(2)?;
                if node.mode != Mode::B || !in_mode(0).is_int() || in_mode(0) != in_mode(1) {
                    return mode_err(format!("%{} Cmp operands must share an integer mode", id.0));
                }
            }
            Op::Cond => {
                arity(1)?;
                if in_mode(0) != Mode::B {
                    return mode_err(format!("%{} Cond selector is not boolean", id.0));
                }
            }
            Op::Conv => {
                arity(1)?;
                if !node.mode.is_int() || !in_mode(0).is_int() {
                    return mode_err(format!("%{} Conv between non-integer modes", id.0));
                }
            }
            Op::Const(v) => {
                if node.mode.truncate(v) != v {
                    return mode_err(format!("%{} Const does not fit mode {}", id.0, node.mode));
                }
            }
            Op::Load => {
                arity(2)?;
                if in_mode(0) != Mode::M || in_mode(1) != Mode::P {
                    return mode_err(format!("%{} Load expects (M, P)", id.0));
                }
            }
            Op::Store => {
                arity(3)?;
                if in_mode(0) != Mode::M || in_mode(1) != Mode::P || !in_mode(2).is_storable() {
                    return mode_err(format!("%{} Store expects (M, P, value)", id.0));
                }
            }
            Op::Alloc(_) => {
                arity(2)?;
                if in_mode(0) != Mode::M || in_mode(1) != Mode::Iu {
                    return mode_err(format!("%{} Alloc expects (M, Iu)", id.0));
                }
            }
            Op::Member(_) => {
                arity(1)?;
                if in_mode(0) != Mode::P || node.mode != Mode::P {
                    return mode_err(format!("%{} Member expects a pointer", id.0));
                }
            }
            Op::Return => {
                let sig = &sigs[this.index()];
                let results: Vec<Mode> = node.ins.iter().skip(1).map(|&i| self.node(i).mode).collect();
                if node.ins.is_empty() || in_mode(0) != Mode::M || results != sig.results {
                    return mode_err(format!("%{} Return does not match {}", id.0, sig));
                }
            }
            Op::Call(callee) => {
                let Some(sig) = sigs.get(callee.index()) else {
                    return Err(VerifyError::new(
                        codes::V0006,
                        Some(id),
                        format!("%{} calls unknown function #{}", id.0, callee.0),
                    ));
                };
                let args: Vec<Mode> = node.ins.iter().skip(1).map(|&i| self.node(i).mode).collect();
                if node.ins.is_empty() || in_mode(0) != Mode::M || args != sig.params {
                    return Err(VerifyError::new(
                        codes::V0006,
                        Some(id),
                        format!("%{} Call arguments do not match {}", id.0, sig),
                    ));
                }
            }
            Op::Proj(num) => {
                arity(1)?;
                self.verify_proj(id, node, num, sigs)?;
            }
            Op::Start | Op::End | Op::Jmp | Op::Id => {}
        }
        Ok(())
    }

    fn verify_proj(&self, id: NodeId, node: &Node, num: u32, sigs: &[Signature]) -> Result<(), VerifyError> {
        let tuple = self.node(node.ins[0]);
        let expected = match (tuple.op, num) {
            (Op::Start, pn::MEM) => Some(Mode::M),
            (Op::Start, n) => {
                let i = (n - pn::ARG0) as usize;
                // Parameter modes are fixed when the graph is built.
                (i < self.n_params).then_some(node.mode)
            }
            (Op::Cond, pn::COND_FALSE | pn::COND_TRUE) => Some(Mode::X),
            (Op::Load | Op::Store | Op::Alloc(_) | Op::Call(_), pn::MEM) => Some(Mode::M),
            (Op::Load, pn::RES) => node.mode.is_storable().then_some(node.mode),
            (Op::Alloc(_), pn::RES) => Some(Mode::P),
            (Op::Call(callee), pn::RES) => {
                let Some(sig) = sigs.get(callee.index()) else {
                    return Err(VerifyError::new(
                        codes::V0006,
                        Some(id),
                        format!("%{} projects from call to unknown function", id.0),
                    ));
                };
                match sig.results.first() {
                    Some(&m) if m == node.mode => Some(m),
                    _ => {
                        return Err(VerifyError::new(
                            codes::V0006,
                            Some(id),
                            format!("%{} result mode {} does not match {}", id.0, node.mode, sig),
                        ))
                    }
                }
            }
            _ => None,
        };
        if expected != Some(node.mode) {
            return Err(VerifyError::new(
                codes::V0003,
                Some(id),
                format!("%{} Proj {num} of {} has mode {}", id.0, tuple.op.name(), node.mode),
            ));
        }
        Ok(())
    }

    /// Data operands; phi inputs and control links are not followed.
    fn operands(&self, n: NodeId) -> &[NodeId] {
        let node = self.node(n);
        match node.op {
            Op::Phi | Op::Block | Op::End | Op::Id => &[],
            _ => &node.ins,
        }
    }

    /// Every operand cycle must pass through a phi.
    fn verify_acyclic(&self) -> Result<(), VerifyError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let mut mark = vec![Mark::New; self.nodes.len()];

        for (root, _) in self.live_nodes() {
            if mark[root.index()] != Mark::New {
                continue;
            }
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
            mark[root.index()] = Mark::Active;
            while let Some(top) = stack.last_mut() {
                let (n, next) = *top;
                let ins = self.operands(n);
                if next < ins.len() {
                    top.1 += 1;
                    let m = ins[next];
                    match mark[m.index()] {
                        Mark::New => {
                            mark[m.index()] = Mark::Active;
                            stack.push((m, 0));
                        }
                        Mark::Active => {
                            return Err(VerifyError::new(
                                codes::V0004,
                                Some(m),
                                format!("operand cycle through %{} without a phi", m.0),
                            ));
                        }
                        Mark::Done => {}
                    }
                } else {
                    mark[n.index()] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// The set of nodes reachable from End through inputs and block links.
pub fn reachable_from_end(graph: &Graph) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = vec![graph.end(), graph.end_block()];
    while let Some(n) = stack.pop() {
        if !seen.insert(n) {
            continue;
        }
        let node = graph.node(n);
        stack.extend(node.ins.iter().copied());
        stack.extend(node.block);
    }
    seen
}
