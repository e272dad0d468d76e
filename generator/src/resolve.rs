// resolve.rs — Temporary resolution
//
// Turns every placeholder left by the materializer into a concrete
// operation. Each temporary draws a strategy from a size-adaptive weight
// table; strategies may spawn further temporaries (in the same block, or in
// predecessor blocks for phis), so resolution runs as a walk over
// predecessors from every exit followed by a sweep until no block has
// pending work. Weights shift from expanding strategies (operators, phis)
// toward terminal ones (constants, reuse) as a block fills up, which is
// what drives the process to completion.
//
// Preconditions: the function is materialized; memory tokens are still
// per-block placeholders.
// Postconditions: no temporary is pending; every value placeholder has been
// exchanged for its definition.
// Failure modes: backend predecessor lookup failures and leftover
// temporaries are `GenError::Invariant`.
// Side effects: records call edges, operation counts and reuse/store decisions.

use std::collections::HashSet;

use crate::callgraph::CallGraph;
use crate::cfg::{Cfg, Temporary};
use crate::config::GenConfig;
use crate::diag::{codes, GenError};
use crate::dominance::is_reachable_without_def;
use crate::id::{BlockId, FuncId, NodeId, TempId};
use crate::ir::{pn, BinOp, Graph, Relation, Signature};
use crate::prog::Prog;
use crate::rng::{interpolation_prefix_sum, GenRng};
use crate::stats::OpStats;
use crate::types::{Mode, TypeUniverse, ValueType};

/// A resolved value is additionally stored to memory with chance 1 in this.
pub const SEED_STORE_ONE_IN: usize = 8;

// ── Strategies ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Constant,
    Operator,
    Compare,
    Phi,
    Reuse,
    Load,
    Alloc,
    Member,
    Convert,
    Call,
}

/// `(strategy, weight at an empty block, weight at a full block)`.
/// Both weight columns sum to 100.
pub const PRIMITIVE_TABLE: [(Strategy, f64, f64); 7] = [
    (Strategy::Operator, 50.0, 10.0),
    (Strategy::Constant, 10.0, 35.0),
    (Strategy::Phi, 5.0, 10.0),
    (Strategy::Reuse, 10.0, 30.0),
    (Strategy::Load, 10.0, 5.0),
    (Strategy::Convert, 10.0, 5.0),
    (Strategy::Call, 5.0, 5.0),
];

pub const POINTER_TABLE: [(Strategy, f64, f64); 4] = [
    (Strategy::Phi, 20.0, 10.0),
    (Strategy::Alloc, 40.0, 40.0),
    (Strategy::Member, 30.0, 10.0),
    (Strategy::Reuse, 10.0, 40.0),
];

/// Pick a strategy from `table` for a block filled to `factor` of its target.
///
/// A draw that lands past the last cumulative weight is repeated.
pub fn draw_strategy(table: &[(Strategy, f64, f64)], factor: f64, rng: &mut GenRng) -> Strategy {
    let weights: Vec<(f64, f64)> = table.iter().map(|&(_, s, e)| (s, e)).collect();
    let sums = interpolation_prefix_sum(&weights, factor);
    loop {
        let p = rng.percentage();
        if let Some(i) = sums.iter().position(|&s| s > p) {
            return table[i].0;
        }
    }
}

// ── Decisions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// An earlier value replaced a placeholder.
    Reuse,
    /// A value was stored ahead of the block's current memory state.
    SeedStore,
}

/// A candidate wiring of an existing value into a new position.
///
/// `reachable` is the dominance answer for `(value, target)` at the time of
/// the decision; `taken` is false when that answer vetoed the wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub func: FuncId,
    pub kind: DecisionKind,
    pub value: NodeId,
    pub target: NodeId,
    pub reachable: bool,
    pub taken: bool,
}

// ── Context ──────────────────────────────────────────────────────────────

/// Everything resolution of one function reads or writes.
pub struct ResolveCtx<'a> {
    pub func: FuncId,
    pub cfg: &'a mut Cfg,
    pub graph: &'a mut Graph,
    pub n_calls: &'a mut usize,
    pub types: &'a mut TypeUniverse,
    pub calls: &'a mut CallGraph,
    pub signatures: &'a [Signature],
    pub rng: &'a mut GenRng,
    pub config: &'a GenConfig,
    pub stats: &'a mut OpStats,
    pub decisions: &'a mut Vec<Decision>,
}

impl<'a> ResolveCtx<'a> {
    pub fn new(
        prog: &'a mut Prog,
        func: FuncId,
        rng: &'a mut GenRng,
        config: &'a GenConfig,
        stats: &'a mut OpStats,
        decisions: &'a mut Vec<Decision>,
    ) -> Self {
        let Prog {
            types,
            signatures,
            funcs,
            calls,
            ..
        } = prog;
        let f = &mut funcs[func.index()];
        ResolveCtx {
            func,
            cfg: &mut f.cfg,
            graph: &mut f.graph,
            n_calls: &mut f.n_calls,
            types,
            calls,
            signatures: signatures.as_slice(),
            rng,
            config,
            stats,
            decisions,
        }
    }
}

/// Resolve every temporary of the context's function.
pub fn resolve_function(ctx: &mut ResolveCtx<'_>) -> Result<(), GenError> {
    let initial = ctx.cfg.pending_count();
    for exit in ctx.cfg.exits() {
        let mut visited = HashSet::new();
        ctx.visit(exit, &mut visited)?;
    }
    // Phi operands can land in blocks an earlier walk has already left.
    loop {
        let Some(b) = ctx.cfg.block_ids().find(|&b| ctx.cfg.has_pending(b)) else {
            break;
        };
        let mut visited = HashSet::new();
        ctx.visit(b, &mut visited)?;
    }

    let left = ctx.cfg.pending_count();
    if left > 0 {
        return Err(GenError::invariant(
            codes::I0001,
            format!("{left} temporaries left unresolved in function #{}", ctx.func.0),
        ));
    }
    tracing::debug!(
        func = ctx.func.0,
        initial,
        resolved = ctx.cfg.n_temps(),
        calls = *ctx.n_calls,
        "temporaries resolved"
    );
    Ok(())
}

impl ResolveCtx<'_> {
    fn visit(&mut self, b: BlockId, visited: &mut HashSet<BlockId>) -> Result<(), GenError> {
        loop {
            if !self.cfg.has_pending(b) && visited.contains(&b) {
                return Ok(());
            }
            visited.insert(b);
            while let Some(t) = self.cfg.take_pending(b) {
                self.resolve(t)?;
            }
            let preds = self.cfg.block(b).preds.clone();
            for p in preds {
                self.visit(p, visited)?;
            }
        }
    }

    fn resolve(&mut self, t: TempId) -> Result<(), GenError> {
        let temp = self.cfg.temp(t).clone();
        let value = loop {
            let strategy = self.draw(&temp);
            if let Some(v) = self.apply(strategy, &temp)? {
                break v;
            }
        };
        self.graph.exchange(temp.node, value);
        self.cfg.mark_resolved(t, value);

        if self.config.memory && temp.ty.is_storable() && self.rng.chance(SEED_STORE_ONE_IN) {
            self.seed_store(temp.block, temp.ty, value)?;
        }
        Ok(())
    }

    fn draw(&mut self, temp: &Temporary) -> Strategy {
        let table: &[(Strategy, f64, f64)] = match temp.ty {
            ValueType::Bool => return Strategy::Compare,
            ValueType::Prim(_) => &PRIMITIVE_TABLE,
            ValueType::Ptr(_) => &POINTER_TABLE,
        };
        let n_nodes = self.cfg.block(temp.block).n_nodes;
        let factor = (n_nodes as f64 / self.config.cfb_size as f64).min(1.0);
        draw_strategy(table, factor, self.rng)
    }

    /// Try `strategy`; `None` means it does not apply here.
    fn apply(&mut self, strategy: Strategy, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        let value = match strategy {
            Strategy::Constant => Some(self.constant(temp)),
            Strategy::Operator => Some(self.operator(temp)?),
            Strategy::Compare => Some(self.compare(temp)?),
            Strategy::Phi => self.phi(temp)?,
            Strategy::Reuse => self.reuse(temp),
            Strategy::Load => self.load(temp)?,
            Strategy::Alloc => self.alloc(temp)?,
            Strategy::Member => self.member(temp)?,
            Strategy::Convert => self.convert(temp)?,
            Strategy::Call => self.call(temp)?,
        };
        Ok(value)
    }

    // ── Helpers ──

    fn irb(&self, b: BlockId) -> Result<NodeId, GenError> {
        self.cfg.block(b).irb.ok_or_else(|| {
            GenError::invariant(codes::I0005, format!("block {} was never materialized", b.0))
        })
    }

    /// New temporary of type `ty` in block `b`; returns its placeholder.
    fn spawn(&mut self, b: BlockId, ty: ValueType) -> Result<NodeId, GenError> {
        let irb = self.irb(b)?;
        let dummy = self.graph.new_dummy(irb, ty.mode());
        self.cfg.add_temporary(b, ty, dummy);
        Ok(dummy)
    }

    fn created(&mut self, b: BlockId, op: &str) {
        self.cfg.block_mut(b).n_nodes += 1;
        self.stats.register_op(op);
    }

    /// Insert a side effect at the head of `b`'s memory chain.
    ///
    /// `make` receives the memory input and returns the effect's tuple node;
    /// its memory projection takes over every use of the block's current
    /// token, and the fresh input becomes the new current token.
    fn thread_memory(
        &mut self,
        b: BlockId,
        make: impl FnOnce(&mut Graph, NodeId) -> NodeId,
    ) -> Result<NodeId, GenError> {
        let irb = self.irb(b)?;
        let old = self.cfg.block(b).mem.ok_or_else(|| {
            GenError::invariant(codes::I0003, format!("block {} has no memory token", b.0))
        })?;
        let mem_in = self.graph.new_dummy(irb, Mode::M);
        let op = make(&mut *self.graph, mem_in);
        let mem_out = self.graph.new_proj(irb, op, Mode::M, pn::MEM);
        self.graph.exchange(old, mem_out);

        let cfb = self.cfg.block_mut(b);
        if cfb.last_mem == Some(old) {
            cfb.last_mem = Some(mem_out);
        }
        cfb.mem = Some(mem_in);
        Ok(op)
    }

    // ── Strategies ──

    fn constant(&mut self, temp: &Temporary) -> NodeId {
        let bits = self.rng.bits();
        let c = self.graph.new_const(temp.ty.mode(), bits);
        self.created(temp.block, "Const");
        c
    }

    fn operator(&mut self, temp: &Temporary) -> Result<NodeId, GenError> {
        let op = BinOp::ALL[self.rng.below(BinOp::ALL.len())];
        let irb = self.irb(temp.block)?;
        let l = self.spawn(temp.block, temp.ty)?;
        let r = self.spawn(temp.block, temp.ty)?;
        let n = self.graph.new_binary(irb, op, l, r);
        self.created(temp.block, op.name());
        Ok(n)
    }

    fn compare(&mut self, temp: &Temporary) -> Result<NodeId, GenError> {
        let mode = self.types.random_primitive(self.rng);
        let rel = Relation::ALL[self.rng.below(Relation::ALL.len())];
        let irb = self.irb(temp.block)?;
        let l = self.spawn(temp.block, ValueType::Prim(mode))?;
        let r = self.spawn(temp.block, ValueType::Prim(mode))?;
        let n = self.graph.new_cmp(irb, rel, l, r);
        self.created(temp.block, "Cmp");
        Ok(n)
    }

    /// One operand per backend predecessor, spawned in the matching block.
    fn phi(&mut self, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        if temp.block == self.cfg.start() {
            return Ok(None);
        }
        let irb = self.irb(temp.block)?;
        let n_preds = self.graph.block_preds(irb).len();
        if n_preds == 0 {
            return Ok(None);
        }

        let mut ins = Vec::with_capacity(n_preds);
        for i in 0..n_preds {
            let pred_irb = self.graph.pred_block(irb, i).ok_or_else(|| {
                GenError::invariant(codes::I0002, format!("control input {i} of %{} has no block", irb.0))
            })?;
            let pred = self
                .cfg
                .block(temp.block)
                .preds
                .iter()
                .copied()
                .find(|&p| self.cfg.block(p).irb == Some(pred_irb))
                .ok_or_else(|| {
                    GenError::invariant(
                        codes::I0002,
                        format!(
                            "backend predecessor %{} of block {} has no topology edge",
                            pred_irb.0, temp.block.0
                        ),
                    )
                })?;
            ins.push(self.spawn(pred, temp.ty)?);
        }
        let phi = self.graph.new_phi(irb, ins, temp.ty.mode());
        self.created(temp.block, "Phi");
        Ok(Some(phi))
    }

    fn reuse(&mut self, temp: &Temporary) -> Option<NodeId> {
        let graph: &Graph = self.graph;
        let cfg: &Cfg = self.cfg;
        let survivors: Vec<(NodeId, bool)> = cfg
            .resolved_of(temp.block, temp.ty)
            .map(|c| graph.skip_id(cfg.temp(c).node))
            .map(|v| (v, is_reachable_without_def(graph, v, temp.node)))
            .filter(|&(_, reachable)| !reachable)
            .collect();
        let (value, reachable) = *self.rng.pick(&survivors)?;
        self.decisions.push(Decision {
            func: self.func,
            kind: DecisionKind::Reuse,
            value,
            target: temp.node,
            reachable,
            taken: true,
        });
        self.stats.register_op("Reuse");
        Some(value)
    }

    fn load(&mut self, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        let ValueType::Prim(mode) = temp.ty else {
            return Ok(None);
        };
        if !self.config.memory {
            return Ok(None);
        }
        let irb = self.irb(temp.block)?;
        let pointee = self.types.primitive(mode);
        let ptr = self.spawn(temp.block, ValueType::Ptr(pointee))?;
        let load = self.thread_memory(temp.block, |g, mem| g.new_load(irb, mem, ptr))?;
        let value = self.graph.new_proj(irb, load, mode, pn::RES);
        self.created(temp.block, "Load");
        Ok(Some(value))
    }

    fn alloc(&mut self, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        let ValueType::Ptr(pointee) = temp.ty else {
            return Ok(None);
        };
        if !self.config.memory {
            return Ok(None);
        }
        let irb = self.irb(temp.block)?;
        let size = self
            .graph
            .new_const(Mode::Iu, u64::from(self.types.size_of(pointee)));
        let alloc = self.thread_memory(temp.block, |g, mem| g.new_alloc(irb, mem, size, pointee))?;
        let value = self.graph.new_proj(irb, alloc, Mode::P, pn::RES);
        self.created(temp.block, "Alloc");
        Ok(Some(value))
    }

    fn member(&mut self, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        let ValueType::Ptr(pointee) = temp.ty else {
            return Ok(None);
        };
        let Some(entity) = self.types.associated_entity(pointee) else {
            return Ok(None);
        };
        let owner = self.types.entity(entity).owner;
        let irb = self.irb(temp.block)?;
        let base = self.spawn(temp.block, ValueType::Ptr(owner))?;
        let value = self.graph.new_member(irb, base, entity);
        self.created(temp.block, "Member");
        Ok(Some(value))
    }

    fn convert(&mut self, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        let ValueType::Prim(mode) = temp.ty else {
            return Ok(None);
        };
        let from = self.types.random_primitive_except(self.rng, mode);
        let irb = self.irb(temp.block)?;
        let operand = self.spawn(temp.block, ValueType::Prim(from))?;
        let value = self.graph.new_conv(irb, operand, mode);
        self.created(temp.block, "Conv");
        Ok(Some(value))
    }

    fn call(&mut self, temp: &Temporary) -> Result<Option<NodeId>, GenError> {
        let ValueType::Prim(mode) = temp.ty else {
            return Ok(None);
        };
        if !self.config.func_calls || *self.n_calls >= self.config.max_calls {
            return Ok(None);
        }
        let signatures = self.signatures;
        if signatures.len() <= 1 {
            return Ok(None);
        }
        // The entry function is never a call target.
        let callee = FuncId::from_index(1 + self.rng.below(signatures.len() - 1));
        if !self.config.func_cycles && self.calls.reaches(callee, self.func) {
            return Ok(None);
        }
        let sig = &signatures[callee.index()];
        if sig.results.first() != Some(&mode) {
            return Ok(None);
        }

        self.calls.add_call(self.func, callee);
        *self.n_calls += 1;
        tracing::debug!(caller = self.func.0, callee = callee.0, "call registered");

        let irb = self.irb(temp.block)?;
        let mut args = Vec::with_capacity(sig.params.len());
        for &param in &sig.params {
            args.push(self.spawn(temp.block, ValueType::Prim(param))?);
        }
        let call = self.thread_memory(temp.block, |g, mem| g.new_call(irb, mem, callee, &args))?;
        let value = self.graph.new_proj(irb, call, mode, pn::RES);
        self.created(temp.block, "Call");
        Ok(Some(value))
    }

    /// Store `value` through a fresh pointer temporary, unless the store
    /// would feed the block's memory chain back into `value`.
    fn seed_store(&mut self, b: BlockId, ty: ValueType, value: NodeId) -> Result<(), GenError> {
        let Some(mem) = self.cfg.block(b).mem else {
            return Err(GenError::invariant(
                codes::I0003,
                format!("block {} has no memory token", b.0),
            ));
        };
        let Some(pointee) = self.types.storage_pointee(ty) else {
            return Ok(());
        };
        let reachable = is_reachable_without_def(self.graph, value, mem);
        self.decisions.push(Decision {
            func: self.func,
            kind: DecisionKind::SeedStore,
            value,
            target: mem,
            reachable,
            taken: !reachable,
        });
        if reachable {
            return Ok(());
        }
        let irb = self.irb(b)?;
        let ptr = self.spawn(b, ValueType::Ptr(pointee))?;
        self.thread_memory(b, |g, mem_in| g.new_store(irb, mem_in, ptr, value))?;
        self.created(b, "Store");
        Ok(())
    }
}
