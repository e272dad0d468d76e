// materialize.rs — Topology → backend blocks and control edges
//
// One depth-first walk from the start block creates a backend block per
// topology block and wires its outgoing control flow:
//   - 0 successors: Return of fresh result placeholders into the end block
//   - 1 successor:  Jmp
//   - 2 successors: Cond on a fresh boolean placeholder; successor 0 takes
//                   the false projection, successor 1 the true projection
// Every block also receives a placeholder memory token. Blocks are matured
// in a separate post-order pass once all their control inputs exist. The
// end block is matured later by the driver.
//
// Preconditions: `cfg` is well formed and not yet materialized; `graph` is fresh.
// Postconditions: every topology block has `irb`, `mem` and `last_mem` set;
// all backend blocks except the end block are mature.
// Failure modes: none.
// Side effects: none.

use std::collections::HashSet;

use crate::cfg::Cfg;
use crate::id::{BlockId, NodeId};
use crate::ir::{pn, Graph, Signature};
use crate::types::{Mode, ValueType};

pub fn materialize(cfg: &mut Cfg, graph: &mut Graph, sig: &Signature) {
    let start = cfg.start();
    cfg.block_mut(start).irb = Some(graph.start_block());

    let mut visited = HashSet::new();
    let mut postorder = Vec::with_capacity(cfg.len());
    let mut stack: Vec<(BlockId, usize)> = vec![(start, 0)];
    visited.insert(start);
    wire_block(cfg, graph, sig, start);

    while let Some(top) = stack.last_mut() {
        let (b, next) = *top;
        if let Some(&s) = cfg.block(b).succs.get(next) {
            top.1 += 1;
            if visited.insert(s) {
                wire_block(cfg, graph, sig, s);
                stack.push((s, 0));
            }
        } else {
            postorder.push(b);
            stack.pop();
        }
    }

    for b in postorder {
        if let Some(irb) = cfg.block(b).irb {
            graph.mature(irb);
        }
    }
}

fn backend_block(cfg: &mut Cfg, graph: &mut Graph, b: BlockId) -> NodeId {
    match cfg.block(b).irb {
        Some(irb) => irb,
        None => {
            let irb = graph.new_block();
            cfg.block_mut(b).irb = Some(irb);
            irb
        }
    }
}

/// Create `b`'s memory token and its outgoing control flow.
fn wire_block(cfg: &mut Cfg, graph: &mut Graph, sig: &Signature, b: BlockId) {
    let irb = backend_block(cfg, graph, b);
    let mem = graph.new_dummy(irb, Mode::M);
    {
        let cfb = cfg.block_mut(b);
        cfb.mem = Some(mem);
        cfb.last_mem = Some(mem);
    }

    let succs = cfg.block(b).succs.clone();
    match succs.as_slice() {
        [] => {
            let results: Vec<NodeId> = sig
                .results
                .iter()
                .map(|&mode| {
                    let d = graph.new_dummy(irb, mode);
                    cfg.add_temporary(b, ValueType::Prim(mode), d);
                    d
                })
                .collect();
            let ret = graph.new_return(irb, mem, &results);
            let end_block = graph.end_block();
            graph.add_block_pred(end_block, ret);
        }
        [s] => {
            let jmp = graph.new_jmp(irb);
            let target = backend_block(cfg, graph, *s);
            graph.add_block_pred(target, jmp);
        }
        [s_false, s_true] => {
            let selector = graph.new_dummy(irb, Mode::B);
            cfg.add_temporary(b, ValueType::Bool, selector);
            let cond = graph.new_cond(irb, selector);
            let f = graph.new_proj(irb, cond, Mode::X, pn::COND_FALSE);
            let t = graph.new_proj(irb, cond, Mode::X, pn::COND_TRUE);
            let target_false = backend_block(cfg, graph, *s_false);
            graph.add_block_pred(target_false, f);
            let target_true = backend_block(cfg, graph, *s_true);
            graph.add_block_pred(target_true, t);
        }
        _ => unreachable!("block {} has more than two successors", b.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Transform;
    use crate::ir::Op;

    fn sig() -> Signature {
        Signature {
            name: "_main".into(),
            params: vec![Mode::Is],
            results: vec![Mode::Is],
        }
    }

    #[test]
    fn skeleton_materializes_to_jmp_and_return() {
        let mut cfg = Cfg::new();
        let mut g = Graph::new(&[Mode::Is]);
        materialize(&mut cfg, &mut g, &sig());

        let start_irb = cfg.block(cfg.start()).irb.unwrap();
        let end_irb = cfg.block(cfg.end()).irb.unwrap();
        assert_eq!(start_irb, g.start_block());
        assert_eq!(g.block_preds(end_irb).len(), 1);
        assert_eq!(g.node(g.block_preds(end_irb)[0]).op, Op::Jmp);
        assert!(g.is_mature(end_irb));
        assert_eq!(g.block_preds(g.end_block()).len(), 1);
        assert!(!g.is_mature(g.end_block()));

        // One result placeholder for the single exit.
        assert_eq!(cfg.pending_count(), 1);
        let t = cfg.temp(cfg.block(cfg.end()).pending[0]);
        assert_eq!(t.ty, ValueType::Prim(Mode::Is));
        assert_eq!(g.node(t.node).op, Op::Dummy);
    }

    #[test]
    fn branch_gets_condition_placeholder() {
        let mut cfg = Cfg::new();
        cfg.apply(cfg.start(), Transform::Extend, true);
        let mut g = Graph::new(&[Mode::Is]);
        materialize(&mut cfg, &mut g, &sig());

        let start = cfg.block(cfg.start());
        assert_eq!(start.pending.len(), 1);
        assert_eq!(cfg.temp(start.pending[0]).ty, ValueType::Bool);

        let false_irb = cfg.block(BlockId(1)).irb.unwrap();
        let true_irb = cfg.block(BlockId(2)).irb.unwrap();
        assert_eq!(g.node(g.block_preds(false_irb)[0]).op, Op::Proj(pn::COND_FALSE));
        assert_eq!(g.node(g.block_preds(true_irb)[0]).op, Op::Proj(pn::COND_TRUE));
        assert_eq!(g.block_preds(g.end_block()).len(), 2);
    }

    #[test]
    fn self_loop_block_has_two_backend_preds() {
        let mut cfg = Cfg::new();
        cfg.apply(cfg.start(), Transform::FanIn, true);
        let mid = BlockId(2);
        assert!(cfg.apply(mid, Transform::SelfLoop, true));
        let mut g = Graph::new(&[Mode::Is]);
        materialize(&mut cfg, &mut g, &sig());

        let irb = cfg.block(mid).irb.unwrap();
        assert_eq!(g.block_preds(irb).len(), 2);
        assert_eq!(g.pred_block(irb, 1), Some(irb));
        assert!(g.is_mature(irb));
        for b in cfg.block_ids() {
            let cfb = cfg.block(b);
            assert!(cfb.mem.is_some());
            assert_eq!(cfb.mem, cfb.last_mem);
        }
    }
}
