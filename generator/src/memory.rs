// memory.rs — Per-function memory chain linking
//
// During resolution each block threads side effects through a private
// token: `mem` is a placeholder for the state entering the block, `last_mem`
// the state leaving it. This pass gives every block's entry placeholder its
// real predecessor state, turning the per-block chains into one chain for
// the whole function:
//   - start block: the graph's initial memory
//   - one predecessor: that block's outgoing state
//   - several predecessors: a memory phi over their outgoing states, in
//     backend predecessor order; the block is kept alive so the phi
//     survives even on an otherwise dead loop
//
// Preconditions: resolution finished; every block still holds its entry
// placeholder in `mem`.
// Postconditions: no memory placeholder remains; `mem` and `last_mem` are cleared.
// Failure modes: missing tokens or unmatched predecessors → `GenError::Invariant`.
// Side effects: none.

use crate::cfg::Cfg;
use crate::diag::{codes, GenError};
use crate::id::{BlockId, NodeId};
use crate::ir::Graph;
use crate::types::Mode;

pub fn link_memory(cfg: &mut Cfg, graph: &mut Graph) -> Result<(), GenError> {
    let order = cfg.postorder_from_exits();
    let mut n_phis = 0usize;
    for &b in &order {
        let irb = cfg.block(b).irb.ok_or_else(|| {
            GenError::invariant(codes::I0005, format!("block {} was never materialized", b.0))
        })?;
        let entry = cfg.block(b).mem.ok_or_else(|| {
            GenError::invariant(codes::I0003, format!("block {} has no entry memory token", b.0))
        })?;

        let incoming = if b == cfg.start() {
            graph.initial_mem()
        } else {
            let n_preds = graph.block_preds(irb).len();
            let mut states = Vec::with_capacity(n_preds);
            for i in 0..n_preds {
                let pred = backend_pred(cfg, graph, b, irb, i)?;
                states.push(outgoing(cfg, graph, pred)?);
            }
            match states.as_slice() {
                [] => {
                    return Err(GenError::invariant(
                        codes::I0003,
                        format!("block {} has no predecessor to take memory from", b.0),
                    ))
                }
                [single] => *single,
                _ => {
                    let phi = graph.new_phi(irb, states, Mode::M);
                    graph.keep_alive(irb);
                    n_phis += 1;
                    phi
                }
            }
        };
        graph.exchange(entry, incoming);
    }

    for b in order {
        let cfb = cfg.block_mut(b);
        cfb.mem = None;
        cfb.last_mem = None;
    }
    tracing::debug!(blocks = cfg.len(), memory_phis = n_phis, "memory linked");
    Ok(())
}

/// The topology block behind control input `i` of backend block `irb`.
fn backend_pred(
    cfg: &Cfg,
    graph: &Graph,
    b: BlockId,
    irb: NodeId,
    i: usize,
) -> Result<BlockId, GenError> {
    graph
        .pred_block(irb, i)
        .and_then(|pred_irb| {
            cfg.block(b)
                .preds
                .iter()
                .copied()
                .find(|&p| cfg.block(p).irb == Some(pred_irb))
        })
        .ok_or_else(|| {
            GenError::invariant(
                codes::I0002,
                format!("control input {i} of block {} matches no predecessor", b.0),
            )
        })
}

fn outgoing(cfg: &Cfg, graph: &Graph, b: BlockId) -> Result<NodeId, GenError> {
    cfg.block(b)
        .last_mem
        .map(|m| graph.skip_id(m))
        .ok_or_else(|| {
            GenError::invariant(codes::I0003, format!("block {} has no outgoing memory", b.0))
        })
}
