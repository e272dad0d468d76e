// callgraph.rs — Caller → callee edges between generated functions
//
// Records every call site the resolver creates and answers transitive
// reachability, which is what keeps the call graph acyclic when recursive
// cycles are disabled.

use std::collections::BTreeSet;

use crate::id::FuncId;

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    /// Callees per caller, deduplicated.
    callees: Vec<BTreeSet<FuncId>>,
    n_sites: usize,
}

impl CallGraph {
    pub fn new(n_funcs: usize) -> Self {
        CallGraph {
            callees: vec![BTreeSet::new(); n_funcs],
            n_sites: 0,
        }
    }

    /// Record one call site from `caller` to `callee`.
    pub fn add_call(&mut self, caller: FuncId, callee: FuncId) {
        self.callees[caller.index()].insert(callee);
        self.n_sites += 1;
    }

    pub fn callees(&self, f: FuncId) -> impl Iterator<Item = FuncId> + '_ {
        self.callees[f.index()].iter().copied()
    }

    pub fn has_edge(&self, caller: FuncId, callee: FuncId) -> bool {
        self.callees[caller.index()].contains(&callee)
    }

    /// Distinct caller → callee pairs.
    pub fn edge_count(&self) -> usize {
        self.callees.iter().map(BTreeSet::len).sum()
    }

    /// Total call sites registered, counting repeats.
    pub fn site_count(&self) -> usize {
        self.n_sites
    }

    /// Whether `to` is reachable from `from` along call edges.
    /// A function always reaches itself.
    pub fn reaches(&self, from: FuncId, to: FuncId) -> bool {
        if from == to {
            return true;
        }
        let mut seen = vec![false; self.callees.len()];
        let mut stack = vec![from];
        seen[from.index()] = true;
        while let Some(f) = stack.pop() {
            for g in self.callees(f) {
                if g == to {
                    return true;
                }
                if !seen[g.index()] {
                    seen[g.index()] = true;
                    stack.push(g);
                }
            }
        }
        false
    }

    /// Whether any function can reach itself through at least one call.
    pub fn has_cycle(&self) -> bool {
        (0..self.callees.len()).map(FuncId::from_index).any(|f| {
            self.callees(f).any(|g| self.reaches(g, f))
        })
    }
}
