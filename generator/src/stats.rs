// stats.rs — Generation statistics
//
// Per-function shape counts plus a program-wide histogram of the operations
// the resolver created. Rendered as a text table for `--stats` and as JSON
// for `--emit stats`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::ir::Op;
use crate::prog::Prog;

/// Histogram of created operations by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OpStats {
    counts: BTreeMap<String, usize>,
}

impl OpStats {
    pub fn register_op(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuncStats {
    pub name: String,
    pub blocks: usize,
    pub branches: usize,
    pub exits: usize,
    pub self_loops: usize,
    pub temporaries: usize,
    pub nodes: usize,
    pub calls: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgStats {
    pub seed: u64,
    pub functions: Vec<FuncStats>,
    pub call_edges: usize,
    pub ops: OpStats,
}

impl ProgStats {
    pub fn collect(prog: &Prog, ops: OpStats) -> Self {
        let functions = prog
            .funcs
            .iter()
            .map(|f| {
                let cfg = &f.cfg;
                let blocks: Vec<_> = cfg.block_ids().collect();
                FuncStats {
                    name: prog.name(f.id).to_string(),
                    blocks: blocks.len(),
                    branches: blocks
                        .iter()
                        .filter(|&&b| cfg.block(b).succs.len() == 2)
                        .count(),
                    exits: cfg.exits().len(),
                    self_loops: blocks
                        .iter()
                        .filter(|&&b| cfg.block(b).succs.contains(&b))
                        .count(),
                    temporaries: cfg.n_temps(),
                    nodes: f.graph.live_nodes().count(),
                    calls: f.graph.count_op(|op| matches!(op, Op::Call(_))),
                }
            })
            .collect();
        ProgStats {
            seed: prog.seed,
            functions,
            call_edges: prog.calls.edge_count(),
            ops,
        }
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default() + "\n"
    }
}

impl fmt::Display for ProgStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "seed {}", self.seed)?;
        writeln!(
            f,
            "{:<16} {:>6} {:>8} {:>5} {:>5} {:>6} {:>6} {:>5}",
            "function", "blocks", "branches", "exits", "loops", "temps", "nodes", "calls"
        )?;
        for s in &self.functions {
            writeln!(
                f,
                "{:<16} {:>6} {:>8} {:>5} {:>5} {:>6} {:>6} {:>5}",
                s.name, s.blocks, s.branches, s.exits, s.self_loops, s.temporaries, s.nodes, s.calls
            )?;
        }
        writeln!(f, "call edges {}", self.call_edges)?;
        writeln!(f, "operations ({} total)", self.ops.total())?;
        for (name, n) in self.ops.iter() {
            writeln!(f, "  {name:<8} {n:>6}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts() {
        let mut ops = OpStats::default();
        ops.register_op("Add");
        ops.register_op("Add");
        ops.register_op("Phi");
        assert_eq!(ops.get("Add"), 2);
        assert_eq!(ops.get("Load"), 0);
        assert_eq!(ops.total(), 3);
        assert_eq!(
            ops.iter().collect::<Vec<_>>(),
            vec![("Add", 2), ("Phi", 1)]
        );
    }

    #[test]
    fn text_table() {
        let mut ops = OpStats::default();
        ops.register_op("Const");
        let stats = ProgStats {
            seed: 3,
            functions: vec![FuncStats {
                name: "_main".into(),
                blocks: 2,
                branches: 0,
                exits: 1,
                self_loops: 0,
                temporaries: 1,
                nodes: 9,
                calls: 0,
            }],
            call_edges: 0,
            ops,
        };
        insta::assert_snapshot!(stats.to_string(), @r"
        seed 3
        function         blocks branches exits loops  temps  nodes calls
        _main                 2        0     1     0      1      9     0
        call edges 0
        operations (1 total)
          Const         1
        ");
        let json = stats.to_json();
        assert!(json.contains("\"Const\": 1"));
        assert!(json.contains("\"name\": \"_main\""));
    }
}
