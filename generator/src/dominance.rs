// dominance.rs — Use-before-def guard for value reuse
//
// Before an existing value is wired into a new position, the resolver asks
// whether that value already depends on the position it would fill. If it
// does, the rewrite would close an operand cycle with no phi on it.

use std::collections::HashSet;

use crate::ir::{Graph, Op};
use crate::id::NodeId;

/// True if `target` is reachable from `node` through operand edges without
/// crossing a phi. Phi inputs are control merges and end the search, except
/// that `node` itself is always expanded.
pub fn is_reachable_without_def(graph: &Graph, node: NodeId, target: NodeId) -> bool {
    assert_ne!(node, target, "dominance query on %{} against itself", node.0);

    let mut visited = HashSet::new();
    let mut stack = vec![node];
    visited.insert(node);
    while let Some(n) = stack.pop() {
        for &input in &graph.node(n).ins {
            if input == target {
                return true;
            }
            if graph.node(input).op == Op::Phi {
                continue;
            }
            if visited.insert(input) {
                stack.push(input);
            }
        }
    }
    false
}
