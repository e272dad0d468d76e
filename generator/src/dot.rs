// dot.rs — Graphviz DOT output for generated programs
//
// Two views: the control-flow topology of every function (`emit_cfg_dot`),
// and the node graphs themselves (`emit_ir_dot`). Each function becomes one
// cluster; node ids are prefixed with the sanitized function name so that
// clusters never collide.
//
// Preconditions: `prog` has been generated (topologies grown, graphs built).
// Postconditions: returns a valid DOT string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::ir::{Graph, Op};
use crate::prog::Prog;
use crate::types::Mode;

/// Emit every function's control-flow topology as a Graphviz DOT string.
pub fn emit_cfg_dot(prog: &Prog) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph cfg {{");
    let _ = writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10, shape=box];");
    let _ = writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];");

    for f in &prog.funcs {
        let name = prog.name(f.id);
        let fid = sanitize(name);
        let cfg = &f.cfg;
        let _ = writeln!(buf);
        let _ = writeln!(buf, "    subgraph cluster_{fid} {{");
        let _ = writeln!(buf, "        label=\"{name}\";");
        let _ = writeln!(buf, "        style=rounded;");
        let _ = writeln!(buf, "        color=gray50;");

        for b in cfg.block_ids() {
            let block = cfg.block(b);
            let shape = if b == cfg.start() {
                ", shape=invhouse"
            } else if block.succs.is_empty() {
                ", shape=house"
            } else {
                ""
            };
            let _ = writeln!(
                buf,
                "        {fid}_b{} [label=\"{} ({} temps)\"{shape}];",
                b.0,
                b.0,
                block.temps.len()
            );
        }
        for b in cfg.block_ids() {
            let succs = &cfg.block(b).succs;
            for (i, s) in succs.iter().enumerate() {
                let label = match (succs.len(), i) {
                    (2, 0) => " [label=\"false\"]",
                    (2, _) => " [label=\"true\"]",
                    _ => "",
                };
                let _ = writeln!(buf, "        {fid}_b{} -> {fid}_b{}{label};", b.0, s.0);
            }
        }
        let _ = writeln!(buf, "    }}");
    }

    let _ = writeln!(buf, "}}");
    buf
}

/// Emit every function's node graph as a Graphviz DOT string.
///
/// Control edges are dashed, memory edges blue; block placement is shown by
/// a dotted edge from the block node.
pub fn emit_ir_dot(prog: &Prog) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph ir {{");
    let _ = writeln!(buf, "    rankdir=BT;");
    let _ = writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];");

    for f in &prog.funcs {
        let name = prog.name(f.id);
        let _ = writeln!(buf);
        let _ = writeln!(buf, "    subgraph cluster_{} {{", sanitize(name));
        let _ = writeln!(buf, "        label=\"{name}\";");
        write_graph(&mut buf, &sanitize(name), &f.graph);
        let _ = writeln!(buf, "    }}");
    }

    let _ = writeln!(buf, "}}");
    buf
}

fn write_graph(buf: &mut String, fid: &str, graph: &Graph) {
    for (id, node) in graph.live_nodes() {
        let shape = match node.op {
            Op::Block => "box",
            Op::Phi => "diamond",
            _ if node.mode == Mode::X => "cds",
            _ => "ellipse",
        };
        let mut label = format!("%{} {}", id.0, node.op.name());
        match node.op {
            Op::Proj(n) => {
                let _ = write!(label, "[{n}]");
            }
            Op::Const(bits) => {
                let _ = write!(label, "[{}]", node.mode.interpret(bits));
            }
            Op::Cmp(rel) => {
                let _ = write!(label, "[{}]", rel.name());
            }
            _ => {}
        }
        let _ = writeln!(
            buf,
            "        {fid}_n{} [label=\"{label} {}\", shape={shape}];",
            id.0, node.mode
        );
    }

    for (id, node) in graph.live_nodes() {
        if let Some(b) = node.block {
            if node.op != Op::Start && node.op != Op::End {
                let b = graph.skip_id(b);
                let _ = writeln!(
                    buf,
                    "        {fid}_n{} -> {fid}_n{} [style=dotted, color=gray70, arrowhead=none];",
                    b.0, id.0
                );
            }
        }
        for &input in &node.ins {
            let input = graph.skip_id(input);
            let style = match graph.node(input).mode {
                Mode::X => " [style=dashed, color=red]",
                Mode::M => " [color=blue]",
                _ => "",
            };
            let _ = writeln!(buf, "        {fid}_n{} -> {fid}_n{}{style};", input.0, id.0);
        }
    }
}

/// Keep DOT identifiers to `[A-Za-z0-9_]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
