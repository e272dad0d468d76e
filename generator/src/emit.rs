// emit.rs — `.ir` text writer
//
// Serializes a generated program to the line-oriented `.ir` format read back
// by `reader.rs`:
//
//   irsmith-ir 1
//   seed 42
//   types {
//     #0 prim Bs size 1
//     #8 struct struct_0 size 6 { &0 m0 #1 at 0, &1 m1 #4 at 2 }
//     #18 ptr #4 size 8
//   }
//   func _main (Is) -> (Is) {
//     %0 = Block X ()
//     %2 = Start T @%0 ()
//     %9 = Add Is @%0 (%5, %8)
//     ...
//   }
//
// Forwarders are omitted and every reference is printed through them, so
// the output contains exactly the live nodes in arena order.
//
// Preconditions: none; placeholders are printed as `Dummy` if present.
// Postconditions: output is a pure function of the program.
// Failure modes: none.
// Side effects: none.

use std::fmt::Write;

use crate::ir::{Graph, Node, Op, Signature};
use crate::prog::Prog;
use crate::types::{Mode, TypeKind, TypeUniverse};

pub const FORMAT_VERSION: u32 = 1;

pub fn emit_program(prog: &Prog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "irsmith-ir {FORMAT_VERSION}");
    let _ = writeln!(out, "seed {}", prog.seed);
    emit_types(&mut out, &prog.types);
    for f in &prog.funcs {
        emit_function(&mut out, &f.graph, &prog.signatures[f.id.index()], &prog.signatures);
    }
    out
}

pub fn emit_types(out: &mut String, types: &TypeUniverse) {
    out.push_str("types {\n");
    for (id, def) in types.types() {
        let _ = write!(out, "  #{} ", id.0);
        match &def.kind {
            TypeKind::Primitive(mode) => {
                let _ = write!(out, "prim {mode} size {}", def.size);
            }
            TypeKind::Struct { name, members } | TypeKind::Union { name, members } => {
                let keyword = if matches!(def.kind, TypeKind::Union { .. }) {
                    "union"
                } else {
                    "struct"
                };
                let list: Vec<String> = members
                    .iter()
                    .map(|&e| {
                        let ent = types.entity(e);
                        format!("&{} {} #{} at {}", e.0, ent.name, ent.ty.0, ent.offset)
                    })
                    .collect();
                let _ = write!(
                    out,
                    "{keyword} {name} size {} {{ {} }}",
                    def.size,
                    list.join(", ")
                );
            }
            TypeKind::Pointer(to) => {
                let _ = write!(out, "ptr #{} size {}", to.0, def.size);
            }
        }
        out.push('\n');
    }
    out.push_str("}\n");
}

fn mode_list(modes: &[Mode]) -> String {
    modes
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn emit_function(out: &mut String, graph: &Graph, sig: &Signature, sigs: &[Signature]) {
    let _ = writeln!(
        out,
        "func {} ({}) -> ({}) {{",
        sig.name,
        mode_list(&sig.params),
        mode_list(&sig.results)
    );
    for (id, node) in graph.live_nodes() {
        let _ = writeln!(out, "  %{} = {}", id.0, node_text(graph, node, sigs));
    }
    out.push_str("}\n");
}

fn node_text(graph: &Graph, node: &Node, sigs: &[Signature]) -> String {
    let mut s = node.op.name().to_string();
    match node.op {
        Op::Proj(n) => {
            let _ = write!(s, "[{n}]");
        }
        Op::Const(bits) => {
            let _ = write!(s, "[{}]", node.mode.interpret(bits));
        }
        Op::Cmp(rel) => {
            let _ = write!(s, "[{}]", rel.name());
        }
        Op::Alloc(ty) => {
            let _ = write!(s, "[#{}]", ty.0);
        }
        Op::Call(callee) => match sigs.get(callee.index()) {
            Some(sig) => {
                let _ = write!(s, "[{}]", sig.name);
            }
            None => {
                let _ = write!(s, "[#{}]", callee.0);
            }
        },
        Op::Member(e) => {
            let _ = write!(s, "[&{}]", e.0);
        }
        _ => {}
    }
    let _ = write!(s, " {}", node.mode);
    if let Some(b) = node.block {
        let _ = write!(s, " @%{}", graph.skip_id(b).0);
    }
    let ins: Vec<String> = node
        .ins
        .iter()
        .map(|&i| format!("%{}", graph.skip_id(i).0))
        .collect();
    let _ = write!(s, " ({})", ins.join(", "));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinOp;

    #[test]
    fn hand_built_function() {
        let sigs = vec![Signature {
            name: "_main".into(),
            params: vec![Mode::Is],
            results: vec![Mode::Is],
        }];
        let mut g = Graph::new(&[Mode::Is]);
        let sb = g.start_block();
        let d = g.new_dummy(sb, Mode::Is);
        let sum = g.new_binary(sb, BinOp::Add, g.arg(0), d);
        let minus_one = g.new_const(Mode::Is, u64::MAX);
        g.exchange(d, minus_one);
        let ret = g.new_return(sb, g.initial_mem(), &[sum]);
        let eb = g.end_block();
        g.add_block_pred(eb, ret);
        g.mature(eb);

        let mut out = String::new();
        emit_function(&mut out, &g, &sigs[0], &sigs);
        insta::assert_snapshot!(out, @r"
        func _main (Is) -> (Is) {
          %0 = Block X ()
          %1 = Block X (%9)
          %2 = Start T @%0 ()
          %3 = End X @%1 ()
          %4 = Proj[0] M @%0 (%2)
          %5 = Proj[1] Is @%0 (%2)
          %7 = Add Is @%0 (%5, %8)
          %8 = Const[-1] Is @%0 ()
          %9 = Return X @%0 (%4, %7)
        }
        ");
    }

    #[test]
    fn types_block() {
        let mut rng = crate::rng::GenRng::new(1);
        let mut types = TypeUniverse::generate(&mut rng);
        let is = types.primitive(Mode::Is);
        types.pointer_to(is);
        let mut out = String::new();
        emit_types(&mut out, &types);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "types {");
        assert_eq!(lines[1], "  #0 prim Bs size 1");
        assert_eq!(lines[5], "  #4 prim Is size 4");
        assert!(lines[9].starts_with("  #8 struct struct_0 size ") || lines[9].starts_with("  #8 union union_0 size "));
        assert_eq!(lines[lines.len() - 2], "  #18 ptr #4 size 8");
        assert_eq!(*lines.last().unwrap(), "}");
    }
}
