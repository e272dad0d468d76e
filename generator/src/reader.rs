// reader.rs — `.ir` text back to graphs
//
// Rebuilds the signatures and per-function graphs from a parsed `.ir` file so
// that an emitted program can be verified again without regenerating it.
// Node ids in the text may have gaps (forwarders are not printed); they are
// renumbered densely in declaration order, which keeps the fixed graph
// layout intact.
//
// Preconditions: none; any text is accepted and diagnosed.
// Postconditions: on success every graph has the fixed layout, all blocks
// are mature, and type/entity references are in range.
// Failure modes: syntax and lowering problems → `GenError::Read` with one
// message per problem; failed verification → `GenError::Verify`.
// Side effects: none.

use std::collections::HashMap;

use crate::ast::{Attr, FuncDecl, Ident, IrFile, NodeDecl, TypeDeclKind};
use crate::emit::FORMAT_VERSION;
use crate::id::{EntityId, FuncId, NodeId, TypeId};
use crate::ir::{pn, BinOp, Graph, Node, Op, Relation, Signature};
use crate::diag::GenError;
use crate::types::Mode;

#[derive(Debug, Clone)]
pub struct ReadProgram {
    pub seed: u64,
    pub n_types: usize,
    pub n_entities: usize,
    pub signatures: Vec<Signature>,
    pub graphs: Vec<Graph>,
}

impl ReadProgram {
    /// Verify every graph against the signatures read alongside it.
    pub fn verify(&self) -> Result<(), GenError> {
        for (i, graph) in self.graphs.iter().enumerate() {
            graph
                .verify(&self.signatures, FuncId::from_index(i))
                .map_err(|source| GenError::Verify {
                    function: self.signatures[i].name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Parse and lower `source`; `path` only labels diagnostics.
pub fn read_source(path: &str, source: &str) -> Result<ReadProgram, GenError> {
    let result = crate::parser::parse(source);
    let mut messages: Vec<String> = result
        .errors
        .iter()
        .map(|e| at(source, e.span().start, &e.to_string()))
        .collect();
    let program = match result.file {
        Some(file) if messages.is_empty() => lower(source, &file, &mut messages),
        _ => None,
    };
    match program {
        Some(p) if messages.is_empty() => Ok(p),
        _ => Err(GenError::Read {
            path: path.to_string(),
            messages,
        }),
    }
}

/// Read `source` and verify every function in it.
pub fn check_source(path: &str, source: &str) -> Result<ReadProgram, GenError> {
    let program = read_source(path, source)?;
    program.verify()?;
    tracing::debug!(path, functions = program.graphs.len(), "ir file verified");
    Ok(program)
}

fn at(source: &str, offset: usize, message: &str) -> String {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let col = offset - before.rfind('\n').map_or(0, |i| i + 1) + 1;
    format!("{line}:{col}: {message}")
}

// ── Lowering ──

fn lower(source: &str, file: &IrFile, errors: &mut Vec<String>) -> Option<ReadProgram> {
    let mut err = |offset: usize, msg: String| errors.push(at(source, offset, &msg));

    if file.version != i128::from(FORMAT_VERSION) {
        err(
            file.span.start,
            format!("unsupported format version {} (expected {FORMAT_VERSION})", file.version),
        );
    }
    let seed = match u64::try_from(file.seed) {
        Ok(s) => s,
        Err(_) => {
            err(file.span.start, format!("seed {} out of range", file.seed));
            0
        }
    };

    let n_types = file.types.len();
    let mut n_entities = 0usize;
    for (i, decl) in file.types.iter().enumerate() {
        if decl.id as usize != i {
            err(decl.span.start, format!("type #{} declared at position {i}", decl.id));
        }
        match &decl.kind {
            TypeDeclKind::Prim(mode) => {
                if !parse_mode(mode).is_ok_and(Mode::is_int) {
                    err(mode.span.start, format!("'{}' is not a primitive mode", mode.name));
                }
            }
            TypeDeclKind::Compound { members, .. } => {
                for m in members {
                    if m.entity as usize != n_entities {
                        err(m.span.start, format!("entity &{} out of sequence", m.entity));
                    }
                    if m.ty as usize >= n_types {
                        err(m.span.start, format!("member type #{} is not declared", m.ty));
                    }
                    n_entities += 1;
                }
            }
            TypeDeclKind::Ptr(to) => {
                if *to as usize >= n_types {
                    err(decl.span.start, format!("pointee type #{to} is not declared"));
                }
            }
        }
    }

    let mut signatures = Vec::with_capacity(file.funcs.len());
    for f in &file.funcs {
        let params = modes(&f.params, &mut err);
        let results = modes(&f.results, &mut err);
        if signatures.iter().any(|s: &Signature| s.name == f.name.name) {
            err(f.name.span.start, format!("function '{}' defined twice", f.name.name));
        }
        signatures.push(Signature {
            name: f.name.name.clone(),
            params,
            results,
        });
    }

    let scope = Scope {
        n_types,
        n_entities,
        signatures: &signatures,
    };
    let mut graphs = Vec::with_capacity(file.funcs.len());
    for (f, sig) in file.funcs.iter().zip(&signatures) {
        match lower_function(f, sig, &scope) {
            Ok(g) => graphs.push(g),
            Err((offset, msg)) => err(offset, msg),
        }
    }

    Some(ReadProgram {
        seed,
        n_types,
        n_entities,
        signatures,
        graphs,
    })
}

fn parse_mode(id: &Ident) -> Result<Mode, String> {
    id.name.parse()
}

fn modes(ids: &[Ident], err: &mut impl FnMut(usize, String)) -> Vec<Mode> {
    ids.iter()
        .filter_map(|id| match parse_mode(id) {
            Ok(m) if m.is_int() => Some(m),
            Ok(m) => {
                err(id.span.start, format!("mode {m} cannot cross a call boundary"));
                None
            }
            Err(msg) => {
                err(id.span.start, msg);
                None
            }
        })
        .collect()
}

struct Scope<'a> {
    n_types: usize,
    n_entities: usize,
    signatures: &'a [Signature],
}

type Located = (usize, String);

fn lower_function(f: &FuncDecl, sig: &Signature, scope: &Scope<'_>) -> Result<Graph, Located> {
    let mut dense: HashMap<u32, NodeId> = HashMap::with_capacity(f.nodes.len());
    for (i, decl) in f.nodes.iter().enumerate() {
        if dense.insert(decl.id, NodeId::from_index(i)).is_some() {
            return Err((decl.span.start, format!("node %{} defined twice", decl.id)));
        }
    }
    let resolve = |decl: &NodeDecl, r: u32| {
        dense
            .get(&r)
            .copied()
            .ok_or_else(|| (decl.span.start, format!("%{} references undefined node %{r}", decl.id)))
    };

    let mut nodes = Vec::with_capacity(f.nodes.len());
    for decl in &f.nodes {
        let mode = parse_mode(&decl.mode).map_err(|m| (decl.mode.span.start, m))?;
        let op = lower_op(decl, mode, scope)?;
        let block = decl.block.map(|b| resolve(decl, b)).transpose()?;
        let ins = decl
            .ins
            .iter()
            .map(|&i| resolve(decl, i))
            .collect::<Result<Vec<_>, _>>()?;
        nodes.push(Node {
            op,
            mode,
            block,
            ins,
        });
    }

    check_layout(&nodes, sig).map_err(|msg| (f.span.start, format!("{}: {msg}", sig.name)))?;
    Ok(Graph::from_nodes(nodes, sig.params.len()))
}

fn lower_op(decl: &NodeDecl, mode: Mode, scope: &Scope<'_>) -> Result<Op, Located> {
    let here = decl.op.span.start;
    let name = decl.op.name.as_str();
    let bad_attr = || Err((here, format!("{name} has a missing or malformed attribute")));

    let op = match (name, &decl.attr) {
        ("Start", None) => Op::Start,
        ("End", None) => Op::End,
        ("Block", None) => Op::Block,
        ("Jmp", None) => Op::Jmp,
        ("Cond", None) => Op::Cond,
        ("Return", None) => Op::Return,
        ("Phi", None) => Op::Phi,
        ("Load", None) => Op::Load,
        ("Store", None) => Op::Store,
        ("Conv", None) => Op::Conv,
        ("Dummy", None) => Op::Dummy,
        ("Proj", Some(Attr::Int(n))) => match u32::try_from(*n) {
            Ok(n) => Op::Proj(n),
            Err(_) => return bad_attr(),
        },
        ("Const", Some(Attr::Int(v))) => {
            if !mode.is_int() {
                return Err((here, format!("Const of non-integer mode {mode}")));
            }
            let bits = mode.encode(*v);
            if mode.interpret(bits) != *v {
                return Err((here, format!("constant {v} does not fit mode {mode}")));
            }
            Op::Const(bits)
        }
        ("Cmp", Some(Attr::Name(rel))) => match Relation::from_name(&rel.name) {
            Some(r) => Op::Cmp(r),
            None => return Err((rel.span.start, format!("unknown relation '{}'", rel.name))),
        },
        ("Alloc", Some(Attr::Type(t))) if (*t as usize) < scope.n_types => Op::Alloc(TypeId(*t)),
        ("Member", Some(Attr::Entity(e))) if (*e as usize) < scope.n_entities => {
            Op::Member(EntityId(*e))
        }
        ("Call", Some(Attr::Name(callee))) => {
            match scope.signatures.iter().position(|s| s.name == callee.name) {
                Some(i) => Op::Call(FuncId::from_index(i)),
                None => {
                    return Err((
                        callee.span.start,
                        format!("call to undefined function '{}'", callee.name),
                    ))
                }
            }
        }
        (other, None) => match BinOp::ALL.iter().find(|b| b.name() == other) {
            Some(&b) => Op::Binary(b),
            None => return Err((here, format!("unknown operation '{other}'"))),
        },
        _ => return bad_attr(),
    };
    Ok(op)
}

/// The accessors on `Graph` assume blocks, Start, End, initial memory and
/// parameters sit at fixed positions.
fn check_layout(nodes: &[Node], sig: &Signature) -> Result<(), String> {
    let expect = |i: usize, op: Op, mode: Mode| -> Result<(), String> {
        match nodes.get(i) {
            Some(n) if n.op == op && n.mode == mode => Ok(()),
            Some(n) => Err(format!(
                "node #{i} is {} {}, expected {} {mode}",
                n.op.name(),
                n.mode,
                op.name()
            )),
            None => Err(format!("missing node #{i} ({})", op.name())),
        }
    };
    expect(0, Op::Block, Mode::X)?;
    expect(1, Op::Block, Mode::X)?;
    expect(2, Op::Start, Mode::T)?;
    expect(3, Op::End, Mode::X)?;
    expect(4, Op::Proj(pn::MEM), Mode::M)?;
    for (i, &m) in sig.params.iter().enumerate() {
        expect(5 + i, Op::Proj(pn::ARG0 + i as u32), m)?;
    }
    let start = NodeId::from_index(2);
    for n in &nodes[4..5 + sig.params.len()] {
        if n.ins != [start] {
            return Err("initial projections must hang off Start".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::codes;

    const HEADER: &str = "irsmith-ir 1\nseed 5\ntypes {\n  #0 prim Is size 4\n}\n";

    fn with_main(body: &str) -> String {
        format!(
            "{HEADER}func _main (Is) -> (Is) {{
  %0 = Block X ()
  %1 = Block X (%9)
  %2 = Start T @%0 ()
  %3 = End X @%1 ()
  %4 = Proj[0] M @%0 (%2)
  %5 = Proj[1] Is @%0 (%2)
{body}}}
"
        )
    }

    #[test]
    fn reads_gapped_ids_densely() {
        let text = with_main("  %8 = Const[-1] Is @%0 ()\n  %9 = Return X @%0 (%4, %8)\n");
        let prog = check_source("t.ir", &text).unwrap();
        assert_eq!(prog.seed, 5);
        assert_eq!(prog.n_types, 1);
        let g = &prog.graphs[0];
        assert_eq!(g.len(), 8);
        assert_eq!(g.node(NodeId(6)).op, Op::Const(u32::MAX as u64));
        assert_eq!(g.block_preds(g.end_block()), &[NodeId(7)]);
    }

    #[test]
    fn verify_failure_names_function() {
        // Return of the wrong mode.
        let text = with_main("  %8 = Const[1] Hs @%0 ()\n  %9 = Return X @%0 (%4, %8)\n");
        let err = check_source("t.ir", &text).unwrap_err();
        assert_eq!(err.code(), Some(codes::V0003));
        assert!(err.to_string().contains("'_main'"));
    }

    #[test]
    fn undefined_reference_is_read_error() {
        let text = with_main("  %9 = Return X @%0 (%4, %77)\n");
        let err = read_source("t.ir", &text).unwrap_err();
        let GenError::Read { path, messages } = err else {
            panic!("expected read error");
        };
        assert_eq!(path, "t.ir");
        assert!(messages[0].contains("undefined node %77"), "{messages:?}");
    }

    #[test]
    fn constant_must_fit_mode() {
        let text = with_main("  %8 = Const[300] Bu @%0 ()\n  %9 = Return X @%0 (%4, %5)\n");
        let err = read_source("t.ir", &text).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn unknown_callee_is_reported() {
        let text = with_main(
            "  %8 = Call[nowhere] T @%0 (%4)\n  %9 = Return X @%0 (%4, %5)\n",
        );
        let err = read_source("t.ir", &text).unwrap_err();
        assert!(err.to_string().contains("undefined function 'nowhere'"));
    }

    #[test]
    fn alloc_type_range_checked() {
        let text = with_main(
            "  %7 = Const[4] Iu @%0 ()\n  %8 = Alloc[#3] T @%0 (%4, %7)\n  %9 = Return X @%0 (%4, %5)\n",
        );
        let err = read_source("t.ir", &text).unwrap_err();
        assert!(err.to_string().contains("Alloc has a missing or malformed attribute"));
    }

    #[test]
    fn layout_is_checked() {
        let text = format!("{HEADER}func _main (Is) -> (Is) {{\n  %0 = Block X ()\n}}\n");
        let err = read_source("t.ir", &text).unwrap_err();
        assert!(err.to_string().contains("missing node #1"));
    }

    #[test]
    fn syntax_error_has_position() {
        let err = read_source("t.ir", "irsmith-ir 1\nseed x").unwrap_err();
        let GenError::Read { messages, .. } = err else {
            panic!("expected read error");
        };
        assert!(messages[0].starts_with("2:6:"), "{messages:?}");
    }

    #[test]
    fn version_mismatch() {
        let err = read_source("t.ir", "irsmith-ir 9\nseed 1\ntypes { }\n").unwrap_err();
        assert!(err.to_string().contains("unsupported format version 9"));
    }
}
