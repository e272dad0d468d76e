// AST node types for `.ir` program files.
//
// Mirrors the text layout written by `emit.rs`. Every node carries a
// `SimpleSpan` so the reader can point at the offending construct.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── Root ──

#[derive(Debug, Clone, PartialEq)]
pub struct IrFile {
    pub version: i128,
    pub seed: i128,
    pub types: Vec<TypeDecl>,
    pub funcs: Vec<FuncDecl>,
    pub span: Span,
}

// ── types { ... } ──

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub id: u32,
    pub kind: TypeDeclKind,
    pub size: i128,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDeclKind {
    Prim(Ident),
    Compound {
        is_union: bool,
        name: Ident,
        members: Vec<MemberDecl>,
    },
    Ptr(u32),
}

/// `&E name #T at OFFSET`
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDecl {
    pub entity: u32,
    pub name: Ident,
    pub ty: u32,
    pub offset: i128,
    pub span: Span,
}

// ── func NAME (modes) -> (modes) { nodes } ──

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub results: Vec<Ident>,
    pub nodes: Vec<NodeDecl>,
    pub span: Span,
}

/// `%N = Op[attr] mode @%B (ins)`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDecl {
    pub id: u32,
    pub op: Ident,
    pub attr: Option<Attr>,
    pub mode: Ident,
    pub block: Option<u32>,
    pub ins: Vec<u32>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    Int(i128),
    Name(Ident),
    Type(u32),
    Entity(u32),
}
