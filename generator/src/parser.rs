// Parser for `.ir` program files.
//
// Parses a token stream (from the lexer) into an AST mirroring the text
// written by `emit.rs`. Uses chumsky combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub file: Option<IrFile>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse an `.ir` source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = file_parser(source);
    let (file, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        file,
        errors: all_errors,
    }
}

// ── Parser builder ──

fn file_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, IrFile, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let int = select! { Token::Int(v) => v };
    let node_ref = select! { Token::NodeRef(n) => n };
    let type_ref = select! { Token::TypeRef(n) => n };
    let entity_ref = select! { Token::EntityRef(n) => n };

    let size = just(Token::Size).ignore_then(int.clone());

    // ── Header ──

    let header = just(Token::Header)
        .ignore_then(int.clone())
        .then(just(Token::Seed).ignore_then(int.clone()));

    // ── types { ... } ──

    let member = entity_ref
        .clone()
        .then(ident.clone())
        .then(type_ref.clone())
        .then(just(Token::At).ignore_then(int.clone()))
        .map_with(|(((entity, name), ty), offset), e| MemberDecl {
            entity,
            name,
            ty,
            offset,
            span: e.span(),
        });

    let prim = just(Token::Prim)
        .ignore_then(ident.clone())
        .then(size.clone())
        .map(|(mode, size)| (TypeDeclKind::Prim(mode), size));

    let compound = choice((just(Token::Struct).to(false), just(Token::Union).to(true)))
        .then(ident.clone())
        .then(size.clone())
        .then(
            member
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|(((is_union, name), size), members)| {
            (
                TypeDeclKind::Compound {
                    is_union,
                    name,
                    members,
                },
                size,
            )
        });

    let ptr = just(Token::Ptr)
        .ignore_then(type_ref.clone())
        .then(size)
        .map(|(to, size)| (TypeDeclKind::Ptr(to), size));

    let type_decl = type_ref
        .clone()
        .then(choice((prim, compound, ptr)))
        .map_with(|(id, (kind, size)), e| TypeDecl {
            id,
            kind,
            size,
            span: e.span(),
        });

    let types = just(Token::Types).ignore_then(
        type_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // ── func ──

    let mode_list = ident
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let attr = choice((
        int.map(Attr::Int),
        type_ref.map(Attr::Type),
        entity_ref.map(Attr::Entity),
        ident.clone().map(Attr::Name),
    ))
    .delimited_by(just(Token::LBracket), just(Token::RBracket));

    let ins = node_ref
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let node = node_ref
        .clone()
        .then_ignore(just(Token::Equals))
        .then(ident.clone())
        .then(attr.or_not())
        .then(ident.clone())
        .then(just(Token::AtSign).ignore_then(node_ref.clone()).or_not())
        .then(ins)
        .map_with(|(((((id, op), attr), mode), block), ins), e| NodeDecl {
            id,
            op,
            attr,
            mode,
            block,
            ins,
            span: e.span(),
        });

    let func = just(Token::Func)
        .ignore_then(ident.clone())
        .then(mode_list.clone())
        .then_ignore(just(Token::Arrow))
        .then(mode_list)
        .then(
            node.repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(|(((name, params), results), nodes), e| FuncDecl {
            name,
            params,
            results,
            nodes,
            span: e.span(),
        });

    header
        .then(types)
        .then(func.repeated().collect::<Vec<_>>())
        .map_with(|(((version, seed), types), funcs), e| IrFile {
            version,
            seed,
            types,
            funcs,
            span: e.span(),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> IrFile {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.file.expect("expected file")
    }

    fn parse_all(source: &str) -> (Option<IrFile>, Vec<Rich<'static, Token, SimpleSpan>>) {
        let result = parse(source);
        (result.file, result.errors)
    }

    const MINIMAL: &str = "irsmith-ir 1\nseed 7\ntypes {\n}\n";

    #[test]
    fn header_only() {
        let file = parse_ok(MINIMAL);
        assert_eq!(file.version, 1);
        assert_eq!(file.seed, 7);
        assert!(file.types.is_empty());
        assert!(file.funcs.is_empty());
    }

    #[test]
    fn type_declarations() {
        let file = parse_ok(
            "irsmith-ir 1 seed 0 types {
               #0 prim Bs size 1
               #8 union union_0 size 4 { &0 m0 #4 at 0, &1 m1 #0 at 0 }
               #9 ptr #8 size 8
             }",
        );
        assert_eq!(file.types.len(), 3);
        let TypeDeclKind::Prim(mode) = &file.types[0].kind else {
            panic!("expected prim");
        };
        assert_eq!(mode.name, "Bs");
        let TypeDeclKind::Compound {
            is_union,
            name,
            members,
        } = &file.types[1].kind
        else {
            panic!("expected compound");
        };
        assert!(*is_union);
        assert_eq!(name.name, "union_0");
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].entity, 1);
        assert_eq!(members[1].ty, 0);
        assert_eq!(file.types[2].kind, TypeDeclKind::Ptr(8));
        assert_eq!(file.types[2].size, 8);
    }

    #[test]
    fn function_nodes() {
        let file = parse_ok(
            "irsmith-ir 1 seed 0 types { }
             func _main (Is) -> (Is) {
               %0 = Block X ()
               %8 = Const[-3] Is @%0 ()
               %9 = Cmp[lt] b @%0 (%5, %8)
               %10 = Alloc[#4] T @%0 (%4, %7)
               %11 = Member[&2] P @%0 (%10)
               %12 = Call[r_func_1] T @%0 (%4)
             }",
        );
        let f = &file.funcs[0];
        assert_eq!(f.name.name, "_main");
        assert_eq!(f.params.len(), 1);
        assert_eq!(f.results[0].name, "Is");
        assert_eq!(f.nodes.len(), 6);

        let block = &f.nodes[0];
        assert_eq!(block.op.name, "Block");
        assert_eq!(block.block, None);
        assert!(block.ins.is_empty());

        assert_eq!(f.nodes[1].attr, Some(Attr::Int(-3)));
        assert_eq!(f.nodes[1].block, Some(0));
        let Some(Attr::Name(rel)) = &f.nodes[2].attr else {
            panic!("expected relation name");
        };
        assert_eq!(rel.name, "lt");
        assert_eq!(f.nodes[2].ins, vec![5, 8]);
        assert_eq!(f.nodes[3].attr, Some(Attr::Type(4)));
        assert_eq!(f.nodes[4].attr, Some(Attr::Entity(2)));
        let Some(Attr::Name(callee)) = &f.nodes[5].attr else {
            panic!("expected callee name");
        };
        assert_eq!(callee.name, "r_func_1");
    }

    #[test]
    fn several_functions() {
        let file = parse_ok(
            "irsmith-ir 1 seed 0 types { }
             func _main (Is) -> (Is) { %0 = Block X () }
             func r_func_1 () -> (Lu) { %0 = Block X () }",
        );
        assert_eq!(file.funcs.len(), 2);
        assert!(file.funcs[1].params.is_empty());
    }

    #[test]
    fn missing_header_is_error() {
        let (_, errors) = parse_all("seed 0 types { }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn missing_equals_is_error() {
        let (_, errors) = parse_all(
            "irsmith-ir 1 seed 0 types { } func f () -> () { %0 Block X () }",
        );
        assert!(!errors.is_empty());
    }

    #[test]
    fn lex_errors_are_reported() {
        let (_, errors) = parse_all("irsmith-ir 1 seed $ types { }");
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("unexpected character")));
    }
}
