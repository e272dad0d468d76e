// irsmith — random IR program generator
//
// Library root. Generation phases, the IR backend and the `.ir` text
// front end are modules here; the `irsmith` binary drives them.

pub mod ast;
pub mod callgraph;
pub mod cfg;
pub mod config;
pub mod diag;
pub mod dominance;
pub mod dot;
pub mod emit;
pub mod id;
pub mod ir;
pub mod lexer;
pub mod materialize;
pub mod memory;
pub mod parser;
pub mod pipeline;
pub mod prog;
pub mod reader;
pub mod resolve;
pub mod rng;
pub mod stats;
pub mod types;
