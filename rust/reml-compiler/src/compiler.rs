//! The compilation pipeline: surface AST in, a typed [`compiler::core_ir`]
//! tree (with its query plan already resolved, simplified, and analyzed)
//! out.

pub mod analyzer;
pub mod ast;
pub mod compiled;
pub mod core_ir;
pub mod exceptions;
pub mod from_builder;
pub mod resolve;
pub mod session;
pub mod synth;
pub mod testing_helpers;
pub mod tokens;
pub mod typemap;
