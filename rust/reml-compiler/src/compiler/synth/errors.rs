//! Errors raised by the generator synthesizer (C7, §7 "Non-invertible
//! constraint").

use thiserror::Error;

use reml_core::types::TypeId;

use crate::compiler::ast::Pos;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthError {
    /// No strategy (§4.7.2) produced a generator for the given pattern.
    /// Surfaced to the caller as "cannot iterate over infinite extent"
    /// (§7) — the synthesizer never guesses a bound.
    #[error("cannot iterate over infinite extent for a value of type {ty} at {pos:?}: no generator satisfies the given constraints")]
    NonInvertibleConstraint { pos: Pos, ty: TypeId },

    /// Strategy 8 (Union) is guarded by `CompileOptions::max_union_branches`
    /// to keep pathological `orelse` chains from exploding fan-out.
    #[error("`orelse` constraint at {pos:?} has {branches} branches, exceeding the configured maximum of {max}")]
    TooManyUnionBranches { pos: Pos, branches: usize, max: usize },
}
