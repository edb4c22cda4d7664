//! Uniform diagnostic reporting (C10, §4.9/§7): a plain, renderer-free
//! shape callers (a REPL, a test harness) can format however they like.
//! This crate has no terminal of its own, so unlike the teacher's
//! `Diagnostic` there is no ANSI rendering here — only the fields a
//! caller needs to build one.

use crate::compiler::ast::Pos;
use crate::compiler::resolve::ResolveError;
use crate::compiler::synth::SynthError;
use crate::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// A single reportable fact about a compilation. Every error this crate
/// produces carries a [`Pos`] when one is available (§4.9) — a
/// synthesized node (e.g. `exists`/`forall` desugaring output) may have
/// none, in which case `pos` is `None` rather than a fabricated span.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub pos: Option<Pos>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, pos: Option<Pos>) -> Self {
        Diagnostic { severity: Severity::Error, code: Some(code), message: message.into(), pos }
    }
}

impl From<&ResolveError> for Diagnostic {
    fn from(err: &ResolveError) -> Self {
        let pos = match err {
            ResolveError::UnboundIdentifier { pos, .. }
            | ResolveError::UnboundConstructor { pos, .. }
            | ResolveError::UnboundType { pos, .. }
            | ResolveError::RecBindingNotIdent(pos)
            | ResolveError::NotARecord(pos)
            | ResolveError::ForallTerminatedByInto(pos) => Some(*pos),
            ResolveError::MissingType(_) | ResolveError::Type(_) | ResolveError::Core(_) => None,
        };
        let code = match err {
            ResolveError::UnboundIdentifier { .. } => "E0501",
            ResolveError::UnboundConstructor { .. } => "E0502",
            ResolveError::UnboundType { .. } => "E0503",
            ResolveError::MissingType(_) => "E0504",
            ResolveError::RecBindingNotIdent(_) => "E0505",
            ResolveError::NotARecord(_) => "E0506",
            ResolveError::ForallTerminatedByInto(_) => "E0507",
            ResolveError::Type(_) => "E0508",
            ResolveError::Core(_) => "E0509",
        };
        Diagnostic::error(code, err.to_string(), pos)
    }
}

impl From<&SynthError> for Diagnostic {
    fn from(err: &SynthError) -> Self {
        let pos = match err {
            SynthError::NonInvertibleConstraint { pos, .. } => Some(*pos),
            SynthError::TooManyUnionBranches { pos, .. } => Some(*pos),
        };
        Diagnostic::error("E0700", err.to_string(), pos)
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(err: &CompileError) -> Self {
        match err {
            CompileError::Resolve(e) => Diagnostic::from(e),
            CompileError::Synth(errs) => errs.first().map(Diagnostic::from).unwrap_or_else(|| Diagnostic::error("E0700", err.to_string(), None)),
            CompileError::Multiple(errs) => errs.first().map(Diagnostic::from).unwrap_or_else(|| Diagnostic::error("E0000", err.to_string(), None)),
        }
    }
}

/// Flatten every error this crate can produce into one [`Diagnostic`]
/// per leaf error, recursing through `CompileError::Multiple` and
/// `CompileError::Synth`'s own list rather than collapsing them to the
/// single representative `From<&CompileError>` picks.
pub fn diagnostics_for(err: &CompileError) -> Vec<Diagnostic> {
    match err {
        CompileError::Resolve(e) => vec![Diagnostic::from(e)],
        CompileError::Synth(errs) => errs.iter().map(Diagnostic::from).collect(),
        CompileError::Multiple(errs) => errs.iter().flat_map(diagnostics_for).collect(),
    }
}
