//! `CompiledStatement` (C9, §6.2): the abstract contract between this
//! compiler's output and an external evaluator. This crate's job ends
//! at producing a resolved, simplified, and analyzed Core tree — no
//! interpreter lives here (see the component table's `C9` row: "abstract
//! contract between compiled output and evaluator", not an evaluator
//! itself). What it *does* own is the shape of that handoff: the
//! statement's result type, and a uniform way for a downstream
//! evaluator to run it against its own `Environment` and report
//! REPL-style feedback through `OutputSink`/`BindingsSink`.

use reml_core::types::TypeId;

use super::analyzer::{self, Classification};
use super::ast::Pos;
use super::core_ir::CoreExpr;
use super::resolve::CoreItem;

/// A runtime binding an evaluator hands back after running a statement
/// (§6.2 "new bindings to `bindings-sink`"). This crate never produces
/// the bound *value* — only the name, ordinal, and declared type the
/// evaluator's own binding has to match.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub ordinal: u32,
    pub ty: TypeId,
}

/// Where a [`CompiledStatement`] reports its evaluator-facing metadata.
/// An evaluator's own environment implements these against its real
/// runtime values; this crate only ever writes metadata, not values,
/// since it performs no evaluation itself.
pub trait OutputSink {
    /// One line of REPL feedback (e.g. `"val it : int = <pending>"`).
    fn line(&mut self, text: String);
}

pub trait BindingsSink {
    fn bind(&mut self, binding: Binding);
}

/// The downstream evaluator's name resolution surface, as seen from a
/// compiled statement (§6.2's `environment` parameter). This compiler
/// never calls back into it — `eval` below is metadata-only — but the
/// signature is part of the contract an evaluator is expected to honor
/// when it drives a `CompiledStatement`.
pub trait Environment {
    fn resolve(&self, name: &str, ordinal: u32) -> bool;
}

/// An item this compiler has fully processed: resolved to Core (C5),
/// simplified through the `from`-pipeline (C6), had every relational
/// goal inverted by the generator synthesizer (C7), and classified by
/// the analyzer (C8).
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    item: CoreItem,
    ty: TypeId,
    pos: Pos,
    classifications: Vec<(String, u32, Classification)>,
}

impl CompiledStatement {
    pub fn new(item: CoreItem, ty: TypeId, pos: Pos) -> Self {
        let classifications = match &item {
            CoreItem::Value { bound, .. } => analyzer::analyze(bound).into_iter().map(|b| (b.key.0, b.key.1, b.classification)).collect(),
            CoreItem::Exp(e) => analyzer::analyze(e).into_iter().map(|b| (b.key.0, b.key.1, b.classification)).collect(),
        };
        CompiledStatement { item, ty, pos, classifications }
    }

    /// The statement's result type (§6.2 `getType()`).
    pub fn get_type(&self) -> TypeId {
        self.ty
    }

    pub fn source_pos(&self) -> Pos {
        self.pos
    }

    pub fn core(&self) -> &CoreItem {
        &self.item
    }

    /// Classifications the analyzer assigned within this statement,
    /// exposed so an evaluator may choose to inline `Atomic`/`OnceSafe`
    /// bindings rather than materializing a runtime cell for them.
    pub fn classifications(&self) -> &[(String, u32, Classification)] {
        &self.classifications
    }

    /// Run the statement (§6.2 `eval(environment, output-sink,
    /// bindings-sink)`): report the bindings this item introduces and a
    /// line of feedback. This never inspects `environment` — it exists
    /// on the signature only so an evaluator's own `eval` dispatch can
    /// be uniform across statement kinds; the actual value computation
    /// for `bound` is the evaluator's responsibility, not this
    /// compiler's.
    pub fn eval(&self, _environment: &dyn Environment, output: &mut dyn OutputSink, bindings: &mut dyn BindingsSink) {
        match &self.item {
            CoreItem::Value { name, ordinal, ty, .. } => {
                bindings.bind(Binding { name: name.clone(), ordinal: *ordinal, ty: *ty });
                output.line(format!("val {name} : {ty}"));
            }
            CoreItem::Exp(e) => {
                output.line(format!("- : {}", e.ty));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Lit;
    use crate::compiler::core_ir::CoreExprKind;
    use crate::compiler::tokens::Span;
    use reml_core::types::TypeSystem;

    struct RecordingOutput(Vec<String>);
    impl OutputSink for RecordingOutput {
        fn line(&mut self, text: String) {
            self.0.push(text);
        }
    }

    struct RecordingBindings(Vec<Binding>);
    impl BindingsSink for RecordingBindings {
        fn bind(&mut self, binding: Binding) {
            self.0.push(binding);
        }
    }

    struct NoEnv;
    impl Environment for NoEnv {
        fn resolve(&self, _name: &str, _ordinal: u32) -> bool {
            false
        }
    }

    #[test]
    fn value_statement_reports_one_binding() {
        let mut ts = TypeSystem::new();
        let int_ty = ts.int_type();
        let bound = CoreExpr::lit(int_ty, Span::dummy(), Lit::Int(1.into()));
        let item = CoreItem::Value { name: "x".into(), ordinal: 0, ty: int_ty, bound };
        let compiled = CompiledStatement::new(item, int_ty, Span::dummy());

        let mut output = RecordingOutput(Vec::new());
        let mut bindings = RecordingBindings(Vec::new());
        compiled.eval(&NoEnv, &mut output, &mut bindings);

        assert_eq!(bindings.0.len(), 1);
        assert_eq!(bindings.0[0].name, "x");
        assert_eq!(output.0.len(), 1);
    }

    #[test]
    fn exp_statement_reports_no_bindings() {
        let mut ts = TypeSystem::new();
        let bool_ty = ts.bool_type();
        let e = CoreExpr::new(bool_ty, Span::dummy(), CoreExprKind::Lit(Lit::Bool(true)));
        let item = CoreItem::Exp(e);
        let compiled = CompiledStatement::new(item, bool_ty, Span::dummy());

        let mut output = RecordingOutput(Vec::new());
        let mut bindings = RecordingBindings(Vec::new());
        compiled.eval(&NoEnv, &mut output, &mut bindings);

        assert!(bindings.0.is_empty());
        assert_eq!(output.0.len(), 1);
    }
}
