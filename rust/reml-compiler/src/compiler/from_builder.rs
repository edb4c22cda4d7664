//! From-builder (C6): an incremental, step-accumulating builder for
//! query pipelines, with a normalizing `buildSimplify` on top of the raw
//! `build` (§4.6).

use super::ast::Lit;
use super::core_ir::{CoreExpr, CoreExprKind, CorePat, CoreStep, Query};

#[derive(Debug, Default)]
pub struct FromBuilder {
    sources: Vec<(CorePat, CoreExpr)>,
    steps: Vec<CoreStep>,
    ordered: bool,
}

impl FromBuilder {
    pub fn new(ordered: bool) -> Self {
        FromBuilder { sources: Vec::new(), steps: Vec::new(), ordered }
    }

    pub fn source(&mut self, pat: CorePat, exp: CoreExpr) -> &mut Self {
        self.sources.push((pat, exp));
        self
    }

    pub fn step(&mut self, step: CoreStep) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.steps.is_empty()
    }

    /// The raw accumulated pipeline, unmodified.
    pub fn build(self) -> Query {
        Query { sources: self.sources, steps: self.steps, ordered: self.ordered }
    }

    /// `build()` plus local normalizations (§4.6):
    /// - consecutive `Where` steps merge into one `andalso` chain
    /// - a `Distinct` immediately following another `Distinct` is dropped
    ///   (idempotent)
    /// - every yield/where expression is passed through
    ///   [`CoreExpr::simplify`]
    pub fn build_simplify(self) -> Query {
        let mut merged: Vec<CoreStep> = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            let step = simplify_step(step);
            match (merged.last_mut(), &step) {
                (Some(CoreStep::Where(prev)), CoreStep::Where(next)) => {
                    let ty = next.ty;
                    let pos = next.pos;
                    let prev_owned = std::mem::replace(prev, CoreExpr::lit(ty, pos, Lit::Unit));
                    *prev = CoreExpr::new(ty, pos, CoreExprKind::AndAlso(prev_owned, next.clone())).simplify();
                }
                (Some(CoreStep::Distinct), CoreStep::Distinct) => {}
                _ => merged.push(step),
            }
        }
        Query { sources: self.sources, steps: merged, ordered: self.ordered }
    }
}

fn simplify_step(step: CoreStep) -> CoreStep {
    match step {
        CoreStep::Where(e) => CoreStep::Where(e.simplify()),
        CoreStep::Yield(e) => CoreStep::Yield(e.simplify()),
        CoreStep::Order(pairs) => CoreStep::Order(pairs.into_iter().map(|(e, asc)| (e.simplify(), asc)).collect()),
        CoreStep::Skip(e) => CoreStep::Skip(e.simplify()),
        CoreStep::Take(e) => CoreStep::Take(e.simplify()),
        CoreStep::Compute(fields) => CoreStep::Compute(fields.into_iter().map(|(n, e)| (n, e.simplify())).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Lit;
    use crate::compiler::core_ir::IdRef;
    use crate::compiler::tokens::Span;
    use reml_core::types::TypeSystem;

    fn pos() -> Span {
        Span::dummy()
    }

    #[test]
    fn build_simplify_merges_consecutive_wheres() {
        let mut ts = TypeSystem::new();
        let bool_ty = ts.bool_type();
        let int_ty = ts.int_type();
        let mut b = FromBuilder::new(false);
        b.source(CorePat::wildcard(int_ty, pos()), CoreExpr::new(ts.bag_type(int_ty), pos(), CoreExprKind::ListLit(vec![])));
        let p = CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "p".into(), ordinal: 0 }));
        let q = CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "q".into(), ordinal: 1 }));
        b.step(CoreStep::Where(p));
        b.step(CoreStep::Where(q));
        let query = b.build_simplify();
        assert_eq!(query.steps.len(), 1);
        assert!(matches!(query.steps[0], CoreStep::Where(_)));
    }

    #[test]
    fn build_simplify_drops_duplicate_distinct() {
        let int_ty = TypeSystem::new().int_type();
        let mut b = FromBuilder::new(false);
        b.source(CorePat::wildcard(int_ty, pos()), CoreExpr::new(int_ty, pos(), CoreExprKind::Lit(Lit::Unit)));
        b.step(CoreStep::Distinct);
        b.step(CoreStep::Distinct);
        let query = b.build_simplify();
        assert_eq!(query.steps.len(), 1);
    }
}
