//! Post-Core use-site analyzer (C8, §4.8): classifies every named
//! pattern a program binds according to how its uses are shaped, so a
//! later stage can decide what is safe to inline or must be preserved
//! as a binding.

use super::ast::Pos;
use super::core_ir::{CoreExpr, CoreExprKind, CorePat, CorePatKind, MatchArm};
use super::resolve::CoreItem;

pub type PatKey = (String, u32);

/// A classification a named pattern's uses can fall into (§4.8's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A `val rec`/`fun` binding whose right-hand side genuinely calls
    /// itself — it breaks the recursive knot and cannot be treated like
    /// an ordinary single-use binding regardless of how its result is
    /// used downstream.
    LoopBreaker,
    /// Zero uses, and not a top-level binding (whose uses are external
    /// to the program fragment under analysis).
    Dead,
    /// A binding whose right-hand side is itself a literal, identifier,
    /// built-in reference, or constructor reference — trivial enough
    /// that use-count considerations do not apply.
    Atomic,
    /// Exactly one use, not under a lambda, not on a parallel branch.
    OnceSafe,
    /// Exactly one use per case/if arm, on two or more mutually
    /// exclusive arms.
    MultiSafe,
    /// Exactly one use, but underneath a lambda — it may be invoked any
    /// number of times (including zero) at call time.
    OnceUnsafe,
    /// Two or more uses in the same sequential scope.
    MultiUnsafe,
}

#[derive(Debug, Clone, Copy, Default)]
struct UseCount {
    count: usize,
    inside_lambda: bool,
    parallel: bool,
}

impl UseCount {
    fn one() -> Self {
        UseCount { count: 1, inside_lambda: false, parallel: false }
    }

    fn seq(self, other: UseCount) -> UseCount {
        UseCount { count: self.count + other.count, inside_lambda: self.inside_lambda || other.inside_lambda, parallel: self.parallel || other.parallel }
    }

    /// Combine mutually-exclusive branches (`case` arms, `if` arms):
    /// the effective count is the max across branches (§4.8 "Case-arm
    /// uses are combined by taking the max count across arms"), and the
    /// use is `parallel` when that maximum is reached on two or more
    /// branches.
    fn parallel_combine(branches: &[UseCount]) -> UseCount {
        let max_count = branches.iter().map(|b| b.count).max().unwrap_or(0);
        let branches_at_max = branches.iter().filter(|b| b.count == max_count && max_count > 0).count();
        let inside_lambda = branches.iter().any(|b| b.count > 0 && b.inside_lambda);
        let parallel = branches_at_max >= 2 || branches.iter().any(|b| b.parallel);
        UseCount { count: max_count, inside_lambda, parallel }
    }

    fn under_lambda(self) -> UseCount {
        UseCount { inside_lambda: self.inside_lambda || self.count > 0, ..self }
    }
}

fn binds(pat: &CorePat, key: &PatKey) -> bool {
    let mut names = Vec::new();
    pat.bound_names(&mut names);
    names.iter().any(|n| n == key)
}

/// Count every use of `key` within `e`'s scope, per §4.8's rules. `If`
/// arms are combined the same way `case` arms are: both are mutually
/// exclusive branches, and the spec's combination rule is stated in
/// terms of "parallel" branches generally even though its one worked
/// example (§8.3 scenario 6) happens to use `case`.
fn count_uses(e: &CoreExpr, key: &PatKey) -> UseCount {
    match e.kind.as_ref() {
        CoreExprKind::Id(idref) => {
            if idref.name == key.0 && idref.ordinal == key.1 {
                UseCount::one()
            } else {
                UseCount::default()
            }
        }
        CoreExprKind::Lit(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. } | CoreExprKind::From(_) => UseCount::default(),
        CoreExprKind::RecordSel { target, .. } => count_uses(target, key),
        CoreExprKind::Tuple(es) | CoreExprKind::ListLit(es) => es.iter().fold(UseCount::default(), |acc, e| acc.seq(count_uses(e, key))),
        CoreExprKind::Apply(f, a) => count_uses(f, key).seq(count_uses(a, key)),
        CoreExprKind::Fn(arms) => {
            let branches: Vec<UseCount> = arms.iter().map(|arm| if binds(&arm.pat, key) { UseCount::default() } else { count_uses(&arm.body, key).under_lambda() }).collect();
            UseCount::parallel_combine(&branches)
        }
        CoreExprKind::Case(scrutinee, arms) => {
            let branches: Vec<UseCount> = arms.iter().map(|arm| if binds(&arm.pat, key) { UseCount::default() } else { count_uses(&arm.body, key) }).collect();
            count_uses(scrutinee, key).seq(UseCount::parallel_combine(&branches))
        }
        CoreExprKind::If(c, t, e) => count_uses(c, key).seq(UseCount::parallel_combine(&[count_uses(t, key), count_uses(e, key)])),
        CoreExprKind::AndAlso(l, r) | CoreExprKind::OrElse(l, r) => count_uses(l, key).seq(count_uses(r, key)),
        CoreExprKind::Not(i) => count_uses(i, key),
        CoreExprKind::Let { pat, bound, body } => {
            let b = count_uses(bound, key);
            if binds(pat, key) {
                b
            } else {
                b.seq(count_uses(body, key))
            }
        }
        CoreExprKind::LetRec { bindings, body } => {
            let shadowed = bindings.iter().any(|(n, o, _)| n == &key.0 && *o == key.1);
            if shadowed {
                UseCount::default()
            } else {
                bindings.iter().fold(UseCount::default(), |acc, (_, _, e)| acc.seq(count_uses(e, key))).seq(count_uses(body, key))
            }
        }
        CoreExprKind::Local(_, body) => count_uses(body, key),
    }
}

fn is_atomic(e: &CoreExpr) -> bool {
    matches!(e.kind.as_ref(), CoreExprKind::Lit(_) | CoreExprKind::Id(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. })
}

/// Does `rhs` reference `(name, ordinal)` anywhere (used to detect a
/// genuinely self-recursive binding, i.e. a [`Classification::LoopBreaker`])?
fn references(rhs: &CoreExpr, name: &str, ordinal: u32) -> bool {
    let key = (name.to_string(), ordinal);
    count_uses(rhs, &key).count > 0
}

fn classify_with(rhs: Option<&CoreExpr>, is_loop_breaker: bool, top_level: bool, uses: UseCount) -> Classification {
    if is_loop_breaker {
        return Classification::LoopBreaker;
    }
    if rhs.map(is_atomic).unwrap_or(false) {
        return Classification::Atomic;
    }
    let count = if top_level && uses.count == 0 { 1 } else { uses.count };
    match count {
        0 => Classification::Dead,
        1 if uses.inside_lambda => Classification::OnceUnsafe,
        1 if uses.parallel => Classification::MultiSafe,
        1 => Classification::OnceSafe,
        _ => Classification::MultiUnsafe,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub key: PatKey,
    pub pos: Pos,
    pub classification: Classification,
}

/// Walk `e`, classifying every name bound by a `let`, `letrec`, lambda
/// parameter, or `case` arm pattern against the scope it is visible in.
pub fn analyze(e: &CoreExpr) -> Vec<Binding> {
    let mut out = Vec::new();
    walk(e, false, &mut out);
    out
}

fn walk(e: &CoreExpr, top_level: bool, out: &mut Vec<Binding>) {
    match e.kind.as_ref() {
        CoreExprKind::Let { pat, bound, body } => {
            let mut names = Vec::new();
            pat.bound_names(&mut names);
            for key in &names {
                let uses = count_uses(body, key);
                out.push(Binding { key: key.clone(), pos: pat.pos, classification: classify_with(Some(bound), false, top_level, uses) });
            }
            walk(bound, false, out);
            walk(body, top_level, out);
        }
        CoreExprKind::LetRec { bindings, body } => {
            for (name, ordinal, rhs) in bindings {
                let key = (name.clone(), *ordinal);
                let loop_breaker = references(rhs, name, *ordinal);
                let uses = count_uses(body, &key);
                out.push(Binding { key, pos: rhs.pos, classification: classify_with(Some(rhs), loop_breaker, top_level, uses) });
                walk(rhs, false, out);
            }
            walk(body, top_level, out);
        }
        CoreExprKind::Fn(arms) => {
            for arm in arms {
                let mut names = Vec::new();
                arm.pat.bound_names(&mut names);
                for key in &names {
                    let uses = count_uses(&arm.body, key).under_lambda();
                    out.push(Binding { key: key.clone(), pos: arm.pat.pos, classification: classify_with(None, false, false, uses) });
                }
                walk(&arm.body, false, out);
            }
        }
        CoreExprKind::Case(scrutinee, arms) => {
            walk(scrutinee, false, out);
            for arm in arms {
                let mut names = Vec::new();
                arm.pat.bound_names(&mut names);
                for key in &names {
                    let uses = count_uses(&arm.body, key);
                    out.push(Binding { key: key.clone(), pos: arm.pat.pos, classification: classify_with(None, false, false, uses) });
                }
                walk(&arm.body, false, out);
            }
        }
        CoreExprKind::If(c, t, e2) => {
            walk(c, false, out);
            walk(t, false, out);
            walk(e2, false, out);
        }
        CoreExprKind::Tuple(es) | CoreExprKind::ListLit(es) => {
            for e in es {
                walk(e, false, out);
            }
        }
        CoreExprKind::Apply(f, a) => {
            walk(f, false, out);
            walk(a, false, out);
        }
        CoreExprKind::AndAlso(l, r) | CoreExprKind::OrElse(l, r) => {
            walk(l, false, out);
            walk(r, false, out);
        }
        CoreExprKind::Not(i) => walk(i, false, out),
        CoreExprKind::RecordSel { target, .. } => walk(target, false, out),
        CoreExprKind::Local(_, body) => walk(body, top_level, out),
        CoreExprKind::Lit(_) | CoreExprKind::Id(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. } | CoreExprKind::From(_) => {}
    }
}

/// Classify every top-level binding in a resolved program (§4.8 applies
/// uniformly to top-level `val`/`fun` bindings too; top-level names are
/// never `Dead` purely for lack of in-program uses, since a later
/// compilation unit may reference them).
pub fn analyze_program(items: &[CoreItem]) -> Vec<Binding> {
    let mut out = Vec::new();
    for item in items {
        match item {
            CoreItem::Value { name, ordinal, bound, .. } => {
                let mut internal_uses = UseCount::default();
                for other in items {
                    if let CoreItem::Value { bound: other_bound, .. } = other {
                        internal_uses = internal_uses.seq(count_uses(other_bound, &(name.clone(), *ordinal)));
                    }
                }
                let loop_breaker = references(bound, name, *ordinal);
                out.push(Binding { key: (name.clone(), *ordinal), pos: bound.pos, classification: classify_with(Some(bound), loop_breaker, true, internal_uses) });
                walk(bound, true, &mut out);
            }
            CoreItem::Exp(e) => walk(e, false, &mut out),
        }
    }
    out
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

    fn id(ty: reml_core::types::TypeId, name: &str, ordinal: u32) -> CoreExpr {
        CoreExpr::new(ty, pos(), CoreExprKind::Id(IdRef { name: name.into(), ordinal }))
    }

    #[test]
    fn parallel_case_use_is_multi_safe_and_unused_arm_binding_is_dead() {
        let mut ts = TypeSystem::new();
        let int_ty = ts.int_type();
        let list_ty = ts.list_type(int_ty);

        let y_ordinal = 0;
        let e_rhs = CoreExpr::lit(int_ty, pos(), Lit::Int(10.into()));
        let xs_ordinal = 1;
        let x_ordinal = 2;
        let xs_tail_ordinal = 3;

        let one = CoreExpr::lit(int_ty, pos(), Lit::Int(1.into()));
        let two = CoreExpr::lit(int_ty, pos(), Lit::Int(2.into()));
        let pair_ty = ts.tuple_type(vec![int_ty, int_ty]);
        let plus = |ts: &mut TypeSystem, l: CoreExpr, r: CoreExpr| {
            let f = CoreExpr::new(ts.fn_type(pair_ty, int_ty), pos(), CoreExprKind::BuiltinRef(crate::compiler::core_ir::BuiltinRef::top_level("+")));
            CoreExpr::new(int_ty, pos(), CoreExprKind::Apply(f, CoreExpr::new(pair_ty, pos(), CoreExprKind::Tuple(vec![l, r]))))
        };

        let arm_nil = MatchArm { pat: CorePat::new(list_ty, pos(), CorePatKind::Con0("nil".to_string())), body: plus(&mut ts, id(int_ty, "y", y_ordinal), one) };
        let arm_cons = MatchArm {
            pat: CorePat::new(list_ty, pos(), CorePatKind::Cons(CorePat::id(int_ty, pos(), "x", x_ordinal), CorePat::id(list_ty, pos(), "xs", xs_tail_ordinal))),
            body: plus(&mut ts, id(int_ty, "y", y_ordinal), two),
        };
        let arm_wild = MatchArm { pat: CorePat::wildcard(list_ty, pos()), body: CoreExpr::lit(int_ty, pos(), Lit::Int(0.into())) };

        let case_e = CoreExpr::new(int_ty, pos(), CoreExprKind::Case(id(list_ty, "xs", xs_ordinal), vec![arm_nil, arm_cons, arm_wild]));
        let let_e = CoreExpr::new(int_ty, pos(), CoreExprKind::Let { pat: CorePat::id(int_ty, pos(), "y", y_ordinal), bound: e_rhs, body: case_e });

        let bindings = analyze(&let_e);
        let y = bindings.iter().find(|b| b.key == ("y".to_string(), y_ordinal)).unwrap();
        assert_eq!(y.classification, Classification::MultiSafe);
        let x = bindings.iter().find(|b| b.key == ("x".to_string(), x_ordinal)).unwrap();
        assert_eq!(x.classification, Classification::Dead);
    }

    #[test]
    fn self_referential_letrec_binding_is_loop_breaker() {
        let mut ts = TypeSystem::new();
        let int_ty = ts.int_type();
        let fn_ordinal = 0;
        let fn_ty = ts.fn_type(int_ty, int_ty);
        let self_call = CoreExpr::new(int_ty, pos(), CoreExprKind::Apply(id(fn_ty, "f", fn_ordinal), id(int_ty, "n", 1)));
        let body = id(int_ty, "n", 1);
        let letrec = CoreExpr::new(int_ty, pos(), CoreExprKind::LetRec { bindings: vec![("f".to_string(), fn_ordinal, self_call)], body });
        let bindings = analyze(&letrec);
        let f = bindings.iter().find(|b| b.key == ("f".to_string(), fn_ordinal)).unwrap();
        assert_eq!(f.classification, Classification::LoopBreaker);
    }
}
