//! Generator synthesizer (C7, §4.7): the inverse-planner that turns a
//! goal pattern plus a set of boolean constraints into a finite
//! collection expression enumerating exactly the pattern's values that
//! satisfy the constraints. This is the core of the spec — everything
//! else in this crate exists to produce the `CoreExpr`s this module
//! consumes and to run the `from`-pipeline rewrite this module feeds
//! back into.

pub mod cache;
pub mod errors;
pub mod strategies;

use reml_core::env::Env;
use reml_core::types::TypeSystem;

use super::ast::Pos;
use super::core_ir::{CoreExpr, CoreExprKind, CorePat, CoreStep, MatchArm, Query};
use super::session::NameGenerator;

pub use cache::Cache;
pub use errors::SynthError;

/// How many values a generator's expression may produce (§3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one value (`PointGenerator`).
    Single,
    /// A bounded, possibly-empty collection.
    Finite,
    /// An extent with no discovered bound — synthesis never *installs* an
    /// `Infinite` generator as a final answer (that is a
    /// [`SynthError::NonInvertibleConstraint`]), but intermediate
    /// recursive analysis tracks it to decide whether a sub-goal still
    /// needs inversion.
    Infinite,
}

/// A generator (§3.5): a Core collection expression for `pat`, the
/// identifiers it structurally depends on, its cardinality, and whether
/// it is known to produce distinct elements.
#[derive(Debug, Clone)]
pub struct Generator {
    pub pat: CorePat,
    pub exp: CoreExpr,
    pub free_pats: Vec<(String, u32)>,
    pub cardinality: Cardinality,
    pub unique: bool,
}

/// The ambient state threaded through every strategy: the shared type
/// store, the session's ordinal source, the environment used to look up
/// user function bodies for inlining (§4.7.2 strategy 7), and the
/// configured synthesis knobs (§ "Configuration" — `CompileOptions`).
pub struct SynthCtx<'a> {
    pub ts: &'a mut TypeSystem,
    pub ng: &'a mut NameGenerator,
    pub env: &'a Env<CoreExpr>,
    pub options: &'a crate::CompileOptions,
}

/// Entry point (§4.7.1): given `(goal_pat, ordered, constraints)`,
/// attempt to synthesize and register in `cache` a generator for
/// `goal_pat`. `ordered` only affects the cardinality-1 short-circuit
/// (a `PointGenerator` needs no list/bag distinction); every intermediate
/// collection generator is built as a bag and coerced at the call site
/// via [`super::core_ir::with_ordered`].
pub fn synthesize(
    ctx: &mut SynthCtx,
    cache: &mut Cache,
    goal_pat: &CorePat,
    pos: Pos,
    constraints: &[CoreExpr],
) -> Result<Generator, SynthError> {
    strategies::try_strategies(ctx, cache, goal_pat, pos, constraints)
}

/// The C6→C7 integration point: a `from`-query built by
/// [`super::from_builder`] may contain `where` conjuncts that constrain a
/// name no `Scan` step ever introduces — the surface syntax relies
/// entirely on the constraints to pin the value down (e.g. `where i >= 1
/// andalso i <= 5` with no `from i in ...` anywhere). This walks the
/// query's own steps plus every nested `From` it finds, and for each
/// such free name calls [`synthesize`] and splices the resulting
/// generator in as a new leading scan.
///
/// Free names already bound by an enclosing scope (a surrounding `let`,
/// function parameter, or an outer query's own sources) are outside this
/// query's `scan_bindings()` too, so they would look free by the same
/// test. Callers only invoke this once per query at the point where all
/// of its ordinary scope is already resolved into `sources`/`Scan` —
/// `free_in_query` only looks for names the query's *own* binding forms
/// don't cover, which is exactly the set a surrounding scope can't be
/// responsible for satisfying (it is the query's job to enumerate them).
pub fn synthesize_query(ctx: &mut SynthCtx, cache: &mut Cache, query: Query, pos: Pos) -> Result<Query, SynthError> {
    let Query { sources, steps, ordered } = query;

    let mut sources = sources
        .into_iter()
        .map(|(pat, exp)| Ok((pat, synthesize_in_expr(ctx, cache, exp)?)))
        .collect::<Result<Vec<_>, SynthError>>()?;
    let mut steps = steps.into_iter().map(|s| synthesize_in_step(ctx, cache, s)).collect::<Result<Vec<_>, SynthError>>()?;

    loop {
        let bound = Query { sources: sources.clone(), steps: steps.clone(), ordered }.scan_bindings();
        let where_exprs: Vec<CoreExpr> = steps
            .iter()
            .filter_map(|s| match s {
                CoreStep::Where(e) => Some(e.clone()),
                _ => None,
            })
            .collect();

        let mut free: Vec<(String, u32)> = Vec::new();
        for e in &where_exprs {
            collect_free_ids(e, &bound, &mut free);
        }
        free.dedup();

        let Some((name, ordinal)) = free.into_iter().next() else {
            break;
        };
        // `try_strategies` never reads `goal.ty` to build the generator
        // (only its pattern shape and bound names), so a placeholder type
        // here is harmless — the spliced scan's pattern takes its real
        // type from the generator's own source expression.
        let placeholder_ty = ctx.ts.int_type();
        let goal = CorePat::new(placeholder_ty, pos, super::core_ir::CorePatKind::Id { name: name.clone(), ordinal });
        let generator = synthesize(ctx, cache, &goal, pos, &where_exprs)?;
        sources.insert(0, (generator.pat, generator.exp));
    }

    Ok(Query { sources, steps, ordered })
}

/// Recursively rewrite every `From` node reachable inside `e`, applying
/// [`synthesize_query`] to each. Covers the shapes a query can nest
/// inside — a `let`-bound sub-query, a tupled/yielded sub-query, an
/// argument to a function call — not just the `through`-desugared
/// `Scan`-of-`From` shape `synthesize_query` used to special-case.
pub fn synthesize_in_expr(ctx: &mut SynthCtx, cache: &mut Cache, e: CoreExpr) -> Result<CoreExpr, SynthError> {
    let CoreExpr { ty, pos, kind } = e;
    let kind = match *kind {
        CoreExprKind::From(q) => CoreExprKind::From(synthesize_query(ctx, cache, q, pos)?),
        CoreExprKind::RecordSel { field, target } => CoreExprKind::RecordSel { field, target: synthesize_in_expr(ctx, cache, target)? },
        CoreExprKind::Tuple(es) => CoreExprKind::Tuple(es.into_iter().map(|e| synthesize_in_expr(ctx, cache, e)).collect::<Result<_, _>>()?),
        CoreExprKind::ListLit(es) => CoreExprKind::ListLit(es.into_iter().map(|e| synthesize_in_expr(ctx, cache, e)).collect::<Result<_, _>>()?),
        CoreExprKind::Apply(f, a) => CoreExprKind::Apply(synthesize_in_expr(ctx, cache, f)?, synthesize_in_expr(ctx, cache, a)?),
        CoreExprKind::Fn(arms) => CoreExprKind::Fn(synthesize_in_arms(ctx, cache, arms)?),
        CoreExprKind::Case(scrutinee, arms) => CoreExprKind::Case(synthesize_in_expr(ctx, cache, scrutinee)?, synthesize_in_arms(ctx, cache, arms)?),
        CoreExprKind::If(c, t, f) => CoreExprKind::If(synthesize_in_expr(ctx, cache, c)?, synthesize_in_expr(ctx, cache, t)?, synthesize_in_expr(ctx, cache, f)?),
        CoreExprKind::AndAlso(l, r) => CoreExprKind::AndAlso(synthesize_in_expr(ctx, cache, l)?, synthesize_in_expr(ctx, cache, r)?),
        CoreExprKind::OrElse(l, r) => CoreExprKind::OrElse(synthesize_in_expr(ctx, cache, l)?, synthesize_in_expr(ctx, cache, r)?),
        CoreExprKind::Not(inner) => CoreExprKind::Not(synthesize_in_expr(ctx, cache, inner)?),
        CoreExprKind::Let { pat, bound, body } => CoreExprKind::Let { pat, bound: synthesize_in_expr(ctx, cache, bound)?, body: synthesize_in_expr(ctx, cache, body)? },
        CoreExprKind::LetRec { bindings, body } => CoreExprKind::LetRec {
            bindings: bindings.into_iter().map(|(n, o, e)| Ok((n, o, synthesize_in_expr(ctx, cache, e)?))).collect::<Result<_, SynthError>>()?,
            body: synthesize_in_expr(ctx, cache, body)?,
        },
        CoreExprKind::Local(ids, inner) => CoreExprKind::Local(ids, synthesize_in_expr(ctx, cache, inner)?),
        other @ (CoreExprKind::Lit(_) | CoreExprKind::Id(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. }) => other,
    };
    Ok(CoreExpr::new(ty, pos, kind))
}

fn synthesize_in_arms(ctx: &mut SynthCtx, cache: &mut Cache, arms: Vec<MatchArm>) -> Result<Vec<MatchArm>, SynthError> {
    arms.into_iter().map(|arm| Ok(MatchArm { pat: arm.pat, body: synthesize_in_expr(ctx, cache, arm.body)? })).collect()
}

fn synthesize_in_step(ctx: &mut SynthCtx, cache: &mut Cache, step: CoreStep) -> Result<CoreStep, SynthError> {
    Ok(match step {
        CoreStep::Scan { pat, exp, cond } => {
            let exp = synthesize_in_expr(ctx, cache, exp)?;
            let cond = cond.map(|c| synthesize_in_expr(ctx, cache, c)).transpose()?;
            CoreStep::Scan { pat, exp, cond }
        }
        CoreStep::Where(e) => CoreStep::Where(synthesize_in_expr(ctx, cache, e)?),
        CoreStep::Yield(e) => CoreStep::Yield(synthesize_in_expr(ctx, cache, e)?),
        CoreStep::Order(pairs) => CoreStep::Order(pairs.into_iter().map(|(e, asc)| Ok((synthesize_in_expr(ctx, cache, e)?, asc))).collect::<Result<_, SynthError>>()?),
        CoreStep::Group { keys, aggregates } => CoreStep::Group {
            keys: keys.into_iter().map(|(n, p, e)| Ok((n, p, synthesize_in_expr(ctx, cache, e)?))).collect::<Result<_, SynthError>>()?,
            aggregates: aggregates.into_iter().map(|(n, e)| Ok((n, synthesize_in_expr(ctx, cache, e)?))).collect::<Result<_, SynthError>>()?,
        },
        CoreStep::Compute(fields) => CoreStep::Compute(fields.into_iter().map(|(n, e)| Ok((n, synthesize_in_expr(ctx, cache, e)?))).collect::<Result<_, SynthError>>()?),
        CoreStep::Distinct => CoreStep::Distinct,
        CoreStep::Skip(e) => CoreStep::Skip(synthesize_in_expr(ctx, cache, e)?),
        CoreStep::Take(e) => CoreStep::Take(synthesize_in_expr(ctx, cache, e)?),
        CoreStep::Require(e) => CoreStep::Require(synthesize_in_expr(ctx, cache, e)?),
        CoreStep::Through { pat, fn_exp } => CoreStep::Through { pat, fn_exp: synthesize_in_expr(ctx, cache, fn_exp)? },
    })
}

/// Top-level driver over a resolved item (C5's output), run once per
/// item as the C7 pass proper: every `from`-query reachable from the
/// item's bound expression gets its free goal patterns inverted before
/// the item reaches the analyzer (C8).
pub fn synthesize_item(ctx: &mut SynthCtx, cache: &mut Cache, item: super::resolve::CoreItem) -> Result<super::resolve::CoreItem, SynthError> {
    Ok(match item {
        super::resolve::CoreItem::Value { name, ordinal, ty, bound } => {
            super::resolve::CoreItem::Value { name, ordinal, ty, bound: synthesize_in_expr(ctx, cache, bound)? }
        }
        super::resolve::CoreItem::Exp(e) => super::resolve::CoreItem::Exp(synthesize_in_expr(ctx, cache, e)?),
    })
}

/// Collect `Id` references in `e` whose `(name, ordinal)` is not already
/// in `bound`, appending to `seen`. Conservative: it does not track
/// shadowing introduced by nested `Fn`/`Case`/`Let` binders, since the
/// only free names this pass acts on come from a query's own top-level
/// `where` conjuncts, which in practice reference either a sibling scan
/// binding or a genuinely free name meant for synthesis — never a
/// lambda-local one, since no lambda encloses a `where` step itself.
fn collect_free_ids(e: &CoreExpr, bound: &[(String, u32)], seen: &mut Vec<(String, u32)>) {
    match e.kind.as_ref() {
        CoreExprKind::Lit(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. } => {}
        CoreExprKind::Id(r) => {
            let key = (r.name.clone(), r.ordinal);
            if !bound.contains(&key) && !seen.contains(&key) {
                seen.push(key);
            }
        }
        CoreExprKind::RecordSel { target, .. } => collect_free_ids(target, bound, seen),
        CoreExprKind::Tuple(es) | CoreExprKind::ListLit(es) => es.iter().for_each(|e| collect_free_ids(e, bound, seen)),
        CoreExprKind::Apply(f, a) => {
            collect_free_ids(f, bound, seen);
            collect_free_ids(a, bound, seen);
        }
        CoreExprKind::Fn(arms) => collect_free_ids_arms(arms, bound, seen),
        CoreExprKind::Case(scrutinee, arms) => {
            collect_free_ids(scrutinee, bound, seen);
            collect_free_ids_arms(arms, bound, seen);
        }
        CoreExprKind::If(c, t, f) => {
            collect_free_ids(c, bound, seen);
            collect_free_ids(t, bound, seen);
            collect_free_ids(f, bound, seen);
        }
        CoreExprKind::AndAlso(l, r) | CoreExprKind::OrElse(l, r) => {
            collect_free_ids(l, bound, seen);
            collect_free_ids(r, bound, seen);
        }
        CoreExprKind::Not(inner) => collect_free_ids(inner, bound, seen),
        CoreExprKind::Let { bound: b, body, .. } => {
            collect_free_ids(b, bound, seen);
            collect_free_ids(body, bound, seen);
        }
        CoreExprKind::LetRec { bindings, body } => {
            for (_, _, e) in bindings {
                collect_free_ids(e, bound, seen);
            }
            collect_free_ids(body, bound, seen);
        }
        CoreExprKind::From(q) => {
            for (_, e) in &q.sources {
                collect_free_ids(e, bound, seen);
            }
            for step in &q.steps {
                match step {
                    CoreStep::Scan { exp, cond, .. } => {
                        collect_free_ids(exp, bound, seen);
                        if let Some(c) = cond {
                            collect_free_ids(c, bound, seen);
                        }
                    }
                    CoreStep::Where(e) | CoreStep::Skip(e) | CoreStep::Take(e) | CoreStep::Yield(e) | CoreStep::Require(e) => collect_free_ids(e, bound, seen),
                    CoreStep::Order(pairs) => pairs.iter().for_each(|(e, _)| collect_free_ids(e, bound, seen)),
                    CoreStep::Group { keys, aggregates } => {
                        keys.iter().for_each(|(_, _, e)| collect_free_ids(e, bound, seen));
                        aggregates.iter().for_each(|(_, e)| collect_free_ids(e, bound, seen));
                    }
                    CoreStep::Compute(fields) => fields.iter().for_each(|(_, e)| collect_free_ids(e, bound, seen)),
                    CoreStep::Distinct => {}
                    CoreStep::Through { fn_exp, .. } => collect_free_ids(fn_exp, bound, seen),
                }
            }
        }
        CoreExprKind::Local(_, inner) => collect_free_ids(inner, bound, seen),
    }
}

fn collect_free_ids_arms(arms: &[MatchArm], bound: &[(String, u32)], seen: &mut Vec<(String, u32)>) {
    for arm in arms {
        let mut arm_bound: Vec<(String, u32)> = bound.to_vec();
        arm.pat.bound_names(&mut arm_bound);
        collect_free_ids(&arm.body, &arm_bound, seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Lit;
    use crate::compiler::core_ir::{BuiltinRef, CoreExprKind, CorePatKind, IdRef};
    use crate::compiler::tokens::Span;
    use reml_core::env::Env as GenericEnv;

    fn pos() -> Span {
        Span::dummy()
    }

    fn ctx<'a>(ts: &'a mut TypeSystem, ng: &'a mut NameGenerator, env: &'a GenericEnv<CoreExpr>, options: &'a crate::CompileOptions) -> SynthCtx<'a> {
        SynthCtx { ts, ng, env, options }
    }

    #[test]
    fn range_strategy_produces_exact_bounds_via_entrypoint() {
        let mut ts = TypeSystem::new();
        let mut ng = NameGenerator::new();
        let env: GenericEnv<CoreExpr> = GenericEnv::empty();
        let options = crate::CompileOptions::default();
        let int_ty = ts.int_type();

        let i_pat = CorePat::new(int_ty, pos(), CorePatKind::Id { name: "i".into(), ordinal: 0 });
        let i_ref = || CoreExpr::new(int_ty, pos(), CoreExprKind::Id(IdRef { name: "i".into(), ordinal: 0 }));
        let lit = |n: i64| CoreExpr::lit(int_ty, pos(), Lit::Int(n.into()));
        let geq = CoreExpr::new(
            ts.bool_type(),
            pos(),
            CoreExprKind::Apply(
                CoreExpr::new(ts.fn_type(ts.tuple_type(vec![int_ty, int_ty]), ts.bool_type()), pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level(">="))),
                CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![i_ref(), lit(1)])),
            ),
        );
        let leq = CoreExpr::new(
            ts.bool_type(),
            pos(),
            CoreExprKind::Apply(
                CoreExpr::new(ts.fn_type(ts.tuple_type(vec![int_ty, int_ty]), ts.bool_type()), pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("<="))),
                CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![i_ref(), lit(5)])),
            ),
        );
        let mut cache = Cache::new();
        let mut c = ctx(&mut ts, &mut ng, &env, &options);
        let generator = synthesize(&mut c, &mut cache, &i_pat, pos(), &[geq, leq]).unwrap();
        assert_eq!(generator.cardinality, Cardinality::Finite);
    }

    #[test]
    fn query_with_no_scan_gets_a_synthesized_source_spliced_in() {
        use crate::compiler::core_ir::CoreStep;

        let mut ts = TypeSystem::new();
        let mut ng = NameGenerator::new();
        let env: GenericEnv<CoreExpr> = GenericEnv::empty();
        let options = crate::CompileOptions::default();
        let int_ty = ts.int_type();

        let i_ref = || CoreExpr::new(int_ty, pos(), CoreExprKind::Id(IdRef { name: "i".into(), ordinal: 0 }));
        let lit = |n: i64| CoreExpr::lit(int_ty, pos(), Lit::Int(n.into()));
        let cmp = |ts: &mut TypeSystem, op: &str, a: CoreExpr, b: CoreExpr| {
            CoreExpr::new(
                ts.bool_type(),
                pos(),
                CoreExprKind::Apply(
                    CoreExpr::new(ts.fn_type(ts.tuple_type(vec![int_ty, int_ty]), ts.bool_type()), pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level(op))),
                    CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![a, b])),
                ),
            )
        };
        let geq = cmp(&mut ts, ">=", i_ref(), lit(1));
        let leq = cmp(&mut ts, "<=", i_ref(), lit(5));
        let where_step = CoreStep::Where(CoreExpr::new(ts.bool_type(), pos(), CoreExprKind::AndAlso(geq, leq)));
        let yield_step = CoreStep::Yield(i_ref());
        let query = Query { sources: Vec::new(), steps: vec![where_step, yield_step], ordered: true };

        let mut cache = Cache::new();
        let mut c = ctx(&mut ts, &mut ng, &env, &options);
        let rewritten = synthesize_query(&mut c, &mut cache, query, pos()).unwrap();

        assert_eq!(rewritten.sources.len(), 1);
        assert_eq!(rewritten.steps.len(), 2);
    }
}
