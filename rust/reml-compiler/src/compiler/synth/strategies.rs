//! The nine ordered inversion strategies (§4.7.2). [`try_strategies`] is
//! the dispatcher: it tries each strategy in turn against the supplied
//! constraint set and takes the first one that produces a generator.
//! Every strategy that installs a generator also registers it in the
//! [`Cache`] under each name the generator's pattern binds (§3.5
//! "indexed … under every constituent named pattern it exposes"), so a
//! later goal for a sibling name can reuse it without re-deriving it.

use reml_core::types::TypeSystem;

use crate::compiler::ast::{Lit, Pos};
use crate::compiler::core_ir::{self, BuiltinRef, CoreExpr, CoreExprKind, CorePat, CorePatKind, MatchArm};

use super::cache::{Cache, PatKey};
use super::errors::SynthError;
use super::{Cardinality, Generator, SynthCtx};

/// Strategies 1–9, tried in the fixed order of §4.7.2. The goal pattern
/// may itself be a tuple (e.g. the `(x, y)` goal of an `exists`-derived
/// transitive-closure sub-goal); `goal_keys` is every name it binds.
pub fn try_strategies(ctx: &mut SynthCtx, cache: &mut Cache, goal: &CorePat, pos: Pos, constraints: &[CoreExpr]) -> Result<Generator, SynthError> {
    let mut goal_keys = Vec::new();
    goal.bound_names(&mut goal_keys);

    // A goal already solved for every constituent name reuses the cached
    // candidate rather than re-deriving it (§3.5 "may be superseded").
    if !goal_keys.is_empty() {
        if let Some(g) = goal_keys.iter().find_map(|k| cache.get(k)) {
            return Ok(g.clone());
        }
    }

    let found = try_elem(goal, &goal_keys, constraints)
        .or_else(|| try_point(ctx, goal, &goal_keys, constraints))
        .or_else(|| try_range(ctx, goal, &goal_keys, constraints))
        .or_else(|| try_string_prefix(ctx, goal, &goal_keys, constraints))
        .or_else(|| try_exists(ctx, cache, goal, &goal_keys, pos, constraints))
        .or_else(|| try_case(ctx, cache, goal, &goal_keys, pos, constraints))
        .or_else(|| try_function(ctx, cache, goal, &goal_keys, pos, constraints))
        .or_else(|| try_union(ctx, cache, goal, &goal_keys, pos, constraints))
        .or_else(|| try_field_derivation(ctx, cache, goal, &goal_keys, pos));

    match found {
        Some(generator) => {
            register(cache, &generator);
            Ok(generator)
        }
        None => Err(SynthError::NonInvertibleConstraint { pos, ty: goal.ty }),
    }
}

fn register(cache: &mut Cache, generator: &Generator) {
    let mut names = Vec::new();
    generator.pat.bound_names(&mut names);
    for key in names {
        cache.add(key, generator.clone());
    }
}

// ── Shared structural helpers ────────────────────────────────────────

fn is_builtin(e: &CoreExpr, structure: Option<&str>, ml_name: &str) -> bool {
    matches!(e.kind.as_ref(), CoreExprKind::BuiltinRef(b) if b.ml_name == ml_name && b.structure.as_deref() == structure)
}

/// Does `e` syntactically reference any of `keys` (used by strategy 1's
/// "structurally contains `goalPat`")?
fn contains_any(e: &CoreExpr, keys: &[PatKey]) -> bool {
    match e.kind.as_ref() {
        CoreExprKind::Id(idref) => keys.iter().any(|(n, o)| *n == idref.name && *o == idref.ordinal),
        CoreExprKind::Lit(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. } => false,
        CoreExprKind::RecordSel { target, .. } => contains_any(target, keys),
        CoreExprKind::Tuple(es) | CoreExprKind::ListLit(es) => es.iter().any(|e| contains_any(e, keys)),
        CoreExprKind::Apply(f, a) => contains_any(f, keys) || contains_any(a, keys),
        CoreExprKind::Fn(arms) => arms.iter().any(|a| contains_any(&a.body, keys)),
        CoreExprKind::Case(s, arms) => contains_any(s, keys) || arms.iter().any(|a| contains_any(&a.body, keys)),
        CoreExprKind::If(c, t, e) => contains_any(c, keys) || contains_any(t, keys) || contains_any(e, keys),
        CoreExprKind::AndAlso(l, r) | CoreExprKind::OrElse(l, r) => contains_any(l, keys) || contains_any(r, keys),
        CoreExprKind::Not(i) => contains_any(i, keys),
        CoreExprKind::Let { bound, body, .. } => contains_any(bound, keys) || contains_any(body, keys),
        CoreExprKind::LetRec { bindings, body } => bindings.iter().any(|(_, _, e)| contains_any(e, keys)) || contains_any(body, keys),
        CoreExprKind::Local(_, body) => contains_any(body, keys),
        CoreExprKind::From(_) => false,
    }
}

/// `e` is *exactly* one of `keys` — the whole expression is the goal
/// reference, not merely containing it (strategy 2's "one side is
/// exactly `goalPat`").
fn is_exact(e: &CoreExpr, keys: &[PatKey]) -> bool {
    matches!(e.kind.as_ref(), CoreExprKind::Id(idref) if keys.iter().any(|(n, o)| *n == idref.name && *o == idref.ordinal))
}

fn tuple_parts(e: &CoreExpr) -> Option<&[CoreExpr]> {
    match e.kind.as_ref() {
        CoreExprKind::Tuple(es) => Some(es),
        _ => None,
    }
}

fn wrap_singleton(ts: &mut TypeSystem, e: CoreExpr) -> CoreExpr {
    let list_ty = ts.list_type(e.ty);
    CoreExpr::new(list_ty, e.pos, CoreExprKind::ListLit(vec![e]))
}

// ── Strategy 1: Elem ─────────────────────────────────────────────────

/// `e elem C` where `e` structurally contains `goalPat`: a
/// `CollectionGenerator` over `C`, scan-patterned from `e` itself (tuple
/// expressions become tuple patterns; literal positions become literal
/// filters, §4.7.2 strategy 1).
fn try_elem(goal: &CorePat, goal_keys: &[PatKey], constraints: &[CoreExpr]) -> Option<Generator> {
    for c in constraints {
        let CoreExprKind::Apply(f, arg) = c.kind.as_ref() else { continue };
        if !is_builtin(f, None, "elem") {
            continue;
        }
        let Some(parts) = tuple_parts(arg) else { continue };
        let (e, collection) = (&parts[0], &parts[1]);
        if !contains_any(e, goal_keys) {
            continue;
        }
        let Some(pat) = e.to_pat() else { continue };
        let mut free = Vec::new();
        pat.bound_names(&mut free);
        let _ = goal;
        return Some(Generator { pat, exp: collection.clone(), free_pats: free, cardinality: Cardinality::Finite, unique: false });
    }
    None
}

// ── Strategy 2: Point ────────────────────────────────────────────────

/// `e1 = e2` where one side is exactly `goalPat`: a singleton generator
/// (§4.7.2 strategy 2). Wrapped as a one-element list so downstream scan
/// code treats every generator uniformly as a collection.
fn try_point(ctx: &mut SynthCtx, goal: &CorePat, goal_keys: &[PatKey], constraints: &[CoreExpr]) -> Option<Generator> {
    for c in constraints {
        let CoreExprKind::Apply(f, arg) = c.kind.as_ref() else { continue };
        if !is_builtin(f, None, "=") {
            continue;
        }
        let Some(parts) = tuple_parts(arg) else { continue };
        let (l, r) = (&parts[0], &parts[1]);
        let value = if is_exact(l, goal_keys) {
            r
        } else if is_exact(r, goal_keys) {
            l
        } else {
            continue;
        };
        let exp = wrap_singleton(ctx.ts, value.clone());
        return Some(Generator { pat: goal.clone(), exp, free_pats: Vec::new(), cardinality: Cardinality::Single, unique: true });
    }
    None
}

// ── Strategy 3: Range ────────────────────────────────────────────────

enum Bound<'a> {
    Lower { e: &'a CoreExpr, strict: bool },
    Upper { e: &'a CoreExpr, strict: bool },
}

/// Recognize a comparison conjunct as a lower/upper bound on `goal`
/// (§4.7.2 strategy 3's `p > e`, `p ≥ e`, and the symmetric `e < p`/`e ≤
/// p` forms; the `e < p+k` rewritten form is not attempted — it requires
/// symbolic rearrangement this synthesizer does not perform).
fn as_bound<'a>(c: &'a CoreExpr, goal_keys: &[PatKey]) -> Option<Bound<'a>> {
    let CoreExprKind::Apply(f, arg) = c.kind.as_ref() else { return None };
    let CoreExprKind::BuiltinRef(b) = f.kind.as_ref() else { return None };
    if b.structure.is_some() {
        return None;
    }
    let parts = tuple_parts(arg)?;
    let (l, r) = (&parts[0], &parts[1]);
    match b.ml_name.as_str() {
        ">" if is_exact(l, goal_keys) => Some(Bound::Lower { e: r, strict: true }),
        ">=" if is_exact(l, goal_keys) => Some(Bound::Lower { e: r, strict: false }),
        "<" if is_exact(l, goal_keys) => Some(Bound::Upper { e: r, strict: true }),
        "<=" if is_exact(l, goal_keys) => Some(Bound::Upper { e: r, strict: false }),
        "<" if is_exact(r, goal_keys) => Some(Bound::Lower { e: l, strict: true }),
        "<=" if is_exact(r, goal_keys) => Some(Bound::Lower { e: l, strict: false }),
        ">" if is_exact(r, goal_keys) => Some(Bound::Upper { e: l, strict: true }),
        ">=" if is_exact(r, goal_keys) => Some(Bound::Upper { e: l, strict: false }),
        _ => None,
    }
}

fn int_binop(ts: &mut TypeSystem, name: &str, l: CoreExpr, r: CoreExpr) -> CoreExpr {
    let int_ty = ts.int_type();
    let pair_ty = ts.tuple_type(vec![int_ty, int_ty]);
    let f = CoreExpr::new(ts.fn_type(pair_ty, int_ty), l.pos, CoreExprKind::BuiltinRef(BuiltinRef::top_level(name)));
    CoreExpr::new(int_ty, l.pos, CoreExprKind::Apply(f, CoreExpr::new(pair_ty, l.pos, CoreExprKind::Tuple(vec![l, r]))))
}

fn int_lit(ts: &mut TypeSystem, pos: Pos, n: i64) -> CoreExpr {
    CoreExpr::lit(ts.int_type(), pos, Lit::Int(n.into()))
}

fn tabulate(ts: &mut TypeSystem, pos: Pos, count: CoreExpr, elem_ty: reml_core::types::TypeId, gen_fn: CoreExpr) -> CoreExpr {
    let list_ty = ts.list_type(elem_ty);
    let pair_ty = ts.tuple_type(vec![ts.int_type(), gen_fn.ty]);
    let f = CoreExpr::new(ts.fn_type(pair_ty, list_ty), pos, CoreExprKind::BuiltinRef(BuiltinRef::structured("List", "tabulate")));
    CoreExpr::new(list_ty, pos, CoreExprKind::Apply(f, CoreExpr::new(pair_ty, pos, CoreExprKind::Tuple(vec![count, gen_fn]))))
}

/// `int`-typed goals only: a simultaneous lower and upper bound invert to
/// `tabulate(hi - lo + adjustment, k |-> lo + k)` (§4.7.2 strategy 3,
/// §8.3 scenario 1).
fn try_range(ctx: &mut SynthCtx, goal: &CorePat, goal_keys: &[PatKey], constraints: &[CoreExpr]) -> Option<Generator> {
    if ctx.ts.int_type() != goal.ty {
        return None;
    }
    let mut lower: Option<(&CoreExpr, bool)> = None;
    let mut upper: Option<(&CoreExpr, bool)> = None;
    for c in constraints {
        match as_bound(c, goal_keys) {
            Some(Bound::Lower { e, strict }) if lower.is_none() => lower = Some((e, strict)),
            Some(Bound::Upper { e, strict }) if upper.is_none() => upper = Some((e, strict)),
            _ => {}
        }
    }
    let (lo, lo_strict) = lower?;
    let (hi, hi_strict) = upper?;
    let pos = goal.pos;

    let effective_lo = if lo_strict { int_binop(ctx.ts, "+", lo.clone(), int_lit(ctx.ts, pos, 1)) } else { lo.clone() };
    let effective_hi = if hi_strict { int_binop(ctx.ts, "-", hi.clone(), int_lit(ctx.ts, pos, 1)) } else { hi.clone() };
    let span = int_binop(ctx.ts, "-", effective_hi, effective_lo.clone());
    let count = int_binop(ctx.ts, "+", span, int_lit(ctx.ts, pos, 1));

    let k_ordinal = ctx.ng.next_ordinal();
    let int_ty = ctx.ts.int_type();
    let k_pat = CorePat::id(int_ty, pos, "k", k_ordinal);
    let k_ref = CoreExpr::new(int_ty, pos, CoreExprKind::Id(core_ir::IdRef { name: "k".into(), ordinal: k_ordinal }));
    let body = int_binop(ctx.ts, "+", effective_lo, k_ref);
    let gen_fn_ty = ctx.ts.fn_type(int_ty, int_ty);
    let gen_fn = CoreExpr::new(gen_fn_ty, pos, CoreExprKind::Fn(vec![MatchArm { pat: k_pat, body }]));

    let exp = tabulate(ctx.ts, pos, count, int_ty, gen_fn);
    Some(Generator { pat: goal.clone(), exp, free_pats: Vec::new(), cardinality: Cardinality::Finite, unique: true })
}

// ── Strategy 4: String prefix ────────────────────────────────────────

/// `String.isPrefix p s` inverts to `tabulate(size(s)+1, i |->
/// substring(s,0,i))` (§4.7.2 strategy 4).
fn try_string_prefix(ctx: &mut SynthCtx, goal: &CorePat, goal_keys: &[PatKey], constraints: &[CoreExpr]) -> Option<Generator> {
    for c in constraints {
        let CoreExprKind::Apply(f, arg) = c.kind.as_ref() else { continue };
        if !is_builtin(f, Some("String"), "isPrefix") {
            continue;
        }
        let Some(parts) = tuple_parts(arg) else { continue };
        let (p, s) = (&parts[0], &parts[1]);
        if !is_exact(p, goal_keys) {
            continue;
        }
        let pos = goal.pos;
        let string_ty = ctx.ts.string_type();
        let int_ty = ctx.ts.int_type();
        let size_f = CoreExpr::new(ctx.ts.fn_type(string_ty, int_ty), pos, CoreExprKind::BuiltinRef(BuiltinRef::structured("String", "size")));
        let size_call = CoreExpr::new(int_ty, pos, CoreExprKind::Apply(size_f, s.clone()));
        let count = int_binop(ctx.ts, "+", size_call, int_lit(ctx.ts, pos, 1));

        let i_ordinal = ctx.ng.next_ordinal();
        let i_pat = CorePat::id(int_ty, pos, "i", i_ordinal);
        let i_ref = CoreExpr::new(int_ty, pos, CoreExprKind::Id(core_ir::IdRef { name: "i".into(), ordinal: i_ordinal }));
        let triple_ty = ctx.ts.tuple_type(vec![string_ty, int_ty, int_ty]);
        let substring_f = CoreExpr::new(ctx.ts.fn_type(triple_ty, string_ty), pos, CoreExprKind::BuiltinRef(BuiltinRef::structured("String", "substring")));
        let args = CoreExpr::new(triple_ty, pos, CoreExprKind::Tuple(vec![s.clone(), int_lit(ctx.ts, pos, 0), i_ref]));
        let body = CoreExpr::new(string_ty, pos, CoreExprKind::Apply(substring_f, args));
        let gen_fn = CoreExpr::new(ctx.ts.fn_type(int_ty, string_ty), pos, CoreExprKind::Fn(vec![MatchArm { pat: i_pat, body }]));

        let exp = tabulate(ctx.ts, pos, count, string_ty, gen_fn);
        return Some(Generator { pat: goal.clone(), exp, free_pats: Vec::new(), cardinality: Cardinality::Finite, unique: true });
    }
    None
}

// ── Strategy 5: Exists ───────────────────────────────────────────────

/// Unwrap a possible `Bag.fromList`/`List.fromBag` coercion to reach the
/// underlying `From` query, if any.
fn unwrap_collection(e: &CoreExpr) -> Option<&core_ir::Query> {
    match e.kind.as_ref() {
        CoreExprKind::From(q) => Some(q),
        CoreExprKind::Apply(f, arg) => match f.kind.as_ref() {
            CoreExprKind::BuiltinRef(b) if b.ml_name == "fromList" || b.ml_name == "fromBag" => unwrap_collection(arg),
            _ => None,
        },
        _ => None,
    }
}

fn where_conjuncts(q: &core_ir::Query) -> Vec<CoreExpr> {
    q.steps
        .iter()
        .filter_map(|s| match s {
            core_ir::CoreStep::Where(e) => Some(e.clone()),
            _ => None,
        })
        .collect()
}

/// `Relational.nonEmpty(from-body)` is recursively analyzed (§4.7.2
/// strategy 5): if the synthesized generator for `goal` would need a
/// binding the sub-query itself introduces, the sub-query's own scan is
/// promoted as the generator (`ExistsJoinGenerator`); otherwise the
/// sub-query's `where`-conjuncts are folded in as extra context and the
/// remaining constraints retried (`ExistsFilterGenerator`).
fn try_exists(ctx: &mut SynthCtx, cache: &mut Cache, goal: &CorePat, goal_keys: &[PatKey], pos: Pos, constraints: &[CoreExpr]) -> Option<Generator> {
    for (i, c) in constraints.iter().enumerate() {
        if !c.is_call_to(Some("Relational"), "nonEmpty") {
            continue;
        }
        let Some(arg) = c.call_arg() else { continue };
        let Some(query) = unwrap_collection(arg) else { continue };

        let join_source = query.sources.iter().find(|(p, _)| {
            let mut names = Vec::new();
            p.bound_names(&mut names);
            names.iter().any(|n| goal_keys.contains(n))
        });
        if let Some((src_pat, src_exp)) = join_source {
            let mut free = Vec::new();
            src_pat.bound_names(&mut free);
            let exp = core_ir::with_ordered(ctx.ts, false, src_exp.clone());
            return Some(Generator { pat: src_pat.clone(), exp, free_pats: free, cardinality: Cardinality::Finite, unique: false });
        }

        let mut combined: Vec<CoreExpr> = constraints.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, e)| e.clone()).collect();
        combined.extend(where_conjuncts(query));
        if let Ok(g) = try_strategies(ctx, cache, goal, pos, &combined) {
            return Some(g);
        }
    }
    None
}

// ── Strategy 6: Case ─────────────────────────────────────────────────

fn and2(ts: &TypeSystem, a: CoreExpr, b: CoreExpr) -> CoreExpr {
    let _ = ts;
    let pos = a.pos;
    CoreExpr::new(a.ty, pos, CoreExprKind::AndAlso(a, b))
}

fn or2(a: CoreExpr, b: CoreExpr) -> CoreExpr {
    let pos = a.pos;
    let ty = a.ty;
    CoreExpr::new(ty, pos, CoreExprKind::OrElse(a, b))
}

fn or_all(mut es: Vec<CoreExpr>) -> Option<CoreExpr> {
    let mut iter = es.drain(..);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, e| or2(acc, e)))
}

fn eq_expr(ts: &mut TypeSystem, l: CoreExpr, r: CoreExpr) -> CoreExpr {
    let pos = l.pos;
    let pair_ty = ts.tuple_type(vec![l.ty, r.ty]);
    let f = CoreExpr::new(ts.fn_type(pair_ty, ts.bool_type()), pos, CoreExprKind::BuiltinRef(BuiltinRef::top_level("=")));
    CoreExpr::new(ts.bool_type(), pos, CoreExprKind::Apply(f, CoreExpr::new(pair_ty, pos, CoreExprKind::Tuple(vec![l, r]))))
}

fn not_expr(e: CoreExpr) -> CoreExpr {
    CoreExpr::new(e.ty, e.pos, CoreExprKind::Not(e))
}

/// Rewrite a `bool`-typed `case` into an `orelse` of per-arm constraints
/// (§4.7.2 strategy 6): literal arms contribute `(subject = lit) andalso
/// body`; `false`-bodied literal arms instead contribute a `not (subject
/// = lit)` exclusion folded into every arm that follows; an identifier
/// (or wildcard) arm substitutes the subject in for itself and picks up
/// every exclusion accumulated so far.
fn rewrite_case(ts: &mut TypeSystem, scrutinee: &CoreExpr, arms: &[MatchArm]) -> Option<CoreExpr> {
    let mut disjuncts = Vec::new();
    let mut exclusions: Vec<CoreExpr> = Vec::new();
    for arm in arms {
        match arm.pat.kind.as_ref() {
            CorePatKind::Lit(lit) => {
                let lit_e = CoreExpr::lit(arm.pat.ty, arm.pat.pos, lit.clone());
                let eq = eq_expr(ts, scrutinee.clone(), lit_e);
                if arm.body.is_bool_lit(false) {
                    exclusions.push(not_expr(eq));
                    continue;
                }
                disjuncts.push(and2(ts, eq, arm.body.clone()));
            }
            CorePatKind::Wildcard | CorePatKind::Id { .. } => {
                let mut conj = arm.body.clone();
                for ex in exclusions.iter().rev() {
                    conj = and2(ts, ex.clone(), conj);
                }
                disjuncts.push(conj);
            }
            // Constructor/tuple/record/as/cons arms: not handled by this
            // rewrite; strategy 7's constructor-payload handling covers
            // the single-constructor case directly on the original
            // `case`, so bailing here just defers to later strategies.
            _ => return None,
        }
    }
    or_all(disjuncts)
}

fn try_case(ctx: &mut SynthCtx, cache: &mut Cache, goal: &CorePat, _goal_keys: &[PatKey], pos: Pos, constraints: &[CoreExpr]) -> Option<Generator> {
    for (i, c) in constraints.iter().enumerate() {
        let CoreExprKind::Case(scrutinee, arms) = c.kind.as_ref() else { continue };
        if c.ty != ctx.ts.bool_type() {
            continue;
        }
        let Some(rewritten) = rewrite_case(ctx.ts, scrutinee, arms) else { continue };
        let mut combined: Vec<CoreExpr> = constraints.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, e)| e.clone()).collect();
        // A single surviving arm rewrites to a bare `andalso`, which
        // `decompose_and` flattens into its conjuncts directly; a genuine
        // `orelse` of several arms passes through unchanged (it isn't an
        // `andalso`) for strategy 8 to split.
        combined.extend(rewritten.decompose_and().into_iter().cloned());
        if let Ok(g) = try_strategies(ctx, cache, goal, pos, &combined) {
            return Some(g);
        }
    }
    None
}

// ── Strategy 7: Function ─────────────────────────────────────────────

/// Structural substitution of `replacement` for every bound occurrence of
/// `pat` in `body` — used to inline a one-argument lambda application
/// (`(fn p => b) args`) and a looked-up user function's body. Only
/// covers the patterns this synthesizer's inputs actually produce
/// (`Id`/`Wildcard`/`Tuple`); anything else declines rather than risk a
/// wrong rewrite.
fn substitute(pat: &CorePat, replacement: &CoreExpr, body: &CoreExpr) -> Option<CoreExpr> {
    match pat.kind.as_ref() {
        CorePatKind::Wildcard => Some(body.clone()),
        CorePatKind::Id { name, ordinal } => Some(substitute_id(name, *ordinal, replacement, body)),
        CorePatKind::Tuple(pats) => {
            let parts = tuple_parts(replacement)?;
            if parts.len() != pats.len() {
                return None;
            }
            let mut out = body.clone();
            for (p, part) in pats.iter().zip(parts) {
                out = substitute(p, part, &out)?;
            }
            Some(out)
        }
        _ => None,
    }
}

fn substitute_id(name: &str, ordinal: u32, replacement: &CoreExpr, body: &CoreExpr) -> CoreExpr {
    let rewrite = |e: &CoreExpr| substitute_id(name, ordinal, replacement, e);
    let ty = body.ty;
    let pos = body.pos;
    let kind = match body.kind.as_ref() {
        CoreExprKind::Id(idref) if idref.name == name && idref.ordinal == ordinal => return replacement.clone(),
        CoreExprKind::Id(_) | CoreExprKind::Lit(_) | CoreExprKind::BuiltinRef(_) | CoreExprKind::ConRef { .. } | CoreExprKind::From(_) => return body.clone(),
        CoreExprKind::RecordSel { field, target } => CoreExprKind::RecordSel { field: field.clone(), target: rewrite(target) },
        CoreExprKind::Tuple(es) => CoreExprKind::Tuple(es.iter().map(rewrite).collect()),
        CoreExprKind::ListLit(es) => CoreExprKind::ListLit(es.iter().map(rewrite).collect()),
        CoreExprKind::Apply(f, a) => CoreExprKind::Apply(rewrite(f), rewrite(a)),
        CoreExprKind::Fn(arms) => CoreExprKind::Fn(rewrite_arms_unless_shadowed(name, ordinal, replacement, arms)),
        CoreExprKind::Case(s, arms) => CoreExprKind::Case(rewrite(s), rewrite_arms_unless_shadowed(name, ordinal, replacement, arms)),
        CoreExprKind::If(c, t, e) => CoreExprKind::If(rewrite(c), rewrite(t), rewrite(e)),
        CoreExprKind::AndAlso(l, r) => CoreExprKind::AndAlso(rewrite(l), rewrite(r)),
        CoreExprKind::OrElse(l, r) => CoreExprKind::OrElse(rewrite(l), rewrite(r)),
        CoreExprKind::Not(i) => CoreExprKind::Not(rewrite(i)),
        CoreExprKind::Let { pat, bound, body: inner } => {
            let bound = rewrite(bound);
            let mut names = Vec::new();
            pat.bound_names(&mut names);
            let body = if names.iter().any(|(n, o)| n == name && *o == ordinal) { inner.clone() } else { rewrite(inner) };
            CoreExprKind::Let { pat: pat.clone(), bound, body }
        }
        CoreExprKind::LetRec { bindings, body: inner } => {
            let shadowed = bindings.iter().any(|(n, o, _)| n == name && *o == ordinal);
            let bindings = bindings.iter().map(|(n, o, e)| (n.clone(), *o, if shadowed { e.clone() } else { rewrite(e) })).collect();
            let body = if shadowed { inner.clone() } else { rewrite(inner) };
            CoreExprKind::LetRec { bindings, body }
        }
        CoreExprKind::Local(ids, inner) => CoreExprKind::Local(ids.clone(), rewrite(inner)),
    };
    CoreExpr::new(ty, pos, kind)
}

fn rewrite_arms_unless_shadowed(name: &str, ordinal: u32, replacement: &CoreExpr, arms: &[MatchArm]) -> Vec<MatchArm> {
    arms.iter()
        .map(|arm| {
            let mut names = Vec::new();
            arm.pat.bound_names(&mut names);
            let body = if names.iter().any(|(n, o)| n == name && *o == ordinal) {
                arm.body.clone()
            } else {
                substitute_id(name, ordinal, replacement, &arm.body)
            };
            MatchArm { pat: arm.pat.clone(), body }
        })
        .collect()
}

/// True iff `e` contains an application whose callee is the identifier
/// `(name, ordinal)` — a self-call, used to detect and prune recursive
/// branches (§4.7.2 strategy 7's "recursive branches are pruned").
fn calls_self(e: &CoreExpr, name: &str, ordinal: u32) -> bool {
    match e.kind.as_ref() {
        CoreExprKind::Apply(f, a) => matches!(f.kind.as_ref(), CoreExprKind::Id(idref) if idref.name == name && idref.ordinal == ordinal) || calls_self(f, name, ordinal) || calls_self(a, name, ordinal),
        CoreExprKind::AndAlso(l, r) | CoreExprKind::OrElse(l, r) => calls_self(l, name, ordinal) || calls_self(r, name, ordinal),
        CoreExprKind::Not(i) => calls_self(i, name, ordinal),
        CoreExprKind::If(c, t, e) => calls_self(c, name, ordinal) || calls_self(t, name, ordinal) || calls_self(e, name, ordinal),
        CoreExprKind::Case(s, arms) => calls_self(s, name, ordinal) || arms.iter().any(|a| calls_self(&a.body, name, ordinal)),
        CoreExprKind::Tuple(es) | CoreExprKind::ListLit(es) => es.iter().any(|e| calls_self(e, name, ordinal)),
        CoreExprKind::RecordSel { target, .. } => calls_self(target, name, ordinal),
        _ => false,
    }
}

/// Strip every `orelse` branch that still calls itself, keeping only the
/// branches a generic (non-recursive) inline can safely retry (§4.7.2
/// strategy 7's "otherwise … recursive branches are pruned").
fn prune_self_calls(e: &CoreExpr, name: &str, ordinal: u32) -> CoreExpr {
    if let CoreExprKind::OrElse(l, r) = e.kind.as_ref() {
        let l_self = calls_self(l, name, ordinal);
        let r_self = calls_self(r, name, ordinal);
        return match (l_self, r_self) {
            (true, true) => CoreExpr::lit(e.ty, e.pos, Lit::Bool(false)),
            (true, false) => prune_self_calls(r, name, ordinal),
            (false, true) => prune_self_calls(l, name, ordinal),
            (false, false) => CoreExpr::new(e.ty, e.pos, CoreExprKind::OrElse(prune_self_calls(l, name, ordinal), prune_self_calls(r, name, ordinal))),
        };
    }
    e.clone()
}

/// Recognize the canonical transitive-closure shape `base orelse (exists
/// z where step andalso self(z, other))` (§4.7.2 strategy 7 "Unbounded
/// transitive closure", §8.3 scenario 3) and compile it to
/// `Relational.iterate`. This recognizer only handles the shape
/// literally described by the spec — a two-argument self-call whose
/// second argument is untouched and whose existential scan supplies the
/// first — rather than attempting fully general symbolic position
/// inference; anything else falls through to the generic inline path.
fn try_transitive_closure(ctx: &mut SynthCtx, cache: &mut Cache, fn_name: &str, fn_ordinal: u32, call_args: &CoreExpr, body: &CoreExpr) -> Option<CoreExpr> {
    let disjuncts = body.decompose_or();
    if disjuncts.len() != 2 {
        return None;
    }
    let (base, exists_branch) = if calls_self(disjuncts[0], fn_name, fn_ordinal) { (disjuncts[1], disjuncts[0]) } else { (disjuncts[0], disjuncts[1]) };
    if calls_self(base, fn_name, fn_ordinal) {
        return None;
    }
    if !exists_branch.is_call_to(Some("Relational"), "nonEmpty") {
        return None;
    }
    let sub_arg = exists_branch.call_arg()?;
    let query = unwrap_collection(sub_arg)?;
    let conjuncts = where_conjuncts(query);
    let self_call = conjuncts.iter().find(|c| calls_self(c, fn_name, fn_ordinal))?;
    let step: Vec<CoreExpr> = conjuncts.iter().filter(|c| !std::ptr::eq(*c, self_call)).cloned().collect();
    let CoreExprKind::Apply(_, self_args) = self_call.kind.as_ref() else { return None };
    let recurse_args = tuple_parts(self_args)?;
    let outer_args = tuple_parts(call_args)?;
    if recurse_args.len() != 2 || outer_args.len() != 2 {
        return None;
    }
    // The untouched second argument must be carried through unchanged.
    if recurse_args[1] != outer_args[1] {
        return None;
    }

    let pos = body.pos;
    let pair_ty = ctx.ts.tuple_type(vec![outer_args[0].ty, outer_args[1].ty]);
    let seed_pat = CorePat::new(pair_ty, pos, CorePatKind::Tuple(vec![to_id_pat(&outer_args[0])?, to_id_pat(&outer_args[1])?]));
    let seed_generator = try_strategies(ctx, cache, &seed_pat, pos, std::slice::from_ref(base)).ok()?;
    let seed = core_ir::with_ordered(ctx.ts, false, seed_generator.exp.clone());

    let all_ordinal = ctx.ng.next_ordinal();
    let new_ordinal = ctx.ng.next_ordinal();
    let e_ordinal = ctx.ng.next_ordinal();
    let p_ordinal = ctx.ng.next_ordinal();
    let bag_ty = ctx.ts.bag_type(pair_ty);
    let all_pat = CorePat::id(bag_ty, pos, "all", all_ordinal);
    let new_pat = CorePat::id(bag_ty, pos, "new", new_ordinal);
    let e_pat = CorePat::id(pair_ty, pos, "e", e_ordinal);
    let p_pat = CorePat::id(pair_ty, pos, "p", p_ordinal);
    let e_ref = CoreExpr::new(pair_ty, pos, CoreExprKind::Id(core_ir::IdRef { name: "e".into(), ordinal: e_ordinal }));
    let p_ref = CoreExpr::new(pair_ty, pos, CoreExprKind::Id(core_ir::IdRef { name: "p".into(), ordinal: p_ordinal }));
    let int_or_elem_ty = outer_args[0].ty;
    let e_first = CoreExpr::new(int_or_elem_ty, pos, CoreExprKind::RecordSel { field: "1".into(), target: e_ref.clone() });
    let p_second = CoreExpr::new(outer_args[1].ty, pos, CoreExprKind::RecordSel { field: "2".into(), target: p_ref.clone() });
    let join_cond = eq_expr(ctx.ts, e_first, p_second);
    let join_cond = step.into_iter().fold(join_cond, |acc, extra| and2(ctx.ts, acc, extra));
    let p_first = CoreExpr::new(outer_args[0].ty, pos, CoreExprKind::RecordSel { field: "1".into(), target: p_ref });
    let e_second = CoreExpr::new(outer_args[1].ty, pos, CoreExprKind::RecordSel { field: "2".into(), target: e_ref });
    let yield_tuple = CoreExpr::new(pair_ty, pos, CoreExprKind::Tuple(vec![p_first, e_second]));

    // `e` scans the fixed base relation, not the accumulated `all` —
    // semi-naive evaluation only needs to join the new frontier against
    // the original relation each round.
    let mut builder = super::super::from_builder::FromBuilder::new(false);
    builder.source(e_pat, seed.clone());
    builder.source(p_pat, CoreExpr::new(bag_ty, pos, CoreExprKind::Id(core_ir::IdRef { name: "new".into(), ordinal: new_ordinal })));
    builder.step(core_ir::CoreStep::Where(join_cond));
    builder.step(core_ir::CoreStep::Yield(yield_tuple));
    let step_query = builder.build_simplify();
    let step_body = CoreExpr::new(bag_ty, pos, CoreExprKind::From(step_query));
    let step_fn_ty = ctx.ts.fn_type(ctx.ts.tuple_type(vec![bag_ty, bag_ty]), bag_ty);
    let step_params_ty = ctx.ts.tuple_type(vec![bag_ty, bag_ty]);
    let step_fn = CoreExpr::new(
        step_fn_ty,
        pos,
        CoreExprKind::Fn(vec![MatchArm { pat: CorePat::new(step_params_ty, pos, CorePatKind::Tuple(vec![all_pat, new_pat])), body: step_body }]),
    );

    let iterate_args_ty = ctx.ts.tuple_type(vec![bag_ty, step_fn_ty]);
    let iterate_f = CoreExpr::new(ctx.ts.fn_type(iterate_args_ty, bag_ty), pos, CoreExprKind::BuiltinRef(BuiltinRef::structured("Relational", "iterate")));
    let args = CoreExpr::new(iterate_args_ty, pos, CoreExprKind::Tuple(vec![seed, step_fn]));
    Some(CoreExpr::new(bag_ty, pos, CoreExprKind::Apply(iterate_f, args)))
}

fn to_id_pat(e: &CoreExpr) -> Option<CorePat> {
    match e.kind.as_ref() {
        CoreExprKind::Id(idref) => Some(CorePat::id(e.ty, e.pos, idref.name.clone(), idref.ordinal)),
        _ => None,
    }
}

/// `n > 0 andalso (base orelse exists z where step andalso self(…, n-1))`
/// with `n` a literal constant at the call site (§4.7.2 strategy 7
/// "Bounded recursive", §8.3 scenario 4): unroll `n` times, concatenating
/// each iteration's result.
fn try_bounded_recursion(ctx: &mut SynthCtx, cache: &mut Cache, fn_name: &str, fn_ordinal: u32, call_args: &CoreExpr, body: &CoreExpr, pos: Pos) -> Option<CoreExpr> {
    let CoreExprKind::AndAlso(guard, rest) = body.kind.as_ref() else { return None };
    let CoreExprKind::Apply(f, arg) = guard.kind.as_ref() else { return None };
    if !is_builtin(f, None, ">") {
        return None;
    }
    let parts = tuple_parts(arg)?;
    let outer_args = tuple_parts(call_args)?;
    let n_param = &parts[0];
    // `body` has already had its formal parameters substituted with the
    // actual call-site arguments, so a literal call-site depth (the usual
    // case) shows up directly as a `Lit` here, not as `n`'s formal `Id`.
    // The `Id` arm only fires when `n` is still symbolic — e.g. forwarded
    // unchanged through an outer wrapper — and resolves it positionally
    // against `call_args`; anything else falls back to the configured
    // default rather than refusing to unroll at all (§4.7.2
    // bounded-recursion still needs *some* bound to terminate on).
    let depth: usize = match n_param.kind.as_ref() {
        CoreExprKind::Lit(Lit::Int(depth)) => depth.to_string().parse().ok()?,
        CoreExprKind::Id(n_idref) => {
            let n_param_pos = outer_args.iter().position(|a| to_id_pat(a).map(|p| matches!(p.kind.as_ref(), CorePatKind::Id{name,ordinal} if *name==n_idref.name && *ordinal==n_idref.ordinal)).unwrap_or(false));
            match n_param_pos.map(|i| &outer_args[i]) {
                Some(n_arg) => match n_arg.kind.as_ref() {
                    CoreExprKind::Lit(Lit::Int(depth)) => depth.to_string().parse().ok()?,
                    _ => ctx.options.depth_bound,
                },
                None => ctx.options.depth_bound,
            }
        }
        _ => ctx.options.depth_bound,
    };

    let pair_ty = ctx.ts.tuple_type(vec![outer_args[0].ty, outer_args[1].ty]);
    let mut accumulated: Option<CoreExpr> = None;
    let mut current_rest = rest.as_ref().clone();
    for _ in 0..depth.max(1) {
        let pruned = prune_self_calls(&current_rest, fn_name, fn_ordinal);
        let goal_pat = CorePat::new(pair_ty, pos, CorePatKind::Tuple(vec![to_id_pat(&outer_args[0])?, to_id_pat(&outer_args[1])?]));
        let iteration = try_strategies(ctx, cache, &goal_pat, pos, std::slice::from_ref(&pruned)).ok()?;
        let coerced = core_ir::with_ordered(ctx.ts, true, iteration.exp.clone());
        accumulated = Some(match accumulated {
            None => coerced,
            Some(prev) => concat_lists(ctx.ts, prev, coerced),
        });
        current_rest = decrement_self_call_depth(&current_rest, fn_name, fn_ordinal);
    }
    accumulated
}

/// No dedicated list-append builtin is cataloged, so two iterations of a
/// bounded unroll are concatenated via the same internal `union` builtin
/// [`try_union`] uses for its own branch-merging, then coerced back to a
/// list (bounded recursion always hands its result to a `yield`, which
/// accepts either collection kind, but keeping `with_ordered`'s contract
/// honest means returning the same kind it was given).
fn concat_lists(ts: &mut TypeSystem, a: CoreExpr, b: CoreExpr) -> CoreExpr {
    let pos = a.pos;
    let elem_ty = ts.is_list(a.ty).unwrap_or(a.ty);
    let bag_ty = ts.bag_type(elem_ty);
    let args_ty = ts.tuple_type(vec![a.ty, b.ty]);
    let f = CoreExpr::new(ts.fn_type(args_ty, bag_ty), pos, CoreExprKind::BuiltinRef(BuiltinRef::internal("union")));
    let unioned = CoreExpr::new(bag_ty, pos, CoreExprKind::Apply(f, CoreExpr::new(args_ty, pos, CoreExprKind::Tuple(vec![a, b]))));
    core_ir::with_ordered(ts, true, unioned)
}

fn decrement_self_call_depth(e: &CoreExpr, fn_name: &str, fn_ordinal: u32) -> CoreExpr {
    match e.kind.as_ref() {
        CoreExprKind::Apply(f, a) if matches!(f.kind.as_ref(), CoreExprKind::Id(idref) if idref.name == fn_name && idref.ordinal == fn_ordinal) => {
            if let Some(parts) = tuple_parts(a) {
                if let Some((last, init)) = parts.split_last() {
                    if let CoreExprKind::Apply(sub_f, sub_arg) = last.kind.as_ref() {
                        if is_builtin(sub_f, None, "-") {
                            if let Some(sub_parts) = tuple_parts(sub_arg) {
                                if let [_, step] = sub_parts {
                                    // `last` is already `n - step` from the previous
                                    // round; subtract `step` again so each successive
                                    // unroll sees a strictly smaller depth argument.
                                    let next_arg = CoreExpr::new(sub_arg.ty, sub_arg.pos, CoreExprKind::Tuple(vec![last.clone(), step.clone()]));
                                    let mut new_parts = init.to_vec();
                                    new_parts.push(CoreExpr::new(last.ty, last.pos, CoreExprKind::Apply(sub_f.clone(), next_arg)));
                                    return CoreExpr::new(e.ty, e.pos, CoreExprKind::Apply(f.clone(), CoreExpr::new(a.ty, a.pos, CoreExprKind::Tuple(new_parts))));
                                }
                            }
                        }
                    }
                }
            }
            e.clone()
        }
        CoreExprKind::AndAlso(l, r) => CoreExpr::new(e.ty, e.pos, CoreExprKind::AndAlso(decrement_self_call_depth(l, fn_name, fn_ordinal), decrement_self_call_depth(r, fn_name, fn_ordinal))),
        CoreExprKind::OrElse(l, r) => CoreExpr::new(e.ty, e.pos, CoreExprKind::OrElse(decrement_self_call_depth(l, fn_name, fn_ordinal), decrement_self_call_depth(r, fn_name, fn_ordinal))),
        _ => e.clone(),
    }
}

fn try_function(ctx: &mut SynthCtx, cache: &mut Cache, goal: &CorePat, goal_keys: &[PatKey], pos: Pos, constraints: &[CoreExpr]) -> Option<Generator> {
    for (i, c) in constraints.iter().enumerate() {
        let CoreExprKind::Apply(f, arg) = c.kind.as_ref() else { continue };
        let inlined = match f.kind.as_ref() {
            CoreExprKind::Fn(arms) if arms.len() == 1 => substitute(&arms[0].pat, arg, &arms[0].body),
            CoreExprKind::Id(idref) => {
                let binding = ctx.env.get_by_name(&idref.name)?;
                let body = binding.value.clone()?;
                let CoreExprKind::Fn(arms) = body.kind.as_ref() else { continue };
                if arms.len() != 1 {
                    continue;
                }
                let inlined_body = substitute(&arms[0].pat, arg, &arms[0].body)?;
                if let Some(closure) = try_transitive_closure(ctx, cache, &idref.name, idref.ordinal, arg, &inlined_body) {
                    let bag = core_ir::with_ordered(ctx.ts, false, closure);
                    // When the goal itself is the relation's own domain tuple
                    // (§8.3 scenario 3's `(x,y):int*int` goal against `path(x,y)`),
                    // the closure *is* the generator — nothing else needs deriving.
                    if let Some(arg_parts) = tuple_parts(arg) {
                        if arg_parts.len() == goal_keys.len() && arg_parts.iter().zip(goal_keys).all(|(a, k)| matches!(a.kind.as_ref(), CoreExprKind::Id(r) if (&r.name, r.ordinal) == (&k.0, k.1))) {
                            let mut free = Vec::new();
                            goal.bound_names(&mut free);
                            return Some(Generator { pat: goal.clone(), exp: bag, free_pats: free, cardinality: Cardinality::Finite, unique: false });
                        }
                    }
                    // Otherwise the self-recursive call is just a membership
                    // filter on some other goal — fold it in and keep looking.
                    let mut combined: Vec<CoreExpr> = constraints.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, e)| e.clone()).collect();
                    let nonempty_ty = ctx.ts.bool_type();
                    let nonempty_f_ty = ctx.ts.fn_type(bag.ty, nonempty_ty);
                    let nonempty_f = CoreExpr::new(nonempty_f_ty, pos, CoreExprKind::BuiltinRef(BuiltinRef::structured("Relational", "nonEmpty")));
                    combined.push(CoreExpr::new(nonempty_ty, pos, CoreExprKind::Apply(nonempty_f, bag)));
                    return try_strategies(ctx, cache, goal, pos, &combined).ok();
                }
                if let Some(unrolled) = try_bounded_recursion(ctx, cache, &idref.name, idref.ordinal, arg, &inlined_body, pos) {
                    let elem_ty = ctx.ts.is_list(unrolled.ty).unwrap_or(unrolled.ty);
                    let _ = elem_ty;
                    return Some(Generator { pat: goal.clone(), exp: unrolled, free_pats: Vec::new(), cardinality: Cardinality::Finite, unique: false });
                }
                Some(prune_self_calls(&inlined_body, &idref.name, idref.ordinal))
            }
            _ => None,
        };
        if let Some(inlined) = inlined {
            let mut combined: Vec<CoreExpr> = constraints.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, e)| e.clone()).collect();
            combined.push(inlined);
            if let Ok(g) = try_strategies(ctx, cache, goal, pos, &combined) {
                return Some(g);
            }
        }
    }
    let _ = goal_keys;
    None
}

// ── Strategy 8: Union ────────────────────────────────────────────────

/// `e1 orelse e2`: each branch must independently yield a generator;
/// concatenated without a uniqueness guarantee (§4.7.2 strategy 8 — the
/// caller must `distinct` if that matters).
fn try_union(ctx: &mut SynthCtx, cache: &mut Cache, goal: &CorePat, _goal_keys: &[PatKey], pos: Pos, constraints: &[CoreExpr]) -> Option<Generator> {
    for (i, c) in constraints.iter().enumerate() {
        let branches = c.decompose_or();
        if branches.len() < 2 {
            continue;
        }
        if branches.len() > ctx.options.max_union_branches {
            continue;
        }
        let rest: Vec<CoreExpr> = constraints.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, e)| e.clone()).collect();
        let mut generators = Vec::with_capacity(branches.len());
        let mut ok = true;
        for branch in &branches {
            let mut per_branch = rest.clone();
            // Each disjunct may itself be a conjunction (e.g. a case-rewritten
            // `(subject = lit) andalso body`); flatten it so the per-branch
            // strategies see the bare conjuncts rather than one opaque `andalso`.
            per_branch.extend(branch.decompose_and().into_iter().cloned());
            match try_strategies(ctx, cache, goal, pos, &per_branch) {
                Ok(g) => generators.push(g),
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok || generators.is_empty() {
            continue;
        }
        let elem_ty = generators[0].exp.ty;
        let bag_elem = ctx.ts.is_list(elem_ty).or_else(|| ctx.ts.is_bag(elem_ty)).unwrap_or(elem_ty);
        let bag_ty = ctx.ts.bag_type(bag_elem);
        // A multi-source `from` with no `where` already enumerates the
        // cross-union of independent scans only when there is exactly
        // one source per branch sharing the same binding; with several
        // unrelated sources this would instead enumerate their product,
        // so each branch's generator is folded pairwise through the
        // internal `union` builtin instead of built as sibling sources.
        let mut acc: Option<CoreExpr> = None;
        for g in &generators {
            let src = core_ir::with_ordered(ctx.ts, false, g.exp.clone());
            acc = Some(match acc {
                None => src,
                Some(prev) => {
                    let args_ty = ctx.ts.tuple_type(vec![prev.ty, src.ty]);
                    let f_ty = ctx.ts.fn_type(args_ty, bag_ty);
                    let f = CoreExpr::new(f_ty, pos, CoreExprKind::BuiltinRef(BuiltinRef::internal("union")));
                    CoreExpr::new(bag_ty, pos, CoreExprKind::Apply(f, CoreExpr::new(args_ty, pos, CoreExprKind::Tuple(vec![prev, src]))))
                }
            });
        }
        let exp = acc?;
        return Some(Generator { pat: goal.clone(), exp, free_pats: Vec::new(), cardinality: Cardinality::Finite, unique: false });
    }
    None
}

// ── Strategy 9: Field derivation ─────────────────────────────────────

/// Whenever strategy 1 registered a fresh sub-pattern for a field access
/// on `goal` (tracked via [`Cache::record_field_mapping`] — a hook this
/// synthesizer's strategy 1 does not itself populate, since its `elem`
/// shape already produces a whole-tuple pattern directly; this strategy
/// is therefore reached only when a caller has independently recorded
/// per-field mappings for `goal`, e.g. an outer driver resolving a
/// record's fields one at a time), join each field's generator on shared
/// auxiliary variables and yield the reconstructed tuple (§4.7.2
/// strategy 9).
fn try_field_derivation(ctx: &mut SynthCtx, cache: &mut Cache, goal: &CorePat, goal_keys: &[PatKey], pos: Pos) -> Option<Generator> {
    let key = goal_keys.first()?.clone();
    let mappings = cache.field_mappings_for(&key);
    if mappings.is_empty() {
        return None;
    }
    let mut field_generators = Vec::new();
    for (_, sub_key, _) in &mappings {
        field_generators.push(cache.get(sub_key)?.clone());
    }
    let elem_ty = goal.ty;
    let mut builder = super::super::from_builder::FromBuilder::new(false);
    let mut yield_parts = Vec::with_capacity(field_generators.len());
    for g in &field_generators {
        builder.source(g.pat.clone(), core_ir::with_ordered(ctx.ts, false, g.exp.clone()));
        for (name, ordinal) in &g.free_pats {
            yield_parts.push(CoreExpr::new(elem_ty, pos, CoreExprKind::Id(core_ir::IdRef { name: name.clone(), ordinal: *ordinal })));
        }
    }
    let yield_exp = core_ir::record_or_atom(elem_ty, pos, yield_parts);
    builder.step(core_ir::CoreStep::Yield(yield_exp));
    builder.step(core_ir::CoreStep::Distinct);
    let query = builder.build_simplify();
    let bag_ty = ctx.ts.bag_type(elem_ty);
    let exp = CoreExpr::new(bag_ty, pos, CoreExprKind::From(query));
    Some(Generator { pat: goal.clone(), exp, free_pats: goal_keys.to_vec(), cardinality: Cardinality::Finite, unique: true })
}
