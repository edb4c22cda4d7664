//! Core IR (C3): the typed algebraic representation of expressions,
//! patterns, declarations, and query steps produced by the resolver and
//! consumed by the generator synthesizer, analyzer, and (out of scope
//! here) the evaluator.
//!
//! Records have no dedicated construction node. A record value is,
//! structurally, a [`CoreExprKind::Tuple`] whose elements are ordered by
//! [`reml_core::types::field_cmp`] — the same canonical order the
//! record's `TypeId` stores its fields in. `#field e` is therefore
//! compiled to a positional projection, not a name lookup; this is the
//! same trick real ML implementations use to avoid carrying field names
//! at runtime.

use reml_core::types::{field_cmp, DataTypeId, TypeId, TypeSystem};
use thiserror::Error;

pub use super::ast::Lit;
use super::tokens::Span;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("type mismatch at {pos:?}: expected {expected}, found {found}")]
    TypeMismatch { expected: TypeId, found: TypeId, pos: Span },
    #[error("apply target at {pos:?} is not a function type ({found})")]
    NotAFunction { found: TypeId, pos: Span },
}

/// A reference to a previously bound identifier: the name plus its
/// ordinal (§3.2's "stable ordinal distinguishing shadowed
/// redeclarations"). The referenced type lives on the wrapping
/// [`CoreExpr::ty`], since a polymorphic binding may be referenced at
/// different instantiations from different call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdRef {
    pub name: String,
    pub ordinal: u32,
}

/// A reference to a built-in "function literal" (§3.2) — any catalog
/// entry, not only functions; `Relational.nonEmpty`, `extent`, and `op +`
/// are all `BuiltinRef`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuiltinRef {
    pub structure: Option<String>,
    pub ml_name: String,
}

impl BuiltinRef {
    pub fn internal(ml_name: impl Into<String>) -> Self {
        BuiltinRef { structure: Some(reml_core::builtins::INTERNAL_STRUCTURE.to_string()), ml_name: ml_name.into() }
    }

    pub fn top_level(ml_name: impl Into<String>) -> Self {
        BuiltinRef { structure: None, ml_name: ml_name.into() }
    }

    pub fn structured(structure: impl Into<String>, ml_name: impl Into<String>) -> Self {
        BuiltinRef { structure: Some(structure.into()), ml_name: ml_name.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorePat {
    pub ty: TypeId,
    pub pos: Span,
    pub kind: Box<CorePatKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorePatKind {
    Wildcard,
    Lit(Lit),
    Id { name: String, ordinal: u32 },
    As { name: String, ordinal: u32, sub: CorePat },
    Tuple(Vec<CorePat>),
    Record { fields: Vec<(String, CorePat)>, ellipsis: bool },
    Con(String, CorePat),
    Con0(String),
    Cons(CorePat, CorePat),
}

impl CorePat {
    pub fn new(ty: TypeId, pos: Span, kind: CorePatKind) -> Self {
        CorePat { ty, pos, kind: Box::new(kind) }
    }

    pub fn id(ty: TypeId, pos: Span, name: impl Into<String>, ordinal: u32) -> Self {
        CorePat::new(ty, pos, CorePatKind::Id { name: name.into(), ordinal })
    }

    pub fn wildcard(ty: TypeId, pos: Span) -> Self {
        CorePat::new(ty, pos, CorePatKind::Wildcard)
    }

    /// The set of identifier names this pattern binds (its "free
    /// patterns" contribution to a generator's `free_pats`, §3.5).
    pub fn bound_names(&self, sink: &mut Vec<(String, u32)>) {
        match self.kind.as_ref() {
            CorePatKind::Wildcard | CorePatKind::Lit(_) | CorePatKind::Con0(_) => {}
            CorePatKind::Id { name, ordinal } => sink.push((name.clone(), *ordinal)),
            CorePatKind::As { name, ordinal, sub } => {
                sink.push((name.clone(), *ordinal));
                sub.bound_names(sink);
            }
            CorePatKind::Tuple(pats) => pats.iter().for_each(|p| p.bound_names(sink)),
            CorePatKind::Record { fields, .. } => fields.iter().for_each(|(_, p)| p.bound_names(sink)),
            CorePatKind::Con(_, payload) => payload.bound_names(sink),
            CorePatKind::Cons(head, tail) => {
                head.bound_names(sink);
                tail.bound_names(sink);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pat: CorePat,
    pub body: CoreExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreExpr {
    pub ty: TypeId,
    pub pos: Span,
    pub kind: Box<CoreExprKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreExprKind {
    Lit(Lit),
    Id(IdRef),
    BuiltinRef(BuiltinRef),
    /// A datatype constructor used as a value: applied for a constructor
    /// with a payload (`SOME x` ⇒ `Apply(ConRef{..}, x)`), standalone for
    /// a nullary one (`NONE`).
    ConRef { datatype: DataTypeId, name: String },
    RecordSel { field: String, target: CoreExpr },
    Tuple(Vec<CoreExpr>),
    /// `[e1, e2, ...]`. Unlike records, lists have no tuple isomorphism
    /// (variable length, and `list` is itself a distinct collection
    /// type), so this stays a dedicated node rather than folding into
    /// `Tuple`.
    ListLit(Vec<CoreExpr>),
    Apply(CoreExpr, CoreExpr),
    /// Single-parameter lambda with a match list (§3.2).
    Fn(Vec<MatchArm>),
    Case(CoreExpr, Vec<MatchArm>),
    /// `if cond then t else f` — kept distinct from `Case` rather than
    /// desugared to a two-arm boolean match, since `simplify` folds it
    /// directly on a literal condition.
    If(CoreExpr, CoreExpr, CoreExpr),
    /// Short-circuiting `andalso`/`orelse`/`not`. These are control forms,
    /// not catalog entries — ML's `andalso`/`orelse` are non-strict and
    /// `not` is the one strict boolean primitive with no homed built-in
    /// structure, so all three stay as dedicated Core nodes rather than
    /// `BuiltinRef` applications.
    AndAlso(CoreExpr, CoreExpr),
    OrElse(CoreExpr, CoreExpr),
    Not(CoreExpr),
    /// A single non-recursive value declaration. Multi-binding `let`s are
    /// flattened away before reaching Core (§4.5).
    Let { pat: CorePat, bound: CoreExpr, body: CoreExpr },
    /// A (possibly mutually) recursive value declaration group, kept only
    /// for bindings that genuinely self- or mutually reference one
    /// another (§4.5's `val rec` demotion folds the rest back to `Let`).
    /// Each bound expression is resolved in a scope that already
    /// contains every name in the group.
    LetRec { bindings: Vec<(String, u32, CoreExpr)>, body: CoreExpr },
    From(Query),
    /// A `local` datatype declaration scoping an inner expression; the
    /// datatypes themselves are already registered in the shared
    /// `TypeSystem` by the time this node exists, this just remembers
    /// which ids came into scope here.
    Local(Vec<DataTypeId>, CoreExpr),
}

impl CoreExpr {
    pub fn new(ty: TypeId, pos: Span, kind: CoreExprKind) -> Self {
        CoreExpr { ty, pos, kind: Box::new(kind) }
    }

    pub fn lit(ty: TypeId, pos: Span, lit: Lit) -> Self {
        CoreExpr::new(ty, pos, CoreExprKind::Lit(lit))
    }

    /// `apply(pos, type, fn, arg)`: requires `fn.type = fnType(arg.type,
    /// type)` (§4.3).
    pub fn apply(ts: &mut TypeSystem, pos: Span, result_ty: TypeId, f: CoreExpr, arg: CoreExpr) -> Result<CoreExpr, CoreError> {
        let (param, ret) = ts.is_fn(f.ty).ok_or(CoreError::NotAFunction { found: f.ty, pos })?;
        if param != arg.ty {
            return Err(CoreError::TypeMismatch { expected: param, found: arg.ty, pos });
        }
        if ret != result_ty {
            return Err(CoreError::TypeMismatch { expected: ret, found: result_ty, pos });
        }
        Ok(CoreExpr::new(result_ty, pos, CoreExprKind::Apply(f, arg)))
    }

    /// `isCallTo(builtIn)`: true iff this node is an application whose
    /// callee is a function literal for the given built-in (§4.3). Since
    /// every built-in is applied to exactly one (possibly tuple) argument,
    /// no currying unwrap is needed.
    pub fn is_call_to(&self, structure: Option<&str>, ml_name: &str) -> bool {
        match self.kind.as_ref() {
            CoreExprKind::Apply(f, _) => match f.kind.as_ref() {
                CoreExprKind::BuiltinRef(b) => b.ml_name == ml_name && b.structure.as_deref() == structure,
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_bool_lit(&self, want: bool) -> bool {
        is_bool_lit(self, want)
    }

    pub fn call_target(&self) -> Option<&BuiltinRef> {
        match self.kind.as_ref() {
            CoreExprKind::Apply(f, _) => match f.kind.as_ref() {
                CoreExprKind::BuiltinRef(b) => Some(b),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn call_arg(&self) -> Option<&CoreExpr> {
        match self.kind.as_ref() {
            CoreExprKind::Apply(_, arg) => Some(arg),
            _ => None,
        }
    }

    /// `decomposeAnd`: flatten nested `andalso` into a list of conjuncts,
    /// left-to-right (§4.3).
    pub fn decompose_and(&self) -> Vec<&CoreExpr> {
        let mut sink = Vec::new();
        self.flatten_and(&mut sink);
        sink
    }

    /// `flattenAnd(exp, sink)`: append each conjunct to `sink` (§4.3).
    pub fn flatten_and<'a>(&'a self, sink: &mut Vec<&'a CoreExpr>) {
        if let CoreExprKind::AndAlso(l, r) = self.kind.as_ref() {
            l.flatten_and(sink);
            r.flatten_and(sink);
        } else {
            sink.push(self);
        }
    }

    /// `decomposeOr`: flatten nested `orelse` into a list of disjuncts.
    pub fn decompose_or(&self) -> Vec<&CoreExpr> {
        let mut sink = Vec::new();
        self.flatten_or(&mut sink);
        sink
    }

    fn flatten_or<'a>(&'a self, sink: &mut Vec<&'a CoreExpr>) {
        if let CoreExprKind::OrElse(l, r) = self.kind.as_ref() {
            l.flatten_or(sink);
            r.flatten_or(sink);
        } else {
            sink.push(self);
        }
    }

    /// `toPat(exp)`: structural conversion from an expression to a
    /// pattern, used when the synthesizer derives a scan pattern from an
    /// expression (tuple expressions become tuple patterns, literals
    /// become literal patterns, identifier references become `IdPat`s).
    /// Returns `None` for expressions with no pattern counterpart.
    pub fn to_pat(&self) -> Option<CorePat> {
        match self.kind.as_ref() {
            CoreExprKind::Lit(l) => Some(CorePat::new(self.ty, self.pos, CorePatKind::Lit(l.clone()))),
            CoreExprKind::Id(idref) => {
                Some(CorePat::new(self.ty, self.pos, CorePatKind::Id { name: idref.name.clone(), ordinal: idref.ordinal }))
            }
            CoreExprKind::Tuple(elems) => {
                let pats: Option<Vec<CorePat>> = elems.iter().map(|e| e.to_pat()).collect();
                pats.map(|p| CorePat::new(self.ty, self.pos, CorePatKind::Tuple(p)))
            }
            _ => None,
        }
    }

    /// `simplify(exp)`: local peephole simplification (constant folding
    /// of `true andalso e`, double negation, etc.). Idempotent:
    /// `simplify(simplify(e)) = simplify(e)` (§8.2).
    pub fn simplify(self) -> CoreExpr {
        let CoreExpr { ty, pos, kind } = self;
        let kind = match *kind {
            CoreExprKind::Apply(f, arg) => CoreExprKind::Apply(f.simplify(), arg.simplify()),
            CoreExprKind::AndAlso(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                if is_bool_lit(&l, true) {
                    return r;
                }
                if is_bool_lit(&r, true) {
                    return l;
                }
                if is_bool_lit(&l, false) || is_bool_lit(&r, false) {
                    return CoreExpr::lit(ty, pos, Lit::Bool(false));
                }
                CoreExprKind::AndAlso(l, r)
            }
            CoreExprKind::OrElse(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                if is_bool_lit(&l, false) {
                    return r;
                }
                if is_bool_lit(&r, false) {
                    return l;
                }
                if is_bool_lit(&l, true) || is_bool_lit(&r, true) {
                    return CoreExpr::lit(ty, pos, Lit::Bool(true));
                }
                CoreExprKind::OrElse(l, r)
            }
            CoreExprKind::Not(inner) => {
                let inner = inner.simplify();
                if let CoreExprKind::Lit(Lit::Bool(v)) = inner.kind.as_ref() {
                    return CoreExpr::lit(ty, pos, Lit::Bool(!v));
                }
                if let CoreExprKind::Not(doubly_inner) = inner.kind.as_ref() {
                    return (**doubly_inner).clone();
                }
                CoreExprKind::Not(inner)
            }
            CoreExprKind::If(cond, then_e, else_e) => {
                let cond = cond.simplify();
                let then_e = then_e.simplify();
                let else_e = else_e.simplify();
                if is_bool_lit(&cond, true) {
                    return then_e;
                }
                if is_bool_lit(&cond, false) {
                    return else_e;
                }
                CoreExprKind::If(cond, then_e, else_e)
            }
            CoreExprKind::Tuple(elems) => CoreExprKind::Tuple(elems.into_iter().map(|e| e.simplify()).collect()),
            CoreExprKind::ListLit(elems) => CoreExprKind::ListLit(elems.into_iter().map(|e| e.simplify()).collect()),
            CoreExprKind::RecordSel { field, target } => CoreExprKind::RecordSel { field, target: target.simplify() },
            CoreExprKind::Fn(arms) => CoreExprKind::Fn(simplify_arms(arms)),
            CoreExprKind::Case(scrutinee, arms) => CoreExprKind::Case(scrutinee.simplify(), simplify_arms(arms)),
            CoreExprKind::Let { pat, bound, body } => {
                CoreExprKind::Let { pat, bound: bound.simplify(), body: body.simplify() }
            }
            CoreExprKind::LetRec { bindings, body } => CoreExprKind::LetRec {
                bindings: bindings.into_iter().map(|(n, o, e)| (n, o, e.simplify())).collect(),
                body: body.simplify(),
            },
            CoreExprKind::Local(ids, body) => CoreExprKind::Local(ids, body.simplify()),
            other @ (CoreExprKind::Lit(_)
            | CoreExprKind::Id(_)
            | CoreExprKind::BuiltinRef(_)
            | CoreExprKind::ConRef { .. }
            | CoreExprKind::From(_)) => other,
        };
        CoreExpr::new(ty, pos, kind)
    }
}

fn simplify_arms(arms: Vec<MatchArm>) -> Vec<MatchArm> {
    arms.into_iter().map(|a| MatchArm { pat: a.pat, body: a.body.simplify() }).collect()
}

fn is_bool_lit(e: &CoreExpr, want: bool) -> bool {
    matches!(e.kind.as_ref(), CoreExprKind::Lit(Lit::Bool(v)) if *v == want)
}

/// `recordOrAtomPat(pats)`: one pattern stays itself, many become a
/// tuple pattern (§4.3) — the pattern-side counterpart of the
/// multi-binding flattening rewrite in §4.5.
pub fn record_or_atom_pat(ty: TypeId, pos: Span, mut pats: Vec<CorePat>) -> CorePat {
    if pats.len() == 1 {
        pats.pop().unwrap()
    } else {
        CorePat::new(ty, pos, CorePatKind::Tuple(pats))
    }
}

/// `recordOrAtom(pats)`: the expression-side counterpart.
pub fn record_or_atom(ty: TypeId, pos: Span, mut exps: Vec<CoreExpr>) -> CoreExpr {
    if exps.len() == 1 {
        exps.pop().unwrap()
    } else {
        CoreExpr::new(ty, pos, CoreExprKind::Tuple(exps))
    }
}

/// Build a record-shaped tuple from `(field, value)` pairs, sorting by
/// [`field_cmp`] first so the element order matches the record type's
/// canonical field order.
pub fn record_tuple(ty: TypeId, pos: Span, mut fields: Vec<(String, CoreExpr)>) -> CoreExpr {
    fields.sort_by(|(a, _), (b, _)| field_cmp(a, b));
    CoreExpr::new(ty, pos, CoreExprKind::Tuple(fields.into_iter().map(|(_, e)| e).collect()))
}

/// `withOrdered(boolean, exp)`: coerce `exp` (a list- or bag-typed
/// collection) to a list (`ordered = true`) or a bag (`ordered = false`),
/// inserting a `Bag.fromList` / `List.fromBag` built-in call as needed
/// (§4.3).
pub fn with_ordered(ts: &mut TypeSystem, ordered: bool, exp: CoreExpr) -> CoreExpr {
    let pos = exp.pos;
    if ordered {
        if let Some(elem) = ts.is_bag(exp.ty) {
            let list_ty = ts.list_type(elem);
            let f = CoreExpr::new(
                ts.fn_type(exp.ty, list_ty),
                pos,
                CoreExprKind::BuiltinRef(BuiltinRef::structured("List", "fromBag")),
            );
            return CoreExpr::new(list_ty, pos, CoreExprKind::Apply(f, exp));
        }
    } else if let Some(elem) = ts.is_list(exp.ty) {
        let bag_ty = ts.bag_type(elem);
        let f = CoreExpr::new(
            ts.fn_type(exp.ty, bag_ty),
            pos,
            CoreExprKind::BuiltinRef(BuiltinRef::structured("Bag", "fromList")),
        );
        return CoreExpr::new(bag_ty, pos, CoreExprKind::Apply(f, exp));
    }
    exp
}

// ── Query pipeline (`from`) ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CoreStep {
    Scan { pat: CorePat, exp: CoreExpr, cond: Option<CoreExpr> },
    Where(CoreExpr),
    Yield(CoreExpr),
    Order(Vec<(CoreExpr, bool)>),
    Group { keys: Vec<(String, CorePat, CoreExpr)>, aggregates: Vec<(String, CoreExpr)> },
    Compute(Vec<(String, CoreExpr)>),
    Distinct,
    Skip(CoreExpr),
    Take(CoreExpr),
    /// Present in the Core step vocabulary for structural completeness
    /// (§3.2), but the resolver never emits it: `require e` is always
    /// desugared to `Where(not e)` during step translation (§4.5).
    Require(CoreExpr),
    /// Likewise never emitted directly: `through p in f` splits the
    /// pipeline into two `From` nodes joined by `Apply` (§4.5).
    Through { pat: CorePat, fn_exp: CoreExpr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sources: Vec<(CorePat, CoreExpr)>,
    pub steps: Vec<CoreStep>,
    /// `true` if this query's result is a list (ordered), `false` if a
    /// bag (unordered) (§3.1).
    pub ordered: bool,
}

impl Query {
    /// The set of bindings introduced by this query's scans, i.e. what a
    /// `where`/`yield` immediately after the last scan may reference
    /// (used by the well-formedness check in §3.2).
    pub fn scan_bindings(&self) -> Vec<(String, u32)> {
        let mut names = Vec::new();
        for (pat, _) in &self.sources {
            pat.bound_names(&mut names);
        }
        for step in &self.steps {
            match step {
                CoreStep::Scan { pat, .. } => pat.bound_names(&mut names),
                CoreStep::Group { keys, .. } => {
                    for (_, pat, _) in keys {
                        pat.bound_names(&mut names);
                    }
                }
                _ => {}
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reml_core::types::TypeSystem;

    fn pos() -> Span {
        Span::dummy()
    }

    #[test]
    fn decompose_and_flattens_nested_andalso() {
        let bool_ty = TypeSystem::new().bool_type();
        let lit_true = CoreExpr::lit(bool_ty, pos(), Lit::Bool(true));
        let lit_false = CoreExpr::lit(bool_ty, pos(), Lit::Bool(false));
        let inner = CoreExpr::new(bool_ty, pos(), CoreExprKind::AndAlso(lit_true.clone(), lit_false.clone()));
        let outer = CoreExpr::new(bool_ty, pos(), CoreExprKind::AndAlso(inner, lit_true.clone()));
        let conjuncts = outer.decompose_and();
        assert_eq!(conjuncts.len(), 3);
    }

    #[test]
    fn simplify_folds_true_andalso() {
        let bool_ty = TypeSystem::new().bool_type();
        let rhs_id = CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "p".into(), ordinal: 0 }));
        let e = CoreExpr::new(
            bool_ty,
            pos(),
            CoreExprKind::AndAlso(CoreExpr::lit(bool_ty, pos(), Lit::Bool(true)), rhs_id.clone()),
        );
        let simplified = e.simplify();
        assert_eq!(simplified, rhs_id);
    }

    #[test]
    fn simplify_is_idempotent() {
        let bool_ty = TypeSystem::new().bool_type();
        let id = CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "p".into(), ordinal: 0 }));
        let inner = CoreExpr::new(bool_ty, pos(), CoreExprKind::Not(id.clone()));
        let outer = CoreExpr::new(bool_ty, pos(), CoreExprKind::Not(inner));
        let once = outer.simplify();
        let twice = once.clone().simplify();
        assert_eq!(once, twice);
        assert_eq!(once, id);
    }

    #[test]
    fn record_tuple_orders_fields_canonically() {
        let mut ts = TypeSystem::new();
        let int_ty = ts.int_type();
        let e = record_tuple(
            int_ty,
            pos(),
            vec![
                ("b".into(), CoreExpr::lit(int_ty, pos(), Lit::Int(2.into()))),
                ("a".into(), CoreExpr::lit(int_ty, pos(), Lit::Int(1.into()))),
            ],
        );
        if let CoreExprKind::Tuple(elems) = e.kind.as_ref() {
            assert_eq!(elems[0].kind.as_ref(), &CoreExprKind::Lit(Lit::Int(1.into())));
            assert_eq!(elems[1].kind.as_ref(), &CoreExprKind::Lit(Lit::Int(2.into())));
        } else {
            panic!("expected tuple");
        }
    }

    #[test]
    fn with_ordered_inserts_conversion_when_needed() {
        let mut ts = TypeSystem::new();
        let int_ty = ts.int_type();
        let bag_ty = ts.bag_type(int_ty);
        let e = CoreExpr::new(bag_ty, pos(), CoreExprKind::Tuple(vec![]));
        let as_list = with_ordered(&mut ts, true, e);
        assert!(ts.is_list(as_list.ty).is_some());
        assert!(as_list.is_call_to(Some("List"), "fromBag"));
    }
}
