//! Resolver (C5): lowers the surface AST into Core IR against a
//! [`TypeMap`], applying the named rewrites of §4.5 — multi-binding
//! `let`/`val` flattened to a tuple-scrutinee `case`, non-self-referential
//! `val rec` demoted to plain `val`, `exists`/`forall`/`require`/`into`/
//! `through` desugared to their `Relational`-structure equivalents, and
//! `{e with f = v, ...}` expanded by pulling the untouched fields of `e`.

use std::collections::HashMap;

use thiserror::Error;

use reml_core::builtins;
use reml_core::env::{Binding, Env, EnvKey};
use reml_core::types::{Constructor, DataTypeId, Label, TypeId, TypeSystem};

use super::ast::{Decl, ExpKind, ExpNode, FromExp, NodeId, PatKind, PatNode, Pos, Program, Step, TypeExpr, ValBind};
use super::core_ir::{self, BuiltinRef, CoreError, CoreExpr, CoreExprKind, CorePat, CorePatKind, CoreStep, IdRef, MatchArm};
use super::from_builder::FromBuilder;
use super::session::NameGenerator;
use super::typemap::TypeMap;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unbound identifier '{name}' at {pos:?}")]
    UnboundIdentifier { name: String, pos: Pos },
    #[error("unbound constructor '{name}' at {pos:?}")]
    UnboundConstructor { name: String, pos: Pos },
    #[error("unbound type '{name}' at {pos:?}")]
    UnboundType { name: String, pos: Pos },
    #[error("node {0:?} has no recorded type")]
    MissingType(NodeId),
    #[error("`val rec`/`let rec` binding must be a simple identifier at {0:?}")]
    RecBindingNotIdent(Pos),
    #[error("record-with base at {0:?} is not a record type")]
    NotARecord(Pos),
    #[error("`forall` body at {0:?} cannot follow a query already finalized by `into`")]
    ForallTerminatedByInto(Pos),
    #[error(transparent)]
    Type(#[from] reml_core::types::TypeError),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// A resolved top-level item: either a persistent named value (extends
/// every later item's environment) or a bare expression evaluated for
/// effect.
#[derive(Debug, Clone)]
pub enum CoreItem {
    Value { name: String, ordinal: u32, ty: TypeId, bound: CoreExpr },
    Exp(CoreExpr),
}

/// Bindings carry no compile-time value in this resolver; `Env<()>` is
/// enough to track name → ordinal → type.
type ValueEnv = Env<()>;

pub struct Resolver<'a> {
    ts: &'a mut TypeSystem,
    type_map: &'a dyn TypeMap,
    gen: &'a mut NameGenerator,
    /// Constructor name → (owning datatype, index). Built once per
    /// resolver (the "variant id map") rather than re-scanned per
    /// constructor reference.
    variant_id_map: HashMap<String, (DataTypeId, usize)>,
}

impl<'a> Resolver<'a> {
    pub fn new(ts: &'a mut TypeSystem, type_map: &'a dyn TypeMap, gen: &'a mut NameGenerator) -> Self {
        let mut variant_id_map = HashMap::new();
        for (id, def) in ts.all_datatypes() {
            for (idx, ctor) in def.constructors.iter().enumerate() {
                variant_id_map.insert(ctor.name.clone(), (id, idx));
            }
        }
        Resolver { ts, type_map, gen, variant_id_map }
    }

    fn ty(&self, node: NodeId) -> Result<TypeId, ResolveError> {
        self.type_map.get_type(node).ok_or(ResolveError::MissingType(node))
    }

    // ── Top level ─────────────────────────────────────────────────

    pub fn resolve_program(&mut self, prog: &Program) -> Result<Vec<CoreItem>, ResolveError> {
        let mut env = ValueEnv::empty();
        let mut items = Vec::new();
        for decl in &prog.decls {
            let (new_env, mut new_items) = self.resolve_decl(env, decl)?;
            env = new_env;
            items.append(&mut new_items);
        }
        Ok(items)
    }

    fn resolve_decl(&mut self, env: ValueEnv, decl: &Decl) -> Result<(ValueEnv, Vec<CoreItem>), ResolveError> {
        match decl {
            Decl::Val(binds) => self.resolve_top_vals(env, binds),
            Decl::ValRec(binds) => self.resolve_top_val_rec(env, binds),
            Decl::Datatype(binds) => {
                self.register_datatypes(binds)?;
                Ok((env, Vec::new()))
            }
            Decl::Exp(e) => {
                let resolved = self.resolve_exp(&env, e)?;
                Ok((env, vec![CoreItem::Exp(resolved)]))
            }
        }
    }

    fn resolve_top_vals(&mut self, env: ValueEnv, binds: &[ValBind]) -> Result<(ValueEnv, Vec<CoreItem>), ResolveError> {
        let mut cur_env = env;
        let mut items = Vec::new();
        for vb in binds {
            let bound = self.resolve_exp(&cur_env, &vb.exp)?;
            if let PatKind::Id(name) = &vb.pat.kind {
                let ordinal = self.gen.next_ordinal();
                cur_env = cur_env.bind(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(bound.ty).top_level());
                items.push(CoreItem::Value { name: name.clone(), ordinal, ty: bound.ty, bound });
                continue;
            }
            // A destructuring top-level `val`: evaluate the pattern match
            // once into a hidden tuple of its bound names (the same
            // tuple-scrutinee trick as the multi-binding `let` rewrite,
            // §4.5), then project each name out of it.
            let (core_pat, _) = self.resolve_pat(&cur_env, &vb.pat)?;
            let bound_names = collect_bound(&core_pat);
            let tuple_exprs: Vec<CoreExpr> = bound_names
                .iter()
                .map(|(name, ordinal, ty)| CoreExpr::new(*ty, vb.pat.pos, CoreExprKind::Id(IdRef { name: name.clone(), ordinal: *ordinal })))
                .collect();
            let tuple_ty = self.ts.tuple_type(tuple_exprs.iter().map(|e| e.ty).collect());
            let yield_tuple = core_ir::record_or_atom(tuple_ty, vb.pat.pos, tuple_exprs);
            let arm = MatchArm { pat: core_pat, body: yield_tuple };
            let case_expr = CoreExpr::new(tuple_ty, vb.pat.pos, CoreExprKind::Case(bound, vec![arm]));
            let hidden_name = self.gen.fresh_name("destructure");
            let hidden_ordinal = self.gen.next_ordinal();
            items.push(CoreItem::Value { name: hidden_name.clone(), ordinal: hidden_ordinal, ty: tuple_ty, bound: case_expr });
            cur_env = cur_env.bind(Binding::new(EnvKey::new(hidden_name.clone(), hidden_ordinal)).with_type(tuple_ty).top_level());
            for (idx, (name, _, elem_ty)) in bound_names.iter().enumerate() {
                let proj_ordinal = self.gen.next_ordinal();
                let hidden_ref = CoreExpr::new(tuple_ty, vb.pat.pos, CoreExprKind::Id(IdRef { name: hidden_name.clone(), ordinal: hidden_ordinal }));
                let proj = if bound_names.len() == 1 {
                    hidden_ref
                } else {
                    CoreExpr::new(*elem_ty, vb.pat.pos, CoreExprKind::RecordSel { field: (idx + 1).to_string(), target: hidden_ref })
                };
                items.push(CoreItem::Value { name: name.clone(), ordinal: proj_ordinal, ty: *elem_ty, bound: proj });
                cur_env = cur_env.bind(Binding::new(EnvKey::new(name.clone(), proj_ordinal)).with_type(*elem_ty).top_level());
            }
        }
        Ok((cur_env, items))
    }

    fn resolve_top_val_rec(&mut self, env: ValueEnv, binds: &[ValBind]) -> Result<(ValueEnv, Vec<CoreItem>), ResolveError> {
        let names = rec_binding_names(binds)?;
        let mut ordinals = Vec::with_capacity(names.len());
        let mut bindings = Vec::with_capacity(names.len());
        for (vb, name) in binds.iter().zip(&names) {
            let bind_ty = self.ty(vb.pat.id)?;
            let ordinal = self.gen.next_ordinal();
            ordinals.push(ordinal);
            bindings.push(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(bind_ty).top_level());
        }
        let rec_env = env.bind_all(bindings);
        let mut items = Vec::with_capacity(binds.len());
        for ((vb, name), ordinal) in binds.iter().zip(&names).zip(&ordinals) {
            let bound = self.resolve_exp(&rec_env, &vb.exp)?;
            items.push(CoreItem::Value { name: name.clone(), ordinal: *ordinal, ty: bound.ty, bound });
        }
        Ok((rec_env, items))
    }

    fn register_datatypes(&mut self, binds: &[super::ast::DatatypeBind]) -> Result<(), ResolveError> {
        let mut ids = Vec::with_capacity(binds.len());
        for db in binds {
            ids.push(self.ts.datatype(db.name.clone(), db.params.len(), Vec::new()));
        }
        for (db, id) in binds.iter().zip(&ids) {
            let mut ctors = Vec::with_capacity(db.constructors.len());
            for cd in &db.constructors {
                let payload = cd.payload.as_ref().map(|te| self.resolve_type_expr(&db.params, te)).transpose()?;
                ctors.push(Constructor { name: cd.name.clone(), payload });
                self.variant_id_map.insert(cd.name.clone(), (*id, ctors.len() - 1));
            }
            self.ts.set_constructors(*id, ctors);
        }
        Ok(())
    }

    fn resolve_type_expr(&mut self, params: &[String], te: &TypeExpr) -> Result<TypeId, ResolveError> {
        match te {
            TypeExpr::Var(name, pos) => {
                let idx = params.iter().position(|p| p == name).ok_or_else(|| ResolveError::UnboundType { name: name.clone(), pos: *pos })?;
                Ok(self.ts.type_var(idx as u32))
            }
            TypeExpr::Tuple(elems, _pos) => {
                let tys = elems.iter().map(|e| self.resolve_type_expr(params, e)).collect::<Result<Vec<_>, _>>()?;
                Ok(self.ts.tuple_type(tys))
            }
            TypeExpr::Named(name, args, pos) => {
                if let Some(idx) = params.iter().position(|p| p == name) {
                    if !args.is_empty() {
                        return Err(ResolveError::UnboundType { name: name.clone(), pos: *pos });
                    }
                    return Ok(self.ts.type_var(idx as u32));
                }
                let resolved_args = args.iter().map(|a| self.resolve_type_expr(params, a)).collect::<Result<Vec<_>, _>>()?;
                let first = |args: &[TypeId]| args.first().copied().ok_or_else(|| ResolveError::UnboundType { name: name.clone(), pos: *pos });
                match name.as_str() {
                    "int" => Ok(self.ts.int_type()),
                    "real" => Ok(self.ts.real_type()),
                    "bool" => Ok(self.ts.bool_type()),
                    "char" => Ok(self.ts.char_type()),
                    "string" => Ok(self.ts.string_type()),
                    "unit" => Ok(self.ts.unit_type()),
                    "order" => Ok(self.ts.order_type()),
                    "list" => Ok(self.ts.list_type(first(&resolved_args)?)),
                    "bag" => Ok(self.ts.bag_type(first(&resolved_args)?)),
                    "option" => Ok(self.ts.option_type(first(&resolved_args)?)),
                    "vector" => Ok(self.ts.vector_type(first(&resolved_args)?)),
                    _ => {
                        let id = self.ts.datatype_id(name).ok_or_else(|| ResolveError::UnboundType { name: name.clone(), pos: *pos })?;
                        Ok(self.ts.datatype_applied(id, resolved_args))
                    }
                }
            }
        }
    }

    // ── Patterns ─────────────────────────────────────────────────

    pub fn resolve_pat(&mut self, env: &ValueEnv, pat: &PatNode) -> Result<(CorePat, ValueEnv), ResolveError> {
        let ty = self.ty(pat.id)?;
        let pos = pat.pos;
        match &pat.kind {
            PatKind::Wildcard => Ok((CorePat::new(ty, pos, CorePatKind::Wildcard), env.clone())),
            PatKind::Lit(l) => Ok((CorePat::new(ty, pos, CorePatKind::Lit(l.clone())), env.clone())),
            PatKind::Id(name) => {
                let ordinal = self.gen.next_ordinal();
                let new_env = env.bind(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(ty));
                Ok((CorePat::new(ty, pos, CorePatKind::Id { name: name.clone(), ordinal }), new_env))
            }
            PatKind::As(name, sub) => {
                let (sub_pat, sub_env) = self.resolve_pat(env, sub)?;
                let ordinal = self.gen.next_ordinal();
                let new_env = sub_env.bind(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(ty));
                Ok((CorePat::new(ty, pos, CorePatKind::As { name: name.clone(), ordinal, sub: sub_pat }), new_env))
            }
            PatKind::Tuple(pats) => {
                let mut cur_env = env.clone();
                let mut core_pats = Vec::with_capacity(pats.len());
                for p in pats {
                    let (cp, e2) = self.resolve_pat(&cur_env, p)?;
                    core_pats.push(cp);
                    cur_env = e2;
                }
                Ok((CorePat::new(ty, pos, CorePatKind::Tuple(core_pats)), cur_env))
            }
            PatKind::Record { fields, ellipsis } => {
                let mut cur_env = env.clone();
                let mut core_fields = Vec::with_capacity(fields.len());
                for (name, p) in fields {
                    let (cp, e2) = self.resolve_pat(&cur_env, p)?;
                    core_fields.push((name.clone(), cp));
                    cur_env = e2;
                }
                Ok((CorePat::new(ty, pos, CorePatKind::Record { fields: core_fields, ellipsis: *ellipsis }), cur_env))
            }
            PatKind::Con(name, payload) => {
                self.variant_id_map.get(name).copied().ok_or_else(|| ResolveError::UnboundConstructor { name: name.clone(), pos })?;
                let (p, e2) = self.resolve_pat(env, payload)?;
                Ok((CorePat::new(ty, pos, CorePatKind::Con(name.clone(), p)), e2))
            }
            PatKind::Con0(name) => {
                self.variant_id_map.get(name).copied().ok_or_else(|| ResolveError::UnboundConstructor { name: name.clone(), pos })?;
                Ok((CorePat::new(ty, pos, CorePatKind::Con0(name.clone())), env.clone()))
            }
            PatKind::Cons(head, tail) => {
                let (h, e1) = self.resolve_pat(env, head)?;
                let (t, e2) = self.resolve_pat(&e1, tail)?;
                Ok((CorePat::new(ty, pos, CorePatKind::Cons(h, t)), e2))
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────

    pub fn resolve_exp(&mut self, env: &ValueEnv, node: &ExpNode) -> Result<CoreExpr, ResolveError> {
        let ty = self.ty(node.id)?;
        let pos = node.pos;
        let kind = match &node.kind {
            ExpKind::Lit(l) => return Ok(CoreExpr::lit(ty, pos, l.clone())),
            ExpKind::Id(name) => return self.resolve_id(env, name, ty, pos),
            ExpKind::Fn(arms) => {
                let mut core_arms = Vec::with_capacity(arms.len());
                for arm in arms {
                    let (pat, arm_env) = self.resolve_pat(env, &arm.pat)?;
                    let body = self.resolve_exp(&arm_env, &arm.body)?;
                    core_arms.push(MatchArm { pat, body });
                }
                CoreExprKind::Fn(core_arms)
            }
            ExpKind::Apply(f, arg) => {
                let f = self.resolve_exp(env, f)?;
                let arg = self.resolve_exp(env, arg)?;
                return CoreExpr::apply(self.ts, pos, ty, f, arg).map_err(Into::into);
            }
            ExpKind::Tuple(es) => {
                let es = es.iter().map(|e| self.resolve_exp(env, e)).collect::<Result<Vec<_>, _>>()?;
                CoreExprKind::Tuple(es)
            }
            ExpKind::RecordSel(field, target) => {
                if let ExpKind::Id(structure_name) = &target.kind {
                    if let Some(entries) = builtins::by_structure().get(structure_name.as_str()) {
                        if let Some(entry) = entries.iter().find(|e| e.ml_name == field || e.alias == Some(field.as_str())) {
                            return Ok(CoreExpr::new(ty, pos, CoreExprKind::BuiltinRef(BuiltinRef::structured(structure_name.clone(), entry.ml_name))));
                        }
                    }
                }
                let target = self.resolve_exp(env, target)?;
                CoreExprKind::RecordSel { field: field.clone(), target }
            }
            ExpKind::RecordCons(fields) => {
                let entries = fields.iter().map(|(n, e)| Ok((n.clone(), self.resolve_exp(env, e)?))).collect::<Result<Vec<_>, ResolveError>>()?;
                return Ok(core_ir::record_tuple(ty, pos, entries));
            }
            ExpKind::RecordWith(base, fields) => return self.resolve_record_with(env, ty, pos, base, fields),
            ExpKind::ListLit(es) => {
                let es = es.iter().map(|e| self.resolve_exp(env, e)).collect::<Result<Vec<_>, _>>()?;
                CoreExprKind::ListLit(es)
            }
            ExpKind::Let(binds, body) => return self.resolve_let(env, ty, pos, binds, body),
            ExpKind::LetRec(binds, body) => return self.resolve_let_rec(env, ty, pos, binds, body),
            ExpKind::Case(scrutinee, arms) => {
                let scrutinee = self.resolve_exp(env, scrutinee)?;
                let mut core_arms = Vec::with_capacity(arms.len());
                for arm in arms {
                    let (pat, arm_env) = self.resolve_pat(env, &arm.pat)?;
                    let body = self.resolve_exp(&arm_env, &arm.body)?;
                    core_arms.push(MatchArm { pat, body });
                }
                CoreExprKind::Case(scrutinee, core_arms)
            }
            ExpKind::AndAlso(a, b) => CoreExprKind::AndAlso(self.resolve_exp(env, a)?, self.resolve_exp(env, b)?),
            ExpKind::OrElse(a, b) => CoreExprKind::OrElse(self.resolve_exp(env, a)?, self.resolve_exp(env, b)?),
            ExpKind::Not(a) => CoreExprKind::Not(self.resolve_exp(env, a)?),
            ExpKind::If(c, t, e) => CoreExprKind::If(self.resolve_exp(env, c)?, self.resolve_exp(env, t)?, self.resolve_exp(env, e)?),
            ExpKind::From(fe) => return self.resolve_from_exp(env, ty, pos, fe),
            ExpKind::Exists(fe) => return self.resolve_exists(env, pos, fe),
            ExpKind::Forall(fe, body) => return self.resolve_forall(env, pos, fe, body),
            ExpKind::Local(binds, body) => return self.resolve_local(env, ty, pos, binds, body),
        };
        Ok(CoreExpr::new(ty, pos, kind))
    }

    fn resolve_id(&self, env: &ValueEnv, name: &str, ty: TypeId, pos: Pos) -> Result<CoreExpr, ResolveError> {
        if let Some((structure, member)) = name.split_once('.') {
            let entries = builtins::by_structure().get(structure).ok_or_else(|| ResolveError::UnboundIdentifier { name: name.to_string(), pos })?;
            let entry = entries
                .iter()
                .find(|e| e.ml_name == member || e.alias == Some(member))
                .ok_or_else(|| ResolveError::UnboundIdentifier { name: name.to_string(), pos })?;
            return Ok(CoreExpr::new(ty, pos, CoreExprKind::BuiltinRef(BuiltinRef::structured(structure, entry.ml_name))));
        }
        if let Some(binding) = env.get_by_name(name) {
            return Ok(CoreExpr::new(ty, pos, CoreExprKind::Id(IdRef { name: name.to_string(), ordinal: binding.key.ordinal })));
        }
        if let Some((dtid, _)) = self.variant_id_map.get(name).copied() {
            return Ok(CoreExpr::new(ty, pos, CoreExprKind::ConRef { datatype: dtid, name: name.to_string() }));
        }
        if let Some(entry) = builtins::by_ml_name().get(name) {
            return Ok(CoreExpr::new(ty, pos, CoreExprKind::BuiltinRef(BuiltinRef { structure: entry.structure.map(|s| s.to_string()), ml_name: entry.ml_name.to_string() })));
        }
        Err(ResolveError::UnboundIdentifier { name: name.to_string(), pos })
    }

    fn resolve_record_with(&mut self, env: &ValueEnv, ty: TypeId, pos: Pos, base: &ExpNode, overrides: &[(String, ExpNode)]) -> Result<CoreExpr, ResolveError> {
        let base_r = self.resolve_exp(env, base)?;
        let fields: Vec<(Label, TypeId)> = self
            .ts
            .is_record(base_r.ty)
            .or_else(|| self.ts.is_progressive(base_r.ty))
            .map(|f| f.to_vec())
            .ok_or(ResolveError::NotARecord(base.pos))?;
        let mut resolved_overrides: HashMap<String, CoreExpr> = HashMap::new();
        for (name, e) in overrides {
            resolved_overrides.insert(name.clone(), self.resolve_exp(env, e)?);
        }
        let mut entries = Vec::with_capacity(fields.len());
        for (label, field_ty) in fields {
            if let Some(ov) = resolved_overrides.remove(&label) {
                entries.push((label, ov));
            } else {
                entries.push((label.clone(), CoreExpr::new(field_ty, pos, CoreExprKind::RecordSel { field: label, target: base_r.clone() })));
            }
        }
        Ok(core_ir::record_tuple(ty, pos, entries))
    }

    fn resolve_let(&mut self, env: &ValueEnv, ty: TypeId, pos: Pos, binds: &[ValBind], body: &ExpNode) -> Result<CoreExpr, ResolveError> {
        if binds.len() == 1 {
            let vb = &binds[0];
            let bound = self.resolve_exp(env, &vb.exp)?;
            let (pat, new_env) = self.resolve_pat(env, &vb.pat)?;
            let body = self.resolve_exp(&new_env, body)?;
            return Ok(CoreExpr::new(ty, pos, CoreExprKind::Let { pat, bound, body }));
        }
        // Multi-binding `let val p1 = e1 and p2 = e2 ... in body end`
        // flattens to a single tuple-scrutinee `case` (§4.5): every ei is
        // resolved in the outer scope (they may not see each other), then
        // the tuple of results is matched against the tuple of patterns.
        let bounds: Vec<CoreExpr> = binds.iter().map(|vb| self.resolve_exp(env, &vb.exp)).collect::<Result<_, _>>()?;
        let scrutinee_ty = self.ts.tuple_type(bounds.iter().map(|e| e.ty).collect());
        let scrutinee = core_ir::record_or_atom(scrutinee_ty, pos, bounds);
        let mut cur_env = env.clone();
        let mut pats = Vec::with_capacity(binds.len());
        for vb in binds {
            let (p, e2) = self.resolve_pat(&cur_env, &vb.pat)?;
            pats.push(p);
            cur_env = e2;
        }
        let pat_ty = self.ts.tuple_type(pats.iter().map(|p| p.ty).collect());
        let tuple_pat = core_ir::record_or_atom_pat(pat_ty, pos, pats);
        let body = self.resolve_exp(&cur_env, body)?;
        Ok(CoreExpr::new(ty, pos, CoreExprKind::Case(scrutinee, vec![MatchArm { pat: tuple_pat, body }])))
    }

    fn resolve_let_rec(&mut self, env: &ValueEnv, ty: TypeId, pos: Pos, binds: &[ValBind], body: &ExpNode) -> Result<CoreExpr, ResolveError> {
        let names = rec_binding_names(binds)?;
        // Demotion (§4.5): a lone binding that never refers to its own
        // name needs no recursive scope at all.
        if binds.len() == 1 && !references_name(&binds[0].exp, &names[0]) {
            return self.resolve_let(env, ty, pos, binds, body);
        }
        let mut ordinals = Vec::with_capacity(names.len());
        let mut bindings = Vec::with_capacity(names.len());
        for (vb, name) in binds.iter().zip(&names) {
            let bind_ty = self.ty(vb.pat.id)?;
            let ordinal = self.gen.next_ordinal();
            ordinals.push(ordinal);
            bindings.push(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(bind_ty));
        }
        let rec_env = env.bind_all(bindings);
        let mut core_bindings = Vec::with_capacity(binds.len());
        for ((vb, name), ordinal) in binds.iter().zip(&names).zip(&ordinals) {
            let bound = self.resolve_exp(&rec_env, &vb.exp)?;
            core_bindings.push((name.clone(), *ordinal, bound));
        }
        let body = self.resolve_exp(&rec_env, body)?;
        Ok(CoreExpr::new(ty, pos, CoreExprKind::LetRec { bindings: core_bindings, body }))
    }

    fn resolve_local(&mut self, env: &ValueEnv, ty: TypeId, pos: Pos, binds: &[super::ast::DatatypeBind], body: &ExpNode) -> Result<CoreExpr, ResolveError> {
        let mut ids = Vec::with_capacity(binds.len());
        for db in binds {
            ids.push(self.ts.datatype(db.name.clone(), db.params.len(), Vec::new()));
        }
        for (db, id) in binds.iter().zip(&ids) {
            let mut ctors = Vec::with_capacity(db.constructors.len());
            for cd in &db.constructors {
                let payload = cd.payload.as_ref().map(|te| self.resolve_type_expr(&db.params, te)).transpose()?;
                ctors.push(Constructor { name: cd.name.clone(), payload });
                self.variant_id_map.insert(cd.name.clone(), (*id, ctors.len() - 1));
            }
            self.ts.set_constructors(*id, ctors);
        }
        let body = self.resolve_exp(env, body)?;
        Ok(CoreExpr::new(ty, pos, CoreExprKind::Local(ids, body)))
    }

    // ── Query pipelines ──────────────────────────────────────────

    fn resolve_from_prefix(&mut self, env: &ValueEnv, from: &FromExp) -> Result<(FromBuilder, ValueEnv, Vec<(String, u32, TypeId)>), ResolveError> {
        let mut builder = FromBuilder::new(true);
        let mut cur_env = env.clone();
        let mut latest = Vec::new();
        for (pat, exp) in &from.sources {
            let resolved_exp = self.resolve_exp(&cur_env, exp)?;
            let (resolved_pat, new_env) = self.resolve_pat(&cur_env, pat)?;
            latest = collect_bound(&resolved_pat);
            builder.source(resolved_pat, resolved_exp);
            cur_env = new_env;
        }
        Ok((builder, cur_env, latest))
    }

    fn process_steps(&mut self, outer_env: &ValueEnv, mut cur_env: ValueEnv, mut latest: Vec<(String, u32, TypeId)>, mut builder: FromBuilder, steps: &[Step]) -> Result<StepsOutcome, ResolveError> {
        let mut saw_yield = false;
        let mut yield_ty: Option<TypeId> = None;
        let mut i = 0;
        while i < steps.len() {
            match &steps[i] {
                Step::Scan { pat, exp, cond } => {
                    let resolved_exp = self.resolve_exp(&cur_env, exp)?;
                    let (resolved_pat, new_env) = self.resolve_pat(&cur_env, pat)?;
                    let resolved_cond = cond.as_ref().map(|c| self.resolve_exp(&new_env, c)).transpose()?;
                    latest = collect_bound(&resolved_pat);
                    builder.step(CoreStep::Scan { pat: resolved_pat, exp: resolved_exp, cond: resolved_cond });
                    cur_env = new_env;
                }
                Step::Where(e) => {
                    let e = self.resolve_exp(&cur_env, e)?;
                    builder.step(CoreStep::Where(e));
                }
                Step::Yield(e) => {
                    let e = self.resolve_exp(&cur_env, e)?;
                    yield_ty = Some(e.ty);
                    saw_yield = true;
                    builder.step(CoreStep::Yield(e));
                }
                Step::Order(pairs) => {
                    let pairs = pairs.iter().map(|(e, asc)| Ok((self.resolve_exp(&cur_env, e)?, *asc))).collect::<Result<Vec<_>, ResolveError>>()?;
                    builder.step(CoreStep::Order(pairs));
                }
                Step::Group { keys, aggregates } => {
                    let mut key_entries = Vec::new();
                    let mut new_bindings = Vec::new();
                    let mut new_latest = Vec::new();
                    for (name, e) in keys {
                        let resolved_e = self.resolve_exp(&cur_env, e)?;
                        let ordinal = self.gen.next_ordinal();
                        let key_pat = CorePat::id(resolved_e.ty, resolved_e.pos, name.clone(), ordinal);
                        new_bindings.push(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(resolved_e.ty));
                        new_latest.push((name.clone(), ordinal, resolved_e.ty));
                        key_entries.push((name.clone(), key_pat, resolved_e));
                    }
                    let mut agg_entries = Vec::new();
                    // Aggregates are resolved against the pre-group scope
                    // rather than a modeled per-group sub-collection — a
                    // deliberate scope reduction (see DESIGN.md).
                    for (name, e) in aggregates {
                        let resolved_e = self.resolve_exp(&cur_env, e)?;
                        let ordinal = self.gen.next_ordinal();
                        new_bindings.push(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(resolved_e.ty));
                        new_latest.push((name.clone(), ordinal, resolved_e.ty));
                        agg_entries.push((name.clone(), resolved_e));
                    }
                    builder.step(CoreStep::Group { keys: key_entries, aggregates: agg_entries });
                    cur_env = outer_env.bind_all(new_bindings);
                    latest = new_latest;
                    saw_yield = false;
                    yield_ty = None;
                }
                Step::Compute(fields) => {
                    let mut entries = Vec::new();
                    let mut new_bindings = Vec::new();
                    for (name, e) in fields {
                        let resolved_e = self.resolve_exp(&cur_env, e)?;
                        let ordinal = self.gen.next_ordinal();
                        new_bindings.push(Binding::new(EnvKey::new(name.clone(), ordinal)).with_type(resolved_e.ty));
                        latest.push((name.clone(), ordinal, resolved_e.ty));
                        entries.push((name.clone(), resolved_e));
                    }
                    builder.step(CoreStep::Compute(entries));
                    cur_env = cur_env.bind_all(new_bindings);
                }
                Step::Distinct => {
                    builder.step(CoreStep::Distinct);
                }
                Step::Skip(e) => {
                    let e = self.resolve_exp(outer_env, e)?;
                    builder.step(CoreStep::Skip(e));
                }
                Step::Take(e) => {
                    let e = self.resolve_exp(outer_env, e)?;
                    builder.step(CoreStep::Take(e));
                }
                Step::Require(e) => {
                    let e = self.resolve_exp(&cur_env, e)?;
                    let not_e = CoreExpr::new(e.ty, e.pos, CoreExprKind::Not(e));
                    builder.step(CoreStep::Where(not_e));
                }
                Step::Through { pat, fn_exp } => {
                    let f = self.resolve_exp(outer_env, fn_exp)?;
                    let (param_ty, result_ty) = self.ts.is_fn(f.ty).ok_or(CoreError::NotAFunction { found: f.ty, pos: fn_exp.pos })?;
                    if !saw_yield {
                        append_implicit_yield(self.ts, &mut builder, &latest, fn_exp.pos);
                    }
                    let finished = builder.build_simplify();
                    let query_expr = CoreExpr::new(param_ty, fn_exp.pos, CoreExprKind::From(finished));
                    let applied = CoreExpr::apply(self.ts, fn_exp.pos, result_ty, f, query_expr)?;
                    let (resolved_pat, new_env) = self.resolve_pat(outer_env, pat)?;
                    latest = collect_bound(&resolved_pat);
                    builder = FromBuilder::new(true);
                    builder.source(resolved_pat, applied);
                    cur_env = new_env;
                    saw_yield = false;
                    yield_ty = None;
                }
                Step::Into(e) => {
                    let f = self.resolve_exp(outer_env, e)?;
                    let (param_ty, result_ty) = self.ts.is_fn(f.ty).ok_or(CoreError::NotAFunction { found: f.ty, pos: e.pos })?;
                    if !saw_yield {
                        append_implicit_yield(self.ts, &mut builder, &latest, e.pos);
                    }
                    let finished = builder.build_simplify();
                    let query_expr = CoreExpr::new(param_ty, e.pos, CoreExprKind::From(finished));
                    let applied = CoreExpr::apply(self.ts, e.pos, result_ty, f, query_expr)?;
                    return Ok(StepsOutcome::Terminal(applied));
                }
            }
            i += 1;
        }
        Ok(StepsOutcome::Open { builder, env: cur_env, latest, saw_yield, yield_ty })
    }

    fn resolve_from_exp(&mut self, env: &ValueEnv, ty: TypeId, pos: Pos, fe: &FromExp) -> Result<CoreExpr, ResolveError> {
        let (builder, cur_env, latest) = self.resolve_from_prefix(env, fe)?;
        match self.process_steps(env, cur_env, latest, builder, &fe.steps)? {
            StepsOutcome::Terminal(e) => Ok(e),
            StepsOutcome::Open { mut builder, latest, saw_yield, .. } => {
                if !saw_yield {
                    append_implicit_yield(self.ts, &mut builder, &latest, pos);
                }
                let mut finished = builder.build_simplify();
                finished.ordered = self.ts.is_bag(ty).is_none();
                Ok(CoreExpr::new(ty, pos, CoreExprKind::From(finished)))
            }
        }
    }

    fn resolve_exists(&mut self, env: &ValueEnv, pos: Pos, fe: &FromExp) -> Result<CoreExpr, ResolveError> {
        let (builder, cur_env, latest) = self.resolve_from_prefix(env, fe)?;
        let collection = match self.process_steps(env, cur_env, latest, builder, &fe.steps)? {
            StepsOutcome::Terminal(e) => e,
            StepsOutcome::Open { mut builder, latest, saw_yield, yield_ty, .. } => {
                if !saw_yield {
                    append_implicit_yield(self.ts, &mut builder, &latest, pos);
                }
                let elem_ty = yield_ty.unwrap_or_else(|| self.ts.tuple_type(latest.iter().map(|(_, _, t)| *t).collect()));
                let mut finished = builder.build_simplify();
                finished.ordered = false;
                CoreExpr::new(self.ts.bag_type(elem_ty), pos, CoreExprKind::From(finished))
            }
        };
        let bag = core_ir::with_ordered(self.ts, false, collection);
        self.apply_relational(pos, "nonEmpty", bag)
    }

    fn resolve_forall(&mut self, env: &ValueEnv, pos: Pos, fe: &FromExp, body: &ExpNode) -> Result<CoreExpr, ResolveError> {
        let (builder, cur_env, latest) = self.resolve_from_prefix(env, fe)?;
        let outcome = self.process_steps(env, cur_env, latest, builder, &fe.steps)?;
        let StepsOutcome::Open { mut builder, env: final_env, latest, yield_ty, .. } = outcome else {
            return Err(ResolveError::ForallTerminatedByInto(pos));
        };
        let requirement = self.resolve_exp(&final_env, body)?;
        let not_req = CoreExpr::new(requirement.ty, requirement.pos, CoreExprKind::Not(requirement));
        builder.step(CoreStep::Where(not_req));
        let elem_ty = match yield_ty {
            Some(t) => t,
            None => {
                let t = self.ts.tuple_type(latest.iter().map(|(_, _, t)| *t).collect());
                append_implicit_yield(self.ts, &mut builder, &latest, pos);
                t
            }
        };
        let mut finished = builder.build_simplify();
        finished.ordered = false;
        let collection = CoreExpr::new(self.ts.bag_type(elem_ty), pos, CoreExprKind::From(finished));
        let bag = core_ir::with_ordered(self.ts, false, collection);
        self.apply_relational(pos, "forall", bag)
    }

    fn apply_relational(&mut self, pos: Pos, alias: &str, bag: CoreExpr) -> Result<CoreExpr, ResolveError> {
        let entry = *builtins::by_ml_name().get(alias).unwrap_or_else(|| panic!("'{alias}' is a core catalog alias"));
        let structure = entry.structure.expect("Relational entries are namespaced");
        let f_ty = self.ts.fn_type(bag.ty, self.ts.bool_type());
        let f = CoreExpr::new(f_ty, pos, CoreExprKind::BuiltinRef(BuiltinRef::structured(structure, entry.ml_name)));
        let result_ty = self.ts.bool_type();
        CoreExpr::apply(self.ts, pos, result_ty, f, bag).map_err(Into::into)
    }
}

enum StepsOutcome {
    Open { builder: FromBuilder, env: ValueEnv, latest: Vec<(String, u32, TypeId)>, saw_yield: bool, yield_ty: Option<TypeId> },
    Terminal(CoreExpr),
}

fn append_implicit_yield(ts: &mut TypeSystem, builder: &mut FromBuilder, latest: &[(String, u32, TypeId)], pos: Pos) {
    let exprs: Vec<CoreExpr> = latest.iter().map(|(name, ordinal, ty)| CoreExpr::new(*ty, pos, CoreExprKind::Id(IdRef { name: name.clone(), ordinal: *ordinal }))).collect();
    let ty = ts.tuple_type(exprs.iter().map(|e| e.ty).collect());
    let yield_exp = core_ir::record_or_atom(ty, pos, exprs);
    builder.step(CoreStep::Yield(yield_exp));
}

fn collect_bound(pat: &CorePat) -> Vec<(String, u32, TypeId)> {
    fn walk(pat: &CorePat, sink: &mut Vec<(String, u32, TypeId)>) {
        match pat.kind.as_ref() {
            CorePatKind::Wildcard | CorePatKind::Lit(_) | CorePatKind::Con0(_) => {}
            CorePatKind::Id { name, ordinal } => sink.push((name.clone(), *ordinal, pat.ty)),
            CorePatKind::As { name, ordinal, sub } => {
                sink.push((name.clone(), *ordinal, pat.ty));
                walk(sub, sink);
            }
            CorePatKind::Tuple(ps) => ps.iter().for_each(|p| walk(p, sink)),
            CorePatKind::Record { fields, .. } => fields.iter().for_each(|(_, p)| walk(p, sink)),
            CorePatKind::Con(_, payload) => walk(payload, sink),
            CorePatKind::Cons(h, t) => {
                walk(h, sink);
                walk(t, sink);
            }
        }
    }
    let mut sink = Vec::new();
    walk(pat, &mut sink);
    sink
}

fn rec_binding_names(binds: &[ValBind]) -> Result<Vec<String>, ResolveError> {
    binds
        .iter()
        .map(|vb| match &vb.pat.kind {
            PatKind::Id(name) => Ok(name.clone()),
            _ => Err(ResolveError::RecBindingNotIdent(vb.pat.pos)),
        })
        .collect()
}

/// Approximate free-name scan over the surface AST, used only to decide
/// `val rec` demotion (§4.5). Treats a name as free unless a pattern it
/// passes through already rebinds it.
fn references_name(exp: &ExpNode, name: &str) -> bool {
    match &exp.kind {
        ExpKind::Lit(_) => false,
        ExpKind::Id(n) => n == name,
        ExpKind::Fn(arms) => arms.iter().any(|a| !pat_shadows(&a.pat, name) && references_name(&a.body, name)),
        ExpKind::Apply(f, a) => references_name(f, name) || references_name(a, name),
        ExpKind::Tuple(es) | ExpKind::ListLit(es) => es.iter().any(|e| references_name(e, name)),
        ExpKind::RecordSel(_, e) => references_name(e, name),
        ExpKind::RecordCons(fields) => fields.iter().any(|(_, e)| references_name(e, name)),
        ExpKind::RecordWith(base, fields) => references_name(base, name) || fields.iter().any(|(_, e)| references_name(e, name)),
        ExpKind::Let(binds, body) | ExpKind::LetRec(binds, body) => {
            binds.iter().any(|vb| references_name(&vb.exp, name)) || (!binds.iter().any(|vb| pat_shadows(&vb.pat, name)) && references_name(body, name))
        }
        ExpKind::Case(scrutinee, arms) => references_name(scrutinee, name) || arms.iter().any(|a| !pat_shadows(&a.pat, name) && references_name(&a.body, name)),
        ExpKind::AndAlso(a, b) | ExpKind::OrElse(a, b) => references_name(a, name) || references_name(b, name),
        ExpKind::Not(a) => references_name(a, name),
        ExpKind::If(c, t, e) => references_name(c, name) || references_name(t, name) || references_name(e, name),
        ExpKind::From(fe) | ExpKind::Exists(fe) => from_references_name(fe, name),
        ExpKind::Forall(fe, req) => from_references_name(fe, name) || references_name(req, name),
        ExpKind::Local(_, body) => references_name(body, name),
    }
}

fn pat_shadows(pat: &PatNode, name: &str) -> bool {
    match &pat.kind {
        PatKind::Id(n) => n == name,
        PatKind::As(n, sub) => n == name || pat_shadows(sub, name),
        PatKind::Tuple(ps) => ps.iter().any(|p| pat_shadows(p, name)),
        PatKind::Record { fields, .. } => fields.iter().any(|(_, p)| pat_shadows(p, name)),
        PatKind::Con(_, p) => pat_shadows(p, name),
        PatKind::Cons(h, t) => pat_shadows(h, name) || pat_shadows(t, name),
        PatKind::Wildcard | PatKind::Lit(_) | PatKind::Con0(_) => false,
    }
}

fn from_references_name(fe: &FromExp, name: &str) -> bool {
    fe.sources.iter().any(|(_, e)| references_name(e, name))
        || fe.steps.iter().any(|s| match s {
            Step::Scan { exp, cond, .. } => references_name(exp, name) || cond.as_ref().is_some_and(|c| references_name(c, name)),
            Step::Where(e) | Step::Yield(e) | Step::Skip(e) | Step::Take(e) | Step::Require(e) | Step::Into(e) => references_name(e, name),
            Step::Order(pairs) => pairs.iter().any(|(e, _)| references_name(e, name)),
            Step::Group { keys, aggregates } => keys.iter().any(|(_, e)| references_name(e, name)) || aggregates.iter().any(|(_, e)| references_name(e, name)),
            Step::Compute(fields) => fields.iter().any(|(_, e)| references_name(e, name)),
            Step::Distinct => false,
            Step::Through { fn_exp, .. } => references_name(fn_exp, name),
        })
}
