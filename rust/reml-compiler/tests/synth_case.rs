//! C7 synthesizer, strategy 6 "Case" (spec.md §9's case-rewrite note):
//! a boolean `case` over literal arms rewrites to an `orelse` of per-arm
//! `(subject = lit) andalso body` conjunctions, which strategy 8 (Union)
//! then splits and solves arm by arm.

use reml_compiler::compiler::ast::Lit;
use reml_compiler::compiler::core_ir::{BuiltinRef, CoreExpr, CoreExprKind, CorePat, CorePatKind, IdRef, MatchArm};
use reml_compiler::compiler::session::NameGenerator;
use reml_compiler::compiler::synth::{synthesize, Cache, Cardinality, SynthCtx};
use reml_compiler::compiler::testing_helpers::pos;
use reml_compiler::CompileOptions;
use reml_core::env::Env;
use reml_core::types::TypeSystem;

fn elem(ts: &mut TypeSystem, e: CoreExpr, collection: CoreExpr) -> CoreExpr {
    let arg_ty = ts.tuple_type(vec![e.ty, collection.ty]);
    let f_ty = ts.fn_type(arg_ty, ts.bool_type());
    CoreExpr::new(
        ts.bool_type(),
        pos(),
        CoreExprKind::Apply(CoreExpr::new(f_ty, pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("elem"))), CoreExpr::new(arg_ty, pos(), CoreExprKind::Tuple(vec![e, collection]))),
    )
}

/// `case color of 0 => x elem reds | 1 => x elem blues` with goal `x`:
/// both literal arms have a non-`false` body, so both survive as
/// `orelse`-joined disjuncts and strategy 8 unions their two scans.
#[test]
fn a_two_armed_literal_case_unions_each_arms_elem_scan() {
    let mut ts = TypeSystem::new();
    let mut ng = NameGenerator::new();
    let env: Env<CoreExpr> = Env::empty();
    let options = CompileOptions::default();

    let int_ty = ts.int_type();
    let x_pat = CorePat::new(int_ty, pos(), CorePatKind::Id { name: "x".into(), ordinal: 0 });
    let x_ref = CoreExpr::new(int_ty, pos(), CoreExprKind::Id(IdRef { name: "x".into(), ordinal: 0 }));
    let color_ty = ts.int_type();
    let color_ref = CoreExpr::new(color_ty, pos(), CoreExprKind::Id(IdRef { name: "color".into(), ordinal: 1 }));
    let reds_ty = ts.list_type(int_ty);
    let blues_ty = ts.list_type(int_ty);
    let reds = CoreExpr::new(reds_ty, pos(), CoreExprKind::Id(IdRef { name: "reds".into(), ordinal: 2 }));
    let blues = CoreExpr::new(blues_ty, pos(), CoreExprKind::Id(IdRef { name: "blues".into(), ordinal: 3 }));

    let arm0 = MatchArm {
        pat: CorePat::new(color_ty, pos(), CorePatKind::Lit(Lit::Int(0.into()))),
        body: elem(&mut ts, x_ref.clone(), reds.clone()),
    };
    let arm1 = MatchArm {
        pat: CorePat::new(color_ty, pos(), CorePatKind::Lit(Lit::Int(1.into()))),
        body: elem(&mut ts, x_ref, blues.clone()),
    };
    let constraint = CoreExpr::new(ts.bool_type(), pos(), CoreExprKind::Case(color_ref, vec![arm0, arm1]));

    let mut cache = Cache::new();
    let mut ctx = SynthCtx { ts: &mut ts, ng: &mut ng, env: &env, options: &options };
    let generator = synthesize(&mut ctx, &mut cache, &x_pat, pos(), &[constraint]).unwrap();

    assert_eq!(generator.cardinality, Cardinality::Finite);
    // The union strategy concatenates one scan per arm via the internal
    // union builtin, not a multi-source `from` (that would enumerate the
    // product of the two arms' collections, not their sum).
    assert!(generator.exp.is_call_to(Some(reml_core::builtins::INTERNAL_STRUCTURE), "union"));
}

/// `case flag of true => y elem ys | false => false` with goal `y`: the
/// `false`-bodied literal arm contributes no disjunct of its own — it
/// only excludes `flag = false` from consideration — so a single `orelse`
/// branch (not a union) solves the goal directly.
#[test]
fn a_false_bodied_arm_is_an_exclusion_not_a_disjunct() {
    let mut ts = TypeSystem::new();
    let mut ng = NameGenerator::new();
    let env: Env<CoreExpr> = Env::empty();
    let options = CompileOptions::default();

    let bool_ty = ts.bool_type();
    let y_ty = ts.int_type();
    let y_pat = CorePat::new(y_ty, pos(), CorePatKind::Id { name: "y".into(), ordinal: 0 });
    let y_ref = CoreExpr::new(y_ty, pos(), CoreExprKind::Id(IdRef { name: "y".into(), ordinal: 0 }));
    let flag_ref = CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "flag".into(), ordinal: 1 }));
    let ys_ty = ts.list_type(y_ty);
    let ys = CoreExpr::new(ys_ty, pos(), CoreExprKind::Id(IdRef { name: "ys".into(), ordinal: 2 }));

    let arm_true = MatchArm { pat: CorePat::new(bool_ty, pos(), CorePatKind::Lit(Lit::Bool(true))), body: elem(&mut ts, y_ref, ys.clone()) };
    let arm_false = MatchArm { pat: CorePat::new(bool_ty, pos(), CorePatKind::Lit(Lit::Bool(false))), body: CoreExpr::lit(bool_ty, pos(), Lit::Bool(false)) };
    let constraint = CoreExpr::new(bool_ty, pos(), CoreExprKind::Case(flag_ref, vec![arm_true, arm_false]));

    let mut cache = Cache::new();
    let mut ctx = SynthCtx { ts: &mut ts, ng: &mut ng, env: &env, options: &options };
    let generator = synthesize(&mut ctx, &mut cache, &y_pat, pos(), &[constraint]).unwrap();

    assert_eq!(generator.cardinality, Cardinality::Finite);
    assert_eq!(generator.exp, ys);
}
