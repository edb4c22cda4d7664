//! C7 synthesizer, strategy 1 "Elem" (spec.md §8.3 scenario 2): a goal
//! appearing inside a tuple on the left of `elem` inverts to a scan over
//! the right-hand collection, pattern-matched against that tuple shape.

use reml_compiler::compiler::ast::Lit;
use reml_compiler::compiler::core_ir::{BuiltinRef, CoreExpr, CoreExprKind, CorePat, CorePatKind, IdRef};
use reml_compiler::compiler::session::NameGenerator;
use reml_compiler::compiler::synth::{synthesize, Cache, Cardinality, SynthCtx};
use reml_compiler::compiler::testing_helpers::pos;
use reml_compiler::CompileOptions;
use reml_core::env::Env;
use reml_core::types::TypeSystem;

#[test]
fn a_tuple_goal_elem_a_collection_scans_with_a_tuple_pattern() {
    let mut ts = TypeSystem::new();
    let mut ng = NameGenerator::new();
    let env: Env<CoreExpr> = Env::empty();
    let options = CompileOptions::default();

    let int_ty = ts.int_type();
    let string_ty = ts.string_type();
    let pair_ty = ts.tuple_type(vec![int_ty, string_ty]);
    let ancestors_ty = ts.list_type(pair_ty);

    let x_pat = CorePat::new(int_ty, pos(), CorePatKind::Id { name: "x".into(), ordinal: 0 });
    let x_ref = CoreExpr::new(int_ty, pos(), CoreExprKind::Id(IdRef { name: "x".into(), ordinal: 0 }));
    let arwen = CoreExpr::lit(string_ty, pos(), Lit::Str("arwen".into()));
    let tuple = CoreExpr::new(pair_ty, pos(), CoreExprKind::Tuple(vec![x_ref, arwen]));
    let ancestors = CoreExpr::new(ancestors_ty, pos(), CoreExprKind::Id(IdRef { name: "ancestors".into(), ordinal: 1 }));

    let elem_arg_ty = ts.tuple_type(vec![pair_ty, ancestors_ty]);
    let elem_fn_ty = ts.fn_type(elem_arg_ty, ts.bool_type());
    let constraint = CoreExpr::new(
        ts.bool_type(),
        pos(),
        CoreExprKind::Apply(
            CoreExpr::new(elem_fn_ty, pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("elem"))),
            CoreExpr::new(elem_arg_ty, pos(), CoreExprKind::Tuple(vec![tuple, ancestors.clone()])),
        ),
    );

    let mut cache = Cache::new();
    let mut ctx = SynthCtx { ts: &mut ts, ng: &mut ng, env: &env, options: &options };
    let generator = synthesize(&mut ctx, &mut cache, &x_pat, pos(), &[constraint]).unwrap();

    assert_eq!(generator.cardinality, Cardinality::Finite);
    assert_eq!(generator.exp, ancestors);
    match generator.pat.kind.as_ref() {
        CorePatKind::Tuple(parts) => {
            assert_eq!(parts.len(), 2);
            assert!(matches!(parts[0].kind.as_ref(), CorePatKind::Id { name, ordinal } if name == "x" && *ordinal == 0));
            assert!(matches!(parts[1].kind.as_ref(), CorePatKind::Lit(Lit::Str(s)) if s == "arwen"));
        }
        other => panic!("expected a tuple scan pattern, got {other:?}"),
    }
}

#[test]
fn a_constraint_that_does_not_mention_the_goal_is_not_matched() {
    let mut ts = TypeSystem::new();
    let mut ng = NameGenerator::new();
    let env: Env<CoreExpr> = Env::empty();
    let options = CompileOptions::default();

    let int_ty = ts.int_type();
    let ancestors_ty = ts.list_type(int_ty);
    let x_pat = CorePat::new(int_ty, pos(), CorePatKind::Id { name: "x".into(), ordinal: 0 });
    let y_ref = CoreExpr::new(int_ty, pos(), CoreExprKind::Id(IdRef { name: "y".into(), ordinal: 2 }));
    let ancestors = CoreExpr::new(ancestors_ty, pos(), CoreExprKind::Id(IdRef { name: "ancestors".into(), ordinal: 1 }));
    let elem_arg_ty = ts.tuple_type(vec![int_ty, ancestors_ty]);
    let elem_fn_ty = ts.fn_type(elem_arg_ty, ts.bool_type());
    let constraint = CoreExpr::new(
        ts.bool_type(),
        pos(),
        CoreExprKind::Apply(
            CoreExpr::new(elem_fn_ty, pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("elem"))),
            CoreExpr::new(elem_arg_ty, pos(), CoreExprKind::Tuple(vec![y_ref, ancestors])),
        ),
    );

    let mut cache = Cache::new();
    let mut ctx = SynthCtx { ts: &mut ts, ng: &mut ng, env: &env, options: &options };
    assert!(synthesize(&mut ctx, &mut cache, &x_pat, pos(), &[constraint]).is_err());
}
