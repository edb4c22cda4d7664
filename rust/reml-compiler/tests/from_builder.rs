//! C6 from-builder (spec.md §4.6): incremental step accumulation plus
//! `build_simplify`'s local normalizations.

use reml_compiler::compiler::ast::Lit;
use reml_compiler::compiler::core_ir::{CoreExpr, CoreExprKind, CorePat, CoreStep, IdRef};
use reml_compiler::compiler::from_builder::FromBuilder;
use reml_compiler::compiler::testing_helpers::pos;
use reml_core::types::TypeSystem;

#[test]
fn build_keeps_the_raw_pipeline_unmerged() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let bool_ty = ts.bool_type();
    let mut b = FromBuilder::new(true);
    b.source(CorePat::wildcard(int_ty, pos()), CoreExpr::new(ts.bag_type(int_ty), pos(), CoreExprKind::ListLit(vec![])));
    b.step(CoreStep::Where(CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "p".into(), ordinal: 0 }))));
    b.step(CoreStep::Where(CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "q".into(), ordinal: 1 }))));
    let query = b.build();
    assert_eq!(query.steps.len(), 2);
    assert!(query.ordered);
}

#[test]
fn build_simplify_merges_three_consecutive_wheres_into_one() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let bool_ty = ts.bool_type();
    let mut b = FromBuilder::new(false);
    b.source(CorePat::wildcard(int_ty, pos()), CoreExpr::new(ts.bag_type(int_ty), pos(), CoreExprKind::ListLit(vec![])));
    for (name, ordinal) in [("p", 0), ("q", 1), ("r", 2)] {
        b.step(CoreStep::Where(CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: name.into(), ordinal }))));
    }
    let query = b.build_simplify();
    assert_eq!(query.steps.len(), 1);
    let CoreStep::Where(merged) = &query.steps[0] else { panic!("expected a single merged Where") };
    assert!(matches!(*merged.kind, CoreExprKind::AndAlso(_, _)));
}

#[test]
fn build_simplify_leaves_an_unrelated_step_between_wheres_unmerged() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let bool_ty = ts.bool_type();
    let mut b = FromBuilder::new(false);
    b.source(CorePat::wildcard(int_ty, pos()), CoreExpr::new(ts.bag_type(int_ty), pos(), CoreExprKind::ListLit(vec![])));
    b.step(CoreStep::Where(CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "p".into(), ordinal: 0 }))));
    b.step(CoreStep::Distinct);
    b.step(CoreStep::Where(CoreExpr::new(bool_ty, pos(), CoreExprKind::Id(IdRef { name: "q".into(), ordinal: 1 }))));
    let query = b.build_simplify();
    assert_eq!(query.steps.len(), 3);
}

#[test]
fn build_simplify_drops_a_redundant_repeated_distinct() {
    let int_ty = TypeSystem::new().int_type();
    let mut b = FromBuilder::new(false);
    b.source(CorePat::wildcard(int_ty, pos()), CoreExpr::new(int_ty, pos(), CoreExprKind::Lit(Lit::Unit)));
    b.step(CoreStep::Distinct);
    b.step(CoreStep::Distinct);
    b.step(CoreStep::Distinct);
    let query = b.build_simplify();
    assert_eq!(query.steps.len(), 1);
}

#[test]
fn a_fresh_builder_is_empty() {
    let b = FromBuilder::new(true);
    assert!(b.is_empty());
}
