//! C5 resolver: surface AST lowered to Core IR against a `TypeMap`
//! (spec.md §8.3 scenario 5 "val rec demotion", plus a couple of the
//! simpler top-level shapes the resolver is responsible for).

use reml_compiler::compiler::ast::{Decl, ExpKind, ExpNode, Lit, MatchArm, NodeId, PatKind, PatNode, Program, ValBind};
use reml_compiler::compiler::core_ir::CoreExprKind;
use reml_compiler::compiler::resolve::{CoreItem, Resolver};
use reml_compiler::compiler::session::NameGenerator;
use reml_compiler::compiler::testing_helpers::pos;
use reml_compiler::compiler::typemap::StaticTypeMap;
use reml_core::types::TypeSystem;

#[test]
fn a_literal_val_binding_resolves_to_a_core_value_item() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let mut type_map = StaticTypeMap::new();
    let pat_id = NodeId(0);
    let exp_id = NodeId(1);
    type_map.insert(pat_id, int_ty);
    type_map.insert(exp_id, int_ty);

    let program = Program {
        decls: vec![Decl::Val(vec![ValBind {
            pat: PatNode::new(pat_id, pos(), PatKind::Id("x".into())),
            exp: ExpNode::new(exp_id, pos(), ExpKind::Lit(Lit::Int(42.into()))),
        }])],
    };

    let mut gen = NameGenerator::new();
    let items = Resolver::new(&mut ts, &type_map, &mut gen).resolve_program(&program).unwrap();
    assert_eq!(items.len(), 1);
    match &items[0] {
        CoreItem::Value { name, ty, .. } => {
            assert_eq!(name, "x");
            assert_eq!(*ty, int_ty);
        }
        CoreItem::Exp(_) => panic!("expected a value binding"),
    }
}

#[test]
fn destructuring_a_top_level_tuple_pattern_projects_each_name() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let tuple_ty = ts.tuple_type(vec![int_ty, int_ty]);
    let mut type_map = StaticTypeMap::new();

    let a_pat_id = NodeId(0);
    let b_pat_id = NodeId(1);
    let tuple_pat_id = NodeId(2);
    let exp_id = NodeId(3);
    type_map.insert(a_pat_id, int_ty);
    type_map.insert(b_pat_id, int_ty);
    type_map.insert(tuple_pat_id, tuple_ty);
    type_map.insert(exp_id, tuple_ty);

    let program = Program {
        decls: vec![Decl::Val(vec![ValBind {
            pat: PatNode::new(tuple_pat_id, pos(), PatKind::Tuple(vec![PatNode::new(a_pat_id, pos(), PatKind::Id("a".into())), PatNode::new(b_pat_id, pos(), PatKind::Id("b".into()))])),
            exp: ExpNode::new(exp_id, pos(), ExpKind::Tuple(vec![ExpNode::new(NodeId(4), pos(), ExpKind::Lit(Lit::Int(1.into()))), ExpNode::new(NodeId(5), pos(), ExpKind::Lit(Lit::Int(2.into())))])),
        }])],
    };
    type_map.insert(NodeId(4), int_ty);
    type_map.insert(NodeId(5), int_ty);

    let mut gen = NameGenerator::new();
    let items = Resolver::new(&mut ts, &type_map, &mut gen).resolve_program(&program).unwrap();

    // One hidden tuple binding plus one projection per destructured name.
    let names: Vec<&str> = items
        .iter()
        .filter_map(|it| match it {
            CoreItem::Value { name, .. } => Some(name.as_str()),
            CoreItem::Exp(_) => None,
        })
        .collect();
    assert!(names.contains(&"a"));
    assert!(names.contains(&"b"));
}

/// `let rec f = fn x => x in f end`: the bound expression never refers
/// to `f`, so the resolver demotes it to a plain, non-recursive `let`
/// rather than emitting a `LetRec` node (spec.md §8.3 scenario 5).
#[test]
fn let_rec_demotes_to_let_when_the_body_never_self_references() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let fn_ty = ts.fn_type(int_ty, int_ty);
    let mut type_map = StaticTypeMap::new();

    let f_pat_id = NodeId(0);
    let fn_exp_id = NodeId(1);
    let arm_pat_id = NodeId(2);
    let arm_body_id = NodeId(3);
    let use_f_id = NodeId(4);
    let whole_id = NodeId(5);
    type_map.insert(f_pat_id, fn_ty);
    type_map.insert(fn_exp_id, fn_ty);
    type_map.insert(arm_pat_id, int_ty);
    type_map.insert(arm_body_id, int_ty);
    type_map.insert(use_f_id, fn_ty);
    type_map.insert(whole_id, fn_ty);

    let fn_exp = ExpNode::new(
        fn_exp_id,
        pos(),
        ExpKind::Fn(vec![MatchArm { pat: PatNode::new(arm_pat_id, pos(), PatKind::Id("x".into())), body: ExpNode::new(arm_body_id, pos(), ExpKind::Id("x".into())) }]),
    );
    let body = ExpNode::new(use_f_id, pos(), ExpKind::Id("f".into()));
    let whole = ExpNode::new(whole_id, pos(), ExpKind::LetRec(vec![ValBind { pat: PatNode::new(f_pat_id, pos(), PatKind::Id("f".into())), exp: fn_exp }], Box::new(body)));

    let program = Program { decls: vec![Decl::Exp(whole)] };
    let mut gen = NameGenerator::new();
    let items = Resolver::new(&mut ts, &type_map, &mut gen).resolve_program(&program).unwrap();

    assert_eq!(items.len(), 1);
    match &items[0] {
        CoreItem::Exp(e) => assert!(matches!(*e.kind, CoreExprKind::Let { .. }), "expected demotion to `Let`, got {:?}", e.kind),
        CoreItem::Value { .. } => panic!("expected a bare expression item"),
    }
}

/// `let rec f = fn x => f x in f end`: the bound expression does call
/// `f`, so no demotion happens and the resolver keeps a genuine
/// `LetRec`.
#[test]
fn let_rec_keeps_the_recursive_node_when_the_body_self_references() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let fn_ty = ts.fn_type(int_ty, int_ty);
    let mut type_map = StaticTypeMap::new();

    let f_pat_id = NodeId(0);
    let fn_exp_id = NodeId(1);
    let arm_pat_id = NodeId(2);
    let arm_body_id = NodeId(3);
    let f_ref_in_body_id = NodeId(4);
    let x_ref_in_body_id = NodeId(5);
    let use_f_id = NodeId(6);
    let whole_id = NodeId(7);
    type_map.insert(f_pat_id, fn_ty);
    type_map.insert(fn_exp_id, fn_ty);
    type_map.insert(arm_pat_id, int_ty);
    type_map.insert(arm_body_id, int_ty);
    type_map.insert(f_ref_in_body_id, fn_ty);
    type_map.insert(x_ref_in_body_id, int_ty);
    type_map.insert(use_f_id, fn_ty);
    type_map.insert(whole_id, fn_ty);

    let arm_body = ExpNode::new(
        arm_body_id,
        pos(),
        ExpKind::Apply(Box::new(ExpNode::new(f_ref_in_body_id, pos(), ExpKind::Id("f".into()))), Box::new(ExpNode::new(x_ref_in_body_id, pos(), ExpKind::Id("x".into())))),
    );
    let fn_exp = ExpNode::new(fn_exp_id, pos(), ExpKind::Fn(vec![MatchArm { pat: PatNode::new(arm_pat_id, pos(), PatKind::Id("x".into())), body: arm_body }]));
    let body = ExpNode::new(use_f_id, pos(), ExpKind::Id("f".into()));
    let whole = ExpNode::new(whole_id, pos(), ExpKind::LetRec(vec![ValBind { pat: PatNode::new(f_pat_id, pos(), PatKind::Id("f".into())), exp: fn_exp }], Box::new(body)));

    let program = Program { decls: vec![Decl::Exp(whole)] };
    let mut gen = NameGenerator::new();
    let items = Resolver::new(&mut ts, &type_map, &mut gen).resolve_program(&program).unwrap();

    match &items[0] {
        CoreItem::Exp(e) => assert!(matches!(*e.kind, CoreExprKind::LetRec { .. }), "expected a real LetRec, got {:?}", e.kind),
        CoreItem::Value { .. } => panic!("expected a bare expression item"),
    }
}

#[test]
fn an_unbound_identifier_is_reported_with_its_position() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let mut type_map = StaticTypeMap::new();
    let node_id = NodeId(0);
    type_map.insert(node_id, int_ty);
    let program = Program { decls: vec![Decl::Exp(ExpNode::new(node_id, pos(), ExpKind::Id("nowhere".into())))] };
    let mut gen = NameGenerator::new();
    let err = Resolver::new(&mut ts, &type_map, &mut gen).resolve_program(&program).unwrap_err();
    assert!(matches!(err, reml_compiler::compiler::resolve::ResolveError::UnboundIdentifier { .. }));
}
