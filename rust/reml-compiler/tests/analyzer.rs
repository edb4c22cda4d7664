//! C8 analyzer (spec.md §4.8, §8.3 scenario 6): use-site classification
//! of named bindings, exercised at the `analyze_program` entry point the
//! internal unit tests (in `analyzer.rs` itself) don't cover.

use reml_compiler::compiler::analyzer::{analyze_program, Classification};
use reml_compiler::compiler::core_ir::{BuiltinRef, CoreExpr, CoreExprKind, CorePat, CorePatKind, IdRef};
use reml_compiler::compiler::resolve::CoreItem;
use reml_compiler::compiler::testing_helpers::pos;
use reml_core::types::TypeSystem;

fn id(ty: reml_core::types::TypeId, name: &str, ordinal: u32) -> CoreExpr {
    CoreExpr::new(ty, pos(), CoreExprKind::Id(IdRef { name: name.into(), ordinal }))
}

/// A top-level `val` with no in-program uses is never `Dead` — its uses
/// are assumed to live outside the compilation unit (§4.8).
#[test]
fn an_unreferenced_top_level_binding_is_never_dead() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let rhs = CoreExpr::new(
        int_ty,
        pos(),
        CoreExprKind::Apply(
            CoreExpr::new(ts.fn_type(ts.tuple_type(vec![int_ty, int_ty]), int_ty), pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("+"))),
            CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(1.into())), CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(2.into()))])),
        ),
    );
    let items = vec![CoreItem::Value { name: "unused".into(), ordinal: 0, ty: int_ty, bound: rhs }];
    let bindings = analyze_program(&items);
    let b = bindings.iter().find(|b| b.key == ("unused".to_string(), 0)).unwrap();
    assert_ne!(b.classification, Classification::Dead);
}

/// Two top-level `val`s where the second's body uses the first twice in
/// sequence: a genuine `MultiUnsafe` use, not `MultiSafe` (the two uses
/// are not on mutually exclusive branches).
#[test]
fn two_sequential_uses_across_top_level_bindings_are_multi_unsafe() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let base_ordinal = 0;
    let plus_ty = ts.fn_type(ts.tuple_type(vec![int_ty, int_ty]), int_ty);
    let base_rhs = CoreExpr::new(
        int_ty,
        pos(),
        CoreExprKind::Apply(
            CoreExpr::new(plus_ty, pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("+"))),
            CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(3.into())), CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(4.into()))])),
        ),
    );

    let plus = CoreExpr::new(plus_ty, pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("+")));
    let base_plus_base = CoreExpr::new(
        int_ty,
        pos(),
        CoreExprKind::Apply(plus, CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![id(int_ty, "base", base_ordinal), id(int_ty, "base", base_ordinal)]))),
    );

    let items = vec![
        CoreItem::Value { name: "base".into(), ordinal: base_ordinal, ty: int_ty, bound: base_rhs },
        CoreItem::Value { name: "doubled".into(), ordinal: 1, ty: int_ty, bound: base_plus_base },
    ];
    let bindings = analyze_program(&items);
    let base = bindings.iter().find(|b| b.key == ("base".to_string(), base_ordinal)).unwrap();
    assert_eq!(base.classification, Classification::MultiUnsafe);
}

/// `let val y = 10 in case xs of [] => y + 1 | x::xs => y + 2 | _ => 0
/// end`: `y` is used once on each of two mutually exclusive arms
/// (`MultiSafe`), while `x` — bound only on the arm that never uses it —
/// is `Dead`.
#[test]
fn a_binding_used_on_two_case_arms_is_multi_safe() {
    let mut ts = TypeSystem::new();
    let int_ty = ts.int_type();
    let list_ty = ts.list_type(int_ty);
    let y_ordinal = 0;
    let xs_ordinal = 1;
    let x_ordinal = 2;
    let xs_tail_ordinal = 3;

    let plus = |ts: &mut TypeSystem, l: CoreExpr, r: CoreExpr| {
        let f = CoreExpr::new(ts.fn_type(ts.tuple_type(vec![int_ty, int_ty]), int_ty), pos(), CoreExprKind::BuiltinRef(BuiltinRef::top_level("+")));
        CoreExpr::new(int_ty, pos(), CoreExprKind::Apply(f, CoreExpr::new(ts.tuple_type(vec![int_ty, int_ty]), pos(), CoreExprKind::Tuple(vec![l, r]))))
    };

    let one = CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(1.into()));
    let two = CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(2.into()));
    let zero = CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(0.into()));

    let arm_nil = reml_compiler::compiler::core_ir::MatchArm { pat: CorePat::new(list_ty, pos(), CorePatKind::Con0("nil".to_string())), body: plus(&mut ts, id(int_ty, "y", y_ordinal), one) };
    let arm_cons = reml_compiler::compiler::core_ir::MatchArm {
        pat: CorePat::new(list_ty, pos(), CorePatKind::Cons(CorePat::id(int_ty, pos(), "x", x_ordinal), CorePat::id(list_ty, pos(), "xs", xs_tail_ordinal))),
        body: plus(&mut ts, id(int_ty, "y", y_ordinal), two),
    };
    let arm_wild = reml_compiler::compiler::core_ir::MatchArm { pat: CorePat::wildcard(list_ty, pos()), body: zero };

    let case_e = CoreExpr::new(int_ty, pos(), CoreExprKind::Case(id(list_ty, "xs", xs_ordinal), vec![arm_nil, arm_cons, arm_wild]));
    let let_e = CoreExpr::new(
        int_ty,
        pos(),
        CoreExprKind::Let { pat: CorePat::id(int_ty, pos(), "y", y_ordinal), bound: CoreExpr::lit(int_ty, pos(), reml_compiler::compiler::ast::Lit::Int(10.into())), body: case_e },
    );

    let items = vec![CoreItem::Exp(let_e)];
    let bindings = analyze_program(&items);
    let y = bindings.iter().find(|b| b.key == ("y".to_string(), y_ordinal)).unwrap();
    assert_eq!(y.classification, Classification::MultiSafe);
    let x = bindings.iter().find(|b| b.key == ("x".to_string(), x_ordinal)).unwrap();
    assert_eq!(x.classification, Classification::Dead);
}
