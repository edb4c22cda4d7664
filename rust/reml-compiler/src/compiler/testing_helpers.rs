//! Small builder helpers for hand-assembling AST and Core IR fragments in
//! tests (`lit_int`, `id_pat`, `andalso`, …), shared between each source
//! file's own `#[cfg(test)]` module and the integration tests under
//! `tests/`.

use num_bigint::BigInt;
use reml_core::types::TypeId;

use super::ast::{Decl, ExpKind, ExpNode, FromExp, Lit, MatchArm as AstMatchArm, NodeId, PatKind, PatNode, Program, Step, ValBind};
use super::core_ir::{CoreExpr, CoreExprKind, CorePat, IdRef, MatchArm};
use super::tokens::Span;

/// Hands out sequentially increasing [`NodeId`]s so a test doesn't have
/// to track them by hand.
#[derive(Debug, Default)]
pub struct NodeIdGen(u32);

impl NodeIdGen {
    pub fn new() -> Self {
        NodeIdGen(0)
    }

    pub fn next(&mut self) -> NodeId {
        let id = NodeId(self.0);
        self.0 += 1;
        id
    }
}

/// A dummy [`Span`]; tests generally don't care about source position.
pub fn pos() -> Span {
    Span::dummy()
}

// ════════════════════════════════════════════════════════════════════
// Surface AST
// ════════════════════════════════════════════════════════════════════

pub fn lit_int(id: NodeId, n: i64) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::Lit(Lit::Int(BigInt::from(n))))
}

pub fn lit_bool(id: NodeId, b: bool) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::Lit(Lit::Bool(b)))
}

pub fn id_exp(id: NodeId, name: impl Into<String>) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::Id(name.into()))
}

pub fn id_pat(id: NodeId, name: impl Into<String>) -> PatNode {
    PatNode::new(id, pos(), PatKind::Id(name.into()))
}

pub fn wildcard_pat(id: NodeId) -> PatNode {
    PatNode::new(id, pos(), PatKind::Wildcard)
}

pub fn andalso(id: NodeId, l: ExpNode, r: ExpNode) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::AndAlso(Box::new(l), Box::new(r)))
}

pub fn orelse(id: NodeId, l: ExpNode, r: ExpNode) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::OrElse(Box::new(l), Box::new(r)))
}

pub fn not_exp(id: NodeId, e: ExpNode) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::Not(Box::new(e)))
}

pub fn if_exp(id: NodeId, c: ExpNode, t: ExpNode, f: ExpNode) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::If(Box::new(c), Box::new(t), Box::new(f)))
}

pub fn apply(id: NodeId, f: ExpNode, a: ExpNode) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::Apply(Box::new(f), Box::new(a)))
}

pub fn match_arm(pat: PatNode, body: ExpNode) -> AstMatchArm {
    AstMatchArm { pat, body }
}

pub fn from_exp(id: NodeId, sources: Vec<(PatNode, ExpNode)>, steps: Vec<Step>) -> ExpNode {
    ExpNode::new(id, pos(), ExpKind::From(FromExp { sources, steps, pos: pos() }))
}

pub fn val_decl(pat: PatNode, exp: ExpNode) -> Decl {
    Decl::Val(vec![ValBind { pat, exp }])
}

pub fn program(decls: Vec<Decl>) -> Program {
    Program { decls }
}

// ════════════════════════════════════════════════════════════════════
// Core IR
// ════════════════════════════════════════════════════════════════════

pub fn core_lit_int(ty: TypeId, n: i64) -> CoreExpr {
    CoreExpr::lit(ty, pos(), Lit::Int(BigInt::from(n)))
}

pub fn core_lit_bool(ty: TypeId, b: bool) -> CoreExpr {
    CoreExpr::lit(ty, pos(), Lit::Bool(b))
}

pub fn core_id(ty: TypeId, name: impl Into<String>, ordinal: u32) -> CoreExpr {
    CoreExpr::new(ty, pos(), CoreExprKind::Id(IdRef { name: name.into(), ordinal }))
}

pub fn core_id_pat(ty: TypeId, name: impl Into<String>, ordinal: u32) -> CorePat {
    CorePat::id(ty, pos(), name, ordinal)
}

pub fn core_andalso(ty: TypeId, l: CoreExpr, r: CoreExpr) -> CoreExpr {
    CoreExpr::new(ty, pos(), CoreExprKind::AndAlso(l, r))
}

pub fn core_orelse(ty: TypeId, l: CoreExpr, r: CoreExpr) -> CoreExpr {
    CoreExpr::new(ty, pos(), CoreExprKind::OrElse(l, r))
}

pub fn core_not(ty: TypeId, e: CoreExpr) -> CoreExpr {
    CoreExpr::new(ty, pos(), CoreExprKind::Not(e))
}

pub fn core_if(ty: TypeId, c: CoreExpr, t: CoreExpr, f: CoreExpr) -> CoreExpr {
    CoreExpr::new(ty, pos(), CoreExprKind::If(c, t, f))
}

pub fn core_match_arm(pat: CorePat, body: CoreExpr) -> MatchArm {
    MatchArm { pat, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_gen_counts_up_from_zero() {
        let mut gen = NodeIdGen::new();
        assert_eq!(gen.next(), NodeId(0));
        assert_eq!(gen.next(), NodeId(1));
        assert_eq!(gen.next(), NodeId(2));
    }

    #[test]
    fn lit_int_builds_an_int_literal_node() {
        let mut gen = NodeIdGen::new();
        let e = lit_int(gen.next(), 42);
        match e.kind {
            ExpKind::Lit(Lit::Int(n)) => assert_eq!(n, BigInt::from(42)),
            other => panic!("expected an int literal, got {other:?}"),
        }
    }

    #[test]
    fn andalso_nests_the_two_sides() {
        let mut gen = NodeIdGen::new();
        let l = lit_bool(gen.next(), true);
        let r = lit_bool(gen.next(), false);
        let e = andalso(gen.next(), l, r);
        assert!(matches!(e.kind, ExpKind::AndAlso(_, _)));
    }

    #[test]
    fn core_id_pat_round_trips_name_and_ordinal() {
        use reml_core::types::TypeSystem;
        let mut ts = TypeSystem::new();
        let int_ty = ts.int_type();
        let p = core_id_pat(int_ty, "x", 3);
        let mut bound = Vec::new();
        p.bound_names(&mut bound);
        assert_eq!(bound, vec![("x".to_string(), 3)]);
    }
}
