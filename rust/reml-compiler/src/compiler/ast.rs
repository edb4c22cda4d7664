//! Surface AST (§6.1, consumed from upstream).
//!
//! The parser that produces these trees is an external collaborator —
//! only its output contract is specified here. Every expression and
//! pattern node carries a [`NodeId`] (assigned by the parser) so the
//! [`super::typemap::TypeMap`] produced by the unification-based type
//! inferencer can be keyed by node identity rather than by source
//! position, which is not guaranteed unique.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::tokens::Span;

pub type Pos = Span;

/// Identity of an AST node, assigned by the parser. Stable across a
/// single compilation; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lit {
    Bool(bool),
    Char(char),
    Int(BigInt),
    Real(f64),
    Str(String),
    Unit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatNode {
    pub id: NodeId,
    pub pos: Pos,
    pub kind: PatKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatKind {
    Wildcard,
    Lit(Lit),
    /// `IdPat` in the surface syntax: a bare identifier pattern. The
    /// resolver assigns each a stable ordinal when lowering to Core
    /// (§3.2's "every named pattern has a stable ordinal").
    Id(String),
    /// `name as subpat`.
    As(String, Box<PatNode>),
    Tuple(Vec<PatNode>),
    /// Record pattern; `ellipsis = true` means `{a, b, ...}` (partial
    /// match, surface-only — Core records are always exact, §3.2).
    Record { fields: Vec<(String, PatNode)>, ellipsis: bool },
    /// Constructor pattern with a payload, e.g. `SOME x`.
    Con(String, Box<PatNode>),
    /// Zero-argument constructor pattern, e.g. `NONE`.
    Con0(String),
    /// `x :: xs`.
    Cons(Box<PatNode>, Box<PatNode>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpNode {
    pub id: NodeId,
    pub pos: Pos,
    pub kind: ExpKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValBind {
    pub pat: PatNode,
    pub exp: ExpNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pat: PatNode,
    pub body: ExpNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Named(String, Vec<TypeExpr>, Pos),
    Tuple(Vec<TypeExpr>, Pos),
    Var(String, Pos),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    pub name: String,
    pub payload: Option<TypeExpr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatatypeBind {
    pub name: String,
    pub params: Vec<String>,
    pub constructors: Vec<ConstructorDecl>,
    pub pos: Pos,
}

/// One step of a `from` pipeline, in surface form (§3.2). `require` is
/// kept distinct from `where` here even though the resolver desugars it
/// to `where not e` (§4.5) — the surface syntax distinguishes intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Scan { pat: PatNode, exp: ExpNode, cond: Option<ExpNode> },
    Where(ExpNode),
    Yield(ExpNode),
    /// Ordered list of `(key expression, ascending)` pairs.
    Order(Vec<(ExpNode, bool)>),
    Group { keys: Vec<(String, ExpNode)>, aggregates: Vec<(String, ExpNode)> },
    Compute(Vec<(String, ExpNode)>),
    Distinct,
    Skip(ExpNode),
    Take(ExpNode),
    Require(ExpNode),
    Through { pat: PatNode, fn_exp: ExpNode },
    Into(ExpNode),
}

/// A `from` pipeline: an initial (possibly empty) sequence of named
/// sources, an ordered list of steps, and an optional final yield
/// (absent when the last explicit step is already a `yield`) (§3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromExp {
    pub sources: Vec<(PatNode, ExpNode)>,
    pub steps: Vec<Step>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpKind {
    Lit(Lit),
    Id(String),
    /// Single-parameter lambda with a match list, i.e. `fn p1 => e1 | p2
    /// => e2 | ...` (§3.2).
    Fn(Vec<MatchArm>),
    Apply(Box<ExpNode>, Box<ExpNode>),
    Tuple(Vec<ExpNode>),
    /// `#field e`.
    RecordSel(String, Box<ExpNode>),
    RecordCons(Vec<(String, ExpNode)>),
    /// `{ e with f1 = v1, f2 = v2, ... }` (§4.5).
    RecordWith(Box<ExpNode>, Vec<(String, ExpNode)>),
    ListLit(Vec<ExpNode>),
    /// `let val v1 = e1 and v2 = e2 ... in e end`.
    Let(Vec<ValBind>, Box<ExpNode>),
    /// `val rec v1 = e1 and ... in e end`.
    LetRec(Vec<ValBind>, Box<ExpNode>),
    Case(Box<ExpNode>, Vec<MatchArm>),
    AndAlso(Box<ExpNode>, Box<ExpNode>),
    OrElse(Box<ExpNode>, Box<ExpNode>),
    Not(Box<ExpNode>),
    If(Box<ExpNode>, Box<ExpNode>, Box<ExpNode>),
    From(FromExp),
    /// `exists q`.
    Exists(FromExp),
    /// `forall q require e`.
    Forall(FromExp, Box<ExpNode>),
    /// `local datatype ... in e end`.
    Local(Vec<DatatypeBind>, Box<ExpNode>),
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Val(Vec<ValBind>),
    ValRec(Vec<ValBind>),
    Datatype(Vec<DatatypeBind>),
    Exp(ExpNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

impl ExpNode {
    pub fn new(id: NodeId, pos: Pos, kind: ExpKind) -> Self {
        ExpNode { id, pos, kind }
    }
}

impl PatNode {
    pub fn new(id: NodeId, pos: Pos, kind: PatKind) -> Self {
        PatNode { id, pos, kind }
    }
}
