//! Type representation (C1): primitives, compound shapes, and the
//! hash-consed interner that backs structural type identity.
//!
//! Every `Type` handed out by a `TypeSystem` is a small `Copy` handle
//! (`TypeId`); the actual shape lives in the interner's table, keyed by
//! `TypeData` so that two structurally identical types always resolve to
//! the same id. This mirrors the invariant in the spec: "type identity is
//! structural via hashed keys; two types are equal iff their keys match."

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Interned handle to a `Type`. Cheap to copy, compare, and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

/// Interned handle to a user datatype definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataTypeId(u32);

/// A record/tuple field label. Record fields are stored sorted by
/// [`field_cmp`] wherever a `Type::Record` is constructed, so two records
/// with the same fields (regardless of source order) intern identically.
pub type Label = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("duplicate built-in entry for '{0}'")]
    DuplicateBuiltin(String),
}

/// The structural shape of a type, keyed on already-interned children so
/// that hashing and equality never re-walk a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeData {
    Bool,
    Char,
    Int,
    Real,
    Str,
    Unit,
    Tuple(Vec<TypeId>),
    Record(Vec<(Label, TypeId)>),
    List(TypeId),
    Bag(TypeId),
    Option(TypeId),
    Order,
    Vector(TypeId),
    Fn(TypeId, TypeId),
    /// `forall a1..an. body`, where `body` may reference `Var(k)` for
    /// `k < arity`.
    Forall(usize, TypeId),
    /// A type variable, distinguished by ordinal (§3.1).
    Var(u32),
    /// A user datatype applied to its (possibly empty) argument list.
    Data(DataTypeId, Vec<TypeId>),
    /// A progressive record: a fixed prefix of known fields plus an
    /// unexpanded tail, identified by a session-scoped discovery id.
    Progressive(Vec<(Label, TypeId)>, u32),
}

/// One constructor of a user datatype: either nullary, or carrying a
/// single payload type (n-ary constructors are represented as one
/// tuple/record payload, per §3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constructor {
    pub name: String,
    pub payload: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct DataTypeDef {
    pub name: String,
    pub arity: usize,
    pub constructors: Vec<Constructor>,
}

/// A named collection of built-in members, accessed as a record at the
/// type level (§C2, §4.2 `forEachStructure`). Field order follows
/// [`field_cmp`].
#[derive(Debug, Clone)]
pub struct StructureDef {
    pub name: String,
    pub members: Vec<(Label, TypeId)>,
}

/// What `TypeSystem::lookup` resolves a name to.
#[derive(Debug, Clone, Copy)]
pub enum NamedEntity<'a> {
    Datatype(&'a DataTypeDef),
    Structure(&'a StructureDef),
}

/// Total ordering over record/tuple field labels: numeric-looking labels
/// sort numerically among themselves and before any non-numeric label;
/// non-numeric labels then sort lexicographically. This is the single
/// authoritative comparator used wherever records are built, compared,
/// or displayed (§4.1).
pub fn field_cmp(a: &str, b: &str) -> Ordering {
    let na = a.parse::<u64>().ok();
    let nb = b.parse::<u64>().ok();
    match (na, nb) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn sort_fields(mut fields: Vec<(Label, TypeId)>) -> Vec<(Label, TypeId)> {
    fields.sort_by(|(a, _), (b, _)| field_cmp(a, b));
    fields
}

/// The hash-consed type store plus the named-datatype/structure
/// registries (C1).
#[derive(Debug)]
pub struct TypeSystem {
    table: Vec<TypeData>,
    index: HashMap<TypeData, TypeId>,
    datatypes_by_name: HashMap<String, DataTypeId>,
    datatypes: Vec<DataTypeDef>,
    structures: HashMap<String, StructureDef>,
    next_progressive_id: u32,

    bool_id: TypeId,
    char_id: TypeId,
    int_id: TypeId,
    real_id: TypeId,
    str_id: TypeId,
    unit_id: TypeId,
    order_id: TypeId,
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeSystem {
    pub fn new() -> Self {
        let mut table = Vec::new();
        let mut index = HashMap::new();
        let mut intern_primitive = |data: TypeData, table: &mut Vec<TypeData>, index: &mut HashMap<TypeData, TypeId>| {
            let id = TypeId(table.len() as u32);
            table.push(data.clone());
            index.insert(data, id);
            id
        };
        let bool_id = intern_primitive(TypeData::Bool, &mut table, &mut index);
        let char_id = intern_primitive(TypeData::Char, &mut table, &mut index);
        let int_id = intern_primitive(TypeData::Int, &mut table, &mut index);
        let real_id = intern_primitive(TypeData::Real, &mut table, &mut index);
        let str_id = intern_primitive(TypeData::Str, &mut table, &mut index);
        let unit_id = intern_primitive(TypeData::Unit, &mut table, &mut index);
        let order_id = intern_primitive(TypeData::Order, &mut table, &mut index);

        TypeSystem {
            table,
            index,
            datatypes_by_name: HashMap::new(),
            datatypes: Vec::new(),
            structures: HashMap::new(),
            next_progressive_id: 0,
            bool_id,
            char_id,
            int_id,
            real_id,
            str_id,
            unit_id,
            order_id,
        }
    }

    fn intern(&mut self, data: TypeData) -> TypeId {
        if let Some(&id) = self.index.get(&data) {
            return id;
        }
        let id = TypeId(self.table.len() as u32);
        self.table.push(data.clone());
        self.index.insert(data, id);
        id
    }

    pub fn bool_type(&self) -> TypeId {
        self.bool_id
    }
    pub fn char_type(&self) -> TypeId {
        self.char_id
    }
    pub fn int_type(&self) -> TypeId {
        self.int_id
    }
    pub fn real_type(&self) -> TypeId {
        self.real_id
    }
    pub fn string_type(&self) -> TypeId {
        self.str_id
    }
    pub fn unit_type(&self) -> TypeId {
        self.unit_id
    }
    pub fn order_type(&self) -> TypeId {
        self.order_id
    }

    pub fn fn_type(&mut self, param: TypeId, result: TypeId) -> TypeId {
        self.intern(TypeData::Fn(param, result))
    }

    /// N-ary tuple. Requires at least 2 elements per §3.1; a 1-element
    /// "tuple" is just its element, a 0-element tuple is unit.
    pub fn tuple_type(&mut self, elems: Vec<TypeId>) -> TypeId {
        match elems.len() {
            0 => self.unit_id,
            1 => elems[0],
            _ => self.intern(TypeData::Tuple(elems)),
        }
    }

    pub fn record_type(&mut self, fields: Vec<(Label, TypeId)>) -> TypeId {
        self.intern(TypeData::Record(sort_fields(fields)))
    }

    /// A progressive record starts with its currently-known fields and a
    /// fresh discovery id; the type mapper expands the tail by calling
    /// [`TypeSystem::expand_progressive`] when a field selector forces a
    /// new member into existence.
    pub fn progressive_record(&mut self, known_fields: Vec<(Label, TypeId)>) -> TypeId {
        let id = self.next_progressive_id;
        self.next_progressive_id += 1;
        self.intern(TypeData::Progressive(sort_fields(known_fields), id))
    }

    /// Expand a progressive record's tail with a newly discovered field,
    /// returning the (new, structurally distinct) progressive type.
    /// `subsumes` in the resolver contract uses this to justify widening.
    pub fn expand_progressive(&mut self, prog: TypeId, field: Label, ty: TypeId) -> Result<TypeId, TypeError> {
        let (mut fields, disc_id) = match &self.table[prog.0 as usize] {
            TypeData::Progressive(fields, id) => (fields.clone(), *id),
            _ => return Err(TypeError::InvalidArgument("expand_progressive on a non-progressive type".into())),
        };
        if !fields.iter().any(|(l, _)| l == &field) {
            fields.push((field, ty));
        }
        Ok(self.intern(TypeData::Progressive(sort_fields(fields), disc_id)))
    }

    pub fn list_type(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeData::List(elem))
    }

    pub fn bag_type(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeData::Bag(elem))
    }

    pub fn option_type(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeData::Option(elem))
    }

    pub fn vector_type(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeData::Vector(elem))
    }

    pub fn type_var(&mut self, ordinal: u32) -> TypeId {
        self.intern(TypeData::Var(ordinal))
    }

    /// Build a `forall arity. body` scheme. `body_builder` receives a
    /// `TypeSystem` handle and the list of fresh variable ids `0..arity`
    /// to reference in the body it constructs.
    pub fn forall_type(&mut self, arity: usize, body_builder: impl FnOnce(&mut TypeSystem, &[TypeId]) -> TypeId) -> TypeId {
        let vars: Vec<TypeId> = (0..arity as u32).map(|k| self.type_var(k)).collect();
        let body = body_builder(self, &vars);
        self.intern(TypeData::Forall(arity, body))
    }

    pub fn datatype(&mut self, name: impl Into<String>, arity: usize, constructors: Vec<Constructor>) -> DataTypeId {
        let name = name.into();
        let id = DataTypeId(self.datatypes.len() as u32);
        self.datatypes_by_name.insert(name.clone(), id);
        self.datatypes.push(DataTypeDef { name, arity, constructors });
        id
    }

    pub fn datatype_applied(&mut self, id: DataTypeId, args: Vec<TypeId>) -> TypeId {
        self.intern(TypeData::Data(id, args))
    }

    /// Fill in (or replace) a previously-reserved datatype's
    /// constructors. Used for recursive datatypes whose constructor
    /// payloads reference the datatype's own id (e.g. `$list`'s `Cons`),
    /// which must be reserved before its payload type can be built.
    pub fn set_constructors(&mut self, id: DataTypeId, constructors: Vec<Constructor>) {
        self.datatypes[id.0 as usize].constructors = constructors;
    }

    pub fn define_structure(&mut self, name: impl Into<String>, members: Vec<(Label, TypeId)>) {
        let name = name.into();
        self.structures.insert(name.clone(), StructureDef { name, members: sort_fields(members) });
    }

    /// `lookup(name)`: named datatypes and structures; fails with
    /// `UnknownType` when absent (§4.1).
    pub fn lookup(&self, name: &str) -> Result<NamedEntity<'_>, TypeError> {
        self.lookup_opt(name).ok_or_else(|| TypeError::UnknownType(name.to_string()))
    }

    pub fn lookup_opt(&self, name: &str) -> Option<NamedEntity<'_>> {
        if let Some(&id) = self.datatypes_by_name.get(name) {
            return Some(NamedEntity::Datatype(&self.datatypes[id.0 as usize]));
        }
        self.structures.get(name).map(NamedEntity::Structure)
    }

    pub fn datatype_def(&self, id: DataTypeId) -> &DataTypeDef {
        &self.datatypes[id.0 as usize]
    }

    pub fn datatype_id(&self, name: &str) -> Option<DataTypeId> {
        self.datatypes_by_name.get(name).copied()
    }

    /// All registered datatypes with their ids, in registration order.
    /// Used by the resolver to build its constructor-name lookup cache
    /// (the "variant id map") once per compile rather than per
    /// constructor reference.
    pub fn all_datatypes(&self) -> impl Iterator<Item = (DataTypeId, &DataTypeDef)> {
        self.datatypes.iter().enumerate().map(|(i, def)| (DataTypeId(i as u32), def))
    }

    /// `apply(ForallType, [types])`: instantiate a polymorphic scheme by
    /// substituting each bound variable with the corresponding argument.
    pub fn apply(&mut self, scheme: TypeId, args: &[TypeId]) -> Result<TypeId, TypeError> {
        let (arity, body) = match &self.table[scheme.0 as usize] {
            TypeData::Forall(arity, body) => (*arity, *body),
            _ => return Err(TypeError::InvalidArgument("apply called on a non-Forall type".into())),
        };
        if arity != args.len() {
            return Err(TypeError::InvalidArgument(format!(
                "forall of arity {arity} applied to {} argument(s)",
                args.len()
            )));
        }
        self.substitute(body, args)
    }

    fn substitute(&mut self, ty: TypeId, args: &[TypeId]) -> Result<TypeId, TypeError> {
        let data = self.table[ty.0 as usize].clone();
        let result = match data {
            TypeData::Var(k) => *args.get(k as usize).ok_or_else(|| {
                TypeError::InvalidArgument(format!("type variable {k} out of range for substitution"))
            })?,
            TypeData::Fn(p, r) => {
                let p = self.substitute(p, args)?;
                let r = self.substitute(r, args)?;
                self.fn_type(p, r)
            }
            TypeData::Tuple(elems) => {
                let elems = elems.iter().map(|&e| self.substitute(e, args)).collect::<Result<Vec<_>, _>>()?;
                self.tuple_type(elems)
            }
            TypeData::Record(fields) => {
                let fields = fields
                    .into_iter()
                    .map(|(l, t)| Ok((l, self.substitute(t, args)?)))
                    .collect::<Result<Vec<_>, TypeError>>()?;
                self.record_type(fields)
            }
            TypeData::List(e) => {
                let e = self.substitute(e, args)?;
                self.list_type(e)
            }
            TypeData::Bag(e) => {
                let e = self.substitute(e, args)?;
                self.bag_type(e)
            }
            TypeData::Option(e) => {
                let e = self.substitute(e, args)?;
                self.option_type(e)
            }
            TypeData::Vector(e) => {
                let e = self.substitute(e, args)?;
                self.vector_type(e)
            }
            TypeData::Data(dt, targs) => {
                let targs = targs.iter().map(|&e| self.substitute(e, args)).collect::<Result<Vec<_>, _>>()?;
                self.datatype_applied(dt, targs)
            }
            // Progressive records, nested foralls, and primitives carry
            // no free variables relative to this substitution frame.
            TypeData::Forall(_, _) | TypeData::Progressive(_, _) => ty,
            TypeData::Bool | TypeData::Char | TypeData::Int | TypeData::Real | TypeData::Str
            | TypeData::Unit | TypeData::Order => ty,
        };
        Ok(result)
    }

    pub fn is_fn(&self, ty: TypeId) -> Option<(TypeId, TypeId)> {
        match &self.table[ty.0 as usize] {
            TypeData::Fn(p, r) => Some((*p, *r)),
            _ => None,
        }
    }

    pub fn is_list(&self, ty: TypeId) -> Option<TypeId> {
        match &self.table[ty.0 as usize] {
            TypeData::List(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_bag(&self, ty: TypeId) -> Option<TypeId> {
        match &self.table[ty.0 as usize] {
            TypeData::Bag(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_tuple(&self, ty: TypeId) -> Option<&[TypeId]> {
        match &self.table[ty.0 as usize] {
            TypeData::Tuple(elems) => Some(elems),
            _ => None,
        }
    }

    pub fn is_record(&self, ty: TypeId) -> Option<&[(Label, TypeId)]> {
        match &self.table[ty.0 as usize] {
            TypeData::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_progressive(&self, ty: TypeId) -> Option<&[(Label, TypeId)]> {
        match &self.table[ty.0 as usize] {
            TypeData::Progressive(fields, _) => Some(fields),
            _ => None,
        }
    }

    pub fn is_option(&self, ty: TypeId) -> Option<TypeId> {
        match &self.table[ty.0 as usize] {
            TypeData::Option(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_forall(&self, ty: TypeId) -> Option<(usize, TypeId)> {
        match &self.table[ty.0 as usize] {
            TypeData::Forall(arity, body) => Some((*arity, *body)),
            _ => None,
        }
    }

    /// Render a type for error messages. Not pretty-printing of programs
    /// (a Non-goal) — just a compact `Display`-style summary.
    pub fn display(&self, ty: TypeId) -> String {
        self.display_inner(ty)
    }

    fn display_inner(&self, ty: TypeId) -> String {
        match &self.table[ty.0 as usize] {
            TypeData::Bool => "bool".into(),
            TypeData::Char => "char".into(),
            TypeData::Int => "int".into(),
            TypeData::Real => "real".into(),
            TypeData::Str => "string".into(),
            TypeData::Unit => "unit".into(),
            TypeData::Order => "order".into(),
            TypeData::Tuple(elems) => {
                elems.iter().map(|&e| self.display_inner(e)).collect::<Vec<_>>().join(" * ")
            }
            TypeData::Record(fields) => {
                let inner = fields
                    .iter()
                    .map(|(l, t)| format!("{}: {}", l, self.display_inner(*t)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}}}")
            }
            TypeData::Progressive(fields, _) => {
                let inner = fields
                    .iter()
                    .map(|(l, t)| format!("{}: {}", l, self.display_inner(*t)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}, ...}}")
            }
            TypeData::List(e) => format!("{} list", self.display_inner(*e)),
            TypeData::Bag(e) => format!("{} bag", self.display_inner(*e)),
            TypeData::Option(e) => format!("{} option", self.display_inner(*e)),
            TypeData::Vector(e) => format!("{} vector", self.display_inner(*e)),
            TypeData::Fn(p, r) => format!("{} -> {}", self.display_inner(*p), self.display_inner(*r)),
            TypeData::Forall(arity, body) => format!("forall<{arity}>. {}", self.display_inner(*body)),
            TypeData::Var(k) => format!("'a{k}"),
            TypeData::Data(dt, args) => {
                let def = &self.datatypes[dt.0 as usize];
                if args.is_empty() {
                    def.name.clone()
                } else {
                    let args_str = args.iter().map(|&a| self.display_inner(a)).collect::<Vec<_>>().join(", ");
                    format!("{} ({args_str})", def.name)
                }
            }
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
