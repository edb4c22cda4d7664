//! Built-in library catalog (C2): the enumerated, immutable table of
//! primitive constants, functions, operators, and datatypes that seeds
//! the top-level environment and supplies type information to the
//! resolver and generator synthesizer.
//!
//! The catalog itself (names, structure membership, aliases) is a fixed
//! array built once; each entry's *type* is materialized lazily against
//! a caller-supplied [`TypeSystem`] so the same static table can seed any
//! number of independent compilations.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::types::{Constructor, DataTypeId, TypeError, TypeId, TypeSystem};

/// A built-in's preferred primitive representation, used to disambiguate
/// overloads that share an `ml_name` across numeric types (e.g. `+:int`
/// vs `+:real`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Char,
    Int,
    Real,
    Str,
    Unit,
}

/// Marks built-ins whose runtime value must be supplied by the session
/// rather than constructed statically (§6.3) — currently only
/// `Sys.file`, a lazily-discovered progressive record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionValueKind {
    SysFile,
}

/// The sentinel "structure" used for internal operators: excluded from
/// user-visible structure records, but reachable by name in specialized
/// rewrites (§3.3).
pub const INTERNAL_STRUCTURE: &str = "$";

/// One row of the built-in catalog: `(structure-name?, ml-name, alias?,
/// type-scheme-function, preferred-primitive-type?, session-value-function?)`
/// (§3.3).
pub struct BuiltinEntry {
    pub structure: Option<&'static str>,
    pub ml_name: &'static str,
    pub alias: Option<&'static str>,
    pub scheme: fn(&mut TypeSystem) -> TypeId,
    pub preferred_primitive: Option<Primitive>,
    pub session_value: Option<SessionValueKind>,
}

impl BuiltinEntry {
    pub fn is_internal(&self) -> bool {
        self.structure == Some(INTERNAL_STRUCTURE)
    }
}

// ── Type-scheme builders ─────────────────────────────────────────────
// Each of these is a plain `fn(&mut TypeSystem) -> TypeId` so it can sit
// in a `'static` table row; they build (and thereby intern) a type
// scheme fresh against whatever `TypeSystem` the caller passes in.

fn scheme_real_binop(ts: &mut TypeSystem) -> TypeId {
    let r = ts.real_type();
    let pair = ts.tuple_type(vec![r, r]);
    ts.fn_type(pair, r)
}

fn scheme_int_binop(ts: &mut TypeSystem) -> TypeId {
    let i = ts.int_type();
    let pair = ts.tuple_type(vec![i, i]);
    ts.fn_type(pair, i)
}

fn scheme_int_unop(ts: &mut TypeSystem) -> TypeId {
    let i = ts.int_type();
    ts.fn_type(i, i)
}

fn scheme_real_unop(ts: &mut TypeSystem) -> TypeId {
    let r = ts.real_type();
    ts.fn_type(r, r)
}

fn scheme_poly_eq(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let pair = ts.tuple_type(vec![vars[0], vars[0]]);
        ts.fn_type(pair, ts.bool_type())
    })
}

fn scheme_poly_compare(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let pair = ts.tuple_type(vec![vars[0], vars[0]]);
        ts.fn_type(pair, ts.order_type())
    })
}

/// `e elem C` — membership in a bag (the generator synthesizer's
/// strategy 1 "Elem" inverts exactly this shape, §4.7.2).
fn scheme_elem(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        let pair = ts.tuple_type(vec![vars[0], bag]);
        ts.fn_type(pair, ts.bool_type())
    })
}

fn scheme_list_length(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let list = ts.list_type(vars[0]);
        ts.fn_type(list, ts.int_type())
    })
}

fn scheme_list_tabulate(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let gen = ts.fn_type(ts.int_type(), vars[0]);
        let pair = ts.tuple_type(vec![ts.int_type(), gen]);
        let list = ts.list_type(vars[0]);
        ts.fn_type(pair, list)
    })
}

fn scheme_list_filter(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let pred = ts.fn_type(vars[0], ts.bool_type());
        let list = ts.list_type(vars[0]);
        let pair = ts.tuple_type(vec![pred, list]);
        ts.fn_type(pair, list)
    })
}

fn scheme_list_map(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(2, |ts, vars| {
        let f = ts.fn_type(vars[0], vars[1]);
        let in_list = ts.list_type(vars[0]);
        let out_list = ts.list_type(vars[1]);
        let pair = ts.tuple_type(vec![f, in_list]);
        ts.fn_type(pair, out_list)
    })
}

fn scheme_list_from_bag(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        let list = ts.list_type(vars[0]);
        ts.fn_type(bag, list)
    })
}

fn scheme_bag_from_list(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let list = ts.list_type(vars[0]);
        let bag = ts.bag_type(vars[0]);
        ts.fn_type(list, bag)
    })
}

/// `'a bag * 'a bag -> 'a bag` — the synthesizer's strategy 8 (Union)
/// and bounded-recursion unrolling both concatenate independently
/// synthesized generators without a uniqueness guarantee; this is the
/// bag-level append they compile to.
fn scheme_union(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        let pair = ts.tuple_type(vec![bag, bag]);
        ts.fn_type(pair, bag)
    })
}

fn scheme_string_is_prefix(ts: &mut TypeSystem) -> TypeId {
    let s = ts.string_type();
    let pair = ts.tuple_type(vec![s, s]);
    ts.fn_type(pair, ts.bool_type())
}

fn scheme_string_substring(ts: &mut TypeSystem) -> TypeId {
    let s = ts.string_type();
    let triple = ts.tuple_type(vec![s, ts.int_type(), ts.int_type()]);
    ts.fn_type(triple, s)
}

fn scheme_string_size(ts: &mut TypeSystem) -> TypeId {
    ts.fn_type(ts.string_type(), ts.int_type())
}

fn scheme_option_is_some(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let opt = ts.option_type(vars[0]);
        ts.fn_type(opt, ts.bool_type())
    })
}

fn scheme_relational_non_empty(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        ts.fn_type(bag, ts.bool_type())
    })
}

fn scheme_relational_empty(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        ts.fn_type(bag, ts.bool_type())
    })
}

fn scheme_relational_only(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        ts.fn_type(bag, vars[0])
    })
}

fn scheme_relational_iterate(ts: &mut TypeSystem) -> TypeId {
    // (seed: 'a bag) * (step: ('a bag * 'a bag -> 'a bag)) -> 'a bag
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        let step_args = ts.tuple_type(vec![bag, bag]);
        let step = ts.fn_type(step_args, bag);
        let args = ts.tuple_type(vec![bag, step]);
        ts.fn_type(args, bag)
    })
}

fn scheme_extent(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let bag = ts.bag_type(vars[0]);
        ts.fn_type(ts.unit_type(), bag)
    })
}

fn scheme_internal_list_ctor(ts: &mut TypeSystem) -> TypeId {
    // `$list` is the sentinel n-ary list-construction primitive used by
    // the resolver when desugaring list literals; it is not exposed as a
    // user-visible function, only reachable via `isCallTo`.
    ts.forall_type(1, |ts, vars| {
        let list = ts.list_type(vars[0]);
        ts.fn_type(vars[0], list)
    })
}

fn scheme_sys_env(ts: &mut TypeSystem) -> TypeId {
    let s = ts.string_type();
    let opt = ts.option_type(s);
    ts.fn_type(s, opt)
}

fn scheme_math_sqrt(ts: &mut TypeSystem) -> TypeId {
    scheme_real_unop(ts)
}

fn scheme_interact_use(ts: &mut TypeSystem) -> TypeId {
    ts.fn_type(ts.string_type(), ts.unit_type())
}

fn scheme_char_ord(ts: &mut TypeSystem) -> TypeId {
    ts.fn_type(ts.char_type(), ts.int_type())
}

fn scheme_vector_length(ts: &mut TypeSystem) -> TypeId {
    ts.forall_type(1, |ts, vars| {
        let v = ts.vector_type(vars[0]);
        ts.fn_type(v, ts.int_type())
    })
}

/// The fixed, enumerated catalog (§3.3, §9 "Global built-in table"). Each
/// row's `ml_name` (or `ml_name`+`alias`) must be unique within its own
/// `structure` — distinct structures may share a member name (`List.length`
/// and `Vector.length` both exist in SML) — violated uniqueness is a
/// static invariant violation detected by [`by_ml_name`] at first use.
pub static CATALOG: &[BuiltinEntry] = &[
    // General / comparison — carried at top level, no structure.
    BuiltinEntry { structure: None, ml_name: "=", alias: None, scheme: scheme_poly_eq, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: "<>", alias: None, scheme: scheme_poly_eq, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: "<", alias: None, scheme: scheme_poly_compare, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: ">", alias: None, scheme: scheme_poly_compare, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: "<=", alias: None, scheme: scheme_poly_compare, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: ">=", alias: None, scheme: scheme_poly_compare, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: "elem", alias: None, scheme: scheme_elem, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: None, ml_name: "+", alias: None, scheme: scheme_int_binop, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: None, ml_name: "-", alias: None, scheme: scheme_int_binop, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: None, ml_name: "*", alias: None, scheme: scheme_int_binop, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: None, ml_name: "div", alias: None, scheme: scheme_int_binop, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: None, ml_name: "mod", alias: None, scheme: scheme_int_binop, preferred_primitive: Some(Primitive::Int), session_value: None },
    // General structure.
    BuiltinEntry { structure: Some("General"), ml_name: "op o", alias: None, scheme: scheme_poly_eq, preferred_primitive: None, session_value: None },
    // Internal (`$`) operators — not user-visible, reachable by name
    // only through specialized rewrites (§3.3, §4.7.2 strategies).
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "list", alias: None, scheme: scheme_internal_list_ctor, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "extent", alias: None, scheme: scheme_extent, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "~:int", alias: None, scheme: scheme_int_unop, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "~:real", alias: None, scheme: scheme_real_unop, preferred_primitive: Some(Primitive::Real), session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "+:real", alias: None, scheme: scheme_real_binop, preferred_primitive: Some(Primitive::Real), session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "-:real", alias: None, scheme: scheme_real_binop, preferred_primitive: Some(Primitive::Real), session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "*:real", alias: None, scheme: scheme_real_binop, preferred_primitive: Some(Primitive::Real), session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "=:int", alias: None, scheme: scheme_int_binop, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: Some(INTERNAL_STRUCTURE), ml_name: "union", alias: None, scheme: scheme_union, preferred_primitive: None, session_value: None },
    // List structure.
    BuiltinEntry { structure: Some("List"), ml_name: "length", alias: None, scheme: scheme_list_length, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("List"), ml_name: "tabulate", alias: None, scheme: scheme_list_tabulate, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("List"), ml_name: "filter", alias: None, scheme: scheme_list_filter, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("List"), ml_name: "map", alias: None, scheme: scheme_list_map, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("List"), ml_name: "fromBag", alias: None, scheme: scheme_list_from_bag, preferred_primitive: None, session_value: None },
    // Bag structure — `Bag.fromList` is the companion of `List.fromBag`
    // (§3.1 "structurally interconvertible").
    BuiltinEntry { structure: Some("Bag"), ml_name: "fromList", alias: None, scheme: scheme_bag_from_list, preferred_primitive: None, session_value: None },
    // String structure.
    BuiltinEntry { structure: Some("String"), ml_name: "isPrefix", alias: None, scheme: scheme_string_is_prefix, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("String"), ml_name: "substring", alias: None, scheme: scheme_string_substring, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("String"), ml_name: "size", alias: None, scheme: scheme_string_size, preferred_primitive: None, session_value: None },
    // Math structure.
    BuiltinEntry { structure: Some("Math"), ml_name: "sqrt", alias: None, scheme: scheme_math_sqrt, preferred_primitive: Some(Primitive::Real), session_value: None },
    // Option structure.
    BuiltinEntry { structure: Some("Option"), ml_name: "isSome", alias: None, scheme: scheme_option_is_some, preferred_primitive: None, session_value: None },
    // Real structure.
    BuiltinEntry { structure: Some("Real"), ml_name: "fromInt", alias: None, scheme: |ts| { let i = ts.int_type(); ts.fn_type(i, ts.real_type()) }, preferred_primitive: Some(Primitive::Real), session_value: None },
    // Int structure.
    BuiltinEntry { structure: Some("Int"), ml_name: "toReal", alias: None, scheme: |ts| { let i = ts.int_type(); ts.fn_type(i, ts.real_type()) }, preferred_primitive: Some(Primitive::Int), session_value: None },
    BuiltinEntry { structure: Some("Int"), ml_name: "abs", alias: None, scheme: scheme_int_unop, preferred_primitive: Some(Primitive::Int), session_value: None },
    // Char structure.
    BuiltinEntry { structure: Some("Char"), ml_name: "ord", alias: None, scheme: scheme_char_ord, preferred_primitive: Some(Primitive::Char), session_value: None },
    // Relational structure — the query-plan-facing operators the
    // generator synthesizer targets directly (§4.7.2 strategies 5, 7).
    BuiltinEntry { structure: Some("Relational"), ml_name: "nonEmpty", alias: Some("exists"), scheme: scheme_relational_non_empty, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("Relational"), ml_name: "empty", alias: Some("forall"), scheme: scheme_relational_empty, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("Relational"), ml_name: "only", alias: Some("compute"), scheme: scheme_relational_only, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("Relational"), ml_name: "iterate", alias: None, scheme: scheme_relational_iterate, preferred_primitive: None, session_value: None },
    // Sys structure.
    BuiltinEntry { structure: Some("Sys"), ml_name: "env", alias: None, scheme: scheme_sys_env, preferred_primitive: None, session_value: None },
    BuiltinEntry { structure: Some("Sys"), ml_name: "file", alias: None, scheme: |ts| { ts.progressive_record(vec![]) }, preferred_primitive: None, session_value: Some(SessionValueKind::SysFile) },
    // Vector structure.
    BuiltinEntry { structure: Some("Vector"), ml_name: "length", alias: None, scheme: scheme_vector_length, preferred_primitive: None, session_value: None },
    // Interact structure.
    BuiltinEntry { structure: Some("Interact"), ml_name: "use", alias: None, scheme: scheme_interact_use, preferred_primitive: None, session_value: None },
];

fn check_no_duplicates() {
    // Keyed by (structure, name): two different structures are free to
    // share a member name (`List.length` / `Vector.length`), so only a
    // repeat within the *same* structure is a genuine catalog bug.
    let mut seen: HashMap<(Option<&'static str>, &'static str), ()> = HashMap::new();
    for entry in CATALOG {
        let mut names = vec![entry.ml_name];
        if let Some(alias) = entry.alias {
            names.push(alias);
        }
        for name in names {
            if seen.insert((entry.structure, name), ()).is_some() {
                panic!("built-in catalog invariant violated: '{name}' registered twice under structure '{:?}'", entry.structure);
            }
        }
    }
}

/// `by_ml_name` map (§9 "Global built-in table"): every entry addressable
/// by its primary name or alias, for use where no structure qualifier is
/// given. When two structures share a member name (`length`), whichever
/// entry appears last in [`CATALOG`] wins this flat lookup; qualified
/// access via [`by_structure`] always reaches both unambiguously. Panics
/// (invariant violation, not a user error — §4.2) if the static table
/// registers the same name twice under the same structure.
pub fn by_ml_name() -> &'static HashMap<&'static str, &'static BuiltinEntry> {
    static MAP: Lazy<HashMap<&'static str, &'static BuiltinEntry>> = Lazy::new(|| {
        check_no_duplicates();
        let mut map = HashMap::new();
        for entry in CATALOG {
            map.insert(entry.ml_name, entry);
            if let Some(alias) = entry.alias {
                map.insert(alias, entry);
            }
        }
        map
    });
    &MAP
}

/// `by_structure` map: every non-internal structure name to its member
/// entries, in catalog order (canonicalized to record order by
/// [`for_each_structure`] when materialized as a type).
pub fn by_structure() -> &'static HashMap<&'static str, Vec<&'static BuiltinEntry>> {
    static MAP: Lazy<HashMap<&'static str, Vec<&'static BuiltinEntry>>> = Lazy::new(|| {
        let mut map: HashMap<&'static str, Vec<&'static BuiltinEntry>> = HashMap::new();
        for entry in CATALOG {
            if let Some(s) = entry.structure {
                if s != INTERNAL_STRUCTURE {
                    map.entry(s).or_default().push(entry);
                }
            }
        }
        map
    });
    &MAP
}

/// `forEach(typeSystem, consumer)`: visits every built-in with its
/// materialized type (§4.2).
pub fn for_each(ts: &mut TypeSystem, mut consumer: impl FnMut(&'static BuiltinEntry, TypeId)) {
    for entry in CATALOG {
        let ty = (entry.scheme)(ts);
        consumer(entry, ty);
    }
}

/// `forEachStructure(typeSystem, consumer)`: for each non-internal
/// structure, produces a record type whose fields are its members, in
/// canonical record order, and registers it in `ts` (§4.2).
pub fn for_each_structure(ts: &mut TypeSystem, mut consumer: impl FnMut(&'static str, TypeId)) {
    let by_structure = by_structure();
    let mut names: Vec<&&'static str> = by_structure.keys().collect();
    names.sort();
    for name in names {
        let members = &by_structure[name];
        let fields: Vec<(String, TypeId)> = members.iter().map(|m| (m.ml_name.to_string(), (m.scheme)(ts))).collect();
        let record_ty = ts.record_type(fields.clone());
        ts.define_structure(*name, fields);
        consumer(name, record_ty);
    }
}

/// The datatype ids registered by [`data_types`].
#[derive(Debug, Clone, Copy)]
pub struct BuiltinDataTypes {
    pub order: DataTypeId,
    pub option: DataTypeId,
    /// `$list`: used solely by the exhaustive-match checker (§4.2), not
    /// the user-visible `list` type (which is `TypeData::List`).
    pub internal_list: DataTypeId,
    /// `$bool`: ditto, a nominal sum-type stand-in for `bool` used only
    /// by exhaustiveness analysis.
    pub internal_bool: DataTypeId,
}

/// `dataTypes(typeSystem, bindings)`: defines `order`, `option`, plus two
/// internal datatypes (`$list`, `$bool`) used solely by the exhaustive-
/// match checker (§4.2). Returns the registered ids so callers can bind
/// their constructors (`NONE`, `SOME`, `LESS`, `EQUAL`, `GREATER`) into
/// an environment.
pub fn data_types(ts: &mut TypeSystem) -> BuiltinDataTypes {
    let order = ts.datatype(
        "order",
        0,
        vec![
            Constructor { name: "LESS".into(), payload: None },
            Constructor { name: "EQUAL".into(), payload: None },
            Constructor { name: "GREATER".into(), payload: None },
        ],
    );

    let option = ts.datatype("option", 1, vec![]);
    let option_var = ts.type_var(0);
    ts.set_constructors(
        option,
        vec![
            Constructor { name: "NONE".into(), payload: None },
            Constructor { name: "SOME".into(), payload: Some(option_var) },
        ],
    );

    let internal_list = ts.datatype("$list", 1, vec![]);
    let list_var = ts.type_var(0);
    let self_applied = ts.datatype_applied(internal_list, vec![list_var]);
    let cons_payload = ts.tuple_type(vec![list_var, self_applied]);
    ts.set_constructors(
        internal_list,
        vec![
            Constructor { name: "$Nil".into(), payload: None },
            Constructor { name: "$Cons".into(), payload: Some(cons_payload) },
        ],
    );

    let internal_bool = ts.datatype(
        "$bool",
        0,
        vec![
            Constructor { name: "$True".into(), payload: None },
            Constructor { name: "$False".into(), payload: None },
        ],
    );

    BuiltinDataTypes { order, option, internal_list, internal_bool }
}

/// `reverse()` on comparison operators: `<= <-> >=`, `< <-> >`, `= -> =`,
/// `<> -> <>`. Any other input fails with `InvalidArgument` (§4.2).
pub fn reverse(op: &str) -> Result<&'static str, TypeError> {
    match op {
        "<=" => Ok(">="),
        ">=" => Ok("<="),
        "<" => Ok(">"),
        ">" => Ok("<"),
        "=" => Ok("="),
        "<>" => Ok("<>"),
        other => Err(TypeError::InvalidArgument(format!("'{other}' is not a comparison operator"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_ml_name_resolves_aliases() {
        let map = by_ml_name();
        assert!(map.contains_key("nonEmpty"));
        assert!(map.contains_key("exists"));
        assert_eq!(map["nonEmpty"].ml_name, map["exists"].ml_name);
    }

    #[test]
    fn internal_operators_excluded_from_structures() {
        let structures = by_structure();
        assert!(!structures.contains_key(INTERNAL_STRUCTURE));
        let map = by_ml_name();
        assert!(map.contains_key("extent"));
        assert!(map["extent"].is_internal());
    }

    #[test]
    fn reverse_swaps_directional_comparisons() {
        assert_eq!(reverse("<").unwrap(), ">");
        assert_eq!(reverse(">=").unwrap(), "<=");
        assert_eq!(reverse("=").unwrap(), "=");
        assert!(reverse("+").is_err());
    }

    #[test]
    fn for_each_structure_builds_canonical_record() {
        let mut ts = TypeSystem::new();
        let mut seen = Vec::new();
        for_each_structure(&mut ts, |name, _ty| seen.push(name));
        assert!(seen.contains(&"List"));
        assert!(seen.contains(&"Relational"));
    }

    #[test]
    fn data_types_registers_recursive_internal_list() {
        let mut ts = TypeSystem::new();
        let dt = data_types(&mut ts);
        let def = ts.datatype_def(dt.internal_list);
        assert_eq!(def.constructors.len(), 2);
    }
}
