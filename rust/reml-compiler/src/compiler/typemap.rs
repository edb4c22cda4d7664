//! `TypeMap` contract (§6.1): the output of the (out-of-scope)
//! unification-based type inferencer, consumed by the resolver.

use std::collections::{HashMap, HashSet};

use reml_core::types::TypeId;

use super::ast::NodeId;

/// Total for well-typed nodes, partial otherwise. The resolver treats a
/// missing type on a node it expected to be well-typed as an invariant
/// violation (§7 "should not occur if type inference succeeded").
pub trait TypeMap {
    fn get_type(&self, node: NodeId) -> Option<TypeId>;

    fn has_type(&self, node: NodeId) -> bool {
        self.get_type(node).is_some()
    }

    /// True iff the node's term is a free unification variable — the
    /// trigger for progressive-record handling (§6.1).
    fn type_is_variable(&self, node: NodeId) -> bool;

    /// If the node's type is a record/tuple, the sorted set of field
    /// names; `None` otherwise or if the type isn't fully resolved.
    fn type_field_names(&self, node: NodeId) -> Option<Vec<String>>;
}

/// A concrete, in-memory `TypeMap` — what the type inferencer hands the
/// resolver in practice. Exposed here (rather than only as a trait)
/// because every test in this crate needs to construct one directly.
#[derive(Debug, Clone, Default)]
pub struct StaticTypeMap {
    types: HashMap<NodeId, TypeId>,
    variable_nodes: HashSet<NodeId>,
    field_names: HashMap<NodeId, Vec<String>>,
}

impl StaticTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: NodeId, ty: TypeId) -> &mut Self {
        self.types.insert(node, ty);
        self
    }

    pub fn mark_variable(&mut self, node: NodeId) -> &mut Self {
        self.variable_nodes.insert(node);
        self
    }

    pub fn insert_field_names(&mut self, node: NodeId, names: Vec<String>) -> &mut Self {
        self.field_names.insert(node, names);
        self
    }
}

impl TypeMap for StaticTypeMap {
    fn get_type(&self, node: NodeId) -> Option<TypeId> {
        self.types.get(&node).copied()
    }

    fn type_is_variable(&self, node: NodeId) -> bool {
        self.variable_nodes.contains(&node)
    }

    fn type_field_names(&self, node: NodeId) -> Option<Vec<String>> {
        self.field_names.get(&node).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reml_core::types::TypeSystem;

    #[test]
    fn static_type_map_roundtrips() {
        let mut ts = TypeSystem::new();
        let mut map = StaticTypeMap::new();
        let n = NodeId(1);
        map.insert(n, ts.int_type());
        assert_eq!(map.get_type(n), Some(ts.int_type()));
        assert!(!map.type_is_variable(n));
        assert!(map.get_type(NodeId(2)).is_none());
    }
}
