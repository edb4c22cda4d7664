//! Environment (C4): an immutable chained mapping from identifier pattern
//! to binding.
//!
//! Generic over the payload `V` so this one structure serves both the
//! built-in catalog (§C2, where `V` is a built-in's compile-time value)
//! and the resolver (§C5, where `V` is a Core expression handle). Chained
//! environments share structure via `Rc`; nothing already built is ever
//! mutated, only layered over.

use std::rc::Rc;

use crate::types::TypeId;

/// Identity of a binding site: the surface name plus a stable ordinal
/// distinguishing shadowed redeclarations of the same name (§3.2's "every
/// named pattern has a stable ordinal").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvKey {
    pub name: String,
    pub ordinal: u32,
}

impl EnvKey {
    pub fn new(name: impl Into<String>, ordinal: u32) -> Self {
        EnvKey { name: name.into(), ordinal }
    }
}

/// A single binding: its identity, optionally a compile-time-known value
/// (e.g. a `val`'s body expression, kept around so the resolver can
/// inline it), and optionally its type.
#[derive(Debug, Clone)]
pub struct Binding<V: Clone> {
    pub key: EnvKey,
    pub value: Option<V>,
    pub ty: Option<TypeId>,
    /// Top-level bindings are exempt from the analyzer's `DEAD`
    /// classification for zero-use identifiers (§4.8).
    pub top_level: bool,
}

impl<V: Clone> Binding<V> {
    pub fn new(key: EnvKey) -> Self {
        Binding { key, value: None, ty: None, top_level: false }
    }

    pub fn with_value(mut self, value: V) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_type(mut self, ty: TypeId) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn top_level(mut self) -> Self {
        self.top_level = true;
        self
    }
}

#[derive(Debug)]
enum EnvNode<V: Clone> {
    Empty,
    Layer { parent: Rc<EnvNode<V>>, bindings: Vec<Binding<V>> },
}

/// An immutable, `Rc`-chained environment. Cloning an `Env` is O(1): it
/// just bumps a reference count to the same chain.
#[derive(Debug, Clone)]
pub struct Env<V: Clone> {
    node: Rc<EnvNode<V>>,
}

impl<V: Clone> Default for Env<V> {
    fn default() -> Self {
        Env::empty()
    }
}

impl<V: Clone> Env<V> {
    pub fn empty() -> Self {
        Env { node: Rc::new(EnvNode::Empty) }
    }

    /// Layer a single binding on top of this environment, returning a new
    /// environment. `self` is left untouched.
    pub fn bind(&self, binding: Binding<V>) -> Self {
        Env {
            node: Rc::new(EnvNode::Layer { parent: Rc::clone(&self.node), bindings: vec![binding] }),
        }
    }

    /// Layer many bindings at once as a single scope. A no-op (returns a
    /// clone of `self`) when `bindings` is empty.
    pub fn bind_all(&self, bindings: Vec<Binding<V>>) -> Self {
        if bindings.is_empty() {
            return self.clone();
        }
        Env { node: Rc::new(EnvNode::Layer { parent: Rc::clone(&self.node), bindings }) }
    }

    /// Look up the nearest-enclosing binding for `key`.
    pub fn get_opt(&self, key: &EnvKey) -> Option<Binding<V>> {
        let mut node = &self.node;
        loop {
            match node.as_ref() {
                EnvNode::Empty => return None,
                EnvNode::Layer { parent, bindings } => {
                    if let Some(b) = bindings.iter().rev().find(|b| &b.key == key) {
                        return Some(b.clone());
                    }
                    node = parent;
                }
            }
        }
    }

    /// Find the nearest-enclosing binding for a given `name`, irrespective
    /// of ordinal — ordinary lexical name lookup, used by the resolver to
    /// turn a surface `Id(name)` into a Core `IdRef { name, ordinal }`
    /// before the ordinal is known.
    pub fn get_by_name(&self, name: &str) -> Option<Binding<V>> {
        let mut node = &self.node;
        loop {
            match node.as_ref() {
                EnvNode::Empty => return None,
                EnvNode::Layer { parent, bindings } => {
                    if let Some(b) = bindings.iter().rev().find(|b| b.key.name == name) {
                        return Some(b.clone());
                    }
                    node = parent;
                }
            }
        }
    }

    /// Find the outermost binding for a given `name`, irrespective of
    /// ordinal. Used when a call-site identifier may carry a different
    /// ordinal than the binding that originally defined it (§4.4).
    pub fn get_top(&self, name: &str) -> Option<Binding<V>> {
        let mut node = &self.node;
        let mut result = None;
        loop {
            match node.as_ref() {
                EnvNode::Empty => return result,
                EnvNode::Layer { parent, bindings } => {
                    if let Some(b) = bindings.iter().find(|b| b.key.name == name) {
                        result = Some(b.clone());
                    }
                    node = parent;
                }
            }
        }
    }

    /// True if this environment has no layers at all.
    pub fn is_empty(&self) -> bool {
        matches!(self.node.as_ref(), EnvNode::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_get_opt() {
        let env: Env<i32> = Env::empty();
        let env = env.bind(Binding::new(EnvKey::new("x", 0)).with_value(1));
        assert_eq!(env.get_opt(&EnvKey::new("x", 0)).unwrap().value, Some(1));
        assert!(env.get_opt(&EnvKey::new("y", 0)).is_none());
    }

    #[test]
    fn shadowing_prefers_nearest_enclosing() {
        let env: Env<i32> = Env::empty();
        let env = env.bind(Binding::new(EnvKey::new("x", 0)).with_value(1));
        let env = env.bind(Binding::new(EnvKey::new("x", 1)).with_value(2));
        assert_eq!(env.get_opt(&EnvKey::new("x", 1)).unwrap().value, Some(2));
        // The ordinal-0 binding is still reachable by its own key.
        assert_eq!(env.get_opt(&EnvKey::new("x", 0)).unwrap().value, Some(1));
    }

    #[test]
    fn get_by_name_finds_nearest_enclosing() {
        let env: Env<i32> = Env::empty();
        let env = env.bind(Binding::new(EnvKey::new("x", 0)).with_value(1));
        let env = env.bind(Binding::new(EnvKey::new("x", 1)).with_value(2));
        assert_eq!(env.get_by_name("x").unwrap().value, Some(2));
    }

    #[test]
    fn get_top_finds_outermost_binding_by_name() {
        let env: Env<i32> = Env::empty();
        let env = env.bind(Binding::new(EnvKey::new("x", 0)).with_value(1));
        let env = env.bind(Binding::new(EnvKey::new("x", 1)).with_value(2));
        assert_eq!(env.get_top("x").unwrap().value, Some(1));
    }

    #[test]
    fn bind_all_noop_on_empty() {
        let env: Env<i32> = Env::empty().bind(Binding::new(EnvKey::new("x", 0)).with_value(1));
        let env2 = env.bind_all(vec![]);
        assert_eq!(env2.get_opt(&EnvKey::new("x", 0)).unwrap().value, env.get_opt(&EnvKey::new("x", 0)).unwrap().value);
    }

    #[test]
    fn clone_is_cheap_and_shares_chain() {
        let env: Env<i32> = Env::empty().bind(Binding::new(EnvKey::new("x", 0)).with_value(1));
        let cloned = env.clone();
        let extended = cloned.bind(Binding::new(EnvKey::new("y", 0)).with_value(2));
        // original is untouched
        assert!(env.get_opt(&EnvKey::new("y", 0)).is_none());
        assert!(extended.get_opt(&EnvKey::new("y", 0)).is_some());
    }
}
