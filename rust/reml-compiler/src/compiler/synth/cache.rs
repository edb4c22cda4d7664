//! The synthesizer's `Cache` (§3.5, §4.7.2, §4.7.4): a monotonic fact
//! store scoped to a single [`super::synthesize`] invocation. Facts —
//! registered generators, field-derivation mappings, and constraints
//! marked "already satisfied" — are only ever appended; an `orelse`
//! branch that fails rolls the whole cache back to its size before the
//! branch was attempted (§4.7.2's last paragraph), never contradicting
//! anything a sibling branch already recorded.

use reml_core::types::TypeId;

use crate::compiler::core_ir::CoreExpr;

use super::Generator;

/// Identity of a named pattern for cache-keying purposes: name plus
/// ordinal, matching [`crate::compiler::core_ir::IdRef`].
pub type PatKey = (String, u32);

/// A snapshot of the cache's fact-log lengths, taken before attempting a
/// risky branch (e.g. one arm of an `orelse`) and handed back to
/// [`Cache::rollback_to`] if that branch fails.
#[derive(Debug, Clone, Copy)]
pub struct CacheSnapshot {
    generators_len: usize,
    satisfied_len: usize,
    field_mappings_len: usize,
}

/// Monotonic fact store for one synthesis call (§3.5 "Lifecycle").
/// `add` never overwrites in place — a later `add` for an already-present
/// key simply becomes the new preferred candidate, found first by
/// `get`'s reverse scan, while the superseded entry stays in the log
/// until an explicit `rollback_to` truncates it away.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    generators: Vec<(PatKey, Generator)>,
    satisfied: Vec<CoreExpr>,
    field_mappings: Vec<(PatKey, String, (PatKey, TypeId))>,
}

impl Cache {
    pub fn new() -> Self {
        Cache::default()
    }

    pub fn with_capacity_hint(hint: usize) -> Self {
        Cache { generators: Vec::with_capacity(hint), satisfied: Vec::new(), field_mappings: Vec::new() }
    }

    /// Register `generator` under `key`, preferred over any earlier
    /// registration for the same key (§3.5 "may be superseded").
    pub fn add(&mut self, key: PatKey, generator: Generator) {
        self.generators.push((key, generator));
    }

    /// The most recently registered generator for `key`, if any.
    pub fn get(&self, key: &PatKey) -> Option<&Generator> {
        self.generators.iter().rev().find(|(k, _)| k == key).map(|(_, g)| g)
    }

    /// Drop the most recent registration for `key` (used by the
    /// exists-join promotion in strategy 5, which removes a filter-path
    /// candidate immediately before installing a join-path superseder).
    pub fn remove(&mut self, key: &PatKey) {
        if let Some(pos) = self.generators.iter().rposition(|(k, _)| k == key) {
            self.generators.remove(pos);
        }
    }

    /// Mark `exp` as a constraint already accounted for by some
    /// installed generator (§4.7.3): a later `simplify` pass rewrites it
    /// to `true` unconditionally.
    pub fn record_satisfied(&mut self, exp: CoreExpr) {
        self.satisfied.push(exp);
    }

    pub fn is_satisfied(&self, exp: &CoreExpr) -> bool {
        self.satisfied.iter().any(|e| e == exp)
    }

    /// Record that field `field` of the tuple/record pattern `parent`
    /// corresponds to the fresh sub-pattern `sub` (strategy 1's "field
    /// projections register a fresh sub-pattern", feeding strategy 9).
    pub fn record_field_mapping(&mut self, parent: PatKey, field: String, sub: (PatKey, TypeId)) {
        self.field_mappings.push((parent, field, sub));
    }

    /// All field→sub-pattern mappings currently recorded for `parent`,
    /// most-recent registration per field winning.
    pub fn field_mappings_for(&self, parent: &PatKey) -> Vec<(String, PatKey, TypeId)> {
        let mut seen: Vec<(String, PatKey, TypeId)> = Vec::new();
        for (p, field, (sub_key, ty)) in &self.field_mappings {
            if p != parent {
                continue;
            }
            if let Some(slot) = seen.iter_mut().find(|(f, _, _)| f == field) {
                *slot = (field.clone(), sub_key.clone(), *ty);
            } else {
                seen.push((field.clone(), sub_key.clone(), *ty));
            }
        }
        seen
    }

    pub fn snapshot_len(&self) -> CacheSnapshot {
        CacheSnapshot {
            generators_len: self.generators.len(),
            satisfied_len: self.satisfied.len(),
            field_mappings_len: self.field_mappings.len(),
        }
    }

    pub fn rollback_to(&mut self, snapshot: CacheSnapshot) {
        self.generators.truncate(snapshot.generators_len);
        self.satisfied.truncate(snapshot.satisfied_len);
        self.field_mappings.truncate(snapshot.field_mappings_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::core_ir::{CoreExprKind, CorePat, CorePatKind};
    use crate::compiler::synth::Cardinality;
    use crate::compiler::tokens::Span;
    use reml_core::types::TypeSystem;

    fn pos() -> Span {
        Span::dummy()
    }

    fn dummy_generator(ts: &mut TypeSystem) -> Generator {
        let int_ty = ts.int_type();
        let list_ty = ts.list_type(int_ty);
        Generator {
            pat: CorePat::new(int_ty, pos(), CorePatKind::Wildcard),
            exp: CoreExpr::new(list_ty, pos(), CoreExprKind::ListLit(vec![])),
            free_pats: Vec::new(),
            cardinality: Cardinality::Finite,
            unique: true,
        }
    }

    #[test]
    fn later_add_supersedes_earlier_for_same_key() {
        let mut ts = TypeSystem::new();
        let mut cache = Cache::new();
        let key = ("x".to_string(), 0);
        let g1 = dummy_generator(&mut ts);
        let mut g2 = dummy_generator(&mut ts);
        g2.unique = false;
        cache.add(key.clone(), g1);
        cache.add(key.clone(), g2);
        assert!(!cache.get(&key).unwrap().unique);
    }

    #[test]
    fn rollback_discards_facts_added_after_snapshot() {
        let mut ts = TypeSystem::new();
        let mut cache = Cache::new();
        let key = ("x".to_string(), 0);
        let snap = cache.snapshot_len();
        cache.add(key.clone(), dummy_generator(&mut ts));
        assert!(cache.get(&key).is_some());
        cache.rollback_to(snap);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn satisfied_marks_are_tracked_by_structural_equality() {
        let mut ts = TypeSystem::new();
        let mut cache = Cache::new();
        let e = CoreExpr::lit(ts.bool_type(), pos(), crate::compiler::ast::Lit::Bool(true));
        assert!(!cache.is_satisfied(&e));
        cache.record_satisfied(e.clone());
        assert!(cache.is_satisfied(&e));
    }
}
