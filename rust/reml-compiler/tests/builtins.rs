//! C2 built-in catalog (spec.md §9 "global built-in table").

use reml_core::builtins::{self, INTERNAL_STRUCTURE};
use reml_core::types::TypeSystem;

#[test]
fn structured_members_are_reachable_by_structure_and_bare_name() {
    let by_structure = builtins::by_structure();
    let list_members = by_structure.get("List").expect("List structure registered");
    assert!(list_members.iter().any(|m| m.ml_name == "tabulate"));

    let by_name = builtins::by_ml_name();
    assert!(by_name.contains_key("tabulate"));
    assert!(by_name.contains_key("isPrefix"));
    assert!(by_name.contains_key("fromBag"));
    assert!(by_name.contains_key("fromList"));
}

#[test]
fn relational_aliases_resolve_to_the_same_entry() {
    let by_name = builtins::by_ml_name();
    assert_eq!(by_name["nonEmpty"].ml_name, by_name["exists"].ml_name);
    assert_eq!(by_name["empty"].ml_name, by_name["forall"].ml_name);
}

#[test]
fn internal_sentinel_operators_are_excluded_from_public_structures() {
    let by_structure = builtins::by_structure();
    assert!(!by_structure.contains_key(INTERNAL_STRUCTURE));

    let by_name = builtins::by_ml_name();
    assert!(by_name["extent"].is_internal());
    assert!(by_name["union"].is_internal());
    assert!(by_name["list"].is_internal());
}

#[test]
fn reverse_swaps_directional_comparisons_and_fixes_equality() {
    assert_eq!(builtins::reverse("<=").unwrap(), ">=");
    assert_eq!(builtins::reverse(">=").unwrap(), "<=");
    assert_eq!(builtins::reverse("<").unwrap(), ">");
    assert_eq!(builtins::reverse(">").unwrap(), "<");
    assert_eq!(builtins::reverse("=").unwrap(), "=");
    assert_eq!(builtins::reverse("<>").unwrap(), "<>");
}

#[test]
fn reverse_rejects_a_non_comparison_operator() {
    assert!(builtins::reverse("+").is_err());
}

#[test]
fn every_catalog_entry_materializes_a_type_without_panicking() {
    let mut ts = TypeSystem::new();
    let mut count = 0;
    builtins::for_each(&mut ts, |_entry, _ty| count += 1);
    assert!(count > 0);
}
