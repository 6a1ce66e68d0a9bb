//! Section documents and the field-level structural diff between them.
//!
//! A form section is an opaque JSON object: the server never interprets
//! individual fields, it only compares them for version history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One section of a patient form, as the client sent it.
pub type SectionDocument = serde_json::Map<String, Value>;

/// A single field that exists in both snapshots with different values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub from: Value,
    pub to: Value,
}

/// Field-level diff between two section snapshots.
///
/// `BTreeMap` keeps the field order deterministic, so the serialized diff of
/// the same edit is always byte-identical.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentDiff {
    /// Fields present in both snapshots with different values.
    pub changed: BTreeMap<String, FieldChange>,
    /// Fields present only in the new snapshot.
    pub added: BTreeMap<String, Value>,
    /// Fields present only in the previous snapshot.
    pub removed: BTreeMap<String, Value>,
}

impl DocumentDiff {
    /// True when the two snapshots were structurally identical.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Human-readable summary, e.g. `"2 fields modified, 1 field added"`.
    /// Zero-count clauses are omitted; an empty diff reads `"No changes"`.
    pub fn summary(&self) -> String {
        fn clause(count: usize, verb: &str) -> Option<String> {
            match count {
                0 => None,
                1 => Some(format!("1 field {verb}")),
                n => Some(format!("{n} fields {verb}")),
            }
        }

        let parts: Vec<String> = [
            clause(self.changed.len(), "modified"),
            clause(self.added.len(), "added"),
            clause(self.removed.len(), "removed"),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Compare two section snapshots field by field.
///
/// Values are compared by deep structural equality: a change anywhere inside
/// a nested object or array marks the whole top-level field as changed.
pub fn compute_diff(previous: &SectionDocument, next: &SectionDocument) -> DocumentDiff {
    let mut diff = DocumentDiff::default();

    for (field, old_value) in previous {
        match next.get(field) {
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => {
                diff.changed.insert(
                    field.clone(),
                    FieldChange {
                        from: old_value.clone(),
                        to: new_value.clone(),
                    },
                );
            }
            None => {
                diff.removed.insert(field.clone(), old_value.clone());
            }
        }
    }

    for (field, new_value) in next {
        if !previous.contains_key(field) {
            diff.added.insert(field.clone(), new_value.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> SectionDocument {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_identical_documents_produce_empty_diff() {
        let a = doc(json!({"pulse": 88, "airway": "clear"}));
        let diff = compute_diff(&a, &a.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "No changes");
    }

    #[test]
    fn test_detects_changed_added_removed() {
        let prev = doc(json!({"pulse": 88, "airway": "clear", "resp": 16}));
        let next = doc(json!({"pulse": 92, "airway": "clear", "gcs": 15}));

        let diff = compute_diff(&prev, &next);

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed["pulse"].from, json!(88));
        assert_eq!(diff.changed["pulse"].to, json!(92));
        assert_eq!(diff.added["gcs"], json!(15));
        assert_eq!(diff.removed["resp"], json!(16));
    }

    #[test]
    fn test_nested_change_marks_whole_field() {
        let prev = doc(json!({"vitals": {"pulse": 88, "bp": "120/80"}}));
        let next = doc(json!({"vitals": {"pulse": 88, "bp": "90/60"}}));

        let diff = compute_diff(&prev, &next);

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed["vitals"].from, json!({"pulse": 88, "bp": "120/80"}));
        assert_eq!(diff.changed["vitals"].to, json!({"pulse": 88, "bp": "90/60"}));
    }

    #[test]
    fn test_summary_pluralization_and_order() {
        let prev = doc(json!({"a": 1, "b": 2, "c": 3}));
        let next = doc(json!({"a": 9, "b": 8, "d": 4}));

        let diff = compute_diff(&prev, &next);
        assert_eq!(diff.summary(), "2 fields modified, 1 field added, 1 field removed");

        let only_added = compute_diff(&doc(json!({})), &doc(json!({"x": 1})));
        assert_eq!(only_added.summary(), "1 field added");
    }

    #[test]
    fn test_diff_serializes_with_stable_shape() {
        let prev = doc(json!({"pulse": 88}));
        let next = doc(json!({"pulse": 92}));

        let value = serde_json::to_value(compute_diff(&prev, &next)).unwrap();
        assert_eq!(
            value,
            json!({
                "changed": {"pulse": {"from": 88, "to": 92}},
                "added": {},
                "removed": {},
            })
        );
    }
}
