//! Three-way field-level merge. The sync core never silently discards
//! data: when a merge cannot decide, it hands the caller a structured
//! conflict instead of a guess.

use serde_json::{Map, Value};

use crate::config::ConflictStrategy;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field: String,
    pub local: Value,
    pub remote: Value,
    pub base: Option<Value>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged(Value),
    Conflicts(Vec<FieldConflict>),
}

/// Stateless three-way merge over JSON objects. `base` is the common
/// ancestor snapshot, or `None` if no ancestor is known (in which case
/// every differing field is a conflict).
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn merge(&self, base: Option<&Value>, local: &Value, remote: &Value) -> MergeOutcome {
        let local_map = as_object(local);
        let remote_map = as_object(remote);
        let base_map = base.map(as_object);

        let mut fields: Vec<&String> = local_map.keys().chain(remote_map.keys()).collect();
        fields.sort();
        fields.dedup();

        let mut merged = Map::new();
        let mut conflicts = Vec::new();

        for field in fields {
            let local_v = local_map.get(field).cloned().unwrap_or(Value::Null);
            let remote_v = remote_map.get(field).cloned().unwrap_or(Value::Null);

            match &base_map {
                None => {
                    if local_v == remote_v {
                        merged.insert(field.clone(), local_v);
                    } else {
                        conflicts.push(FieldConflict {
                            field: field.clone(),
                            local: local_v,
                            remote: remote_v,
                            base: None,
                            message: "no common ancestor; both sides disagree".to_string(),
                        });
                    }
                }
                Some(base_map) => {
                    let base_v = base_map.get(field).cloned().unwrap_or(Value::Null);
                    let local_changed = local_v != base_v;
                    let remote_changed = remote_v != base_v;

                    merged.insert(
                        field.clone(),
                        match (local_changed, remote_changed) {
                            (false, false) => base_v,
                            (true, false) => local_v,
                            (false, true) => remote_v,
                            (true, true) if local_v == remote_v => local_v,
                            (true, true) => {
                                conflicts.push(FieldConflict {
                                    field: field.clone(),
                                    local: local_v,
                                    remote: remote_v,
                                    base: Some(base_v),
                                    message: "both sides changed this field differently".to_string(),
                                });
                                continue;
                            }
                        },
                    );
                }
            }
        }

        if conflicts.is_empty() {
            MergeOutcome::Merged(Value::Object(merged))
        } else {
            MergeOutcome::Conflicts(conflicts)
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Which side a configured (non-interactive) strategy, or a last-writer-
/// wins fallback by timestamp, should keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSide {
    Local,
    Remote,
}

/// Applies `ConflictStrategy::Local`/`Remote` directly, or falls back to
/// last-writer-wins by `t` for `Ask` when no interactive handler answers.
pub fn resolve_by_strategy(strategy: ConflictStrategy, local_t: i64, remote_t: i64) -> ResolvedSide {
    match strategy {
        ConflictStrategy::Local => ResolvedSide::Local,
        ConflictStrategy::Remote => ResolvedSide::Remote,
        ConflictStrategy::Ask => last_writer_wins(local_t, remote_t),
    }
}

pub fn last_writer_wins(local_t: i64, remote_t: i64) -> ResolvedSide {
    if remote_t > local_t {
        ResolvedSide::Remote
    } else {
        ResolvedSide::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unchanged_fields_keep_base() {
        let base = json!({"a": 1, "b": 2});
        let local = json!({"a": 1, "b": 2});
        let remote = json!({"a": 1, "b": 2});
        let resolver = ConflictResolver::new();
        assert_eq!(resolver.merge(Some(&base), &local, &remote), MergeOutcome::Merged(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn single_side_change_wins_without_conflict() {
        let base = json!({"a": 1});
        let local = json!({"a": 5});
        let remote = json!({"a": 1});
        let resolver = ConflictResolver::new();
        assert_eq!(resolver.merge(Some(&base), &local, &remote), MergeOutcome::Merged(json!({"a": 5})));
    }

    #[test]
    fn both_sides_change_to_same_value_is_not_a_conflict() {
        let base = json!({"a": 1});
        let local = json!({"a": 9});
        let remote = json!({"a": 9});
        let resolver = ConflictResolver::new();
        assert_eq!(resolver.merge(Some(&base), &local, &remote), MergeOutcome::Merged(json!({"a": 9})));
    }

    #[test]
    fn both_sides_change_to_different_values_conflicts() {
        let base = json!({"body": "hello"});
        let local = json!({"body": "hiA"});
        let remote = json!({"body": "hiB"});
        let resolver = ConflictResolver::new();
        match resolver.merge(Some(&base), &local, &remote) {
            MergeOutcome::Conflicts(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].field, "body");
            }
            other => panic!("expected conflicts, got {:?}", other),
        }
    }

    #[test]
    fn no_ancestor_conflicts_on_every_difference() {
        let local = json!({"body": "hiA", "title": "same"});
        let remote = json!({"body": "hiB", "title": "same"});
        let resolver = ConflictResolver::new();
        match resolver.merge(None, &local, &remote) {
            MergeOutcome::Conflicts(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].field, "body");
            }
            other => panic!("expected conflicts, got {:?}", other),
        }
    }

    #[test]
    fn last_writer_wins_picks_higher_timestamp() {
        assert_eq!(last_writer_wins(100, 200), ResolvedSide::Remote);
        assert_eq!(last_writer_wins(200, 100), ResolvedSide::Local);
    }
}
