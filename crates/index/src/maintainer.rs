//! Secondary-index maintenance
//!
//! [`IndexMaintainer`] keeps membership sets and score-ordered indexes
//! consistent with record writes. Given an entity's previous and
//! current attribute snapshots it computes the minimal add/remove
//! command queue and submits it as one atomic batch.
//!
//! The maintainer never touches the primary record data: the record
//! write must already be durable when maintenance runs. A failed batch
//! leaves the indexes stale relative to the record; the error is
//! surfaced unchanged and no retry or rollback is attempted.
//!
//! ## Value semantics
//!
//! - Array-valued attributes index each element independently.
//! - An attribute present with any value counts as indexable, including
//!   `false`, `0` and `""`.
//! - Any change of value, including to or from such a value, removes
//!   the old entries.
//! - Removals are queued before additions so that a changed value on a
//!   score-ordered structure nets out to the new score, not a deletion.
//! - Dependency conditions are evaluated on the current snapshot only
//!   and gate the score-ordered structure.

use lattice_core::error::{Error, Result};
use lattice_core::keys::KeySpace;
use lattice_core::schema::{EntityDef, IndexSort};
use lattice_core::traits::{Command, StoreClient};
use lattice_core::value::{AttrMap, AttrValue, RecordId};
use std::sync::Arc;
use tracing::debug;

/// Whether a maintenance call indexes or unindexes the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    /// Record was created or updated
    Add,
    /// Record was deleted
    Delete,
}

/// Stateless facade maintaining an entity's index structures
///
/// Holds only the store handle and the key space; safe to clone and
/// share across threads.
#[derive(Clone)]
pub struct IndexMaintainer {
    store: Arc<dyn StoreClient>,
    keys: KeySpace,
}

impl IndexMaintainer {
    /// Create a maintainer over the given store and key space
    pub fn new(store: Arc<dyn StoreClient>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Bring the entity's index structures in line with a record write
    ///
    /// `prev` is the attribute snapshot the store held before the write
    /// (`None` for a brand-new record); `current` is the snapshot just
    /// written (for `Delete`, the snapshot being removed). The computed
    /// commands are submitted as one atomic batch; an empty queue
    /// succeeds trivially with no I/O.
    pub fn update_indexes(
        &self,
        entity: &EntityDef,
        prev: Option<&AttrMap>,
        current: &AttrMap,
        op: IndexOp,
        id: &RecordId,
    ) -> Result<()> {
        let member = id.to_string();
        let mut removals: Vec<Command> = Vec::new();
        let mut additions: Vec<Command> = Vec::new();

        for def in &entity.indexes {
            let property = def.property.as_str();
            let sort_key = self.keys.sort_key_for(&entity.name, def);

            // Previous value no longer applies: value changed on update,
            // or the record is going away.
            let stale_previous = prev.and_then(|p| p.get(property)).filter(|old| match op {
                IndexOp::Add => Some(*old) != current.get(property),
                IndexOp::Delete => true,
            });
            if let Some(old) = stale_previous {
                for value in old.fan_out() {
                    if def.sort.is_sorted() {
                        removals.push(Command::SortedSetRemove {
                            key: sort_key.clone(),
                            member: member.clone(),
                        });
                    }
                    removals.push(Command::SetRemove {
                        key: self.keys.value_set_key(&entity.name, property, value),
                        member: member.clone(),
                    });
                }
            }

            if op == IndexOp::Add {
                if let Some(value) = current.get(property) {
                    let deps_met = def.dependencies_met(current);
                    for element in value.fan_out() {
                        if deps_met {
                            match &def.sort {
                                IndexSort::Unsorted => {}
                                IndexSort::ByValue => {
                                    let score = element.score().ok_or_else(|| {
                                        Error::Encoding(format!(
                                            "attribute '{}' of '{}' has no numeric score",
                                            property, entity.name
                                        ))
                                    })?;
                                    additions.push(Command::SortedSetAdd {
                                        key: sort_key.clone(),
                                        member: member.clone(),
                                        score,
                                    });
                                }
                                IndexSort::ByScore(f) => {
                                    additions.push(Command::SortedSetAdd {
                                        key: sort_key.clone(),
                                        member: member.clone(),
                                        score: f.score(current),
                                    });
                                }
                            }
                        }
                        additions.push(Command::SetAdd {
                            key: self.keys.value_set_key(&entity.name, property, element),
                            member: member.clone(),
                        });
                    }
                }
            }
        }

        let mut queue = removals;
        queue.append(&mut additions);
        if queue.is_empty() {
            debug!(entity = %entity.name, id = %member, "no indexes need updating");
            return Ok(());
        }
        debug!(
            entity = %entity.name,
            id = %member,
            commands = queue.len(),
            "updating indexes"
        );
        self.store.execute_batch(&queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::schema::IndexDefinition;
    use lattice_store::MemoryStore;

    fn attrs(pairs: &[(&str, AttrValue)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn widget() -> EntityDef {
        EntityDef::new("widget")
            .with_index(IndexDefinition::new("value").sorted().unique())
            .with_index(IndexDefinition::new("name"))
            .with_index(IndexDefinition::new("platforms"))
    }

    fn setup() -> (Arc<MemoryStore>, IndexMaintainer) {
        let store = Arc::new(MemoryStore::new());
        let maintainer = IndexMaintainer::new(store.clone(), KeySpace::new("t"));
        (store, maintainer)
    }

    #[test]
    fn test_add_populates_membership_and_sorted() {
        let (store, m) = setup();
        let data = attrs(&[
            ("value", AttrValue::Int(1)),
            ("name", AttrValue::from("a")),
            ("platforms", AttrValue::from(vec!["android", "ios"])),
        ]);
        m.update_indexes(&widget(), None, &data, IndexOp::Add, &RecordId::Int(1))
            .unwrap();

        assert!(store.set_is_member("t:i:widget:value:1", "1").unwrap());
        assert!(store.set_is_member("t:i:widget:name:a", "1").unwrap());
        assert!(store.set_is_member("t:i:widget:platforms:android", "1").unwrap());
        assert!(store.set_is_member("t:i:widget:platforms:ios", "1").unwrap());
        assert_eq!(
            store.sorted_set_score("t:i:widget:value", "1").unwrap(),
            Some(1.0)
        );
    }

    #[test]
    fn test_delete_clears_all_entries() {
        let (store, m) = setup();
        let data = attrs(&[
            ("value", AttrValue::Int(2)),
            ("platforms", AttrValue::from(vec!["ios"])),
        ]);
        let id = RecordId::Int(2);
        m.update_indexes(&widget(), None, &data, IndexOp::Add, &id).unwrap();
        m.update_indexes(&widget(), Some(&data), &data, IndexOp::Delete, &id)
            .unwrap();

        assert!(!store.set_is_member("t:i:widget:value:2", "2").unwrap());
        assert!(!store.set_is_member("t:i:widget:platforms:ios", "2").unwrap());
        assert_eq!(store.sorted_set_score("t:i:widget:value", "2").unwrap(), None);
    }

    #[test]
    fn test_value_change_moves_membership() {
        let (store, m) = setup();
        let id = RecordId::Int(3);
        let before = attrs(&[("name", AttrValue::from("c"))]);
        let after = attrs(&[("name", AttrValue::from("e"))]);
        m.update_indexes(&widget(), None, &before, IndexOp::Add, &id).unwrap();
        m.update_indexes(&widget(), Some(&before), &after, IndexOp::Add, &id)
            .unwrap();

        assert!(!store.set_is_member("t:i:widget:name:c", "3").unwrap());
        assert!(store.set_is_member("t:i:widget:name:e", "3").unwrap());
    }

    #[test]
    fn test_value_change_keeps_sorted_entry_current() {
        let (store, m) = setup();
        let id = RecordId::Int(1);
        let before = attrs(&[("value", AttrValue::Int(1))]);
        let after = attrs(&[("value", AttrValue::Int(9))]);
        m.update_indexes(&widget(), None, &before, IndexOp::Add, &id).unwrap();
        m.update_indexes(&widget(), Some(&before), &after, IndexOp::Add, &id)
            .unwrap();

        // removal is queued before the add, so the new score survives
        assert_eq!(
            store.sorted_set_score("t:i:widget:value", "1").unwrap(),
            Some(9.0)
        );
        assert!(!store.set_is_member("t:i:widget:value:1", "1").unwrap());
        assert!(store.set_is_member("t:i:widget:value:9", "1").unwrap());
    }

    #[test]
    fn test_change_to_falsy_still_removes_old_entry() {
        let (store, m) = setup();
        let id = RecordId::Int(4);
        let before = attrs(&[("name", AttrValue::from("a"))]);
        let after = attrs(&[("name", AttrValue::from(""))]);
        m.update_indexes(&widget(), None, &before, IndexOp::Add, &id).unwrap();
        m.update_indexes(&widget(), Some(&before), &after, IndexOp::Add, &id)
            .unwrap();

        assert!(!store.set_is_member("t:i:widget:name:a", "4").unwrap());
        assert!(store.set_is_member("t:i:widget:name:", "4").unwrap());
    }

    #[test]
    fn test_change_from_falsy_removes_old_entry() {
        let (store, m) = setup();
        let id = RecordId::Int(5);
        let before = attrs(&[("name", AttrValue::Bool(false))]);
        let after = attrs(&[("name", AttrValue::from("b"))]);
        m.update_indexes(&widget(), None, &before, IndexOp::Add, &id).unwrap();
        m.update_indexes(&widget(), Some(&before), &after, IndexOp::Add, &id)
            .unwrap();

        assert!(!store.set_is_member("t:i:widget:name:false", "5").unwrap());
        assert!(store.set_is_member("t:i:widget:name:b", "5").unwrap());
    }

    #[test]
    fn test_unchanged_value_is_left_alone() {
        let (store, m) = setup();
        let id = RecordId::Int(6);
        let data = attrs(&[("name", AttrValue::from("same"))]);
        m.update_indexes(&widget(), None, &data, IndexOp::Add, &id).unwrap();
        m.update_indexes(&widget(), Some(&data), &data, IndexOp::Add, &id)
            .unwrap();
        assert!(store.set_is_member("t:i:widget:name:same", "6").unwrap());
    }

    #[test]
    fn test_dependency_gates_sorted_structure() {
        let (store, m) = setup();
        let entity = EntityDef::new("post")
            .with_index(IndexDefinition::new("score").sorted().dependent_on("visible", true));

        let hidden = attrs(&[
            ("score", AttrValue::Int(5)),
            ("visible", AttrValue::Bool(false)),
        ]);
        m.update_indexes(&entity, None, &hidden, IndexOp::Add, &RecordId::Int(1))
            .unwrap();
        assert_eq!(store.sorted_set_score("t:i:post:score", "1").unwrap(), None);

        let visible = attrs(&[
            ("score", AttrValue::Int(5)),
            ("visible", AttrValue::Bool(true)),
        ]);
        m.update_indexes(&entity, None, &visible, IndexOp::Add, &RecordId::Int(2))
            .unwrap();
        assert_eq!(
            store.sorted_set_score("t:i:post:score", "2").unwrap(),
            Some(5.0)
        );
    }

    #[test]
    fn test_score_function_evaluated_at_write_time() {
        let (store, m) = setup();
        let entity = EntityDef::new("post").with_index(
            IndexDefinition::new("title").sorted_by(|attrs| {
                attrs.get("stamp").and_then(AttrValue::as_f64).unwrap_or(0.0)
            }),
        );
        let data = attrs(&[
            ("title", AttrValue::from("hello")),
            ("stamp", AttrValue::Int(1234)),
        ]);
        m.update_indexes(&entity, None, &data, IndexOp::Add, &RecordId::Int(1))
            .unwrap();
        assert_eq!(
            store.sorted_set_score("t:i:post:title", "1").unwrap(),
            Some(1234.0)
        );
    }

    #[test]
    fn test_non_numeric_sorted_value_is_an_error() {
        let (_, m) = setup();
        let data = attrs(&[("value", AttrValue::from("not a number"))]);
        let result = m.update_indexes(&widget(), None, &data, IndexOp::Add, &RecordId::Int(1));
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn test_explicit_key_override() {
        let (store, m) = setup();
        let entity = EntityDef::new("post")
            .with_index(IndexDefinition::new("rank").sorted().with_key("leaderboard"));
        let data = attrs(&[("rank", AttrValue::Int(7))]);
        m.update_indexes(&entity, None, &data, IndexOp::Add, &RecordId::Int(1))
            .unwrap();
        assert_eq!(store.sorted_set_score("t:leaderboard", "1").unwrap(), Some(7.0));
    }

    #[test]
    fn test_empty_queue_is_a_no_op() {
        let (_, m) = setup();
        let data = attrs(&[("unindexed", AttrValue::Int(1))]);
        m.update_indexes(&widget(), None, &data, IndexOp::Add, &RecordId::Int(1))
            .unwrap();
    }
}
