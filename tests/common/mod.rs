//! Shared fixtures for the integration suites

// Each suite compiles its own copy; not every suite uses every helper.
#![allow(dead_code)]

use latticedb::value::AttrValue;
use latticedb::{EntityDef, IndexDefinition, Lattice, Record, RecordId};

/// Engine over a fresh in-memory store with the widget entity defined:
/// hash-encoded, `value` score-ordered, `name` and `platforms` plain.
pub fn widget_db() -> Lattice {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = Lattice::in_memory("mydb");
    db.define_entity(
        EntityDef::new("widget")
            .hash_encoded()
            .with_index(IndexDefinition::new("value").sorted())
            .with_index(IndexDefinition::new("name"))
            .with_index(IndexDefinition::new("platforms")),
    );
    db
}

/// The canonical four widgets:
///
/// | id | value | name | platforms      |
/// |----|-------|------|----------------|
/// | 1  | 1     | a    | ios, android   |
/// | 2  | 2     | b    | web            |
/// | 3  | 3     | c    | android        |
/// | 4  | 2     | c    | ios            |
pub fn seed_widgets(db: &Lattice) {
    let rows: &[(i64, &str, &[&str])] = &[
        (1, "a", &["ios", "android"]),
        (2, "b", &["web"]),
        (3, "c", &["android"]),
        (4, "c", &["ios"]),
    ];
    let values = [1i64, 2, 3, 2];
    for ((id, name, platforms), value) in rows.iter().zip(values) {
        let record = db
            .create(
                "widget",
                [
                    ("value", AttrValue::Int(value)),
                    ("name", AttrValue::from(*name)),
                    (
                        "platforms",
                        AttrValue::from(platforms.to_vec()),
                    ),
                ],
            )
            .unwrap();
        assert_eq!(record.id, RecordId::Int(*id));
    }
}

/// Integer ids of a result list, in result order
pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| match &r.id {
            RecordId::Int(i) => *i,
            RecordId::Str(s) => panic!("unexpected string id {}", s),
        })
        .collect()
}
