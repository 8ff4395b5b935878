//! SurrealDB sink tests against the embedded in-memory engine.

use index_sink::{ActionOutcome, IndexSchema, IndexSink, SurrealIndexSink};
use serde_json::{json, Map, Value};
use surrealdb::engine::any;
use surrealdb::sql::{Id, Thing};
use sync_core::WriteAction;

async fn setup_sink() -> SurrealIndexSink {
    let client = any::connect("mem://").await.unwrap();
    client.use_ns("test").use_db("test").await.unwrap();
    SurrealIndexSink::new(client)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn fetch(sink: &SurrealIndexSink, table: &str, id: &str) -> Option<Value> {
    let mut response = sink
        .inner()
        .query("SELECT * OMIT id FROM $rid")
        .bind(("rid", Thing::from((table, Id::String(id.to_string())))))
        .await
        .unwrap();
    response.take(0).unwrap()
}

#[tokio::test]
async fn test_create_builtin_schema() {
    let sink = setup_sink().await;
    assert!(!sink.index_exists("movies").await.unwrap());

    sink.create_index("movies", &IndexSchema::builtin("movies"))
        .await
        .unwrap();
    assert!(sink.index_exists("movies").await.unwrap());

    // IF NOT EXISTS makes re-creation harmless
    sink.create_index("movies", &IndexSchema::builtin("movies"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bulk_upsert_then_merge() {
    let sink = setup_sink().await;
    sink.create_index("movies", &IndexSchema::new("DEFINE TABLE movies SCHEMALESS;"))
        .await
        .unwrap();

    let index = WriteAction::Index {
        id: "f1".to_string(),
        document: object(json!({"id": "f1", "title": "Star", "genre": ["Sci-Fi"]})),
    };
    let outcomes = sink.bulk("movies", &[index.clone()]).await.unwrap();
    assert_eq!(outcomes, vec![ActionOutcome::Written]);

    // Replaying the same action leaves the document unchanged
    sink.bulk("movies", &[index]).await.unwrap();

    let update = WriteAction::Update {
        id: "f1".to_string(),
        fields: object(json!({"genre": ["Drama"]})),
    };
    let outcomes = sink.bulk("movies", &[update]).await.unwrap();
    assert_eq!(outcomes, vec![ActionOutcome::Written]);

    let stored = fetch(&sink, "movies", "f1").await.unwrap();
    assert_eq!(stored, json!({"title": "Star", "genre": ["Drama"]}));
}

#[tokio::test]
async fn test_update_of_missing_document_is_skipped() {
    let sink = setup_sink().await;
    sink.create_index("movies", &IndexSchema::new("DEFINE TABLE movies SCHEMALESS;"))
        .await
        .unwrap();

    let outcomes = sink
        .bulk(
            "movies",
            &[WriteAction::Update {
                id: "missing".to_string(),
                fields: object(json!({"genre": ["Drama"]})),
            }],
        )
        .await
        .unwrap();
    assert!(matches!(outcomes[0], ActionOutcome::Skipped { .. }));
    assert!(fetch(&sink, "movies", "missing").await.is_none());
}

#[tokio::test]
async fn test_rejected_record_fails_alone() {
    let sink = setup_sink().await;
    sink.create_index(
        "movies",
        &IndexSchema::new(
            "DEFINE TABLE movies SCHEMAFULL;\n\
             DEFINE FIELD title ON movies TYPE string;",
        ),
    )
    .await
    .unwrap();

    let outcomes = sink
        .bulk(
            "movies",
            &[
                WriteAction::Index {
                    id: "ok".to_string(),
                    document: object(json!({"title": "Fine"})),
                },
                WriteAction::Index {
                    id: "bad".to_string(),
                    document: object(json!({"title": 42})),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcomes[0], ActionOutcome::Written);
    assert!(outcomes[1].is_failure());
    assert!(fetch(&sink, "movies", "ok").await.is_some());
}
