// tests/offline_integration.rs

use chrono::{DateTime, Duration, TimeZone, Utc};
use parse_graph::types::date::format_iso;
use parse_graph::{
    FileStore, KeyValueStore, MemoryStore, Node, OfflineEngine, OperationKind, ParseError,
    ParseObject, PendingOperation, ReconcileOutcome, RestCommand,
};
use serde_json::json;
use std::sync::Arc;


use test_utils::{initialize_logger_once, MockTransport};

fn engine() -> (Arc<MockTransport>, OfflineEngine<MockTransport>) {
    initialize_logger_once();
    let transport = Arc::new(MockTransport::new());
    let engine = OfflineEngine::new(Arc::clone(&transport), Arc::new(MemoryStore::new()));
    (transport, engine)
}

fn earlier() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn score(id: &str, points: i64, updated_at: DateTime<Utc>) -> ParseObject {
    let mut object = ParseObject::with_id("GameScore", id).with("points", &points);
    object.created_at = Some(updated_at);
    object.updated_at = Some(updated_at);
    object
}

/// Queues `object` by attempting `kind` while the server is unreachable.
async fn queue(
    transport: &MockTransport,
    engine: &OfflineEngine<MockTransport>,
    object: &mut ParseObject,
    kind: OperationKind,
) {
    transport.set_offline(true);
    let result = engine.execute(object, kind).await;
    assert!(matches!(result, Err(ParseError::NetworkUnavailable(_))));
    transport.set_offline(false);
}

#[tokio::test]
async fn test_network_failure_queues_the_write() {
    let (transport, engine) = engine();
    let t1 = earlier();
    let mut object = score("abc", 10, t1);
    queue(&transport, &engine, &mut object, OperationKind::Update).await;

    let pending = engine.local_store().pending_operations().await.unwrap();
    assert_eq!(
        pending,
        vec![PendingOperation::new(OperationKind::Update, "GameScore", "abc", Some(t1))]
    );
    let cached = engine
        .local_store()
        .fetch_object("GameScore", "abc")
        .await
        .unwrap()
        .expect("object cached locally");
    assert_eq!(cached.get("points"), Some(&Node::Int(10)));

    // Queueing the same object again keeps a single record.
    queue(&transport, &engine, &mut object, OperationKind::Update).await;
    assert_eq!(engine.local_store().pending_operations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_other_errors_are_not_queued() {
    let (transport, engine) = engine();
    transport.push_error(ParseError::OperationForbidden("Permission denied".to_string()));
    let mut object = score("abc", 10, earlier());
    let result = engine.execute(&mut object, OperationKind::Update).await;
    assert!(matches!(result, Err(ParseError::OperationForbidden(_))));
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_object_without_id_cannot_be_queued() {
    let (transport, engine) = engine();
    transport.set_offline(true);
    let mut object = ParseObject::new("GameScore").with("points", &1);
    let result = engine.execute(&mut object, OperationKind::Save).await;
    assert!(matches!(result, Err(ParseError::MissingStableIdentifier(class)) if class == "GameScore"));
}

#[tokio::test]
async fn test_successful_write_is_cached() {
    let (_transport, engine) = engine();
    let mut object = score("abc", 3, earlier());
    engine.execute(&mut object, OperationKind::Update).await.unwrap();
    let cached = engine.local_store().fetch_object("GameScore", "abc").await.unwrap();
    assert_eq!(cached.and_then(|o| o.updated_at), object.updated_at);
}

#[tokio::test]
async fn test_newer_server_copy_wins() {
    let (transport, engine) = engine();
    let t1 = earlier();
    let mut object = score("abc", 10, t1);
    queue(&transport, &engine, &mut object, OperationKind::Update).await;

    let t2 = t1 + Duration::minutes(5);
    transport.push_response(json!({"results": [
        {"objectId": "abc", "points": 99, "createdAt": format_iso(&t1), "updatedAt": format_iso(&t2)}
    ]}));
    let results = engine.reconcile().await.unwrap();

    assert_eq!(results.len(), 1);
    match &results[0].outcome {
        ReconcileOutcome::ServerWon(server) => assert_eq!(server.get("points"), Some(&Node::Int(99))),
        other => panic!("Expected the server copy to win, got {:?}", other),
    }
    let cached = engine.local_store().fetch_object("GameScore", "abc").await.unwrap().unwrap();
    assert_eq!(cached.get("points"), Some(&Node::Int(99)));
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
    // Only the batch query went out; nothing was replayed.
    assert!(matches!(transport.commands().last(), Some(RestCommand::Find { .. })));
}

#[tokio::test]
async fn test_equal_timestamps_replay_local_copy() {
    let (transport, engine) = engine();
    let t1 = earlier();
    let mut object = score("abc", 10, t1);
    queue(&transport, &engine, &mut object, OperationKind::Update).await;

    transport.push_response(json!({"results": [
        {"objectId": "abc", "points": 5, "createdAt": format_iso(&t1), "updatedAt": format_iso(&t1)}
    ]}));
    let results = engine.reconcile().await.unwrap();

    match &results[0].outcome {
        ReconcileOutcome::Replayed(local) => assert_eq!(local.get("points"), Some(&Node::Int(10))),
        other => panic!("Expected a replay, got {:?}", other),
    }
    let replay = transport.writes().pop().expect("replayed write");
    assert_eq!(replay.1.as_deref(), Some("abc"));
    assert_eq!(replay.2, json!({"points": 10}));
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_defers_while_offline() {
    let (transport, engine) = engine();
    let mut object = score("abc", 10, earlier());
    queue(&transport, &engine, &mut object, OperationKind::Save).await;

    transport.set_offline(true);
    let results = engine.reconcile().await.unwrap();
    assert!(matches!(results[0].outcome, ReconcileOutcome::Deferred));
    assert_eq!(engine.local_store().pending_operations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_order_and_per_object_failures() {
    let (transport, engine) = engine();
    let t = earlier();
    let mut updated = score("u1", 1, t);
    let mut saved = score("s1", 2, t);
    let mut replaced = score("r1", 3, t);
    queue(&transport, &engine, &mut updated, OperationKind::Update).await;
    queue(&transport, &engine, &mut saved, OperationKind::Save).await;
    queue(&transport, &engine, &mut replaced, OperationKind::Replace).await;

    // save: find (empty) + replay; replace: find (empty) + failing replay; update: default responses.
    transport.push_response(json!({"results": []}));
    transport.push_response(json!({"updatedAt": "2030-01-01T00:00:00.000Z"}));
    transport.push_response(json!({"results": []}));
    transport.push_error(ParseError::OperationForbidden("Permission denied".to_string()));

    let results = engine.reconcile().await.unwrap();
    let order: Vec<(OperationKind, &str)> = results
        .iter()
        .map(|r| (r.kind, r.object_id.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (OperationKind::Save, "s1"),
            (OperationKind::Replace, "r1"),
            (OperationKind::Update, "u1"),
        ]
    );
    assert!(matches!(results[0].outcome, ReconcileOutcome::Replayed(_)));
    assert!(matches!(results[1].outcome, ReconcileOutcome::Failed(_)));
    assert!(matches!(results[2].outcome, ReconcileOutcome::Replayed(_)));
    // The rejected replace stays queued for the next pass.
    assert_eq!(
        engine.local_store().pending_operations().await.unwrap(),
        vec![PendingOperation::new(OperationKind::Replace, "GameScore", "r1", Some(t))]
    );
}

#[tokio::test]
async fn test_rejected_replay_keeps_record_and_local_copy() {
    let (transport, engine) = engine();
    let t1 = earlier();
    let mut object = score("abc", 10, t1);
    queue(&transport, &engine, &mut object, OperationKind::Update).await;

    transport.push_response(json!({"results": [
        {"objectId": "abc", "points": 5, "createdAt": format_iso(&t1), "updatedAt": format_iso(&t1)}
    ]}));
    transport.push_error(ParseError::OperationForbidden("Permission denied".to_string()));
    let results = engine.reconcile().await.unwrap();

    assert!(matches!(
        &results[0].outcome,
        ReconcileOutcome::Failed(e) if matches!(**e, ParseError::OperationForbidden(_))
    ));
    let pending = engine.local_store().pending_operations().await.unwrap();
    assert_eq!(
        pending,
        vec![PendingOperation::new(OperationKind::Update, "GameScore", "abc", Some(t1))]
    );
    let cached = engine.local_store().fetch_object("GameScore", "abc").await.unwrap().unwrap();
    assert_eq!(cached.get("points"), Some(&Node::Int(10)));

    // The next pass retries it.
    let results = engine.reconcile().await.unwrap();
    assert!(matches!(results[0].outcome, ReconcileOutcome::Replayed(_)));
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_newer_record_replaces_older_kind() {
    let (transport, engine) = engine();
    let t1 = earlier();
    let mut object = score("abc", 10, t1);
    queue(&transport, &engine, &mut object, OperationKind::Update).await;
    let mut object = score("abc", 11, t1 + Duration::minutes(1));
    queue(&transport, &engine, &mut object, OperationKind::Save).await;

    let pending = engine.local_store().pending_operations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, OperationKind::Save);

    let results = engine.reconcile().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].outcome, ReconcileOutcome::Replayed(_)));
    assert_eq!(transport.writes().len(), 1);
}

#[tokio::test]
async fn test_concurrent_reconciles_replay_once() {
    let (transport, engine) = engine();
    let mut first = score("a1", 1, earlier());
    let mut second = score("a2", 2, earlier());
    queue(&transport, &engine, &mut first, OperationKind::Save).await;
    queue(&transport, &engine, &mut second, OperationKind::Save).await;
    transport.set_delay(std::time::Duration::from_millis(20));

    let (left, right) = tokio::join!(engine.reconcile(), engine.reconcile());
    let replayed: Vec<String> = left
        .unwrap()
        .into_iter()
        .chain(right.unwrap())
        .filter(|r| matches!(r.outcome, ReconcileOutcome::Replayed(_)))
        .map(|r| r.object_id)
        .collect();
    assert_eq!(replayed.len(), 2);
    assert!(replayed.contains(&"a1".to_string()));
    assert!(replayed.contains(&"a2".to_string()));
    assert_eq!(transport.writes().len(), 2);
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_local_copy_is_dropped() {
    let (_transport, engine) = engine();
    engine
        .local_store()
        .record_pending(PendingOperation::new(OperationKind::Update, "GameScore", "gone", None))
        .await
        .unwrap();
    let results = engine.reconcile().await.unwrap();
    assert!(matches!(results[0].outcome, ReconcileOutcome::Dropped));
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_local_copy_adopts_server_copy() {
    let (transport, engine) = engine();
    let t1 = earlier();
    engine
        .local_store()
        .record_pending(PendingOperation::new(OperationKind::Update, "GameScore", "gone", Some(t1)))
        .await
        .unwrap();
    transport.push_response(json!({"results": [
        {"objectId": "gone", "points": 7, "createdAt": format_iso(&t1), "updatedAt": format_iso(&t1)}
    ]}));

    let results = engine.reconcile().await.unwrap();
    assert!(matches!(results[0].outcome, ReconcileOutcome::Dropped));
    let cached = engine
        .local_store()
        .fetch_object("GameScore", "gone")
        .await
        .unwrap()
        .expect("server copy cached");
    assert_eq!(cached.get("points"), Some(&Node::Int(7)));
    assert!(transport.writes().is_empty());
    assert!(engine.local_store().pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_falls_back_to_local_copy() {
    let (transport, engine) = engine();
    let mut object = score("abc", 10, earlier());
    engine.execute(&mut object, OperationKind::Update).await.unwrap();

    transport.set_offline(true);
    let fetched = engine.fetch("GameScore", "abc").await.unwrap();
    assert_eq!(fetched.get("points"), Some(&Node::Int(10)));
    assert!(matches!(
        engine.fetch("GameScore", "unknown").await,
        Err(ParseError::NetworkUnavailable(_))
    ));
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    initialize_logger_once();
    let dir = tempfile::tempdir().unwrap();
    let key = "offline/pending_operations.json";
    {
        let store = FileStore::open(dir.path()).await.unwrap();
        store.write(key, b"[]").await.unwrap();
        store.write(key, b"[1]").await.unwrap();
        store.write("objects/GameScore/a.json", b"{}").await.unwrap();
        store.write("objects/GameScore/b.json", b"{}").await.unwrap();
    }
    let store = FileStore::open(dir.path()).await.unwrap();
    assert_eq!(store.read(key).await.unwrap(), Some(b"[1]".to_vec()));
    assert_eq!(
        store.list("objects/GameScore").await.unwrap(),
        vec!["objects/GameScore/a.json", "objects/GameScore/b.json"]
    );
    store.delete("objects/GameScore/a.json").await.unwrap();
    store.delete("objects/GameScore/a.json").await.unwrap();
    assert_eq!(store.read("objects/GameScore/a.json").await.unwrap(), None);
    assert!(matches!(
        store.write("../escape.json", b"{}").await,
        Err(ParseError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_engine_over_file_store() {
    initialize_logger_once();
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let engine = OfflineEngine::new(Arc::clone(&transport), store);

    let mut object = score("abc", 10, earlier());
    transport.set_offline(true);
    assert!(engine.execute(&mut object, OperationKind::Save).await.is_err());
    transport.set_offline(false);

    // A second engine over the same directory sees the queued write.
    let reopened = OfflineEngine::new(
        Arc::clone(&transport),
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
    );
    let results = reopened.reconcile().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].outcome, ReconcileOutcome::Replayed(_)));
    assert!(dir.path().join("objects/GameScore/abc.json").exists());
}
