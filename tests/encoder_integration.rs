// tests/encoder_integration.rs

use chrono::{DateTime, TimeZone, Utc};
use parse_graph::{
    DataEncodingStrategy, DateEncodingStrategy, EncodeMode, EncoderOptions, Field, Node,
    NonConformingFloatStrategy, ParseEncoder, ParseError, ParseFile, ParseObject, Pointer,
    SavedIndex, SingleValueEncoder, SkipKeys,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;


use test_utils::{game_score, initialize_logger_once, player};

fn to_value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("encoder output is valid JSON")
}

#[test]
fn test_round_trip_of_flat_object() {
    initialize_logger_once();
    let played_at = Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap();
    let mut stats = BTreeMap::new();
    stats.insert("assists".to_string(), 4i64);
    stats.insert("kills".to_string(), 12i64);

    let mut object = ParseObject::with_id("GameScore", "xWMyZ4YEGZ")
        .with("points", &1337)
        .with("ratio", &0.75)
        .with("playerName", "Sean Plott")
        .with("cheatMode", &false)
        .with("playedAt", &played_at)
        .with("skills", &vec!["pwnage".to_string(), "flying".to_string()])
        .with("stats", &stats)
        .with("opponent", &Pointer::new("Player", "nice"));
    object.set_node("replay", Node::Bytes(vec![0, 1, 2, 254, 255]));
    object.set_node("note", Node::Null);

    let encoder = ParseEncoder::default();
    let bytes = encoder.encode(&object, SkipKeys::None).unwrap();
    let decoded = ParseObject::from_slice("GameScore", &bytes).unwrap();

    assert_eq!(decoded.object_id.as_deref(), Some("xWMyZ4YEGZ"));
    assert_eq!(decoded.fields().len(), object.fields().len());
    for (key, node) in object.fields() {
        assert_eq!(decoded.get(key), Some(node), "field {} did not round-trip", key);
    }
}

#[test]
fn test_cycle_through_nested_child_is_rejected() {
    initialize_logger_once();
    // The root is saved; a grandchild points back at it.
    let back_reference = ParseObject::with_id("GameScore", "root1");
    let child = player("nice").with("lastGame", &vec![back_reference]);
    let root = ParseObject::with_id("GameScore", "root1")
        .with("points", &10)
        .with("history", &vec![Node::Map(vec![("opponent".to_string(), Node::Object(child))])]);

    let encoder = ParseEncoder::default();
    let result = encoder.encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &SavedIndex::new());
    match result {
        Err(ParseError::CircularDependency(path)) => {
            assert_eq!(path, "history[0].opponent.lastGame[0]");
        }
        other => panic!("Expected a circular dependency error, got {:?}", other),
    }
}

#[test]
fn test_pointer_to_root_is_rejected() {
    let root = ParseObject::with_id("Player", "nice").with("self", &Pointer::new("Player", "nice"));
    let result = ParseEncoder::default().encode(&root, SkipKeys::Object);
    assert!(matches!(result, Err(ParseError::CircularDependency(_))));

    // Same id in another class is not a cycle.
    let root = ParseObject::with_id("Player", "nice").with("team", &Pointer::new("Team", "nice"));
    assert!(ParseEncoder::default().encode(&root, SkipKeys::Object).is_ok());
}

#[test]
fn test_collect_pass_lists_every_unsaved_descendant_once() {
    initialize_logger_once();
    let captain = player("captain");
    let team = ParseObject::new("Team").with("captain", &captain);
    let root = game_score(10)
        .with("team", &team)
        .with("opponent", &player("nice"))
        .with("rivals", &vec![player("a"), player("nice")]);

    let encoder = ParseEncoder::default();
    let encoded = encoder
        .encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &SavedIndex::new())
        .unwrap();

    let names: Vec<String> = encoded
        .pending_objects
        .iter()
        .map(|o| match o.get("name") {
            Some(Node::String(name)) => name.clone(),
            _ => o.class_name.clone(),
        })
        .collect();
    // Children come before the objects that contain them.
    assert_eq!(names, vec!["captain", "Team", "nice", "a"]);
    assert_eq!(
        to_value(&encoded.bytes),
        json!({"points": 10, "playerName": "Sean Plott", "rivals": []})
    );

    // Each pending child is encodable on its own once its own children are saved.
    let mut saved = SavedIndex::new();
    for (n, child) in encoded.pending_objects.iter().enumerate() {
        let bytes = encoder
            .encode_graph(child, &EncodeMode::resolve(SkipKeys::Object), &saved)
            .unwrap()
            .bytes;
        assert!(to_value(&bytes).is_object());
        saved
            .record_object(child, Pointer::new(child.class_name.clone(), format!("id{}", n)), encoder.options())
            .unwrap();
    }

    let second = encoder
        .encode_graph(&root, &EncodeMode::resolve(SkipKeys::Object), &saved)
        .unwrap();
    assert!(second.pending_objects.is_empty());
    let value = to_value(&second.bytes);
    assert_eq!(value["team"], json!({"__type": "Pointer", "className": "Team", "objectId": "id1"}));
    assert_eq!(value["rivals"][0]["objectId"], json!("id3"));
    assert_eq!(value["rivals"][1]["objectId"], json!("id2"));
}

#[test]
fn test_unsaved_child_fails_outside_collect_mode() {
    let root = game_score(10).with("opponent", &player("nice"));
    let result = ParseEncoder::default().encode(&root, SkipKeys::Object);
    assert!(matches!(result, Err(ParseError::UnresolvedChild(path)) if path == "opponent"));
}

#[test]
fn test_unsaved_file_fails_outside_collect_mode() {
    let avatar = ParseFile::new("avatar.png", vec![137, 80, 78, 71], "image/png");
    let root = player("nice").with("avatar", &avatar);
    let result = ParseEncoder::default().encode(&root, SkipKeys::Object);
    assert!(matches!(result, Err(ParseError::UnresolvedChild(path)) if path == "avatar"));

    let collected = ParseEncoder::default()
        .encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &SavedIndex::new())
        .unwrap();
    assert_eq!(collected.pending_files.len(), 1);
    assert_eq!(to_value(&collected.bytes), json!({"name": "nice"}));
}

#[test]
fn test_opponent_resolves_to_pointer_after_save() {
    initialize_logger_once();
    let root = ParseObject::new("GameScore")
        .with("points", &10)
        .with("opponent", &player("nice"));
    let encoder = ParseEncoder::default();

    let first = encoder
        .encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &SavedIndex::new())
        .unwrap();
    assert_eq!(to_value(&first.bytes), json!({"points": 10}));
    assert_eq!(first.pending_objects.len(), 1);
    assert_eq!(first.pending_objects[0].class_name, "Player");
    assert!(first.pointer.is_none());

    let mut saved = SavedIndex::new();
    saved
        .record_object(&first.pending_objects[0], Pointer::new("Player", "nice"), encoder.options())
        .unwrap();
    let second = encoder
        .encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &saved)
        .unwrap();
    assert!(second.pending_objects.is_empty());
    assert_eq!(
        to_value(&second.bytes),
        json!({"points": 10, "opponent": {"__type": "Pointer", "className": "Player", "objectId": "nice"}})
    );
}

#[test]
fn test_identical_content_resolves_to_same_pointer() {
    let encoder = ParseEncoder::default();
    let mut saved = SavedIndex::new();
    saved
        .record_object(&player("nice"), Pointer::new("Player", "p1"), encoder.options())
        .unwrap();

    // Same content, separately built: substituted by the recorded pointer.
    let same = game_score(1).with("opponent", &player("nice"));
    let value = to_value(
        &encoder
            .encode_graph(&same, &EncodeMode::resolve(SkipKeys::Object), &saved)
            .unwrap()
            .bytes,
    );
    assert_eq!(value["opponent"]["objectId"], json!("p1"));

    // Any field difference makes it a different pending child.
    let different = game_score(1)
        .with("opponent", &player("nice"))
        .with("partner", &player("nice").with("level", &2));
    let encoded = encoder
        .encode_graph(&different, &EncodeMode::collect(SkipKeys::Object), &saved)
        .unwrap();
    assert_eq!(encoded.pending_objects.len(), 1);
    assert_eq!(encoded.pending_objects[0].get("level"), Some(&Node::Int(2)));
    assert_eq!(encoder.content_hash(&player("nice")).unwrap(), encoder.content_hash(&player("nice")).unwrap());
}

#[test]
fn test_skip_policies_are_stable_and_minimal() {
    let mut object = ParseObject::with_id("GameScore", "abc123").with("points", &3);
    object.created_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    object.updated_at = object.created_at;
    let encoder = ParseEncoder::default();

    let first = encoder.encode(&object, SkipKeys::Object).unwrap();
    let again = encoder.encode(&object, SkipKeys::Object).unwrap();
    assert_eq!(first, again);
    assert_eq!(to_value(&first), json!({"points": 3}));

    let custom = to_value(&encoder.encode(&object, SkipKeys::CustomObjectId).unwrap());
    assert_eq!(custom, json!({"points": 3, "objectId": "abc123"}));

    let everything = to_value(&encoder.encode(&object, SkipKeys::None).unwrap());
    assert_eq!(everything["className"], json!("GameScore"));
    assert_eq!(everything["createdAt"], json!("2024-01-01T00:00:00.000Z"));
}

#[test]
fn test_skip_applies_only_at_top_level() {
    let params = json!({"functionJobName": "nightly", "filter": {"functionJobName": "kept"}});
    let value = ParseEncoder::default()
        .encode_to_value(&params, SkipKeys::Cloud)
        .unwrap();
    assert_eq!(value, json!({"filter": {"functionJobName": "kept"}}));
}

#[test]
fn test_skipped_field_children_are_not_collected() {
    // `id` is reserved on objects; an unsaved child stored under it is neither
    // encoded nor queued for saving.
    let root = game_score(10).with("id", &player("ghost"));
    let encoded = ParseEncoder::default()
        .encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &SavedIndex::new())
        .unwrap();
    assert!(encoded.pending_objects.is_empty());
    assert_eq!(
        to_value(&encoded.bytes),
        json!({"points": 10, "playerName": "Sean Plott"})
    );
}

#[test]
fn test_delete_field_and_absent_field() {
    let mut object = ParseObject::with_id("GameScore", "a");
    object.set_field::<i64>("points", Field::Delete);
    object.set_field::<i64>("level", Field::Absent);
    object.set_field("lives", Field::Present(3i64));
    let value = ParseEncoder::default()
        .encode_to_value(&object, SkipKeys::Object)
        .unwrap();
    assert_eq!(value, json!({"points": {"__op": "Delete"}, "lives": 3}));
}

#[test]
fn test_non_finite_floats() {
    let object = ParseObject::new("Stats").with("ratio", &f64::INFINITY);
    let result = ParseEncoder::default().encode(&object, SkipKeys::Object);
    assert!(matches!(result, Err(ParseError::InvalidFloatingPoint { path, .. }) if path == "ratio"));

    let encoder = ParseEncoder::new(EncoderOptions {
        float_strategy: NonConformingFloatStrategy::ConvertToString {
            positive_infinity: "+inf".to_string(),
            negative_infinity: "-inf".to_string(),
            nan: "nan".to_string(),
        },
        ..EncoderOptions::default()
    });
    let object = ParseObject::new("Stats")
        .with("ratio", &f64::INFINITY)
        .with("spread", &vec![f64::NEG_INFINITY, f64::NAN]);
    let value = encoder.encode_to_value(&object, SkipKeys::Object).unwrap();
    assert_eq!(value, json!({"ratio": "+inf", "spread": ["-inf", "nan"]}));
}

#[test]
fn test_custom_date_closure() {
    let date = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
    let encoder = ParseEncoder::new(EncoderOptions {
        date_strategy: DateEncodingStrategy::Custom(Arc::new(
            |date: &DateTime<Utc>, out: &mut SingleValueEncoder<'_>| -> Result<(), ParseError> {
                out.encode_value(json!(date.format("%Y/%m/%d").to_string()))
            },
        )),
        ..EncoderOptions::default()
    });
    let value = encoder
        .encode_to_value(&ParseObject::new("Event").with("at", &date), SkipKeys::Object)
        .unwrap();
    assert_eq!(value, json!({"at": "2024/02/29"}));

    // A closure that writes nothing produces an empty object.
    let silent = ParseEncoder::new(EncoderOptions {
        date_strategy: DateEncodingStrategy::Custom(Arc::new(
            |_: &DateTime<Utc>, _: &mut SingleValueEncoder<'_>| -> Result<(), ParseError> { Ok(()) },
        )),
        ..EncoderOptions::default()
    });
    let value = silent
        .encode_to_value(&ParseObject::new("Event").with("at", &date), SkipKeys::Object)
        .unwrap();
    assert_eq!(value, json!({"at": {}}));
}

fn attachment_encoder(target: ParseObject) -> ParseEncoder {
    ParseEncoder::new(EncoderOptions {
        data_strategy: DataEncodingStrategy::Custom(Arc::new(
            move |_: &[u8], out: &mut SingleValueEncoder<'_>| -> Result<(), ParseError> {
                out.encode(&target)
            },
        )),
        ..EncoderOptions::default()
    })
}

fn attachment(id: Option<&str>) -> ParseObject {
    let mut object = match id {
        Some(id) => ParseObject::with_id("Attachment", id),
        None => ParseObject::new("Attachment"),
    };
    object.set_node("blob", Node::Bytes(vec![1, 2, 3]));
    object
}

#[test]
fn test_custom_closure_values_join_the_encoding_pass() {
    initialize_logger_once();
    let owner = player("nice");
    let encoder = attachment_encoder(owner.clone());
    let root = attachment(None);

    // Unsaved children written by a closure are collected like any other.
    let first = encoder
        .encode_graph(&root, &EncodeMode::collect(SkipKeys::Object), &SavedIndex::new())
        .unwrap();
    assert_eq!(first.pending_objects, vec![owner.clone()]);
    assert_eq!(to_value(&first.bytes), json!({"blob": {}}));

    let result = encoder.encode(&root, SkipKeys::Object);
    assert!(matches!(result, Err(ParseError::UnresolvedChild(path)) if path == "blob"));

    let mut saved = SavedIndex::new();
    saved
        .record_object(&owner, Pointer::new("Player", "p1"), encoder.options())
        .unwrap();
    let second = encoder
        .encode_graph(&root, &EncodeMode::resolve(SkipKeys::Object), &saved)
        .unwrap();
    assert_eq!(
        to_value(&second.bytes),
        json!({"blob": {"__type": "Pointer", "className": "Player", "objectId": "p1"}})
    );
}

#[test]
fn test_custom_closure_pointing_at_root_is_a_cycle() {
    let encoder = attachment_encoder(ParseObject::with_id("Attachment", "a1"));
    let result = encoder.encode(&attachment(Some("a1")), SkipKeys::Object);
    assert!(matches!(result, Err(ParseError::CircularDependency(path)) if path == "blob"));

    let other = encoder
        .encode_to_value(&attachment(Some("a2")), SkipKeys::Object)
        .unwrap();
    assert_eq!(other["blob"]["objectId"], json!("a1"));
}

#[test]
fn test_top_level_must_be_container() {
    let result = ParseEncoder::default().encode(&42i64, SkipKeys::None);
    assert!(matches!(result, Err(ParseError::EncodingFailure(_))));
    let array = ParseEncoder::default()
        .encode_to_value(&vec![1i64, 2, 3], SkipKeys::None)
        .unwrap();
    assert_eq!(array, json!([1, 2, 3]));
}
