//! End-to-end model operations over the in-memory driver.

use mongoclass_core::{
    doc, CoreError, InsertClassesOptions, Insertable, MappingError, SaveOutcome, UpdateOptions,
    Value, ID_FIELD,
};
use mongoclass_testkit::prelude::*;

#[test]
fn position_round_trip() {
    init_tracing();
    let client = TestClient::memory();
    let positions = client.positions();
    assert_eq!(positions.collection(), "position");
    assert_eq!(positions.database(), "mongoclass");

    let mut position = positions.entity(Position::new(1, 2, 3));
    assert!(!position.is_persisted());
    positions.insert(&mut position).unwrap();
    assert!(position.is_persisted());

    let found = positions
        .find_class(doc! { "x" => 1 })
        .unwrap()
        .expect("position should be stored");
    assert_eq!(found.record(), &Position::new(1, 2, 3));
    assert_eq!(found.identifier(), position.identifier());
}

#[test]
fn create_respects_insert_on_init() {
    let client = TestClient::memory();
    let eager = client.client.model_with::<Position>(
        mongoclass_core::ModelOptions::new()
            .collection("eager")
            .insert_on_init(true),
    );
    let lazy = client.positions();

    let stored = eager.create(Position::new(1, 1, 1)).unwrap();
    assert!(stored.is_persisted());
    let pending = lazy.create(Position::new(1, 1, 1)).unwrap();
    assert!(!pending.is_persisted());

    let overridden = lazy.create_with(Position::new(2, 2, 2), Some(true)).unwrap();
    assert!(overridden.is_persisted());
    assert_eq!(lazy.count_documents(doc! {}).unwrap(), 1);
}

#[test]
fn update_returns_new_state() {
    let client = TestClient::memory();
    let profiles = client.profiles();
    let mut profile = profiles
        .create_with(Profile::new("Ada", "ada@example.com"), Some(true))
        .unwrap();
    assert_eq!(profile.country, "US");

    let (outcome, current) = profiles
        .update(&mut profile, doc! { "$set" => doc! { "country" => "KE" } })
        .unwrap();
    assert_eq!(outcome.matched_count, 1);
    assert_eq!(current.country, "KE");
    assert_eq!(current.identifier(), profile.identifier());
    // The caller's copy is untouched.
    assert_eq!(profile.country, "US");
}

#[test]
fn update_without_return_new_keeps_local_copy() {
    let client = TestClient::memory();
    let profiles = client.profiles();
    let mut profile = profiles
        .create_with(Profile::new("Ada", "ada@example.com"), Some(true))
        .unwrap();

    let (_, current) = profiles
        .update_with(
            &mut profile,
            doc! { "$set" => doc! { "country" => "DE" } },
            UpdateOptions::new().return_new(false),
        )
        .unwrap();
    assert_eq!(current.country, "US");

    let stored = profiles.find_class(doc! {}).unwrap().unwrap();
    assert_eq!(stored.country, "DE");
}

#[test]
fn update_upsert_assigns_identifier() {
    let client = TestClient::memory();
    let profiles = client.profiles();
    let mut profile = profiles.entity(Profile::new("Grace", "grace@example.com"));

    let (outcome, current) = profiles
        .update_with(
            &mut profile,
            doc! { "$set" => doc! { "name" => "Grace", "email" => "grace@example.com" } },
            UpdateOptions::new().upsert(true),
        )
        .unwrap();
    assert!(outcome.upserted_id.is_some());
    assert!(profile.is_persisted());
    assert_eq!(current.name, "Grace");
    assert_eq!(profiles.count_documents(doc! {}).unwrap(), 1);
}

#[test]
fn update_of_unpersisted_entity_matches_nothing() {
    let client = TestClient::memory();
    let profiles = client.profiles();
    profiles
        .create_with(Profile::new("Ada", "ada@example.com"), Some(true))
        .unwrap();

    let mut orphan = profiles.entity(Profile::new("Nobody", "nobody@example.com"));
    let (outcome, current) = profiles
        .update(&mut orphan, doc! { "$set" => doc! { "country" => "JP" } })
        .unwrap();
    assert_eq!(outcome.matched_count, 0);
    assert!(!orphan.is_persisted());
    assert_eq!(current.name, "Nobody");
}

#[test]
fn save_inserts_then_updates() {
    let client = TestClient::memory();
    let profiles = client.profiles();
    let mut profile = profiles.entity(Profile::new("Linus", "linus@example.com"));

    let (outcome, _) = profiles.save(&mut profile).unwrap();
    assert!(matches!(outcome, SaveOutcome::Inserted(_)));
    let id = profile.identifier().cloned().unwrap();

    profile.phone = Some("5550100".to_string());
    let (outcome, current) = profiles.save(&mut profile).unwrap();
    assert!(matches!(outcome, SaveOutcome::Updated(_)));
    assert_eq!(current.phone.as_deref(), Some("5550100"));
    assert_eq!(current.identifier(), Some(&id));
    assert_eq!(profiles.count_documents(doc! {}).unwrap(), 1);
}

#[test]
fn delete_removes_row_and_keeps_identifier() {
    let client = TestClient::memory();
    let positions = client.positions();
    let position = positions
        .create_with(Position::new(4, 5, 6), Some(true))
        .unwrap();

    let outcome = positions.delete(&position).unwrap();
    assert_eq!(outcome.deleted_count, 1);
    assert!(position.is_persisted());
    assert_eq!(positions.count_documents(doc! {}).unwrap(), 0);

    let again = positions.delete(&position).unwrap();
    assert_eq!(again.deleted_count, 0);
}

#[test]
fn as_document_omits_identifier() {
    let client = TestClient::memory();
    let positions = client.positions();
    let position = positions
        .create_with(Position::new(7, 8, 9), Some(true))
        .unwrap();

    let document = positions.as_document(&position, None).unwrap();
    assert!(!document.contains_key(ID_FIELD));
    assert_eq!(document.get("x"), Some(&Value::from(7i64)));
    assert_eq!(document.len(), 3);
}

#[test]
fn count_and_paginate() {
    let client = TestClient::memory();
    let positions = client.positions();
    for x in 0..25 {
        positions.create_with(Position::new(x, 0, 0), Some(true)).unwrap();
    }
    assert_eq!(positions.count_documents(doc! {}).unwrap(), 25);
    assert_eq!(
        positions
            .count_documents(doc! { "x" => doc! { "$gte" => 20 } })
            .unwrap(),
        5
    );

    let page = |number| -> Vec<i64> {
        positions
            .paginate_with(number, 10, doc! {}, |cursor| cursor.sort("x", 1))
            .unwrap()
            .map(|p| p.unwrap().x)
            .collect()
    };
    assert_eq!(page(1), (0..10).collect::<Vec<_>>());
    assert_eq!(page(3), (20..25).collect::<Vec<_>>());
    assert_eq!(page(0), page(1));
    assert!(page(4).is_empty());
}

#[test]
fn insert_classes_through_model() {
    let client = TestClient::memory();
    let positions = client.positions();
    let mut batch: Vec<_> = random_positions(4)
        .into_iter()
        .map(|p| positions.entity(p))
        .collect();

    let outcome = positions
        .insert_classes(
            Insertable::Many(&mut batch),
            InsertClassesOptions::new().ordered(false),
        )
        .unwrap();
    assert_eq!(outcome.inserted_ids().len(), 4);
    assert!(batch.iter().all(|p| p.is_persisted()));
    assert_eq!(positions.count_documents(doc! {}).unwrap(), 4);
}

#[test]
fn decoding_wrong_shape_reports_field() {
    let client = TestClient::memory();
    let positions = client.positions();
    client
        .driver()
        .insert_one(positions.namespace(), doc! { "x" => "one", "y" => 2, "z" => 3 })
        .unwrap();

    let err = positions.find_class(doc! {}).unwrap_err();
    match err {
        CoreError::Mapping(MappingError::InvalidField { field, .. }) => assert_eq!(field, "x"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn drop_database_removes_rows() {
    let client = TestClient::memory();
    let positions = client.positions();
    client.insert_random_positions(&positions, 3);
    assert_eq!(client.database_names().unwrap(), vec!["mongoclass".to_string()]);

    client.drop_database("mongoclass").unwrap();
    assert_eq!(positions.count_documents(doc! {}).unwrap(), 0);
    assert!(client.database_names().unwrap().is_empty());
}
