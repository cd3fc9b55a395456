//! Lazy cursor behavior through models and the client.

use mongoclass_core::{doc, AnyEntity, Entity, SortOrder};
use mongoclass_testkit::prelude::*;

fn xs<I>(cursor: I) -> Vec<i64>
where
    I: Iterator<Item = mongoclass_core::CoreResult<Entity<Position>>>,
{
    cursor.map(|p| p.unwrap().x).collect()
}

#[test]
fn coordinates_sort_skip_limit() {
    init_tracing();
    let client = TestClient::memory();
    let coordinates = client.coordinates();
    let inserted = client.insert_random_positions(&coordinates, 20);

    let mut expected: Vec<i64> = inserted.iter().map(|p| p.x).collect();
    expected.sort_unstable();

    let all = xs(coordinates.find_classes(doc! {}).unwrap().sort("x", 1));
    assert_eq!(all, expected);

    let window = xs(coordinates
        .find_classes(doc! {})
        .unwrap()
        .sort("x", 1)
        .limit(3)
        .skip(3));
    assert_eq!(window, expected[3..6].to_vec());

    let first: Vec<Position> = coordinates
        .find_classes(doc! {})
        .unwrap()
        .limit(3)
        .map(|p| *p.unwrap().record())
        .collect();
    assert_eq!(first, inserted[..3].to_vec());

    let rest: Vec<Position> = coordinates
        .find_classes(doc! {})
        .unwrap()
        .skip(3)
        .map(|p| *p.unwrap().record())
        .collect();
    assert_eq!(rest.len(), 17);
    assert_eq!(rest, inserted[3..].to_vec());
}

#[test]
fn descending_sort() {
    let client = TestClient::memory();
    let positions = client.positions();
    for x in [3, 1, 2] {
        positions.create_with(Position::new(x, 0, 0), Some(true)).unwrap();
    }
    let found = xs(positions
        .find_classes(doc! {})
        .unwrap()
        .sort("x", SortOrder::Descending));
    assert_eq!(found, vec![3, 2, 1]);
}

#[test]
fn compound_sort() {
    let client = TestClient::memory();
    let positions = client.positions();
    for (x, y) in [(1, 2), (0, 5), (1, 1), (0, 3)] {
        positions.create_with(Position::new(x, y, 0), Some(true)).unwrap();
    }
    let found: Vec<(i64, i64)> = positions
        .find_classes(doc! {})
        .unwrap()
        .sort_by([("x", SortOrder::Ascending), ("y", SortOrder::Descending)])
        .map(|p| {
            let p = p.unwrap();
            (p.x, p.y)
        })
        .collect();
    assert_eq!(found, vec![(0, 5), (0, 3), (1, 2), (1, 1)]);
}

#[test]
fn min_is_inclusive_and_max_exclusive() {
    let client = TestClient::memory();
    let positions = client.positions();
    for x in 0..10 {
        positions.create_with(Position::new(x, 0, 0), Some(true)).unwrap();
    }
    let found = xs(positions
        .find_classes(doc! {})
        .unwrap()
        .min(doc! { "x" => 3 })
        .max(doc! { "x" => 6 })
        .sort("x", 1));
    assert_eq!(found, vec![3, 4, 5]);
}

#[test]
fn where_clause_filters_stored_rows() {
    let client = TestClient::memory();
    let positions = client.positions();
    for x in 0..10 {
        positions.create_with(Position::new(x, x * 2, 0), Some(true)).unwrap();
    }
    let found = xs(positions
        .find_classes(doc! {})
        .unwrap()
        .where_clause(|row| row.get("y").and_then(|y| y.as_integer()).is_some_and(|y| y > 12))
        .sort("x", 1));
    assert_eq!(found, vec![7, 8, 9]);
}

#[test]
fn modifiers_after_iteration_surface_as_error() {
    let client = TestClient::memory();
    let positions = client.positions();
    client.insert_random_positions(&positions, 3);

    let mut cursor = positions.find_classes(doc! {}).unwrap();
    assert!(cursor.next().is_some());
    let mut cursor = cursor.limit(1);
    assert!(cursor.next().expect("pending error").is_err());
}

#[test]
fn close_ends_iteration() {
    let client = TestClient::memory();
    let positions = client.positions();
    client.insert_random_positions(&positions, 5);

    let mut cursor = positions.find_classes(doc! {}).unwrap();
    assert!(cursor.next().is_some());
    cursor.close();
    assert!(cursor.next().is_none());
}

#[test]
fn clone_restarts_from_the_top() {
    let client = TestClient::memory();
    let positions = client.positions();
    for x in 0..4 {
        positions.create_with(Position::new(x, 0, 0), Some(true)).unwrap();
    }
    let mut cursor = positions.find_classes(doc! {}).unwrap().sort("x", 1);
    let first = cursor.next().unwrap().unwrap();
    assert_eq!(first.x, 0);

    let copy = cursor.clone();
    assert_eq!(xs(copy), vec![0, 1, 2, 3]);
    assert_eq!(xs(cursor), vec![1, 2, 3]);
}

#[test]
fn client_finds_by_collection_name() {
    let client = TestClient::memory();
    let coordinates = client.coordinates();
    coordinates.create_with(Position::new(9, 9, 9), Some(true)).unwrap();

    let found = client
        .find_class::<Position>("coordinates", doc! { "x" => 9 }, None)
        .unwrap()
        .unwrap();
    assert_eq!(found.record(), &Position::new(9, 9, 9));

    let any = client
        .find_any("coordinates", doc! {}, Some("mongoclass"))
        .unwrap()
        .unwrap();
    let typed = any
        .as_any()
        .downcast_ref::<Entity<Position>>()
        .expect("registered as Position");
    assert_eq!(typed.z, 9);

    let all: Vec<Box<dyn AnyEntity>> = client
        .find_any_classes("coordinates", doc! {}, None)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(all.len(), 1);
}

#[test]
fn unregistered_collection_fails_to_decode() {
    let client = TestClient::memory();
    let positions = client.positions();
    client.insert_random_positions(&positions, 1);

    let missing = client
        .find_any("position", doc! {}, Some("elsewhere"))
        .unwrap();
    assert!(missing.is_none());

    client
        .driver()
        .insert_one(
            &mongoclass_core::Namespace::new("mongoclass", "unknown"),
            doc! { "x" => 1 },
        )
        .unwrap();
    assert!(client.find_any("unknown", doc! {}, None).is_err());
}
