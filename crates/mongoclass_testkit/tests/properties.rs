//! Property-based tests across the model, cursor and cache layers.

use mongoclass_core::{doc, SortOrder};
use mongoclass_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn stored_positions_decode_unchanged(position in position_strategy()) {
        let client = TestClient::memory();
        let positions = client.positions();
        let stored = positions.create_with(position, Some(true)).unwrap();

        let found = positions
            .find_class(doc! { "_id" => stored.identifier().cloned().unwrap() })
            .unwrap()
            .unwrap();
        prop_assert_eq!(found.record(), &position);
    }

    #[test]
    fn profiles_survive_storage(profile in profile_strategy()) {
        let client = TestClient::memory();
        let profiles = client.profiles();
        profiles.create_with(profile.clone(), Some(true)).unwrap();

        let found = profiles.find_class(doc! {}).unwrap().unwrap();
        prop_assert_eq!(found.into_record(), profile);
    }

    #[test]
    fn cursor_sort_matches_local_sort(batch in positions_strategy(30), descending in any::<bool>()) {
        let client = TestClient::memory();
        let positions = client.positions();
        for position in &batch {
            positions.create_with(*position, Some(true)).unwrap();
        }

        let order = if descending { SortOrder::Descending } else { SortOrder::Ascending };
        let found: Vec<i64> = positions
            .find_classes(doc! {})
            .unwrap()
            .sort("y", order)
            .map(|p| p.unwrap().y)
            .collect();

        let mut expected: Vec<i64> = batch.iter().map(|p| p.y).collect();
        expected.sort_unstable();
        if descending {
            expected.reverse();
        }
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn pages_partition_the_collection(
        batch in positions_strategy(40),
        page_size in 1usize..10,
    ) {
        let client = TestClient::memory();
        let positions = client.positions();
        for position in &batch {
            positions.create_with(*position, Some(true)).unwrap();
        }

        let pages = batch.len().div_ceil(page_size) + 1;
        let mut seen = Vec::new();
        for page in 1..=pages {
            let rows: Vec<Position> = positions
                .paginate(page, page_size, doc! {})
                .unwrap()
                .map(|p| *p.unwrap().record())
                .collect();
            prop_assert!(rows.len() <= page_size);
            seen.extend(rows);
        }
        prop_assert_eq!(seen, batch);
    }

    #[test]
    fn cache_paging_is_batch_size_independent(
        batch in positions_strategy(40),
        batch_size in batch_size_strategy(),
    ) {
        let client = TestClient::memory();
        let positions = client.positions();
        for position in &batch {
            positions.create_with(*position, Some(true)).unwrap();
        }
        let (cache, _, _) = instrumented_cache();
        prop_assert_eq!(cache.cache(&positions).unwrap(), batch.len());

        let cached: Vec<Position> = cache
            .get_cached_in_batches(&positions, batch_size)
            .unwrap()
            .map(|p| *p.unwrap().record())
            .collect();
        prop_assert_eq!(cached, batch);
    }

    #[test]
    fn nested_names_round_trip(name in name_information_strategy(), email in name_strategy()) {
        let client = TestClient::memory();
        let models = client.nested_models();
        let mut user = models.user(&email, &name.first, &name.last);
        models.users.insert(&mut user).unwrap();

        let found = models.users.find_class(doc! {}).unwrap().unwrap();
        prop_assert_eq!(found.metadata.name.record(), &name);
        prop_assert_eq!(&found.email, &email);
    }
}
