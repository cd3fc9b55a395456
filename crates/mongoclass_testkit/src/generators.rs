//! Property-based test generators.
//!
//! Strategies for generating records and filters with proptest.

use crate::fixtures::{NameInformation, Position, Profile};
use proptest::prelude::*;

/// Generates a coordinate in `-1000..1000`.
pub fn coordinate_strategy() -> impl Strategy<Value = i64> {
    -1000i64..1000
}

/// Generates a position.
pub fn position_strategy() -> impl Strategy<Value = Position> {
    (
        coordinate_strategy(),
        coordinate_strategy(),
        coordinate_strategy(),
    )
        .prop_map(|(x, y, z)| Position::new(x, y, z))
}

/// Generates up to `max` positions.
pub fn positions_strategy(max: usize) -> impl Strategy<Value = Vec<Position>> {
    prop::collection::vec(position_strategy(), 0..=max)
}

/// Generates a short lowercase name.
pub fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z]{0,11}"
}

/// Generates a profile, with or without a phone number.
pub fn profile_strategy() -> impl Strategy<Value = Profile> {
    (
        name_strategy(),
        name_strategy(),
        prop::option::of("[0-9]{7,10}"),
        prop::sample::select(vec!["US", "KE", "DE", "JP"]),
    )
        .prop_map(|(name, user, phone, country)| Profile {
            email: format!("{user}@example.com"),
            name,
            phone,
            country: country.to_string(),
        })
}

/// Generates first and last names.
pub fn name_information_strategy() -> impl Strategy<Value = NameInformation> {
    (name_strategy(), name_strategy()).prop_map(|(first, last)| NameInformation { first, last })
}

/// Generates a cache page size.
pub fn batch_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=64
}

/// Property test configuration.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn position_in_range(position in position_strategy()) {
            prop_assert!((-1000..1000).contains(&position.x));
            prop_assert!((-1000..1000).contains(&position.y));
            prop_assert!((-1000..1000).contains(&position.z));
        }

        #[test]
        fn profile_email_is_addressable(profile in profile_strategy()) {
            prop_assert!(profile.email.ends_with("@example.com"));
            prop_assert!(!profile.name.is_empty());
        }

        #[test]
        fn batch_size_is_positive(size in batch_size_strategy()) {
            prop_assert!(size >= 1);
        }
    }
}
