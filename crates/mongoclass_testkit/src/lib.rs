//! # mongoclass testkit
//!
//! Test utilities for mongoclass.
//!
//! This crate provides:
//! - Record fixtures covering flat, defaulted, nested and self-referential
//!   shapes
//! - In-memory client and cache helpers
//! - Property-based test generators using proptest
//! - A lock that records how many callers held it at once
//!
//! ## Usage
//!
//! ```rust
//! use mongoclass_core::doc;
//! use mongoclass_testkit::prelude::*;
//!
//! let client = TestClient::memory();
//! let positions = client.positions();
//! client.insert_random_positions(&positions, 3);
//! assert_eq!(positions.count_documents(doc! {}).unwrap(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod instrumented;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::instrumented::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;
pub use instrumented::*;

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, writing to the
/// test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
