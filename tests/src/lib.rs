//! # Typed Bus Test Suite
//!
//! End-to-end tests driving publishers and dispatchers through a shared
//! in-memory store.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs            # Shared message types and waiting helpers
//!     ├── scenarios.rs          # Publish/dispatch flows and drop paths
//!     ├── failure_isolation.rs  # Failing and panicking handlers
//!     └── concurrency.rs        # Parallel publishers and dispatchers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p typed-bus-tests
//! cargo test -p typed-bus-tests integration::scenarios::
//! ```
