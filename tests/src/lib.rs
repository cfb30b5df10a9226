//! # Plugin Bridge Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # Runtime + client over one in-memory bus
//! └── integration/
//!     ├── flows.rs       # Call round trips, timeouts, channel tokens
//!     ├── streams.rs     # Stream lifecycle and epochs
//!     └── isolation.rs   # Failure isolation and backpressure
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bridge-tests
//! cargo test -p bridge-tests integration::streams::
//! cargo bench -p bridge-tests
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod fixtures;
pub mod integration;
