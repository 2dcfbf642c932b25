//! Shared test utilities for the climate aggregation workspace.
//!
//! - Grid and climate-field generators
//! - Small fixtures: square polygons, hierarchy nodes, unit grids
//! - [`SyntheticWorld`], a complete on-disk input tree with known answers
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../../crates/test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod world;

pub use fixtures::*;
pub use generators::*;
pub use world::SyntheticWorld;
