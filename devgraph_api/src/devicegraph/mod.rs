//! # Devicegraph
//!
//! A devicegraph is one snapshot of a storage configuration: devices are
//! nodes, and edges point from a device to the devices built on top of it
//! (parent -> child). Snapshots are independent values; duplicating one never
//! affects another, but copies of the same lineage share the sid allocator so
//! that devices created in different copies never collide.
//!
//! In broad terms, this module is used as follows:
//!
//! 1. Obtain a `Devicegraph`, either by loading a document (`document.rs`,
//!    which goes through `DevicegraphBuilder`) or by creating devices with
//!    the constructors in `constructors.rs`.
//! 2. Query it through the registry (`registry.rs`, `dependencies.rs`) and
//!    resolve device names (`lookup.rs`).
//! 3. Mutate a working copy: create devices, remove them with their whole
//!    cascade (`removal.rs`).
//! 4. Diff the original snapshot against the working copy to get an ordered
//!    action plan (`actions`).
//!
//! Structural rules (which edges may connect which kinds, how many parents a
//! device needs, exclusive use) live in `rules.rs` and are enforced both when
//! building and on every edge insertion.
//!
//! ## Layout
//!
//! ```text
//! devgraph_api/src/devicegraph
//! ├── actions --------------> # Action diff engine.
//! │   ├── mod.rs -----------> # Action & Actiongraph types.
//! │   ├── diff.rs ----------> # Computing and ordering actions.
//! │   └── apply.rs ---------> # Replaying actions onto a snapshot.
//! ├── builder.rs -----------> # DevicegraphBuilder, validating construction.
//! ├── cardinality.rs -------> # Helper expressing cardinality rules.
//! ├── constructors.rs ------> # Convenience constructors for new devices.
//! ├── conversions.rs -------> # Document entries <-> devices.
//! ├── crypttab.rs ----------> # Crypttab parsing & alternative names.
//! ├── dependencies.rs ------> # Descendants, ancestors & potential orphans.
//! ├── device.rs ------------> # Device & kind-specific details.
//! ├── display.rs -----------> # fmt::Display implementations.
//! ├── document.rs ----------> # XML/YAML document format.
//! ├── edges.rs -------------> # Edge kinds.
//! ├── error.rs -------------> # Error types.
//! ├── graph.rs -------------> # Devicegraph & basic mutations.
//! ├── lookup.rs ------------> # Name resolution.
//! ├── mod.rs ---------------> # This file.
//! ├── registry.rs ----------> # Typed queries.
//! ├── removal.rs -----------> # Cascading removal.
//! ├── rules.rs -------------> # Per-kind structural rules.
//! ├── sort.rs --------------> # Name-aware ordering.
//! ├── tree.rs --------------> # Deterministic tree rendering.
//! ├── types.rs -------------> # Kinds, capabilities & attribute enums.
//! └── validation.rs --------> # Whole-graph integrity checks.
//! ```

// The graph and its building blocks.
pub mod device;
pub mod edges;
pub mod graph;
pub mod types;

// Rules & rule helpers.
pub mod cardinality;
pub mod rules;
pub(crate) mod validation;

// Queries.
pub mod dependencies;
pub mod registry;
pub mod sort;

// Mutations.
pub mod constructors;
pub mod removal;

// Name resolution.
pub mod crypttab;
pub mod lookup;

// Diffing.
pub mod actions;

// Load/save & rendering.
pub(crate) mod builder;
pub(crate) mod conversions;
pub mod document;
pub mod tree;

// Implementations of fmt::Display for the types in this module.
pub mod display;

pub mod error;

#[cfg(test)]
pub(crate) mod test_utils;
