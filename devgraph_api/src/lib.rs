//! # devgraph_api
//!
//! In-memory model of a machine's storage stack. Disks, partitions, RAIDs,
//! LVM, bcache, encryption layers and filesystems are kept as nodes of a
//! directed acyclic graph (a `Devicegraph`). The crate provides the queries,
//! the cascading removal rules, name resolution and the diff engine that
//! plans the actions turning one snapshot into another.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod constants;
pub mod devicegraph;
pub mod primitives;

pub use devicegraph::{
    actions::{Action, ActionKind, Actiongraph},
    device::{Device, DeviceDetails},
    document::DevicegraphDocument,
    edges::{ComponentRole, EdgeKind},
    error::{DevicegraphError, IntegrityError},
    graph::Devicegraph,
    lookup::{SystemContext, SystemLookup, UdevLookup},
    types::{Capability, DeviceKind},
};

/// Stable identifier of a device.
///
/// A sid survives duplication of the snapshot that holds the device, so the
/// same conceptual device carries the same sid in every copy of a lineage.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Sid(pub u64);

impl Sid {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Sid {
    fn from(value: u64) -> Self {
        Sid(value)
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Sid {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Sid(s.trim().parse()?))
    }
}
