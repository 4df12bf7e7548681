//! Edge kinds connecting devices.
//!
//! Edges always point from a parent (the device something is built from) to
//! a child (the device built on top of it).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Sid;

/// Role of a membership edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::EnumIter)]
pub enum ComponentRole {
    /// Partitionable device -> partition table.
    TableOf,

    /// Partition table -> partition.
    PartitionOf,

    /// Block device -> RAID or multipath device it is a member (path) of.
    MemberOf,

    /// Block device -> LVM physical volume record.
    PvOf,

    /// LVM physical volume -> volume group.
    VgOf,

    /// Volume group -> logical volume.
    LvOf,

    /// Block device -> bcache it backs.
    BackingOf,

    /// Block device -> bcache caching set it holds.
    CachingOf,

    /// Bcache caching set -> bcache it caches.
    CsetOf,
}

/// Kind of an edge.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "String", try_from = "String")]
pub enum EdgeKind {
    /// The child is a component built from the parent.
    Component(ComponentRole),

    /// Block device -> filesystem.
    FormattedAs,

    /// Block device -> encryption layer.
    EncryptionOf,
}

impl EdgeKind {
    pub const TABLE_OF: EdgeKind = EdgeKind::Component(ComponentRole::TableOf);
    pub const PARTITION_OF: EdgeKind = EdgeKind::Component(ComponentRole::PartitionOf);
    pub const MEMBER_OF: EdgeKind = EdgeKind::Component(ComponentRole::MemberOf);
    pub const PV_OF: EdgeKind = EdgeKind::Component(ComponentRole::PvOf);
    pub const VG_OF: EdgeKind = EdgeKind::Component(ComponentRole::VgOf);
    pub const LV_OF: EdgeKind = EdgeKind::Component(ComponentRole::LvOf);
    pub const BACKING_OF: EdgeKind = EdgeKind::Component(ComponentRole::BackingOf);
    pub const CACHING_OF: EdgeKind = EdgeKind::Component(ComponentRole::CachingOf);
    pub const CSET_OF: EdgeKind = EdgeKind::Component(ComponentRole::CsetOf);

    /// Every edge kind, in declaration order.
    pub const ALL: [EdgeKind; 11] = [
        Self::TABLE_OF,
        Self::PARTITION_OF,
        Self::MEMBER_OF,
        Self::PV_OF,
        Self::VG_OF,
        Self::LV_OF,
        Self::BACKING_OF,
        Self::CACHING_OF,
        Self::CSET_OF,
        Self::FormattedAs,
        Self::EncryptionOf,
    ];

    /// Name used in documents and messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Component(role) => match role {
                ComponentRole::TableOf => "table-of",
                ComponentRole::PartitionOf => "partition-of",
                ComponentRole::MemberOf => "member-of",
                ComponentRole::PvOf => "pv-of",
                ComponentRole::VgOf => "vg-of",
                ComponentRole::LvOf => "lv-of",
                ComponentRole::BackingOf => "backing-of",
                ComponentRole::CachingOf => "caching-of",
                ComponentRole::CsetOf => "cset-of",
            },
            Self::FormattedAs => "formatted-as",
            Self::EncryptionOf => "encryption-of",
        }
    }

    /// Returns whether this is a membership edge with the given role.
    pub fn is_component_and(self, role: ComponentRole) -> bool {
        self == EdgeKind::Component(role)
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| format!("Invalid edge kind: '{s}'"))
    }
}

impl From<EdgeKind> for String {
    fn from(value: EdgeKind) -> Self {
        value.name().to_string()
    }
}

impl TryFrom<String> for EdgeKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Borrow-free view of an edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub parent: Sid,
    pub child: Sid,
    pub kind: EdgeKind,
}
