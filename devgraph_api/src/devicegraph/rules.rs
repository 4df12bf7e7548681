//! # Rule Declarations
//!
//! Per-kind and per-edge structural rules. Generic rules that apply to every
//! device (unique sids and names, no cycles) are covered directly by the
//! graph and the validation module.
//!
//! The rules are declared roughly in the order they are evaluated when an
//! edge is added.

use anyhow::{ensure, Error};

use crate::constants::{DEV_DIRECTORY, DEV_MAPPER_PREFIX};

use super::{
    cardinality::ValidCardinality,
    device::{Device, DeviceDetails},
    edges::{ComponentRole, EdgeKind},
    types::{DeviceKind, DeviceKindFlag},
};

impl EdgeKind {
    /// Kinds allowed at the parent end of the edge.
    pub fn valid_parents(self) -> DeviceKindFlag {
        match self {
            Self::Component(ComponentRole::TableOf) => DeviceKindFlag::Partitionable,
            Self::Component(ComponentRole::PartitionOf) => DeviceKindFlag::PartitionTable,
            Self::Component(ComponentRole::VgOf) => DeviceKindFlag::LvmPv,
            Self::Component(ComponentRole::LvOf) => DeviceKindFlag::LvmVg,
            Self::Component(ComponentRole::CsetOf) => DeviceKindFlag::BcacheCset,
            Self::Component(
                ComponentRole::MemberOf
                | ComponentRole::PvOf
                | ComponentRole::BackingOf
                | ComponentRole::CachingOf,
            )
            | Self::FormattedAs
            | Self::EncryptionOf => DeviceKindFlag::BlkDevice,
        }
    }

    /// Kinds allowed at the child end of the edge.
    pub fn valid_children(self) -> DeviceKindFlag {
        match self {
            Self::Component(ComponentRole::TableOf) => DeviceKindFlag::PartitionTable,
            Self::Component(ComponentRole::PartitionOf) => DeviceKindFlag::Partition,
            Self::Component(ComponentRole::MemberOf) => {
                DeviceKindFlag::Raid | DeviceKindFlag::Multipath
            }
            Self::Component(ComponentRole::PvOf) => DeviceKindFlag::LvmPv,
            Self::Component(ComponentRole::VgOf) => DeviceKindFlag::LvmVg,
            Self::Component(ComponentRole::LvOf) => DeviceKindFlag::LvmLv,
            Self::Component(ComponentRole::BackingOf | ComponentRole::CsetOf) => {
                DeviceKindFlag::Bcache
            }
            Self::Component(ComponentRole::CachingOf) => DeviceKindFlag::BcacheCset,
            Self::FormattedAs => DeviceKindFlag::BlkFilesystem,
            Self::EncryptionOf => DeviceKindFlag::Encryption,
        }
    }

    /// Returns whether the edge makes exclusive use of its parent, i.e. the
    /// parent cannot have any other child through an exclusive edge.
    ///
    /// A partition table holds many partitions, a volume group many logical
    /// volumes and a caching set many bcaches. Every other relationship
    /// consumes the parent.
    pub fn is_exclusive_use(self) -> bool {
        !matches!(
            self,
            Self::Component(
                ComponentRole::PartitionOf | ComponentRole::LvOf | ComponentRole::CsetOf
            )
        )
    }

    /// Maximum number of edges of this kind a single child can have, if
    /// limited.
    pub fn max_per_child(self) -> Option<usize> {
        match self {
            // RAIDs and multipaths have many members, volume groups many
            // physical volumes and btrfs may span many devices.
            Self::Component(ComponentRole::MemberOf | ComponentRole::VgOf) | Self::FormattedAs => {
                None
            }
            _ => Some(1),
        }
    }
}

impl DeviceKind {
    /// Returns the valid number of parents for a device of this kind.
    pub fn valid_parent_count(self) -> ValidCardinality {
        match self {
            // Roots of the graph.
            Self::Disk | Self::StrayBlkDevice | Self::Nfs | Self::FreeSpace => {
                ValidCardinality::new_zero()
            }

            // A volume group exists before any physical volume is added.
            Self::LvmVg => ValidCardinality::new_at_least(0),

            Self::Multipath
            | Self::DmRaid
            | Self::MdMember
            | Self::Md
            | Self::BcacheCset
            | Self::BlkFilesystem => ValidCardinality::new_at_least(1),

            Self::PartitionTable
            | Self::Partition
            | Self::LvmPv
            | Self::LvmLv
            | Self::Encryption => ValidCardinality::new_exact(1),

            // Backing device, caching set or both. A bcache on a caching set
            // alone is a flash-only bcache.
            Self::Bcache => ValidCardinality::new_range(1, 2),
        }
    }

    /// Edge through which the potential orphans of a device of this kind are
    /// found among its parents.
    ///
    /// Once a bcache is gone its caching set may serve nothing else, and once
    /// a volume group is gone its physical volume records are useless. Every
    /// other kind leaves no orphans behind.
    pub fn orphan_edge(self) -> Option<EdgeKind> {
        match self {
            Self::Bcache => Some(EdgeKind::CSET_OF),
            Self::LvmVg => Some(EdgeKind::VG_OF),
            _ => None,
        }
    }

    /// Returns whether devices of this kind must be removed through a
    /// kind-specific remover instead of the generic one.
    pub fn has_specific_remover(self) -> bool {
        matches!(self, Self::Partition | Self::LvmLv)
    }
}

impl Device {
    /// Checks basic context-free attributes of the device.
    ///
    /// Use this function to check attributes that do not depend on the
    /// graph, just simple rules each kind must meet.
    pub(crate) fn basic_check(&self) -> Result<(), Error> {
        let kind = self.kind();
        if kind.as_flag().intersects(DeviceKindFlag::BlkDevice) || kind == DeviceKind::LvmVg {
            let name = self.name().unwrap_or_default();
            ensure!(!name.is_empty(), "A {kind} must have a name");
            ensure!(
                name.starts_with(DEV_DIRECTORY) && name.len() > DEV_DIRECTORY.len() + 1,
                "Name '{name}' is not below {DEV_DIRECTORY}"
            );
        }

        match &self.details {
            DeviceDetails::Partition { region, .. } => {
                ensure!(region.block_size > 0, "Block size must be non-zero");
                ensure!(region.length > 0, "Partition region must not be empty");
                ensure!(
                    region.checked_end_bytes().is_some(),
                    "Partition region {region} ends beyond the addressable range"
                );
            }
            DeviceDetails::LvmVg { extent_size } => {
                ensure!(!extent_size.is_zero(), "Extent size must be non-zero");
            }
            DeviceDetails::Encryption { .. } => {
                ensure!(
                    self.dm_table_name().is_some_and(|name| !name.is_empty()),
                    "Encryption name must be below {DEV_MAPPER_PREFIX}"
                );
            }
            DeviceDetails::Nfs { server, path, .. } => {
                ensure!(!server.is_empty(), "NFS server must not be empty");
                ensure!(path.starts_with('/'), "NFS path '{path}' must be absolute");
            }
            DeviceDetails::BlkFilesystem {
                mount_point: Some(mount_point),
                ..
            } => {
                ensure!(
                    mount_point.starts_with('/') || mount_point == "swap",
                    "Mount point '{mount_point}' must be absolute"
                );
            }
            _ => (),
        }

        Ok(())
    }
}
