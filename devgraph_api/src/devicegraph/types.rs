//! Basic types for the device graph

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Closed set of device kinds.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceKind {
    /// A physical disk
    Disk,

    /// A multipath device combining several paths to the same disk
    Multipath,

    /// A BIOS RAID assembled by device-mapper
    DmRaid,

    /// A BIOS RAID assembled by the MD subsystem
    MdMember,

    /// A software RAID
    Md,

    /// A block device without a partition table (e.g. Xen virtual partitions)
    StrayBlkDevice,

    /// A partition table
    PartitionTable,

    /// A partition
    Partition,

    /// An LVM physical volume record
    LvmPv,

    /// An LVM volume group
    LvmVg,

    /// An LVM logical volume
    LvmLv,

    /// A bcache device
    Bcache,

    /// A bcache caching set
    BcacheCset,

    /// An encryption layer
    Encryption,

    /// A filesystem on one or more block devices
    BlkFilesystem,

    /// An NFS mount
    Nfs,

    /// Unallocated space. Only produced by queries, never stored in a graph.
    FreeSpace,
}

bitflags::bitflags! {
    /// Bitflags for device kinds
    ///
    /// MUST MATCH THE CONTENTS OF DeviceKind
    #[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct DeviceKindFlag: u32 {
        const Disk = 1;
        const Multipath = 1 << 1;
        const DmRaid = 1 << 2;
        const MdMember = 1 << 3;
        const Md = 1 << 4;
        const StrayBlkDevice = 1 << 5;
        const PartitionTable = 1 << 6;
        const Partition = 1 << 7;
        const LvmPv = 1 << 8;
        const LvmVg = 1 << 9;
        const LvmLv = 1 << 10;
        const Bcache = 1 << 11;
        const BcacheCset = 1 << 12;
        const Encryption = 1 << 13;
        const BlkFilesystem = 1 << 14;
        const Nfs = 1 << 15;
        const FreeSpace = 1 << 16;

        // Groups
        const BiosRaid = Self::DmRaid.bits() | Self::MdMember.bits();
        const Raid = Self::BiosRaid.bits() | Self::Md.bits();
        const DiskDevice = Self::Disk.bits() | Self::Multipath.bits() | Self::BiosRaid.bits();
        const Partitionable = Self::DiskDevice.bits() | Self::Md.bits() | Self::Bcache.bits();
        const BlkDevice = Self::Partitionable.bits()
            | Self::StrayBlkDevice.bits()
            | Self::Partition.bits()
            | Self::LvmLv.bits()
            | Self::Encryption.bits();
        const Filesystem = Self::BlkFilesystem.bits() | Self::Nfs.bits();
    }
}

impl DeviceKind {
    pub fn as_flag(self) -> DeviceKindFlag {
        match self {
            Self::Disk => DeviceKindFlag::Disk,
            Self::Multipath => DeviceKindFlag::Multipath,
            Self::DmRaid => DeviceKindFlag::DmRaid,
            Self::MdMember => DeviceKindFlag::MdMember,
            Self::Md => DeviceKindFlag::Md,
            Self::StrayBlkDevice => DeviceKindFlag::StrayBlkDevice,
            Self::PartitionTable => DeviceKindFlag::PartitionTable,
            Self::Partition => DeviceKindFlag::Partition,
            Self::LvmPv => DeviceKindFlag::LvmPv,
            Self::LvmVg => DeviceKindFlag::LvmVg,
            Self::LvmLv => DeviceKindFlag::LvmLv,
            Self::Bcache => DeviceKindFlag::Bcache,
            Self::BcacheCset => DeviceKindFlag::BcacheCset,
            Self::Encryption => DeviceKindFlag::Encryption,
            Self::BlkFilesystem => DeviceKindFlag::BlkFilesystem,
            Self::Nfs => DeviceKindFlag::Nfs,
            Self::FreeSpace => DeviceKindFlag::FreeSpace,
        }
    }

    /// Returns whether devices of this kind carry the given capability.
    pub fn has(self, capability: Capability) -> bool {
        capability.kinds().contains(self.as_flag())
    }

    /// Returns whether the kind can be stored as a node.
    pub fn is_storable(self) -> bool {
        self != Self::FreeSpace
    }
}

/// Capability sets that devices of several kinds share.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    /// Has a kernel name and a size.
    BlkDevice,

    /// Can hold a partition table.
    Partitionable,

    /// Is composed of member devices.
    Raid,

    /// RAID set up by the firmware.
    BiosRaid,

    /// RAID set up by the operating system.
    SoftwareRaid,

    /// Disk-like device a user would pick to install on.
    DiskDevice,

    /// Holds files.
    Filesystem,

    /// Can be given a mount point.
    Mountable,

    /// Its size can be changed in place.
    Resizable,

    /// Container referenced by name, not by a device node.
    NamedContainer,
}

impl Capability {
    /// Kinds carrying this capability.
    pub fn kinds(self) -> DeviceKindFlag {
        match self {
            Self::BlkDevice => DeviceKindFlag::BlkDevice,
            Self::Partitionable => DeviceKindFlag::Partitionable,
            Self::Raid => DeviceKindFlag::Raid,
            Self::BiosRaid => DeviceKindFlag::BiosRaid,
            Self::SoftwareRaid => DeviceKindFlag::Md,
            Self::DiskDevice => DeviceKindFlag::DiskDevice,
            Self::Filesystem | Self::Mountable => DeviceKindFlag::Filesystem,
            Self::Resizable => {
                DeviceKindFlag::Partition
                    | DeviceKindFlag::LvmLv
                    | DeviceKindFlag::Encryption
                    | DeviceKindFlag::Bcache
            }
            Self::NamedContainer => DeviceKindFlag::LvmVg,
        }
    }
}

/// RAID levels.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum RaidLevel {
    Raid0,
    Raid1,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
}

/// Partition table formats.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum PartitionTableType {
    Gpt,
    Msdos,
}

/// Role of a partition inside its table.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum PartitionType {
    #[default]
    Primary,
    Extended,
    Logical,
}

/// Filesystem types.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum FileSystemType {
    Btrfs,
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Vfat,
    Ntfs,
    Swap,
}

impl FileSystemType {
    /// Whether a single filesystem of this type can span several devices.
    pub fn supports_multiple_devices(self) -> bool {
        matches!(self, Self::Btrfs)
    }
}

/// Bcache cache modes.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Writethrough,
    Writeback,
    Writearound,
    None,
}

/// Encryption formats.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum EncryptionType {
    Luks1,
    #[default]
    Luks2,
    Plain,
}

/// How a disk is attached to the machine.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "String", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum DiskTransport {
    #[default]
    Unknown,
    Sata,
    Nvme,
    Usb,
    Iscsi,
    Fcoe,
}

impl DiskTransport {
    /// Whether the disk is reached over the network.
    pub fn is_network(self) -> bool {
        matches!(self, Self::Iscsi | Self::Fcoe)
    }
}

/// Implements the string conversions the enums above are (de)serialized
/// through, based on their strum names.
macro_rules! impl_string_conversions {
    ($($kind:ident),* $(,)?) => {
        $(
            impl From<$kind> for String {
                fn from(value: $kind) -> Self {
                    let name: &'static str = value.into();
                    name.to_string()
                }
            }

            impl TryFrom<String> for $kind {
                type Error = String;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    value
                        .parse()
                        .map_err(|_| format!("Invalid {}: '{value}'", stringify!($kind)))
                }
            }
        )*
    };
}

impl_string_conversions!(
    DeviceKind,
    Capability,
    RaidLevel,
    PartitionTableType,
    PartitionType,
    FileSystemType,
    CacheMode,
    EncryptionType,
    DiskTransport,
);

pub trait BitFlagsBackingEnumVec<T>: bitflags::Flags
where
    T: Display,
{
    fn backing_enum_vec(self) -> Vec<T>;

    fn user_readable(self) -> String {
        if self.is_empty() {
            return "(none)".into();
        }

        self.backing_enum_vec()
            .iter()
            .map(|kind| kind.to_string())
            .collect::<Vec<String>>()
            .join(" or ")
    }
}

/// Convert a DeviceKindFlag to a vector of DeviceKind.
impl BitFlagsBackingEnumVec<DeviceKind> for DeviceKindFlag {
    fn backing_enum_vec(self) -> Vec<DeviceKind> {
        self.iter()
            .map(|kind| match kind {
                DeviceKindFlag::Disk => DeviceKind::Disk,
                DeviceKindFlag::Multipath => DeviceKind::Multipath,
                DeviceKindFlag::DmRaid => DeviceKind::DmRaid,
                DeviceKindFlag::MdMember => DeviceKind::MdMember,
                DeviceKindFlag::Md => DeviceKind::Md,
                DeviceKindFlag::StrayBlkDevice => DeviceKind::StrayBlkDevice,
                DeviceKindFlag::PartitionTable => DeviceKind::PartitionTable,
                DeviceKindFlag::Partition => DeviceKind::Partition,
                DeviceKindFlag::LvmPv => DeviceKind::LvmPv,
                DeviceKindFlag::LvmVg => DeviceKind::LvmVg,
                DeviceKindFlag::LvmLv => DeviceKind::LvmLv,
                DeviceKindFlag::Bcache => DeviceKind::Bcache,
                DeviceKindFlag::BcacheCset => DeviceKind::BcacheCset,
                DeviceKindFlag::Encryption => DeviceKind::Encryption,
                DeviceKindFlag::BlkFilesystem => DeviceKind::BlkFilesystem,
                DeviceKindFlag::Nfs => DeviceKind::Nfs,
                DeviceKindFlag::FreeSpace => DeviceKind::FreeSpace,
                _ => unreachable!("Invalid device kind flag: {:?}", kind),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_backing_enum_device_kind() {
        DeviceKindFlag::all().iter().for_each(|flag| {
            let flag_vec = flag.backing_enum_vec();
            assert_eq!(
                flag_vec.len(),
                1,
                "Flag '{:?}' could not be converted to enum",
                flag
            );
        });
    }

    #[test]
    fn test_flag_roundtrip() {
        for kind in DeviceKind::iter() {
            assert_eq!(kind.as_flag().backing_enum_vec(), vec![kind]);
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DeviceKind::from_str("md-member").unwrap(), DeviceKind::MdMember);
        assert_eq!(
            DeviceKind::from_str("blk-filesystem").unwrap(),
            DeviceKind::BlkFilesystem
        );
        assert!(DeviceKind::from_str("floppy").is_err());
        let name: &'static str = DeviceKind::StrayBlkDevice.into();
        assert_eq!(name, "stray-blk-device");
    }

    #[test]
    fn test_capabilities() {
        assert!(DeviceKind::Disk.has(Capability::Partitionable));
        assert!(DeviceKind::Disk.has(Capability::DiskDevice));
        assert!(DeviceKind::MdMember.has(Capability::BiosRaid));
        assert!(DeviceKind::Md.has(Capability::SoftwareRaid));
        assert!(!DeviceKind::Md.has(Capability::DiskDevice));
        assert!(!DeviceKind::StrayBlkDevice.has(Capability::Resizable));
        assert!(DeviceKind::LvmVg.has(Capability::NamedContainer));
        assert!(!DeviceKind::LvmVg.has(Capability::BlkDevice));
        assert!(DeviceKind::Nfs.has(Capability::Mountable));

        // Only relationship records carry no capability at all.
        let bare: Vec<DeviceKind> = DeviceKind::iter()
            .filter(|kind| Capability::iter().all(|cap| !kind.has(cap)))
            .collect();
        assert_eq!(
            bare,
            vec![
                DeviceKind::PartitionTable,
                DeviceKind::LvmPv,
                DeviceKind::BcacheCset,
                DeviceKind::FreeSpace
            ]
        );
    }

    #[test]
    fn test_user_readable() {
        assert_eq!(
            (DeviceKindFlag::Disk | DeviceKindFlag::Md).user_readable(),
            "disk or md"
        );
        assert_eq!(DeviceKindFlag::empty().user_readable(), "(none)");
    }

    #[test]
    fn test_string_serialization() {
        assert_eq!(
            serde_yaml::to_string(&DeviceKind::BcacheCset).unwrap().trim(),
            "bcache-cset"
        );
        let kind: DeviceKind = serde_yaml::from_str("lvm-vg").unwrap();
        assert_eq!(kind, DeviceKind::LvmVg);
        let err = serde_yaml::from_str::<RaidLevel>("raid7").unwrap_err();
        assert!(err.to_string().contains("Invalid RaidLevel: 'raid7'"));
    }

    #[test]
    fn test_filesystem_types() {
        assert!(FileSystemType::Btrfs.supports_multiple_devices());
        assert!(!FileSystemType::Ext4.supports_multiple_devices());
        assert_eq!(FileSystemType::from_str("xfs").unwrap(), FileSystemType::Xfs);
    }
}
