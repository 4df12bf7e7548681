use crate::{
    constants::{DEV_DIRECTORY, DEV_MAPPER_PREFIX},
    primitives::{bytes::ByteCount, region::Region},
    Sid,
};

use super::types::{
    CacheMode, Capability, DeviceKind, DiskTransport, EncryptionType, FileSystemType,
    PartitionTableType, PartitionType, RaidLevel,
};

/// A node of the devicegraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub(crate) sid: Sid,

    /// Kernel name (e.g. "/dev/sda1") or container name (e.g. "/dev/system"
    /// for a volume group). Devices such as filesystems or partition tables
    /// have none.
    pub(crate) name: Option<String>,

    /// Udev links pointing at the device, relative to nothing (full paths).
    pub(crate) udev_names: Vec<String>,

    pub(crate) details: DeviceDetails,
}

/// Kind-specific attributes of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceDetails {
    Disk {
        size: ByteCount,
        transport: DiskTransport,
    },
    Multipath {
        size: ByteCount,
    },
    DmRaid {
        size: ByteCount,
    },
    MdMember {
        size: ByteCount,
        level: RaidLevel,
    },
    Md {
        size: ByteCount,
        level: RaidLevel,
    },
    StrayBlkDevice {
        size: ByteCount,
    },
    PartitionTable {
        table_type: PartitionTableType,
    },
    Partition {
        region: Region,
        partition_type: PartitionType,
    },
    LvmPv,
    LvmVg {
        extent_size: ByteCount,
    },
    LvmLv {
        size: ByteCount,
    },
    Bcache {
        size: ByteCount,
        cache_mode: CacheMode,
    },
    BcacheCset {
        uuid: Option<String>,
    },
    Encryption {
        size: ByteCount,
        encryption_type: EncryptionType,
        /// Name given to the device in /etc/crypttab, when it differs from
        /// the probed device-mapper name.
        crypttab_name: Option<String>,
    },
    BlkFilesystem {
        fs_type: FileSystemType,
        label: Option<String>,
        uuid: Option<String>,
        mount_point: Option<String>,
    },
    Nfs {
        server: String,
        path: String,
        mount_point: Option<String>,
    },
}

impl DeviceDetails {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Disk { .. } => DeviceKind::Disk,
            Self::Multipath { .. } => DeviceKind::Multipath,
            Self::DmRaid { .. } => DeviceKind::DmRaid,
            Self::MdMember { .. } => DeviceKind::MdMember,
            Self::Md { .. } => DeviceKind::Md,
            Self::StrayBlkDevice { .. } => DeviceKind::StrayBlkDevice,
            Self::PartitionTable { .. } => DeviceKind::PartitionTable,
            Self::Partition { .. } => DeviceKind::Partition,
            Self::LvmPv => DeviceKind::LvmPv,
            Self::LvmVg { .. } => DeviceKind::LvmVg,
            Self::LvmLv { .. } => DeviceKind::LvmLv,
            Self::Bcache { .. } => DeviceKind::Bcache,
            Self::BcacheCset { .. } => DeviceKind::BcacheCset,
            Self::Encryption { .. } => DeviceKind::Encryption,
            Self::BlkFilesystem { .. } => DeviceKind::BlkFilesystem,
            Self::Nfs { .. } => DeviceKind::Nfs,
        }
    }

    /// Shorthand for a new disk on an unknown transport.
    pub fn disk(size: ByteCount) -> Self {
        Self::Disk {
            size,
            transport: DiskTransport::Unknown,
        }
    }

    /// Shorthand for a new filesystem without label, uuid or mount point.
    pub fn filesystem(fs_type: FileSystemType) -> Self {
        Self::BlkFilesystem {
            fs_type,
            label: None,
            uuid: None,
            mount_point: None,
        }
    }
}

impl Device {
    pub(crate) fn new(sid: Sid, name: Option<String>, details: DeviceDetails) -> Self {
        Self {
            sid,
            name,
            udev_names: Vec::new(),
            details,
        }
    }

    pub fn sid(&self) -> Sid {
        self.sid
    }

    pub fn kind(&self) -> DeviceKind {
        self.details.kind()
    }

    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn udev_names(&self) -> &[String] {
        &self.udev_names
    }

    /// Returns whether the device carries the given capability.
    pub fn is(&self, capability: Capability) -> bool {
        self.kind().has(capability)
    }

    /// Name used for sorting and display. Falls back to a kind-specific
    /// label for devices without a kernel name.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        match &self.details {
            DeviceDetails::PartitionTable { table_type } => {
                let table_type: &'static str = table_type.into();
                table_type.to_string()
            }
            DeviceDetails::BcacheCset { uuid: Some(uuid) } => uuid.clone(),
            DeviceDetails::BlkFilesystem {
                fs_type, label, ..
            } => {
                let fs_type: &'static str = fs_type.into();
                match label {
                    Some(label) => format!("{fs_type} ({label})"),
                    None => fs_type.to_string(),
                }
            }
            DeviceDetails::Nfs { server, path, .. } => format!("{server}:{path}"),
            other => {
                let kind: &'static str = other.kind().into();
                kind.to_string()
            }
        }
    }

    /// Returns a user friendly description of the device suitable for
    /// logging.
    ///
    /// Output examples:
    ///
    /// - `disk '/dev/sda' (sid 42)`
    /// - `blk-filesystem 'ext4' (sid 45)`
    pub fn describe(&self) -> String {
        format!("{} '{}' (sid {})", self.kind(), self.display_name(), self.sid)
    }

    /// Size of block devices. `None` for kinds without an intrinsic size.
    pub fn size(&self) -> Option<ByteCount> {
        match &self.details {
            DeviceDetails::Disk { size, .. }
            | DeviceDetails::Multipath { size }
            | DeviceDetails::DmRaid { size }
            | DeviceDetails::MdMember { size, .. }
            | DeviceDetails::Md { size, .. }
            | DeviceDetails::StrayBlkDevice { size }
            | DeviceDetails::LvmLv { size }
            | DeviceDetails::Bcache { size, .. }
            | DeviceDetails::Encryption { size, .. } => Some(*size),
            DeviceDetails::Partition { region, .. } => Some(region.size()),
            DeviceDetails::PartitionTable { .. }
            | DeviceDetails::LvmPv
            | DeviceDetails::LvmVg { .. }
            | DeviceDetails::BcacheCset { .. }
            | DeviceDetails::BlkFilesystem { .. }
            | DeviceDetails::Nfs { .. } => None,
        }
    }

    /// Sets the size of a resizable device. Returns false when the kind has
    /// no resizable size.
    pub(crate) fn set_size(&mut self, new_size: ByteCount) -> bool {
        match &mut self.details {
            DeviceDetails::LvmLv { size }
            | DeviceDetails::Bcache { size, .. }
            | DeviceDetails::Encryption { size, .. } => {
                *size = new_size;
                true
            }
            DeviceDetails::Partition { region, .. } => {
                *region = region.with_size(new_size);
                true
            }
            _ => false,
        }
    }

    pub fn region(&self) -> Option<&Region> {
        match &self.details {
            DeviceDetails::Partition { region, .. } => Some(region),
            _ => None,
        }
    }

    pub fn mount_point(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::BlkFilesystem { mount_point, .. }
            | DeviceDetails::Nfs { mount_point, .. } => mount_point.as_deref(),
            _ => None,
        }
    }

    /// Sets the mount point of a mountable device. Returns false when the
    /// kind cannot be mounted.
    pub(crate) fn set_mount_point(&mut self, new_mount_point: Option<String>) -> bool {
        match &mut self.details {
            DeviceDetails::BlkFilesystem { mount_point, .. }
            | DeviceDetails::Nfs { mount_point, .. } => {
                *mount_point = new_mount_point;
                true
            }
            _ => false,
        }
    }

    pub fn fs_type(&self) -> Option<FileSystemType> {
        match &self.details {
            DeviceDetails::BlkFilesystem { fs_type, .. } => Some(*fs_type),
            _ => None,
        }
    }

    pub fn fs_uuid(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::BlkFilesystem { uuid, .. } => uuid.as_deref(),
            _ => None,
        }
    }

    pub fn fs_label(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::BlkFilesystem { label, .. } => label.as_deref(),
            _ => None,
        }
    }

    /// Device-mapper table name of an encryption layer, derived from its
    /// kernel name (e.g. "cr_sda4" for "/dev/mapper/cr_sda4").
    pub fn dm_table_name(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::Encryption { .. } => self
                .name
                .as_deref()
                .and_then(|name| name.strip_prefix(DEV_MAPPER_PREFIX)),
            _ => None,
        }
    }

    pub fn crypttab_name(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::Encryption { crypttab_name, .. } => crypttab_name.as_deref(),
            _ => None,
        }
    }

    /// Volume group name without the /dev prefix.
    pub fn vg_name(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::LvmVg { .. } => self
                .name
                .as_deref()
                .and_then(|name| name.strip_prefix(DEV_DIRECTORY))
                .map(|name| name.trim_start_matches('/')),
            _ => None,
        }
    }

    /// Returns whether two devices carry the same kind, name and attributes,
    /// regardless of their sids and udev names.
    pub fn same_attributes(&self, other: &Device) -> bool {
        self.name == other.name && self.details == other.details
    }
}
