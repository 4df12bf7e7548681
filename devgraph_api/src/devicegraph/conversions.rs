//! Conversions between devices and document entries.

use super::{
    device::{Device, DeviceDetails},
    document::DeviceEntry,
    error::DevicegraphError,
    types::DeviceKind,
};

/// Get a DeviceEntry from a Device reference.
impl From<&Device> for DeviceEntry {
    fn from(device: &Device) -> Self {
        let mut entry = DeviceEntry::new(device.sid(), device.kind(), device.name());
        entry.udev_names = device.udev_names().to_vec();

        match device.details() {
            DeviceDetails::Disk { size, transport } => {
                entry.size = Some(*size);
                entry.transport = Some(*transport);
            }
            DeviceDetails::Multipath { size }
            | DeviceDetails::DmRaid { size }
            | DeviceDetails::StrayBlkDevice { size }
            | DeviceDetails::LvmLv { size } => entry.size = Some(*size),
            DeviceDetails::MdMember { size, level } | DeviceDetails::Md { size, level } => {
                entry.size = Some(*size);
                entry.level = Some(*level);
            }
            DeviceDetails::PartitionTable { table_type } => entry.table_type = Some(*table_type),
            DeviceDetails::Partition {
                region,
                partition_type,
            } => {
                entry.region = Some(*region);
                entry.partition_type = Some(*partition_type);
            }
            DeviceDetails::LvmPv => (),
            DeviceDetails::LvmVg { extent_size } => entry.extent_size = Some(*extent_size),
            DeviceDetails::Bcache { size, cache_mode } => {
                entry.size = Some(*size);
                entry.cache_mode = Some(*cache_mode);
            }
            DeviceDetails::BcacheCset { uuid } => entry.uuid = uuid.clone(),
            DeviceDetails::Encryption {
                size,
                encryption_type,
                crypttab_name,
            } => {
                entry.size = Some(*size);
                entry.encryption_type = Some(*encryption_type);
                entry.crypttab_name = crypttab_name.clone();
            }
            DeviceDetails::BlkFilesystem {
                fs_type,
                label,
                uuid,
                mount_point,
            } => {
                entry.fs_type = Some(*fs_type);
                entry.label = label.clone();
                entry.uuid = uuid.clone();
                entry.mount_point = mount_point.clone();
            }
            DeviceDetails::Nfs {
                server,
                path,
                mount_point,
            } => {
                entry.server = Some(server.clone());
                entry.path = Some(path.clone());
                entry.mount_point = mount_point.clone();
            }
        }

        entry
    }
}

/// Get a Device from a DeviceEntry reference.
///
/// Fails with `InvalidArgument` when an attribute the kind needs is missing.
/// Attributes that do not apply to the kind are ignored.
impl TryFrom<&DeviceEntry> for Device {
    type Error = DevicegraphError;

    fn try_from(entry: &DeviceEntry) -> Result<Self, Self::Error> {
        let details = match entry.kind {
            DeviceKind::Disk => DeviceDetails::Disk {
                size: required(entry, entry.size, "size")?,
                transport: entry.transport.unwrap_or_default(),
            },
            DeviceKind::Multipath => DeviceDetails::Multipath {
                size: required(entry, entry.size, "size")?,
            },
            DeviceKind::DmRaid => DeviceDetails::DmRaid {
                size: required(entry, entry.size, "size")?,
            },
            DeviceKind::MdMember => DeviceDetails::MdMember {
                size: required(entry, entry.size, "size")?,
                level: required(entry, entry.level, "level")?,
            },
            DeviceKind::Md => DeviceDetails::Md {
                size: required(entry, entry.size, "size")?,
                level: required(entry, entry.level, "level")?,
            },
            DeviceKind::StrayBlkDevice => DeviceDetails::StrayBlkDevice {
                size: required(entry, entry.size, "size")?,
            },
            DeviceKind::PartitionTable => DeviceDetails::PartitionTable {
                table_type: required(entry, entry.table_type, "table-type")?,
            },
            DeviceKind::Partition => DeviceDetails::Partition {
                region: required(entry, entry.region, "region")?,
                partition_type: entry.partition_type.unwrap_or_default(),
            },
            DeviceKind::LvmPv => DeviceDetails::LvmPv,
            DeviceKind::LvmVg => DeviceDetails::LvmVg {
                extent_size: required(entry, entry.extent_size, "extent-size")?,
            },
            DeviceKind::LvmLv => DeviceDetails::LvmLv {
                size: required(entry, entry.size, "size")?,
            },
            DeviceKind::Bcache => DeviceDetails::Bcache {
                size: required(entry, entry.size, "size")?,
                cache_mode: entry.cache_mode.unwrap_or_default(),
            },
            DeviceKind::BcacheCset => DeviceDetails::BcacheCset {
                uuid: entry.uuid.clone(),
            },
            DeviceKind::Encryption => DeviceDetails::Encryption {
                size: required(entry, entry.size, "size")?,
                encryption_type: entry.encryption_type.unwrap_or_default(),
                crypttab_name: entry.crypttab_name.clone(),
            },
            DeviceKind::BlkFilesystem => DeviceDetails::BlkFilesystem {
                fs_type: required(entry, entry.fs_type, "fs-type")?,
                label: entry.label.clone(),
                uuid: entry.uuid.clone(),
                mount_point: entry.mount_point.clone(),
            },
            DeviceKind::Nfs => DeviceDetails::Nfs {
                server: required(entry, entry.server.clone(), "server")?,
                path: required(entry, entry.path.clone(), "path")?,
                mount_point: entry.mount_point.clone(),
            },
            DeviceKind::FreeSpace => {
                return Err(DevicegraphError::invalid_argument(
                    entry.describe(),
                    "free space is derived and cannot be stored",
                ))
            }
        };

        let mut device = Device::new(entry.sid, entry.name.clone(), details);
        device.udev_names = entry.udev_names.clone();
        Ok(device)
    }
}

/// Unwraps an attribute the kind of the entry cannot do without.
fn required<T>(entry: &DeviceEntry, value: Option<T>, attribute: &str) -> Result<T, DevicegraphError> {
    value.ok_or_else(|| {
        DevicegraphError::invalid_argument(
            entry.describe(),
            format!("missing attribute '{attribute}' for kind '{}'", entry.kind),
        )
    })
}
