//! Convenience constructors for new devices.
//!
//! Each constructor adds the device together with the edges to its
//! parents. Either everything is added or, on error, nothing is.

use log::debug;

use crate::{
    constants::{DEV_DIRECTORY, DEV_MAPPER_PREFIX},
    primitives::{bytes::ByteCount, region::Region},
    Sid,
};

use super::{
    device::DeviceDetails,
    edges::EdgeKind,
    error::{pretty_device, DevicegraphError},
    graph::Devicegraph,
    types::{
        CacheMode, DeviceKind, DiskTransport, EncryptionType, FileSystemType, PartitionTableType,
        PartitionType, RaidLevel,
    },
};

impl RaidLevel {
    /// Smallest number of members an array of this level can be built from.
    pub fn min_devices(self) -> usize {
        match self {
            Self::Raid0 | Self::Raid1 | Self::Raid10 => 2,
            Self::Raid4 | Self::Raid5 => 3,
            Self::Raid6 => 4,
        }
    }

    /// Usable size of an array built from members of the given sizes.
    pub fn array_size(self, members: &[ByteCount]) -> ByteCount {
        let count = members.len() as u64;
        let smallest = members.iter().min().copied().unwrap_or_default().bytes();
        ByteCount(match self {
            Self::Raid0 => members.iter().map(|size| size.bytes()).sum(),
            Self::Raid1 => smallest,
            Self::Raid4 | Self::Raid5 => smallest * count.saturating_sub(1),
            Self::Raid6 => smallest * count.saturating_sub(2),
            Self::Raid10 => smallest * count / 2,
        })
    }
}

impl Devicegraph {
    pub fn create_disk(&mut self, name: &str, size: ByteCount) -> Result<Sid, DevicegraphError> {
        self.create(Some(name), DeviceDetails::disk(size), &[])
    }

    pub fn create_disk_with_transport(
        &mut self,
        name: &str,
        size: ByteCount,
        transport: DiskTransport,
    ) -> Result<Sid, DevicegraphError> {
        self.create(Some(name), DeviceDetails::Disk { size, transport }, &[])
    }

    pub fn create_stray_blk_device(
        &mut self,
        name: &str,
        size: ByteCount,
    ) -> Result<Sid, DevicegraphError> {
        self.create(Some(name), DeviceDetails::StrayBlkDevice { size }, &[])
    }

    pub fn create_partition_table(
        &mut self,
        device: Sid,
        table_type: PartitionTableType,
    ) -> Result<Sid, DevicegraphError> {
        self.create(
            None,
            DeviceDetails::PartitionTable { table_type },
            &[(device, EdgeKind::TABLE_OF)],
        )
    }

    /// Adds a partition to a partition table.
    ///
    /// The region must fit in the device holding the table and must not
    /// overlap other partitions. Logical partitions must sit inside the
    /// extended partition, and only overlap it.
    pub fn create_partition(
        &mut self,
        table: Sid,
        name: &str,
        region: Region,
        partition_type: PartitionType,
    ) -> Result<Sid, DevicegraphError> {
        let table_device = self.try_find(table)?;
        let invalid = |reason: String| DevicegraphError::invalid_argument(format!("'{name}'"), reason);

        if table_device.kind() != DeviceKind::PartitionTable {
            return Err(invalid(format!(
                "{} is not a partition table",
                pretty_device(table_device)
            )));
        }

        if let Some(size) = self
            .parents(table)
            .first()
            .and_then(|device| device.size())
        {
            if region.end_bytes() > size {
                return Err(invalid(format!(
                    "region {region} ends after the end of the device ({size})"
                )));
            }
        }

        let siblings: Vec<(Region, PartitionType)> = self
            .children_by_edge(table, EdgeKind::PARTITION_OF)
            .iter()
            .filter_map(|partition| match partition.details() {
                DeviceDetails::Partition {
                    region,
                    partition_type,
                } => Some((*region, *partition_type)),
                _ => None,
            })
            .collect();

        let extended = siblings
            .iter()
            .find(|(_, partition_type)| *partition_type == PartitionType::Extended)
            .map(|(region, _)| *region);

        match partition_type {
            PartitionType::Logical => {
                let Some(extended) = extended else {
                    return Err(invalid("there is no extended partition".into()));
                };
                if region.start_bytes() < extended.start_bytes()
                    || region.end_bytes() > extended.end_bytes()
                {
                    return Err(invalid(format!(
                        "region {region} is not inside the extended partition"
                    )));
                }
            }
            PartitionType::Extended if extended.is_some() => {
                return Err(invalid("there is already an extended partition".into()));
            }
            _ => (),
        }

        let is_logical = partition_type == PartitionType::Logical;
        if let Some((other, _)) = siblings.iter().find(|(other, other_type)| {
            (*other_type == PartitionType::Logical) == is_logical && other.overlaps(&region)
        }) {
            return Err(invalid(format!(
                "region {region} overlaps another partition at {other}"
            )));
        }

        self.create(
            Some(name),
            DeviceDetails::Partition {
                region,
                partition_type,
            },
            &[(table, EdgeKind::PARTITION_OF)],
        )
    }

    /// Creates a software RAID from the given members. Its size is derived
    /// from the level and the member sizes.
    pub fn create_md(
        &mut self,
        name: &str,
        level: RaidLevel,
        members: &[Sid],
    ) -> Result<Sid, DevicegraphError> {
        if members.len() < level.min_devices() {
            return Err(DevicegraphError::invalid_argument(
                format!("'{name}'"),
                format!(
                    "{level} needs at least {} devices, got {}",
                    level.min_devices(),
                    members.len()
                ),
            ));
        }

        let sizes = members
            .iter()
            .map(|sid| Ok(self.try_find(*sid)?.size().unwrap_or_default()))
            .collect::<Result<Vec<_>, DevicegraphError>>()?;

        let parents: Vec<(Sid, EdgeKind)> = members
            .iter()
            .map(|sid| (*sid, EdgeKind::MEMBER_OF))
            .collect();
        self.create(
            Some(name),
            DeviceDetails::Md {
                size: level.array_size(&sizes),
                level,
            },
            &parents,
        )
    }

    /// Creates an empty volume group named "/dev/<vg_name>".
    pub fn create_lvm_vg(
        &mut self,
        vg_name: &str,
        extent_size: ByteCount,
    ) -> Result<Sid, DevicegraphError> {
        let name = format!("{DEV_DIRECTORY}/{vg_name}");
        self.create(Some(&name), DeviceDetails::LvmVg { extent_size }, &[])
    }

    /// Turns a block device into a physical volume of the volume group.
    /// Returns the sid of the physical volume.
    pub fn add_lvm_pv(&mut self, vg: Sid, device: Sid) -> Result<Sid, DevicegraphError> {
        self.try_find(vg)?;
        self.try_find(device)?;

        let mut working = self.duplicate();
        let pv = working.create(None, DeviceDetails::LvmPv, &[(device, EdgeKind::PV_OF)])?;
        working.add_edge(pv, vg, EdgeKind::VG_OF)?;
        *self = working;
        Ok(pv)
    }

    /// Creates a logical volume named "/dev/<vg>/<lv_name>".
    pub fn create_lvm_lv(
        &mut self,
        vg: Sid,
        lv_name: &str,
        size: ByteCount,
    ) -> Result<Sid, DevicegraphError> {
        let vg_device = self.try_find(vg)?;
        let Some(vg_name) = vg_device.vg_name() else {
            return Err(DevicegraphError::invalid_argument(
                pretty_device(vg_device),
                "is not a volume group",
            ));
        };

        let name = format!("{DEV_DIRECTORY}/{vg_name}/{lv_name}");
        self.create(
            Some(&name),
            DeviceDetails::LvmLv { size },
            &[(vg, EdgeKind::LV_OF)],
        )
    }

    pub fn create_bcache_cset(&mut self, caching_device: Sid) -> Result<Sid, DevicegraphError> {
        self.create(
            None,
            DeviceDetails::BcacheCset { uuid: None },
            &[(caching_device, EdgeKind::CACHING_OF)],
        )
    }

    /// Creates a bcache on a backing device, optionally attached to a
    /// caching set. It has the size of its backing device.
    pub fn create_bcache(
        &mut self,
        name: &str,
        backing_device: Sid,
        cset: Option<Sid>,
        cache_mode: CacheMode,
    ) -> Result<Sid, DevicegraphError> {
        let size = self.try_find(backing_device)?.size().unwrap_or_default();

        let mut parents = vec![(backing_device, EdgeKind::BACKING_OF)];
        if let Some(cset) = cset {
            parents.push((cset, EdgeKind::CSET_OF));
        }

        self.create(Some(name), DeviceDetails::Bcache { size, cache_mode }, &parents)
    }

    /// Creates a flash-only bcache, living on the caching set alone.
    pub fn create_flash_bcache(
        &mut self,
        name: &str,
        cset: Sid,
        size: ByteCount,
    ) -> Result<Sid, DevicegraphError> {
        self.create(
            Some(name),
            DeviceDetails::Bcache {
                size,
                cache_mode: CacheMode::default(),
            },
            &[(cset, EdgeKind::CSET_OF)],
        )
    }

    /// Encrypts a block device, creating "/dev/mapper/<dm_name>".
    pub fn encrypt(
        &mut self,
        device: Sid,
        dm_name: &str,
        encryption_type: EncryptionType,
    ) -> Result<Sid, DevicegraphError> {
        let size = self.try_find(device)?.size().unwrap_or_default();
        let name = format!("{DEV_MAPPER_PREFIX}{dm_name}");
        self.create(
            Some(&name),
            DeviceDetails::Encryption {
                size,
                encryption_type,
                crypttab_name: None,
            },
            &[(device, EdgeKind::EncryptionOf)],
        )
    }

    /// Formats one or more block devices. Only btrfs spans several devices.
    pub fn create_filesystem(
        &mut self,
        devices: &[Sid],
        fs_type: FileSystemType,
    ) -> Result<Sid, DevicegraphError> {
        let parents: Vec<(Sid, EdgeKind)> = devices
            .iter()
            .map(|sid| (*sid, EdgeKind::FormattedAs))
            .collect();
        self.create(None, DeviceDetails::filesystem(fs_type), &parents)
    }

    pub fn create_nfs(&mut self, server: &str, path: &str) -> Result<Sid, DevicegraphError> {
        self.create(
            None,
            DeviceDetails::Nfs {
                server: server.to_string(),
                path: path.to_string(),
                mount_point: None,
            },
            &[],
        )
    }

    /// Adds a device connected to its parents, or nothing at all.
    fn create(
        &mut self,
        name: Option<&str>,
        details: DeviceDetails,
        parents: &[(Sid, EdgeKind)],
    ) -> Result<Sid, DevicegraphError> {
        for (parent, _) in parents {
            self.try_find(*parent)?;
        }

        let sid = self.add_device(name, details)?;
        for (parent, kind) in parents {
            if let Err(e) = self.add_edge(*parent, sid, *kind) {
                // Dropping the node drops the edges added so far.
                self.remove_device_node(sid)?;
                return Err(e);
            }
        }

        if let Some(device) = self.find(sid) {
            debug!("Created {}", device.describe());
        }
        Ok(sid)
    }
}
