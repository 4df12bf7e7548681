//! Typed queries over a devicegraph.
//!
//! Queries never fail: absence is reported with `None` or an empty list.
//! Every list is sorted with the name-aware comparison, ties broken by sid.

use petgraph::{stable_graph::NodeIndex, visit::EdgeRef, Direction};
use serde::Serialize;

use crate::{
    constants::{DEFAULT_BLOCK_SIZE, GPT_BACKUP_SECTORS, PARTITION_ALIGNMENT},
    primitives::{bytes::ByteCount, region::Region},
    Sid,
};

use super::{
    device::{Device, DeviceDetails},
    edges::{Edge, EdgeKind},
    error::DevicegraphError,
    graph::Devicegraph,
    sort::{compare_devices, compare_names, sort_devices},
    types::{Capability, DeviceKind, PartitionTableType, PartitionType},
};

/// Unallocated space on a partitionable device.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FreeSpace {
    /// Device holding the space.
    pub device: Sid,
    pub device_name: String,
    pub region: Region,
}

impl FreeSpace {
    pub fn kind(&self) -> DeviceKind {
        DeviceKind::FreeSpace
    }

    pub fn size(&self) -> ByteCount {
        self.region.size()
    }
}

impl Devicegraph {
    pub fn find(&self, sid: Sid) -> Option<&Device> {
        self.node_index(sid).map(|idx| &self.inner[idx])
    }

    /// Like `find()`, reporting absence as `NotFound`.
    pub fn try_find(&self, sid: Sid) -> Result<&Device, DevicegraphError> {
        self.find(sid).ok_or(DevicegraphError::NotFound(sid))
    }

    pub fn contains(&self, sid: Sid) -> bool {
        self.index.contains_key(&sid)
    }

    /// Every device, sorted by name.
    pub fn devices(&self) -> Vec<&Device> {
        self.sorted(self.raw_devices())
    }

    pub fn all_of_kind(&self, kind: DeviceKind) -> Vec<&Device> {
        self.sorted(self.raw_devices().filter(|device| device.kind() == kind))
    }

    pub fn with_capability(&self, capability: Capability) -> Vec<&Device> {
        self.sorted(self.raw_devices().filter(|device| device.is(capability)))
    }

    /// Devices built directly on top of the given one.
    pub fn children(&self, sid: Sid) -> Vec<&Device> {
        self.neighbors(sid, Direction::Outgoing)
            .into_iter()
            .map(|(device, _)| device)
            .collect()
    }

    /// Devices the given one is built from.
    pub fn parents(&self, sid: Sid) -> Vec<&Device> {
        self.neighbors(sid, Direction::Incoming)
            .into_iter()
            .map(|(device, _)| device)
            .collect()
    }

    /// Children together with the kind of the edge leading to them.
    pub fn children_with_edges(&self, sid: Sid) -> Vec<(&Device, EdgeKind)> {
        self.neighbors(sid, Direction::Outgoing)
    }

    /// Parents together with the kind of the edge leading from them.
    pub fn parents_with_edges(&self, sid: Sid) -> Vec<(&Device, EdgeKind)> {
        self.neighbors(sid, Direction::Incoming)
    }

    pub fn children_by_edge(&self, sid: Sid, kind: EdgeKind) -> Vec<&Device> {
        self.neighbors(sid, Direction::Outgoing)
            .into_iter()
            .filter_map(|(device, edge)| (edge == kind).then_some(device))
            .collect()
    }

    pub fn parents_by_edge(&self, sid: Sid, kind: EdgeKind) -> Vec<&Device> {
        self.neighbors(sid, Direction::Incoming)
            .into_iter()
            .filter_map(|(device, edge)| (edge == kind).then_some(device))
            .collect()
    }

    /// Every edge, sorted by parent and child sid.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self.raw_edges().collect();
        edges.sort();
        edges
    }

    pub fn disks(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Disk)
    }

    pub fn partitions(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Partition)
    }

    pub fn blk_devices(&self) -> Vec<&Device> {
        self.with_capability(Capability::BlkDevice)
    }

    /// Disk-like devices a user would install on.
    ///
    /// Disks that are paths of a multipath device or members of a BIOS RAID
    /// are hidden behind that device, and empty devices (e.g. card readers
    /// without a card) are skipped.
    pub fn disk_devices(&self) -> Vec<&Device> {
        self.with_capability(Capability::DiskDevice)
            .into_iter()
            .filter(|device| !device.size().unwrap_or_default().is_zero())
            .filter(|device| {
                device.kind() != DeviceKind::Disk
                    || !self
                        .children_by_edge(device.sid, EdgeKind::MEMBER_OF)
                        .iter()
                        .any(|child| {
                            child.kind() == DeviceKind::Multipath || child.is(Capability::BiosRaid)
                        })
            })
            .collect()
    }

    /// Block devices without a partition table, e.g. Xen virtual partitions.
    pub fn stray_blk_devices(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::StrayBlkDevice)
    }

    pub fn multipaths(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Multipath)
    }

    pub fn dm_raids(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::DmRaid)
    }

    pub fn md_raids(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Md)
    }

    /// BIOS RAIDs assembled by the MD subsystem.
    pub fn md_member_raids(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::MdMember)
    }

    pub fn raids(&self) -> Vec<&Device> {
        self.with_capability(Capability::Raid)
    }

    pub fn software_raids(&self) -> Vec<&Device> {
        self.with_capability(Capability::SoftwareRaid)
    }

    pub fn bios_raids(&self) -> Vec<&Device> {
        self.with_capability(Capability::BiosRaid)
    }

    pub fn lvm_vgs(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::LvmVg)
    }

    pub fn lvm_pvs(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::LvmPv)
    }

    pub fn lvm_lvs(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::LvmLv)
    }

    pub fn bcaches(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Bcache)
    }

    /// Bcaches on a backing device.
    pub fn backed_bcaches(&self) -> Vec<&Device> {
        self.bcaches()
            .into_iter()
            .filter(|bcache| self.is_backed_bcache(bcache.sid))
            .collect()
    }

    /// Flash-only bcaches, living on a caching set alone.
    pub fn flash_bcaches(&self) -> Vec<&Device> {
        self.bcaches()
            .into_iter()
            .filter(|bcache| !self.is_backed_bcache(bcache.sid))
            .collect()
    }

    fn is_backed_bcache(&self, sid: Sid) -> bool {
        !self.parents_by_edge(sid, EdgeKind::BACKING_OF).is_empty()
    }

    pub fn bcache_csets(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::BcacheCset)
    }

    pub fn encryptions(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Encryption)
    }

    pub fn filesystems(&self) -> Vec<&Device> {
        self.with_capability(Capability::Filesystem)
    }

    pub fn blk_filesystems(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::BlkFilesystem)
    }

    pub fn nfs_mounts(&self) -> Vec<&Device> {
        self.all_of_kind(DeviceKind::Nfs)
    }

    /// Filesystem mounted at the given path, if any.
    pub fn find_by_mount_point(&self, mount_point: &str) -> Option<&Device> {
        self.filesystems()
            .into_iter()
            .find(|fs| fs.mount_point() == Some(mount_point))
    }

    /// Whether the filesystem mounted at the given path lives on the network.
    ///
    /// NFS mounts always do; a block filesystem does when any of the disks
    /// it is built from is reached over iSCSI or FCoE. Unknown mount points
    /// are not in the network.
    pub fn filesystem_in_network(&self, mount_point: &str) -> bool {
        let Some(fs) = self.find_by_mount_point(mount_point) else {
            return false;
        };

        match fs.kind() {
            DeviceKind::Nfs => true,
            _ => self
                .ancestors(fs.sid)
                .unwrap_or_default()
                .iter()
                .any(|ancestor| {
                    matches!(
                        ancestor.details(),
                        DeviceDetails::Disk { transport, .. } if transport.is_network()
                    )
                }),
        }
    }

    /// Unallocated regions of every partitionable device.
    ///
    /// A partitionable device without any child is free as a whole. On a
    /// partition table, gaps between partitions are reported; the usable
    /// area starts at the first aligned MiB and, for GPT, stops before the
    /// backup header. Logical partitions live inside their extended
    /// partition and are ignored.
    pub fn free_spaces(&self) -> Vec<FreeSpace> {
        let mut spaces = Vec::new();

        for device in self.with_capability(Capability::Partitionable) {
            let Some(size) = device.size() else {
                continue;
            };
            let name = device.display_name();
            let children = self.children_with_edges(device.sid);

            if children.is_empty() {
                let region = Region::from_bytes(ByteCount(0), size, DEFAULT_BLOCK_SIZE);
                if !region.is_empty() {
                    spaces.push(FreeSpace {
                        device: device.sid,
                        device_name: name,
                        region,
                    });
                }
                continue;
            }

            let Some(table) = children
                .iter()
                .find_map(|(child, kind)| (*kind == EdgeKind::TABLE_OF).then_some(*child))
            else {
                continue;
            };

            spaces.extend(self.table_gaps(table, size).into_iter().map(|region| FreeSpace {
                device: device.sid,
                device_name: name.clone(),
                region,
            }));
        }

        spaces
    }

    /// Gaps between the partitions of a table on a device of `size` bytes.
    fn table_gaps(&self, table: &Device, size: ByteCount) -> Vec<Region> {
        let mut regions: Vec<Region> = self
            .children_by_edge(table.sid, EdgeKind::PARTITION_OF)
            .into_iter()
            .filter(|partition| {
                !matches!(
                    partition.details(),
                    DeviceDetails::Partition {
                        partition_type: PartitionType::Logical,
                        ..
                    }
                )
            })
            .filter_map(|partition| partition.region().copied())
            .collect();
        regions.sort_by_key(|region| region.start_bytes());

        let block_size = regions
            .first()
            .map(|region| region.block_size)
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        let blocks = size.bytes() / block_size;
        let first_usable = PARTITION_ALIGNMENT / block_size;
        let end = match table.details() {
            DeviceDetails::PartitionTable {
                table_type: PartitionTableType::Gpt,
            } => blocks.saturating_sub(GPT_BACKUP_SECTORS),
            _ => blocks,
        };

        let mut gaps = Vec::new();
        let mut cursor = first_usable;
        for region in regions {
            let start = region.start_bytes().bytes() / block_size;
            if start > cursor {
                gaps.push(Region::new(cursor, start - cursor, block_size));
            }
            cursor = cursor.max(region.end_bytes().bytes() / block_size);
        }
        if end > cursor {
            gaps.push(Region::new(cursor, end - cursor, block_size));
        }

        gaps
    }

    /// Neighbors in one direction, sorted by name.
    fn neighbors(&self, sid: Sid, direction: Direction) -> Vec<(&Device, EdgeKind)> {
        let Some(idx) = self.node_index(sid) else {
            return Vec::new();
        };

        let mut neighbors: Vec<(&Device, EdgeKind)> = self
            .inner
            .edges_directed(idx, direction)
            .map(|edge| {
                let other: NodeIndex = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (&self.inner[other], *edge.weight())
            })
            .collect();
        neighbors.sort_by(|a, b| compare_devices(a.0, b.0));
        neighbors
    }

    fn sorted<'a>(&'a self, devices: impl Iterator<Item = &'a Device>) -> Vec<&'a Device> {
        let mut devices: Vec<&Device> = devices.collect();
        sort_devices(&mut devices);
        devices
    }

    /// Names of every named device, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.raw_devices().filter_map(Device::name).collect();
        names.sort_by(|a, b| compare_names(a, b));
        names
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreeset;

    use crate::devicegraph::{
        test_utils,
        types::{DiskTransport, RaidLevel},
    };

    use super::*;

    fn names(devices: Vec<&Device>) -> Vec<String> {
        devices.iter().map(|device| device.display_name()).collect()
    }

    #[test]
    fn test_name_aware_order() {
        let graph = test_utils::numbered_disks(11);
        let disks = names(graph.disks());
        assert_eq!(disks.len(), 11);
        let dev9 = disks.iter().position(|name| name == "/dev/dev9").unwrap();
        let dev10 = disks.iter().position(|name| name == "/dev/dev10").unwrap();
        assert!(dev9 < dev10);
        assert_eq!(disks.first().unwrap(), "/dev/dev0");
        assert_eq!(disks.last().unwrap(), "/dev/dev10");
    }

    #[test]
    fn test_find() {
        let graph = test_utils::lvm_scenario();
        let sda = graph.find_by_name("/dev/sda").unwrap();
        assert_eq!(graph.find(sda.sid()).unwrap().kind(), DeviceKind::Disk);
        assert!(graph.find(Sid(12345)).is_none());
        assert_eq!(graph.try_find(Sid(12345)), Err(DevicegraphError::NotFound(Sid(12345))));
        assert!(graph.children(Sid(12345)).is_empty());
        assert!(graph.parents(Sid(12345)).is_empty());
    }

    #[test]
    fn test_children_and_parents() {
        let graph = test_utils::lvm_scenario();
        let vg0 = graph.find_by_name("/dev/vg0").unwrap();
        assert_eq!(
            names(graph.children(vg0.sid())),
            vec!["/dev/vg0/lv1", "/dev/vg0/lv2"]
        );
        assert_eq!(graph.parents(vg0.sid()).len(), 2);
        assert!(graph
            .parents(vg0.sid())
            .iter()
            .all(|pv| pv.kind() == DeviceKind::LvmPv));

        let lv1 = graph.find_by_name("/dev/vg0/lv1").unwrap();
        assert_eq!(
            graph.parents_with_edges(lv1.sid()),
            vec![(vg0, EdgeKind::LV_OF)]
        );
    }

    #[test]
    fn test_typed_queries() {
        let graph = test_utils::lvm_scenario();
        assert_eq!(names(graph.lvm_vgs()), vec!["/dev/vg0", "/dev/vg1"]);
        assert_eq!(graph.lvm_pvs().len(), 3);
        assert_eq!(
            names(graph.lvm_lvs()),
            vec!["/dev/vg0/lv1", "/dev/vg0/lv2", "/dev/vg1/lv1"]
        );
        assert_eq!(names(graph.disks()), vec!["/dev/sda", "/dev/sdb"]);
        assert_eq!(
            names(graph.partitions()),
            vec!["/dev/sda1", "/dev/sda2", "/dev/sda3", "/dev/sdb1"]
        );
        assert!(graph.bcaches().is_empty());

        let blk: std::collections::BTreeSet<String> =
            names(graph.blk_devices()).into_iter().collect();
        assert!(blk.contains("/dev/vg0/lv1"));
        assert!(!blk.contains("/dev/vg0"));
    }

    #[test]
    fn test_bcache_queries() {
        let mut graph = test_utils::bcache_scenario();
        assert_eq!(names(graph.backed_bcaches()), vec!["/dev/bcache0", "/dev/bcache1"]);
        assert!(graph.flash_bcaches().is_empty());

        let cset = graph.bcache_csets()[0].sid();
        graph
            .create_flash_bcache("/dev/bcache2", cset, ByteCount::from_gib(5))
            .unwrap();
        assert_eq!(
            names(graph.bcaches()),
            vec!["/dev/bcache0", "/dev/bcache1", "/dev/bcache2"]
        );
        assert_eq!(names(graph.backed_bcaches()), vec!["/dev/bcache0", "/dev/bcache1"]);
        assert_eq!(names(graph.flash_bcaches()), vec!["/dev/bcache2"]);
    }

    #[test]
    fn test_raid_and_stray_queries() {
        let mut graph = Devicegraph::new();
        let size = ByteCount::from_gib(10);
        let sda = graph.create_disk("/dev/sda", size).unwrap();
        let sdb = graph.create_disk("/dev/sdb", size).unwrap();
        let sdc = graph.create_disk("/dev/sdc", size).unwrap();
        let sdd = graph.create_disk("/dev/sdd", size).unwrap();
        let sde = graph.create_disk("/dev/sde", size).unwrap();
        assert!(graph.stray_blk_devices().is_empty());
        assert!(graph.multipaths().is_empty());

        graph.create_stray_blk_device("/dev/xvda3", size).unwrap();
        graph.create_stray_blk_device("/dev/xvda1", size).unwrap();

        let multipath = graph
            .add_device(Some("/dev/mapper/36005076305ffc"), DeviceDetails::Multipath { size })
            .unwrap();
        graph.add_edge(sda, multipath, EdgeKind::MEMBER_OF).unwrap();

        let dm_raid = graph
            .add_device(Some("/dev/mapper/isw_ddgdcbibhd_test1"), DeviceDetails::DmRaid { size })
            .unwrap();
        graph.add_edge(sdb, dm_raid, EdgeKind::MEMBER_OF).unwrap();

        let md_member = graph
            .add_device(
                Some("/dev/md/imsm0"),
                DeviceDetails::MdMember {
                    size,
                    level: RaidLevel::Raid0,
                },
            )
            .unwrap();
        graph.add_edge(sdc, md_member, EdgeKind::MEMBER_OF).unwrap();

        graph
            .create_md("/dev/md0", RaidLevel::Raid1, &[sdd, sde])
            .unwrap();
        graph.check().unwrap();

        assert_eq!(names(graph.stray_blk_devices()), vec!["/dev/xvda1", "/dev/xvda3"]);
        assert_eq!(names(graph.multipaths()), vec!["/dev/mapper/36005076305ffc"]);
        assert_eq!(names(graph.dm_raids()), vec!["/dev/mapper/isw_ddgdcbibhd_test1"]);
        assert_eq!(names(graph.md_member_raids()), vec!["/dev/md/imsm0"]);
        assert_eq!(names(graph.md_raids()), vec!["/dev/md0"]);
        assert_eq!(graph.raids().len(), 3);
        assert_eq!(graph.bios_raids().len(), 2);
    }

    #[test]
    fn test_disk_devices() {
        let mut graph = Devicegraph::new();
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(10)).unwrap();
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(10)).unwrap();
        graph.create_disk("/dev/sdc", ByteCount::from_gib(10)).unwrap();
        graph.create_disk("/dev/sdd", ByteCount(0)).unwrap();

        let multipath = graph
            .add_device(
                Some("/dev/mapper/36005076305ffc"),
                DeviceDetails::Multipath {
                    size: ByteCount::from_gib(10),
                },
            )
            .unwrap();
        graph.add_edge(sda, multipath, EdgeKind::MEMBER_OF).unwrap();
        graph.add_edge(sdb, multipath, EdgeKind::MEMBER_OF).unwrap();

        assert_eq!(
            names(graph.disk_devices()).into_iter().collect::<std::collections::BTreeSet<_>>(),
            btreeset! {
                "/dev/mapper/36005076305ffc".to_string(),
                "/dev/sdc".to_string(),
            }
        );
    }

    #[test]
    fn test_free_spaces() {
        let mut graph = Devicegraph::new();
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(10)).unwrap();
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        let table = graph
            .create_partition_table(sda, PartitionTableType::Msdos)
            .unwrap();
        graph
            .create_partition(
                table,
                "/dev/sda1",
                Region::from_bytes(ByteCount::from_mib(1), ByteCount::from_gib(1), 512),
                PartitionType::Primary,
            )
            .unwrap();
        graph
            .create_partition(
                table,
                "/dev/sda2",
                Region::from_bytes(ByteCount::from_gib(2), ByteCount::from_gib(1), 512),
                PartitionType::Primary,
            )
            .unwrap();

        let spaces = graph.free_spaces();
        let on_sda: Vec<&FreeSpace> = spaces.iter().filter(|s| s.device == sda).collect();
        assert_eq!(on_sda.len(), 2);
        assert_eq!(on_sda[0].region.start_bytes(), ByteCount::from_mib(1) + ByteCount::from_gib(1));
        assert_eq!(on_sda[0].size(), ByteCount::from_gib(1) - ByteCount::from_mib(1));
        assert_eq!(on_sda[1].region.start_bytes(), ByteCount::from_gib(3));
        assert_eq!(on_sda[1].size(), ByteCount::from_gib(7));
        assert!(on_sda.iter().all(|s| s.kind() == DeviceKind::FreeSpace));

        let on_sdb: Vec<&FreeSpace> = spaces.iter().filter(|s| s.device == sdb).collect();
        assert_eq!(on_sdb.len(), 1);
        assert_eq!(on_sdb[0].size(), ByteCount::from_gib(1));
    }

    #[test]
    fn test_free_spaces_gpt_backup_area() {
        let mut graph = Devicegraph::new();
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(1)).unwrap();
        graph
            .create_partition_table(sda, PartitionTableType::Gpt)
            .unwrap();

        let spaces = graph.free_spaces();
        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].region.start, PARTITION_ALIGNMENT / 512);
        assert_eq!(
            spaces[0].region.end_exclusive(),
            ByteCount::from_gib(1).bytes() / 512 - GPT_BACKUP_SECTORS
        );
    }

    #[test]
    fn test_filesystem_in_network() {
        let mut graph = Devicegraph::new();
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(10)).unwrap();
        let iscsi = graph
            .add_device(
                Some("/dev/sdb"),
                DeviceDetails::Disk {
                    size: ByteCount::from_gib(10),
                    transport: DiskTransport::Iscsi,
                },
            )
            .unwrap();
        let root = graph
            .create_filesystem(&[sda], crate::devicegraph::types::FileSystemType::Ext4)
            .unwrap();
        graph.set_mount_point(root, Some("/")).unwrap();
        let data = graph
            .create_filesystem(&[iscsi], crate::devicegraph::types::FileSystemType::Xfs)
            .unwrap();
        graph.set_mount_point(data, Some("/data")).unwrap();
        let nfs = graph.create_nfs("srv", "/export/home").unwrap();
        graph.set_mount_point(nfs, Some("/home")).unwrap();

        assert!(!graph.filesystem_in_network("/"));
        assert!(graph.filesystem_in_network("/data"));
        assert!(graph.filesystem_in_network("/home"));
        assert!(!graph.filesystem_in_network("/srv"));
    }
}
