use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::{debug, trace};
use petgraph::stable_graph::{NodeIndex, StableGraph};

use crate::{primitives::bytes::ByteCount, Sid};

use super::{
    device::{Device, DeviceDetails},
    edges::{Edge, EdgeKind},
    error::{pretty_device, DevicegraphError, IntegrityError},
    types::Capability,
    validation,
};

/// The type of the graph used to store devices and their relationships.
///
/// A stable graph keeps node indices valid across removals, which the sid
/// index relies on.
pub(crate) type DevicePetgraph = StableGraph<Device, EdgeKind>;

/// Allocates sids for a lineage of snapshots.
///
/// Clones share the same counter, so a device created in any copy of a
/// snapshot gets a sid no other copy uses.
#[derive(Debug, Clone)]
pub(crate) struct SidAllocator(Arc<AtomicU64>);

impl Default for SidAllocator {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl SidAllocator {
    pub(crate) fn next(&self) -> Sid {
        Sid(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// Makes sure the given sid is never handed out again.
    pub(crate) fn reserve(&self, sid: Sid) {
        self.0.fetch_max(sid.0 + 1, Ordering::Relaxed);
    }
}

/// One snapshot of the storage configuration.
///
/// Cloning (or calling `duplicate()`) produces an independent value: changes
/// to one copy are never visible in another.
#[derive(Debug, Clone, Default)]
pub struct Devicegraph {
    pub(crate) inner: DevicePetgraph,
    pub(crate) index: BTreeMap<Sid, NodeIndex>,
    pub(crate) sids: SidAllocator,
}

impl Devicegraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an independent copy of the snapshot, in the same sid lineage.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Overwrites `target` with a copy of this snapshot. `target` joins the
    /// sid lineage of this snapshot, whatever it held before.
    ///
    /// Copying a snapshot into itself cannot be expressed: the borrow
    /// checker rejects `graph.safe_copy(&mut graph)`.
    pub fn safe_copy(&self, target: &mut Devicegraph) {
        debug!(
            "Copying devicegraph with {} device(s) over one with {}",
            self.len(),
            target.len()
        );
        target.clone_from(self);
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub(crate) fn node_index(&self, sid: Sid) -> Option<NodeIndex> {
        self.index.get(&sid).copied()
    }

    /// Returns the node index of the device, or `NotFound`.
    pub(crate) fn require(&self, sid: Sid) -> Result<NodeIndex, DevicegraphError> {
        self.node_index(sid).ok_or(DevicegraphError::NotFound(sid))
    }

    /// Devices in sid order.
    pub(crate) fn raw_devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.index.values().map(|idx| &self.inner[*idx])
    }

    /// Adds a new device and returns its freshly allocated sid.
    ///
    /// The device is not connected to anything yet; use `add_edge()` or the
    /// constructors, which do both at once.
    pub fn add_device(
        &mut self,
        name: Option<&str>,
        details: DeviceDetails,
    ) -> Result<Sid, DevicegraphError> {
        let device = Device::new(self.sids.next(), name.map(str::to_string), details);
        validation::check_device(&device)?;

        if let Some(name) = device.name() {
            if self.raw_devices().any(|other| other.name() == Some(name)) {
                return Err(IntegrityError::DuplicateName {
                    name: name.to_string(),
                }
                .into());
            }
        }

        let sid = device.sid;
        self.insert_device(device)?;
        Ok(sid)
    }

    /// Inserts a device keeping its sid.
    ///
    /// Only the sid is checked for uniqueness; callers run a full `check()`
    /// once they are done.
    pub(crate) fn insert_device(&mut self, device: Device) -> Result<(), DevicegraphError> {
        if self.index.contains_key(&device.sid) {
            return Err(IntegrityError::DuplicateSid(device.sid).into());
        }

        self.sids.reserve(device.sid);
        trace!("Adding device: {}", device.describe());
        let sid = device.sid;
        let idx = self.inner.add_node(device);
        self.index.insert(sid, idx);
        Ok(())
    }

    /// Removes a single device and its edges, without any cascade.
    pub(crate) fn remove_device_node(&mut self, sid: Sid) -> Result<Device, DevicegraphError> {
        let idx = self.require(sid)?;
        self.index.remove(&sid);
        self.inner
            .remove_node(idx)
            .ok_or(IntegrityError::IndexMismatch(sid).into())
    }

    pub fn set_udev_names(&mut self, sid: Sid, names: Vec<String>) -> Result<(), DevicegraphError> {
        let idx = self.require(sid)?;
        self.inner[idx].udev_names = names;
        Ok(())
    }

    /// Connects two devices.
    ///
    /// The edge is checked against the structural rules before being added:
    /// compatible kinds, exclusive use of the parent, number of parents of
    /// the child and absence of cycles.
    pub fn add_edge(
        &mut self,
        parent: Sid,
        child: Sid,
        kind: EdgeKind,
    ) -> Result<(), DevicegraphError> {
        let parent_idx = self.require(parent)?;
        let child_idx = self.require(child)?;
        validation::check_new_edge(self, parent_idx, child_idx, kind)?;

        trace!(
            "Adding edge '{kind}': {} -> {}",
            self.inner[parent_idx].describe(),
            self.inner[child_idx].describe()
        );
        self.inner.add_edge(parent_idx, child_idx, kind);
        Ok(())
    }

    /// Disconnects two devices and returns the kind of the removed edge.
    pub fn remove_edge(&mut self, parent: Sid, child: Sid) -> Result<EdgeKind, DevicegraphError> {
        let parent_idx = self.require(parent)?;
        let child_idx = self.require(child)?;

        let Some(edge) = self.inner.find_edge(parent_idx, child_idx) else {
            return Err(DevicegraphError::invalid_argument(
                pretty_device(&self.inner[child_idx]),
                format!(
                    "is not a child of {}",
                    pretty_device(&self.inner[parent_idx])
                ),
            ));
        };

        trace!("Removing edge {parent} -> {child}");
        self.inner
            .remove_edge(edge)
            .ok_or(IntegrityError::DanglingReference { parent, child }.into())
    }

    /// Kind of the edge between two devices, if they are connected.
    pub fn edge_kind(&self, parent: Sid, child: Sid) -> Option<EdgeKind> {
        let edge = self
            .inner
            .find_edge(self.node_index(parent)?, self.node_index(child)?)?;
        self.inner.edge_weight(edge).copied()
    }

    /// All edges, in no particular order.
    pub(crate) fn raw_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.inner.edge_indices().filter_map(|edge| {
            let (parent, child) = self.inner.edge_endpoints(edge)?;
            Some(Edge {
                parent: self.inner[parent].sid,
                child: self.inner[child].sid,
                kind: self.inner[edge],
            })
        })
    }

    /// Changes the size of a resizable device.
    pub fn resize(&mut self, sid: Sid, size: ByteCount) -> Result<(), DevicegraphError> {
        let idx = self.require(sid)?;
        let device = &mut self.inner[idx];
        if !device.is(Capability::Resizable) || !device.set_size(size) {
            return Err(DevicegraphError::unsupported(pretty_device(device), "resize"));
        }

        debug!("Resized {} to {size}", device.describe());
        Ok(())
    }

    /// Sets or clears the mount point of a filesystem.
    pub fn set_mount_point(
        &mut self,
        sid: Sid,
        mount_point: Option<&str>,
    ) -> Result<(), DevicegraphError> {
        let idx = self.require(sid)?;
        let device = &mut self.inner[idx];
        if !device.is(Capability::Mountable) {
            return Err(DevicegraphError::unsupported(
                pretty_device(device),
                "set mount point",
            ));
        }

        if let Some(path) = mount_point {
            if !path.starts_with('/') && path != "swap" {
                return Err(DevicegraphError::invalid_argument(
                    pretty_device(device),
                    format!("mount point '{path}' is not absolute"),
                ));
            }
        }

        device.set_mount_point(mount_point.map(str::to_string));
        Ok(())
    }

    /// Records the name an encryption layer has in /etc/crypttab.
    pub fn set_crypttab_name(
        &mut self,
        sid: Sid,
        name: Option<&str>,
    ) -> Result<(), DevicegraphError> {
        let idx = self.require(sid)?;
        let device = &mut self.inner[idx];
        match &mut device.details {
            DeviceDetails::Encryption { crypttab_name, .. } => {
                *crypttab_name = name.map(str::to_string);
                Ok(())
            }
            _ => Err(DevicegraphError::unsupported(
                pretty_device(device),
                "set crypttab name",
            )),
        }
    }

    /// Checks the whole graph against every structural rule.
    pub fn check(&self) -> Result<(), DevicegraphError> {
        validation::check_graph(self).map_err(DevicegraphError::from)
    }
}

impl PartialEq for Devicegraph {
    /// Two snapshots are equal when they hold the same devices (by sid and
    /// attributes) connected by the same edges.
    fn eq(&self, other: &Self) -> bool {
        if self.index.len() != other.index.len() || self.edge_count() != other.edge_count() {
            return false;
        }

        let same_devices = self.index.iter().all(|(sid, idx)| {
            other
                .node_index(*sid)
                .is_some_and(|other_idx| other.inner[other_idx] == self.inner[*idx])
        });

        same_devices
            && self.raw_edges().collect::<BTreeSet<_>>() == other.raw_edges().collect::<BTreeSet<_>>()
    }
}

#[cfg(test)]
mod tests {
    use crate::devicegraph::{
        edges::EdgeKind,
        types::{FileSystemType, PartitionTableType},
    };

    use super::*;

    fn disk(graph: &mut Devicegraph, name: &str) -> Sid {
        graph
            .add_device(Some(name), DeviceDetails::disk(ByteCount::from_gib(10)))
            .unwrap()
    }

    #[test]
    fn test_add_device() {
        let mut graph = Devicegraph::new();
        let sda = disk(&mut graph, "/dev/sda");
        let sdb = disk(&mut graph, "/dev/sdb");
        assert_ne!(sda, sdb);
        assert_eq!(graph.len(), 2);

        let err = graph
            .add_device(Some("/dev/sda"), DeviceDetails::disk(ByteCount::from_gib(1)))
            .unwrap_err();
        assert_eq!(
            err,
            DevicegraphError::GraphIntegrity(IntegrityError::DuplicateName {
                name: "/dev/sda".into()
            })
        );

        let err = graph
            .add_device(None, DeviceDetails::disk(ByteCount::from_gib(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            DevicegraphError::GraphIntegrity(IntegrityError::BasicCheckFailed { .. })
        ));
    }

    #[test]
    fn test_sids_are_shared_by_copies() {
        let mut graph = Devicegraph::new();
        disk(&mut graph, "/dev/sda");

        let mut copy = graph.duplicate();
        let in_copy = disk(&mut copy, "/dev/sdb");
        let in_original = disk(&mut graph, "/dev/sdb");
        assert_ne!(in_copy, in_original);

        // The copies are independent values.
        assert_eq!(graph.len(), 2);
        assert_eq!(copy.len(), 2);
        assert_ne!(graph, copy);
    }

    #[test]
    fn test_safe_copy() {
        let mut graph = Devicegraph::new();
        disk(&mut graph, "/dev/sda");

        let mut other = Devicegraph::new();
        disk(&mut other, "/dev/vda");
        disk(&mut other, "/dev/vdb");

        graph.safe_copy(&mut other);
        assert_eq!(other, graph);
        assert!(other.find_by_name("/dev/vda").is_none());

        // Same lineage from now on.
        let in_other = disk(&mut other, "/dev/sdb");
        let in_graph = disk(&mut graph, "/dev/sdb");
        assert_ne!(in_other, in_graph);
    }

    #[test]
    fn test_add_edge_rules() {
        let mut graph = Devicegraph::new();
        let sda = disk(&mut graph, "/dev/sda");
        let table = graph
            .add_device(
                None,
                DeviceDetails::PartitionTable {
                    table_type: PartitionTableType::Gpt,
                },
            )
            .unwrap();
        let fs = graph
            .add_device(None, DeviceDetails::filesystem(FileSystemType::Ext4))
            .unwrap();

        // Unknown sid
        assert_eq!(
            graph.add_edge(sda, Sid(999), EdgeKind::TABLE_OF),
            Err(DevicegraphError::NotFound(Sid(999)))
        );

        // Incompatible kinds
        assert!(matches!(
            graph.add_edge(sda, table, EdgeKind::FormattedAs),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::InvalidEdge { .. }))
        ));

        graph.add_edge(sda, table, EdgeKind::TABLE_OF).unwrap();
        assert_eq!(graph.edge_kind(sda, table), Some(EdgeKind::TABLE_OF));

        // The disk is already used by the partition table.
        assert!(matches!(
            graph.add_edge(sda, fs, EdgeKind::FormattedAs),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::ForbiddenSharing { .. }))
        ));

        // A partition table has exactly one parent.
        let sdb = disk(&mut graph, "/dev/sdb");
        assert!(matches!(
            graph.add_edge(sdb, table, EdgeKind::TABLE_OF),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::TooManyEdges { .. }))
        ));

        graph.add_edge(sdb, fs, EdgeKind::FormattedAs).unwrap();
        graph.check().unwrap();
    }

    #[test]
    fn test_multi_device_filesystem() {
        let mut graph = Devicegraph::new();
        let sda = disk(&mut graph, "/dev/sda");
        let sdb = disk(&mut graph, "/dev/sdb");
        let sdc = disk(&mut graph, "/dev/sdc");
        let sdd = disk(&mut graph, "/dev/sdd");

        let btrfs = graph
            .add_device(None, DeviceDetails::filesystem(FileSystemType::Btrfs))
            .unwrap();
        graph.add_edge(sda, btrfs, EdgeKind::FormattedAs).unwrap();
        graph.add_edge(sdb, btrfs, EdgeKind::FormattedAs).unwrap();

        let ext4 = graph
            .add_device(None, DeviceDetails::filesystem(FileSystemType::Ext4))
            .unwrap();
        graph.add_edge(sdc, ext4, EdgeKind::FormattedAs).unwrap();
        assert!(matches!(
            graph.add_edge(sdd, ext4, EdgeKind::FormattedAs),
            Err(DevicegraphError::GraphIntegrity(
                IntegrityError::MultiDeviceFilesystem { device_count: 2, .. }
            ))
        ));
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = Devicegraph::new();
        let sda = disk(&mut graph, "/dev/sda");
        let fs = graph
            .add_device(None, DeviceDetails::filesystem(FileSystemType::Xfs))
            .unwrap();
        graph.add_edge(sda, fs, EdgeKind::FormattedAs).unwrap();

        assert_eq!(graph.remove_edge(sda, fs), Ok(EdgeKind::FormattedAs));
        assert!(matches!(
            graph.remove_edge(sda, fs),
            Err(DevicegraphError::InvalidArgument { .. })
        ));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_resize_and_mount_point() {
        let mut graph = Devicegraph::new();
        let stray = graph
            .add_device(
                Some("/dev/xvda1"),
                DeviceDetails::StrayBlkDevice {
                    size: ByteCount::from_gib(1),
                },
            )
            .unwrap();
        assert_eq!(
            graph.resize(stray, ByteCount::from_gib(2)),
            Err(DevicegraphError::Unsupported {
                device: "'/dev/xvda1'".into(),
                operation: "resize".into()
            })
        );
        assert_eq!(
            graph.resize(Sid(999), ByteCount::from_gib(2)),
            Err(DevicegraphError::NotFound(Sid(999)))
        );
        assert!(matches!(
            graph.set_mount_point(stray, Some("/srv")),
            Err(DevicegraphError::Unsupported { .. })
        ));

        let fs = graph
            .add_device(None, DeviceDetails::filesystem(FileSystemType::Ext4))
            .unwrap();
        graph.set_mount_point(fs, Some("/srv")).unwrap();
        assert!(matches!(
            graph.set_mount_point(fs, Some("srv")),
            Err(DevicegraphError::InvalidArgument { .. })
        ));
        assert!(matches!(
            graph.set_crypttab_name(fs, Some("cr_home")),
            Err(DevicegraphError::Unsupported { .. })
        ));
    }
}
