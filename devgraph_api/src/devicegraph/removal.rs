//! Cascading removal.
//!
//! Removing a device removes everything built on top of it first, then the
//! device itself, then whatever it leaves orphaned (see
//! `Devicegraph::potential_orphans`). Each removal runs on a copy of the
//! graph that replaces the original only when the whole cascade succeeded.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::Sid;

use super::{
    device::Device,
    edges::EdgeKind,
    error::{pretty_device, DevicegraphError, IntegrityError},
    graph::Devicegraph,
    types::DeviceKind,
};

/// One pending unit of work of a cascade.
enum Step {
    /// Remove the device, its children first.
    Enter { sid: Sid, keep: BTreeSet<Sid> },

    /// Remove the device if it has become useless.
    Orphan { sid: Sid, keep: BTreeSet<Sid> },
}

impl Devicegraph {
    /// Removes a device, its descendants and the devices it leaves
    /// orphaned. Returns the removed sids in removal order.
    ///
    /// Partitions and logical volumes must be removed through their
    /// container (`delete_partition()`, `delete_lvm_lv()`).
    pub fn remove(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        let device = self.try_find(sid)?;
        if device.kind().has_specific_remover() {
            return Err(DevicegraphError::invalid_argument(
                pretty_device(device),
                format!(
                    "a {} must be removed through its {}",
                    device.kind(),
                    match device.kind() {
                        DeviceKind::Partition => "partition table",
                        _ => "volume group",
                    }
                ),
            ));
        }

        self.remove_checked(sid)
    }

    /// Removes every descendant of a device, keeping the device itself.
    pub fn remove_descendants(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.try_find(sid)?;

        self.atomically(|graph, removed| {
            let keep = BTreeSet::from([sid]);
            for child in graph.children(sid).iter().map(|child| child.sid()).collect::<Vec<_>>() {
                if graph.contains(child) {
                    graph.cascade(child, keep.clone(), removed)?;
                }
            }
            Ok(())
        })
    }

    /// Removes a bcache. Its caching set goes too unless another bcache
    /// still uses it.
    pub fn remove_bcache(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.expect_kind(sid, DeviceKind::Bcache)?;
        self.remove_checked(sid)
    }

    /// Removes a software RAID and everything built on it.
    pub fn remove_md(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.expect_kind(sid, DeviceKind::Md)?;
        self.remove_checked(sid)
    }

    /// Removes a volume group with its logical volumes and physical volumes.
    pub fn remove_lvm_vg(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.expect_kind(sid, DeviceKind::LvmVg)?;
        self.remove_checked(sid)
    }

    pub fn remove_nfs(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.expect_kind(sid, DeviceKind::Nfs)?;
        self.remove_checked(sid)
    }

    /// Removes a partition from its partition table.
    pub fn delete_partition(
        &mut self,
        table: Sid,
        partition: Sid,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        self.expect_kind(table, DeviceKind::PartitionTable)?;
        self.expect_child(table, partition, EdgeKind::PARTITION_OF)?;
        self.remove_checked(partition)
    }

    /// Removes a logical volume from its volume group.
    pub fn delete_lvm_lv(&mut self, vg: Sid, lv: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.expect_kind(vg, DeviceKind::LvmVg)?;
        self.expect_child(vg, lv, EdgeKind::LV_OF)?;
        self.remove_checked(lv)
    }

    fn remove_checked(&mut self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        info!("Removing {} with its dependants", self.try_find(sid)?.describe());
        self.atomically(|graph, removed| graph.cascade(sid, BTreeSet::new(), removed))
    }

    fn expect_kind(&self, sid: Sid, kind: DeviceKind) -> Result<&Device, DevicegraphError> {
        let device = self.try_find(sid)?;
        if device.kind() != kind {
            return Err(DevicegraphError::invalid_argument(
                pretty_device(device),
                format!("expected a {kind}, found a {}", device.kind()),
            ));
        }
        Ok(device)
    }

    fn expect_child(&self, parent: Sid, child: Sid, kind: EdgeKind) -> Result<(), DevicegraphError> {
        let device = self.try_find(child)?;
        if self.edge_kind(parent, child) != Some(kind) {
            return Err(DevicegraphError::invalid_argument(
                pretty_device(device),
                format!("is not a '{kind}' child of {}", pretty_device(self.try_find(parent)?)),
            ));
        }
        Ok(())
    }

    /// Runs a removal on a copy and swaps it in on success.
    fn atomically<F>(&mut self, operation: F) -> Result<Vec<Sid>, DevicegraphError>
    where
        F: FnOnce(&mut Devicegraph, &mut Vec<Sid>) -> Result<(), DevicegraphError>,
    {
        let mut working = self.duplicate();
        let mut removed = Vec::new();
        operation(&mut working, &mut removed)?;

        debug!("Removed {} device(s)", removed.len());
        *self = working;
        Ok(removed)
    }

    /// Removes a device with its dependants.
    ///
    /// `keep` holds the devices whose removal is in progress further up the
    /// cascade; they are never treated as orphans.
    fn cascade(
        &mut self,
        sid: Sid,
        keep: BTreeSet<Sid>,
        removed: &mut Vec<Sid>,
    ) -> Result<(), DevicegraphError> {
        let mut stack = vec![Step::Enter { sid, keep }];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter { sid, keep } => {
                    // Already gone through another path of the cascade.
                    if !self.contains(sid) {
                        continue;
                    }

                    // Children are queried again on every visit, removals
                    // further down change them.
                    if let Some(child) = self.children(sid).first().map(|child| child.sid()) {
                        if keep.contains(&child) {
                            return Err(IntegrityError::Cycle {
                                device: pretty_device(self.try_find(child)?),
                            }
                            .into());
                        }

                        let mut child_keep = keep.clone();
                        child_keep.insert(sid);
                        stack.push(Step::Enter { sid, keep });
                        stack.push(Step::Enter {
                            sid: child,
                            keep: child_keep,
                        });
                        continue;
                    }

                    // Orphans are found through the device, so look them up
                    // before it goes.
                    let orphans = self.potential_orphans(sid);
                    let device = self.remove_device_node(sid)?;
                    debug!("Removed {}", device.describe());
                    removed.push(sid);

                    for orphan in orphans.into_iter().rev() {
                        stack.push(Step::Orphan {
                            sid: orphan,
                            keep: keep.clone(),
                        });
                    }
                }
                Step::Orphan { sid, keep } => {
                    if keep.contains(&sid) || !self.contains(sid) || self.has_children(sid) {
                        continue;
                    }

                    debug!("Removing orphan {}", self.try_find(sid)?.describe());
                    stack.push(Step::Enter { sid, keep });
                }
            }
        }

        Ok(())
    }
}
