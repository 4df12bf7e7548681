//! Computing and ordering the actions between two snapshots.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

use log::{debug, info, trace};

use crate::Sid;

use super::{
    super::{
        device::{Device, DeviceDetails},
        edges::{ComponentRole, Edge, EdgeKind},
        error::{DevicegraphError, IntegrityError},
        graph::Devicegraph,
        sort::compare_names,
        types::{Capability, DeviceKind},
    },
    Action, ActionKind, Actiongraph,
};

/// Coarse execution order of the action kinds. Dependencies always win;
/// phases only order actions that are ready at the same time.
fn phase(kind: &ActionKind) -> u8 {
    match kind {
        ActionKind::Detach { .. } => 0,
        ActionKind::Delete { .. } => 1,
        ActionKind::Resize { from, to, .. } if to < from => 2,
        ActionKind::Reformat { .. } | ActionKind::Rename { .. } | ActionKind::Reconfigure { .. } => 3,
        ActionKind::Resize { .. } => 4,
        ActionKind::Create { .. } => 5,
        ActionKind::Attach { .. } => 6,
        ActionKind::SetMountPoint { .. } => 7,
    }
}

/// Key of the ready queue.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyKey {
    phase: u8,
    name: String,
    sid: Sid,
    seq: usize,
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.phase
            .cmp(&other.phase)
            .then_with(|| compare_names(&self.name, &other.name))
            .then_with(|| self.sid.cmp(&other.sid))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An action before ordering.
struct Pending {
    kind: ActionKind,
    description: String,
    name: String,
}

/// Collects the actions and the dependencies between them.
struct Planner<'a> {
    origin: &'a Devicegraph,
    target: &'a Devicegraph,
    pending: Vec<Pending>,

    /// `dependencies[i]` holds the actions that must precede action `i`.
    dependencies: Vec<BTreeSet<usize>>,

    creates: BTreeMap<Sid, usize>,
    deletes: BTreeMap<Sid, usize>,
    shrinks: BTreeMap<Sid, usize>,
    grows: BTreeMap<Sid, usize>,
    reformats: BTreeMap<Sid, usize>,
    renames: BTreeMap<Sid, usize>,
    mount_points: BTreeMap<Sid, usize>,
    attaches: Vec<(Edge, usize)>,
    detaches: Vec<(Edge, usize)>,
}

/// Plans the actions turning `origin` into `target`.
///
/// Devices only in `target` are created, devices only in `origin` are
/// deleted, devices in both with different attributes are modified and
/// edges between devices in both are attached or detached. A device whose
/// kind changed under the same sid is deleted and created again.
///
/// Both snapshots are checked first; a broken snapshot fails the whole
/// diff with `GraphIntegrity`.
pub fn diff(origin: &Devicegraph, target: &Devicegraph) -> Result<Actiongraph, DevicegraphError> {
    origin.check()?;
    target.check()?;

    let mut planner = Planner::new(origin, target);
    planner.collect();
    planner.link();
    let actiongraph = planner.order()?;

    info!("Planned {} action(s)", actiongraph.len());
    for (position, action) in actiongraph.iter().enumerate() {
        debug!("{position:>3}: {}", action.description);
    }
    Ok(actiongraph)
}

impl Devicegraph {
    /// Plans the actions turning `origin` into this snapshot.
    pub fn actiongraph(&self, origin: &Devicegraph) -> Result<Actiongraph, DevicegraphError> {
        diff(origin, self)
    }
}

impl<'a> Planner<'a> {
    fn new(origin: &'a Devicegraph, target: &'a Devicegraph) -> Self {
        Self {
            origin,
            target,
            pending: Vec::new(),
            dependencies: Vec::new(),
            creates: BTreeMap::new(),
            deletes: BTreeMap::new(),
            shrinks: BTreeMap::new(),
            grows: BTreeMap::new(),
            reformats: BTreeMap::new(),
            renames: BTreeMap::new(),
            mount_points: BTreeMap::new(),
            attaches: Vec::new(),
            detaches: Vec::new(),
        }
    }

    /// Whether the device is in both snapshots with the same kind.
    fn is_common(&self, sid: Sid) -> bool {
        match (self.origin.find(sid), self.target.find(sid)) {
            (Some(old), Some(new)) => old.kind() == new.kind(),
            _ => false,
        }
    }

    fn push(&mut self, kind: ActionKind, description: String, name: String) -> usize {
        trace!("Planning: {description}");
        self.pending.push(Pending {
            kind,
            description,
            name,
        });
        self.dependencies.push(BTreeSet::new());
        self.pending.len() - 1
    }

    fn collect(&mut self) {
        let origin = self.origin;
        let target = self.target;

        for old in origin.devices() {
            if !self.is_common(old.sid()) {
                let description = format!("Delete {}", label(origin, old));
                let index = self.push(
                    ActionKind::Delete { device: old.sid() },
                    description,
                    old.display_name(),
                );
                self.deletes.insert(old.sid(), index);
            }
        }

        for new in target.devices() {
            if self.is_common(new.sid()) {
                if let Some(old) = origin.find(new.sid()) {
                    self.collect_modifications(old, new);
                }
                continue;
            }

            let parents = target
                .parents_with_edges(new.sid())
                .into_iter()
                .map(|(parent, kind)| (parent.sid(), kind))
                .collect();
            let description = create_description(target, new);
            let index = self.push(
                ActionKind::Create {
                    device: new.clone(),
                    parents,
                },
                description,
                new.display_name(),
            );
            self.creates.insert(new.sid(), index);
        }

        let old_edges: BTreeMap<(Sid, Sid), EdgeKind> = origin
            .edges()
            .into_iter()
            .map(|edge| ((edge.parent, edge.child), edge.kind))
            .collect();
        let new_edges: BTreeMap<(Sid, Sid), EdgeKind> = target
            .edges()
            .into_iter()
            .map(|edge| ((edge.parent, edge.child), edge.kind))
            .collect();

        // Edges from or to deleted devices go away with them.
        for (&(parent, child), &kind) in &old_edges {
            if !self.is_common(parent) || !self.is_common(child) {
                continue;
            }
            if new_edges.get(&(parent, child)) == Some(&kind) {
                continue;
            }

            let description = edge_description(origin, parent, child, kind, false);
            let name = origin.find(child).map(Device::display_name).unwrap_or_default();
            let index = self.push(ActionKind::Detach { parent, child, kind }, description, name);
            self.detaches.push((Edge { parent, child, kind }, index));
        }

        // Edges to created devices are part of their creation.
        for (&(parent, child), &kind) in &new_edges {
            if !self.is_common(child) {
                continue;
            }
            if self.is_common(parent) && old_edges.get(&(parent, child)) == Some(&kind) {
                continue;
            }

            let description = edge_description(target, parent, child, kind, true);
            let name = target.find(child).map(Device::display_name).unwrap_or_default();
            let index = self.push(ActionKind::Attach { parent, child, kind }, description, name);
            self.attaches.push((Edge { parent, child, kind }, index));
        }
    }

    /// Modify-family actions for a device present in both snapshots.
    fn collect_modifications(&mut self, old: &Device, new: &Device) {
        let target = self.target;
        let sid = new.sid();
        let name = new.display_name();

        // What the device looks like once the specific actions are done.
        let mut expected = old.clone();

        if old.name() != new.name() {
            let description = format!(
                "Rename {} {} to {}",
                old.kind(),
                old.display_name(),
                new.display_name()
            );
            let index = self.push(
                ActionKind::Rename {
                    device: sid,
                    from: old.name.clone(),
                    to: new.name.clone(),
                },
                description,
                name.clone(),
            );
            self.renames.insert(sid, index);
            expected.name = new.name.clone();
        }

        if let (Some(from), Some(to)) = (old.size(), new.size()) {
            if from != to && new.is(Capability::Resizable) {
                let verb = if to < from { "Shrink" } else { "Grow" };
                let description = format!(
                    "{verb} {} {} from {from} to {to}",
                    new.kind(),
                    label(target, new)
                );
                let index = self.push(
                    ActionKind::Resize {
                        device: sid,
                        from,
                        to,
                    },
                    description,
                    name.clone(),
                );
                if to < from {
                    self.shrinks.insert(sid, index);
                } else {
                    self.grows.insert(sid, index);
                }
                expected.set_size(to);
            }
        }

        if let (Some(from), Some(to)) = (old.fs_type(), new.fs_type()) {
            if from != to {
                let description = format!(
                    "Reformat {} from {from} to {to}",
                    parent_names(target, sid)
                );
                let index = self.push(
                    ActionKind::Reformat {
                        device: sid,
                        from,
                        to,
                    },
                    description,
                    name.clone(),
                );
                self.reformats.insert(sid, index);
                if let DeviceDetails::BlkFilesystem { fs_type, .. } = &mut expected.details {
                    *fs_type = to;
                }
            }
        }

        if old.mount_point() != new.mount_point() {
            let description = match (old.mount_point(), new.mount_point()) {
                (_, Some(to)) => format!("Set mount point of {} to {to}", label(target, new)),
                (Some(from), None) => {
                    format!("Remove mount point {from} of {}", label(target, new))
                }
                (None, None) => String::new(),
            };
            let index = self.push(
                ActionKind::SetMountPoint {
                    device: sid,
                    from: old.mount_point().map(str::to_string),
                    to: new.mount_point().map(str::to_string),
                },
                description,
                name.clone(),
            );
            self.mount_points.insert(sid, index);
            expected.set_mount_point(new.mount_point().map(str::to_string));
        }

        if expected.details != new.details {
            let description = format!("Reconfigure {}", label(target, new));
            self.push(
                ActionKind::Reconfigure {
                    device: sid,
                    details: new.details.clone(),
                },
                description,
                name,
            );
        }
    }

    fn depend(&mut self, action: usize, on: Option<usize>) {
        if let Some(on) = on {
            if on != action {
                self.dependencies[action].insert(on);
            }
        }
    }

    /// Adds the dependencies between the collected actions.
    fn link(&mut self) {
        let origin = self.origin;
        let target = self.target;

        for index in 0..self.pending.len() {
            match self.pending[index].kind.clone() {
                ActionKind::Create { device, parents } => {
                    let sid = device.sid();
                    // Same sid, new kind.
                    self.depend(index, self.deletes.get(&sid).copied());

                    // A name can only be reused once its former owner is gone.
                    if let Some(name) = device.name() {
                        if let Some(old) = origin.find_by_name(name) {
                            self.depend(index, self.deletes.get(&old.sid()).copied());
                            self.depend(index, self.renames.get(&old.sid()).copied());
                        }
                    }

                    for (parent, _) in parents {
                        self.depend(index, self.creates.get(&parent).copied());
                        self.depend(index, self.shrinks.get(&parent).copied());
                        self.depend(index, self.grows.get(&parent).copied());

                        for old_child in origin.children(parent) {
                            self.depend(index, self.deletes.get(&old_child.sid()).copied());
                        }
                        for sibling in target.children(parent) {
                            self.depend(index, self.shrinks.get(&sibling.sid()).copied());
                        }
                        for (edge, detach) in self.detaches.clone() {
                            if edge.parent == parent {
                                self.depend(index, Some(detach));
                            }
                        }
                        for (edge, attach) in self.attaches.clone() {
                            if edge.child == parent {
                                self.depend(index, Some(attach));
                            }
                        }
                    }
                }
                ActionKind::Delete { device } => {
                    for child in origin.children(device) {
                        self.depend(index, self.deletes.get(&child.sid()).copied());
                    }
                    for (edge, detach) in self.detaches.clone() {
                        if edge.parent == device || edge.child == device {
                            self.depend(index, Some(detach));
                        }
                    }
                }
                ActionKind::Resize { device, from, to } if to < from => {
                    for child in origin.children(device) {
                        self.depend(index, self.shrinks.get(&child.sid()).copied());
                        self.depend(index, self.deletes.get(&child.sid()).copied());
                    }
                }
                ActionKind::Resize { device, .. } => {
                    for parent in target.parents(device) {
                        self.depend(index, self.grows.get(&parent.sid()).copied());
                        for sibling in origin.children(parent.sid()) {
                            self.depend(index, self.deletes.get(&sibling.sid()).copied());
                            self.depend(index, self.shrinks.get(&sibling.sid()).copied());
                        }
                    }
                }
                ActionKind::SetMountPoint { device, .. } => {
                    self.depend(index, self.reformats.get(&device).copied());
                }
                ActionKind::Attach { parent, child, .. } => {
                    self.depend(index, self.creates.get(&parent).copied());
                    for (_, detach) in self.detaches.clone() {
                        self.depend(index, Some(detach));
                    }
                    for old_child in origin.children(parent) {
                        self.depend(index, self.deletes.get(&old_child.sid()).copied());
                    }
                    for old_parent in origin.parents(child) {
                        self.depend(index, self.deletes.get(&old_parent.sid()).copied());
                    }
                }
                ActionKind::Reformat { .. }
                | ActionKind::Rename { .. }
                | ActionKind::Reconfigure { .. }
                | ActionKind::Detach { .. } => (),
            }
        }
    }

    /// Orders the actions: dependencies first, then by phase, name and sid.
    fn order(self) -> Result<Actiongraph, DevicegraphError> {
        let count = self.pending.len();
        let mut remaining: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (index, dependencies) in self.dependencies.iter().enumerate() {
            for dependency in dependencies {
                dependants[*dependency].push(index);
            }
        }

        let key = |index: usize| ReadyKey {
            phase: phase(&self.pending[index].kind),
            name: self.pending[index].name.clone(),
            sid: self.pending[index].kind.subject(),
            seq: index,
        };

        let mut ready: BTreeSet<ReadyKey> = (0..count)
            .filter(|index| remaining[*index] == 0)
            .map(key)
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(next) = ready.pop_first() {
            order.push(next.seq);
            for dependant in &dependants[next.seq] {
                remaining[*dependant] -= 1;
                if remaining[*dependant] == 0 {
                    ready.insert(key(*dependant));
                }
            }
        }

        if order.len() != count {
            return Err(IntegrityError::ActionCycle {
                count: count - order.len(),
            }
            .into());
        }

        let mut positions = vec![0; count];
        for (position, index) in order.iter().enumerate() {
            positions[*index] = position;
        }

        let mut pending: Vec<Option<Pending>> = self.pending.into_iter().map(Some).collect();
        let mut actions = Vec::with_capacity(count);
        for index in order {
            let Some(Pending {
                kind, description, ..
            }) = pending[index].take()
            else {
                continue;
            };
            let mut dependencies: Vec<usize> = self.dependencies[index]
                .iter()
                .map(|dependency| positions[*dependency])
                .collect();
            dependencies.sort_unstable();
            actions.push(Action {
                kind,
                description,
                dependencies,
            });
        }

        Ok(Actiongraph { actions })
    }
}

/// Names of the parents of a device, e.g. "/dev/sda1, /dev/sdb1".
fn parent_names(graph: &Devicegraph, sid: Sid) -> String {
    let names: Vec<String> = graph
        .parents(sid)
        .iter()
        .map(|parent| label(graph, parent))
        .collect();
    if names.is_empty() {
        "(nothing)".to_string()
    } else {
        names.join(", ")
    }
}

/// Short human-readable reference to a device.
///
/// Named devices go by their name; the others are described through the
/// devices they sit on, e.g. "ext4 on /dev/sda1".
fn label(graph: &Devicegraph, device: &Device) -> String {
    match device.kind() {
        DeviceKind::BlkFilesystem => {
            format!("{} on {}", device.display_name(), parent_names(graph, device.sid()))
        }
        DeviceKind::PartitionTable | DeviceKind::LvmPv | DeviceKind::BcacheCset => format!(
            "{} on {}",
            kind_noun(device.kind()),
            parent_names(graph, device.sid())
        ),
        _ => device.display_name(),
    }
}

fn kind_noun(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::PartitionTable => "partition table",
        DeviceKind::LvmPv => "physical volume",
        DeviceKind::LvmVg => "volume group",
        DeviceKind::LvmLv => "logical volume",
        DeviceKind::BcacheCset => "caching set",
        DeviceKind::Md => "RAID",
        DeviceKind::Encryption => "encryption",
        DeviceKind::Nfs => "NFS",
        DeviceKind::Disk => "disk",
        DeviceKind::Multipath => "multipath device",
        DeviceKind::DmRaid | DeviceKind::MdMember => "BIOS RAID",
        DeviceKind::StrayBlkDevice => "block device",
        DeviceKind::Partition => "partition",
        DeviceKind::Bcache => "bcache",
        DeviceKind::BlkFilesystem => "filesystem",
        DeviceKind::FreeSpace => "free space",
    }
}

fn create_description(graph: &Devicegraph, device: &Device) -> String {
    let size = device
        .size()
        .map(|size| format!(" ({size})"))
        .unwrap_or_default();

    match device.kind() {
        DeviceKind::BlkFilesystem => format!(
            "Create {} on {}",
            device.display_name(),
            parent_names(graph, device.sid())
        ),
        DeviceKind::PartitionTable => format!(
            "Create {} partition table on {}",
            device.display_name(),
            parent_names(graph, device.sid())
        ),
        DeviceKind::LvmPv | DeviceKind::BcacheCset => format!(
            "Create {} on {}",
            kind_noun(device.kind()),
            parent_names(graph, device.sid())
        ),
        DeviceKind::Encryption | DeviceKind::Bcache => format!(
            "Create {} {}{size} on {}",
            kind_noun(device.kind()),
            device.display_name(),
            parent_names(graph, device.sid())
        ),
        kind => format!("Create {} {}{size}", kind_noun(kind), device.display_name()),
    }
}

fn edge_description(
    graph: &Devicegraph,
    parent: Sid,
    child: Sid,
    kind: EdgeKind,
    attach: bool,
) -> String {
    let describe = |sid: Sid| {
        graph
            .find(sid)
            .map(|device| label(graph, device))
            .unwrap_or_else(|| format!("sid {sid}"))
    };
    let (parent_label, child_label) = (describe(parent), describe(child));

    match (kind, attach) {
        (EdgeKind::Component(ComponentRole::VgOf), true) => {
            format!("Add {parent_label} to volume group {child_label}")
        }
        (EdgeKind::Component(ComponentRole::VgOf), false) => {
            format!("Remove {parent_label} from volume group {child_label}")
        }
        (EdgeKind::Component(ComponentRole::MemberOf), true) => {
            format!("Add {parent_label} to {child_label}")
        }
        (EdgeKind::Component(ComponentRole::MemberOf), false) => {
            format!("Remove {parent_label} from {child_label}")
        }
        (_, true) => format!("Attach {parent_label} to {child_label} ({kind})"),
        (_, false) => format!("Detach {parent_label} from {child_label} ({kind})"),
    }
}
