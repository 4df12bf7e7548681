//! Deterministic tree rendering of a devicegraph.
//!
//! Devices without parents are the roots; every device is nested under its
//! parents in name-aware order. Sids and udev names are left out, so two
//! snapshots built independently render the same when they describe the
//! same structure. A device with several parents is rendered in full under
//! the first one reached and as a `ref` under the others.

use std::collections::BTreeSet;

use serde_yaml::{Mapping, Value};

use crate::Sid;

use super::{device::Device, document::DeviceEntry, edges::EdgeKind, graph::Devicegraph};

/// Document fields that identify a device in one snapshot only.
const SNAPSHOT_FIELDS: [&str; 2] = ["sid", "udev-name"];

impl Devicegraph {
    /// Renders the snapshot as a YAML sequence of root devices.
    pub fn to_tree(&self) -> Result<Value, serde_yaml::Error> {
        let mut emitted = BTreeSet::new();
        let mut roots = Vec::new();

        for device in self.devices() {
            if !self.has_parents(device.sid()) {
                roots.push(self.tree_node(device, None, &mut emitted)?);
            }
        }

        // Only reachable in broken snapshots, where a cycle has no root.
        for device in self.devices() {
            if !emitted.contains(&device.sid()) {
                roots.push(self.tree_node(device, None, &mut emitted)?);
            }
        }

        Ok(Value::Sequence(roots))
    }

    pub fn to_tree_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_tree()?)
    }

    /// Returns whether both snapshots render the same tree: same devices
    /// with the same attributes, connected the same way, regardless of sids.
    pub fn structurally_eq(&self, other: &Devicegraph) -> bool {
        match (self.to_tree(), other.to_tree()) {
            (Ok(ours), Ok(theirs)) => ours == theirs,
            _ => false,
        }
    }

    fn tree_node(
        &self,
        device: &Device,
        via: Option<EdgeKind>,
        emitted: &mut BTreeSet<Sid>,
    ) -> Result<Value, serde_yaml::Error> {
        let mut node = Mapping::new();
        if let Some(via) = via {
            node.insert("via".into(), via.name().into());
        }

        if !emitted.insert(device.sid()) {
            node.insert("ref".into(), device.display_name().into());
            return Ok(Value::Mapping(node));
        }

        if let Value::Mapping(entry) = serde_yaml::to_value(DeviceEntry::from(device))? {
            for (key, value) in entry {
                if !key.as_str().is_some_and(|key| SNAPSHOT_FIELDS.contains(&key)) {
                    node.insert(key, value);
                }
            }
        }

        let children = self
            .children_with_edges(device.sid())
            .into_iter()
            .map(|(child, kind)| self.tree_node(child, Some(kind), emitted))
            .collect::<Result<Vec<_>, _>>()?;
        if !children.is_empty() {
            node.insert("children".into(), Value::Sequence(children));
        }

        Ok(Value::Mapping(node))
    }
}
