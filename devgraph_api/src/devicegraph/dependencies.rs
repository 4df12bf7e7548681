//! What depends on what.
//!
//! Traversals use an explicit worklist and a visited set, so their depth is
//! not bounded by the stack.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;
use petgraph::{stable_graph::NodeIndex, visit::EdgeRef, Direction};

use crate::Sid;

use super::{device::Device, graph::Devicegraph, sort::compare_devices};

impl Devicegraph {
    /// Every device built on top of the given one, transitively, from the
    /// closest to the furthest.
    ///
    /// The order is topological: a device always comes after all of its
    /// parents that are also descendants. Devices ready at the same time are
    /// ordered by name. Returns `None` when the device is not in the graph.
    pub fn descendants(&self, sid: Sid) -> Option<Vec<&Device>> {
        let start = self.node_index(sid)?;
        let closure = self.closure(start, Direction::Outgoing);
        Some(self.topological(&closure))
    }

    /// Every device the given one is built from, transitively, from the
    /// roots down to its direct parents.
    pub fn ancestors(&self, sid: Sid) -> Option<Vec<&Device>> {
        let start = self.node_index(sid)?;
        let closure = self.closure(start, Direction::Incoming);
        Some(self.topological(&closure))
    }

    /// Devices that become useless once the given device and its
    /// descendants are gone: the caching set of a bcache, the physical
    /// volumes of a volume group. Kinds without such a relation have none.
    ///
    /// The devices are reported even if something else still uses them;
    /// the caller checks whether they really ended up orphaned.
    pub fn potential_orphans(&self, sid: Sid) -> Vec<Sid> {
        let Some(device) = self.find(sid) else {
            return Vec::new();
        };

        let orphans: Vec<Sid> = device
            .kind()
            .orphan_edge()
            .map(|edge| {
                self.parents_by_edge(sid, edge)
                    .into_iter()
                    .map(Device::sid)
                    .collect()
            })
            .unwrap_or_default();

        if !orphans.is_empty() {
            trace!("Potential orphans of {}: {orphans:?}", device.describe());
        }
        orphans
    }

    pub fn has_children(&self, sid: Sid) -> bool {
        self.node_index(sid).is_some_and(|idx| {
            self.inner
                .edges_directed(idx, Direction::Outgoing)
                .next()
                .is_some()
        })
    }

    pub fn has_parents(&self, sid: Sid) -> bool {
        self.node_index(sid).is_some_and(|idx| {
            self.inner
                .edges_directed(idx, Direction::Incoming)
                .next()
                .is_some()
        })
    }

    /// Nodes reachable from `start` in the given direction, without `start`.
    fn closure(&self, start: NodeIndex, direction: Direction) -> BTreeSet<NodeIndex> {
        let mut visited = BTreeSet::new();
        let mut worklist = vec![start];

        while let Some(idx) = worklist.pop() {
            for edge in self.inner.edges_directed(idx, direction) {
                let next = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                if next != start && visited.insert(next) {
                    worklist.push(next);
                }
            }
        }

        visited
    }

    /// Orders a set of nodes parents first, considering only the edges
    /// inside the set.
    fn topological(&self, nodes: &BTreeSet<NodeIndex>) -> Vec<&Device> {
        let mut pending: BTreeMap<NodeIndex, usize> = nodes
            .iter()
            .map(|idx| {
                let count = self
                    .inner
                    .edges_directed(*idx, Direction::Incoming)
                    .filter(|edge| nodes.contains(&edge.source()))
                    .count();
                (*idx, count)
            })
            .collect();

        let mut ready: Vec<NodeIndex> = pending
            .iter()
            .filter_map(|(idx, count)| (*count == 0).then_some(*idx))
            .collect();
        let mut ordered = Vec::with_capacity(nodes.len());

        loop {
            let Some((position, _)) = ready
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| compare_devices(&self.inner[**a], &self.inner[**b]))
            else {
                break;
            };
            let idx = ready.swap_remove(position);
            pending.remove(&idx);
            ordered.push(&self.inner[idx]);

            for edge in self.inner.edges_directed(idx, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&edge.target()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(edge.target());
                    }
                }
            }
        }

        ordered
    }
}
