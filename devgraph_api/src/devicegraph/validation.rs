//! Integrity checks shared by edge insertion, the builder and `check()`.

use std::collections::BTreeSet;

use petgraph::{
    algo::{has_path_connecting, toposort},
    stable_graph::NodeIndex,
    visit::EdgeRef,
    Direction,
};

use super::{
    device::{Device, DeviceDetails},
    edges::EdgeKind,
    error::{pretty_device, IntegrityError},
    graph::Devicegraph,
};

/// Runs the context-free checks of a single device.
pub(crate) fn check_device(device: &Device) -> Result<(), IntegrityError> {
    device
        .basic_check()
        .map_err(|e| IntegrityError::BasicCheckFailed {
            device: pretty_device(device),
            kind: device.kind(),
            body: e.to_string(),
        })
}

/// Checks that the edge kind can connect the two devices.
fn check_edge_kinds(parent: &Device, child: &Device, kind: EdgeKind) -> Result<(), IntegrityError> {
    if kind.valid_parents().contains(parent.kind().as_flag())
        && kind.valid_children().contains(child.kind().as_flag())
    {
        return Ok(());
    }

    Err(IntegrityError::InvalidEdge {
        kind,
        parent: pretty_device(parent),
        parent_kind: parent.kind(),
        child: pretty_device(child),
        child_kind: child.kind(),
        valid_parents: kind.valid_parents(),
        valid_children: kind.valid_children(),
    })
}

/// Checks that a new edge can be added to the graph.
pub(crate) fn check_new_edge(
    graph: &Devicegraph,
    parent_idx: NodeIndex,
    child_idx: NodeIndex,
    kind: EdgeKind,
) -> Result<(), IntegrityError> {
    let parent = &graph.inner[parent_idx];
    let child = &graph.inner[child_idx];

    check_edge_kinds(parent, child, kind)?;

    if graph.inner.find_edge(parent_idx, child_idx).is_some() {
        return Err(IntegrityError::DuplicateEdge {
            parent: pretty_device(parent),
            child: pretty_device(child),
        });
    }

    if kind.is_exclusive_use() {
        if let Some(existing) = graph
            .inner
            .edges_directed(parent_idx, Direction::Outgoing)
            .find(|edge| edge.weight().is_exclusive_use())
        {
            return Err(IntegrityError::ForbiddenSharing {
                parent: pretty_device(parent),
                first: pretty_device(&graph.inner[existing.target()]),
                second: pretty_device(child),
            });
        }
    }

    if let Some(max) = kind.max_per_child() {
        let count = graph
            .inner
            .edges_directed(child_idx, Direction::Incoming)
            .filter(|edge| *edge.weight() == kind)
            .count();
        if count >= max {
            return Err(IntegrityError::TooManyEdges {
                device: pretty_device(child),
                kind,
                max,
            });
        }
    }

    let parent_count = graph
        .inner
        .edges_directed(child_idx, Direction::Incoming)
        .count();
    let expected = child.kind().valid_parent_count();
    if !expected.allows_one_more(parent_count) {
        return Err(IntegrityError::InvalidParentCount {
            device: pretty_device(child),
            kind: child.kind(),
            parent_count: parent_count + 1,
            expected,
        });
    }

    if let Some(fs_type) = child.fs_type() {
        if parent_count >= 1 && !fs_type.supports_multiple_devices() {
            return Err(IntegrityError::MultiDeviceFilesystem {
                device: pretty_device(child),
                fs_type,
                device_count: parent_count + 1,
            });
        }
    }

    if has_path_connecting(&graph.inner, child_idx, parent_idx, None) {
        return Err(IntegrityError::Cycle {
            device: pretty_device(child),
        });
    }

    Ok(())
}

/// Checks the whole graph.
pub(crate) fn check_graph(graph: &Devicegraph) -> Result<(), IntegrityError> {
    check_index(graph)?;

    // Per-device checks and unique names.
    let mut names = BTreeSet::new();
    for device in graph.raw_devices() {
        check_device(device)?;
        if let Some(name) = device.name() {
            if !names.insert(name) {
                return Err(IntegrityError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }
    }

    for edge in graph.inner.edge_indices() {
        let Some((parent, child)) = graph.inner.edge_endpoints(edge) else {
            continue;
        };
        check_edge_kinds(&graph.inner[parent], &graph.inner[child], graph.inner[edge])?;
    }

    for idx in graph.index.values() {
        check_relationships(graph, *idx)?;
    }

    toposort(&graph.inner, None).map_err(|cycle| IntegrityError::Cycle {
        device: pretty_device(&graph.inner[cycle.node_id()]),
    })?;

    Ok(())
}

/// Checks that the sid index and the graph agree.
fn check_index(graph: &Devicegraph) -> Result<(), IntegrityError> {
    for (sid, idx) in &graph.index {
        match graph.inner.node_weight(*idx) {
            Some(device) if device.sid == *sid => (),
            _ => return Err(IntegrityError::IndexMismatch(*sid)),
        }
    }

    if graph.index.len() != graph.inner.node_count() {
        if let Some(unindexed) = graph
            .inner
            .node_indices()
            .map(|idx| graph.inner[idx].sid)
            .find(|sid| !graph.index.contains_key(sid))
        {
            return Err(IntegrityError::IndexMismatch(unindexed));
        }

        // Two nodes share a sid.
        let mut seen = BTreeSet::new();
        for idx in graph.inner.node_indices() {
            if !seen.insert(graph.inner[idx].sid) {
                return Err(IntegrityError::DuplicateSid(graph.inner[idx].sid));
            }
        }
    }

    Ok(())
}

/// Checks the parents and children of one device.
fn check_relationships(graph: &Devicegraph, idx: NodeIndex) -> Result<(), IntegrityError> {
    let device = &graph.inner[idx];

    let incoming: Vec<(NodeIndex, EdgeKind)> = graph
        .inner
        .edges_directed(idx, Direction::Incoming)
        .map(|edge| (edge.source(), *edge.weight()))
        .collect();

    let expected = device.kind().valid_parent_count();
    if !expected.contains(incoming.len()) {
        return Err(IntegrityError::InvalidParentCount {
            device: pretty_device(device),
            kind: device.kind(),
            parent_count: incoming.len(),
            expected,
        });
    }

    let distinct_parents: BTreeSet<NodeIndex> = incoming.iter().map(|(parent, _)| *parent).collect();
    if distinct_parents.len() != incoming.len() {
        return Err(IntegrityError::DuplicateEdge {
            parent: incoming
                .iter()
                .find(|(parent, _)| incoming.iter().filter(|(p, _)| p == parent).count() > 1)
                .map(|(parent, _)| pretty_device(&graph.inner[*parent]))
                .unwrap_or_default(),
            child: pretty_device(device),
        });
    }

    for kind in EdgeKind::ALL {
        if let Some(max) = kind.max_per_child() {
            if incoming.iter().filter(|(_, k)| *k == kind).count() > max {
                return Err(IntegrityError::TooManyEdges {
                    device: pretty_device(device),
                    kind,
                    max,
                });
            }
        }
    }

    if let Some(fs_type) = device.fs_type() {
        if incoming.len() > 1 && !fs_type.supports_multiple_devices() {
            return Err(IntegrityError::MultiDeviceFilesystem {
                device: pretty_device(device),
                fs_type,
                device_count: incoming.len(),
            });
        }
    }

    if let DeviceDetails::Partition { region, .. } = device.details() {
        let device_size = incoming
            .iter()
            .filter(|(_, kind)| *kind == EdgeKind::PARTITION_OF)
            .flat_map(|(table, _)| graph.inner.edges_directed(*table, Direction::Incoming))
            .find_map(|edge| graph.inner[edge.source()].size());
        if let Some(device_size) = device_size {
            if region.end_bytes() > device_size {
                return Err(IntegrityError::RegionOutsideDevice {
                    device: pretty_device(device),
                    region: region.to_string(),
                    device_size: device_size.to_string(),
                });
            }
        }
    }

    let exclusive: Vec<NodeIndex> = graph
        .inner
        .edges_directed(idx, Direction::Outgoing)
        .filter(|edge| edge.weight().is_exclusive_use())
        .map(|edge| edge.target())
        .collect();
    if let [first, second, ..] = exclusive.as_slice() {
        return Err(IntegrityError::ForbiddenSharing {
            parent: pretty_device(device),
            first: pretty_device(&graph.inner[*first]),
            second: pretty_device(&graph.inner[*second]),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        devicegraph::{
            device::{Device, DeviceDetails},
            types::{DeviceKind, PartitionTableType},
        },
        primitives::bytes::ByteCount,
        Sid,
    };

    use super::*;

    #[test]
    fn test_check_reports_missing_parents() {
        let mut graph = Devicegraph::new();
        graph
            .add_device(
                None,
                DeviceDetails::PartitionTable {
                    table_type: PartitionTableType::Msdos,
                },
            )
            .unwrap();

        assert!(matches!(
            check_graph(&graph),
            Err(IntegrityError::InvalidParentCount {
                kind: DeviceKind::PartitionTable,
                parent_count: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_check_reports_cycles() {
        // Cycles cannot be built through add_edge, so poke the inner graph.
        let mut graph = Devicegraph::new();
        let md0 = graph
            .add_device(
                Some("/dev/md0"),
                DeviceDetails::Md {
                    size: ByteCount::from_gib(1),
                    level: crate::devicegraph::types::RaidLevel::Raid1,
                },
            )
            .unwrap();
        let md1 = graph
            .add_device(
                Some("/dev/md1"),
                DeviceDetails::Md {
                    size: ByteCount::from_gib(1),
                    level: crate::devicegraph::types::RaidLevel::Raid1,
                },
            )
            .unwrap();
        graph.add_edge(md0, md1, EdgeKind::MEMBER_OF).unwrap();
        assert!(matches!(
            graph.add_edge(md1, md0, EdgeKind::MEMBER_OF),
            Err(crate::DevicegraphError::GraphIntegrity(
                IntegrityError::Cycle { .. }
            ))
        ));

        let idx0 = graph.node_index(md0).unwrap();
        let idx1 = graph.node_index(md1).unwrap();
        graph.inner.add_edge(idx1, idx0, EdgeKind::MEMBER_OF);
        assert!(matches!(
            check_graph(&graph),
            Err(IntegrityError::Cycle { .. })
        ));
    }

    #[test]
    fn test_check_reports_index_mismatch() {
        let mut graph = Devicegraph::new();
        let sda = graph
            .add_device(Some("/dev/sda"), DeviceDetails::disk(ByteCount::from_gib(1)))
            .unwrap();
        graph.index.insert(Sid(500), graph.node_index(sda).unwrap());
        assert_eq!(check_graph(&graph), Err(IntegrityError::IndexMismatch(Sid(500))));

        let mut graph = Devicegraph::new();
        graph.inner.add_node(Device::new(
            Sid(7),
            Some("/dev/sdz".into()),
            DeviceDetails::disk(ByteCount::from_gib(1)),
        ));
        assert_eq!(check_graph(&graph), Err(IntegrityError::IndexMismatch(Sid(7))));
    }

    #[test]
    fn test_check_accepts_flash_bcache() {
        let mut graph = Devicegraph::new();
        let sda = graph
            .add_device(Some("/dev/sda"), DeviceDetails::disk(ByteCount::from_gib(1)))
            .unwrap();
        let cset = graph
            .add_device(None, DeviceDetails::BcacheCset { uuid: None })
            .unwrap();
        graph.add_edge(sda, cset, EdgeKind::CACHING_OF).unwrap();
        let bcache = graph
            .add_device(
                Some("/dev/bcache0"),
                DeviceDetails::Bcache {
                    size: ByteCount::from_gib(1),
                    cache_mode: Default::default(),
                },
            )
            .unwrap();
        graph.add_edge(cset, bcache, EdgeKind::CSET_OF).unwrap();
        assert_eq!(check_graph(&graph), Ok(()));

        // Neither a backing device nor a caching set.
        graph
            .add_device(
                Some("/dev/bcache1"),
                DeviceDetails::Bcache {
                    size: ByteCount::from_gib(1),
                    cache_mode: Default::default(),
                },
            )
            .unwrap();
        assert!(matches!(
            check_graph(&graph),
            Err(IntegrityError::InvalidParentCount { .. })
        ));
    }
}
