//! # Devicegraph builder
//!
//! Builds a devicegraph out of a loose collection of devices and edges, as
//! read from a document.
//!
//! The build() function performs the following steps:
//! - Populate the graph with every device, checking that sids are unique and
//!   that each device passes its basic per-kind checks.
//! - Check that every edge references devices that exist, then add them all.
//! - Run the whole-graph validation: edge kinds, parent counts, exclusive
//!   use, multi-device filesystems, unique names and absence of cycles.
//!
//! If the output is Err, the input does not describe a valid devicegraph.

use std::collections::BTreeMap;

use log::{debug, trace};
use petgraph::{stable_graph::NodeIndex, visit::EdgeRef};

use crate::Sid;

use super::{
    device::Device,
    edges::Edge,
    error::{DevicegraphError, IntegrityError},
    graph::{DevicePetgraph, Devicegraph, SidAllocator},
    validation,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DevicegraphBuilder {
    devices: Vec<Device>,
    edges: Vec<Edge>,
}

impl DevicegraphBuilder {
    pub(crate) fn add_device(&mut self, device: Device) {
        self.devices.push(device);
    }

    pub(crate) fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Builds the devicegraph, checking every structural rule.
    pub(crate) fn build(self) -> Result<Devicegraph, DevicegraphError> {
        debug!(
            "Building devicegraph from {} device(s) and {} edge(s)",
            self.devices.len(),
            self.edges.len()
        );

        trace!("Populating devices");
        let (mut inner, index, sids) = populate_graph_nodes(self.devices)?;

        trace!("Populating edges");
        populate_graph_edges(&mut inner, &index, self.edges)?;

        trace!("Built devicegraph structure:\n{}", describe_graph(&inner));

        let graph = Devicegraph { inner, index, sids };
        validation::check_graph(&graph)?;

        debug!(
            "Devicegraph built successfully with {} devices and {} edges",
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Populates a graph with all devices. Sid uniqueness and per-device checks
/// happen here.
///
/// Edges are NOT added at this stage.
fn populate_graph_nodes(
    devices: Vec<Device>,
) -> Result<(DevicePetgraph, BTreeMap<Sid, NodeIndex>, SidAllocator), IntegrityError> {
    let mut graph = DevicePetgraph::with_capacity(devices.len(), devices.len());
    let mut index: BTreeMap<Sid, NodeIndex> = BTreeMap::new();
    let sids = SidAllocator::default();

    for device in devices {
        validation::check_device(&device)?;

        let sid = device.sid();
        if index.contains_key(&sid) {
            return Err(IntegrityError::DuplicateSid(sid));
        }

        // Devices created later must not reuse a loaded sid.
        sids.reserve(sid);

        trace!("Adding device: {}", device.describe());
        index.insert(sid, graph.add_node(device));
    }

    Ok((graph, index, sids))
}

/// Checks that all edges reference existing devices and adds them to the
/// graph.
fn populate_graph_edges(
    graph: &mut DevicePetgraph,
    index: &BTreeMap<Sid, NodeIndex>,
    edges: Vec<Edge>,
) -> Result<(), IntegrityError> {
    for edge in edges {
        let (Some(parent), Some(child)) = (index.get(&edge.parent), index.get(&edge.child)) else {
            return Err(IntegrityError::DanglingReference {
                parent: edge.parent,
                child: edge.child,
            });
        };

        trace!(
            "Adding edge from {} to {} with kind [{}]",
            graph[*parent].describe(),
            graph[*child].describe(),
            edge.kind
        );
        graph.add_edge(*parent, *child, edge.kind);
    }

    Ok(())
}

/// Returns a user-friendly description of the graph structure.
fn describe_graph(graph: &DevicePetgraph) -> String {
    let mut buf: Vec<String> = Vec::new();
    for node_idx in graph.node_indices() {
        buf.push(format!("[{}] {}", node_idx.index(), graph[node_idx].describe()));
        for edge in graph.edges(node_idx) {
            buf.push(format!(
                "  -> [{}] {} ({})",
                edge.target().index(),
                graph[edge.target()].describe(),
                edge.weight()
            ));
        }
    }

    buf.join("\n")
}
