// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The in-memory channel graph: a directed weighted multigraph over node ids,
//! carrying one edge per enabled directional channel update.
//!
//! Only the unsigned policy data of an update is kept on the edge; the full
//! signed message lives in the router's update maps. This is what lets
//! routing hints overlay unsigned synthetic updates without inventing
//! signatures for them.

use crate::ln::msgs::UnsignedChannelUpdate;
use crate::routing::gossip::NodeId;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// The reference amount used to weigh edges, in millisatoshi. Weighing every
/// edge at a fixed forwarded amount keeps weights static across queries;
/// amount-aware weighting is left to higher layers.
pub const WEIGHT_REFERENCE_AMOUNT_MSAT: u64 = 10_000_000;

/// A directed edge key: the channel and the ordered pair of its endpoints,
/// `a` being the endpoint whose update the edge carries.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelDesc {
	/// The channel's short channel id.
	pub short_channel_id: u64,
	/// The node the edge leads out of, i.e. the originator of the update.
	pub a: NodeId,
	/// The node the edge leads into.
	pub b: NodeId,
}

/// One directed edge of the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphEdge {
	/// The edge key.
	pub desc: ChannelDesc,
	/// The forwarding policy the edge was built from.
	pub update: UnsignedChannelUpdate,
	/// The fee, in millisatoshi, to forward the reference amount across the
	/// edge.
	pub weight: u64,
}

/// The fee, in millisatoshi, charged under `update`'s fee schedule to forward
/// [`WEIGHT_REFERENCE_AMOUNT_MSAT`].
pub fn edge_weight(update: &UnsignedChannelUpdate) -> u64 {
	update.fee_base_msat as u64
		+ (update.fee_proportional_millionths as u64 * WEIGHT_REFERENCE_AMOUNT_MSAT) / 1_000_000
}

/// A directed weighted multigraph over node public keys.
///
/// Mutated in place under the router's single-event discipline; cloned for
/// route queries that overlay hints or remove blacklisted edges, so that the
/// base graph is never observed mid-mutation.
#[derive(Clone, Default)]
pub struct DirectedGraph {
	adjacency: HashMap<NodeId, Vec<GraphEdge>>,
}

impl DirectedGraph {
	/// Constructs a new, empty graph.
	pub fn new() -> Self {
		DirectedGraph { adjacency: HashMap::new() }
	}

	/// Adds the edge described by `desc` carrying `update`, creating both
	/// endpoint vertices if needed. Disabled updates add no edge.
	pub fn add_edge(&mut self, desc: ChannelDesc, update: &UnsignedChannelUpdate) {
		if update.is_disabled() {
			return;
		}
		let edge = GraphEdge { desc, update: update.clone(), weight: edge_weight(update) };
		self.adjacency.entry(desc.b).or_insert_with(Vec::new);
		self.adjacency.entry(desc.a).or_insert_with(Vec::new).push(edge);
	}

	/// Removes the edge whose carried desc equals `desc`, if present.
	/// Vertices are not reclaimed.
	pub fn remove_edge(&mut self, desc: &ChannelDesc) {
		if let Entry::Occupied(mut entry) = self.adjacency.entry(desc.a) {
			entry.get_mut().retain(|edge| edge.desc != *desc);
		}
	}

	/// Removes a vertex and its outgoing edges. Incoming edges are expected
	/// to have been removed alongside their channels already.
	pub fn remove_vertex(&mut self, node_id: &NodeId) {
		self.adjacency.remove(node_id);
	}

	/// Returns true if the vertex exists, i.e. some current edge references it.
	pub fn contains_vertex(&self, node_id: &NodeId) -> bool {
		self.adjacency.contains_key(node_id)
	}

	/// The outgoing edges of a vertex.
	pub fn edges_from(&self, node_id: &NodeId) -> &[GraphEdge] {
		self.adjacency.get(node_id).map(|edges| &edges[..]).unwrap_or(&[])
	}

	/// All edge descs with an endpoint in `nodes`.
	pub fn descs_touching(&self, nodes: &HashSet<NodeId>) -> Vec<ChannelDesc> {
		let mut descs = Vec::new();
		for edges in self.adjacency.values() {
			for edge in edges.iter() {
				if nodes.contains(&edge.desc.a) || nodes.contains(&edge.desc.b) {
					descs.push(edge.desc);
				}
			}
		}
		descs
	}

	/// The number of vertices.
	pub fn vertex_count(&self) -> usize {
		self.adjacency.len()
	}

	/// The number of edges.
	pub fn edge_count(&self) -> usize {
		self.adjacency.values().map(|edges| edges.len()).sum()
	}
}
