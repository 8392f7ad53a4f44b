// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The route computation logic lives here: cheapest-path queries against the
//! channel graph, with caller-supplied routing-hint overlays and node/channel
//! blacklists applied to a per-query copy of the graph.

use crate::ln::msgs::UnsignedChannelUpdate;
use crate::routing::gossip::{public_descs, NodeId, Router, RouterError};
use crate::routing::graph::{ChannelDesc, DirectedGraph, GraphEdge};
use crate::routing::validation::ChainValidator;
use crate::util::logger::Logger;
use crate::util::persist::NetworkStore;

use bitcoin::hash_types::BlockHash;

use core::cmp;
use core::ops::Deref;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// One hop of a routing hint: a channel from `node_id` towards the next hop
/// in the hint (or the payment target, for the last hop), with the policy the
/// hinting party says applies on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistedHop {
	/// The node the hinted channel leads out of.
	pub node_id: NodeId,
	/// The short_channel_id of the hinted channel.
	pub short_channel_id: u64,
	/// The base fee charged on the hinted channel, in millisatoshi.
	pub fee_base_msat: u32,
	/// The amount-proportional fee charged on the hinted channel, in
	/// millionths.
	pub fee_proportional_millionths: u32,
	/// The CLTV delta required by the hinted channel.
	pub cltv_expiry_delta: u16,
}

/// A cheapest-path query.
#[derive(Clone, Debug)]
pub struct RouteRequest {
	/// The paying node.
	pub source: NodeId,
	/// The node to be paid.
	pub target: NodeId,
	/// Routing hints from the payee's invoice, each an ordered partial path
	/// whose last hop reaches `target`. Overlaid on the public graph for the
	/// duration of the query.
	pub assisted_routes: Vec<Vec<AssistedHop>>,
	/// Nodes the payment layer wants avoided, typically after earlier
	/// failures.
	pub ignore_nodes: HashSet<NodeId>,
	/// Channels the payment layer has concluded are dead. Besides being
	/// blacklisted for this query, they are forgotten outright.
	pub ignore_channels: HashSet<u64>,
}

/// One directed edge of a computed route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hop {
	/// The node the hop leads out of.
	pub node_id: NodeId,
	/// The node the hop leads into.
	pub next_node_id: NodeId,
	/// The forwarding policy of the traversed channel.
	pub update: UnsignedChannelUpdate,
}

/// A successfully computed route. Echoes the caller's blacklists so a
/// retrying payment layer can extend them without extra bookkeeping.
#[derive(Clone, Debug)]
pub struct RouteResponse {
	/// The route's hops, source first.
	pub hops: Vec<Hop>,
	/// The `ignore_nodes` of the request.
	pub ignore_nodes: HashSet<NodeId>,
	/// The `ignore_channels` of the request.
	pub ignore_channels: HashSet<u64>,
}

/// It's useful to compare nodes by the fee required to reach them as we walk
/// the graph, so that the cheapest frontier node pops first (Dijkstra). The
/// ordering is inverted since [`BinaryHeap`] is a max-heap.
#[derive(PartialEq, Eq)]
struct RouteGraphNode {
	node_id: NodeId,
	lowest_fee_to_node: u64,
}

impl cmp::Ord for RouteGraphNode {
	fn cmp(&self, other: &RouteGraphNode) -> cmp::Ordering {
		other.lowest_fee_to_node.cmp(&self.lowest_fee_to_node)
			.then_with(|| other.node_id.cmp(&self.node_id))
	}
}

impl cmp::PartialOrd for RouteGraphNode {
	fn partial_cmp(&self, other: &RouteGraphNode) -> Option<cmp::Ordering> {
		Some(self.cmp(other))
	}
}

/// Single-source cheapest path from `source` to `target`. Edge weights are
/// non-negative by construction, so plain Dijkstra applies.
fn shortest_path(graph: &DirectedGraph, source: &NodeId, target: &NodeId) -> Option<Vec<GraphEdge>> {
	let mut dist: HashMap<NodeId, u64> = HashMap::new();
	let mut prev: HashMap<NodeId, GraphEdge> = HashMap::new();
	let mut heap = BinaryHeap::new();

	dist.insert(*source, 0);
	heap.push(RouteGraphNode { node_id: *source, lowest_fee_to_node: 0 });

	while let Some(RouteGraphNode { node_id, lowest_fee_to_node }) = heap.pop() {
		if node_id == *target {
			break;
		}
		if lowest_fee_to_node > *dist.get(&node_id).unwrap_or(&u64::MAX) {
			continue;
		}
		for edge in graph.edges_from(&node_id) {
			let fee_through_edge = lowest_fee_to_node.saturating_add(edge.weight);
			if fee_through_edge < *dist.get(&edge.desc.b).unwrap_or(&u64::MAX) {
				dist.insert(edge.desc.b, fee_through_edge);
				prev.insert(edge.desc.b, edge.clone());
				heap.push(RouteGraphNode { node_id: edge.desc.b, lowest_fee_to_node: fee_through_edge });
			}
		}
	}

	let mut hops = Vec::new();
	let mut cursor = *target;
	while cursor != *source {
		let edge = prev.get(&cursor)?;
		cursor = edge.desc.a;
		hops.push(edge.clone());
	}
	hops.reverse();
	Some(hops)
}

/// Converts one assisted route into synthetic directed edges, pairing each
/// hop with the node of the next (the last hop pairs with `target`). The
/// synthetic updates are unsigned and always enabled.
fn assisted_route_updates(chain_hash: BlockHash, route: &[AssistedHop], target: NodeId) -> Vec<(ChannelDesc, UnsignedChannelUpdate)> {
	let mut overlays = Vec::with_capacity(route.len());
	for (idx, hop) in route.iter().enumerate() {
		let next_node_id = route.get(idx + 1).map(|next| next.node_id).unwrap_or(target);
		let desc = ChannelDesc { short_channel_id: hop.short_channel_id, a: hop.node_id, b: next_node_id };
		let update = UnsignedChannelUpdate {
			chain_hash,
			short_channel_id: hop.short_channel_id,
			timestamp: 0,
			message_flags: 0,
			channel_flags: 0,
			cltv_expiry_delta: hop.cltv_expiry_delta,
			htlc_minimum_msat: 0,
			fee_base_msat: hop.fee_base_msat,
			fee_proportional_millionths: hop.fee_proportional_millionths,
			htlc_maximum_msat: None,
		};
		overlays.push((desc, update));
	}
	overlays
}

impl<S: Deref, C: Deref, L: Deref> Router<S, C, L>
where
	S::Target: NetworkStore,
	C::Target: ChainValidator,
	L::Target: Logger,
{
	/// Computes the cheapest route from `source` to `target`.
	///
	/// Assisted routes are overlaid on (and beat) the public graph; the
	/// blacklist is the union of the standing exclusions, every edge touching
	/// `ignore_nodes`, and both directions of each `ignore_channels` entry.
	/// When any overlay or blacklist applies, the query runs on a copy of
	/// the graph and the base graph is left untouched.
	///
	/// Channels in `ignore_channels` are additionally treated as spent and
	/// forgotten, which is why this takes `&mut self`.
	pub fn find_route(&mut self, request: RouteRequest) -> Result<RouteResponse, RouterError> {
		log_debug!(self.logger, "Finding a route {} -> {} with {} assisted routes, {} ignored nodes, {} ignored channels",
			request.source, request.target, request.assisted_routes.len(),
			request.ignore_nodes.len(), request.ignore_channels.len());

		// Resolve ignored channels to directed descs while their endpoints
		// are still known, then forget the channels themselves.
		let mut blacklist: Vec<ChannelDesc> = Vec::new();
		for short_channel_id in request.ignore_channels.iter() {
			if let Some(announcement) = self.channels.get(short_channel_id) {
				let (desc_one, desc_two) = public_descs(announcement);
				blacklist.push(desc_one);
				blacklist.push(desc_two);
			} else if let Some(remote_node_id) = self.private_channels.get(short_channel_id) {
				blacklist.push(ChannelDesc { short_channel_id: *short_channel_id, a: self.node_id, b: *remote_node_id });
				blacklist.push(ChannelDesc { short_channel_id: *short_channel_id, a: *remote_node_id, b: self.node_id });
			}
		}
		for short_channel_id in request.ignore_channels.iter() {
			self.handle_external_funding_spent(*short_channel_id)?;
		}

		let mut overlays: Vec<(ChannelDesc, UnsignedChannelUpdate)> = Vec::new();
		for route in request.assisted_routes.iter() {
			overlays.extend(assisted_route_updates(self.chain_hash, route, request.target));
		}

		let needs_copy = !overlays.is_empty() || !blacklist.is_empty()
			|| !self.excluded_channels.is_empty() || !request.ignore_nodes.is_empty();
		let working_copy;
		let working_graph: &DirectedGraph = if needs_copy {
			let mut graph = self.graph.clone();
			for (desc, update) in overlays.iter() {
				graph.remove_edge(desc);
				graph.add_edge(*desc, update);
			}
			if !request.ignore_nodes.is_empty() {
				for desc in graph.descs_touching(&request.ignore_nodes) {
					graph.remove_edge(&desc);
				}
			}
			for desc in blacklist.iter() {
				graph.remove_edge(desc);
			}
			for desc in self.excluded_channels.keys() {
				graph.remove_edge(desc);
			}
			working_copy = graph;
			&working_copy
		} else {
			&self.graph
		};

		if !working_graph.contains_vertex(&request.source) || !working_graph.contains_vertex(&request.target) {
			return Err(RouterError::RouteNotFound);
		}
		if request.source == request.target {
			return Err(RouterError::CannotRouteToSelf);
		}
		let edges = shortest_path(working_graph, &request.source, &request.target)
			.ok_or(RouterError::RouteNotFound)?;
		if edges.is_empty() {
			return Err(RouterError::RouteNotFound);
		}
		log_debug!(self.logger, "Found a route {} -> {} with {} hops", request.source, request.target, edges.len());

		let hops = edges.into_iter()
			.map(|edge| Hop { node_id: edge.desc.a, next_node_id: edge.desc.b, update: edge.update })
			.collect();
		Ok(RouteResponse {
			hops,
			ignore_nodes: request.ignore_nodes,
			ignore_channels: request.ignore_channels,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::routing::gossip::{NodeId, RouterEvent};
	use crate::util::test_utils::{
		get_signed_channel_announcement, get_signed_update_between, our_node_key, RouterTestHarness,
	};

	use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

	/// Announces a channel between the two keys and applies an enabled update
	/// in the `from_key -> to_key` direction with the given fees.
	fn add_channel_with_update(
		harness: &mut RouterTestHarness, short_channel_id: u64, from_key: &SecretKey,
		to_key: &SecretKey, fee_base_msat: u32, fee_proportional_millionths: u32,
	) {
		let secp_ctx = Secp256k1::new();
		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = short_channel_id;
		}, from_key, to_key, &secp_ctx);
		let origin = PublicKey::from_secret_key(&secp_ctx, from_key);
		harness.router().handle_channel_announcement(&origin, &announcement).unwrap();
		let update = get_signed_update_between(short_channel_id, from_key, to_key, |unsigned_update| {
			unsigned_update.fee_base_msat = fee_base_msat;
			unsigned_update.fee_proportional_millionths = fee_proportional_millionths;
		}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &update).unwrap();
	}

	fn node_id(key_byte: u8) -> NodeId {
		let secp_ctx = Secp256k1::new();
		let key = SecretKey::from_slice(&[key_byte; 32]).unwrap();
		NodeId::from_pubkey(&PublicKey::from_secret_key(&secp_ctx, &key))
	}

	fn request(source: NodeId, target: NodeId) -> RouteRequest {
		RouteRequest {
			source,
			target,
			assisted_routes: Vec::new(),
			ignore_nodes: HashSet::new(),
			ignore_channels: HashSet::new(),
		}
	}

	#[test]
	fn finds_cheapest_path() {
		let mut harness = RouterTestHarness::new();
		let key_a = SecretKey::from_slice(&[11; 32]).unwrap();
		let key_b = SecretKey::from_slice(&[12; 32]).unwrap();
		let key_c = SecretKey::from_slice(&[13; 32]).unwrap();

		// Two ways from a to c: direct but expensive, or via b.
		add_channel_with_update(&mut harness, 1, &key_a, &key_c, 50_000, 0);
		add_channel_with_update(&mut harness, 2, &key_a, &key_b, 1_000, 0);
		add_channel_with_update(&mut harness, 3, &key_b, &key_c, 1_000, 0);

		let response = harness.router().find_route(request(node_id(11), node_id(13))).unwrap();
		let scids: Vec<u64> = response.hops.iter().map(|hop| hop.update.short_channel_id).collect();
		assert_eq!(scids, vec![2, 3]);
		assert_eq!(response.hops[0].node_id, node_id(11));
		assert_eq!(response.hops[1].next_node_id, node_id(13));
	}

	#[test]
	fn fails_without_endpoints_or_path() {
		let mut harness = RouterTestHarness::new();
		let key_a = SecretKey::from_slice(&[11; 32]).unwrap();
		let key_b = SecretKey::from_slice(&[12; 32]).unwrap();
		add_channel_with_update(&mut harness, 1, &key_a, &key_b, 1_000, 0);

		// Unknown target.
		match harness.router().find_route(request(node_id(11), node_id(14))) {
			Err(RouterError::RouteNotFound) => {},
			other => panic!("unexpected result: {:?}", other.map(|r| r.hops)),
		}

		// Known endpoints but no directed path (the only edge runs a -> b).
		match harness.router().find_route(request(node_id(12), node_id(11))) {
			Err(RouterError::RouteNotFound) => {},
			other => panic!("unexpected result: {:?}", other.map(|r| r.hops)),
		}

		match harness.router().find_route(request(node_id(11), node_id(11))) {
			Err(RouterError::CannotRouteToSelf) => {},
			other => panic!("unexpected result: {:?}", other.map(|r| r.hops)),
		}
	}

	#[test]
	fn assisted_route_extends_the_graph() {
		// The S3 shape: the graph knows a -> b -> c, the invoice hints the
		// final c -> d hop.
		let mut harness = RouterTestHarness::new();
		let key_a = SecretKey::from_slice(&[11; 32]).unwrap();
		let key_b = SecretKey::from_slice(&[12; 32]).unwrap();
		let key_c = SecretKey::from_slice(&[13; 32]).unwrap();

		add_channel_with_update(&mut harness, 1, &key_a, &key_b, 5_000, 0);
		add_channel_with_update(&mut harness, 2, &key_b, &key_c, 3_000, 0);
		let edge_count = harness.router().graph().edge_count();

		let mut req = request(node_id(11), node_id(14));
		req.assisted_routes = vec![vec![AssistedHop {
			node_id: node_id(13),
			short_channel_id: 42,
			fee_base_msat: 2,
			fee_proportional_millionths: 0,
			cltv_expiry_delta: 9,
		}]];
		let response = harness.router().find_route(req).unwrap();
		assert_eq!(response.hops.len(), 3);
		assert_eq!(response.hops[2].node_id, node_id(13));
		assert_eq!(response.hops[2].next_node_id, node_id(14));
		assert_eq!(response.hops[2].update.short_channel_id, 42);

		// The overlay must not leak into the base graph.
		assert_eq!(harness.router().graph().edge_count(), edge_count);
		assert!(!harness.router().graph().contains_vertex(&node_id(14)));
	}

	#[test]
	fn ignored_nodes_are_blacklisted() {
		// The S4 shape: the only path runs through b, and b is ignored.
		let mut harness = RouterTestHarness::new();
		let key_a = SecretKey::from_slice(&[11; 32]).unwrap();
		let key_b = SecretKey::from_slice(&[12; 32]).unwrap();
		let key_c = SecretKey::from_slice(&[13; 32]).unwrap();

		add_channel_with_update(&mut harness, 1, &key_a, &key_b, 5_000, 0);
		add_channel_with_update(&mut harness, 2, &key_b, &key_c, 3_000, 0);

		let mut req = request(node_id(11), node_id(13));
		req.ignore_nodes.insert(node_id(12));
		match harness.router().find_route(req) {
			Err(RouterError::RouteNotFound) => {},
			other => panic!("unexpected result: {:?}", other.map(|r| r.hops)),
		}

		// Without the blacklist the route exists and the response echoes the
		// empty ignore sets.
		let response = harness.router().find_route(request(node_id(11), node_id(13))).unwrap();
		assert_eq!(response.hops.len(), 2);
		assert!(response.ignore_nodes.is_empty());
		assert!(response.ignore_channels.is_empty());
	}

	#[test]
	fn ignored_channels_are_forgotten() {
		let mut harness = RouterTestHarness::new();
		let key_a = SecretKey::from_slice(&[11; 32]).unwrap();
		let key_b = SecretKey::from_slice(&[12; 32]).unwrap();
		let key_c = SecretKey::from_slice(&[13; 32]).unwrap();

		add_channel_with_update(&mut harness, 1, &key_a, &key_b, 1_000, 0);
		add_channel_with_update(&mut harness, 2, &key_b, &key_c, 1_000, 0);
		add_channel_with_update(&mut harness, 3, &key_a, &key_c, 50_000, 0);

		let mut req = request(node_id(11), node_id(13));
		req.ignore_channels.insert(2);
		let response = harness.router().find_route(req).unwrap();
		let scids: Vec<u64> = response.hops.iter().map(|hop| hop.update.short_channel_id).collect();
		assert_eq!(scids, vec![3]);
		assert_eq!(response.ignore_channels.len(), 1);

		// The ignored channel was synthesized as spent: it is gone from the
		// router state, not just from this query.
		assert!(harness.router().channels().get(&2).is_none());
		assert!(harness.store.removed_channels.lock().unwrap().contains(&2));
	}

	#[test]
	fn ignored_channels_spare_private_edges() {
		// Forgetting an ignored channel mid-query must not take down the
		// private edges of a node it orphans from the public view.
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let remote_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let remote_pubkey = PublicKey::from_secret_key(&secp_ctx, &remote_key);
		let other_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let our_key = our_node_key();

		// A private channel to the remote, and the remote's only public
		// channel, which the payment layer has concluded is dead.
		let private_scid = 42;
		let our_update = get_signed_update_between(private_scid, &our_key, &remote_key, |_| {}, &secp_ctx);
		harness.router().handle_local_channel_update(private_scid, &remote_pubkey, None, &our_update).unwrap();
		let public_scid = 1;
		add_channel_with_update(&mut harness, public_scid, &remote_key, &other_key, 1_000, 0);

		let mut req = request(node_id(99), node_id(11));
		req.ignore_channels.insert(public_scid);
		let response = harness.router().find_route(req).unwrap();
		assert_eq!(response.hops.len(), 1);
		assert_eq!(response.hops[0].update.short_channel_id, private_scid);

		// The ignored channel itself is gone for good.
		assert!(harness.router().channels().get(&public_scid).is_none());
		assert!(harness.store.removed_channels.lock().unwrap().contains(&public_scid));
	}

	#[test]
	fn exclusions_are_directional_and_expire() {
		let mut harness = RouterTestHarness::new();
		let key_a = SecretKey::from_slice(&[11; 32]).unwrap();
		let key_b = SecretKey::from_slice(&[12; 32]).unwrap();
		add_channel_with_update(&mut harness, 1, &key_a, &key_b, 1_000, 0);

		let desc = *harness.router().updates_map().keys().next().unwrap();
		harness.router().handle_event(RouterEvent::ExcludeChannel { desc }).unwrap();
		match harness.router().find_route(request(node_id(11), node_id(12))) {
			Err(RouterError::RouteNotFound) => {},
			other => panic!("unexpected result: {:?}", other.map(|r| r.hops)),
		}

		harness.router().handle_event(RouterEvent::LiftChannelExclusion { desc }).unwrap();
		assert_eq!(harness.router().excluded_channels().count(), 0);
		let response = harness.router().find_route(request(node_id(11), node_id(12))).unwrap();
		assert_eq!(response.hops.len(), 1);
	}
}
