// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The [`Router`] owns the network view: it ingests and validates gossip,
//! keeps the channel graph in sync with the accepted announcement/update set
//! and with locally-known private channels, prunes stale entries on timer
//! ticks and reconciles the view against the chain and the persisted
//! snapshot.

use bitcoin::blockdata::constants::genesis_block;
use bitcoin::hash_types::BlockHash;
use bitcoin::secp256k1::constants::PUBLIC_KEY_SIZE;
use bitcoin::secp256k1::{self, PublicKey, Secp256k1};

use crate::ln::msgs::{self, ChannelAnnouncement, ChannelUpdate, ErrorAction, LightningError, NodeAnnouncement};
use crate::ln::msgs::MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX;
use crate::routing::graph::{ChannelDesc, DirectedGraph};
use crate::routing::validation::{ChainValidator, ValidationResult};
use crate::util::config::RouterConfig;
use crate::util::events::{MessageSendEvent, MessageSendEventsProvider, NetworkEvent, NetworkEventsProvider};
use crate::util::logger::{Level, Logger};
use crate::util::persist::{NetworkStore, StoreError};
use crate::util::scid_utils::{block_from_scid, is_peer_scid};

use core::fmt;
use core::ops::Deref;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of confirmations past which a channel's funding block counts as
/// old for staleness purposes, roughly two weeks of blocks.
pub const STALE_CHANNEL_CONFIRMATIONS: u32 = 2016;

/// We consider a channel's directional info stale two weeks after its last
/// update, per BOLT 7's suggestion.
pub const STALE_CHANNEL_UPDATE_AGE_LIMIT_SECS: u64 = 60 * 60 * 24 * 14;

/// Represents the compressed public key of a node
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId([u8; PUBLIC_KEY_SIZE]);

impl NodeId {
	/// Create a new NodeId from a public key
	pub fn from_pubkey(pubkey: &PublicKey) -> Self {
		NodeId(pubkey.serialize())
	}

	/// Get the public key slice from this NodeId
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Get the public key this NodeId represents, failing if the key bytes
	/// do not lie on the curve.
	pub fn as_pubkey(&self) -> Result<PublicKey, secp256k1::Error> {
		PublicKey::from_slice(&self.0)
	}
}

impl fmt::Debug for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "NodeId({})", log_bytes!(self.0))
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", log_bytes!(self.0))
	}
}

/// The error type surfaced by [`Router`] operations.
#[derive(Clone, Debug)]
pub enum RouterError {
	/// A peer sent something we could not accept: bad signature, wrong chain,
	/// malformed flags, stale or duplicate gossip. Carries the action to take
	/// against the peer.
	Protocol(LightningError),
	/// The backing store failed. Fatal to the event loop; no retry is
	/// attempted.
	Persistence(StoreError),
	/// No route exists between the requested endpoints, or an endpoint is
	/// absent from the graph.
	RouteNotFound,
	/// A route was requested from a node to itself.
	CannotRouteToSelf,
}

impl From<LightningError> for RouterError {
	fn from(err: LightningError) -> Self {
		RouterError::Protocol(err)
	}
}

impl From<StoreError> for RouterError {
	fn from(err: StoreError) -> Self {
		RouterError::Persistence(err)
	}
}

impl fmt::Display for RouterError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			RouterError::Protocol(err) => write!(f, "protocol violation: {}", err.err),
			RouterError::Persistence(err) => write!(f, "{}", err),
			RouterError::RouteNotFound => write!(f, "route not found"),
			RouterError::CannotRouteToSelf => write!(f, "cannot route to self"),
		}
	}
}

/// An input consumed by the router. Events are processed to completion, one
/// at a time, in the order the embedder delivers them.
#[derive(Clone, Debug)]
pub enum RouterEvent {
	/// A channel_announcement arrived from a peer.
	ChannelAnnouncement {
		/// The peer the message arrived from.
		origin: PublicKey,
		/// The message.
		msg: ChannelAnnouncement,
	},
	/// A channel_update arrived from a peer.
	ChannelUpdate {
		/// The peer the message arrived from.
		origin: PublicKey,
		/// The message.
		msg: ChannelUpdate,
	},
	/// A node_announcement arrived from a peer.
	NodeAnnouncement {
		/// The peer the message arrived from.
		origin: PublicKey,
		/// The message.
		msg: NodeAnnouncement,
	},
	/// The chain validator delivered a deferred verdict for an announcement
	/// held in the awaiting set.
	ChannelValidated {
		/// The channel the verdict concerns.
		short_channel_id: u64,
		/// The verdict. `Pending` verdicts leave the announcement awaiting.
		result: ValidationResult,
	},
	/// A local channel reached a usable state or refreshed its forwarding
	/// policy.
	LocalChannelUpdate {
		/// The channel's id.
		short_channel_id: u64,
		/// The peer on the other end of the channel.
		remote_node_id: PublicKey,
		/// The announcement, once the channel is publicly announceable.
		announcement: Option<ChannelAnnouncement>,
		/// Our own update for the channel.
		update: ChannelUpdate,
	},
	/// A local channel closed.
	LocalChannelDown {
		/// The channel's id.
		short_channel_id: u64,
	},
	/// The chain watcher saw a spend of a channel's funding output.
	ExternalFundingSpent {
		/// The spent channel's id.
		short_channel_id: u64,
	},
	/// The chain watcher advanced the best block.
	BestBlockUpdated {
		/// The new best block height.
		height: u32,
	},
	/// Periodic gossip-rebroadcast tick. A no-op for this router.
	TickBroadcast,
	/// Periodic staleness sweep.
	TickPruneStaleChannels,
	/// The payment layer asked for a channel direction to sit out of path
	/// finding for the configured exclusion duration.
	ExcludeChannel {
		/// The direction to exclude.
		desc: ChannelDesc,
	},
	/// The scheduled end of a channel-direction exclusion.
	LiftChannelExclusion {
		/// The direction to readmit.
		desc: ChannelDesc,
	},
	/// Start the channel-range synchronization handshake with a peer.
	SendChannelQuery {
		/// The peer to sync against.
		peer: PublicKey,
	},
	/// A peer answered our channel-range query.
	ReplyChannelRange {
		/// The replying peer.
		peer: PublicKey,
		/// The reply.
		msg: msgs::ReplyChannelRange,
	},
	/// A peer queried our channel range. Acknowledged but not served.
	QueryChannelRange {
		/// The querying peer.
		peer: PublicKey,
		/// The query.
		msg: msgs::QueryChannelRange,
	},
	/// A peer queried channels by id. Acknowledged but not served.
	QueryShortChannelIds {
		/// The querying peer.
		peer: PublicKey,
		/// The query.
		msg: msgs::QueryShortChannelIds,
	},
}

/// A snapshot of the router's public network view.
#[derive(Clone, Debug)]
pub struct RoutingState {
	/// All known node announcements.
	pub nodes: Vec<NodeAnnouncement>,
	/// All accepted channels, ascending by short channel id.
	pub channels: Vec<ChannelAnnouncement>,
	/// All current public channel updates.
	pub updates: Vec<ChannelUpdate>,
}

/// An announcement parked while the chain validator works on it.
struct PendingChannel {
	msg: ChannelAnnouncement,
	/// Peers that delivered the announcement, in arrival order; the first is
	/// the originator and is answered first on a validation failure.
	origins: Vec<PublicKey>,
}

struct StashedUpdate {
	msg: ChannelUpdate,
	origins: Vec<PublicKey>,
}

struct StashedNode {
	msg: NodeAnnouncement,
	origins: Vec<PublicKey>,
}

macro_rules! secp_verify_sig {
	( $secp_ctx: expr, $msg: expr, $sig: expr, $pubkey: expr, $msg_type: expr ) => {
		match $secp_ctx.verify_ecdsa($msg, $sig, $pubkey) {
			Ok(_) => {},
			Err(_) => {
				return Err(LightningError {
					err: format!("Invalid signature on {} message", $msg_type),
					action: ErrorAction::SendErrorMessage {
						msg: msgs::ErrorMessage {
							channel_id: [0; 32],
							data: format!("Invalid signature on {} message", $msg_type),
						},
					},
				}.into());
			},
		}
	};
}

macro_rules! get_pubkey_from_node_id {
	( $node_id: expr, $msg_type: expr ) => {
		$node_id.as_pubkey()
			.map_err(|_| LightningError {
				err: format!("Invalid public key on {} message", $msg_type),
				action: ErrorAction::SendErrorMessage {
					msg: msgs::ErrorMessage {
						channel_id: [0; 32],
						data: format!("Invalid public key on {} message", $msg_type),
					},
				},
			})?
	}
}

pub(crate) fn unix_time_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("Time must be > 1970").as_secs()
}

/// The routing state machine.
///
/// One value of this type owns the entire network view. All handlers take
/// `&mut self` and run to completion before the next event, which is the
/// whole concurrency story: the embedder's event loop is the only execution
/// context, so no internal locks exist.
pub struct Router<S: Deref, C: Deref, L: Deref>
where
	S::Target: NetworkStore,
	C::Target: ChainValidator,
	L::Target: Logger,
{
	pub(crate) secp_ctx: Secp256k1<secp256k1::VerifyOnly>,
	pub(crate) chain_hash: BlockHash,
	pub(crate) node_pubkey: PublicKey,
	pub(crate) node_id: NodeId,
	pub(crate) config: RouterConfig,
	pub(crate) store: S,
	pub(crate) validator: Option<C>,
	pub(crate) logger: L,
	pub(crate) best_block_height: u32,

	pub(crate) nodes: HashMap<NodeId, NodeAnnouncement>,
	pub(crate) channels: BTreeMap<u64, ChannelAnnouncement>,
	pub(crate) updates: HashMap<ChannelDesc, ChannelUpdate>,
	awaiting: HashMap<u64, PendingChannel>,
	stashed_updates: Vec<StashedUpdate>,
	stashed_nodes: Vec<StashedNode>,
	pub(crate) private_channels: HashMap<u64, NodeId>,
	pub(crate) private_updates: HashMap<ChannelDesc, ChannelUpdate>,
	/// Directional exclusions mapped to their expiry, in seconds since UNIX
	/// epoch. Lifted by event or swept on the prune tick, whichever first.
	pub(crate) excluded_channels: HashMap<ChannelDesc, u64>,
	pub(crate) graph: DirectedGraph,

	pub(crate) pending_msg_events: Vec<MessageSendEvent>,
	pub(crate) pending_net_events: Vec<NetworkEvent>,
}

impl<S: Deref, C: Deref, L: Deref> Router<S, C, L>
where
	S::Target: NetworkStore,
	C::Target: ChainValidator,
	L::Target: Logger,
{
	/// Builds a router serving `config.network`, restoring channels and their
	/// updates from `store` and rebuilding the graph from the enabled ones.
	///
	/// Node announcements are persisted on receipt but intentionally not
	/// restored here.
	pub fn new(config: RouterConfig, node_pubkey: PublicKey, store: S, validator: Option<C>, logger: L) -> Result<Self, RouterError> {
		let mut router = Router {
			secp_ctx: Secp256k1::verification_only(),
			chain_hash: genesis_block(config.network).header.block_hash(),
			node_pubkey,
			node_id: NodeId::from_pubkey(&node_pubkey),
			config,
			store,
			validator,
			logger,
			best_block_height: 0,
			nodes: HashMap::new(),
			channels: BTreeMap::new(),
			updates: HashMap::new(),
			awaiting: HashMap::new(),
			stashed_updates: Vec::new(),
			stashed_nodes: Vec::new(),
			private_channels: HashMap::new(),
			private_updates: HashMap::new(),
			excluded_channels: HashMap::new(),
			graph: DirectedGraph::new(),
			pending_msg_events: Vec::new(),
			pending_net_events: Vec::new(),
		};

		for announcement in router.store.list_channels()? {
			router.channels.insert(announcement.contents.short_channel_id, announcement);
		}
		let mut restored_updates = 0;
		for update in router.store.list_channel_updates()? {
			let short_channel_id = update.contents.short_channel_id;
			match router.channels.get(&short_channel_id) {
				Some(announcement) => {
					let desc = public_update_desc(announcement, &update.contents);
					router.graph.remove_edge(&desc);
					router.graph.add_edge(desc, &update.contents);
					router.updates.insert(desc, update);
					restored_updates += 1;
				},
				None => {
					log_warn!(router.logger, "Dropping persisted channel_update for unknown channel {}", short_channel_id);
				},
			}
		}
		log_info!(router.logger, "Restored {} channels and {} updates from the network store", router.channels.len(), restored_updates);
		Ok(router)
	}

	/// Processes one input event to completion.
	///
	/// Protocol violations are resolved here: the offending peer is queued an
	/// `Error` frame where warranted, the rest is logged, and `Ok` is
	/// returned. The only error that escapes is a persistence failure, which
	/// the event loop must treat as fatal.
	pub fn handle_event(&mut self, event: RouterEvent) -> Result<(), RouterError> {
		match event {
			RouterEvent::ChannelAnnouncement { origin, msg } => {
				self.pending_msg_events.push(MessageSendEvent::SendGossipAck { node_id: origin });
				let res = self.handle_channel_announcement(&origin, &msg);
				self.resolve_gossip_result(&origin, res)
			},
			RouterEvent::ChannelUpdate { origin, msg } => {
				self.pending_msg_events.push(MessageSendEvent::SendGossipAck { node_id: origin });
				let res = self.handle_channel_update(&origin, &msg);
				self.resolve_gossip_result(&origin, res)
			},
			RouterEvent::NodeAnnouncement { origin, msg } => {
				self.pending_msg_events.push(MessageSendEvent::SendGossipAck { node_id: origin });
				let res = self.handle_node_announcement(&origin, &msg);
				self.resolve_gossip_result(&origin, res)
			},
			RouterEvent::ChannelValidated { short_channel_id, result } => {
				self.handle_channel_validated(short_channel_id, result)
			},
			RouterEvent::LocalChannelUpdate { short_channel_id, remote_node_id, announcement, update } => {
				self.handle_local_channel_update(short_channel_id, &remote_node_id, announcement, &update)
			},
			RouterEvent::LocalChannelDown { short_channel_id } => {
				self.handle_local_channel_down(short_channel_id);
				Ok(())
			},
			RouterEvent::ExternalFundingSpent { short_channel_id } => {
				self.handle_external_funding_spent(short_channel_id)
			},
			RouterEvent::BestBlockUpdated { height } => {
				self.best_block_height = height;
				Ok(())
			},
			RouterEvent::TickBroadcast => {
				log_trace!(self.logger, "Broadcast tick, nothing buffered for rebroadcast");
				Ok(())
			},
			RouterEvent::TickPruneStaleChannels => {
				self.prune_stale_channels()
			},
			RouterEvent::ExcludeChannel { desc } => {
				self.exclude_channel(desc);
				Ok(())
			},
			RouterEvent::LiftChannelExclusion { desc } => {
				self.lift_channel_exclusion(&desc);
				Ok(())
			},
			RouterEvent::SendChannelQuery { peer } => {
				self.send_channel_query(&peer);
				Ok(())
			},
			RouterEvent::ReplyChannelRange { peer, msg } => {
				self.pending_msg_events.push(MessageSendEvent::SendGossipAck { node_id: peer });
				let res = self.handle_reply_channel_range(&peer, &msg);
				self.resolve_gossip_result(&peer, res)
			},
			RouterEvent::QueryChannelRange { peer, .. } => {
				self.pending_msg_events.push(MessageSendEvent::SendGossipAck { node_id: peer });
				log_debug!(self.logger, "Ignoring query_channel_range from peer {}, serving queries is not supported", log_pubkey!(peer));
				Ok(())
			},
			RouterEvent::QueryShortChannelIds { peer, .. } => {
				self.pending_msg_events.push(MessageSendEvent::SendGossipAck { node_id: peer });
				log_debug!(self.logger, "Ignoring query_short_channel_ids from peer {}, serving queries is not supported", log_pubkey!(peer));
				Ok(())
			},
		}
	}

	/// Converts protocol violations into peer-directed error frames and log
	/// lines; lets persistence failures through untouched.
	fn resolve_gossip_result(&mut self, origin: &PublicKey, res: Result<(), RouterError>) -> Result<(), RouterError> {
		match res {
			Ok(()) => Ok(()),
			Err(RouterError::Protocol(err)) => {
				match err.action {
					ErrorAction::SendErrorMessage { msg } => {
						log_debug!(self.logger, "Rejecting gossip from peer {}: {}", log_pubkey!(origin), err.err);
						self.pending_msg_events.push(MessageSendEvent::SendErrorMessage { node_id: *origin, msg });
					},
					ErrorAction::IgnoreAndLog(level) => {
						log_internal!(self.logger, level, "Ignoring gossip from peer {}: {}", log_pubkey!(origin), err.err);
					},
					ErrorAction::IgnoreDuplicateGossip => {},
					ErrorAction::IgnoreError => {
						log_gossip!(self.logger, "Ignoring gossip from peer {}: {}", log_pubkey!(origin), err.err);
					},
				}
				Ok(())
			},
			Err(err) => Err(err),
		}
	}

	/// Applies the channel-announcement policy: discard duplicates, fold
	/// repeated deliveries of an awaiting announcement into its origin list,
	/// verify the four witness signatures, consult the chain validator, and
	/// accept (or park) the channel.
	pub fn handle_channel_announcement(&mut self, origin: &PublicKey, msg: &ChannelAnnouncement) -> Result<(), RouterError> {
		let short_channel_id = msg.contents.short_channel_id;
		if is_peer_scid(short_channel_id) {
			return Err(LightningError {
				err: format!("Channel announcement with synthetic short channel id {}", short_channel_id),
				action: ErrorAction::IgnoreAndLog(Level::Debug),
			}.into());
		}
		if self.channels.contains_key(&short_channel_id) {
			return Err(LightningError {
				err: "Already have knowledge of channel".to_owned(),
				action: ErrorAction::IgnoreDuplicateGossip,
			}.into());
		}
		if let Some(pending) = self.awaiting.get_mut(&short_channel_id) {
			if !pending.origins.contains(origin) {
				pending.origins.push(*origin);
			}
			return Err(LightningError {
				err: "Channel is already being validated".to_owned(),
				action: ErrorAction::IgnoreDuplicateGossip,
			}.into());
		}
		if msg.contents.chain_hash != self.chain_hash {
			return Err(LightningError {
				err: format!("Channel announcement for unknown chain {}", msg.contents.chain_hash),
				action: ErrorAction::SendErrorMessage {
					msg: msgs::ErrorMessage {
						channel_id: [0; 32],
						data: format!("Channel announcement for unknown chain {}", msg.contents.chain_hash),
					},
				},
			}.into());
		}
		if msg.contents.node_id_1 >= msg.contents.node_id_2 {
			return Err(LightningError {
				err: "Channel announcement node ids are not in lexicographic order".to_owned(),
				action: ErrorAction::SendErrorMessage {
					msg: msgs::ErrorMessage {
						channel_id: [0; 32],
						data: "Channel announcement node ids are not in lexicographic order".to_owned(),
					},
				},
			}.into());
		}

		let msg_hash = msg.contents.sighash();
		secp_verify_sig!(self.secp_ctx, &msg_hash, &msg.node_signature_1, &get_pubkey_from_node_id!(msg.contents.node_id_1, "channel_announcement"), "channel_announcement");
		secp_verify_sig!(self.secp_ctx, &msg_hash, &msg.node_signature_2, &get_pubkey_from_node_id!(msg.contents.node_id_2, "channel_announcement"), "channel_announcement");
		secp_verify_sig!(self.secp_ctx, &msg_hash, &msg.bitcoin_signature_1, &get_pubkey_from_node_id!(msg.contents.bitcoin_key_1, "channel_announcement"), "channel_announcement");
		secp_verify_sig!(self.secp_ctx, &msg_hash, &msg.bitcoin_signature_2, &get_pubkey_from_node_id!(msg.contents.bitcoin_key_2, "channel_announcement"), "channel_announcement");

		if let Some(validator) = self.validator.as_ref() {
			match validator.check_channel(&self.chain_hash, &msg.contents) {
				ValidationResult::Valid => {},
				ValidationResult::Invalid => {
					return Err(LightningError {
						err: "Channel announced without corresponding UTXO entry".to_owned(),
						action: ErrorAction::IgnoreError,
					}.into());
				},
				ValidationResult::Pending => {
					log_gossip!(self.logger, "Holding channel_announcement for {} pending chain validation", short_channel_id);
					self.awaiting.insert(short_channel_id, PendingChannel { msg: msg.clone(), origins: vec![*origin] });
					return Ok(());
				},
			}
		}

		self.accept_channel(msg)
	}

	/// Delivers a deferred chain-validation verdict for an awaiting channel.
	pub fn handle_channel_validated(&mut self, short_channel_id: u64, result: ValidationResult) -> Result<(), RouterError> {
		match result {
			ValidationResult::Pending => {
				log_debug!(self.logger, "Chain validator returned a pending verdict for channel {}, leaving it awaiting", short_channel_id);
				Ok(())
			},
			ValidationResult::Valid => {
				match self.awaiting.remove(&short_channel_id) {
					Some(pending) => self.accept_channel(&pending.msg),
					None => {
						log_debug!(self.logger, "Got validation verdict for channel {} which is not awaiting one", short_channel_id);
						Ok(())
					},
				}
			},
			ValidationResult::Invalid => {
				if let Some(pending) = self.awaiting.remove(&short_channel_id) {
					log_debug!(self.logger, "Rejecting channel {} after failed chain validation", short_channel_id);
					for origin in pending.origins.iter() {
						self.pending_msg_events.push(MessageSendEvent::SendErrorMessage {
							node_id: *origin,
							msg: msgs::ErrorMessage {
								channel_id: [0; 32],
								data: "Channel announced without corresponding UTXO entry".to_owned(),
							},
						});
					}
					self.stashed_updates.retain(|stashed| stashed.msg.contents.short_channel_id != short_channel_id);
					self.drop_unreferenced_stashed_nodes();
				} else {
					log_debug!(self.logger, "Got validation verdict for channel {} which is not awaiting one", short_channel_id);
				}
				Ok(())
			},
		}
	}

	/// Moves a signature- and chain-valid announcement into the accepted set:
	/// persists it, displaces any private channel with the same id, and
	/// drains stashed updates and node announcements in arrival order.
	fn accept_channel(&mut self, msg: &ChannelAnnouncement) -> Result<(), RouterError> {
		let short_channel_id = msg.contents.short_channel_id;
		self.store.add_channel(msg)?;
		self.channels.insert(short_channel_id, msg.clone());
		if self.private_channels.remove(&short_channel_id).is_some() {
			log_debug!(self.logger, "Channel {} graduated from private to announced", short_channel_id);
			let private_descs: Vec<ChannelDesc> = self.private_updates.keys()
				.filter(|desc| desc.short_channel_id == short_channel_id).copied().collect();
			for desc in private_descs {
				self.private_updates.remove(&desc);
				self.graph.remove_edge(&desc);
			}
		}
		log_gossip!(self.logger, "Added channel_announcement for {}", short_channel_id);

		let mut drained_updates = Vec::new();
		self.stashed_updates.retain_mut(|stashed| {
			if stashed.msg.contents.short_channel_id == short_channel_id {
				drained_updates.push(StashedUpdate {
					msg: stashed.msg.clone(),
					origins: core::mem::take(&mut stashed.origins),
				});
				false
			} else {
				true
			}
		});
		for stashed in drained_updates {
			let origin = stashed.origins.first().copied().unwrap_or(self.node_pubkey);
			let res = self.handle_channel_update(&origin, &stashed.msg);
			self.resolve_gossip_result(&origin, res)?;
		}

		let mut drained_nodes = Vec::new();
		self.stashed_nodes.retain_mut(|stashed| {
			let node_id = stashed.msg.contents.node_id;
			if node_id == msg.contents.node_id_1 || node_id == msg.contents.node_id_2 {
				drained_nodes.push(StashedNode {
					msg: stashed.msg.clone(),
					origins: core::mem::take(&mut stashed.origins),
				});
				false
			} else {
				true
			}
		});
		for stashed in drained_nodes {
			let origin = stashed.origins.first().copied().unwrap_or(self.node_pubkey);
			let res = self.handle_node_announcement(&origin, &stashed.msg);
			self.resolve_gossip_result(&origin, res)?;
		}
		Ok(())
	}

	/// Applies the channel-update policy against the accepted, awaiting and
	/// private channel sets, in that order. Updates for channels in none of
	/// them are dropped.
	pub fn handle_channel_update(&mut self, origin: &PublicKey, msg: &ChannelUpdate) -> Result<(), RouterError> {
		let short_channel_id = msg.contents.short_channel_id;
		if let Some(announcement) = self.channels.get(&short_channel_id) {
			let desc = public_update_desc(announcement, &msg.contents);
			return self.apply_channel_update(desc, msg, false);
		}
		if self.awaiting.contains_key(&short_channel_id) {
			log_gossip!(self.logger, "Stashing channel_update for channel {} which is still being validated", short_channel_id);
			match self.stashed_updates.iter_mut().find(|stashed| stashed.msg == *msg) {
				Some(stashed) => {
					if !stashed.origins.contains(origin) {
						stashed.origins.push(*origin);
					}
				},
				None => {
					self.stashed_updates.push(StashedUpdate { msg: msg.clone(), origins: vec![*origin] });
				},
			}
			return Ok(());
		}
		if let Some(remote_node_id) = self.private_channels.get(&short_channel_id).copied() {
			let desc = private_update_desc(self.node_id, remote_node_id, &msg.contents);
			return self.apply_channel_update(desc, msg, true);
		}
		Err(LightningError {
			err: format!("Couldn't find channel for update, channel {}", short_channel_id),
			action: ErrorAction::IgnoreAndLog(Level::Gossip),
		}.into())
	}

	/// The shared accept path for public and private updates: newest
	/// timestamp wins, the signature must be the desc's `a` endpoint's, the
	/// graph edge is rebuilt, public updates are persisted.
	fn apply_channel_update(&mut self, desc: ChannelDesc, msg: &ChannelUpdate, private: bool) -> Result<(), RouterError> {
		let existing = if private { self.private_updates.get(&desc) } else { self.updates.get(&desc) };
		if let Some(existing_update) = existing {
			if existing_update.contents.timestamp >= msg.contents.timestamp {
				return Err(LightningError {
					err: "Update older than last processed update".to_owned(),
					action: ErrorAction::IgnoreDuplicateGossip,
				}.into());
			}
		}
		let htlc_max_flag = msg.contents.message_flags & MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX == MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX;
		if htlc_max_flag != msg.contents.htlc_maximum_msat.is_some() {
			return Err(LightningError {
				err: "Malformed flags on channel_update message".to_owned(),
				action: ErrorAction::SendErrorMessage {
					msg: msgs::ErrorMessage {
						channel_id: [0; 32],
						data: "Malformed flags on channel_update message".to_owned(),
					},
				},
			}.into());
		}

		let msg_hash = msg.contents.sighash();
		secp_verify_sig!(self.secp_ctx, &msg_hash, &msg.signature, &get_pubkey_from_node_id!(desc.a, "channel_update"), "channel_update");

		if private {
			self.private_updates.insert(desc, msg.clone());
		} else {
			let replacing = self.updates.contains_key(&desc);
			if replacing {
				self.store.update_channel_update(msg)?;
			} else {
				self.store.add_channel_update(msg)?;
			}
			self.updates.insert(desc, msg.clone());
		}
		self.graph.remove_edge(&desc);
		self.graph.add_edge(desc, &msg.contents);
		log_gossip!(self.logger, "Applied {} channel_update for channel {} direction {} -> {}",
			if private { "private" } else { "public" }, desc.short_channel_id, desc.a, desc.b);
		self.pending_net_events.push(NetworkEvent::ChannelUpdateReceived { msg: msg.clone() });
		Ok(())
	}

	/// Applies the node-announcement policy: newest timestamp wins and the
	/// node must be referenced by an accepted or awaiting channel, otherwise
	/// any stale persisted record is deleted.
	pub fn handle_node_announcement(&mut self, origin: &PublicKey, msg: &NodeAnnouncement) -> Result<(), RouterError> {
		let node_id = msg.contents.node_id;
		if let Some(stashed) = self.stashed_nodes.iter_mut().find(|stashed| stashed.msg == *msg) {
			if !stashed.origins.contains(origin) {
				stashed.origins.push(*origin);
			}
			return Err(LightningError {
				err: "Node announcement is already stashed".to_owned(),
				action: ErrorAction::IgnoreDuplicateGossip,
			}.into());
		}
		if let Some(existing) = self.nodes.get(&node_id) {
			if existing.contents.timestamp >= msg.contents.timestamp {
				return Err(LightningError {
					err: "Update older than last processed update".to_owned(),
					action: ErrorAction::IgnoreDuplicateGossip,
				}.into());
			}
		}

		let msg_hash = msg.contents.sighash();
		secp_verify_sig!(self.secp_ctx, &msg_hash, &msg.signature, &get_pubkey_from_node_id!(node_id, "node_announcement"), "node_announcement");

		if self.nodes.contains_key(&node_id) {
			self.store.update_node(msg)?;
			self.nodes.insert(node_id, msg.clone());
			log_gossip!(self.logger, "Updated node_announcement for {}", node_id);
			self.pending_net_events.push(NetworkEvent::NodeUpdated { msg: msg.clone() });
			Ok(())
		} else if self.channels.values().any(|announcement| references_node(announcement, &node_id)) {
			self.store.add_node(msg)?;
			self.nodes.insert(node_id, msg.clone());
			log_gossip!(self.logger, "Added node_announcement for {}", node_id);
			self.pending_net_events.push(NetworkEvent::NodeDiscovered { msg: msg.clone() });
			Ok(())
		} else if self.awaiting.values().any(|pending| references_node(&pending.msg, &node_id)) {
			log_gossip!(self.logger, "Stashing node_announcement for {} whose channel is still being validated", node_id);
			self.stashed_nodes.push(StashedNode { msg: msg.clone(), origins: vec![*origin] });
			Ok(())
		} else {
			self.store.remove_node(&node_id)?;
			Err(LightningError {
				err: "No existing channels for node_announcement".to_owned(),
				action: ErrorAction::IgnoreError,
			}.into())
		}
	}

	/// Routes a local channel's policy refresh: public channels go through
	/// the gossip path, unknown ids create a private channel entry.
	pub fn handle_local_channel_update(&mut self, short_channel_id: u64, remote_node_id: &PublicKey, announcement: Option<ChannelAnnouncement>, update: &ChannelUpdate) -> Result<(), RouterError> {
		let origin = self.node_pubkey;
		if self.channels.contains_key(&short_channel_id) {
			let res = self.handle_channel_update(&origin, update);
			return self.resolve_gossip_result(&origin, res);
		}
		if let Some(announcement) = announcement {
			if !self.awaiting.contains_key(&announcement.contents.short_channel_id) {
				let res = self.handle_channel_announcement(&origin, &announcement);
				self.resolve_gossip_result(&origin, res)?;
			}
			let res = self.handle_channel_update(&origin, update);
			return self.resolve_gossip_result(&origin, res);
		}
		if !self.private_channels.contains_key(&short_channel_id) {
			log_debug!(self.logger, "Adding private channel {} with peer {}", short_channel_id, log_pubkey!(remote_node_id));
			self.private_channels.insert(short_channel_id, NodeId::from_pubkey(remote_node_id));
		}
		let res = self.handle_channel_update(&origin, update);
		self.resolve_gossip_result(&origin, res)
	}

	/// Forgets a closed local channel along with its private updates.
	pub fn handle_local_channel_down(&mut self, short_channel_id: u64) {
		if self.private_channels.remove(&short_channel_id).is_some() {
			log_debug!(self.logger, "Removed private channel {}", short_channel_id);
		}
		let private_descs: Vec<ChannelDesc> = self.private_updates.keys()
			.filter(|desc| desc.short_channel_id == short_channel_id).copied().collect();
		for desc in private_descs {
			self.private_updates.remove(&desc);
			self.graph.remove_edge(&desc);
		}
	}

	/// Treats a channel whose funding output was spent as lost: removes it,
	/// its updates and edges, deletes it from persistence and drops any node
	/// this orphans.
	pub fn handle_external_funding_spent(&mut self, short_channel_id: u64) -> Result<(), RouterError> {
		let announcement = match self.channels.remove(&short_channel_id) {
			Some(announcement) => announcement,
			None => {
				log_debug!(self.logger, "Funding spent for unknown channel {}", short_channel_id);
				return Ok(());
			},
		};
		log_info!(self.logger, "Channel {} was spent, removing it from the network graph", short_channel_id);
		self.remove_channel_entries(&announcement);
		self.store.remove_channel(short_channel_id)?;
		self.pending_net_events.push(NetworkEvent::ChannelLost { short_channel_id });
		self.remove_orphaned_nodes(&[announcement.contents.node_id_1, announcement.contents.node_id_2])
	}

	/// Drops both directional updates and graph edges of an already-unmapped
	/// channel.
	fn remove_channel_entries(&mut self, announcement: &ChannelAnnouncement) {
		let (desc_one, desc_two) = public_descs(announcement);
		self.updates.remove(&desc_one);
		self.updates.remove(&desc_two);
		self.graph.remove_edge(&desc_one);
		self.graph.remove_edge(&desc_two);
	}

	/// Removes every listed node that no remaining public channel references,
	/// from the node map, the graph and persistence. A node still on a
	/// private channel with us keeps its graph vertex, and with it the
	/// private edges, even though the public view forgets the node.
	fn remove_orphaned_nodes(&mut self, candidates: &[NodeId]) -> Result<(), RouterError> {
		let mut seen = Vec::new();
		for node_id in candidates {
			if seen.contains(node_id) {
				continue;
			}
			seen.push(*node_id);
			if self.channels.values().any(|announcement| references_node(announcement, node_id)) {
				continue;
			}
			self.nodes.remove(node_id);
			if !self.participates_in_private_channel(node_id) {
				self.graph.remove_vertex(node_id);
			}
			self.store.remove_node(node_id)?;
			log_debug!(self.logger, "Node {} has no remaining channels, forgetting it", node_id);
			self.pending_net_events.push(NetworkEvent::NodeLost { node_id: *node_id });
		}
		Ok(())
	}

	/// Whether the node is an endpoint of any locally-known private channel.
	/// Private channels always have our own node on one side.
	fn participates_in_private_channel(&self, node_id: &NodeId) -> bool {
		if *node_id == self.node_id {
			!self.private_channels.is_empty()
		} else {
			self.private_channels.values().any(|remote_node_id| remote_node_id == node_id)
		}
	}

	/// Runs the staleness sweep against the current wall clock.
	pub fn prune_stale_channels(&mut self) -> Result<(), RouterError> {
		self.prune_stale_channels_with_time(unix_time_now())
	}

	/// Removes every channel that is both old by funding height and old by
	/// latest update, cascading to updates, edges, persistence and orphaned
	/// nodes. Expired exclusions are swept on the same tick.
	pub fn prune_stale_channels_with_time(&mut self, current_time_unix: u64) -> Result<(), RouterError> {
		self.excluded_channels.retain(|_, expiry| *expiry > current_time_unix);

		let stale: Vec<u64> = self.channels.iter()
			.filter(|(short_channel_id, announcement)| self.is_stale(**short_channel_id, announcement, current_time_unix))
			.map(|(short_channel_id, _)| *short_channel_id)
			.collect();
		if stale.is_empty() {
			return Ok(());
		}
		log_info!(self.logger, "Pruning {} stale channels", stale.len());

		let mut endpoints = Vec::with_capacity(stale.len() * 2);
		for short_channel_id in stale {
			let announcement = self.channels.remove(&short_channel_id)
				.expect("staleness was just computed over mapped channels");
			self.remove_channel_entries(&announcement);
			self.store.remove_channel(short_channel_id)?;
			self.pending_net_events.push(NetworkEvent::ChannelLost { short_channel_id });
			endpoints.push(announcement.contents.node_id_1);
			endpoints.push(announcement.contents.node_id_2);
		}
		self.remove_orphaned_nodes(&endpoints)
	}

	/// A channel is stale when its funding block is older than
	/// [`STALE_CHANNEL_CONFIRMATIONS`] blocks *and* every directional update
	/// we know of (possibly none) is older than
	/// [`STALE_CHANNEL_UPDATE_AGE_LIMIT_SECS`]. Brand-new channels with no
	/// updates stay valid until both clocks expire.
	pub(crate) fn is_stale(&self, short_channel_id: u64, announcement: &ChannelAnnouncement, current_time_unix: u64) -> bool {
		let funding_height = block_from_scid(short_channel_id) as u64;
		if funding_height >= (self.best_block_height as u64).saturating_sub(STALE_CHANNEL_CONFIRMATIONS as u64) {
			return false;
		}
		let update_cutoff = current_time_unix.saturating_sub(STALE_CHANNEL_UPDATE_AGE_LIMIT_SECS);
		let (desc_one, desc_two) = public_descs(announcement);
		[self.updates.get(&desc_one), self.updates.get(&desc_two)].iter().flatten()
			.all(|update| (update.contents.timestamp as u64) < update_cutoff)
	}

	/// Excludes a channel direction from path finding until the configured
	/// ban duration elapses.
	pub fn exclude_channel(&mut self, desc: ChannelDesc) {
		self.exclude_channel_with_time(desc, unix_time_now())
	}

	fn exclude_channel_with_time(&mut self, desc: ChannelDesc, current_time_unix: u64) {
		let expiry = current_time_unix.saturating_add(self.config.channel_exclude_duration.as_secs());
		log_debug!(self.logger, "Excluding channel {} direction {} -> {} from path finding", desc.short_channel_id, desc.a, desc.b);
		self.excluded_channels.insert(desc, expiry);
	}

	/// Readmits a previously excluded channel direction.
	pub fn lift_channel_exclusion(&mut self, desc: &ChannelDesc) {
		if self.excluded_channels.remove(desc).is_some() {
			log_debug!(self.logger, "Lifted exclusion of channel {} direction {} -> {}", desc.short_channel_id, desc.a, desc.b);
		}
	}

	/// All known node announcements.
	pub fn nodes(&self) -> &HashMap<NodeId, NodeAnnouncement> {
		&self.nodes
	}

	/// The accepted channel set, iterable in ascending unsigned short channel
	/// id order.
	pub fn channels(&self) -> &BTreeMap<u64, ChannelAnnouncement> {
		&self.channels
	}

	/// The current public channel updates.
	pub fn updates(&self) -> impl Iterator<Item = &ChannelUpdate> {
		self.updates.values()
	}

	/// The current public channel updates keyed by directed edge.
	pub fn updates_map(&self) -> &HashMap<ChannelDesc, ChannelUpdate> {
		&self.updates
	}

	/// Locally-known private channels, as `short_channel_id -> remote node`.
	pub fn private_channels(&self) -> &HashMap<u64, NodeId> {
		&self.private_channels
	}

	/// The in-memory channel graph.
	pub fn graph(&self) -> &DirectedGraph {
		&self.graph
	}

	/// The channel directions currently excluded from path finding.
	pub fn excluded_channels(&self) -> impl Iterator<Item = &ChannelDesc> {
		self.excluded_channels.keys()
	}

	/// A snapshot of the public network view, servicing `GetRoutingState`.
	pub fn routing_state(&self) -> RoutingState {
		RoutingState {
			nodes: self.nodes.values().cloned().collect(),
			channels: self.channels.values().cloned().collect(),
			updates: self.updates.values().cloned().collect(),
		}
	}

	pub(crate) fn awaiting_contains(&self, short_channel_id: u64) -> bool {
		self.awaiting.contains_key(&short_channel_id)
	}

	/// Drops stashed node announcements that no accepted or awaiting channel
	/// references any longer.
	fn drop_unreferenced_stashed_nodes(&mut self) {
		let channels = &self.channels;
		let awaiting = &self.awaiting;
		self.stashed_nodes.retain(|stashed| {
			let node_id = stashed.msg.contents.node_id;
			channels.values().any(|announcement| references_node(announcement, &node_id))
				|| awaiting.values().any(|pending| references_node(&pending.msg, &node_id))
		});
	}
}

impl<S: Deref, C: Deref, L: Deref> MessageSendEventsProvider for Router<S, C, L>
where
	S::Target: NetworkStore,
	C::Target: ChainValidator,
	L::Target: Logger,
{
	fn get_and_clear_pending_msg_events(&mut self) -> Vec<MessageSendEvent> {
		core::mem::take(&mut self.pending_msg_events)
	}
}

impl<S: Deref, C: Deref, L: Deref> NetworkEventsProvider for Router<S, C, L>
where
	S::Target: NetworkStore,
	C::Target: ChainValidator,
	L::Target: Logger,
{
	fn get_and_clear_pending_net_events(&mut self) -> Vec<NetworkEvent> {
		core::mem::take(&mut self.pending_net_events)
	}
}

/// Whether the announcement names `node_id` as either endpoint.
fn references_node(announcement: &ChannelAnnouncement, node_id: &NodeId) -> bool {
	announcement.contents.node_id_1 == *node_id || announcement.contents.node_id_2 == *node_id
}

/// Both directed descs of an announced channel, `node_id_1 -> node_id_2`
/// first.
pub(crate) fn public_descs(announcement: &ChannelAnnouncement) -> (ChannelDesc, ChannelDesc) {
	let short_channel_id = announcement.contents.short_channel_id;
	let node_one = announcement.contents.node_id_1;
	let node_two = announcement.contents.node_id_2;
	(
		ChannelDesc { short_channel_id, a: node_one, b: node_two },
		ChannelDesc { short_channel_id, a: node_two, b: node_one },
	)
}

/// The directed desc a public update applies to, selected by its direction
/// bit.
pub(crate) fn public_update_desc(announcement: &ChannelAnnouncement, update: &msgs::UnsignedChannelUpdate) -> ChannelDesc {
	let (desc_one, desc_two) = public_descs(announcement);
	if update.is_node_one() { desc_one } else { desc_two }
}

/// The directed desc a private update applies to. The endpoints are ordered
/// lexicographically, as the two keys of an announcement would be, and the
/// direction bit selects the originator among them.
pub(crate) fn private_update_desc(local_node_id: NodeId, remote_node_id: NodeId, update: &msgs::UnsignedChannelUpdate) -> ChannelDesc {
	let short_channel_id = update.short_channel_id;
	let (node_one, node_two) = if local_node_id < remote_node_id {
		(local_node_id, remote_node_id)
	} else {
		(remote_node_id, local_node_id)
	};
	if update.is_node_one() {
		ChannelDesc { short_channel_id, a: node_one, b: node_two }
	} else {
		ChannelDesc { short_channel_id, a: node_two, b: node_one }
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::routing::router::RouteRequest;
	use crate::util::scid_utils::scid_from_parts;
	use crate::util::test_utils::{
		get_signed_channel_announcement, get_signed_node_announcement, get_signed_update_between,
		our_node_key, RouterTestHarness, TestStore, TestLogger, TestValidator,
	};

	use bitcoin::hashes::sha256d::Hash as Sha256dHash;
	use bitcoin::hashes::Hash;
	use bitcoin::network::constants::Network;
	use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};

	use std::collections::HashSet;
	use std::sync::Arc;

	fn peer(key_byte: u8) -> PublicKey {
		let secp_ctx = Secp256k1::new();
		PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[key_byte; 32]).unwrap())
	}

	fn node_id(key_byte: u8) -> NodeId {
		NodeId::from_pubkey(&peer(key_byte))
	}

	#[test]
	fn handling_channel_announcements() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&hex::decode("0202020202020202020202020202020202020202020202020202020202020202").unwrap()[..]).unwrap());

		let valid_announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = 42;
		}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&origin, &valid_announcement).unwrap();
		assert!(harness.router().channels().contains_key(&42));
		assert!(harness.store.channels.lock().unwrap().contains_key(&42));

		// Processing the same announcement again changes nothing.
		match harness.router().handle_channel_announcement(&origin, &valid_announcement) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Already have knowledge of channel"),
			_ => panic!(),
		};
		assert_eq!(harness.router().channels().len(), 1);

		// A bad signature is rejected without touching state.
		let mut invalid_sig_announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = 43;
		}, &node_1_key, &node_2_key, &secp_ctx);
		let fake_msghash = Message::from_slice(&Sha256dHash::hash(&[0; 32])[..]).unwrap();
		invalid_sig_announcement.node_signature_1 = secp_ctx.sign_ecdsa(&fake_msghash, &node_1_key);
		match harness.router().handle_channel_announcement(&origin, &invalid_sig_announcement) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Invalid signature on channel_announcement message"),
			_ => panic!(),
		};
		assert!(!harness.router().channels().contains_key(&43));
		assert!(!harness.store.channels.lock().unwrap().contains_key(&43));

		// Announcements for another chain carry an error frame back.
		let wrong_chain_announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = 44;
			unsigned_announcement.chain_hash = genesis_block(Network::Bitcoin).header.block_hash();
		}, &node_1_key, &node_2_key, &secp_ctx);
		match harness.router().handle_channel_announcement(&origin, &wrong_chain_announcement) {
			Err(RouterError::Protocol(LightningError { action: ErrorAction::SendErrorMessage { .. }, err })) => {
				assert!(err.contains("unknown chain"));
			},
			_ => panic!(),
		};

		// Node ids must be in lexicographic order.
		let mut unordered_announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = 45;
		}, &node_1_key, &node_2_key, &secp_ctx);
		let node_one = unordered_announcement.contents.node_id_1;
		unordered_announcement.contents.node_id_1 = unordered_announcement.contents.node_id_2;
		unordered_announcement.contents.node_id_2 = node_one;
		match harness.router().handle_channel_announcement(&origin, &unordered_announcement) {
			Err(RouterError::Protocol(e)) => assert!(e.err.contains("lexicographic")),
			_ => panic!(),
		};

		// Synthetic peer ids never enter the channel map.
		let synthetic_announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = 0xff00_0000_0000_0001;
		}, &node_1_key, &node_2_key, &secp_ctx);
		match harness.router().handle_channel_announcement(&origin, &synthetic_announcement) {
			Err(RouterError::Protocol(e)) => assert!(e.err.contains("synthetic")),
			_ => panic!(),
		};
	}

	#[test]
	fn handling_channel_updates() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);
		let short_channel_id = scid_from_parts(1, 2, 3).unwrap();

		// An update for a channel we never heard of is dropped.
		let orphan_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		match harness.router().handle_channel_update(&origin, &orphan_update) {
			Err(RouterError::Protocol(e)) => assert!(e.err.contains("Couldn't find channel for update")),
			_ => panic!(),
		};

		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = short_channel_id;
		}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&origin, &announcement).unwrap();
		harness.router().get_and_clear_pending_net_events();

		let update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1000;
			unsigned_update.fee_base_msat = 1000;
			unsigned_update.fee_proportional_millionths = 100;
		}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &update).unwrap();

		let node_a = NodeId::from_pubkey(&PublicKey::from_secret_key(&secp_ctx, &node_1_key));
		let node_b = NodeId::from_pubkey(&PublicKey::from_secret_key(&secp_ctx, &node_2_key));
		let desc = ChannelDesc { short_channel_id, a: node_a, b: node_b };
		assert_eq!(harness.router().updates_map().len(), 1);
		assert_eq!(harness.router().updates_map().get(&desc).unwrap().contents.timestamp, 1000);
		// Weight charges the fee schedule against the reference amount.
		let edges = harness.router().graph().edges_from(&node_a);
		assert_eq!(edges.len(), 1);
		assert_eq!(edges[0].weight, 2000);
		match &harness.router().get_and_clear_pending_net_events()[..] {
			[NetworkEvent::ChannelUpdateReceived { msg }] => assert_eq!(msg.contents.timestamp, 1000),
			other => panic!("unexpected events {:?}", other),
		}

		// An older timestamp is a no-op and publishes nothing.
		let stale_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 999;
		}, &secp_ctx);
		match harness.router().handle_channel_update(&origin, &stale_update) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Update older than last processed update"),
			_ => panic!(),
		};
		assert_eq!(harness.router().updates_map().get(&desc).unwrap().contents.timestamp, 1000);
		assert!(harness.router().get_and_clear_pending_net_events().is_empty());

		// So is an equal timestamp.
		let equal_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1000;
			unsigned_update.fee_base_msat = 1;
		}, &secp_ctx);
		assert!(harness.router().handle_channel_update(&origin, &equal_update).is_err());

		// A newer one replaces, hitting the update (not add) store path.
		let newer_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1001;
		}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &newer_update).unwrap();
		assert_eq!(*harness.store.added_channel_updates.lock().unwrap(), 1);
		assert_eq!(*harness.store.updated_channel_updates.lock().unwrap(), 1);

		// Tampered contents fail signature verification and change nothing.
		let mut tampered_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1002;
		}, &secp_ctx);
		tampered_update.contents.fee_base_msat += 1;
		match harness.router().handle_channel_update(&origin, &tampered_update) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Invalid signature on channel_update message"),
			_ => panic!(),
		};
		assert_eq!(harness.router().updates_map().get(&desc).unwrap().contents.timestamp, 1001);

		// Inconsistent message flags are a protocol violation.
		let malformed_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1002;
			unsigned_update.message_flags = 0;
		}, &secp_ctx);
		match harness.router().handle_channel_update(&origin, &malformed_update) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Malformed flags on channel_update message"),
			_ => panic!(),
		};

		// A disabled update is retained but drops the graph edge.
		let disabled_update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1003;
			unsigned_update.channel_flags |= msgs::CHANNEL_FLAG_DISABLED;
		}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &disabled_update).unwrap();
		assert_eq!(harness.router().updates_map().get(&desc).unwrap().contents.timestamp, 1003);
		assert!(harness.router().graph().edges_from(&node_a).is_empty());

		// The reverse direction is keyed separately.
		let reverse_update = get_signed_update_between(short_channel_id, &node_2_key, &node_1_key, |unsigned_update| {
			unsigned_update.timestamp = 1000;
		}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &reverse_update).unwrap();
		let reverse_desc = ChannelDesc { short_channel_id, a: node_b, b: node_a };
		assert_eq!(harness.router().updates_map().len(), 2);
		assert!(harness.router().updates_map().contains_key(&reverse_desc));
		assert_eq!(harness.router().graph().edges_from(&node_b).len(), 1);
	}

	#[test]
	fn handling_node_announcements() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);

		// Without any related channel the announcement is dropped and any
		// stale persisted record cleared.
		let valid_announcement = get_signed_node_announcement(|_| {}, &node_1_key, &secp_ctx);
		match harness.router().handle_node_announcement(&origin, &valid_announcement) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "No existing channels for node_announcement"),
			_ => panic!(),
		};
		assert_eq!(harness.store.removed_nodes.lock().unwrap().len(), 1);

		let channel_announcement = get_signed_channel_announcement(|_| {}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&origin, &channel_announcement).unwrap();

		harness.router().handle_node_announcement(&origin, &valid_announcement).unwrap();
		let announced_node_id = valid_announcement.contents.node_id;
		assert!(harness.router().nodes().contains_key(&announced_node_id));
		assert!(harness.store.nodes.lock().unwrap().contains_key(&announced_node_id));
		match &harness.router().get_and_clear_pending_net_events()[..] {
			[NetworkEvent::NodeDiscovered { msg }] => assert_eq!(msg.contents.node_id, announced_node_id),
			other => panic!("unexpected events {:?}", other),
		}

		// Replays and older timestamps are rejected.
		match harness.router().handle_node_announcement(&origin, &valid_announcement) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Update older than last processed update"),
			_ => panic!(),
		};

		let newer_announcement = get_signed_node_announcement(|unsigned_announcement| {
			unsigned_announcement.timestamp = 1000;
		}, &node_1_key, &secp_ctx);
		harness.router().handle_node_announcement(&origin, &newer_announcement).unwrap();
		match &harness.router().get_and_clear_pending_net_events()[..] {
			[NetworkEvent::NodeUpdated { msg }] => assert_eq!(msg.contents.timestamp, 1000),
			other => panic!("unexpected events {:?}", other),
		}

		let mut invalid_sig_announcement = get_signed_node_announcement(|unsigned_announcement| {
			unsigned_announcement.timestamp = 2000;
		}, &node_1_key, &secp_ctx);
		invalid_sig_announcement.contents.timestamp = 3000;
		match harness.router().handle_node_announcement(&origin, &invalid_sig_announcement) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Invalid signature on node_announcement message"),
			_ => panic!(),
		};
		assert_eq!(harness.router().nodes().get(&announced_node_id).unwrap().contents.timestamp, 1000);
	}

	#[test]
	fn deferred_validation_stashes_and_drains() {
		let mut harness = RouterTestHarness::with_validator();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let first_origin = peer(7);
		let second_origin = peer(8);
		let short_channel_id = scid_from_parts(1, 0, 0).unwrap();

		*harness.validator.result.lock().unwrap() = ValidationResult::Pending;
		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = short_channel_id;
		}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&first_origin, &announcement).unwrap();
		assert!(harness.router().channels().is_empty());
		assert!(harness.router().awaiting_contains(short_channel_id));
		assert!(harness.store.channels.lock().unwrap().is_empty());

		// A second delivery only records the extra origin.
		match harness.router().handle_channel_announcement(&second_origin, &announcement) {
			Err(RouterError::Protocol(e)) => assert_eq!(e.err, "Channel is already being validated"),
			_ => panic!(),
		};

		// Updates and node announcements for the awaited channel stash. Two
		// updates for the same direction stash separately and drain in
		// arrival order.
		let update_one = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 1000;
		}, &secp_ctx);
		let update_two = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |unsigned_update| {
			unsigned_update.timestamp = 2000;
		}, &secp_ctx);
		harness.router().handle_channel_update(&first_origin, &update_one).unwrap();
		harness.router().handle_channel_update(&first_origin, &update_two).unwrap();
		assert!(harness.router().updates_map().is_empty());

		let node_announcement = get_signed_node_announcement(|_| {}, &node_1_key, &secp_ctx);
		harness.router().handle_node_announcement(&first_origin, &node_announcement).unwrap();
		assert!(harness.router().nodes().is_empty());

		harness.router().handle_channel_validated(short_channel_id, ValidationResult::Valid).unwrap();
		assert!(harness.router().channels().contains_key(&short_channel_id));
		assert!(!harness.router().awaiting_contains(short_channel_id));
		assert_eq!(harness.router().updates_map().len(), 1);
		let applied = harness.router().updates_map().values().next().unwrap();
		assert_eq!(applied.contents.timestamp, 2000);
		// First stashed update was added, second replaced it: the drain kept
		// arrival order.
		assert_eq!(*harness.store.added_channel_updates.lock().unwrap(), 1);
		assert_eq!(*harness.store.updated_channel_updates.lock().unwrap(), 1);
		assert_eq!(harness.router().nodes().len(), 1);
	}

	#[test]
	fn failed_validation_rejects_and_drops_stash() {
		let mut harness = RouterTestHarness::with_validator();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let first_origin = peer(7);
		let second_origin = peer(8);
		let short_channel_id = scid_from_parts(1, 0, 0).unwrap();

		*harness.validator.result.lock().unwrap() = ValidationResult::Pending;
		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = short_channel_id;
		}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&first_origin, &announcement).unwrap();
		let _ = harness.router().handle_channel_announcement(&second_origin, &announcement);
		let update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		harness.router().handle_channel_update(&first_origin, &update).unwrap();
		harness.router().get_and_clear_pending_msg_events();

		harness.router().handle_channel_validated(short_channel_id, ValidationResult::Invalid).unwrap();
		assert!(!harness.router().awaiting_contains(short_channel_id));
		assert!(harness.router().channels().is_empty());

		// Both origins get an error frame, first origin first.
		let events = harness.router().get_and_clear_pending_msg_events();
		let error_recipients: Vec<PublicKey> = events.iter().map(|event| match event {
			MessageSendEvent::SendErrorMessage { node_id, .. } => *node_id,
			other => panic!("unexpected event {:?}", other),
		}).collect();
		assert_eq!(error_recipients, vec![first_origin, second_origin]);

		// The stashed update is gone: re-sending it now hits the unknown
		// channel path.
		match harness.router().handle_channel_update(&first_origin, &update) {
			Err(RouterError::Protocol(e)) => assert!(e.err.contains("Couldn't find channel for update")),
			_ => panic!(),
		};
	}

	#[test]
	fn private_channels_lifecycle() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let remote_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let remote_pubkey = PublicKey::from_secret_key(&secp_ctx, &remote_key);
		let our_key = our_node_key();
		let our_id = NodeId::from_pubkey(&harness.our_node_pubkey());
		let short_channel_id = scid_from_parts(2, 0, 0).unwrap();

		// A local channel-up with an unknown id creates a private channel.
		let our_update = get_signed_update_between(short_channel_id, &our_key, &remote_key, |_| {}, &secp_ctx);
		harness.router().handle_local_channel_update(short_channel_id, &remote_pubkey, None, &our_update).unwrap();
		assert_eq!(harness.router().private_channels().len(), 1);
		assert_eq!(harness.router().graph().edges_from(&our_id).len(), 1);
		// Private updates are not persisted.
		assert_eq!(*harness.store.added_channel_updates.lock().unwrap(), 0);

		// The remote side's update for the private channel applies too.
		let their_update = get_signed_update_between(short_channel_id, &remote_key, &our_key, |_| {}, &secp_ctx);
		harness.router().handle_channel_update(&remote_pubkey, &their_update).unwrap();
		assert_eq!(harness.router().graph().edges_from(&NodeId::from_pubkey(&remote_pubkey)).len(), 1);

		// Accepting a public announcement for the same id displaces the
		// private channel and its updates.
		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = short_channel_id;
		}, &our_key, &remote_key, &secp_ctx);
		harness.router().handle_channel_announcement(&remote_pubkey, &announcement).unwrap();
		assert!(harness.router().private_channels().is_empty());
		assert!(harness.router().channels().contains_key(&short_channel_id));
		assert!(harness.router().graph().edges_from(&our_id).is_empty());

		// A second private channel comes and goes via local channel-down.
		let other_scid = scid_from_parts(3, 0, 0).unwrap();
		let other_update = get_signed_update_between(other_scid, &our_key, &remote_key, |_| {}, &secp_ctx);
		harness.router().handle_local_channel_update(other_scid, &remote_pubkey, None, &other_update).unwrap();
		assert_eq!(harness.router().private_channels().len(), 1);
		harness.router().handle_local_channel_down(other_scid);
		assert!(harness.router().private_channels().is_empty());
		assert!(harness.router().graph().edges_from(&our_id).is_empty());
	}

	#[test]
	fn funding_spend_forgets_the_channel() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);
		let short_channel_id = scid_from_parts(1, 0, 0).unwrap();

		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = short_channel_id;
		}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&origin, &announcement).unwrap();
		let update = get_signed_update_between(short_channel_id, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &update).unwrap();
		harness.router().get_and_clear_pending_net_events();

		// Spending an unknown output is a no-op.
		harness.router().handle_external_funding_spent(99).unwrap();

		harness.router().handle_external_funding_spent(short_channel_id).unwrap();
		assert!(harness.router().channels().is_empty());
		assert!(harness.router().updates_map().is_empty());
		assert_eq!(harness.router().graph().edge_count(), 0);
		assert_eq!(harness.store.removed_channels.lock().unwrap()[..], [short_channel_id]);
		assert_eq!(harness.store.removed_nodes.lock().unwrap().len(), 2);

		let events = harness.router().get_and_clear_pending_net_events();
		assert_eq!(events.len(), 3);
		assert!(matches!(events[0], NetworkEvent::ChannelLost { short_channel_id: scid } if scid == short_channel_id));
		assert!(matches!(events[1], NetworkEvent::NodeLost { .. }));
		assert!(matches!(events[2], NetworkEvent::NodeLost { .. }));
	}

	#[test]
	fn losing_a_public_channel_spares_private_edges() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let remote_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let remote_pubkey = PublicKey::from_secret_key(&secp_ctx, &remote_key);
		let remote_id = NodeId::from_pubkey(&remote_pubkey);
		let other_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let our_key = our_node_key();
		let our_id = NodeId::from_pubkey(&harness.our_node_pubkey());

		// A private channel with the remote, with updates in both directions.
		let private_scid = scid_from_parts(2, 0, 0).unwrap();
		let our_update = get_signed_update_between(private_scid, &our_key, &remote_key, |_| {}, &secp_ctx);
		harness.router().handle_local_channel_update(private_scid, &remote_pubkey, None, &our_update).unwrap();
		let their_update = get_signed_update_between(private_scid, &remote_key, &our_key, |_| {}, &secp_ctx);
		harness.router().handle_channel_update(&remote_pubkey, &their_update).unwrap();

		// The remote's only public channel, with an unrelated third node.
		let public_scid = scid_from_parts(3, 0, 0).unwrap();
		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = public_scid;
		}, &remote_key, &other_key, &secp_ctx);
		harness.router().handle_channel_announcement(&remote_pubkey, &announcement).unwrap();
		harness.router().get_and_clear_pending_net_events();

		harness.router().handle_external_funding_spent(public_scid).unwrap();

		// The public view forgets both endpoints, but the private edges and
		// their vertices survive.
		let events = harness.router().get_and_clear_pending_net_events();
		assert_eq!(events.iter().filter(|event| matches!(event, NetworkEvent::NodeLost { .. })).count(), 2);
		assert_eq!(harness.router().private_updates.len(), 2);
		assert!(harness.router().graph().contains_vertex(&remote_id));
		assert_eq!(harness.router().graph().edges_from(&our_id).len(), 1);
		assert_eq!(harness.router().graph().edges_from(&remote_id).len(), 1);
		assert!(!harness.router().graph().contains_vertex(&NodeId::from_pubkey(&PublicKey::from_secret_key(&secp_ctx, &other_key))));
	}

	#[test]
	fn pruning_removes_exactly_the_stale_set() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let origin = peer(7);
		let now = STALE_CHANNEL_UPDATE_AGE_LIMIT_SECS * 3;

		// Distinct node pairs so orphaning is observable per channel.
		let old_quiet_keys = (SecretKey::from_slice(&[11; 32]).unwrap(), SecretKey::from_slice(&[12; 32]).unwrap());
		let old_active_keys = (SecretKey::from_slice(&[13; 32]).unwrap(), SecretKey::from_slice(&[14; 32]).unwrap());
		let fresh_keys = (SecretKey::from_slice(&[15; 32]).unwrap(), SecretKey::from_slice(&[16; 32]).unwrap());

		// Funded long ago, no updates at all: stale.
		let old_quiet = scid_from_parts(500, 0, 0).unwrap();
		// Funded long ago but recently updated: valid.
		let old_active = scid_from_parts(600, 0, 0).unwrap();
		// Funded recently, no updates: valid.
		let fresh = scid_from_parts(3500, 0, 0).unwrap();

		for (short_channel_id, keys) in [(old_quiet, &old_quiet_keys), (old_active, &old_active_keys), (fresh, &fresh_keys)] {
			let announcement = get_signed_channel_announcement(|unsigned_announcement| {
				unsigned_announcement.short_channel_id = short_channel_id;
			}, &keys.0, &keys.1, &secp_ctx);
			harness.router().handle_channel_announcement(&origin, &announcement).unwrap();
		}
		let recent_update = get_signed_update_between(old_active, &old_active_keys.0, &old_active_keys.1, |unsigned_update| {
			unsigned_update.timestamp = (now - 10) as u32;
		}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &recent_update).unwrap();
		harness.router().handle_event(RouterEvent::BestBlockUpdated { height: 4000 }).unwrap();
		harness.router().get_and_clear_pending_net_events();

		harness.router().prune_stale_channels_with_time(now).unwrap();

		assert!(!harness.router().channels().contains_key(&old_quiet));
		assert!(harness.router().channels().contains_key(&old_active));
		assert!(harness.router().channels().contains_key(&fresh));
		assert_eq!(harness.store.removed_channels.lock().unwrap()[..], [old_quiet]);

		let events = harness.router().get_and_clear_pending_net_events();
		assert!(matches!(events[0], NetworkEvent::ChannelLost { short_channel_id } if short_channel_id == old_quiet));
		assert_eq!(events.iter().filter(|event| matches!(event, NetworkEvent::NodeLost { .. })).count(), 2);

		// Once its update ages out, the old-but-active channel goes too.
		harness.router().prune_stale_channels_with_time(now + STALE_CHANNEL_UPDATE_AGE_LIMIT_SECS + 100).unwrap();
		assert!(!harness.router().channels().contains_key(&old_active));
		assert!(harness.router().channels().contains_key(&fresh));
	}

	#[test]
	fn expired_exclusions_are_swept_on_the_prune_tick() {
		let mut harness = RouterTestHarness::new();
		let desc = ChannelDesc { short_channel_id: 1, a: node_id(11), b: node_id(12) };
		harness.router().exclude_channel(desc);
		assert_eq!(harness.router().excluded_channels().count(), 1);

		// Not yet expired: survives a prune tick at the current time.
		harness.router().prune_stale_channels_with_time(unix_time_now()).unwrap();
		assert_eq!(harness.router().excluded_channels().count(), 1);

		harness.router().prune_stale_channels_with_time(unix_time_now() + 3600).unwrap();
		assert_eq!(harness.router().excluded_channels().count(), 0);
	}

	#[test]
	fn startup_restores_channels_and_updates_only() {
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();

		let store = Arc::new(TestStore::new());
		let logger = Arc::new(TestLogger::new());
		let announcement = get_signed_channel_announcement(|unsigned_announcement| {
			unsigned_announcement.short_channel_id = 42;
		}, &node_1_key, &node_2_key, &secp_ctx);
		store.add_channel(&announcement).unwrap();
		let update = get_signed_update_between(42, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		store.add_channel_update(&update).unwrap();
		// An update whose channel is gone must not resurrect anything.
		let orphan_update = get_signed_update_between(43, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		store.add_channel_update(&orphan_update).unwrap();

		let config = RouterConfig { network: Network::Testnet, ..Default::default() };
		let node_pubkey = PublicKey::from_secret_key(&secp_ctx, &our_node_key());
		let router: Router<Arc<TestStore>, Arc<TestValidator>, Arc<TestLogger>> =
			Router::new(config, node_pubkey, Arc::clone(&store), None, Arc::clone(&logger)).unwrap();

		assert_eq!(router.channels().len(), 1);
		assert_eq!(router.updates_map().len(), 1);
		assert_eq!(router.graph().edge_count(), 1);
		assert!(router.nodes().is_empty());
		logger.assert_log_contains("lightning_router::routing::gossip", "Dropping persisted channel_update", 1);
	}

	#[test]
	fn channels_iterate_in_ascending_scid_order() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);

		for short_channel_id in [5u64, 1, 3, 0x8000_0000_0000_0000] {
			let announcement = get_signed_channel_announcement(|unsigned_announcement| {
				unsigned_announcement.short_channel_id = short_channel_id;
			}, &node_1_key, &node_2_key, &secp_ctx);
			harness.router().handle_channel_announcement(&origin, &announcement).unwrap();
		}
		let keys: Vec<u64> = harness.router().channels().keys().copied().collect();
		assert_eq!(keys, vec![1, 3, 5, 0x8000_0000_0000_0000]);
	}

	#[test]
	fn every_peer_message_is_acknowledged() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);

		// A rejected update (unknown channel) still gets its ack, and the
		// rejection does not surface out of handle_event.
		let update = get_signed_update_between(1, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		harness.router().handle_event(RouterEvent::ChannelUpdate { origin, msg: update }).unwrap();
		let events = harness.router().get_and_clear_pending_msg_events();
		assert_eq!(events, vec![MessageSendEvent::SendGossipAck { node_id: origin }]);

		// Inbound range queries are acknowledged and dropped.
		harness.router().handle_event(RouterEvent::QueryChannelRange {
			peer: origin,
			msg: msgs::QueryChannelRange {
				chain_hash: genesis_block(Network::Testnet).header.block_hash(),
				first_blocknum: 0,
				number_of_blocks: 100,
			},
		}).unwrap();
		let events = harness.router().get_and_clear_pending_msg_events();
		assert_eq!(events, vec![MessageSendEvent::SendGossipAck { node_id: origin }]);
	}

	#[test]
	fn routing_state_snapshots_the_public_view() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);

		let announcement = get_signed_channel_announcement(|_| {}, &node_1_key, &node_2_key, &secp_ctx);
		harness.router().handle_channel_announcement(&origin, &announcement).unwrap();
		let update = get_signed_update_between(0, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		harness.router().handle_channel_update(&origin, &update).unwrap();
		let node_announcement = get_signed_node_announcement(|_| {}, &node_1_key, &secp_ctx);
		harness.router().handle_node_announcement(&origin, &node_announcement).unwrap();

		let state = harness.router().routing_state();
		assert_eq!(state.channels.len(), 1);
		assert_eq!(state.updates.len(), 1);
		assert_eq!(state.nodes.len(), 1);
	}

	#[test]
	fn reprocessing_is_idempotent() {
		let mut harness = RouterTestHarness::new();
		let secp_ctx = Secp256k1::new();
		let node_1_key = SecretKey::from_slice(&[11; 32]).unwrap();
		let node_2_key = SecretKey::from_slice(&[12; 32]).unwrap();
		let origin = peer(7);

		let announcement = get_signed_channel_announcement(|_| {}, &node_1_key, &node_2_key, &secp_ctx);
		let update = get_signed_update_between(0, &node_1_key, &node_2_key, |_| {}, &secp_ctx);
		harness.router().handle_event(RouterEvent::ChannelAnnouncement { origin, msg: announcement.clone() }).unwrap();
		harness.router().handle_event(RouterEvent::ChannelUpdate { origin, msg: update.clone() }).unwrap();
		let channels_before = harness.router().channels().clone();
		let updates_before = harness.router().updates_map().clone();

		harness.router().handle_event(RouterEvent::ChannelAnnouncement { origin, msg: announcement }).unwrap();
		harness.router().handle_event(RouterEvent::ChannelUpdate { origin, msg: update }).unwrap();
		assert_eq!(*harness.router().channels(), channels_before);
		assert_eq!(*harness.router().updates_map(), updates_before);
	}

	#[test]
	fn find_route_rejections_do_not_disturb_state() {
		// A RouteRequest against an empty graph fails cleanly.
		let mut harness = RouterTestHarness::new();
		let request = RouteRequest {
			source: node_id(11),
			target: node_id(12),
			assisted_routes: Vec::new(),
			ignore_nodes: HashSet::new(),
			ignore_channels: HashSet::new(),
		};
		match harness.router().find_route(request) {
			Err(RouterError::RouteNotFound) => {},
			_ => panic!(),
		}
	}
}
