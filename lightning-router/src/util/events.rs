// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Events are surfaced by the library in two queues the embedder drains: one
//! for messages that should be sent to a specific peer, one for changes to
//! the channel graph that other subsystems may want to observe.

use crate::ln::msgs;
use crate::routing::gossip::NodeId;

use bitcoin::secp256k1::PublicKey;

/// An event indicating a message should be sent to a peer. The embedder is
/// responsible for actually delivering it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageSendEvent {
	/// Acknowledges an ingested gossip or query message so the peer's flow
	/// control is not stalled, regardless of whether the message was accepted.
	SendGossipAck {
		/// The node_id of the peer whose message is acknowledged.
		node_id: PublicKey,
	},
	/// Notifies a misbehaving peer of a protocol violation.
	SendErrorMessage {
		/// The node_id of this message recipient
		node_id: PublicKey,
		/// The error which should be sent.
		msg: msgs::ErrorMessage,
	},
	/// Query a peer for channels with funding transaction UTXOs in a block range.
	SendChannelRangeQuery {
		/// The node_id of this message recipient
		node_id: PublicKey,
		/// The query_channel_range which should be sent.
		msg: msgs::QueryChannelRange,
	},
	/// Request routing gossip messages from a peer for a list of channels identified by
	/// their short_channel_ids.
	SendShortIdsQuery {
		/// The node_id of this message recipient
		node_id: PublicKey,
		/// The query_short_channel_ids which should be sent.
		msg: msgs::QueryShortChannelIds,
	},
}

/// A trait indicating an object may generate message send events
pub trait MessageSendEventsProvider {
	/// Gets the list of pending events which were generated by previous actions, clearing the list
	/// in the process.
	fn get_and_clear_pending_msg_events(&mut self) -> Vec<MessageSendEvent>;
}

/// A change to the channel graph worth broadcasting to other subsystems, e.g.
/// a payment layer tracking which nodes are still routable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkEvent {
	/// A channel update was accepted, for a public or a private channel.
	ChannelUpdateReceived {
		/// The accepted update.
		msg: msgs::ChannelUpdate,
	},
	/// A channel was removed from the graph, by pruning or by a spend of its
	/// funding output.
	ChannelLost {
		/// The id of the removed channel.
		short_channel_id: u64,
	},
	/// A node announcement was accepted for a node we had none for.
	NodeDiscovered {
		/// The accepted announcement.
		msg: msgs::NodeAnnouncement,
	},
	/// A node announcement replaced an older one.
	NodeUpdated {
		/// The accepted announcement.
		msg: msgs::NodeAnnouncement,
	},
	/// A node's last channel departed, removing the node from the graph.
	NodeLost {
		/// The id of the removed node.
		node_id: NodeId,
	},
}

/// A trait indicating an object may generate network events
pub trait NetworkEventsProvider {
	/// Gets the list of pending events which were generated by previous actions, clearing the list
	/// in the process.
	fn get_and_clear_pending_net_events(&mut self) -> Vec<NetworkEvent>;
}
