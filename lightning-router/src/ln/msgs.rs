// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Routing-relevant message types.
//!
//! Messages are split into an unsigned `contents` struct carrying the witness
//! fields plus the signature(s) over them, mirroring the on-the-wire split.
//! Wire encoding and decoding themselves live outside this crate; the only
//! serialization here is the canonical witness byte form each unsigned struct
//! exposes for signing and verification.

use bitcoin::hash_types::BlockHash;
use bitcoin::hashes::sha256d::Hash as Sha256dHash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::Message;

use crate::routing::gossip::NodeId;
use crate::util::logger::Level;

/// Channel-flags bit selecting the direction an update applies to: unset
/// means the update originates from `node_id_1`.
pub const CHANNEL_FLAG_DIRECTION: u8 = 1 << 0;
/// Channel-flags bit marking the direction as disabled for forwarding.
pub const CHANNEL_FLAG_DISABLED: u8 = 1 << 1;
/// Message-flags bit indicating an `htlc_maximum_msat` field is present.
pub const MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX: u8 = 1 << 0;

pub(crate) fn hash_to_message(witness_bytes: &[u8]) -> Message {
	Message::from_slice(&Sha256dHash::hash(witness_bytes)[..]).expect("sha256d digests are valid messages")
}

/// The unsigned part of a channel_announcement message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedChannelAnnouncement {
	/// The advertised channel features, as raw feature bits.
	pub features: Vec<u8>,
	/// The genesis hash of the blockchain where the channel is to be opened
	pub chain_hash: BlockHash,
	/// The short channel ID
	pub short_channel_id: u64,
	/// One of the two `node_id`s which are endpoints of this channel, the
	/// lexicographically lesser one
	pub node_id_1: NodeId,
	/// The other of the two `node_id`s which are endpoints of this channel
	pub node_id_2: NodeId,
	/// The funding key for the first node
	pub bitcoin_key_1: NodeId,
	/// The funding key for the second node
	pub bitcoin_key_2: NodeId,
}

impl UnsignedChannelAnnouncement {
	/// The canonical byte serialization of the witness fields, over which the
	/// four announcement signatures are made.
	pub fn witness_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(32 + 8 + 4 * 33 + self.features.len());
		bytes.extend_from_slice(&(self.features.len() as u16).to_be_bytes());
		bytes.extend_from_slice(&self.features);
		bytes.extend_from_slice(&self.chain_hash[..]);
		bytes.extend_from_slice(&self.short_channel_id.to_be_bytes());
		bytes.extend_from_slice(self.node_id_1.as_slice());
		bytes.extend_from_slice(self.node_id_2.as_slice());
		bytes.extend_from_slice(self.bitcoin_key_1.as_slice());
		bytes.extend_from_slice(self.bitcoin_key_2.as_slice());
		bytes
	}

	/// The message digest the announcement signatures commit to.
	pub fn sighash(&self) -> Message {
		hash_to_message(&self.witness_bytes())
	}
}

/// A channel_announcement message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelAnnouncement {
	/// Authentication of the announcement by the first node
	pub node_signature_1: Signature,
	/// Authentication of the announcement by the second node
	pub node_signature_2: Signature,
	/// Proof of funding UTXO ownership by the first node
	pub bitcoin_signature_1: Signature,
	/// Proof of funding UTXO ownership by the second node
	pub bitcoin_signature_2: Signature,
	/// The actual announcement
	pub contents: UnsignedChannelAnnouncement,
}

/// The unsigned part of a channel_update message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedChannelUpdate {
	/// The genesis hash of the blockchain where the channel is to be opened
	pub chain_hash: BlockHash,
	/// The short channel ID
	pub short_channel_id: u64,
	/// A strictly monotonic announcement counter, in seconds since UNIX epoch
	pub timestamp: u32,
	/// Flags pertaining to this message, of which only
	/// [`MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX`] is defined.
	pub message_flags: u8,
	/// Flags pertaining to the channel: the direction bit
	/// ([`CHANNEL_FLAG_DIRECTION`]) and the disable bit
	/// ([`CHANNEL_FLAG_DISABLED`]).
	pub channel_flags: u8,
	/// The number of blocks such that if:
	/// `incoming_htlc.cltv_expiry < outgoing_htlc.cltv_expiry + cltv_expiry_delta`
	/// then we need to fail the HTLC backwards.
	pub cltv_expiry_delta: u16,
	/// The minimum HTLC size incoming to sender, in milli-satoshi
	pub htlc_minimum_msat: u64,
	/// The base HTLC fee charged by sender, in milli-satoshi
	pub fee_base_msat: u32,
	/// The amount to fee multiplier, in micro-satoshi
	pub fee_proportional_millionths: u32,
	/// The maximum HTLC value incoming to sender, in milli-satoshi.
	pub htlc_maximum_msat: Option<u64>,
}

impl UnsignedChannelUpdate {
	/// Whether the update originates from the channel's `node_id_1` (the
	/// lexicographically lesser endpoint).
	pub fn is_node_one(&self) -> bool {
		self.channel_flags & CHANNEL_FLAG_DIRECTION == 0
	}

	/// Whether the direction is disabled for forwarding. Disabled updates
	/// carry no graph edge.
	pub fn is_disabled(&self) -> bool {
		self.channel_flags & CHANNEL_FLAG_DISABLED == CHANNEL_FLAG_DISABLED
	}

	/// The canonical byte serialization of the witness fields, over which the
	/// update signature is made.
	pub fn witness_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(32 + 8 + 4 + 2 + 2 + 8 + 4 + 4 + 8);
		bytes.extend_from_slice(&self.chain_hash[..]);
		bytes.extend_from_slice(&self.short_channel_id.to_be_bytes());
		bytes.extend_from_slice(&self.timestamp.to_be_bytes());
		bytes.push(self.message_flags);
		bytes.push(self.channel_flags);
		bytes.extend_from_slice(&self.cltv_expiry_delta.to_be_bytes());
		bytes.extend_from_slice(&self.htlc_minimum_msat.to_be_bytes());
		bytes.extend_from_slice(&self.fee_base_msat.to_be_bytes());
		bytes.extend_from_slice(&self.fee_proportional_millionths.to_be_bytes());
		if let Some(htlc_maximum_msat) = self.htlc_maximum_msat {
			bytes.extend_from_slice(&htlc_maximum_msat.to_be_bytes());
		}
		bytes
	}

	/// The message digest the update signature commits to.
	pub fn sighash(&self) -> Message {
		hash_to_message(&self.witness_bytes())
	}
}

/// A channel_update message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelUpdate {
	/// A signature of the channel update, by the originating endpoint
	pub signature: Signature,
	/// The actual channel update
	pub contents: UnsignedChannelUpdate,
}

/// An address which can be used to connect to a remote peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetAddress {
	/// An IPv4 address/port on which the peer is listening.
	IPv4 {
		/// The 4-byte IPv4 address
		addr: [u8; 4],
		/// The port on which the node is listening
		port: u16,
	},
	/// An IPv6 address/port on which the peer is listening.
	IPv6 {
		/// The 16-byte IPv6 address
		addr: [u8; 16],
		/// The port on which the node is listening
		port: u16,
	},
	/// A modern Tor onion address/port on which the peer is listening.
	OnionV3 {
		/// The ed25519 long-term public key of the peer
		ed25519_pubkey: [u8; 32],
		/// The checksum of the pubkey and version, as included in the onion address
		checksum: u16,
		/// The version byte, as defined by the Tor Onion v3 spec.
		version: u8,
		/// The port on which the node is listening
		port: u16,
	},
}

impl NetAddress {
	fn write_witness_bytes(&self, bytes: &mut Vec<u8>) {
		match self {
			NetAddress::IPv4 { addr, port } => {
				bytes.push(1);
				bytes.extend_from_slice(addr);
				bytes.extend_from_slice(&port.to_be_bytes());
			},
			NetAddress::IPv6 { addr, port } => {
				bytes.push(2);
				bytes.extend_from_slice(addr);
				bytes.extend_from_slice(&port.to_be_bytes());
			},
			NetAddress::OnionV3 { ed25519_pubkey, checksum, version, port } => {
				bytes.push(4);
				bytes.extend_from_slice(ed25519_pubkey);
				bytes.extend_from_slice(&checksum.to_be_bytes());
				bytes.push(*version);
				bytes.extend_from_slice(&port.to_be_bytes());
			},
		}
	}
}

/// The unsigned part of a node_announcement message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedNodeAnnouncement {
	/// The advertised node features, as raw feature bits.
	pub features: Vec<u8>,
	/// A strictly monotonic announcement counter, in seconds since UNIX epoch
	pub timestamp: u32,
	/// The `node_id` this announcement originated from
	pub node_id: NodeId,
	/// An RGB color for UI purposes
	pub rgb: [u8; 3],
	/// An alias, for UI purposes. This should be sanitized before use. There
	/// is no guarantee of uniqueness.
	pub alias: [u8; 32],
	/// List of addresses on which this node is reachable
	pub addresses: Vec<NetAddress>,
}

impl UnsignedNodeAnnouncement {
	/// The canonical byte serialization of the witness fields, over which the
	/// announcement signature is made.
	pub fn witness_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(4 + 33 + 3 + 32 + self.features.len());
		bytes.extend_from_slice(&(self.features.len() as u16).to_be_bytes());
		bytes.extend_from_slice(&self.features);
		bytes.extend_from_slice(&self.timestamp.to_be_bytes());
		bytes.extend_from_slice(self.node_id.as_slice());
		bytes.extend_from_slice(&self.rgb);
		bytes.extend_from_slice(&self.alias);
		for address in self.addresses.iter() {
			address.write_witness_bytes(&mut bytes);
		}
		bytes
	}

	/// The message digest the announcement signature commits to.
	pub fn sighash(&self) -> Message {
		hash_to_message(&self.witness_bytes())
	}
}

/// A node_announcement message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAnnouncement {
	/// The signature by the node itself
	pub signature: Signature,
	/// The actual content of the announcement
	pub contents: UnsignedNodeAnnouncement,
}

/// A query_channel_range message: asks a peer for the short channel ids of
/// all its known public channels in a block range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryChannelRange {
	/// The genesis hash of the blockchain being queried
	pub chain_hash: BlockHash,
	/// The height of the first block for the channel UTXOs being queried
	pub first_blocknum: u32,
	/// The number of blocks to include in the query results
	pub number_of_blocks: u32,
}

impl QueryChannelRange {
	/// Returns the block height of the last block in the query range,
	/// saturating rather than wrapping past the maximum height.
	pub fn end_blocknum(&self) -> u32 {
		self.first_blocknum.saturating_add(self.number_of_blocks)
	}
}

/// A reply_channel_range message: carries the short channel ids a peer knows
/// within the queried block range. Scid compression on the wire is undone by
/// the transport layer before the message reaches the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyChannelRange {
	/// The genesis hash of the blockchain being queried
	pub chain_hash: BlockHash,
	/// The height of the first block in the range of the reply
	pub first_blocknum: u32,
	/// The number of blocks included in the range of the reply
	pub number_of_blocks: u32,
	/// The short_channel_ids in the channel range, in ascending block height order
	pub short_channel_ids: Vec<u64>,
}

impl ReplyChannelRange {
	/// Returns the block height of the last block in the reply range,
	/// saturating rather than wrapping past the maximum height.
	pub fn end_blocknum(&self) -> u32 {
		self.first_blocknum.saturating_add(self.number_of_blocks)
	}
}

/// A query_short_channel_ids message: requests the announcement and updates
/// for the listed channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryShortChannelIds {
	/// The genesis hash of the blockchain being queried
	pub chain_hash: BlockHash,
	/// The short_channel_ids that are being queried
	pub short_channel_ids: Vec<u64>,
}

/// An error message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMessage {
	/// The channel ID involved in the error; all-zeros for errors concerning
	/// no specific channel, as gossip errors are.
	pub channel_id: [u8; 32],
	/// A possibly printable error description.
	pub data: String,
}

/// Used to put an error message in a [`LightningError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorAction {
	/// The peer did something harmless that we weren't able to process, just log and ignore
	IgnoreError,
	/// The peer did something harmless that we weren't able to meaningfully process.
	/// If the error is logged, log it at the given level.
	IgnoreAndLog(Level),
	/// The peer provided us with a gossip message which we'd already seen. In most cases this
	/// should be ignored without logging.
	IgnoreDuplicateGossip,
	/// The peer did something incorrect. Tell them.
	SendErrorMessage {
		/// The message to send.
		msg: ErrorMessage,
	},
}

/// An Err type for failure to process messages.
#[derive(Clone, Debug)]
pub struct LightningError {
	/// A human-readable message describing the error
	pub err: String,
	/// The action which should be taken against the offending peer.
	pub action: ErrorAction,
}
