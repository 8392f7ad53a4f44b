// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The channel-range synchronization handshake: query a freshly connected
//! peer for every short channel id it knows, diff the reply against our own
//! non-stale channels in the same block window, and request the channels we
//! are missing.

use crate::ln::msgs::{self, ErrorAction, LightningError};
use crate::routing::gossip::{unix_time_now, Router, RouterError};
use crate::routing::validation::ChainValidator;
use crate::util::events::MessageSendEvent;
use crate::util::logger::{Level, Logger};
use crate::util::persist::NetworkStore;
use crate::util::scid_utils::{block_from_scid, scid_from_parts, MAX_SCID_BLOCK, MAX_SCID_TX_INDEX, MAX_SCID_VOUT_INDEX};

use bitcoin::secp256k1::PublicKey;

use core::cmp;
use core::ops::Deref;
use std::collections::HashSet;

impl<S: Deref, C: Deref, L: Deref> Router<S, C, L>
where
	S::Target: NetworkStore,
	C::Target: ChainValidator,
	L::Target: Logger,
{
	/// Kicks off synchronization with a peer by asking for its full channel
	/// range.
	pub fn send_channel_query(&mut self, peer: &PublicKey) {
		log_debug!(self.logger, "Sending query_channel_range to peer {}", log_pubkey!(peer));
		self.pending_msg_events.push(MessageSendEvent::SendChannelRangeQuery {
			node_id: *peer,
			msg: msgs::QueryChannelRange {
				chain_hash: self.chain_hash,
				first_blocknum: 0,
				number_of_blocks: u32::MAX,
			},
		});
	}

	/// Diffs a peer's channel-range reply against our own channels in the
	/// replied block window and queries the ids we are missing, preserving
	/// the peer's ordering.
	pub fn handle_reply_channel_range(&mut self, peer: &PublicKey, msg: &msgs::ReplyChannelRange) -> Result<(), RouterError> {
		self.handle_reply_channel_range_with_time(peer, msg, unix_time_now())
	}

	pub(crate) fn handle_reply_channel_range_with_time(&mut self, peer: &PublicKey, msg: &msgs::ReplyChannelRange, current_time_unix: u64) -> Result<(), RouterError> {
		if msg.chain_hash != self.chain_hash {
			return Err(LightningError {
				err: format!("Reply channel range for unknown chain {}", msg.chain_hash),
				action: ErrorAction::IgnoreAndLog(Level::Warn),
			}.into());
		}

		let inclusive_start_scid = scid_from_parts(cmp::min(msg.first_blocknum as u64, MAX_SCID_BLOCK), 0, 0);
		let inclusive_end_scid = scid_from_parts(
			cmp::min(msg.first_blocknum as u64 + msg.number_of_blocks as u64, MAX_SCID_BLOCK),
			MAX_SCID_TX_INDEX, MAX_SCID_VOUT_INDEX,
		);
		let (start_scid, end_scid) = match (inclusive_start_scid, inclusive_end_scid) {
			(Ok(start_scid), Ok(end_scid)) => (start_scid, end_scid),
			_ => {
				return Err(LightningError {
					err: "Reply channel range with an invalid block window".to_owned(),
					action: ErrorAction::IgnoreError,
				}.into());
			},
		};

		let ours: HashSet<u64> = self.channels.range(start_scid..=end_scid)
			.filter(|(short_channel_id, announcement)| {
				self.keep_channel_in_window(msg.first_blocknum, msg.number_of_blocks, **short_channel_id, announcement, current_time_unix)
			})
			.map(|(short_channel_id, _)| *short_channel_id)
			.collect();
		let missing: Vec<u64> = msg.short_channel_ids.iter().copied()
			.filter(|short_channel_id| !ours.contains(short_channel_id))
			.collect();
		log_debug!(self.logger, "Peer {} reported {} channel ids in blocks [{}, {}], {} unknown to us",
			log_pubkey!(peer), msg.short_channel_ids.len(), msg.first_blocknum, msg.end_blocknum(), missing.len());
		if missing.is_empty() {
			return Ok(());
		}
		self.pending_msg_events.push(MessageSendEvent::SendShortIdsQuery {
			node_id: *peer,
			msg: msgs::QueryShortChannelIds {
				chain_hash: self.chain_hash,
				short_channel_ids: missing,
			},
		});
		Ok(())
	}

	/// The sync `keep` filter: admits a channel whose funding block lies in
	/// `[first_blocknum, first_blocknum + number_of_blocks]` and which is not
	/// stale.
	pub(crate) fn keep_channel_in_window(&self, first_blocknum: u32, number_of_blocks: u32, short_channel_id: u64, announcement: &msgs::ChannelAnnouncement, current_time_unix: u64) -> bool {
		let height = block_from_scid(short_channel_id) as u64;
		height >= first_blocknum as u64
			&& height <= first_blocknum as u64 + number_of_blocks as u64
			&& !self.is_stale(short_channel_id, announcement, current_time_unix)
	}
}
