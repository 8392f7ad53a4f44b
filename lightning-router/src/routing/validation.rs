// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The seam through which announced channels are checked against the chain.
//!
//! Nodes resist gossip DoS by requiring each announced channel to match a
//! live funding output on-chain. Chain access lives outside this crate; the
//! router only needs a verdict, and tolerates the verdict arriving later than
//! the announcement (the deferred case is what fills the router's `awaiting`
//! set and its stashes).

use crate::ln::msgs::UnsignedChannelAnnouncement;

use bitcoin::hash_types::BlockHash;

/// The verdict of a chain check on an announced channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationResult {
	/// The funding output exists, is unspent and matches the announcement.
	Valid,
	/// The funding output is absent, spent, or does not match the announced
	/// keys. The announcement is rejected.
	Invalid,
	/// The check could not complete synchronously. The announcement is held
	/// in the router's `awaiting` set until a `ChannelValidated` event
	/// delivers the verdict.
	Pending,
}

/// Checks announced channels against the chain.
///
/// A router constructed without a validator accepts signature-valid
/// announcements directly, which is the profile used by mobile nodes that
/// have no chain index of their own.
pub trait ChainValidator {
	/// Checks that the funding output encoded by the announcement's short
	/// channel id exists on the given chain and is owned by the announced
	/// bitcoin keys.
	fn check_channel(&self, chain_hash: &BlockHash, msg: &UnsignedChannelAnnouncement) -> ValidationResult;
}
