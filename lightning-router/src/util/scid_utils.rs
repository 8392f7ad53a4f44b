// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Helpers for the 64-bit `short_channel_id` which packs the coordinates of a
//! channel's funding output: block height in the upper 3 bytes, transaction
//! index in the middle 3 bytes, output index in the lower 2 bytes.

use bitcoin::secp256k1::PublicKey;

use core::fmt;
use core::str::FromStr;

/// Maximum block height that can be used in a `short_channel_id`. This
/// value is based on the 3-bytes available for block height.
pub const MAX_SCID_BLOCK: u64 = 0x00ffffff;

/// Maximum transaction index that can be used in a `short_channel_id`.
/// This value is based on the 3-bytes available for tx index.
pub const MAX_SCID_TX_INDEX: u64 = 0x00ffffff;

/// Maximum vout index that can be used in a `short_channel_id`. This
/// value is based on the 2-bytes available for the vout index.
pub const MAX_SCID_VOUT_INDEX: u64 = 0xffff;

/// High byte marking a synthetic "peer id", whose lower 56 bits carry the
/// trailing bytes of a node public key instead of funding coordinates.
/// Synthetic ids never appear in the channel graph.
pub const PEER_ID_PREFIX: u8 = 0xff;

/// A `short_channel_id` construction error
#[derive(Debug, PartialEq, Eq)]
pub enum ShortChannelIdError {
	/// Block height exceeds 24 bits.
	BlockOverflow,
	/// Transaction index exceeds 24 bits.
	TxIndexOverflow,
	/// Output index exceeds 16 bits.
	VoutIndexOverflow,
	/// The textual form was not `<block>x<tx_index>x<vout>`.
	InvalidHumanReadableForm,
}

/// Extracts the block height (most significant 3-bytes) from the `short_channel_id`
pub fn block_from_scid(short_channel_id: u64) -> u32 {
	(short_channel_id >> 40) as u32
}

/// Extracts the tx index (bytes [2..4]) from the `short_channel_id`
pub fn tx_index_from_scid(short_channel_id: u64) -> u32 {
	((short_channel_id >> 16) & MAX_SCID_TX_INDEX) as u32
}

/// Extracts the vout (bytes [0..2]) from the `short_channel_id`
pub fn vout_from_scid(short_channel_id: u64) -> u16 {
	(short_channel_id & MAX_SCID_VOUT_INDEX) as u16
}

/// Constructs a `short_channel_id` using the components pieces. Results in an error
/// if the block height, tx index, or vout index overflow the maximum sizes.
pub fn scid_from_parts(block: u64, tx_index: u64, vout_index: u64) -> Result<u64, ShortChannelIdError> {
	if block > MAX_SCID_BLOCK {
		return Err(ShortChannelIdError::BlockOverflow);
	}

	if tx_index > MAX_SCID_TX_INDEX {
		return Err(ShortChannelIdError::TxIndexOverflow);
	}

	if vout_index > MAX_SCID_VOUT_INDEX {
		return Err(ShortChannelIdError::VoutIndexOverflow);
	}

	Ok((block << 40) | (tx_index << 16) | vout_index)
}

/// Returns true if the id is a synthetic peer id rather than a funding
/// outpoint reference.
pub fn is_peer_scid(short_channel_id: u64) -> bool {
	(short_channel_id >> 56) as u8 == PEER_ID_PREFIX
}

/// Builds the synthetic peer id for a node: the `0xff` marker byte followed
/// by the last seven bytes of the node's serialized public key.
pub fn peer_scid_from_pubkey(pubkey: &PublicKey) -> u64 {
	let serialized = pubkey.serialize();
	let mut key_bits = 0u64;
	for byte in &serialized[serialized.len() - 7..] {
		key_bits = (key_bits << 8) | *byte as u64;
	}
	((PEER_ID_PREFIX as u64) << 56) | key_bits
}

/// Wrapper rendering a `short_channel_id` in its `<block>x<tx_index>x<vout>`
/// human-readable form.
pub struct HumanReadableScid(
	/// The packed 64-bit id.
	pub u64,
);

impl fmt::Display for HumanReadableScid {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}x{}x{}", block_from_scid(self.0), tx_index_from_scid(self.0), vout_from_scid(self.0))
	}
}

impl FromStr for HumanReadableScid {
	type Err = ShortChannelIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split('x');
		let mut next_part = || -> Result<u64, ShortChannelIdError> {
			parts.next()
				.and_then(|p| p.parse::<u64>().ok())
				.ok_or(ShortChannelIdError::InvalidHumanReadableForm)
		};
		let block = next_part()?;
		let tx_index = next_part()?;
		let vout = next_part()?;
		if parts.next().is_some() {
			return Err(ShortChannelIdError::InvalidHumanReadableForm);
		}
		Ok(HumanReadableScid(scid_from_parts(block, tx_index, vout)?))
	}
}
