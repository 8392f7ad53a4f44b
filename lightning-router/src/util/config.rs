// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Configuration of the router provided to it at startup.

use bitcoin::network::constants::Network;

use core::time::Duration;

/// Top-level router configuration.
///
/// The chain served by the router is derived from [`RouterConfig::network`]:
/// gossip whose chain hash does not match the network's genesis hash is
/// rejected, and outbound channel-range queries carry that hash.
#[derive(Copy, Clone, Debug)]
pub struct RouterConfig {
	/// The network whose channel graph this router tracks.
	///
	/// Default value: `Network::Bitcoin`.
	pub network: Network,
	/// Period of the gossip rebroadcast tick. The embedder owns the timer and
	/// delivers `TickBroadcast` at this interval.
	///
	/// Default value: 60 seconds.
	pub broadcast_interval: Duration,
	/// Lifetime of a directional channel exclusion. After excluding a channel
	/// direction from path finding, the embedder schedules the matching
	/// `LiftChannelExclusion` this far in the future.
	///
	/// Default value: 60 seconds.
	pub channel_exclude_duration: Duration,
}

impl Default for RouterConfig {
	fn default() -> Self {
		RouterConfig {
			network: Network::Bitcoin,
			broadcast_interval: Duration::from_secs(60),
			channel_exclude_duration: Duration::from_secs(60),
		}
	}
}
