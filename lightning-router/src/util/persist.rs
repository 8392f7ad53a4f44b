// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The persistence contract for the public channel graph. The router calls
//! into a [`NetworkStore`] synchronously while processing an event; the
//! backing implementation (a key-value store, SQLite, ...) lives outside this
//! crate.

use crate::ln::msgs::{ChannelAnnouncement, ChannelUpdate, NodeAnnouncement};
use crate::routing::gossip::NodeId;

use core::fmt;

/// An error surfaced by a [`NetworkStore`] implementation.
///
/// The router treats any store failure as fatal: it is returned to the event
/// loop unprocessed and no retry is attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
	/// The backing store failed, with a human-readable description.
	Backend(String),
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			StoreError::Backend(err) => write!(f, "network store failure: {}", err),
		}
	}
}

/// Storage for the announced channel graph.
///
/// Only public-graph data passes through this trait: channel announcements,
/// their directional updates, and node announcements. Node announcements are
/// persisted on receipt but intentionally not restored at startup.
pub trait NetworkStore {
	/// Returns every persisted channel announcement.
	fn list_channels(&self) -> Result<Vec<ChannelAnnouncement>, StoreError>;
	/// Returns every persisted channel update.
	fn list_channel_updates(&self) -> Result<Vec<ChannelUpdate>, StoreError>;
	/// Persists a newly accepted channel announcement.
	fn add_channel(&self, msg: &ChannelAnnouncement) -> Result<(), StoreError>;
	/// Removes a channel announcement, cascading to its updates.
	fn remove_channel(&self, short_channel_id: u64) -> Result<(), StoreError>;
	/// Persists the first update seen for a channel direction.
	fn add_channel_update(&self, msg: &ChannelUpdate) -> Result<(), StoreError>;
	/// Replaces the persisted update for a channel direction.
	fn update_channel_update(&self, msg: &ChannelUpdate) -> Result<(), StoreError>;
	/// Persists the first announcement seen for a node.
	fn add_node(&self, msg: &NodeAnnouncement) -> Result<(), StoreError>;
	/// Replaces the persisted announcement for a node.
	fn update_node(&self, msg: &NodeAnnouncement) -> Result<(), StoreError>;
	/// Removes a node's persisted announcement, if any.
	fn remove_node(&self, node_id: &NodeId) -> Result<(), StoreError>;
}
