// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

#![crate_name = "lightning_router"]

//! The routing core of a Lightning node, in library form.
//!
//! The [`Router`] ingests authenticated gossip from peers, reconciles it with
//! a persisted snapshot and with locally-known private channels, prunes stale
//! entries on timer ticks, answers cheapest-path queries with per-request
//! blacklists and routing-hint overlays, and drives the channel-range
//! synchronization handshake with peers.
//!
//! There is no built-in execution environment: the embedder owns the event
//! loop, feeds [`RouterEvent`]s in arrival order, drains the outbound message
//! and network-event queues, and fires the timers. All state is owned by the
//! single [`Router`] value, so no internal locking is required or performed.
//!
//! [`Router`]: crate::routing::gossip::Router
//! [`RouterEvent`]: crate::routing::gossip::RouterEvent

#![cfg_attr(not(any(test, feature = "_test_utils")), deny(missing_docs))]
#![cfg_attr(not(any(test, feature = "_test_utils")), forbid(unsafe_code))]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate bitcoin;
#[cfg(test)]
extern crate hex;

#[macro_use]
pub mod util;
pub mod ln;
pub mod routing;
