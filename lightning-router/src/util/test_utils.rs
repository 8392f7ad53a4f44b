// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Test doubles and signed-message builders shared by the crate's tests.

use crate::ln::msgs::{
	ChannelAnnouncement, ChannelUpdate, NodeAnnouncement, UnsignedChannelAnnouncement,
	UnsignedChannelUpdate, UnsignedNodeAnnouncement, CHANNEL_FLAG_DIRECTION,
	MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX,
};
use crate::routing::gossip::{NodeId, Router};
use crate::routing::validation::{ChainValidator, ValidationResult};
use crate::util::config::RouterConfig;
use crate::util::logger::{Level, Logger, Record};
use crate::util::persist::{NetworkStore, StoreError};

use bitcoin::blockdata::constants::genesis_block;
use bitcoin::hash_types::BlockHash;
use bitcoin::network::constants::Network;
use bitcoin::secp256k1::{self, PublicKey, Secp256k1, SecretKey};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub struct TestLogger {
	level: Level,
	pub lines: Mutex<HashMap<(String, String), usize>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		TestLogger {
			level: Level::Trace,
			lines: Mutex::new(HashMap::new()),
		}
	}

	pub fn enable(&mut self, level: Level) {
		self.level = level;
	}

	pub fn assert_log(&self, module: String, line: String, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		assert_eq!(log_entries.get(&(module, line)), Some(&count));
	}

	/// Search for the number of occurrences of the logged lines which
	/// 1. belong to the specified module and
	/// 2. contain `line` in them.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries.iter().filter(|&(&(ref m, ref l), _c)| {
			m == module && l.contains(line)
		}).map(|(_, c)| c).sum();
		assert_eq!(l, count)
	}
}

impl Logger for TestLogger {
	fn log(&self, record: &Record) {
		*self.lines.lock().unwrap().entry((record.module_path.to_string(), format!("{}", record.args))).or_insert(0) += 1;
		if record.level >= self.level {
			println!("{:<5} [{} : {}, {}] {}", record.level.to_string(), record.module_path, record.file, record.line, record.args);
		}
	}
}

/// An in-memory [`NetworkStore`] recording enough about the calls made to it
/// for tests to assert on persistence behavior.
#[derive(Default)]
pub struct TestStore {
	pub channels: Mutex<BTreeMap<u64, ChannelAnnouncement>>,
	/// Updates keyed by `(short_channel_id, is_node_one)`.
	pub updates: Mutex<HashMap<(u64, bool), ChannelUpdate>>,
	pub nodes: Mutex<HashMap<NodeId, NodeAnnouncement>>,
	pub removed_channels: Mutex<Vec<u64>>,
	pub removed_nodes: Mutex<Vec<NodeId>>,
	pub added_channel_updates: Mutex<usize>,
	pub updated_channel_updates: Mutex<usize>,
}

impl TestStore {
	pub fn new() -> TestStore {
		TestStore::default()
	}
}

impl NetworkStore for TestStore {
	fn list_channels(&self) -> Result<Vec<ChannelAnnouncement>, StoreError> {
		Ok(self.channels.lock().unwrap().values().cloned().collect())
	}

	fn list_channel_updates(&self) -> Result<Vec<ChannelUpdate>, StoreError> {
		Ok(self.updates.lock().unwrap().values().cloned().collect())
	}

	fn add_channel(&self, msg: &ChannelAnnouncement) -> Result<(), StoreError> {
		self.channels.lock().unwrap().insert(msg.contents.short_channel_id, msg.clone());
		Ok(())
	}

	fn remove_channel(&self, short_channel_id: u64) -> Result<(), StoreError> {
		self.channels.lock().unwrap().remove(&short_channel_id);
		self.updates.lock().unwrap().retain(|(scid, _), _| *scid != short_channel_id);
		self.removed_channels.lock().unwrap().push(short_channel_id);
		Ok(())
	}

	fn add_channel_update(&self, msg: &ChannelUpdate) -> Result<(), StoreError> {
		*self.added_channel_updates.lock().unwrap() += 1;
		self.updates.lock().unwrap().insert((msg.contents.short_channel_id, msg.contents.is_node_one()), msg.clone());
		Ok(())
	}

	fn update_channel_update(&self, msg: &ChannelUpdate) -> Result<(), StoreError> {
		*self.updated_channel_updates.lock().unwrap() += 1;
		self.updates.lock().unwrap().insert((msg.contents.short_channel_id, msg.contents.is_node_one()), msg.clone());
		Ok(())
	}

	fn add_node(&self, msg: &NodeAnnouncement) -> Result<(), StoreError> {
		self.nodes.lock().unwrap().insert(msg.contents.node_id, msg.clone());
		Ok(())
	}

	fn update_node(&self, msg: &NodeAnnouncement) -> Result<(), StoreError> {
		self.nodes.lock().unwrap().insert(msg.contents.node_id, msg.clone());
		Ok(())
	}

	fn remove_node(&self, node_id: &NodeId) -> Result<(), StoreError> {
		self.nodes.lock().unwrap().remove(node_id);
		self.removed_nodes.lock().unwrap().push(*node_id);
		Ok(())
	}
}

/// A [`ChainValidator`] answering every check with a preset verdict.
pub struct TestValidator {
	pub result: Mutex<ValidationResult>,
}

impl Default for TestValidator {
	fn default() -> Self {
		TestValidator { result: Mutex::new(ValidationResult::Valid) }
	}
}

impl ChainValidator for TestValidator {
	fn check_channel(&self, _chain_hash: &BlockHash, _msg: &UnsignedChannelAnnouncement) -> ValidationResult {
		*self.result.lock().unwrap()
	}
}

/// The router type the crate's tests run against.
pub type TestRouter = Router<Arc<TestStore>, Arc<TestValidator>, Arc<TestLogger>>;

/// A test router on `Network::Testnet` along with handles on its doubles.
pub struct RouterTestHarness {
	pub store: Arc<TestStore>,
	pub logger: Arc<TestLogger>,
	pub validator: Arc<TestValidator>,
	router: TestRouter,
}

impl RouterTestHarness {
	/// A harness whose router validates announcements by signature only.
	pub fn new() -> Self {
		Self::build(false)
	}

	/// A harness whose router consults [`RouterTestHarness::validator`] for
	/// each announcement.
	pub fn with_validator() -> Self {
		Self::build(true)
	}

	fn build(use_validator: bool) -> Self {
		let store = Arc::new(TestStore::new());
		let logger = Arc::new(TestLogger::new());
		let validator = Arc::new(TestValidator::default());
		let config = RouterConfig { network: Network::Testnet, ..Default::default() };
		let secp_ctx = Secp256k1::new();
		let node_pubkey = PublicKey::from_secret_key(&secp_ctx, &our_node_key());
		let router = Router::new(
			config,
			node_pubkey,
			Arc::clone(&store),
			if use_validator { Some(Arc::clone(&validator)) } else { None },
			Arc::clone(&logger),
		).unwrap();
		RouterTestHarness { store, logger, validator, router }
	}

	pub fn router(&mut self) -> &mut TestRouter {
		&mut self.router
	}

	pub fn our_node_pubkey(&self) -> PublicKey {
		let secp_ctx = Secp256k1::new();
		PublicKey::from_secret_key(&secp_ctx, &our_node_key())
	}
}

/// The secret key of the harness router's own node.
pub fn our_node_key() -> SecretKey {
	SecretKey::from_slice(&[99; 32]).unwrap()
}

pub fn node_id_from_byte(key_byte: u8) -> NodeId {
	let secp_ctx = Secp256k1::new();
	let key = SecretKey::from_slice(&[key_byte; 32]).unwrap();
	NodeId::from_pubkey(&PublicKey::from_secret_key(&secp_ctx, &key))
}

/// A default enabled channel update for graph-level tests; carries no valid
/// signature context.
pub fn unsigned_channel_update(short_channel_id: u64) -> UnsignedChannelUpdate {
	UnsignedChannelUpdate {
		chain_hash: genesis_block(Network::Testnet).header.block_hash(),
		short_channel_id,
		timestamp: 100,
		message_flags: MESSAGE_FLAG_OPTION_CHANNEL_HTLC_MAX,
		channel_flags: 0,
		cltv_expiry_delta: 144,
		htlc_minimum_msat: 1_000_000,
		fee_base_msat: 10_000,
		fee_proportional_millionths: 20,
		htlc_maximum_msat: Some(100_000_000),
	}
}

/// Builds a four-signature channel announcement between the given keys,
/// ordering the node ids lexicographically as the protocol requires. The
/// closure may mutate the unsigned contents before signing.
pub fn get_signed_channel_announcement<F: Fn(&mut UnsignedChannelAnnouncement)>(f: F, node_a_key: &SecretKey, node_b_key: &SecretKey, secp_ctx: &Secp256k1<secp256k1::All>) -> ChannelAnnouncement {
	let node_a_pubkey = PublicKey::from_secret_key(secp_ctx, node_a_key);
	let node_b_pubkey = PublicKey::from_secret_key(secp_ctx, node_b_key);
	let (node_1_key, node_1_pubkey, node_2_key, node_2_pubkey) =
		if node_a_pubkey.serialize() < node_b_pubkey.serialize() {
			(node_a_key, node_a_pubkey, node_b_key, node_b_pubkey)
		} else {
			(node_b_key, node_b_pubkey, node_a_key, node_a_pubkey)
		};
	let node_1_btckey = SecretKey::from_slice(&[40; 32]).unwrap();
	let node_2_btckey = SecretKey::from_slice(&[39; 32]).unwrap();

	let mut unsigned_announcement = UnsignedChannelAnnouncement {
		features: Vec::new(),
		chain_hash: genesis_block(Network::Testnet).header.block_hash(),
		short_channel_id: 0,
		node_id_1: NodeId::from_pubkey(&node_1_pubkey),
		node_id_2: NodeId::from_pubkey(&node_2_pubkey),
		bitcoin_key_1: NodeId::from_pubkey(&PublicKey::from_secret_key(secp_ctx, &node_1_btckey)),
		bitcoin_key_2: NodeId::from_pubkey(&PublicKey::from_secret_key(secp_ctx, &node_2_btckey)),
	};
	f(&mut unsigned_announcement);
	let msghash = unsigned_announcement.sighash();
	ChannelAnnouncement {
		node_signature_1: secp_ctx.sign_ecdsa(&msghash, node_1_key),
		node_signature_2: secp_ctx.sign_ecdsa(&msghash, node_2_key),
		bitcoin_signature_1: secp_ctx.sign_ecdsa(&msghash, &node_1_btckey),
		bitcoin_signature_2: secp_ctx.sign_ecdsa(&msghash, &node_2_btckey),
		contents: unsigned_announcement,
	}
}

/// Builds a channel update signed by `node_key`, with the direction bit as
/// the closure leaves it (node-one by default).
pub fn get_signed_channel_update<F: Fn(&mut UnsignedChannelUpdate)>(f: F, node_key: &SecretKey, secp_ctx: &Secp256k1<secp256k1::All>) -> ChannelUpdate {
	let mut unsigned_channel_update = unsigned_channel_update(0);
	f(&mut unsigned_channel_update);
	let msghash = unsigned_channel_update.sighash();
	ChannelUpdate {
		signature: secp_ctx.sign_ecdsa(&msghash, node_key),
		contents: unsigned_channel_update,
	}
}

/// Builds a channel update for the `from_key -> to_key` direction of a
/// channel between those keys, deriving the direction bit from their pubkey
/// ordering and signing with `from_key`.
pub fn get_signed_update_between<F: Fn(&mut UnsignedChannelUpdate)>(short_channel_id: u64, from_key: &SecretKey, to_key: &SecretKey, f: F, secp_ctx: &Secp256k1<secp256k1::All>) -> ChannelUpdate {
	let from_pubkey = PublicKey::from_secret_key(secp_ctx, from_key);
	let to_pubkey = PublicKey::from_secret_key(secp_ctx, to_key);
	get_signed_channel_update(|unsigned_update| {
		unsigned_update.short_channel_id = short_channel_id;
		if from_pubkey.serialize() > to_pubkey.serialize() {
			unsigned_update.channel_flags |= CHANNEL_FLAG_DIRECTION;
		}
		f(unsigned_update);
	}, from_key, secp_ctx)
}

/// Builds a node announcement signed by `node_key`.
pub fn get_signed_node_announcement<F: Fn(&mut UnsignedNodeAnnouncement)>(f: F, node_key: &SecretKey, secp_ctx: &Secp256k1<secp256k1::All>) -> NodeAnnouncement {
	let node_id = NodeId::from_pubkey(&PublicKey::from_secret_key(secp_ctx, node_key));
	let mut unsigned_announcement = UnsignedNodeAnnouncement {
		features: Vec::new(),
		timestamp: 100,
		node_id,
		rgb: [0; 3],
		alias: [0; 32],
		addresses: Vec::new(),
	};
	f(&mut unsigned_announcement);
	let msghash = unsigned_announcement.sighash();
	NodeAnnouncement {
		signature: secp_ctx.sign_ecdsa(&msghash, node_key),
		contents: unsigned_announcement,
	}
}
