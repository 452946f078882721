//! Boundary traits the orchestrator suspends on — spec §5 "Suspension
//! points": the jurisdiction adapter, the gossip service, and (re-exported
//! from `meshnet-core`) the crypto provider. Deterministic in-memory
//! implementations back the integration tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use meshnet_core::onion::CryptoProvider;
use meshnet_wire::error::MeshnetError;
use meshnet_wire::ids::{EntityId, Hash32, TokenId};

/// What the J-machine can tell an entity about itself on demand, outside
/// the event stream — spec §4.6 "preflights dispute finalizations by
/// querying the J-machine".
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountInfo {
	pub reserve: u128,
	pub entity_nonce: u64,
}

#[async_trait]
pub trait JurisdictionAdapter: Send + Sync {
	async fn get_account_info(&self, entity: EntityId, token_id: TokenId) -> Result<AccountInfo, MeshnetError>;

	/// Submits a batch's calldata; returns once the jurisdiction worker has
	/// accepted it into its input queue (spec §5: "bounded producer-consumer"),
	/// not once it's mined.
	async fn submit_batch(&self, entity: EntityId, encoded_batch: &[u8], batch_hash: Hash32) -> Result<(), MeshnetError>;

	/// Whether a given dispute (by its initial `proofbodyHash`) is already
	/// finalized on-chain — used to preflight `j_broadcast`'s dispute
	/// finalizations. `Ok(None)` means the query was unreadable (fail-closed:
	/// the caller keeps the entry per spec §4.6).
	async fn is_dispute_finalized(&self, proofbody_hash: Hash32) -> Result<Option<bool>, MeshnetError>;
}

/// A hop's known public routing profile: its crypto pubkey placeholder and
/// its minimum relay fee, as sourced from gossip — spec §4.2 "sourced from
/// the hop's replica or gossip profile".
#[derive(Debug, Clone, Copy)]
pub struct GossipProfile {
	pub base_fee: u128,
}

#[async_trait]
pub trait GossipService: Send + Sync {
	fn profile_of(&self, entity: EntityId) -> Option<GossipProfile>;
	/// A shortest-hop-count path from `from` to `to`, inclusive of both
	/// endpoints, over the gossiped topology graph.
	fn find_route(&self, from: EntityId, to: EntityId) -> Option<Vec<EntityId>>;
}

pub use meshnet_core::onion::CryptoProvider as EntityCryptoProvider;

/// A same-process, always-succeeds jurisdiction mock: tracks reserves and
/// nonces directly, for tests and local demos that have no real contract.
#[derive(Default)]
pub struct MockJurisdiction {
	state: Mutex<MockJurisdictionState>,
}

#[derive(Default)]
struct MockJurisdictionState {
	reserves: BTreeMap<(EntityId, TokenId), u128>,
	nonces: BTreeMap<EntityId, u64>,
	finalized_disputes: BTreeMap<Hash32, bool>,
}

impl MockJurisdiction {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn credit_reserve(&self, entity: EntityId, token_id: TokenId, amount: u128) {
		let mut state = self.state.lock().unwrap();
		*state.reserves.entry((entity, token_id)).or_insert(0) += amount;
	}

	pub fn mark_dispute_finalized(&self, proofbody_hash: Hash32, finalized: bool) {
		self.state.lock().unwrap().finalized_disputes.insert(proofbody_hash, finalized);
	}
}

#[async_trait]
impl JurisdictionAdapter for MockJurisdiction {
	async fn get_account_info(&self, entity: EntityId, token_id: TokenId) -> Result<AccountInfo, MeshnetError> {
		let state = self.state.lock().unwrap();
		Ok(AccountInfo {
			reserve: state.reserves.get(&(entity, token_id)).copied().unwrap_or(0),
			entity_nonce: state.nonces.get(&entity).copied().unwrap_or(0),
		})
	}

	async fn submit_batch(&self, entity: EntityId, _encoded_batch: &[u8], _batch_hash: Hash32) -> Result<(), MeshnetError> {
		let mut state = self.state.lock().unwrap();
		*state.nonces.entry(entity).or_insert(0) += 1;
		Ok(())
	}

	async fn is_dispute_finalized(&self, proofbody_hash: Hash32) -> Result<Option<bool>, MeshnetError> {
		Ok(self.state.lock().unwrap().finalized_disputes.get(&proofbody_hash).copied())
	}
}

/// A static topology gossip stub: a fixed adjacency list and per-entity fee
/// profile, enough to drive pathfinding tests deterministically.
#[derive(Default)]
pub struct StaticGossip {
	profiles: BTreeMap<EntityId, GossipProfile>,
	adjacency: BTreeMap<EntityId, Vec<EntityId>>,
}

impl StaticGossip {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_profile(&mut self, entity: EntityId, profile: GossipProfile) {
		self.profiles.insert(entity, profile);
	}

	pub fn add_edge(&mut self, a: EntityId, b: EntityId) {
		self.adjacency.entry(a).or_default().push(b);
		self.adjacency.entry(b).or_default().push(a);
	}
}

impl GossipService for StaticGossip {
	fn profile_of(&self, entity: EntityId) -> Option<GossipProfile> {
		self.profiles.get(&entity).copied()
	}

	/// Breadth-first shortest path — sufficient for a gossip graph sized like
	/// a handful of hub entities; a weighted Dijkstra variant is the natural
	/// next step once fee-aware routing is needed.
	fn find_route(&self, from: EntityId, to: EntityId) -> Option<Vec<EntityId>> {
		if from == to {
			return Some(vec![from]);
		}
		let mut visited = std::collections::BTreeSet::new();
		let mut queue = std::collections::VecDeque::new();
		let mut prev: BTreeMap<EntityId, EntityId> = BTreeMap::new();
		visited.insert(from);
		queue.push_back(from);
		while let Some(current) = queue.pop_front() {
			for &next in self.adjacency.get(&current).into_iter().flatten() {
				if visited.insert(next) {
					prev.insert(next, current);
					if next == to {
						let mut path = vec![to];
						let mut cursor = to;
						while let Some(&p) = prev.get(&cursor) {
							path.push(p);
							cursor = p;
							if cursor == from {
								break;
							}
						}
						path.reverse();
						return Some(path);
					}
					queue.push_back(next);
				}
			}
		}
		None
	}
}

/// XOR-keyed crypto stand-in, same scheme `meshnet-core`'s onion tests use,
/// shared here so entity-level HTLC forwarding tests can exercise real
/// encrypt/decrypt round trips without a real KEM.
pub struct XorCryptoProvider {
	pub own: EntityId,
}

impl CryptoProvider for XorCryptoProvider {
	fn encrypt_to(&self, recipient: EntityId, plaintext: &[u8]) -> Vec<u8> {
		xor_with_key(plaintext, recipient.as_bytes())
	}

	fn decrypt_own(&self, ciphertext: &[u8]) -> Result<Vec<u8>, MeshnetError> {
		Ok(xor_with_key(ciphertext, self.own.as_bytes()))
	}
}

fn xor_with_key(data: &[u8], key: &[u8]) -> Vec<u8> {
	data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
}
