//! J-machine events consumed by the entity — spec §6 "J-events consumed".

use serde::{Deserialize, Serialize};

use crate::account_tx::SettlementDiff;
use crate::frame::Hanko;
use crate::ids::{EntityId, Hash32, TokenId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JEvent {
	HankoBatchProcessed {
		entity: EntityId,
		nonce: u64,
	},
	DisputeStarted {
		left: EntityId,
		right: EntityId,
		started_by_left: bool,
		cooperative_nonce: u64,
		dispute_nonce: u64,
		proofbody_hash: Hash32,
		initial_arguments: Vec<u8>,
		dispute_until_block: u64,
	},
	DisputeFinalized {
		left: EntityId,
		right: EntityId,
		final_cooperative_nonce: u64,
		final_dispute_nonce: u64,
		cooperative: bool,
	},
	SettlementProcessed {
		left: EntityId,
		right: EntityId,
		nonce: u64,
		diffs: Vec<SettlementDiff>,
	},
	ReserveUpdated {
		entity: EntityId,
		token_id: TokenId,
		new_amount: u128,
	},
	CollateralUpdated {
		left: EntityId,
		right: EntityId,
		token_id: TokenId,
		new_collateral: u128,
		new_ondelta: i128,
	},
	BlockTip {
		block_number: u64,
	},
}

/// A dispute start artifact recorded into `jBatchState.batch.disputeStarts`
/// — spec §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeStart {
	pub counterparty: EntityId,
	pub cooperative_nonce: u64,
	pub dispute_nonce: u64,
	pub proofbody_hash: Hash32,
	pub sig: Hanko,
	pub initial_arguments: Vec<u8>,
}

/// A dispute finalization artifact — spec §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeFinalization {
	pub counterparty: EntityId,
	pub initial_cooperative_nonce: u64,
	pub final_cooperative_nonce: u64,
	pub initial_dispute_nonce: u64,
	pub final_dispute_nonce: u64,
	pub initial_proofbody_hash: Hash32,
	pub final_proof_body: Vec<u8>,
	pub final_arguments: Vec<u8>,
	pub initial_arguments: Vec<u8>,
	/// Counterparty hanko, only populated for a counter-dispute.
	pub sig: Hanko,
	pub started_by_left: bool,
	pub dispute_until_block: u64,
	pub cooperative: bool,
}

/// A settlement appended to a jBatch — spec §4.3/§4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
	pub left_entity: EntityId,
	pub right_entity: EntityId,
	pub diffs: Vec<SettlementDiff>,
	pub forgive_token_ids: Vec<TokenId>,
	pub hanko: Hanko,
	pub entity_provider: EntityId,
	pub nonce: u64,
}
