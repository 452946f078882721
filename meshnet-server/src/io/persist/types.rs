//! Persistence-shaped DTOs — the teacher keeps a `StoredForwardedPayment`
//! distinct from `ldk_node`'s own live type for exactly this reason: the
//! wire/runtime type and the at-rest type don't have to be the same shape.
//! `AccountState`/`JBatchState` carry transient fields (in-flight mempool,
//! pending-frame scratch state) that don't need to survive a restart, so
//! these DTOs only snapshot what does.

use meshnet_core::account::AccountState;
use meshnet_entity::jbatch::JBatchState;
use meshnet_wire::frame::Frame;
use meshnet_wire::ids::{AccountKey, TokenId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDeltaRow {
	pub token_id: TokenId,
	pub ondelta: i128,
	pub offdelta: i128,
	pub collateral: u128,
	pub left_credit_limit: u128,
	pub right_credit_limit: u128,
	pub left_allowance: u128,
	pub right_allowance: u128,
}

/// A restart-durable snapshot of one account — spec SPEC_FULL.md §4's
/// `accounts/<counterparty_id>` namespace. In-flight mempool entries and an
/// outstanding `pending_frame` are dropped on restart: the tick loop simply
/// re-derives them from whatever's left committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAccount {
	pub key: AccountKey,
	pub current_frame: Option<Frame>,
	pub deltas: Vec<StoredDeltaRow>,
	pub on_chain_settlement_nonce: u64,
	pub last_finalized_j_height: u64,
	pub cooperative_nonce: u64,
	pub dispute_nonce: u64,
}

impl StoredAccount {
	pub fn from_account_state(account: &AccountState) -> Self {
		Self {
			key: account.key,
			current_frame: account.current_frame.clone(),
			deltas: account
				.deltas
				.values()
				.map(|d| StoredDeltaRow {
					token_id: d.token_id,
					ondelta: d.ondelta,
					offdelta: d.offdelta,
					collateral: d.collateral,
					left_credit_limit: d.left_credit_limit,
					right_credit_limit: d.right_credit_limit,
					left_allowance: d.left_allowance,
					right_allowance: d.right_allowance,
				})
				.collect(),
			on_chain_settlement_nonce: account.on_chain_settlement_nonce,
			last_finalized_j_height: account.last_finalized_j_height,
			cooperative_nonce: account.proof_header.cooperative_nonce,
			dispute_nonce: account.proof_header.dispute_nonce,
		}
	}

	/// Rehydrates a fresh [`AccountState`], restoring only what was snapshotted.
	pub fn into_account_state(self) -> AccountState {
		let mut account = AccountState::new(self.key);
		account.current_frame = self.current_frame;
		account.on_chain_settlement_nonce = self.on_chain_settlement_nonce;
		account.last_finalized_j_height = self.last_finalized_j_height;
		account.proof_header.cooperative_nonce = self.cooperative_nonce;
		account.proof_header.dispute_nonce = self.dispute_nonce;
		for row in self.deltas {
			account.deltas.insert(
				row.token_id,
				meshnet_core::ledger::DeltaRow {
					token_id: row.token_id,
					ondelta: row.ondelta,
					offdelta: row.offdelta,
					collateral: row.collateral,
					left_credit_limit: row.left_credit_limit,
					right_credit_limit: row.right_credit_limit,
					left_allowance: row.left_allowance,
					right_allowance: row.right_allowance,
				},
			);
		}
		account
	}
}

/// A restart-durable snapshot of the jBatch lifecycle state — spec
/// SPEC_FULL.md §4's `jbatch/<entity_id>` namespace. `current` (unsent,
/// still-accumulating) contents are intentionally not persisted: spec §4.6
/// only requires nonce discipline to survive a restart, not the exact
/// unsent queue, and rebuilding `current` from scratch after a crash is
/// strictly safer than replaying a half-written batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredJBatch {
	pub entity_nonce: u64,
}

impl StoredJBatch {
	pub fn from_jbatch_state(jbatch: &JBatchState) -> Self {
		Self { entity_nonce: jbatch.entity_nonce }
	}
}
