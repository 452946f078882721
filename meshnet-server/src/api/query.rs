//! Read-only views over the entity's local state — no wire-protocol
//! mutation, just a snapshot for an operator or a monitoring process.

use std::sync::Arc;

use meshnet_wire::error::MeshnetError;

use crate::api::dto::{AccountSummary, EntitySummary, HashToSignDto};
use crate::state::AppState;

pub const GET_ENTITY_PATH: &str = "v1/entity";
pub const LIST_ACCOUNTS_PATH: &str = "v1/entity/accounts";

pub async fn handle_get_entity_request(state: Arc<AppState>) -> Result<EntitySummary, MeshnetError> {
	let entity = state.entity.lock().await;
	Ok(EntitySummary {
		id: entity.config.id,
		open_accounts: entity.accounts.len(),
		reserves: entity.reserves.clone(),
		jbatch_entity_nonce: entity.jbatch.entity_nonce,
		jbatch_in_flight: entity.jbatch.sent.is_some(),
		pending_hash_to_sign: entity.jbatch.sent.as_ref().map(|s| HashToSignDto { hash: s.batch_hash, nonce: s.nonce }),
		last_finalized_j_height: entity.last_finalized_j_height,
		active_dispute_count: entity.accounts.values().filter(|a| a.active_dispute.is_some()).count(),
	})
}

pub async fn handle_list_accounts_request(state: Arc<AppState>) -> Result<Vec<AccountSummary>, MeshnetError> {
	let entity = state.entity.lock().await;
	let self_id = entity.config.id;
	Ok(entity
		.accounts
		.values()
		.map(|a| AccountSummary {
			counterparty: a.key.counterparty(self_id),
			local_is_left: a.key.is_left(self_id),
			token_count: a.deltas.len(),
			lock_count: a.locks.len(),
			active_dispute: a.active_dispute.is_some(),
			settlement_in_progress: a.settlement_workspace.is_some(),
			on_chain_settlement_nonce: a.on_chain_settlement_nonce,
		})
		.collect())
}
