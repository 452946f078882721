//! Entity-transaction submission and peer-to-peer frame delivery — the
//! three POST endpoints every write against the orchestrator goes through.

use std::sync::Arc;

use meshnet_wire::error::MeshnetError;
use meshnet_wire::frame::{AccountAck, AccountInput};
use meshnet_wire::EntityTx;

use crate::api::dto::{ApiEvent, TxResponse};
use crate::io::persist::persist_entity_state;
use crate::state::AppState;

pub const ENTITY_TX_PATH: &str = "v1/tx";
pub const PEER_ACCOUNT_INPUT_PATH: &str = "v1/peer/account-input";
pub const PEER_ACCOUNT_ACK_PATH: &str = "v1/peer/account-ack";

/// Self-initiated actuation: whatever `EntityTx` the operator (or the CLI on
/// their behalf) wants applied, stamped as coming from this entity itself.
pub async fn handle_entity_tx_request(state: Arc<AppState>, tx: EntityTx) -> Result<TxResponse, MeshnetError> {
	let events = {
		let mut entity = state.entity.lock().await;
		let self_id = entity.config.id;
		let ctx = meshnet_entity::entity::EntityApplyContext {
			now_ms: crate::state::now_millis(),
			j_height: entity.last_finalized_j_height,
		};
		let events = entity
			.apply_entity_tx(self_id, tx, &ctx, state.jurisdiction.as_ref(), state.gossip.as_ref(), state.crypto.as_ref(), &state.signer)
			.await?;
		if let Err(e) = persist_entity_state(state.store.as_ref(), &entity) {
			log::warn!("failed to persist entity state after tx: {e}");
		}
		events
	};
	crate::dispatch::dispatch_events(&state, events.clone()).await;
	Ok(TxResponse { events: events.iter().map(ApiEvent::from).collect() })
}

/// A counterparty's proposed frame, delivered over the point-to-point peer
/// transport — spec §4.1's propose/ACK protocol's inbound leg.
pub async fn handle_peer_account_input_request(
	state: Arc<AppState>, input: AccountInput,
) -> Result<TxResponse, MeshnetError> {
	let events = {
		let mut entity = state.entity.lock().await;
		let self_id = entity.config.id;
		let from = input.account.counterparty(self_id);
		let ctx = meshnet_entity::entity::EntityApplyContext {
			now_ms: crate::state::now_millis(),
			j_height: entity.last_finalized_j_height,
		};
		let events = entity
			.apply_entity_tx(
				from,
				EntityTx::AccountInput { input },
				&ctx,
				state.jurisdiction.as_ref(),
				state.gossip.as_ref(),
				state.crypto.as_ref(),
				&state.signer,
			)
			.await?;
		if let Err(e) = persist_entity_state(state.store.as_ref(), &entity) {
			log::warn!("failed to persist entity state after account_input: {e}");
		}
		events
	};
	crate::dispatch::dispatch_events(&state, events.clone()).await;
	Ok(TxResponse { events: events.iter().map(ApiEvent::from).collect() })
}

/// A counterparty's ACK of a frame this entity proposed — the propose/ACK
/// protocol's outbound leg completing.
pub async fn handle_peer_account_ack_request(state: Arc<AppState>, ack: AccountAck) -> Result<TxResponse, MeshnetError> {
	let events = {
		let mut entity = state.entity.lock().await;
		let self_id = entity.config.id;
		let from = ack.account.counterparty(self_id);
		let ctx = meshnet_entity::entity::EntityApplyContext {
			now_ms: crate::state::now_millis(),
			j_height: entity.last_finalized_j_height,
		};
		let events = entity
			.apply_entity_tx(
				from,
				EntityTx::AccountAck { ack },
				&ctx,
				state.jurisdiction.as_ref(),
				state.gossip.as_ref(),
				state.crypto.as_ref(),
				&state.signer,
			)
			.await?;
		if let Err(e) = persist_entity_state(state.store.as_ref(), &entity) {
			log::warn!("failed to persist entity state after account_ack: {e}");
		}
		events
	};
	crate::dispatch::dispatch_events(&state, events.clone()).await;
	Ok(TxResponse { events: events.iter().map(ApiEvent::from).collect() })
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;
	use std::sync::Arc;

	use meshnet_core::account::DisputeConfig;
	use meshnet_entity::adapters::{MockJurisdiction, StaticGossip, XorCryptoProvider};
	use meshnet_entity::config::{EntityConfig, HtlcConfig, JurisdictionConfig, QuorumConfig};
	use meshnet_entity::entity::Entity;
	use meshnet_wire::ids::EntityId;
	use metrics_exporter_prometheus::PrometheusBuilder;

	use super::*;
	use crate::api::query::{handle_get_entity_request, handle_list_accounts_request};
	use crate::io::persist::sqlite_store::SqliteStore;
	use crate::state::AppState;
	use crate::util::signer::LocalSigner;

	fn test_config(id: EntityId) -> EntityConfig {
		EntityConfig {
			id,
			jurisdiction: JurisdictionConfig {
				chain_id: 1,
				depository_address: vec![0xAA; 20],
				entity_provider_address: vec![0xBB; 20],
			},
			quorum: QuorumConfig { validators: vec![id], threshold: 1 },
			base_fee: 10,
			dispute: DisputeConfig::default(),
			htlc: HtlcConfig::default(),
			max_settlement_diff: 1_000_000_000,
			skip_pending_forward: false,
		}
	}

	fn test_state(id: EntityId) -> Arc<AppState> {
		let entity = Entity::new(test_config(id));
		let jurisdiction = Box::new(MockJurisdiction::new());
		let gossip = Box::new(StaticGossip::new());
		let crypto = Box::new(XorCryptoProvider { own: id });
		let signer = LocalSigner::new(id, [7; 32]);
		let store = Box::new(SqliteStore::new(":memory:").expect("in-memory sqlite store"));
		let (_recorder, handle) = PrometheusBuilder::new().build();
		Arc::new(AppState::new(entity, jurisdiction, gossip, crypto, signer, store, BTreeMap::new(), handle))
	}

	#[tokio::test]
	async fn open_account_then_list_accounts_reflects_it() {
		let a = EntityId::from_bytes([1; 20]);
		let b = EntityId::from_bytes([2; 20]);
		let state = test_state(a);

		handle_entity_tx_request(Arc::clone(&state), EntityTx::OpenAccount { counterparty: b }).await.unwrap();

		let accounts = handle_list_accounts_request(Arc::clone(&state)).await.unwrap();
		assert_eq!(accounts.len(), 1);
		assert_eq!(accounts[0].counterparty, b);

		let summary = handle_get_entity_request(Arc::clone(&state)).await.unwrap();
		assert_eq!(summary.open_accounts, 1);
	}

	#[tokio::test]
	async fn settle_approve_without_a_pending_workspace_surfaces_as_error() {
		let a = EntityId::from_bytes([1; 20]);
		let b = EntityId::from_bytes([2; 20]);
		let state = test_state(a);

		let result = handle_entity_tx_request(Arc::clone(&state), EntityTx::SettleApprove { counterparty: b }).await;
		assert!(result.is_err());
	}
}
