//! Turns the [`EntityEvent`]s any `apply_entity_tx`/`tick` call produces
//! into outbound effects: peer HTTP delivery for frame traffic, and
//! jurisdiction submission for a freshly hashed jBatch. Single-validator
//! deployments (`quorum.threshold == 1`, the common case — spec
//! SPEC_FULL.md §8 treats hanko construction as a signing trait seam, not a
//! feature this crate implements) sign and submit immediately; anything
//! else is logged and left for an external quorum-signing process to pick
//! up via `GET /v1/entity`'s pending-hash list.

use meshnet_entity::entity::EntityEvent;

use crate::peer_client;
use crate::state::AppState;

pub async fn dispatch_events(state: &AppState, events: Vec<EntityEvent>) {
	for event in events {
		match event {
			EntityEvent::AccountInputReady(input) => {
				let counterparty = input.account.counterparty(state_entity_id(state).await);
				if let Some(base_url) = peer_client::base_url_for(&state.peers, counterparty) {
					if let Err(e) = peer_client::send_account_input(&state.http_client, base_url, &input).await {
						log::warn!("failed to deliver account_input to {counterparty}: {e}");
					}
				} else {
					log::warn!("no peer base_url configured for {counterparty}, dropping account_input");
				}
			},
			EntityEvent::AccountAckReady(ack) => {
				let counterparty = ack.account.counterparty(state_entity_id(state).await);
				if let Some(base_url) = peer_client::base_url_for(&state.peers, counterparty) {
					if let Err(e) = peer_client::send_account_ack(&state.http_client, base_url, &ack).await {
						log::warn!("failed to deliver account_ack to {counterparty}: {e}");
					}
				} else {
					log::warn!("no peer base_url configured for {counterparty}, dropping account_ack");
				}
			},
			EntityEvent::HashToSign(to_sign) => {
				maybe_self_submit_batch(state, to_sign.nonce).await;
			},
			EntityEvent::ChatLogged { from, text } => {
				log::info!("chat from {from:?}: {text}");
			},
			EntityEvent::ProposalTallied { proposal_id, approved } => {
				log::info!("proposal {proposal_id} tallied: approved={approved}");
			},
		}
	}
}

async fn state_entity_id(state: &AppState) -> meshnet_wire::ids::EntityId {
	state.entity.lock().await.config.id
}

/// Single-validator fast path: sign the just-broadcast batch with our own
/// `LocalSigner` and submit straight to the jurisdiction adapter.
async fn maybe_self_submit_batch(state: &AppState, nonce: u64) {
	use meshnet_core::frame_consensus::HankoSigner;

	let (self_id, threshold, batch_hash, encoded) = {
		let entity = state.entity.lock().await;
		if entity.config.quorum.threshold != 1 {
			log::info!("jBatch nonce {nonce} awaits external quorum signing (threshold={})", entity.config.quorum.threshold);
			return;
		}
		let Some(sent) = entity.jbatch.sent.as_ref() else { return };
		if sent.nonce != nonce {
			return;
		}
		let encoded = serde_json::to_vec(&sent.contents).unwrap_or_default();
		(entity.config.id, entity.config.quorum.threshold, sent.batch_hash, encoded)
	};
	let _ = threshold;
	let _hanko = state.signer.sign(batch_hash);
	if let Err(e) = state.jurisdiction.submit_batch(self_id, &encoded, batch_hash).await {
		log::warn!("jBatch submission failed for nonce {nonce}: {e}");
	}
}
