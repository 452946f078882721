//! JSON response shapes for the HTTP surface. Kept separate from the
//! domain types in `meshnet-wire`/`meshnet-entity` the same way the
//! teacher keeps its generated `.proto` response messages distinct from
//! `ldk_node`'s own runtime types — these are at-the-boundary views, not
//! the types the orchestrator works with internally.

use std::collections::BTreeMap;

use meshnet_entity::entity::EntityEvent;
use meshnet_wire::ids::{EntityId, Hash32, TokenId};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum ApiEvent {
	AccountInputReady { account: meshnet_wire::ids::AccountKey, height: u64 },
	AccountAckReady { account: meshnet_wire::ids::AccountKey, height: u64 },
	HashToSign { hash: Hash32, nonce: u64 },
	ChatLogged { from: Option<EntityId>, text: String },
	ProposalTallied { proposal_id: String, approved: bool },
}

impl From<&EntityEvent> for ApiEvent {
	fn from(event: &EntityEvent) -> Self {
		match event {
			EntityEvent::AccountInputReady(input) => {
				ApiEvent::AccountInputReady { account: input.account, height: input.frame.height }
			},
			EntityEvent::AccountAckReady(ack) => ApiEvent::AccountAckReady { account: ack.account, height: ack.height },
			EntityEvent::HashToSign(h) => ApiEvent::HashToSign { hash: h.hash, nonce: h.nonce },
			EntityEvent::ChatLogged { from, text } => ApiEvent::ChatLogged { from: *from, text: text.clone() },
			EntityEvent::ProposalTallied { proposal_id, approved } => {
				ApiEvent::ProposalTallied { proposal_id: proposal_id.clone(), approved: *approved }
			},
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct TxResponse {
	pub events: Vec<ApiEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashToSignDto {
	pub hash: Hash32,
	pub nonce: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
	pub id: EntityId,
	pub open_accounts: usize,
	pub reserves: BTreeMap<TokenId, u128>,
	pub jbatch_entity_nonce: u64,
	pub jbatch_in_flight: bool,
	pub pending_hash_to_sign: Option<HashToSignDto>,
	pub last_finalized_j_height: u64,
	pub active_dispute_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
	pub counterparty: EntityId,
	pub local_is_left: bool,
	pub token_count: usize,
	pub lock_count: usize,
	pub active_dispute: bool,
	pub settlement_in_progress: bool,
	pub on_chain_settlement_nonce: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chat_logged_event_converts_to_chat_logged_api_event() {
		let event = EntityEvent::ChatLogged { from: Some(EntityId::from_bytes([3; 20])), text: "hi".to_string() };
		match ApiEvent::from(&event) {
			ApiEvent::ChatLogged { from, text } => {
				assert_eq!(from, Some(EntityId::from_bytes([3; 20])));
				assert_eq!(text, "hi");
			},
			other => panic!("expected ChatLogged, got {other:?}"),
		}
	}

	#[test]
	fn tx_response_serializes_its_events_under_a_kind_tag() {
		let response = TxResponse { events: vec![ApiEvent::ProposalTallied { proposal_id: "p1".to_string(), approved: true }] };
		let json = serde_json::to_value(&response).unwrap();
		assert_eq!(json["events"][0]["kind"], "ProposalTallied");
		assert_eq!(json["events"][0]["approved"], true);
	}
}
