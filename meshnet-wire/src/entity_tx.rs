//! Entity transaction variants — spec §4.5 / §6. Applied by the
//! orchestrator's apply loop against an `Entity` snapshot.

use serde::{Deserialize, Serialize};

use crate::account_tx::SettlementDiff;
use crate::frame::{AccountAck, AccountInput, Hanko};
use crate::ids::{AccountKey, EntityId, Hash32, LockId, OfferId, RequestId, TokenId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntityTx {
	Chat {
		text: String,
	},
	ChatMessage {
		from: EntityId,
		text: String,
	},
	Propose {
		proposal_id: String,
		body: serde_json::Value,
	},
	Vote {
		proposal_id: String,
		approve: bool,
	},
	ProfileUpdate {
		alias: Option<String>,
		base_fee: Option<u128>,
	},
	InitOrderbookExt {
		pairs: Vec<(TokenId, TokenId)>,
	},
	JEvent {
		j_height: u64,
		event: crate::events::JEvent,
	},
	AccountInput {
		input: AccountInput,
	},
	AccountAck {
		ack: AccountAck,
	},
	OpenAccount {
		counterparty: EntityId,
	},
	HtlcPayment {
		target: EntityId,
		token_id: TokenId,
		amount: u128,
		route: Option<Vec<EntityId>>,
		hashlock: Hash32,
		secret: Option<Hash32>,
	},
	ProcessHtlcTimeouts {
		now_ms: u64,
		last_finalized_j_height: u64,
	},
	ManualHtlcLock {
		counterparty: EntityId,
		lock_id: LockId,
		hashlock: Hash32,
		timelock_ms: u64,
		reveal_before_height: u64,
		amount: u128,
		token_id: TokenId,
	},
	DirectPayment {
		target: EntityId,
		token_id: TokenId,
		amount: u128,
		route: Option<Vec<EntityId>>,
		description: Option<String>,
	},
	DepositCollateral {
		counterparty: EntityId,
		token_id: TokenId,
		amount: u128,
	},
	ReserveToReserve {
		to: EntityId,
		token_id: TokenId,
		amount: u128,
	},
	JBroadcast,
	JRebroadcast {
		gas_bump_bps: Option<u32>,
	},
	JClearBatch,
	JAbortSentBatch {
		requeue: bool,
	},
	MintReserves {
		token_id: TokenId,
		amount: u128,
	},
	CreateSettlement {
		counterparty: EntityId,
		diffs: Vec<SettlementDiff>,
		forgive_token_ids: Vec<TokenId>,
		memo: Option<String>,
	},
	ExtendCredit {
		counterparty: EntityId,
		token_id: TokenId,
		amount: u128,
	},
	PlaceSwapOffer {
		counterparty: EntityId,
		give_token_id: TokenId,
		give_amount: u128,
		want_token_id: TokenId,
		want_amount: u128,
		min_fill_ratio: u16,
	},
	ResolveSwap {
		counterparty: EntityId,
		offer_id: OfferId,
		fill_ratio: u16,
		cancel_remainder: bool,
	},
	FillSwapOffer {
		counterparty: EntityId,
		offer_id: OfferId,
	},
	CancelSwapOffer {
		counterparty: EntityId,
		offer_id: OfferId,
	},
	RequestWithdrawal {
		counterparty: EntityId,
		token_id: TokenId,
		amount: u128,
		request_id: RequestId,
	},
	SettleDiffs {
		counterparty: EntityId,
		diffs: Vec<SettlementDiff>,
	},
	SettlePropose {
		counterparty: EntityId,
		ops: Vec<crate::settlement::SettlementOp>,
		memo: Option<String>,
	},
	SettleUpdate {
		counterparty: EntityId,
		ops: Vec<crate::settlement::SettlementOp>,
		memo: Option<String>,
	},
	SettleApprove {
		counterparty: EntityId,
	},
	SettleExecute {
		counterparty: EntityId,
		counterparty_hanko: Hanko,
	},
	SettleReject {
		counterparty: EntityId,
	},
	DisputeStart {
		counterparty: EntityId,
	},
	DisputeFinalize {
		counterparty: EntityId,
	},
}

impl EntityTx {
	pub fn kind_name(&self) -> &'static str {
		match self {
			EntityTx::Chat { .. } => "chat",
			EntityTx::ChatMessage { .. } => "chatMessage",
			EntityTx::Propose { .. } => "propose",
			EntityTx::Vote { .. } => "vote",
			EntityTx::ProfileUpdate { .. } => "profile-update",
			EntityTx::InitOrderbookExt { .. } => "initOrderbookExt",
			EntityTx::JEvent { .. } => "j_event",
			EntityTx::AccountInput { .. } => "accountInput",
			EntityTx::AccountAck { .. } => "accountAck",
			EntityTx::OpenAccount { .. } => "openAccount",
			EntityTx::HtlcPayment { .. } => "htlcPayment",
			EntityTx::ProcessHtlcTimeouts { .. } => "processHtlcTimeouts",
			EntityTx::ManualHtlcLock { .. } => "manualHtlcLock",
			EntityTx::DirectPayment { .. } => "directPayment",
			EntityTx::DepositCollateral { .. } => "deposit_collateral",
			EntityTx::ReserveToReserve { .. } => "reserve_to_reserve",
			EntityTx::JBroadcast => "j_broadcast",
			EntityTx::JRebroadcast { .. } => "j_rebroadcast",
			EntityTx::JClearBatch => "j_clear_batch",
			EntityTx::JAbortSentBatch { .. } => "j_abort_sent_batch",
			EntityTx::MintReserves { .. } => "mintReserves",
			EntityTx::CreateSettlement { .. } => "createSettlement",
			EntityTx::ExtendCredit { .. } => "extendCredit",
			EntityTx::PlaceSwapOffer { .. } => "placeSwapOffer",
			EntityTx::ResolveSwap { .. } => "resolveSwap",
			EntityTx::FillSwapOffer { .. } => "fillSwapOffer",
			EntityTx::CancelSwapOffer { .. } => "cancelSwapOffer",
			EntityTx::RequestWithdrawal { .. } => "requestWithdrawal",
			EntityTx::SettleDiffs { .. } => "settleDiffs",
			EntityTx::SettlePropose { .. } => "settle_propose",
			EntityTx::SettleUpdate { .. } => "settle_update",
			EntityTx::SettleApprove { .. } => "settle_approve",
			EntityTx::SettleExecute { .. } => "settle_execute",
			EntityTx::SettleReject { .. } => "settle_reject",
			EntityTx::DisputeStart { .. } => "disputeStart",
			EntityTx::DisputeFinalize { .. } => "disputeFinalize",
		}
	}

	/// The counterparty this tx targets, if it targets exactly one account.
	pub fn counterparty(&self) -> Option<EntityId> {
		match self {
			EntityTx::OpenAccount { counterparty }
			| EntityTx::DepositCollateral { counterparty, .. }
			| EntityTx::ExtendCredit { counterparty, .. }
			| EntityTx::PlaceSwapOffer { counterparty, .. }
			| EntityTx::ResolveSwap { counterparty, .. }
			| EntityTx::FillSwapOffer { counterparty, .. }
			| EntityTx::CancelSwapOffer { counterparty, .. }
			| EntityTx::RequestWithdrawal { counterparty, .. }
			| EntityTx::SettleDiffs { counterparty, .. }
			| EntityTx::SettlePropose { counterparty, .. }
			| EntityTx::SettleUpdate { counterparty, .. }
			| EntityTx::SettleApprove { counterparty }
			| EntityTx::SettleExecute { counterparty, .. }
			| EntityTx::SettleReject { counterparty }
			| EntityTx::DisputeStart { counterparty }
			| EntityTx::DisputeFinalize { counterparty }
			| EntityTx::ManualHtlcLock { counterparty, .. } => Some(*counterparty),
			EntityTx::HtlcPayment { target, .. } | EntityTx::DirectPayment { target, .. } => {
				Some(*target)
			},
			_ => None,
		}
	}
}

/// A parsed account reference paired with its canonical key, convenient for
/// handlers that need both the local-perspective counterparty id and the
/// (left, right) ordering.
pub fn account_key_for(local: EntityId, counterparty: EntityId) -> AccountKey {
	AccountKey::new(local, counterparty)
}
