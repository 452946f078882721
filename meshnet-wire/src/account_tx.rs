//! Account transaction variants — spec §4.1 / §6. A closed, exhaustively
//! matched tag set; adding a variant is a compile-time obligation for every
//! `match` in `meshnet-core`.

use serde::{Deserialize, Serialize};

use crate::envelope::OnionEnvelope;
use crate::ids::{EntityId, Hash32, LockId, OfferId, RequestId, Secret32, TimestampMs, TokenId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
	Left,
	Right,
}

impl Side {
	pub fn other(self) -> Side {
		match self {
			Side::Left => Side::Right,
			Side::Right => Side::Left,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcOutcome {
	Secret,
	Error,
}

/// A settlement diff over one token: `left + right + collateral == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDiff {
	pub token_id: TokenId,
	pub left_diff: i128,
	pub right_diff: i128,
	pub collateral_diff: i128,
}

/// One observed on-chain event, as folded into `j_event_claim`. Kept
/// intentionally small here; `meshnet-wire::events` carries the full
/// J-event payloads this variant's `events` field holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedJEvent {
	pub kind: String,
	pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AccountTx {
	AddDelta {
		token_id: TokenId,
	},
	SetCreditLimit {
		token_id: TokenId,
		side: Side,
		amount: u128,
	},
	DirectPayment {
		token_id: TokenId,
		amount: u128,
		route: Vec<EntityId>,
		from: EntityId,
		to: EntityId,
		description: Option<String>,
	},
	HtlcLock {
		lock_id: LockId,
		hashlock: Hash32,
		timelock_ms: TimestampMs,
		reveal_before_height: u64,
		amount: u128,
		token_id: TokenId,
		/// Whether the side carving `amount` out of its own capacity is
		/// the account's left or right entity.
		sender_is_left: bool,
		envelope: Option<OnionEnvelope>,
	},
	HtlcResolve {
		lock_id: LockId,
		outcome: HtlcOutcome,
		secret: Option<Secret32>,
		reason: Option<String>,
	},
	HtlcTimeout {
		lock_id: LockId,
	},
	SwapOffer {
		offer_id: OfferId,
		maker_is_left: bool,
		give_token_id: TokenId,
		give_amount: u128,
		want_token_id: TokenId,
		want_amount: u128,
		min_fill_ratio: u16,
	},
	SwapResolve {
		offer_id: OfferId,
		fill_ratio: u16,
		cancel_remainder: bool,
	},
	SwapCancel {
		offer_id: OfferId,
	},
	RequestWithdrawal {
		token_id: TokenId,
		amount: u128,
		request_id: RequestId,
	},
	SettleHold {
		workspace_version: u64,
		diffs: Vec<SettlementDiff>,
	},
	SettleRelease {
		workspace_version: u64,
		diffs: Vec<SettlementDiff>,
	},
	JEventClaim {
		claimed_by_left: bool,
		j_height: u64,
		j_block_hash: Hash32,
		events: Vec<ObservedJEvent>,
		observed_at: TimestampMs,
	},
}

impl AccountTx {
	/// The lock id this tx references, if any — used by the mempool/frame
	/// machinery to detect conflicting concurrent operations on one lock.
	pub fn lock_id(&self) -> Option<&LockId> {
		match self {
			AccountTx::HtlcLock { lock_id, .. }
			| AccountTx::HtlcResolve { lock_id, .. }
			| AccountTx::HtlcTimeout { lock_id } => Some(lock_id),
			_ => None,
		}
	}

	pub fn kind_name(&self) -> &'static str {
		match self {
			AccountTx::AddDelta { .. } => "add_delta",
			AccountTx::SetCreditLimit { .. } => "set_credit_limit",
			AccountTx::DirectPayment { .. } => "direct_payment",
			AccountTx::HtlcLock { .. } => "htlc_lock",
			AccountTx::HtlcResolve { .. } => "htlc_resolve",
			AccountTx::HtlcTimeout { .. } => "htlc_timeout",
			AccountTx::SwapOffer { .. } => "swap_offer",
			AccountTx::SwapResolve { .. } => "swap_resolve",
			AccountTx::SwapCancel { .. } => "swap_cancel",
			AccountTx::RequestWithdrawal { .. } => "request_withdrawal",
			AccountTx::SettleHold { .. } => "settle_hold",
			AccountTx::SettleRelease { .. } => "settle_release",
			AccountTx::JEventClaim { .. } => "j_event_claim",
		}
	}
}
