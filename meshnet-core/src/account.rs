//! The account machine's data model — spec §3 "Account machine" — and the
//! pure state transition (`apply_account_tx`) that every committed or
//! speculatively-proposed transaction goes through. Frame-level consensus
//! (proposing, ACKing, committing) lives in [`crate::frame_consensus`]; this
//! module only knows how to apply one transaction to one account's state.

use std::collections::{BTreeMap, VecDeque};

use meshnet_wire::account_tx::{HtlcOutcome, ObservedJEvent, SettlementDiff};
use meshnet_wire::error::{ErrorCode, HtlcErrorCode, MeshnetError};
use meshnet_wire::ids::{AccountKey, EntityId, Hash32, LockId, OfferId, RequestId, TimestampMs, TokenId};
use meshnet_wire::{AccountTx, Frame, Hanko, Side};

use crate::hashing::sha256_of_json;
use crate::ledger::DeltaRow;
use crate::settlement::SettlementWorkspaceState;

/// How far an unmatched `j_event_claim` observation is kept before being
/// pruned — spec §4.1 "Unmatched observations stay until matched or pruned
/// by age."
pub const J_OBSERVATION_MAX_AGE_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
	pub lock_id: LockId,
	pub hashlock: Hash32,
	pub timelock_ms: TimestampMs,
	pub reveal_before_height: u64,
	pub amount: u128,
	pub token_id: TokenId,
	pub sender_is_left: bool,
	pub has_envelope: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOfferState {
	pub offer_id: OfferId,
	pub maker_is_left: bool,
	pub give_token_id: TokenId,
	pub give_remaining: u128,
	pub want_token_id: TokenId,
	pub want_remaining: u128,
	pub min_fill_ratio: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofHeader {
	pub from_entity: EntityId,
	pub to_entity: EntityId,
	pub cooperative_nonce: u64,
	pub dispute_nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JObservation {
	pub j_height: u64,
	pub j_block_hash: Hash32,
	pub events: Vec<ObservedJEvent>,
	pub observed_at: TimestampMs,
}

impl JObservation {
	fn events_hash(&self) -> Hash32 {
		sha256_of_json(&self.events)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisputeConfig {
	pub left_dispute_delay: u32,
	pub right_dispute_delay: u32,
}

impl Default for DisputeConfig {
	fn default() -> Self {
		Self { left_dispute_delay: 10, right_dispute_delay: 10 }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDisputeState {
	pub started_by_left: bool,
	pub initial_cooperative_nonce: u64,
	pub initial_dispute_nonce: u64,
	pub dispute_timeout: Option<u64>,
	pub initial_proofbody_hash: Hash32,
	pub initial_arguments: Vec<u8>,
	pub finalize_queued: bool,
}

/// A withdrawal request awaiting settlement — spec §3 lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
	pub request_id: RequestId,
	pub token_id: TokenId,
	pub amount: u128,
}

/// The not-yet-ACKed frame a proposer is waiting on, plus the state it was
/// computed against so the proposer can roll back cleanly on rejection.
#[derive(Debug, Clone)]
pub struct PendingFrame {
	pub frame: Frame,
	pub proposer_hanko: Hanko,
}

#[derive(Debug, Clone)]
pub struct AccountState {
	pub key: AccountKey,
	pub mempool: VecDeque<AccountTx>,
	pub current_frame: Option<Frame>,
	pub pending_frame: Option<PendingFrame>,
	/// The post-proposal state a proposer computed while `pending_frame` is
	/// outstanding, adopted verbatim once the counterparty's ACK arrives so
	/// both sides commit bit-identical state.
	pub candidate_snapshot: Option<Box<AccountState>>,
	pub deltas: BTreeMap<TokenId, DeltaRow>,
	/// `(left_held, right_held)` per token from in-flight `settle_hold`s.
	pub holds: BTreeMap<TokenId, (u128, u128)>,
	pub global_credit_limit_left: u128,
	pub global_credit_limit_right: u128,
	pub proof_header: ProofHeader,
	pub locks: BTreeMap<LockId, Lock>,
	pub swap_offers: BTreeMap<OfferId, SwapOfferState>,
	pub withdrawal_requests: BTreeMap<RequestId, WithdrawalRequest>,
	pub settlement_workspace: Option<SettlementWorkspaceState>,
	pub active_dispute: Option<ActiveDisputeState>,
	pub dispute_config: DisputeConfig,
	pub on_chain_settlement_nonce: u64,
	pub j_observations_left: Vec<JObservation>,
	pub j_observations_right: Vec<JObservation>,
	pub j_event_chain: Vec<(u64, Hash32)>,
	pub last_finalized_j_height: u64,
	pub counterparty_dispute_proof_hanko: Option<Hanko>,
	pub counterparty_dispute_proof_body_hash: Option<Hash32>,
	pub dispute_proof_nonces_by_hash: BTreeMap<Hash32, u64>,
}

impl AccountState {
	pub fn new(key: AccountKey) -> Self {
		Self {
			key,
			mempool: VecDeque::new(),
			current_frame: None,
			pending_frame: None,
			candidate_snapshot: None,
			deltas: BTreeMap::new(),
			holds: BTreeMap::new(),
			global_credit_limit_left: 0,
			global_credit_limit_right: 0,
			proof_header: ProofHeader {
				from_entity: key.left,
				to_entity: key.right,
				cooperative_nonce: 0,
				dispute_nonce: 0,
			},
			locks: BTreeMap::new(),
			swap_offers: BTreeMap::new(),
			withdrawal_requests: BTreeMap::new(),
			settlement_workspace: None,
			active_dispute: None,
			dispute_config: DisputeConfig::default(),
			on_chain_settlement_nonce: 0,
			j_observations_left: Vec::new(),
			j_observations_right: Vec::new(),
			j_event_chain: Vec::new(),
			last_finalized_j_height: 0,
			counterparty_dispute_proof_hanko: None,
			counterparty_dispute_proof_body_hash: None,
			dispute_proof_nonces_by_hash: BTreeMap::new(),
		}
	}

	pub fn current_height(&self) -> u64 {
		self.current_frame.as_ref().map(|f| f.height).unwrap_or(0)
	}

	/// Frame N's proposer per spec §4.1: LEFT proposes odd heights, RIGHT
	/// proposes even heights (height N being the frame *about to be
	/// proposed*, i.e. `current_height + 1`).
	pub fn next_proposer_is_left(&self) -> bool {
		let next_height = self.current_height() + 1;
		next_height % 2 == 1
	}

	pub fn row_mut(&mut self, token_id: TokenId) -> Result<&mut DeltaRow, MeshnetError> {
		self.deltas.get_mut(&token_id).ok_or_else(|| {
			MeshnetError::new(ErrorCode::InvalidRequest, format!("no delta row for token {token_id}"))
		})
	}

	pub fn row(&self, token_id: TokenId) -> Result<&DeltaRow, MeshnetError> {
		self.deltas.get(&token_id).ok_or_else(|| {
			MeshnetError::new(ErrorCode::InvalidRequest, format!("no delta row for token {token_id}"))
		})
	}

	/// Capacity still sendable by `sender_is_left` after subtracting any
	/// outstanding `settle_hold` against that side — spec §4.3 "Holds".
	pub fn effective_available_to_send(&self, token_id: TokenId, sender_is_left: bool) -> u128 {
		let row = match self.deltas.get(&token_id) {
			Some(r) => r,
			None => return 0,
		};
		let raw = row.available_to_send(sender_is_left);
		let held = self.holds.get(&token_id).map(|(l, r)| if sender_is_left { *l } else { *r }).unwrap_or(0);
		raw.saturating_sub(held)
	}
}

/// Events an account-tx application yields for the entity layer to act on
/// (forwarding, fee accounting, chat-log messages). The account machine
/// itself never reaches across accounts.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum AccountEvent {
	LockCommitted { lock_id: LockId },
	LockResolved { lock_id: LockId, hashlock: Hash32, outcome: HtlcOutcome, secret: Option<Hash32>, reason: Option<String> },
	PendingForward {
		token_id: TokenId,
		amount: u128,
		next_hop: EntityId,
		remaining_route: Vec<EntityId>,
		description: Option<String>,
	},
	SwapFilled { offer_id: OfferId, give_token_id: TokenId, give_amount: u128, want_token_id: TokenId, want_amount: u128 },
	WithdrawalRequested { request_id: RequestId, token_id: TokenId, amount: u128 },
	JHeightFinalized { j_height: u64 },
}

/// Ambient parameters the account machine needs but doesn't own — current
/// wall-clock and J-height, used only to validate/execute timeout-shaped
/// transactions and prune stale J-observations.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
	pub now_ms: TimestampMs,
	pub max_settlement_diff: i128,
}

const MAX_FILL_RATIO: u32 = 65535;

pub fn apply_account_tx(
	state: &mut AccountState, tx: &AccountTx, ctx: &ApplyContext,
) -> Result<Vec<AccountEvent>, MeshnetError> {
	match tx {
		AccountTx::AddDelta { token_id } => {
			if state.deltas.contains_key(token_id) {
				return Err(MeshnetError::new(
					ErrorCode::InvalidRequest,
					format!("token {token_id} already has a delta row"),
				));
			}
			state.deltas.insert(*token_id, DeltaRow::new(*token_id));
			Ok(vec![])
		},

		AccountTx::SetCreditLimit { token_id, side, amount } => {
			let row = state.row_mut(*token_id)?;
			let mut candidate = *row;
			candidate.set_credit_limit(*side, *amount);
			candidate.check_invariant()?;
			*row = candidate;
			match side {
				Side::Left => state.global_credit_limit_left = (*amount).max(state.global_credit_limit_left),
				Side::Right => state.global_credit_limit_right = (*amount).max(state.global_credit_limit_right),
			}
			Ok(vec![])
		},

		AccountTx::DirectPayment { token_id, amount, route, from, to, description } => {
			let sender_is_left = *from == state.key.left;
			if sender_is_left && *from != state.key.left || !sender_is_left && *from != state.key.right {
				return Err(MeshnetError::new(ErrorCode::InvalidRequest, "from is not a party to this account"));
			}
			let _ = to;
			let row = state.row_mut(*token_id)?;
			row.move_offdelta(sender_is_left, *amount)?;
			if route.len() > 1 {
				Ok(vec![AccountEvent::PendingForward {
					token_id: *token_id,
					amount: *amount,
					next_hop: route[1],
					remaining_route: route[1..].to_vec(),
					description: description.clone(),
				}])
			} else {
				Ok(vec![])
			}
		},

		AccountTx::HtlcLock { lock_id, hashlock, timelock_ms, reveal_before_height, amount, token_id, sender_is_left, envelope } => {
			if state.locks.contains_key(lock_id) {
				return Err(MeshnetError::new(ErrorCode::InvalidRequest, format!("duplicate lock id {lock_id}")));
			}
			let available = state.effective_available_to_send(*token_id, *sender_is_left);
			if *amount > available {
				return Err(MeshnetError::new(ErrorCode::InvalidRequest, "insufficient capacity for htlc_lock"));
			}
			let row = state.row_mut(*token_id)?;
			row.move_offdelta(*sender_is_left, *amount)?;
			state.locks.insert(
				lock_id.clone(),
				Lock {
					lock_id: lock_id.clone(),
					hashlock: *hashlock,
					timelock_ms: *timelock_ms,
					reveal_before_height: *reveal_before_height,
					amount: *amount,
					token_id: *token_id,
					sender_is_left: *sender_is_left,
					has_envelope: envelope.is_some(),
				},
			);
			Ok(vec![AccountEvent::LockCommitted { lock_id: lock_id.clone() }])
		},

		AccountTx::HtlcResolve { lock_id, outcome, secret, reason } => {
			let lock = state
				.locks
				.get(lock_id)
				.cloned()
				.ok_or_else(|| MeshnetError::htlc(HtlcErrorCode::UnknownLock, format!("unknown lock {lock_id}")))?;
			match outcome {
				HtlcOutcome::Secret => {
					let secret = secret.ok_or_else(|| {
						MeshnetError::htlc(HtlcErrorCode::HashlockMismatch, "htlc_resolve(secret) missing secret")
					})?;
					if crate::hashing::sha256_bytes(&secret.0) != lock.hashlock {
						return Err(MeshnetError::htlc(HtlcErrorCode::HashlockMismatch, "secret does not hash to lock's hashlock"));
					}
					state.locks.remove(lock_id);
					Ok(vec![AccountEvent::LockResolved {
						lock_id: lock_id.clone(),
						hashlock: lock.hashlock,
						outcome: HtlcOutcome::Secret,
						secret: Some(secret),
						reason: None,
					}])
				},
				HtlcOutcome::Error => {
					let row = state.row_mut(lock.token_id)?;
					row.move_offdelta(!lock.sender_is_left, lock.amount)?;
					state.locks.remove(lock_id);
					Ok(vec![AccountEvent::LockResolved {
						lock_id: lock_id.clone(),
						hashlock: lock.hashlock,
						outcome: HtlcOutcome::Error,
						secret: None,
						reason: reason.clone(),
					}])
				},
			}
		},

		AccountTx::HtlcTimeout { lock_id } => {
			let lock = state
				.locks
				.get(lock_id)
				.cloned()
				.ok_or_else(|| MeshnetError::htlc(HtlcErrorCode::UnknownLock, format!("unknown lock {lock_id}")))?;
			if lock.timelock_ms > ctx.now_ms {
				return Err(MeshnetError::htlc(HtlcErrorCode::Timeout, "htlc_timeout before timelock elapsed"));
			}
			let row = state.row_mut(lock.token_id)?;
			row.move_offdelta(!lock.sender_is_left, lock.amount)?;
			state.locks.remove(lock_id);
			Ok(vec![AccountEvent::LockResolved {
				lock_id: lock_id.clone(),
				hashlock: lock.hashlock,
				outcome: HtlcOutcome::Error,
				secret: None,
				reason: Some("timeout".to_string()),
			}])
		},

		AccountTx::SwapOffer { offer_id, maker_is_left, give_token_id, give_amount, want_token_id, want_amount, min_fill_ratio } => {
			if state.swap_offers.contains_key(offer_id) {
				return Err(MeshnetError::new(ErrorCode::InvalidRequest, format!("duplicate offer id {offer_id}")));
			}
			state.swap_offers.insert(
				offer_id.clone(),
				SwapOfferState {
					offer_id: offer_id.clone(),
					maker_is_left: *maker_is_left,
					give_token_id: *give_token_id,
					give_remaining: *give_amount,
					want_token_id: *want_token_id,
					want_remaining: *want_amount,
					min_fill_ratio: *min_fill_ratio,
				},
			);
			Ok(vec![])
		},

		AccountTx::SwapResolve { offer_id, fill_ratio, cancel_remainder } => {
			let mut offer = state
				.swap_offers
				.get(offer_id)
				.cloned()
				.ok_or_else(|| MeshnetError::new(ErrorCode::InvalidRequest, format!("unknown offer {offer_id}")))?;
			if *fill_ratio as u32 > MAX_FILL_RATIO {
				return Err(MeshnetError::new(ErrorCode::InvalidRequest, "fill ratio exceeds maximum"));
			}
			let give_amount = offer.give_remaining * (*fill_ratio as u128) / (MAX_FILL_RATIO as u128);
			let want_amount = offer.want_remaining * (*fill_ratio as u128) / (MAX_FILL_RATIO as u128);

			let give_row = state.row_mut(offer.give_token_id)?;
			give_row.move_offdelta(offer.maker_is_left, give_amount)?;
			let want_row = state.row_mut(offer.want_token_id)?;
			want_row.move_offdelta(!offer.maker_is_left, want_amount)?;

			offer.give_remaining -= give_amount;
			offer.want_remaining -= want_amount;
			if *cancel_remainder || offer.give_remaining == 0 {
				state.swap_offers.remove(offer_id);
			} else {
				state.swap_offers.insert(offer_id.clone(), offer.clone());
			}
			Ok(vec![AccountEvent::SwapFilled {
				offer_id: offer_id.clone(),
				give_token_id: offer.give_token_id,
				give_amount,
				want_token_id: offer.want_token_id,
				want_amount,
			}])
		},

		AccountTx::SwapCancel { offer_id } => {
			state
				.swap_offers
				.remove(offer_id)
				.ok_or_else(|| MeshnetError::new(ErrorCode::InvalidRequest, format!("unknown offer {offer_id}")))?;
			Ok(vec![])
		},

		AccountTx::RequestWithdrawal { token_id, amount, request_id } => {
			state.withdrawal_requests.insert(
				request_id.clone(),
				WithdrawalRequest { request_id: request_id.clone(), token_id: *token_id, amount: *amount },
			);
			Ok(vec![AccountEvent::WithdrawalRequested { request_id: request_id.clone(), token_id: *token_id, amount: *amount }])
		},

		AccountTx::SettleHold { workspace_version: _, diffs } => {
			apply_holds(state, diffs, true)?;
			Ok(vec![])
		},

		AccountTx::SettleRelease { workspace_version: _, diffs } => {
			apply_holds(state, diffs, false)?;
			Ok(vec![])
		},

		AccountTx::JEventClaim { claimed_by_left, j_height, j_block_hash, events, observed_at } => {
			let observation =
				JObservation { j_height: *j_height, j_block_hash: *j_block_hash, events: events.clone(), observed_at: *observed_at };
			let (own, other) = if *claimed_by_left {
				(&mut state.j_observations_left, &state.j_observations_right)
			} else {
				(&mut state.j_observations_right, &state.j_observations_left)
			};
			let events_hash = observation.events_hash();
			let matched = other
				.iter()
				.any(|o| o.j_height == *j_height && o.j_block_hash == *j_block_hash && o.events_hash() == events_hash);
			own.push(observation);
			prune_stale_observations(&mut state.j_observations_left, ctx.now_ms);
			prune_stale_observations(&mut state.j_observations_right, ctx.now_ms);
			if matched && *j_height > state.last_finalized_j_height {
				state.last_finalized_j_height = *j_height;
				state.j_event_chain.push((*j_height, *j_block_hash));
				state.j_observations_left.retain(|o| o.j_height != *j_height);
				state.j_observations_right.retain(|o| o.j_height != *j_height);
				return Ok(vec![AccountEvent::JHeightFinalized { j_height: *j_height }]);
			}
			Ok(vec![])
		},
	}
}

fn prune_stale_observations(list: &mut Vec<JObservation>, now_ms: TimestampMs) {
	list.retain(|o| now_ms.saturating_sub(o.observed_at) <= J_OBSERVATION_MAX_AGE_MS);
}

fn apply_holds(state: &mut AccountState, diffs: &[SettlementDiff], is_hold: bool) -> Result<(), MeshnetError> {
	for d in diffs {
		let entry = state.holds.entry(d.token_id).or_insert((0, 0));
		if d.left_diff < 0 {
			let amount = (-d.left_diff) as u128;
			if is_hold {
				entry.0 += amount;
			} else {
				entry.0 = entry.0.saturating_sub(amount);
			}
		}
		if d.right_diff < 0 {
			let amount = (-d.right_diff) as u128;
			if is_hold {
				entry.1 += amount;
			} else {
				entry.1 = entry.1.saturating_sub(amount);
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use meshnet_wire::ids::EntityId;

	fn entities() -> (EntityId, EntityId) {
		(EntityId::from_bytes([1u8; 20]), EntityId::from_bytes([2u8; 20]))
	}

	fn fresh_state() -> AccountState {
		let (a, b) = entities();
		let key = AccountKey::new(a, b);
		let mut state = AccountState::new(key);
		let ctx = ApplyContext { now_ms: 0, max_settlement_diff: i128::MAX };
		apply_account_tx(&mut state, &AccountTx::AddDelta { token_id: 1 }, &ctx).unwrap();
		apply_account_tx(
			&mut state,
			&AccountTx::SetCreditLimit { token_id: 1, side: Side::Left, amount: 1_000_000 },
			&ctx,
		)
		.unwrap();
		apply_account_tx(
			&mut state,
			&AccountTx::SetCreditLimit { token_id: 1, side: Side::Right, amount: 1_000_000 },
			&ctx,
		)
		.unwrap();
		state
	}

	#[test]
	fn direct_payment_moves_delta_and_flags_forward() {
		let (a, b) = entities();
		let c = EntityId::from_bytes([3u8; 20]);
		let mut state = fresh_state();
		let ctx = ApplyContext { now_ms: 0, max_settlement_diff: i128::MAX };
		let events = apply_account_tx(
			&mut state,
			&AccountTx::DirectPayment {
				token_id: 1,
				amount: 100_000,
				route: vec![b, c],
				from: a,
				to: b,
				description: None,
			},
			&ctx,
		)
		.unwrap();
		assert_eq!(state.row(1).unwrap().delta(), -100_000);
		assert!(matches!(events[0], AccountEvent::PendingForward { next_hop, .. } if next_hop == c));
	}

	#[test]
	fn htlc_lock_then_timeout_restores_capacity() {
		let mut state = fresh_state();
		let ctx = ApplyContext { now_ms: 1_000, max_settlement_diff: i128::MAX };
		let lock_ctx = ApplyContext { now_ms: 0, max_settlement_diff: i128::MAX };
		apply_account_tx(
			&mut state,
			&AccountTx::HtlcLock {
				lock_id: "l1".to_string(),
				hashlock: Hash32::ZERO,
				timelock_ms: 500,
				reveal_before_height: 100,
				amount: 50_000,
				token_id: 1,
				sender_is_left: true,
				envelope: None,
			},
			&lock_ctx,
		)
		.unwrap();
		assert_eq!(state.row(1).unwrap().delta(), -50_000);

		apply_account_tx(&mut state, &AccountTx::HtlcTimeout { lock_id: "l1".to_string() }, &ctx).unwrap();
		assert_eq!(state.row(1).unwrap().delta(), 0);
		assert!(!state.locks.contains_key("l1"));
	}

	#[test]
	fn htlc_resolve_with_wrong_secret_is_rejected() {
		let mut state = fresh_state();
		let ctx = ApplyContext { now_ms: 0, max_settlement_diff: i128::MAX };
		apply_account_tx(
			&mut state,
			&AccountTx::HtlcLock {
				lock_id: "l1".to_string(),
				hashlock: crate::hashing::sha256_bytes(&[0xaa; 32]),
				timelock_ms: 500,
				reveal_before_height: 100,
				amount: 50_000,
				token_id: 1,
				sender_is_left: true,
				envelope: None,
			},
			&ctx,
		)
		.unwrap();
		let result = apply_account_tx(
			&mut state,
			&AccountTx::HtlcResolve {
				lock_id: "l1".to_string(),
				outcome: HtlcOutcome::Secret,
				secret: Some(Hash32::from_bytes([0xbb; 32])),
				reason: None,
			},
			&ctx,
		);
		assert!(result.is_err());
	}
}
