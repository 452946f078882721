//! Bilateral frame proposal/ACK protocol — spec §4.1 "Proposal / ACK
//! protocol". One account, one pending frame at a time; the scheduled
//! proposer alternates by height parity.

use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::frame::{AccountAck, AccountInput, Frame, FrameDelta};
use meshnet_wire::ids::{Hash32, TimestampMs};
use meshnet_wire::{AccountTx, Hanko};

use crate::account::{apply_account_tx, AccountEvent, AccountState, ApplyContext, PendingFrame};
use crate::hashing::sha256_of_json;

/// Signs a hash into a hanko. Real signing (the entity's quorum pipeline)
/// lives above this module; tests and simple deployments can pass
/// `|_| Hanko::empty()`.
pub trait HankoSigner {
	fn sign(&self, hash: Hash32) -> Hanko;
}

impl<F: Fn(Hash32) -> Hanko> HankoSigner for F {
	fn sign(&self, hash: Hash32) -> Hanko {
		self(hash)
	}
}

fn frame_hash(frame: &Frame) -> Hash32 {
	sha256_of_json(frame)
}

/// `H(tokenIds, deltas, cooperativeNonce)` — the dispute-grade `stateHash`
/// a frame's hankos are taken over.
fn compute_state_hash(token_ids: &[u32], deltas: &[FrameDelta], cooperative_nonce_after: u64) -> Hash32 {
	sha256_of_json(&(token_ids, deltas, cooperative_nonce_after))
}

fn snapshot_deltas(state: &AccountState) -> (Vec<u32>, Vec<FrameDelta>) {
	let token_ids: Vec<u32> = state.deltas.keys().copied().collect();
	let deltas = token_ids
		.iter()
		.map(|id| {
			let row = state.deltas.get(id).unwrap();
			FrameDelta {
				token_id: *id,
				ondelta: row.ondelta,
				offdelta: row.offdelta,
				collateral: row.collateral,
				left_credit_limit: row.left_credit_limit,
				right_credit_limit: row.right_credit_limit,
			}
		})
		.collect();
	(token_ids, deltas)
}

pub struct ProposalOutcome {
	pub account_input: AccountInput,
	pub events: Vec<AccountEvent>,
}

/// Drains a deterministic prefix of the mempool into a new frame, dropping
/// the first transaction that fails to apply and stopping there. Returns
/// `Ok(None)` when it isn't this side's turn, a frame is already pending, or
/// the mempool is empty.
pub fn propose_frame<S: HankoSigner>(
	state: &mut AccountState, local_is_left: bool, now_ms: TimestampMs, j_height: u64, signer: &S, ctx: &ApplyContext,
) -> Result<Option<ProposalOutcome>, MeshnetError> {
	if state.next_proposer_is_left() != local_is_left {
		return Ok(None);
	}
	if state.pending_frame.is_some() {
		return Ok(None);
	}
	if state.mempool.is_empty() {
		return Ok(None);
	}

	let mut candidate = state.clone();
	candidate.mempool.clear();
	let mut accepted = Vec::new();
	let mut events = Vec::new();
	let mut consumed = 0usize;
	for tx in state.mempool.iter() {
		consumed += 1;
		match apply_account_tx(&mut candidate, tx, ctx) {
			Ok(mut ev) => {
				accepted.push(tx.clone());
				events.append(&mut ev);
			},
			Err(_) => break,
		}
	}
	if accepted.is_empty() {
		// The head of the mempool couldn't apply; drop it so future ticks
		// don't spin on the same bad transaction.
		state.mempool.pop_front();
		return Ok(None);
	}
	for _ in 0..consumed {
		state.mempool.pop_front();
	}

	let height = state.current_height() + 1;
	let prev_frame_hash = state.current_frame.as_ref().map(frame_hash).unwrap_or(Hash32::ZERO);
	let (token_ids, deltas) = snapshot_deltas(&candidate);
	let cooperative_nonce_after = state.proof_header.cooperative_nonce + 1;
	let state_hash = compute_state_hash(&token_ids, &deltas, cooperative_nonce_after);

	let frame = Frame {
		account: state.key,
		height,
		timestamp: now_ms,
		j_height,
		account_txs: accepted,
		prev_frame_hash,
		token_ids,
		deltas,
		state_hash,
		by_left: local_is_left,
	};
	let proposer_hanko = signer.sign(state_hash);
	let expected_prev_hanko = state.counterparty_dispute_proof_hanko.clone().unwrap_or_else(Hanko::empty);

	candidate.mempool = state.mempool.clone();
	state.pending_frame = Some(PendingFrame { frame: frame.clone(), proposer_hanko: proposer_hanko.clone() });
	state.candidate_snapshot = Some(Box::new(candidate));

	Ok(Some(ProposalOutcome {
		account_input: AccountInput { account: state.key, frame, proposer_hanko, expected_prev_hanko },
		events,
	}))
}

pub struct ReceiveOutcome {
	pub ack: AccountAck,
	pub events: Vec<AccountEvent>,
}

/// The responder's half of the protocol: re-applies the frame deterministically,
/// checks `stateHash`, commits on success, signs and returns an ACK.
pub fn receive_account_input<S: HankoSigner>(
	state: &mut AccountState, input: &AccountInput, signer: &S, ctx: &ApplyContext,
) -> Result<ReceiveOutcome, MeshnetError> {
	if input.frame.height != state.current_height() + 1 {
		return Err(MeshnetError::frame_consensus_failed(format!(
			"expected height {}, got {}",
			state.current_height() + 1,
			input.frame.height
		)));
	}
	let expected_prev = state.current_frame.as_ref().map(frame_hash).unwrap_or(Hash32::ZERO);
	if input.frame.prev_frame_hash != expected_prev {
		return Err(MeshnetError::frame_consensus_failed("prev_frame_hash mismatch"));
	}

	let mut candidate = state.clone();
	let mut events = Vec::new();
	for tx in &input.frame.account_txs {
		let mut ev = apply_account_tx(&mut candidate, tx, ctx)
			.map_err(|e| MeshnetError::frame_consensus_failed(format!("tx {} rejected: {}", tx.kind_name(), e)))?;
		events.append(&mut ev);
	}
	let (token_ids, deltas) = snapshot_deltas(&candidate);
	let cooperative_nonce_after = state.proof_header.cooperative_nonce + 1;
	let recomputed = compute_state_hash(&token_ids, &deltas, cooperative_nonce_after);
	if recomputed != input.frame.state_hash {
		return Err(MeshnetError::frame_consensus_failed("state_hash mismatch"));
	}

	let counter_hanko = signer.sign(recomputed);
	commit_resulting(state, candidate, input.frame.clone());
	state.proof_header.cooperative_nonce = cooperative_nonce_after;
	state.counterparty_dispute_proof_hanko = Some(counter_hanko.clone());
	state.counterparty_dispute_proof_body_hash = Some(recomputed);
	state.dispute_proof_nonces_by_hash.insert(recomputed, cooperative_nonce_after);

	Ok(ReceiveOutcome {
		ack: AccountAck {
			account: state.key,
			height: input.frame.height,
			counter_hanko: counter_hanko.clone(),
			prev_hanko: counter_hanko,
			piggyback: None,
		},
		events,
	})
}

/// The proposer's reaction to the counterparty's ACK: verify it matches the
/// outstanding `pendingFrame`, commit, and store the bilateral hanko.
pub fn receive_account_ack(state: &mut AccountState, ack: &AccountAck) -> Result<Vec<AccountEvent>, MeshnetError> {
	let pending = state
		.pending_frame
		.take()
		.ok_or_else(|| MeshnetError::new(ErrorCode::InvalidRequest, "no pending frame to ACK"))?;
	if ack.height != pending.frame.height {
		state.pending_frame = Some(pending);
		return Err(MeshnetError::frame_consensus_failed("ACK height does not match pending frame"));
	}
	if ack.counter_hanko.is_empty() {
		state.pending_frame = Some(pending);
		return Err(MeshnetError::frame_consensus_failed("ACK carries an empty hanko"));
	}
	let candidate = *state
		.candidate_snapshot
		.take()
		.ok_or_else(|| MeshnetError::new(ErrorCode::InternalError, "missing candidate snapshot for pending frame"))?;
	let cooperative_nonce_after = state.proof_header.cooperative_nonce + 1;
	let frame = pending.frame;
	commit_resulting(state, candidate, frame);
	state.proof_header.cooperative_nonce = cooperative_nonce_after;
	state.counterparty_dispute_proof_hanko = Some(ack.counter_hanko.clone());
	state.counterparty_dispute_proof_body_hash = Some(state.current_frame.as_ref().unwrap().state_hash);
	state
		.dispute_proof_nonces_by_hash
		.insert(state.current_frame.as_ref().unwrap().state_hash, cooperative_nonce_after);
	Ok(Vec::new())
}

/// Resolves a same-height proposal race per spec §4.1: `byLeft == true`
/// wins, the other side rolls back its own `pendingFrame`.
pub fn resolve_simultaneous_proposal(local_is_left: bool, counterparty_height: u64, state: &mut AccountState) -> bool {
	let Some(pending) = &state.pending_frame else { return true };
	if pending.frame.height != counterparty_height {
		return true;
	}
	if local_is_left {
		true
	} else {
		state.pending_frame = None;
		state.candidate_snapshot = None;
		false
	}
}

fn commit_resulting(state: &mut AccountState, resulting: AccountState, frame: Frame) {
	state.deltas = resulting.deltas;
	state.holds = resulting.holds;
	state.locks = resulting.locks;
	state.swap_offers = resulting.swap_offers;
	state.withdrawal_requests = resulting.withdrawal_requests;
	state.settlement_workspace = resulting.settlement_workspace;
	state.active_dispute = resulting.active_dispute;
	state.on_chain_settlement_nonce = resulting.on_chain_settlement_nonce;
	state.j_observations_left = resulting.j_observations_left;
	state.j_observations_right = resulting.j_observations_right;
	state.j_event_chain = resulting.j_event_chain;
	state.last_finalized_j_height = resulting.last_finalized_j_height;
	state.global_credit_limit_left = resulting.global_credit_limit_left;
	state.global_credit_limit_right = resulting.global_credit_limit_right;
	state.current_frame = Some(frame);
	state.pending_frame = None;
	state.candidate_snapshot = None;
}

#[cfg(test)]
mod tests {
	use super::*;
	use meshnet_wire::ids::EntityId;
	use meshnet_wire::{AccountKey, Side};

	fn fresh_pair() -> (AccountState, AccountState) {
		let a = EntityId::from_bytes([1u8; 20]);
		let b = EntityId::from_bytes([2u8; 20]);
		let key = AccountKey::new(a, b);
		(AccountState::new(key), AccountState::new(key))
	}

	fn ctx() -> ApplyContext {
		ApplyContext { now_ms: 0, max_settlement_diff: i128::MAX }
	}

	#[test]
	fn left_proposes_first_height_and_right_acks() {
		let (mut left, mut right) = fresh_pair();
		left.mempool.push_back(AccountTx::AddDelta { token_id: 1 });
		left.mempool.push_back(AccountTx::SetCreditLimit { token_id: 1, side: Side::Left, amount: 500 });

		let signer = |_: Hash32| Hanko { signature_bytes: vec![1] };
		let outcome = propose_frame(&mut left, true, 0, 0, &signer, &ctx()).unwrap().unwrap();
		assert_eq!(outcome.account_input.frame.height, 1);

		let receive = receive_account_input(&mut right, &outcome.account_input, &signer, &ctx()).unwrap();
		assert_eq!(right.current_height(), 1);
		assert_eq!(right.row(1).unwrap().left_credit_limit, 500);

		receive_account_ack(&mut left, &receive.ack).unwrap();
		assert_eq!(left.current_height(), 1);
		assert_eq!(left.row(1).unwrap().left_credit_limit, 500);
	}

	#[test]
	fn right_cannot_propose_the_first_frame() {
		let (_, mut right) = fresh_pair();
		right.mempool.push_back(AccountTx::AddDelta { token_id: 1 });
		let signer = |_: Hash32| Hanko::empty();
		let outcome = propose_frame(&mut right, false, 0, 0, &signer, &ctx()).unwrap();
		assert!(outcome.is_none());
	}

	#[test]
	fn mismatched_state_hash_is_rejected() {
		let (mut left, mut right) = fresh_pair();
		left.mempool.push_back(AccountTx::AddDelta { token_id: 1 });
		let signer = |_: Hash32| Hanko::empty();
		let mut outcome = propose_frame(&mut left, true, 0, 0, &signer, &ctx()).unwrap().unwrap();
		outcome.account_input.frame.state_hash = Hash32::from_bytes([9u8; 32]);
		let result = receive_account_input(&mut right, &outcome.account_input, &signer, &ctx());
		assert!(result.is_err());
	}
}
