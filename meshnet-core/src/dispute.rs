//! Dispute construction and finalization — spec §4.4. Builds the
//! `DisputeStart`/`DisputeFinalization` artifacts; appending them to a
//! jBatch and watching for the contract's `DisputeStarted`/`DisputeFinalized`
//! events is the entity orchestrator's job.

use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::events::{DisputeFinalization, DisputeStart};
use meshnet_wire::hashes::delta_transformer_args;
use meshnet_wire::ids::Secret32;
use meshnet_wire::Hanko;

use crate::account::{ActiveDisputeState, AccountState};

/// Per-offer fill ratios and HTLC secrets the caller owns, folded into
/// `DeltaTransformer` calldata — spec §4.4 "the caller provides HTLC
/// secrets on its own side and... a fillRatio map".
#[derive(Debug, Clone, Default)]
pub struct CallerRevealSet {
	pub fill_ratios: Vec<u32>,
	pub secrets: Vec<Secret32>,
}

/// Builds a `DisputeStart` record from the currently-held bilateral hanko,
/// recovered by the `proofBodyHash` it was signed over so the cooperative
/// nonce matches exactly.
pub fn build_dispute_start(
	account: &AccountState, local_is_left: bool, reveal: &CallerRevealSet,
) -> Result<DisputeStart, MeshnetError> {
	let hanko = account
		.counterparty_dispute_proof_hanko
		.clone()
		.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no bilateral hanko to dispute with"))?;
	let proofbody_hash = account
		.counterparty_dispute_proof_body_hash
		.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no proofBodyHash recorded for the held hanko"))?;
	let cooperative_nonce = *account
		.dispute_proof_nonces_by_hash
		.get(&proofbody_hash)
		.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "proofBodyHash has no recorded cooperativeNonce"))?;

	let initial_arguments = delta_transformer_args(&reveal.fill_ratios, &reveal.secrets);

	let local_entity = if local_is_left { account.key.left } else { account.key.right };
	Ok(DisputeStart {
		counterparty: account.key.counterparty(local_entity),
		cooperative_nonce,
		dispute_nonce: account.proof_header.dispute_nonce,
		proofbody_hash,
		sig: hanko,
		initial_arguments,
	})
}

/// Marks an account's dispute as started, called when the local entity's own
/// `disputeStart` is accepted into a jBatch (the authoritative trigger is
/// the contract's `DisputeStarted` event, which carries `disputeUntilBlock`).
pub fn record_dispute_started(
	account: &mut AccountState, started_by_left: bool, proofbody_hash: meshnet_wire::ids::Hash32,
	initial_arguments: Vec<u8>,
) -> Result<(), MeshnetError> {
	if account.active_dispute.is_some() {
		return Err(MeshnetError::new(ErrorCode::DisputeError, "dispute already active for this account"));
	}
	account.active_dispute = Some(ActiveDisputeState {
		started_by_left,
		initial_cooperative_nonce: account.proof_header.cooperative_nonce,
		initial_dispute_nonce: account.proof_header.dispute_nonce,
		dispute_timeout: None,
		initial_proofbody_hash: proofbody_hash,
		initial_arguments,
		finalize_queued: false,
	});
	Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
	Unilateral,
	CounterDispute,
	Cooperative,
}

/// Builds a `DisputeFinalize` record per spec §4.4's three modes.
pub fn build_dispute_finalize(
	account: &AccountState, local_is_left: bool, mode: FinalizeMode, final_proof_body: Vec<u8>,
	reveal: &CallerRevealSet,
) -> Result<DisputeFinalization, MeshnetError> {
	let dispute =
		account.active_dispute.as_ref().ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no active dispute"))?;
	let dispute_until_block = dispute
		.dispute_timeout
		.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "disputeTimeout not yet known"))?;

	let final_arguments = delta_transformer_args(&reveal.fill_ratios, &reveal.secrets);

	let (final_cooperative_nonce, sig) = match mode {
		FinalizeMode::Unilateral => (dispute.initial_cooperative_nonce, Hanko::empty()),
		FinalizeMode::CounterDispute => {
			let (nonce, hanko) = highest_stored_counterparty_proof(account, dispute.initial_cooperative_nonce)?;
			(nonce, hanko)
		},
		FinalizeMode::Cooperative => {
			let hanko = account
				.counterparty_dispute_proof_hanko
				.clone()
				.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "cooperative finalize needs a fresh mutual hanko"))?;
			(account.proof_header.cooperative_nonce, hanko)
		},
	};

	let local_entity = if local_is_left { account.key.left } else { account.key.right };
	Ok(DisputeFinalization {
		counterparty: account.key.counterparty(local_entity),
		initial_cooperative_nonce: dispute.initial_cooperative_nonce,
		final_cooperative_nonce,
		initial_dispute_nonce: dispute.initial_dispute_nonce,
		final_dispute_nonce: account.proof_header.dispute_nonce,
		initial_proofbody_hash: dispute.initial_proofbody_hash,
		final_proof_body,
		final_arguments,
		initial_arguments: dispute.initial_arguments.clone(),
		sig,
		started_by_left: dispute.started_by_left,
		dispute_until_block,
		cooperative: matches!(mode, FinalizeMode::Cooperative),
	})
}

/// Finds the highest-nonce counterparty proof recorded since the dispute
/// started — a counter-dispute supersedes the original with whichever later
/// cooperative state the counterparty itself had signed.
fn highest_stored_counterparty_proof(
	account: &AccountState, initial_nonce: u64,
) -> Result<(u64, Hanko), MeshnetError> {
	let highest = account
		.dispute_proof_nonces_by_hash
		.values()
		.copied()
		.filter(|n| *n > initial_nonce)
		.max()
		.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no later counterparty proof to counter-dispute with"))?;
	let hanko = account
		.counterparty_dispute_proof_hanko
		.clone()
		.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no counterparty hanko stored"))?;
	Ok((highest, hanko))
}

#[cfg(test)]
mod tests {
	use super::*;
	use meshnet_wire::ids::{EntityId, Hash32};
	use meshnet_wire::AccountKey;

	fn account_with_hanko() -> AccountState {
		let a = EntityId::from_bytes([1u8; 20]);
		let b = EntityId::from_bytes([2u8; 20]);
		let mut account = AccountState::new(AccountKey::new(a, b));
		let hash = Hash32::from_bytes([5u8; 32]);
		account.counterparty_dispute_proof_hanko = Some(Hanko { signature_bytes: vec![9] });
		account.counterparty_dispute_proof_body_hash = Some(hash);
		account.dispute_proof_nonces_by_hash.insert(hash, 3);
		account.proof_header.cooperative_nonce = 3;
		account
	}

	#[test]
	fn dispute_start_recovers_matching_nonce() {
		let account = account_with_hanko();
		let reveal = CallerRevealSet::default();
		let start = build_dispute_start(&account, true, &reveal).unwrap();
		assert_eq!(start.cooperative_nonce, 3);
		assert!(!start.sig.is_empty());
	}

	#[test]
	fn dispute_start_without_hanko_fails() {
		let a = EntityId::from_bytes([1u8; 20]);
		let b = EntityId::from_bytes([2u8; 20]);
		let account = AccountState::new(AccountKey::new(a, b));
		assert!(build_dispute_start(&account, true, &CallerRevealSet::default()).is_err());
	}

	#[test]
	fn unilateral_finalize_reuses_initial_nonce_and_empty_sig() {
		let mut account = account_with_hanko();
		record_dispute_started(&mut account, true, Hash32::ZERO, vec![]).unwrap();
		account.active_dispute.as_mut().unwrap().dispute_timeout = Some(1_000);
		let finalize =
			build_dispute_finalize(&account, true, FinalizeMode::Unilateral, vec![], &CallerRevealSet::default())
				.unwrap();
		assert_eq!(finalize.final_cooperative_nonce, finalize.initial_cooperative_nonce);
		assert!(finalize.sig.is_empty());
	}
}
