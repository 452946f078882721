//! HTLC lock sizing, forwarding verification and timeout sweep — spec
//! §4.2. Route state (`htlcRoutes`, fee bookkeeping across hops) is owned by
//! the entity orchestrator; this module is the pure math and validation
//! those handlers call into.

use meshnet_wire::account_tx::HtlcOutcome;
use meshnet_wire::envelope::{OnionEnvelope, OnionLayer};
use meshnet_wire::error::{HtlcErrorCode, MeshnetError};
use meshnet_wire::ids::{EntityId, LockId, TimestampMs, TokenId};

use crate::account::Lock;
use crate::onion::{decode_layer, CryptoProvider};

/// Minimum expiry a payment's overall timelock must clear — spec §4.2.
pub const DEFAULT_HTLC_EXPIRY_MS: u64 = 120_000;
/// Per-hop timelock reduction budget.
pub const MIN_TIMELOCK_DELTA_MS: u64 = 10_000;
/// Minimum timelock an intermediary reserves for its own forward.
pub const MIN_FORWARD_TIMELOCK_MS: u64 = 5_000;
/// J-height safety margin added to `revealBeforeHeight`.
pub const REVEAL_BEFORE_SAFETY_MARGIN: u64 = 6;

/// Computes the sender's overall timelock: `>= 120s` and
/// `>= hops * MIN_TIMELOCK_DELTA_MS + MIN_FORWARD_TIMELOCK_MS`.
pub fn compute_timelock(now_ms: TimestampMs, hops: usize) -> TimestampMs {
	let floor = (hops as u64) * MIN_TIMELOCK_DELTA_MS + MIN_FORWARD_TIMELOCK_MS;
	now_ms + DEFAULT_HTLC_EXPIRY_MS.max(floor)
}

pub fn compute_reveal_before_height(last_finalized_j_height: u64) -> u64 {
	last_finalized_j_height + REVEAL_BEFORE_SAFETY_MARGIN
}

pub fn forward_lock_id(inbound: &LockId) -> LockId {
	format!("{inbound}-fwd")
}

/// What an intermediary should queue on its outbound account, once an
/// inbound lock's envelope has been decoded and validated.
#[derive(Debug, Clone)]
pub struct ForwardPlan {
	pub next_hop: EntityId,
	pub forward_amount: u128,
	pub fee: u128,
	pub forward_timelock: TimestampMs,
	pub forward_height: u64,
	pub inner_envelope: OnionEnvelope,
}

/// An intermediary's configured minimum fee and safety margins.
#[derive(Debug, Clone, Copy)]
pub struct HopProfile {
	pub base_fee: u128,
	pub min_forward_timelock_margin_ms: u64,
	pub min_forward_height_margin: u64,
}

/// Decodes an inbound lock's envelope and validates it per spec §4.2 steps
/// 1-4, returning what to queue as the outbound `htlc_lock`.
pub fn plan_forward<C: CryptoProvider>(
	crypto: &C, lock: &Lock, envelope: &OnionEnvelope, profile: &HopProfile, now_ms: TimestampMs, j_height: u64,
) -> Result<ForwardPlan, MeshnetError> {
	let decoded: OnionLayer = decode_layer(crypto, envelope)?;

	if decoded.amount != lock.amount || decoded.token_id != lock.token_id || decoded.hashlock != lock.hashlock {
		return Err(MeshnetError::htlc(HtlcErrorCode::EnvelopeMismatch, "envelope_mismatch"));
	}
	let next_hop = decoded
		.next_hop
		.ok_or_else(|| MeshnetError::htlc(HtlcErrorCode::EnvelopeMismatch, "final recipient cannot forward"))?;
	let forward_amount = decoded
		.forward_amount
		.ok_or_else(|| MeshnetError::htlc(HtlcErrorCode::MissingForwardAmount, "missing_forward_amount"))?;
	if forward_amount > lock.amount {
		return Err(MeshnetError::htlc(HtlcErrorCode::InvalidForwardAmount, "invalid_forward_amount"));
	}
	let fee = lock.amount - forward_amount;
	if fee < profile.base_fee {
		return Err(MeshnetError::htlc(HtlcErrorCode::FeeBelowBase, "fee_below_base"));
	}

	let forward_timelock = lock.timelock_ms.saturating_sub(MIN_TIMELOCK_DELTA_MS);
	if forward_timelock <= now_ms + profile.min_forward_timelock_margin_ms {
		return Err(MeshnetError::htlc(HtlcErrorCode::TimelockTooTight, "timelock_too_tight"));
	}
	let forward_height = lock.reveal_before_height.saturating_sub(1);
	if forward_height <= j_height + profile.min_forward_height_margin {
		return Err(MeshnetError::htlc(HtlcErrorCode::HeightExpired, "height_expired"));
	}

	let inner_envelope = decoded
		.inner_envelope
		.map(|b| *b)
		.ok_or_else(|| MeshnetError::htlc(HtlcErrorCode::EnvelopeMismatch, "missing inner envelope for forward"))?;

	Ok(ForwardPlan { next_hop, forward_amount, fee, forward_timelock, forward_height, inner_envelope })
}

/// A resolution (secret or error) that must propagate one hop further —
/// either backward to the inbound leg on redemption/cancellation, or
/// forward on original creation. The entity layer decides direction using
/// its `htlcRoutes` table; this just names the pieces spec §4.2
/// "Resolution" describes.
#[derive(Debug, Clone)]
pub struct PropagatedResolution {
	pub lock_id: LockId,
	pub outcome: HtlcOutcome,
	pub secret: Option<meshnet_wire::ids::Secret32>,
	pub reason: Option<String>,
}

/// Locks due for a timeout sweep: `timelock < now` or
/// `revealBeforeHeight <= lastFinalizedJHeight`.
pub fn locks_due_for_timeout<'a>(
	locks: impl Iterator<Item = &'a Lock>, now_ms: TimestampMs, last_finalized_j_height: u64,
) -> Vec<LockId> {
	locks
		.filter(|lock| lock.timelock_ms < now_ms || lock.reveal_before_height <= last_finalized_j_height)
		.map(|lock| lock.lock_id.clone())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timelock_respects_both_floors() {
		assert_eq!(compute_timelock(0, 1), DEFAULT_HTLC_EXPIRY_MS);
		let many_hops = compute_timelock(0, 20);
		assert!(many_hops > DEFAULT_HTLC_EXPIRY_MS);
	}

	#[test]
	fn forward_lock_id_suffixes_inbound_id() {
		assert_eq!(forward_lock_id(&"abc".to_string()), "abc-fwd");
	}

	#[test]
	fn locks_due_for_timeout_checks_both_conditions() {
		let lock = Lock {
			lock_id: "l1".to_string(),
			hashlock: meshnet_wire::ids::Hash32::ZERO,
			timelock_ms: 100,
			reveal_before_height: 50,
			amount: 1,
			token_id: 1,
			sender_is_left: true,
			has_envelope: false,
		};
		let due = locks_due_for_timeout(std::iter::once(&lock), 200, 10);
		assert_eq!(due, vec!["l1".to_string()]);
		let not_due = locks_due_for_timeout(std::iter::once(&lock), 50, 10);
		assert!(not_due.is_empty());
	}
}
