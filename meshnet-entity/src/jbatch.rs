//! jBatch lifecycle — spec §4.6. Accumulates on-chain operations, hashes
//! them with a monotonic entity nonce, submits via the jurisdiction
//! adapter, and reconciles confirmation events. `entityNonce` only ever
//! advances on a confirmed `HankoBatchProcessed`, never optimistically.

use serde::{Deserialize, Serialize};

use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::events::{DisputeFinalization, DisputeStart, SettlementRecord};
use meshnet_wire::hashes::{j_batch_hash, Encoder};
use meshnet_wire::ids::{EntityId, Hash32, TokenId, TimestampMs};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveTransfer {
	pub to: EntityId,
	pub token_id: TokenId,
	pub amount: u128,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CollateralMoveDirection {
	ReserveToCollateral,
	CollateralToReserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralMove {
	pub counterparty: EntityId,
	pub token_id: TokenId,
	pub amount: u128,
	pub direction: CollateralMoveDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintOp {
	pub token_id: TokenId,
	pub amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealSecret {
	pub hashlock: Hash32,
	pub secret: Hash32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchContents {
	pub reserve_transfers: Vec<ReserveTransfer>,
	pub collateral_moves: Vec<CollateralMove>,
	pub settlements: Vec<SettlementRecord>,
	pub dispute_starts: Vec<DisputeStart>,
	pub dispute_finalizations: Vec<DisputeFinalization>,
	pub reveal_secrets: Vec<RevealSecret>,
	pub mints: Vec<MintOp>,
}

impl BatchContents {
	pub fn is_empty(&self) -> bool {
		self.reserve_transfers.is_empty()
			&& self.collateral_moves.is_empty()
			&& self.settlements.is_empty()
			&& self.dispute_starts.is_empty()
			&& self.dispute_finalizations.is_empty()
			&& self.reveal_secrets.is_empty()
			&& self.mints.is_empty()
	}
}

fn encode_batch(contents: &BatchContents) -> Vec<u8> {
	let mut enc = Encoder::new();
	enc.put_u64(contents.reserve_transfers.len() as u64);
	for t in &contents.reserve_transfers {
		enc.put_entity(t.to);
		enc.put_u32(t.token_id);
		enc.put_u128(t.amount);
	}
	enc.put_u64(contents.collateral_moves.len() as u64);
	for m in &contents.collateral_moves {
		enc.put_entity(m.counterparty);
		enc.put_u32(m.token_id);
		enc.put_u128(m.amount);
		enc.put_u64(match m.direction {
			CollateralMoveDirection::ReserveToCollateral => 0,
			CollateralMoveDirection::CollateralToReserve => 1,
		});
	}
	enc.put_u64(contents.settlements.len() as u64);
	for s in &contents.settlements {
		enc.put_entity(s.left_entity);
		enc.put_entity(s.right_entity);
		enc.put_u64(s.nonce);
	}
	enc.put_u64(contents.dispute_starts.len() as u64);
	for d in &contents.dispute_starts {
		enc.put_entity(d.counterparty);
		enc.put_hash(d.proofbody_hash);
	}
	enc.put_u64(contents.dispute_finalizations.len() as u64);
	for d in &contents.dispute_finalizations {
		enc.put_entity(d.counterparty);
		enc.put_hash(d.initial_proofbody_hash);
	}
	enc.put_u64(contents.reveal_secrets.len() as u64);
	for r in &contents.reveal_secrets {
		enc.put_hash(r.hashlock);
		enc.put_hash(r.secret);
	}
	enc.put_u64(contents.mints.len() as u64);
	for m in &contents.mints {
		enc.put_u32(m.token_id);
		enc.put_u128(m.amount);
	}
	enc.into_bytes()
}

#[derive(Debug, Clone)]
pub struct SentBatch {
	pub contents: BatchContents,
	pub nonce: u64,
	pub batch_hash: Hash32,
	pub submit_attempts: u32,
	pub first_submitted_at: TimestampMs,
}

/// What a caller must arrange a quorum signature over before the batch can
/// actually reach the chain — spec §4.5 "hashesToSign".
#[derive(Debug, Clone, Copy)]
pub struct HashToSign {
	pub hash: Hash32,
	pub nonce: u64,
}

#[derive(Debug, Clone, Default)]
pub struct JBatchState {
	pub current: BatchContents,
	pub sent: Option<SentBatch>,
	pub entity_nonce: u64,
}

impl JBatchState {
	pub fn new() -> Self {
		Self::default()
	}

	/// spec §4.6 step 3: `batchHash = H(chainId, depositoryAddress,
	/// encodedBatch, nextNonce)`.
	pub fn broadcast(
		&mut self, chain_id: u64, depository_address: &[u8], now_ms: TimestampMs,
	) -> Result<HashToSign, MeshnetError> {
		if self.sent.is_some() {
			return Err(MeshnetError::new(ErrorCode::JBatchError, "a batch is already in flight"));
		}
		if self.current.is_empty() {
			return Err(MeshnetError::new(ErrorCode::JBatchError, "nothing queued to broadcast"));
		}
		let next_nonce = self.entity_nonce + 1;
		let encoded = encode_batch(&self.current);
		let batch_hash = j_batch_hash(chain_id, depository_address, &encoded, next_nonce);

		let contents = std::mem::take(&mut self.current);
		self.sent =
			Some(SentBatch { contents, nonce: next_nonce, batch_hash, submit_attempts: 1, first_submitted_at: now_ms });
		Ok(HashToSign { hash: batch_hash, nonce: next_nonce })
	}

	pub fn rebroadcast(&mut self) -> Result<HashToSign, MeshnetError> {
		let sent = self.sent.as_mut().ok_or_else(|| MeshnetError::new(ErrorCode::JBatchError, "no batch in flight"))?;
		sent.submit_attempts += 1;
		Ok(HashToSign { hash: sent.batch_hash, nonce: sent.nonce })
	}

	pub fn clear_current(&mut self) {
		self.current = BatchContents::default();
	}

	/// If `requeue`, the aborted batch's contents are folded back in front
	/// of whatever has accumulated in `current` since.
	pub fn abort_sent(&mut self, requeue: bool) -> Result<(), MeshnetError> {
		let sent = self.sent.take().ok_or_else(|| MeshnetError::new(ErrorCode::JBatchError, "no batch in flight"))?;
		if requeue {
			let mut merged = sent.contents;
			merged.reserve_transfers.extend(self.current.reserve_transfers.drain(..));
			merged.collateral_moves.extend(self.current.collateral_moves.drain(..));
			merged.settlements.extend(self.current.settlements.drain(..));
			merged.dispute_starts.extend(self.current.dispute_starts.drain(..));
			merged.dispute_finalizations.extend(self.current.dispute_finalizations.drain(..));
			merged.reveal_secrets.extend(self.current.reveal_secrets.drain(..));
			merged.mints.extend(self.current.mints.drain(..));
			self.current = merged;
		}
		Ok(())
	}

	/// The only path that ever advances `entityNonce` — spec §4.6 step 6 /
	/// §4.6 "On-chain event reconciliation".
	pub fn record_hanko_batch_processed(&mut self, confirmed_nonce: u64) {
		if let Some(sent) = &self.sent {
			if sent.nonce == confirmed_nonce {
				self.entity_nonce = confirmed_nonce;
				self.sent = None;
			}
		}
	}

	/// Drops already-finalized dispute entries from the queued batch before
	/// broadcasting — spec §4.6 step 2. Entries the jurisdiction query
	/// couldn't read are kept (fail-closed).
	pub fn preflight_dispute_finalizations(&mut self, is_finalized: impl Fn(Hash32) -> Option<bool>) {
		self.current.dispute_starts.retain(|d| is_finalized(d.proofbody_hash) != Some(true));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use meshnet_wire::ids::EntityId;

	#[test]
	fn broadcast_moves_current_into_sent_without_advancing_nonce() {
		let mut batch = JBatchState::new();
		batch.current.mints.push(MintOp { token_id: 1, amount: 1000 });
		let to_sign = batch.broadcast(1, b"depo", 0).unwrap();
		assert_eq!(to_sign.nonce, 1);
		assert!(batch.current.is_empty());
		assert!(batch.sent.is_some());
		assert_eq!(batch.entity_nonce, 0);
	}

	#[test]
	fn cannot_broadcast_while_one_is_in_flight() {
		let mut batch = JBatchState::new();
		batch.current.mints.push(MintOp { token_id: 1, amount: 1 });
		batch.broadcast(1, b"depo", 0).unwrap();
		batch.current.mints.push(MintOp { token_id: 1, amount: 1 });
		assert!(batch.broadcast(1, b"depo", 0).is_err());
	}

	#[test]
	fn hanko_batch_processed_advances_nonce_and_clears_sent() {
		let mut batch = JBatchState::new();
		batch.current.mints.push(MintOp { token_id: 1, amount: 1 });
		batch.broadcast(1, b"depo", 0).unwrap();
		batch.record_hanko_batch_processed(1);
		assert_eq!(batch.entity_nonce, 1);
		assert!(batch.sent.is_none());
	}

	#[test]
	fn abort_with_requeue_restores_contents_to_current() {
		let mut batch = JBatchState::new();
		batch.current.mints.push(MintOp { token_id: 7, amount: 1 });
		batch.broadcast(1, b"depo", 0).unwrap();
		batch.abort_sent(true).unwrap();
		assert_eq!(batch.current.mints.len(), 1);
		assert_eq!(batch.current.mints[0].token_id, 7);
	}

	#[test]
	fn preflight_drops_already_finalized_and_keeps_unreadable() {
		let mut batch = JBatchState::new();
		let a = Hash32::from_bytes([1u8; 32]);
		let b = Hash32::from_bytes([2u8; 32]);
		batch.current.dispute_starts.push(DisputeStart {
			counterparty: EntityId::from_bytes([9u8; 20]),
			cooperative_nonce: 0,
			dispute_nonce: 0,
			proofbody_hash: a,
			sig: meshnet_wire::Hanko::empty(),
			initial_arguments: vec![],
		});
		batch.current.dispute_starts.push(DisputeStart {
			counterparty: EntityId::from_bytes([9u8; 20]),
			cooperative_nonce: 0,
			dispute_nonce: 0,
			proofbody_hash: b,
			sig: meshnet_wire::Hanko::empty(),
			initial_arguments: vec![],
		});
		batch.preflight_dispute_finalizations(|h| if h == a { Some(true) } else { None });
		assert_eq!(batch.current.dispute_starts.len(), 1);
		assert_eq!(batch.current.dispute_starts[0].proofbody_hash, b);
	}
}
