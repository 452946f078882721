//! Bit-exact hash/calldata construction — spec §6 "Hashes and calldata".
//!
//! The real Depository/EntityProvider/DeltaTransformer contracts are out of
//! scope (spec §1): only the hashes signed and the calldata shape are
//! specified here. Full Solidity ABI encoding needs the actual contract
//! interfaces to get right; absent those, this module uses a canonical,
//! deterministic length-prefixed binary encoding of the same tuples the
//! spec names, hashed with SHA-256. Every function name and argument order
//! matches spec §6 exactly so a real ABI encoder can be substituted later
//! without touching a call site.

use bitcoin_hashes::{sha256, Hash as _};

use crate::account_tx::SettlementDiff;
use crate::ids::{AccountKey, EntityId, Hash32, TokenId};

/// Accumulates a canonical byte encoding of a signed tuple. Every `put_*`
/// method is length-prefixed so no two distinct tuples can collide by
/// concatenation alone.
#[derive(Default)]
pub struct Encoder(Vec<u8>);

impl Encoder {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
		self.0.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
		self.0.extend_from_slice(bytes);
		self
	}

	pub fn put_u64(&mut self, v: u64) -> &mut Self {
		self.0.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_u32(&mut self, v: u32) -> &mut Self {
		self.0.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_u128(&mut self, v: u128) -> &mut Self {
		self.0.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_i128(&mut self, v: i128) -> &mut Self {
		self.0.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_entity(&mut self, e: EntityId) -> &mut Self {
		self.put_bytes(e.as_bytes())
	}

	pub fn put_hash(&mut self, h: Hash32) -> &mut Self {
		self.put_bytes(&h.0)
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}
}

pub fn sha256_hash(bytes: &[u8]) -> Hash32 {
	Hash32::from_bytes(sha256::Hash::hash(bytes).to_byte_array())
}

fn encode_settlement_diffs(enc: &mut Encoder, diffs: &[SettlementDiff]) {
	enc.put_u64(diffs.len() as u64);
	for d in diffs {
		enc.put_u32(d.token_id);
		enc.put_i128(d.left_diff);
		enc.put_i128(d.right_diff);
		enc.put_i128(d.collateral_diff);
	}
}

/// `H(chainId, depositoryAddress, encode(leftEntity, rightEntity, diffs,
/// forgiveTokenIds, entityProvider, hankoData, nonce))`.
pub fn settlement_hash(
	chain_id: u64, depository_address: &[u8], left_entity: EntityId, right_entity: EntityId,
	diffs: &[SettlementDiff], forgive_token_ids: &[TokenId], entity_provider: EntityId,
	hanko_data: &[u8], nonce: u64,
) -> Hash32 {
	let mut enc = Encoder::new();
	enc.put_u64(chain_id);
	enc.put_bytes(depository_address);
	enc.put_entity(left_entity);
	enc.put_entity(right_entity);
	encode_settlement_diffs(&mut enc, diffs);
	enc.put_u64(forgive_token_ids.len() as u64);
	for t in forgive_token_ids {
		enc.put_u32(*t);
	}
	enc.put_entity(entity_provider);
	enc.put_bytes(hanko_data);
	enc.put_u64(nonce);
	sha256_hash(&enc.into_bytes())
}

/// `H(depositoryAddress, encode(accountKey, proofBodyHash, cooperativeNonce,
/// disputeNonce))`.
pub fn dispute_proof_hash(
	depository_address: &[u8], account: AccountKey, proof_body_hash: Hash32,
	cooperative_nonce: u64, dispute_nonce: u64,
) -> Hash32 {
	let mut enc = Encoder::new();
	enc.put_bytes(depository_address);
	enc.put_entity(account.left);
	enc.put_entity(account.right);
	enc.put_hash(proof_body_hash);
	enc.put_u64(cooperative_nonce);
	enc.put_u64(dispute_nonce);
	sha256_hash(&enc.into_bytes())
}

/// `H(chainId, depositoryAddress, encodedBatch, nonce)`.
pub fn j_batch_hash(
	chain_id: u64, depository_address: &[u8], encoded_batch: &[u8], nonce: u64,
) -> Hash32 {
	let mut enc = Encoder::new();
	enc.put_u64(chain_id);
	enc.put_bytes(depository_address);
	enc.put_bytes(encoded_batch);
	enc.put_u64(nonce);
	sha256_hash(&enc.into_bytes())
}

/// DeltaTransformer args: `(uint32[] fillRatios, bytes32[] secrets)` wrapped
/// in `bytes[]`. One side's args are empty when it has nothing to reveal.
pub fn delta_transformer_args(fill_ratios: &[u32], secrets: &[Hash32]) -> Vec<u8> {
	let mut enc = Encoder::new();
	enc.put_u64(fill_ratios.len() as u64);
	for r in fill_ratios {
		enc.put_u32(*r);
	}
	enc.put_u64(secrets.len() as u64);
	for s in secrets {
		enc.put_hash(*s);
	}
	enc.into_bytes()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn settlement_hash_is_order_sensitive() {
		let left = EntityId::from_bytes([1u8; 20]);
		let right = EntityId::from_bytes([2u8; 20]);
		let diffs =
			[SettlementDiff { token_id: 1, left_diff: 100, right_diff: -100, collateral_diff: 0 }];
		let a = settlement_hash(1, b"depo", left, right, &diffs, &[], left, b"hanko", 1);
		let b = settlement_hash(1, b"depo", right, left, &diffs, &[], left, b"hanko", 1);
		assert_ne!(a, b);
	}

	#[test]
	fn dispute_proof_hash_is_deterministic() {
		let account = AccountKey::new(EntityId::from_bytes([3u8; 20]), EntityId::from_bytes([4u8; 20]));
		let h1 = dispute_proof_hash(b"depo", account, Hash32::ZERO, 5, 1);
		let h2 = dispute_proof_hash(b"depo", account, Hash32::ZERO, 5, 1);
		assert_eq!(h1, h2);
	}
}
