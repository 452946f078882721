//! A local [`HankoSigner`] stand-in. Spec SPEC_FULL.md §8 names hanko
//! construction as out of scope beyond "a signing trait seam" — real
//! quorum-validator signing lives above this crate's boundary. This
//! produces a deterministic, process-local signature so committed frames
//! still carry a distinguishable, non-empty hanko per entity.

use meshnet_core::frame_consensus::HankoSigner;
use meshnet_core::hashing::sha256_bytes;
use meshnet_wire::frame::Hanko;
use meshnet_wire::ids::{EntityId, Hash32};

pub struct LocalSigner {
	entity_id: EntityId,
	local_secret: [u8; 32],
}

impl LocalSigner {
	pub fn new(entity_id: EntityId, local_secret: [u8; 32]) -> Self {
		Self { entity_id, local_secret }
	}
}

impl HankoSigner for LocalSigner {
	fn sign(&self, hash: Hash32) -> Hanko {
		let mut preimage = Vec::with_capacity(20 + 32 + 32);
		preimage.extend_from_slice(self.entity_id.as_bytes());
		preimage.extend_from_slice(&hash.0);
		preimage.extend_from_slice(&self.local_secret);
		Hanko { signature_bytes: sha256_bytes(&preimage).0.to_vec() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signing_is_deterministic_for_the_same_hash() {
		let signer = LocalSigner::new(EntityId::from_bytes([1; 20]), [2; 32]);
		let a = signer.sign(Hash32::from_bytes([3; 32]));
		let b = signer.sign(Hash32::from_bytes([3; 32]));
		assert_eq!(a.signature_bytes, b.signature_bytes);
	}

	#[test]
	fn different_hashes_sign_differently() {
		let signer = LocalSigner::new(EntityId::from_bytes([1; 20]), [2; 32]);
		let a = signer.sign(Hash32::from_bytes([3; 32]));
		let b = signer.sign(Hash32::from_bytes([4; 32]));
		assert_ne!(a.signature_bytes, b.signature_bytes);
	}
}
