//! Onion envelope construction and per-hop decoding — spec §4.2.
//!
//! Building an envelope walks the route back-to-front (the final hop is
//! wrapped first, then each earlier hop wraps that). Decoding at a hop only
//! ever has to peel one layer: its own.

use meshnet_wire::envelope::{OnionEnvelope, OnionLayer};
use meshnet_wire::error::{ErrorCode, HtlcErrorCode, MeshnetError};
use meshnet_wire::ids::{EntityId, Hash32, Secret32, TokenId};

/// Encrypts a layer to a hop's known key, or decrypts a payload addressed
/// to the local hop. Construction of the concrete signing/encryption
/// backend is out of scope here — see `DESIGN.md`.
pub trait CryptoProvider {
	fn encrypt_to(&self, recipient: EntityId, plaintext: &[u8]) -> Vec<u8>;
	fn decrypt_own(&self, ciphertext: &[u8]) -> Result<Vec<u8>, MeshnetError>;
}

/// One hop's input to onion construction: its amount, and (for
/// intermediaries) the fee it deducts before forwarding.
#[derive(Debug, Clone, Copy)]
pub struct HopPlan {
	pub entity: EntityId,
	pub amount: u128,
}

/// Builds the full nested envelope for `route[0]` (the sender) down to the
/// final recipient. `hashlock` and `secret` are only ever cleartext at the
/// final layer; every other layer carries just the fields a forwarding hop
/// needs.
pub fn build_onion<C: CryptoProvider>(
	crypto: &C, route: &[HopPlan], token_id: TokenId, hashlock: Hash32, secret: Secret32,
) -> Result<OnionEnvelope, MeshnetError> {
	if route.len() < 2 {
		return Err(MeshnetError::new(ErrorCode::InvalidRequest, "onion route needs at least sender and recipient"));
	}
	let final_hop = route.last().unwrap();
	let mut layer = OnionLayer {
		hashlock,
		amount: final_hop.amount,
		token_id,
		next_hop: None,
		forward_amount: None,
		inner_envelope: None,
		final_recipient: true,
		secret: Some(secret),
	};
	let mut envelope = OnionEnvelope::cleartext(layer.clone());

	// Walk backward from the hop before the final recipient to the sender's
	// first hop, each time wrapping the previous envelope and encrypting it
	// to the hop that will receive it.
	for window in route.windows(2).rev() {
		let (this_hop, next_hop) = (window[0], window[1]);
		let encrypted_inner = encrypt_envelope(crypto, next_hop.entity, &envelope)?;
		layer = OnionLayer {
			hashlock,
			amount: this_hop.amount,
			token_id,
			next_hop: Some(next_hop.entity),
			forward_amount: Some(next_hop.amount),
			inner_envelope: Some(Box::new(encrypted_inner)),
			final_recipient: false,
			secret: None,
		};
		envelope = OnionEnvelope::cleartext(layer.clone());
	}
	Ok(envelope)
}

fn encrypt_envelope<C: CryptoProvider>(
	crypto: &C, recipient: EntityId, envelope: &OnionEnvelope,
) -> Result<OnionEnvelope, MeshnetError> {
	let plaintext = serde_json::to_vec(envelope)
		.map_err(|e| MeshnetError::new(ErrorCode::InternalError, format!("onion layer encode failed: {e}")))?;
	Ok(OnionEnvelope::encrypted(&crypto.encrypt_to(recipient, &plaintext)))
}

/// Peels exactly one layer — the hop's own — returning the decoded
/// [`OnionLayer`]. A [`OnionEnvelope::Cleartext`] layer is already peeled
/// (used for the sender's own first hop, or test fixtures).
pub fn decode_layer<C: CryptoProvider>(crypto: &C, envelope: &OnionEnvelope) -> Result<OnionLayer, MeshnetError> {
	match envelope {
		OnionEnvelope::Cleartext { layer } => Ok(layer.clone()),
		OnionEnvelope::Encrypted { .. } => {
			let ciphertext = envelope
				.encrypted_bytes()
				.ok_or_else(|| MeshnetError::htlc(HtlcErrorCode::EnvelopeDecryptFail, "malformed base64 payload"))?;
			let plaintext = crypto
				.decrypt_own(&ciphertext)
				.map_err(|_| MeshnetError::htlc(HtlcErrorCode::EnvelopeDecryptFail, "decrypt failed"))?;
			let inner: OnionEnvelope = serde_json::from_slice(&plaintext)
				.map_err(|_| MeshnetError::htlc(HtlcErrorCode::EnvelopeDecryptFail, "malformed layer json"))?;
			match inner {
				OnionEnvelope::Cleartext { layer } => Ok(layer),
				OnionEnvelope::Encrypted { .. } => {
					Err(MeshnetError::htlc(HtlcErrorCode::EnvelopeDecryptFail, "decrypted payload was still encrypted"))
				},
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// XOR "encryption" keyed by the recipient id — deterministic and
	/// reversible, enough to exercise the onion peeling logic without a real
	/// scheme.
	struct XorCrypto {
		own: EntityId,
	}

	impl CryptoProvider for XorCrypto {
		fn encrypt_to(&self, recipient: EntityId, plaintext: &[u8]) -> Vec<u8> {
			xor_with_key(plaintext, recipient.as_bytes())
		}

		fn decrypt_own(&self, ciphertext: &[u8]) -> Result<Vec<u8>, MeshnetError> {
			Ok(xor_with_key(ciphertext, self.own.as_bytes()))
		}
	}

	fn xor_with_key(data: &[u8], key: &[u8]) -> Vec<u8> {
		data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
	}

	#[test]
	fn three_hop_onion_peels_one_layer_per_hop() {
		let sender = EntityId::from_bytes([1u8; 20]);
		let mid = EntityId::from_bytes([2u8; 20]);
		let recipient = EntityId::from_bytes([3u8; 20]);
		let route = vec![
			HopPlan { entity: sender, amount: 1_000 },
			HopPlan { entity: mid, amount: 990 },
			HopPlan { entity: recipient, amount: 980 },
		];
		let secret = Secret32::from_bytes([7u8; 32]);
		let hashlock = crate::hashing::sha256_bytes(&secret.0);

		let sender_crypto = XorCrypto { own: sender };
		let envelope = build_onion(&sender_crypto, &route, 1, hashlock, secret).unwrap();
		let sender_layer = decode_layer(&sender_crypto, &envelope).unwrap();
		assert_eq!(sender_layer.next_hop, Some(mid));
		assert_eq!(sender_layer.forward_amount, Some(990));

		let mid_crypto = XorCrypto { own: mid };
		let mid_envelope = sender_layer.inner_envelope.unwrap();
		let mid_layer = decode_layer(&mid_crypto, &mid_envelope).unwrap();
		assert_eq!(mid_layer.next_hop, Some(recipient));
		assert_eq!(mid_layer.forward_amount, Some(980));

		let recipient_crypto = XorCrypto { own: recipient };
		let recipient_envelope = mid_layer.inner_envelope.unwrap();
		let recipient_layer = decode_layer(&recipient_crypto, &recipient_envelope).unwrap();
		assert!(recipient_layer.final_recipient);
		assert_eq!(recipient_layer.secret, Some(secret));
	}
}
