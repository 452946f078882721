//! Onion envelope format — spec §6 "Onion envelope format" / §4.2.
//!
//! Each hop's layer carries just enough to forward or terminate a payment:
//! the next hop (absent at the final hop), the exact amount the next hop
//! must forward, and a further-nested envelope for that hop. The final
//! hop's layer carries the cleartext secret instead of a next hop.
//!
//! On the wire a layer is JSON; encrypted layers are base64 of the
//! encrypted JSON bytes (spec: "When encrypted, the payload is base64;
//! cleartext is JSON beginning with `{`").

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, Hash32, Secret32, TokenId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnionLayer {
	pub hashlock: Hash32,
	pub amount: u128,
	pub token_id: TokenId,
	pub next_hop: Option<EntityId>,
	pub forward_amount: Option<u128>,
	/// The next hop's layer, still possibly encrypted to it. `None` at the
	/// final hop.
	pub inner_envelope: Option<Box<OnionEnvelope>>,
	pub final_recipient: bool,
	pub secret: Option<Secret32>,
}

/// A layer plus its wire encoding state. Intermediaries receive
/// [`OnionEnvelope::Encrypted`] and must decrypt it with their own key
/// before reading [`OnionLayer`] fields; the sender may also hand an
/// already-decrypted layer to itself for the first hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "form")]
pub enum OnionEnvelope {
	Cleartext { layer: OnionLayer },
	Encrypted { payload_b64: String },
}

impl OnionEnvelope {
	pub fn cleartext(layer: OnionLayer) -> Self {
		OnionEnvelope::Cleartext { layer }
	}

	pub fn encrypted(payload: &[u8]) -> Self {
		use base64::Engine;
		OnionEnvelope::Encrypted {
			payload_b64: base64::engine::general_purpose::STANDARD.encode(payload),
		}
	}

	pub fn encrypted_bytes(&self) -> Option<Vec<u8>> {
		use base64::Engine;
		match self {
			OnionEnvelope::Encrypted { payload_b64 } => {
				base64::engine::general_purpose::STANDARD.decode(payload_b64).ok()
			},
			OnionEnvelope::Cleartext { .. } => None,
		}
	}
}
