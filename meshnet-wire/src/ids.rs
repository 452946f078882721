//! Identifiers shared by every wire-level type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An on-chain entity identifier (the address the J-machine knows it by).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(#[serde(with = "hex_bytes_20")] pub [u8; 20]);

impl EntityId {
	pub fn from_bytes(bytes: [u8; 20]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 20] {
		&self.0
	}

	/// Short id used in human-facing log/chat messages.
	pub fn short(&self) -> String {
		hex::encode(&self.0[..4])
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

/// Parses a `0x`-prefixed (or bare) hex string back into an `EntityId`, so
/// CLI args and query-string path segments can name an entity directly.
impl FromStr for EntityId {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.strip_prefix("0x").unwrap_or(s);
		let bytes = hex::decode(s).map_err(|e| format!("invalid entity id hex: {e}"))?;
		let arr: [u8; 20] =
			bytes.try_into().map_err(|_| "entity id must be 20 bytes".to_string())?;
		Ok(EntityId(arr))
	}
}

/// Canonical (left, right) ordering of two entities: `left < right`.
///
/// Every signed artifact (frame, dispute proof, settlement) is constructed
/// against this canonical pair regardless of which side is the local entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
	pub left: EntityId,
	pub right: EntityId,
}

impl AccountKey {
	pub fn new(a: EntityId, b: EntityId) -> Self {
		if a < b {
			AccountKey { left: a, right: b }
		} else {
			AccountKey { left: b, right: a }
		}
	}

	pub fn is_left(&self, who: EntityId) -> bool {
		who == self.left
	}

	pub fn counterparty(&self, who: EntityId) -> EntityId {
		if who == self.left {
			self.right
		} else {
			self.left
		}
	}
}

/// A fungible token as tracked by the Depository contract.
pub type TokenId = u32;

/// An HTLC lock identifier, unique within an account.
pub type LockId = String;

/// A swap offer identifier, unique within an account.
pub type OfferId = String;

/// A withdrawal request identifier.
pub type RequestId = String;

/// Milliseconds since the Unix epoch, as carried on a frame.
pub type TimestampMs = u64;

/// A 32-byte hash (hashlock, secret, block hash, proof hash, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash32(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

impl Hash32 {
	pub const ZERO: Hash32 = Hash32([0u8; 32]);

	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}
}

impl fmt::Debug for Hash32 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Hash32(0x{})", hex::encode(self.0))
	}
}

impl fmt::Display for Hash32 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl FromStr for Hash32 {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.strip_prefix("0x").unwrap_or(s);
		let bytes = hex::decode(s).map_err(|e| format!("invalid hash hex: {e}"))?;
		let arr: [u8; 32] = bytes.try_into().map_err(|_| "hash must be 32 bytes".to_string())?;
		Ok(Hash32(arr))
	}
}

/// A 32-byte HTLC secret (preimage).
pub type Secret32 = Hash32;

mod hex_bytes_20 {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
		let s = String::deserialize(d)?;
		let s = s.strip_prefix("0x").unwrap_or(&s);
		let v = hex::decode(s).map_err(serde::de::Error::custom)?;
		v.try_into().map_err(|_| serde::de::Error::custom("expected 20 bytes"))
	}
}

mod hex_bytes_32 {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
		let s = String::deserialize(d)?;
		let s = s.strip_prefix("0x").unwrap_or(&s);
		let v = hex::decode(s).map_err(serde::de::Error::custom)?;
		v.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn account_key_is_canonical_regardless_of_input_order() {
		let a = EntityId::from_bytes([1u8; 20]);
		let b = EntityId::from_bytes([2u8; 20]);
		assert_eq!(AccountKey::new(a, b), AccountKey::new(b, a));
		assert_eq!(AccountKey::new(a, b).left, a);
	}

	#[test]
	fn hash32_round_trips_through_json() {
		let h = Hash32::from_bytes([7u8; 32]);
		let json = serde_json::to_string(&h).unwrap();
		let back: Hash32 = serde_json::from_str(&json).unwrap();
		assert_eq!(h, back);
	}

	#[test]
	fn entity_id_parses_from_hex_str_with_or_without_prefix() {
		let id = EntityId::from_bytes([9u8; 20]);
		let parsed: EntityId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
		let bare: EntityId = hex::encode([9u8; 20]).parse().unwrap();
		assert_eq!(id, bare);
	}

	#[test]
	fn entity_id_rejects_wrong_length() {
		let err: Result<EntityId, _> = "0xabcd".parse();
		assert!(err.is_err());
	}
}
