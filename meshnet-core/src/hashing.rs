//! Small hashing helpers used inside `meshnet-core` for things that never
//! leave this process (hashlock derivation, matching J-event observations
//! against each other). Calldata/proof hashing that has to match spec §6
//! bit-exactly lives in `meshnet_wire::hashes` instead.

use bitcoin_hashes::{sha256, Hash};
use meshnet_wire::ids::Hash32;
use serde::Serialize;

pub fn sha256_bytes(data: &[u8]) -> Hash32 {
	Hash32::from_bytes(sha256::Hash::hash(data).to_byte_array())
}

/// Hashes a value's canonical JSON encoding. Used only to compare two
/// locally-observed event lists for equality, never for anything that
/// crosses into a signed artifact.
pub fn sha256_of_json<T: Serialize>(value: &T) -> Hash32 {
	let bytes = serde_json::to_vec(value).unwrap_or_default();
	sha256_bytes(&bytes)
}
