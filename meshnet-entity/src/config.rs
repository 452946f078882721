//! Entity-level configuration — spec §6 "Configuration options". Parsed
//! from TOML at the server boundary (`meshnet-server`); this crate only
//! defines the shape and its defaults.

use meshnet_core::account::DisputeConfig;
use meshnet_wire::ids::EntityId;
use serde::{Deserialize, Serialize};

/// `lot scale = 10^12 wei` — spec §6.
pub const LOT_SCALE: u128 = 1_000_000_000_000;
pub const MAX_LOTS: u64 = u32::MAX as u64;
pub const MAX_FILL_RATIO: u32 = 65535;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurisdictionConfig {
	pub chain_id: u64,
	#[serde(with = "hex_addr")]
	pub depository_address: Vec<u8>,
	#[serde(with = "hex_addr")]
	pub entity_provider_address: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
	pub validators: Vec<EntityId>,
	pub threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtlcConfig {
	pub min_timelock_delta_ms: u64,
	pub min_forward_timelock_ms: u64,
	pub default_expiry_ms: u64,
}

impl Default for HtlcConfig {
	fn default() -> Self {
		Self {
			min_timelock_delta_ms: meshnet_core::htlc::MIN_TIMELOCK_DELTA_MS,
			min_forward_timelock_ms: meshnet_core::htlc::MIN_FORWARD_TIMELOCK_MS,
			default_expiry_ms: meshnet_core::htlc::DEFAULT_HTLC_EXPIRY_MS,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
	pub id: EntityId,
	pub jurisdiction: JurisdictionConfig,
	pub quorum: QuorumConfig,
	pub base_fee: u128,
	pub dispute: DisputeConfig,
	#[serde(default)]
	pub htlc: HtlcConfig,
	pub max_settlement_diff: i128,
	/// Debug-only: suppresses multi-hop forwarding for frame-by-frame demos.
	/// Never persisted — a CLI-only override.
	#[serde(skip)]
	pub skip_pending_forward: bool,
}

mod hex_addr {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(d)?;
		let s = s.strip_prefix("0x").unwrap_or(&s);
		hex::decode(s).map_err(serde::de::Error::custom)
	}
}
