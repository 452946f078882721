//! Wire-level types for the bilateral payment mesh: account/entity
//! transaction tags, frames, onion envelopes, J-events, the error
//! taxonomy, and the hash/calldata construction spec §6 fixes bit-exact.
//!
//! These types stand in for what the teacher (`lightningdevkit-ldk-server`)
//! generates from `.proto` files via `prost`/`tonic`. There is no protoc
//! toolchain step available here, so the same message shapes are
//! hand-authored `serde` types instead of generated ones — see
//! `DESIGN.md`.

pub mod account_tx;
pub mod entity_tx;
pub mod envelope;
pub mod error;
pub mod events;
pub mod frame;
pub mod hashes;
pub mod ids;
pub mod settlement;

pub use account_tx::{AccountTx, HtlcOutcome, Side};
pub use entity_tx::EntityTx;
pub use envelope::{OnionEnvelope, OnionLayer};
pub use error::{ErrorCode, HtlcErrorCode, MeshnetError};
pub use frame::{AccountAck, AccountInput, Frame, FrameDelta, Hanko};
pub use ids::{AccountKey, EntityId, Hash32, LockId, OfferId, RequestId, Secret32, TokenId};
