//! The bilateral frame and its proposal/ACK envelopes — spec §4.1.

use serde::{Deserialize, Serialize};

use crate::account_tx::AccountTx;
use crate::ids::{AccountKey, Hash32, TimestampMs, TokenId};

/// An entity-quorum signature over a hash. Construction (single-signer
/// shortcut vs. quorum collection) is out of scope per spec §1 — a `Hanko`
/// here is just the artifact a [`crate::crypto::HankoSigner`] produces and
/// a verifier checks, opaque to everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hanko {
	pub signature_bytes: Vec<u8>,
}

impl Hanko {
	pub fn empty() -> Self {
		Hanko { signature_bytes: Vec::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.signature_bytes.is_empty()
	}
}

/// A per-token delta snapshot as carried by a committed frame, matching the
/// `deltas` field of spec §4.1's frame structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDelta {
	pub token_id: TokenId,
	pub ondelta: i128,
	pub offdelta: i128,
	pub collateral: u128,
	pub left_credit_limit: u128,
	pub right_credit_limit: u128,
}

/// One committed (or proposed) batch of bilateral account transactions,
/// plus the proof-of-agreement fields needed to dispute it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
	pub account: AccountKey,
	pub height: u64,
	pub timestamp: TimestampMs,
	pub j_height: u64,
	pub account_txs: Vec<AccountTx>,
	pub prev_frame_hash: Hash32,
	pub token_ids: Vec<TokenId>,
	pub deltas: Vec<FrameDelta>,
	/// Hash of the post-frame `ProofBody` this frame's signatures are over.
	pub state_hash: Hash32,
	pub by_left: bool,
}

/// A proposer's message: the new frame plus its hanko over `state_hash`,
/// plus the hanko the proposer expects the counterparty already holds for
/// the previous frame (used to detect a desynced counterparty early).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInput {
	pub account: AccountKey,
	pub frame: Frame,
	pub proposer_hanko: Hanko,
	pub expected_prev_hanko: Hanko,
}

/// A responder's reply: its counter-signature over the same `state_hash`,
/// an optional piggyback proposal for the *next* height, and the hanko it
/// just signed so both sides store an identical finalized artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAck {
	pub account: AccountKey,
	pub height: u64,
	pub counter_hanko: Hanko,
	pub prev_hanko: Hanko,
	pub piggyback: Option<AccountInput>,
}
