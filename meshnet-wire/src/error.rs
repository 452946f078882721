//! The error taxonomy from spec §7, shaped the way `LdkServerError` /
//! `LdkServerErrorCode` / `LightningErrorCode` are shaped: a top-level code
//! a caller can match on, plus an optional typed sub-code for the one
//! category (account/HTLC errors) that needs finer detail.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error code, mirroring the teacher's `LdkServerErrorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
	/// Malformed or out-of-range request data.
	InvalidRequest,
	/// Bilateral frame consensus rejected a proposed or received frame.
	FrameConsensusFailed,
	/// An HTLC lock was cancelled by an intermediary or the sweep.
	HtlcError,
	/// A settlement workspace guard was violated.
	SettlementError,
	/// A dispute precondition was violated.
	DisputeError,
	/// A jBatch precondition was violated (pending batch, missing address, ...).
	JBatchError,
	/// No usable route could be found for a payment.
	RoutingError,
	/// An invariant that must never be false was found false.
	InvariantViolation,
	/// Unrecognized or internal error.
	InternalError,
}

/// Sub-codes for [`ErrorCode::HtlcError`], matching spec §7's named reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcErrorCode {
	EnvelopeDecryptFail,
	HashlockMismatch,
	EnvelopeMismatch,
	FeeBelowBase,
	InvalidForwardAmount,
	MissingForwardAmount,
	TimelockTooTight,
	HeightExpired,
	NoAccount,
	UnknownLock,
	Timeout,
}

impl HtlcErrorCode {
	/// The literal `reason` string spec §4.2/§7 uses on the wire.
	pub fn reason(&self) -> &'static str {
		match self {
			HtlcErrorCode::EnvelopeDecryptFail => "ENVELOPE_DECRYPT_FAIL",
			HtlcErrorCode::HashlockMismatch => "HTLC_ENVELOPE_HASHLOCK_MISMATCH",
			HtlcErrorCode::EnvelopeMismatch => "envelope_mismatch",
			HtlcErrorCode::FeeBelowBase => "fee_below_base",
			HtlcErrorCode::InvalidForwardAmount => "invalid_forward_amount",
			HtlcErrorCode::MissingForwardAmount => "missing_forward_amount",
			HtlcErrorCode::TimelockTooTight => "timelock_too_tight",
			HtlcErrorCode::HeightExpired => "height_expired",
			HtlcErrorCode::NoAccount => "no_account",
			HtlcErrorCode::UnknownLock => "unknown_lock",
			HtlcErrorCode::Timeout => "timeout",
		}
	}
}

impl fmt::Display for HtlcErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.reason())
	}
}

/// The mesh-wide error type. Handlers that need a sub-code carry one;
/// everything else leaves it `None`, same split as the teacher's
/// `LdkServerError.sub_error_code`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct MeshnetError {
	pub code: ErrorCode,
	pub message: String,
	pub htlc_sub_code: Option<HtlcErrorCode>,
}

impl MeshnetError {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self { code, message: message.into(), htlc_sub_code: None }
	}

	pub fn htlc(sub_code: HtlcErrorCode, message: impl Into<String>) -> Self {
		Self {
			code: ErrorCode::HtlcError,
			message: message.into(),
			htlc_sub_code: Some(sub_code),
		}
	}

	pub fn frame_consensus_failed(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::FrameConsensusFailed, message)
	}

	pub fn invariant(detail: impl fmt::Display) -> Self {
		Self::new(ErrorCode::InvariantViolation, format!("FINTECH-SAFETY:{detail}"))
	}
}
