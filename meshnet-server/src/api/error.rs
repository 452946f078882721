//! Maps [`MeshnetError`] onto an HTTP status and a JSON error body — the
//! same role the teacher's `api/error.rs` `LdkServerError`/`to_error_response`
//! play for `LdkServerError`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use meshnet_wire::error::{ErrorCode, MeshnetError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
	code: &'a str,
	message: &'a str,
	htlc_sub_code: Option<&'static str>,
}

fn status_for(code: ErrorCode) -> StatusCode {
	match code {
		ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
		ErrorCode::RoutingError => StatusCode::BAD_REQUEST,
		ErrorCode::FrameConsensusFailed => StatusCode::CONFLICT,
		ErrorCode::HtlcError => StatusCode::UNPROCESSABLE_ENTITY,
		ErrorCode::SettlementError => StatusCode::CONFLICT,
		ErrorCode::DisputeError => StatusCode::CONFLICT,
		ErrorCode::JBatchError => StatusCode::CONFLICT,
		ErrorCode::InvariantViolation => StatusCode::INTERNAL_SERVER_ERROR,
		ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

fn code_name(code: ErrorCode) -> &'static str {
	match code {
		ErrorCode::InvalidRequest => "INVALID_REQUEST",
		ErrorCode::FrameConsensusFailed => "FRAME_CONSENSUS_FAILED",
		ErrorCode::HtlcError => "HTLC_ERROR",
		ErrorCode::SettlementError => "SETTLEMENT_ERROR",
		ErrorCode::DisputeError => "DISPUTE_ERROR",
		ErrorCode::JBatchError => "JBATCH_ERROR",
		ErrorCode::RoutingError => "ROUTING_ERROR",
		ErrorCode::InvariantViolation => "INVARIANT_VIOLATION",
		ErrorCode::InternalError => "INTERNAL_ERROR",
	}
}

pub fn to_error_response(err: &MeshnetError) -> Response<Full<Bytes>> {
	let body = ErrorBody {
		code: code_name(err.code),
		message: &err.message,
		htlc_sub_code: err.htlc_sub_code.map(|c| c.reason()),
	};
	let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());
	Response::builder()
		.status(status_for(err.code))
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from(bytes)))
		.expect("static response parts are always valid")
}

pub fn not_found() -> Response<Full<Bytes>> {
	Response::builder()
		.status(StatusCode::NOT_FOUND)
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from_static(b"{\"code\":\"NOT_FOUND\",\"message\":\"no such route\"}")))
		.expect("static response parts are always valid")
}

pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
	let err = MeshnetError::new(ErrorCode::InvalidRequest, message.to_string());
	to_error_response(&err)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frame_consensus_failures_map_to_conflict() {
		let err = MeshnetError::frame_consensus_failed("bad hanko");
		let resp = to_error_response(&err);
		assert_eq!(resp.status(), StatusCode::CONFLICT);
	}

	#[test]
	fn invariant_violations_map_to_internal_server_error() {
		let err = MeshnetError::invariant("delta conservation broken");
		let resp = to_error_response(&err);
		assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
