//! Outbound delivery of `AccountInput`/`AccountAck` to a counterparty's own
//! `meshnet-server` process — spec.md's bilateral protocol assumes a
//! transport exists between the two sides' entities; §5's Non-goals rule
//! out a gossip-overlay transport but not this point-to-point one. Each
//! peer is addressed by a configured base URL (spec SPEC_FULL.md §3's
//! `[[peers]]` table).

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::frame::{AccountAck, AccountInput};
use meshnet_wire::ids::EntityId;
use serde::Serialize;

async fn post_json<T: Serialize>(
	client: &Client<HttpConnector, Full<Bytes>>, base_url: &str, path: &str, body: &T,
) -> Result<(), MeshnetError> {
	let bytes = serde_json::to_vec(body)
		.map_err(|e| MeshnetError::new(ErrorCode::InternalError, format!("failed to encode peer payload: {e}")))?;
	let uri = format!("{}{}", base_url.trim_end_matches('/'), path);
	let request = Request::builder()
		.method("POST")
		.uri(uri)
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from(bytes)))
		.map_err(|e| MeshnetError::new(ErrorCode::InternalError, e.to_string()))?;

	let response = client
		.request(request)
		.await
		.map_err(|e| MeshnetError::new(ErrorCode::InternalError, format!("peer dispatch failed: {e}")))?;
	if !response.status().is_success() {
		let status = response.status();
		let body = response
			.into_body()
			.collect()
			.await
			.map(|b| String::from_utf8_lossy(&b.to_bytes()).to_string())
			.unwrap_or_default();
		return Err(MeshnetError::new(ErrorCode::InternalError, format!("peer returned {status}: {body}")));
	}
	Ok(())
}

pub async fn send_account_input(
	client: &Client<HttpConnector, Full<Bytes>>, base_url: &str, input: &AccountInput,
) -> Result<(), MeshnetError> {
	post_json(client, base_url, "/v1/peer/account-input", input).await
}

pub async fn send_account_ack(
	client: &Client<HttpConnector, Full<Bytes>>, base_url: &str, ack: &AccountAck,
) -> Result<(), MeshnetError> {
	post_json(client, base_url, "/v1/peer/account-ack", ack).await
}

pub fn base_url_for<'a>(peers: &'a std::collections::BTreeMap<EntityId, String>, counterparty: EntityId) -> Option<&'a str> {
	peers.get(&counterparty).map(|s| s.as_str())
}
