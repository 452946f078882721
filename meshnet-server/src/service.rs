//! The connection-level `Service` impl — grounded on the teacher's
//! `service.rs`: one `NodeService`-shaped struct matching request paths
//! against handler functions, a generic `handle_request` helper doing the
//! decode/dispatch/encode dance. The teacher decodes/encodes with `prost`;
//! this decodes/encodes with `serde_json` since there's no protoc step
//! available here (see `DESIGN.md`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use meshnet_wire::error::MeshnetError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::error::{bad_request, not_found, to_error_response};
use crate::api::{health, query, tx};
use crate::state::AppState;

#[derive(Clone)]
pub struct MeshnetService {
	state: Arc<AppState>,
}

impl MeshnetService {
	pub fn new(state: Arc<AppState>) -> Self {
		Self { state }
	}
}

impl Service<Request<Incoming>> for MeshnetService {
	type Response = Response<Full<Bytes>>;
	type Error = hyper::Error;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn call(&self, req: Request<Incoming>) -> Self::Future {
		let state = Arc::clone(&self.state);
		let method = req.method().clone();
		// Exclude '/' from path pattern matching, same convention the teacher uses.
		match (&method, &req.uri().path()[1..]) {
			(&Method::POST, tx::ENTITY_TX_PATH) => Box::pin(handle_json_request(state, req, tx::handle_entity_tx_request)),
			(&Method::POST, tx::PEER_ACCOUNT_INPUT_PATH) => {
				Box::pin(handle_json_request(state, req, tx::handle_peer_account_input_request))
			},
			(&Method::POST, tx::PEER_ACCOUNT_ACK_PATH) => {
				Box::pin(handle_json_request(state, req, tx::handle_peer_account_ack_request))
			},
			(&Method::GET, query::GET_ENTITY_PATH) => Box::pin(handle_get_request(state, query::handle_get_entity_request)),
			(&Method::GET, query::LIST_ACCOUNTS_PATH) => {
				Box::pin(handle_get_request(state, query::handle_list_accounts_request))
			},
			(&Method::GET, health::HEALTHZ_PATH) => Box::pin(health::handle_healthz_request(state)),
			(&Method::GET, health::METRICS_PATH) => Box::pin(health::handle_metrics_request(state)),
			(_, path) => {
				let path = path.to_string();
				Box::pin(async move {
					let _ = path;
					Ok(not_found())
				})
			},
		}
	}
}

/// Decodes a JSON request body into `T`, runs `handler`, and encodes its
/// `R` response back to JSON — the serde_json analogue of the teacher's
/// `prost`-based `handle_request`.
async fn handle_json_request<T, R, F, Fut>(
	state: Arc<AppState>, request: Request<Incoming>, handler: F,
) -> Result<Response<Full<Bytes>>, hyper::Error>
where
	T: DeserializeOwned,
	R: Serialize,
	F: Fn(Arc<AppState>, T) -> Fut,
	Fut: Future<Output = Result<R, MeshnetError>>,
{
	// TODO: bound the amount of data read per request to avoid unbounded allocation.
	let bytes = request.into_body().collect().await?.to_bytes();
	let parsed: T = match serde_json::from_slice(&bytes) {
		Ok(v) => v,
		Err(e) => return Ok(bad_request(&format!("malformed request body: {e}"))),
	};
	match handler(state, parsed).await {
		Ok(response) => {
			let body = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
			Ok(Response::builder()
				.status(StatusCode::OK)
				.header("content-type", "application/json")
				.body(Full::new(Bytes::from(body)))
				.expect("static response parts are always valid"))
		},
		Err(e) => Ok(to_error_response(&e)),
	}
}

async fn handle_get_request<R, F, Fut>(state: Arc<AppState>, handler: F) -> Result<Response<Full<Bytes>>, hyper::Error>
where
	R: Serialize,
	F: Fn(Arc<AppState>) -> Fut,
	Fut: Future<Output = Result<R, MeshnetError>>,
{
	match handler(state).await {
		Ok(response) => {
			let body = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
			Ok(Response::builder()
				.status(StatusCode::OK)
				.header("content-type", "application/json")
				.body(Full::new(Bytes::from(body)))
				.expect("static response parts are always valid"))
		},
		Err(e) => Ok(to_error_response(&e)),
	}
}
