//! Liveness and metrics — not request/response JSON like the rest of the
//! surface, so these bypass the generic JSON helper and build their own
//! `Response` directly, the way the teacher's own health/metrics endpoints do.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::state::AppState;

pub const HEALTHZ_PATH: &str = "healthz";
pub const METRICS_PATH: &str = "metrics";

pub async fn handle_healthz_request(_state: Arc<AppState>) -> Result<Response<Full<Bytes>>, hyper::Error> {
	Ok(Response::builder()
		.status(StatusCode::OK)
		.header("content-type", "text/plain")
		.body(Full::new(Bytes::from_static(b"ok")))
		.expect("static response parts are always valid"))
}

pub async fn handle_metrics_request(state: Arc<AppState>) -> Result<Response<Full<Bytes>>, hyper::Error> {
	{
		let entity = state.entity.lock().await;
		state.metrics.update(&entity);
	}
	state.metrics.publish_to_recorder();
	let text = state.prometheus_handle.render();
	Ok(Response::builder()
		.status(StatusCode::OK)
		.header("content-type", "text/plain; version=0.0.4")
		.body(Full::new(Bytes::from(text)))
		.expect("static response parts are always valid"))
}
