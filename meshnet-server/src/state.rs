//! Shared process state — the `Context` the teacher's `service.rs` builds
//! per connection, generalized here to also own the suspension-point
//! adapters, the persistence store and the outbound peer client.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::Mutex;
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use meshnet_core::onion::CryptoProvider;
use meshnet_entity::adapters::{GossipService, JurisdictionAdapter};
use meshnet_entity::entity::{Entity, EntityApplyContext};
use meshnet_wire::ids::EntityId;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::io::persist::paginated_kv_store::PaginatedKVStore;
use crate::util::metrics::Metrics;
use crate::util::signer::LocalSigner;

pub struct AppState {
	pub entity: Mutex<Entity>,
	pub jurisdiction: Box<dyn JurisdictionAdapter>,
	pub gossip: Box<dyn GossipService>,
	pub crypto: Box<dyn CryptoProvider + Send + Sync>,
	pub signer: LocalSigner,
	pub store: Box<dyn PaginatedKVStore>,
	pub peers: BTreeMap<EntityId, String>,
	pub http_client: Client<HttpConnector, Full<Bytes>>,
	pub metrics: Metrics,
	pub prometheus_handle: PrometheusHandle,
}

impl AppState {
	pub fn new(
		entity: Entity, jurisdiction: Box<dyn JurisdictionAdapter>, gossip: Box<dyn GossipService>,
		crypto: Box<dyn CryptoProvider + Send + Sync>, signer: LocalSigner, store: Box<dyn PaginatedKVStore>,
		peers: BTreeMap<EntityId, String>, prometheus_handle: PrometheusHandle,
	) -> Self {
		Self {
			entity: Mutex::new(entity),
			jurisdiction,
			gossip,
			crypto,
			signer,
			store,
			peers,
			http_client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
			metrics: Metrics::new(),
			prometheus_handle,
		}
	}

	/// Builds the ambient context a fresh `apply_entity_tx`/`tick` call needs,
	/// stamped off the entity's own best-known J-height — the entity has no
	/// independent block-height source of its own, spec §4.1.
	pub async fn apply_ctx(&self) -> EntityApplyContext {
		let entity = self.entity.lock().await;
		EntityApplyContext { now_ms: now_millis(), j_height: entity.last_finalized_j_height }
	}
}

pub fn now_millis() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
