mod api;
mod dispatch;
mod io;
mod peer_client;
mod service;
mod state;
mod telemetry;
mod util;

use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::signal::unix::SignalKind;
use tokio::time::interval;

use meshnet_core::hashing::sha256_bytes;
use meshnet_core::onion::CryptoProvider;
use meshnet_entity::adapters::{GossipService, JurisdictionAdapter, MockJurisdiction, StaticGossip, XorCryptoProvider};
use meshnet_entity::entity::{Entity, EntityApplyContext};
use meshnet_wire::ids::EntityId;
use meshnet_wire::EntityTx;

use crate::io::persist::paginated_kv_store::PaginatedKVStore;
use crate::io::persist::sqlite_store::SqliteStore;
use crate::io::persist::{persist_entity_state, persist_peer_routes, restore_entity_state};
use crate::service::MeshnetService;
use crate::state::{now_millis, AppState};
use crate::util::config::{load_config, ArgsConfig, ServerConfig};
use crate::util::signer::LocalSigner;

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const PERSIST_INTERVAL: Duration = Duration::from_secs(5);
/// spec SPEC_FULL.md §7's crontab hooks: sweep expired HTLC locks and nudge
/// a stuck in-flight jBatch, both idempotent against the entity's own state.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

fn main() {
	let args = ArgsConfig::parse();
	let config = match load_config(&args) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("Invalid configuration: {e}");
			std::process::exit(1);
		},
	};

	init_logger(&config);

	if let Err(e) = fs::create_dir_all(&config.storage_dir_path) {
		log::error!("failed to create storage directory '{}': {e}", config.storage_dir_path);
		std::process::exit(1);
	}

	let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
		Ok(rt) => Arc::new(rt),
		Err(e) => {
			log::error!("failed to set up tokio runtime: {e}");
			std::process::exit(1);
		},
	};

	let db_path = Path::new(&config.storage_dir_path).join("meshnet.sqlite");
	let store: Box<dyn PaginatedKVStore> = match SqliteStore::new(db_path.to_string_lossy().as_ref()) {
		Ok(store) => Box::new(store),
		Err(e) => {
			log::error!("failed to open sqlite store at '{}': {e}", db_path.display());
			std::process::exit(1);
		},
	};

	let mut entity = Entity::new(config.entity.clone());
	entity.config.skip_pending_forward = args.skip_pending_forward;
	match restore_entity_state(store.as_ref(), &mut entity) {
		Ok(()) => log::info!("restored entity state from {}", config.storage_dir_path),
		Err(e) => log::info!("no prior entity state restored ({e}); starting fresh"),
	}

	let jurisdiction: Box<dyn JurisdictionAdapter> = Box::new(MockJurisdiction::new());

	let mut gossip_impl = StaticGossip::new();
	for (peer_id, _) in &config.peers {
		gossip_impl.add_edge(config.entity.id, *peer_id);
	}
	let gossip: Box<dyn GossipService> = Box::new(gossip_impl);

	let crypto: Box<dyn CryptoProvider + Send + Sync> = Box::new(XorCryptoProvider { own: config.entity.id });
	let signer = LocalSigner::new(config.entity.id, local_signer_secret(config.entity.id));

	let peers: BTreeMap<EntityId, String> = config.peers.iter().cloned().collect();
	if let Err(e) = persist_peer_routes(store.as_ref(), config.entity.id, &config.peers) {
		log::warn!("failed to persist peer routes: {e}");
	}

	let prometheus_handle = telemetry::setup_prometheus();

	let state = Arc::new(AppState::new(entity, jurisdiction, gossip, crypto, signer, store, peers, prometheus_handle));

	log::info!("meshnet-server starting for entity {} on {}", config.entity.id, config.rest_service_addr);

	runtime.block_on(run(Arc::clone(&state), config, Arc::clone(&runtime)));

	log::info!("shutdown complete");
}

fn local_signer_secret(id: EntityId) -> [u8; 32] {
	sha256_bytes(id.as_bytes()).0
}

fn init_logger(config: &ServerConfig) {
	let mut builder = env_logger::Builder::new();
	builder.filter_level(config.log_level);
	if let Some(path) = &config.log_file_path {
		match OpenOptions::new().create(true).append(true).open(path) {
			Ok(file) => {
				builder.target(env_logger::Target::Pipe(Box::new(file)));
			},
			Err(e) => eprintln!("failed to open log file '{path}', logging to stderr instead: {e}"),
		}
	}
	builder.init();
}

async fn run(state: Arc<AppState>, config: ServerConfig, runtime: Arc<tokio::runtime::Runtime>) {
	let listener = match TcpListener::bind(config.rest_service_addr).await {
		Ok(l) => l,
		Err(e) => {
			log::error!("failed to bind {}: {e}", config.rest_service_addr);
			std::process::exit(1);
		},
	};
	log::info!("listening on {}", config.rest_service_addr);

	let tls_acceptor = match &config.tls_config {
		Some(tls) => match util::tls::get_or_generate_tls_config(tls, &config.storage_dir_path) {
			Ok(acceptor) => Some(acceptor),
			Err(e) => {
				log::error!("failed to set up TLS: {e}");
				std::process::exit(1);
			},
		},
		None => None,
	};

	let mut sigterm_stream = match tokio::signal::unix::signal(SignalKind::terminate()) {
		Ok(s) => s,
		Err(e) => {
			log::error!("failed to register SIGTERM handler: {e}");
			std::process::exit(1);
		},
	};

	let mut tick_interval = interval(TICK_INTERVAL);
	let mut persist_interval = interval(PERSIST_INTERVAL);
	let mut maintenance_interval = interval(MAINTENANCE_INTERVAL);

	loop {
		tokio::select! {
			_ = tick_interval.tick() => {
				let events = {
					let mut entity = state.entity.lock().await;
					let ctx = EntityApplyContext { now_ms: now_millis(), j_height: entity.last_finalized_j_height };
					entity.tick(&ctx, &state.signer)
				};
				dispatch::dispatch_events(&state, events).await;
			},

			_ = persist_interval.tick() => {
				let entity = state.entity.lock().await;
				if let Err(e) = persist_entity_state(state.store.as_ref(), &entity) {
					log::warn!("periodic persist failed: {e}");
				}
			},

			_ = maintenance_interval.tick() => {
				run_maintenance(&state).await;
			},

			accepted = listener.accept() => {
				match accepted {
					Ok((stream, _addr)) => {
						let service_state = Arc::clone(&state);
						let tls_acceptor = tls_acceptor.clone();
						runtime.spawn(async move {
							let service = MeshnetService::new(service_state);
							let result = if let Some(acceptor) = tls_acceptor {
								match acceptor.accept(stream).await {
									Ok(tls_stream) => {
										http1::Builder::new().serve_connection(TokioIo::new(tls_stream), service).await
									},
									Err(e) => {
										log::warn!("TLS handshake failed: {e}");
										return;
									},
								}
							} else {
								http1::Builder::new().serve_connection(TokioIo::new(stream), service).await
							};
							if let Err(e) = result {
								log::warn!("connection error: {e}");
							}
						});
					},
					Err(e) => log::warn!("failed to accept connection: {e}"),
				}
			},

			_ = tokio::signal::ctrl_c() => {
				log::info!("received ctrl-c, shutting down");
				break;
			},

			_ = sigterm_stream.recv() => {
				log::info!("received SIGTERM, shutting down");
				break;
			},
		}
	}

	let entity = state.entity.lock().await;
	if let Err(e) = persist_entity_state(state.store.as_ref(), &entity) {
		log::error!("failed to persist entity state on shutdown: {e}");
	}
}

/// Sweeps timed-out HTLC locks and, if a jBatch has been sitting unconfirmed,
/// rebroadcasts it — spec SPEC_FULL.md §7's crontab hooks, both issued as
/// ordinary self-addressed `EntityTx`s through the same dispatch path every
/// other mutation goes through.
async fn run_maintenance(state: &Arc<AppState>) {
	let sweep_events = {
		let mut entity = state.entity.lock().await;
		let self_id = entity.config.id;
		let last_finalized_j_height = entity.last_finalized_j_height;
		let ctx = EntityApplyContext { now_ms: now_millis(), j_height: last_finalized_j_height };
		let tx = EntityTx::ProcessHtlcTimeouts { now_ms: now_millis(), last_finalized_j_height };
		match entity
			.apply_entity_tx(self_id, tx, &ctx, state.jurisdiction.as_ref(), state.gossip.as_ref(), state.crypto.as_ref(), &state.signer)
			.await
		{
			Ok(events) => events,
			Err(e) => {
				log::warn!("htlc timeout sweep failed: {e}");
				Vec::new()
			},
		}
	};
	dispatch::dispatch_events(state, sweep_events).await;

	let rebroadcast_events = {
		let mut entity = state.entity.lock().await;
		if entity.jbatch.sent.is_none() {
			return;
		}
		let self_id = entity.config.id;
		let ctx = EntityApplyContext { now_ms: now_millis(), j_height: entity.last_finalized_j_height };
		match entity
			.apply_entity_tx(
				self_id,
				EntityTx::JRebroadcast { gas_bump_bps: None },
				&ctx,
				state.jurisdiction.as_ref(),
				state.gossip.as_ref(),
				state.crypto.as_ref(),
				&state.signer,
			)
			.await
		{
			Ok(events) => events,
			Err(e) => {
				log::warn!("jbatch rebroadcast failed: {e}");
				Vec::new()
			},
		}
	};
	dispatch::dispatch_events(state, rebroadcast_events).await;
}
