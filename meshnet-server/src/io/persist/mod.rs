//! Persistence — spec SPEC_FULL.md §4, laid out the way the teacher's own
//! `io/persist/mod.rs` lays out namespace constants and list/read helpers
//! over a [`PaginatedKVStore`].

pub mod paginated_kv_store;
pub mod sqlite_store;
pub mod types;

use std::io;
use std::sync::Arc;

use meshnet_entity::entity::Entity;
use meshnet_wire::ids::EntityId;

use paginated_kv_store::PaginatedKVStore;
use types::{StoredAccount, StoredJBatch};

pub const ACCOUNTS_PRIMARY_NAMESPACE: &str = "accounts";
pub const JBATCH_PRIMARY_NAMESPACE: &str = "jbatch";
pub const ROUTES_PRIMARY_NAMESPACE: &str = "routes";
pub const VALIDATORS_PRIMARY_NAMESPACE: &str = "validators";
const NO_SECONDARY_NAMESPACE: &str = "";

fn json_err(e: serde_json::Error) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Snapshots every open account plus the jBatch nonce under the entity's own
/// store — called after each committed frame and before shutdown.
pub fn persist_entity_state(store: &dyn PaginatedKVStore, entity: &Entity) -> io::Result<()> {
	for (key, account) in &entity.accounts {
		let snapshot = StoredAccount::from_account_state(account);
		let bytes = serde_json::to_vec(&snapshot).map_err(json_err)?;
		store.write(ACCOUNTS_PRIMARY_NAMESPACE, NO_SECONDARY_NAMESPACE, &account_record_key(key), &bytes)?;
	}
	let jbatch = StoredJBatch::from_jbatch_state(&entity.jbatch);
	let bytes = serde_json::to_vec(&jbatch).map_err(json_err)?;
	store.write(JBATCH_PRIMARY_NAMESPACE, NO_SECONDARY_NAMESPACE, &entity.config.id.to_string(), &bytes)?;
	Ok(())
}

/// Restores every account snapshot and the jBatch nonce into a freshly
/// constructed [`Entity`] — called once at startup.
pub fn restore_entity_state(store: &dyn PaginatedKVStore, entity: &mut Entity) -> io::Result<()> {
	let mut page_token = None;
	loop {
		let page = store.list(ACCOUNTS_PRIMARY_NAMESPACE, NO_SECONDARY_NAMESPACE, page_token.clone())?;
		for key in &page.keys {
			let bytes = store.read(ACCOUNTS_PRIMARY_NAMESPACE, NO_SECONDARY_NAMESPACE, key)?;
			let stored: StoredAccount = serde_json::from_slice(&bytes).map_err(json_err)?;
			let account_key = stored.key;
			entity.accounts.insert(account_key, stored.into_account_state());
		}
		page_token = page.next_page_token;
		if page_token.is_none() {
			break;
		}
	}

	let jbatch_key = entity.config.id.to_string();
	if let Ok(bytes) = store.read(JBATCH_PRIMARY_NAMESPACE, NO_SECONDARY_NAMESPACE, &jbatch_key) {
		let stored: StoredJBatch = serde_json::from_slice(&bytes).map_err(json_err)?;
		entity.jbatch.entity_nonce = stored.entity_nonce;
	}
	Ok(())
}

fn account_record_key(key: &meshnet_wire::ids::AccountKey) -> String {
	format!("{}-{}", key.left, key.right)
}

/// Persists the set of configured peer base URLs under the entity's own
/// `routes/<entity_id>` record — spec SPEC_FULL.md §4.
pub fn persist_peer_routes(store: &dyn PaginatedKVStore, self_id: EntityId, peers: &[(EntityId, String)]) -> io::Result<()> {
	let bytes = serde_json::to_vec(peers).map_err(json_err)?;
	store.write(ROUTES_PRIMARY_NAMESPACE, NO_SECONDARY_NAMESPACE, &self_id.to_string(), &bytes)
}
