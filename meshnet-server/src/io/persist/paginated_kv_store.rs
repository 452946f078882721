//! The persistence seam — spec SPEC_FULL.md §4. Shaped after the teacher's
//! own `PaginatedKVStore` trait (`ldk-server/src/io/persist/paginated_kv_store.rs`,
//! absent from the retrieved file set but visible through its callers in
//! `io/persist/mod.rs`): namespaced byte blobs, with `list` paginated by an
//! opaque `(String, i64)` token.

use std::io;

/// One page of a `list` call.
pub struct ListResponse {
	pub keys: Vec<String>,
	pub next_page_token: Option<(String, i64)>,
}

/// A namespaced byte-blob store. `primary_namespace`/`secondary_namespace`
/// mirror the teacher's two-level namespacing (we only ever use the primary
/// level, leaving `secondary_namespace` as `""`, same as the teacher's own
/// payments/forwarded-payments namespaces do).
pub trait PaginatedKVStore: Send + Sync {
	fn read(&self, primary_namespace: &str, secondary_namespace: &str, key: &str) -> io::Result<Vec<u8>>;

	fn write(
		&self, primary_namespace: &str, secondary_namespace: &str, key: &str, value: &[u8],
	) -> io::Result<()>;

	fn remove(&self, primary_namespace: &str, secondary_namespace: &str, key: &str) -> io::Result<()>;

	fn list(
		&self, primary_namespace: &str, secondary_namespace: &str, page_token: Option<(String, i64)>,
	) -> io::Result<ListResponse>;
}
