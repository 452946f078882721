//! TLS acceptor construction — spec SPEC_FULL.md §3/§8. The teacher's own
//! `util/tls.rs` hand-rolls X.509 DER encoding against `ring`; this crate
//! uses `rcgen` for self-signed generation instead (same `tokio-rustls`
//! `ServerConfig` output, a deliberately lower-risk path than replicating
//! hand-written ASN.1 — see DESIGN.md).

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::util::config::TlsConfig;

fn io_err(e: impl std::fmt::Display) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Loads a cert/key pair from disk if `cert_path`/`key_path` are both set,
/// generating (and persisting) a fresh self-signed pair for `hosts`
/// otherwise — spec SPEC_FULL.md §3's `[tls]` table.
pub fn get_or_generate_tls_config(tls: &TlsConfig, storage_dir_path: &str) -> io::Result<TlsAcceptor> {
	let (cert_der, key_der) = match (&tls.cert_path, &tls.key_path) {
		(Some(cert_path), Some(key_path)) if Path::new(cert_path).exists() && Path::new(key_path).exists() => {
			load_pem_cert_and_key(cert_path, key_path)?
		},
		_ => {
			let hosts = if tls.hosts.is_empty() { vec!["localhost".to_string()] } else { tls.hosts.clone() };
			let CertifiedKey { cert, key_pair } =
				generate_simple_self_signed(hosts).map_err(io_err)?;
			let cert_pem = cert.pem();
			let key_pem = key_pair.serialize_pem();
			if let (Some(cert_path), Some(key_path)) = (&tls.cert_path, &tls.key_path) {
				fs::create_dir_all(storage_dir_path)?;
				fs::write(cert_path, &cert_pem)?;
				fs::write(key_path, &key_pem)?;
			}
			(CertificateDer::from(cert.der().to_vec()), PrivateKeyDer::try_from(key_pair.serialize_der()).map_err(io_err)?)
		},
	};

	let server_config = ServerConfig::builder()
		.with_no_client_auth()
		.with_single_cert(vec![cert_der], key_der)
		.map_err(io_err)?;
	Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_pem_cert_and_key(cert_path: &str, key_path: &str) -> io::Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
	let cert_bytes = fs::read(cert_path)?;
	let key_bytes = fs::read(key_path)?;

	let mut cert_reader = io::Cursor::new(cert_bytes);
	let cert = rustls_pemfile::certs(&mut cert_reader)
		.next()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no certificate found in PEM file"))?
		.map_err(io_err)?;

	let mut key_reader = io::Cursor::new(key_bytes);
	let key = rustls_pemfile::private_key(&mut key_reader)
		.map_err(io_err)?
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found in PEM file"))?;

	Ok((cert, key))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generates_a_usable_self_signed_acceptor_when_no_paths_exist() {
		let tls = TlsConfig { cert_path: None, key_path: None, hosts: vec!["localhost".to_string()] };
		let acceptor = get_or_generate_tls_config(&tls, "./does-not-matter");
		assert!(acceptor.is_ok());
	}

	#[test]
	fn persists_generated_cert_and_key_when_paths_are_given() {
		let dir = std::env::temp_dir().join(format!("meshnet_tls_test_{}", std::process::id()));
		fs::create_dir_all(&dir).unwrap();
		let cert_path = dir.join("cert.pem").to_string_lossy().to_string();
		let key_path = dir.join("key.pem").to_string_lossy().to_string();
		let tls = TlsConfig { cert_path: Some(cert_path.clone()), key_path: Some(key_path.clone()), hosts: vec![] };
		get_or_generate_tls_config(&tls, dir.to_str().unwrap()).unwrap();
		assert!(Path::new(&cert_path).exists());
		assert!(Path::new(&key_path).exists());
	}
}
