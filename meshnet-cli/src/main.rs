//! Thin HTTP client against a running `meshnet-server`: one subcommand per
//! common `EntityTx` variant plus the two read-only GET endpoints, the
//! hyper-`Client` request/response dance mirrored from `peer_client.rs`'s
//! `post_json` rather than pulled in from a higher-level HTTP crate.

use std::process::ExitCode;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use meshnet_wire::ids::{EntityId, Hash32, TokenId};
use meshnet_wire::EntityTx;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "meshnet-cli", about = "Submit transactions and query state against a meshnet-server instance.")]
struct Cli {
	/// Base URL of the target meshnet-server, e.g. https://127.0.0.1:8080
	#[arg(long, default_value = "http://127.0.0.1:8080")]
	base_url: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Open a bilateral account with a counterparty.
	OpenAccount { counterparty: EntityId },
	/// Send a direct (non-locked) payment, optionally along a manual route.
	DirectPayment {
		target: EntityId,
		token_id: TokenId,
		amount: u128,
		#[arg(long, value_delimiter = ',')]
		route: Option<Vec<EntityId>>,
		#[arg(long)]
		description: Option<String>,
	},
	/// Send an HTLC-locked payment against a hashlock.
	HtlcPayment {
		target: EntityId,
		token_id: TokenId,
		amount: u128,
		hashlock: Hash32,
		#[arg(long, value_delimiter = ',')]
		route: Option<Vec<EntityId>>,
		#[arg(long)]
		secret: Option<Hash32>,
	},
	/// Deposit collateral into an existing account.
	DepositCollateral { counterparty: EntityId, token_id: TokenId, amount: u128 },
	/// Extend unilateral credit to a counterparty.
	ExtendCredit { counterparty: EntityId, token_id: TokenId, amount: u128 },
	/// Propose a settlement that zeroes one token's delta (the common case).
	SettleForgive {
		counterparty: EntityId,
		token_id: TokenId,
		#[arg(long)]
		memo: Option<String>,
	},
	/// Approve the counterparty's currently-pending settlement proposal.
	SettleApprove { counterparty: EntityId },
	/// Reject the counterparty's currently-pending settlement proposal.
	SettleReject { counterparty: EntityId },
	/// Open a dispute against a counterparty.
	DisputeStart { counterparty: EntityId },
	/// Finalize a dispute once its challenge window has elapsed.
	DisputeFinalize { counterparty: EntityId },
	/// Mint this entity's own reserves (test/dev jurisdictions only).
	MintReserves { token_id: TokenId, amount: u128 },
	/// Force a jBatch broadcast of whatever is currently pending.
	JBroadcast,
	/// Rebroadcast the in-flight jBatch, optionally bumping gas.
	JRebroadcast {
		#[arg(long)]
		gas_bump_bps: Option<u32>,
	},
	/// Post a chat message to the entity's peers.
	Chat { text: String },
	/// Fetch a summary of this entity's own state.
	GetEntity,
	/// List this entity's open accounts.
	ListAccounts,
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	let client: Client<HttpConnector, Full<Bytes>> = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

	let result = match cli.command {
		Command::GetEntity => get_json(&client, &cli.base_url, "/v1/entity").await,
		Command::ListAccounts => get_json(&client, &cli.base_url, "/v1/entity/accounts").await,
		other => {
			let tx = match into_entity_tx(other) {
				Some(tx) => tx,
				None => unreachable!("GetEntity/ListAccounts handled above"),
			};
			post_json(&client, &cli.base_url, "/v1/tx", &tx).await
		},
	};

	match result {
		Ok(body) => {
			println!("{body}");
			ExitCode::SUCCESS
		},
		Err(e) => {
			eprintln!("error: {e}");
			ExitCode::FAILURE
		},
	}
}

fn into_entity_tx(command: Command) -> Option<EntityTx> {
	Some(match command {
		Command::OpenAccount { counterparty } => EntityTx::OpenAccount { counterparty },
		Command::DirectPayment { target, token_id, amount, route, description } => {
			EntityTx::DirectPayment { target, token_id, amount, route, description }
		},
		Command::HtlcPayment { target, token_id, amount, hashlock, route, secret } => {
			EntityTx::HtlcPayment { target, token_id, amount, route, hashlock, secret }
		},
		Command::DepositCollateral { counterparty, token_id, amount } => {
			EntityTx::DepositCollateral { counterparty, token_id, amount }
		},
		Command::ExtendCredit { counterparty, token_id, amount } => EntityTx::ExtendCredit { counterparty, token_id, amount },
		Command::SettleForgive { counterparty, token_id, memo } => {
			EntityTx::CreateSettlement { counterparty, diffs: Vec::new(), forgive_token_ids: vec![token_id], memo }
		},
		Command::SettleApprove { counterparty } => EntityTx::SettleApprove { counterparty },
		Command::SettleReject { counterparty } => EntityTx::SettleReject { counterparty },
		Command::DisputeStart { counterparty } => EntityTx::DisputeStart { counterparty },
		Command::DisputeFinalize { counterparty } => EntityTx::DisputeFinalize { counterparty },
		Command::MintReserves { token_id, amount } => EntityTx::MintReserves { token_id, amount },
		Command::JBroadcast => EntityTx::JBroadcast,
		Command::JRebroadcast { gas_bump_bps } => EntityTx::JRebroadcast { gas_bump_bps },
		Command::Chat { text } => EntityTx::Chat { text },
		Command::GetEntity | Command::ListAccounts => return None,
	})
}

async fn post_json<T: Serialize>(
	client: &Client<HttpConnector, Full<Bytes>>, base_url: &str, path: &str, body: &T,
) -> Result<String, String> {
	let bytes = serde_json::to_vec(body).map_err(|e| format!("failed to encode request: {e}"))?;
	let request = Request::builder()
		.method(Method::POST)
		.uri(format!("{}{path}", base_url.trim_end_matches('/')))
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from(bytes)))
		.map_err(|e| e.to_string())?;
	send(client, request).await
}

async fn get_json(client: &Client<HttpConnector, Full<Bytes>>, base_url: &str, path: &str) -> Result<String, String> {
	let request = Request::builder()
		.method(Method::GET)
		.uri(format!("{}{path}", base_url.trim_end_matches('/')))
		.body(Full::new(Bytes::new()))
		.map_err(|e| e.to_string())?;
	send(client, request).await
}

async fn send(client: &Client<HttpConnector, Full<Bytes>>, request: Request<Full<Bytes>>) -> Result<String, String> {
	let response = client.request(request).await.map_err(|e| format!("request failed: {e}"))?;
	let status = response.status();
	let body = response
		.into_body()
		.collect()
		.await
		.map_err(|e| format!("failed to read response body: {e}"))?
		.to_bytes();
	let text = String::from_utf8_lossy(&body).to_string();
	if !status.is_success() {
		return Err(format!("server returned {status}: {text}"));
	}
	// Re-serialize through serde_json::Value for stable pretty-printing,
	// falling back to the raw body if it isn't JSON (e.g. /healthz).
	match serde_json::from_str::<serde_json::Value>(&text) {
		Ok(value) => serde_json::to_string_pretty(&value).map_err(|e| format!("failed to format response: {e}")),
		Err(_) => Ok(text),
	}
}
