//! Bilateral account consensus, HTLC routing, settlement workspace
//! negotiation and dispute construction — the per-account-pair machinery
//! two entities run against each other. Entity-level orchestration
//! (mempools across many accounts, the multi-signer pipeline, jBatch) lives
//! one layer up, in `meshnet-entity`.

pub mod account;
pub mod dispute;
pub mod frame_consensus;
pub mod hashing;
pub mod htlc;
pub mod ledger;
pub mod onion;
pub mod settlement;

pub use account::{AccountEvent, AccountState, ApplyContext};
pub use frame_consensus::{propose_frame, receive_account_ack, receive_account_input, HankoSigner};
pub use ledger::DeltaRow;
