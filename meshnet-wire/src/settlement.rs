//! Settlement workspace op types — spec §4.3. Ops are the raw, uncompiled
//! intent the two parties negotiate; `meshnet-core::settlement` compiles
//! them into canonical [`crate::account_tx::SettlementDiff`]s.

use serde::{Deserialize, Serialize};

use crate::ids::TokenId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum SettlementOp {
	/// Move `left_diff`/`right_diff`/`collateral_diff` directly for a token.
	/// Conservation (`left + right + collateral == 0`) is checked at
	/// compile time, not construction time.
	RawDiff { token_id: TokenId, left_diff: i128, right_diff: i128, collateral_diff: i128 },
	/// Zero out a token's delta entirely, forgiving whatever is owed.
	Forgive { token_id: TokenId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
	AwaitingCounterparty,
	ReadyToSubmit,
	Submitted,
}
