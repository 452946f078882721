//! Settlement workspace — spec §4.3. Negotiates a bilateral cooperative
//! state update as a typed `ops[]` list, compiles it deterministically into
//! canonical per-token diffs, and carries it through to execution.

use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::ids::{Hash32, TokenId};
use meshnet_wire::settlement::SettlementOp;
use meshnet_wire::{Hanko, Side};

use crate::account::AccountState;
use crate::ledger::check_settlement_diff_conserves;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceStatus {
	AwaitingCounterparty,
	ReadyToSubmit,
	Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledDiff {
	pub token_id: TokenId,
	pub left_diff: i128,
	pub right_diff: i128,
	pub collateral_diff: i128,
}

#[derive(Debug, Clone)]
pub struct SettlementWorkspaceState {
	pub ops: Vec<SettlementOp>,
	pub last_modified_by_left: bool,
	pub version: u64,
	pub status: WorkspaceStatus,
	pub memo: Option<String>,
	pub created_at: u64,
	pub updated_at: u64,
	pub executor_is_left: bool,
	pub left_hanko: Option<Hanko>,
	pub right_hanko: Option<Hanko>,
	pub compiled_diffs: Option<Vec<CompiledDiff>>,
	pub compiled_forgive_token_ids: Vec<TokenId>,
	pub nonce_at_sign: Option<u64>,
	pub post_settlement_dispute_proof_hash: Option<Hash32>,
}

impl SettlementWorkspaceState {
	pub fn propose(ops: Vec<SettlementOp>, proposer_is_left: bool, now_ms: u64, memo: Option<String>) -> Self {
		Self {
			ops,
			last_modified_by_left: proposer_is_left,
			version: 1,
			status: WorkspaceStatus::AwaitingCounterparty,
			memo,
			created_at: now_ms,
			updated_at: now_ms,
			executor_is_left: proposer_is_left,
			left_hanko: None,
			right_hanko: None,
			compiled_diffs: None,
			compiled_forgive_token_ids: Vec::new(),
			nonce_at_sign: None,
			post_settlement_dispute_proof_hash: None,
		}
	}

	fn has_any_hanko(&self) -> bool {
		self.left_hanko.is_some() || self.right_hanko.is_some()
	}
}

/// Compiles `ops[]` into canonical `(diffs, forgiveTokenIds)` from the
/// perspective of `last_modified_by_left` — same ops always yield the same
/// diffs regardless of which side is compiling, spec §4.3 "Ops model".
pub fn compile_ops(
	ops: &[SettlementOp], last_modified_by_left: bool, account: &AccountState, max_settlement_diff: i128,
) -> Result<(Vec<CompiledDiff>, Vec<TokenId>), MeshnetError> {
	let mut diffs = Vec::new();
	let mut forgive = Vec::new();
	for op in ops {
		match op {
			SettlementOp::Forgive { token_id } => forgive.push(*token_id),
			SettlementOp::RawDiff { token_id, left_diff, right_diff, collateral_diff } => {
				let (left_diff, right_diff) = if last_modified_by_left {
					(*left_diff, *right_diff)
				} else {
					(*right_diff, *left_diff)
				};
				check_settlement_diff_conserves(left_diff, right_diff, *collateral_diff, max_settlement_diff)?;
				let _ = account.row(*token_id)?;
				diffs.push(CompiledDiff { token_id: *token_id, left_diff, right_diff, collateral_diff: *collateral_diff });
			},
		}
	}
	Ok((diffs, forgive))
}

pub fn settle_propose(
	account: &mut AccountState, ops: Vec<SettlementOp>, proposer_is_left: bool, now_ms: u64, memo: Option<String>,
	max_settlement_diff: i128,
) -> Result<(), MeshnetError> {
	if account.settlement_workspace.is_some() {
		return Err(MeshnetError::new(ErrorCode::SettlementError, "settlement workspace already in flight"));
	}
	compile_ops(&ops, proposer_is_left, account, max_settlement_diff)?;
	account.settlement_workspace = Some(SettlementWorkspaceState::propose(ops, proposer_is_left, now_ms, memo));
	Ok(())
}

/// Guard 2: clears signatures and compiled cache; guard 3: `executorIsLeft`
/// may only move while unsigned.
pub fn settle_update(
	account: &mut AccountState, ops: Vec<SettlementOp>, modifier_is_left: bool, new_executor_is_left: Option<bool>,
	now_ms: u64, max_settlement_diff: i128,
) -> Result<(), MeshnetError> {
	let previous_version;
	let previous_last_modified_by_left;
	{
		let ws = account
			.settlement_workspace
			.as_ref()
			.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "no settlement workspace"))?;
		previous_version = ws.version;
		previous_last_modified_by_left = ws.last_modified_by_left;
	}
	compile_ops(&ops, modifier_is_left, account, max_settlement_diff)?;

	// Guard 7: release holds from the previous version before this update's
	// holds are set by the caller against the new version.
	if let Some(prev_diffs) = account.settlement_workspace.as_ref().and_then(|w| w.compiled_diffs.clone()) {
		release_holds_for(account, &prev_diffs);
	}

	let ws = account.settlement_workspace.as_mut().unwrap();
	if ws.has_any_hanko() {
		if new_executor_is_left.is_some() && new_executor_is_left != Some(ws.executor_is_left) {
			return Err(MeshnetError::new(ErrorCode::SettlementError, "Cannot update after signing"));
		}
	} else if let Some(executor) = new_executor_is_left {
		ws.executor_is_left = executor;
	}
	let _ = previous_last_modified_by_left;
	ws.ops = ops;
	ws.last_modified_by_left = modifier_is_left;
	ws.version = previous_version + 1;
	ws.status = WorkspaceStatus::AwaitingCounterparty;
	ws.updated_at = now_ms;
	ws.left_hanko = None;
	ws.right_hanko = None;
	ws.compiled_diffs = None;
	ws.compiled_forgive_token_ids.clear();
	ws.post_settlement_dispute_proof_hash = None;
	Ok(())
}

/// Guard 6: the side that last modified the workspace cannot also approve
/// it.
pub fn settle_approve(
	account: &mut AccountState, approver_is_left: bool, hanko: Hanko, on_chain_settlement_nonce: u64,
	max_settlement_diff: i128,
) -> Result<u64, MeshnetError> {
	let diffs;
	let forgive;
	{
		let ws = account
			.settlement_workspace
			.as_ref()
			.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "no settlement workspace"))?;
		if ws.last_modified_by_left == approver_is_left {
			return Err(MeshnetError::new(ErrorCode::SettlementError, "Cannot approve your own proposal"));
		}
		let existing = if approver_is_left { &ws.left_hanko } else { &ws.right_hanko };
		if existing.is_some() {
			return Err(MeshnetError::new(ErrorCode::SettlementError, "Already signed this workspace"));
		}
		let (d, f) = compile_ops(&ws.ops, ws.last_modified_by_left, account, max_settlement_diff)?;
		diffs = d;
		forgive = f;
	}
	set_holds_for(account, &diffs, true);
	let nonce_at_sign = on_chain_settlement_nonce + 1;
	let ws = account.settlement_workspace.as_mut().unwrap();
	ws.compiled_diffs = Some(diffs);
	ws.compiled_forgive_token_ids = forgive;
	if approver_is_left {
		ws.left_hanko = Some(hanko);
	} else {
		ws.right_hanko = Some(hanko);
	}
	ws.nonce_at_sign = Some(nonce_at_sign);
	if ws.left_hanko.is_some() && ws.right_hanko.is_some() {
		ws.status = WorkspaceStatus::ReadyToSubmit;
	}
	Ok(nonce_at_sign)
}

/// Checks the auto-approve safety rule: the caller's reserve-bound diff must
/// not decrease, and if unchanged the `ondeltaDiff` attribution must not
/// move away from the caller — spec §4.3 "Auto-approve".
pub fn is_auto_approve_safe(diffs: &[CompiledDiff], caller_is_left: bool) -> bool {
	diffs.iter().all(|d| {
		let caller_diff = if caller_is_left { d.left_diff } else { d.right_diff };
		caller_diff >= 0
	})
}

pub fn settle_execute(
	account: &mut AccountState, max_settlement_diff: i128,
) -> Result<(Vec<CompiledDiff>, Vec<TokenId>, Hanko), MeshnetError> {
	let (recompiled, forgive) = {
		let ws = account
			.settlement_workspace
			.as_ref()
			.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "no settlement workspace"))?;
		compile_ops(&ws.ops, ws.last_modified_by_left, account, max_settlement_diff)?
	};
	let ws = account
		.settlement_workspace
		.as_ref()
		.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "no settlement workspace"))?;
	let cached = ws
		.compiled_diffs
		.as_ref()
		.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "workspace has not been approved"))?;
	if *cached != recompiled {
		return Err(MeshnetError::new(ErrorCode::SettlementError, "Recompiled diff mismatch"));
	}
	let counterparty_hanko = if ws.last_modified_by_left { ws.right_hanko.clone() } else { ws.left_hanko.clone() }
		.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "counterparty hanko required"))?;
	let diffs = recompiled;
	let forgive = forgive;
	release_holds_for(account, &diffs);
	account.settlement_workspace = None;
	Ok((diffs, forgive, counterparty_hanko))
}

pub fn settle_reject(account: &mut AccountState) -> Result<(), MeshnetError> {
	let ws = account
		.settlement_workspace
		.take()
		.ok_or_else(|| MeshnetError::new(ErrorCode::SettlementError, "no settlement workspace"))?;
	if let Some(diffs) = ws.compiled_diffs {
		release_holds_for(account, &diffs);
	}
	Ok(())
}

fn set_holds_for(account: &mut AccountState, diffs: &[CompiledDiff], hold: bool) {
	for d in diffs {
		let entry = account.holds.entry(d.token_id).or_insert((0, 0));
		if d.left_diff < 0 {
			let amount = (-d.left_diff) as u128;
			if hold {
				entry.0 += amount;
			} else {
				entry.0 = entry.0.saturating_sub(amount);
			}
		}
		if d.right_diff < 0 {
			let amount = (-d.right_diff) as u128;
			if hold {
				entry.1 += amount;
			} else {
				entry.1 = entry.1.saturating_sub(amount);
			}
		}
	}
}

fn release_holds_for(account: &mut AccountState, diffs: &[CompiledDiff]) {
	set_holds_for(account, diffs, false);
}

#[allow(dead_code)]
fn side_diff(diffs: &[CompiledDiff], side: Side) -> i128 {
	diffs.iter().map(|d| if matches!(side, Side::Left) { d.left_diff } else { d.right_diff }).sum()
}

#[cfg(test)]
mod tests {
	use super::*;
	use meshnet_wire::ids::EntityId;
	use meshnet_wire::AccountKey;

	fn account_with_token() -> AccountState {
		let a = EntityId::from_bytes([1u8; 20]);
		let b = EntityId::from_bytes([2u8; 20]);
		let mut account = AccountState::new(AccountKey::new(a, b));
		account.deltas.insert(1, crate::ledger::DeltaRow::new(1));
		account
	}

	#[test]
	fn propose_then_approve_locks_executor_and_holds() {
		let mut account = account_with_token();
		let ops = vec![SettlementOp::RawDiff { token_id: 1, left_diff: -100, right_diff: 100, collateral_diff: 0 }];
		settle_propose(&mut account, ops, true, 0, None, 1_000_000).unwrap();
		let nonce = settle_approve(&mut account, false, Hanko::empty(), 5, 1_000_000).unwrap();
		assert_eq!(nonce, 6);
		assert_eq!(account.holds.get(&1).unwrap().0, 100);
	}

	#[test]
	fn proposer_cannot_approve_own_workspace() {
		let mut account = account_with_token();
		let ops = vec![SettlementOp::RawDiff { token_id: 1, left_diff: -100, right_diff: 100, collateral_diff: 0 }];
		settle_propose(&mut account, ops, true, 0, None, 1_000_000).unwrap();
		let result = settle_approve(&mut account, true, Hanko::empty(), 5, 1_000_000);
		assert!(result.is_err());
	}

	#[test]
	fn execute_requires_counterparty_hanko_and_clears_holds() {
		let mut account = account_with_token();
		let ops = vec![SettlementOp::RawDiff { token_id: 1, left_diff: -100, right_diff: 100, collateral_diff: 0 }];
		settle_propose(&mut account, ops, true, 0, None, 1_000_000).unwrap();
		settle_approve(&mut account, false, Hanko::empty(), 5, 1_000_000).unwrap();
		let (diffs, _forgive, _hanko) = settle_execute(&mut account, 1_000_000).unwrap();
		assert_eq!(diffs[0].left_diff, -100);
		assert_eq!(account.holds.get(&1).unwrap().0, 0);
		assert!(account.settlement_workspace.is_none());
	}
}
