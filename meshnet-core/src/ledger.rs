//! Per-token ledger primitives — spec §3 "deltas" / §8 quantified
//! invariants. Pure functions over numeric state; nothing here touches a
//! mempool, a frame, or the network.
//!
//! Sign convention: `delta = ondelta + offdelta` is signed from the left
//! side's perspective. A positive delta means the right side owes the left
//! side `delta`; a negative delta means the left side owes the right side
//! `-delta`. `leftCreditLimit` is the credit the *left* side extends to the
//! right (how far negative delta may go, together with collateral);
//! `rightCreditLimit` is the credit the right side extends to the left (how
//! far positive delta may go beyond collateral).

use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::ids::TokenId;
use meshnet_wire::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaRow {
	pub token_id: TokenId,
	pub ondelta: i128,
	pub offdelta: i128,
	pub collateral: u128,
	pub left_credit_limit: u128,
	pub right_credit_limit: u128,
	pub left_allowance: u128,
	pub right_allowance: u128,
}

impl DeltaRow {
	pub fn new(token_id: TokenId) -> Self {
		Self {
			token_id,
			ondelta: 0,
			offdelta: 0,
			collateral: 0,
			left_credit_limit: 0,
			right_credit_limit: 0,
			left_allowance: 0,
			right_allowance: 0,
		}
	}

	pub fn delta(&self) -> i128 {
		self.ondelta + self.offdelta
	}

	/// `ownCreditLimit + peerCreditLimit + collateral` from the left's
	/// perspective — spec §3 invariant.
	pub fn total_capacity(&self) -> u128 {
		self.left_credit_limit + self.right_credit_limit + self.collateral
	}

	/// Lower bound a delta may reach: `-rightCreditLimit`.
	pub fn delta_floor(&self) -> i128 {
		-(self.right_credit_limit as i128)
	}

	/// Upper bound a delta may reach: `leftCreditLimit + collateral`.
	pub fn delta_ceiling(&self) -> i128 {
		self.left_credit_limit as i128 + self.collateral as i128
	}

	pub fn check_invariant(&self) -> Result<(), MeshnetError> {
		let d = self.delta();
		if d < self.delta_floor() || d > self.delta_ceiling() {
			return Err(MeshnetError::invariant(format!(
				"token {} delta {} outside [{}, {}]",
				self.token_id,
				d,
				self.delta_floor(),
				self.delta_ceiling()
			)));
		}
		Ok(())
	}

	/// Capacity the left side may still send to the right without the
	/// delta dropping below its floor.
	pub fn left_available_to_send(&self) -> u128 {
		(self.delta() - self.delta_floor()).max(0) as u128
	}

	/// Capacity the right side may still send to the left.
	pub fn right_available_to_send(&self) -> u128 {
		(self.delta_ceiling() - self.delta()).max(0) as u128
	}

	pub fn available_to_send(&self, sender_is_left: bool) -> u128 {
		if sender_is_left {
			self.left_available_to_send()
		} else {
			self.right_available_to_send()
		}
	}

	/// Move `amount` off-chain from `sender` to the counterparty, i.e. the
	/// sender's available capacity shrinks by `amount`. Left sending moves
	/// delta down; right sending moves delta up.
	pub fn move_offdelta(&mut self, sender_is_left: bool, amount: u128) -> Result<(), MeshnetError> {
		let signed = amount as i128;
		let new_offdelta = if sender_is_left { self.offdelta - signed } else { self.offdelta + signed };
		let candidate = DeltaRow { offdelta: new_offdelta, ..*self };
		candidate.check_invariant()?;
		self.offdelta = new_offdelta;
		Ok(())
	}

	pub fn set_credit_limit(&mut self, side: Side, amount: u128) {
		match side {
			Side::Left => self.left_credit_limit = amount,
			Side::Right => self.right_credit_limit = amount,
		}
	}
}

/// `leftDiff + rightDiff + collateralDiff == 0` and `|component| <=
/// max_settlement_diff` — spec §8.
pub fn check_settlement_diff_conserves(
	left_diff: i128, right_diff: i128, collateral_diff: i128, max_settlement_diff: i128,
) -> Result<(), MeshnetError> {
	if left_diff + right_diff + collateral_diff != 0 {
		return Err(MeshnetError::new(
			ErrorCode::SettlementError,
			"Conservation law violated",
		));
	}
	for component in [left_diff, right_diff, collateral_diff] {
		if component.unsigned_abs() > max_settlement_diff.unsigned_abs() {
			return Err(MeshnetError::new(
				ErrorCode::SettlementError,
				"Settlement diff exceeds maximum",
			));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row() -> DeltaRow {
		DeltaRow {
			token_id: 1,
			ondelta: 0,
			offdelta: 0,
			collateral: 0,
			left_credit_limit: 1_000_000,
			right_credit_limit: 1_000_000,
			left_allowance: 0,
			right_allowance: 0,
		}
	}

	#[test]
	fn fresh_row_satisfies_invariant() {
		assert!(row().check_invariant().is_ok());
	}

	#[test]
	fn left_send_moves_delta_down_and_is_capacity_bounded() {
		let mut r = row();
		r.move_offdelta(true, 100_000).unwrap();
		assert_eq!(r.delta(), -100_000);
		assert!(r.move_offdelta(true, 10_000_000).is_err());
	}

	#[test]
	fn right_send_moves_delta_up() {
		let mut r = row();
		r.move_offdelta(false, 100_000).unwrap();
		assert_eq!(r.delta(), 100_000);
	}

	#[test]
	fn settlement_diff_must_conserve() {
		assert!(check_settlement_diff_conserves(100, -100, 0, 1_000_000).is_ok());
		assert!(check_settlement_diff_conserves(100, -50, 0, 1_000_000).is_err());
	}

	#[test]
	fn settlement_diff_respects_max_bound() {
		assert!(check_settlement_diff_conserves(2_000_000, -2_000_000, 0, 1_000_000).is_err());
	}
}
