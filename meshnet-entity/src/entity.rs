//! The entity orchestrator — spec §4.5. One `Entity` is one participant's
//! local view: its bilateral accounts, its jBatch, its swap orderbook, its
//! chat/proposal log. `apply_entity_tx` is the single dispatch point every
//! `EntityTx` variant goes through; `tick` drives the 100ms auto-propose
//! loop spec §4.1 describes.

use std::collections::{BTreeMap, VecDeque};

use meshnet_core::account::{AccountEvent, AccountState, ApplyContext, Lock};
use meshnet_core::dispute::{build_dispute_finalize, build_dispute_start, record_dispute_started, CallerRevealSet, FinalizeMode};
use meshnet_core::frame_consensus::{
	propose_frame, receive_account_ack, receive_account_input, HankoSigner, ProposalOutcome,
};
use meshnet_core::hashing::sha256_of_json;
use meshnet_core::htlc::{forward_lock_id, locks_due_for_timeout, plan_forward, HopProfile};
use meshnet_core::ledger::check_settlement_diff_conserves;
use meshnet_core::onion::{build_onion, decode_layer, CryptoProvider, HopPlan};
use meshnet_core::settlement::{settle_approve, settle_execute, settle_propose, settle_reject, settle_update};

use meshnet_wire::entity_tx::account_key_for;
use meshnet_wire::error::{ErrorCode, MeshnetError};
use meshnet_wire::events::{JEvent, SettlementRecord};
use meshnet_wire::frame::{AccountAck, AccountInput, Frame, Hanko};
use meshnet_wire::ids::{AccountKey, EntityId, Hash32, LockId, TimestampMs, TokenId};
use meshnet_wire::{account_tx::HtlcOutcome, AccountTx, EntityTx, Side};

use crate::adapters::{AccountInfo, GossipService, JurisdictionAdapter};
use crate::config::{EntityConfig, MAX_FILL_RATIO};
use crate::jbatch::{BatchContents, CollateralMove, CollateralMoveDirection, HashToSign, JBatchState, MintOp, ReserveTransfer};
use crate::orderbook::{order_key, Orderbook};

/// Ambient parameters the orchestrator needs but doesn't own.
#[derive(Debug, Clone, Copy)]
pub struct EntityApplyContext {
	pub now_ms: TimestampMs,
	pub j_height: u64,
}

impl EntityApplyContext {
	fn account_ctx(&self, max_settlement_diff: i128) -> ApplyContext {
		ApplyContext { now_ms: self.now_ms, max_settlement_diff }
	}
}

#[derive(Debug, Clone)]
pub enum EntityEvent {
	/// A frame this entity proposed, ready to hand to the counterparty.
	AccountInputReady(AccountInput),
	/// This entity's ACK of a counterparty's proposal, ready to send back.
	AccountAckReady(AccountAck),
	/// A jBatch hash that needs a quorum signature before submission.
	HashToSign(HashToSign),
	ChatLogged { from: Option<EntityId>, text: String },
	ProposalTallied { proposal_id: String, approved: bool },
}

#[derive(Debug, Clone, Default)]
struct ProposalState {
	body: serde_json::Value,
	votes: BTreeMap<EntityId, bool>,
}

/// One entity's complete local state — spec §4.5.
pub struct Entity {
	pub config: EntityConfig,
	entity_provider: EntityId,
	pub accounts: BTreeMap<AccountKey, AccountState>,
	pub reserves: BTreeMap<TokenId, u128>,
	pub jbatch: JBatchState,
	pub orderbook: Orderbook,
	/// Original lot size per resting orderbook entry, needed to turn a
	/// partial `Fill` back into a `fillRatio` against the maker's own offer.
	offer_lots: BTreeMap<String, u64>,
	/// (give_token_id, want_token_id) per resting offer, needed to find the
	/// right `Orderbook` pair book when cancelling.
	offer_pairs: BTreeMap<String, (TokenId, TokenId)>,
	pub chat_log: VecDeque<(Option<EntityId>, String)>,
	proposals: BTreeMap<String, ProposalState>,
	/// Outbound forward lock id -> (inbound counterparty, inbound lock id),
	/// used to propagate a resolution back along the route it arrived on.
	htlc_routes: BTreeMap<LockId, (EntityId, LockId)>,
	pub profile_alias: Option<String>,
	pub effective_base_fee: u128,
	pub last_finalized_j_height: u64,
}

const CHAT_LOG_CAPACITY: usize = 500;

/// Counter-dispute if the counterparty has a stored proof nonce past the
/// dispute's initial cooperative nonce — their contest path supersedes the
/// original. Otherwise falls back to unilateral, relying on the on-chain
/// timeout.
fn dispute_finalize_mode(account: &AccountState) -> FinalizeMode {
	let Some(dispute) = account.active_dispute.as_ref() else {
		return FinalizeMode::Unilateral;
	};
	let advanced = account.dispute_proof_nonces_by_hash.values().any(|&nonce| nonce > dispute.initial_cooperative_nonce);
	if advanced {
		FinalizeMode::CounterDispute
	} else {
		FinalizeMode::Unilateral
	}
}

impl Entity {
	pub fn new(config: EntityConfig) -> Self {
		let entity_provider = EntityId::from_bytes(
			config
				.jurisdiction
				.entity_provider_address
				.clone()
				.try_into()
				.expect("entity_provider_address must be 20 bytes"),
		);
		let effective_base_fee = config.base_fee;
		Self {
			config,
			entity_provider,
			accounts: BTreeMap::new(),
			reserves: BTreeMap::new(),
			jbatch: JBatchState::new(),
			orderbook: Orderbook::new(),
			offer_lots: BTreeMap::new(),
			offer_pairs: BTreeMap::new(),
			chat_log: VecDeque::new(),
			proposals: BTreeMap::new(),
			htlc_routes: BTreeMap::new(),
			profile_alias: None,
			effective_base_fee,
			last_finalized_j_height: 0,
		}
	}

	fn local_is_left(&self, counterparty: EntityId) -> bool {
		self.config.id < counterparty
	}

	fn account_mut(&mut self, counterparty: EntityId) -> &mut AccountState {
		let key = account_key_for(self.config.id, counterparty);
		self.accounts.entry(key).or_insert_with(|| {
			log::info!("auto-opening account {key:?} with {counterparty}");
			AccountState::new(key)
		})
	}

	fn account(&self, counterparty: EntityId) -> Option<&AccountState> {
		self.accounts.get(&account_key_for(self.config.id, counterparty))
	}

	/// spec §4.1 "100ms auto-propose tick": for every account whose turn it
	/// is and that has queued work, draft and sign the next frame.
	pub fn tick<S: HankoSigner>(&mut self, ctx: &EntityApplyContext, signer: &S) -> Vec<EntityEvent> {
		let mut out = Vec::new();
		let keys: Vec<AccountKey> = self.accounts.keys().copied().collect();
		for key in keys {
			let local_is_left = key.is_left(self.config.id);
			let account_ctx = self.account_ctx_for(key, ctx);
			let account = self.accounts.get_mut(&key).unwrap();
			match propose_frame(account, local_is_left, ctx.now_ms, ctx.j_height, signer, &account_ctx) {
				Ok(Some(ProposalOutcome { account_input, events })) => {
					let counterparty = key.counterparty(self.config.id);
					self.route_account_events(counterparty, events);
					out.push(EntityEvent::AccountInputReady(account_input));
				},
				Ok(None) => {},
				Err(e) => log::warn!("propose_frame failed for {key:?}: {e}"),
			}
		}
		out
	}

	fn account_ctx_for(&self, _key: AccountKey, ctx: &EntityApplyContext) -> ApplyContext {
		ApplyContext { now_ms: ctx.now_ms, max_settlement_diff: self.config.max_settlement_diff }
	}

	/// Re-homes [`AccountEvent`]s produced by a committed frame: continues
	/// multi-hop direct payments, propagates HTLC resolutions back along
	/// their inbound leg, and tracks J-height finalization.
	fn route_account_events(&mut self, counterparty: EntityId, events: Vec<AccountEvent>) {
		for ev in events {
			match ev {
				AccountEvent::PendingForward { token_id, amount, next_hop, remaining_route, description } => {
					if self.config.skip_pending_forward || next_hop != self.config.id {
						continue;
					}
					let forward_to = remaining_route.get(1).copied();
					let Some(forward_to) = forward_to else { continue };
					self.account_mut(forward_to).mempool.push_back(AccountTx::DirectPayment {
						token_id,
						amount,
						route: remaining_route,
						from: self.config.id,
						to: forward_to,
						description,
					});
				},
				AccountEvent::LockResolved { lock_id, outcome, secret, reason, .. } => {
					if let Some((inbound_counterparty, inbound_lock_id)) = self.htlc_routes.remove(&lock_id) {
						self.account_mut(inbound_counterparty).mempool.push_back(AccountTx::HtlcResolve {
							lock_id: inbound_lock_id,
							outcome,
							secret,
							reason,
						});
					}
				},
				AccountEvent::JHeightFinalized { j_height } => {
					self.last_finalized_j_height = self.last_finalized_j_height.max(j_height);
				},
				AccountEvent::LockCommitted { .. } | AccountEvent::SwapFilled { .. } | AccountEvent::WithdrawalRequested { .. } => {},
			}
			let _ = counterparty;
		}
	}

	/// Scans a just-committed frame's txs for inbound HTLC locks addressed
	/// to this entity, auto-redeeming final-hop locks and forwarding
	/// intermediate ones — spec §4.2 steps 1-4.
	fn process_committed_frame(&mut self, counterparty: EntityId, frame: &Frame, crypto: &dyn CryptoProvider) {
		let key = account_key_for(self.config.id, counterparty);
		let local_is_left = key.is_left(self.config.id);
		let profile =
			HopProfile { base_fee: self.effective_base_fee, min_forward_timelock_margin_ms: 1_000, min_forward_height_margin: 1 };

		for tx in &frame.account_txs {
			let AccountTx::HtlcLock { lock_id, hashlock, timelock_ms, reveal_before_height, amount, token_id, sender_is_left, envelope } =
				tx
			else {
				continue;
			};
			let we_are_receiver = local_is_left != *sender_is_left;
			if !we_are_receiver {
				continue;
			}
			let Some(envelope) = envelope else { continue };
			let decoded = match decode_layer(crypto, envelope) {
				Ok(d) => d,
				Err(e) => {
					log::warn!("htlc envelope decode failed for lock {lock_id}: {e}");
					continue;
				},
			};
			if decoded.final_recipient {
				if decoded.amount != *amount || decoded.hashlock != *hashlock {
					log::warn!("final hop htlc {lock_id} envelope does not match lock");
					continue;
				}
				self.account_mut(counterparty).mempool.push_back(AccountTx::HtlcResolve {
					lock_id: lock_id.clone(),
					outcome: HtlcOutcome::Secret,
					secret: decoded.secret,
					reason: None,
				});
				continue;
			}
			if self.config.skip_pending_forward {
				continue;
			}
			let lock = Lock {
				lock_id: lock_id.clone(),
				hashlock: *hashlock,
				timelock_ms: *timelock_ms,
				reveal_before_height: *reveal_before_height,
				amount: *amount,
				token_id: *token_id,
				sender_is_left: *sender_is_left,
				has_envelope: true,
			};
			match plan_forward(crypto, &lock, envelope, &profile, 0, self.last_finalized_j_height) {
				Ok(plan) => {
					let outbound_lock_id = forward_lock_id(lock_id);
					self.htlc_routes.insert(outbound_lock_id.clone(), (counterparty, lock_id.clone()));
					let outbound_key = account_key_for(self.config.id, plan.next_hop);
					let outbound_sender_is_left = outbound_key.is_left(self.config.id);
					self.account_mut(plan.next_hop).mempool.push_back(AccountTx::HtlcLock {
						lock_id: outbound_lock_id,
						hashlock: *hashlock,
						timelock_ms: plan.forward_timelock,
						reveal_before_height: plan.forward_height,
						amount: plan.forward_amount,
						token_id: *token_id,
						sender_is_left: outbound_sender_is_left,
						envelope: Some(plan.inner_envelope),
					});
				},
				Err(e) => log::warn!("could not forward htlc {lock_id}: {e}"),
			}
		}
	}

	pub async fn apply_entity_tx<S: HankoSigner>(
		&mut self, from: EntityId, tx: EntityTx, ctx: &EntityApplyContext, jurisdiction: &dyn JurisdictionAdapter,
		gossip: &dyn GossipService, crypto: &dyn CryptoProvider, signer: &S,
	) -> Result<Vec<EntityEvent>, MeshnetError> {
		match tx {
			EntityTx::Chat { text } => {
				self.push_chat(Some(from), text.clone());
				Ok(vec![EntityEvent::ChatLogged { from: Some(from), text }])
			},

			EntityTx::ChatMessage { from: sender, text } => {
				self.push_chat(Some(sender), text.clone());
				Ok(vec![EntityEvent::ChatLogged { from: Some(sender), text }])
			},

			EntityTx::Propose { proposal_id, body } => {
				self.proposals.insert(proposal_id, ProposalState { body, votes: BTreeMap::new() });
				Ok(vec![])
			},

			EntityTx::Vote { proposal_id, approve } => {
				let proposal = self
					.proposals
					.get_mut(&proposal_id)
					.ok_or_else(|| MeshnetError::new(ErrorCode::InvalidRequest, "unknown proposal"))?;
				proposal.votes.insert(from, approve);
				let approvals = proposal.votes.values().filter(|v| **v).count() as u32;
				if approvals >= self.config.quorum.threshold {
					let approved = true;
					self.proposals.remove(&proposal_id);
					return Ok(vec![EntityEvent::ProposalTallied { proposal_id, approved }]);
				}
				Ok(vec![])
			},

			EntityTx::ProfileUpdate { alias, base_fee } => {
				if let Some(alias) = alias {
					self.profile_alias = Some(alias);
				}
				if let Some(fee) = base_fee {
					self.effective_base_fee = fee;
				}
				Ok(vec![])
			},

			EntityTx::InitOrderbookExt { pairs } => {
				log::info!("orderbook extended with {} pair(s)", pairs.len());
				Ok(vec![])
			},

			EntityTx::JEvent { j_height, event } => {
				self.apply_j_event(j_height, event, ctx);
				Ok(vec![])
			},

			EntityTx::AccountInput { input } => {
				let key = input.account;
				let local_is_left = key.is_left(self.config.id);
				let account = self.accounts.entry(key).or_insert_with(|| AccountState::new(key));
				let account_ctx = ApplyContext { now_ms: ctx.now_ms, max_settlement_diff: self.config.max_settlement_diff };
				let receive = receive_account_input(account, &input, signer, &account_ctx)?;
				let committed_frame = account.current_frame.clone().expect("commit stores current_frame");
				let counterparty = key.counterparty(self.config.id);
				self.route_account_events(counterparty, receive.events);
				self.process_committed_frame(counterparty, &committed_frame, crypto);
				let _ = local_is_left;
				Ok(vec![EntityEvent::AccountAckReady(receive.ack)])
			},

			EntityTx::AccountAck { ack } => {
				let key = ack.account;
				let account = self
					.accounts
					.get_mut(&key)
					.ok_or_else(|| MeshnetError::new(ErrorCode::InvalidRequest, "no such account"))?;
				let events = receive_account_ack(account, &ack)?;
				let committed_frame = account.current_frame.clone().expect("commit stores current_frame");
				let counterparty = key.counterparty(self.config.id);
				self.route_account_events(counterparty, events);
				self.process_committed_frame(counterparty, &committed_frame, crypto);
				Ok(vec![])
			},

			EntityTx::OpenAccount { counterparty } => {
				self.account_mut(counterparty);
				Ok(vec![])
			},

			EntityTx::HtlcPayment { target, token_id, amount, route, hashlock, secret } => {
				let secret = secret
					.ok_or_else(|| MeshnetError::new(ErrorCode::InvalidRequest, "htlc_payment requires a secret to embed"))?;
				let route_entities = route
					.or_else(|| gossip.find_route(self.config.id, target))
					.ok_or_else(|| MeshnetError::new(ErrorCode::RoutingError, "no route to target"))?;
				if route_entities.first() != Some(&self.config.id) || route_entities.len() < 2 {
					return Err(MeshnetError::new(ErrorCode::RoutingError, "malformed route"));
				}
				let mut amounts = vec![amount; route_entities.len()];
				for i in (0..route_entities.len() - 1).rev() {
					let hop_entity = route_entities[i + 1];
					let fee = if i + 1 == route_entities.len() - 1 { 0 } else { gossip.profile_of(hop_entity).map(|p| p.base_fee).unwrap_or(0) };
					amounts[i] = amounts[i + 1] + fee;
				}
				let hops: Vec<HopPlan> =
					route_entities.iter().zip(amounts.iter()).map(|(e, a)| HopPlan { entity: *e, amount: *a }).collect();
				let envelope = build_onion(crypto, &hops, token_id, hashlock, secret)?;
				let next_hop = route_entities[1];
				let outbound_key = account_key_for(self.config.id, next_hop);
				let sender_is_left = outbound_key.is_left(self.config.id);
				let lock_id = format!("htlc-{}-{}", self.config.id.short(), hashlock);
				self.account_mut(next_hop).mempool.push_back(AccountTx::HtlcLock {
					lock_id,
					hashlock,
					timelock_ms: meshnet_core::htlc::compute_timelock(ctx.now_ms, route_entities.len() - 1),
					reveal_before_height: meshnet_core::htlc::compute_reveal_before_height(self.last_finalized_j_height),
					amount: amounts[0],
					token_id,
					sender_is_left,
					envelope: Some(envelope),
				});
				Ok(vec![])
			},

			EntityTx::ProcessHtlcTimeouts { now_ms, last_finalized_j_height } => {
				let keys: Vec<AccountKey> = self.accounts.keys().copied().collect();
				for key in keys {
					let account = self.accounts.get_mut(&key).unwrap();
					let due = locks_due_for_timeout(account.locks.values(), now_ms, last_finalized_j_height);
					for lock_id in due {
						account.mempool.push_back(AccountTx::HtlcTimeout { lock_id });
					}
				}
				Ok(vec![])
			},

			EntityTx::ManualHtlcLock { counterparty, lock_id, hashlock, timelock_ms, reveal_before_height, amount, token_id } => {
				let sender_is_left = self.local_is_left(counterparty);
				self.account_mut(counterparty).mempool.push_back(AccountTx::HtlcLock {
					lock_id,
					hashlock,
					timelock_ms,
					reveal_before_height,
					amount,
					token_id,
					sender_is_left,
					envelope: None,
				});
				Ok(vec![])
			},

			EntityTx::DirectPayment { target, token_id, amount, route, description } => {
				let route_entities = route.or_else(|| gossip.find_route(self.config.id, target)).unwrap_or_else(|| vec![self.config.id, target]);
				if route_entities.first() != Some(&self.config.id) || route_entities.len() < 2 {
					return Err(MeshnetError::new(ErrorCode::RoutingError, "malformed route"));
				}
				let next_hop = route_entities[1];
				self.account_mut(next_hop).mempool.push_back(AccountTx::DirectPayment {
					token_id,
					amount,
					route: route_entities,
					from: self.config.id,
					to: next_hop,
					description,
				});
				Ok(vec![])
			},

			EntityTx::DepositCollateral { counterparty, token_id, amount } => {
				self.jbatch.current.collateral_moves.push(CollateralMove {
					counterparty,
					token_id,
					amount,
					direction: CollateralMoveDirection::ReserveToCollateral,
				});
				Ok(vec![])
			},

			EntityTx::ReserveToReserve { to, token_id, amount } => {
				let bal = self.reserves.entry(token_id).or_insert(0);
				if *bal < amount {
					return Err(MeshnetError::new(ErrorCode::InvalidRequest, "insufficient reserve"));
				}
				*bal -= amount;
				self.jbatch.current.reserve_transfers.push(ReserveTransfer { to, token_id, amount });
				Ok(vec![])
			},

			EntityTx::JBroadcast => {
				let mut to_finalize_check = Vec::new();
				for d in &self.jbatch.current.dispute_starts {
					to_finalize_check.push(d.proofbody_hash);
				}
				let mut finalized = BTreeMap::new();
				for hash in to_finalize_check {
					let result = jurisdiction.is_dispute_finalized(hash).await?;
					finalized.insert(hash, result);
				}
				self.jbatch.preflight_dispute_finalizations(|h| finalized.get(&h).copied().flatten());
				let to_sign =
					self.jbatch.broadcast(self.config.jurisdiction.chain_id, &self.config.jurisdiction.depository_address, ctx.now_ms)?;
				Ok(vec![EntityEvent::HashToSign(to_sign)])
			},

			EntityTx::JRebroadcast { gas_bump_bps } => {
				let _ = gas_bump_bps;
				let to_sign = self.jbatch.rebroadcast()?;
				Ok(vec![EntityEvent::HashToSign(to_sign)])
			},

			EntityTx::JClearBatch => {
				self.jbatch.clear_current();
				Ok(vec![])
			},

			EntityTx::JAbortSentBatch { requeue } => {
				self.jbatch.abort_sent(requeue)?;
				Ok(vec![])
			},

			EntityTx::MintReserves { token_id, amount } => {
				*self.reserves.entry(token_id).or_insert(0) += amount;
				self.jbatch.current.mints.push(MintOp { token_id, amount });
				Ok(vec![])
			},

			EntityTx::CreateSettlement { counterparty, diffs, forgive_token_ids, memo } => {
				let _ = memo;
				self.queue_settlement_record(counterparty, diffs, forgive_token_ids)?;
				Ok(vec![])
			},

			EntityTx::ExtendCredit { counterparty, token_id, amount } => {
				let side = if self.local_is_left(counterparty) { Side::Left } else { Side::Right };
				self.account_mut(counterparty).mempool.push_back(AccountTx::SetCreditLimit { token_id, side, amount });
				Ok(vec![])
			},

			EntityTx::PlaceSwapOffer { counterparty, give_token_id, give_amount, want_token_id, want_amount, min_fill_ratio } => {
				let offer_id = format!("offer-{}-{}", counterparty.short(), self.jbatch.entity_nonce);
				let maker_is_left = self.local_is_left(counterparty);
				self.account_mut(counterparty).mempool.push_back(AccountTx::SwapOffer {
					offer_id: offer_id.clone(),
					maker_is_left,
					give_token_id,
					give_amount,
					want_token_id,
					want_amount,
					min_fill_ratio,
				});
				// A give_amount that isn't a whole number of lots is rejected at
				// orderbook entry: the bilateral swap_offer still queues, but the
				// hub book never sees it and it can never match.
				if let Some(fills) = self.orderbook.place(counterparty, offer_id.clone(), give_token_id, give_amount, want_token_id, want_amount, min_fill_ratio) {
					let key = order_key(counterparty, &offer_id);
					self.offer_lots.insert(key.clone(), crate::orderbook::to_lots(give_amount));
					self.offer_pairs.insert(key, (give_token_id, want_token_id));
					self.apply_orderbook_fills(fills);
				} else {
					log::warn!("swap offer {offer_id} give_amount {give_amount} is not lot-aligned, skipped at orderbook entry");
				}
				Ok(vec![])
			},

			EntityTx::ResolveSwap { counterparty, offer_id, fill_ratio, cancel_remainder } => {
				self.account_mut(counterparty).mempool.push_back(AccountTx::SwapResolve { offer_id, fill_ratio, cancel_remainder });
				Ok(vec![])
			},

			EntityTx::FillSwapOffer { counterparty, offer_id } => {
				self.account_mut(counterparty).mempool.push_back(AccountTx::SwapResolve {
					offer_id,
					fill_ratio: MAX_FILL_RATIO as u16,
					cancel_remainder: false,
				});
				Ok(vec![])
			},

			EntityTx::CancelSwapOffer { counterparty, offer_id } => {
				self.account_mut(counterparty).mempool.push_back(AccountTx::SwapCancel { offer_id: offer_id.clone() });
				let key = order_key(counterparty, &offer_id);
				if let Some((give_token_id, want_token_id)) = self.offer_pairs.remove(&key) {
					self.orderbook.cancel(give_token_id, want_token_id, &key);
				}
				self.offer_lots.remove(&key);
				Ok(vec![])
			},

			EntityTx::RequestWithdrawal { counterparty, token_id, amount, request_id } => {
				self.account_mut(counterparty).mempool.push_back(AccountTx::RequestWithdrawal { token_id, amount, request_id });
				Ok(vec![])
			},

			EntityTx::SettleDiffs { counterparty, diffs } => {
				self.queue_settlement_record(counterparty, diffs, vec![])?;
				Ok(vec![])
			},

			EntityTx::SettlePropose { counterparty, ops, memo } => {
				let proposer_is_left = self.local_is_left(counterparty);
				let max_settlement_diff = self.config.max_settlement_diff;
				let account = self.account_mut(counterparty);
				settle_propose(account, ops, proposer_is_left, ctx.now_ms, memo, max_settlement_diff)?;
				Ok(vec![])
			},

			EntityTx::SettleUpdate { counterparty, ops, memo } => {
				let _ = memo;
				let modifier_is_left = self.local_is_left(counterparty);
				let max_settlement_diff = self.config.max_settlement_diff;
				let account = self.account_mut(counterparty);
				settle_update(account, ops, modifier_is_left, None, ctx.now_ms, max_settlement_diff)?;
				Ok(vec![])
			},

			EntityTx::SettleApprove { counterparty } => {
				let approver_is_left = self.local_is_left(counterparty);
				let max_settlement_diff = self.config.max_settlement_diff;
				let nonce = self.account(counterparty).map(|a| a.on_chain_settlement_nonce).unwrap_or(0);
				let hanko = signer.sign(Hash32::ZERO);
				let account = self.account_mut(counterparty);
				settle_approve(account, approver_is_left, hanko, nonce, max_settlement_diff)?;
				Ok(vec![])
			},

			EntityTx::SettleExecute { counterparty, counterparty_hanko: _ } => {
				let max_settlement_diff = self.config.max_settlement_diff;
				let account = self.account_mut(counterparty);
				let (diffs, forgive_token_ids, counterparty_hanko) = settle_execute(account, max_settlement_diff)?;
				let key = account_key_for(self.config.id, counterparty);
				let nonce = account.on_chain_settlement_nonce + 1;
				let wire_diffs = diffs
					.into_iter()
					.map(|d| meshnet_wire::account_tx::SettlementDiff {
						token_id: d.token_id,
						left_diff: d.left_diff,
						right_diff: d.right_diff,
						collateral_diff: d.collateral_diff,
					})
					.collect();
				self.jbatch.current.settlements.push(SettlementRecord {
					left_entity: key.left,
					right_entity: key.right,
					diffs: wire_diffs,
					forgive_token_ids,
					hanko: counterparty_hanko,
					entity_provider: self.entity_provider,
					nonce,
				});
				Ok(vec![])
			},

			EntityTx::SettleReject { counterparty } => {
				let account = self.account_mut(counterparty);
				settle_reject(account)?;
				Ok(vec![])
			},

			EntityTx::DisputeStart { counterparty } => {
				let local_is_left = self.local_is_left(counterparty);
				let account = self
					.accounts
					.get(&account_key_for(self.config.id, counterparty))
					.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no account with counterparty"))?;
				let reveal = CallerRevealSet::default();
				let start = build_dispute_start(account, local_is_left, &reveal)?;
				let account = self.account_mut(counterparty);
				record_dispute_started(account, local_is_left, start.proofbody_hash, start.initial_arguments.clone())?;
				self.jbatch.current.dispute_starts.push(start);
				Ok(vec![])
			},

			EntityTx::DisputeFinalize { counterparty } => {
				let local_is_left = self.local_is_left(counterparty);
				let account = self
					.accounts
					.get(&account_key_for(self.config.id, counterparty))
					.ok_or_else(|| MeshnetError::new(ErrorCode::DisputeError, "no account with counterparty"))?;
				let mode = dispute_finalize_mode(account);
				let reveal = CallerRevealSet::default();
				let finalize = build_dispute_finalize(account, local_is_left, mode, vec![], &reveal)?;
				self.jbatch.current.dispute_finalizations.push(finalize);
				Ok(vec![])
			},
		}
	}

	fn push_chat(&mut self, from: Option<EntityId>, text: String) {
		self.chat_log.push_back((from, text));
		while self.chat_log.len() > CHAT_LOG_CAPACITY {
			self.chat_log.pop_front();
		}
	}

	fn queue_settlement_record(
		&mut self, counterparty: EntityId, diffs: Vec<meshnet_wire::account_tx::SettlementDiff>, forgive_token_ids: Vec<TokenId>,
	) -> Result<(), MeshnetError> {
		for d in &diffs {
			check_settlement_diff_conserves(d.left_diff, d.right_diff, d.collateral_diff, self.config.max_settlement_diff)?;
		}
		let key = account_key_for(self.config.id, counterparty);
		let nonce = self.accounts.get(&key).map(|a| a.on_chain_settlement_nonce + 1).unwrap_or(1);
		self.jbatch.current.settlements.push(SettlementRecord {
			left_entity: key.left,
			right_entity: key.right,
			diffs,
			forgive_token_ids,
			hanko: Hanko::empty(),
			entity_provider: self.entity_provider,
			nonce,
		});
		Ok(())
	}

	/// Turns orderbook [`crate::orderbook::Fill`]s into bilateral
	/// `swap_resolve` mempool entries on each affected maker's own account.
	fn apply_orderbook_fills(&mut self, fills: Vec<crate::orderbook::Fill>) {
		for fill in fills {
			let key = order_key(fill.counterparty, &fill.offer_id);
			let original_lots = self.offer_lots.get(&key).copied().unwrap_or(fill.filled_lots.max(1));
			let fill_ratio = if fill.cancel_remainder && fill.filled_lots == 0 {
				0
			} else {
				((fill.filled_lots as u128) * (MAX_FILL_RATIO as u128) / (original_lots.max(1) as u128)) as u16
			};
			if fill.filled_lots > 0 {
				self.account_mut(fill.counterparty).mempool.push_back(AccountTx::SwapResolve {
					offer_id: fill.offer_id,
					fill_ratio,
					cancel_remainder: fill.cancel_remainder,
				});
			}
			if fill.cancel_remainder {
				self.offer_lots.remove(&key);
				self.offer_pairs.remove(&key);
			}
		}
	}

	fn apply_j_event(&mut self, j_height: u64, event: JEvent, ctx: &EntityApplyContext) {
		match event {
			JEvent::HankoBatchProcessed { entity, nonce } => {
				if entity == self.config.id {
					self.jbatch.record_hanko_batch_processed(nonce);
				}
			},
			JEvent::ReserveUpdated { entity, token_id, new_amount } => {
				if entity == self.config.id {
					self.reserves.insert(token_id, new_amount);
				}
			},
			JEvent::DisputeStarted { left, right, dispute_until_block, .. } => {
				if left != self.config.id && right != self.config.id {
					return;
				}
				let counterparty = if left == self.config.id { right } else { left };
				if let Some(account) = self.accounts.get_mut(&account_key_for(self.config.id, counterparty)) {
					if let Some(dispute) = account.active_dispute.as_mut() {
						dispute.dispute_timeout = Some(dispute_until_block);
					}
				}
			},
			JEvent::DisputeFinalized { left, right, .. } => {
				if left != self.config.id && right != self.config.id {
					return;
				}
				let counterparty = if left == self.config.id { right } else { left };
				if let Some(account) = self.accounts.get_mut(&account_key_for(self.config.id, counterparty)) {
					account.active_dispute = None;
				}
			},
			JEvent::SettlementProcessed { left, right, nonce, .. } => {
				if left != self.config.id && right != self.config.id {
					return;
				}
				let counterparty = if left == self.config.id { right } else { left };
				if let Some(account) = self.accounts.get_mut(&account_key_for(self.config.id, counterparty)) {
					account.on_chain_settlement_nonce = account.on_chain_settlement_nonce.max(nonce);
				}
			},
			JEvent::CollateralUpdated { left, right, token_id, new_collateral, new_ondelta } => {
				if left != self.config.id && right != self.config.id {
					return;
				}
				let counterparty = if left == self.config.id { right } else { left };
				if let Some(account) = self.accounts.get_mut(&account_key_for(self.config.id, counterparty)) {
					if let Some(row) = account.deltas.get_mut(&token_id) {
						row.collateral = new_collateral;
						row.ondelta = new_ondelta;
					}
				}
			},
			JEvent::BlockTip { block_number } => {
				log::debug!("j-block tip advanced to {block_number}");
			},
		}
		let _ = j_height;
		let _ = ctx;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::adapters::{MockJurisdiction, StaticGossip, XorCryptoProvider};

	fn entity_id(n: u8) -> EntityId {
		EntityId::from_bytes([n; 20])
	}

	fn test_config(id: EntityId) -> EntityConfig {
		EntityConfig {
			id,
			jurisdiction: crate::config::JurisdictionConfig {
				chain_id: 1,
				depository_address: vec![0xAA; 20],
				entity_provider_address: vec![0xBB; 20],
			},
			quorum: crate::config::QuorumConfig { validators: vec![id], threshold: 1 },
			base_fee: 10,
			dispute: meshnet_core::account::DisputeConfig::default(),
			htlc: crate::config::HtlcConfig::default(),
			max_settlement_diff: 1_000_000_000,
			skip_pending_forward: false,
		}
	}

	fn empty_signer(_: Hash32) -> Hanko {
		Hanko::empty()
	}

	#[tokio::test]
	async fn open_account_then_extend_credit_queues_mempool_entry() {
		let a = entity_id(1);
		let b = entity_id(2);
		let mut entity = Entity::new(test_config(a));
		let jurisdiction = MockJurisdiction::new();
		let gossip = StaticGossip::new();
		let crypto = XorCryptoProvider { own: a };
		let ctx = EntityApplyContext { now_ms: 0, j_height: 0 };

		entity
			.apply_entity_tx(a, EntityTx::OpenAccount { counterparty: b }, &ctx, &jurisdiction, &gossip, &crypto, &empty_signer)
			.await
			.unwrap();
		entity
			.apply_entity_tx(
				a,
				EntityTx::ExtendCredit { counterparty: b, token_id: 1, amount: 500 },
				&ctx,
				&jurisdiction,
				&gossip,
				&crypto,
				&empty_signer,
			)
			.await
			.unwrap();

		let account = entity.account(b).unwrap();
		assert_eq!(account.mempool.len(), 1);
	}

	#[tokio::test]
	async fn jbroadcast_produces_hash_to_sign_and_clears_current_batch() {
		let a = entity_id(1);
		let mut entity = Entity::new(test_config(a));
		let jurisdiction = MockJurisdiction::new();
		let gossip = StaticGossip::new();
		let crypto = XorCryptoProvider { own: a };
		let ctx = EntityApplyContext { now_ms: 0, j_height: 0 };

		entity
			.apply_entity_tx(a, EntityTx::MintReserves { token_id: 1, amount: 1_000 }, &ctx, &jurisdiction, &gossip, &crypto, &empty_signer)
			.await
			.unwrap();
		let events = entity
			.apply_entity_tx(a, EntityTx::JBroadcast, &ctx, &jurisdiction, &gossip, &crypto, &empty_signer)
			.await
			.unwrap();
		assert!(matches!(events[0], EntityEvent::HashToSign(_)));
		assert!(entity.jbatch.current.is_empty());
		assert!(entity.jbatch.sent.is_some());
	}
}
