//! Prometheus text-exposition metrics — grounded on the teacher's
//! `util/metrics.rs` `IntGauge`/`Metrics`/`gather_metrics()` pattern, re-scored
//! for an entity's own health signals instead of a Lightning node's.

use std::sync::atomic::{AtomicI64, Ordering};

use meshnet_entity::entity::Entity;

pub struct IntGauge {
	value: AtomicI64,
}

impl IntGauge {
	pub fn new() -> Self {
		Self { value: AtomicI64::new(0) }
	}

	pub fn set(&self, v: i64) {
		self.value.store(v, Ordering::Relaxed);
	}

	pub fn get(&self) -> i64 {
		self.value.load(Ordering::Relaxed)
	}
}

impl Default for IntGauge {
	fn default() -> Self {
		Self::new()
	}
}

struct MetricsOutput {
	name: &'static str,
	help_text: &'static str,
	metric_type: &'static str,
	value: i64,
}

pub struct Metrics {
	entity_health_score: IntGauge,
	open_account_count: IntGauge,
	active_dispute_count: IntGauge,
	jbatch_in_flight: IntGauge,
}

impl Metrics {
	pub fn new() -> Self {
		Self {
			entity_health_score: IntGauge::new(),
			open_account_count: IntGauge::new(),
			active_dispute_count: IntGauge::new(),
			jbatch_in_flight: IntGauge::new(),
		}
	}

	/// Refreshes every gauge from the current entity state. Called once per
	/// tick, same cadence the teacher updates its own health score on.
	pub fn update(&self, entity: &Entity) {
		let open_accounts = entity.accounts.len();
		let disputes = entity.accounts.values().filter(|a| a.active_dispute.is_some()).count();
		let jbatch_in_flight = entity.jbatch.sent.is_some() as i64;

		self.open_account_count.set(open_accounts as i64);
		self.active_dispute_count.set(disputes as i64);
		self.jbatch_in_flight.set(jbatch_in_flight);
		self.entity_health_score.set(compute_health_score(open_accounts, disputes) as i64);
	}

	/// Pushes the current gauge values into the globally installed
	/// `metrics` recorder (the teacher wires up `metrics_exporter_prometheus`
	/// the same way — `telemetry::setup_prometheus`), so `/metrics` can
	/// render through the real exporter instead of `gather`'s hand-rolled text.
	pub fn publish_to_recorder(&self) {
		metrics::gauge!("meshnet_entity_health_score").set(self.entity_health_score.get() as f64);
		metrics::gauge!("meshnet_open_account_count").set(self.open_account_count.get() as f64);
		metrics::gauge!("meshnet_active_dispute_count").set(self.active_dispute_count.get() as f64);
		metrics::gauge!("meshnet_jbatch_in_flight").set(self.jbatch_in_flight.get() as f64);
	}

	/// Hand-rolled text exposition, kept for tests and as a fallback if the
	/// recorder somehow isn't installed.
	pub fn gather(&self) -> String {
		let outputs = vec![
			MetricsOutput {
				name: "meshnet_entity_health_score",
				help_text: "Overall entity health score out of 100.",
				metric_type: "gauge",
				value: self.entity_health_score.get(),
			},
			MetricsOutput {
				name: "meshnet_open_account_count",
				help_text: "Number of bilateral accounts this entity currently has open.",
				metric_type: "gauge",
				value: self.open_account_count.get(),
			},
			MetricsOutput {
				name: "meshnet_active_dispute_count",
				help_text: "Number of accounts with an active dispute.",
				metric_type: "gauge",
				value: self.active_dispute_count.get(),
			},
			MetricsOutput {
				name: "meshnet_jbatch_in_flight",
				help_text: "1 if a jBatch is awaiting on-chain confirmation, else 0.",
				metric_type: "gauge",
				value: self.jbatch_in_flight.get(),
			},
		];
		format_metrics_output(&outputs)
	}
}

impl Default for Metrics {
	fn default() -> Self {
		Self::new()
	}
}

/// Base 100, minus 40 per active dispute (capped) and minus 10 if this
/// entity has no open accounts at all (nothing useful it can do yet).
fn compute_health_score(open_accounts: usize, active_disputes: usize) -> i64 {
	let mut score: i64 = 100;
	if open_accounts == 0 {
		score -= 10;
	}
	score -= (active_disputes as i64) * 40;
	score.max(0)
}

fn format_metrics_output(outputs: &[MetricsOutput]) -> String {
	let mut out = String::new();
	for o in outputs {
		out.push_str(&format!("# HELP {} {}\n", o.name, o.help_text));
		out.push_str(&format!("# TYPE {} {}\n", o.name, o.metric_type));
		out.push_str(&format!("{} {}\n", o.name, o.value));
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn healthy_entity_scores_full_marks() {
		assert_eq!(compute_health_score(3, 0), 100);
	}

	#[test]
	fn no_open_accounts_docks_ten() {
		assert_eq!(compute_health_score(0, 0), 90);
	}

	#[test]
	fn disputes_dock_forty_each_and_floor_at_zero() {
		assert_eq!(compute_health_score(1, 1), 60);
		assert_eq!(compute_health_score(1, 5), 0);
	}

	#[test]
	fn gather_formats_prometheus_text_exposition() {
		let metrics = Metrics::new();
		metrics.entity_health_score.set(88);
		let text = metrics.gather();
		assert!(text.contains("# TYPE meshnet_entity_health_score gauge"));
		assert!(text.contains("meshnet_entity_health_score 88"));
	}
}
