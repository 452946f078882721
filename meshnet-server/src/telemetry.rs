//! Prometheus recorder installation — grounded on the teacher's
//! `telemetry.rs`, which does exactly this and nothing else.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn setup_prometheus() -> PrometheusHandle {
	PrometheusBuilder::new().install_recorder().expect("failed to install Prometheus recorder")
}
