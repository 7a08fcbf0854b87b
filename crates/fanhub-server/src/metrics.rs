//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from a handle.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections admitted total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Registered WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections retired total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Handshakes refused total (counter, labels: reason).
pub const WS_ADMISSION_REJECTIONS_TOTAL: &str = "ws_admission_rejections_total";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Messages accepted into the intake queue (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Successful per-connection writes (counter).
pub const HUB_DELIVERIES_TOTAL: &str = "hub_deliveries_total";
/// Failed, timed out or panicked writes (counter, labels: kind).
pub const HUB_WRITE_FAILURES_TOTAL: &str = "hub_write_failures_total";
/// Messages discarded by the overflow policy (counter).
pub const HUB_INTAKE_DROPPED_TOTAL: &str = "hub_intake_dropped_total";
/// Duration of one dispatch pass (histogram).
pub const HUB_DISPATCH_DURATION_SECONDS: &str = "hub_dispatch_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn recorded_metric_is_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(HUB_BROADCASTS_TOTAL).increment(3);
        });
        assert!(render(&handle).contains("hub_broadcasts_total 3"));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_DISCONNECTIONS_TOTAL,
            WS_ADMISSION_REJECTIONS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            HUB_BROADCASTS_TOTAL,
            HUB_DELIVERIES_TOTAL,
            HUB_WRITE_FAILURES_TOTAL,
            HUB_INTAKE_DROPPED_TOTAL,
            HUB_DISPATCH_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
