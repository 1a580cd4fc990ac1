//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle `/metrics` renders from. Call once at startup, before
/// any metric is recorded; a second call fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric names, shared by every call site.

/// WebSocket connections accepted (counter).
pub const CONNECTIONS_TOTAL: &str = "courier_connections_total";
/// WebSocket sessions torn down (counter).
pub const DISCONNECTIONS_TOTAL: &str = "courier_disconnections_total";
/// Live WebSocket connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "courier_connections_active";
/// Session lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "courier_connection_duration_seconds";
/// Sessions closed for missing heartbeats (counter).
pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "courier_heartbeat_timeouts_total";
/// Upgrades refused with 503 (counter).
pub const CONNECTIONS_REJECTED_TOTAL: &str = "courier_connections_rejected_total";
/// Successful `register` events (counter).
pub const REGISTRATIONS_TOTAL: &str = "courier_registrations_total";
/// `send_message` events queued to at least one connection (counter).
pub const MESSAGES_RELAYED_TOTAL: &str = "courier_messages_relayed_total";
/// `receive_message` frames queued to recipients (counter).
pub const DELIVERIES_TOTAL: &str = "courier_deliveries_total";
/// `send_message` events addressed to an empty group (counter).
pub const MESSAGES_DROPPED_TOTAL: &str = "courier_messages_dropped_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const FRAMES_DROPPED_TOTAL: &str = "courier_frames_dropped_total";
/// `message_delivered` events received (counter).
pub const ACKNOWLEDGMENTS_TOTAL: &str = "courier_acknowledgments_total";
/// Frames answered with an `error` event (counter, labels: code).
pub const REJECTED_FRAMES_TOTAL: &str = "courier_rejected_frames_total";

#[cfg(test)]
pub(crate) mod testing {
    use metrics_exporter_prometheus::PrometheusBuilder;

    /// Run `f` against a thread-local recorder and return its rendered output.
    pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let out = metrics::with_local_recorder(&recorder, f);
        (out, handle.render())
    }

    /// Sum of every series of `name` in Prometheus text output.
    pub(crate) fn value(rendered: &str, name: &str) -> u64 {
        rendered
            .lines()
            .filter(|line| {
                line.strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with('{'))
            })
            .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
            .sum::<f64>() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            CONNECTIONS_TOTAL,
            DISCONNECTIONS_TOTAL,
            CONNECTIONS_ACTIVE,
            CONNECTION_DURATION_SECONDS,
            HEARTBEAT_TIMEOUTS_TOTAL,
            CONNECTIONS_REJECTED_TOTAL,
            REGISTRATIONS_TOTAL,
            MESSAGES_RELAYED_TOTAL,
            DELIVERIES_TOTAL,
            MESSAGES_DROPPED_TOTAL,
            FRAMES_DROPPED_TOTAL,
            ACKNOWLEDGMENTS_TOTAL,
            REJECTED_FRAMES_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("courier_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }

    #[test]
    fn capture_renders_local_counters() {
        let ((), rendered) = testing::capture(|| {
            metrics::counter!(REGISTRATIONS_TOTAL).increment(2);
            metrics::counter!(REJECTED_FRAMES_TOTAL, "code" => "INVALID_FRAME").increment(1);
            metrics::counter!(REJECTED_FRAMES_TOTAL, "code" => "NOT_REGISTERED").increment(1);
        });
        assert_eq!(testing::value(&rendered, REGISTRATIONS_TOTAL), 2);
        assert_eq!(testing::value(&rendered, REJECTED_FRAMES_TOTAL), 2);
        assert_eq!(testing::value(&rendered, ACKNOWLEDGMENTS_TOTAL), 0);
    }
}
