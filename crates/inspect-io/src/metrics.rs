//! Prometheus metrics for the inspection rig.
//!
//! Covers the simulated device's toggle task, the inspection loop and the
//! failure pin.

use daq_sim::ToggleStats;
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric definition is valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
}

fn gauge(name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).expect("metric definition is valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric registered once");
    gauge
}

// ============================================================================
// Toggle Task Metrics
// ============================================================================

/// Toggle ticks executed by the simulated device
pub static TOGGLE_TICKS: LazyLock<IntCounter> =
    LazyLock::new(|| counter("inspect_toggle_ticks_total", "Toggle ticks executed"));

/// Toggle deadlines served outside tolerance or skipped
pub static TOGGLE_MISSED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "inspect_toggle_missed_deadlines_total",
        "Toggle deadlines served outside tolerance or skipped",
    )
});

/// Worst toggle lateness of the running task, in microseconds
pub static TOGGLE_MAX_LATENESS_US: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        "inspect_toggle_max_lateness_microseconds",
        "Worst toggle lateness observed by the running task",
    )
});

/// Current value of the toggle input channel (0/1)
pub static TOGGLE_INPUT: LazyLock<Gauge> =
    LazyLock::new(|| gauge("inspect_toggle_input", "Toggle input channel value (0/1)"));

/// Current value of the toggle output channel (0/1)
pub static TOGGLE_OUTPUT: LazyLock<Gauge> =
    LazyLock::new(|| gauge("inspect_toggle_output", "Toggle output channel value (0/1)"));

// ============================================================================
// Inspection Metrics
// ============================================================================

/// Frames captured and classified
pub static INSPECTIONS: LazyLock<IntCounter> =
    LazyLock::new(|| counter("inspect_inspections_total", "Frames captured and classified"));

/// Frames classified as defective
pub static DEFECTS_DETECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "inspect_defects_detected_total",
        "Frames classified as defective",
    )
});

/// Failure pin state (1 = anomaly raised)
pub static FAILURE_PIN: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        "inspect_failure_pin",
        "Failure pin state (1=anomaly raised, 0=clear)",
    )
});

/// Publish toggle progress made between two stats samples of the same task.
pub fn record_toggle_stats(previous: &ToggleStats, current: &ToggleStats) {
    TOGGLE_TICKS.inc_by(current.ticks.saturating_sub(previous.ticks));
    TOGGLE_MISSED.inc_by(
        current
            .missed_deadlines
            .saturating_sub(previous.missed_deadlines),
    );
    TOGGLE_MAX_LATENESS_US.set(current.max_lateness_us as f64);
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let _ = request.respond(metrics_response());
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once at least one frame went through the classifier
                    if INSPECTIONS.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

fn metrics_response() -> Response<std::io::Cursor<Vec<u8>>> {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return Response::from_string("encode error").with_status_code(500);
    }
    let mut response = Response::from_data(buffer);
    if let Ok(header) =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/plain; version=0.0.4"[..])
    {
        response = response.with_header(header);
    }
    response
}

/// Render the registry in the Prometheus text format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let _ = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    // Touch each metric to force initialization
    let _ = TOGGLE_TICKS.get();
    let _ = TOGGLE_MISSED.get();
    let _ = TOGGLE_MAX_LATENESS_US.get();
    let _ = TOGGLE_INPUT.get();
    let _ = TOGGLE_OUTPUT.get();
    let _ = INSPECTIONS.get();
    let _ = DEFECTS_DETECTED.get();
    let _ = FAILURE_PIN.get();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exports_inspection_metrics() {
        init_metrics();
        INSPECTIONS.inc();
        let text = render();
        assert!(text.contains("inspect_inspections_total"));
        assert!(text.contains("inspect_toggle_ticks_total"));
        assert!(text.contains("inspect_failure_pin"));
        assert!(text.contains("inspect_toggle_max_lateness_microseconds"));
    }

    #[test]
    fn toggle_stats_are_recorded_as_deltas() {
        let before = TOGGLE_TICKS.get();
        let previous = ToggleStats {
            ticks: 3,
            ..Default::default()
        };
        let current = ToggleStats {
            ticks: 5,
            missed_deadlines: 1,
            max_lateness_us: 800,
            last_tick_us: 5_000_000,
        };
        record_toggle_stats(&previous, &current);
        assert!(TOGGLE_TICKS.get() >= before + 2);
        assert!(TOGGLE_MISSED.get() >= 1);
        assert_eq!(TOGGLE_MAX_LATENESS_US.get(), 800.0);

        // A later sample with no new ticks still reports the task's worst case.
        record_toggle_stats(&current, &current);
        assert_eq!(TOGGLE_MAX_LATENESS_US.get(), 800.0);
    }
}
