use daq_sim::{SimulatedDaq, ToggleStats};
use inspect_io::metrics::{
    init_metrics, record_toggle_stats, serve_metrics, FAILURE_PIN, TOGGLE_INPUT, TOGGLE_OUTPUT,
};
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Channels whose values are mirrored into gauges.
#[derive(Debug, Clone)]
pub struct WatchedPins {
    pub toggle_input: String,
    pub toggle_output: String,
    pub failure_pin: String,
}

fn level(value: Option<bool>) -> f64 {
    if value.unwrap_or(false) {
        1.0
    } else {
        0.0
    }
}

pub fn start_metrics_updater(
    daq: Arc<SimulatedDaq>,
    pins: WatchedPins,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_stats = ToggleStats::default();
        while !stop.load(Ordering::Relaxed) {
            let snapshot = daq.snapshot();
            let value = |name: &str| snapshot.get(name).map(|c| c.value);
            TOGGLE_INPUT.set(level(value(&pins.toggle_input)));
            TOGGLE_OUTPUT.set(level(value(&pins.toggle_output)));
            FAILURE_PIN.set(level(value(&pins.failure_pin)));

            if let Some(stats) = daq.toggle_stats() {
                // A restarted task begins counting from zero again.
                if stats.ticks < last_stats.ticks {
                    last_stats = ToggleStats::default();
                }
                record_toggle_stats(&last_stats, &stats);
                last_stats = stats;
            }

            thread::sleep(Duration::from_millis(200));
        }
    })
}
