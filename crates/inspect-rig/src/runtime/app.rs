use crate::error::RigError;
use crate::infra::results::ResultLog;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry::{self, WatchedPins};
use crate::station::{InspectionStation, InspectionSummary, Scenario};
use daq_sim::{Direction, SimulatedDaq};
use inspect_io::{CameraConfig, SyntheticCamera, ThresholdClassifier};
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use tracing::{error, info};

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = init_tracing(config.json_logs, config.log_file.as_deref());

    match run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Inspection run failed");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<InspectionSummary, RigError> {
    config.validate()?;

    // Initialize metrics
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let daq = Arc::new(SimulatedDaq::new());
    configure_device(&daq, &config)?;

    if config.toggle_enabled {
        info!(
            input = %config.toggle_input,
            output = %config.toggle_output,
            interval_ms = config.toggle_interval_ms,
            tolerance_ms = config.toggle_tolerance_ms,
            "Starting toggle task"
        );
        daq.start(
            &config.toggle_input,
            &config.toggle_output,
            config.toggle_interval(),
            config.toggle_tolerance(),
        )?;
    } else {
        info!("Toggle task disabled");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let updater = config.metrics_addr.as_ref().map(|_| {
        telemetry::start_metrics_updater(
            Arc::clone(&daq),
            WatchedPins {
                toggle_input: config.toggle_input.clone(),
                toggle_output: config.toggle_output.clone(),
                failure_pin: config.failure_pin.clone(),
            },
            Arc::clone(&stop),
        )
    });

    let outcome = inspect(&config, Arc::clone(&daq), &stop);

    // Stop the toggle task whether or not the inspections succeeded.
    let toggle_stats = daq.stop();
    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = updater {
        let _ = handle.join();
    }

    if let Some(stats) = toggle_stats {
        info!(
            ticks = stats.ticks,
            missed_deadlines = stats.missed_deadlines,
            max_lateness_us = stats.max_lateness_us,
            "Toggle task stopped"
        );
    }

    let summary = outcome?;
    info!(
        inspections = summary.inspections,
        defects_detected = summary.defects_detected,
        misclassified = summary.misclassified,
        failure_pin = summary.failure_pin,
        results = %config.results_path.display(),
        "Run complete"
    );
    Ok(summary)
}

fn configure_device(daq: &SimulatedDaq, config: &RuntimeConfig) -> Result<(), RigError> {
    daq.configure(&config.toggle_input, Direction::Input)?;
    daq.configure(&config.toggle_output, Direction::Output)?;
    daq.configure(&config.failure_pin, Direction::Output)?;
    daq.set_failure_pin(&config.failure_pin, false)?;
    Ok(())
}

fn inspect(
    config: &RuntimeConfig,
    daq: Arc<SimulatedDaq>,
    stop: &AtomicBool,
) -> Result<InspectionSummary, RigError> {
    let results = ResultLog::create(&config.results_path, daq.timebase()).map_err(|source| {
        RigError::ResultLogOpen {
            path: config.results_path.clone(),
            source,
        }
    })?;
    info!(path = %results.path().display(), "Result log opened");

    let camera = SyntheticCamera::new(CameraConfig::default(), config.seed);
    let mut scenario = Scenario::new(
        config.defect_rate,
        config.low_light_rate,
        config.seed.map(|s| s.wrapping_add(1)),
    );
    let mut station = InspectionStation::new(
        camera,
        ThresholdClassifier::default(),
        results,
        daq,
        config.failure_pin.clone(),
    );

    info!(
        inspections = config.inspections,
        interval_ms = config.capture_interval_ms,
        "Inspection station running"
    );
    station.run(
        config.inspections,
        config.capture_interval(),
        &mut scenario,
        stop,
    )
}
