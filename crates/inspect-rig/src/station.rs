use crate::error::RigError;
use crate::infra::results::ResultLog;
use daq_sim::DigitalIo;
use inspect_io::metrics::{DEFECTS_DETECTED, FAILURE_PIN, INSPECTIONS};
use inspect_io::{Camera, DefectClassifier};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chooses capture conditions for each inspection.
pub struct Scenario {
    defect_rate: f64,
    low_light_rate: f64,
    rng: ChaCha8Rng,
}

impl Scenario {
    pub fn new(defect_rate: f64, low_light_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            defect_rate: defect_rate.clamp(0.0, 1.0),
            low_light_rate: low_light_rate.clamp(0.0, 1.0),
            rng,
        }
    }

    /// `(with_defect, low_lighting)` for the next frame.
    pub fn next_conditions(&mut self) -> (bool, bool) {
        let with_defect = self.rng.gen_bool(self.defect_rate);
        let low_lighting = self.rng.gen_bool(self.low_light_rate);
        (with_defect, low_lighting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InspectionOutcome {
    pub sequence_id: u64,
    pub with_defect: bool,
    pub low_lighting: bool,
    pub defect_detected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InspectionSummary {
    pub inspections: u64,
    pub defects_detected: u64,
    /// Verdicts that disagree with the injected condition.
    pub misclassified: u64,
    pub failure_pin: bool,
}

/// Capture, classify, record; raise the failure pin on anomalies.
pub struct InspectionStation<C, P, IO> {
    camera: C,
    classifier: P,
    results: ResultLog,
    io: IO,
    failure_pin: String,
    sequence_id: u64,
    anomaly: bool,
    summary: InspectionSummary,
}

impl<C: Camera, P: DefectClassifier, IO: DigitalIo> InspectionStation<C, P, IO> {
    pub fn new(
        camera: C,
        classifier: P,
        results: ResultLog,
        io: IO,
        failure_pin: impl Into<String>,
    ) -> Self {
        Self {
            camera,
            classifier,
            results,
            io,
            failure_pin: failure_pin.into(),
            sequence_id: 0,
            anomaly: false,
            summary: InspectionSummary::default(),
        }
    }

    pub fn capture_and_analyze(
        &mut self,
        with_defect: bool,
        low_lighting: bool,
    ) -> Result<InspectionOutcome, RigError> {
        let frame = self.camera.capture(with_defect, low_lighting);
        let defect_detected = self.classifier.predict(&frame);
        self.results.log(self.sequence_id, defect_detected)?;

        let outcome = InspectionOutcome {
            sequence_id: self.sequence_id,
            with_defect,
            low_lighting,
            defect_detected,
        };
        self.sequence_id += 1;

        INSPECTIONS.inc();
        self.summary.inspections += 1;
        if defect_detected {
            DEFECTS_DETECTED.inc();
            self.summary.defects_detected += 1;
        }
        if defect_detected != with_defect {
            self.summary.misclassified += 1;
            warn!(
                sequence_id = outcome.sequence_id,
                with_defect,
                low_lighting,
                defect_detected,
                "Verdict disagrees with injected condition"
            );
        }

        if defect_detected && !self.anomaly {
            self.io.set_failure_pin(&self.failure_pin, true)?;
            self.anomaly = true;
            self.summary.failure_pin = true;
            FAILURE_PIN.set(1.0);
            warn!(
                pin = %self.failure_pin,
                sequence_id = outcome.sequence_id,
                "Failure pin raised"
            );
        }

        info!(
            sequence_id = outcome.sequence_id,
            defect_present = defect_detected,
            low_lighting,
            "Inspection complete"
        );
        Ok(outcome)
    }

    /// Run `count` inspections spaced by `interval`, then close the result log.
    ///
    /// Stops early when `stop` is set. The failure pin is cleared at normal
    /// completion unless an anomaly was seen.
    pub fn run(
        &mut self,
        count: u64,
        interval: Duration,
        scenario: &mut Scenario,
        stop: &AtomicBool,
    ) -> Result<InspectionSummary, RigError> {
        let mut completed = true;
        for i in 0..count {
            if stop.load(Ordering::Relaxed) {
                completed = false;
                break;
            }
            if i > 0 && !interval.is_zero() {
                thread::sleep(interval);
            }
            let (with_defect, low_lighting) = scenario.next_conditions();
            debug!(with_defect, low_lighting, "Capturing frame");
            self.capture_and_analyze(with_defect, low_lighting)?;
        }

        if completed && !self.anomaly {
            self.io.set_failure_pin(&self.failure_pin, false)?;
            FAILURE_PIN.set(0.0);
        }
        self.results.close()?;
        Ok(self.summary.clone())
    }
}
