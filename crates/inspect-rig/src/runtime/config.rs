use crate::error::RigError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub inspections: u64,
    pub capture_interval_ms: u64,
    pub toggle_enabled: bool,
    pub toggle_input: String,
    pub toggle_output: String,
    pub toggle_interval_ms: u64,
    pub toggle_tolerance_ms: u64,
    pub failure_pin: String,
    pub results_path: PathBuf,
    pub defect_rate: f64,
    pub low_light_rate: f64,
    pub seed: Option<u64>,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            inspections: 10,
            capture_interval_ms: 1000,
            toggle_enabled: true,
            toggle_input: "pin1".to_string(),
            toggle_output: "pin2".to_string(),
            toggle_interval_ms: 1000,
            toggle_tolerance_ms: 10,
            failure_pin: "failure".to_string(),
            results_path: PathBuf::from("test_results.jsonl"),
            defect_rate: 0.5,
            low_light_rate: 0.0,
            seed: None,
            json_logs: false,
            log_file: None,
            metrics_addr: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            let mut consumed = value.is_some();
            match (args[i].as_str(), value) {
                ("--inspections", Some(v)) => {
                    cfg.inspections = v.parse().unwrap_or(cfg.inspections);
                }
                ("--capture-interval-ms", Some(v)) => {
                    cfg.capture_interval_ms = v.parse().unwrap_or(cfg.capture_interval_ms);
                }
                ("--toggle-input", Some(v)) => {
                    cfg.toggle_input = v.clone();
                }
                ("--toggle-output", Some(v)) => {
                    cfg.toggle_output = v.clone();
                }
                ("--toggle-interval-ms", Some(v)) => {
                    cfg.toggle_interval_ms = v.parse().unwrap_or(cfg.toggle_interval_ms);
                }
                ("--toggle-tolerance-ms", Some(v)) => {
                    cfg.toggle_tolerance_ms = v.parse().unwrap_or(cfg.toggle_tolerance_ms);
                }
                ("--failure-pin", Some(v)) => {
                    cfg.failure_pin = v.clone();
                }
                ("--results", Some(v)) => {
                    cfg.results_path = PathBuf::from(v);
                }
                ("--defect-rate", Some(v)) => {
                    cfg.defect_rate = v.parse().unwrap_or(cfg.defect_rate);
                }
                ("--low-light-rate", Some(v)) => {
                    cfg.low_light_rate = v.parse().unwrap_or(cfg.low_light_rate);
                }
                ("--seed", Some(v)) => {
                    cfg.seed = v.parse().ok();
                }
                ("--log-file", Some(v)) => {
                    cfg.log_file = Some(PathBuf::from(v));
                }
                ("--metrics-addr", Some(v)) => {
                    cfg.metrics_addr = Some(v.clone());
                }
                (flag, _) => {
                    consumed = false;
                    match flag {
                        "--no-toggle" => cfg.toggle_enabled = false,
                        "--json-logs" => cfg.json_logs = true,
                        "--help" | "-h" => {
                            cfg.show_help = true;
                            break;
                        }
                        _ => {}
                    }
                }
            }
            if consumed {
                i += 1;
            }
            i += 1;
        }
        cfg
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn toggle_interval(&self) -> Duration {
        Duration::from_millis(self.toggle_interval_ms)
    }

    pub fn toggle_tolerance(&self) -> Duration {
        Duration::from_millis(self.toggle_tolerance_ms)
    }

    /// Reject settings the device or scenario generator cannot honor.
    pub fn validate(&self) -> Result<(), RigError> {
        for (name, rate) in [
            ("defect-rate", self.defect_rate),
            ("low-light-rate", self.low_light_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(RigError::Config(format!(
                    "--{name} must be within 0.0..=1.0, got {rate}"
                )));
            }
        }

        let pins = [&self.toggle_input, &self.toggle_output, &self.failure_pin];
        if pins[0] == pins[1] || pins[0] == pins[2] || pins[1] == pins[2] {
            return Err(RigError::Config(format!(
                "toggle input, toggle output and failure pin must differ: {pins:?}"
            )));
        }

        if self.toggle_enabled && self.toggle_tolerance_ms >= self.toggle_interval_ms {
            return Err(RigError::Config(format!(
                "--toggle-tolerance-ms ({}) must be below --toggle-interval-ms ({})",
                self.toggle_tolerance_ms, self.toggle_interval_ms
            )));
        }
        Ok(())
    }

    pub fn print_help() {
        println!(
            r#"inspect-rig - Inspection harness on a simulated digital I/O device

USAGE:
    inspect-rig [OPTIONS]

OPTIONS:
    --inspections <N>            Number of frames to capture and classify [default: 10]
    --capture-interval-ms <MS>   Delay between captures [default: 1000]
    --toggle-input <NAME>        Input channel toggled by the device [default: pin1]
    --toggle-output <NAME>       Output channel paired with the toggle input [default: pin2]
    --toggle-interval-ms <MS>    Toggle period [default: 1000]
    --toggle-tolerance-ms <MS>   Toggle timing tolerance [default: 10]
    --no-toggle                  Do not run the background toggle task
    --failure-pin <NAME>         Output channel raised when a defect is detected [default: failure]
    --results <PATH>             JSONL result log [default: test_results.jsonl]
    --defect-rate <P>            Probability a frame carries a defect [default: 0.5]
    --low-light-rate <P>         Probability a frame is captured in low light [default: 0.0]
    --seed <N>                   Seed camera and scenario generators for reproducible runs
    --json-logs                  Output logs in JSON format (for log aggregation)
    --log-file <PATH>            Also write JSON logs to a file
    --metrics-addr <ADDR>        Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    -h, --help                   Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                     Set log filter (e.g., RUST_LOG=debug,daq_sim=trace)

EXAMPLES:
    # Reproducible short run
    inspect-rig --inspections 5 --capture-interval-ms 200 --seed 42

    # Low-light stress run with metrics
    inspect-rig --low-light-rate 1.0 --metrics-addr 0.0.0.0:9090
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RuntimeConfig {
        let mut argv = vec!["inspect-rig".to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        RuntimeConfig::from_args(&argv)
    }

    #[test]
    fn defaults_match_reference_rig() {
        let cfg = parse(&[]);
        assert_eq!(cfg.toggle_input, "pin1");
        assert_eq!(cfg.toggle_output, "pin2");
        assert_eq!(cfg.toggle_interval(), Duration::from_secs(1));
        assert_eq!(cfg.toggle_tolerance(), Duration::from_millis(10));
        assert_eq!(cfg.inspections, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_flags_and_values() {
        let cfg = parse(&[
            "--inspections",
            "3",
            "--no-toggle",
            "--seed",
            "9",
            "--results",
            "out/r.jsonl",
            "--json-logs",
            "--defect-rate",
            "1.0",
        ]);
        assert_eq!(cfg.inspections, 3);
        assert!(!cfg.toggle_enabled);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.results_path, PathBuf::from("out/r.jsonl"));
        assert!(cfg.json_logs);
        assert_eq!(cfg.defect_rate, 1.0);
    }

    #[test]
    fn trailing_flag_is_not_swallowed() {
        let cfg = parse(&["--inspections", "2", "--help"]);
        assert!(cfg.show_help);
        let cfg = parse(&["--json-logs"]);
        assert!(cfg.json_logs);
    }

    #[test]
    fn rejects_bad_rates_and_timing() {
        assert!(parse(&["--defect-rate", "1.5"]).validate().is_err());
        assert!(parse(&["--toggle-tolerance-ms", "1000"]).validate().is_err());
        assert!(parse(&["--failure-pin", "pin2"]).validate().is_err());
        assert!(parse(&["--no-toggle", "--toggle-tolerance-ms", "1000"])
            .validate()
            .is_ok());
    }
}
