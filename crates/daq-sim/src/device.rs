use crate::channel::{ChannelState, ChannelTable, Direction};
use crate::error::DaqError;
use crate::hal::DigitalIo;
use crate::timebase::TimeBase;
use crate::toggle::{ToggleBinding, ToggleHandle, ToggleStats};
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Software-simulated multi-channel digital I/O device.
///
/// All operations take `&self`; share the device between threads with `Arc`.
/// Every channel access, including the background toggle task, is serialized
/// by one table lock.
pub struct SimulatedDaq {
    channels: Arc<Mutex<ChannelTable>>,
    toggle: Mutex<Option<ToggleHandle>>,
    timebase: TimeBase,
}

impl SimulatedDaq {
    pub fn new() -> Self {
        Self::with_timebase(TimeBase::new())
    }

    pub fn with_timebase(timebase: TimeBase) -> Self {
        Self {
            channels: Arc::new(Mutex::new(ChannelTable::default())),
            toggle: Mutex::new(None),
            timebase,
        }
    }

    fn table(&self) -> MutexGuard<'_, ChannelTable> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn toggle_slot(&self) -> MutexGuard<'_, Option<ToggleHandle>> {
        self.toggle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn timebase(&self) -> TimeBase {
        self.timebase
    }

    /// Set a channel's direction, creating the channel (value `false`) if needed.
    pub fn configure(&self, channel: &str, direction: Direction) -> Result<(), DaqError> {
        self.table().configure(channel, direction)?;
        debug!("configured {} as {}", channel, direction);
        Ok(())
    }

    pub fn direction(&self, channel: &str) -> Direction {
        self.table().direction(channel)
    }

    pub fn write(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        self.table().write(channel, value)
    }

    pub fn read(&self, channel: &str) -> Result<bool, DaqError> {
        self.table().read(channel)
    }

    /// Current value regardless of direction; `None` for unknown channels.
    pub fn raw_peek(&self, channel: &str) -> Option<bool> {
        self.table().peek(channel)
    }

    /// Set a value regardless of direction. Never creates channels.
    pub fn raw_poke(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        self.table().poke(channel, value)
    }

    /// Consistent copy of every channel, taken under a single lock.
    pub fn snapshot(&self) -> BTreeMap<String, ChannelState> {
        self.table().snapshot()
    }

    pub fn set_failure_pin(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        self.write(channel, value)
    }

    /// Start toggling `input` (must be an input) and `output` (must be an output).
    ///
    /// Fails with [`DaqError::AlreadyRunning`] while another toggle task is active;
    /// call [`SimulatedDaq::stop`] first to rebind.
    pub fn start(
        &self,
        input: &str,
        output: &str,
        interval: Duration,
        tolerance: Duration,
    ) -> Result<(), DaqError> {
        let binding = ToggleBinding {
            input: input.to_string(),
            output: output.to_string(),
            interval,
            tolerance,
        };

        let mut slot = self.toggle_slot();
        if let Some(running) = slot.as_ref() {
            let bound = running.binding();
            return Err(DaqError::AlreadyRunning {
                input: bound.input.clone(),
                output: bound.output.clone(),
            });
        }

        {
            let table = self.table();
            table.require(input, Direction::Input)?;
            table.require(output, Direction::Output)?;
        }
        binding.validate_timing()?;

        *slot = Some(ToggleHandle::spawn(
            binding,
            Arc::clone(&self.channels),
            self.timebase,
        )?);
        Ok(())
    }

    /// Cancel the toggle task and wait for it to exit. No-op when idle.
    pub fn stop(&self) -> Option<ToggleStats> {
        let mut slot = self.toggle_slot();
        slot.take().map(ToggleHandle::stop)
    }

    pub fn is_toggling(&self) -> bool {
        self.toggle_slot().is_some()
    }

    pub fn toggle_binding(&self) -> Option<ToggleBinding> {
        self.toggle_slot().as_ref().map(|h| h.binding().clone())
    }

    /// Live statistics of the running toggle task.
    pub fn toggle_stats(&self) -> Option<ToggleStats> {
        self.toggle_slot().as_ref().map(ToggleHandle::stats)
    }
}

impl Default for SimulatedDaq {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedDaq {
    fn drop(&mut self) {
        self.stop();
    }
}

impl DigitalIo for SimulatedDaq {
    fn configure(&self, channel: &str, direction: Direction) -> Result<(), DaqError> {
        SimulatedDaq::configure(self, channel, direction)
    }

    fn read(&self, channel: &str) -> Result<bool, DaqError> {
        SimulatedDaq::read(self, channel)
    }

    fn write(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        SimulatedDaq::write(self, channel, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    const INTERVAL: Duration = Duration::from_secs(1);
    const TOLERANCE: Duration = Duration::from_millis(10);

    fn device() -> SimulatedDaq {
        let daq = SimulatedDaq::new();
        daq.configure("pin1", Direction::Input).unwrap();
        daq.configure("pin2", Direction::Output).unwrap();
        daq
    }

    fn pair(daq: &SimulatedDaq) -> (bool, bool) {
        let snap = daq.snapshot();
        (snap["pin1"].value, snap["pin2"].value)
    }

    #[test]
    fn initial_state_is_low() {
        let daq = device();
        assert!(!daq.read("pin1").unwrap());
        assert_eq!(daq.raw_peek("pin2"), Some(false));
        assert_eq!(daq.direction("pin1"), Direction::Input);
        assert_eq!(daq.direction("pin2"), Direction::Output);
        assert_eq!(daq.direction("missing"), Direction::Unset);
    }

    #[test]
    fn write_output_channel() {
        let daq = device();
        daq.write("pin2", true).unwrap();
        assert_eq!(daq.raw_peek("pin2"), Some(true));
    }

    #[test]
    fn enforces_direction() {
        let daq = device();
        assert!(matches!(
            daq.write("pin1", true),
            Err(DaqError::DirectionMismatch {
                expected: Direction::Output,
                actual: Direction::Input,
                ..
            })
        ));
        assert!(matches!(
            daq.read("pin2"),
            Err(DaqError::DirectionMismatch {
                expected: Direction::Input,
                actual: Direction::Output,
                ..
            })
        ));
    }

    #[test]
    fn raw_access_bypasses_direction() {
        let daq = device();
        daq.raw_poke("pin1", true).unwrap();
        assert!(daq.read("pin1").unwrap());
        assert_eq!(daq.raw_peek("missing"), None);
    }

    #[test]
    fn failure_pin_is_an_ordinary_output() {
        let daq = device();
        daq.configure("failure", Direction::Output).unwrap();
        daq.set_failure_pin("failure", true).unwrap();
        assert_eq!(daq.raw_peek("failure"), Some(true));
        assert!(daq.set_failure_pin("pin1", true).is_err());
    }

    #[test]
    fn stop_is_idempotent() {
        let daq = device();
        assert!(daq.stop().is_none());
        assert!(daq.stop().is_none());

        daq.start("pin1", "pin2", INTERVAL, TOLERANCE).unwrap();
        assert!(daq.stop().is_some());
        assert!(daq.stop().is_none());
        assert!(!daq.is_toggling());
    }

    #[test]
    fn rejects_reversed_binding() {
        let daq = device();
        let res = daq.start("pin2", "pin1", INTERVAL, TOLERANCE);
        assert!(matches!(res, Err(DaqError::DirectionMismatch { .. })));
        assert!(!daq.is_toggling());
    }

    #[test]
    fn rejects_unconfigured_binding() {
        let daq = device();
        let res = daq.start("pin1", "ghost", INTERVAL, TOLERANCE);
        assert!(matches!(
            res,
            Err(DaqError::DirectionMismatch {
                actual: Direction::Unset,
                ..
            })
        ));
        assert!(!daq.is_toggling());
    }

    #[test]
    fn rejects_invalid_timing() {
        let daq = device();
        let res = daq.start("pin1", "pin2", TOLERANCE, INTERVAL);
        assert!(matches!(res, Err(DaqError::InvalidTiming { .. })));
        assert!(!daq.is_toggling());
    }

    #[test]
    fn rejects_interval_beyond_clock_range() {
        let daq = device();
        let res = daq.start("pin1", "pin2", Duration::MAX, TOLERANCE);
        assert!(matches!(res, Err(DaqError::InvalidTiming { .. })));
        assert!(!daq.is_toggling());

        // The device stays usable after the rejected start.
        daq.start("pin1", "pin2", INTERVAL, TOLERANCE).unwrap();
        assert!(daq.stop().is_some());
    }

    #[test]
    fn rejects_second_start_while_running() {
        let daq = device();
        daq.configure("pin3", Direction::Input).unwrap();
        daq.configure("pin4", Direction::Output).unwrap();

        daq.start("pin1", "pin2", INTERVAL, TOLERANCE).unwrap();
        let res = daq.start("pin3", "pin4", INTERVAL, TOLERANCE);
        assert!(matches!(res, Err(DaqError::AlreadyRunning { ref input, .. }) if input == "pin1"));
        assert_eq!(daq.toggle_binding().unwrap().input, "pin1");

        daq.stop();
        daq.start("pin3", "pin4", INTERVAL, TOLERANCE).unwrap();
        assert_eq!(daq.toggle_binding().unwrap().output, "pin4");
        daq.stop();
    }

    #[test]
    fn toggles_on_schedule() {
        let daq = device();
        daq.start("pin1", "pin2", INTERVAL, TOLERANCE).unwrap();

        thread::sleep(Duration::from_millis(2100));
        let (in_first, out_first) = pair(&daq);
        assert!(!in_first, "two flips return pin1 to its initial value");
        assert_eq!(out_first, !in_first);

        thread::sleep(Duration::from_millis(1100));
        let (in_second, out_second) = pair(&daq);
        assert_ne!(in_first, in_second);
        assert_eq!(out_second, !in_second);

        let stats = daq.stop().unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.missed_deadlines, 0);
        assert!(
            stats.max_lateness_us <= TOLERANCE.as_micros() as u64,
            "tick fired {}us late",
            stats.max_lateness_us
        );
    }

    #[test]
    fn short_interval_ticks_stay_within_tolerance() {
        let daq = device();
        let interval = Duration::from_millis(200);
        let tolerance = Duration::from_millis(10);
        daq.start("pin1", "pin2", interval, tolerance).unwrap();

        thread::sleep(Duration::from_millis(1100));
        let stats = daq.stop().unwrap();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.missed_deadlines, 0);
        assert!(
            stats.max_lateness_us <= tolerance.as_micros() as u64,
            "tick fired {}us late",
            stats.max_lateness_us
        );
        assert!(stats.last_tick_us >= 1_000_000);
    }

    #[test]
    fn pairing_holds_while_hammered() {
        let daq = Arc::new(device());
        daq.start("pin1", "pin2", Duration::from_millis(20), Duration::from_millis(2))
            .unwrap();

        let observer = {
            let daq = Arc::clone(&daq);
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_millis(300);
                let mut observed = 0;
                while Instant::now() < deadline {
                    if daq.toggle_stats().map_or(0, |s| s.ticks) > 0 {
                        let snap = daq.snapshot();
                        assert_eq!(snap["pin2"].value, !snap["pin1"].value);
                        observed += 1;
                    }
                }
                observed
            })
        };

        // Foreground reads run concurrently with the task.
        for _ in 0..1000 {
            daq.read("pin1").unwrap();
        }

        assert!(observer.join().unwrap() > 0);
        daq.stop();
    }

    #[test]
    fn no_mutation_after_stop() {
        let daq = device();
        let interval = Duration::from_millis(100);
        daq.start("pin1", "pin2", interval, Duration::from_millis(5))
            .unwrap();
        thread::sleep(Duration::from_millis(250));
        daq.stop();

        let frozen = pair(&daq);
        thread::sleep(interval * 2);
        assert_eq!(pair(&daq), frozen);
    }

    #[test]
    fn drop_stops_toggle_task() {
        let daq = device();
        daq.start("pin1", "pin2", INTERVAL, TOLERANCE).unwrap();
        let started = Instant::now();
        drop(daq);
        assert!(started.elapsed() < INTERVAL);
    }
}
