//! Background toggle task.
//!
//! The task flips a bound input channel once per interval and drives the paired
//! output channel to the negation of the new input value. It waits on its
//! cancellation receiver with a timeout of at most `tolerance`, so it both
//! re-checks the clock often enough to stay within tolerance and notices a stop
//! request without polling.

use crate::channel::ChannelTable;
use crate::error::DaqError;
use crate::timebase::{Schedule, TimeBase};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Channels and timing a toggle task is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleBinding {
    pub input: String,
    pub output: String,
    pub interval: Duration,
    pub tolerance: Duration,
}

impl ToggleBinding {
    pub(crate) fn validate_timing(&self) -> Result<(), DaqError> {
        if self.interval.is_zero() || self.tolerance.is_zero() || self.tolerance >= self.interval {
            return Err(self.invalid_timing());
        }
        Ok(())
    }

    fn invalid_timing(&self) -> DaqError {
        DaqError::InvalidTiming {
            interval: self.interval,
            tolerance: self.tolerance,
        }
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleStats {
    pub ticks: u64,
    pub missed_deadlines: u64,
    pub max_lateness_us: u64,
    pub last_tick_us: u64,
}

/// Handle to a running toggle task, owned by the device.
pub(crate) struct ToggleHandle {
    binding: ToggleBinding,
    cancel: Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<ToggleStats>>,
}

impl ToggleHandle {
    pub(crate) fn spawn(
        binding: ToggleBinding,
        channels: Arc<Mutex<ChannelTable>>,
        timebase: TimeBase,
    ) -> Result<Self, DaqError> {
        let (cancel, cancelled) = mpsc::channel();
        let stats = Arc::new(Mutex::new(ToggleStats::default()));
        // An interval whose first deadline overflows the clock is rejected here.
        let schedule = Schedule::new(Instant::now(), binding.interval)
            .ok_or_else(|| binding.invalid_timing())?;
        let task = ToggleTask {
            schedule,
            binding: binding.clone(),
            channels,
            stats: Arc::clone(&stats),
            timebase,
        };

        let join = thread::Builder::new()
            .name("daq-toggle".to_string())
            .spawn(move || task.run(cancelled))
            .map_err(DaqError::Spawn)?;

        info!(
            "toggle started: {} -> {} every {:?} (tolerance {:?})",
            binding.input, binding.output, binding.interval, binding.tolerance
        );
        Ok(Self {
            binding,
            cancel,
            join,
            stats,
        })
    }

    pub(crate) fn binding(&self) -> &ToggleBinding {
        &self.binding
    }

    pub(crate) fn stats(&self) -> ToggleStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Request cancellation and wait for the task to exit.
    pub(crate) fn stop(self) -> ToggleStats {
        // A send error means the task is already gone; join either way.
        let _ = self.cancel.send(());
        if self.join.join().is_err() {
            warn!("toggle task on {} panicked", self.binding.input);
        }
        let stats = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        info!(
            "toggle stopped: {} -> {} after {} ticks ({} missed)",
            self.binding.input, self.binding.output, stats.ticks, stats.missed_deadlines
        );
        stats
    }
}

struct ToggleTask {
    binding: ToggleBinding,
    schedule: Schedule,
    channels: Arc<Mutex<ChannelTable>>,
    stats: Arc<Mutex<ToggleStats>>,
    timebase: TimeBase,
}

impl ToggleTask {
    fn run(mut self, cancelled: Receiver<()>) {
        loop {
            let now = Instant::now();
            if self.schedule.is_due(now) {
                self.tick(now);
                continue;
            }

            let wait = self.schedule.remaining(now).min(self.binding.tolerance);
            match cancelled.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("toggle task on {} exiting", self.binding.input);
    }

    fn tick(&mut self, now: Instant) {
        let lateness = self.schedule.lateness(now);
        let slot = self.schedule.slot();

        let new_input = {
            let mut table = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            table.toggle_pair(&self.binding.input, &self.binding.output)
        };

        let mut missed = 0;
        if lateness > self.binding.tolerance {
            missed += 1;
            warn!(
                "toggle slot {} on {} fired {:?} late (tolerance {:?})",
                slot, self.binding.input, lateness, self.binding.tolerance
            );
        }
        let skipped = self.schedule.advance(now);
        if skipped > 0 {
            warn!(
                "toggle on {} fell behind, skipping {} slot(s)",
                self.binding.input, skipped
            );
        }
        missed += skipped;

        trace!(
            "toggle slot {}: {}={:?} {}={:?}",
            slot,
            self.binding.input,
            new_input,
            self.binding.output,
            new_input.map(|v| !v)
        );

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.ticks += 1;
        stats.missed_deadlines += missed;
        stats.max_lateness_us = stats.max_lateness_us.max(lateness.as_micros() as u64);
        stats.last_tick_us = self.timebase.at_us(now);
    }
}
