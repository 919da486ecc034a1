use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Monotonic microseconds from start to `instant` (zero if earlier).
    pub fn at_us(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.start).as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch (for cross-process logs only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-period deadlines `anchor + k * period`, k >= 1.
///
/// Each deadline is derived from the previous one rather than from the time a
/// tick actually ran, so scheduling delay never accumulates. A deadline past
/// the range of `Instant` ends the schedule: it has no pending deadline and is
/// never due again.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    period: Duration,
    next: Option<Instant>,
    slot: u64,
}

impl Schedule {
    /// `None` when the first deadline is not representable.
    pub fn new(anchor: Instant, period: Duration) -> Option<Self> {
        let next = anchor.checked_add(period)?;
        Some(Self {
            period,
            next: Some(next),
            slot: 1,
        })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Index k of the pending deadline.
    pub fn slot(&self) -> u64 {
        self.slot
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next.is_some_and(|next| now >= next)
    }

    /// Time left before the pending deadline.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next
            .map_or(Duration::MAX, |next| next.saturating_duration_since(now))
    }

    /// How far past the pending deadline `now` is.
    pub fn lateness(&self, now: Instant) -> Duration {
        self.next
            .map_or(Duration::ZERO, |next| now.saturating_duration_since(next))
    }

    /// Move to the next deadline after the one just served.
    ///
    /// Deadlines that are already in the past at `now` are skipped, keeping the
    /// original phase. Returns the number of skipped slots.
    pub fn advance(&mut self, now: Instant) -> u64 {
        let Some(served) = self.next else {
            return 0;
        };
        self.slot += 1;
        self.next = served.checked_add(self.period);
        let next = match self.next {
            Some(next) if next <= now => next,
            _ => return 0,
        };

        let behind = now.duration_since(next).as_nanos();
        let skipped = (behind / self.period.as_nanos()) as u64 + 1;
        let step = u32::try_from(skipped).unwrap_or(u32::MAX);
        self.next = self
            .period
            .checked_mul(step)
            .and_then(|ahead| next.checked_add(ahead));
        self.slot += skipped;
        skipped
    }
}
