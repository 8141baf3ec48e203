// Send-side rate limiting for selection updates and text sync.
//
// At most one value leaves per interval. A value offered too early is parked;
// a newer offer replaces the parked one, which is released at the interval
// boundary.

use std::time::{Duration, Instant};

pub const SELECTION_INTERVAL: Duration = Duration::from_millis(250);
pub const SYNC_INTERVAL: Duration = Duration::from_millis(350);

#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: None,
        }
    }

    /// Offers a value. Returns it back when it may be sent right away.
    pub fn offer(&mut self, value: T) -> Option<T> {
        self.offer_at(value, Instant::now())
    }

    fn offer_at(&mut self, value: T, now: Instant) -> Option<T> {
        if self.is_open_at(now) {
            self.pending = None;
            self.last_sent = Some(now);
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Releases the parked value once its interval has elapsed.
    pub fn poll(&mut self) -> Option<T> {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.is_open_at(now) {
            self.last_sent = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// When the parked value becomes sendable, or `None` if nothing is parked.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        Some(match self.last_sent {
            Some(sent) => sent + self.interval,
            None => Instant::now(),
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drops the parked value without sending it.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    fn is_open_at(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.interval)
    }
}
