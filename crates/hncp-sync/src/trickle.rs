//! Trickle suppression timer (RFC 6206).
//!
//! One timer runs per link. Within each interval `I` a transmission time is
//! drawn uniformly from `[I/2, I)`; at that time the link announces its
//! network state unless `k` consistent announcements were already heard in
//! the interval. Quiet intervals double up to `imax`. A local change always
//! drops the interval back to `imin`; an inconsistency heard from a neighbor
//! does so only when the timer is not already at `imin`.

use rand::Rng;

/// Per-link Trickle state. All times are milliseconds.
#[derive(Debug, Clone)]
pub struct Trickle {
    imin: i64,
    imax: i64,
    k: u32,
    interval: i64,
    interval_start: i64,
    transmission_time: i64,
    counter: u32,
    fired: bool,
    transmissions: u64,
    suppressions: u64,
}

impl Trickle {
    /// Start a timer with a fresh minimum interval beginning at `now`.
    pub fn new(imin: i64, imax: i64, k: u32, now: i64, rng: &mut impl Rng) -> Self {
        let imin = imin.max(2);
        let mut trickle = Self {
            imin,
            imax: imax.max(imin),
            k,
            interval: imin,
            interval_start: now,
            transmission_time: now,
            counter: 0,
            fired: false,
            transmissions: 0,
            suppressions: 0,
        };
        trickle.begin_interval(now, rng);
        trickle
    }

    fn begin_interval(&mut self, now: i64, rng: &mut impl Rng) {
        self.interval_start = now;
        self.counter = 0;
        self.fired = false;
        let half = self.interval / 2;
        self.transmission_time = now + rng.gen_range(half..self.interval);
    }

    /// Restart at the minimum interval, whatever the current interval is.
    ///
    /// Used when the local state changed, so the change goes out within one
    /// minimum interval.
    pub fn reset(&mut self, now: i64, rng: &mut impl Rng) {
        self.interval = self.imin;
        self.begin_interval(now, rng);
    }

    /// An inconsistent announcement was heard on the link.
    ///
    /// Restarts at the minimum interval unless the timer is already in one,
    /// in which case nothing changes and false is returned. Repeated
    /// inconsistencies cannot keep pushing the transmission back.
    pub fn hear_inconsistent(&mut self, now: i64, rng: &mut impl Rng) -> bool {
        if self.interval == self.imin {
            return false;
        }
        self.reset(now, rng);
        true
    }

    /// A consistent announcement was heard on the link.
    pub fn hear_consistent(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    /// Advance to `now`. Returns true if an announcement should be sent.
    pub fn poll(&mut self, now: i64, rng: &mut impl Rng) -> bool {
        let mut transmit = false;

        if !self.fired && now >= self.transmission_time {
            self.fired = true;
            if self.counter < self.k {
                self.transmissions += 1;
                transmit = true;
            } else {
                self.suppressions += 1;
            }
        }

        if now >= self.interval_start + self.interval {
            self.interval = (self.interval * 2).min(self.imax);
            self.begin_interval(now, rng);
        }

        transmit
    }

    /// The next time `poll` has something to do.
    pub fn next_wakeup(&self) -> i64 {
        if self.fired {
            self.interval_start + self.interval
        } else {
            self.transmission_time
        }
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Announcements sent since creation.
    pub fn transmissions(&self) -> u64 {
        self.transmissions
    }

    /// Announcements suppressed since creation.
    pub fn suppressions(&self) -> u64 {
        self.suppressions
    }
}
