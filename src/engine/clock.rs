// Countdown clock for a single bout.
//
// The clock itself is passive: something outside (the ticker task in
// `engine::server`) calls `tick()` once per second while it is running.

use serde::Serialize;

use super::config::MatchDuration;
use crate::error::CoreError;

/// What a tick or adjustment did to the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// The clock was not running; nothing changed.
    Idle,
    /// One second elapsed; the countdown continues.
    Ticked { remaining_secs: u32 },
    /// The countdown reached zero on this step and the clock stopped.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockSnapshot {
    pub duration_secs: u32,
    pub remaining_secs: u32,
    pub running: bool,
    pub display: String,
}

#[derive(Debug, Clone)]
pub struct Clock {
    duration_secs: u32,
    remaining_secs: u32,
    running: bool,
}

impl Clock {
    pub fn new(duration: MatchDuration) -> Self {
        Self {
            duration_secs: duration.secs(),
            remaining_secs: duration.secs(),
            running: false,
        }
    }

    /// Set a new bout length. Refused while the countdown is running.
    pub fn configure(&mut self, duration: MatchDuration) -> Result<(), CoreError> {
        if self.running {
            return Err(CoreError::invalid("cannot change the duration while the clock runs"));
        }
        self.duration_secs = duration.secs();
        self.remaining_secs = duration.secs();
        Ok(())
    }

    /// Begin counting down. Returns false (no-op) if already running or at zero.
    pub fn start(&mut self) -> bool {
        if self.running || self.remaining_secs == 0 {
            return false;
        }
        self.running = true;
        true
    }

    /// Stop counting down, keeping the remaining time. Returns false if already stopped.
    pub fn pause(&mut self) -> bool {
        let was_running = self.running;
        self.running = false;
        was_running
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.remaining_secs = self.duration_secs;
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> ClockTick {
        if !self.running {
            return ClockTick::Idle;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.running = false;
            ClockTick::Expired
        } else {
            ClockTick::Ticked {
                remaining_secs: self.remaining_secs,
            }
        }
    }

    /// Manual nudge by the officials. Clamps at zero; additions are unbounded.
    ///
    /// Bringing a non-zero clock to zero counts as the zero-crossing and
    /// stops the countdown.
    pub fn adjust(&mut self, delta_secs: i32) -> ClockTick {
        let before = self.remaining_secs;
        let after = (i64::from(before) + i64::from(delta_secs)).clamp(0, i64::from(u32::MAX));
        self.remaining_secs = after as u32;
        if before > 0 && self.remaining_secs == 0 {
            self.running = false;
            ClockTick::Expired
        } else {
            ClockTick::Ticked {
                remaining_secs: self.remaining_secs,
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// True once the countdown has moved away from a fresh start.
    pub fn has_started(&self) -> bool {
        self.running || self.remaining_secs != self.duration_secs
    }

    pub fn display(&self) -> String {
        format_clock(self.remaining_secs)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            duration_secs: self.duration_secs,
            remaining_secs: self.remaining_secs,
            running: self.running,
            display: self.display(),
        }
    }
}

/// Format seconds as `mm:ss`.
pub fn format_clock(total_secs: u32) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
