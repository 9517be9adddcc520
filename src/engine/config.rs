// Match rule constants and the enumerated set of bout durations.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// Scoring
pub const GAP_LIMIT: u32 = 8;
pub const FORFEIT_SCORE: u32 = 8;

// Clock
pub const DEFAULT_DURATION_SECS: u32 = 120;
pub const DURATION_STEP_SECS: u32 = 30;
pub const MIN_DURATION_SECS: u32 = 30;
pub const MAX_DURATION_SECS: u32 = 300;
pub const TICK_INTERVAL_MS: u64 = 1000;

/// A bout length from the selectable set (30 s to 5 min in 30 s steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MatchDuration(u32);

impl MatchDuration {
    pub fn from_secs(secs: u32) -> Result<Self, CoreError> {
        if (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&secs) && secs % DURATION_STEP_SECS == 0
        {
            Ok(Self(secs))
        } else {
            Err(CoreError::config(format!(
                "duration of {secs}s is not one of the selectable durations"
            )))
        }
    }

    /// Parse a duration label: `m:ss`, plain seconds, or seconds with an `s` suffix.
    pub fn parse(label: &str) -> Result<Self, CoreError> {
        let trimmed = label.trim();
        let malformed = || CoreError::config(format!("malformed duration label '{label}'"));

        let secs = if let Some((min, sec)) = trimmed.split_once(':') {
            if sec.len() != 2 {
                return Err(malformed());
            }
            let min: u32 = min.parse().map_err(|_| malformed())?;
            let sec: u32 = sec.parse().map_err(|_| malformed())?;
            if sec >= 60 {
                return Err(malformed());
            }
            min.checked_mul(60)
                .and_then(|m| m.checked_add(sec))
                .ok_or_else(malformed)?
        } else {
            let digits = trimmed.strip_suffix('s').unwrap_or(trimmed);
            digits.parse().map_err(|_| malformed())?
        };
        Self::from_secs(secs)
    }

    pub fn secs(self) -> u32 {
        self.0
    }

    /// Display label, e.g. `2:00`.
    pub fn label(self) -> String {
        format!("{}:{:02}", self.0 / 60, self.0 % 60)
    }

    /// Every selectable duration, shortest first.
    pub fn all() -> Vec<MatchDuration> {
        (MIN_DURATION_SECS..=MAX_DURATION_SECS)
            .step_by(DURATION_STEP_SECS as usize)
            .map(MatchDuration)
            .collect()
    }
}

impl Default for MatchDuration {
    fn default() -> Self {
        MatchDuration(DEFAULT_DURATION_SECS)
    }
}

impl TryFrom<u32> for MatchDuration {
    type Error = CoreError;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        Self::from_secs(secs)
    }
}

impl From<MatchDuration> for u32 {
    fn from(d: MatchDuration) -> u32 {
        d.0
    }
}

/// Rule parameters handed to a match controller at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRules {
    pub gap_limit: u32,
    pub forfeit_score: u32,
    pub duration: MatchDuration,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            gap_limit: GAP_LIMIT,
            forfeit_score: FORFEIT_SCORE,
            duration: MatchDuration::default(),
        }
    }
}
