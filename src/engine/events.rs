// Notifications emitted by the core for renderers and subscribers.

use serde::{Deserialize, Serialize};

use super::controller::{MatchState, PendingAction};
use super::scoreboard::{PenaltyCode, Side};
use crate::tournament::Competitor;

/// Why a bout ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    #[serde(rename = "gap reached")]
    GapReached,
    #[serde(rename = "time expired")]
    TimeExpired,
    #[serde(rename = "manual decision")]
    ManualDecision,
    #[serde(rename = "forfeiture")]
    Forfeiture,
    #[serde(rename = "disqualification")]
    Disqualification,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::GapReached => "gap reached",
            DecisionReason::TimeExpired => "time expired",
            DecisionReason::ManualDecision => "manual decision",
            DecisionReason::Forfeiture => "forfeiture",
            DecisionReason::Disqualification => "disqualification",
        }
    }

    /// Metric label.
    pub fn metric_label(self) -> &'static str {
        match self {
            DecisionReason::GapReached => "gap",
            DecisionReason::TimeExpired => "time",
            DecisionReason::ManualDecision => "manual",
            DecisionReason::Forfeiture => "kiken",
            DecisionReason::Disqualification => "shikkaku",
        }
    }
}

/// A state change the presentation layer re-renders on.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    ScoreChanged {
        ao: u32,
        aka: u32,
    },
    PenaltyToggled {
        side: Side,
        code: PenaltyCode,
        active: bool,
    },
    SenshuChanged {
        holder: Option<Side>,
    },
    ClockTick {
        remaining_secs: u32,
        running: bool,
    },
    ClockExpired,
    MatchStateChanged {
        state: MatchState,
    },
    PendingActionChanged {
        pending: Option<PendingAction>,
    },
    SidesSwapped,
    CompetitorUpdated {
        side: Side,
        competitor: Competitor,
    },
    MatchPrepared {
        match_id: String,
        ao: Competitor,
        aka: Competitor,
    },
    WinnerDeclared {
        side: Side,
        name: String,
        reason: DecisionReason,
    },
    BracketUpdated,
    TournamentComplete {
        champion: Option<String>,
    },
    LogAppended {
        id: String,
    },
    StorageFailed {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&CoreEvent::ScoreChanged { ao: 3, aka: 1 }).unwrap();
        assert_eq!(json, r#"{"type":"score_changed","ao":3,"aka":1}"#);

        let json = serde_json::to_string(&CoreEvent::WinnerDeclared {
            side: Side::Aka,
            name: "Sato".into(),
            reason: DecisionReason::ManualDecision,
        })
        .unwrap();
        assert!(json.contains(r#""type":"winner_declared""#));
        assert!(json.contains(r#""reason":"manual decision""#));
        assert!(json.contains(r#""side":"aka""#));

        let json = serde_json::to_string(&CoreEvent::ClockExpired).unwrap();
        assert_eq!(json, r#"{"type":"clock_expired"}"#);
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(DecisionReason::GapReached.as_str(), "gap reached");
        assert_eq!(
            serde_json::to_string(&DecisionReason::Disqualification).unwrap(),
            "\"disqualification\""
        );
        let r: DecisionReason = serde_json::from_str("\"forfeiture\"").unwrap();
        assert_eq!(r, DecisionReason::Forfeiture);
    }
}
