// Scores, penalties and senshu for the two sides of a bout.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The two colored positions in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Ao,
    Aka,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Ao, Side::Aka];

    pub fn opponent(self) -> Side {
        match self {
            Side::Ao => Side::Aka,
            Side::Aka => Side::Ao,
        }
    }

    /// Slot index: AO is slot 0, AKA slot 1.
    pub fn index(self) -> usize {
        match self {
            Side::Ao => 0,
            Side::Aka => 1,
        }
    }

    pub fn from_index(index: usize) -> Side {
        if index % 2 == 0 {
            Side::Ao
        } else {
            Side::Aka
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ao => write!(f, "AO"),
            Side::Aka => write!(f, "AKA"),
        }
    }
}

/// Penalty codes shown on the board.
///
/// `Kiken` and `Shikkaku` are terminal: they end the bout and are only
/// inserted through a confirmed pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PenaltyCode {
    #[serde(rename = "C1")]
    C1,
    #[serde(rename = "C2")]
    C2,
    #[serde(rename = "C3")]
    C3,
    #[serde(rename = "HC")]
    HansokuChui,
    #[serde(rename = "H")]
    Hansoku,
    #[serde(rename = "KIKEN")]
    Kiken,
    #[serde(rename = "SHIKKAKU")]
    Shikkaku,
}

impl PenaltyCode {
    pub fn is_terminal(self) -> bool {
        matches!(self, PenaltyCode::Kiken | PenaltyCode::Shikkaku)
    }

    pub fn label(self) -> &'static str {
        match self {
            PenaltyCode::C1 => "C1",
            PenaltyCode::C2 => "C2",
            PenaltyCode::C3 => "C3",
            PenaltyCode::HansokuChui => "HC",
            PenaltyCode::Hansoku => "H",
            PenaltyCode::Kiken => "KIKEN",
            PenaltyCode::Shikkaku => "SHIKKAKU",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreSnapshot {
    pub ao: u32,
    pub aka: u32,
    pub penalties_ao: Vec<PenaltyCode>,
    pub penalties_aka: Vec<PenaltyCode>,
    pub senshu: Option<Side>,
}

#[derive(Debug, Clone)]
pub struct Scoreboard {
    scores: [u32; 2],
    penalties: [BTreeSet<PenaltyCode>; 2],
    senshu: Option<Side>,
    gap_limit: u32,
}

impl Scoreboard {
    pub fn new(gap_limit: u32) -> Self {
        Self {
            scores: [0, 0],
            penalties: [BTreeSet::new(), BTreeSet::new()],
            senshu: None,
            gap_limit,
        }
    }

    /// Add (or with a negative delta, remove) points. Scores never go below zero.
    /// Returns the side's new score.
    pub fn add_points(&mut self, side: Side, delta: i32) -> u32 {
        let current = i64::from(self.scores[side.index()]);
        let next = (current + i64::from(delta)).clamp(0, i64::from(u32::MAX));
        self.scores[side.index()] = next as u32;
        self.scores[side.index()]
    }

    /// Flip a penalty code on or off. Returns whether it is now active.
    pub fn toggle_penalty(&mut self, side: Side, code: PenaltyCode) -> bool {
        let set = &mut self.penalties[side.index()];
        if set.remove(&code) {
            false
        } else {
            set.insert(code);
            true
        }
    }

    pub fn insert_penalty(&mut self, side: Side, code: PenaltyCode) {
        self.penalties[side.index()].insert(code);
    }

    /// Toggle first-score priority. Turning it on for one side clears the other.
    pub fn toggle_senshu(&mut self, side: Side) -> Option<Side> {
        self.senshu = if self.senshu == Some(side) {
            None
        } else {
            Some(side)
        };
        self.senshu
    }

    /// The leading side once the score difference reaches the gap limit.
    pub fn gap_check(&self) -> Option<Side> {
        let [ao, aka] = self.scores;
        if ao.abs_diff(aka) >= self.gap_limit {
            self.leader()
        } else {
            None
        }
    }

    pub fn leader(&self) -> Option<Side> {
        let [ao, aka] = self.scores;
        match ao.cmp(&aka) {
            std::cmp::Ordering::Greater => Some(Side::Ao),
            std::cmp::Ordering::Less => Some(Side::Aka),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Exchange everything between AO and AKA in one step.
    pub fn swap(&mut self) {
        self.scores.swap(0, 1);
        self.penalties.swap(0, 1);
        self.senshu = self.senshu.map(Side::opponent);
    }

    /// Fixed result for a forfeited or disqualified bout.
    pub fn override_result(&mut self, winner: Side, winning_score: u32) {
        self.scores[winner.index()] = winning_score;
        self.scores[winner.opponent().index()] = 0;
    }

    pub fn reset(&mut self) {
        self.scores = [0, 0];
        self.penalties = [BTreeSet::new(), BTreeSet::new()];
        self.senshu = None;
    }

    pub fn score(&self, side: Side) -> u32 {
        self.scores[side.index()]
    }

    pub fn scores(&self) -> [u32; 2] {
        self.scores
    }

    pub fn penalties(&self, side: Side) -> &BTreeSet<PenaltyCode> {
        &self.penalties[side.index()]
    }

    pub fn senshu(&self) -> Option<Side> {
        self.senshu
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        ScoreSnapshot {
            ao: self.scores[0],
            aka: self.scores[1],
            penalties_ao: self.penalties[0].iter().copied().collect(),
            penalties_aka: self.penalties[1].iter().copied().collect(),
            senshu: self.senshu,
        }
    }
}
