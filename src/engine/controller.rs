// Match controller: the state machine running a single bout.
//
// SETUP -> IN_PROGRESS -> (AWAITING_DECISION ->) COMPLETE
//
// Scoring, penalties, senshu, clock control, swaps and pending actions are
// only accepted while IN_PROGRESS. A tied expiry parks the bout in
// AWAITING_DECISION until an official declares a winner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::{Clock, ClockSnapshot, ClockTick};
use super::config::{MatchDuration, MatchRules};
use super::events::{CoreEvent, DecisionReason};
use super::scoreboard::{PenaltyCode, ScoreSnapshot, Scoreboard, Side};
use crate::archive::{log_filename, FinalScore, MatchLogEntry, TimestampRange};
use crate::error::CoreError;
use crate::tournament::Competitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    Setup,
    InProgress,
    AwaitingDecision,
    Complete,
}

/// Irreversible actions that need a second confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// KIKEN: the offender forfeits the bout.
    Forfeiture,
    /// SHIKKAKU: the offender is out of the tournament.
    Disqualification,
}

impl PendingKind {
    pub fn code(self) -> PenaltyCode {
        match self {
            PendingKind::Forfeiture => PenaltyCode::Kiken,
            PendingKind::Disqualification => PenaltyCode::Shikkaku,
        }
    }

    pub fn reason(self) -> DecisionReason {
        match self {
            PendingKind::Forfeiture => DecisionReason::Forfeiture,
            PendingKind::Disqualification => DecisionReason::Disqualification,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub kind: PendingKind,
    pub offender: Side,
}

/// Identity and context of the bout being run. Competitors are in bracket
/// slot order (slot 0 starts on AO).
#[derive(Debug, Clone)]
pub struct MatchSetup {
    pub match_id: String,
    pub competitors: [Competitor; 2],
    pub division: String,
    pub referee_name: String,
}

/// A decided bout, ready to be archived and reported to the bracket.
#[derive(Debug, Clone)]
pub struct Completion {
    pub match_id: String,
    /// Winner in bracket slot terms, independent of any side swap.
    pub winner_slot: Side,
    pub reason: DecisionReason,
    /// Bracket slot of a disqualified competitor.
    pub disqualified_slot: Option<Side>,
    pub entry: MatchLogEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSnapshot {
    pub state: MatchState,
    pub match_id: Option<String>,
    pub ao: Option<Competitor>,
    pub aka: Option<Competitor>,
    pub score: ScoreSnapshot,
    pub clock: ClockSnapshot,
    pub duration_label: String,
    pub pending: Option<PendingAction>,
    pub swapped: bool,
    pub winner: Option<Side>,
    pub reason: Option<DecisionReason>,
    pub event_lines: Vec<String>,
}

pub struct MatchController {
    rules: MatchRules,
    state: MatchState,
    scoreboard: Scoreboard,
    clock: Clock,
    setup: Option<MatchSetup>,
    swapped: bool,
    pending: Option<PendingAction>,
    event_log: Vec<String>,
    prepared_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    outcome: Option<(Side, DecisionReason)>,
    completion: Option<Completion>,
}

impl MatchController {
    pub fn new(rules: MatchRules) -> Self {
        Self {
            rules,
            state: MatchState::Setup,
            scoreboard: Scoreboard::new(rules.gap_limit),
            clock: Clock::new(rules.duration),
            setup: None,
            swapped: false,
            pending: None,
            event_log: Vec::new(),
            prepared_at: Utc::now(),
            started_at: None,
            outcome: None,
            completion: None,
        }
    }

    /// Load a bout: assign competitors, reset the board and clock, clear the
    /// event log, and unlock the controls.
    pub fn prepare(&mut self, setup: MatchSetup) -> Vec<CoreEvent> {
        tracing::info!(
            match_id = %setup.match_id,
            ao = %setup.competitors[0].name,
            aka = %setup.competitors[1].name,
            "Match prepared"
        );
        let [ao, aka] = setup.competitors.clone();
        let match_id = setup.match_id.clone();

        self.setup = Some(setup);
        self.scoreboard.reset();
        self.clock = Clock::new(self.rules.duration);
        self.swapped = false;
        self.pending = None;
        self.event_log.clear();
        self.prepared_at = Utc::now();
        self.started_at = None;
        self.outcome = None;
        self.completion = None;
        self.state = MatchState::InProgress;

        vec![
            CoreEvent::MatchPrepared { match_id, ao, aka },
            CoreEvent::ScoreChanged { ao: 0, aka: 0 },
            CoreEvent::SenshuChanged { holder: None },
            CoreEvent::PendingActionChanged { pending: None },
            self.clock_event(),
            CoreEvent::MatchStateChanged {
                state: MatchState::InProgress,
            },
        ]
    }

    /// Unload the bout and lock the controls (no match left to run).
    pub fn clear(&mut self) -> Vec<CoreEvent> {
        self.clock.pause();
        self.setup = None;
        self.pending = None;
        self.completion = None;
        self.state = MatchState::Setup;
        vec![CoreEvent::MatchStateChanged {
            state: MatchState::Setup,
        }]
    }

    pub fn add_points(&mut self, side: Side, delta: i32) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("scoring")?;
        if delta == 0 {
            return Ok(Vec::new());
        }
        self.mark_started();
        self.scoreboard.add_points(side, delta);
        let [ao, aka] = self.scoreboard.scores();
        self.record(format!("{side} {delta:+} ({ao}-{aka})"));

        let mut events = vec![CoreEvent::ScoreChanged { ao, aka }];
        if let Some(leader) = self.scoreboard.gap_check() {
            events.extend(self.finish(leader, DecisionReason::GapReached));
        }
        Ok(events)
    }

    pub fn toggle_penalty(
        &mut self,
        side: Side,
        code: PenaltyCode,
    ) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("penalty")?;
        if code.is_terminal() {
            return Err(CoreError::invalid(format!(
                "{} must be staged and confirmed",
                code.label()
            )));
        }
        let active = self.scoreboard.toggle_penalty(side, code);
        let verb = if active { "given" } else { "withdrawn" };
        self.record(format!("{side} penalty {} {verb}", code.label()));
        Ok(vec![CoreEvent::PenaltyToggled { side, code, active }])
    }

    pub fn toggle_senshu(&mut self, side: Side) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("senshu")?;
        let holder = self.scoreboard.toggle_senshu(side);
        match holder {
            Some(h) => self.record(format!("senshu to {h}")),
            None => self.record(format!("senshu removed from {side}")),
        }
        Ok(vec![CoreEvent::SenshuChanged { holder }])
    }

    pub fn start_clock(&mut self) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("clock start")?;
        if !self.clock.start() {
            return Ok(Vec::new());
        }
        self.mark_started();
        self.record("clock started".to_string());
        Ok(vec![self.clock_event()])
    }

    pub fn pause_clock(&mut self) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("clock pause")?;
        if !self.clock.pause() {
            return Ok(Vec::new());
        }
        self.record("clock paused".to_string());
        Ok(vec![self.clock_event()])
    }

    pub fn adjust_clock(&mut self, delta_secs: i32) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("clock adjustment")?;
        if delta_secs == 0 {
            return Ok(Vec::new());
        }
        let tick = self.clock.adjust(delta_secs);
        self.record(format!("clock {delta_secs:+}s"));
        let mut events = vec![self.clock_event()];
        if tick == ClockTick::Expired {
            events.extend(self.on_expiry());
        }
        Ok(events)
    }

    /// Pick a new bout length. The clock must be stopped; it restarts from the new length.
    pub fn set_duration(&mut self, duration: MatchDuration) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("duration change")?;
        self.clock.configure(duration)?;
        self.rules.duration = duration;
        tracing::debug!(duration = %duration.label(), "Bout duration changed");
        Ok(vec![self.clock_event()])
    }

    /// One second of the countdown. Called by the ticker; a no-op unless running.
    pub fn tick(&mut self) -> Vec<CoreEvent> {
        if self.state != MatchState::InProgress {
            return Vec::new();
        }
        match self.clock.tick() {
            ClockTick::Idle => Vec::new(),
            ClockTick::Ticked { .. } => vec![self.clock_event()],
            ClockTick::Expired => {
                let mut events = vec![self.clock_event()];
                events.extend(self.on_expiry());
                events
            }
        }
    }

    /// Restart the current bout from zero. Allowed until a winner is recorded.
    pub fn reset_match(&mut self) -> Result<Vec<CoreEvent>, CoreError> {
        if !matches!(
            self.state,
            MatchState::InProgress | MatchState::AwaitingDecision
        ) {
            return Err(self.locked("reset"));
        }
        let mut events = Vec::new();
        for side in Side::BOTH {
            for &code in self.scoreboard.penalties(side) {
                events.push(CoreEvent::PenaltyToggled {
                    side,
                    code,
                    active: false,
                });
            }
        }
        self.scoreboard.reset();
        self.clock = Clock::new(self.rules.duration);
        self.pending = None;
        self.event_log.clear();
        self.started_at = None;
        self.state = MatchState::InProgress;

        events.extend([
            CoreEvent::ScoreChanged { ao: 0, aka: 0 },
            CoreEvent::SenshuChanged { holder: None },
            CoreEvent::PendingActionChanged { pending: None },
            self.clock_event(),
            CoreEvent::MatchStateChanged {
                state: MatchState::InProgress,
            },
        ]);
        Ok(events)
    }

    pub fn declare_winner(&mut self, side: Side) -> Result<Vec<CoreEvent>, CoreError> {
        if !matches!(
            self.state,
            MatchState::InProgress | MatchState::AwaitingDecision
        ) {
            return Err(self.locked("declaration"));
        }
        Ok(self.finish(side, DecisionReason::ManualDecision))
    }

    pub fn stage_pending_action(
        &mut self,
        kind: PendingKind,
        offender: Side,
    ) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("staging")?;
        if self.pending.is_some() {
            return Err(CoreError::invalid("another action is already staged"));
        }
        self.pending = Some(PendingAction { kind, offender });
        Ok(vec![CoreEvent::PendingActionChanged {
            pending: self.pending,
        }])
    }

    /// Apply the staged forfeiture/disqualification: the offender's opponent
    /// wins with the fixed score.
    pub fn confirm_pending_action(&mut self) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("confirmation")?;
        let PendingAction { kind, offender } = self
            .pending
            .take()
            .ok_or_else(|| CoreError::invalid("no action is staged"))?;
        let winner = offender.opponent();
        let code = kind.code();

        self.scoreboard.insert_penalty(offender, code);
        self.scoreboard
            .override_result(winner, self.rules.forfeit_score);
        let [ao, aka] = self.scoreboard.scores();
        self.record(format!("{offender} {}", code.label()));

        let mut events = vec![
            CoreEvent::PendingActionChanged { pending: None },
            CoreEvent::PenaltyToggled {
                side: offender,
                code,
                active: true,
            },
            CoreEvent::ScoreChanged { ao, aka },
        ];
        events.extend(self.finish(winner, kind.reason()));
        Ok(events)
    }

    /// Discard a staged action. Never locked; a no-op when nothing is staged.
    pub fn cancel_pending_action(&mut self) -> Vec<CoreEvent> {
        match self.pending.take() {
            Some(_) => vec![CoreEvent::PendingActionChanged { pending: None }],
            None => Vec::new(),
        }
    }

    /// Competitors changed ends: exchange everything shown on AO and AKA.
    pub fn swap_sides(&mut self) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_live("side swap")?;
        self.scoreboard.swap();
        self.swapped = !self.swapped;
        if let Some(p) = self.pending.as_mut() {
            p.offender = p.offender.opponent();
        }
        self.record("sides swapped".to_string());
        let [ao, aka] = self.scoreboard.scores();
        let mut events = vec![
            CoreEvent::SidesSwapped,
            CoreEvent::ScoreChanged { ao, aka },
            CoreEvent::SenshuChanged {
                holder: self.scoreboard.senshu(),
            },
            CoreEvent::PendingActionChanged {
                pending: self.pending,
            },
        ];
        for side in Side::BOTH {
            if let Some(c) = self.competitor(side) {
                events.push(CoreEvent::CompetitorUpdated {
                    side,
                    competitor: c.clone(),
                });
            }
        }
        Ok(events)
    }

    pub fn rename_competitor(&mut self, side: Side, name: &str) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_editable()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid("competitor name cannot be empty"));
        }
        self.update_competitor(side, |c| c.name = name.to_string())
    }

    pub fn set_flag(&mut self, side: Side, flag: Option<String>) -> Result<Vec<CoreEvent>, CoreError> {
        self.ensure_editable()?;
        self.update_competitor(side, |c| c.flag_image = flag)
    }

    pub fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    /// Bracket slot currently shown on `side`.
    pub fn slot_of(&self, side: Side) -> Side {
        if self.swapped {
            side.opponent()
        } else {
            side
        }
    }

    pub fn competitor(&self, side: Side) -> Option<&Competitor> {
        let slot = self.slot_of(side);
        self.setup.as_ref().map(|s| &s.competitors[slot.index()])
    }

    pub fn match_id(&self) -> Option<&str> {
        self.setup.as_ref().map(|s| s.match_id.as_str())
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn rules(&self) -> MatchRules {
        self.rules
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn event_lines(&self) -> &[String] {
        &self.event_log
    }

    pub fn is_clock_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Whether the bout has begun (clock moved or anything recorded).
    pub fn has_started(&self) -> bool {
        self.clock.has_started() || !self.event_log.is_empty()
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            state: self.state,
            match_id: self.match_id().map(str::to_string),
            ao: self.competitor(Side::Ao).cloned(),
            aka: self.competitor(Side::Aka).cloned(),
            score: self.scoreboard.snapshot(),
            clock: self.clock.snapshot(),
            duration_label: self.rules.duration.label(),
            pending: self.pending,
            swapped: self.swapped,
            winner: self.outcome.map(|(side, _)| side),
            reason: self.outcome.map(|(_, reason)| reason),
            event_lines: self.event_log.clone(),
        }
    }

    fn ensure_live(&self, what: &str) -> Result<(), CoreError> {
        if self.state == MatchState::InProgress {
            Ok(())
        } else {
            Err(self.locked(what))
        }
    }

    fn ensure_editable(&self) -> Result<(), CoreError> {
        self.ensure_live("competitor edit")?;
        if self.has_started() {
            return Err(CoreError::invalid(
                "competitors can only be edited before the bout starts",
            ));
        }
        Ok(())
    }

    fn locked(&self, what: &str) -> CoreError {
        let state = match self.state {
            MatchState::Setup => "no match is loaded",
            MatchState::InProgress => "the match is in progress",
            MatchState::AwaitingDecision => "the match is awaiting a decision",
            MatchState::Complete => "the match is complete",
        };
        CoreError::invalid(format!("{what} rejected: {state}"))
    }

    fn update_competitor(
        &mut self,
        side: Side,
        apply: impl FnOnce(&mut Competitor),
    ) -> Result<Vec<CoreEvent>, CoreError> {
        let slot = self.slot_of(side);
        let setup = self
            .setup
            .as_mut()
            .ok_or_else(|| CoreError::invalid("no match is loaded"))?;
        let competitor = &mut setup.competitors[slot.index()];
        apply(competitor);
        Ok(vec![CoreEvent::CompetitorUpdated {
            side,
            competitor: competitor.clone(),
        }])
    }

    fn mark_started(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    fn record(&mut self, text: String) {
        self.event_log
            .push(format!("[{}] {text}", self.clock.display()));
    }

    fn clock_event(&self) -> CoreEvent {
        CoreEvent::ClockTick {
            remaining_secs: self.clock.remaining_secs(),
            running: self.clock.is_running(),
        }
    }

    fn on_expiry(&mut self) -> Vec<CoreEvent> {
        self.record("time expired".to_string());
        let mut events = vec![CoreEvent::ClockExpired];
        match self.scoreboard.leader() {
            Some(leader) => events.extend(self.finish(leader, DecisionReason::TimeExpired)),
            None => {
                self.state = MatchState::AwaitingDecision;
                if self.pending.take().is_some() {
                    events.push(CoreEvent::PendingActionChanged { pending: None });
                }
                tracing::info!(match_id = ?self.match_id(), "Time expired on a tie, awaiting decision");
                events.push(CoreEvent::MatchStateChanged {
                    state: MatchState::AwaitingDecision,
                });
            }
        }
        events
    }

    /// Enter COMPLETE: stop the clock, lock the controls, and build the log entry.
    fn finish(&mut self, winner: Side, reason: DecisionReason) -> Vec<CoreEvent> {
        self.clock.pause();
        let mut events = Vec::new();
        if self.pending.take().is_some() {
            events.push(CoreEvent::PendingActionChanged { pending: None });
        }
        self.state = MatchState::Complete;
        self.outcome = Some((winner, reason));
        self.record(format!("{winner} wins ({})", reason.as_str()));

        let winner_name = self.display_name(winner);
        let loser_name = self.display_name(winner.opponent());
        let winner_slot = self.slot_of(winner);
        let disqualified_slot =
            (reason == DecisionReason::Disqualification).then(|| winner_slot.opponent());

        let end = Utc::now();
        let start = self.started_at.unwrap_or(self.prepared_at);
        let [ao, aka] = self.scoreboard.scores();
        let (match_id, division, referee_name) = match &self.setup {
            Some(s) => (s.match_id.clone(), s.division.clone(), s.referee_name.clone()),
            None => (String::new(), String::new(), String::new()),
        };
        let entry = MatchLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            filename: log_filename(
                &division,
                &self.display_name(Side::Ao),
                &self.display_name(Side::Aka),
                end,
            ),
            timestamp_range: TimestampRange { start, end },
            division,
            referee_name,
            winner: winner_name.clone(),
            loser: loser_name,
            reason,
            event_lines: self.event_log.clone(),
            final_score: FinalScore { ao, aka },
        };

        tracing::info!(
            match_id = %match_id,
            winner = %winner_name,
            reason = reason.as_str(),
            score = %format!("{ao}-{aka}"),
            "Match complete"
        );

        self.completion = Some(Completion {
            match_id,
            winner_slot,
            reason,
            disqualified_slot,
            entry,
        });

        events.extend([
            self.clock_event(),
            CoreEvent::MatchStateChanged {
                state: MatchState::Complete,
            },
            CoreEvent::WinnerDeclared {
                side: winner,
                name: winner_name,
                reason,
            },
        ]);
        events
    }

    fn display_name(&self, side: Side) -> String {
        self.competitor(side)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| side.to_string())
    }
}
