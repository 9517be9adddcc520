// Tournament session: ties the bracket, the match controller and the log
// archive together behind one command surface.

use serde::{Deserialize, Serialize};

use super::config::{MatchDuration, MatchRules};
use super::controller::{MatchController, MatchSetup, MatchSnapshot, MatchState, PendingKind};
use super::events::CoreEvent;
use super::scoreboard::{PenaltyCode, Side};
use crate::archive::LogArchive;
use crate::error::CoreError;
use crate::metrics;
use crate::tournament::{Bracket, Competitor, NextMatch};

/// Officials' context stamped on every log entry, plus the bout rules.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub division: String,
    pub referee_name: String,
    pub rules: MatchRules,
}

/// Commands issued by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddPoints { side: Side, delta: i32 },
    TogglePenalty { side: Side, code: PenaltyCode },
    ToggleSenshu { side: Side },
    StartClock,
    PauseClock,
    AdjustClock { delta_secs: i32 },
    SetDuration { label: String },
    ResetMatch,
    DeclareWinner { side: Side },
    StagePendingAction { kind: PendingKind, offender: Side },
    ConfirmPendingAction,
    CancelPendingAction,
    SwapSides,
    AdvanceToNextMatch,
    RenameCompetitor { side: Side, name: String },
    SetFlag { side: Side, flag: Option<String> },
}

impl Command {
    /// Short name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddPoints { .. } => "add_points",
            Command::TogglePenalty { .. } => "toggle_penalty",
            Command::ToggleSenshu { .. } => "toggle_senshu",
            Command::StartClock => "start_clock",
            Command::PauseClock => "pause_clock",
            Command::AdjustClock { .. } => "adjust_clock",
            Command::SetDuration { .. } => "set_duration",
            Command::ResetMatch => "reset_match",
            Command::DeclareWinner { .. } => "declare_winner",
            Command::StagePendingAction { .. } => "stage_pending_action",
            Command::ConfirmPendingAction => "confirm_pending_action",
            Command::CancelPendingAction => "cancel_pending_action",
            Command::SwapSides => "swap_sides",
            Command::AdvanceToNextMatch => "advance_to_next_match",
            Command::RenameCompetitor { .. } => "rename_competitor",
            Command::SetFlag { .. } => "set_flag",
        }
    }
}

/// Request body for building a new bracket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BracketRequest {
    pub competitors: Vec<Competitor>,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub referee_name: Option<String>,
    /// Duration label such as `2:00`; keeps the current duration when absent.
    #[serde(default)]
    pub duration: Option<String>,
}

/// Everything a renderer needs to draw the current state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub division: String,
    pub referee_name: String,
    #[serde(rename = "match")]
    pub current: MatchSnapshot,
    pub bracket: Option<Bracket>,
    pub champion: Option<Competitor>,
    pub log_count: usize,
}

pub struct TournamentSession {
    settings: SessionSettings,
    bracket: Option<Bracket>,
    controller: MatchController,
    archive: LogArchive,
}

impl TournamentSession {
    pub fn new(settings: SessionSettings, archive: LogArchive) -> Self {
        let controller = MatchController::new(settings.rules);
        Self {
            settings,
            bracket: None,
            controller,
            archive,
        }
    }

    /// Replace the bracket and load its first match.
    pub fn build_bracket(&mut self, request: BracketRequest) -> Result<Vec<CoreEvent>, CoreError> {
        if self.controller.is_clock_running() {
            return Err(CoreError::invalid(
                "pause the clock before building a new bracket",
            ));
        }
        let duration = request
            .duration
            .as_deref()
            .map(MatchDuration::parse)
            .transpose()?;
        let bracket = Bracket::build(request.competitors)?;

        if let Some(division) = request.division {
            self.settings.division = division.trim().to_string();
        }
        if let Some(referee) = request.referee_name {
            self.settings.referee_name = referee.trim().to_string();
        }
        if let Some(duration) = duration {
            self.settings.rules.duration = duration;
        }
        self.controller = MatchController::new(self.settings.rules);
        self.bracket = Some(bracket);

        let mut events = vec![CoreEvent::BracketUpdated];
        events.extend(self.load_active());
        Ok(events)
    }

    pub fn apply(&mut self, command: Command) -> Result<Vec<CoreEvent>, CoreError> {
        let name = command.name();
        let result = self.dispatch(command);
        match &result {
            Ok(_) => tracing::debug!(command = name, "Command applied"),
            Err(e) => {
                metrics::COMMANDS_REJECTED_TOTAL
                    .with_label_values(&[e.kind()])
                    .inc();
                tracing::debug!(command = name, error = %e, "Command rejected");
            }
        }
        result
    }

    /// One-second clock step, driven by the server's ticker.
    pub fn tick(&mut self) -> Vec<CoreEvent> {
        let mut events = self.controller.tick();
        self.absorb_completion(&mut events);
        events
    }

    pub fn clock_running(&self) -> bool {
        self.controller.is_clock_running()
    }

    pub fn controller(&self) -> &MatchController {
        &self.controller
    }

    pub fn bracket(&self) -> Option<&Bracket> {
        self.bracket.as_ref()
    }

    pub fn archive(&self) -> &LogArchive {
        &self.archive
    }

    pub fn archive_mut(&mut self) -> &mut LogArchive {
        &mut self.archive
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            division: self.settings.division.clone(),
            referee_name: self.settings.referee_name.clone(),
            current: self.controller.snapshot(),
            bracket: self.bracket.clone(),
            champion: self.bracket.as_ref().and_then(|b| b.champion()).cloned(),
            log_count: self.archive.len(),
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<Vec<CoreEvent>, CoreError> {
        let c = &mut self.controller;
        let mut events = match command {
            Command::AddPoints { side, delta } => c.add_points(side, delta)?,
            Command::TogglePenalty { side, code } => c.toggle_penalty(side, code)?,
            Command::ToggleSenshu { side } => c.toggle_senshu(side)?,
            Command::StartClock => c.start_clock()?,
            Command::PauseClock => c.pause_clock()?,
            Command::AdjustClock { delta_secs } => c.adjust_clock(delta_secs)?,
            Command::SetDuration { label } => {
                let duration = MatchDuration::parse(&label)?;
                let events = c.set_duration(duration)?;
                self.settings.rules.duration = duration;
                events
            }
            Command::ResetMatch => c.reset_match()?,
            Command::DeclareWinner { side } => c.declare_winner(side)?,
            Command::StagePendingAction { kind, offender } => {
                c.stage_pending_action(kind, offender)?
            }
            Command::ConfirmPendingAction => c.confirm_pending_action()?,
            Command::CancelPendingAction => c.cancel_pending_action(),
            Command::SwapSides => c.swap_sides()?,
            Command::AdvanceToNextMatch => return self.advance_to_next_match(),
            Command::RenameCompetitor { side, name } => {
                let events = c.rename_competitor(side, &name)?;
                self.write_through(side)?;
                events
            }
            Command::SetFlag { side, flag } => {
                let events = c.set_flag(side, flag)?;
                self.write_through(side)?;
                events
            }
        };
        self.absorb_completion(&mut events);
        Ok(events)
    }

    fn advance_to_next_match(&mut self) -> Result<Vec<CoreEvent>, CoreError> {
        if self.bracket.is_none() {
            return Err(CoreError::invalid("no bracket has been built"));
        }
        match self.controller.state() {
            MatchState::Complete => Ok(self.load_active()),
            MatchState::Setup => Err(CoreError::invalid("the tournament is complete")),
            MatchState::InProgress | MatchState::AwaitingDecision => Err(CoreError::invalid(
                "the current match has not been decided",
            )),
        }
    }

    /// Point the bracket at its next undecided match and prepare the controller for it.
    fn load_active(&mut self) -> Vec<CoreEvent> {
        let Some(bracket) = self.bracket.as_mut() else {
            return Vec::new();
        };
        let at = match bracket.next() {
            NextMatch::Ready(at) => at,
            NextMatch::TournamentComplete => return self.finish_tournament(),
        };
        let (Some((_, ao)), Some((_, aka)), Some(m)) = (
            bracket.slot_competitor(at, Side::Ao),
            bracket.slot_competitor(at, Side::Aka),
            bracket.match_at(at),
        ) else {
            tracing::warn!(round = at.round, index = at.index, "Active match has an unfilled slot");
            return self.controller.clear();
        };
        let setup = MatchSetup {
            match_id: m.id.clone(),
            competitors: [ao.clone(), aka.clone()],
            division: self.settings.division.clone(),
            referee_name: self.settings.referee_name.clone(),
        };
        // Walkovers resolved by next() changed the bracket too.
        let mut events = vec![CoreEvent::BracketUpdated];
        events.extend(self.controller.prepare(setup));
        events
    }

    fn finish_tournament(&mut self) -> Vec<CoreEvent> {
        let champion = self
            .bracket
            .as_ref()
            .and_then(|b| b.champion())
            .map(|c| c.name.clone());
        tracing::info!(champion = ?champion, "Tournament complete");
        let mut events = self.controller.clear();
        events.push(CoreEvent::TournamentComplete { champion });
        events
    }

    /// Mirror a pre-bout competitor edit into the bracket's record.
    fn write_through(&mut self, side: Side) -> Result<(), CoreError> {
        let Some(bracket) = self.bracket.as_mut() else {
            return Ok(());
        };
        let Some(at) = bracket.active() else {
            return Ok(());
        };
        let slot = self.controller.slot_of(side);
        let Some(updated) = self.controller.competitor(side).cloned() else {
            return Ok(());
        };
        let Some((id, _)) = bracket.slot_competitor(at, slot) else {
            return Ok(());
        };
        bracket.rename(id, &updated.name)?;
        bracket.set_flag(id, updated.flag_image)
    }

    /// Archive a freshly decided bout and report its winner to the bracket.
    fn absorb_completion(&mut self, events: &mut Vec<CoreEvent>) {
        let Some(done) = self.controller.take_completion() else {
            return;
        };
        let label = done.reason.metric_label();
        let range = done.entry.timestamp_range;
        let elapsed = (range.end - range.start).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::MATCHES_COMPLETED_TOTAL
            .with_label_values(&[label])
            .inc();
        metrics::MATCH_DURATION_SECONDS
            .with_label_values(&[label])
            .observe(elapsed);

        let id = done.entry.id.clone();
        self.archive.append_one(done.entry);
        events.push(CoreEvent::LogAppended { id });

        let Some(bracket) = self.bracket.as_mut() else {
            return;
        };
        let Some(at) = bracket.active() else {
            return;
        };
        if bracket.match_at(at).map(|m| m.id.as_str()) != Some(done.match_id.as_str()) {
            tracing::warn!(match_id = %done.match_id, "Completed bout is not the bracket's active match");
            return;
        }
        if let Some(slot) = done.disqualified_slot {
            if let Some((id, c)) = bracket.slot_competitor(at, slot) {
                tracing::info!(competitor = %c.name, "Competitor disqualified from the tournament");
                bracket.disqualify(id);
            }
        }
        match bracket.advance(done.winner_slot) {
            Ok(advanced) => {
                tracing::info!(
                    match_id = %advanced.match_id,
                    target = ?advanced.target,
                    "Winner advanced"
                );
                events.push(CoreEvent::BracketUpdated);
            }
            Err(e) => tracing::warn!(match_id = %done.match_id, error = %e, "Bracket advance refused"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::DecisionReason;

    fn request(names: &[&str]) -> BracketRequest {
        BracketRequest {
            competitors: names.iter().map(|n| Competitor::named(*n)).collect(),
            division: Some("Open".into()),
            referee_name: Some("Kim".into()),
            duration: Some("1:00".into()),
        }
    }

    fn session(names: &[&str]) -> TournamentSession {
        let mut s = TournamentSession::new(SessionSettings::default(), LogArchive::new());
        s.build_bracket(request(names)).unwrap();
        s
    }

    #[test]
    fn test_build_prepares_first_match() {
        let s = session(&["P1", "P2", "P3", "P4"]);
        let snap = s.snapshot();
        assert_eq!(snap.current.state, MatchState::InProgress);
        assert_eq!(snap.current.ao.unwrap().name, "P1");
        assert_eq!(snap.current.aka.unwrap().name, "P2");
        assert_eq!(snap.current.clock.remaining_secs, 60);
        assert_eq!(snap.division, "Open");
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let mut s = TournamentSession::new(SessionSettings::default(), LogArchive::new());
        assert!(matches!(
            s.build_bracket(BracketRequest::default()),
            Err(CoreError::Configuration(_))
        ));
        let mut req = request(&["A", "B"]);
        req.duration = Some("1:15".into());
        assert!(matches!(s.build_bracket(req), Err(CoreError::Configuration(_))));
        assert!(s.bracket().is_none());
    }

    #[test]
    fn test_completion_archives_and_advances() {
        let mut s = session(&["P1", "P2", "P3", "P4"]);
        let events = s
            .apply(Command::AddPoints {
                side: Side::Ao,
                delta: 8,
            })
            .unwrap();
        assert!(events.iter().any(|e| matches!(e, CoreEvent::LogAppended { .. })));
        assert!(events.contains(&CoreEvent::BracketUpdated));
        assert_eq!(s.archive().len(), 1);
        assert_eq!(s.archive().read_all()[0].reason, DecisionReason::GapReached);
        assert_eq!(s.archive().read_all()[0].division, "Open");

        // Still showing the finished bout until the officials move on.
        assert_eq!(s.controller().state(), MatchState::Complete);
        s.apply(Command::AdvanceToNextMatch).unwrap();
        assert_eq!(s.controller().competitor(Side::Ao).unwrap().name, "P3");
    }

    #[test]
    fn test_advance_rejected_while_undecided() {
        let mut s = session(&["P1", "P2"]);
        let err = s.apply(Command::AdvanceToNextMatch).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand(_)));
    }

    #[test]
    fn test_final_reports_champion() {
        let mut s = session(&["P1", "P2"]);
        s.apply(Command::DeclareWinner { side: Side::Aka }).unwrap();
        let events = s.apply(Command::AdvanceToNextMatch).unwrap();
        assert!(events.contains(&CoreEvent::TournamentComplete {
            champion: Some("P2".into())
        }));
        assert_eq!(s.controller().state(), MatchState::Setup);
        assert!(s.apply(Command::StartClock).is_err());
        assert!(s.apply(Command::AdvanceToNextMatch).is_err());
    }

    #[test]
    fn test_rename_writes_through_to_bracket() {
        let mut s = session(&["P1", "P2"]);
        s.apply(Command::RenameCompetitor {
            side: Side::Aka,
            name: "Sato".into(),
        })
        .unwrap();
        assert_eq!(s.bracket().unwrap().competitor(1).unwrap().name, "Sato");
    }

    #[test]
    fn test_set_duration_persists_to_next_match() {
        let mut s = session(&["P1", "P2", "P3", "P4"]);
        s.apply(Command::SetDuration { label: "3:00".into() }).unwrap();
        s.apply(Command::DeclareWinner { side: Side::Ao }).unwrap();
        s.apply(Command::AdvanceToNextMatch).unwrap();
        assert_eq!(s.controller().clock().remaining_secs(), 180);
    }

    #[test]
    fn test_command_deserialization() {
        let cmd: Command =
            serde_json::from_str(r#"{"type":"add_points","side":"aka","delta":2}"#).unwrap();
        assert_eq!(
            cmd,
            Command::AddPoints {
                side: Side::Aka,
                delta: 2
            }
        );
        let cmd: Command = serde_json::from_str(
            r#"{"type":"stage_pending_action","kind":"disqualification","offender":"ao"}"#,
        )
        .unwrap();
        assert_eq!(cmd.name(), "stage_pending_action");
        assert!(serde_json::from_str::<Command>(r#"{"type":"explode"}"#).is_err());
    }
}
