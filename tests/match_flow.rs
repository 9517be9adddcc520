// Integration tests: full bouts driven through the tournament session,
// from bracket build to champion.

use kumite_backend::archive::LogArchive;
use kumite_backend::engine::controller::{MatchState, PendingKind};
use kumite_backend::engine::events::{CoreEvent, DecisionReason};
use kumite_backend::engine::scoreboard::{PenaltyCode, Side};
use kumite_backend::engine::session::{BracketRequest, Command, SessionSettings, TournamentSession};
use kumite_backend::error::CoreError;
use kumite_backend::tournament::{Competitor, Slot};

fn session_with(names: &[&str], duration: &str) -> TournamentSession {
    let mut session = TournamentSession::new(SessionSettings::default(), LogArchive::new());
    session
        .build_bracket(BracketRequest {
            competitors: names.iter().map(|n| Competitor::named(*n)).collect(),
            division: Some("Male -75kg".into()),
            referee_name: Some("Okada".into()),
            duration: Some(duration.into()),
        })
        .unwrap();
    session
}

fn points(session: &mut TournamentSession, side: Side, delta: i32) -> Vec<CoreEvent> {
    session.apply(Command::AddPoints { side, delta }).unwrap()
}

/// Run the clock until it stops, collecting every event.
fn run_clock_out(session: &mut TournamentSession) -> Vec<CoreEvent> {
    session.apply(Command::StartClock).unwrap();
    let mut events = Vec::new();
    while session.clock_running() {
        events.extend(session.tick());
    }
    events
}

fn name_at(session: &TournamentSession, round: usize, index: usize, side: Side) -> Option<String> {
    let bracket = session.bracket()?;
    match bracket.rounds()[round].matches[index].slots[side.index()] {
        Slot::Filled(id) => bracket.competitor(id).map(|c| c.name.clone()),
        _ => None,
    }
}

#[test]
fn test_four_player_gap_win_advances() {
    let mut session = session_with(&["P1", "P2", "P3", "P4"], "2:00");
    let bracket = session.bracket().unwrap();
    assert_eq!(bracket.rounds().len(), 2);
    assert_eq!(bracket.rounds()[0].matches.len(), 2);
    assert_eq!(bracket.rounds()[1].matches[0].slots, [Slot::Tbd, Slot::Tbd]);
    assert_eq!(name_at(&session, 0, 1, Side::Ao).as_deref(), Some("P3"));

    points(&mut session, Side::Ao, 3);
    points(&mut session, Side::Ao, 2);
    let events = points(&mut session, Side::Ao, 3);

    assert!(events.contains(&CoreEvent::MatchStateChanged {
        state: MatchState::Complete
    }));
    assert!(events.contains(&CoreEvent::WinnerDeclared {
        side: Side::Ao,
        name: "P1".into(),
        reason: DecisionReason::GapReached,
    }));
    assert_eq!(session.controller().state(), MatchState::Complete);
    assert_eq!(name_at(&session, 1, 0, Side::Ao).as_deref(), Some("P1"));

    // Nothing can change the decided outcome.
    let err = session
        .apply(Command::AddPoints {
            side: Side::Aka,
            delta: 8,
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidCommand(_)));
    assert_eq!(session.archive().read_all()[0].winner, "P1");
}

#[test]
fn test_tied_expiry_then_manual_aka_win() {
    let mut session = session_with(&["Ito", "Mori"], "0:30");
    points(&mut session, Side::Ao, 3);
    points(&mut session, Side::Aka, 3);
    session
        .apply(Command::ToggleSenshu { side: Side::Ao })
        .unwrap();

    let events = run_clock_out(&mut session);
    let expiries = events
        .iter()
        .filter(|e| **e == CoreEvent::ClockExpired)
        .count();
    assert_eq!(expiries, 1);
    // Senshu never decides a tie on its own.
    assert_eq!(session.controller().state(), MatchState::AwaitingDecision);
    assert_eq!(session.controller().clock().remaining_secs(), 0);
    assert!(session.archive().is_empty());

    session
        .apply(Command::DeclareWinner { side: Side::Aka })
        .unwrap();
    assert_eq!(session.controller().state(), MatchState::Complete);
    let entry = &session.archive().read_all()[0];
    assert_eq!(entry.winner, "Mori");
    assert_eq!(entry.reason, DecisionReason::ManualDecision);
    assert_eq!(entry.final_score.ao, 3);
    assert_eq!(entry.final_score.aka, 3);
    assert!(entry.event_lines.iter().any(|l| l.contains("time expired")));

    // Re-entrant declaration is refused.
    assert!(session
        .apply(Command::DeclareWinner { side: Side::Ao })
        .is_err());
}

#[test]
fn test_disqualification_against_ao() {
    let mut session = session_with(&["P1", "P2", "P3", "P4"], "2:00");
    points(&mut session, Side::Ao, 5);
    session
        .apply(Command::StagePendingAction {
            kind: PendingKind::Disqualification,
            offender: Side::Ao,
        })
        .unwrap();
    assert_eq!(session.controller().state(), MatchState::InProgress);
    session.apply(Command::ConfirmPendingAction).unwrap();

    let ctl = session.controller();
    assert_eq!(ctl.state(), MatchState::Complete);
    assert_eq!(ctl.scoreboard().score(Side::Aka), 8);
    assert_eq!(ctl.scoreboard().score(Side::Ao), 0);
    assert!(ctl
        .scoreboard()
        .penalties(Side::Ao)
        .contains(&PenaltyCode::Shikkaku));
    assert_eq!(
        session.archive().read_all()[0].reason,
        DecisionReason::Disqualification
    );

    let bracket = session.bracket().unwrap();
    assert!(bracket.competitor(0).unwrap().ineligible);
    assert!(!bracket.competitor(1).unwrap().ineligible);
    assert_eq!(name_at(&session, 1, 0, Side::Ao).as_deref(), Some("P2"));
}

#[test]
fn test_cancel_staged_forfeiture() {
    let mut session = session_with(&["P1", "P2"], "2:00");
    points(&mut session, Side::Ao, 2);
    points(&mut session, Side::Aka, 1);
    session
        .apply(Command::StagePendingAction {
            kind: PendingKind::Forfeiture,
            offender: Side::Aka,
        })
        .unwrap();
    let events = session.apply(Command::CancelPendingAction).unwrap();
    assert_eq!(events, vec![CoreEvent::PendingActionChanged { pending: None }]);

    let ctl = session.controller();
    assert_eq!(ctl.state(), MatchState::InProgress);
    assert_eq!(ctl.scoreboard().scores(), [2, 1]);
    assert!(ctl.pending().is_none());
    assert!(session.archive().is_empty());
}

#[test]
fn test_forfeiture_awards_fixed_score() {
    let mut session = session_with(&["P1", "P2"], "2:00");
    points(&mut session, Side::Aka, 6);
    session
        .apply(Command::StagePendingAction {
            kind: PendingKind::Forfeiture,
            offender: Side::Aka,
        })
        .unwrap();
    session.apply(Command::ConfirmPendingAction).unwrap();
    let entry = &session.archive().read_all()[0];
    assert_eq!(entry.winner, "P1");
    assert_eq!(entry.reason, DecisionReason::Forfeiture);
    assert_eq!((entry.final_score.ao, entry.final_score.aka), (8, 0));
    // A forfeit does not disqualify.
    assert!(!session.bracket().unwrap().competitor(1).unwrap().ineligible);
}

#[test]
fn test_expiry_with_leader_decides_on_time() {
    let mut session = session_with(&["P1", "P2"], "0:30");
    points(&mut session, Side::Aka, 1);
    run_clock_out(&mut session);
    assert_eq!(session.controller().state(), MatchState::Complete);
    assert_eq!(
        session.archive().read_all()[0].reason,
        DecisionReason::TimeExpired
    );
}

#[test]
fn test_tournament_runs_to_champion() {
    let mut session = session_with(&["A", "B", "C", "D", "E"], "1:00");
    let mut champion = None;
    let mut bouts = 0;
    loop {
        // AO always wins by a gap.
        points(&mut session, Side::Ao, 8);
        bouts += 1;
        let events = session.apply(Command::AdvanceToNextMatch).unwrap();
        if let Some(CoreEvent::TournamentComplete { champion: c }) = events
            .iter()
            .find(|e| matches!(e, CoreEvent::TournamentComplete { .. }))
        {
            champion = c.clone();
            break;
        }
        assert!(bouts < 10, "tournament did not finish");
    }
    // A beats B, C beats D, A beats C, E walked over twice, A beats E.
    assert_eq!(bouts, 4);
    assert_eq!(champion.as_deref(), Some("A"));
    assert_eq!(session.archive().len(), 4);
    assert_eq!(session.controller().state(), MatchState::Setup);
    // Most recent first: the final.
    assert_eq!(session.archive().read_all()[0].loser, "E");
}

#[test]
fn test_disqualification_in_final_crowns_opponent() {
    let mut session = session_with(&["P1", "P2"], "2:00");
    session
        .apply(Command::StagePendingAction {
            kind: PendingKind::Disqualification,
            offender: Side::Aka,
        })
        .unwrap();
    session.apply(Command::ConfirmPendingAction).unwrap();
    let events = session.apply(Command::AdvanceToNextMatch).unwrap();
    assert!(events.contains(&CoreEvent::TournamentComplete {
        champion: Some("P1".into())
    }));
    assert!(session.bracket().unwrap().competitor(1).unwrap().ineligible);
}

#[test]
fn test_swapped_sides_report_bracket_slot() {
    let mut session = session_with(&["P1", "P2", "P3", "P4"], "2:00");
    session.apply(Command::SwapSides).unwrap();
    // P2 now shows on AO.
    assert_eq!(session.controller().competitor(Side::Ao).unwrap().name, "P2");
    points(&mut session, Side::Ao, 8);
    assert_eq!(name_at(&session, 1, 0, Side::Ao).as_deref(), Some("P2"));
    assert_eq!(session.bracket().unwrap().rounds()[0].matches[0].winner, Some(Side::Aka));
}

#[test]
fn test_disqualification_after_swap_marks_bracket_competitor() {
    let mut session = session_with(&["P1", "P2", "P3", "P4"], "2:00");
    session.apply(Command::SwapSides).unwrap();
    // P2 shows on AO but holds the AKA bracket slot.
    session
        .apply(Command::StagePendingAction {
            kind: PendingKind::Disqualification,
            offender: Side::Ao,
        })
        .unwrap();
    session.apply(Command::ConfirmPendingAction).unwrap();

    let entry = &session.archive().read_all()[0];
    assert_eq!(entry.winner, "P1");
    assert_eq!(entry.loser, "P2");
    let bracket = session.bracket().unwrap();
    assert!(!bracket.competitor(0).unwrap().ineligible);
    assert!(bracket.competitor(1).unwrap().ineligible);
    assert_eq!(bracket.rounds()[0].matches[0].winner, Some(Side::Ao));
    assert_eq!(name_at(&session, 1, 0, Side::Ao).as_deref(), Some("P1"));
}

#[test]
fn test_swap_while_staged_follows_offender() {
    let mut session = session_with(&["P1", "P2"], "2:00");
    session
        .apply(Command::StagePendingAction {
            kind: PendingKind::Disqualification,
            offender: Side::Ao,
        })
        .unwrap();
    session.apply(Command::SwapSides).unwrap();
    assert_eq!(session.controller().pending().unwrap().offender, Side::Aka);
    session.apply(Command::ConfirmPendingAction).unwrap();
    // P1 was staged before the swap and stays the offender.
    assert!(session.bracket().unwrap().competitor(0).unwrap().ineligible);
    assert_eq!(session.archive().read_all()[0].winner, "P2");
}

#[test]
fn test_reset_then_replay_bout() {
    let mut session = session_with(&["P1", "P2"], "0:30");
    points(&mut session, Side::Ao, 4);
    session
        .apply(Command::TogglePenalty {
            side: Side::Aka,
            code: PenaltyCode::C1,
        })
        .unwrap();
    session.apply(Command::ResetMatch).unwrap();
    assert_eq!(session.controller().scoreboard().scores(), [0, 0]);
    assert!(session.controller().event_lines().is_empty());
    assert!(session.archive().is_empty());
    points(&mut session, Side::Aka, 8);
    assert_eq!(session.archive().read_all()[0].winner, "P2");
}
