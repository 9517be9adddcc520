// Single-elimination bracket: rounds of matches, winner advancement, byes.

use serde::{Deserialize, Serialize};

use crate::engine::scoreboard::Side;
use crate::error::CoreError;

/// A competitor as entered into the bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default)]
    pub seed: Option<u32>,
    /// Opaque reference to an uploaded flag image (data URL or asset key).
    #[serde(default)]
    pub flag_image: Option<String>,
    /// Set by a disqualification; later rounds treat the competitor as withdrawn.
    #[serde(skip_deserializing)]
    pub ineligible: bool,
}

impl Competitor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: None,
            flag_image: None,
            ineligible: false,
        }
    }
}

/// Index into the bracket's competitor list.
pub type CompetitorId = usize;

/// A position within a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "competitor", rename_all = "snake_case")]
pub enum Slot {
    /// Waiting for the winner of a feeding match.
    Tbd,
    /// Permanently empty; the opponent advances without a bout.
    Bye,
    Filled(CompetitorId),
}

#[derive(Debug, Clone, Serialize)]
pub struct BracketMatch {
    pub id: String,
    pub slots: [Slot; 2],
    pub winner: Option<Side>,
    pub complete: bool,
    /// Decided without a bout (bye or withdrawn opponent).
    pub walkover: bool,
}

impl BracketMatch {
    fn new(round: usize, index: usize, slots: [Slot; 2]) -> Self {
        Self {
            id: format!("R{}-M{}", round + 1, index + 1),
            slots,
            winner: None,
            complete: false,
            walkover: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub label: String,
    pub matches: Vec<BracketMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchRef {
    pub round: usize,
    pub index: usize,
}

/// Result of moving the bracket forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextMatch {
    Ready(MatchRef),
    TournamentComplete,
}

/// What `advance` recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advanced {
    pub match_id: String,
    pub winner: CompetitorId,
    /// Where the winner was written, if a later round exists.
    pub target: Option<(MatchRef, Side)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Present,
    Absent,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bracket {
    competitors: Vec<Competitor>,
    rounds: Vec<Round>,
    active: Option<MatchRef>,
}

/// Pair competitors in input order: (0 vs 1), (2 vs 3), etc.
///
/// An odd final entry is paired with a bye.
pub fn generate_single_elimination_pairs(participants: &[CompetitorId]) -> Vec<[Slot; 2]> {
    participants
        .chunks(2)
        .map(|pair| match pair {
            [a, b] => [Slot::Filled(*a), Slot::Filled(*b)],
            [a] => [Slot::Filled(*a), Slot::Bye],
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Number of rounds for `n` competitors: ceil(log2 n), at least one.
pub fn total_rounds(num_participants: usize) -> usize {
    if num_participants <= 2 {
        1
    } else {
        num_participants.next_power_of_two().trailing_zeros() as usize
    }
}

fn round_label(round: usize, total: usize) -> String {
    match total - round {
        1 => "Final".to_string(),
        2 => "Semi-final".to_string(),
        3 => "Quarter-final".to_string(),
        _ => format!("Round {}", round + 1),
    }
}

impl Bracket {
    /// Build every round up front. Round 0 pairs competitors in order, later
    /// rounds start as TBD placeholders; byes are resolved immediately.
    pub fn build(competitors: Vec<Competitor>) -> Result<Self, CoreError> {
        if competitors.is_empty() {
            return Err(CoreError::config("a bracket needs at least one competitor"));
        }
        if let Some(pos) = competitors.iter().position(|c| c.name.trim().is_empty()) {
            return Err(CoreError::config(format!("competitor #{} has no name", pos + 1)));
        }

        let ids: Vec<CompetitorId> = (0..competitors.len()).collect();
        let mut round_slots = vec![generate_single_elimination_pairs(&ids)];
        for _ in 1..total_rounds(competitors.len()) {
            let feeding = round_slots.last().map_or(0, Vec::len);
            let size = feeding.div_ceil(2);
            let slots = (0..size)
                .map(|m| {
                    let feeder = |s: usize| {
                        if 2 * m + s < feeding {
                            Slot::Tbd
                        } else {
                            Slot::Bye
                        }
                    };
                    [feeder(0), feeder(1)]
                })
                .collect();
            round_slots.push(slots);
        }

        let total = round_slots.len();
        let rounds = round_slots
            .into_iter()
            .enumerate()
            .map(|(r, slots)| Round {
                label: round_label(r, total),
                matches: slots
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| BracketMatch::new(r, i, s))
                    .collect(),
            })
            .collect();

        let mut bracket = Bracket {
            competitors,
            rounds,
            active: None,
        };
        bracket.next();
        tracing::info!(
            competitors = bracket.competitors.len(),
            rounds = bracket.rounds.len(),
            "Bracket built"
        );
        Ok(bracket)
    }

    /// Record the active match's winner and write them into the next round.
    ///
    /// A match is decided once: a second call for the same match is rejected
    /// and leaves the bracket untouched.
    pub fn advance(&mut self, winner: Side) -> Result<Advanced, CoreError> {
        let at = self
            .active
            .ok_or_else(|| CoreError::invalid("no active match in the bracket"))?;
        let m = &self.rounds[at.round].matches[at.index];
        if m.complete {
            return Err(CoreError::invalid(format!("match {} is already decided", m.id)));
        }
        let winner_id = match m.slots[winner.index()] {
            Slot::Filled(id) => id,
            _ => {
                return Err(CoreError::invalid(format!(
                    "match {} has no competitor on {winner}",
                    m.id
                )))
            }
        };
        let match_id = m.id.clone();
        let target = self.complete_match(at, Some(winner), false);
        Ok(Advanced {
            match_id,
            winner: winner_id,
            target,
        })
    }

    /// Move the active pointer to the first undecided match, resolving any
    /// byes and walkovers on the way.
    pub fn next(&mut self) -> NextMatch {
        for at in self.resolve_walkovers() {
            let m = &self.rounds[at.round].matches[at.index];
            tracing::info!(match_id = %m.id, winner = ?m.winner, "Match decided by walkover");
        }
        self.active = self.first_undecided();
        match self.active {
            Some(at) => NextMatch::Ready(at),
            None => NextMatch::TournamentComplete,
        }
    }

    /// Flag a competitor as withdrawn from the rest of the tournament.
    pub fn disqualify(&mut self, id: CompetitorId) {
        if let Some(c) = self.competitors.get_mut(id) {
            c.ineligible = true;
        }
    }

    pub fn rename(&mut self, id: CompetitorId, name: &str) -> Result<(), CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::invalid("competitor name cannot be empty"));
        }
        let c = self
            .competitors
            .get_mut(id)
            .ok_or_else(|| CoreError::invalid("unknown competitor"))?;
        c.name = name.trim().to_string();
        Ok(())
    }

    pub fn set_flag(&mut self, id: CompetitorId, flag: Option<String>) -> Result<(), CoreError> {
        let c = self
            .competitors
            .get_mut(id)
            .ok_or_else(|| CoreError::invalid("unknown competitor"))?;
        c.flag_image = flag;
        Ok(())
    }

    pub fn active(&self) -> Option<MatchRef> {
        self.active
    }

    pub fn match_at(&self, at: MatchRef) -> Option<&BracketMatch> {
        self.rounds.get(at.round)?.matches.get(at.index)
    }

    pub fn active_match(&self) -> Option<&BracketMatch> {
        self.active.and_then(|at| self.match_at(at))
    }

    /// Competitor occupying a slot of a match, if it is filled.
    pub fn slot_competitor(&self, at: MatchRef, side: Side) -> Option<(CompetitorId, &Competitor)> {
        match self.match_at(at)?.slots[side.index()] {
            Slot::Filled(id) => self.competitors.get(id).map(|c| (id, c)),
            _ => None,
        }
    }

    pub fn competitor(&self, id: CompetitorId) -> Option<&Competitor> {
        self.competitors.get(id)
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn is_finished(&self) -> bool {
        self.rounds
            .iter()
            .all(|r| r.matches.iter().all(|m| m.complete))
    }

    /// Winner of the final, once every match is decided.
    pub fn champion(&self) -> Option<&Competitor> {
        if !self.is_finished() {
            return None;
        }
        let last = self.rounds.last()?.matches.first()?;
        let side = last.winner?;
        match last.slots[side.index()] {
            Slot::Filled(id) => self.competitors.get(id),
            _ => None,
        }
    }

    fn presence(&self, slot: Slot) -> Presence {
        match slot {
            Slot::Tbd => Presence::Pending,
            Slot::Bye => Presence::Absent,
            Slot::Filled(id) => match self.competitors.get(id) {
                Some(c) if !c.ineligible => Presence::Present,
                _ => Presence::Absent,
            },
        }
    }

    fn first_undecided(&self) -> Option<MatchRef> {
        self.rounds.iter().enumerate().find_map(|(r, round)| {
            round
                .matches
                .iter()
                .position(|m| !m.complete)
                .map(|index| MatchRef { round: r, index })
        })
    }

    /// Complete every undecided match whose slots are settled but missing a
    /// present competitor. Completions only feed later rounds, so one pass
    /// in round order reaches a fixpoint.
    fn resolve_walkovers(&mut self) -> Vec<MatchRef> {
        let mut resolved = Vec::new();
        for round in 0..self.rounds.len() {
            for index in 0..self.rounds[round].matches.len() {
                let at = MatchRef { round, index };
                let m = &self.rounds[round].matches[index];
                if m.complete {
                    continue;
                }
                let presence = [self.presence(m.slots[0]), self.presence(m.slots[1])];
                let winner = match presence {
                    [Presence::Pending, _] | [_, Presence::Pending] => continue,
                    [Presence::Present, Presence::Present] => continue,
                    [Presence::Present, Presence::Absent] => Some(Side::Ao),
                    [Presence::Absent, Presence::Present] => Some(Side::Aka),
                    [Presence::Absent, Presence::Absent] => None,
                };
                self.complete_match(at, winner, true);
                resolved.push(at);
            }
        }
        resolved
    }

    /// Mark a match complete and fill the target slot in the next round.
    /// A match decided with no winner propagates a bye.
    fn complete_match(
        &mut self,
        at: MatchRef,
        winner: Option<Side>,
        walkover: bool,
    ) -> Option<(MatchRef, Side)> {
        let m = &mut self.rounds[at.round].matches[at.index];
        m.complete = true;
        m.winner = winner;
        m.walkover = walkover;
        let carried = match winner {
            Some(side) => m.slots[side.index()],
            None => Slot::Bye,
        };

        let next_round = self.rounds.get_mut(at.round + 1)?;
        let target = MatchRef {
            round: at.round + 1,
            index: at.index / 2,
        };
        let slot_side = Side::from_index(at.index % 2);
        let slot = &mut next_round.matches[target.index].slots[slot_side.index()];
        if *slot == Slot::Tbd {
            *slot = carried;
        }
        Some((target, slot_side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(n: usize) -> Vec<Competitor> {
        (1..=n).map(|i| Competitor::named(format!("P{i}"))).collect()
    }

    fn name_in(b: &Bracket, at: MatchRef, side: Side) -> Option<String> {
        b.slot_competitor(at, side).map(|(_, c)| c.name.clone())
    }

    #[test]
    fn test_pairs_in_order() {
        let pairs = generate_single_elimination_pairs(&[0, 1, 2, 3]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], [Slot::Filled(0), Slot::Filled(1)]);
        assert_eq!(pairs[1], [Slot::Filled(2), Slot::Filled(3)]);
    }

    #[test]
    fn test_pairs_odd_gets_bye() {
        let pairs = generate_single_elimination_pairs(&[0, 1, 2]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], [Slot::Filled(2), Slot::Bye]);
    }

    #[test]
    fn test_ineligible_is_not_accepted_from_input() {
        let c: Competitor =
            serde_json::from_str(r#"{"name":"P1","ineligible":true}"#).unwrap();
        assert!(!c.ineligible);
        let b = Bracket::build(vec![c, Competitor::named("P2")]).unwrap();
        assert_eq!(b.active(), Some(MatchRef { round: 0, index: 0 }));
    }

    #[test]
    fn test_pairs_empty() {
        assert!(generate_single_elimination_pairs(&[]).is_empty());
    }

    #[test]
    fn test_total_rounds() {
        assert_eq!(total_rounds(1), 1);
        assert_eq!(total_rounds(2), 1);
        assert_eq!(total_rounds(4), 2);
        assert_eq!(total_rounds(5), 3);
        assert_eq!(total_rounds(8), 3);
        assert_eq!(total_rounds(9), 4);
    }

    #[test]
    fn test_build_four() {
        let b = Bracket::build(players(4)).unwrap();
        assert_eq!(b.rounds().len(), 2);
        assert_eq!(b.rounds()[0].matches.len(), 2);
        assert_eq!(b.rounds()[1].matches.len(), 1);
        assert_eq!(b.rounds()[0].label, "Semi-final");
        assert_eq!(b.rounds()[1].label, "Final");
        assert_eq!(b.rounds()[1].matches[0].slots, [Slot::Tbd, Slot::Tbd]);
        assert_eq!(b.active(), Some(MatchRef { round: 0, index: 0 }));
        assert_eq!(b.active_match().unwrap().id, "R1-M1");
    }

    #[test]
    fn test_round_sizes_match_total_rounds() {
        for n in 1..=17 {
            let b = Bracket::build(players(n)).unwrap();
            assert_eq!(b.rounds().len(), total_rounds(n), "n = {n}");
            assert_eq!(b.rounds()[0].matches.len(), n.div_ceil(2));
            for w in b.rounds().windows(2) {
                assert_eq!(w[1].matches.len(), w[0].matches.len().div_ceil(2));
            }
            assert_eq!(b.rounds().last().unwrap().matches.len(), 1);
        }
    }

    #[test]
    fn test_build_empty_is_config_error() {
        assert!(matches!(Bracket::build(vec![]), Err(CoreError::Configuration(_))));
        assert!(matches!(
            Bracket::build(vec![Competitor::named("  ")]),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_advance_writes_target_slot() {
        let mut b = Bracket::build(players(4)).unwrap();
        let adv = b.advance(Side::Ao).unwrap();
        assert_eq!(adv.match_id, "R1-M1");
        assert_eq!(adv.winner, 0);
        assert_eq!(adv.target, Some((MatchRef { round: 1, index: 0 }, Side::Ao)));

        assert_eq!(b.next(), NextMatch::Ready(MatchRef { round: 0, index: 1 }));
        b.advance(Side::Aka).unwrap();
        let fin = MatchRef { round: 1, index: 0 };
        assert_eq!(name_in(&b, fin, Side::Ao).as_deref(), Some("P1"));
        assert_eq!(name_in(&b, fin, Side::Aka).as_deref(), Some("P4"));

        assert_eq!(b.next(), NextMatch::Ready(fin));
        assert!(!b.is_finished());
        assert!(b.champion().is_none());
        b.advance(Side::Aka).unwrap();
        assert_eq!(b.next(), NextMatch::TournamentComplete);
        assert!(b.is_finished());
        assert_eq!(b.champion().unwrap().name, "P4");
    }

    #[test]
    fn test_advance_twice_is_rejected() {
        let mut b = Bracket::build(players(4)).unwrap();
        b.advance(Side::Aka).unwrap();
        let err = b.advance(Side::Ao).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand(_)));
        let fin = MatchRef { round: 1, index: 0 };
        assert_eq!(name_in(&b, fin, Side::Ao).as_deref(), Some("P2"));
        assert_eq!(b.rounds()[0].matches[0].winner, Some(Side::Aka));
    }

    #[test]
    fn test_three_players_bye_advances() {
        let b = Bracket::build(players(3)).unwrap();
        let bye_match = &b.rounds()[0].matches[1];
        assert!(bye_match.complete);
        assert!(bye_match.walkover);
        assert_eq!(bye_match.winner, Some(Side::Ao));
        let fin = MatchRef { round: 1, index: 0 };
        assert_eq!(name_in(&b, fin, Side::Aka).as_deref(), Some("P3"));
        assert_eq!(b.active(), Some(MatchRef { round: 0, index: 0 }));
    }

    #[test]
    fn test_five_players_later_round_bye() {
        let mut b = Bracket::build(players(5)).unwrap();
        // R2-M2 has no second feeder: P5 rides two byes straight into the final.
        let r2m2 = &b.rounds()[1].matches[1];
        assert_eq!(r2m2.slots, [Slot::Filled(4), Slot::Bye]);
        assert!(r2m2.complete && r2m2.walkover);
        let fin = MatchRef { round: 2, index: 0 };
        assert_eq!(name_in(&b, fin, Side::Aka).as_deref(), Some("P5"));

        b.advance(Side::Ao).unwrap(); // P1
        b.next();
        b.advance(Side::Ao).unwrap(); // P3
        assert_eq!(b.next(), NextMatch::Ready(MatchRef { round: 1, index: 0 }));
        b.advance(Side::Aka).unwrap(); // P3
        assert_eq!(b.next(), NextMatch::Ready(fin));
        assert_eq!(name_in(&b, fin, Side::Ao).as_deref(), Some("P3"));
    }

    #[test]
    fn test_single_competitor_is_champion() {
        let mut b = Bracket::build(players(1)).unwrap();
        assert!(b.is_finished());
        assert_eq!(b.active(), None);
        assert_eq!(b.next(), NextMatch::TournamentComplete);
        assert_eq!(b.champion().unwrap().name, "P1");
        assert!(b.advance(Side::Ao).is_err());
    }

    #[test]
    fn test_ineligible_competitor_walks_over() {
        let mut b = Bracket::build(players(4)).unwrap();
        b.advance(Side::Ao).unwrap(); // P1 into the final
        b.disqualify(0);
        b.next();
        b.advance(Side::Ao).unwrap(); // P3 into the final
        assert_eq!(b.next(), NextMatch::TournamentComplete);
        let fin = &b.rounds()[1].matches[0];
        assert!(fin.walkover);
        assert_eq!(b.champion().unwrap().name, "P3");
    }

    #[test]
    fn test_rename_and_flag() {
        let mut b = Bracket::build(players(2)).unwrap();
        b.rename(1, " Sato ").unwrap();
        assert_eq!(b.competitor(1).unwrap().name, "Sato");
        assert!(b.rename(1, "").is_err());
        b.set_flag(0, Some("flags/jp.png".into())).unwrap();
        assert_eq!(b.competitor(0).unwrap().flag_image.as_deref(), Some("flags/jp.png"));
        assert!(b.set_flag(9, None).is_err());
    }
}
