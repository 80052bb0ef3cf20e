use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::boneyard::Boneyard;
use crate::config::{DoubleRule, MatchConfig};
use crate::errors::GameError;
use crate::hand::Hand;
use crate::logger::{ActionRecord, RoundAction};
use crate::tile::{total_tiles, Orientation, Tile};
use crate::train::{Train, TrainRef};
use crate::validator;
use crate::PlayerId;

/// Where the round's state machine currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RoundPhase {
    /// Created, tiles not dealt yet
    Dealing,
    /// Waiting on the current player to play, draw or pass
    AwaitingMove,
    /// The current player drew `tile` and may play it (and nothing else) or pass
    MayPlayDrawn { tile: Tile },
    RoundOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEndReason {
    /// A player emptied their hand
    Domino,
    /// Boneyard empty and nobody could play
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub winner: Option<PlayerId>,
    pub reason: RoundEndReason,
    /// Pip penalty per player for this round, winner at 0
    pub scores: BTreeMap<PlayerId, u32>,
}

/// Result of a successful `draw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub tile: Tile,
    pub can_play_drawn: bool,
    pub turn_passed: bool,
}

#[derive(Debug, Clone)]
struct Seat {
    id: PlayerId,
    hand: Hand,
    train: Train,
}

/// State machine for one round: deal, turns, double satisfaction, round end and scoring.
///
/// Every mutating call either succeeds or returns an error with the state untouched.
/// The one exception is `draw` on an empty boneyard, which passes the turn and then
/// reports [`GameError::EmptyBoneyard`].
#[derive(Debug, Clone)]
pub struct RoundEngine {
    engine_value: u8,
    max_pip: u8,
    hand_size: usize,
    double_rule: DoubleRule,
    seed: Option<u64>,
    seats: Vec<Seat>,
    mexican_train: Train,
    boneyard: Boneyard,
    current: usize,
    phase: RoundPhase,
    turn: u64,
    total_tiles: usize,
    actions: Vec<ActionRecord>,
    outcome: Option<RoundOutcome>,
}

impl RoundEngine {
    /// Creates an undealt round. Call [`RoundEngine::start_round`] to shuffle and deal.
    pub fn new(
        players: Vec<PlayerId>,
        engine_value: u8,
        config: &MatchConfig,
        seed: Option<u64>,
    ) -> Result<Self, GameError> {
        check_players(&players)?;
        if engine_value > config.max_pip {
            return Err(GameError::InvalidConfig(format!(
                "engine value {engine_value} exceeds max_pip {}",
                config.max_pip
            )));
        }
        let hand_size = config.hand_size_for(players.len());
        Ok(Self {
            engine_value,
            max_pip: config.max_pip,
            hand_size,
            double_rule: config.double_rule,
            seed,
            seats: players
                .into_iter()
                .map(|id| Seat {
                    train: Train::new_personal(id.clone(), engine_value),
                    hand: Hand::new(),
                    id,
                })
                .collect(),
            mexican_train: Train::new_mexican(engine_value),
            boneyard: Boneyard::from_tiles(Vec::new()),
            current: 0,
            phase: RoundPhase::Dealing,
            turn: 0,
            total_tiles: total_tiles(config.max_pip),
            actions: Vec::new(),
            outcome: None,
        })
    }

    /// Builds a round that is already dealt, from explicit hands and boneyard.
    ///
    /// The last boneyard tile is drawn first. Tiles must be unique across hands and
    /// boneyard, and the engine double must not appear anywhere.
    pub fn from_deal(
        engine_value: u8,
        hands: Vec<(PlayerId, Vec<Tile>)>,
        boneyard: Vec<Tile>,
        double_rule: DoubleRule,
    ) -> Result<Self, GameError> {
        let players: Vec<PlayerId> = hands.iter().map(|(id, _)| id.clone()).collect();
        check_players(&players)?;

        let anchor = Tile::double(engine_value);
        let mut seen: HashSet<Tile> = HashSet::from([anchor]);
        for tile in hands.iter().flat_map(|(_, t)| t.iter()).chain(boneyard.iter()) {
            if !seen.insert(*tile) {
                return Err(GameError::DuplicateTile(*tile));
            }
        }
        let max_pip = seen
            .iter()
            .map(|t| t.left.max(t.right))
            .max()
            .unwrap_or(engine_value);

        let mut seats = Vec::with_capacity(hands.len());
        for (id, tiles) in hands {
            seats.push(Seat {
                train: Train::new_personal(id.clone(), engine_value),
                hand: Hand::from_tiles(tiles)?,
                id,
            });
        }
        let hand_size = seats.iter().map(|s| s.hand.len()).max().unwrap_or(0);
        let mut round = Self {
            engine_value,
            max_pip,
            hand_size,
            double_rule,
            seed: None,
            seats,
            mexican_train: Train::new_mexican(engine_value),
            boneyard: Boneyard::from_tiles(boneyard),
            current: 0,
            phase: RoundPhase::AwaitingMove,
            turn: 1,
            total_tiles: seen.len(),
            actions: Vec::new(),
            outcome: None,
        };
        round.check_blocked();
        Ok(round)
    }

    /// Shuffles the full set, pulls the engine double out as the anchor and deals every
    /// seat its hand. The first seat moves first.
    pub fn start_round(&mut self) -> Result<(), GameError> {
        match self.phase {
            RoundPhase::Dealing => {}
            RoundPhase::RoundOver => return Err(GameError::RoundOver),
            _ => return Err(GameError::RoundInProgress),
        }
        let mut boneyard = match self.seed {
            Some(seed) => Boneyard::new_with_seed(self.max_pip, seed),
            None => Boneyard::new_random(self.max_pip),
        };
        boneyard.take(Tile::double(self.engine_value));

        let needed = self.hand_size * self.seats.len();
        if needed > boneyard.remaining_count() {
            return Err(GameError::InsufficientTiles {
                needed,
                available: boneyard.remaining_count(),
            });
        }
        let mut hands: Vec<Hand> = vec![Hand::new(); self.seats.len()];
        for _ in 0..self.hand_size {
            for hand in hands.iter_mut() {
                hand.add(boneyard.draw()?)?;
            }
        }
        for (seat, hand) in self.seats.iter_mut().zip(hands) {
            seat.hand = hand;
        }
        self.boneyard = boneyard;
        self.current = 0;
        self.turn = 1;
        self.phase = RoundPhase::AwaitingMove;
        self.check_blocked();
        Ok(())
    }

    /// Plays `tile` from the current player's hand onto `train`.
    ///
    /// Playing on one's own train closes it; playing anywhere else leaves it open.
    pub fn play(
        &mut self,
        player: &str,
        tile: Tile,
        train: &TrainRef,
        orientation: Option<Orientation>,
    ) -> Result<(), GameError> {
        let idx = self.ensure_turn(player)?;
        if !self.seats[idx].hand.contains(tile) {
            return Err(GameError::InvalidTile(tile));
        }
        let mv = validator::find_move(self, player, tile, train, orientation)?;

        self.train_mut(&mv.train)
            .ok_or_else(|| GameError::IllegalMove(format!("no such train: {}", mv.train)))?
            .place(mv.tile, Some(mv.orientation))?;
        let seat = &mut self.seats[idx];
        seat.hand.remove(mv.tile)?;
        if seat.train.is_owned_by(player) && mv.train == seat.train.reference() {
            seat.train.close();
        } else {
            seat.train.mark_open();
        }
        self.log(
            idx,
            RoundAction::Play {
                tile: mv.tile,
                train: mv.train,
            },
        );

        if self.seats[idx].hand.is_empty() {
            self.finish(Some(idx));
        } else {
            self.advance_turn();
        }
        Ok(())
    }

    /// Draws one tile for the current player.
    ///
    /// If the drawn tile is playable the turn stays with the player, who may play that
    /// tile or pass. Otherwise the turn passes and the player's train opens. On an empty
    /// boneyard the turn passes as well and `EmptyBoneyard` is returned.
    pub fn draw(&mut self, player: &str) -> Result<DrawOutcome, GameError> {
        let idx = self.ensure_turn(player)?;
        if let RoundPhase::MayPlayDrawn { tile } = self.phase {
            return Err(GameError::IllegalMove(format!(
                "already drew {tile} this turn"
            )));
        }
        let tile = match self.boneyard.draw() {
            Ok(tile) => tile,
            Err(err) => {
                self.log(idx, RoundAction::DrawEmpty);
                self.seats[idx].train.mark_open();
                self.advance_turn();
                return Err(err);
            }
        };
        self.seats[idx].hand.add(tile)?;
        self.log(idx, RoundAction::Draw { tile });

        self.phase = RoundPhase::MayPlayDrawn { tile };
        let can_play_drawn = !validator::valid_moves(self, player).is_empty();
        if !can_play_drawn {
            self.seats[idx].train.mark_open();
            self.advance_turn();
        }
        Ok(DrawOutcome {
            tile,
            can_play_drawn,
            turn_passed: !can_play_drawn,
        })
    }

    /// Ends the current player's turn without playing and opens their train.
    ///
    /// Allowed after drawing a playable tile, or when the boneyard is empty.
    pub fn pass(&mut self, player: &str) -> Result<(), GameError> {
        let idx = self.ensure_turn(player)?;
        let drew = matches!(self.phase, RoundPhase::MayPlayDrawn { .. });
        if !drew && !self.boneyard.is_empty() {
            return Err(GameError::IllegalMove(
                "must draw before passing".to_string(),
            ));
        }
        self.log(idx, RoundAction::Pass);
        self.seats[idx].train.mark_open();
        self.advance_turn();
        Ok(())
    }

    /// Plays the current seat's turn without a decision: draw once if possible, then pass.
    /// Used for disconnected players, stalled AI and administrative overrides.
    pub fn auto_turn(&mut self, player: &str) -> Result<(), GameError> {
        self.ensure_turn(player)?;
        if matches!(self.phase, RoundPhase::AwaitingMove) {
            match self.draw(player) {
                Ok(outcome) if outcome.turn_passed => return Ok(()),
                Ok(_) => {}
                Err(GameError::EmptyBoneyard) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        self.pass(player)
    }

    fn ensure_turn(&self, player: &str) -> Result<usize, GameError> {
        match self.phase {
            RoundPhase::Dealing => return Err(GameError::RoundNotStarted),
            RoundPhase::RoundOver => return Err(GameError::RoundOver),
            _ => {}
        }
        let idx = self
            .seat_index(player)
            .ok_or_else(|| GameError::PlayerNotInSession(player.to_string()))?;
        if idx != self.current {
            return Err(GameError::NotYourTurn {
                expected: self.seats[self.current].id.clone(),
                actual: player.to_string(),
            });
        }
        Ok(idx)
    }

    fn advance_turn(&mut self) {
        self.current = (self.current + 1) % self.seats.len();
        self.phase = RoundPhase::AwaitingMove;
        self.turn += 1;
        self.check_blocked();
    }

    /// Ends the round once play can no longer change anything: boneyard empty, every
    /// personal train open, and no seat holding a legal move. While some train is still
    /// closed its owner has a pass ahead that opens it, which may unlock a move.
    fn check_blocked(&mut self) {
        if self.phase != RoundPhase::AwaitingMove || !self.boneyard.is_empty() {
            return;
        }
        if self.seats.iter().any(|s| !s.train.is_open()) {
            return;
        }
        let anyone_can_play = self
            .seats
            .iter()
            .any(|s| validator::has_valid_move(self, &s.id));
        if !anyone_can_play {
            self.finish(None);
        }
    }

    fn finish(&mut self, winner: Option<usize>) {
        let scores = self
            .seats
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let points = if Some(i) == winner {
                    0
                } else {
                    s.hand.pip_total()
                };
                (s.id.clone(), points)
            })
            .collect();
        self.outcome = Some(RoundOutcome {
            winner: winner.map(|i| self.seats[i].id.clone()),
            reason: if winner.is_some() {
                RoundEndReason::Domino
            } else {
                RoundEndReason::Blocked
            },
            scores,
        });
        self.phase = RoundPhase::RoundOver;
    }

    fn log(&mut self, idx: usize, action: RoundAction) {
        self.actions.push(ActionRecord {
            turn: self.turn,
            player_id: self.seats[idx].id.clone(),
            action,
        });
    }

    fn seat_index(&self, player: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.id == player)
    }

    fn train_mut(&mut self, train: &TrainRef) -> Option<&mut Train> {
        match train {
            TrainRef::Mexican => Some(&mut self.mexican_train),
            TrainRef::Personal(owner) => self
                .seats
                .iter_mut()
                .find(|s| &s.id == owner)
                .map(|s| &mut s.train),
        }
    }

    pub fn engine_value(&self) -> u8 {
        self.engine_value
    }

    /// The engine double every train grows from.
    pub fn anchor(&self) -> Tile {
        Tile::double(self.engine_value)
    }

    pub fn max_pip(&self) -> u8 {
        self.max_pip
    }

    pub fn double_rule(&self) -> DoubleRule {
        self.double_rule
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase != RoundPhase::Dealing
    }

    pub fn is_over(&self) -> bool {
        self.phase == RoundPhase::RoundOver
    }

    pub fn outcome(&self) -> Option<&RoundOutcome> {
        self.outcome.as_ref()
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.seats.iter().map(|s| s.id.clone()).collect()
    }

    pub fn current_player(&self) -> &PlayerId {
        &self.seats[self.current].id
    }

    pub fn current_player_index(&self) -> usize {
        self.current
    }

    /// Increments on every turn change. Lets schedulers detect that a turn they were
    /// waiting on has already moved on.
    pub fn turn_number(&self) -> u64 {
        self.turn
    }

    pub fn hand(&self, player: &str) -> Option<&Hand> {
        self.seats.iter().find(|s| s.id == player).map(|s| &s.hand)
    }

    /// Drawn tile the current player may still play, if `player` is that player.
    pub fn pending_drawn_tile(&self, player: &str) -> Option<Tile> {
        match self.phase {
            RoundPhase::MayPlayDrawn { tile } if self.seats[self.current].id == player => {
                Some(tile)
            }
            _ => None,
        }
    }

    pub fn train(&self, train: &TrainRef) -> Option<&Train> {
        match train {
            TrainRef::Mexican => Some(&self.mexican_train),
            TrainRef::Personal(owner) => self
                .seats
                .iter()
                .find(|s| &s.id == owner)
                .map(|s| &s.train),
        }
    }

    /// Personal trains in seat order, then the Mexican train.
    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.seats
            .iter()
            .map(|s| &s.train)
            .chain(std::iter::once(&self.mexican_train))
    }

    pub fn mexican_train(&self) -> &Train {
        &self.mexican_train
    }

    pub fn boneyard_count(&self) -> usize {
        self.boneyard.remaining_count()
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    /// Size of the tile set this round was dealt from.
    pub fn total_tiles(&self) -> usize {
        self.total_tiles
    }

    /// Hands, trains, boneyard and the anchor, which always adds up to `total_tiles`.
    pub fn tiles_accounted_for(&self) -> usize {
        let in_hands: usize = self.seats.iter().map(|s| s.hand.len()).sum();
        let on_trains: usize = self.trains().map(Train::len).sum();
        let anchor = usize::from(self.is_started());
        in_hands + on_trains + self.boneyard.remaining_count() + anchor
    }

    /// Every tile currently on the table, one entry per location.
    pub fn all_tiles(&self) -> Vec<Tile> {
        let mut out: Vec<Tile> = Vec::with_capacity(self.total_tiles);
        if self.is_started() {
            out.push(self.anchor());
        }
        for seat in &self.seats {
            out.extend(seat.hand.iter().copied());
        }
        for train in self.trains() {
            out.extend(train.dominoes().iter().copied());
        }
        out.extend(self.boneyard.tiles().iter().copied());
        out
    }

    /// Read-only view of the round. Only `viewer`'s hand is shown tile by tile; other
    /// hands appear as counts.
    pub fn snapshot(&self, viewer: Option<&str>) -> RoundSnapshot {
        RoundSnapshot {
            engine_value: self.engine_value,
            anchor: self.anchor(),
            phase: self.phase,
            turn: self.turn,
            current_player: self.current_player().clone(),
            seats: self
                .seats
                .iter()
                .map(|s| SeatView {
                    player_id: s.id.clone(),
                    tile_count: s.hand.len(),
                    tiles: (viewer == Some(s.id.as_str())).then(|| s.hand.tiles().to_vec()),
                })
                .collect(),
            trains: self
                .trains()
                .map(|t| TrainView {
                    train: t.reference(),
                    dominoes: t.dominoes().to_vec(),
                    is_open: t.is_open(),
                    required_value: t.required_value(),
                    pending_double: t.pending_double(),
                })
                .collect(),
            boneyard_count: self.boneyard.remaining_count(),
            outcome: self.outcome.clone(),
        }
    }
}

fn check_players(players: &[PlayerId]) -> Result<(), GameError> {
    if players.is_empty() {
        return Err(GameError::InvalidConfig(
            "a round needs at least one player".to_string(),
        ));
    }
    let unique: HashSet<&PlayerId> = players.iter().collect();
    if unique.len() != players.len() {
        return Err(GameError::InvalidConfig(
            "player ids must be unique".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    pub player_id: PlayerId,
    pub tile_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<Tile>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainView {
    pub train: TrainRef,
    pub dominoes: Vec<Tile>,
    pub is_open: bool,
    pub required_value: u8,
    pub pending_double: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub engine_value: u8,
    pub anchor: Tile,
    pub phase: RoundPhase,
    pub turn: u64,
    pub current_player: PlayerId,
    pub seats: Vec<SeatView>,
    pub trains: Vec<TrainView>,
    pub boneyard_count: usize,
    pub outcome: Option<RoundOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(a: u8, b: u8) -> Tile {
        Tile::new(a, b)
    }

    #[test]
    fn actions_before_deal_fail_with_round_not_started() {
        let cfg = MatchConfig::default();
        let mut round = RoundEngine::new(vec!["a".into(), "b".into()], 12, &cfg, Some(1)).unwrap();
        assert_eq!(round.draw("a"), Err(GameError::RoundNotStarted));
        round.start_round().unwrap();
        assert_eq!(round.start_round(), Err(GameError::RoundInProgress));
    }

    #[test]
    fn seeded_deals_are_reproducible() {
        let cfg = MatchConfig::default();
        let players = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut r1 = RoundEngine::new(players.clone(), 9, &cfg, Some(77)).unwrap();
        let mut r2 = RoundEngine::new(players, 9, &cfg, Some(77)).unwrap();
        r1.start_round().unwrap();
        r2.start_round().unwrap();
        assert_eq!(r1.hand("b"), r2.hand("b"));
        assert_eq!(r1.hand("a").unwrap().len(), 15);
        assert_eq!(r1.boneyard_count(), 91 - 1 - 45);
    }

    #[test]
    fn pass_requires_a_draw_first() {
        let mut round = RoundEngine::from_deal(
            6,
            vec![("a".into(), vec![t(1, 2)]), ("b".into(), vec![t(3, 4)])],
            vec![t(0, 0)],
            DoubleRule::Scoped,
        )
        .unwrap();
        assert!(matches!(round.pass("a"), Err(GameError::IllegalMove(_))));
        assert_eq!(round.current_player(), "a");
    }

    #[test]
    fn drawn_playable_tile_keeps_the_turn_and_restricts_play() {
        let mut round = RoundEngine::from_deal(
            6,
            vec![("a".into(), vec![t(1, 2)]), ("b".into(), vec![t(3, 4)])],
            vec![t(6, 5)],
            DoubleRule::Scoped,
        )
        .unwrap();
        let out = round.draw("a").unwrap();
        assert_eq!(
            out,
            DrawOutcome {
                tile: t(5, 6),
                can_play_drawn: true,
                turn_passed: false
            }
        );
        assert_eq!(round.current_player(), "a");
        assert!(matches!(round.draw("a"), Err(GameError::IllegalMove(_))));
        round
            .play("a", t(6, 5), &TrainRef::Personal("a".into()), None)
            .unwrap();
        assert_eq!(round.current_player(), "b");
    }

    #[test]
    fn other_players_cannot_act_out_of_turn() {
        let mut round = RoundEngine::from_deal(
            6,
            vec![("a".into(), vec![t(6, 2)]), ("b".into(), vec![t(6, 4)])],
            vec![t(0, 1)],
            DoubleRule::Scoped,
        )
        .unwrap();
        assert_eq!(
            round.play("b", t(6, 4), &TrainRef::Mexican, None),
            Err(GameError::NotYourTurn {
                expected: "a".into(),
                actual: "b".into()
            })
        );
        assert_eq!(
            round.draw("zed"),
            Err(GameError::PlayerNotInSession("zed".into()))
        );
    }

    #[test]
    fn playing_elsewhere_opens_own_train_and_home_play_closes_it() {
        let mut round = RoundEngine::from_deal(
            6,
            vec![
                ("a".into(), vec![t(6, 2), t(6, 3), t(0, 0)]),
                ("b".into(), vec![t(1, 1), t(1, 2)]),
            ],
            vec![t(4, 4), t(5, 5)],
            DoubleRule::Scoped,
        )
        .unwrap();
        round.play("a", t(6, 2), &TrainRef::Mexican, None).unwrap();
        assert!(round.train(&TrainRef::Personal("a".into())).unwrap().is_open());
        round.draw("b").unwrap();
        round.play("a", t(6, 3), &TrainRef::Personal("a".into()), None).unwrap();
        assert!(!round.train(&TrainRef::Personal("a".into())).unwrap().is_open());
    }

    #[test]
    fn snapshot_hides_other_hands() {
        let round = RoundEngine::from_deal(
            6,
            vec![("a".into(), vec![t(6, 2)]), ("b".into(), vec![t(6, 4), t(1, 1)])],
            vec![t(0, 1)],
            DoubleRule::Scoped,
        )
        .unwrap();
        let snap = round.snapshot(Some("a"));
        assert_eq!(snap.seats[0].tiles, Some(vec![t(6, 2)]));
        assert_eq!(snap.seats[1].tiles, None);
        assert_eq!(snap.seats[1].tile_count, 2);
        assert_eq!(snap.trains.len(), 3);
    }

    #[test]
    fn duplicate_tiles_are_rejected_in_explicit_deals() {
        let err = RoundEngine::from_deal(
            6,
            vec![("a".into(), vec![t(6, 2)]), ("b".into(), vec![t(2, 6)])],
            vec![],
            DoubleRule::Scoped,
        )
        .unwrap_err();
        assert_eq!(err, GameError::DuplicateTile(t(2, 6)));

        let err = RoundEngine::from_deal(
            6,
            vec![("a".into(), vec![t(6, 6)])],
            vec![],
            DoubleRule::Scoped,
        )
        .unwrap_err();
        assert_eq!(err, GameError::DuplicateTile(t(6, 6)));
    }
}
