use mextrain_engine::config::MatchConfig;
use mextrain_engine::errors::GameError;
use mextrain_engine::game::{MatchOrchestrator, MatchProgress};
use mextrain_engine::logger::{read_match_records, MatchLogger};
use mextrain_engine::validator::valid_moves;

/// Drives the current round to its end with "first legal move, else draw/pass".
fn finish_round(game: &mut MatchOrchestrator) {
    let round = game.round_mut().unwrap();
    while !round.is_over() {
        let player = round.current_player().clone();
        match valid_moves(round, &player).first().cloned() {
            Some(mv) => round
                .play(&player, mv.tile, &mv.train, Some(mv.orientation))
                .unwrap(),
            None => match round.draw(&player) {
                Ok(out) if out.can_play_drawn => round.pass(&player).unwrap(),
                Ok(_) | Err(GameError::EmptyBoneyard) => {}
                Err(e) => panic!("{e}"),
            },
        }
    }
}

fn three_game_match() -> MatchOrchestrator {
    let cfg = MatchConfig {
        games_to_play: 3,
        seed: Some(99),
        ..MatchConfig::default()
    };
    MatchOrchestrator::new(vec!["ana".into(), "ben".into(), "cy".into()], cfg).unwrap()
}

#[test]
fn three_game_match_ends_with_lowest_total_winning() {
    let mut game = three_game_match();
    game.start().unwrap();

    let mut engine_values = vec![game.round().unwrap().engine_value()];
    let result = loop {
        finish_round(&mut game);
        match game.advance().unwrap() {
            MatchProgress::NextRound { engine_value, .. } => engine_values.push(engine_value),
            MatchProgress::Ended(result) => break result,
        }
    };

    assert_eq!(engine_values, vec![12, 11, 10]);
    assert_eq!(result.rounds_played, 3);
    assert_eq!(game.rounds().len(), 3);
    let best = result.cumulative_scores.values().min().copied().unwrap();
    assert_eq!(result.cumulative_scores[&result.winner], best);

    for player in game.players() {
        let summed: u32 = game.rounds().iter().map(|r| r.scores[player]).sum();
        assert_eq!(result.cumulative_scores[player], summed);
    }
    assert_eq!(game.advance(), Err(GameError::MatchAlreadyEnded));
    assert!(matches!(game.round_mut(), Err(GameError::MatchAlreadyEnded)));
}

#[test]
fn seeded_matches_replay_identically() {
    let mut a = three_game_match();
    let mut b = three_game_match();
    a.start().unwrap();
    b.start().unwrap();
    finish_round(&mut a);
    finish_round(&mut b);
    assert_eq!(a.round().unwrap().actions(), b.round().unwrap().actions());
}

#[test]
fn finished_match_round_trips_through_jsonl() {
    let mut game = three_game_match();
    game.start().unwrap();
    loop {
        finish_round(&mut game);
        if let MatchProgress::Ended(_) = game.advance().unwrap() {
            break;
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches.jsonl");
    let mut logger = MatchLogger::create(&path).unwrap();
    let id = logger.next_id();
    let record = game.to_record(id.clone()).unwrap();
    logger.write(&record).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.ends_with(b"\n"));
    assert!(!bytes.contains(&b'\r'));

    let back = read_match_records(&path).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].match_id, id);
    assert_eq!(back[0].rounds.len(), 3);
    assert_eq!(back[0].winner, record.winner);
    assert!(back[0].ts.is_some());
}

#[test]
fn unfinished_match_has_no_record() {
    let mut game = three_game_match();
    game.start().unwrap();
    assert!(game.to_record("x").is_none());
    assert_eq!(game.start().err(), Some(GameError::RoundInProgress));
}
