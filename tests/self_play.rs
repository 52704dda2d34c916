use std::collections::HashSet;

use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use tictactoe_core::{
    search, select_move, select_move_pruned, winner, AiAgent, AiConfig, AiDifficulty, Board,
    GameState, MoveAction, Outcome, Player, RuleEngine, DEFAULT_MAX_DEPTH, MAX_TURNS,
};

fn play_engine_game(depth: u8, pruned: bool) -> GameState {
    let engine = RuleEngine::new();
    let mut state = engine.new_game();
    while !state.is_finished() {
        let cell = if pruned {
            select_move_pruned(&state.board, state.turn, depth)
        } else {
            select_move(&state.board, state.turn, depth)
        }
        .expect("unfinished game must have a move");
        let player = state.current_player();
        engine
            .play_move(&mut state, MoveAction { player, cell })
            .expect("engine chose an illegal move");
    }
    state
}

#[test]
fn perfect_self_play_is_a_draw() {
    for depth in [DEFAULT_MAX_DEPTH, 9] {
        for pruned in [false, true] {
            let end = play_engine_game(depth, pruned);
            assert_eq!(end.outcome, Some(Outcome::Draw), "depth {depth}, pruned {pruned}");
            assert_eq!(end.turn, MAX_TURNS);
            assert!(end.board.is_full());
        }
    }
}

#[test]
fn full_depth_opponent_never_loses_to_random_play() {
    let engine = RuleEngine::new();
    for seed in 0..40u64 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(AiDifficulty::Expert), seed);
        let mut state = engine.new_game();
        while !state.is_finished() {
            let player = state.current_player();
            let cell = match player {
                Player::X => state
                    .board
                    .empty_cells()
                    .choose(&mut rng)
                    .expect("unfinished game has empty cells"),
                Player::O => agent
                    .decide_action(&state)
                    .expect("state stays consistent")
                    .cell
                    .expect("agent must move in an unfinished game"),
            };
            engine
                .play_move(&mut state, MoveAction { player, cell })
                .expect("move should be legal");
        }
        assert!(
            !matches!(state.outcome, Some(Outcome::Win { winner: Player::X, .. })),
            "seed {seed}: random X beat the engine\n{}",
            state.board
        );
    }
}

fn reachable_positions() -> Vec<(Board, u8)> {
    let mut seen = HashSet::new();
    let mut stack = vec![(Board::empty(), 0u8)];
    let mut positions = Vec::new();
    while let Some((board, turn)) = stack.pop() {
        if !seen.insert(board) {
            continue;
        }
        if winner(&board).is_some() || turn >= MAX_TURNS {
            continue;
        }
        positions.push((board, turn));
        let mark = Player::for_turn(turn).mark();
        for cell in board.empty_cells() {
            stack.push((board.with_mark(cell, mark), turn + 1));
        }
    }
    positions
}

#[test]
fn alpha_beta_never_changes_the_choice() {
    let positions = reachable_positions();
    assert_eq!(positions.len(), 4520);

    for depth in [1, 3, DEFAULT_MAX_DEPTH] {
        for (board, turn) in &positions {
            let (plain, _) = search(board, *turn, depth, false);
            let (pruned, _) = search(board, *turn, depth, true);
            assert_eq!(plain, pruned, "depth {depth}, turn {turn}\n{board}");
            let cell = plain.expect("non-terminal position has a move").cell;
            assert!(board.is_empty_at(cell));
        }
    }
}
