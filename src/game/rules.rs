use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{
    Board, GameEvent, GameState, IntegrityError, Outcome, Player, BOARD_SIZE, MAX_TURNS,
    WIN_COMBINATIONS,
};

/// 任意一条连线三格之和等于 `target_sum`（X 为 +3，O 为 -3）即判定获胜。
///
/// 格子值只可能是 -1、0、1，所以 ±3 只会出现在三格同为一方的连线上。
pub fn has_won(board: &Board, target_sum: i8) -> bool {
    WIN_COMBINATIONS
        .iter()
        .any(|line| board.line_sum(line) == target_sum)
}

pub fn winning_line(board: &Board, player: Player) -> Option<[usize; 3]> {
    let target = player.win_sum();
    WIN_COMBINATIONS
        .iter()
        .copied()
        .find(|line| board.line_sum(line) == target)
}

/// 棋盘上已连成一线的玩家。X 优先判断。
pub fn winner(board: &Board) -> Option<Player> {
    [Player::X, Player::O]
        .into_iter()
        .find(|player| has_won(board, player.win_sum()))
}

pub fn is_draw(board: &Board) -> bool {
    board.is_full() && winner(board).is_none()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveAction {
    pub player: Player,
    pub cell: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game is already finished")]
    GameFinished,
    #[error("it is {expected}'s turn, not {actual}'s")]
    NotPlayerTurn { expected: Player, actual: Player },
    #[error("cell {cell} is outside the board")]
    CellOutOfRange { cell: usize },
    #[error("cell {cell} is already occupied")]
    CellOccupied { cell: usize },
    #[error("integrity violation: {error}")]
    IntegrityViolation {
        #[from]
        error: IntegrityError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome.clone();
        Self {
            state,
            events,
            outcome,
        }
    }
}

/// 回合控制：落子、推进回合、在每一步之后判定胜负或平局。
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn new_game(&self) -> GameState {
        GameState::new()
    }

    fn ensure_not_finished(state: &GameState) -> Result<(), RuleError> {
        if state.is_finished() || state.turn >= MAX_TURNS || winner(&state.board).is_some() {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_turn_owner(state: &GameState, player: Player) -> Result<(), RuleError> {
        let expected = state.current_player();
        if expected != player {
            return Err(RuleError::NotPlayerTurn {
                expected,
                actual: player,
            });
        }
        Ok(())
    }

    fn ensure_playable_cell(state: &GameState, cell: usize) -> Result<(), RuleError> {
        if cell >= BOARD_SIZE {
            return Err(RuleError::CellOutOfRange { cell });
        }
        if !state.board.is_empty_at(cell) {
            return Err(RuleError::CellOccupied { cell });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state.integrity_check().map_err(RuleError::from)
    }

    pub fn play_move(
        &self,
        state: &mut GameState,
        action: MoveAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        Self::ensure_not_finished(state)?;
        Self::ensure_turn_owner(state, action.player)?;
        if let Err(error) = Self::ensure_playable_cell(state, action.cell) {
            warn!("rejected move {:?}: {}", action, error);
            return Err(error);
        }

        let mut events = Vec::new();
        state.board.set(action.cell, action.player.mark());
        let played = GameEvent::MovePlayed {
            player: action.player,
            cell: action.cell,
            turn: state.turn,
        };
        state.record_event(played.clone());
        events.push(played);
        state.turn += 1;

        if let Some(outcome) = Self::check_outcome(state) {
            state.declare_outcome(outcome.clone());
            events.push(match outcome {
                Outcome::Win { winner, line } => GameEvent::GameWon { winner, line },
                Outcome::Draw => GameEvent::GameDrawn,
            });
        }

        Ok(events)
    }

    /// 胜负优先于平局：最后一手填满棋盘且连成一线时判胜。
    pub fn check_outcome(state: &GameState) -> Option<Outcome> {
        if let Some(outcome) = &state.outcome {
            return Some(outcome.clone());
        }

        for player in [Player::X, Player::O] {
            if let Some(line) = winning_line(&state.board, player) {
                return Some(Outcome::Win {
                    winner: player,
                    line,
                });
            }
        }

        if state.turn >= MAX_TURNS || state.board.is_full() {
            return Some(Outcome::Draw);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Cell;
    use pretty_assertions::assert_eq;

    fn board(values: [i8; 9]) -> Board {
        Board::from_values(values).expect("test boards use valid cell values")
    }

    fn play(engine: &RuleEngine, state: &mut GameState, cells: &[usize]) {
        for &cell in cells {
            let player = state.current_player();
            engine
                .play_move(state, MoveAction { player, cell })
                .expect("scripted move should be legal");
        }
    }

    #[test]
    fn line_sum_matches_three_equal_marks_for_every_board() {
        for code in 0..3usize.pow(9) {
            let mut values = [0i8; 9];
            let mut rest = code;
            for value in values.iter_mut() {
                *value = (rest % 3) as i8 - 1;
                rest /= 3;
            }
            let b = board(values);
            for target in [3i8, -3] {
                let expected = WIN_COMBINATIONS
                    .iter()
                    .any(|line| line.iter().all(|&i| values[i] == target / 3));
                assert_eq!(has_won(&b, target), expected, "board {values:?}");
            }
        }
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        let full = board([1, -1, 1, 1, -1, -1, -1, 1, 1]);
        assert!(!has_won(&full, 3));
        assert!(!has_won(&full, -3));
        assert!(is_draw(&full));
        assert_eq!(winner(&full), None);
    }

    #[test]
    fn winning_line_reports_the_completed_triple() {
        let won = board([-1, 1, 0, -1, 1, 0, 0, 1, 0]);
        assert_eq!(winning_line(&won, Player::X), Some([1, 4, 7]));
        assert_eq!(winning_line(&won, Player::O), None);
        assert_eq!(winner(&won), Some(Player::X));
    }

    #[test]
    fn moves_alternate_and_advance_turn() {
        let engine = RuleEngine::new();
        let mut state = engine.new_game();
        let events = engine
            .play_move(&mut state, MoveAction { player: Player::X, cell: 4 })
            .expect("opening move should be legal");

        assert_eq!(state.turn, 1);
        assert_eq!(state.board.get(4), Some(Cell::X));
        assert_eq!(
            events,
            vec![GameEvent::MovePlayed { player: Player::X, cell: 4, turn: 0 }]
        );
        assert_eq!(
            engine.play_move(&mut state, MoveAction { player: Player::X, cell: 0 }),
            Err(RuleError::NotPlayerTurn { expected: Player::O, actual: Player::X })
        );
    }

    #[test]
    fn illegal_cells_are_rejected() {
        let engine = RuleEngine::new();
        let mut state = engine.new_game();
        play(&engine, &mut state, &[0]);

        assert_eq!(
            engine.play_move(&mut state, MoveAction { player: Player::O, cell: 0 }),
            Err(RuleError::CellOccupied { cell: 0 })
        );
        assert_eq!(
            engine.play_move(&mut state, MoveAction { player: Player::O, cell: 9 }),
            Err(RuleError::CellOutOfRange { cell: 9 })
        );
        assert_eq!(state.turn, 1, "rejected moves must not advance the turn");
    }

    #[test]
    fn completing_a_line_ends_the_game() {
        let engine = RuleEngine::new();
        let mut state = engine.new_game();
        play(&engine, &mut state, &[0, 3, 1, 4]);
        let events = engine
            .play_move(&mut state, MoveAction { player: Player::X, cell: 2 })
            .expect("winning move should be legal");

        let expected = Outcome::Win { winner: Player::X, line: [0, 1, 2] };
        assert_eq!(state.outcome, Some(expected));
        assert!(events.contains(&GameEvent::GameWon { winner: Player::X, line: [0, 1, 2] }));
        assert_eq!(
            engine.play_move(&mut state, MoveAction { player: Player::O, cell: 5 }),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn filling_the_board_without_a_line_is_a_draw() {
        let engine = RuleEngine::new();
        let mut state = engine.new_game();
        play(&engine, &mut state, &[0, 1, 2, 4, 3, 5, 7, 6, 8]);

        assert_eq!(state.turn, 9);
        assert_eq!(state.outcome, Some(Outcome::Draw));
        assert_eq!(state.event_log.last(), Some(&GameEvent::GameDrawn));
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn unrecorded_win_still_ends_the_game() {
        let engine = RuleEngine::new();
        let mut state = GameState::from_board(board([1, 1, 1, -1, -1, 0, 0, 0, 0]));
        assert_eq!(state.outcome, None);

        assert_eq!(
            engine.play_move(&mut state, MoveAction { player: Player::O, cell: 5 }),
            Err(RuleError::GameFinished)
        );
        assert_eq!(state.turn, 5);
        assert!(state.board.is_empty_at(5));
    }

    #[test]
    fn moves_after_an_opponent_line_are_rejected() {
        let engine = RuleEngine::new();
        let mut state = GameState::from_board(board([-1, -1, -1, 1, 1, 0, 1, 0, 1]));
        assert_eq!(
            engine.play_move(&mut state, MoveAction { player: Player::O, cell: 5 }),
            Err(RuleError::IntegrityViolation {
                error: IntegrityError::PlayAfterWin { winner: Player::O }
            })
        );
    }

    #[test]
    fn inconsistent_state_is_reported() {
        let engine = RuleEngine::new();
        let mut state = GameState::from_board(board([1, 1, 0, 0, 0, 0, 0, 0, 0]));
        let result = engine.play_move(&mut state, MoveAction { player: Player::O, cell: 4 });
        assert!(matches!(
            result,
            Err(RuleError::IntegrityViolation {
                error: IntegrityError::MarkCountMismatch { .. }
            })
        ));
    }
}
