use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::rules::{has_won, winner};

/// 棋盘格子数（3x3）。
pub const BOARD_SIZE: usize = 9;
/// 一局最多的落子数，等于棋盘容量。
pub const MAX_TURNS: u8 = BOARD_SIZE as u8;

/// 获胜连线：3 行、3 列、2 条对角线（行优先索引）。
pub const WIN_COMBINATIONS: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid cell value {0}, expected -1, 0 or 1")]
pub struct InvalidCellValue(pub i8);

/// 单个格子的取值，序列化为 -1 / 0 / 1。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i8", into = "i8")]
#[repr(i8)]
pub enum Cell {
    O = -1,
    #[default]
    Empty = 0,
    X = 1,
}

impl Cell {
    pub fn value(self) -> i8 {
        self as i8
    }

    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

impl From<Cell> for i8 {
    fn from(cell: Cell) -> Self {
        cell.value()
    }
}

impl TryFrom<i8> for Cell {
    type Error = InvalidCellValue;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Cell::O),
            0 => Ok(Cell::Empty),
            1 => Ok(Cell::X),
            other => Err(InvalidCellValue(other)),
        }
    }
}

/// 玩家。X 先手，是搜索中的最大化一方；O 是最小化一方。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Player {
    X,
    O,
}

impl Player {
    /// 偶数回合轮到 X，奇数回合轮到 O。
    pub fn for_turn(turn: u8) -> Self {
        if turn % 2 == 0 {
            Player::X
        } else {
            Player::O
        }
    }

    pub fn other(self) -> Self {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    pub fn mark(self) -> Cell {
        match self {
            Player::X => Cell::X,
            Player::O => Cell::O,
        }
    }

    /// 该玩家连成一线时的格子值之和：X 为 +3，O 为 -3。
    pub fn win_sum(self) -> i8 {
        self.mark().value() * 3
    }

    pub fn is_maximizing(self) -> bool {
        self == Player::X
    }
}

impl FromStr for Player {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" | "1" => Ok(Player::X),
            "o" | "-1" => Ok(Player::O),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::X => f.write_str("X"),
            Player::O => f.write_str("O"),
        }
    }
}

/// 行优先的 3x3 棋盘。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Board {
    cells: [Cell; BOARD_SIZE],
}

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Cell; BOARD_SIZE]) -> Self {
        Self { cells }
    }

    pub fn from_values(values: [i8; BOARD_SIZE]) -> Result<Self, InvalidCellValue> {
        let mut cells = [Cell::Empty; BOARD_SIZE];
        for (cell, value) in cells.iter_mut().zip(values) {
            *cell = Cell::try_from(value)?;
        }
        Ok(Self { cells })
    }

    pub fn cells(&self) -> &[Cell; BOARD_SIZE] {
        &self.cells
    }

    pub fn values(&self) -> [i8; BOARD_SIZE] {
        self.cells.map(Cell::value)
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    pub fn is_empty_at(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Cell::Empty))
    }

    /// 按索引升序列出空格。
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(index, _)| index)
    }

    /// 返回在 `index` 落下 `mark` 后的新棋盘，原棋盘不变。
    pub fn with_mark(&self, index: usize, mark: Cell) -> Board {
        let mut next = *self;
        next.cells[index] = mark;
        next
    }

    pub(crate) fn set(&mut self, index: usize, mark: Cell) {
        self.cells[index] = mark;
    }

    pub fn count(&self, mark: Cell) -> usize {
        self.cells.iter().filter(|&&cell| cell == mark).count()
    }

    pub fn mark_count(&self) -> usize {
        BOARD_SIZE - self.count(Cell::Empty)
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_empty())
    }

    pub fn line_sum(&self, line: &[usize; 3]) -> i8 {
        line.iter().map(|&index| self.cells[index].value()).sum()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            let symbols: Vec<&str> = chunk
                .iter()
                .map(|cell| match cell {
                    Cell::X => "X",
                    Cell::O => "O",
                    Cell::Empty => ".",
                })
                .collect();
            write!(f, "{}", symbols.join(" "))?;
        }
        Ok(())
    }
}

/// 对局结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Outcome {
    Win { winner: Player, line: [usize; 3] },
    Draw,
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MovePlayed { player: Player, cell: usize, turn: u8 },
    GameWon { winner: Player, line: [usize; 3] },
    GameDrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("turn {turn} exceeds board capacity")]
    TurnOutOfRange { turn: u8 },
    #[error("turn {turn} requires {expected_x} X and {expected_o} O marks, found {x_marks} and {o_marks}")]
    MarkCountMismatch {
        turn: u8,
        expected_x: usize,
        expected_o: usize,
        x_marks: usize,
        o_marks: usize,
    },
    #[error("both players have a winning line")]
    MultipleWinners,
    #[error("recorded outcome does not match the board")]
    OutcomeMismatch,
    #[error("play continued after {winner} completed a line")]
    PlayAfterWin { winner: Player },
}

/// 校验棋盘与回合数是否自洽：X 的数量为 ceil(turn/2)，O 为 floor(turn/2)。
pub fn check_consistency(board: &Board, turn: u8) -> Result<(), IntegrityError> {
    if turn > MAX_TURNS {
        return Err(IntegrityError::TurnOutOfRange { turn });
    }

    let expected_x = usize::from(turn).div_ceil(2);
    let expected_o = usize::from(turn) / 2;
    let x_marks = board.count(Cell::X);
    let o_marks = board.count(Cell::O);
    if x_marks != expected_x || o_marks != expected_o {
        return Err(IntegrityError::MarkCountMismatch {
            turn,
            expected_x,
            expected_o,
            x_marks,
            o_marks,
        });
    }

    if has_won(board, Player::X.win_sum()) && has_won(board, Player::O.win_sum()) {
        return Err(IntegrityError::MultipleWinners);
    }

    // 连线只能由最后一手完成，之后不应再有落子。
    if let Some(winner) = winner(board) {
        if winner != Player::for_turn(turn).other() {
            return Err(IntegrityError::PlayAfterWin { winner });
        }
    }

    Ok(())
}

/// 游戏整体状态。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub board: Board,
    #[serde(default)]
    pub turn: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由现有棋盘构造状态，回合数取已落子数。
    pub fn from_board(board: Board) -> Self {
        Self {
            board,
            turn: board.mark_count() as u8,
            event_log: Vec::new(),
            outcome: None,
        }
    }

    pub fn current_player(&self) -> Player {
        Player::for_turn(self.turn)
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn declare_outcome(&mut self, outcome: Outcome) -> Outcome {
        if self.outcome.is_none() {
            let event = match &outcome {
                Outcome::Win { winner, line } => GameEvent::GameWon {
                    winner: *winner,
                    line: *line,
                },
                Outcome::Draw => GameEvent::GameDrawn,
            };
            self.record_event(event);
            self.outcome = Some(outcome.clone());
        }
        outcome
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        check_consistency(&self.board, self.turn)?;

        match (&self.outcome, winner(&self.board)) {
            (None, _) => Ok(()),
            (Some(Outcome::Win { winner: recorded, line }), Some(actual))
                if *recorded == actual
                    && WIN_COMBINATIONS.contains(line)
                    && self.board.line_sum(line) == actual.win_sum() =>
            {
                Ok(())
            }
            (Some(Outcome::Draw), None) if self.board.is_full() => Ok(()),
            (Some(_), _) => Err(IntegrityError::OutcomeMismatch),
        }
    }
}
