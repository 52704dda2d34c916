//! 井字棋核心逻辑模块（棋盘状态、胜负判定、回合控制）。

pub mod rules;
pub mod state;

pub use rules::{
    has_won, is_draw, winner, winning_line, MoveAction, RuleEngine, RuleError, RuleResolution,
};
pub use state::{
    check_consistency,
    Board,
    Cell,
    GameEvent,
    GameState,
    IntegrityError,
    InvalidCellValue,
    Outcome,
    Player,
    BOARD_SIZE,
    MAX_TURNS,
    WIN_COMBINATIONS,
};
