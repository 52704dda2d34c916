//! 电脑对手：极小化极大搜索。

pub mod minimax;

pub use minimax::{
    score, search, select_move, select_move_pruned, try_select_move, AiAgent, AiConfig,
    AiDecision, AiDifficulty, SearchError, SearchResult, SearchStats, DEFAULT_MAX_DEPTH,
};
