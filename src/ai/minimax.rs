use std::str::FromStr;

use log::debug;
use rand::rngs::SmallRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{
    check_consistency, has_won, winner, Board, GameState, IntegrityError, MoveAction, Player,
    RuleEngine, RuleError, RuleResolution, MAX_TURNS,
};
use crate::utils::Instant;

/// 完整搜索的默认深度：从空棋盘出发，根节点一步加 8 层即可覆盖整棵博弈树。
pub const DEFAULT_MAX_DEPTH: u8 = 8;

const WIN_SCORE: i32 = 10;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
}

/// 根节点的最佳落子及其得分。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub cell: usize,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum SearchError {
    #[error("board is inconsistent with the turn: {error}")]
    Inconsistent {
        #[from]
        error: IntegrityError,
    },
    #[error("{winner} has already won")]
    GameOver { winner: Player },
    #[error("chosen move was rejected: {error}")]
    Rule {
        #[from]
        error: RuleError,
    },
}

/// 为最后一手的一方连成一线打分：X 胜为 `10 - (turn - 1)`，O 胜取相反数。
/// 越早获胜绝对值越大。
fn win_score(board: &Board, turn: u8) -> Option<i32> {
    let last_mover = Player::for_turn(turn).other();
    if !has_won(board, last_mover.win_sum()) {
        return None;
    }
    let magnitude = WIN_SCORE - (i32::from(turn) - 1);
    Some(if last_mover.is_maximizing() {
        magnitude
    } else {
        -magnitude
    })
}

fn prefer(mover: Player, incumbent: i32, candidate: i32) -> i32 {
    if mover.is_maximizing() {
        incumbent.max(candidate)
    } else {
        incumbent.min(candidate)
    }
}

/// 严格优于才替换，保证同分时选索引最小的格子。
fn improves(mover: Player, candidate: i32, incumbent: i32) -> bool {
    if mover.is_maximizing() {
        candidate > incumbent
    } else {
        candidate < incumbent
    }
}

struct Search {
    max_depth: u8,
    stats: SearchStats,
}

impl Search {
    fn new(max_depth: u8) -> Self {
        Self {
            max_depth,
            stats: SearchStats::default(),
        }
    }

    fn root(&mut self, board: &Board, turn: u8, pruning: bool) -> Option<SearchResult> {
        if turn >= MAX_TURNS {
            return None;
        }

        let mover = Player::for_turn(turn);
        let mut best: Option<SearchResult> = None;
        for cell in board.empty_cells() {
            let child = board.with_mark(cell, mover.mark());
            let score = if pruning {
                let (alpha, beta) = match best {
                    Some(incumbent) if mover.is_maximizing() => (incumbent.score, i32::MAX),
                    Some(incumbent) => (i32::MIN, incumbent.score),
                    None => (i32::MIN, i32::MAX),
                };
                self.score_pruned(&child, turn + 1, 0, alpha, beta)
            } else {
                self.score(&child, turn + 1, 0)
            };

            if best.map_or(true, |incumbent| improves(mover, score, incumbent.score)) {
                best = Some(SearchResult { cell, score });
            }
        }
        best
    }

    fn score(&mut self, board: &Board, turn: u8, depth: u8) -> i32 {
        self.stats.nodes += 1;

        if let Some(score) = win_score(board, turn) {
            return score;
        }
        if depth >= self.max_depth || turn >= MAX_TURNS {
            return 0;
        }

        let mover = Player::for_turn(turn);
        let mut best = None;
        for cell in board.empty_cells() {
            let child = board.with_mark(cell, mover.mark());
            let value = self.score(&child, turn + 1, depth.saturating_add(1));
            best = Some(best.map_or(value, |incumbent| prefer(mover, incumbent, value)));
        }
        best.unwrap_or(0)
    }

    // Fail-soft alpha-beta. A value strictly inside (alpha, beta) is exact, so the
    // root keeps the same move and score as `score`.
    fn score_pruned(
        &mut self,
        board: &Board,
        turn: u8,
        depth: u8,
        mut alpha: i32,
        mut beta: i32,
    ) -> i32 {
        self.stats.nodes += 1;

        if let Some(score) = win_score(board, turn) {
            return score;
        }
        if depth >= self.max_depth || turn >= MAX_TURNS {
            return 0;
        }

        let mover = Player::for_turn(turn);
        let mut best = None;
        for cell in board.empty_cells() {
            let child = board.with_mark(cell, mover.mark());
            let value = self.score_pruned(&child, turn + 1, depth.saturating_add(1), alpha, beta);
            let merged = best.map_or(value, |incumbent| prefer(mover, incumbent, value));
            best = Some(merged);

            if mover.is_maximizing() {
                alpha = alpha.max(merged);
            } else {
                beta = beta.min(merged);
            }
            if alpha >= beta {
                break;
            }
        }
        best.unwrap_or(0)
    }
}

/// 运行一次搜索并返回根节点结果与统计信息。
pub fn search(
    board: &Board,
    turn: u8,
    max_depth: u8,
    pruning: bool,
) -> (Option<SearchResult>, SearchStats) {
    let mut search = Search::new(max_depth);
    let result = search.root(board, turn, pruning);
    (result, search.stats)
}

/// 为轮到的一方选择最佳空格。棋盘已满（`turn >= 9`）或没有空格时返回 `None`。
///
/// 偶数回合 X 最大化得分，奇数回合 O 最小化得分；同分取索引最小的格子。
/// 调用方的棋盘不会被修改。
pub fn select_move(board: &Board, turn: u8, max_depth: u8) -> Option<usize> {
    search(board, turn, max_depth, false).0.map(|result| result.cell)
}

/// 与 [`select_move`] 结果相同，使用 alpha-beta 剪枝。
pub fn select_move_pruned(board: &Board, turn: u8, max_depth: u8) -> Option<usize> {
    search(board, turn, max_depth, true).0.map(|result| result.cell)
}

/// 对 `turn - 1` 手落子后得到的局面打分，正分有利于 X。
///
/// `depth` 是当前所在层数，达到 `max_depth` 或棋盘已满时按 0 分处理。
pub fn score(board: &Board, turn: u8, max_depth: u8, depth: u8) -> i32 {
    Search::new(max_depth).score(board, turn, depth)
}

/// 带前置条件检查的 [`select_move`]：棋盘与回合不一致或已有胜者时报错。
pub fn try_select_move(
    board: &Board,
    turn: u8,
    max_depth: u8,
) -> Result<Option<usize>, SearchError> {
    check_consistency(board, turn)?;
    if let Some(winner) = winner(board) {
        return Err(SearchError::GameOver { winner });
    }
    Ok(select_move(board, turn, max_depth))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Normal,
    Hard,
    Expert,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" => Ok(AiDifficulty::Normal),
            "hard" => Ok(AiDifficulty::Hard),
            "expert" | "extreme" => Ok(AiDifficulty::Expert),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    pub depth: u8,
    /// 随机落子的概率（0.0 ~ 1.0）。
    pub randomness: f64,
    pub pruning: bool,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                depth: 1,
                randomness: 0.35,
                pruning: true,
            },
            AiDifficulty::Normal => Self {
                depth: 3,
                randomness: 0.0,
                pruning: true,
            },
            AiDifficulty::Hard => Self {
                depth: 5,
                randomness: 0.0,
                pruning: true,
            },
            AiDifficulty::Expert => Self {
                depth: DEFAULT_MAX_DEPTH,
                randomness: 0.0,
                pruning: true,
            },
        }
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_randomness(mut self, randomness: f64) -> Self {
        self.randomness = randomness.clamp(0.0, 1.0);
        self
    }

    pub fn with_pruning(mut self, pruning: bool) -> Self {
        self.pruning = pruning;
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Normal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiDecision {
    pub player: Player,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<i32>,
    pub depth: u8,
    pub nodes: u64,
    pub duration_ms: u64,
    pub random: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RuleResolution>,
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// 为当前轮到的一方决定落子。对局已结束时返回不含落子的决策。
    pub fn decide_action(&mut self, state: &GameState) -> Result<AiDecision, SearchError> {
        let start = Instant::now();
        state.integrity_check()?;

        let player = state.current_player();
        let mut decision = AiDecision {
            player,
            cell: None,
            evaluation: None,
            depth: self.config.depth,
            nodes: 0,
            duration_ms: 0,
            random: false,
            resolution: None,
        };

        if state.is_finished() || state.turn >= MAX_TURNS {
            return Ok(decision);
        }
        if let Some(winner) = winner(&state.board) {
            return Err(SearchError::GameOver { winner });
        }

        if self.config.randomness > 0.0 && self.rng.gen::<f64>() < self.config.randomness {
            decision.cell = state.board.empty_cells().choose(&mut self.rng);
            decision.random = true;
        } else {
            let (result, stats) =
                search(&state.board, state.turn, self.config.depth, self.config.pruning);
            decision.cell = result.map(|result| result.cell);
            decision.evaluation = result.map(|result| result.score);
            decision.nodes = stats.nodes;
        }

        decision.resolution = decision
            .cell
            .map(|cell| simulate_resolution(state, MoveAction { player, cell }))
            .transpose()?;
        decision.duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            "{} plays {:?} (score {:?}, {} nodes, depth {}, random {})",
            player,
            decision.cell,
            decision.evaluation,
            decision.nodes,
            decision.depth,
            decision.random
        );

        Ok(decision)
    }
}

fn simulate_resolution(state: &GameState, action: MoveAction) -> Result<RuleResolution, RuleError> {
    let mut next_state = state.clone();
    let events = RuleEngine::new().play_move(&mut next_state, action)?;
    Ok(RuleResolution::new(next_state, events))
}
