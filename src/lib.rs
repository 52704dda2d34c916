pub mod ai;
pub mod game;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use log::{debug, LevelFilter};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    score, search, select_move, select_move_pruned, try_select_move, AiAgent, AiConfig,
    AiDecision, AiDifficulty, SearchError, SearchResult, SearchStats, DEFAULT_MAX_DEPTH,
};
pub use game::{
    check_consistency, has_won, is_draw, winner, winning_line, Board, Cell, GameEvent, GameState,
    IntegrityError, InvalidCellValue, MoveAction, Outcome, Player, RuleEngine, RuleError,
    RuleResolution, BOARD_SIZE, MAX_TURNS, WIN_COMBINATIONS,
};

/// 电脑落子前的默认停顿。
pub const DEFAULT_THINK_DELAY_MS: u32 = 500;

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    utils::init_console_logger(LevelFilter::Info);
}

fn to_js_error<E: Serialize + Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn config_from(difficulty: Option<&str>) -> AiConfig {
    let difficulty = difficulty
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or(AiDifficulty::Normal);
    AiConfig::from_difficulty(difficulty)
}

#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
    rules: RuleEngine,
    // Bumped on every reset so that pending `think_ai` promises can tell they are stale.
    generation: Rc<std::cell::Cell<u32>>,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>) -> Result<GameEngine, JsValue> {
        let state = match initial_state_json {
            Some(json) => {
                let state: GameState = serde_json::from_str(&json).map_err(serde_to_js_error)?;
                state.integrity_check().map_err(to_js_error)?;
                state
            }
            None => GameState::new(),
        };
        Ok(GameEngine {
            state,
            rules: RuleEngine::new(),
            generation: Rc::new(std::cell::Cell::new(0)),
        })
    }

    fn invalidate_pending(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state.integrity_check().map_err(to_js_error)?;
        self.invalidate_pending();
        self.state = state;
        Ok(())
    }

    /// 开新局，同时作废尚未完成的电脑思考。
    pub fn new_game(&mut self) -> Result<String, JsValue> {
        self.invalidate_pending();
        self.state = self.rules.new_game();
        serde_json::to_string(&RuleResolution::new(self.state.clone(), Vec::new()))
            .map_err(serde_to_js_error)
    }

    pub fn current_player(&self) -> String {
        self.state.current_player().to_string()
    }

    pub fn play_move(&mut self, cell: usize) -> Result<String, JsValue> {
        let action = MoveAction {
            player: self.state.current_player(),
            cell,
        };
        let events = self
            .rules
            .play_move(&mut self.state, action)
            .map_err(to_js_error)?;
        serde_json::to_string(&RuleResolution::new(self.state.clone(), events))
            .map_err(serde_to_js_error)
    }

    pub fn outcome_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&RuleEngine::check_outcome(&self.state)).map_err(serde_to_js_error)
    }

    pub fn apply_ai_move(&mut self, difficulty: Option<String>) -> Result<String, JsValue> {
        let mut agent = AiAgent::new(config_from(difficulty.as_deref()));
        let mut decision = agent.decide_action(&self.state).map_err(to_js_error)?;

        if let Some(cell) = decision.cell {
            let action = MoveAction {
                player: decision.player,
                cell,
            };
            let events = self
                .rules
                .play_move(&mut self.state, action)
                .map_err(to_js_error)?;
            decision.resolution = Some(RuleResolution::new(self.state.clone(), events));
        }

        serde_json::to_string(&decision).map_err(serde_to_js_error)
    }

    /// 延迟 `delay_ms` 后计算电脑落子，不修改当前状态。
    /// 期间若调用了 `new_game` 或 `set_state_json`，Promise 以 `null` 结束。
    pub fn think_ai(&self, difficulty: Option<String>, delay_ms: Option<u32>) -> Promise {
        let state = self.state.clone();
        let config = config_from(difficulty.as_deref());
        let delay = delay_ms.unwrap_or(DEFAULT_THINK_DELAY_MS);
        let generation = Rc::clone(&self.generation);
        let issued = generation.get();

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            if generation.get() != issued {
                debug!("discarding stale think request (generation {issued})");
                return Ok(JsValue::NULL);
            }
            let mut agent = AiAgent::new(config);
            let decision = agent.decide_action(&state).map_err(to_js_error)?;
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

/// 返回一个空的初始对局状态。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state() -> Result<JsValue, JsValue> {
    to_value(&GameState::new()).map_err(JsValue::from)
}

/// 为轮到的一方选择落子，没有可走的格子时返回 -1。
#[wasm_bindgen(js_name = "selectMove")]
pub fn select_move_js(board: JsValue, turn: u8, max_depth: Option<u8>) -> Result<i32, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let depth = max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
    Ok(select_move_pruned(&board, turn, depth).map_or(-1, |cell| cell as i32))
}

/// 同 `selectMove`，但会拒绝与回合数不一致或已分出胜负的棋盘。
#[wasm_bindgen(js_name = "selectMoveChecked")]
pub fn select_move_checked_js(
    board: JsValue,
    turn: u8,
    max_depth: Option<u8>,
) -> Result<i32, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let depth = max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
    let cell = try_select_move(&board, turn, depth).map_err(to_js_error)?;
    Ok(cell.map_or(-1, |cell| cell as i32))
}

#[wasm_bindgen(js_name = "hasWon")]
pub fn has_won_js(board: JsValue, target_sum: i8) -> Result<bool, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    Ok(has_won(&board, target_sum))
}

#[wasm_bindgen(js_name = "playMove")]
pub fn play_move(state: JsValue, action: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let action: MoveAction = from_value(action).map_err(JsValue::from)?;
    let engine = RuleEngine::new();
    match engine.play_move(&mut state, action) {
        Ok(events) => to_value(&RuleResolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "checkOutcome")]
pub fn check_outcome(state: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let outcome = RuleEngine::check_outcome(&state);
    to_value(&outcome).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(state: JsValue, difficulty: Option<String>) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut agent = AiAgent::new(config_from(difficulty.as_deref()));
    let decision = agent.decide_action(&state).map_err(to_js_error)?;
    to_value(&decision).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
