//! 计时与浏览器控制台日志。

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use std::time::Duration;
use wasm_bindgen::JsValue;

/// 单调时钟。wasm32 上基于 `Date.now()`，其他平台使用 `std::time::Instant`。
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy)]
pub struct Instant {
    timestamp: f64,
}

#[cfg(target_arch = "wasm32")]
impl Instant {
    pub fn now() -> Self {
        Self {
            timestamp: web_sys::js_sys::Date::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        let elapsed_ms = (web_sys::js_sys::Date::now() - self.timestamp).max(0.0);
        Duration::from_millis(elapsed_ms as u64)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
pub struct Instant(std::time::Instant);

#[cfg(not(target_arch = "wasm32"))]
impl Instant {
    pub fn now() -> Self {
        Self(std::time::Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// 把 `log` 记录转发到 `console.*`。
pub struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}: {}", record.level(), record.target(), record.args());
        let value = JsValue::from_str(&message);
        match record.level() {
            Level::Error => web_sys::console::error_1(&value),
            Level::Warn => web_sys::console::warn_1(&value),
            Level::Info => web_sys::console::info_1(&value),
            Level::Debug | Level::Trace => web_sys::console::debug_1(&value),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;
static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// 安装控制台日志，只在第一次调用时生效。若已有其他 logger 则返回 false。
pub fn init_console_logger(level: LevelFilter) -> bool {
    *LOGGER_INSTALLED.get_or_init(|| {
        let installed = log::set_logger(&LOGGER).is_ok();
        if installed {
            log::set_max_level(level);
        }
        installed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_monotonic() {
        let start = Instant::now();
        let first = start.elapsed();
        let second = start.elapsed();
        assert!(second >= first);
    }
}
