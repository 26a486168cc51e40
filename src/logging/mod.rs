// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! Everything in the crate logs through the `log` facade, usually via the
//! `[Context]`-prefixed macros in `wrapper.rs`.  The backend is either
//! `env_logger` (default) or a `slog` drain when `proxy.logging.structured`
//! is set, in which case `slog-stdlog` forwards `log` records into it.

pub mod config;
pub mod middleware;
pub mod structured;
mod wrapper;


use log::LevelFilter;
use once_cell::sync::OnceCell;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use self::config::LoggingConfig;
use self::structured::LoggerGuard;

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static GLOBAL_GUARD: OnceCell<LoggerGuard> = OnceCell::new();

/// Initialise `env_logger` at `level` (or `RUST_LOG`, which wins).
///
/// Only the first call in a process has any effect.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| {
        init_env_logger(level.unwrap_or(LevelFilter::Info));
    });
}

/// Initialise logging from a [`LoggingConfig`].
///
/// Only the first call in a process has any effect.
pub fn init_with_config(level: LevelFilter, config: &LoggingConfig) {
    INIT.call_once(|| {
        if !config.structured {
            init_env_logger(level);
            return;
        }

        let logger_config = config.to_logger_config();
        let guard = structured::init_global_logger(&logger_config);
        match slog_stdlog::init_with_level(level.to_level().unwrap_or(log::Level::Error)) {
            Ok(()) => {
                log::set_max_level(level);
                USING_STRUCTURED.store(true, Ordering::SeqCst);
                let _ = GLOBAL_GUARD.set(guard);
                log::info!("Structured logging initialized at level: {}", level);
            }
            Err(e) => {
                // someone else already owns the `log` facade
                drop(guard);
                eprintln!("Failed to bridge log records into slog: {e}");
            }
        }
    });
}

/// Whether records are going to the structured backend.
pub fn is_structured_logging() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

/// Parse a level name such as `debug` or `WARN`.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

fn init_env_logger(level: LevelFilter) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level.as_str().to_lowercase());

    let result = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .try_init();

    if result.is_ok() {
        log::info!("Logging initialized at level: {}", log::max_level());
    }
}

/// Log an error with context and hand it back, for use in `map_err`.
pub fn log_error<E: std::fmt::Display>(context: &str, err: E) -> E {
    log::error!("[{}] {}", context, err);
    err
}
