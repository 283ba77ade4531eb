//! Logging for the woof-node binary.
//!
//! Every line goes to stdout (coloured, tagged with the emitting module) and
//! to `{log_dir}/woof-node.log` (plain, with source location). Engine logs are
//! prefixed with the connection id, so the module tag is enough to tell the
//! accept loop, receive loops and CLI commands apart on a terminal.
//!
//! The WebSocket stack logs every handshake header and frame at debug level.
//! Those targets are capped at `Info` unless `Trace` is asked for explicitly.

use crate::error::NodeError;

use std::fs::create_dir_all;
use std::io::stdout;
use std::path::Path;
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339_millis;
use log::{LevelFilter, info, warn};
use once_cell::sync::OnceCell;

pub const LOG_FILE_NAME: &str = "woof-node.log";

/// Level used when `--log-level` is not given.
#[cfg(debug_assertions)]
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Log targets of the WebSocket stack underneath the engine.
pub const TRANSPORT_TARGETS: [&str; 2] = ["tungstenite", "tokio_tungstenite"];

/// Level the process-wide logger was installed with.
static INSTALLED_LEVEL: OnceCell<LevelFilter> = OnceCell::new();

/// Level applied to [`TRANSPORT_TARGETS`] when the node runs at `level`.
pub fn transport_level(level: LevelFilter) -> LevelFilter {
    if level == LevelFilter::Trace {
        LevelFilter::Trace
    } else {
        level.min(LevelFilter::Info)
    }
}

/// Install the process-wide logger at `level`, creating `log_dir` if needed.
///
/// Only the first successful call installs anything; later calls warn when
/// they ask for a different level and return `Ok`. A failed call leaves
/// nothing installed, so it can be retried with another directory.
///
/// # Errors
///
/// Returns [`NodeError::Node`] if the directory or log file cannot be created,
/// or another global logger is already in place.
pub fn initialize(log_dir: &Path, level: LevelFilter) -> Result<(), NodeError> {
    let mut installed_now = false;
    let installed = INSTALLED_LEVEL.get_or_try_init(|| {
        install(log_dir, level)?;
        installed_now = true;
        Ok::<_, NodeError>(level)
    })?;

    if installed_now {
        info!(
            "Logging at {level:?} to {} (transport at {:?})",
            log_dir.join(LOG_FILE_NAME).display(),
            transport_level(level)
        );
    } else if *installed != level {
        warn!("Logger already running at {installed:?}; ignoring request for {level:?}");
    }

    Ok(())
}

/// Level the logger is running at, if it has been installed.
pub fn installed_level() -> Option<LevelFilter> {
    INSTALLED_LEVEL.get().copied()
}

#[track_caller]
fn install(log_dir: &Path, level: LevelFilter) -> Result<(), NodeError> {
    create_dir_all(log_dir).map_err(|e| {
        NodeError::node(format!(
            "Failed to create log directory {}: {e}",
            log_dir.display()
        ))
    })?;
    let log_file = fern::log_file(log_dir.join(LOG_FILE_NAME))
        .map_err(|e| NodeError::node(format!("Failed to open log file: {e}")))?;

    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let mut base = Dispatch::new().level(level);
    for target in TRANSPORT_TARGETS {
        base = base.level_for(target, transport_level(level));
    }

    let terminal = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{date} {level:<5} {target}: {message}",
                date = format_rfc3339_millis(SystemTime::now()),
                level = colors.color(record.level()),
                target = record.target(),
            ))
        })
        .chain(stdout());

    let file = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{date} {level:<5} {target}: {message} [{file}:{line}]",
                date = format_rfc3339_millis(SystemTime::now()),
                level = record.level(),
                target = record.target(),
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(log_file);

    base.chain(terminal)
        .chain(file)
        .apply()
        .map_err(|e| NodeError::node(format!("Failed to install logger: {e}")))
}
