//! Logging bootstrap for the store.
//!
//! # Responsibility
//! - Initialize file-based rolling logs exactly once per process.
//! - Keep log events metadata-only: ids, counts, uris, durations.
//!
//! # Invariants
//! - Initialization is idempotent for the same options.
//! - Initialization never panics.
//! - Re-initialization with different options is rejected.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "petstore";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Options accepted by [`init_logging_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    /// One of `trace|debug|info|warn|error`, case-insensitive.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: String,
    /// Mirror warnings and errors to stderr.
    pub echo_stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveOptions {
    level: &'static str,
    log_dir: PathBuf,
    echo_stderr: bool,
}

struct LoggingState {
    active: ActiveOptions,
    _logger: LoggerHandle,
}

/// Initializes logging to `log_dir` at `level` without stderr echo.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    init_logging_with(&LoggingOptions {
        level: level.to_string(),
        log_dir: log_dir.to_string(),
        echo_stderr: false,
    })
}

/// Initializes logging once per process.
///
/// # Errors
/// - Unsupported level, empty or relative directory.
/// - Directory creation or logger backend failure.
/// - Logging already active with different options.
pub fn init_logging_with(options: &LoggingOptions) -> Result<(), String> {
    let requested = ActiveOptions {
        level: normalize_level(&options.level)?,
        log_dir: normalize_log_dir(&options.log_dir)?,
        echo_stderr: options.echo_stderr,
    };

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(&requested))?;
    if state.active != requested {
        return Err(format!(
            "logging already initialized with level `{}` at `{}`; refusing to switch to level `{}` at `{}`",
            state.active.level,
            state.active.log_dir.display(),
            requested.level,
            requested.log_dir.display()
        ));
    }
    Ok(())
}

/// Returns `(level, log_dir)` when logging is active.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.active.level, state.active.log_dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(options: &ActiveOptions) -> Result<LoggingState, String> {
    std::fs::create_dir_all(&options.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            options.log_dir.display()
        )
    })?;

    let duplicate = if options.echo_stderr {
        Duplicate::Warn
    } else {
        Duplicate::None
    };

    let logger = Logger::try_with_str(options.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", options.level))?
        .log_to_file(
            FileSpec::default()
                .directory(options.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .duplicate_to_stderr(duplicate)
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook_once();

    info!(
        "event=store_logging module=core status=ok platform={} version={} level={} log_dir={}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        options.level,
        options.log_dir.display()
    );

    Ok(LoggingState {
        active: options.clone(),
        _logger: logger,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_summary(panic_info);
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location, payload
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, init_logging_with, logging_status, normalize_level, normalize_log_dir,
        sanitize_message, LoggingOptions,
    };

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(normalize_level("DEBUG").unwrap(), "debug");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert!(normalize_level("verbose").is_err());
    }

    #[test]
    fn normalize_log_dir_rejects_empty_and_relative_paths() {
        assert!(normalize_log_dir("   ").unwrap_err().contains("empty"));
        assert!(normalize_log_dir("logs/dev").unwrap_err().contains("absolute"));
    }

    #[test]
    fn sanitize_message_strips_newlines_and_truncates() {
        let sanitized = sanitize_message("a\nb\rc-long-tail", 5);
        assert_eq!(sanitized, "a b c...");
    }

    #[test]
    fn init_logging_is_idempotent_and_rejects_conflicts() {
        // Logger output outlives the test, so the directory is not cleaned up.
        let log_dir = std::env::temp_dir().join(format!("petstore-logging-{}", std::process::id()));
        let log_dir_str = log_dir.to_str().unwrap().to_string();

        init_logging("info", &log_dir_str).expect("first init should succeed");
        init_logging("INFO", &log_dir_str).expect("same options should be idempotent");

        let level_error = init_logging("debug", &log_dir_str).unwrap_err();
        assert!(level_error.contains("refusing to switch"));

        let echo_error = init_logging_with(&LoggingOptions {
            level: "info".to_string(),
            log_dir: log_dir_str.clone(),
            echo_stderr: true,
        })
        .unwrap_err();
        assert!(echo_error.contains("refusing to switch"));

        let (level, active_dir) = logging_status().expect("logging should be active");
        assert_eq!(level, "info");
        assert_eq!(active_dir, log_dir);
    }
}
