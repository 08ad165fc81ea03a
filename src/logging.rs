//! Logging (A1): a process-wide `log` facade backend, initialized once at
//! binary startup from the configuration's `logging` subsection and
//! overridable by `AISH_DEBUG`, which forces debug-level logging to
//! stderr regardless of configuration.

use std::sync::Once;

use crate::config::LoggingPreferences;

static INIT: Once = Once::new();

/// Initialize the global logger. Safe to call more than once; only the
/// first call takes effect, matching `env_logger`'s own idempotence.
pub fn init(preferences: &LoggingPreferences) {
    let forced_debug = std::env::var("AISH_DEBUG")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);

    let level = if forced_debug || preferences.debug {
        "debug"
    } else {
        preferences.level.as_str()
    };

    // AISH_DEBUG always forces stderr regardless of the configured sink,
    // so a developer chasing a bug never has to go find the log file.
    let target = if forced_debug {
        env_logger::Target::Stderr
    } else {
        match (preferences.output.as_str(), &preferences.file) {
            ("file", Some(path)) => std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(|f| env_logger::Target::Pipe(Box::new(f)))
                .unwrap_or(env_logger::Target::Stderr),
            _ => env_logger::Target::Stderr,
        }
    };

    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&format!("aish={level}"));
        builder.target(target);
        let _ = builder.try_init();
    });
}

/// Log an internal (non-user-facing) structured error at `error` level
/// with its full cause chain.
pub fn log_internal_error(err: &crate::error::Error) {
    log::error!("{err}");
    for cause in err.cause_chain() {
        log::error!("  caused by: {cause}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_on_repeated_calls() {
        let prefs = LoggingPreferences::default();
        init(&prefs);
        init(&prefs);
    }
}
