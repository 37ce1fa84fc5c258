//! Observability
//!
//! Verbosity-aware logging and structured session lifecycle events.

pub mod audit;
pub mod log_context;

pub use log_context::LogContext;

/// Initialise `env_logger` at the level implied by `log`.
///
/// `RUST_LOG` still overrides the default. Calling this more than once is harmless.
pub fn init_logging(log: &LogContext) {
    let _ = env_logger::Builder::new()
        .filter_level(log.level_filter())
        .parse_default_env()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging(&LogContext::quiet());
        init_logging(&LogContext::default());
        assert!(log::max_level() <= log::LevelFilter::Trace);
    }
}
