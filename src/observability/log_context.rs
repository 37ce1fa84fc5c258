/// Verbosity-aware logging handle threaded through config, setup and lock calls
use crate::config::types::Verbosity;
use log::{debug, info, warn};
use std::fmt::Display;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    verbosity: Verbosity,
}

impl LogContext {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn quiet() -> Self {
        Self::new(Verbosity::Quiet)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Advisory message; suppressed in quiet mode
    pub fn warning(&self, message: impl Display) {
        if self.verbosity != Verbosity::Quiet {
            warn!("{}", message);
        }
    }

    /// Progress message; promoted to info only in verbose mode
    pub fn info(&self, message: impl Display) {
        if self.verbosity == Verbosity::Verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    /// Log level implied by the verbosity
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.verbosity {
            Verbosity::Quiet => log::LevelFilter::Error,
            Verbosity::Normal => log::LevelFilter::Warn,
            Verbosity::Verbose => log::LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_follows_verbosity() {
        assert_eq!(LogContext::quiet().level_filter(), log::LevelFilter::Error);
        assert_eq!(LogContext::default().level_filter(), log::LevelFilter::Warn);
        assert_eq!(
            LogContext::new(Verbosity::Verbose).level_filter(),
            log::LevelFilter::Info
        );
    }
}
