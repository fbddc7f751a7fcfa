//! User-facing driver signals (Design Notes §9), kept distinct from the
//! `log` crate's developer diagnostics. The `log` macros in every other
//! module are for debugging the core itself; a [`Logger`] is how the
//! orchestrator reports progress and counters to whatever shell — GUI or
//! CLI — embeds it.

/// Collaborator interface the orchestrator drives stage progress and
/// counters through. `confirm` lets a GUI shell prompt the user (e.g.
/// "library root doesn't exist, create it?") without the core knowing
/// anything about dialogs.
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str);
    fn error(&self, msg: &str);
    fn progress(&self, task: &str, current: u64, total: u64);
    fn fatal(&self, msg: &str);
    fn confirm(&self, prompt: &str) -> bool;
}

/// Discards everything; the default for tests and non-interactive runs.
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn progress(&self, _task: &str, _current: u64, _total: u64) {}
    fn fatal(&self, _msg: &str) {}
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_logger_confirms_everything() {
        let logger = NullLogger;
        assert!(logger.confirm("anything?"));
        logger.info("noop");
        logger.error("noop");
        logger.progress("scan", 1, 2);
        logger.fatal("noop");
    }
}
