use std::process::ExitCode;

/// Aggregate counters for one whole tree walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Tests executed.
    pub run: usize,
    /// Executed tests that failed.
    pub failed: usize,
    /// Tests excluded by the filter, never executed.
    pub filtered: usize,
}

impl RunSummary {
    /// Whether every executed test passed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

impl From<RunSummary> for ExitCode {
    fn from(summary: RunSummary) -> Self {
        match summary.success() {
            true => ExitCode::SUCCESS,
            false => ExitCode::FAILURE,
        }
    }
}
