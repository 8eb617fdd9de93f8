//! Runs a suite of health checks and tallies the outcome

use std::time::Instant;

use tracing::{debug, warn};

use super::check::{CheckResult, CheckStatus, SystemCheck};

/// Results of a check suite, in the order the checks ran
#[derive(Debug, Default)]
pub struct HealthCheckReport {
    pub results: Vec<(String, CheckResult)>,
    pub total: usize,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
}

impl HealthCheckReport {
    /// No check failed
    pub fn is_healthy(&self) -> bool {
        self.failed == 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warned > 0
    }

    /// Worst status in the report; Pass for an empty one
    pub fn worst(&self) -> CheckStatus {
        self.results
            .iter()
            .map(|(_, result)| result.status)
            .max()
            .unwrap_or(CheckStatus::Pass)
    }

    /// Process exit code: 0 all pass, 1 any fail, 2 warnings only
    pub fn exit_code(&self) -> i32 {
        match self.worst() {
            CheckStatus::Pass => 0,
            CheckStatus::Fail => 1,
            CheckStatus::Warn => 2,
        }
    }

    fn record(&mut self, name: String, result: CheckResult) {
        match result.status {
            CheckStatus::Pass => self.passed += 1,
            CheckStatus::Warn => self.warned += 1,
            CheckStatus::Fail => self.failed += 1,
        }
        self.total += 1;
        self.results.push((name, result));
    }
}

/// Collects checks and runs them one after another
#[derive(Default)]
pub struct HealthCheckRunner {
    checks: Vec<Box<dyn SystemCheck>>,
}

impl HealthCheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check<C: SystemCheck + 'static>(mut self, check: C) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Number of checks queued
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn run(self) -> HealthCheckReport {
        let mut report = HealthCheckReport::default();
        for check in self.checks {
            let start = Instant::now();
            let result = check.check().with_duration(start.elapsed());
            match result.status {
                CheckStatus::Fail => warn!(check = check.name(), message = %result.message, "check failed"),
                _ => debug!(check = check.name(), status = %result.status, "check finished"),
            }
            report.record(check.name().to_string(), result);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(CheckStatus);

    impl SystemCheck for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn check(&self) -> CheckResult {
            match self.0 {
                CheckStatus::Pass => CheckResult::pass("ok"),
                CheckStatus::Warn => CheckResult::warn("meh"),
                CheckStatus::Fail => CheckResult::fail("bad"),
            }
        }
    }

    #[test]
    fn test_exit_codes() {
        let empty = HealthCheckRunner::new().run();
        assert_eq!(empty.exit_code(), 0);

        let warned = HealthCheckRunner::new()
            .add_check(Fixed(CheckStatus::Pass))
            .add_check(Fixed(CheckStatus::Warn))
            .run();
        assert_eq!(warned.exit_code(), 2);
        assert!(warned.is_healthy());

        let failed = HealthCheckRunner::new()
            .add_check(Fixed(CheckStatus::Fail))
            .add_check(Fixed(CheckStatus::Warn))
            .run();
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.total, 2);
        assert_eq!(failed.passed + failed.warned + failed.failed, failed.total);
    }
}
