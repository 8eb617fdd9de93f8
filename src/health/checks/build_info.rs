//! Build information health check

use crate::build_info;
use crate::health::check::{CheckResult, SystemCheck};

/// Reports the build metadata embedded at compile time
pub struct BuildInfoCheck;

impl BuildInfoCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BuildInfoCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCheck for BuildInfoCheck {
    fn name(&self) -> &'static str {
        "Build Info"
    }

    fn description(&self) -> Option<&'static str> {
        Some("Reports version, target and compiler of this build")
    }

    fn check(&self) -> CheckResult {
        let details = build_info::detailed_info();
        if build_info::BUILD_TIMESTAMP.is_empty() || build_info::RUSTC_SEMVER.is_empty() {
            return CheckResult::warn("Build metadata incomplete").with_details(details);
        }
        CheckResult::pass(build_info::version_string()).with_details(details)
    }
}
