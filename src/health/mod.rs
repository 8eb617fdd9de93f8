//! Health checks for tool system configurations
//!
//! Used by `toolsys check` and by CI to catch broken profiles before a tool
//! system is built from them:
//! - profiles that fail to load or validate
//! - cycles and unfed inputs in the slot graph
//! - device kinds the registry cannot build
//!
//! # Example
//!
//! ```no_run
//! use tool_system::health::{self, HealthCheckRunner, checks::*};
//!
//! let report = HealthCheckRunner::new()
//!     .add_check(ConfigCheck::new())
//!     .add_check(BuildInfoCheck::new())
//!     .run();
//! health::print_report(&report);
//! std::process::exit(report.exit_code());
//! ```

pub mod check;
pub mod checks;
pub mod reporter;
pub mod runner;

use tracing::warn;

pub use check::{CheckResult, CheckStatus, SystemCheck};
pub use reporter::{format_details, format_report, print_report};
pub use runner::{HealthCheckReport, HealthCheckRunner};

use crate::config::ToolSystemConfig;
use crate::device::DeviceRegistry;

/// Runs every built-in check against `profile` with the built-in devices
///
/// Graph and device checks are skipped when the profile cannot be read at
/// all; the configuration check reports why.
pub fn run_all_checks(profile: &str) -> HealthCheckReport {
    run_checks_with(profile, DeviceRegistry::with_builtins())
}

/// Like [`run_all_checks`] with a registry that knows embedder devices
pub fn run_checks_with(profile: &str, registry: DeviceRegistry) -> HealthCheckReport {
    let mut runner = HealthCheckRunner::new().add_check(checks::ConfigCheck::with_profiles([profile]));
    match ToolSystemConfig::read(profile) {
        Ok(config) => {
            runner = runner
                .add_check(checks::SlotGraphCheck::new(config.clone()))
                .add_check(checks::DeviceKindsCheck::new(config, registry));
        }
        Err(error) => warn!(profile, %error, "skipping graph checks"),
    }
    runner.add_check(checks::BuildInfoCheck::new()).run()
}
