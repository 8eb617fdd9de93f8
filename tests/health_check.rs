//! Integration tests for the health check system

use tool_system::config::ToolSystemConfig;
use tool_system::device::DeviceRegistry;
use tool_system::health::{self, CheckStatus, HealthCheckRunner, SystemCheck, checks::*};

#[test]
fn test_desktop_profile_is_healthy() {
    let report = health::run_all_checks("desktop");

    if !report.is_healthy() {
        eprintln!("\n{}", health::format_report(&report));
        eprintln!("{}", health::format_details(&report));
    }

    assert!(
        report.is_healthy(),
        "Health checks failed: {} failures, {} warnings",
        report.failed,
        report.warned
    );
    assert_eq!(report.total, 4);
}

#[test]
fn test_config_check() {
    let result = ConfigCheck::new().check();
    assert!(
        result.status.is_ok(),
        "Config check failed: {}",
        result.message
    );
}

#[test]
fn test_profile_without_file_warns_about_missing_devices() {
    let result = ConfigCheck::with_profiles(["no-such-profile"]).check();
    assert_eq!(result.status, CheckStatus::Warn, "{:?}", result.details);
}

#[test]
fn test_build_info_check() {
    let result = BuildInfoCheck::new().check();
    assert!(
        result.status.is_ok(),
        "Build info check failed: {}",
        result.message
    );
}

#[test]
fn test_desktop_graph_and_devices() {
    let config = ToolSystemConfig::load("desktop").unwrap();
    let report = HealthCheckRunner::new()
        .add_check(SlotGraphCheck::new(config.clone()))
        .add_check(DeviceKindsCheck::new(config, DeviceRegistry::with_builtins()))
        .run();

    assert_eq!(report.total, 2);
    assert_eq!(report.passed + report.warned + report.failed, report.total);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_missing_driver_warns() {
    let config = ToolSystemConfig::load("desktop").unwrap();
    let report = HealthCheckRunner::new()
        .add_check(DeviceKindsCheck::new(config, DeviceRegistry::empty()))
        .run();
    assert_eq!(report.exit_code(), 2);
}
