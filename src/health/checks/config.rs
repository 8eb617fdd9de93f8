//! Configuration loading health check

use crate::config::ToolSystemConfig;
use crate::health::check::{CheckResult, SystemCheck};

/// Checks that every listed profile loads and validates
pub struct ConfigCheck {
    profiles: Vec<String>,
}

impl ConfigCheck {
    /// Checks the shipped `desktop` profile
    pub fn new() -> Self {
        Self::with_profiles(["desktop"])
    }

    pub fn with_profiles<I, S>(profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            profiles: profiles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ConfigCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCheck for ConfigCheck {
    fn name(&self) -> &'static str {
        "Configuration"
    }

    fn description(&self) -> Option<&'static str> {
        Some("Loads each profile from files and environment and validates it")
    }

    fn check(&self) -> CheckResult {
        let mut details = Vec::new();
        let mut failed = 0;

        for profile in &self.profiles {
            match ToolSystemConfig::load(profile) {
                Ok(config) => details.push(format!(
                    "✓ profile '{}': {} raw devices, {} virtual devices, {} aliases",
                    profile,
                    config.raw_devices.len(),
                    config.virtual_devices.len(),
                    config.virtual_mappings.len()
                )),
                Err(error) => {
                    failed += 1;
                    details.push(format!("✗ profile '{}': {}", profile, error));
                }
            }
        }

        let empty_profiles: Vec<&String> = self
            .profiles
            .iter()
            .filter(|profile| {
                ToolSystemConfig::read(profile)
                    .is_ok_and(|c| c.raw_devices.is_empty() && c.virtual_devices.is_empty())
            })
            .collect();
        for profile in &empty_profiles {
            details.push(format!("⚠ profile '{}' defines no devices", profile));
        }

        if failed > 0 {
            CheckResult::fail(format!("{} of {} profiles failed", failed, self.profiles.len()))
                .with_details(details)
        } else if !empty_profiles.is_empty() {
            CheckResult::warn("Profiles loaded, some without devices").with_details(details)
        } else {
            CheckResult::pass(format!("{} profiles validated", self.profiles.len()))
                .with_details(details)
        }
    }
}
