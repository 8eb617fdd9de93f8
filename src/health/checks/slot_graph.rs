//! Slot dataflow health check

use std::collections::HashSet;

use crate::config::ToolSystemConfig;
use crate::health::check::{CheckResult, SystemCheck};
use crate::slot::{AliasMap, SlotRegistry};

/// Slots the device manager fills in on its own
const IMPLICIT_SLOTS: [&str; 4] = [
    "SystemTime",
    "WorldToCamera",
    "CameraToNDC",
    "AvatarTransformation",
];

/// Checks that the slot graph is acyclic and every virtual device input has
/// a producer
pub struct SlotGraphCheck {
    config: ToolSystemConfig,
}

impl SlotGraphCheck {
    pub fn new(config: ToolSystemConfig) -> Self {
        Self { config }
    }
}

impl SystemCheck for SlotGraphCheck {
    fn name(&self) -> &'static str {
        "Slot Graph"
    }

    fn description(&self) -> Option<&'static str> {
        Some("Rejects cycles and finds virtual device inputs nothing writes to")
    }

    fn check(&self) -> CheckResult {
        if let Err(error) = self.config.validate() {
            return CheckResult::fail("Slot graph is invalid").with_detail(error.to_string());
        }

        let config = &self.config;
        let mut produced: HashSet<&str> = IMPLICIT_SLOTS.into_iter().collect();
        produced.extend(config.raw_mappings.iter().map(|m| m.target.as_str()));
        produced.extend(config.constants.iter().map(|c| c.slot.as_str()));
        produced.extend(config.virtual_devices.iter().map(|d| d.output.as_str()));
        produced.extend(config.virtual_mappings.iter().map(|m| m.target.as_str()));

        let orphans: Vec<String> = config
            .virtual_devices
            .iter()
            .flat_map(|device| {
                device
                    .inputs
                    .iter()
                    .filter(|input| !produced.contains(input.as_str()))
                    .map(move |input| format!("⚠ {} input '{}' has no producer", device.kind, input))
            })
            .collect();

        let slots = SlotRegistry::new();
        let aliases = AliasMap::from_mappings(&config.virtual_mappings, &slots);
        let mut details: Vec<String> = aliases
            .alias_slots()
            .map(|alias| {
                let triggers: Vec<String> = aliases
                    .resolve(alias)
                    .into_iter()
                    .map(|slot| slots.display(slot))
                    .collect();
                format!("{} <- {}", slots.display(alias), triggers.join(", "))
            })
            .collect();
        details.extend(orphans.iter().cloned());

        if orphans.is_empty() {
            CheckResult::pass("Slot graph is acyclic and fully fed").with_details(details)
        } else {
            CheckResult::warn(format!("{} virtual device inputs are never written", orphans.len()))
                .with_details(details)
        }
    }
}
