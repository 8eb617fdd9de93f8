//! Device kinds health check

use crate::config::ToolSystemConfig;
use crate::device::DeviceRegistry;
use crate::health::check::{CheckResult, SystemCheck};
use crate::slot::SlotRegistry;

/// Checks that every configured device kind exists and accepts its inputs
/// and options
///
/// Virtual devices are initialized on a scratch slot registry; raw devices
/// are only looked up, since initializing them starts drivers.
pub struct DeviceKindsCheck {
    config: ToolSystemConfig,
    registry: DeviceRegistry,
}

impl DeviceKindsCheck {
    pub fn new(config: ToolSystemConfig, registry: DeviceRegistry) -> Self {
        Self { config, registry }
    }
}

impl SystemCheck for DeviceKindsCheck {
    fn name(&self) -> &'static str {
        "Device Kinds"
    }

    fn description(&self) -> Option<&'static str> {
        Some("Matches configured raw and virtual devices against the device registry")
    }

    fn check(&self) -> CheckResult {
        let mut details = Vec::new();
        let mut problems = 0;

        for device in &self.config.raw_devices {
            if self.registry.knows_raw(&device.kind) {
                details.push(format!("✓ raw '{}' ({})", device.id, device.kind));
            } else {
                problems += 1;
                details.push(format!("✗ raw '{}': unknown kind '{}'", device.id, device.kind));
            }
        }

        let slots = SlotRegistry::new();
        for device in &self.config.virtual_devices {
            let initialized = self.registry.create_virtual(&device.kind).and_then(|mut virt| {
                let inputs = slots.slots(device.inputs.iter().map(String::as_str));
                virt.initialize(&inputs, slots.slot(&device.output), &device.options)
            });
            match initialized {
                Ok(()) => details.push(format!("✓ virtual {} -> {}", device.kind, device.output)),
                Err(error) => {
                    problems += 1;
                    details.push(format!("✗ virtual {} -> {}: {}", device.kind, device.output, error));
                }
            }
        }

        let total = self.config.raw_devices.len() + self.config.virtual_devices.len();
        if problems == 0 {
            CheckResult::pass(format!("{} devices buildable", total)).with_details(details)
        } else {
            CheckResult::warn(format!("{} of {} devices would be skipped", problems, total))
                .with_details(details)
        }
    }
}
