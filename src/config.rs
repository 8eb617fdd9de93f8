//! Tool system configuration
//!
//! Describes raw devices, raw-to-slot mappings, constant slots, virtual
//! devices and slot aliases. The configuration is resolved once when the
//! device and slot managers are built and is never changed afterwards.
//!
//! Profiles are layered like this:
//! 1. `config/default.toml` (base configuration)
//! 2. `config/{profile}.toml` (profile-specific additions)
//! 3. Environment variables with prefix `TOOLSYS_` (e.g. `TOOLSYS_SYSTEM__MAX_ITERATIONS=100`)

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized
    #[error("failed to load tool configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// The slot dataflow graph contains a cycle
    #[error("cyclic slot graph: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    /// A constant transformation is not a finite 4x4 matrix
    #[error("constant slot '{slot}' needs 16 finite entries, got {len}")]
    InvalidTransformation { slot: String, len: usize },
    /// A constant defines neither an axis nor a transformation
    #[error("constant slot '{0}' has no value")]
    EmptyConstant(String),
}

/// Engine settings that are not part of the device graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    /// Bound of the implicit-device feedback loop per processed event
    pub max_iterations: usize,
    /// Interval of the shared polling thread in milliseconds
    pub poll_interval_ms: u64,
    /// Tolerance when comparing implicit camera matrices
    pub matrix_epsilon: f64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            poll_interval_ms: 10,
            matrix_epsilon: 1e-12,
        }
    }
}

/// A raw device instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeviceConfig {
    /// Identifier referenced by raw mappings
    pub id: String,
    /// Device kind, resolved through the device registry
    pub kind: String,
    /// Device-specific options
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Maps one raw channel of a device onto a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMapping {
    /// Device id
    pub device: String,
    /// Device-specific channel name
    pub source: String,
    /// Target slot name
    pub target: String,
}

/// A slot with a fixed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualConstant {
    /// Slot name
    pub slot: String,
    /// Axis value
    #[serde(default)]
    pub axis: Option<f64>,
    /// Row-major 4x4 matrix
    #[serde(default)]
    pub transformation: Option<Vec<f64>>,
}

/// A virtual device instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualDeviceConfig {
    /// Device kind, resolved through the device registry
    pub kind: String,
    /// Ordered input slots
    pub inputs: Vec<String>,
    /// Derived output slot
    pub output: String,
    /// Device-specific options
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Plain 1:1 alias: `target` always carries the value of `source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMapping {
    /// Upstream slot
    pub source: String,
    /// Alias slot
    pub target: String,
}

/// Complete static configuration of a tool system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSystemConfig {
    /// Name of the profile this configuration was loaded from
    pub profile: String,
    /// Engine settings
    pub system: SystemSettings,
    /// Raw device instances
    pub raw_devices: Vec<RawDeviceConfig>,
    /// Raw channel to slot mappings
    pub raw_mappings: Vec<RawMapping>,
    /// Constant slots
    pub constants: Vec<VirtualConstant>,
    /// Virtual device instances
    pub virtual_devices: Vec<VirtualDeviceConfig>,
    /// Slot aliases
    pub virtual_mappings: Vec<VirtualMapping>,
}

impl ToolSystemConfig {
    /// Loads and validates the configuration for `profile`
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        let config = Self::read(profile)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration for `profile` without validating the graph
    pub fn read(profile: &str) -> Result<Self, ConfigError> {
        let config_dir = Self::find_config_dir();

        let mut builder = Config::builder();

        if let Some(ref dir) = config_dir {
            builder = builder
                .add_source(File::from(dir.join("default").as_path()).required(false))
                .add_source(File::from(dir.join(profile).as_path()).required(false));
        } else {
            builder = builder
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name(&format!("config/{}", profile)).required(false));
        }

        // Use __ as separator for nested fields (e.g., TOOLSYS_SYSTEM__POLL_INTERVAL_MS)
        builder = builder.add_source(
            Environment::with_prefix("TOOLSYS")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder
            .set_override("profile", profile)?
            .build()?
            .try_deserialize()?)
    }

    /// Loads the profile named by `TOOLSYS_PROFILE`, defaulting to "desktop"
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let profile = std::env::var("TOOLSYS_PROFILE").unwrap_or_else(|_| "desktop".to_string());
        Self::load(&profile)
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Concatenates the device graphs of several configurations
    ///
    /// Settings and profile are taken from the first entry.
    pub fn merge(configs: impl IntoIterator<Item = ToolSystemConfig>) -> Self {
        let mut merged: Option<ToolSystemConfig> = None;
        for config in configs {
            match merged.as_mut() {
                None => merged = Some(config),
                Some(m) => {
                    m.raw_devices.extend(config.raw_devices);
                    m.raw_mappings.extend(config.raw_mappings);
                    m.constants.extend(config.constants);
                    m.virtual_devices.extend(config.virtual_devices);
                    m.virtual_mappings.extend(config.virtual_mappings);
                }
            }
        }
        merged.unwrap_or_default()
    }

    /// Built-in desktop configuration
    ///
    /// A system timer feeds `SystemTime`, the pointer frame is derived from
    /// `PointerNDC` and the implicit camera slots, and mouse buttons are
    /// aliased to the primary/secondary action slots.
    pub fn default_desktop() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut identity = vec![0.0; 16];
        for i in 0..4 {
            identity[i * 5] = 1.0;
        }
        Self {
            profile: "desktop".to_string(),
            system: SystemSettings::default(),
            raw_devices: vec![RawDeviceConfig {
                id: "timer".to_string(),
                kind: "system-timer".to_string(),
                options: BTreeMap::new(),
            }],
            raw_mappings: vec![RawMapping {
                device: "timer".to_string(),
                source: "tick".to_string(),
                target: "SystemTime".to_string(),
            }],
            constants: vec![VirtualConstant {
                slot: "PointerNDC".to_string(),
                axis: None,
                transformation: Some(identity),
            }],
            virtual_devices: vec![VirtualDeviceConfig {
                kind: "pointer-transformation".to_string(),
                inputs: strings(&["PointerNDC", "WorldToCamera", "CameraToNDC"]),
                output: "PointerTransformation".to_string(),
                options: BTreeMap::new(),
            }],
            virtual_mappings: vec![
                VirtualMapping {
                    source: "LeftButton".to_string(),
                    target: "PrimaryAction".to_string(),
                },
                VirtualMapping {
                    source: "RightButton".to_string(),
                    target: "SecondaryAction".to_string(),
                },
                VirtualMapping {
                    source: "PrimaryAction".to_string(),
                    target: "PrimarySelection".to_string(),
                },
            ],
        }
    }

    /// Checks constants and rejects cycles in the slot dataflow graph
    ///
    /// Aliases contribute an edge source -> target, virtual devices an edge
    /// from every input to their output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for constant in &self.constants {
            match (&constant.axis, &constant.transformation) {
                (None, None) => return Err(ConfigError::EmptyConstant(constant.slot.clone())),
                (_, Some(values)) if values.len() != 16 || values.iter().any(|v| !v.is_finite()) => {
                    return Err(ConfigError::InvalidTransformation {
                        slot: constant.slot.clone(),
                        len: values.len(),
                    });
                }
                _ => {}
            }
        }

        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for mapping in &self.virtual_mappings {
            edges
                .entry(mapping.source.as_str())
                .or_default()
                .push(mapping.target.as_str());
        }
        for device in &self.virtual_devices {
            for input in &device.inputs {
                edges
                    .entry(input.as_str())
                    .or_default()
                    .push(device.output.as_str());
            }
        }
        match find_cycle(&edges) {
            Some(cycle) => Err(ConfigError::Cycle(cycle)),
            None => Ok(()),
        }
    }

    /// Finds the config directory by searching in multiple locations
    fn find_config_dir() -> Option<PathBuf> {
        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let config_dir = exe_dir.join("config");
            if config_dir.exists() {
                return Some(config_dir);
            }
        }

        let cwd_config = PathBuf::from("config");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        None
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search returning the first cycle found, closed on its start
fn find_cycle<'a>(edges: &HashMap<&'a str, Vec<&'a str>>) -> Option<Vec<String>> {
    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for next in edges.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(next, edges, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    let mut roots: Vec<&str> = edges.keys().copied().collect();
    roots.sort_unstable();
    for node in roots {
        if let Some(cycle) = visit(node, edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desktop_is_valid() {
        let config = ToolSystemConfig::default_desktop();
        assert!(config.validate().is_ok());
        assert_eq!(config.system.max_iterations, 5000);
    }

    #[test]
    fn test_from_toml_str() {
        let config = ToolSystemConfig::from_toml_str(
            r#"
            [system]
            max_iterations = 20

            [[virtual_mappings]]
            source = "LeftButton"
            target = "PrimaryAction"

            [[constants]]
            slot = "Gravity"
            axis = -9.81
            "#,
        )
        .unwrap();
        assert_eq!(config.system.max_iterations, 20);
        assert_eq!(config.system.poll_interval_ms, 10);
        assert_eq!(config.virtual_mappings.len(), 1);
        assert_eq!(config.constants[0].axis, Some(-9.81));
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let mut config = ToolSystemConfig::default();
        config.virtual_mappings = vec![
            VirtualMapping {
                source: "A".into(),
                target: "B".into(),
            },
            VirtualMapping {
                source: "B".into(),
                target: "A".into(),
            },
        ];
        match config.validate() {
            Err(ConfigError::Cycle(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_through_virtual_device_rejected() {
        let mut config = ToolSystemConfig::default();
        config.virtual_devices = vec![VirtualDeviceConfig {
            kind: "reverse-axis".into(),
            inputs: vec!["Forward".into()],
            output: "Backward".into(),
            options: BTreeMap::new(),
        }];
        config.virtual_mappings = vec![VirtualMapping {
            source: "Backward".into(),
            target: "Forward".into(),
        }];
        assert!(matches!(config.validate(), Err(ConfigError::Cycle(_))));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut config = ToolSystemConfig::default();
        config.virtual_mappings = vec![
            VirtualMapping {
                source: "R".into(),
                target: "A".into(),
            },
            VirtualMapping {
                source: "R".into(),
                target: "B".into(),
            },
        ];
        config.virtual_devices = vec![VirtualDeviceConfig {
            kind: "product-matrix".into(),
            inputs: vec!["A".into(), "B".into()],
            output: "C".into(),
            options: BTreeMap::new(),
        }];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_constant_rejected() {
        let mut config = ToolSystemConfig::default();
        config.constants = vec![VirtualConstant {
            slot: "Bad".into(),
            axis: None,
            transformation: Some(vec![1.0; 15]),
        }];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTransformation { len: 15, .. })
        ));

        config.constants[0].transformation = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyConstant(_))
        ));
    }

    #[test]
    fn test_merge_concatenates() {
        let merged = ToolSystemConfig::merge(vec![
            ToolSystemConfig::default_desktop(),
            ToolSystemConfig::default_desktop(),
        ]);
        assert_eq!(merged.raw_devices.len(), 2);
        assert_eq!(merged.virtual_mappings.len(), 6);
        assert_eq!(merged.profile, "desktop");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[[raw_devices]]\nid = \"timer\"\nkind = \"system-timer\"\n",
        )
        .unwrap();
        let config: ToolSystemConfig = Config::builder()
            .add_source(File::from(path.as_path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.raw_devices[0].kind, "system-timer");
        assert!(config.raw_devices[0].options.is_empty());
    }
}
