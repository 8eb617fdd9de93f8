//! Built-in checks of the tool system configuration

pub mod build_info;
pub mod config;
pub mod devices;
pub mod slot_graph;

pub use build_info::BuildInfoCheck;
pub use config::ConfigCheck;
pub use devices::DeviceKindsCheck;
pub use slot_graph::SlotGraphCheck;
