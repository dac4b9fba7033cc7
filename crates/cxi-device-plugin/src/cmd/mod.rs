//! Command layer - entry points for the binary's subcommands

pub mod device_plugin;
pub mod generate_manifest;

pub use device_plugin::run_device_plugin;
pub use generate_manifest::run_generate_manifest;
