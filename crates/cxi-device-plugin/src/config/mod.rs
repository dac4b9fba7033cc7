pub mod cli;
pub mod host;
pub mod manifest;
pub mod plugin;

pub use cli::*;
pub use host::HostConfig;
pub use manifest::*;
pub use plugin::*;
