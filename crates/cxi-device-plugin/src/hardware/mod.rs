//! Hardware discovery for CXI NICs.
//!
//! Everything here is a read-only pass over sysfs, devfs and the library
//! directories. Nothing is cached between calls: each discovery rescans and
//! returns fresh records.

use core::error::Error;

use derive_more::Display;

pub mod device;
pub mod discovery;
pub mod environment;
pub mod identity;
pub mod mount;
pub mod roots;

pub use device::DeviceRecord;
pub use device::DeviceSet;
pub use discovery::Discovery;
pub use environment::discover_environment;
pub use mount::FileKind;
pub use mount::MountRecord;

/// Errors raised while scanning the host for devices and libraries.
#[derive(Debug, Display)]
pub enum HardwareError {
    #[display("Failed to read topology namespace {path}")]
    Topology { path: String },
    #[display("Device index not found under {path}")]
    DeviceIndexNotFound { path: String },
    #[display("Required library {name} not found")]
    LibraryNotFound { name: String },
    #[display("Failed to read library directory {path}")]
    LibraryDirectory { path: String },
    #[display("Failed to read environment file {path}")]
    EnvironmentFile { path: String },
}

impl Error for HardwareError {}
