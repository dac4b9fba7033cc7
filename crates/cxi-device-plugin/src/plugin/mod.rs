//! Kubelet device plugin for CXI NICs.
//!
//! [`ResourceSession`] holds the protocol state machine, [`server`] exposes it
//! over the kubelet gRPC API and [`ResourceLister`] decides which resources
//! get a session at all.

use core::error::Error;

use derive_more::Display;

pub mod allocation;
pub mod lister;
pub mod server;
pub mod session;

pub use allocation::AllocationSource;
pub use lister::ResourceLister;
pub use server::CxiDevicePlugin;
pub use session::ResourceSession;
pub use session::SessionState;

#[derive(Debug, Display)]
pub enum PluginError {
    #[display("Failed to load manifest for allocation")]
    Manifest,
    #[display("Device discovery failed")]
    Discovery,
    #[display("Required libraries could not be resolved")]
    Libraries,
    #[display("Session is {state:?}, expected {expected:?}")]
    InvalidState {
        state: SessionState,
        expected: SessionState,
    },
    #[display("Advertise stream closed by kubelet")]
    StreamClosed,
    #[display("Background task failed")]
    Task,
}

impl Error for PluginError {}
