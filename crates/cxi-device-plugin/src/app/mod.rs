//! Background tasks shared by the long-running commands.

pub mod tasks;

pub use tasks::spawn_heartbeat;
pub use tasks::spawn_signal_listener;
