//! Kubernetes device plugin and CDI manifest generator for HPE Slingshot
//! (CXI) NICs.

pub mod app;
pub mod cmd;
pub mod config;
pub mod hardware;
pub mod logging;
pub mod manifest;
pub mod plugin;
pub mod virtualization;

#[cfg(test)]
mod testing;
