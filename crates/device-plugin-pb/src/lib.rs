//! Generated bindings for the kubelet device plugin API (`v1beta1`).

#![allow(clippy::doc_markdown)]
pub mod api {
    #![allow(clippy::doc_overindented_list_items)]
    tonic::include_proto!("v1beta1");
}

/// Version string sent in the kubelet registration request.
pub const API_VERSION: &str = "v1beta1";

/// Health value reported for a device that can be handed out.
pub const HEALTHY: &str = "Healthy";

/// Health value reported for a device that failed its probe.
pub const UNHEALTHY: &str = "Unhealthy";
