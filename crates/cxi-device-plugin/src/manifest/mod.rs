//! CDI manifest handling: the document model, its on-disk store, the
//! synchronizer that builds it from discovered hardware and the reader that
//! turns it back into container edits.

use core::error::Error;

use derive_more::Display;

pub mod document;
pub mod reader;
pub mod store;
pub mod sync;
pub mod version;

pub use document::ContainerEdits;
pub use document::DeviceNode;
pub use document::Manifest;
pub use document::ManifestDevice;
pub use document::Mount;
pub use reader::ManifestEdits;
pub use store::ManifestStore;
pub use store::StoredManifest;
pub use sync::build_manifest;
pub use sync::ManifestSynchronizer;
pub use sync::ReconcilePolicy;
pub use sync::SyncOutcome;

#[derive(Debug, Display)]
pub enum ManifestError {
    #[display("Failed to read manifest {path}")]
    Read { path: String },
    #[display("Failed to parse manifest {path}")]
    Parse { path: String },
    #[display("Failed to serialize manifest {name}")]
    Serialize { name: String },
    #[display("Failed to write manifest {path}")]
    Write { path: String },
    #[display("Failed to remove manifest {path}")]
    Remove { path: String },
    #[display("Failed to set permissions on manifest {path}")]
    Permissions { path: String },
    #[display("Failed to list manifest directory {path}")]
    Directory { path: String },
    #[display("Invalid manifest kind {kind:?}")]
    InvalidKind { kind: String },
    #[display("Invalid manifest name {name:?}")]
    InvalidName { name: String },
}

impl Error for ManifestError {}
