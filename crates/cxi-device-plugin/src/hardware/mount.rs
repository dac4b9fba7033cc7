use std::fs::FileType;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// File type of a mount source, as reported by `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl FileKind {
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_file() {
            Self::Regular
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_char_device() {
            Self::CharDevice
        } else if file_type.is_block_device() {
            Self::BlockDevice
        } else if file_type.is_fifo() {
            Self::Fifo
        } else if file_type.is_socket() {
            Self::Socket
        } else {
            Self::Unknown
        }
    }

    /// Single character tag in `ls -l` style. Empty for unknown types.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Regular => "-",
            Self::Directory => "d",
            Self::Symlink => "l",
            Self::CharDevice => "c",
            Self::BlockDevice => "b",
            Self::Fifo => "p",
            Self::Socket => "s",
            Self::Unknown => "",
        }
    }
}

/// A host path bind mounted into containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    /// library the mount belongs to, e.g. `libfabric`
    pub name: String,
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub options: Vec<String>,
    pub kind: FileKind,
}
