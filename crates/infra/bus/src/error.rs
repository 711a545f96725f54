//! Transport error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while allocating or attaching a shared segment
///
/// All of these are fatal at startup; nothing in the data path returns them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Segment file could not be created or sized
    #[error("failed to create segment {path}: {source}")]
    Create {
        /// Backing file
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Existing segment could not be opened
    #[error("failed to open segment {path}: {source}")]
    Open {
        /// Backing file
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// mmap refused
    #[error("failed to map segment: {0}")]
    Map(#[source] io::Error),

    /// Existing segment is smaller than the requested layout
    #[error("segment {path} is {actual} bytes, expected at least {expected}")]
    TooSmall {
        /// Backing file
        path: PathBuf,
        /// Size on disk
        actual: u64,
        /// Size the layout needs
        expected: u64,
    },

    /// Segment file could not be unlinked
    #[error("failed to remove segment {path}: {source}")]
    Remove {
        /// Backing file
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A System V call failed
    #[error("{op} failed for key {key:#010x}: {source}")]
    SysV {
        /// The failing call
        op: &'static str,
        /// Segment key
        key: u32,
        /// errno
        #[source]
        source: io::Error,
    },

    /// System V shared memory is not available on this platform
    #[error("System V shared memory is unsupported on this platform")]
    Unsupported,

    /// Queue requested with zero slots
    #[error("queue capacity must be non-zero")]
    ZeroCapacity,
}
