//! Error taxonomy for the filesystem core.
//!
//! One variant per failure kind from the specification, built with
//! `thiserror` rather than hand-rolled `Display` impls. The flat `fs_*`
//! API (see [`crate::api`]) collapses every variant to `-1`/`None`; callers
//! going through [`crate::volume::Volume`] directly see the typed error.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no filesystem is mounted")]
    NotMounted,

    #[error("a filesystem is already mounted")]
    AlreadyMounted,

    #[error("block device I/O failure: {0}")]
    Device(#[from] io::Error),

    #[error("disk image is not a valid ECS150FS image: {reason}")]
    BadImage { reason: &'static str },

    #[error("invalid argument: {reason}")]
    BadArgument { reason: &'static str },

    #[error("resource exhausted: {what}")]
    ResourceExhausted { what: &'static str },

    #[error("an entry with that name already exists")]
    NameConflict,

    #[error("no matching entry was found")]
    NotFound,

    #[error("entry is in use by an open file descriptor")]
    Busy,
}

pub type FsResult<T> = Result<T, FsError>;
