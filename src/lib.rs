//! A user-space implementation of ECS150FS, a small FAT-style filesystem
//! that lives inside a single block-addressed container file.
//!
//! The crate is organized in layers, from the bottom up:
//!
//! - [`block`]: the block device contract (`BlockDevice` trait) plus a
//!   host-file-backed and an in-memory implementation.
//! - [`wire`]: explicit little-endian byte (de)serialization for on-disk
//!   structures.
//! - [`superblock`]: the fixed-layout block 0 header and its geometry
//!   invariants.
//! - [`fat`]: the in-memory File Allocation Table and its chain
//!   operations.
//! - [`directory`]: the 128-entry root directory.
//! - [`descriptor`]: the 32-slot open-file descriptor table.
//! - [`io`]: the bounce-buffer read/write path tying a FAT chain to block
//!   device operations.
//! - [`volume`]: [`volume::Volume`], the mounted-filesystem handle that
//!   composes all of the above.
//! - [`api`]: the flat, POSIX-flavored `fs_*` functions over a single
//!   process-wide mounted volume.
//! - [`error`]: the [`error::FsError`] taxonomy shared across every
//!   layer.

pub mod api;
pub mod block;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod fat;
pub mod io;
pub mod superblock;
pub mod volume;
pub mod wire;

pub use error::{FsError, FsResult};
pub use volume::{MountOptions, Volume};
