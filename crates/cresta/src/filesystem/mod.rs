//! Filesystem operations for the launch preparation.
//!
//! This module handles:
//! - Symlink-safe path resolution confined to the container rootfs
//! - Mount source/destination validation
//! - Bind mounts and loop-mounted squashfs images

mod loopdev;
mod mounts;
mod resolve;
mod validate;

pub use loopdev::LoopDevice;
pub use mounts::{BindFlags, MountEntry, MountKind, bind_mount, loop_mount_squashfs};
pub use resolve::resolve_within_rootfs;
pub use validate::{MountPolicy, validate_mount_destination, validate_mount_source};
