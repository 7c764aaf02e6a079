//! # Cresta Container Launcher
//!
//! Cresta is a rootless/rootful HPC container launcher that prepares and
//! executes an OCI-compliant container on a cluster node.
//!
//! ## Features
//!
//! - **Confined path resolution**: symlink-safe resolution of mount
//!   destinations inside the not-yet-chrooted container rootfs
//! - **Mount preparation**: validated bind mounts and loop-mounted squashfs
//!   images with device-boundary and site-policy checks
//! - **Configuration merging**: CLI overrides, host environment and image
//!   metadata reconciled into the container's command, cwd and environment,
//!   including GPU device-index translation and hook activation markers
//!
//! ## Usage
//!
//! ```no_run
//! use cresta::runtime::{CommandRun, Launcher, RuntimeConfig, SiteConfig};
//! use cresta_common::ImageMetadata;
//!
//! # fn example() -> cresta_common::CrestaResult<()> {
//! let config = RuntimeConfig::new(SiteConfig::default(), CommandRun::default());
//! let launcher = Launcher::new(config, ImageMetadata::default());
//!
//! let merged = launcher.merged_launch_config()?;
//! launcher.prepare_mounts()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod filesystem;
pub mod runtime;

pub use runtime::Launcher;
