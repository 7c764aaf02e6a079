//! Mount source and destination validation.
//!
//! Validation creates no side effects: the destination may or may not exist,
//! creating it is the executor's concern. What is checked here is that the
//! source is real, that the destination is allowed by site policy, and that
//! the resolved destination does not sit on a foreign filesystem already
//! mounted inside the rootfs.

use std::path::{Path, PathBuf};

use cresta_common::{CrestaError, CrestaResult};

use super::resolve::resolve_within_rootfs;

/// Site policy for mount destinations.
#[derive(Debug, Clone, Default)]
pub struct MountPolicy {
    /// Container paths that must not be mount destinations.
    pub disallowed_paths: Vec<PathBuf>,
    /// Container path prefixes under which mounting is forbidden.
    pub disallowed_prefixes: Vec<PathBuf>,
}

impl MountPolicy {
    /// Whether `destination` (a container-absolute path) is allowed.
    #[must_use]
    pub fn allows(&self, destination: &Path) -> bool {
        if self.disallowed_paths.iter().any(|path| path == destination) {
            return false;
        }
        !self
            .disallowed_prefixes
            .iter()
            .any(|prefix| destination.starts_with(prefix))
    }
}

/// Validate a mount source on the host.
///
/// # Errors
///
/// Returns [`CrestaError::Mount`] if the source is empty or does not exist.
pub fn validate_mount_source(source: &Path) -> CrestaResult<()> {
    if source.as_os_str().is_empty() {
        return Err(CrestaError::Mount {
            message: "mount source is empty".to_string(),
        });
    }
    if !source.exists() {
        return Err(CrestaError::Mount {
            message: format!("mount source {} doesn't exist", source.display()),
        });
    }
    Ok(())
}

/// Validate a mount destination and resolve it inside the rootfs.
///
/// The destination is checked against the site policy, resolved through
/// [`resolve_within_rootfs`], and its deepest existing ancestor is required
/// to reside on the same filesystem device as the rootfs itself. A
/// destination whose ancestor sits on another device is already a foreign
/// mount point (e.g. a loop-mounted image) and mounting over it would
/// silently shadow or corrupt the mount ordering.
///
/// # Errors
///
/// Returns [`CrestaError::Mount`] if the destination is empty, disallowed by
/// policy, or on a different device than the rootfs.
pub fn validate_mount_destination(
    destination: &Path,
    policy: &MountPolicy,
    rootfs: &Path,
) -> CrestaResult<PathBuf> {
    if destination.as_os_str().is_empty() {
        return Err(CrestaError::Mount {
            message: "mount destination is empty".to_string(),
        });
    }

    if !policy.allows(destination) {
        return Err(CrestaError::Mount {
            message: format!(
                "mount destination {} is not allowed by the site policy",
                destination.display()
            ),
        });
    }

    let resolved = resolve_within_rootfs(rootfs, destination)?;

    let ancestor = deepest_existing_ancestor(&resolved);
    if device_id(&ancestor)? != device_id(rootfs)? {
        return Err(CrestaError::Mount {
            message: format!(
                "mount destination {} is on a different device than the rootfs {}",
                resolved.display(),
                rootfs.display()
            ),
        });
    }

    Ok(resolved)
}

/// Walk up from `path` to the deepest component that exists on the host.
///
/// The resolved destination is always at or below the rootfs, which exists,
/// so the walk terminates.
fn deepest_existing_ancestor(path: &Path) -> PathBuf {
    let mut ancestor = path.to_path_buf();
    while !ancestor.exists() && ancestor.pop() {}
    ancestor
}

/// Filesystem device a path resides on.
fn device_id(path: &Path) -> CrestaResult<u64> {
    let stat = rustix::fs::stat(path).map_err(|errno| CrestaError::Mount {
        message: format!("failed to stat {}: {errno}", path.display()),
    })?;
    Ok(stat.st_dev)
}
