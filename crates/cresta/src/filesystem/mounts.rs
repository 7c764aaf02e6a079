//! Mount execution.
//!
//! Mount side effects are global kernel mount-table changes; nothing here
//! tracks or reverses them. Unmounting is the orchestrator's responsibility
//! during teardown. Callers must serialize mounts against the same
//! destination: a bind-mount-then-remount sequence is not atomic and a racing
//! observer could see the intermediate writable state.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use cresta_common::{CrestaError, CrestaResult};

use super::loopdev::LoopDevice;

/// Requested kind of mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Bind mount of a host file or directory.
    Bind,
    /// Loop mount of a squashfs filesystem image.
    SquashfsImage,
}

/// Per-mount flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindFlags {
    /// Remount the bind read-only after attaching it.
    pub readonly: bool,
    /// Recursive bind mount.
    pub recursive: bool,
    /// Private mount propagation.
    pub private: bool,
}

/// One requested mount. Immutable after creation, consumed once per launch.
#[derive(Debug, Clone)]
pub struct MountEntry {
    /// Host path (bind) or image-file path (squashfs).
    pub source: PathBuf,
    /// Container-absolute destination.
    pub destination: PathBuf,
    /// Kind of mount.
    pub kind: MountKind,
    /// Flags applied when the mount is executed.
    pub flags: BindFlags,
}

impl MountEntry {
    /// Create a bind-mount entry.
    #[must_use]
    pub fn bind(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, readonly: bool) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind: MountKind::Bind,
            flags: BindFlags {
                readonly,
                recursive: true,
                private: true,
            },
        }
    }

    /// Create a squashfs-image mount entry.
    #[must_use]
    pub fn squashfs_image(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind: MountKind::SquashfsImage,
            flags: BindFlags {
                readonly: true,
                recursive: false,
                private: false,
            },
        }
    }
}

/// Bind mount a host path onto a destination, creating the destination if
/// absent.
///
/// A bind mount cannot apply option flags atomically on Linux: the plain
/// bind is attached first, and read-only semantics are applied by a second
/// remount pass.
///
/// # Errors
///
/// Returns [`CrestaError::Mount`] with the OS error text if any step fails.
#[cfg(target_os = "linux")]
pub fn bind_mount(source: &Path, destination: &Path, flags: BindFlags) -> CrestaResult<()> {
    use rustix::mount::{MountFlags, MountPropagationFlags, mount, mount_change, mount_remount};

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        ?flags,
        "Creating bind mount"
    );

    create_destination(source, destination)?;

    let mut mount_flags = MountFlags::BIND;
    if flags.recursive {
        mount_flags |= MountFlags::REC;
    }

    let empty = CString::new("").expect("static string");
    mount(
        source,
        destination,
        empty.as_c_str(),
        mount_flags,
        empty.as_c_str(),
    )
    .map_err(|errno| {
        CrestaError::mount_with_source(
            format!(
                "failed to bind mount {} on {}",
                source.display(),
                destination.display()
            ),
            &errno.into(),
        )
    })?;

    if flags.private {
        mount_change(destination, MountPropagationFlags::PRIVATE).map_err(|errno| {
            CrestaError::mount_with_source(
                format!("failed to make {} private", destination.display()),
                &errno.into(),
            )
        })?;
    }

    if flags.readonly {
        mount_remount(
            destination,
            mount_flags | MountFlags::RDONLY,
            empty.as_c_str(),
        )
        .map_err(|errno| {
            CrestaError::mount_with_source(
                format!("failed to remount {} read-only", destination.display()),
                &errno.into(),
            )
        })?;
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn bind_mount(_source: &Path, _destination: &Path, _flags: BindFlags) -> CrestaResult<()> {
    Err(CrestaError::Mount {
        message: "bind mounts are only supported on Linux".to_string(),
    })
}

/// Loop mount a squashfs image read-only at a destination.
///
/// The image is attached to a free loop device configured to auto-detach
/// once the filesystem is unmounted.
///
/// # Errors
///
/// Returns [`CrestaError::Mount`] if the image is absent or any attach/mount
/// step fails.
#[cfg(target_os = "linux")]
pub fn loop_mount_squashfs(image: &Path, destination: &Path) -> CrestaResult<()> {
    use rustix::mount::{MountFlags, mount};

    if !image.exists() {
        return Err(CrestaError::Mount {
            message: format!("squashfs image {} doesn't exist", image.display()),
        });
    }

    std::fs::create_dir_all(destination)?;

    let device = LoopDevice::attach(image)?;

    tracing::debug!(
        image = %image.display(),
        device = %device.path().display(),
        destination = %destination.display(),
        "Loop mounting squashfs image"
    );

    let fstype = CString::new("squashfs").expect("static string");
    let empty = CString::new("").expect("static string");
    let mounted = mount(
        device.path(),
        destination,
        fstype.as_c_str(),
        MountFlags::RDONLY,
        empty.as_c_str(),
    );

    if let Err(errno) = mounted {
        // The device leaks otherwise: auto-detach only triggers after a
        // successful mount/unmount cycle.
        device.detach();
        return Err(CrestaError::mount_with_source(
            format!(
                "failed to mount squashfs image {} on {}",
                image.display(),
                destination.display()
            ),
            &errno.into(),
        ));
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn loop_mount_squashfs(_image: &Path, _destination: &Path) -> CrestaResult<()> {
    Err(CrestaError::Mount {
        message: "loop mounts are only supported on Linux".to_string(),
    })
}

/// Create the mount destination: a directory for directory sources, the
/// parent plus an empty file for file sources.
fn create_destination(source: &Path, destination: &Path) -> CrestaResult<()> {
    if source.is_dir() {
        std::fs::create_dir_all(destination)?;
    } else {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !destination.exists() {
            std::fs::File::create(destination)?;
        }
    }
    Ok(())
}
