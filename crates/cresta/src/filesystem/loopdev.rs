#![allow(unsafe_code)]
//! Loop device management for squashfs image mounts.
//!
//! rustix does not expose the loop-device ioctls, so the attach sequence
//! goes through `libc` directly: ask `/dev/loop-control` for a free device,
//! bind the image file to it, and flag it read-only with auto-detach so the
//! kernel releases the device when the filesystem is unmounted.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use cresta_common::{CrestaError, CrestaResult};

const LOOP_CONTROL: &str = "/dev/loop-control";

// Request codes and flags from <linux/loop.h>.
const LOOP_CTL_GET_FREE: libc::c_ulong = 0x4C82;
const LOOP_SET_FD: libc::c_ulong = 0x4C00;
const LOOP_CLR_FD: libc::c_ulong = 0x4C01;
const LOOP_SET_STATUS64: libc::c_ulong = 0x4C04;
const LO_FLAGS_READ_ONLY: u32 = 1;
const LO_FLAGS_AUTOCLEAR: u32 = 4;

/// Mirror of `struct loop_info64` from `<linux/loop.h>`.
#[repr(C)]
struct LoopInfo64 {
    lo_device: u64,
    lo_inode: u64,
    lo_rdevice: u64,
    lo_offset: u64,
    lo_sizelimit: u64,
    lo_number: u32,
    lo_encrypt_type: u32,
    lo_encrypt_key_size: u32,
    lo_flags: u32,
    lo_file_name: [u8; 64],
    lo_crypt_name: [u8; 64],
    lo_encrypt_key: [u8; 32],
    lo_init: [u64; 2],
}

/// A loop device with an attached backing file.
#[derive(Debug)]
pub struct LoopDevice {
    path: PathBuf,
    device: File,
}

impl LoopDevice {
    /// Attach `image` to a free loop device.
    ///
    /// # Errors
    ///
    /// Returns [`CrestaError::Mount`] if no loop device can be acquired or
    /// the image cannot be bound to it.
    pub fn attach(image: &Path) -> CrestaResult<Self> {
        let backing = File::open(image).map_err(|err| {
            CrestaError::mount_with_source(
                format!("failed to open image file {}", image.display()),
                &err,
            )
        })?;

        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(LOOP_CONTROL)
            .map_err(|err| {
                CrestaError::mount_with_source(format!("failed to open {LOOP_CONTROL}"), &err)
            })?;

        // SAFETY: LOOP_CTL_GET_FREE takes no argument and returns the index
        // of a free device.
        let index = unsafe { libc::ioctl(control.as_raw_fd(), LOOP_CTL_GET_FREE) };
        if index < 0 {
            return Err(CrestaError::mount_with_source(
                "failed to acquire a free loop device",
                &std::io::Error::last_os_error(),
            ));
        }

        let path = PathBuf::from(format!("/dev/loop{index}"));
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| {
                CrestaError::mount_with_source(
                    format!("failed to open loop device {}", path.display()),
                    &err,
                )
            })?;

        // SAFETY: LOOP_SET_FD binds the backing file descriptor to the
        // device; both descriptors are owned and open.
        let bound =
            unsafe { libc::ioctl(device.as_raw_fd(), LOOP_SET_FD, backing.as_raw_fd()) };
        if bound < 0 {
            return Err(CrestaError::mount_with_source(
                format!(
                    "failed to attach {} to loop device {}",
                    image.display(),
                    path.display()
                ),
                &std::io::Error::last_os_error(),
            ));
        }

        let attached = Self { path, device };
        attached.configure(image)?;
        Ok(attached)
    }

    /// Host path of the loop device node.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detach the backing file. Best-effort: used on the error path before
    /// the device was ever mounted.
    pub fn detach(&self) {
        // SAFETY: LOOP_CLR_FD takes no argument.
        let cleared = unsafe { libc::ioctl(self.device.as_raw_fd(), LOOP_CLR_FD, 0) };
        if cleared < 0 {
            tracing::warn!(
                device = %self.path.display(),
                error = %std::io::Error::last_os_error(),
                "Failed to detach loop device"
            );
        }
    }

    /// Mark the device read-only and auto-detaching.
    fn configure(&self, image: &Path) -> CrestaResult<()> {
        // SAFETY: a zeroed loop_info64 is a valid "no configuration" value.
        let mut info: LoopInfo64 = unsafe { std::mem::zeroed() };
        info.lo_flags = LO_FLAGS_READ_ONLY | LO_FLAGS_AUTOCLEAR;

        let name = image.as_os_str().as_encoded_bytes();
        let len = name.len().min(info.lo_file_name.len() - 1);
        info.lo_file_name[..len].copy_from_slice(&name[..len]);

        // SAFETY: info points to a properly initialized loop_info64.
        let status =
            unsafe { libc::ioctl(self.device.as_raw_fd(), LOOP_SET_STATUS64, &raw const info) };
        if status < 0 {
            let err = std::io::Error::last_os_error();
            self.detach();
            return Err(CrestaError::mount_with_source(
                format!("failed to configure loop device {}", self.path.display()),
                &err,
            ));
        }

        Ok(())
    }
}
