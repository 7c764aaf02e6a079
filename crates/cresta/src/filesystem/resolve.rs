//! Symlink-safe path resolution confined to a container rootfs.
//!
//! Mount destinations are interpreted relative to a rootfs that has not been
//! chrooted into yet, so a symlink inside the image could redirect the mount
//! anywhere on the host. [`resolve_within_rootfs`] walks the requested path
//! component by component and re-anchors every absolute symlink at the
//! rootfs, guaranteeing that the result never escapes it.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use cresta_common::{CrestaError, CrestaResult};

/// Maximum number of symlinks followed during a single resolution.
///
/// Matches the kernel's nested-symlink limit; a chain longer than this is
/// treated as a cycle.
const MAX_SYMLINK_DEPTH: u32 = 40;

/// Resolve an absolute container path to a host path inside `rootfs`.
///
/// The walk keeps an owned "current" host path that always stays within
/// `rootfs` and a queue of remaining components:
///
/// - `.` components are skipped;
/// - `..` pops one level but never above `rootfs`;
/// - a symlink's target is spliced onto the front of the queue, restarting
///   from `rootfs` when the target is absolute;
/// - plain components are appended.
///
/// The result is `rootfs` itself or a lexical descendant of it, whether or
/// not the final path exists.
///
/// # Errors
///
/// Returns [`CrestaError::InvalidArgument`] if `path` is not absolute, and
/// [`CrestaError::PathResolution`] if more than [`MAX_SYMLINK_DEPTH`]
/// symlinks are encountered.
pub fn resolve_within_rootfs(rootfs: &Path, path: &Path) -> CrestaResult<PathBuf> {
    if !path.is_absolute() {
        return Err(CrestaError::InvalidArgument {
            message: format!(
                "failed to resolve {} within the rootfs: not an absolute path",
                path.display()
            ),
        });
    }

    let mut current = rootfs.to_path_buf();
    let mut remaining = VecDeque::new();
    enqueue_components(&mut remaining, path);

    let mut followed_symlinks = 0u32;

    while let Some(component) = remaining.pop_front() {
        if component == ".." {
            // Confinement: `..` at the rootfs is a no-op.
            if current != rootfs {
                current.pop();
            }
            continue;
        }

        let candidate = current.join(&component);
        match std::fs::symlink_metadata(&candidate) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                followed_symlinks += 1;
                if followed_symlinks > MAX_SYMLINK_DEPTH {
                    return Err(CrestaError::PathResolution {
                        message: format!(
                            "too many levels of symbolic links while resolving {} within {}",
                            path.display(),
                            rootfs.display()
                        ),
                    });
                }

                let target = std::fs::read_link(&candidate)?;
                if target.is_absolute() {
                    current = rootfs.to_path_buf();
                }
                splice_components(&mut remaining, &target);
            }
            // Anything that is not a symlink, including a path that does not
            // exist yet, is taken literally.
            _ => current = candidate,
        }
    }

    Ok(current)
}

/// Append the walkable components of `path` to the back of the queue.
fn enqueue_components(queue: &mut VecDeque<OsString>, path: &Path) {
    for component in path.components() {
        match component {
            Component::Normal(name) => queue.push_back(name.to_os_string()),
            Component::ParentDir => queue.push_back(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

/// Splice the components of a symlink target onto the front of the queue,
/// preserving their order.
fn splice_components(queue: &mut VecDeque<OsString>, target: &Path) {
    for component in target.components().rev() {
        match component {
            Component::Normal(name) => queue.push_front(name.to_os_string()),
            Component::ParentDir => queue.push_front(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn relative_path_is_rejected() {
        let rootfs = tempdir().unwrap();
        let result = resolve_within_rootfs(rootfs.path(), Path::new("etc/passwd"));
        assert!(matches!(result, Err(CrestaError::InvalidArgument { .. })));
    }

    #[test]
    fn plain_components_are_appended() {
        let rootfs = tempdir().unwrap();
        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/etc/passwd")).unwrap();
        assert_eq!(resolved, rootfs.path().join("etc/passwd"));
    }

    #[test]
    fn dot_components_are_skipped() {
        let rootfs = tempdir().unwrap();
        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/./etc/./passwd")).unwrap();
        assert_eq!(resolved, rootfs.path().join("etc/passwd"));
    }

    #[test]
    fn parent_components_never_escape() {
        let rootfs = tempdir().unwrap();
        let resolved =
            resolve_within_rootfs(rootfs.path(), Path::new("/../../../etc/passwd")).unwrap();
        assert_eq!(resolved, rootfs.path().join("etc/passwd"));
    }

    #[test]
    fn parent_components_pop_inside_rootfs() {
        let rootfs = tempdir().unwrap();
        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/a/b/../c")).unwrap();
        assert_eq!(resolved, rootfs.path().join("a/c"));
    }

    #[test]
    fn absolute_symlink_is_reanchored_at_rootfs() {
        let rootfs = tempdir().unwrap();
        symlink("/etc", rootfs.path().join("link")).unwrap();

        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/link/passwd")).unwrap();
        assert_eq!(resolved, rootfs.path().join("etc/passwd"));
    }

    #[test]
    fn relative_symlink_with_parent_chain_is_confined() {
        let rootfs = tempdir().unwrap();
        std::fs::create_dir_all(rootfs.path().join("a/b")).unwrap();
        symlink("../../../../..", rootfs.path().join("a/b/up")).unwrap();

        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/a/b/up/etc")).unwrap();
        assert_eq!(resolved, rootfs.path().join("etc"));
    }

    #[test]
    fn symlink_chain_is_followed() {
        let rootfs = tempdir().unwrap();
        std::fs::create_dir_all(rootfs.path().join("real")).unwrap();
        symlink("real", rootfs.path().join("first")).unwrap();
        symlink("first", rootfs.path().join("second")).unwrap();

        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/second/file")).unwrap();
        assert_eq!(resolved, rootfs.path().join("real/file"));
    }

    #[test]
    fn symlink_cycle_is_bounded() {
        let rootfs = tempdir().unwrap();
        symlink("two", rootfs.path().join("one")).unwrap();
        symlink("one", rootfs.path().join("two")).unwrap();

        let result = resolve_within_rootfs(rootfs.path(), Path::new("/one"));
        assert!(matches!(result, Err(CrestaError::PathResolution { .. })));
    }

    #[test]
    fn resolving_root_yields_rootfs() {
        let rootfs = tempdir().unwrap();
        let resolved = resolve_within_rootfs(rootfs.path(), Path::new("/")).unwrap();
        assert_eq!(resolved, rootfs.path());
    }

    mod confinement {
        use super::*;
        use proptest::prelude::*;

        fn component() -> impl Strategy<Value = &'static str> {
            prop_oneof![
                Just(".."),
                Just("."),
                Just("usr"),
                Just("lib"),
                Just("x86_64-linux-gnu"),
                Just("a"),
            ]
        }

        proptest! {
            #[test]
            fn resolved_path_never_escapes(components in prop::collection::vec(component(), 0..12)) {
                let rootfs = tempdir().unwrap();
                let path = PathBuf::from(format!("/{}", components.join("/")));

                let resolved = resolve_within_rootfs(rootfs.path(), &path).unwrap();
                prop_assert!(resolved.starts_with(rootfs.path()));
            }
        }
    }
}
