//! Standard filesystem paths for Cresta.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default root directory for Cresta data.
pub static CRESTA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("CRESTA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/cresta"))
});

/// Standard paths used by the Cresta launcher.
#[derive(Debug, Clone)]
pub struct CrestaPaths {
    /// Root data directory (default: /var/lib/cresta).
    pub root: PathBuf,
}

impl CrestaPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create paths rooted in the invoking user's home directory.
    #[must_use]
    pub fn rootless() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::with_root(home.join(".local/share/cresta"))
    }

    /// Per-user local image repositories.
    #[must_use]
    pub fn repositories(&self) -> PathBuf {
        self.root.join("repositories")
    }

    /// Local image repository for a specific user.
    #[must_use]
    pub fn local_repository(&self, user: &str) -> PathBuf {
        self.repositories().join(user)
    }

    /// Squashfs image file inside a user's local repository.
    #[must_use]
    pub fn image_squashfs(&self, user: &str, image: &str) -> PathBuf {
        // Replace : with / so tagged references nest under the repository
        let path = image.replace(':', "/");
        self.local_repository(user)
            .join("images")
            .join(format!("{path}.squashfs"))
    }

    /// Metadata file accompanying a squashfs image.
    #[must_use]
    pub fn image_metadata(&self, user: &str, image: &str) -> PathBuf {
        self.image_squashfs(user, image).with_extension("json")
    }

    /// OCI bundle directory for the current launch.
    #[must_use]
    pub fn bundle(&self) -> PathBuf {
        self.root.join("bundle")
    }

    /// Container rootfs directory inside the bundle.
    #[must_use]
    pub fn rootfs(&self, rootfs_folder: &str) -> PathBuf {
        self.bundle().join(rootfs_folder)
    }

    /// Site OpenSSH installation bind-mounted into containers by the SSH hook.
    #[must_use]
    pub fn openssh(&self) -> PathBuf {
        self.root.join("openssh")
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.repositories())?;
        std::fs::create_dir_all(self.bundle())?;
        Ok(())
    }
}

impl Default for CrestaPaths {
    fn default() -> Self {
        Self {
            root: CRESTA_ROOT.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_root() {
        let paths = CrestaPaths::with_root("/tmp/cresta-test");
        assert_eq!(
            paths.local_repository("alice"),
            PathBuf::from("/tmp/cresta-test/repositories/alice")
        );
        assert_eq!(paths.bundle(), PathBuf::from("/tmp/cresta-test/bundle"));
        assert_eq!(
            paths.rootfs("rootfs"),
            PathBuf::from("/tmp/cresta-test/bundle/rootfs")
        );
    }

    #[test]
    fn image_path() {
        let paths = CrestaPaths::with_root("/tmp/cresta-test");
        assert_eq!(
            paths.image_squashfs("alice", "alpine:3.20"),
            PathBuf::from("/tmp/cresta-test/repositories/alice/images/alpine/3.20.squashfs")
        );
    }
}
