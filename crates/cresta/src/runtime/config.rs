//! Launcher configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cresta_common::{CrestaPaths, CrestaResult};

use crate::filesystem::{MountEntry, MountPolicy};

/// Site-wide configuration, loaded from the static JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    /// Base directory for per-user local image repositories.
    pub local_repository_base_dir: PathBuf,
    /// Low-level OCI runtime invoked after launch preparation.
    pub oci_runtime_path: PathBuf,
    /// Name of the rootfs folder inside the OCI bundle.
    pub rootfs_folder: String,
    /// Site-wide mounts performed for every container.
    pub site_mounts: Vec<SiteMount>,
    /// Container paths that must not be mount destinations.
    pub disallowed_destination_paths: Vec<PathBuf>,
    /// Container path prefixes under which mounting is forbidden.
    pub disallowed_destination_prefixes: Vec<PathBuf>,
}

/// One site-wide bind mount from the site configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteMount {
    /// Host path.
    pub source: PathBuf,
    /// Container-absolute destination.
    pub destination: PathBuf,
    /// Read-only mount.
    #[serde(default)]
    pub readonly: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            local_repository_base_dir: PathBuf::from("/var/lib/cresta"),
            oci_runtime_path: PathBuf::from("/usr/bin/runc"),
            rootfs_folder: "rootfs".to_string(),
            site_mounts: Vec::new(),
            disallowed_destination_paths: vec![PathBuf::from("/"), PathBuf::from("/opt")],
            disallowed_destination_prefixes: vec![PathBuf::from("/opt/cresta")],
        }
    }
}

impl SiteConfig {
    /// Load the site configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> CrestaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Mount-destination policy derived from this configuration.
    #[must_use]
    pub fn mount_policy(&self) -> MountPolicy {
        MountPolicy {
            disallowed_paths: self.disallowed_destination_paths.clone(),
            disallowed_prefixes: self.disallowed_destination_prefixes.clone(),
        }
    }
}

/// Per-run options gathered from the CLI layer.
#[derive(Debug, Clone, Default)]
pub struct CommandRun {
    /// Positional command and arguments.
    pub exec_args: Vec<String>,
    /// `--entrypoint` override; `Some(vec![])` clears the image entrypoint.
    pub entrypoint: Option<Vec<String>>,
    /// Host environment passed through to the merge.
    pub host_environment: HashMap<String, String>,
    /// Activate the MPI hook.
    pub use_mpi: bool,
    /// Activate the SSH hook.
    pub use_ssh: bool,
    /// User-supplied `--mount` entries.
    pub user_mounts: Vec<MountEntry>,
}

/// Effective launcher configuration for one launch.
///
/// Owned by the orchestrator for the whole process lifetime and read-only to
/// the core components.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Standard data paths.
    pub paths: CrestaPaths,
    /// Site-wide configuration.
    pub site: SiteConfig,
    /// Per-run options.
    pub command_run: CommandRun,
    /// Uid performing the launch.
    pub uid: u32,
    /// Gid performing the launch.
    pub gid: u32,
}

impl RuntimeConfig {
    /// Build the effective configuration for the current process identity.
    #[must_use]
    pub fn new(site: SiteConfig, command_run: CommandRun) -> Self {
        Self {
            paths: CrestaPaths::with_root(&site.local_repository_base_dir),
            site,
            command_run,
            uid: rustix::process::getuid().as_raw(),
            gid: rustix::process::getgid().as_raw(),
        }
    }
}
