//! Launch orchestration.
//!
//! Sequences mount preparation and configuration merging for one container
//! launch, then hands control to the low-level OCI runtime. Mounts are
//! executed serially and fail fast; already-performed mounts are not rolled
//! back here, teardown is the caller's responsibility.

use std::path::{Path, PathBuf};
use std::process::Command;

use cresta_common::{CrestaError, CrestaResult, ImageMetadata};

use crate::filesystem::{
    self, MountEntry, MountKind, validate_mount_destination, validate_mount_source,
};

use super::config::RuntimeConfig;
use super::merger::{ConfigsMerger, MergedLaunchConfig};

/// Container destination of the SSH-hook OpenSSH bind mount.
const OPENSSH_DESTINATION: &str = "/opt/openssh";

/// Prepares and executes one container launch.
pub struct Launcher {
    config: RuntimeConfig,
    metadata: ImageMetadata,
    rootfs: PathBuf,
}

impl Launcher {
    /// Create a launcher for one container launch.
    #[must_use]
    pub fn new(config: RuntimeConfig, metadata: ImageMetadata) -> Self {
        let rootfs = config.paths.rootfs(&config.site.rootfs_folder);
        Self {
            config,
            metadata,
            rootfs,
        }
    }

    /// Host path of the container rootfs for this launch.
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    /// All mounts for this launch: site-wide first, then user-supplied,
    /// then hook-injected.
    #[must_use]
    pub fn mount_entries(&self) -> Vec<MountEntry> {
        let mut entries: Vec<MountEntry> = self
            .config
            .site
            .site_mounts
            .iter()
            .map(|mount| MountEntry::bind(&mount.source, &mount.destination, mount.readonly))
            .collect();

        entries.extend(self.config.command_run.user_mounts.iter().cloned());

        if self.config.command_run.use_ssh {
            entries.push(MountEntry::bind(
                self.config.paths.openssh(),
                OPENSSH_DESTINATION,
                true,
            ));
        }

        entries
    }

    /// Validate and execute every configured mount, in order.
    ///
    /// # Errors
    ///
    /// Returns the first validation or mount error; earlier mounts stay in
    /// place.
    pub fn prepare_mounts(&self) -> CrestaResult<()> {
        let policy = self.config.site.mount_policy();

        for entry in self.mount_entries() {
            validate_mount_source(&entry.source)?;
            let resolved = validate_mount_destination(&entry.destination, &policy, &self.rootfs)?;

            tracing::info!(
                source = %entry.source.display(),
                destination = %resolved.display(),
                kind = ?entry.kind,
                "Mounting"
            );

            match entry.kind {
                MountKind::Bind => filesystem::bind_mount(&entry.source, &resolved, entry.flags)?,
                MountKind::SquashfsImage => {
                    filesystem::loop_mount_squashfs(&entry.source, &resolved)?;
                }
            }
        }

        Ok(())
    }

    /// Merge CLI options, host environment and image metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CrestaError::Config`] if no command can be resolved.
    pub fn merged_launch_config(&self) -> CrestaResult<MergedLaunchConfig> {
        ConfigsMerger::new(&self.config, &self.metadata).merged()
    }

    /// Write the OCI bundle `config.json` for the merged configuration.
    ///
    /// Only the subset the low-level runtime needs is emitted: the process
    /// section (args, cwd, env as `KEY=VALUE`) and the rootfs location.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle directory cannot be written.
    pub fn write_bundle_config(&self, merged: &MergedLaunchConfig) -> CrestaResult<PathBuf> {
        let bundle = self.config.paths.bundle();
        std::fs::create_dir_all(&bundle)?;

        let mut env: Vec<String> = merged
            .environment
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        env.sort();

        let config = serde_json::json!({
            "ociVersion": "1.0.0",
            "process": {
                "args": merged.command,
                "cwd": merged.cwd,
                "env": env,
                "user": { "uid": self.config.uid, "gid": self.config.gid },
            },
            "root": { "path": self.config.site.rootfs_folder },
        });

        let path = bundle.join("config.json");
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        Ok(path)
    }

    /// Prepare the launch and run the configured OCI runtime on the bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails or the runtime cannot be
    /// spawned.
    pub fn launch(&self) -> CrestaResult<i32> {
        let merged = self.merged_launch_config()?;
        self.prepare_mounts()?;
        self.write_bundle_config(&merged)?;

        let container_id = format!("cresta-{}", self.config.uid);
        tracing::info!(
            runtime = %self.config.site.oci_runtime_path.display(),
            container = %container_id,
            "Starting container"
        );

        let status = Command::new(&self.config.site.oci_runtime_path)
            .arg("run")
            .arg("--bundle")
            .arg(self.config.paths.bundle())
            .arg(&container_id)
            .status()
            .map_err(|err| CrestaError::Config {
                message: format!(
                    "failed to execute OCI runtime {}: {err}",
                    self.config.site.oci_runtime_path.display()
                ),
            })?;

        Ok(status.code().unwrap_or(1))
    }
}
