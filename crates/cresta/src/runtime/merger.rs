//! Configuration merging.
//!
//! Reconciles CLI overrides, the host environment and the image metadata
//! into the final command, working directory and environment the container
//! process will see. Every operation is a pure function of the constructor
//! inputs.

use std::collections::HashMap;
use std::path::PathBuf;

use cresta_common::{CrestaError, CrestaResult, ImageMetadata, env};

use super::config::RuntimeConfig;

/// Marker variable consumed by the external MPI hook.
pub const MPI_HOOK_VARIABLE: &str = "SARUS_MPI_HOOK";
/// Marker variable consumed by the external SSH hook.
pub const SSH_HOOK_VARIABLE: &str = "SARUS_SSH_HOOK";

/// Host-side `CUDA_VISIBLE_DEVICES` value meaning "no devices allocated".
const NO_DEV_FILES: &str = "NoDevFiles";

/// Final configuration handed to the process-exec step.
///
/// Produced exactly once per launch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedLaunchConfig {
    /// Working directory inside the container.
    pub cwd: PathBuf,
    /// Container environment (keys unique).
    pub environment: HashMap<String, String>,
    /// Command to execute; the first element is the executable.
    pub command: Vec<String>,
}

/// Merges configurations from different sources (CLI arguments, host
/// environment, image metadata) and produces the final configuration used
/// inside the container.
pub struct ConfigsMerger<'a> {
    config: &'a RuntimeConfig,
    metadata: &'a ImageMetadata,
}

impl<'a> ConfigsMerger<'a> {
    /// Create a merger over one launch's configuration and image metadata.
    #[must_use]
    pub fn new(config: &'a RuntimeConfig, metadata: &'a ImageMetadata) -> Self {
        Self { config, metadata }
    }

    /// Working directory inside the container: the image workdir if set and
    /// non-empty, `/` otherwise.
    #[must_use]
    pub fn cwd_in_container(&self) -> PathBuf {
        self.metadata
            .workdir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    /// Command to execute inside the container.
    ///
    /// The entrypoint slot is the CLI entrypoint if given, else the image
    /// entrypoint. The cmd slot is the CLI positional arguments if any;
    /// otherwise a CLI entrypoint suppresses the image cmd, and without one
    /// the image cmd applies. Entrypoint first, then cmd.
    ///
    /// # Errors
    ///
    /// Returns [`CrestaError::Config`] if both slots resolve empty.
    pub fn command_to_execute_in_container(&self) -> CrestaResult<Vec<String>> {
        let run = &self.config.command_run;

        let entrypoint: &[String] = match &run.entrypoint {
            Some(args) => args,
            None => self.metadata.entry_args().unwrap_or(&[]),
        };

        let cmd: &[String] = if !run.exec_args.is_empty() {
            &run.exec_args
        } else if run.entrypoint.is_some() {
            // A CLI entrypoint replaces the image cmd as well.
            &[]
        } else {
            self.metadata.cmd_args().unwrap_or(&[])
        };

        let mut command = Vec::with_capacity(entrypoint.len() + cmd.len());
        command.extend_from_slice(entrypoint);
        command.extend_from_slice(cmd);

        if command.is_empty() {
            return Err(CrestaError::Config {
                message: "no command to execute: neither the CLI nor the image metadata \
                          provide an entrypoint or cmd"
                    .to_string(),
            });
        }
        Ok(command)
    }

    /// Environment inside the container.
    ///
    /// Starts from the host environment, overlays the image environment
    /// (image wins per key), then applies the NVIDIA device translation and
    /// the hook activation markers.
    #[must_use]
    pub fn environment_in_container(&self) -> HashMap<String, String> {
        let run = &self.config.command_run;

        let mut environment = run.host_environment.clone();
        for (key, value) in &self.metadata.env {
            environment.insert(key.clone(), value.clone());
        }

        self.set_nvidia_environment_variables(&run.host_environment, &mut environment);

        if run.use_mpi {
            environment.insert(MPI_HOOK_VARIABLE.to_string(), "1".to_string());
        }
        if run.use_ssh {
            environment.insert(SSH_HOOK_VARIABLE.to_string(), "1".to_string());
        }

        environment
    }

    /// Produce the full merged launch configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CrestaError::Config`] if no command can be resolved.
    pub fn merged(&self) -> CrestaResult<MergedLaunchConfig> {
        Ok(MergedLaunchConfig {
            cwd: self.cwd_in_container(),
            environment: self.environment_in_container(),
            command: self.command_to_execute_in_container()?,
        })
    }

    /// Rewrite the NVIDIA GPU variables for the container.
    ///
    /// The container's view of the GPUs is decided entirely by the host
    /// allocation: the three NVIDIA keys are scrubbed from the merged map,
    /// and re-emitted only when the image declares `NVIDIA_VISIBLE_DEVICES`
    /// and the host allocates devices through `CUDA_VISIBLE_DEVICES`. The
    /// container-side `CUDA_VISIBLE_DEVICES` lists container-local indices
    /// in the host's selection order.
    fn set_nvidia_environment_variables(
        &self,
        host_environment: &HashMap<String, String>,
        container_environment: &mut HashMap<String, String>,
    ) {
        container_environment.remove("CUDA_VISIBLE_DEVICES");
        container_environment.remove("NVIDIA_VISIBLE_DEVICES");
        container_environment.remove("NVIDIA_DRIVER_CAPABILITIES");

        if !self.metadata.env.contains_key("NVIDIA_VISIBLE_DEVICES") {
            return;
        }
        let Some(host_selection) = host_environment.get("CUDA_VISIBLE_DEVICES") else {
            return;
        };
        if host_selection == NO_DEV_FILES {
            return;
        }

        let driver_capabilities = self
            .metadata
            .env
            .get("NVIDIA_DRIVER_CAPABILITIES")
            .cloned()
            .unwrap_or_else(|| "all".to_string());

        container_environment.insert(
            "CUDA_VISIBLE_DEVICES".to_string(),
            translate_device_indices(host_selection),
        );
        container_environment.insert("NVIDIA_VISIBLE_DEVICES".to_string(), host_selection.clone());
        container_environment.insert(
            "NVIDIA_DRIVER_CAPABILITIES".to_string(),
            driver_capabilities,
        );
    }
}

/// Translate host-global device indices to container-local ones.
///
/// Inside the container the selected devices are renumbered from 0 in
/// ascending host order, so each host index maps to its rank within the
/// selection. The host's selection order is preserved in the output, e.g.
/// `3,1,5` becomes `1,0,2`.
fn translate_device_indices(host_selection: &str) -> String {
    let indices: Vec<u32> = env::split_string_list(host_selection, ',')
        .iter()
        .filter_map(|index| index.trim().parse().ok())
        .collect();

    indices
        .iter()
        .map(|device| {
            indices
                .iter()
                .filter(|other| *other < device)
                .count()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(",")
}
