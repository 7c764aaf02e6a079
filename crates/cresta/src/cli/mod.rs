//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

use cresta_common::{CrestaError, CrestaResult, ImageMetadata, env};
use cresta_oci::ImageConfig;

use crate::filesystem::MountEntry;
use crate::runtime::{CommandRun, Launcher, RuntimeConfig, SiteConfig};

/// Cresta - HPC Container Launcher
#[derive(Parser)]
#[command(name = "cresta")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the site configuration file
    #[arg(
        long,
        global = true,
        env = "CRESTA_CONFIG",
        default_value = "/etc/cresta/cresta.json"
    )]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Launcher commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run a command inside a container image
    Run {
        /// Mount a custom file or directory into the container
        /// (type=bind,source=...,destination=...[,readonly])
        #[arg(long = "mount")]
        mounts: Vec<String>,

        /// Override the image entrypoint (empty string clears it)
        #[arg(long)]
        entrypoint: Option<String>,

        /// Enable MPI support through the MPI hook
        #[arg(long)]
        mpi: bool,

        /// Enable SSH access through the SSH hook
        #[arg(long)]
        ssh: bool,

        /// Image reference
        image: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Print version information
    Version,
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns an error if launch preparation or execution fails.
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                mounts,
                entrypoint,
                mpi,
                ssh,
                image,
                command,
            } => {
                let site = if self.config.exists() {
                    SiteConfig::from_file(&self.config)?
                } else {
                    tracing::warn!(
                        config = %self.config.display(),
                        "Site configuration not found, using defaults"
                    );
                    SiteConfig::default()
                };

                let command_run = CommandRun {
                    exec_args: command,
                    entrypoint: entrypoint.map(|value| {
                        value.split_whitespace().map(str::to_string).collect()
                    }),
                    host_environment: std::env::vars().collect(),
                    use_mpi: mpi,
                    use_ssh: ssh,
                    user_mounts: parse_user_mounts(&mounts)?,
                };

                let config = RuntimeConfig::new(site, command_run);
                let metadata = load_image_metadata(&config, &image)?;

                let exit_code = Launcher::new(config, metadata).launch()?;
                std::process::exit(exit_code);
            }
            Commands::Version => {
                println!("cresta {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Load the metadata of a locally available image.
fn load_image_metadata(config: &RuntimeConfig, image: &str) -> CrestaResult<ImageMetadata> {
    let user = std::env::var("USER").unwrap_or_else(|_| config.uid.to_string());
    let path = config.paths.image_metadata(&user, image);

    if path.exists() {
        ImageConfig::from_file(&path)?.to_metadata()
    } else {
        tracing::debug!(image, "No image metadata found, using defaults");
        Ok(ImageMetadata::default())
    }
}

/// Parse `--mount` option values into mount entries.
fn parse_user_mounts(specs: &[String]) -> CrestaResult<Vec<MountEntry>> {
    specs.iter().map(|spec| parse_user_mount(spec)).collect()
}

fn parse_user_mount(spec: &str) -> CrestaResult<MountEntry> {
    let fields = env::parse_key_value_list(spec, ',', '=')?;

    let require = |key: &str| -> CrestaResult<PathBuf> {
        fields
            .get(key)
            .map(PathBuf::from)
            .ok_or_else(|| CrestaError::InvalidArgument {
                message: format!("--mount \"{spec}\" is missing the \"{key}\" field"),
            })
    };

    let source = require("source")?;
    let destination = require("destination")?;
    let readonly = fields.contains_key("readonly");

    match fields.get("type").map(String::as_str) {
        Some("bind") | None => Ok(MountEntry::bind(source, destination, readonly)),
        Some("squashfs") => Ok(MountEntry::squashfs_image(source, destination)),
        Some(other) => Err(CrestaError::InvalidArgument {
            message: format!("--mount \"{spec}\" has unsupported type \"{other}\""),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MountKind;

    #[test]
    fn parse_bind_mount() {
        let entry =
            parse_user_mount("type=bind,source=/host/data,destination=/data,readonly").unwrap();
        assert_eq!(entry.kind, MountKind::Bind);
        assert_eq!(entry.source, PathBuf::from("/host/data"));
        assert_eq!(entry.destination, PathBuf::from("/data"));
        assert!(entry.flags.readonly);
    }

    #[test]
    fn bind_is_the_default_type() {
        let entry = parse_user_mount("source=/a,destination=/b").unwrap();
        assert_eq!(entry.kind, MountKind::Bind);
        assert!(!entry.flags.readonly);
    }

    #[test]
    fn parse_squashfs_mount() {
        let entry =
            parse_user_mount("type=squashfs,source=/repo/tools.squashfs,destination=/tools")
                .unwrap();
        assert_eq!(entry.kind, MountKind::SquashfsImage);
        assert!(entry.flags.readonly);
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(parse_user_mount("type=bind,source=/a").is_err());
        assert!(parse_user_mount("type=bind,destination=/b").is_err());
        assert!(parse_user_mount("type=overlay,source=/a,destination=/b").is_err());
    }
}
