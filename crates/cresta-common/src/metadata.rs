//! Image execution metadata.

use std::collections::HashMap;
use std::path::PathBuf;

/// Execution parameters declared by a container image.
///
/// Loaded once per launch from the image configuration and treated as an
/// immutable input to the configuration merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Image-declared working directory, if any.
    pub workdir: Option<PathBuf>,
    /// Image-declared entrypoint.
    pub entry: Option<Vec<String>>,
    /// Image-declared default command.
    pub cmd: Option<Vec<String>>,
    /// Image-declared environment (keys unique).
    pub env: HashMap<String, String>,
}

impl ImageMetadata {
    /// Image entrypoint, treating an empty list as unset.
    #[must_use]
    pub fn entry_args(&self) -> Option<&[String]> {
        self.entry.as_deref().filter(|args| !args.is_empty())
    }

    /// Image default command, treating an empty list as unset.
    #[must_use]
    pub fn cmd_args(&self) -> Option<&[String]> {
        self.cmd.as_deref().filter(|args| !args.is_empty())
    }
}
