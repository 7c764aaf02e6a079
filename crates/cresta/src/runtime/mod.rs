//! Launch preparation and orchestration.

pub mod config;
pub mod launcher;
pub mod merger;

pub use config::{CommandRun, RuntimeConfig, SiteConfig, SiteMount};
pub use launcher::Launcher;
pub use merger::{ConfigsMerger, MergedLaunchConfig};
