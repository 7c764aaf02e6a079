//! # cresta-common
//!
//! Shared utilities and types for the Cresta container launcher.
//!
//! This crate provides common functionality used across all Cresta crates:
//! - Common error types
//! - Standard filesystem paths
//! - Environment-string parsing
//! - Image execution metadata

#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod metadata;
pub mod paths;

pub use error::{CrestaError, CrestaResult};
pub use metadata::ImageMetadata;
pub use paths::CrestaPaths;
