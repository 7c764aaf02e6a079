//! # cresta-oci
//!
//! OCI image configuration types for the Cresta launcher.
//!
//! Only the subset of the OCI Image Specification that the launcher consumes
//! is modelled here: the execution parameters (`Env`, `Entrypoint`, `Cmd`,
//! `WorkingDir`) declared by an image configuration.

#![warn(missing_docs)]

pub mod image;

pub use image::{ExecutionConfig, ImageConfig};
