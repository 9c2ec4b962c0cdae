//! Configuration module for capture runs
//!
//! This module provides the `CaptureConfig` struct and its type-safe builder.
//! Values not set explicitly fall back to the defaults in `utils::constants`.

pub mod builder;
pub mod getters;
pub mod methods;
pub mod types;

pub use builder::{CaptureConfigBuilder, WithArtifactDir, WithBaseUrl};
pub use types::{CaptureConfig, Viewport};
