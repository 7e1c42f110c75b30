// This module gathers the infrastructure shared by every layer of the bridge: the
// thiserror-based error types for each lifecycle phase (configuration, resolution,
// handle construction, build stages) and the configuration that tells the resolver
// where the capability providers live and which constructor ABI is active.

//! Shared bridge infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - One error enum per lifecycle phase
//! - `ProviderError` for provider-supplied messages
//!
//! ## Configuration (`config`)
//! - Provider library locations with environment overrides
//! - Constructor ABI selection

pub mod config;
pub mod error;

pub use config::{BridgeConfig, ConstructorAbi};

pub use error::{
    BuildError,
    BuildResult,
    ConfigError,
    CreateError,
    ProviderError,
    ResolveError,
    ResolveResult,
};
