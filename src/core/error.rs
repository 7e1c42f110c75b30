// This module defines the error types for the compiler bridge using the thiserror crate.
// Errors are split by lifecycle phase: ConfigError for malformed environment overrides,
// ResolveError for the once-per-process provider resolution (a provider dylib that fails
// to open, or required symbols that are absent), CreateError for compiler handle
// construction (resolution not done, wrong target-info size, constructor ABI mismatch,
// provider returning null), and BuildError for the per-request pipeline with one variant
// per stage. ProviderError carries free-form text reported by a capability provider and
// is folded into BuildError by the stage that received it. ResolveError is Clone so the
// process-wide resolution result can be handed out to every caller.

//! Error types for the compiler bridge.

use std::path::PathBuf;
use thiserror::Error;

use super::config::ConstructorAbi;
use crate::symbols::Provider;

/// Malformed configuration override.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown constructor ABI '{value}' (expected 'legacy' or 'versioned')")]
    UnknownAbi { value: String },
}

/// Failure to bind the external compiler services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Failed to load {provider} provider from {}: {reason}", path.display())]
    ProviderOpen {
        provider: Provider,
        path: PathBuf,
        reason: String,
    },

    #[error("Missing required {provider} symbols: {}", symbols.join(", "))]
    MissingSymbols {
        provider: Provider,
        symbols: Vec<&'static str>,
    },

    #[error("Invalid bridge configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Failure to construct a compiler handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    #[error("Compiler services have not been resolved")]
    NotResolved,

    #[error("Target info must be exactly {expected} bytes, got {actual}")]
    InvalidTargetInfoSize { expected: usize, actual: usize },

    #[error("Constructor ABI mismatch: provider is {active}, request used {requested}")]
    AbiMismatch {
        active: ConstructorAbi,
        requested: ConstructorAbi,
    },

    #[error("GPU compiler provider returned no compiler instance")]
    ProviderRejected,
}

/// Message reported by a capability provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure of one build pipeline stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Invalid build request: {0}")]
    InvalidArgument(&'static str),

    #[error("Build options name no functions")]
    NoFunctionsRequested,

    #[error("Invalid build options: {0}")]
    InvalidOptions(String),

    #[error("Module downgrade failed: {0}")]
    Downgrade(String),

    #[error("Failed to create shared module: {0}")]
    SharedModule(String),

    #[error("Module has no target triple")]
    MissingTargetTriple,

    #[error("Function not found: {name}")]
    FunctionNotFound { name: String },

    #[error("Failed to create executable library for triple '{triple}'")]
    LibraryCreation { triple: String },

    #[error("Failed to serialize library: {0}")]
    Serialization(String),
}

/// Result type alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type alias for build stages.
pub type BuildResult<T> = Result<T, BuildError>;
