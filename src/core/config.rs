// This module holds the bridge configuration: where the two capability providers live on
// disk and which ABI variant of the GPU compiler constructor is active. Defaults match the
// locations the toolchain installs to on the host (libLLVM under /usr/lib, libGPUCompiler
// inside the private GPUCompiler framework) and the constructor ABI selected at build
// time by the versioned-create feature. BridgeConfig::from_env applies the
// PARAVIRT_LLVM_LIBRARY, PARAVIRT_GPU_COMPILER_LIBRARY and PARAVIRT_COMPILER_ABI
// overrides; the resolver reads the configuration exactly once.

//! Bridge configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::error::ConfigError;

pub const DEFAULT_LLVM_LIBRARY: &str = "/usr/lib/libLLVM.dylib";
pub const DEFAULT_GPU_COMPILER_LIBRARY: &str =
    "/System/Library/PrivateFrameworks/GPUCompiler.framework/Libraries/libGPUCompiler.dylib";

pub const LLVM_LIBRARY_ENV: &str = "PARAVIRT_LLVM_LIBRARY";
pub const GPU_COMPILER_LIBRARY_ENV: &str = "PARAVIRT_GPU_COMPILER_LIBRARY";
pub const COMPILER_ABI_ENV: &str = "PARAVIRT_COMPILER_ABI";

/// Which signature the provider's compiler constructor has.
///
/// Both variants are exported under the same symbol name, so the variant
/// cannot be discovered from the library; it is fixed once at resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructorAbi {
    /// `void* MTLGPUCompilerCreate(void)`
    Legacy,
    /// `void* MTLGPUCompilerCreate(const void* target_info, size_t size)`
    Versioned,
}

impl ConstructorAbi {
    /// The variant matching the exported C `MTLCompilerCreate` signature.
    pub const fn build_default() -> Self {
        if cfg!(feature = "versioned-create") {
            Self::Versioned
        } else {
            Self::Legacy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Versioned => "versioned",
        }
    }
}

impl Default for ConstructorAbi {
    fn default() -> Self {
        Self::build_default()
    }
}

impl fmt::Display for ConstructorAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ConstructorAbi {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "versioned" => Ok(Self::Versioned),
            _ => Err(ConfigError::UnknownAbi {
                value: s.to_string(),
            }),
        }
    }
}

/// Provider locations and constructor ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub llvm_library: PathBuf,
    pub gpu_compiler_library: PathBuf,
    pub constructor_abi: ConstructorAbi,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            llvm_library: PathBuf::from(DEFAULT_LLVM_LIBRARY),
            gpu_compiler_library: PathBuf::from(DEFAULT_GPU_COMPILER_LIBRARY),
            constructor_abi: ConstructorAbi::build_default(),
        }
    }
}

impl BridgeConfig {
    /// Defaults with the `PARAVIRT_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BridgeConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(LLVM_LIBRARY_ENV).filter(|v| !v.is_empty()) {
            config.llvm_library = PathBuf::from(path);
        }
        if let Some(path) = lookup(GPU_COMPILER_LIBRARY_ENV).filter(|v| !v.is_empty()) {
            config.gpu_compiler_library = PathBuf::from(path);
        }
        if let Some(abi) = lookup(COMPILER_ABI_ENV).filter(|v| !v.is_empty()) {
            config.constructor_abi = abi.parse()?;
        }

        Ok(config)
    }
}
