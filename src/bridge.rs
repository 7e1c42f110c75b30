// This module turns a BridgeConfig into bound capability providers. `resolve_with`
// opens the IR services provider and then the GPU compiler services provider, validates
// their symbol groups, and binds the native services with the configured constructor
// ABI; it is usable any number of times with different configurations (the probe tool
// and tests do this). `resolve` is the process-wide entry point: it reads the
// configuration from the environment, resolves once, and remembers the outcome, so
// every later call returns the same providers or the same error. There is no
// re-binding and a failed resolution never flips to success. Hosts that carry their own
// in-process providers can `install` them instead, before anything resolves.

//! Provider resolution.

use std::sync::OnceLock;

use crate::core::{BridgeConfig, ResolveError, ResolveResult};
use crate::provider::native::bind_providers;
use crate::provider::Providers;
use crate::symbols::{DynamicLibrary, Provider, SymbolTable};

static PROVIDERS: OnceLock<ResolveResult<Providers>> = OnceLock::new();

/// Open both providers named by `config` and bind their services.
pub fn resolve_with(config: &BridgeConfig) -> ResolveResult<Providers> {
    let table = open_table(config)?;
    Ok(bind_providers(table, config.constructor_abi))
}

/// Open both providers and validate their symbols.
pub fn open_table(config: &BridgeConfig) -> ResolveResult<SymbolTable> {
    let ir = DynamicLibrary::open(Provider::Ir, &config.llvm_library)?;
    let gpu = DynamicLibrary::open(Provider::GpuCompiler, &config.gpu_compiler_library)?;
    SymbolTable::resolve(Box::new(ir), Box::new(gpu))
}

/// Resolve the process-wide providers from the environment, once.
pub fn resolve() -> Result<&'static Providers, ResolveError> {
    PROVIDERS
        .get_or_init(|| {
            let config = BridgeConfig::from_env()?;
            log::debug!("Resolving compiler services with {:?}", config);
            resolve_with(&config)
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Use `providers` as the process-wide providers instead of resolving.
///
/// Returns false if resolution (or another install) already happened.
pub fn install(providers: Providers) -> bool {
    let installed = PROVIDERS.set(Ok(providers)).is_ok();
    if !installed {
        log::warn!("Compiler services already resolved; install ignored");
    }
    installed
}

/// The process-wide providers, if [`resolve`] has succeeded.
pub fn providers() -> Option<&'static Providers> {
    PROVIDERS.get().and_then(|result| result.as_ref().ok())
}
