//! Where symbol addresses come from.
//!
//! [`DynamicLibrary`] opens a provider dylib with libloading; [`StaticSymbols`]
//! serves addresses registered in-process, for hosts that link a provider
//! statically and for tests.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

use super::{Provider, SymbolAddress};
use crate::core::{ResolveError, ResolveResult};

/// A named-symbol lookup backend.
pub trait SymbolSource: Send + Sync {
    /// Human readable origin, e.g. the library path.
    fn describe(&self) -> String;

    /// Address of `symbol`, or `None` if it is not exported.
    fn lookup(&self, symbol: &str) -> Option<SymbolAddress>;
}

/// A provider library opened at runtime.
pub struct DynamicLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl DynamicLibrary {
    /// Open `path` with lazy binding and local symbol visibility.
    pub fn open(provider: Provider, path: &Path) -> ResolveResult<Self> {
        let library = open_local(path).map_err(|e| {
            log::error!("Failed to load {}: {}", path.display(), e);
            ResolveError::ProviderOpen {
                provider,
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        log::debug!("Loaded {} provider from {}", provider, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn open_local(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_LAZY, RTLD_LOCAL};

    // SAFETY: provider initialisers are trusted system components.
    unsafe { Library::open(Some(path), RTLD_LAZY | RTLD_LOCAL) }.map(Into::into)
}

#[cfg(not(unix))]
fn open_local(path: &Path) -> Result<libloading::Library, libloading::Error> {
    // SAFETY: provider initialisers are trusted system components.
    unsafe { libloading::Library::new(path) }
}

impl SymbolSource for DynamicLibrary {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress> {
        // SAFETY: the value is read as an untyped address; typing happens in
        // `SymbolTable::function` under its own contract.
        let symbol = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) }.ok()?;
        SymbolAddress::new(*symbol)
    }
}

/// Symbols registered by address.
#[derive(Debug, Default)]
pub struct StaticSymbols {
    origin: String,
    symbols: HashMap<String, SymbolAddress>,
}

impl StaticSymbols {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            symbols: HashMap::new(),
        }
    }

    /// Register `address` under `symbol`; null addresses are ignored.
    pub fn insert(&mut self, symbol: impl Into<String>, address: *mut c_void) -> &mut Self {
        if let Some(address) = SymbolAddress::new(address) {
            self.symbols.insert(symbol.into(), address);
        }
        self
    }

    pub fn remove(&mut self, symbol: &str) -> Option<SymbolAddress> {
        self.symbols.remove(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for StaticSymbols {
    fn describe(&self) -> String {
        self.origin.clone()
    }

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress> {
        self.symbols.get(symbol).copied()
    }
}
