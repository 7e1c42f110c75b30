// This module implements the symbol table for the two external capability providers: the
// IR services provider (libLLVM) and the GPU compiler services provider (libGPUCompiler).
// CATALOG lists every capability the bridge knows about with its provider, exported
// symbol name, and whether it is required. ProviderGroup binds one provider's catalog
// entries against a SymbolSource, recording the address (or absence) of each symbol as a
// SymbolEntry so optional capabilities can be checked via `found()`. SymbolTable holds
// both groups and is only ever constructed through `resolve`, which fails atomically if
// a required symbol is missing in either group; once built it is immutable. Typed
// function pointers are produced on demand with `SymbolTable::function`.

//! Capability catalog and resolved symbol table.

pub mod source;

use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::ptr::NonNull;

use crate::core::{ResolveError, ResolveResult};

pub use source::{DynamicLibrary, StaticSymbols, SymbolSource};

/// The two external capability providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// IR services (`libLLVM`).
    Ir,
    /// GPU compiler services (`libGPUCompiler`).
    GpuCompiler,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Ir => "IR services",
            Provider::GpuCompiler => "GPU compiler services",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Logical capabilities, one per external entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DisposeMemoryBuffer,
    BufferSize,
    BufferStart,
    ModuleTarget,
    ValueName,
    NamedMetadata,
    NamedMetadataOperand,
    MakeSharedModule,
    DisposeSharedModule,
    DowngradeModule,
    CreateCompiler,
    DestroyCompiler,
    CreateFunction,
    ReleaseFunction,
    CreateLibrary,
    DestroyLibrary,
    InsertFunction,
    WriteLibrary,
}

impl Capability {
    pub fn description(self) -> &'static str {
        match self {
            Capability::DisposeMemoryBuffer => "dispose memory buffer",
            Capability::BufferSize => "buffer size",
            Capability::BufferStart => "buffer start",
            Capability::ModuleTarget => "module target triple",
            Capability::ValueName => "value name",
            Capability::NamedMetadata => "named metadata lookup",
            Capability::NamedMetadataOperand => "named metadata operand",
            Capability::MakeSharedModule => "make shared module",
            Capability::DisposeSharedModule => "dispose shared module",
            Capability::DowngradeModule => "downgrade module",
            Capability::CreateCompiler => "create GPU compiler",
            Capability::DestroyCompiler => "destroy GPU compiler",
            Capability::CreateFunction => "create function",
            Capability::ReleaseFunction => "release function",
            Capability::CreateLibrary => "create executable library",
            Capability::DestroyLibrary => "destroy library",
            Capability::InsertFunction => "insert function",
            Capability::WriteLibrary => "write library to buffer",
        }
    }

    /// Catalog entry for this capability.
    pub fn spec(self) -> &'static SymbolSpec {
        CATALOG
            .iter()
            .find(|spec| spec.capability == self)
            .unwrap_or_else(|| unreachable!("capability {:?} missing from catalog", self))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.description())
    }
}

/// Static description of one external entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolSpec {
    pub capability: Capability,
    pub provider: Provider,
    pub symbol: &'static str,
    pub required: bool,
}

const fn required(capability: Capability, provider: Provider, symbol: &'static str) -> SymbolSpec {
    SymbolSpec { capability, provider, symbol, required: true }
}

const fn optional(capability: Capability, provider: Provider, symbol: &'static str) -> SymbolSpec {
    SymbolSpec { capability, provider, symbol, required: false }
}

/// Every capability the bridge binds, in resolution order.
pub const CATALOG: &[SymbolSpec] = &[
    // IR services
    required(Capability::DisposeMemoryBuffer, Provider::Ir, "LLVMDisposeMemoryBuffer"),
    required(Capability::BufferSize, Provider::Ir, "LLVMGetBufferSize"),
    required(Capability::BufferStart, Provider::Ir, "LLVMGetBufferStart"),
    required(Capability::ModuleTarget, Provider::Ir, "LLVMGetTarget"),
    // Bound with the rest of the IR group but never called by the pipeline.
    required(Capability::ValueName, Provider::Ir, "_ZNK4llvm5Value7getNameEv"),
    required(
        Capability::NamedMetadata,
        Provider::Ir,
        "_ZNK4llvm6Module16getNamedMetadataERKNS_5TwineE",
    ),
    required(
        Capability::NamedMetadataOperand,
        Provider::Ir,
        "_ZNK4llvm11NamedMDNode10getOperandEj",
    ),
    // GPU compiler services
    required(Capability::MakeSharedModule, Provider::GpuCompiler, "LLVMExtraMakeSharedModule"),
    required(Capability::DisposeSharedModule, Provider::GpuCompiler, "LLVMExtraDisposeSharedModule"),
    required(Capability::DowngradeModule, Provider::GpuCompiler, "MTLDowngradeAIRModule"),
    required(Capability::CreateCompiler, Provider::GpuCompiler, "MTLGPUCompilerCreate"),
    required(Capability::DestroyCompiler, Provider::GpuCompiler, "MTLGPUCompilerDestroy"),
    required(Capability::CreateFunction, Provider::GpuCompiler, "MTLMetalFunctionCreate"),
    // Not a confirmed export of any shipped libGPUCompiler; optional so a
    // toolchain without it still resolves and the call is skipped.
    optional(Capability::ReleaseFunction, Provider::GpuCompiler, "MTLMetalFunctionDestroy"),
    required(
        Capability::CreateLibrary,
        Provider::GpuCompiler,
        "MTLMetalLibCreateExecutableWithTriple",
    ),
    required(Capability::DestroyLibrary, Provider::GpuCompiler, "MTLMetalLibDestroy"),
    required(Capability::InsertFunction, Provider::GpuCompiler, "MTLMetalLibInsertFunction"),
    required(Capability::WriteLibrary, Provider::GpuCompiler, "MTLWriteMetalLibToMemoryBuffer"),
];

/// Address of a resolved symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAddress(NonNull<c_void>);

// SAFETY: the address names code inside a loaded image and is never written through.
unsafe impl Send for SymbolAddress {}
unsafe impl Sync for SymbolAddress {}

impl SymbolAddress {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// One catalog entry together with its resolution outcome.
#[derive(Debug, Clone, Copy)]
pub struct SymbolEntry {
    pub spec: &'static SymbolSpec,
    pub address: Option<SymbolAddress>,
}

impl SymbolEntry {
    pub fn found(&self) -> bool {
        self.address.is_some()
    }

    pub fn name(&self) -> &'static str {
        self.spec.symbol
    }

    pub fn required(&self) -> bool {
        self.spec.required
    }
}

/// The bound entries of one provider plus the source keeping them alive.
pub struct ProviderGroup {
    provider: Provider,
    source: Box<dyn SymbolSource>,
    entries: Vec<SymbolEntry>,
}

impl ProviderGroup {
    /// Look up every catalog entry of `provider` in `source`.
    ///
    /// Never fails; use [`ProviderGroup::missing_required`] to validate.
    pub fn bind(provider: Provider, source: Box<dyn SymbolSource>) -> Self {
        let entries = CATALOG
            .iter()
            .filter(|spec| spec.provider == provider)
            .map(|spec| {
                let address = source.lookup(spec.symbol);
                if address.is_none() {
                    if spec.required {
                        log::error!("Failed to load symbol: {}", spec.symbol);
                    } else {
                        log::debug!("Optional symbol not present: {}", spec.symbol);
                    }
                }
                SymbolEntry { spec, address }
            })
            .collect();

        Self { provider, source, entries }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Where the symbols came from (usually a library path).
    pub fn origin(&self) -> String {
        self.source.describe()
    }

    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    pub fn entry(&self, capability: Capability) -> Option<&SymbolEntry> {
        self.entries.iter().find(|e| e.spec.capability == capability)
    }

    /// Names of required symbols that did not resolve.
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| e.required() && !e.found())
            .map(|e| e.name())
            .collect()
    }

    fn validate(self) -> ResolveResult<Self> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(self)
        } else {
            log::error!("Failed to load required {} symbols", self.provider);
            Err(ResolveError::MissingSymbols {
                provider: self.provider,
                symbols: missing,
            })
        }
    }
}

impl fmt::Debug for ProviderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderGroup")
            .field("provider", &self.provider)
            .field("origin", &self.origin())
            .field("entries", &self.entries)
            .finish()
    }
}

/// Fully validated symbols of both providers.
///
/// Only constructible through [`SymbolTable::resolve`], so holding one means
/// every required capability is callable for as long as the table lives.
#[derive(Debug)]
pub struct SymbolTable {
    ir: ProviderGroup,
    gpu: ProviderGroup,
}

impl SymbolTable {
    /// Bind and validate the IR group, then the GPU compiler group.
    pub fn resolve(
        ir_source: Box<dyn SymbolSource>,
        gpu_source: Box<dyn SymbolSource>,
    ) -> ResolveResult<Self> {
        let ir = ProviderGroup::bind(Provider::Ir, ir_source).validate()?;
        let gpu = ProviderGroup::bind(Provider::GpuCompiler, gpu_source).validate()?;
        log::debug!(
            "Resolved {} IR and {} GPU compiler symbols",
            ir.entries.iter().filter(|e| e.found()).count(),
            gpu.entries.iter().filter(|e| e.found()).count()
        );
        Ok(Self { ir, gpu })
    }

    pub fn group(&self, provider: Provider) -> &ProviderGroup {
        match provider {
            Provider::Ir => &self.ir,
            Provider::GpuCompiler => &self.gpu,
        }
    }

    pub fn entry(&self, capability: Capability) -> Option<&SymbolEntry> {
        self.group(capability.spec().provider).entry(capability)
    }

    /// Whether an (optional) capability is available.
    pub fn has(&self, capability: Capability) -> bool {
        self.entry(capability).is_some_and(SymbolEntry::found)
    }

    pub fn address(&self, capability: Capability) -> Option<SymbolAddress> {
        self.entry(capability).and_then(|e| e.address)
    }

    /// Reinterpret a resolved symbol as a typed function pointer.
    ///
    /// # Safety
    /// `F` must be an `extern "C"` function pointer type matching the native
    /// signature of the symbol, and the result must not outlive this table.
    pub unsafe fn function<F: Copy>(&self, capability: Capability) -> Option<F> {
        assert_eq!(
            mem::size_of::<F>(),
            mem::size_of::<*mut c_void>(),
            "function pointer type expected for {}",
            capability
        );
        self.address(capability)
            .map(|address| mem::transmute_copy::<*mut c_void, F>(&address.as_ptr()))
    }

    /// Like [`SymbolTable::function`] for required capabilities.
    ///
    /// # Safety
    /// Same contract as [`SymbolTable::function`].
    pub unsafe fn required_function<F: Copy>(&self, capability: Capability) -> F {
        debug_assert!(capability.spec().required);
        self.function(capability)
            .unwrap_or_else(|| unreachable!("validated table lacks {}", capability))
    }
}
