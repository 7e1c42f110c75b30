// This module implements the capability-provider traits over symbols resolved from the
// host's libLLVM and libGPUCompiler. Each native entry point is pulled out of the
// validated SymbolTable once, as a typed extern "C" function pointer, when the services
// are bound; the table itself is kept alive inside the services so the dylibs stay
// mapped for as long as any handle can call into them. The compiler constructor is bound
// as a tagged variant (legacy no-argument or versioned target-info taking) according to
// the constructor ABI chosen at resolution, so calls never re-check which signature is
// active. MTLMetalFunctionDestroy is optional; without it extracted functions stay owned
// by the provider and releasing them is a no-op.

//! Native capability providers backed by dynamically resolved symbols.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::Arc;

use super::options::decode_function_names;
use super::{
    CompilerInstanceRef, FunctionRef, GpuCompilerServices, IrServices, LibraryRef,
    MemoryBufferRef, ModuleRef, OutputSlot, Providers, SharedModuleRef,
};
use crate::core::{ConstructorAbi, ProviderError};
use crate::symbols::{Capability, SymbolTable};

type DisposeFn = unsafe extern "C" fn(*mut c_void);
type BufferSizeFn = unsafe extern "C" fn(*mut c_void) -> usize;
type BufferStartFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type ModuleTargetFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type MakeSharedModuleFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type DowngradeModuleFn = unsafe extern "C" fn(*mut c_void, u64, c_int) -> c_int;
type CreateCompilerFn = unsafe extern "C" fn() -> *mut c_void;
type CreateCompilerForTargetFn = unsafe extern "C" fn(*const c_void, usize) -> *mut c_void;
type CreateFunctionFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;
type CreateLibraryFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type InsertFunctionFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type WriteLibraryFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// Bind both native services from a validated table.
pub fn bind_providers(table: SymbolTable, abi: ConstructorAbi) -> Providers {
    let table = Arc::new(table);
    Providers::new(
        Arc::new(NativeIrServices::bind(Arc::clone(&table))),
        Arc::new(NativeGpuServices::bind(table, abi)),
    )
}

/// IR services from `libLLVM`.
pub struct NativeIrServices {
    _table: Arc<SymbolTable>,
    dispose_buffer: DisposeFn,
    buffer_size: BufferSizeFn,
    buffer_start: BufferStartFn,
    module_target: ModuleTargetFn,
}

impl NativeIrServices {
    pub fn bind(table: Arc<SymbolTable>) -> Self {
        // SAFETY: the pointer types mirror the LLVM-C declarations.
        unsafe {
            Self {
                dispose_buffer: table.required_function(Capability::DisposeMemoryBuffer),
                buffer_size: table.required_function(Capability::BufferSize),
                buffer_start: table.required_function(Capability::BufferStart),
                module_target: table.required_function(Capability::ModuleTarget),
                _table: table,
            }
        }
    }
}

impl IrServices for NativeIrServices {
    fn module_target(&self, module: ModuleRef) -> Option<String> {
        let triple = unsafe { (self.module_target)(module.as_raw()) };
        if triple.is_null() {
            return None;
        }
        // SAFETY: LLVMGetTarget returns a NUL-terminated string owned by the module.
        Some(unsafe { CStr::from_ptr(triple) }.to_string_lossy().into_owned())
    }

    fn buffer_contents(&self, buffer: MemoryBufferRef) -> OutputSlot {
        let (start, size) = unsafe {
            (
                (self.buffer_start)(buffer.as_raw()),
                (self.buffer_size)(buffer.as_raw()),
            )
        };
        OutputSlot::new(start.cast(), size)
    }

    fn dispose_buffer(&self, buffer: MemoryBufferRef) {
        unsafe { (self.dispose_buffer)(buffer.as_raw()) }
    }
}

/// Compiler constructor bound for the active ABI.
#[derive(Clone, Copy)]
enum Constructor {
    Legacy(CreateCompilerFn),
    Versioned(CreateCompilerForTargetFn),
}

/// GPU compiler services from `libGPUCompiler`.
pub struct NativeGpuServices {
    _table: Arc<SymbolTable>,
    constructor: Constructor,
    destroy_compiler: DisposeFn,
    downgrade_module: DowngradeModuleFn,
    make_shared_module: MakeSharedModuleFn,
    dispose_shared_module: DisposeFn,
    create_function: CreateFunctionFn,
    release_function: Option<DisposeFn>,
    create_library: CreateLibraryFn,
    insert_function: InsertFunctionFn,
    destroy_library: DisposeFn,
    write_library: WriteLibraryFn,
}

impl NativeGpuServices {
    pub fn bind(table: Arc<SymbolTable>, abi: ConstructorAbi) -> Self {
        // SAFETY: the pointer types mirror the GPUCompiler exports; the
        // constructor type is the one selected for this deployment.
        unsafe {
            let constructor = match abi {
                ConstructorAbi::Legacy => {
                    Constructor::Legacy(table.required_function(Capability::CreateCompiler))
                }
                ConstructorAbi::Versioned => {
                    Constructor::Versioned(table.required_function(Capability::CreateCompiler))
                }
            };
            Self {
                constructor,
                destroy_compiler: table.required_function(Capability::DestroyCompiler),
                downgrade_module: table.required_function(Capability::DowngradeModule),
                make_shared_module: table.required_function(Capability::MakeSharedModule),
                dispose_shared_module: table.required_function(Capability::DisposeSharedModule),
                create_function: table.required_function(Capability::CreateFunction),
                release_function: table.function(Capability::ReleaseFunction),
                create_library: table.required_function(Capability::CreateLibrary),
                insert_function: table.required_function(Capability::InsertFunction),
                destroy_library: table.required_function(Capability::DestroyLibrary),
                write_library: table.required_function(Capability::WriteLibrary),
                _table: table,
            }
        }
    }
}

impl GpuCompilerServices for NativeGpuServices {
    fn constructor_abi(&self) -> ConstructorAbi {
        match self.constructor {
            Constructor::Legacy(_) => ConstructorAbi::Legacy,
            Constructor::Versioned(_) => ConstructorAbi::Versioned,
        }
    }

    fn create_compiler(&self) -> Option<CompilerInstanceRef> {
        match self.constructor {
            Constructor::Legacy(create) => CompilerInstanceRef::from_raw(unsafe { create() }),
            Constructor::Versioned(_) => {
                log::error!("Legacy compiler construction requested from a versioned provider");
                None
            }
        }
    }

    fn create_compiler_for_target(&self, target_info: &[u8]) -> Option<CompilerInstanceRef> {
        match self.constructor {
            Constructor::Versioned(create) => CompilerInstanceRef::from_raw(unsafe {
                create(target_info.as_ptr().cast(), target_info.len())
            }),
            Constructor::Legacy(_) => {
                log::error!("Versioned compiler construction requested from a legacy provider");
                None
            }
        }
    }

    fn destroy_compiler(&self, compiler: CompilerInstanceRef) {
        unsafe { (self.destroy_compiler)(compiler.as_raw()) }
    }

    fn requested_functions(&self, options: &[u8]) -> Result<Vec<String>, ProviderError> {
        decode_function_names(options)
    }

    fn downgrade_module(&self, module: ModuleRef, version: u64) -> Result<(), ProviderError> {
        let status = unsafe { (self.downgrade_module)(module.as_raw(), version, 0) };
        if status == 0 {
            Ok(())
        } else {
            Err(ProviderError::new(format!(
                "MTLDowngradeAIRModule returned status {status} for version {version:#x}"
            )))
        }
    }

    fn make_shared_module(&self, module: ModuleRef) -> Option<SharedModuleRef> {
        SharedModuleRef::from_raw(unsafe { (self.make_shared_module)(module.as_raw()) })
    }

    fn dispose_shared_module(&self, shared: SharedModuleRef) {
        unsafe { (self.dispose_shared_module)(shared.as_raw()) }
    }

    fn create_function(&self, shared: SharedModuleRef, name: &CStr) -> Option<FunctionRef> {
        FunctionRef::from_raw(unsafe { (self.create_function)(shared.as_raw(), name.as_ptr()) })
    }

    fn release_function(&self, function: FunctionRef) {
        match self.release_function {
            Some(release) => unsafe { release(function.as_raw()) },
            None => log::trace!("No function release capability; {:?} stays provider-owned", function),
        }
    }

    fn create_library(&self, triple: &CStr) -> Option<LibraryRef> {
        LibraryRef::from_raw(unsafe { (self.create_library)(triple.as_ptr()) })
    }

    fn insert_function(&self, library: LibraryRef, function: FunctionRef) {
        unsafe { (self.insert_function)(library.as_raw(), function.as_raw()) }
    }

    fn destroy_library(&self, library: LibraryRef) {
        unsafe { (self.destroy_library)(library.as_raw()) }
    }

    fn write_library(&self, library: LibraryRef) -> Option<MemoryBufferRef> {
        MemoryBufferRef::from_raw(unsafe { (self.write_library)(library.as_raw()) })
    }
}
