// This module implements the build pipeline behind MTLCompilerBuildRequestWithOptions.
// A request runs strictly in order: the provider decodes which functions the options
// blob names, the borrowed module is downgraded in place to the version carried in the
// request flags, a reference-counted shared module is made from it, each requested
// function is extracted from the shared module, an executable library is created for
// the module's target triple and the functions are inserted in extraction order, and
// finally the library is written to a memory buffer. Every intermediate native object is
// held by a scoped guard (SharedModule, ExtractedFunctions, Library) declared in
// acquisition order, so whichever stage fails, the guards release what was acquired in
// reverse order before the error is returned. Only the serialized buffer escapes, wrapped
// in a ReplyBuffer whose ownership moves to the compiler handle.

//! Staged compile-and-package pipeline.

use std::ffi::{CStr, CString};

use super::reply::{BuildReply, OutstandingReply, ReplyBuffer};
use crate::core::{BuildError, BuildResult};
use crate::provider::{
    FunctionRef, GpuCompilerServices, LibraryRef, ModuleRef, Providers, SharedModuleRef,
};

/// Run every stage for one request.
pub(crate) fn run(
    providers: &Providers,
    options: &[u8],
    flags: u32,
    module: ModuleRef,
) -> BuildResult<OutstandingReply> {
    let gpu = providers.gpu.as_ref();

    let names = requested_functions(gpu, options)?;
    log::debug!("Build request for {} function(s): {:?}", names.len(), names);

    let version = u64::from(flags);
    gpu.downgrade_module(module, version)
        .map_err(|e| BuildError::Downgrade(e.0))?;
    log::trace!("Downgraded {:?} to version {:#x}", module, version);

    let shared = SharedModule::wrap(gpu, module)?;

    let mut functions = ExtractedFunctions::new(gpu);
    for name in &names {
        let function = gpu
            .create_function(shared.raw, name)
            .ok_or_else(|| BuildError::FunctionNotFound {
                name: name.to_string_lossy().into_owned(),
            })?;
        functions.push(function);
    }

    let triple = module_triple(providers, module)?;
    let library = Library::create(gpu, &triple)?;
    for &function in functions.in_order() {
        gpu.insert_function(library.raw, function);
    }
    log::trace!("Inserted {} function(s) into {:?}", functions.len(), library.raw);

    let buffer = gpu
        .write_library(library.raw)
        .ok_or_else(|| BuildError::Serialization("provider returned no buffer".to_string()))?;
    let buffer = ReplyBuffer::new(providers.ir.clone(), buffer);

    let reply = BuildReply {
        primary: buffer.contents(),
        auxiliary: gpu.auxiliary_outputs(library.raw),
    };
    log::debug!("Serialized library: {} bytes", reply.primary.len());

    Ok(OutstandingReply { buffer, reply })
}

fn requested_functions(gpu: &dyn GpuCompilerServices, options: &[u8]) -> BuildResult<Vec<CString>> {
    let names = gpu
        .requested_functions(options)
        .map_err(|e| BuildError::InvalidOptions(e.0))?;
    if names.is_empty() {
        return Err(BuildError::NoFunctionsRequested);
    }

    names
        .into_iter()
        .map(|name| {
            CString::new(name)
                .map_err(|e| BuildError::InvalidOptions(format!("function name contains NUL: {e}")))
        })
        .collect()
}

fn module_triple(providers: &Providers, module: ModuleRef) -> BuildResult<CString> {
    let triple = providers
        .ir
        .module_target(module)
        .ok_or(BuildError::MissingTargetTriple)?;
    CString::new(triple).map_err(|_| BuildError::MissingTargetTriple)
}

/// Shared module wrapper, disposed on drop.
struct SharedModule<'p> {
    gpu: &'p dyn GpuCompilerServices,
    raw: SharedModuleRef,
}

impl<'p> SharedModule<'p> {
    fn wrap(gpu: &'p dyn GpuCompilerServices, module: ModuleRef) -> BuildResult<Self> {
        let raw = gpu
            .make_shared_module(module)
            .ok_or_else(|| BuildError::SharedModule(format!("provider rejected {module:?}")))?;
        Ok(Self { gpu, raw })
    }
}

impl Drop for SharedModule<'_> {
    fn drop(&mut self) {
        self.gpu.dispose_shared_module(self.raw);
    }
}

/// Functions in extraction order, released last-to-first on drop.
struct ExtractedFunctions<'p> {
    gpu: &'p dyn GpuCompilerServices,
    functions: Vec<FunctionRef>,
}

impl<'p> ExtractedFunctions<'p> {
    fn new(gpu: &'p dyn GpuCompilerServices) -> Self {
        Self {
            gpu,
            functions: Vec::new(),
        }
    }

    fn push(&mut self, function: FunctionRef) {
        self.functions.push(function);
    }

    fn in_order(&self) -> &[FunctionRef] {
        &self.functions
    }

    fn len(&self) -> usize {
        self.functions.len()
    }
}

impl Drop for ExtractedFunctions<'_> {
    fn drop(&mut self) {
        while let Some(function) = self.functions.pop() {
            self.gpu.release_function(function);
        }
    }
}

/// Executable library container, destroyed on drop.
struct Library<'p> {
    gpu: &'p dyn GpuCompilerServices,
    raw: LibraryRef,
}

impl<'p> Library<'p> {
    fn create(gpu: &'p dyn GpuCompilerServices, triple: &CStr) -> BuildResult<Self> {
        let raw = gpu
            .create_library(triple)
            .ok_or_else(|| BuildError::LibraryCreation {
                triple: triple.to_string_lossy().into_owned(),
            })?;
        Ok(Self { gpu, raw })
    }
}

impl Drop for Library<'_> {
    fn drop(&mut self) {
        self.gpu.destroy_library(self.raw);
    }
}
