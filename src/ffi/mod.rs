// This module is the C boundary of the bridge, exporting the AppleParavirtCompiler entry
// points with their original names and layouts. MTLCompilerResolveSymbols replaces the
// load-time constructor: the host calls it once and aborts if it returns false.
// MTLCompilerCreate is exported in the legacy no-argument form by default and in the
// target-info taking form with the versioned-create feature. The pointer a caller gets
// back is an opaque registry token, never a heap address, so calls with a null, forged,
// deleted or double-deleted handle miss the registry and are rejected rather than
// dereferenced. On a successful build the primary buffer and the first two auxiliary
// pairs fill the six data out-parameters; on failure the error out-parameter is always
// set, pointing either at a message owned by the handle until the reply is released or,
// for an invalid handle, at a static message.

//! C ABI exports.

#![allow(non_snake_case)]

mod registry;

use std::ffi::{c_char, c_void, CStr};
use std::ptr;

use registry::HandleRegistry;

use crate::bridge;
use crate::compiler::{CompilerHandle, CreateArgs};
use crate::core::{BuildError, CreateError};
use crate::provider::{ModuleRef, OutputSlot};

/// Environment variable holding the `env_logger` filter for the shim.
pub const LOG_ENV: &str = "PARAVIRT_COMPILER_LOG";

/// Opaque compiler type handed to C callers.
pub struct AppleParavirtCompiler {
    handle: CompilerHandle,
}

static COMPILERS: HandleRegistry<AppleParavirtCompiler> = HandleRegistry::new();

/// Error reported for a handle that is not live; needs no owner.
const INVALID_HANDLE: &CStr = c"invalid compiler handle";

fn init_logging() {
    let env = env_logger::Env::default().filter_or(LOG_ENV, "warn");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Resolve both capability providers. Must precede every other call.
#[no_mangle]
pub extern "C" fn MTLCompilerResolveSymbols() -> bool {
    init_logging();
    match bridge::resolve() {
        Ok(providers) => {
            log::debug!("Compiler services ready ({} constructor)", providers.constructor_abi());
            true
        }
        Err(err) => {
            log::error!("Fatal: failed to initialize dynamic symbols: {}", err);
            false
        }
    }
}

fn create_compiler(args: CreateArgs<'_>) -> *mut AppleParavirtCompiler {
    let handle = bridge::providers()
        .ok_or(CreateError::NotResolved)
        .and_then(|providers| CompilerHandle::create(providers, args));

    match handle {
        Ok(handle) => {
            let token = COMPILERS.insert(AppleParavirtCompiler { handle });
            token as *mut AppleParavirtCompiler
        }
        Err(err) => {
            log::error!("MTLCompilerCreate failed: {}", err);
            ptr::null_mut()
        }
    }
}

/// Create a compiler through the legacy constructor.
#[cfg(not(feature = "versioned-create"))]
#[no_mangle]
pub extern "C" fn MTLCompilerCreate() -> *mut AppleParavirtCompiler {
    create_compiler(CreateArgs::Legacy)
}

/// Create a compiler through the versioned constructor.
///
/// # Safety
/// `target_info` must point to `target_info_size` readable bytes.
#[cfg(feature = "versioned-create")]
#[no_mangle]
pub unsafe extern "C" fn MTLCompilerCreate(
    target_info: *const c_void,
    target_info_size: usize,
) -> *mut AppleParavirtCompiler {
    if target_info_size != crate::compiler::TARGET_INFO_SIZE {
        log::error!(
            "MTLCompilerCreate: target info must be {} bytes, got {}",
            crate::compiler::TARGET_INFO_SIZE,
            target_info_size
        );
        return ptr::null_mut();
    }
    if target_info.is_null() {
        log::error!("MTLCompilerCreate: null target info");
        return ptr::null_mut();
    }

    let bytes = std::slice::from_raw_parts(target_info.cast::<u8>(), target_info_size);
    create_compiler(CreateArgs::Versioned(bytes))
}

/// Destroy a compiler and any reply it still holds.
///
/// Null is a no-op; any other value that is not a live handle is logged.
#[no_mangle]
pub extern "C" fn MTLCompilerDelete(compiler: *mut AppleParavirtCompiler) {
    if compiler.is_null() {
        return;
    }
    match COMPILERS.remove(compiler as usize) {
        Some(compiler) => drop(compiler),
        None => log::error!("MTLCompilerDelete: {:p} is not a live compiler", compiler),
    }
}

/// Release the buffers of the compiler's most recent build.
#[no_mangle]
pub extern "C" fn MTLCompilerReleaseReply(compiler: *mut AppleParavirtCompiler) {
    if let Some(shared) = live_compiler(compiler, "MTLCompilerReleaseReply") {
        registry::lock(&shared).handle.release_reply();
    }
}

/// Compile `llvm_module` and package the requested functions.
///
/// # Safety
/// `options` must point to `options_size` readable bytes (or be null with a
/// size of 0), `llvm_module` must be a live module, and every non-null
/// out-pointer must be writable.
#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub unsafe extern "C" fn MTLCompilerBuildRequestWithOptions(
    compiler: *mut AppleParavirtCompiler,
    options: *const c_void,
    options_size: usize,
    flags: u32,
    llvm_module: *mut c_void,
    out_data_ptr: *mut *const c_void,
    out_data_size: *mut usize,
    out_param1: *mut *const c_void,
    out_param2: *mut usize,
    out_param3: *mut *const c_void,
    out_param4: *mut usize,
    out_error: *mut *const c_char,
) -> bool {
    let outputs = [
        (out_data_ptr, out_data_size),
        (out_param1, out_param2),
        (out_param3, out_param4),
    ];
    for &(ptr_out, size_out) in &outputs {
        write_slot(ptr_out, size_out, None);
    }
    write_out(out_error, ptr::null());

    let Some(shared) = live_compiler(compiler, "MTLCompilerBuildRequestWithOptions") else {
        write_out(out_error, INVALID_HANDLE.as_ptr());
        return false;
    };
    let mut compiler = registry::lock(&shared);
    let handle = &mut compiler.handle;

    let request = request_options(options, options_size).and_then(|options| {
        ModuleRef::from_raw(llvm_module)
            .map(|module| (options, module))
            .ok_or(BuildError::InvalidArgument("null module"))
    });
    let result = match request {
        Ok((options, module)) => handle.build(options, flags, module),
        Err(err) => Err(handle.reject(err)),
    };

    match result {
        Ok(reply) => {
            let slots = [reply.primary, reply.auxiliary[0], reply.auxiliary[1]];
            for (&(ptr_out, size_out), slot) in outputs.iter().zip(slots) {
                write_slot(ptr_out, size_out, Some(slot));
            }
            true
        }
        Err(_) => {
            // The message lives on the handle, which the registry keeps alive.
            let message = handle.last_error().map_or(ptr::null(), |m| m.as_ptr());
            write_out(out_error, message);
            false
        }
    }
}

fn live_compiler(
    compiler: *mut AppleParavirtCompiler,
    operation: &str,
) -> Option<registry::Shared<AppleParavirtCompiler>> {
    let shared = COMPILERS.get(compiler as usize);
    if shared.is_none() {
        log::error!("{}: {:p} is not a live compiler", operation, compiler);
    }
    shared
}

unsafe fn request_options<'a>(options: *const c_void, options_size: usize) -> Result<&'a [u8], BuildError> {
    if options_size == 0 {
        return Ok(&[]);
    }
    if options.is_null() {
        return Err(BuildError::InvalidArgument("null options with non-zero size"));
    }
    Ok(std::slice::from_raw_parts(options.cast::<u8>(), options_size))
}

unsafe fn write_slot(ptr_out: *mut *const c_void, size_out: *mut usize, slot: Option<OutputSlot>) {
    let (data, len) = slot.map_or((ptr::null(), 0), |s| (s.as_ptr().cast::<c_void>(), s.len()));
    write_out(ptr_out, data);
    write_out(size_out, len);
}

unsafe fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        out.write(value);
    }
}
